//! Resolution of spoken, possibly misspelled names to catalog names.
//!
//! The similarity pass is synchronous and pure; only the disambiguation step
//! suspends on the chat-completion collaborator.

use std::{
    collections::{hash_map::DefaultHasher, BTreeSet, HashMap, HashSet},
    hash::{Hash, Hasher},
    sync::Arc,
};

use tracing::{debug, warn};

use crate::infra::llm::{ChatCompletion, ChatMessage};

pub const SHORTLIST_SIZE: usize = 10;
pub const SHORTLIST_CUTOFF: f64 = 0.4;
pub const FALLBACK_CUTOFF: f64 = 0.9;
const MAX_NOTES: usize = 25;

/// Damerau-Levenshtein (optimal string alignment) distance over chars.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut matrix = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for (i, row) in matrix.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=b.len() {
        matrix[0][j] = j;
    }

    for i in 1..=a.len() {
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            let mut best = (matrix[i - 1][j] + 1)
                .min(matrix[i][j - 1] + 1)
                .min(matrix[i - 1][j - 1] + cost);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                best = best.min(matrix[i - 2][j - 2] + 1);
            }
            matrix[i][j] = best;
        }
    }

    matrix[a.len()][b.len()]
}

/// Case-insensitive similarity in `0.0..=1.0`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - edit_distance(&a, &b) as f64 / longest as f64
}

/// Up to `limit` candidates scoring at least `cutoff`, best first.
pub fn close_matches<'a, I>(query: &str, candidates: I, limit: usize, cutoff: f64) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut scored: Vec<(f64, &String)> = candidates
        .into_iter()
        .map(|candidate| (similarity(query, candidate), candidate))
        .filter(|(score, _)| *score >= cutoff)
        .collect();
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.cmp(b.1))
    });
    scored
        .into_iter()
        .take(limit)
        .map(|(_, candidate)| candidate.clone())
        .collect()
}

/// Close matches plus every candidate containing the query.
pub fn shortlist(query: &str, candidates: &HashSet<String>) -> Vec<String> {
    let mut list = close_matches(query, candidates, SHORTLIST_SIZE, SHORTLIST_CUTOFF);
    let needle = query.to_lowercase();
    let mut containing: Vec<&String> = candidates
        .iter()
        .filter(|candidate| candidate.to_lowercase().contains(&needle))
        .filter(|candidate| !list.contains(*candidate))
        .collect();
    containing.sort();
    list.extend(containing.into_iter().cloned());
    list
}

fn cache_key(query: &str, candidates: &HashSet<String>) -> (u64, u64) {
    let ordered: BTreeSet<&String> = candidates.iter().collect();
    let mut set_hasher = DefaultHasher::new();
    ordered.hash(&mut set_hasher);
    let mut query_hasher = DefaultHasher::new();
    query.hash(&mut query_hasher);
    (set_hasher.finish(), query_hasher.finish())
}

fn disambiguation_prompt(values: &[String]) -> String {
    format!(
        "I'll give you just a string value. You will figure out what value in this list \
represents it best: {}\n\
Keep in mind that the given string value can be misspelled or have missing words, as it \
comes from a speech to text process.\n\
You must only return the value of the closest match from the list above, nothing else.\n\
For example, if \"Hercules A2\" is given and the list contains \"A2, C2, M2\", return \"A2\".\n\
If \"C2\" is given and the list contains \"A2 Hercules Star Lifter, C2 Hercules Star Lifter\", \
return \"C2 Hercules Star Lifter\".\n\
If no value in the list fits, return \"None\".",
        values.join(", ")
    )
}

/// Fuzzy resolver with a per-session resolution cache.
pub struct NameResolver {
    llm: Option<Arc<dyn ChatCompletion>>,
    cache: HashMap<(u64, u64), String>,
    notes: Vec<String>,
}

impl NameResolver {
    pub fn new(llm: Option<Arc<dyn ChatCompletion>>) -> Self {
        Self {
            llm,
            cache: HashMap::new(),
            notes: Vec::new(),
        }
    }

    /// Resolve `query` to one of `candidates`, or `None` when nothing fits.
    pub async fn resolve(
        &mut self,
        query: Option<&str>,
        candidates: &HashSet<String>,
    ) -> Option<String> {
        let query = query.map(str::trim).filter(|q| !q.is_empty() && *q != "None")?;

        if candidates.contains(query) {
            return Some(query.to_string());
        }

        let key = cache_key(query, candidates);
        if let Some(hit) = self.cache.get(&key) {
            debug!(query, resolved = %hit, "name resolution served from cache");
            return Some(hit.clone());
        }

        let shortlist = shortlist(query, candidates);
        if shortlist.is_empty() {
            debug!(query, "no candidates resemble query");
            return None;
        }

        let resolved = match self.ask_llm(query, &shortlist).await {
            Some(answer) => answer,
            None => {
                let fallback = close_matches(query, &shortlist, 1, FALLBACK_CUTOFF)
                    .into_iter()
                    .next();
                debug!(query, fallback = ?fallback, "using similarity fallback");
                fallback
            }
        }?;

        self.cache.insert(key, resolved.clone());
        self.remember_correction(query, &resolved);
        Some(resolved)
    }

    /// `None` when the collaborator is unavailable; `Some(None)` when it
    /// answered but nothing matched.
    async fn ask_llm(&self, query: &str, shortlist: &[String]) -> Option<Option<String>> {
        let llm = self.llm.as_ref()?;

        let mut messages = vec![ChatMessage::system(disambiguation_prompt(shortlist))];
        if !self.notes.is_empty() {
            messages.push(ChatMessage::system(format!(
                "Earlier corrections in this conversation: {}",
                self.notes.join(" ")
            )));
        }
        messages.push(ChatMessage::user(query));

        let answer = match llm.complete(&messages).await {
            Ok(answer) => answer,
            Err(error) => {
                warn!(query, %error, "name disambiguation unavailable");
                return None;
            }
        };
        let answer = answer.trim().trim_matches(|c| c == '"' || c == '\'').trim();
        if answer.is_empty() {
            return None;
        }
        debug!(query, answer, "llm disambiguation answered");

        if answer.eq_ignore_ascii_case("none") || answer == query {
            return Some(None);
        }
        let picked = shortlist
            .iter()
            .find(|candidate| candidate.as_str() == answer)
            .or_else(|| {
                shortlist
                    .iter()
                    .find(|candidate| candidate.eq_ignore_ascii_case(answer))
            })
            .cloned();
        Some(picked)
    }

    fn remember_correction(&mut self, query: &str, resolved: &str) {
        if query == resolved {
            return;
        }
        self.notes
            .push(format!("Instead of '{query}' use '{resolved}'."));
        if self.notes.len() > MAX_NOTES {
            let overflow = self.notes.len() - MAX_NOTES;
            self.notes.drain(..overflow);
        }
    }

    /// Corrective notes gathered so far, oldest first.
    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    #[cfg(test)]
    pub fn cached_resolutions(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use async_trait::async_trait;

    use super::*;
    use crate::infra::llm::LlmError;

    struct ScriptedLlm {
        answer: Result<String, ()>,
        calls: AtomicUsize,
        last_messages: Mutex<Vec<ChatMessage>>,
    }

    impl ScriptedLlm {
        fn answering(answer: &str) -> Arc<Self> {
            Arc::new(Self {
                answer: Ok(answer.to_string()),
                calls: AtomicUsize::new(0),
                last_messages: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                answer: Err(()),
                calls: AtomicUsize::new(0),
                last_messages: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatCompletion for ScriptedLlm {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_messages.lock().unwrap() = messages.to_vec();
            self.answer.clone().map_err(|_| LlmError::Empty)
        }
    }

    fn ships() -> HashSet<String> {
        ["Aurora MR", "Cutlass Black", "Caterpillar", "Hull C"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn edit_distance_counts_transpositions_once() {
        assert_eq!(edit_distance("cutlass", "cutlass"), 0);
        assert_eq!(edit_distance("cutlass", "cultass"), 1);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("hull", ""), 4);
    }

    #[test]
    fn shortlist_unions_similar_and_containing_names() {
        let list = shortlist("cutlas black", &ships());
        assert_eq!(list.first().map(String::as_str), Some("Cutlass Black"));

        let list = shortlist("hull", &ships());
        assert!(list.contains(&"Hull C".to_string()));

        assert!(shortlist("zzz_no_such_thing", &ships()).is_empty());
    }

    #[tokio::test]
    async fn exact_match_skips_llm() {
        let llm = ScriptedLlm::answering("Caterpillar");
        let mut resolver = NameResolver::new(Some(llm.clone()));
        let resolved = resolver.resolve(Some("Cutlass Black"), &ships()).await;
        assert_eq!(resolved.as_deref(), Some("Cutlass Black"));
        assert_eq!(llm.calls(), 0);
        assert!(resolver.notes().is_empty());
    }

    #[tokio::test]
    async fn none_token_means_no_filter() {
        let llm = ScriptedLlm::answering("Hull C");
        let mut resolver = NameResolver::new(Some(llm.clone()));
        assert_eq!(resolver.resolve(None, &ships()).await, None);
        assert_eq!(resolver.resolve(Some("None"), &ships()).await, None);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn unrelated_query_yields_none() {
        let llm = ScriptedLlm::answering("None");
        let mut resolver = NameResolver::new(Some(llm.clone()));
        let candidates: HashSet<String> =
            ["Aurora", "Cutlass"].into_iter().map(String::from).collect();
        assert_eq!(
            resolver.resolve(Some("zzz_no_such_thing"), &candidates).await,
            None
        );
    }

    #[tokio::test]
    async fn llm_pick_is_cached_and_noted() {
        let llm = ScriptedLlm::answering("Cutlass Black");
        let mut resolver = NameResolver::new(Some(llm.clone()));

        let first = resolver.resolve(Some("cutlas blak"), &ships()).await;
        let second = resolver.resolve(Some("cutlas blak"), &ships()).await;

        assert_eq!(first.as_deref(), Some("Cutlass Black"));
        assert_eq!(second, first);
        assert_eq!(llm.calls(), 1);
        assert_eq!(resolver.cached_resolutions(), 1);
        assert_eq!(
            resolver.notes(),
            ["Instead of 'cutlas blak' use 'Cutlass Black'.".to_string()]
        );
    }

    #[tokio::test]
    async fn notes_are_sent_with_the_next_request() {
        let llm = ScriptedLlm::answering("Cutlass Black");
        let mut resolver = NameResolver::new(Some(llm.clone()));
        resolver.resolve(Some("cutlas blak"), &ships()).await;
        resolver.resolve(Some("cutlass blck"), &ships()).await;

        let messages = llm.last_messages.lock().unwrap().clone();
        assert!(messages
            .iter()
            .any(|m| m.content.contains("Instead of 'cutlas blak'")));
    }

    #[tokio::test]
    async fn echoed_or_foreign_answers_are_rejected() {
        let echo = ScriptedLlm::answering("cutlas blak");
        let mut resolver = NameResolver::new(Some(echo));
        assert_eq!(resolver.resolve(Some("cutlas blak"), &ships()).await, None);

        let foreign = ScriptedLlm::answering("Constellation Andromeda");
        let mut resolver = NameResolver::new(Some(foreign));
        assert_eq!(resolver.resolve(Some("cutlas blak"), &ships()).await, None);
        assert_eq!(resolver.cached_resolutions(), 0);
    }

    #[tokio::test]
    async fn unavailable_llm_falls_back_to_strict_similarity() {
        let llm = ScriptedLlm::failing();
        let mut resolver = NameResolver::new(Some(llm.clone()));

        // one edit in eleven characters clears the strict cutoff
        let close = resolver.resolve(Some("caterpilar"), &ships()).await;
        assert_eq!(close.as_deref(), Some("Caterpillar"));

        let loose = resolver.resolve(Some("cutlas blak"), &ships()).await;
        assert_eq!(loose, None);
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn case_only_difference_resolves_without_llm() {
        let mut resolver = NameResolver::new(None);
        let resolved = resolver.resolve(Some("hull c"), &ships()).await;
        assert_eq!(resolved.as_deref(), Some("Hull C"));
    }
}
