//! Sticky tool arguments: an omitted parameter reuses the last one given.

use std::collections::HashMap;

use serde_json::Value;

/// Literal the assistant sends to mean "the same as before".
pub const CURRENT: &str = "current";

#[derive(Debug, Default)]
pub struct ArgumentCache {
    values: HashMap<String, Value>,
}

impl ArgumentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `provided` unless it is missing, null or `"current"`.
    pub fn get(&self, name: &str, provided: Option<Value>) -> Option<Value> {
        match provided {
            None | Some(Value::Null) => self.values.get(name).cloned(),
            Some(Value::String(text)) if text == CURRENT => self.values.get(name).cloned(),
            Some(value) => Some(value),
        }
    }

    pub fn set(&mut self, name: &str, value: Option<Value>) {
        match value {
            Some(value) if !value.is_null() => {
                self.values.insert(name.to_string(), value);
            }
            _ => {
                self.values.remove(name);
            }
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn missing_or_current_reuses_cached_value() {
        let mut cache = ArgumentCache::new();
        cache.set("ship_name", Some(json!("Cutlass Black")));

        assert_eq!(cache.get("ship_name", None), Some(json!("Cutlass Black")));
        assert_eq!(
            cache.get("ship_name", Some(json!("current"))),
            Some(json!("Cutlass Black"))
        );
        assert_eq!(
            cache.get("ship_name", Some(json!("Hull C"))),
            Some(json!("Hull C"))
        );
        assert_eq!(cache.get("money_to_spend", None), None);
    }

    #[test]
    fn setting_none_forgets_the_value() {
        let mut cache = ArgumentCache::new();
        cache.set("free_cargo_space", Some(json!(46)));
        cache.set("free_cargo_space", None);
        assert!(cache.is_empty());
        assert_eq!(cache.get("free_cargo_space", Some(json!("current"))), None);
    }
}
