//! The UEX Corp trading skill: one session of tool calls over a shared
//! catalog snapshot.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{
    domain::{
        find_locations, find_routes, ArgumentCache, Blacklist, Catalog, CatalogHandle, EntityKind,
        NameResolver, RawCatalog, ReadableCache, RouteQuery, TradeOperation,
    },
    infra::{
        cache::{default_cache_path, load_catalog_cache, save_catalog_cache, CatalogCache},
        llm::ChatCompletion,
        uex::{CatalogSource, UexClientError},
    },
    util::config::SkillConfig,
};

/// Parameters remembered between calls so follow-up questions can omit them.
const STICKY_PARAMS: [&str; 5] = [
    "ship_name",
    "position_start_name",
    "money_to_spend",
    "free_cargo_space",
    "illegal_commodities_allowed",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tool {
    GetTradingRoutes,
    GetLocationsToSellTo,
    GetLocationsToBuyFrom,
    GetLocationInformation,
    GetShipInformation,
    GetCommodityInformation,
    ReloadCurrentCommodityPrices,
}

impl Tool {
    pub const ALL: [Tool; 7] = [
        Tool::GetTradingRoutes,
        Tool::GetLocationsToSellTo,
        Tool::GetLocationsToBuyFrom,
        Tool::GetLocationInformation,
        Tool::GetShipInformation,
        Tool::GetCommodityInformation,
        Tool::ReloadCurrentCommodityPrices,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Tool::GetTradingRoutes => "get_trading_routes",
            Tool::GetLocationsToSellTo => "get_locations_to_sell_to",
            Tool::GetLocationsToBuyFrom => "get_locations_to_buy_from",
            Tool::GetLocationInformation => "get_location_information",
            Tool::GetShipInformation => "get_ship_information",
            Tool::GetCommodityInformation => "get_commodity_information",
            Tool::ReloadCurrentCommodityPrices => "reload_current_commodity_prices",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }
}

/// What goes back to the orchestrator. `instant_response` is never used by
/// this skill and stays empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ToolResponse {
    pub function_response: String,
    pub instant_response: String,
}

impl ToolResponse {
    fn text(function_response: impl Into<String>) -> Self {
        Self {
            function_response: function_response.into(),
            instant_response: String::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SkillError {
    #[error("could not load the UEX catalog: {0}")]
    Catalog(#[from] UexClientError),
    #[error("could not encode tool output: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct UexCorpSkill {
    config: SkillConfig,
    catalog: CatalogHandle,
    source: Arc<dyn CatalogSource>,
    /// `None` when the disk cache is disabled.
    cache_path: Option<PathBuf>,
    resolver: NameResolver,
    readable: ReadableCache,
    arguments: ArgumentCache,
    seen_generation: u64,
}

impl UexCorpSkill {
    /// Load the catalog from the disk cache when fresh, otherwise from the
    /// source. A stale cache still beats no catalog when the source is down.
    pub async fn start(
        config: SkillConfig,
        source: Arc<dyn CatalogSource>,
        llm: Option<Arc<dyn ChatCompletion>>,
    ) -> Result<Self, SkillError> {
        let cache_path = config
            .cache_enabled
            .then(|| config.cache_path.clone().unwrap_or_else(default_cache_path));
        let ttl = config.cache_ttl();

        let raw = match cache_path.as_deref().and_then(load_catalog_cache) {
            Some(cache) if cache.is_usable(ttl) => {
                info!(age = %cache.age_string(), "using cached UEX catalog");
                cache.catalog
            }
            stale => match source.fetch_catalog().await {
                Ok(raw) => {
                    if let Some(path) = &cache_path {
                        persist_catalog(path.clone(), raw.clone()).await;
                    }
                    raw
                }
                Err(error) => match stale {
                    Some(cache) => {
                        warn!(%error, age = %cache.age_string(), "UEX unreachable, using stale catalog cache");
                        cache.catalog
                    }
                    None => return Err(error.into()),
                },
            },
        };

        Ok(Self::with_catalog(
            config,
            source,
            llm,
            Catalog::load(raw),
            cache_path,
        ))
    }

    pub fn with_catalog(
        config: SkillConfig,
        source: Arc<dyn CatalogSource>,
        llm: Option<Arc<dyn ChatCompletion>>,
        catalog: Catalog,
        cache_path: Option<PathBuf>,
    ) -> Self {
        let seen_generation = catalog.generation();
        Self {
            config,
            catalog: CatalogHandle::new(catalog),
            source,
            cache_path,
            resolver: NameResolver::new(llm),
            readable: ReadableCache::new(),
            arguments: ArgumentCache::new(),
            seen_generation,
        }
    }

    /// Corrective name notes for the outer conversation, oldest first.
    pub fn notes(&self) -> &[String] {
        self.resolver.notes()
    }

    /// Run one tool. Every outcome, failures included, is a plain string.
    pub async fn execute_tool(&mut self, name: &str, params: &Map<String, Value>) -> ToolResponse {
        self.sync_generation();

        let Some(tool) = Tool::from_name(name) else {
            warn!(tool = name, "unknown tool requested");
            return ToolResponse::text(format!("Unknown function '{name}'."));
        };

        let shown = Value::Object(params.clone());
        debug!(tool = name, params = %shown, "executing tool");
        match self.dispatch(tool, params).await {
            Ok(text) => ToolResponse::text(text),
            Err(err) => {
                let timestamp = OffsetDateTime::now_utc()
                    .format(&Rfc3339)
                    .unwrap_or_else(|_| "unknown".to_string());
                error!(
                    tool = name,
                    params = %shown,
                    %timestamp,
                    error = %err,
                    "tool execution failed"
                );
                ToolResponse::text(format!(
                    "Error while executing {name}. Please try again later."
                ))
            }
        }
    }

    async fn dispatch(
        &mut self,
        tool: Tool,
        params: &Map<String, Value>,
    ) -> Result<String, SkillError> {
        match tool {
            Tool::GetTradingRoutes => self.trading_routes(params).await,
            Tool::GetLocationsToSellTo => self.locations(params, TradeOperation::Sell).await,
            Tool::GetLocationsToBuyFrom => self.locations(params, TradeOperation::Buy).await,
            Tool::GetLocationInformation => self.location_information(params).await,
            Tool::GetShipInformation => self.entity_information(params, EntityKind::Ship).await,
            Tool::GetCommodityInformation => {
                self.entity_information(params, EntityKind::Commodity).await
            }
            Tool::ReloadCurrentCommodityPrices => Ok(self.reload_prices().await),
        }
    }

    async fn trading_routes(&mut self, params: &Map<String, Value>) -> Result<String, SkillError> {
        let catalog = self.catalog.snapshot();
        let mut unclear = Vec::new();

        let ship_raw = self.argument(params, "ship_name");
        let ship = self
            .resolve_param("ship_name", ship_raw, &catalog.ship_names(), &mut unclear)
            .await;
        let start_raw = self.argument(params, "position_start_name");
        let start = self
            .resolve_param(
                "position_start_name",
                start_raw,
                &catalog.location_names(),
                &mut unclear,
            )
            .await;
        let end_raw = self.argument(params, "position_end_name");
        let end = self
            .resolve_param(
                "position_end_name",
                end_raw,
                &catalog.location_names(),
                &mut unclear,
            )
            .await;
        let commodity_raw = self.argument(params, "commodity_name");
        let commodity = self
            .resolve_param(
                "commodity_name",
                commodity_raw,
                &catalog.commodity_names(),
                &mut unclear,
            )
            .await;

        let money = number_param(self.argument(params, "money_to_spend").as_ref());
        let free_cargo = number_param(self.argument(params, "free_cargo_space").as_ref());
        let illegal_allowed =
            bool_param(self.argument(params, "illegal_commodities_allowed").as_ref());
        let max_routes = number_param(params.get("maximal_number_of_routes"));

        self.remember("ship_name", ship.clone().map(Value::from));
        self.remember("position_start_name", start.clone().map(Value::from));
        self.remember("money_to_spend", money.map(Value::from));
        self.remember("free_cargo_space", free_cargo.map(Value::from));
        self.remember("illegal_commodities_allowed", illegal_allowed.map(Value::from));

        if !unclear.is_empty() {
            return Ok(not_understood(&unclear));
        }

        let mut missing = Vec::new();
        if ship.is_none() {
            missing.push("ship_name");
        }
        if money.is_none() {
            missing.push("money_to_spend");
        }
        if start.is_none() && self.config.tradestart_mandatory {
            missing.push("position_start_name");
        }
        if !missing.is_empty() {
            return Ok(missing_params(&missing));
        }

        let Some(ship) = ship.as_deref().and_then(|name| catalog.ships.by_name(name)) else {
            return Ok(missing_params(&["ship_name"]));
        };
        let commodity = commodity
            .as_deref()
            .and_then(|name| catalog.commodities.by_name(name));

        let query = RouteQuery {
            ship,
            start: start.as_deref(),
            end: end.as_deref(),
            commodity,
            budget: money.map(|money| money.floor() as i64).unwrap_or(0),
            free_cargo: free_cargo.map(|cargo| cargo.max(0.0).floor() as u64),
            illegal_allowed: illegal_allowed.unwrap_or(true),
            max_routes: max_routes
                .map(|n| n.max(1.0) as usize)
                .unwrap_or(self.config.default_route_count),
            summarize_by_commodity: self.config.summarize_routes_by_commodity,
        };
        let blacklist = Blacklist::resolve(&catalog, &self.config.trade_blacklist);

        match find_routes(&catalog, &query, &blacklist) {
            Ok(routes) => {
                info!(ship = %ship.name, routes = routes.len(), "trade routes found");
                let readable: Vec<Value> = routes
                    .iter()
                    .map(|route| route.to_readable(&catalog))
                    .collect();
                Ok(serde_json::to_string(&readable)?)
            }
            Err(reason) => {
                debug!(%reason, "no trade route");
                Ok(reason.to_string())
            }
        }
    }

    async fn locations(
        &mut self,
        params: &Map<String, Value>,
        operation: TradeOperation,
    ) -> Result<String, SkillError> {
        let catalog = self.catalog.snapshot();
        let mut unclear = Vec::new();

        let commodity_raw = self.argument(params, "commodity_name");
        if text_param(commodity_raw.as_ref()).is_none() {
            return Ok(missing_params(&["commodity_name"]));
        }
        let commodity = self
            .resolve_param(
                "commodity_name",
                commodity_raw,
                &catalog.commodity_names(),
                &mut unclear,
            )
            .await;
        let ship_raw = self.argument(params, "ship_name");
        let ship = self
            .resolve_param("ship_name", ship_raw, &catalog.ship_names(), &mut unclear)
            .await;
        let position_raw = self.argument(params, "position_name");
        let position = self
            .resolve_param(
                "position_name",
                position_raw,
                &catalog.location_names(),
                &mut unclear,
            )
            .await;
        self.remember("ship_name", ship.clone().map(Value::from));

        if !unclear.is_empty() {
            return Ok(not_understood(&unclear));
        }
        let Some(commodity) = commodity
            .as_deref()
            .and_then(|name| catalog.commodities.by_name(name))
        else {
            return Ok(missing_params(&["commodity_name"]));
        };
        let ship = ship.as_deref().and_then(|name| catalog.ships.by_name(name));
        let amount = number_param(params.get("commodity_amount"))
            .filter(|amount| *amount >= 1.0)
            .map(|amount| amount.floor() as u64);
        let limit = number_param(params.get("maximal_number_of_locations"))
            .map(|n| n.max(1.0) as usize)
            .unwrap_or(self.config.default_location_count);
        let blacklist = Blacklist::resolve(&catalog, &self.config.trade_blacklist);

        match find_locations(
            &catalog,
            commodity,
            operation,
            ship,
            position.as_deref(),
            &blacklist,
            limit,
        ) {
            Ok(offers) => {
                let readable: Vec<Value> = offers
                    .iter()
                    .map(|offer| offer.to_readable(&catalog, amount))
                    .collect();
                Ok(serde_json::to_string(&readable)?)
            }
            Err(reason) => Ok(reason.to_string()),
        }
    }

    async fn location_information(
        &mut self,
        params: &Map<String, Value>,
    ) -> Result<String, SkillError> {
        let catalog = self.catalog.snapshot();
        let name = match self
            .required_name(params, "location_name", &catalog.location_names())
            .await
        {
            Ok(name) => name,
            Err(message) => return Ok(message),
        };
        let Some(entity) = catalog.lookup_location(&name) else {
            return Ok(not_understood(&[format!("location_name '{name}'")]));
        };
        Ok(serde_json::to_string(&self.readable.render(&catalog, entity))?)
    }

    async fn entity_information(
        &mut self,
        params: &Map<String, Value>,
        kind: EntityKind,
    ) -> Result<String, SkillError> {
        let catalog = self.catalog.snapshot();
        let (key, candidates) = match kind {
            EntityKind::Ship => ("ship_name", catalog.ship_names()),
            _ => ("commodity_name", catalog.commodity_names()),
        };
        let name = match self.required_name(params, key, &candidates).await {
            Ok(name) => name,
            Err(message) => return Ok(message),
        };
        let Some(entity) = catalog.lookup_by_name(kind, &name) else {
            return Ok(not_understood(&[format!("{key} '{name}'")]));
        };
        Ok(serde_json::to_string(&self.readable.render(&catalog, entity))?)
    }

    /// Fetch fresh prices, swap the snapshot and start over with empty caches.
    pub async fn reload_prices(&mut self) -> String {
        match refresh_prices(&self.catalog, self.source.as_ref(), self.cache_path.as_deref()).await
        {
            Ok(catalog) => {
                self.clear_caches();
                self.seen_generation = catalog.generation();
                "Successfully reloaded the current commodity prices from UEX.".to_string()
            }
            Err(error) => {
                warn!(%error, "price reload failed");
                "Could not reload the commodity prices from UEX. The previous prices are still in use."
                    .to_string()
            }
        }
    }

    /// Periodically reload prices in the background. The session notices the
    /// new snapshot on its next call.
    pub fn spawn_price_refresh(&self, interval: Duration) -> JoinHandle<()> {
        let handle = self.catalog.clone();
        let source = Arc::clone(&self.source);
        let cache_path = self.cache_path.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(error) =
                    refresh_prices(&handle, source.as_ref(), cache_path.as_deref()).await
                {
                    warn!(%error, "background price refresh failed");
                }
            }
        })
    }

    fn sync_generation(&mut self) {
        let generation = self.catalog.snapshot().generation();
        if generation != self.seen_generation {
            debug!(
                from = self.seen_generation,
                to = generation,
                "catalog replaced, clearing session caches"
            );
            self.clear_caches();
            self.seen_generation = generation;
        }
    }

    fn clear_caches(&mut self) {
        self.resolver.clear_cache();
        self.readable.clear();
        self.arguments.clear();
    }

    /// The provided value, or the remembered one for `"current"`/omitted.
    /// An explicit `"None"` asks for no filter and forgets the remembered one.
    fn argument(&mut self, params: &Map<String, Value>, name: &str) -> Option<Value> {
        let provided = params.get(name).cloned();
        if provided.as_ref().is_some_and(is_none_literal) {
            self.arguments.set(name, None);
            return None;
        }
        self.arguments.get(name, provided)
    }

    /// Only sticky parameters are kept, and only values that made sense.
    fn remember(&mut self, name: &str, value: Option<Value>) {
        if value.is_some() && STICKY_PARAMS.contains(&name) {
            self.arguments.set(name, value);
        }
    }

    async fn resolve_param(
        &mut self,
        key: &str,
        raw: Option<Value>,
        candidates: &HashSet<String>,
        unclear: &mut Vec<String>,
    ) -> Option<String> {
        let query = text_param(raw.as_ref())?;
        let resolved = self.resolver.resolve(Some(&query), candidates).await;
        if resolved.is_none() {
            unclear.push(format!("{key} '{query}'"));
        }
        resolved
    }

    async fn required_name(
        &mut self,
        params: &Map<String, Value>,
        key: &str,
        candidates: &HashSet<String>,
    ) -> Result<String, String> {
        let Some(query) = text_param(params.get(key)) else {
            return Err(missing_params(&[key]));
        };
        self.resolver
            .resolve(Some(&query), candidates)
            .await
            .ok_or_else(|| not_understood(&[format!("{key} '{query}'")]))
    }
}

/// Build the next snapshot from fresh tradeports and the current static tables.
async fn refresh_prices(
    handle: &CatalogHandle,
    source: &dyn CatalogSource,
    cache_path: Option<&Path>,
) -> Result<Arc<Catalog>, UexClientError> {
    let tradeports = source.fetch_tradeports().await?;
    let next = handle.snapshot().with_tradeports(tradeports);

    if let Some(path) = cache_path {
        persist_catalog(path.to_path_buf(), next.to_raw()).await;
    }

    handle.swap(next);
    let current = handle.snapshot();
    info!(
        tradeports = current.tradeports.len(),
        generation = current.generation(),
        "commodity prices reloaded"
    );
    Ok(current)
}

/// Writes the catalog cache on the blocking pool.
async fn persist_catalog(path: PathBuf, raw: RawCatalog) {
    let cache = CatalogCache::new(raw);
    match tokio::task::spawn_blocking(move || save_catalog_cache(&path, &cache)).await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => warn!(%error, "failed to save catalog cache"),
        Err(error) => warn!(%error, "catalog cache writer did not finish"),
    }
}

fn missing_params(names: &[&str]) -> String {
    format!(
        "Missing required information: {}. Ask the user to provide it.",
        names.join(", ")
    )
}

fn not_understood(items: &[String]) -> String {
    format!(
        "Could not find a match for {}. Ask the user to repeat or clarify it.",
        items.join(" and ")
    )
}

/// `"None"` is how the assistant says "no filter".
fn is_none_literal(value: &Value) -> bool {
    matches!(value, Value::String(text) if text.trim() == "None")
}

fn text_param(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) => Some(text.trim().to_string())
            .filter(|text| !text.is_empty() && text != "None"),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// JSON numbers or numeric strings such as `"25,000"`.
fn number_param(value: Option<&Value>) -> Option<f64> {
    let number = match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text
            .chars()
            .filter(|c| !matches!(c, ',' | '_' | ' '))
            .collect::<String>()
            .parse::<f64>()
            .ok(),
        _ => None,
    };
    number.filter(|number| number.is_finite())
}

fn bool_param(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => number.as_i64().map(|n| n != 0),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
