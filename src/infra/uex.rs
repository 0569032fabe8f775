//! Thin asynchronous client for the UEX Corp data API.
//!
//! - One GET per endpoint, unwrapped from the `{status, data}` envelope.
//! - Records are mapped into catalog entities; provider quirks (numbers as
//!   strings, `0`/`1` flags, empty price maps sent as `[]`) are absorbed here.

use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{
    City, Commodity, Planet, PriceEntry, RawCatalog, Satellite, Ship, ShopLocation, StarSystem,
    TradeOperation, Tradeport,
};

pub const DEFAULT_BASE_URL: &str = "https://portal.uexcorp.space/api/";
const USER_AGENT: &str = concat!("uex-trader/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum UexClientError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("http request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("api error: {0}")]
    Api(String),
}

/// Whatever can hand over a full catalog or just fresh tradeport prices.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_catalog(&self) -> Result<RawCatalog, UexClientError>;

    /// Tradeports only; these carry the prices.
    async fn fetch_tradeports(&self) -> Result<Vec<Tradeport>, UexClientError>;
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    status: String,
    #[serde(default)]
    code: Option<u16>,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    fn into_data(self) -> Result<T, UexClientError> {
        let ApiEnvelope {
            status,
            code,
            data,
            message,
        } = self;

        if status.eq_ignore_ascii_case("ok") {
            data.ok_or_else(|| UexClientError::Api("response missing data".into()))
        } else {
            let detail = message.unwrap_or(status);
            Err(UexClientError::Api(match code {
                Some(code) => format!("{code}: {detail}"),
                None => detail,
            }))
        }
    }
}

#[derive(Clone)]
pub struct UexClient {
    http: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl UexClient {
    pub fn with_base_url(
        base: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, UexClientError> {
        let base_url = Url::parse(base)?;
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url,
            api_key: api_key.filter(|key| !key.is_empty()),
        })
    }

    async fn get<T>(&self, path: &str) -> Result<T, UexClientError>
    where
        T: DeserializeOwned,
    {
        let url = self.base_url.join(path)?;
        debug!(%url, "requesting UEX data");
        let mut request = self.http.get(url);
        if let Some(key) = &self.api_key {
            request = request.header("api_key", key);
        }
        let response = request.send().await?.error_for_status()?;
        let envelope: ApiEnvelope<T> = response.json().await?;
        envelope.into_data()
    }

    async fn ships(&self) -> Result<Vec<Ship>, UexClientError> {
        let dtos: Vec<ShipDto> = self.get("ships").await?;
        Ok(dtos.into_iter().map(Ship::from).collect())
    }

    async fn commodities(&self) -> Result<Vec<Commodity>, UexClientError> {
        let dtos: Vec<CommodityDto> = self.get("commodities").await?;
        Ok(dtos.into_iter().map(Commodity::from).collect())
    }

    async fn systems(&self) -> Result<Vec<StarSystem>, UexClientError> {
        let dtos: Vec<LocationDto> = self.get("star_systems").await?;
        Ok(dtos
            .into_iter()
            .map(|dto| StarSystem {
                code: dto.code,
                name: dto.name,
            })
            .collect())
    }

    async fn planets(&self) -> Result<Vec<Planet>, UexClientError> {
        let dtos: Vec<LocationDto> = self.get("planets").await?;
        Ok(dtos
            .into_iter()
            .map(|dto| Planet {
                code: dto.code,
                name: dto.name,
                system: dto.system,
            })
            .collect())
    }

    async fn satellites(&self) -> Result<Vec<Satellite>, UexClientError> {
        let dtos: Vec<LocationDto> = self.get("satellites").await?;
        Ok(dtos
            .into_iter()
            .map(|dto| Satellite {
                code: dto.code,
                name: dto.name,
                system: dto.system,
                planet: dto.planet,
            })
            .collect())
    }

    async fn cities(&self) -> Result<Vec<City>, UexClientError> {
        let dtos: Vec<LocationDto> = self.get("cities").await?;
        Ok(dtos
            .into_iter()
            .map(|dto| City {
                code: dto.code,
                name: dto.name,
                system: dto.system,
                planet: dto.planet,
            })
            .collect())
    }
}

#[async_trait]
impl CatalogSource for UexClient {
    async fn fetch_catalog(&self) -> Result<RawCatalog, UexClientError> {
        let (ships, commodities, systems, planets, satellites, cities, tradeports) = tokio::try_join!(
            self.ships(),
            self.commodities(),
            self.systems(),
            self.planets(),
            self.satellites(),
            self.cities(),
            self.fetch_tradeports(),
        )?;

        info!(
            ships = ships.len(),
            commodities = commodities.len(),
            tradeports = tradeports.len(),
            "fetched UEX catalog"
        );

        Ok(RawCatalog {
            ships,
            commodities,
            systems,
            planets,
            satellites,
            cities,
            tradeports,
        })
    }

    async fn fetch_tradeports(&self) -> Result<Vec<Tradeport>, UexClientError> {
        let dtos: Vec<TradeportDto> = self.get("tradeports").await?;
        Ok(dtos.into_iter().map(Tradeport::from).collect())
    }
}

#[derive(Debug, Deserialize)]
struct ShopLocationDto {
    #[serde(default)]
    system: Option<String>,
    #[serde(default)]
    planet: Option<String>,
    #[serde(default)]
    satellite: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    store: Option<String>,
    #[serde(default, deserialize_with = "f64_from_json")]
    price: Option<f64>,
}

impl From<ShopLocationDto> for ShopLocation {
    fn from(dto: ShopLocationDto) -> Self {
        Self {
            system: non_empty(dto.system),
            planet: non_empty(dto.planet),
            satellite: non_empty(dto.satellite),
            city: non_empty(dto.city),
            store: non_empty(dto.store),
            price: dto.price,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ShipDto {
    #[serde(deserialize_with = "string_from_json")]
    code: String,
    name: String,
    #[serde(default)]
    manufacturer: Option<String>,
    #[serde(default, deserialize_with = "f64_from_json")]
    scu: Option<f64>,
    #[serde(default, deserialize_with = "f64_from_json")]
    price: Option<f64>,
    #[serde(default)]
    career: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default, deserialize_with = "list_or_empty")]
    buy_at: Vec<ShopLocationDto>,
    #[serde(default, deserialize_with = "list_or_empty")]
    rent_at: Vec<ShopLocationDto>,
}

impl From<ShipDto> for Ship {
    fn from(dto: ShipDto) -> Self {
        Self {
            code: dto.code,
            name: dto.name,
            manufacturer: non_empty(dto.manufacturer),
            scu: dto.scu.filter(|scu| *scu > 0.0).map(|scu| scu as u64).unwrap_or(0),
            price: dto.price.filter(|price| *price > 0.0),
            career: non_empty(dto.career),
            role: non_empty(dto.role),
            buy_at: dto.buy_at.into_iter().map(ShopLocation::from).collect(),
            rent_at: dto.rent_at.into_iter().map(ShopLocation::from).collect(),
            hull_trading: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CommodityDto {
    #[serde(deserialize_with = "string_from_json")]
    code: String,
    name: String,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default, deserialize_with = "bool_from_json")]
    illegal: bool,
    #[serde(default, alias = "price_buy", deserialize_with = "f64_from_json")]
    trade_price_buy: Option<f64>,
    #[serde(default, alias = "price_sell", deserialize_with = "f64_from_json")]
    trade_price_sell: Option<f64>,
    #[serde(default, deserialize_with = "bool_from_json")]
    minable: bool,
    #[serde(default, deserialize_with = "bool_from_json")]
    refinable: bool,
}

impl From<CommodityDto> for Commodity {
    fn from(dto: CommodityDto) -> Self {
        Self {
            code: dto.code,
            name: dto.name,
            kind: non_empty(dto.kind),
            illegal: dto.illegal,
            price_buy: dto.trade_price_buy.filter(|price| *price > 0.0),
            price_sell: dto.trade_price_sell.filter(|price| *price > 0.0),
            minable: dto.minable,
            refinable: dto.refinable,
        }
    }
}

/// Shared shape of systems, planets, satellites and cities.
#[derive(Debug, Deserialize)]
struct LocationDto {
    #[serde(deserialize_with = "string_from_json")]
    code: String,
    name: String,
    #[serde(default)]
    system: Option<String>,
    #[serde(default)]
    planet: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PriceDto {
    #[serde(default)]
    commodity_code: Option<String>,
    #[serde(default)]
    operation: Option<String>,
    #[serde(default, deserialize_with = "f64_from_json")]
    price_buy: Option<f64>,
    #[serde(default, deserialize_with = "f64_from_json")]
    price_sell: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TradeportDto {
    #[serde(deserialize_with = "string_from_json")]
    code: String,
    name: String,
    #[serde(default)]
    system: Option<String>,
    #[serde(default)]
    planet: Option<String>,
    #[serde(default)]
    satellite: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default, deserialize_with = "bool_from_json")]
    armistice: bool,
    #[serde(default, deserialize_with = "bool_from_json")]
    outlaw: bool,
    #[serde(default, deserialize_with = "bool_from_json")]
    restricted: bool,
    #[serde(default, deserialize_with = "bool_from_json")]
    refinery: bool,
    #[serde(default, deserialize_with = "prices_from_json")]
    prices: BTreeMap<String, PriceDto>,
}

impl From<TradeportDto> for Tradeport {
    fn from(dto: TradeportDto) -> Self {
        let prices = dto
            .prices
            .into_iter()
            .flat_map(|(key, price)| price_entries(key, price))
            .collect();
        Self {
            code: dto.code,
            name: dto.name,
            system: non_empty(dto.system),
            planet: non_empty(dto.planet),
            satellite: non_empty(dto.satellite),
            city: non_empty(dto.city),
            armistice: dto.armistice,
            outlaw: dto.outlaw,
            restricted: dto.restricted,
            refinery: dto.refinery,
            hull_trading: false,
            prices,
        }
    }
}

/// A slot can be buy-only, sell-only or both; each direction becomes its own entry.
fn price_entries(key: String, dto: PriceDto) -> Vec<PriceEntry> {
    let code = dto.commodity_code.filter(|code| !code.is_empty()).unwrap_or(key);
    let operation = dto.operation.unwrap_or_default().to_lowercase();
    let wants_buy = operation.is_empty() || operation.contains("buy");
    let wants_sell = operation.is_empty() || operation.contains("sell");

    let mut entries = Vec::with_capacity(2);
    if let Some(price) = dto.price_buy.filter(|price| wants_buy && *price > 0.0) {
        entries.push(PriceEntry {
            commodity_code: code.clone(),
            operation: TradeOperation::Buy,
            price,
        });
    }
    if let Some(price) = dto.price_sell.filter(|price| wants_sell && *price > 0.0) {
        entries.push(PriceEntry {
            commodity_code: code,
            operation: TradeOperation::Sell,
            price,
        });
    }
    entries
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn string_from_json<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct StringOrNumber;

    impl<'de> serde::de::Visitor<'de> for StringOrNumber {
        type Value = String;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or number")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value)
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }
    }

    deserializer.deserialize_any(StringOrNumber)
}

/// Numbers arrive as JSON numbers, numeric strings, empty strings or null.
fn f64_from_json<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct LenientNumber;

    impl<'de> serde::de::Visitor<'de> for LenientNumber {
        type Value = Option<f64>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a number, numeric string or null")
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Some(value).filter(|v| v.is_finite()))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Some(value as f64))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Some(value as f64))
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(LenientNumber)
}

/// Flags arrive as booleans, `0`/`1` or `"0"`/`"1"`.
fn bool_from_json<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct LenientFlag;

    impl<'de> serde::de::Visitor<'de> for LenientFlag {
        type Value = bool;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a boolean, 0/1 or null")
        }

        fn visit_bool<E>(self, value: bool) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value)
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value != 0)
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value != 0)
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes"
            ))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(false)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(false)
        }
    }

    deserializer.deserialize_any(LenientFlag)
}

/// A list, or null/empty object standing in for "none".
fn list_or_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Array(_) => serde_json::from_value(value).map_err(serde::de::Error::custom),
        _ => Ok(Vec::new()),
    }
}

/// Prices come keyed by commodity code, or as `[]` when a tradeport has none.
fn prices_from_json<'de, D>(deserializer: D) -> Result<BTreeMap<String, PriceDto>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Object(_) => {
            serde_json::from_value(value).map_err(serde::de::Error::custom)
        }
        serde_json::Value::Array(items) => {
            let mut prices = BTreeMap::new();
            for (index, item) in items.into_iter().enumerate() {
                let price: PriceDto =
                    serde_json::from_value(item).map_err(serde::de::Error::custom)?;
                // listed entries are only usable when they name their commodity
                let Some(code) = price.commodity_code.clone() else {
                    continue;
                };
                prices.insert(format!("{index:05}-{code}"), price);
            }
            Ok(prices)
        }
        _ => Ok(BTreeMap::new()),
    }
}
