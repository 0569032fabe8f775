use std::fmt;

use serde::{Deserialize, Serialize};

/// Station names that accept Hull-class freighters at their cargo decks.
pub const HULL_TRADING_TRADEPORTS: &[&str] = &[
    "Baijini Point",
    "Everus Harbor",
    "Port Tressler",
    "Magnus Gateway",
    "Pyro Gateway",
    "Terra Gateway",
    "Seraphim Station",
];

/// Ships that can only load and unload at hull trading stations.
pub const HULL_TRADING_SHIPS: &[&str] = &["Hull C"];

/// Entity tables held by the catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Ship,
    Commodity,
    System,
    Planet,
    Satellite,
    City,
    Tradeport,
}

impl EntityKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ship => "ship",
            Self::Commodity => "commodity",
            Self::System => "system",
            Self::Planet => "planet",
            Self::Satellite => "satellite",
            Self::City => "city",
            Self::Tradeport => "tradeport",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Shared shape of every catalog record.
pub trait CatalogEntity {
    fn code(&self) -> &str;
    fn name(&self) -> &str;
}

macro_rules! catalog_entity {
    ($ty:ty) => {
        impl CatalogEntity for $ty {
            fn code(&self) -> &str {
                &self.code
            }

            fn name(&self) -> &str {
                &self.name
            }
        }
    };
}

/// Where a ship can be bought or rented.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ShopLocation {
    pub system: Option<String>,
    pub planet: Option<String>,
    pub satellite: Option<String>,
    pub city: Option<String>,
    pub store: Option<String>,
    pub price: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ship {
    pub code: String,
    pub name: String,
    pub manufacturer: Option<String>,
    pub scu: u64,
    pub price: Option<f64>,
    pub career: Option<String>,
    pub role: Option<String>,
    #[serde(default)]
    pub buy_at: Vec<ShopLocation>,
    #[serde(default)]
    pub rent_at: Vec<ShopLocation>,
    #[serde(default)]
    pub hull_trading: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Commodity {
    pub code: String,
    pub name: String,
    pub kind: Option<String>,
    pub illegal: bool,
    pub price_buy: Option<f64>,
    pub price_sell: Option<f64>,
    #[serde(default)]
    pub minable: bool,
    #[serde(default)]
    pub refinable: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StarSystem {
    pub code: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Planet {
    pub code: String,
    pub name: String,
    pub system: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Satellite {
    pub code: String,
    pub name: String,
    pub system: Option<String>,
    pub planet: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub code: String,
    pub name: String,
    pub system: Option<String>,
    pub planet: Option<String>,
}

/// API terminology is from the PLAYER perspective:
/// - `Buy` = the player buys here (spends money)
/// - `Sell` = the player sells here (receives money)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeOperation {
    Buy,
    Sell,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceEntry {
    pub commodity_code: String,
    pub operation: TradeOperation,
    pub price: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tradeport {
    pub code: String,
    pub name: String,
    pub system: Option<String>,
    pub planet: Option<String>,
    pub satellite: Option<String>,
    pub city: Option<String>,
    #[serde(default)]
    pub armistice: bool,
    #[serde(default)]
    pub outlaw: bool,
    #[serde(default)]
    pub restricted: bool,
    #[serde(default)]
    pub refinery: bool,
    #[serde(default)]
    pub hull_trading: bool,
    #[serde(default)]
    pub prices: Vec<PriceEntry>,
}

impl Tradeport {
    /// Price the player pays when buying `commodity_code` here.
    pub fn buy_price(&self, commodity_code: &str) -> Option<f64> {
        self.price_for(commodity_code, TradeOperation::Buy)
    }

    /// Price the player receives when selling `commodity_code` here.
    pub fn sell_price(&self, commodity_code: &str) -> Option<f64> {
        self.price_for(commodity_code, TradeOperation::Sell)
    }

    fn price_for(&self, commodity_code: &str, operation: TradeOperation) -> Option<f64> {
        self.prices
            .iter()
            .find(|entry| {
                entry.operation == operation
                    && entry.commodity_code.eq_ignore_ascii_case(commodity_code)
            })
            .map(|entry| entry.price)
            .filter(|price| price.is_finite() && *price > 0.0)
    }
}

catalog_entity!(Ship);
catalog_entity!(Commodity);
catalog_entity!(StarSystem);
catalog_entity!(Planet);
catalog_entity!(Satellite);
catalog_entity!(City);
catalog_entity!(Tradeport);

/// Everything the data provider returns, before indexing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCatalog {
    #[serde(default)]
    pub ships: Vec<Ship>,
    #[serde(default)]
    pub commodities: Vec<Commodity>,
    #[serde(default)]
    pub systems: Vec<StarSystem>,
    #[serde(default)]
    pub planets: Vec<Planet>,
    #[serde(default)]
    pub satellites: Vec<Satellite>,
    #[serde(default)]
    pub cities: Vec<City>,
    #[serde(default)]
    pub tradeports: Vec<Tradeport>,
}

/// Borrowed view of any catalog record.
#[derive(Clone, Copy, Debug)]
pub enum EntityRef<'a> {
    Ship(&'a Ship),
    Commodity(&'a Commodity),
    System(&'a StarSystem),
    Planet(&'a Planet),
    Satellite(&'a Satellite),
    City(&'a City),
    Tradeport(&'a Tradeport),
}

impl EntityRef<'_> {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Ship(_) => EntityKind::Ship,
            Self::Commodity(_) => EntityKind::Commodity,
            Self::System(_) => EntityKind::System,
            Self::Planet(_) => EntityKind::Planet,
            Self::Satellite(_) => EntityKind::Satellite,
            Self::City(_) => EntityKind::City,
            Self::Tradeport(_) => EntityKind::Tradeport,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::Ship(e) => e.code(),
            Self::Commodity(e) => e.code(),
            Self::System(e) => e.code(),
            Self::Planet(e) => e.code(),
            Self::Satellite(e) => e.code(),
            Self::City(e) => e.code(),
            Self::Tradeport(e) => e.code(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Ship(e) => e.name(),
            Self::Commodity(e) => e.name(),
            Self::System(e) => e.name(),
            Self::Planet(e) => e.name(),
            Self::Satellite(e) => e.name(),
            Self::City(e) => e.name(),
            Self::Tradeport(e) => e.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port_with(prices: Vec<PriceEntry>) -> Tradeport {
        Tradeport {
            code: "PORT".into(),
            name: "Port Olisar".into(),
            system: None,
            planet: None,
            satellite: None,
            city: None,
            armistice: false,
            outlaw: false,
            restricted: false,
            refinery: false,
            hull_trading: false,
            prices,
        }
    }

    #[test]
    fn buy_and_sell_entries_are_kept_apart() {
        let port = port_with(vec![
            PriceEntry {
                commodity_code: "AGRI".into(),
                operation: TradeOperation::Buy,
                price: 1.25,
            },
            PriceEntry {
                commodity_code: "AGRI".into(),
                operation: TradeOperation::Sell,
                price: 1.5,
            },
        ]);
        assert_eq!(port.buy_price("AGRI"), Some(1.25));
        assert_eq!(port.sell_price("agri"), Some(1.5));
        assert_eq!(port.sell_price("GOLD"), None);
    }

    #[test]
    fn zero_prices_count_as_missing() {
        let port = port_with(vec![PriceEntry {
            commodity_code: "GOLD".into(),
            operation: TradeOperation::Buy,
            price: 0.0,
        }]);
        assert_eq!(port.buy_price("GOLD"), None);
    }
}
