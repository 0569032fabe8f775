//! Catalog, name resolution and trade route search live here.

pub mod arguments;
pub mod catalog;
pub mod entities;
pub mod fuzzy;
pub mod readable;
pub mod trade_route;

pub use arguments::ArgumentCache;
pub use catalog::{Catalog, CatalogHandle};
pub use entities::{
    City, Commodity, EntityKind, Planet, PriceEntry, RawCatalog, Satellite, Ship, ShopLocation,
    StarSystem, TradeOperation, Tradeport,
};
pub use fuzzy::NameResolver;
pub use readable::ReadableCache;
pub use trade_route::{find_locations, find_routes, Blacklist, BlacklistEntry, RouteQuery};
