//! Trade route search and location ranking.
//!
//! API terminology (from PLAYER perspective):
//! - a `Buy` price entry = where YOU BUY (spend money)
//! - a `Sell` price entry = where YOU SELL (receive money)

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use super::catalog::Catalog;
use super::entities::{Commodity, Ship, TradeOperation, Tradeport};
use super::readable::{format_auec, format_scu};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TradeSearchError {
    #[error("No valid start position given. Make sure to provide a start point compatible with your ship.")]
    NoStart,
    #[error("No valid end position given. Make sure to provide an end point compatible with your ship.")]
    NoEnd,
    #[error("Start and end position are the same.")]
    SameStartAndEnd,
    #[error("You dont have enough money to trade.")]
    NoMoney,
    #[error("No trade route found that fits your ship, budget and positions.")]
    NoRoute,
    #[error("No valid location found to {operation} {commodity}.")]
    NoLocation { operation: &'static str, commodity: String },
}

/// One configured exclusion, by tradeport and optionally commodity name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub tradeport: String,
    #[serde(default)]
    pub commodity: Option<String>,
}

/// Blacklist entries resolved to catalog codes.
#[derive(Clone, Debug, Default)]
pub struct Blacklist {
    tradeports: HashSet<String>,
    pairs: HashSet<(String, String)>,
}

impl Blacklist {
    /// Entries naming unknown tradeports or commodities are ignored.
    pub fn resolve(catalog: &Catalog, entries: &[BlacklistEntry]) -> Self {
        let mut blacklist = Self::default();
        for entry in entries {
            let Some(port) = catalog
                .tradeports
                .by_name(&entry.tradeport)
                .or_else(|| catalog.tradeports.by_code(&entry.tradeport))
            else {
                tracing::debug!(tradeport = %entry.tradeport, "blacklisted tradeport not in catalog");
                continue;
            };
            let port_code = port.code.to_lowercase();
            match entry.commodity.as_deref().filter(|c| !c.is_empty()) {
                None => {
                    blacklist.tradeports.insert(port_code);
                }
                Some(name) => {
                    if let Some(commodity) = catalog
                        .commodities
                        .by_name(name)
                        .or_else(|| catalog.commodities.by_code(name))
                    {
                        blacklist
                            .pairs
                            .insert((port_code, commodity.code.to_lowercase()));
                    }
                }
            }
        }
        blacklist
    }

    pub fn excludes_tradeport(&self, port: &Tradeport) -> bool {
        self.tradeports.contains(&port.code.to_lowercase())
    }

    pub fn excludes_commodity_at(&self, port: &Tradeport, commodity: &Commodity) -> bool {
        self.pairs
            .contains(&(port.code.to_lowercase(), commodity.code.to_lowercase()))
    }
}

/// Parameters of one route search, already resolved against the catalog.
#[derive(Clone, Debug)]
pub struct RouteQuery<'a> {
    pub ship: &'a Ship,
    /// Location name; `None` searches everywhere.
    pub start: Option<&'a str>,
    /// Location name; `None` stays in the start's system.
    pub end: Option<&'a str>,
    pub commodity: Option<&'a Commodity>,
    pub budget: i64,
    pub free_cargo: Option<u64>,
    pub illegal_allowed: bool,
    pub max_routes: usize,
    pub summarize_by_commodity: bool,
}

/// Best route for one commodity. Equal-profit alternatives share one record.
#[derive(Clone, Debug, PartialEq)]
pub struct TradeRoute {
    pub commodity_code: String,
    pub commodity_name: String,
    /// Tradeport codes; several entries mean "any of these".
    pub start: Vec<String>,
    pub end: Vec<String>,
    pub price_buy: f64,
    pub price_sell: f64,
    pub cargo: u64,
    pub buy: i64,
    pub sell: i64,
    pub profit: i64,
}

impl TradeRoute {
    fn new(commodity: &Commodity, start: &Tradeport, end: &Tradeport, leg: Leg) -> Self {
        Self {
            commodity_code: commodity.code.clone(),
            commodity_name: commodity.name.clone(),
            start: vec![start.code.clone()],
            end: vec![end.code.clone()],
            price_buy: leg.price_buy,
            price_sell: leg.price_sell,
            cargo: leg.cargo,
            buy: (leg.cargo as f64 * leg.price_buy).round() as i64,
            sell: (leg.cargo as f64 * leg.price_sell).round() as i64,
            profit: leg.profit,
        }
    }

    fn add_alternative(&mut self, start: &Tradeport, end: &Tradeport) {
        if !self.start.contains(&start.code) {
            self.start.push(start.code.clone());
        }
        if !self.end.contains(&end.code) {
            self.end.push(end.code.clone());
        }
    }

    pub fn to_readable(&self, catalog: &Catalog) -> Value {
        json!({
            "start": breadcrumbs(catalog, &self.start),
            "end": breadcrumbs(catalog, &self.end),
            "commodity": self.commodity_name,
            "profit": format_auec(self.profit as f64),
            "cargo": format_scu(self.cargo),
            "buy": format_auec(self.buy as f64),
            "sell": format_auec(self.sell as f64),
        })
    }
}

fn breadcrumbs(catalog: &Catalog, codes: &[String]) -> String {
    codes
        .iter()
        .map(|code| {
            catalog
                .tradeports
                .by_code(code)
                .map(|port| catalog.breadcrumb(port))
                .unwrap_or_else(|| code.clone())
        })
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[derive(Clone, Copy, Debug)]
struct Leg {
    price_buy: f64,
    price_sell: f64,
    cargo: u64,
    profit: i64,
}

/// Units affordable and loadable; zero if not even one fits.
pub fn cargo_for(budget: i64, price_buy: f64, cargo_limit: u64) -> u64 {
    if budget <= 0 || price_buy <= 0.0 || !price_buy.is_finite() {
        return 0;
    }
    let affordable = (budget as f64 / price_buy).floor();
    if affordable < 1.0 {
        return 0;
    }
    (affordable as u64).min(cargo_limit)
}

fn candidate_ports<'c>(catalog: &'c Catalog, location: Option<&str>) -> Vec<&'c Tradeport> {
    match location {
        Some(name) => catalog.tradeports_near(name),
        None => catalog.tradeports.all().iter().collect(),
    }
}

/// Most profitable routes for the query, best first.
pub fn find_routes(
    catalog: &Catalog,
    query: &RouteQuery<'_>,
    blacklist: &Blacklist,
) -> Result<Vec<TradeRoute>, TradeSearchError> {
    let mut starts = candidate_ports(catalog, query.start);
    let mut ends = match (query.end, query.start, starts.first()) {
        (Some(name), _, _) => catalog.tradeports_near(name),
        (None, Some(_), Some(&first)) => catalog.tradeports_in_system_of(first),
        (None, _, _) => catalog.tradeports.all().iter().collect(),
    };

    if query.ship.hull_trading {
        starts.retain(|port| port.hull_trading);
        ends.retain(|port| port.hull_trading);
    }

    if starts.is_empty() {
        return Err(TradeSearchError::NoStart);
    }
    if ends.is_empty() {
        return Err(TradeSearchError::NoEnd);
    }
    if starts.len() == 1 && ends.len() == 1 && starts[0].code == ends[0].code {
        return Err(TradeSearchError::SameStartAndEnd);
    }
    if query.budget <= 0 {
        return Err(TradeSearchError::NoMoney);
    }

    starts.retain(|port| !blacklist.excludes_tradeport(port));
    ends.retain(|port| !blacklist.excludes_tradeport(port));

    let commodities: Vec<&Commodity> = match query.commodity {
        Some(commodity) => vec![commodity],
        None => catalog
            .commodities
            .all()
            .iter()
            .filter(|commodity| query.illegal_allowed || !commodity.illegal)
            .collect(),
    };

    let cargo_limit = query.free_cargo.unwrap_or(query.ship.scu);
    let mut routes = Vec::new();
    if query.summarize_by_commodity {
        for commodity in &commodities {
            routes.extend(best_route(
                commodity,
                &starts,
                &ends,
                query.budget,
                cargo_limit,
                blacklist,
            ));
        }
    } else {
        for start in &starts {
            for commodity in &commodities {
                routes.extend(best_route(
                    commodity,
                    std::slice::from_ref(start),
                    &ends,
                    query.budget,
                    cargo_limit,
                    blacklist,
                ));
            }
        }
    }

    if routes.is_empty() {
        return Err(TradeSearchError::NoRoute);
    }

    // stable: equal profits keep discovery order
    routes.sort_by(|a, b| b.profit.cmp(&a.profit));
    routes.truncate(query.max_routes.max(1));
    Ok(routes)
}

fn best_route(
    commodity: &Commodity,
    starts: &[&Tradeport],
    ends: &[&Tradeport],
    budget: i64,
    cargo_limit: u64,
    blacklist: &Blacklist,
) -> Option<TradeRoute> {
    let mut best: Option<TradeRoute> = None;

    for start in starts {
        if blacklist.excludes_commodity_at(start, commodity) {
            continue;
        }
        let Some(price_buy) = start.buy_price(&commodity.code) else {
            continue;
        };
        let cargo = cargo_for(budget, price_buy, cargo_limit);
        if cargo == 0 {
            continue;
        }

        for end in ends {
            if end.code == start.code || blacklist.excludes_commodity_at(end, commodity) {
                continue;
            }
            let Some(price_sell) = end.sell_price(&commodity.code) else {
                continue;
            };
            if price_sell <= price_buy {
                continue;
            }
            let profit = (cargo as f64 * (price_sell - price_buy)).round() as i64;
            if profit <= 0 {
                continue;
            }

            let leg = Leg {
                price_buy,
                price_sell,
                cargo,
                profit,
            };
            let replace = match best.as_mut() {
                Some(current) if profit == current.profit => {
                    current.add_alternative(start, end);
                    false
                }
                Some(current) => profit > current.profit,
                None => true,
            };
            if replace {
                best = Some(TradeRoute::new(commodity, start, end, leg));
            }
        }
    }

    best
}

/// A tradeport trading the commodity in the requested direction.
#[derive(Clone, Debug, PartialEq)]
pub struct LocationOffer<'c> {
    pub tradeport: &'c Tradeport,
    pub price: f64,
}

impl LocationOffer<'_> {
    pub fn to_readable(&self, catalog: &Catalog, amount: Option<u64>) -> Value {
        let mut value = json!({
            "tradeport": catalog.breadcrumb(self.tradeport),
            "price": format!("{} per SCU", format_auec(self.price)),
        });
        if let Some(amount) = amount {
            value["total"] = json!(format_auec((amount as f64 * self.price).round()));
        }
        value
    }
}

/// Where to buy (`TradeOperation::Buy`, cheapest first) or sell
/// (`TradeOperation::Sell`, best paying first) a commodity.
pub fn find_locations<'c>(
    catalog: &'c Catalog,
    commodity: &Commodity,
    operation: TradeOperation,
    ship: Option<&Ship>,
    position: Option<&str>,
    blacklist: &Blacklist,
    limit: usize,
) -> Result<Vec<LocationOffer<'c>>, TradeSearchError> {
    let hull_only = ship.map(|ship| ship.hull_trading).unwrap_or(false);

    let mut offers: Vec<LocationOffer<'c>> = candidate_ports(catalog, position)
        .into_iter()
        .filter(|port| !hull_only || port.hull_trading)
        .filter(|port| !blacklist.excludes_tradeport(port))
        .filter(|port| !blacklist.excludes_commodity_at(port, commodity))
        .filter_map(|port| {
            let price = match operation {
                TradeOperation::Buy => port.buy_price(&commodity.code),
                TradeOperation::Sell => port.sell_price(&commodity.code),
            }?;
            Some(LocationOffer {
                tradeport: port,
                price,
            })
        })
        .collect();

    if offers.is_empty() {
        return Err(TradeSearchError::NoLocation {
            operation: match operation {
                TradeOperation::Buy => "buy",
                TradeOperation::Sell => "sell",
            },
            commodity: commodity.name.clone(),
        });
    }

    offers.sort_by(|a, b| {
        let ord = a
            .price
            .partial_cmp(&b.price)
            .unwrap_or(std::cmp::Ordering::Equal);
        match operation {
            TradeOperation::Buy => ord,
            TradeOperation::Sell => ord.reverse(),
        }
    });
    offers.truncate(limit.max(1));
    Ok(offers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::fixtures::{commodity, price, ship, stanton, tradeport};
    use crate::domain::entities::{RawCatalog, StarSystem};
    use TradeOperation::{Buy, Sell};

    fn query<'a>(ship: &'a Ship, start: Option<&'a str>, budget: i64) -> RouteQuery<'a> {
        RouteQuery {
            ship,
            start,
            end: None,
            commodity: None,
            budget,
            free_cargo: None,
            illegal_allowed: true,
            max_routes: 5,
            summarize_by_commodity: true,
        }
    }

    fn two_port_catalog() -> Catalog {
        Catalog::load(RawCatalog {
            ships: vec![ship("FREE", "Freelancer", 5)],
            commodities: vec![commodity("C", "Corundum", false)],
            systems: vec![StarSystem {
                code: "ST".into(),
                name: "Stanton".into(),
            }],
            tradeports: vec![
                tradeport("P1", "Port One", "ST", None, None, None, vec![price("C", Buy, 10.0)]),
                tradeport("P2", "Port Two", "ST", None, None, None, vec![price("C", Sell, 20.0)]),
            ],
            ..RawCatalog::default()
        })
    }

    #[test]
    fn cargo_is_floored_and_capped() {
        assert_eq!(cargo_for(1000, 10.0, 5), 5);
        assert_eq!(cargo_for(99, 10.0, 50), 9);
        assert_eq!(cargo_for(5, 10.0, 50), 0);
        assert_eq!(cargo_for(0, 10.0, 50), 0);
    }

    #[test]
    fn single_commodity_route_scenario() {
        let catalog = two_port_catalog();
        let freelancer = catalog.ships.by_code("FREE").unwrap();
        let routes = find_routes(
            &catalog,
            &query(freelancer, Some("Port One"), 1000),
            &Blacklist::default(),
        )
        .unwrap();

        assert_eq!(routes.len(), 1);
        let route = &routes[0];
        assert_eq!(route.cargo, 5);
        assert_eq!(route.profit, 50);
        assert_eq!(route.buy, 50);
        assert_eq!(route.sell, 100);
        assert_eq!(route.start, vec!["P1"]);
        assert_eq!(route.end, vec!["P2"]);

        let readable = route.to_readable(&catalog);
        assert_eq!(readable["start"], "Stanton > Port One");
        assert_eq!(readable["profit"], "50 aUEC");
        assert_eq!(readable["cargo"], "5 SCU");
    }

    #[test]
    fn returned_routes_are_profitable_and_consistent() {
        let catalog = Catalog::load(stanton());
        let cutlass = catalog.ships.by_code("CUTB").unwrap();
        let routes = find_routes(
            &catalog,
            &query(cutlass, None, 1_000),
            &Blacklist::default(),
        )
        .unwrap();

        assert!(!routes.is_empty());
        for route in &routes {
            assert!(route.price_sell > route.price_buy);
            let expected_cargo = ((1_000.0 / route.price_buy).floor() as u64).min(cutlass.scu);
            assert_eq!(route.cargo, expected_cargo);
            assert_eq!(
                route.profit,
                (route.cargo as f64 * (route.price_sell - route.price_buy)).round() as i64
            );
        }
        assert!(routes.windows(2).all(|w| w[0].profit >= w[1].profit));
    }

    #[test]
    fn degenerate_queries_explain_themselves() {
        let catalog = two_port_catalog();
        let freelancer = catalog.ships.by_code("FREE").unwrap();
        let none = Blacklist::default();

        let missing = find_routes(&catalog, &query(freelancer, Some("Nowhere"), 1000), &none);
        assert_eq!(missing, Err(TradeSearchError::NoStart));

        let mut same = query(freelancer, Some("Port One"), 1000);
        same.end = Some("Port One");
        assert_eq!(
            find_routes(&catalog, &same, &none),
            Err(TradeSearchError::SameStartAndEnd)
        );

        let broke = find_routes(&catalog, &query(freelancer, Some("Port One"), 0), &none);
        assert_eq!(broke, Err(TradeSearchError::NoMoney));
        assert_eq!(
            TradeSearchError::NoMoney.to_string(),
            "You dont have enough money to trade."
        );
    }

    #[test]
    fn blacklisted_tradeport_never_appears() {
        let catalog = Catalog::load(stanton());
        let cutlass = catalog.ships.by_code("CUTB").unwrap();
        let blacklist = Blacklist::resolve(
            &catalog,
            &[BlacklistEntry {
                tradeport: "Orison Providence Platform".into(),
                commodity: None,
            }],
        );

        let routes = find_routes(&catalog, &query(cutlass, None, 100_000), &blacklist).unwrap();
        for route in &routes {
            assert!(!route.start.contains(&"ORIP".to_string()));
            assert!(!route.end.contains(&"ORIP".to_string()));
        }
    }

    #[test]
    fn blacklisted_commodity_is_stripped_only_at_that_port() {
        let catalog = Catalog::load(stanton());
        let cutlass = catalog.ships.by_code("CUTB").unwrap();
        let agricium = catalog.commodities.by_code("AGRI").unwrap();
        let blacklist = Blacklist::resolve(
            &catalog,
            &[BlacklistEntry {
                tradeport: "Orison Providence Platform".into(),
                commodity: Some("agricium".into()),
            }],
        );

        let mut q = query(cutlass, Some("Daymar"), 10_000);
        q.commodity = Some(agricium);
        q.end = Some("Stanton");
        let routes = find_routes(&catalog, &q, &blacklist).unwrap();

        // ORIP would pay 20; Lorville at 15 is next best
        assert_eq!(routes[0].end, vec!["LORT"]);
    }

    #[test]
    fn equal_profit_routes_accumulate() {
        let catalog = Catalog::load(RawCatalog {
            ships: vec![ship("FREE", "Freelancer", 10)],
            commodities: vec![commodity("C", "Corundum", false)],
            systems: vec![StarSystem {
                code: "ST".into(),
                name: "Stanton".into(),
            }],
            tradeports: vec![
                tradeport("A", "Alpha", "ST", None, None, None, vec![price("C", Buy, 10.0)]),
                tradeport("B", "Beta", "ST", None, None, None, vec![price("C", Buy, 10.0)]),
                tradeport("X", "Xray", "ST", None, None, None, vec![price("C", Sell, 12.0)]),
                tradeport("Y", "Yankee", "ST", None, None, None, vec![price("C", Sell, 12.0)]),
            ],
            ..RawCatalog::default()
        });
        let freelancer = catalog.ships.by_code("FREE").unwrap();
        let routes = find_routes(
            &catalog,
            &query(freelancer, None, 1_000),
            &Blacklist::default(),
        )
        .unwrap();

        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].start, vec!["A", "B"]);
        assert_eq!(routes[0].end, vec!["X", "Y"]);
        assert_eq!(
            routes[0].to_readable(&catalog)["end"],
            "Stanton > Xray OR Stanton > Yankee"
        );
    }

    #[test]
    fn per_start_passes_when_not_summarizing() {
        let catalog = Catalog::load(stanton());
        let cutlass = catalog.ships.by_code("CUTB").unwrap();
        let agricium = catalog.commodities.by_code("AGRI").unwrap();

        let mut q = query(cutlass, None, 100_000);
        q.commodity = Some(agricium);
        let summarized = find_routes(&catalog, &q, &Blacklist::default()).unwrap();
        assert_eq!(summarized.len(), 1);

        q.summarize_by_commodity = false;
        let per_start = find_routes(&catalog, &q, &Blacklist::default()).unwrap();
        // Shubin and Baijini both sell Agricium
        assert_eq!(per_start.len(), 2);
        assert_eq!(per_start[0].start, vec!["SHUB"]);
        assert_eq!(per_start[1].start, vec!["BAIJ"]);
    }

    #[test]
    fn hull_ships_stick_to_hull_stations() {
        let catalog = Catalog::load(stanton());
        let hull = catalog.ships.by_code("HULC").unwrap();

        let from_daymar = find_routes(
            &catalog,
            &query(hull, Some("Daymar"), 100_000),
            &Blacklist::default(),
        );
        assert_eq!(from_daymar, Err(TradeSearchError::NoStart));

        let mut q = query(hull, Some("Baijini Point"), 100_000);
        q.end = Some("Stanton");
        let routes = find_routes(&catalog, &q, &Blacklist::default()).unwrap();
        for route in &routes {
            for code in route.start.iter().chain(route.end.iter()) {
                assert!(catalog.tradeports.by_code(code).unwrap().hull_trading);
            }
        }
    }

    #[test]
    fn illegal_goods_can_be_excluded() {
        let catalog = Catalog::load(stanton());
        let cutlass = catalog.ships.by_code("CUTB").unwrap();

        let mut q = query(cutlass, Some("Orison"), 100_000);
        q.end = Some("Lorville");
        let routes = find_routes(&catalog, &q, &Blacklist::default()).unwrap();
        assert_eq!(routes[0].commodity_code, "WIDO");

        q.illegal_allowed = false;
        assert_eq!(
            find_routes(&catalog, &q, &Blacklist::default()),
            Err(TradeSearchError::NoRoute)
        );
    }

    #[test]
    fn sell_locations_rank_best_price_first() {
        let catalog = Catalog::load(stanton());
        let agricium = catalog.commodities.by_code("AGRI").unwrap();
        let offers = find_locations(
            &catalog,
            agricium,
            Sell,
            None,
            None,
            &Blacklist::default(),
            2,
        )
        .unwrap();

        let codes: Vec<&str> = offers.iter().map(|o| o.tradeport.code.as_str()).collect();
        assert_eq!(codes, vec!["ORIP", "LORT"]);
        assert_eq!(
            offers[0].to_readable(&catalog, Some(10))["total"],
            "200 aUEC"
        );
    }

    #[test]
    fn buy_locations_respect_position_filter() {
        let catalog = Catalog::load(stanton());
        let agricium = catalog.commodities.by_code("AGRI").unwrap();
        let offers = find_locations(
            &catalog,
            agricium,
            Buy,
            None,
            Some("Crusader"),
            &Blacklist::default(),
            5,
        )
        .unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].tradeport.code, "SHUB");

        let nothing = find_locations(
            &catalog,
            agricium,
            Buy,
            None,
            Some("Hurston"),
            &Blacklist::default(),
            5,
        );
        assert!(matches!(nothing, Err(TradeSearchError::NoLocation { .. })));
    }
}
