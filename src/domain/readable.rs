//! Compact, speakable projections of catalog records.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use super::catalog::Catalog;
use super::entities::{
    City, Commodity, EntityKind, EntityRef, Planet, Satellite, Ship, ShopLocation, StarSystem,
    TradeOperation, Tradeport,
};

/// Manufacturer codes as used by the UEX API.
const MANUFACTURERS: &[(&str, &str)] = &[
    ("AEGS", "Aegis Dynamics"),
    ("ANVL", "Anvil Aerospace"),
    ("AOPOA", "Aopoa"),
    ("ARGO", "Argo Astronautics"),
    ("BANU", "Banu"),
    ("CNOU", "Consolidated Outland"),
    ("CRUS", "Crusader Industries"),
    ("DRAK", "Drake Interplanetary"),
    ("ESPR", "Esperia"),
    ("GAMA", "Gatac Manufacture"),
    ("GRIN", "Greycat Industrial"),
    ("KRIG", "Kruger Intergalactic"),
    ("MIRA", "Mirai"),
    ("MISC", "Musashi Industrial and Starflight Concern"),
    ("ORIG", "Origin Jumpworks"),
    ("RSI", "Roberts Space Industries"),
    ("TMBL", "Tumbril Land Systems"),
    ("VNCL", "Vanduul"),
    ("XIAN", "Xi'an"),
];

pub fn manufacturer_name(code: &str) -> Option<&'static str> {
    MANUFACTURERS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(code))
        .map(|(_, name)| *name)
}

/// Prints whole numbers without a fraction, everything else as-is.
pub fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

pub fn format_auec(value: f64) -> String {
    format!("{} aUEC", format_amount(value))
}

pub fn format_scu(value: u64) -> String {
    format!("{value} SCU")
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

fn insert_opt(map: &mut Map<String, Value>, key: &str, value: Option<String>) {
    if let Some(value) = value {
        map.insert(key.to_string(), Value::String(value));
    }
}

/// Memoized renderer; one entry per `(kind, code)`.
#[derive(Debug, Default)]
pub struct ReadableCache {
    entries: HashMap<(EntityKind, String), Value>,
}

impl ReadableCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, catalog: &Catalog, entity: EntityRef<'_>) -> Value {
        let key = (entity.kind(), entity.code().to_lowercase());
        if let Some(hit) = self.entries.get(&key) {
            return hit.clone();
        }
        let rendered = render(catalog, entity);
        self.entries.insert(key, rendered.clone());
        rendered
    }

    #[cfg(test)]
    pub fn contains(&self, kind: EntityKind, code: &str) -> bool {
        self.entries.contains_key(&(kind, code.to_lowercase()))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Uncached projection of one record.
pub fn render(catalog: &Catalog, entity: EntityRef<'_>) -> Value {
    match entity {
        EntityRef::Ship(ship) => render_ship(catalog, ship),
        EntityRef::Commodity(commodity) => render_commodity(commodity),
        EntityRef::Tradeport(port) => render_tradeport(catalog, port),
        EntityRef::System(system) => render_system(catalog, system),
        EntityRef::Planet(planet) => render_planet(catalog, planet),
        EntityRef::Satellite(satellite) => render_satellite(catalog, satellite),
        EntityRef::City(city) => render_city(catalog, city),
    }
}

fn render_ship(catalog: &Catalog, ship: &Ship) -> Value {
    let mut map = Map::new();
    map.insert("name".into(), json!(ship.name));
    insert_opt(
        &mut map,
        "manufacturer",
        ship.manufacturer.as_deref().map(|code| {
            manufacturer_name(code)
                .map(str::to_string)
                .unwrap_or_else(|| code.to_string())
        }),
    );
    map.insert("cargo".into(), json!(format_scu(ship.scu)));
    insert_opt(&mut map, "price", ship.price.map(format_auec));
    insert_opt(&mut map, "career", ship.career.clone());
    insert_opt(&mut map, "role", ship.role.clone());
    map.insert("hull_trading".into(), json!(yes_no(ship.hull_trading)));
    map.insert("buy_at".into(), json!(shop_paths(catalog, &ship.buy_at)));
    map.insert("rent_at".into(), json!(shop_paths(catalog, &ship.rent_at)));
    Value::Object(map)
}

fn shop_paths(catalog: &Catalog, shops: &[ShopLocation]) -> Vec<String> {
    shops
        .iter()
        .map(|shop| {
            let path = [
                catalog.display_name(EntityKind::System, shop.system.as_deref()),
                catalog.display_name(EntityKind::Planet, shop.planet.as_deref()),
                catalog.display_name(EntityKind::Satellite, shop.satellite.as_deref()),
                catalog.display_name(EntityKind::City, shop.city.as_deref()),
                shop.store.clone(),
            ]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" > ");
            match shop.price {
                Some(price) => format!("{path} for {}", format_auec(price)),
                None => path,
            }
        })
        .collect()
}

fn render_commodity(commodity: &Commodity) -> Value {
    let mut map = Map::new();
    map.insert("name".into(), json!(commodity.name));
    insert_opt(&mut map, "kind", commodity.kind.clone());
    map.insert("illegal".into(), json!(yes_no(commodity.illegal)));
    insert_opt(
        &mut map,
        "average_buy_price",
        commodity
            .price_buy
            .filter(|price| *price > 0.0)
            .map(|price| format!("{} per SCU", format_auec(price))),
    );
    insert_opt(
        &mut map,
        "average_sell_price",
        commodity
            .price_sell
            .filter(|price| *price > 0.0)
            .map(|price| format!("{} per SCU", format_auec(price))),
    );
    map.insert("minable".into(), json!(yes_no(commodity.minable)));
    map.insert("refinable".into(), json!(yes_no(commodity.refinable)));
    Value::Object(map)
}

fn price_list(catalog: &Catalog, port: &Tradeport, operation: TradeOperation) -> String {
    let entries: Vec<String> = port
        .prices
        .iter()
        .filter(|entry| entry.operation == operation && entry.price > 0.0)
        .map(|entry| {
            let name = catalog
                .commodities
                .by_code(&entry.commodity_code)
                .map(|commodity| commodity.name.clone())
                .unwrap_or_else(|| entry.commodity_code.clone());
            format!("{name} for {} per SCU", format_auec(entry.price))
        })
        .collect();
    if entries.is_empty() {
        "None".to_string()
    } else {
        entries.join(", ")
    }
}

fn render_tradeport(catalog: &Catalog, port: &Tradeport) -> Value {
    let mut map = Map::new();
    map.insert("name".into(), json!(port.name));
    map.insert("type".into(), json!("Tradeport"));
    insert_opt(
        &mut map,
        "star_system",
        catalog.display_name(EntityKind::System, port.system.as_deref()),
    );
    insert_opt(
        &mut map,
        "planet",
        catalog.display_name(EntityKind::Planet, port.planet.as_deref()),
    );
    insert_opt(
        &mut map,
        "satellite",
        catalog.display_name(EntityKind::Satellite, port.satellite.as_deref()),
    );
    insert_opt(
        &mut map,
        "city",
        catalog.display_name(EntityKind::City, port.city.as_deref()),
    );
    map.insert("armistice".into(), json!(yes_no(port.armistice)));
    map.insert("outlaw".into(), json!(yes_no(port.outlaw)));
    map.insert("restricted".into(), json!(yes_no(port.restricted)));
    map.insert("refinery".into(), json!(yes_no(port.refinery)));
    map.insert("hull_trading".into(), json!(yes_no(port.hull_trading)));
    map.insert(
        "buyable_commodities".into(),
        json!(price_list(catalog, port, TradeOperation::Buy)),
    );
    map.insert(
        "sellable_commodities".into(),
        json!(price_list(catalog, port, TradeOperation::Sell)),
    );
    Value::Object(map)
}

fn options_to_trade(catalog: &Catalog, location_name: &str) -> String {
    let names: Vec<&str> = catalog
        .tradeports_near(location_name)
        .into_iter()
        .map(|port| port.name.as_str())
        .collect();
    if names.is_empty() {
        "None".to_string()
    } else {
        names.join(", ")
    }
}

fn render_system(catalog: &Catalog, system: &StarSystem) -> Value {
    json!({
        "name": system.name,
        "type": "Star System",
        "options_to_trade": options_to_trade(catalog, &system.name),
    })
}

fn render_planet(catalog: &Catalog, planet: &Planet) -> Value {
    let mut map = Map::new();
    map.insert("name".into(), json!(planet.name));
    map.insert("type".into(), json!("Planet"));
    insert_opt(
        &mut map,
        "star_system",
        catalog.display_name(EntityKind::System, planet.system.as_deref()),
    );
    map.insert(
        "options_to_trade".into(),
        json!(options_to_trade(catalog, &planet.name)),
    );
    Value::Object(map)
}

fn render_satellite(catalog: &Catalog, satellite: &Satellite) -> Value {
    let mut map = Map::new();
    map.insert("name".into(), json!(satellite.name));
    map.insert("type".into(), json!("Satellite"));
    insert_opt(
        &mut map,
        "star_system",
        catalog.display_name(EntityKind::System, satellite.system.as_deref()),
    );
    insert_opt(
        &mut map,
        "planet",
        catalog.display_name(EntityKind::Planet, satellite.planet.as_deref()),
    );
    map.insert(
        "options_to_trade".into(),
        json!(options_to_trade(catalog, &satellite.name)),
    );
    Value::Object(map)
}

fn render_city(catalog: &Catalog, city: &City) -> Value {
    let mut map = Map::new();
    map.insert("name".into(), json!(city.name));
    map.insert("type".into(), json!("City"));
    insert_opt(
        &mut map,
        "star_system",
        catalog.display_name(EntityKind::System, city.system.as_deref()),
    );
    insert_opt(
        &mut map,
        "planet",
        catalog.display_name(EntityKind::Planet, city.planet.as_deref()),
    );
    map.insert(
        "options_to_trade".into(),
        json!(options_to_trade(catalog, &city.name)),
    );
    Value::Object(map)
}
