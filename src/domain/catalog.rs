//! Indexed, immutable snapshot of the UEX universe.
//!
//! A [`Catalog`] is built once from a [`RawCatalog`] and never mutated. Reloads
//! build a fresh snapshot and swap it into a [`CatalogHandle`], so readers
//! holding an `Arc<Catalog>` always see one consistent state.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
};

use super::entities::{
    CatalogEntity, City, Commodity, EntityKind, EntityRef, Planet, RawCatalog, Satellite, Ship,
    StarSystem, Tradeport, HULL_TRADING_SHIPS, HULL_TRADING_TRADEPORTS,
};

static GENERATION: AtomicU64 = AtomicU64::new(1);

/// Records of one kind with lower-cased name and code indexes.
#[derive(Clone, Debug)]
pub struct Table<T> {
    records: Vec<T>,
    by_name: HashMap<String, usize>,
    by_code: HashMap<String, usize>,
}

impl<T: CatalogEntity> Table<T> {
    fn new(records: Vec<T>) -> Self {
        let mut by_name = HashMap::with_capacity(records.len());
        let mut by_code = HashMap::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            // first record wins on duplicate names
            by_name.entry(record.name().to_lowercase()).or_insert(index);
            by_code.insert(record.code().to_lowercase(), index);
        }
        Self {
            records,
            by_name,
            by_code,
        }
    }

    pub fn by_name(&self, name: &str) -> Option<&T> {
        self.by_name
            .get(&name.to_lowercase())
            .map(|&index| &self.records[index])
    }

    pub fn by_code(&self, code: &str) -> Option<&T> {
        self.by_code
            .get(&code.to_lowercase())
            .map(|&index| &self.records[index])
    }

    pub fn all(&self) -> &[T] {
        &self.records
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|record| record.name())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug)]
pub struct Catalog {
    generation: u64,
    pub ships: Table<Ship>,
    pub commodities: Table<Commodity>,
    pub systems: Table<StarSystem>,
    pub planets: Table<Planet>,
    pub satellites: Table<Satellite>,
    pub cities: Table<City>,
    pub tradeports: Table<Tradeport>,
    tradeports_by_system: HashMap<String, Vec<usize>>,
    tradeports_by_planet: HashMap<String, Vec<usize>>,
    tradeports_by_satellite: HashMap<String, Vec<usize>>,
    tradeports_by_city: HashMap<String, Vec<usize>>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::load(RawCatalog::default())
    }
}

impl Catalog {
    /// Index raw records and apply the hull trading business rules.
    pub fn load(raw: RawCatalog) -> Self {
        let RawCatalog {
            mut ships,
            commodities,
            systems,
            planets,
            satellites,
            cities,
            mut tradeports,
        } = raw;

        for ship in &mut ships {
            ship.hull_trading = HULL_TRADING_SHIPS.contains(&ship.name.as_str());
        }
        for port in &mut tradeports {
            port.hull_trading = HULL_TRADING_TRADEPORTS.contains(&port.name.as_str());
        }

        let systems = Table::new(systems);
        let planets = Table::new(planets);
        let satellites = Table::new(satellites);
        let cities = Table::new(cities);

        let mut tradeports_by_system: HashMap<String, Vec<usize>> = HashMap::new();
        let mut tradeports_by_planet: HashMap<String, Vec<usize>> = HashMap::new();
        let mut tradeports_by_satellite: HashMap<String, Vec<usize>> = HashMap::new();
        let mut tradeports_by_city: HashMap<String, Vec<usize>> = HashMap::new();

        for (index, port) in tradeports.iter().enumerate() {
            if let Some(name) = parent_name(&systems, port.system.as_deref()) {
                tradeports_by_system.entry(name).or_default().push(index);
            }
            if let Some(name) = parent_name(&planets, port.planet.as_deref()) {
                tradeports_by_planet.entry(name).or_default().push(index);
            }
            if let Some(name) = parent_name(&satellites, port.satellite.as_deref()) {
                tradeports_by_satellite.entry(name).or_default().push(index);
            }
            if let Some(name) = parent_name(&cities, port.city.as_deref()) {
                tradeports_by_city.entry(name).or_default().push(index);
            }
        }

        Self {
            generation: GENERATION.fetch_add(1, Ordering::Relaxed),
            ships: Table::new(ships),
            commodities: Table::new(commodities),
            systems,
            planets,
            satellites,
            cities,
            tradeports: Table::new(tradeports),
            tradeports_by_system,
            tradeports_by_planet,
            tradeports_by_satellite,
            tradeports_by_city,
        }
    }

    /// New snapshot sharing every static table but with fresh tradeports.
    pub fn with_tradeports(&self, tradeports: Vec<Tradeport>) -> Self {
        let mut raw = self.to_raw();
        raw.tradeports = tradeports;
        Self::load(raw)
    }

    /// Back to the unindexed form, e.g. for the disk cache.
    pub fn to_raw(&self) -> RawCatalog {
        RawCatalog {
            ships: self.ships.all().to_vec(),
            commodities: self.commodities.all().to_vec(),
            systems: self.systems.all().to_vec(),
            planets: self.planets.all().to_vec(),
            satellites: self.satellites.all().to_vec(),
            cities: self.cities.all().to_vec(),
            tradeports: self.tradeports.all().to_vec(),
        }
    }

    /// Unique per snapshot; changes on every reload.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn lookup_by_name(&self, kind: EntityKind, name: &str) -> Option<EntityRef<'_>> {
        match kind {
            EntityKind::Ship => self.ships.by_name(name).map(EntityRef::Ship),
            EntityKind::Commodity => self.commodities.by_name(name).map(EntityRef::Commodity),
            EntityKind::System => self.systems.by_name(name).map(EntityRef::System),
            EntityKind::Planet => self.planets.by_name(name).map(EntityRef::Planet),
            EntityKind::Satellite => self.satellites.by_name(name).map(EntityRef::Satellite),
            EntityKind::City => self.cities.by_name(name).map(EntityRef::City),
            EntityKind::Tradeport => self.tradeports.by_name(name).map(EntityRef::Tradeport),
        }
    }

    pub fn lookup_by_code(&self, kind: EntityKind, code: &str) -> Option<EntityRef<'_>> {
        match kind {
            EntityKind::Ship => self.ships.by_code(code).map(EntityRef::Ship),
            EntityKind::Commodity => self.commodities.by_code(code).map(EntityRef::Commodity),
            EntityKind::System => self.systems.by_code(code).map(EntityRef::System),
            EntityKind::Planet => self.planets.by_code(code).map(EntityRef::Planet),
            EntityKind::Satellite => self.satellites.by_code(code).map(EntityRef::Satellite),
            EntityKind::City => self.cities.by_code(code).map(EntityRef::City),
            EntityKind::Tradeport => self.tradeports.by_code(code).map(EntityRef::Tradeport),
        }
    }

    /// Finds a location by name, most specific kind first.
    pub fn lookup_location(&self, name: &str) -> Option<EntityRef<'_>> {
        [
            EntityKind::Tradeport,
            EntityKind::City,
            EntityKind::Satellite,
            EntityKind::Planet,
            EntityKind::System,
        ]
        .into_iter()
        .find_map(|kind| self.lookup_by_name(kind, name))
    }

    /// All tradeports at or below the named location.
    ///
    /// Union of the tradeport with that exact name and every tradeport whose
    /// system, planet, satellite or city carries that name, in catalog order.
    pub fn tradeports_near(&self, location_name: &str) -> Vec<&Tradeport> {
        let key = location_name.to_lowercase();
        let mut indexes: Vec<usize> = Vec::new();
        if let Some(&index) = self.tradeports.by_name.get(&key) {
            indexes.push(index);
        }
        for index_map in [
            &self.tradeports_by_system,
            &self.tradeports_by_planet,
            &self.tradeports_by_satellite,
            &self.tradeports_by_city,
        ] {
            if let Some(found) = index_map.get(&key) {
                indexes.extend(found.iter().copied());
            }
        }
        indexes.sort_unstable();
        indexes.dedup();
        indexes
            .into_iter()
            .map(|index| &self.tradeports.records[index])
            .collect()
    }

    /// Tradeports sharing the star system of `port`.
    pub fn tradeports_in_system_of<'a>(&'a self, port: &'a Tradeport) -> Vec<&'a Tradeport> {
        match port.system.as_deref() {
            Some(code) => self
                .tradeports
                .all()
                .iter()
                .filter(|candidate| {
                    candidate
                        .system
                        .as_deref()
                        .map(|other| other.eq_ignore_ascii_case(code))
                        .unwrap_or(false)
                })
                .collect(),
            None => vec![port],
        }
    }

    /// Every name usable as a location filter.
    pub fn location_names(&self) -> HashSet<String> {
        self.systems
            .names()
            .chain(self.tradeports.names())
            .chain(self.cities.names())
            .chain(self.satellites.names())
            .chain(self.planets.names())
            .map(str::to_string)
            .collect()
    }

    pub fn ship_names(&self) -> HashSet<String> {
        self.ships.names().map(str::to_string).collect()
    }

    pub fn commodity_names(&self) -> HashSet<String> {
        self.commodities.names().map(str::to_string).collect()
    }

    /// Display name for a parent code, falling back to the raw code.
    pub fn display_name(&self, kind: EntityKind, code: Option<&str>) -> Option<String> {
        let code = code.filter(|code| !code.is_empty())?;
        Some(
            self.lookup_by_code(kind, code)
                .map(|entity| entity.name().to_string())
                .unwrap_or_else(|| code.to_string()),
        )
    }

    /// "system > planet > satellite > city > tradeport", skipping absent levels.
    pub fn breadcrumb(&self, port: &Tradeport) -> String {
        [
            self.display_name(EntityKind::System, port.system.as_deref()),
            self.display_name(EntityKind::Planet, port.planet.as_deref()),
            self.display_name(EntityKind::Satellite, port.satellite.as_deref()),
            self.display_name(EntityKind::City, port.city.as_deref()),
            Some(port.name.clone()),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" > ")
    }
}

fn parent_name<T: CatalogEntity>(table: &Table<T>, code: Option<&str>) -> Option<String> {
    let code = code.filter(|code| !code.is_empty())?;
    Some(
        table
            .by_code(code)
            .map(|parent| parent.name().to_lowercase())
            .unwrap_or_else(|| code.to_lowercase()),
    )
}

/// Shared slot for the current snapshot.
///
/// Writers build a complete [`Catalog`] first and then swap; readers clone the
/// `Arc` and keep working on it even if a reload lands meanwhile.
#[derive(Clone, Debug, Default)]
pub struct CatalogHandle {
    current: Arc<RwLock<Arc<Catalog>>>,
}

impl CatalogHandle {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(catalog))),
        }
    }

    pub fn snapshot(&self) -> Arc<Catalog> {
        let guard = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    pub fn swap(&self, catalog: Catalog) -> Arc<Catalog> {
        let next = Arc::new(catalog);
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *guard, Arc::clone(&next))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::domain::entities::{PriceEntry, ShopLocation, TradeOperation};

    pub fn price(code: &str, operation: TradeOperation, price: f64) -> PriceEntry {
        PriceEntry {
            commodity_code: code.into(),
            operation,
            price,
        }
    }

    pub fn tradeport(
        code: &str,
        name: &str,
        system: &str,
        planet: Option<&str>,
        satellite: Option<&str>,
        city: Option<&str>,
        prices: Vec<PriceEntry>,
    ) -> Tradeport {
        Tradeport {
            code: code.into(),
            name: name.into(),
            system: Some(system.into()),
            planet: planet.map(Into::into),
            satellite: satellite.map(Into::into),
            city: city.map(Into::into),
            armistice: true,
            outlaw: false,
            restricted: false,
            refinery: false,
            hull_trading: false,
            prices,
        }
    }

    pub fn ship(code: &str, name: &str, scu: u64) -> Ship {
        Ship {
            code: code.into(),
            name: name.into(),
            manufacturer: Some("DRAK".into()),
            scu,
            price: Some(1_500_000.0),
            career: Some("Transporter".into()),
            role: Some("Medium Freight".into()),
            buy_at: vec![ShopLocation {
                system: Some("ST".into()),
                planet: Some("CRU".into()),
                satellite: None,
                city: Some("ORI".into()),
                store: Some("Astro Armada".into()),
                price: Some(1_500_000.0),
            }],
            rent_at: Vec::new(),
            hull_trading: false,
        }
    }

    pub fn commodity(code: &str, name: &str, illegal: bool) -> Commodity {
        Commodity {
            code: code.into(),
            name: name.into(),
            kind: Some(if illegal { "Drug" } else { "Agricultural" }.into()),
            illegal,
            price_buy: Some(10.0),
            price_sell: Some(20.0),
            minable: false,
            refinable: false,
        }
    }

    /// Stanton with Crusader (Daymar, Orison) and Hurston (Lorville).
    pub fn stanton() -> RawCatalog {
        use TradeOperation::{Buy, Sell};

        RawCatalog {
            ships: vec![
                ship("CUTB", "Cutlass Black", 46),
                ship("HULC", "Hull C", 4608),
                ship("AURMR", "Aurora MR", 0),
            ],
            commodities: vec![
                commodity("AGRI", "Agricium", false),
                commodity("LARA", "Laranite", false),
                commodity("WIDO", "WiDoW", true),
            ],
            systems: vec![StarSystem {
                code: "ST".into(),
                name: "Stanton".into(),
            }],
            planets: vec![
                Planet {
                    code: "CRU".into(),
                    name: "Crusader".into(),
                    system: Some("ST".into()),
                },
                Planet {
                    code: "HUR".into(),
                    name: "Hurston".into(),
                    system: Some("ST".into()),
                },
            ],
            satellites: vec![Satellite {
                code: "DAYM".into(),
                name: "Daymar".into(),
                system: Some("ST".into()),
                planet: Some("CRU".into()),
            }],
            cities: vec![
                City {
                    code: "ORI".into(),
                    name: "Orison".into(),
                    system: Some("ST".into()),
                    planet: Some("CRU".into()),
                },
                City {
                    code: "LOR".into(),
                    name: "Lorville".into(),
                    system: Some("ST".into()),
                    planet: Some("HUR".into()),
                },
            ],
            tradeports: vec![
                tradeport(
                    "SHUB",
                    "Shubin Mining SCD-1",
                    "ST",
                    Some("CRU"),
                    Some("DAYM"),
                    None,
                    vec![price("AGRI", Buy, 10.0), price("LARA", Buy, 30.0)],
                ),
                tradeport(
                    "ORIP",
                    "Orison Providence Platform",
                    "ST",
                    Some("CRU"),
                    None,
                    Some("ORI"),
                    vec![price("AGRI", Sell, 20.0), price("WIDO", Buy, 100.0)],
                ),
                tradeport(
                    "LORT",
                    "Lorville CBD",
                    "ST",
                    Some("HUR"),
                    None,
                    Some("LOR"),
                    vec![
                        price("AGRI", Sell, 15.0),
                        price("LARA", Sell, 40.0),
                        price("WIDO", Sell, 150.0),
                    ],
                ),
                tradeport(
                    "BAIJ",
                    "Baijini Point",
                    "ST",
                    None,
                    None,
                    None,
                    vec![price("AGRI", Buy, 11.0), price("LARA", Sell, 35.0)],
                ),
                tradeport(
                    "EVER",
                    "Everus Harbor",
                    "ST",
                    Some("HUR"),
                    None,
                    None,
                    vec![price("AGRI", Sell, 13.0), price("LARA", Buy, 28.0)],
                ),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::stanton;
    use super::*;

    #[test]
    fn name_lookup_ignores_case() {
        let catalog = Catalog::load(stanton());
        for ship in catalog.ships.all() {
            let upper = catalog
                .lookup_by_name(EntityKind::Ship, &ship.name.to_uppercase())
                .map(|e| e.code().to_string());
            let lower = catalog
                .lookup_by_name(EntityKind::Ship, &ship.name.to_lowercase())
                .map(|e| e.code().to_string());
            assert_eq!(upper, lower);
            assert_eq!(upper.as_deref(), Some(ship.code.as_str()));
        }
        assert!(catalog
            .lookup_by_code(EntityKind::Tradeport, "shub")
            .is_some());
    }

    #[test]
    fn hull_trading_follows_allow_lists() {
        let mut raw = stanton();
        // provider flags are ignored
        raw.tradeports[0].hull_trading = true;
        let catalog = Catalog::load(raw);

        assert!(catalog.ships.by_name("Hull C").unwrap().hull_trading);
        assert!(!catalog.ships.by_name("Cutlass Black").unwrap().hull_trading);
        assert!(catalog.tradeports.by_code("BAIJ").unwrap().hull_trading);
        assert!(!catalog.tradeports.by_code("SHUB").unwrap().hull_trading);
    }

    #[test]
    fn tradeports_near_resolves_every_granularity() {
        let catalog = Catalog::load(stanton());
        let codes = |name: &str| {
            catalog
                .tradeports_near(name)
                .into_iter()
                .map(|port| port.code.clone())
                .collect::<Vec<_>>()
        };

        assert_eq!(codes("Stanton").len(), 5);
        assert_eq!(codes("crusader"), vec!["SHUB", "ORIP"]);
        assert_eq!(codes("Daymar"), vec!["SHUB"]);
        assert_eq!(codes("Lorville"), vec!["LORT"]);
        assert_eq!(codes("Baijini Point"), vec!["BAIJ"]);
        assert!(codes("Pyro").is_empty());
    }

    #[test]
    fn breadcrumb_skips_missing_levels() {
        let catalog = Catalog::load(stanton());
        let port = catalog.tradeports.by_code("SHUB").unwrap();
        assert_eq!(
            catalog.breadcrumb(port),
            "Stanton > Crusader > Daymar > Shubin Mining SCD-1"
        );
        let port = catalog.tradeports.by_code("BAIJ").unwrap();
        assert_eq!(catalog.breadcrumb(port), "Stanton > Baijini Point");
    }

    #[test]
    fn location_names_cover_all_location_tables() {
        let names = Catalog::load(stanton()).location_names();
        for expected in ["Stanton", "Crusader", "Daymar", "Orison", "Lorville CBD"] {
            assert!(names.contains(expected), "missing {expected}");
        }
        assert!(!names.contains("Agricium"));
    }

    #[test]
    fn swap_keeps_old_snapshot_alive_for_readers() {
        let handle = CatalogHandle::new(Catalog::load(stanton()));
        let before = handle.snapshot();

        let fresh = before.with_tradeports(Vec::new());
        let old = handle.swap(fresh);

        assert_eq!(old.generation(), before.generation());
        assert_eq!(before.tradeports.len(), 5);
        assert!(handle.snapshot().tradeports.is_empty());
        assert_ne!(handle.snapshot().generation(), before.generation());
        assert_eq!(handle.snapshot().ships.len(), 3);
    }
}
