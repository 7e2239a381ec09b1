//! Small definition tables loaded once per manifest and kept in memory.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::{
    error::Result,
    record::{ManifestRow, PowerCapDefinition},
    store::RowStore,
    tables,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DamageType {
    pub name: String,
    pub icon_path: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterDefinitions {
    pub races: HashMap<u32, String>,
    pub classes: HashMap<u32, String>,
}

/// Memoized hash lookups for one manifest version. Each map is filled by a single
/// full scan the first time it is asked for and reused afterwards.
#[derive(Debug, Default)]
pub struct ReferenceTables {
    pub weapon_categories: HashMap<u32, String>,
    pub tiers: HashMap<u32, String>,
    pub damage_types: HashMap<u32, DamageType>,
    pub power_caps: HashMap<u32, i64>,
    characters: Option<CharacterDefinitions>,
}

impl ReferenceTables {
    pub fn load_all(&mut self, store: &RowStore) -> Result<()> {
        self.load_weapon_categories(store)?;
        self.load_tiers(store)?;
        self.load_damage_types(store)?;
        self.load_power_caps(store)?;
        self.characters(store)?;
        Ok(())
    }

    pub fn load_weapon_categories(&mut self, store: &RowStore) -> Result<()> {
        load(
            store,
            tables::ITEM_CATEGORY_DEFINITIONS,
            None,
            &mut self.weapon_categories,
            |row| {
                row.display_string("name")
                    .filter(|name| tables::WEAPON_CATEGORIES.contains(&name.as_str()))
            },
        )
    }

    pub fn load_tiers(&mut self, store: &RowStore) -> Result<()> {
        load(
            store,
            tables::TIER_TYPE_DEFINITIONS,
            None,
            &mut self.tiers,
            |row| {
                row.display_string("name")
                    .filter(|name| tables::TRACKED_TIERS.contains(&name.as_str()))
            },
        )
    }

    pub fn load_damage_types(&mut self, store: &RowStore) -> Result<()> {
        load(
            store,
            tables::DAMAGE_TYPE_DEFINITIONS,
            Some(tables::DAMAGE_TYPE_ROW_LIMIT),
            &mut self.damage_types,
            |row| {
                row.display_pair("name", "icon")
                    .map(|(name, icon_path)| DamageType { name, icon_path })
            },
        )
    }

    pub fn load_power_caps(&mut self, store: &RowStore) -> Result<()> {
        load(
            store,
            tables::POWER_CAP_DEFINITIONS,
            None,
            &mut self.power_caps,
            |row| row.parse::<PowerCapDefinition>().ok()?.power_cap,
        )
    }

    /// Race and class names, scanned independently and cached as one pair.
    pub fn characters(&mut self, store: &RowStore) -> Result<&CharacterDefinitions> {
        if self.characters.is_none() {
            let mut races = HashMap::new();
            let mut classes = HashMap::new();
            load(store, tables::RACE_DEFINITIONS, None, &mut races, |row| {
                row.display_string("name")
            })?;
            load(store, tables::CLASS_DEFINITIONS, None, &mut classes, |row| {
                row.display_string("name")
            })?;
            self.characters = Some(CharacterDefinitions { races, classes });
        }
        Ok(&*self.characters.get_or_insert_with(CharacterDefinitions::default))
    }
}

/// Fills `dest` from `table` unless it already holds entries. Rows for which
/// `to_entry` returns `None` are skipped; an absent table is an error.
fn load<T>(
    store: &RowStore,
    table: &str,
    limit: Option<usize>,
    dest: &mut HashMap<u32, T>,
    to_entry: impl Fn(&ManifestRow) -> Option<T>,
) -> Result<()> {
    if !dest.is_empty() {
        return Ok(());
    }

    let rows = store.scan(table, limit)?;
    let scanned = rows.len();
    for raw in rows {
        let row = match raw.decode() {
            Ok(row) => row,
            Err(err) => {
                debug!(table, "Skipping reference row: {err}");
                continue;
            }
        };
        if let Some(entry) = to_entry(&row) {
            dest.insert(row.hash, entry);
        }
    }

    info!(table, scanned, kept = dest.len(), "Loaded reference table");
    Ok(())
}
