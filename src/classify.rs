//! Turns an inventory item row into a [`BasicItem`], shared by the table build and
//! on-demand hash resolution.

use std::collections::HashMap;

use tracing::debug;

use crate::{
    autocomplete::AutocompleteIndex,
    models::BasicItem,
    record::{ItemDefinition, ManifestRow},
    reference::ReferenceTables,
    tables,
};

/// An item that has display data but no damage type of its own. It takes its
/// classification from an already indexed item with the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuccessorEntry {
    pub hash: u32,
    pub name: String,
    pub icon_path: String,
    pub watermark_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    Item {
        item: BasicItem,
        recipe_item_hash: Option<u32>,
    },
    Successor(SuccessorEntry),
}

/// Returns `None` for rows that fail any filter.
pub fn classify(row: &ManifestRow, refs: &ReferenceTables) -> Option<Classified> {
    let definition: ItemDefinition = match row.parse() {
        Ok(definition) => definition,
        Err(err) => {
            debug!(hash = row.hash, "Skipping undecodable item: {err}");
            return None;
        }
    };

    // Category first: it rejects the bulk of the table.
    let category = definition
        .item_category_hashes
        .iter()
        .find_map(|hash| refs.weapon_categories.get(hash))?;

    let tier = definition
        .inventory
        .as_ref()
        .and_then(|inventory| inventory.tier_type_hash)
        .and_then(|hash| refs.tiers.get(&hash))?;

    let (name, icon_path) = definition.name_and_icon()?;

    let power_cap = definition
        .power_cap_hash()
        .and_then(|hash| refs.power_caps.get(&hash).copied())
        .unwrap_or(tables::UNCAPPED_POWER);
    let watermark_path = definition.watermark()?;

    let Some(damage_hash) = definition.default_damage_type_hash else {
        return Some(Classified::Successor(SuccessorEntry {
            hash: row.hash,
            name,
            icon_path,
            watermark_path,
        }));
    };
    let damage = refs.damage_types.get(&damage_hash)?;

    Some(Classified::Item {
        item: BasicItem {
            hash: row.hash,
            name,
            tier: tier.clone(),
            r#type: category.clone(),
            icon_path,
            watermark_path,
            is_shelved: power_cap < tables::SHELVED_POWER_CAP,
            damage_type: damage.name.clone(),
            damage_icon_path: damage.icon_path.clone(),
        },
        recipe_item_hash: definition
            .inventory
            .as_ref()
            .and_then(|inventory| inventory.recipe_item_hash),
    })
}

/// Patches every successor whose name is already in `index`, copying the
/// precursor's classification. Returns how many were resolved; the rest are dropped.
pub fn resolve_successors(
    index: &mut AutocompleteIndex,
    successors: HashMap<String, SuccessorEntry>,
) -> usize {
    let mut resolved = 0;
    for (name, successor) in successors {
        let Some(precursor) = index.get(&name) else {
            debug!(name = %name, hash = successor.hash, "Dropping successor without precursor");
            continue;
        };

        // Successors are always reported as not shelved, whatever their own cap says.
        let item = BasicItem {
            hash: successor.hash,
            name: successor.name,
            tier: precursor.tier.clone(),
            r#type: precursor.r#type.clone(),
            icon_path: successor.icon_path,
            watermark_path: successor.watermark_path,
            is_shelved: false,
            damage_type: precursor.damage_type.clone(),
            damage_icon_path: precursor.damage_icon_path.clone(),
        };
        index.insert_successor(item);
        resolved += 1;
    }
    resolved
}
