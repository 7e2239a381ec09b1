//! Decoding of raw manifest rows.
//!
//! Every manifest table has the shape `(id INTEGER, json BLOB)`. The blob is a JSON
//! document followed by exactly one stray byte left over from the upstream export,
//! which has to be dropped before parsing.

use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

use crate::error::{ManifestError, Result};

const DISPLAY_PROPERTIES: &str = "displayProperties";

/// Converts the signed id column into the unsigned definition hash.
pub fn hash_from_id(id: i64) -> u32 {
    id as u32
}

/// Converts a definition hash into the signed form stored in the id column.
pub fn id_from_hash(hash: u32) -> i64 {
    i64::from(hash as i32)
}

#[derive(Debug, Clone)]
pub struct ManifestRow {
    pub hash: u32,
    pub document: Value,
}

impl ManifestRow {
    pub fn decode(id: i64, blob: &[u8]) -> Result<Self> {
        let Some((_, json)) = blob.split_last() else {
            return Err(ManifestError::MalformedRecord(format!(
                "row {} has an empty blob",
                hash_from_id(id)
            )));
        };

        let document: Value = serde_json::from_slice(json).map_err(|err| {
            ManifestError::MalformedRecord(format!("row {}: {err}", hash_from_id(id)))
        })?;

        if !document.is_object() {
            return Err(ManifestError::MalformedRecord(format!(
                "row {} is not a JSON object",
                hash_from_id(id)
            )));
        }

        Ok(Self {
            hash: hash_from_id(id),
            document,
        })
    }

    /// Decodes the document into a table-specific definition.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.document).map_err(|err| {
            ManifestError::MalformedRecord(format!("row {}: {err}", self.hash))
        })
    }

    pub fn display_string(&self, field: &str) -> Option<String> {
        display_field(&self.document, field)
    }

    pub fn display_pair(&self, first: &str, second: &str) -> Option<(String, String)> {
        Some((
            display_field(&self.document, first)?,
            display_field(&self.document, second)?,
        ))
    }

    pub fn display_triple(
        &self,
        first: &str,
        second: &str,
        third: &str,
    ) -> Option<(String, String, String)> {
        Some((
            display_field(&self.document, first)?,
            display_field(&self.document, second)?,
            display_field(&self.document, third)?,
        ))
    }
}

fn display_field(document: &Value, field: &str) -> Option<String> {
    document
        .get(DISPLAY_PROPERTIES)?
        .get(field)?
        .as_str()
        .map(ToString::to_string)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DisplayProperties {
    pub name: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemInventory {
    pub tier_type_hash: Option<u32>,
    pub recipe_item_hash: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QualityVersion {
    pub power_cap_hash: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemQuality {
    pub versions: Vec<QualityVersion>,
    pub display_version_watermark_icons: Vec<String>,
}

/// The subset of an inventory item definition the index cares about.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemDefinition {
    pub display_properties: Option<DisplayProperties>,
    pub item_category_hashes: Vec<u32>,
    pub inventory: Option<ItemInventory>,
    pub quality: Option<ItemQuality>,
    pub default_damage_type_hash: Option<u32>,
    pub secondary_icon: Option<String>,
}

impl ItemDefinition {
    pub fn name_and_icon(&self) -> Option<(String, String)> {
        let display = self.display_properties.as_ref()?;
        Some((display.name.clone()?, display.icon.clone()?))
    }

    pub fn power_cap_hash(&self) -> Option<u32> {
        self.quality.as_ref()?.versions.first()?.power_cap_hash
    }

    pub fn watermark(&self) -> Option<String> {
        self.quality
            .as_ref()?
            .display_version_watermark_icons
            .first()
            .cloned()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PowerCapDefinition {
    pub power_cap: Option<i64>,
}
