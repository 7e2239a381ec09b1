//! Manifest table names, derived table schemas and classification constants.

pub const ITEM_DEFINITIONS: &str = "DestinyInventoryItemDefinition";
pub const RECORD_DEFINITIONS: &str = "DestinyRecordDefinition";
pub const ITEM_CATEGORY_DEFINITIONS: &str = "DestinyItemCategoryDefinition";
pub const TIER_TYPE_DEFINITIONS: &str = "DestinyItemTierTypeDefinition";
pub const DAMAGE_TYPE_DEFINITIONS: &str = "DestinyDamageTypeDefinition";
pub const POWER_CAP_DEFINITIONS: &str = "DestinyPowerCapDefinition";
pub const RACE_DEFINITIONS: &str = "DestinyRaceDefinition";
pub const CLASS_DEFINITIONS: &str = "DestinyClassDefinition";

pub const AUTOCOMPLETE_ITEMS: &str = "AutocompleteItems";
pub const DEEPSIGHT_PROGRESS: &str = "DeepsightProgress";

pub const CREATE_AUTOCOMPLETE_ITEMS: &str = "
    CREATE TABLE IF NOT EXISTS AutocompleteItems (
        hash INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        tier TEXT NOT NULL,
        type TEXT NOT NULL,
        icon_path TEXT NOT NULL,
        watermark_path TEXT NOT NULL,
        is_shelved INTEGER NOT NULL,
        damage_type TEXT NOT NULL,
        damage_icon_path TEXT NOT NULL
    );";

pub const UPSERT_AUTOCOMPLETE_ITEM: &str = "INSERT OR REPLACE INTO AutocompleteItems(hash,name,tier,type,icon_path,watermark_path,is_shelved,damage_type,damage_icon_path) VALUES(?1,?2,?3,?4,?5,?6,?7,?8,?9)";

pub const SELECT_AUTOCOMPLETE_ITEMS: &str = "SELECT hash,name,tier,type,icon_path,watermark_path,is_shelved,damage_type,damage_icon_path FROM AutocompleteItems";

pub const CREATE_DEEPSIGHT_PROGRESS: &str = "
    CREATE TABLE IF NOT EXISTS DeepsightProgress (
        item_hash INTEGER PRIMARY KEY,
        record_hash INTEGER NOT NULL
    );";

pub const UPSERT_DEEPSIGHT_PROGRESS: &str =
    "INSERT OR REPLACE INTO DeepsightProgress(item_hash,record_hash) VALUES(?1,?2)";

pub const SELECT_DEEPSIGHT_PROGRESS: &str = "SELECT item_hash,record_hash FROM DeepsightProgress";

/// Weapon archetypes that are tracked. Anything else in the category table is ignored.
pub const WEAPON_CATEGORIES: [&str; 17] = [
    "Auto Rifle",
    "Hand Cannon",
    "Pulse Rifle",
    "Scout Rifle",
    "Fusion Rifle",
    "Sniper Rifle",
    "Shotgun",
    "Machine Gun",
    "Rocket Launcher",
    "Sidearm",
    "Sword",
    "Grenade Launchers",
    "Linear Fusion Rifles",
    "Submachine Guns",
    "Bows",
    "Trace Rifles",
    "Glaives",
];

pub const TRACKED_TIERS: [&str; 2] = ["Legendary", "Exotic"];

/// Items capped below this power level are considered shelved.
pub const SHELVED_POWER_CAP: i64 = 10_000;
/// Stand-in cap for items whose power cap cannot be resolved.
pub const UNCAPPED_POWER: i64 = 999_999;
pub const DAMAGE_TYPE_ROW_LIMIT: usize = 20;
pub const DEFAULT_SCAN_WINDOW: usize = 250;
