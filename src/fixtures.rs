//! Throwaway manifest databases for tests.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::{record::id_from_hash, store::RowStore, tables};

pub const LEGENDARY: u32 = 100;
pub const EXOTIC: u32 = 102;
pub const COMMON: u32 = 101;
pub const HAND_CANNON: u32 = 200;
pub const SCOUT_RIFLE: u32 = 202;
pub const ARMOR: u32 = 201;
pub const SOLAR: u32 = 300;
pub const VOID: u32 = 301;
pub const UNCAPPED: u32 = 1;
pub const SUNSET: u32 = 2;

pub const SOURCE_TABLES: [&str; 8] = [
    tables::ITEM_DEFINITIONS,
    tables::RECORD_DEFINITIONS,
    tables::ITEM_CATEGORY_DEFINITIONS,
    tables::TIER_TYPE_DEFINITIONS,
    tables::DAMAGE_TYPE_DEFINITIONS,
    tables::POWER_CAP_DEFINITIONS,
    tables::RACE_DEFINITIONS,
    tables::CLASS_DEFINITIONS,
];

pub struct ManifestFixture {
    _dir: TempDir,
    path: PathBuf,
    conn: Connection,
}

impl ManifestFixture {
    /// A manifest with every source table present and empty.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("manifest.sqlite");
        let conn = Connection::open(&path).expect("open fixture db");
        for table in SOURCE_TABLES {
            create_table(&conn, table);
        }
        Self {
            _dir: dir,
            path,
            conn,
        }
    }

    /// Reference tables filled with a small, known vocabulary.
    pub fn with_reference_data() -> Self {
        let fixture = Self::new();
        fixture.insert(tables::TIER_TYPE_DEFINITIONS, LEGENDARY, &display("Legendary", None));
        fixture.insert(tables::TIER_TYPE_DEFINITIONS, COMMON, &display("Common", None));
        fixture.insert(tables::TIER_TYPE_DEFINITIONS, EXOTIC, &display("Exotic", None));
        fixture.insert(tables::ITEM_CATEGORY_DEFINITIONS, HAND_CANNON, &display("Hand Cannon", None));
        fixture.insert(tables::ITEM_CATEGORY_DEFINITIONS, ARMOR, &display("Armor", None));
        fixture.insert(tables::ITEM_CATEGORY_DEFINITIONS, SCOUT_RIFLE, &display("Scout Rifle", None));
        fixture.insert(tables::DAMAGE_TYPE_DEFINITIONS, SOLAR, &display("Solar", Some("solar.png")));
        fixture.insert(tables::DAMAGE_TYPE_DEFINITIONS, VOID, &display("Void", Some("void.png")));
        fixture.insert(tables::POWER_CAP_DEFINITIONS, UNCAPPED, &json!({"powerCap": 999_999}));
        fixture.insert(tables::POWER_CAP_DEFINITIONS, SUNSET, &json!({"powerCap": 1_060}));
        fixture.insert(tables::RACE_DEFINITIONS, 10, &display("Human", None));
        fixture.insert(tables::RACE_DEFINITIONS, 11, &display("Awoken", None));
        fixture.insert(tables::CLASS_DEFINITIONS, 20, &display("Titan", None));
        fixture
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store(&self) -> RowStore {
        RowStore::new(self.path.clone())
    }

    pub fn insert(&self, table: &str, hash: u32, document: &Value) {
        create_table(&self.conn, table);
        let mut blob = serde_json::to_vec(document).expect("serialize fixture row");
        blob.push(0);
        self.conn
            .execute(
                &format!("INSERT OR REPLACE INTO \"{table}\"(id, json) VALUES(?1, ?2)"),
                params![id_from_hash(hash), blob],
            )
            .expect("insert fixture row");
    }

    pub fn insert_raw(&self, table: &str, hash: u32, blob: &[u8]) {
        create_table(&self.conn, table);
        self.conn
            .execute(
                &format!("INSERT OR REPLACE INTO \"{table}\"(id, json) VALUES(?1, ?2)"),
                params![id_from_hash(hash), blob],
            )
            .expect("insert raw fixture row");
    }

    pub fn execute(&self, sql: &str) {
        self.conn.execute_batch(sql).expect("run fixture sql");
    }

    pub fn drop_table(&self, table: &str) {
        self.conn
            .execute(&format!("DROP TABLE IF EXISTS \"{table}\""), [])
            .expect("drop fixture table");
    }
}

fn create_table(conn: &Connection, table: &str) {
    conn.execute(
        &format!("CREATE TABLE IF NOT EXISTS \"{table}\" (id INTEGER PRIMARY KEY, json BLOB)"),
        [],
    )
    .expect("create fixture table");
}

pub fn display(name: &str, icon: Option<&str>) -> Value {
    match icon {
        Some(icon) => json!({"displayProperties": {"name": name, "icon": icon}}),
        None => json!({"displayProperties": {"name": name}}),
    }
}

/// An inventory item row shaped like a weapon definition.
pub fn weapon(name: &str, icon: &str, damage: Option<u32>, power_cap: u32) -> Value {
    let mut item = json!({
        "itemCategoryHashes": [HAND_CANNON],
        "inventory": {"tierTypeHash": LEGENDARY},
        "displayProperties": {"name": name, "icon": icon},
        "quality": {
            "versions": [{"powerCapHash": power_cap}],
            "displayVersionWatermarkIcons": ["wm.png"]
        },
    });
    if let Some(damage) = damage {
        item["defaultDamageTypeHash"] = json!(damage);
    }
    item
}
