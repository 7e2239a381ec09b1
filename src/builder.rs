//! Builds the derived shortcut tables (`AutocompleteItems`, `DeepsightProgress`)
//! from a freshly extracted manifest.
//!
//! The autocomplete table doubles as the completion marker: if it exists the
//! manifest has already been processed and its rows are loaded as-is. It is only
//! written after every structural check has passed and the crafting table is in
//! place, so a failed build leaves nothing behind that could be mistaken for a
//! finished one.

use std::collections::HashMap;

use rusqlite::params;
use tracing::{debug, info, warn};

use crate::{
    autocomplete::AutocompleteIndex,
    classify::{classify, resolve_successors, Classified, SuccessorEntry},
    error::{ManifestError, Result},
    models::BasicItem,
    progress::DecileTracker,
    reference::ReferenceTables,
    store::{CancelFlag, RowStore},
    tables,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub scanned: u64,
    pub inserted: usize,
    pub successors_resolved: usize,
    pub successors_dropped: usize,
    pub craftable_records: usize,
}

#[derive(Debug)]
pub enum BuildOutcome {
    /// The derived tables already existed and were loaded without a rebuild.
    Loaded(AutocompleteIndex),
    Built {
        index: AutocompleteIndex,
        report: BuildReport,
    },
}

pub fn build_shortcut_tables(
    store: &RowStore,
    refs: &mut ReferenceTables,
    window: usize,
    cancel: &CancelFlag,
    mut on_progress: impl FnMut(u8),
) -> Result<BuildOutcome> {
    if store.table_exists(tables::AUTOCOMPLETE_ITEMS)? {
        let index = load_autocomplete_items(store)?;
        info!(items = index.len(), "Shortcut tables already built, loaded index");
        return Ok(BuildOutcome::Loaded(index));
    }

    refs.load_all(store)?;

    let item_rows = require_rows(store, tables::ITEM_DEFINITIONS)?;
    require_rows(store, tables::RECORD_DEFINITIONS)?;

    let mut index = AutocompleteIndex::new();
    let mut successors: HashMap<String, SuccessorEntry> = HashMap::new();
    let mut craftable: HashMap<String, u32> = HashMap::new();
    let mut report = BuildReport::default();
    let mut tracker = DecileTracker::new(item_rows);
    tracker.advance(0, &mut on_progress);

    let mut processed = 0_u64;
    report.scanned = store.scan_windowed(tables::ITEM_DEFINITIONS, window, cancel, |raw| {
        processed += 1;
        match raw.decode() {
            Ok(row) => match classify(&row, refs) {
                Some(Classified::Item {
                    item,
                    recipe_item_hash,
                }) => {
                    if recipe_item_hash.is_some() {
                        craftable.entry(item.name.clone()).or_insert(item.hash);
                    }
                    if index.insert(item) {
                        report.inserted += 1;
                    }
                }
                Some(Classified::Successor(entry)) => {
                    successors.insert(entry.name.clone(), entry);
                }
                None => {}
            },
            Err(err) => debug!(id = raw.id, "Skipping item row: {err}"),
        }
        tracker.advance(processed, &mut on_progress);
    })?;

    if report.inserted == 0 {
        warn!(
            scanned = report.scanned,
            "Item scan classified nothing, refusing to write shortcut tables"
        );
        return Err(ManifestError::NoItemsClassified);
    }

    let pending = successors.len();
    report.successors_resolved = resolve_successors(&mut index, successors);
    report.successors_dropped = pending - report.successors_resolved;

    // The autocomplete table marks the build as done, so it is written last.
    let crafting = link_craftable_records(store, &craftable, window, cancel)?;
    persist_crafting_records(store, &crafting)?;
    report.craftable_records = crafting.len();
    info!(records = crafting.len(), "Crafting record table written");

    persist_autocomplete_items(store, &index)?;
    info!(
        scanned = report.scanned,
        inserted = report.inserted,
        successors_resolved = report.successors_resolved,
        successors_dropped = report.successors_dropped,
        "Autocomplete table written"
    );

    Ok(BuildOutcome::Built { index, report })
}

fn require_rows(store: &RowStore, table: &str) -> Result<u64> {
    let rows = store.count_rows(table)?;
    if rows == 0 {
        warn!(table, "Source table is empty, manifest extraction looks incomplete");
        return Err(ManifestError::EmptySourceTable(table.to_string()));
    }
    Ok(rows)
}

/// Joins craftable item names against record display names: item hash to record hash.
fn link_craftable_records(
    store: &RowStore,
    craftable: &HashMap<String, u32>,
    window: usize,
    cancel: &CancelFlag,
) -> Result<HashMap<u32, u32>> {
    let mut links = HashMap::new();
    store.scan_windowed(tables::RECORD_DEFINITIONS, window, cancel, |raw| {
        let Ok(row) = raw.decode() else {
            return;
        };
        if let Some(item_hash) = row
            .display_string("name")
            .and_then(|name| craftable.get(&name))
        {
            links.insert(*item_hash, row.hash);
        }
    })?;
    Ok(links)
}

pub fn persist_autocomplete_items(store: &RowStore, index: &AutocompleteIndex) -> Result<()> {
    store.write_transaction(|tx| {
        tx.execute_batch(tables::CREATE_AUTOCOMPLETE_ITEMS)?;
        let mut stmt = tx.prepare(tables::UPSERT_AUTOCOMPLETE_ITEM)?;
        for item in index.items() {
            stmt.execute(params![
                i64::from(item.hash),
                item.name,
                item.tier,
                item.r#type,
                item.icon_path,
                item.watermark_path,
                item.is_shelved,
                item.damage_type,
                item.damage_icon_path,
            ])?;
        }
        Ok(())
    })
}

pub fn persist_crafting_records(store: &RowStore, records: &HashMap<u32, u32>) -> Result<()> {
    store.write_transaction(|tx| {
        tx.execute_batch(tables::CREATE_DEEPSIGHT_PROGRESS)?;
        let mut stmt = tx.prepare(tables::UPSERT_DEEPSIGHT_PROGRESS)?;
        for (item_hash, record_hash) in records {
            stmt.execute(params![i64::from(*item_hash), i64::from(*record_hash)])?;
        }
        Ok(())
    })
}

pub fn load_autocomplete_items(store: &RowStore) -> Result<AutocompleteIndex> {
    store.read(|conn| {
        let mut stmt = conn.prepare(tables::SELECT_AUTOCOMPLETE_ITEMS)?;
        let rows = stmt.query_map([], |row| {
            Ok(BasicItem {
                hash: row.get::<_, i64>(0)? as u32,
                name: row.get(1)?,
                tier: row.get(2)?,
                r#type: row.get(3)?,
                icon_path: row.get(4)?,
                watermark_path: row.get(5)?,
                is_shelved: row.get(6)?,
                damage_type: row.get(7)?,
                damage_icon_path: row.get(8)?,
            })
        })?;
        let mut index = AutocompleteIndex::new();
        for row in rows {
            index.insert(row?);
        }
        Ok(index)
    })
}

pub fn load_crafting_records(store: &RowStore) -> Result<HashMap<u32, u32>> {
    store.read(|conn| {
        if !crate::store::table_exists(conn, tables::DEEPSIGHT_PROGRESS)? {
            return Err(ManifestError::MissingTable(
                tables::DEEPSIGHT_PROGRESS.to_string(),
            ));
        }
        let mut stmt = conn.prepare(tables::SELECT_DEEPSIGHT_PROGRESS)?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)? as u32, row.get::<_, i64>(1)? as u32))
        })?;
        let mut records = HashMap::new();
        for row in rows {
            let (item_hash, record_hash) = row?;
            records.insert(item_hash, record_hash);
        }
        Ok(records)
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::fixtures::{self, ManifestFixture};

    fn fatebringer() -> serde_json::Value {
        fixtures::weapon("Fatebringer", "fb.png", Some(fixtures::SOLAR), fixtures::UNCAPPED)
    }

    fn with_record(fixture: &ManifestFixture) {
        fixture.insert(
            tables::RECORD_DEFINITIONS,
            7_000,
            &fixtures::display("Unrelated Triumph", None),
        );
    }

    fn build(fixture: &ManifestFixture) -> Result<BuildOutcome> {
        build_shortcut_tables(
            &fixture.store(),
            &mut ReferenceTables::default(),
            tables::DEFAULT_SCAN_WINDOW,
            &CancelFlag::default(),
            |_| {},
        )
    }

    #[test]
    fn builds_index_for_a_single_weapon() {
        let fixture = ManifestFixture::with_reference_data();
        fixture.insert(tables::ITEM_DEFINITIONS, 555, &fatebringer());
        with_record(&fixture);

        let BuildOutcome::Built { index, report } = build(&fixture).unwrap() else {
            panic!("expected a fresh build");
        };
        assert_eq!(report.inserted, 1);
        let found = index.suggest("FATE", 5);
        assert_eq!(
            found,
            vec![BasicItem {
                hash: 555,
                name: "Fatebringer".into(),
                tier: "Legendary".into(),
                r#type: "Hand Cannon".into(),
                icon_path: "fb.png".into(),
                watermark_path: "wm.png".into(),
                is_shelved: false,
                damage_type: "Solar".into(),
                damage_icon_path: "solar.png".into(),
            }]
        );

        let persisted = load_autocomplete_items(&fixture.store()).unwrap();
        assert_eq!(persisted.get("fatebringer"), index.get("Fatebringer"));
    }

    #[test]
    fn second_build_short_circuits() {
        let fixture = ManifestFixture::with_reference_data();
        fixture.insert(tables::ITEM_DEFINITIONS, 555, &fatebringer());
        with_record(&fixture);
        assert!(matches!(build(&fixture).unwrap(), BuildOutcome::Built { .. }));

        // Rows added after the build must not show up: no rescan happens.
        fixture.insert(
            tables::ITEM_DEFINITIONS,
            600,
            &fixtures::weapon("Palindrome", "p.png", Some(fixtures::VOID), fixtures::UNCAPPED),
        );
        let BuildOutcome::Loaded(index) = build(&fixture).unwrap() else {
            panic!("expected the existing table to be loaded");
        };
        assert_eq!(index.len(), 1);
        assert!(index.get("Palindrome").is_none());
        assert_eq!(load_autocomplete_items(&fixture.store()).unwrap().len(), 1);
    }

    #[test]
    fn successor_inherits_precursor_classification() {
        let fixture = ManifestFixture::with_reference_data();
        fixture.insert(
            tables::ITEM_DEFINITIONS,
            555,
            &fixtures::weapon("Fatebringer", "fb.png", Some(fixtures::VOID), fixtures::SUNSET),
        );
        fixture.insert(
            tables::ITEM_DEFINITIONS,
            556,
            &fixtures::weapon("Fatebringer", "fb-new.png", None, fixtures::SUNSET),
        );
        fixture.insert(
            tables::ITEM_DEFINITIONS,
            557,
            &fixtures::weapon("Nameless Midnight", "nm.png", None, fixtures::UNCAPPED),
        );
        with_record(&fixture);

        let BuildOutcome::Built { index, report } = build(&fixture).unwrap() else {
            panic!("expected a fresh build");
        };
        assert_eq!(report.successors_resolved, 1);
        assert_eq!(report.successors_dropped, 1);
        assert_eq!(index.len(), 1);

        let item = index.get("Fatebringer").unwrap();
        assert_eq!(item.hash, 556);
        assert_eq!(item.icon_path, "fb-new.png");
        assert_eq!(item.damage_type, "Void");
        assert_eq!(item.tier, "Legendary");
        assert_eq!(item.r#type, "Hand Cannon");
        // Documented quirk: successors never count as shelved, even with a sunset cap.
        assert!(!item.is_shelved);

        assert!(index.suggest("Nameless", 0).is_empty());
        let persisted = load_autocomplete_items(&fixture.store()).unwrap();
        assert_eq!(persisted.len(), 1);
        assert!(persisted.get("Nameless Midnight").is_none());
    }

    #[test]
    fn empty_item_table_is_fatal_and_writes_nothing() {
        let fixture = ManifestFixture::with_reference_data();
        with_record(&fixture);

        let err = build(&fixture).unwrap_err();
        assert!(
            matches!(&err, ManifestError::EmptySourceTable(table) if table == tables::ITEM_DEFINITIONS)
        );
        assert!(!fixture.store().table_exists(tables::AUTOCOMPLETE_ITEMS).unwrap());
    }

    #[test]
    fn empty_record_table_is_fatal() {
        let fixture = ManifestFixture::with_reference_data();
        fixture.insert(tables::ITEM_DEFINITIONS, 555, &fatebringer());

        let err = build(&fixture).unwrap_err();
        assert!(
            matches!(&err, ManifestError::EmptySourceTable(table) if table == tables::RECORD_DEFINITIONS)
        );
    }

    #[test]
    fn missing_reference_table_aborts() {
        let fixture = ManifestFixture::with_reference_data();
        fixture.insert(tables::ITEM_DEFINITIONS, 555, &fatebringer());
        with_record(&fixture);
        fixture.drop_table(tables::DAMAGE_TYPE_DEFINITIONS);

        assert!(matches!(build(&fixture), Err(ManifestError::MissingTable(_))));
        assert!(!fixture.store().table_exists(tables::AUTOCOMPLETE_ITEMS).unwrap());
    }

    #[test]
    fn nothing_classified_is_fatal() {
        let fixture = ManifestFixture::with_reference_data();
        let mut armor = fatebringer();
        armor["itemCategoryHashes"] = json!([fixtures::ARMOR]);
        fixture.insert(tables::ITEM_DEFINITIONS, 1, &armor);
        fixture.insert_raw(tables::ITEM_DEFINITIONS, 2, b"{broken");
        with_record(&fixture);

        assert!(matches!(build(&fixture), Err(ManifestError::NoItemsClassified)));
        assert!(!fixture.store().table_exists(tables::AUTOCOMPLETE_ITEMS).unwrap());
    }

    #[test]
    fn craftable_items_are_linked_to_records() {
        let fixture = ManifestFixture::with_reference_data();
        let mut craftable = fatebringer();
        craftable["inventory"]["recipeItemHash"] = json!(9_999);
        fixture.insert(tables::ITEM_DEFINITIONS, 555, &craftable);
        fixture.insert(
            tables::RECORD_DEFINITIONS,
            7_001,
            &fixtures::display("Fatebringer", None),
        );
        with_record(&fixture);

        let BuildOutcome::Built { report, .. } = build(&fixture).unwrap() else {
            panic!("expected a fresh build");
        };
        assert_eq!(report.craftable_records, 1);
        let records = load_crafting_records(&fixture.store()).unwrap();
        assert_eq!(records.get(&555), Some(&7_001));
    }

    #[test]
    fn progress_reports_every_decile() {
        let fixture = ManifestFixture::with_reference_data();
        for hash in 1..=25 {
            fixture.insert(
                tables::ITEM_DEFINITIONS,
                hash,
                &fixtures::weapon(&format!("Gun {hash}"), "g.png", Some(fixtures::SOLAR), fixtures::UNCAPPED),
            );
        }
        with_record(&fixture);

        let mut deciles = Vec::new();
        build_shortcut_tables(
            &fixture.store(),
            &mut ReferenceTables::default(),
            4,
            &CancelFlag::default(),
            |decile| deciles.push(decile),
        )
        .unwrap();
        assert_eq!(deciles, (0..10).collect::<Vec<u8>>());
    }

    #[test]
    fn cancelled_build_leaves_no_table() {
        let fixture = ManifestFixture::with_reference_data();
        fixture.insert(tables::ITEM_DEFINITIONS, 555, &fatebringer());
        with_record(&fixture);
        let cancel = CancelFlag::default();
        cancel.cancel();

        let err = build_shortcut_tables(
            &fixture.store(),
            &mut ReferenceTables::default(),
            tables::DEFAULT_SCAN_WINDOW,
            &cancel,
            |_| {},
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::Cancelled));
        assert!(!fixture.store().table_exists(tables::AUTOCOMPLETE_ITEMS).unwrap());
    }

    #[test]
    fn failed_record_scan_leaves_no_completion_marker() {
        let fixture = ManifestFixture::with_reference_data();
        fixture.insert(tables::ITEM_DEFINITIONS, 555, &fatebringer());
        fixture.drop_table(tables::RECORD_DEFINITIONS);
        fixture.execute(&format!(
            "CREATE TABLE \"{}\" (id INTEGER PRIMARY KEY, name TEXT)",
            tables::RECORD_DEFINITIONS
        ));
        fixture.execute(&format!(
            "INSERT INTO \"{}\"(id, name) VALUES(7000, 'Triumph')",
            tables::RECORD_DEFINITIONS
        ));

        let err = build(&fixture).unwrap_err();
        assert!(matches!(err, ManifestError::Sqlite(_)));
        let store = fixture.store();
        assert!(!store.table_exists(tables::AUTOCOMPLETE_ITEMS).unwrap());
        assert!(!store.table_exists(tables::DEEPSIGHT_PROGRESS).unwrap());
    }
}
