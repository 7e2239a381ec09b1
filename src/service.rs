use std::{
    collections::{HashMap, HashSet},
    hash::Hash,
    path::Path,
    sync::{Arc, Mutex, MutexGuard, RwLock},
};

use tracing::{info, warn};

use crate::{
    archive::{extract_manifest, read_version, write_version},
    autocomplete::AutocompleteIndex,
    builder::{build_shortcut_tables, load_autocomplete_items, load_crafting_records, BuildOutcome},
    classify::{classify, resolve_successors, Classified},
    error::Result,
    models::{BasicItem, ManifestRelease, SyncProgress, SyncSummary},
    record::ItemDefinition,
    reference::{CharacterDefinitions, ReferenceTables},
    store::{CancelFlag, RowStore},
    tables,
};

pub const MANIFEST_FILE_NAME: &str = "manifest.sqlite";

/// Owns everything derived from one manifest file: the row store connection, the
/// reference maps, the crafting cache and the published autocomplete index.
///
/// Replacing the manifest file resets all of them. The index is swapped in whole once
/// a build finishes, so concurrent `suggest` calls never see a partial index.
pub struct ManifestService {
    store: RowStore,
    window: usize,
    references: Mutex<ReferenceTables>,
    craftable: Mutex<Option<Arc<HashMap<u32, u32>>>>,
    index: RwLock<Arc<AutocompleteIndex>>,
    // Held for the whole of a sync so two jobs never extract or build at once.
    sync_lock: Mutex<()>,
}

impl ManifestService {
    pub fn new(data_root: &Path, window: usize) -> Self {
        Self::with_store(RowStore::new(data_root.join(MANIFEST_FILE_NAME)), window)
    }

    pub fn with_store(store: RowStore, window: usize) -> Self {
        Self {
            store,
            window: window.max(1),
            references: Mutex::new(ReferenceTables::default()),
            craftable: Mutex::new(None),
            index: RwLock::new(Arc::new(AutocompleteIndex::new())),
            sync_lock: Mutex::new(()),
        }
    }

    pub fn manifest_version(&self) -> Option<String> {
        read_version(self.store.path())
    }

    pub fn index(&self) -> Arc<AutocompleteIndex> {
        self.index
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn publish(&self, index: AutocompleteIndex) {
        *self
            .index
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(index);
    }

    fn references(&self) -> MutexGuard<'_, ReferenceTables> {
        self.references
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Loads the index from an existing autocomplete table, if there is one.
    pub fn warm(&self) -> Result<usize> {
        if !self.store.exists() || !self.store.table_exists(tables::AUTOCOMPLETE_ITEMS)? {
            return Ok(0);
        }
        let index = load_autocomplete_items(&self.store)?;
        let items = index.len();
        self.publish(index);
        Ok(items)
    }

    /// Extracts `release` if it differs from what is on disk, then makes sure the
    /// shortcut tables exist and the index is published.
    pub fn sync(
        &self,
        release: &ManifestRelease,
        mut on_progress: impl FnMut(SyncProgress),
        cancel: &CancelFlag,
    ) -> Result<SyncSummary> {
        let _guard = self
            .sync_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut summary = SyncSummary {
            version: release.version.clone(),
            ..SyncSummary::default()
        };

        if self.manifest_version().as_deref() == Some(release.version.as_str()) {
            info!(version = %release.version, "Manifest unchanged, skipping extraction");
        } else {
            self.replace_manifest(release, &mut on_progress)?;
            summary.extracted = true;
        }

        // Lookups keep working during a build; they load their own copy if needed.
        let mut refs = std::mem::take(&mut *self.references());
        let outcome = build_shortcut_tables(&self.store, &mut refs, self.window, cancel, |decile| {
            on_progress(SyncProgress::Build { decile })
        });
        *self.references() = refs;
        let outcome = outcome?;

        match outcome {
            BuildOutcome::Loaded(index) => {
                summary.indexed_items = index.len();
                self.publish(index);
            }
            BuildOutcome::Built { index, report } => {
                summary.rebuilt = true;
                summary.indexed_items = index.len();
                summary.successors_resolved = report.successors_resolved;
                summary.craftable_records = report.craftable_records;
                self.publish(index);
                *self.craftable_cache() = None;
            }
        }

        info!(
            version = %summary.version,
            extracted = summary.extracted,
            rebuilt = summary.rebuilt,
            items = summary.indexed_items,
            "Manifest sync finished"
        );
        Ok(summary)
    }

    fn replace_manifest(
        &self,
        release: &ManifestRelease,
        on_progress: &mut impl FnMut(SyncProgress),
    ) -> Result<()> {
        // Lookups keep reading the old database while the archive is unpacked.
        let staged = extract_manifest(&release.archive_path, self.store.path(), |decile, bytes| {
            on_progress(SyncProgress::Unzip { decile, bytes })
        })?;
        self.store.replace_file(&staged.path)?;
        write_version(self.store.path(), &release.version)?;
        info!(version = %release.version, bytes = staged.bytes, "Manifest replaced");

        // Anything a lookup cached from the old file during the unzip goes too.
        *self.references() = ReferenceTables::default();
        *self.craftable_cache() = None;
        self.publish(AutocompleteIndex::new());
        Ok(())
    }

    fn craftable_cache(&self) -> MutexGuard<'_, Option<Arc<HashMap<u32, u32>>>> {
        self.craftable
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn suggest(&self, prefix: &str, limit: usize) -> Vec<BasicItem> {
        self.index().suggest(prefix, limit)
    }

    /// Classifies the given item hashes straight from the manifest. Successors only
    /// resolve against precursors found in the same batch.
    pub fn resolve_items(&self, hashes: &HashSet<u32>) -> Result<Vec<BasicItem>> {
        let mut refs = self.references();
        refs.load_all(&self.store)?;

        let ids: Vec<u32> = hashes.iter().copied().collect();
        let rows = self.store.query_by_ids(tables::ITEM_DEFINITIONS, &ids)?;

        let mut batch = AutocompleteIndex::new();
        let mut successors = HashMap::new();
        for raw in rows {
            let Ok(row) = raw.decode() else {
                continue;
            };
            match classify(&row, &refs) {
                Some(Classified::Item { item, .. }) => {
                    batch.insert(item);
                }
                Some(Classified::Successor(entry)) => {
                    successors.insert(entry.name.clone(), entry);
                }
                None => {}
            }
        }
        resolve_successors(&mut batch, successors);

        Ok(batch.items().cloned().collect())
    }

    /// Maps each character to the banner path of the emblem it has equipped.
    pub fn emblem_paths<K>(&self, emblems: &HashMap<u32, K>) -> Result<HashMap<K, String>>
    where
        K: Clone + Eq + Hash,
    {
        let hashes: Vec<u32> = emblems.keys().copied().collect();
        let rows = self.store.query_by_ids(tables::ITEM_DEFINITIONS, &hashes)?;

        let mut paths = HashMap::new();
        for raw in rows {
            let Ok(row) = raw.decode() else {
                continue;
            };
            let Some(owner) = emblems.get(&row.hash) else {
                continue;
            };
            match row.parse::<ItemDefinition>().ok().and_then(|d| d.secondary_icon) {
                Some(path) => {
                    paths.insert(owner.clone(), path);
                }
                None => warn!(hash = row.hash, "Emblem has no secondary icon"),
            }
        }
        Ok(paths)
    }

    pub fn character_definitions(&self) -> Result<CharacterDefinitions> {
        let mut refs = self.references();
        Ok(refs.characters(&self.store)?.clone())
    }

    /// Item hash to crafting record hash, read once from the derived table.
    pub fn craftable_records(&self) -> Result<Arc<HashMap<u32, u32>>> {
        let mut cache = self.craftable_cache();
        if let Some(records) = cache.as_ref() {
            return Ok(records.clone());
        }
        let records = Arc::new(load_crafting_records(&self.store)?);
        *cache = Some(records.clone());
        Ok(records)
    }
}
