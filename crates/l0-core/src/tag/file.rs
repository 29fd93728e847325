//! Durable tag store persisted as a JSON table in the state directory.
//!
//! The table mirrors a hash/range key layout: the hash key is the entity
//! type, the range key is `<entity_id>#<key>`. Writes go to a fresh temp file
//! that is then renamed over the table, so readers never observe a torn or
//! missing table. Read-modify-write cycles hold an exclusive lock on a
//! sibling `tags.json.lock`, which serializes writers across handles and
//! processes.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::types::EntityType;

use super::{Tag, TagStore, Tags};

const TABLE_FILE: &str = "tags.json";
const LOCK_FILE: &str = "tags.json.lock";
const TABLE_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct TagTable {
    version: u32,
    /// entity type -> range key -> tag
    partitions: BTreeMap<EntityType, BTreeMap<String, Tag>>,
}

impl TagTable {
    fn range_key(entity_id: &str, key: &str) -> String {
        format!("{}#{}", entity_id, key)
    }

    fn purge_expired(&mut self) -> usize {
        let now = Utc::now();
        let mut purged = 0;
        for partition in self.partitions.values_mut() {
            let before = partition.len();
            partition.retain(|_, tag| !tag.is_expired(now));
            purged += before - partition.len();
        }
        self.partitions.retain(|_, partition| !partition.is_empty());
        purged
    }

    fn live(&self, entity_type: Option<EntityType>) -> Tags {
        let now = Utc::now();
        self.partitions
            .iter()
            .filter(|(t, _)| entity_type.is_none_or(|wanted| **t == wanted))
            .flat_map(|(_, partition)| partition.values())
            .filter(|tag| !tag.is_expired(now))
            .cloned()
            .collect::<Tags>()
            .sorted()
    }
}

/// Tag store backed by a single JSON table file.
///
/// Every operation reads the table from disk, so separate store handles on
/// the same directory observe each other's writes.
#[derive(Debug)]
pub struct FileTagStore {
    table_path: PathBuf,
    lock_path: PathBuf,
}

impl FileTagStore {
    /// Default table location
    ///
    /// # Returns
    /// - Unix: `$XDG_STATE_HOME/l0` or `~/.local/state/l0`
    /// - Windows: `%LOCALAPPDATA%\l0`
    pub fn default_state_dir() -> anyhow::Result<PathBuf> {
        let base = dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .ok_or_else(|| anyhow::anyhow!("Cannot determine state directory"))?;
        Ok(base.join("l0"))
    }

    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        let state_dir = state_dir.into();
        Self {
            table_path: state_dir.join(TABLE_FILE),
            lock_path: state_dir.join(LOCK_FILE),
        }
    }

    pub fn table_path(&self) -> &Path {
        &self.table_path
    }

    fn load(&self) -> anyhow::Result<TagTable> {
        if !self.table_path.exists() {
            anyhow::bail!(
                "Tag table {} does not exist; run init first",
                self.table_path.display()
            );
        }
        let bytes = fs::read(&self.table_path)
            .with_context(|| format!("Failed to read tag table: {}", self.table_path.display()))?;
        let table: TagTable = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse tag table: {}", self.table_path.display()))?;
        if table.version != TABLE_VERSION {
            anyhow::bail!(
                "Unsupported tag table version {} (expected {})",
                table.version,
                TABLE_VERSION
            );
        }
        Ok(table)
    }

    /// Exclusive lock on the table, released when the returned file drops.
    fn lock(&self) -> anyhow::Result<File> {
        let dir = self.state_dir()?;
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .with_context(|| format!("Failed to open tag table lock: {}", self.lock_path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("Failed to lock {}", self.lock_path.display()))?;
        Ok(file)
    }

    fn state_dir(&self) -> anyhow::Result<&Path> {
        self.table_path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Tag table path has no parent directory"))
    }

    /// Callers must hold [`FileTagStore::lock`].
    fn save(&self, table: &TagTable) -> anyhow::Result<()> {
        let dir = self.state_dir()?;
        let bytes = serde_json::to_vec_pretty(table).context("Failed to serialize tag table")?;

        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create tmp tag table in {}", dir.display()))?;
        tmp.write_all(&bytes)
            .with_context(|| format!("Failed to write tmp tag table: {}", tmp.path().display()))?;
        tmp.as_file()
            .sync_all()
            .with_context(|| format!("Failed to sync tmp tag table: {}", tmp.path().display()))?;
        tmp.persist(&self.table_path).with_context(|| {
            format!("Failed to replace tag table: {}", self.table_path.display())
        })?;
        Ok(())
    }

    fn modify(&self, f: impl FnOnce(&mut TagTable)) -> anyhow::Result<()> {
        let _lock = self.lock()?;
        let mut table = self.load()?;
        f(&mut table);
        let purged = table.purge_expired();
        if purged > 0 {
            tracing::debug!(purged, "Purged expired tags");
        }
        self.save(&table)
    }
}

impl TagStore for FileTagStore {
    fn init(&self) -> anyhow::Result<()> {
        let _lock = self.lock()?;
        if self.table_path.exists() {
            // Surface corruption at init rather than on first use.
            self.load()?;
            return Ok(());
        }
        tracing::info!(path = %self.table_path.display(), "Creating tag table");
        self.save(&TagTable {
            version: TABLE_VERSION,
            partitions: BTreeMap::new(),
        })
    }

    fn insert(&self, tag: Tag) -> anyhow::Result<()> {
        self.modify(|table| {
            let range_key = TagTable::range_key(&tag.entity_id, &tag.key);
            table
                .partitions
                .entry(tag.entity_type)
                .or_default()
                .insert(range_key, tag);
        })
    }

    fn delete(&self, entity_type: EntityType, entity_id: &str, key: &str) -> anyhow::Result<()> {
        self.modify(|table| {
            if let Some(partition) = table.partitions.get_mut(&entity_type) {
                partition.remove(&TagTable::range_key(entity_id, key));
            }
        })
    }

    fn select_all(&self) -> anyhow::Result<Tags> {
        Ok(self.load()?.live(None))
    }

    fn select_by_type(&self, entity_type: EntityType) -> anyhow::Result<Tags> {
        Ok(self.load()?.live(Some(entity_type)))
    }

    fn select_by_type_and_id(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> anyhow::Result<Tags> {
        Ok(self
            .load()?
            .live(Some(entity_type))
            .filter(|t| t.entity_id == entity_id))
    }
}
