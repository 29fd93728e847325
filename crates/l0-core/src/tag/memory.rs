//! In-process tag store.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::types::EntityType;

use super::{Tag, TagStore, Tags};

type TagKey = (EntityType, String, String);

/// Tag store backed by an in-memory map.
///
/// Intended for tests and single-process tooling. The map sits behind a
/// mutex so the store satisfies `Send + Sync`, but nothing is shared across
/// processes and expiry is not enforced.
#[derive(Debug, Default)]
pub struct MemoryTagStore {
    tags: Mutex<BTreeMap<TagKey, Tag>>,
}

impl MemoryTagStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_tags<T>(&self, f: impl FnOnce(&mut BTreeMap<TagKey, Tag>) -> T) -> anyhow::Result<T> {
        let mut guard = self
            .tags
            .lock()
            .map_err(|_| anyhow::anyhow!("Memory tag store lock poisoned"))?;
        Ok(f(&mut guard))
    }

    fn select(&self, predicate: impl Fn(&Tag) -> bool) -> anyhow::Result<Tags> {
        self.with_tags(|tags| {
            tags.values()
                .filter(|t| predicate(t))
                .cloned()
                .collect::<Tags>()
                .sorted()
        })
    }
}

impl TagStore for MemoryTagStore {
    fn init(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn insert(&self, tag: Tag) -> anyhow::Result<()> {
        let key = (tag.entity_type, tag.entity_id.clone(), tag.key.clone());
        self.with_tags(|tags| {
            tags.insert(key, tag);
        })
    }

    fn delete(&self, entity_type: EntityType, entity_id: &str, key: &str) -> anyhow::Result<()> {
        self.with_tags(|tags| {
            tags.remove(&(entity_type, entity_id.to_string(), key.to_string()));
        })
    }

    fn select_all(&self) -> anyhow::Result<Tags> {
        self.select(|_| true)
    }

    fn select_by_type(&self, entity_type: EntityType) -> anyhow::Result<Tags> {
        self.select(|t| t.entity_type == entity_type)
    }

    fn select_by_type_and_id(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> anyhow::Result<Tags> {
        self.select(|t| t.entity_type == entity_type && t.entity_id == entity_id)
    }
}
