//! Entity-attribute-value tag store.
//!
//! Tags are the only durable record the control plane keeps about its
//! entities. Every relationship (a service living in an environment, a
//! service sitting behind a load balancer, two linked environments) is a tag
//! whose value is another entity's ID.

pub mod file;
pub mod memory;

use std::collections::BTreeMap;
use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::EntityType;

pub use file::FileTagStore;
pub use memory::MemoryTagStore;

/// One fact about one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub key: String,
    pub value: String,
    /// Expiry for garbage collection in durable stores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_exist: Option<DateTime<Utc>>,
}

impl Tag {
    pub fn new(
        entity_type: EntityType,
        entity_id: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_type,
            key: key.into(),
            value: value.into(),
            time_to_exist: None,
        }
    }

    pub fn with_expiry(mut self, at: DateTime<Utc>) -> Self {
        self.time_to_exist = Some(at);
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.time_to_exist.is_some_and(|at| at <= now)
    }
}

/// An ordered collection of tags with chainable filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(Vec<Tag>);

impl Tags {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn with_type(&self, entity_type: EntityType) -> Tags {
        self.filter(|t| t.entity_type == entity_type)
    }

    pub fn with_id(&self, entity_id: &str) -> Tags {
        self.filter(|t| t.entity_id == entity_id)
    }

    pub fn with_key(&self, key: &str) -> Tags {
        self.filter(|t| t.key == key)
    }

    pub fn with_value(&self, value: &str) -> Tags {
        self.filter(|t| t.value == value)
    }

    pub fn filter(&self, predicate: impl Fn(&Tag) -> bool) -> Tags {
        Tags(self.0.iter().filter(|t| predicate(t)).cloned().collect())
    }

    pub fn first(&self) -> Option<&Tag> {
        self.0.first()
    }

    pub fn any(&self, predicate: impl Fn(&Tag) -> bool) -> bool {
        self.0.iter().any(predicate)
    }

    /// Value of the first tag carrying `key`.
    pub fn value_of(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|t| t.key == key).map(|t| t.value.as_str())
    }

    /// Values of every tag carrying `key`, in collection order.
    pub fn values_of(&self, key: &str) -> Vec<String> {
        self.0
            .iter()
            .filter(|t| t.key == key)
            .map(|t| t.value.clone())
            .collect()
    }

    pub fn group_by_id(&self) -> BTreeMap<String, Tags> {
        let mut groups: BTreeMap<String, Tags> = BTreeMap::new();
        for tag in &self.0 {
            groups
                .entry(tag.entity_id.clone())
                .or_default()
                .0
                .push(tag.clone());
        }
        groups
    }

    /// Distinct entity IDs, sorted.
    pub fn entity_ids(&self) -> Vec<String> {
        self.group_by_id().into_keys().collect()
    }

    /// Sorts by (entity_id, entity_type, key).
    pub fn sort(&mut self) {
        self.0.sort_by(|a, b| {
            (&a.entity_id, a.entity_type, &a.key).cmp(&(&b.entity_id, b.entity_type, &b.key))
        });
    }

    pub fn sorted(mut self) -> Tags {
        self.sort();
        self
    }

    pub fn push(&mut self, tag: Tag) {
        self.0.push(tag);
    }

    pub fn into_vec(self) -> Vec<Tag> {
        self.0
    }
}

impl Deref for Tags {
    type Target = [Tag];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<Tag>> for Tags {
    fn from(tags: Vec<Tag>) -> Self {
        Tags(tags)
    }
}

impl FromIterator<Tag> for Tags {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        Tags(iter.into_iter().collect())
    }
}

impl IntoIterator for Tags {
    type Item = Tag;
    type IntoIter = std::vec::IntoIter<Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Tags {
    type Item = &'a Tag;
    type IntoIter = std::slice::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Storage contract for tags.
///
/// Implementations must upsert on `(entity_type, entity_id, key)`, treat
/// deletes of absent records as success, and return selections sorted by
/// (entity_id, entity_type, key). Empty selections are not errors.
pub trait TagStore: Send + Sync {
    /// Prepares the backing medium. Safe to call more than once.
    fn init(&self) -> anyhow::Result<()>;

    fn insert(&self, tag: Tag) -> anyhow::Result<()>;

    fn delete(&self, entity_type: EntityType, entity_id: &str, key: &str) -> anyhow::Result<()>;

    fn select_all(&self) -> anyhow::Result<Tags>;

    fn select_by_type(&self, entity_type: EntityType) -> anyhow::Result<Tags>;

    fn select_by_type_and_id(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> anyhow::Result<Tags>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Tags {
        Tags::from(vec![
            Tag::new(EntityType::Service, "s2", "name", "api"),
            Tag::new(EntityType::Service, "s1", "environment_id", "e1"),
            Tag::new(EntityType::Service, "s1", "name", "web"),
            Tag::new(EntityType::Environment, "e1", "name", "prod"),
        ])
    }

    #[test]
    fn filters_chain() {
        let tags = sample();
        let hits = tags.with_type(EntityType::Service).with_key("name");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits.with_value("web").first().unwrap().entity_id, "s1");
    }

    #[test]
    fn group_by_id_collects_per_entity() {
        let groups = sample().group_by_id();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups["s1"].len(), 2);
        assert_eq!(groups["s1"].value_of("environment_id"), Some("e1"));
    }

    #[test]
    fn sort_orders_by_id_type_key() {
        let tags = sample().sorted();
        let order: Vec<_> = tags
            .iter()
            .map(|t| (t.entity_id.as_str(), t.key.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("e1", "name"),
                ("s1", "environment_id"),
                ("s1", "name"),
                ("s2", "name")
            ]
        );
    }

    #[test]
    fn expiry_is_inclusive() {
        let now = Utc::now();
        let tag = Tag::new(EntityType::Job, "j1", "status", "done").with_expiry(now);
        assert!(tag.is_expired(now));
        assert!(!Tag::new(EntityType::Job, "j1", "status", "done").is_expired(now));
    }
}
