//! Event name dictionary shared by the rows of one event class
//!
//! Rows reference a name by its uuid, so renaming never touches them. Ids are validated
//! once at ingestion; text ids are parsed through [`EventNameId::from_str`].

use crate::{LrsError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Positive integer id of an event name
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "i64", into = "i64"))]
pub struct EventNameId(i64);

impl EventNameId {
    pub fn new(raw: i64) -> Result<Self> {
        if raw > 0 {
            Ok(Self(raw))
        } else {
            Err(LrsError::InvalidEventNameId(raw.to_string()))
        }
    }

    #[inline]
    pub fn get(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for EventNameId {
    type Error = LrsError;

    fn try_from(raw: i64) -> Result<Self> {
        Self::new(raw)
    }
}

impl From<EventNameId> for i64 {
    fn from(id: EventNameId) -> Self {
        id.0
    }
}

impl FromStr for EventNameId {
    type Err = LrsError;

    fn from_str(s: &str) -> Result<Self> {
        let raw: i64 = s
            .trim()
            .parse()
            .map_err(|_| LrsError::InvalidEventNameId(s.to_string()))?;
        Self::new(raw)
    }
}

impl fmt::Display for EventNameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One entry of the dictionary
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventName {
    pub id: EventNameId,
    pub uuid: Uuid,
    pub name: String,
}

/// Dictionary of event names, keyed by id
///
/// Stored as a plain list of entries; loading it goes through [`EventNameRegistry::from_names`].
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(try_from = "Vec<EventName>", into = "Vec<EventName>")
)]
pub struct EventNameRegistry {
    names: BTreeMap<EventNameId, EventName>,
}

impl TryFrom<Vec<EventName>> for EventNameRegistry {
    type Error = LrsError;

    fn try_from(names: Vec<EventName>) -> Result<Self> {
        Self::from_names(names)
    }
}

impl From<EventNameRegistry> for Vec<EventName> {
    fn from(registry: EventNameRegistry) -> Self {
        registry.names.into_values().collect()
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl EventNameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from stored entries, rejecting duplicate ids, uuids or names
    pub fn from_names(names: impl IntoIterator<Item = EventName>) -> Result<Self> {
        let mut registry = Self::new();
        for name in names {
            registry.insert(name)?;
        }
        Ok(registry)
    }

    /// Insert an entry with a known id and uuid
    pub fn insert(&mut self, entry: EventName) -> Result<()> {
        let name = entry.name.trim().to_string();
        if name.is_empty() {
            return Err(LrsError::EditRejected("Event Name must not be empty.".into()));
        }
        if self.names.contains_key(&entry.id) {
            return Err(LrsError::InconsistentData(format!(
                "event name id {} used twice",
                entry.id
            )));
        }
        if self.by_uuid(entry.uuid).is_some() {
            return Err(LrsError::InconsistentData(format!(
                "event name uuid {} used twice",
                entry.uuid
            )));
        }
        self.ensure_unique(&name, None)?;
        self.names.insert(entry.id, EventName { name, ..entry });
        Ok(())
    }

    fn ensure_unique(&self, name: &str, except: Option<EventNameId>) -> Result<()> {
        let lower = name.to_lowercase();
        let taken = self
            .names
            .values()
            .any(|entry| Some(entry.id) != except && entry.name.to_lowercase() == lower);
        if taken {
            Err(LrsError::DuplicateEventName(name.to_string()))
        } else {
            Ok(())
        }
    }

    /// Add a new name; names are unique ignoring case
    pub fn add(&mut self, name: &str) -> Result<EventNameId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LrsError::EditRejected("Event Name must not be empty.".into()));
        }
        self.ensure_unique(name, None)?;
        let next = self.names.keys().next_back().map_or(1, |id| id.get() + 1);
        let id = EventNameId::new(next)?;
        self.names.insert(
            id,
            EventName {
                id,
                uuid: Uuid::new_v4(),
                name: name.to_string(),
            },
        );
        tracing::debug!(%id, name, "event name added");
        Ok(id)
    }

    pub fn rename(&mut self, id: EventNameId, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LrsError::EditRejected("Event Name must not be empty.".into()));
        }
        self.ensure_unique(name, Some(id))?;
        let entry = self
            .names
            .get_mut(&id)
            .ok_or_else(|| LrsError::UnknownEventName(id.to_string()))?;
        entry.name = name.to_string();
        Ok(())
    }

    pub fn remove(&mut self, id: EventNameId) -> Result<EventName> {
        self.names
            .remove(&id)
            .ok_or_else(|| LrsError::UnknownEventName(id.to_string()))
    }

    #[inline]
    pub fn get(&self, id: EventNameId) -> Option<&EventName> {
        self.names.get(&id)
    }

    /// Entry for an id, or an error naming the id
    pub fn require(&self, id: EventNameId) -> Result<&EventName> {
        self.get(id)
            .ok_or_else(|| LrsError::UnknownEventName(id.to_string()))
    }

    /// Exact (case-sensitive) name lookup
    pub fn by_name(&self, name: &str) -> Option<&EventName> {
        let name = name.trim();
        self.names.values().find(|entry| entry.name == name)
    }

    pub fn by_uuid(&self, uuid: Uuid) -> Option<&EventName> {
        self.names.values().find(|entry| entry.uuid == uuid)
    }

    /// Name for a referencing row, empty if the uuid is unknown
    pub fn name_of(&self, uuid: Uuid) -> String {
        self.by_uuid(uuid)
            .map(|entry| entry.name.clone())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventName> {
        self.names.values()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Usage count of every name, given the name uuids of all referencing rows
    pub fn usage(&self, refs: impl IntoIterator<Item = Uuid>) -> BTreeMap<EventNameId, usize> {
        let mut counts: BTreeMap<EventNameId, usize> =
            self.names.keys().map(|id| (*id, 0)).collect();
        let by_uuid: BTreeMap<Uuid, EventNameId> =
            self.names.values().map(|entry| (entry.uuid, entry.id)).collect();
        for uuid in refs {
            if let Some(id) = by_uuid.get(&uuid) {
                *counts.entry(*id).or_default() += 1;
            }
        }
        counts
    }

    /// Names no row refers to, sorted ignoring case
    pub fn unused_names(&self, refs: impl IntoIterator<Item = Uuid>) -> Vec<String> {
        let used: BTreeSet<Uuid> = refs.into_iter().collect();
        let mut unused: Vec<String> = self
            .names
            .values()
            .filter(|entry| !used.contains(&entry.uuid))
            .map(|entry| entry.name.clone())
            .collect();
        unused.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then(a.cmp(b)));
        unused
    }

    /// Name uuids referenced by rows but missing from the registry
    pub fn unreferenced(&self, refs: impl IntoIterator<Item = Uuid>) -> Vec<Uuid> {
        let known: BTreeSet<Uuid> = self.names.values().map(|entry| entry.uuid).collect();
        refs.into_iter()
            .filter(|uuid| !known.contains(uuid))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_validation() {
        assert!(EventNameId::new(0).is_err());
        assert!(EventNameId::new(-3).is_err());
        assert_eq!(EventNameId::new(4).unwrap().get(), 4);
        assert_eq!("  12 ".parse::<EventNameId>().unwrap().get(), 12);
        assert!("12.0".parse::<EventNameId>().is_err());
        assert!("abc".parse::<EventNameId>().is_err());
    }

    #[test]
    fn test_add_assigns_increasing_ids() {
        let mut registry = EventNameRegistry::new();
        let a = registry.add("Bridge").unwrap();
        let b = registry.add(" Tunnel ").unwrap();
        assert_eq!(a.get(), 1);
        assert_eq!(b.get(), 2);
        assert_eq!(registry.get(b).unwrap().name, "Tunnel");
        assert_eq!(registry.by_name("Tunnel").unwrap().id, b);
    }

    #[test]
    fn test_names_unique_ignoring_case() {
        let mut registry = EventNameRegistry::new();
        let id = registry.add("Bridge").unwrap();
        assert!(matches!(
            registry.add("bridge"),
            Err(LrsError::DuplicateEventName(_))
        ));
        assert!(registry.add("").is_err());
        // Renaming to its own name in another case is fine
        registry.rename(id, "BRIDGE").unwrap();
        assert_eq!(registry.get(id).unwrap().name, "BRIDGE");
    }

    #[test]
    fn test_lookup_by_uuid_and_remove() {
        let mut registry = EventNameRegistry::new();
        let id = registry.add("Crossing").unwrap();
        let uuid = registry.get(id).unwrap().uuid;
        assert_eq!(registry.by_uuid(uuid).unwrap().id, id);
        assert_eq!(registry.name_of(uuid), "Crossing");
        registry.remove(id).unwrap();
        assert!(registry.is_empty());
        assert_eq!(registry.name_of(uuid), "");
        assert!(registry.remove(id).is_err());
    }

    #[test]
    fn test_usage_and_unused() {
        let mut registry = EventNameRegistry::new();
        let a = registry.add("b-name").unwrap();
        let b = registry.add("A-name").unwrap();
        let c = registry.add("c-name").unwrap();
        let ua = registry.get(a).unwrap().uuid;
        let stray = Uuid::new_v4();
        let refs = vec![ua, ua, stray];

        let usage = registry.usage(refs.clone());
        assert_eq!(usage[&a], 2);
        assert_eq!(usage[&b], 0);
        assert_eq!(usage[&c], 0);
        assert_eq!(
            registry.unused_names(refs.clone()),
            vec!["A-name".to_string(), "c-name".to_string()]
        );
        assert_eq!(registry.unreferenced(refs), vec![stray]);
    }

    #[test]
    fn test_from_names_rejects_duplicates() {
        let uuid = Uuid::new_v4();
        let entries = vec![
            EventName {
                id: EventNameId::new(1).unwrap(),
                uuid,
                name: "One".into(),
            },
            EventName {
                id: EventNameId::new(2).unwrap(),
                uuid,
                name: "Two".into(),
            },
        ];
        assert!(EventNameRegistry::from_names(entries).is_err());
    }
}
