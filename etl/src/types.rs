//! Core data types flowing through the indexing pipeline.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use postgres::content::FilmRow;
pub use postgres::schema::EntityKind;

/// Identifier of a film, person or genre row.
pub type EntityId = Uuid;

/// Insertion-ordered set of entity ids.
///
/// Serialized as a plain JSON array so it can be persisted in the cursor state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<EntityId>", into = "Vec<EntityId>")]
pub struct IdSet {
    ids: Vec<EntityId>,
    index: HashSet<EntityId>,
}

impl IdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `id`, returning `false` if it was already present.
    pub fn insert(&mut self, id: EntityId) -> bool {
        if !self.index.insert(id) {
            return false;
        }

        self.ids.push(id);
        true
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.index.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn as_slice(&self) -> &[EntityId] {
        &self.ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityId> {
        self.ids.iter()
    }

    pub fn into_vec(self) -> Vec<EntityId> {
        self.ids
    }
}

impl PartialEq for IdSet {
    fn eq(&self, other: &Self) -> bool {
        self.ids == other.ids
    }
}

impl Eq for IdSet {}

impl Extend<EntityId> for IdSet {
    fn extend<T: IntoIterator<Item = EntityId>>(&mut self, iter: T) {
        for id in iter {
            self.insert(id);
        }
    }
}

impl FromIterator<EntityId> for IdSet {
    fn from_iter<T: IntoIterator<Item = EntityId>>(iter: T) -> Self {
        let mut set = IdSet::new();
        set.extend(iter);
        set
    }
}

impl From<Vec<EntityId>> for IdSet {
    fn from(ids: Vec<EntityId>) -> Self {
        ids.into_iter().collect()
    }
}

impl From<IdSet> for Vec<EntityId> {
    fn from(set: IdSet) -> Self {
        set.ids
    }
}

/// A person credited on a film.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRef {
    pub id: EntityId,
    pub name: String,
}

/// Denormalized document built from every [`FilmRow`] of one film.
///
/// `actors` and `writers` never hold the same person id twice, though a person may appear in
/// both. `genres` keeps first-seen order without duplicates.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedDocument {
    pub id: EntityId,
    pub title: String,
    pub description: Option<String>,
    pub rating: Option<f64>,
    pub kind: String,
    /// Name from the last row tagged `director`.
    pub director: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub actors: Vec<PersonRef>,
    pub writers: Vec<PersonRef>,
    pub genres: Vec<String>,
}

impl MergedDocument {
    /// Starts a document from the scalar film columns of `row`.
    pub fn from_film_row(row: &FilmRow) -> Self {
        Self {
            id: row.id,
            title: row.title.clone(),
            description: row.description.clone(),
            rating: row.rating,
            kind: row.kind.clone(),
            director: None,
            created: row.created,
            modified: row.modified,
            actors: Vec::new(),
            writers: Vec::new(),
            genres: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_set_keeps_first_insertion_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let mut set = IdSet::new();
        assert!(set.insert(b));
        assert!(set.insert(a));
        assert!(!set.insert(b));

        assert_eq!(set.as_slice(), &[b, a]);
        assert!(set.contains(&a));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_id_set_serializes_as_array() {
        let a = Uuid::new_v4();
        let set: IdSet = vec![a, a].into();

        let value = serde_json::to_value(&set).unwrap();
        assert_eq!(value, serde_json::json!([a.to_string()]));

        let decoded: IdSet = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, set);
    }
}
