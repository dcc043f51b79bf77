use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::source::Source;
use crate::types::{EntityId, EntityKind, FilmRow};

/// A film stored in a [`MemorySource`].
#[derive(Debug, Clone, PartialEq)]
pub struct FilmRecord {
    pub id: EntityId,
    pub title: String,
    pub description: Option<String>,
    pub rating: Option<f64>,
    pub kind: String,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

/// A person or genre stored in a [`MemorySource`].
#[derive(Debug, Clone, PartialEq)]
pub struct NamedRecord {
    pub id: EntityId,
    pub name: String,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct PersonLink {
    film_id: EntityId,
    person_id: EntityId,
    role: String,
}

#[derive(Debug, Clone)]
struct GenreLink {
    film_id: EntityId,
    genre_id: EntityId,
}

#[derive(Debug, Default)]
struct Inner {
    films: Vec<FilmRecord>,
    persons: Vec<NamedRecord>,
    genres: Vec<NamedRecord>,
    person_links: Vec<PersonLink>,
    genre_links: Vec<GenreLink>,
    queries: u64,
}

impl Inner {
    fn modified_of(&self, kind: EntityKind) -> Vec<(EntityId, Option<DateTime<Utc>>)> {
        match kind {
            EntityKind::Film => self.films.iter().map(|f| (f.id, f.modified)).collect(),
            EntityKind::Person => self.persons.iter().map(|p| (p.id, p.modified)).collect(),
            EntityKind::Genre => self.genres.iter().map(|g| (g.id, g.modified)).collect(),
        }
    }

    fn film_modified(&self, film_id: &EntityId) -> Option<DateTime<Utc>> {
        self.films
            .iter()
            .find(|film| film.id == *film_id)
            .and_then(|film| film.modified)
    }
}

/// In-memory [`Source`] mirroring the semantics of the `content` schema queries.
///
/// Ordering follows the SQL queries: ascending modification instant with ties kept in
/// insertion order, rows without a modification instant sorted last. Film rows are the
/// cross product of a film's person links and genre links, with a single all-null link row
/// for films without links.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_film(&self, film: FilmRecord) {
        let mut inner = self.inner.lock().await;
        inner.films.retain(|existing| existing.id != film.id);
        inner.films.push(film);
    }

    pub async fn insert_person(&self, person: NamedRecord) {
        let mut inner = self.inner.lock().await;
        inner.persons.retain(|existing| existing.id != person.id);
        inner.persons.push(person);
    }

    pub async fn insert_genre(&self, genre: NamedRecord) {
        let mut inner = self.inner.lock().await;
        inner.genres.retain(|existing| existing.id != genre.id);
        inner.genres.push(genre);
    }

    pub async fn link_person(&self, film_id: EntityId, person_id: EntityId, role: &str) {
        let mut inner = self.inner.lock().await;
        inner.person_links.push(PersonLink {
            film_id,
            person_id,
            role: role.to_string(),
        });
    }

    pub async fn link_genre(&self, film_id: EntityId, genre_id: EntityId) {
        let mut inner = self.inner.lock().await;
        inner.genre_links.push(GenreLink { film_id, genre_id });
    }

    /// Sets the modification instant of an existing row, as an `update ... set modified` would.
    ///
    /// Returns `false` if no row of `kind` has the given id.
    pub async fn touch(&self, kind: EntityKind, id: EntityId, modified: DateTime<Utc>) -> bool {
        let mut inner = self.inner.lock().await;
        let slot = match kind {
            EntityKind::Film => inner
                .films
                .iter_mut()
                .find(|film| film.id == id)
                .map(|film| &mut film.modified),
            EntityKind::Person => inner
                .persons
                .iter_mut()
                .find(|person| person.id == id)
                .map(|person| &mut person.modified),
            EntityKind::Genre => inner
                .genres
                .iter_mut()
                .find(|genre| genre.id == id)
                .map(|genre| &mut genre.modified),
        };

        match slot {
            Some(slot) => {
                *slot = Some(modified);
                true
            }
            None => false,
        }
    }

    /// Renames a person, leaving its modification instant untouched.
    pub async fn rename_person(&self, id: EntityId, name: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(person) = inner.persons.iter_mut().find(|person| person.id == id) {
            person.name = name.to_string();
        }
    }

    /// Number of queries served so far.
    pub async fn queries(&self) -> u64 {
        self.inner.lock().await.queries
    }
}

/// Stable sort by modification instant, `None` last.
fn sort_by_modified(rows: &mut [(EntityId, Option<DateTime<Utc>>)]) {
    rows.sort_by(|(_, a), (_, b)| match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

impl Source for MemorySource {
    async fn modified_ids(
        &self,
        kind: EntityKind,
        since: DateTime<Utc>,
        excepted: &[EntityId],
        limit: usize,
    ) -> EtlResult<Vec<EntityId>> {
        let mut inner = self.inner.lock().await;
        inner.queries += 1;

        let excepted: HashSet<&EntityId> = excepted.iter().collect();
        let mut rows: Vec<_> = inner
            .modified_of(kind)
            .into_iter()
            .filter(|(id, modified)| {
                modified.is_some_and(|modified| modified > since) && !excepted.contains(id)
            })
            .collect();
        sort_by_modified(&mut rows);

        Ok(rows.into_iter().take(limit).map(|(id, _)| id).collect())
    }

    async fn all_ids(
        &self,
        kind: EntityKind,
        excepted: &[EntityId],
        limit: usize,
    ) -> EtlResult<Vec<EntityId>> {
        let mut inner = self.inner.lock().await;
        inner.queries += 1;

        let excepted: HashSet<&EntityId> = excepted.iter().collect();
        let mut rows: Vec<_> = inner
            .modified_of(kind)
            .into_iter()
            .filter(|(id, _)| !excepted.contains(id))
            .collect();
        sort_by_modified(&mut rows);

        Ok(rows.into_iter().take(limit).map(|(id, _)| id).collect())
    }

    async fn referencing_film_ids(
        &self,
        kind: EntityKind,
        ids: &[EntityId],
        excepted: &[EntityId],
        limit: usize,
    ) -> EtlResult<Vec<EntityId>> {
        let mut inner = self.inner.lock().await;
        inner.queries += 1;

        let wanted: HashSet<&EntityId> = ids.iter().collect();
        let excepted: HashSet<&EntityId> = excepted.iter().collect();
        let linked: Vec<EntityId> = match kind {
            EntityKind::Person => inner
                .person_links
                .iter()
                .filter(|link| wanted.contains(&link.person_id))
                .map(|link| link.film_id)
                .collect(),
            EntityKind::Genre => inner
                .genre_links
                .iter()
                .filter(|link| wanted.contains(&link.genre_id))
                .map(|link| link.film_id)
                .collect(),
            EntityKind::Film => {
                bail!(
                    ErrorKind::InvalidState,
                    "Films have no referencing films",
                    format!("Cannot resolve referencing films for kind '{kind}'")
                );
            }
        };

        let mut seen = HashSet::new();
        let mut rows: Vec<_> = linked
            .into_iter()
            .filter(|id| !excepted.contains(id) && seen.insert(*id))
            .map(|id| (id, inner.film_modified(&id)))
            .collect();
        sort_by_modified(&mut rows);

        Ok(rows.into_iter().take(limit).map(|(id, _)| id).collect())
    }

    async fn film_rows(&self, film_ids: &[EntityId]) -> EtlResult<Vec<FilmRow>> {
        let mut inner = self.inner.lock().await;
        inner.queries += 1;

        let wanted: HashSet<&EntityId> = film_ids.iter().collect();
        let mut rows = Vec::new();
        for film in inner.films.iter().filter(|film| wanted.contains(&film.id)) {
            let mut persons: Vec<(Option<String>, Option<EntityId>, Option<String>)> = inner
                .person_links
                .iter()
                .filter(|link| link.film_id == film.id)
                .map(|link| {
                    let person = inner.persons.iter().find(|p| p.id == link.person_id);
                    (
                        Some(link.role.clone()),
                        person.map(|p| p.id),
                        person.map(|p| p.name.clone()),
                    )
                })
                .collect();
            if persons.is_empty() {
                persons.push((None, None, None));
            }

            let mut genres: Vec<Option<String>> = inner
                .genre_links
                .iter()
                .filter(|link| link.film_id == film.id)
                .map(|link| {
                    inner
                        .genres
                        .iter()
                        .find(|g| g.id == link.genre_id)
                        .map(|g| g.name.clone())
                })
                .collect();
            if genres.is_empty() {
                genres.push(None);
            }

            for (person_role, person_id, person_name) in &persons {
                for genre_name in &genres {
                    rows.push(FilmRow {
                        id: film.id,
                        title: film.title.clone(),
                        description: film.description.clone(),
                        rating: film.rating,
                        kind: film.kind.clone(),
                        created: film.created,
                        modified: film.modified,
                        person_role: person_role.clone(),
                        person_id: *person_id,
                        person_name: person_name.clone(),
                        genre_name: genre_name.clone(),
                    });
                }
            }
        }

        Ok(rows)
    }
}
