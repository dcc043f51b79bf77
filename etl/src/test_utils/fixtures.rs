use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use crate::source::memory::{FilmRecord, MemorySource, NamedRecord};
use crate::types::EntityId;

/// Returns a fixed instant shifted by `minutes`, so tests can order modifications freely.
pub fn instant(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 6, 15, 12, 0, 0)
        .single()
        .expect("fixture instant is valid")
        + Duration::minutes(minutes)
}

/// Inserts a film modified at `modified` and returns its id.
pub async fn add_film(source: &MemorySource, title: &str, modified: DateTime<Utc>) -> EntityId {
    let id = Uuid::new_v4();
    source
        .insert_film(FilmRecord {
            id,
            title: title.to_string(),
            description: Some(format!("{title} description")),
            rating: Some(7.5),
            kind: "movie".to_string(),
            created: Some(modified),
            modified: Some(modified),
        })
        .await;

    id
}

/// Inserts a person modified at `modified` and returns its id.
pub async fn add_person(source: &MemorySource, name: &str, modified: DateTime<Utc>) -> EntityId {
    let id = Uuid::new_v4();
    source
        .insert_person(NamedRecord {
            id,
            name: name.to_string(),
            modified: Some(modified),
        })
        .await;

    id
}

/// Inserts a genre modified at `modified` and returns its id.
pub async fn add_genre(source: &MemorySource, name: &str, modified: DateTime<Utc>) -> EntityId {
    let id = Uuid::new_v4();
    source
        .insert_genre(NamedRecord {
            id,
            name: name.to_string(),
            modified: Some(modified),
        })
        .await;

    id
}
