use serde::Serialize;
use serde_json::json;

use crate::error::EtlResult;
use crate::types::{EntityId, MergedDocument, PersonRef};

/// Separator between the names of the denormalized `*_names` fields.
const NAMES_SEPARATOR: &str = ",";

/// A [`MergedDocument`] in the shape stored by the movies index.
#[derive(Debug, Serialize)]
pub(super) struct IndexedFilm<'a> {
    id: &'a EntityId,
    imdb_rating: Option<f64>,
    genre: &'a [String],
    title: &'a str,
    description: Option<&'a str>,
    director: Option<&'a str>,
    actors_names: String,
    writers_names: String,
    actors: &'a [PersonRef],
    writers: &'a [PersonRef],
}

impl<'a> From<&'a MergedDocument> for IndexedFilm<'a> {
    fn from(document: &'a MergedDocument) -> Self {
        Self {
            id: &document.id,
            imdb_rating: document.rating,
            genre: &document.genres,
            title: &document.title,
            description: document.description.as_deref(),
            director: document.director.as_deref(),
            actors_names: join_names(&document.actors),
            writers_names: join_names(&document.writers),
            actors: &document.actors,
            writers: &document.writers,
        }
    }
}

fn join_names(persons: &[PersonRef]) -> String {
    persons
        .iter()
        .map(|person| person.name.as_str())
        .collect::<Vec<_>>()
        .join(NAMES_SEPARATOR)
}

/// Encodes `documents` as the newline delimited body of a bulk request.
///
/// Every document is written with an `index` action keyed by its id, so replaying the body
/// overwrites the same documents.
pub(super) fn encode_bulk_body(index: &str, documents: &[MergedDocument]) -> EtlResult<String> {
    let mut body = String::new();
    for document in documents {
        let action = json!({"index": {"_index": index, "_id": document.id}});
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&IndexedFilm::from(document))?);
        body.push('\n');
    }

    Ok(body)
}
