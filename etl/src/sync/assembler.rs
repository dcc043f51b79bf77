use std::collections::HashMap;

use tracing::debug;

use crate::error::EtlResult;
use crate::source::Source;
use crate::types::{EntityId, FilmRow, IdSet, MergedDocument, PersonRef};

/// Role tagging the director of a film.
pub const DIRECTOR_ROLE: &str = "director";
/// Role tagging an actor of a film.
pub const ACTOR_ROLE: &str = "actor";
/// Role tagging a writer of a film.
pub const WRITER_ROLE: &str = "writer";

/// Builds one [`MergedDocument`] per film from the flattened film rows.
#[derive(Debug, Clone)]
pub struct DocumentAssembler<Src> {
    source: Src,
}

impl<Src> DocumentAssembler<Src>
where
    Src: Source,
{
    pub fn new(source: Src) -> Self {
        Self { source }
    }

    /// Reads every row of the films in `root_ids` and merges them into documents.
    ///
    /// An empty `root_ids` returns no documents without querying the source.
    pub async fn assemble(&self, root_ids: &IdSet) -> EtlResult<Vec<MergedDocument>> {
        if root_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = self.source.film_rows(root_ids.as_slice()).await?;
        let row_count = rows.len();
        let documents = merge_rows(rows);

        debug!(
            films = root_ids.len(),
            rows = row_count,
            documents = documents.len(),
            "assembled documents"
        );

        Ok(documents)
    }
}

/// Folds film rows into documents, one per distinct film id, in first-seen order.
///
/// Scalar fields come from the first row of each film. When several rows name a director,
/// the last one wins. Actors and writers are deduplicated by person id, genres by name. Rows
/// with an unknown role or without a person only contribute their genre.
pub fn merge_rows(rows: impl IntoIterator<Item = FilmRow>) -> Vec<MergedDocument> {
    let mut documents: Vec<MergedDocument> = Vec::new();
    let mut positions: HashMap<EntityId, usize> = HashMap::new();

    for row in rows {
        let position = *positions.entry(row.id).or_insert_with(|| {
            documents.push(MergedDocument::from_film_row(&row));
            documents.len() - 1
        });
        let document = &mut documents[position];

        if let (Some(role), Some(person_id), Some(person_name)) =
            (&row.person_role, row.person_id, &row.person_name)
        {
            let persons = match role.as_str() {
                DIRECTOR_ROLE => {
                    document.director = Some(person_name.clone());
                    None
                }
                ACTOR_ROLE => Some(&mut document.actors),
                WRITER_ROLE => Some(&mut document.writers),
                _ => None,
            };

            if let Some(persons) = persons {
                if !persons.iter().any(|person| person.id == person_id) {
                    persons.push(PersonRef {
                        id: person_id,
                        name: person_name.clone(),
                    });
                }
            }
        }

        if let Some(genre) = row.genre_name {
            if !document.genres.contains(&genre) {
                document.genres.push(genre);
            }
        }
    }

    documents
}
