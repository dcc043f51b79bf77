use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kinds of entities tracked for changes.
///
/// Films are the root entity: one search document is produced per film. Genres and persons
/// reach films through their relation tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Genre,
    Person,
    Film,
}

/// Relation table linking a non-root entity to films.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilmRelation {
    /// Fully qualified name of the relation table.
    pub table: &'static str,
    /// Column referencing the non-root entity.
    pub foreign_key: &'static str,
}

impl EntityKind {
    /// Order in which kinds are swept within a cycle.
    pub const SWEEP_ORDER: [EntityKind; 3] =
        [EntityKind::Genre, EntityKind::Person, EntityKind::Film];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Genre => "genre",
            EntityKind::Person => "person",
            EntityKind::Film => "film",
        }
    }

    /// Fully qualified table holding entities of this kind.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Genre => "content.genre",
            EntityKind::Person => "content.person",
            EntityKind::Film => "content.film_work",
        }
    }

    /// Relation through which this kind references films, `None` for films themselves.
    pub fn film_relation(&self) -> Option<FilmRelation> {
        match self {
            EntityKind::Genre => Some(FilmRelation {
                table: "content.genre_film_work",
                foreign_key: "genre_id",
            }),
            EntityKind::Person => Some(FilmRelation {
                table: "content.person_film_work",
                foreign_key: "person_id",
            }),
            EntityKind::Film => None,
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, EntityKind::Film)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "genre" => Ok(EntityKind::Genre),
            "person" => Ok(EntityKind::Person),
            "film" => Ok(EntityKind::Film),
            other => Err(format!("unknown entity kind `{other}`")),
        }
    }
}
