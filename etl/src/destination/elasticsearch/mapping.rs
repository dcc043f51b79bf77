use serde_json::{Value, json};

/// Name of the analyzer applied to every full-text field.
pub const TEXT_ANALYZER: &str = "ru_en";

/// Returns the settings and mapping the movies index is created with.
///
/// The mapping is strict, so documents carrying fields outside of it are rejected by the
/// index instead of silently widening the schema.
pub fn index_definition() -> Value {
    json!({
        "settings": {
            "refresh_interval": "1s",
            "analysis": {
                "filter": {
                    "english_stop": {"type": "stop", "stopwords": "_english_"},
                    "english_stemmer": {"type": "stemmer", "language": "english"},
                    "english_possessive_stemmer": {
                        "type": "stemmer",
                        "language": "possessive_english"
                    },
                    "russian_stop": {"type": "stop", "stopwords": "_russian_"},
                    "russian_stemmer": {"type": "stemmer", "language": "russian"}
                },
                "analyzer": {
                    "ru_en": {
                        "tokenizer": "standard",
                        "filter": [
                            "lowercase",
                            "english_stop",
                            "english_stemmer",
                            "english_possessive_stemmer",
                            "russian_stop",
                            "russian_stemmer"
                        ]
                    }
                }
            }
        },
        "mappings": {
            "dynamic": "strict",
            "properties": {
                "id": {"type": "keyword"},
                "imdb_rating": {"type": "float"},
                "genre": {"type": "keyword"},
                "title": {
                    "type": "text",
                    "analyzer": TEXT_ANALYZER,
                    "fields": {"raw": {"type": "keyword"}}
                },
                "description": {"type": "text", "analyzer": TEXT_ANALYZER},
                "director": {"type": "text", "analyzer": TEXT_ANALYZER},
                "actors_names": {"type": "text", "analyzer": TEXT_ANALYZER},
                "writers_names": {"type": "text", "analyzer": TEXT_ANALYZER},
                "actors": person_mapping(),
                "writers": person_mapping()
            }
        }
    })
}

fn person_mapping() -> Value {
    json!({
        "type": "nested",
        "dynamic": "strict",
        "properties": {
            "id": {"type": "keyword"},
            "name": {"type": "text", "analyzer": TEXT_ANALYZER}
        }
    })
}
