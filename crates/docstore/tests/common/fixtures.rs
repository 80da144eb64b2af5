//! Typed documents used across the integration tests.

use chrono::{DateTime, TimeZone, Utc};
use helios_docstore::codec;
use helios_docstore::document::{Record, RecordSchema, Value};
use serde::{Deserialize, Serialize};

/// A record with a revision slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    #[serde(rename = "_id")]
    pub name: String,
    pub score: i64,
    #[serde(with = "codec::timestamp")]
    pub joined: DateTime<Utc>,
    #[serde(with = "codec::bytes")]
    pub avatar: Vec<u8>,
    #[serde(rename = "DocstoreRevision", default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<Value>,
}

impl Record for Player {
    fn schema() -> RecordSchema {
        RecordSchema::new("Player")
            .field("_id")
            .field("score")
            .field("joined")
            .field("avatar")
            .with_revision("DocstoreRevision")
    }
}

impl Player {
    pub fn new(name: &str, score: i64) -> Self {
        Self {
            name: name.to_string(),
            score,
            joined: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            avatar: vec![0xde, 0xad, 0xbe, 0xef],
            revision: None,
        }
    }
}

/// A record without a revision slot; writes are never conditional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Counter {
    #[serde(rename = "_id")]
    pub id: i64,
    pub count: i64,
}

impl Record for Counter {
    fn schema() -> RecordSchema {
        RecordSchema::new("Counter").field("_id").field("count")
    }
}
