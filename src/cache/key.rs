//! Key normalization.
//!
//! A cache key is either a 24-character hexadecimal string, which names a
//! document by its native `_id`, or any other string, which names it by the
//! generic `id` field. Reads by a named key try both fields; writes commit
//! to exactly one, so a value written under a key is found again by it.

use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Document, doc};

/// Native id field of the store.
pub const NATIVE_ID_FIELD: &str = "_id";

/// Generic id field used for caller-chosen keys.
pub const ID_FIELD: &str = "id";

/// A cache key resolved against the store's id format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheKey<'a> {
    /// Key in the native id format.
    ObjectId(ObjectId),
    /// Any other key.
    Named(&'a str),
}

impl<'a> CacheKey<'a> {
    /// Classify a raw key. Total: every string maps to a key.
    pub fn parse(raw: &'a str) -> Self {
        if raw.len() == 24
            && raw.bytes().all(|b| b.is_ascii_hexdigit())
            && let Ok(oid) = ObjectId::parse_str(raw)
        {
            return Self::ObjectId(oid);
        }
        Self::Named(raw)
    }

    /// Filter used to read the document for this key.
    pub fn lookup_filter(&self) -> Document {
        match self {
            Self::ObjectId(oid) => doc! { NATIVE_ID_FIELD: *oid },
            Self::Named(raw) => doc! {
                "$or": [{ NATIVE_ID_FIELD: *raw }, { ID_FIELD: *raw }]
            },
        }
    }

    /// Stamp the key onto `document` and return the filter to write it with.
    pub fn prepare_write(&self, document: &mut Document) -> Document {
        match self {
            Self::ObjectId(oid) => {
                document.insert(NATIVE_ID_FIELD, *oid);
                doc! { NATIVE_ID_FIELD: *oid }
            }
            Self::Named(raw) => {
                document.insert(ID_FIELD, *raw);
                doc! { ID_FIELD: *raw }
            }
        }
    }
}
