use serde::Deserialize;
use serde_json::Value;

use crate::dao::document_store::Fields;

pub const ID_SEPARATOR: &str = "::";
pub const ID_FIELD: &str = "_id";
pub const REV_FIELD: &str = "_rev";

/// Build the CouchDB document id for a document of `collection`.
pub fn doc_id(collection: &str, id: &str) -> String {
    format!("{collection}{ID_SEPARATOR}{id}")
}

/// Remove CouchDB bookkeeping fields, returning the stored revision if any.
pub fn strip_meta(fields: &mut Fields) -> Option<String> {
    fields.remove(ID_FIELD);
    match fields.remove(REV_FIELD) {
        Some(Value::String(rev)) => Some(rev),
        _ => None,
    }
}

/// Body of a `_changes` long-poll response.
#[derive(Debug, Deserialize)]
pub struct ChangesResponse {
    #[serde(default)]
    pub results: Vec<ChangeRow>,
    pub last_seq: Value,
}

/// One changed document in a `_changes` response.
#[derive(Debug, Deserialize)]
pub struct ChangeRow {
    pub id: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub doc: Option<Fields>,
}
