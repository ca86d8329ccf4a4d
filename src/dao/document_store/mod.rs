/// CouchDB backend.
#[cfg(feature = "couch-store")]
pub mod couchdb;
/// In-process backend.
pub mod memory;

use std::{fmt, sync::Arc};

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::dao::storage::StorageResult;

/// Raw field map of a stored document.
pub type Fields = Map<String, Value>;

/// Callback invoked with the full field map every time a watched document changes.
pub type ChangeCallback = Arc<dyn Fn(Fields) + Send + Sync>;

/// Opaque token identifying one live document subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(Uuid);

impl SubscriptionHandle {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Abstraction over the managed document database shared by both players.
///
/// Writes are whole-field overwrites: with `merge` set, fields absent from the
/// write keep their stored value; without it the document is replaced. There is
/// no versioning, concurrent writers race and the last one wins.
pub trait DocumentStore: Send + Sync {
    /// Read a document, `None` when it does not exist.
    fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<Fields>>>;
    /// Write `fields`, merged into the stored document or replacing it.
    fn set_document(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        merge: bool,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Watch one document. `on_change` fires right away when the document exists,
    /// then once per stored change, on whatever task the backend delivers from.
    fn subscribe(
        &self,
        collection: &str,
        id: &str,
        on_change: ChangeCallback,
    ) -> BoxFuture<'static, StorageResult<SubscriptionHandle>>;
    /// Stop a subscription. Unknown handles are ignored.
    fn unsubscribe(&self, handle: SubscriptionHandle) -> BoxFuture<'static, StorageResult<()>>;
    /// Cheap round-trip proving the backend is reachable.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Apply a write onto an existing field map following the store's merge rules.
pub fn merge_fields(existing: Option<Fields>, incoming: Fields, merge: bool) -> Fields {
    match existing {
        Some(mut current) if merge => {
            current.extend(incoming);
            current
        }
        _ => incoming,
    }
}
