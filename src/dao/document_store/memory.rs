//! In-process document store used for local play and tests.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::debug;

use crate::dao::storage::{StorageError, StorageResult};

use super::{ChangeCallback, DocumentStore, Fields, SubscriptionHandle, merge_fields};

type DocumentKey = (String, String);

/// Document store kept entirely in memory.
///
/// Listeners are called synchronously from inside `set_document`, writer included,
/// which mirrors a realtime backend echoing every write back to all watchers.
/// Writes and subscriptions are serialised, so every listener sees the stored
/// versions in the order they were stored, ending on what [`Self::peek`] returns.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    documents: DashMap<DocumentKey, Fields>,
    listeners: DashMap<SubscriptionHandle, (DocumentKey, ChangeCallback)>,
    /// Held from the read of a document until its listeners have been called.
    write_gate: Mutex<()>,
    offline: AtomicBool,
}

impl MemoryDocumentStore {
    /// Empty, online store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a network outage: while offline every operation fails.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of live subscriptions, across all documents.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// Read a document without going through the async interface.
    pub fn peek(&self, collection: &str, id: &str) -> Option<Fields> {
        self.inner
            .documents
            .get(&key(collection, id))
            .map(|entry| entry.value().clone())
    }
}

impl MemoryInner {
    fn ensure_online(&self, path: &str) -> StorageResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(
                format!("memory store offline while accessing `{path}`"),
                io::Error::new(io::ErrorKind::NotConnected, "memory store offline"),
            ));
        }
        Ok(())
    }

    fn listeners_for(&self, document: &DocumentKey) -> Vec<ChangeCallback> {
        // Collected first so callbacks never run while a map shard is locked.
        self.listeners
            .iter()
            .filter(|entry| &entry.value().0 == document)
            .map(|entry| entry.value().1.clone())
            .collect()
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<Fields>>> {
        let inner = self.inner.clone();
        let document = key(collection, id);
        Box::pin(async move {
            inner.ensure_online(&path(&document))?;
            Ok(inner
                .documents
                .get(&document)
                .map(|entry| entry.value().clone()))
        })
    }

    fn set_document(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        merge: bool,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        let document = key(collection, id);
        Box::pin(async move {
            inner.ensure_online(&path(&document))?;
            let _gate = inner.write_gate.lock().await;

            let stored = {
                let existing = inner.documents.get(&document).map(|e| e.value().clone());
                let next = merge_fields(existing, fields, merge);
                inner.documents.insert(document.clone(), next.clone());
                next
            };

            let listeners = inner.listeners_for(&document);
            debug!(
                document = %path(&document),
                listeners = listeners.len(),
                "memory store write"
            );
            for listener in listeners {
                listener(stored.clone());
            }
            Ok(())
        })
    }

    fn subscribe(
        &self,
        collection: &str,
        id: &str,
        on_change: ChangeCallback,
    ) -> BoxFuture<'static, StorageResult<SubscriptionHandle>> {
        let inner = self.inner.clone();
        let document = key(collection, id);
        Box::pin(async move {
            inner.ensure_online(&path(&document))?;
            let _gate = inner.write_gate.lock().await;

            let handle = SubscriptionHandle::new();
            let current = inner.documents.get(&document).map(|e| e.value().clone());
            inner
                .listeners
                .insert(handle, (document, on_change.clone()));

            if let Some(fields) = current {
                on_change(fields);
            }
            Ok(handle)
        })
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.listeners.remove(&handle);
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.ensure_online("health") })
    }
}

fn key(collection: &str, id: &str) -> DocumentKey {
    (collection.to_owned(), id.to_owned())
}

fn path((collection, id): &DocumentKey) -> String {
    format!("{collection}/{id}")
}
