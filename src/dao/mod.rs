/// Document database abstraction and its backends.
pub mod document_store;
/// Stored shape of game session documents.
pub mod models;
/// Storage error types shared by every backend.
pub mod storage;
