/// One-shot actions run after a delay, cancellable.
pub mod deferred;
/// Two-player client driving one shared session.
pub mod game_client;
/// Realtime mirror between a session and its stored document.
pub mod mirror;
/// Join-or-create bootstrap of a shared session.
pub mod session_service;
/// Connection retries for the storage backend.
pub mod storage_supervisor;
