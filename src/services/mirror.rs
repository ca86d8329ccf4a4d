use std::sync::Arc;

use tokio::{runtime::Handle, sync::broadcast};
use tracing::{debug, warn};

use crate::{
    dao::{
        document_store::{DocumentStore, SubscriptionHandle},
        models::GAME_SESSIONS_COLLECTION,
    },
    error::ServiceError,
    state::{GameSession, GameType, SessionId},
};

/// Pending updates kept per listener before older ones are skipped.
const LISTENER_CAPACITY: usize = 32;

/// Broadcast hub fanning decoded session updates out to every local listener.
#[derive(Clone)]
pub struct SessionHub {
    sender: broadcast::Sender<GameSession>,
}

impl SessionHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new listener that will receive subsequent updates.
    pub fn subscribe(&self) -> broadcast::Receiver<GameSession> {
        self.sender.subscribe()
    }

    /// Send an update to all current listeners, ignoring delivery errors.
    pub fn broadcast(&self, session: GameSession) {
        let _ = self.sender.send(session);
    }
}

/// Two-way bridge between local sessions and the stored document.
#[derive(Clone)]
pub struct SessionMirror {
    store: Arc<dyn DocumentStore>,
}

impl SessionMirror {
    /// Mirror sessions through `store`.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Write every field of `session` with merge semantics.
    pub async fn publish(&self, session: &GameSession) -> Result<(), ServiceError> {
        self.store
            .set_document(
                GAME_SESSIONS_COLLECTION,
                session.session_id().as_str(),
                session.to_fields(),
                true,
            )
            .await
            .inspect_err(|err| {
                warn!(session = %session.session_id(), error = %err, "failed to publish session")
            })?;
        Ok(())
    }

    /// Read the stored session once, outside any subscription.
    pub async fn fetch(
        &self,
        game_type: GameType,
        session_id: &SessionId,
    ) -> Result<Option<GameSession>, ServiceError> {
        let fields = self
            .store
            .get_document(GAME_SESSIONS_COLLECTION, session_id.as_str())
            .await
            .inspect_err(|err| {
                warn!(session = %session_id, error = %err, "failed to read session")
            })?;
        Ok(fields.map(|fields| GameSession::from_fields(game_type, session_id.clone(), &fields)))
    }

    /// Start mirroring the stored session into a local [`Subscription`].
    ///
    /// The current document, when present, is delivered right away; every stored
    /// change follows, echoes of this client's own writes included.
    pub async fn subscribe(
        &self,
        game_type: GameType,
        session_id: SessionId,
    ) -> Result<Subscription, ServiceError> {
        let hub = SessionHub::new(LISTENER_CAPACITY);
        // Registered before the store can fire, so the immediate delivery is kept.
        let first = hub.subscribe();

        let sink = hub.clone();
        let id = session_id.clone();
        let handle = self
            .store
            .subscribe(
                GAME_SESSIONS_COLLECTION,
                session_id.as_str(),
                Arc::new(move |fields| {
                    sink.broadcast(GameSession::from_fields(game_type, id.clone(), &fields));
                }),
            )
            .await
            .inspect_err(|err| {
                warn!(session = %session_id, error = %err, "failed to subscribe to session")
            })?;

        debug!(session = %session_id, %handle, "session mirror attached");
        Ok(Subscription {
            store: self.store.clone(),
            session_id,
            handle: Some(handle),
            hub,
            first: Some(first),
        })
    }
}

/// Live link to one stored session, scoped to the screen that opened it.
///
/// Release it with [`Subscription::unsubscribe`]; dropping it detaches in the
/// background when a runtime is available.
pub struct Subscription {
    store: Arc<dyn DocumentStore>,
    session_id: SessionId,
    handle: Option<SubscriptionHandle>,
    hub: SessionHub,
    first: Option<broadcast::Receiver<GameSession>>,
}

impl Subscription {
    /// Add a listener. The first call also receives the update delivered on subscribe.
    pub fn listen(&mut self) -> broadcast::Receiver<GameSession> {
        self.first.take().unwrap_or_else(|| self.hub.subscribe())
    }

    /// Key of the mirrored session.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Detach from the store. Listeners see their channel close.
    pub async fn unsubscribe(mut self) -> Result<(), ServiceError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.store.unsubscribe(handle).await?;
        debug!(session = %self.session_id, %handle, "session mirror detached");
        Ok(())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let Ok(runtime) = Handle::try_current() else {
            warn!(session = %self.session_id, "subscription dropped outside a runtime; listener leaked");
            return;
        };
        let release = self.store.unsubscribe(handle);
        let session_id = self.session_id.clone();
        runtime.spawn(async move {
            if let Err(err) = release.await {
                warn!(session = %session_id, error = %err, "failed to release dropped subscription");
            }
        });
    }
}
