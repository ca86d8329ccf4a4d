//! Client side of a shared session.
//!
//! A [`GameClient`] owns one actor task. Local actions, remote updates and the
//! deferred mismatch correction are all handled there in arrival order, so the
//! in-process state is only ever mutated from one place. Observers follow the
//! state through a [`watch`] channel.

use std::sync::Arc;

use rand::RngCore;
use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        mpsc, oneshot, watch,
    },
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{
    config::GameSettings,
    dao::document_store::DocumentStore,
    error::ServiceError,
    state::{GameSession, GameType, PairOutcome, ParticipantPair, SeatStatus, SessionId},
};

use super::{
    deferred::{DeferredAction, schedule},
    mirror::{SessionMirror, Subscription},
    session_service::join_or_create,
};

const COMMAND_CAPACITY: usize = 32;

type Reply = oneshot::Sender<Result<GameSession, ServiceError>>;

/// Who is joining which game against whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    /// Game to play.
    pub game_type: GameType,
    /// Id of the local player.
    pub me: String,
    /// Id of the remote player.
    pub opponent: String,
}

enum Command {
    PlayCell { cell: usize, reply: Reply },
    FlipCard { card: usize, reply: Reply },
    Reset { reply: Reply },
    /// Fired by the deferred mismatch correction.
    ResolvePair { pair: (usize, usize) },
    Leave { done: oneshot::Sender<()> },
}

/// Handle to a joined session.
pub struct GameClient {
    me: String,
    session_id: SessionId,
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<GameSession>,
    actor: JoinHandle<()>,
}

impl GameClient {
    /// Join (or create) the session between `request.me` and `request.opponent`
    /// and start mirroring it.
    pub async fn join(
        store: Arc<dyn DocumentStore>,
        request: JoinRequest,
        settings: GameSettings,
        mut rng: Box<dyn RngCore + Send>,
    ) -> Result<Self, ServiceError> {
        let JoinRequest {
            game_type,
            me,
            opponent,
        } = request;
        if me.trim().is_empty() || opponent.trim().is_empty() {
            return Err(ServiceError::InvalidInput(
                "participant ids must not be empty".into(),
            ));
        }

        store
            .health_check()
            .await
            .inspect_err(|err| warn!(player = %me, error = %err, "document store unreachable"))?;

        let participants = ParticipantPair::new(me.clone(), opponent);
        let session = join_or_create(store.as_ref(), game_type, &participants, || {
            GameSession::new_game(game_type, participants.clone(), &settings, &mut *rng)
        })
        .await?;
        let session_id = session.session_id().clone();

        let mirror = SessionMirror::new(store);
        let mut subscription = mirror.subscribe(game_type, session_id.clone()).await?;
        let updates = subscription.listen();

        let (state_tx, state_rx) = watch::channel(session);
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);

        let actor = SessionActor {
            me: me.clone(),
            participants,
            mirror,
            settings,
            rng,
            state: state_tx,
            loopback: commands_tx.downgrade(),
            correction: None,
        };
        let task = tokio::spawn(actor.run(commands_rx, subscription, updates));
        info!(session = %session_id, player = %me, "joined game");

        Ok(Self {
            me,
            session_id,
            commands: commands_tx,
            state: state_rx,
            actor: task,
        })
    }

    /// Place this player's symbol on a tic-tac-toe cell.
    pub async fn play_cell(&self, cell: usize) -> Result<GameSession, ServiceError> {
        self.request(|reply| Command::PlayCell { cell, reply }).await
    }

    /// Turn a memory-match card face-up.
    pub async fn flip_card(&self, card: usize) -> Result<GameSession, ServiceError> {
        self.request(|reply| Command::FlipCard { card, reply }).await
    }

    /// Start the match over for both players.
    pub async fn reset(&self) -> Result<GameSession, ServiceError> {
        self.request(|reply| Command::Reset { reply }).await
    }

    /// Current local state.
    pub fn snapshot(&self) -> GameSession {
        self.state.borrow().clone()
    }

    /// Follow every state change.
    pub fn watch(&self) -> watch::Receiver<GameSession> {
        self.state.clone()
    }

    /// Status line from this player's seat.
    pub fn status_for_me(&self) -> SeatStatus {
        self.state.borrow().seat_status(&self.me)
    }

    /// Key of the joined session.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Id of the local player.
    pub fn me(&self) -> &str {
        &self.me
    }

    /// Detach from the session. A mismatch correction already scheduled by this
    /// player still fires, so the opponent gets the turn back.
    pub async fn leave(self) -> Result<(), ServiceError> {
        let (done, finished) = oneshot::channel();
        if self.commands.send(Command::Leave { done }).await.is_ok() {
            let _ = finished.await;
        }
        self.actor
            .await
            .map_err(|err| ServiceError::Closed(format!("session task failed: {err}")))
    }

    async fn request<F>(&self, command: F) -> Result<GameSession, ServiceError>
    where
        F: FnOnce(Reply) -> Command,
    {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| self.closed())?;
        response.await.map_err(|_| self.closed())?
    }

    fn closed(&self) -> ServiceError {
        ServiceError::Closed(self.session_id.to_string())
    }
}

/// Mismatch correction waiting to fire, tagged with the pair it settles.
struct Correction {
    pair: (usize, usize),
    due: Instant,
    action: DeferredAction,
}

struct SessionActor {
    me: String,
    participants: ParticipantPair,
    mirror: SessionMirror,
    settings: GameSettings,
    rng: Box<dyn RngCore + Send>,
    state: watch::Sender<GameSession>,
    /// Weak so the actor stops once every client handle is gone.
    loopback: mpsc::WeakSender<Command>,
    correction: Option<Correction>,
}

impl SessionActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        subscription: Subscription,
        mut updates: broadcast::Receiver<GameSession>,
    ) {
        // A pair left face-up by an earlier run of this player is settled now.
        self.settle_pending_pair().await;

        let done = loop {
            tokio::select! {
                // Store updates first, so commands act on the newest known state.
                biased;
                update = updates.recv() => match update {
                    Ok(session) => self.apply_remote(session),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(session = %self.session_id(), skipped, "skipped stale session updates");
                    }
                    Err(RecvError::Closed) => break None,
                },
                command = commands.recv() => match command {
                    Some(Command::Leave { done }) => break Some(done),
                    Some(command) => self.handle(command).await,
                    None => break None,
                },
            }
        };

        self.hand_off_correction();
        let session_id = self.session_id();
        if let Err(err) = subscription.unsubscribe().await {
            warn!(session = %session_id, error = %err, "failed to detach from session");
        }
        info!(session = %session_id, player = %self.me, "left game");
        if let Some(done) = done {
            let _ = done.send(());
        }
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::PlayCell { cell, reply } => {
                let result = self.play_cell(cell).await;
                let _ = reply.send(result);
            }
            Command::FlipCard { card, reply } => {
                let result = self.flip_card(card).await;
                let _ = reply.send(result);
            }
            Command::Reset { reply } => {
                self.cancel_correction();
                let next = self.current().reset(&self.settings, &mut *self.rng);
                let result = self.commit(next).await;
                let _ = reply.send(result);
            }
            Command::ResolvePair { pair } => self.resolve_pair(pair).await,
            Command::Leave { .. } => {}
        }
    }

    async fn play_cell(&mut self, cell: usize) -> Result<GameSession, ServiceError> {
        let next = self
            .current()
            .apply_move(&self.me, cell)
            .inspect_err(|err| debug!(player = %self.me, cell, error = %err, "move rejected"))?;
        self.commit(next).await
    }

    async fn flip_card(&mut self, card: usize) -> Result<GameSession, ServiceError> {
        let next = self
            .current()
            .flip(&self.me, card)
            .inspect_err(|err| debug!(player = %self.me, card, error = %err, "flip rejected"))?;
        // The face-up card is published before any resolution.
        self.commit(next).await?;
        self.settle_pending_pair().await;
        Ok(self.current())
    }

    /// Resolve a completed pair when it is this player's to settle: a match
    /// right away, a mismatch after the reveal delay.
    async fn settle_pending_pair(&mut self) {
        let session = self.current();
        let Some(pair) = session.pending_pair() else {
            return;
        };
        if session.seat_status(&self.me) != SeatStatus::YourTurn {
            return;
        }
        if self
            .correction
            .as_ref()
            .is_some_and(|correction| correction.pair == pair && !correction.action.is_finished())
        {
            return;
        }

        match session.pending_outcome() {
            Some(PairOutcome::Match) => {
                let _ = self.commit(session.resolve_pending_pair()).await;
            }
            Some(PairOutcome::Mismatch) => self.schedule_correction(pair),
            None => {}
        }
    }

    fn schedule_correction(&mut self, pair: (usize, usize)) {
        self.cancel_correction();
        let loopback = self.loopback.clone();
        let delay = self.settings.mismatch_reveal;
        let action = schedule(delay, async move {
            if let Some(commands) = loopback.upgrade() {
                let _ = commands.send(Command::ResolvePair { pair }).await;
            }
        });
        debug!(session = %self.session_id(), ?pair, "mismatch correction scheduled");
        self.correction = Some(Correction {
            pair,
            due: Instant::now() + delay,
            action,
        });
    }

    /// Keep an outstanding correction alive once the actor stops: it fires at
    /// its original time against the stored session, and only if the same pair
    /// is still face-up there.
    fn hand_off_correction(&mut self) {
        let Some(Correction { pair, due, action }) = self.correction.take() else {
            return;
        };
        // A correction that already fired may still sit unread in the command queue.
        action.cancel();

        let session = self.current();
        let game_type = session.game_type();
        let session_id = session.session_id().clone();
        let mirror = self.mirror.clone();
        let delay = due.saturating_duration_since(Instant::now());
        debug!(session = %session_id, ?pair, ?delay, "mismatch correction detached from client");
        schedule(delay, async move {
            match mirror.fetch(game_type, &session_id).await {
                Ok(Some(stored)) if stored.pending_pair() == Some(pair) => {
                    let _ = mirror.publish(&stored.resolve_pending_pair()).await;
                }
                Ok(_) => {
                    debug!(session = %session_id, ?pair, "stale mismatch correction dropped");
                }
                Err(err) => {
                    warn!(session = %session_id, ?pair, error = %err, "detached mismatch correction failed");
                }
            }
        });
    }

    fn cancel_correction(&mut self) {
        if let Some(correction) = self.correction.take() {
            correction.action.cancel();
        }
    }

    async fn resolve_pair(&mut self, pair: (usize, usize)) {
        if self
            .correction
            .as_ref()
            .is_some_and(|correction| correction.pair == pair)
        {
            self.correction = None;
        }

        let session = self.current();
        // Skip when a reset or a remote write replaced the pair in the meantime.
        if session.pending_pair() != Some(pair) {
            debug!(session = %self.session_id(), ?pair, "stale mismatch correction dropped");
            return;
        }
        let _ = self.commit(session.resolve_pending_pair()).await;
    }

    /// Replace the local state wholesale. Identical states do not notify observers.
    fn apply_remote(&mut self, session: GameSession) {
        let session = session.with_participants(self.participants.clone());
        let changed = self.state.send_if_modified(|current| {
            if *current == session {
                false
            } else {
                *current = session;
                true
            }
        });
        if changed {
            debug!(session = %self.session_id(), "applied remote update");
        }
    }

    /// Show `next` at once, publish it, and restore the previous state if the
    /// write fails.
    async fn commit(&mut self, next: GameSession) -> Result<GameSession, ServiceError> {
        let previous = self.state.send_replace(next.clone());
        if let Err(err) = self.mirror.publish(&next).await {
            self.state.send_replace(previous);
            return Err(err);
        }
        Ok(next)
    }

    fn current(&self) -> GameSession {
        self.state.borrow().clone()
    }

    fn session_id(&self) -> SessionId {
        self.state.borrow().session_id().clone()
    }
}
