use tracing::{info, warn};

use crate::{
    dao::{document_store::DocumentStore, models::GAME_SESSIONS_COLLECTION},
    error::ServiceError,
    state::{GameSession, GameType, ParticipantPair, SessionId},
};

/// Read the session shared by `participants`, creating it from `create` when
/// no document exists yet.
///
/// Creation is a full overwrite. Two participants opening the game at the same
/// time both write an initial state and the later write wins; both then
/// converge through the mirror.
pub async fn join_or_create<F>(
    store: &dyn DocumentStore,
    game_type: GameType,
    participants: &ParticipantPair,
    create: F,
) -> Result<GameSession, ServiceError>
where
    F: FnOnce() -> GameSession,
{
    if participants.is_degenerate() {
        return Err(ServiceError::InvalidInput(format!(
            "`{}` cannot play against themselves",
            participants.first()
        )));
    }

    let session_id = SessionId::for_pair(game_type, participants);
    let stored = store
        .get_document(GAME_SESSIONS_COLLECTION, session_id.as_str())
        .await
        .inspect_err(|err| warn!(session = %session_id, error = %err, "failed to read session"))?;

    if let Some(fields) = stored {
        let session = GameSession::from_fields(game_type, session_id, &fields)
            .with_participants(participants.clone());
        info!(session = %session.session_id(), status = ?session.status(), "joined existing session");
        return Ok(session);
    }

    let session = create();
    store
        .set_document(
            GAME_SESSIONS_COLLECTION,
            session_id.as_str(),
            session.to_fields(),
            false,
        )
        .await
        .inspect_err(|err| warn!(session = %session_id, error = %err, "failed to create session"))?;
    info!(session = %session_id, "created session");
    Ok(session)
}
