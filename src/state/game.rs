//! Shared session state: the per-game variant, its stored codec and the
//! status each seat sees.

use std::fmt;

use rand::Rng;
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{
    config::GameSettings,
    dao::{
        document_store::Fields,
        models::{MemoryMatchDocument, TicTacToeDocument, decode_document, encode_document},
    },
};

use super::{
    memory_match::{MemoryMatchState, PairOutcome},
    session_id::{GameType, ParticipantPair, Role, SessionId},
    tictactoe::{Mark, TicTacToeState},
};

/// Lifecycle of a match. Tic-tac-toe ends `Won` or `Draw`, memory-match ends `Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionStatus {
    /// Moves are accepted.
    #[default]
    Ongoing,
    /// Tic-tac-toe line completed.
    Won,
    /// Tic-tac-toe board full without a line.
    Draw,
    /// Every memory card is face-up.
    Finished,
}

impl SessionStatus {
    /// Stored form of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Ongoing => "ongoing",
            SessionStatus::Won => "won",
            SessionStatus::Draw => "draw",
            SessionStatus::Finished => "finished",
        }
    }

    /// Parse a stored status; unknown values read as `Ongoing`.
    pub fn parse(value: &str) -> Self {
        match value {
            "won" => SessionStatus::Won,
            "draw" => SessionStatus::Draw,
            "finished" => SessionStatus::Finished,
            _ => SessionStatus::Ongoing,
        }
    }

    /// Whether the match is over and refuses moves.
    pub fn is_terminal(self) -> bool {
        self != SessionStatus::Ongoing
    }
}

/// Reasons a move or flip is refused. Callers treat every variant as a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveError {
    /// The other seat is on turn.
    #[error("it is not this player's turn")]
    NotYourTurn,
    /// The cell already holds a symbol.
    #[error("cell {0} is already occupied")]
    CellOccupied(usize),
    /// The card is face-up or already flipped this turn.
    #[error("card {0} is already face-up")]
    CardAlreadyRevealed(usize),
    /// The match has ended.
    #[error("the game is already over")]
    GameAlreadyOver,
    /// Two cards are up and waiting to be resolved.
    #[error("a flipped pair has not been resolved yet")]
    PairPending,
    /// Cell or card index past the end of the board.
    #[error("index {index} is outside a board of {len}")]
    OutOfRange {
        /// Requested index.
        index: usize,
        /// Board or deck size.
        len: usize,
    },
    /// The acting id is neither participant.
    #[error("participant is not seated in this session")]
    NotAParticipant,
    /// Tic-tac-toe move on a memory session or the other way round.
    #[error("action does not apply to a {0} session")]
    WrongGame(GameType),
}

/// Fields shared by every game type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMeta {
    /// Key of the stored document.
    pub session_id: SessionId,
    /// Both players, sorted.
    pub participants: ParticipantPair,
    /// Informational only, never used to order or reject writes.
    pub last_updated: OffsetDateTime,
}

/// Game-specific state of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameState {
    /// Tic-tac-toe board.
    TicTacToe(TicTacToeState),
    /// Memory-match deck.
    MemoryMatch(MemoryMatchState),
}

/// Authoritative state of one match, round-tripped whole through the shared document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSession {
    /// Identity and bookkeeping.
    pub meta: SessionMeta,
    /// Rules state.
    pub game: GameState,
}

/// How the session looks from one participant's seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatStatus {
    /// The viewer may move.
    YourTurn,
    /// Waiting for the opponent.
    OpponentsTurn,
    /// Match over, the viewer won.
    YouWon,
    /// Match over, the opponent won.
    YouLost,
    /// Tic-tac-toe ended without a line.
    Draw,
    /// Memory match finished level on pairs.
    Tie,
    /// The viewer is not seated in this session.
    Spectating,
}

impl fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SeatStatus::YourTurn => "Your turn",
            SeatStatus::OpponentsTurn => "Opponent's turn",
            SeatStatus::YouWon => "You won!",
            SeatStatus::YouLost => "You lost!",
            SeatStatus::Draw => "It's a draw!",
            SeatStatus::Tie => "It's a tie!",
            SeatStatus::Spectating => "Watching",
        })
    }
}

impl GameSession {
    /// Fresh session for `participants`, with the random parts (opening turn,
    /// deck order) drawn from `rng`.
    pub fn new_game<R: Rng + ?Sized>(
        game_type: GameType,
        participants: ParticipantPair,
        settings: &GameSettings,
        rng: &mut R,
    ) -> Self {
        let game = match game_type {
            GameType::TicTacToe => GameState::TicTacToe(TicTacToeState::new_game(rng)),
            GameType::MemoryMatch => {
                GameState::MemoryMatch(MemoryMatchState::new_game(&settings.memory_faces, rng))
            }
        };
        Self {
            meta: SessionMeta {
                session_id: SessionId::for_pair(game_type, &participants),
                participants,
                last_updated: now(),
            },
            game,
        }
    }

    /// Game played in this session.
    pub fn game_type(&self) -> GameType {
        match self.game {
            GameState::TicTacToe(_) => GameType::TicTacToe,
            GameState::MemoryMatch(_) => GameType::MemoryMatch,
        }
    }

    /// Key of the stored document.
    pub fn session_id(&self) -> &SessionId {
        &self.meta.session_id
    }

    /// Lifecycle of the match.
    pub fn status(&self) -> SessionStatus {
        match &self.game {
            GameState::TicTacToe(game) => game.status,
            GameState::MemoryMatch(game) => game.status,
        }
    }

    /// Seat of `participant`, derived from the sorted pair.
    pub fn role_of(&self, participant: &str) -> Option<Role> {
        self.meta.participants.role_of(participant)
    }

    /// Tic-tac-toe symbol of `participant`: the first id of the sorted pair plays `X`.
    pub fn assigned_mark(&self, participant: &str) -> Option<Mark> {
        self.role_of(participant).map(Mark::for_role)
    }

    /// Place the participant's symbol on `cell`.
    pub fn apply_move(&self, participant: &str, cell: usize) -> Result<Self, MoveError> {
        let GameState::TicTacToe(game) = &self.game else {
            return Err(MoveError::WrongGame(self.game_type()));
        };
        let mark = self
            .assigned_mark(participant)
            .ok_or(MoveError::NotAParticipant)?;
        let next = game.apply_move(mark, cell)?;
        Ok(self.with_game(GameState::TicTacToe(next)))
    }

    /// Turn a memory card face-up for the participant.
    pub fn flip(&self, participant: &str, card: usize) -> Result<Self, MoveError> {
        let GameState::MemoryMatch(game) = &self.game else {
            return Err(MoveError::WrongGame(self.game_type()));
        };
        let role = self
            .role_of(participant)
            .ok_or(MoveError::NotAParticipant)?;
        let next = game.flip(role, card)?;
        Ok(self.with_game(GameState::MemoryMatch(next)))
    }

    /// Outcome of the flipped memory pair, once two cards are up.
    pub fn pending_outcome(&self) -> Option<PairOutcome> {
        match &self.game {
            GameState::MemoryMatch(game) => game.pending_outcome(),
            GameState::TicTacToe(_) => None,
        }
    }

    /// The two face-up memory cards awaiting resolution.
    pub fn pending_pair(&self) -> Option<(usize, usize)> {
        match &self.game {
            GameState::MemoryMatch(game) => game.pending_pair(),
            GameState::TicTacToe(_) => None,
        }
    }

    /// Settle the flipped memory pair. Anything else is returned unchanged.
    pub fn resolve_pending_pair(&self) -> Self {
        match &self.game {
            GameState::MemoryMatch(game) if game.pending_pair().is_some() => {
                self.with_game(GameState::MemoryMatch(game.resolve_pending_pair()))
            }
            _ => self.clone(),
        }
    }

    /// Start the match over: empty board or reshuffled deck, random opener.
    pub fn reset<R: Rng + ?Sized>(&self, settings: &GameSettings, rng: &mut R) -> Self {
        let game = match &self.game {
            GameState::TicTacToe(game) => GameState::TicTacToe(game.reset(rng)),
            GameState::MemoryMatch(game) => {
                GameState::MemoryMatch(game.reset(&settings.memory_faces, rng))
            }
        };
        self.with_game(game)
    }

    /// Status line for `participant`.
    pub fn seat_status(&self, participant: &str) -> SeatStatus {
        let Some(role) = self.role_of(participant) else {
            return SeatStatus::Spectating;
        };

        match &self.game {
            GameState::TicTacToe(game) => {
                let mine = Mark::for_role(role);
                match (game.status, game.winner) {
                    (SessionStatus::Ongoing, _) if game.current_turn == mine => SeatStatus::YourTurn,
                    (SessionStatus::Ongoing, _) => SeatStatus::OpponentsTurn,
                    (SessionStatus::Won, Some(winner)) if winner == mine => SeatStatus::YouWon,
                    (SessionStatus::Won, Some(_)) => SeatStatus::YouLost,
                    _ => SeatStatus::Draw,
                }
            }
            GameState::MemoryMatch(game) => {
                if game.status == SessionStatus::Ongoing {
                    return if game.current_turn == role {
                        SeatStatus::YourTurn
                    } else {
                        SeatStatus::OpponentsTurn
                    };
                }
                let (mine, theirs) = (game.score(role), game.score(role.other()));
                match mine.cmp(&theirs) {
                    std::cmp::Ordering::Greater => SeatStatus::YouWon,
                    std::cmp::Ordering::Less => SeatStatus::YouLost,
                    std::cmp::Ordering::Equal => SeatStatus::Tie,
                }
            }
        }
    }

    /// Encode every field of the session for the shared document.
    pub fn to_fields(&self) -> Fields {
        let game_type = self.game_type().name().to_string();
        let last_updated = format_timestamp(self.meta.last_updated);
        let player1 = self.meta.participants.first().to_string();
        let player2 = self.meta.participants.second().to_string();

        match &self.game {
            GameState::TicTacToe(game) => {
                let mut document = TicTacToeDocument {
                    game_type,
                    last_updated,
                    player1,
                    player2,
                    ..TicTacToeDocument::default()
                };
                game.write_into(&mut document);
                encode_document(&document)
            }
            GameState::MemoryMatch(game) => {
                let mut document = MemoryMatchDocument {
                    game_type,
                    last_updated,
                    player1,
                    player2,
                    ..MemoryMatchDocument::default()
                };
                game.write_into(&mut document);
                encode_document(&document)
            }
        }
    }

    /// Decode a stored document. Total: every missing or malformed field
    /// takes its default, see [`TicTacToeDocument`] and [`MemoryMatchDocument`].
    /// The stored `gameType` is informational; `game_type` decides the variant.
    pub fn from_fields(game_type: GameType, session_id: SessionId, fields: &Fields) -> Self {
        match game_type {
            GameType::TicTacToe => {
                let document: TicTacToeDocument = decode_document(fields);
                Self {
                    meta: meta_from(
                        session_id,
                        &document.player1,
                        &document.player2,
                        &document.last_updated,
                    ),
                    game: GameState::TicTacToe(TicTacToeState::from(&document)),
                }
            }
            GameType::MemoryMatch => {
                let document: MemoryMatchDocument = decode_document(fields);
                Self {
                    meta: meta_from(
                        session_id,
                        &document.player1,
                        &document.player2,
                        &document.last_updated,
                    ),
                    game: GameState::MemoryMatch(MemoryMatchState::from(&document)),
                }
            }
        }
    }

    /// Same session with `participants` seated, regardless of what the document held.
    pub fn with_participants(mut self, participants: ParticipantPair) -> Self {
        self.meta.participants = participants;
        self
    }

    fn with_game(&self, game: GameState) -> Self {
        Self {
            meta: SessionMeta {
                last_updated: now(),
                ..self.meta.clone()
            },
            game,
        }
    }
}

impl fmt::Display for GameSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.game {
            GameState::TicTacToe(game) => game.fmt(f),
            GameState::MemoryMatch(game) => game.fmt(f),
        }
    }
}

fn meta_from(session_id: SessionId, player1: &str, player2: &str, stamp: &str) -> SessionMeta {
    SessionMeta {
        session_id,
        participants: ParticipantPair::new(player1, player2),
        last_updated: parse_timestamp(stamp),
    }
}

/// Current time truncated to milliseconds so it survives a document round-trip.
fn now() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(now.millisecond() as u32 * 1_000_000)
        .unwrap_or(now)
}

fn format_timestamp(time: OffsetDateTime) -> String {
    time.format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}

fn parse_timestamp(value: &str) -> OffsetDateTime {
    OffsetDateTime::parse(value, &Rfc3339).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}
