/// Session variant, codec and per-seat status.
pub mod game;
/// Memory-match rules.
pub mod memory_match;
/// Game types, participant pairs and session keys.
pub mod session_id;
/// Tic-tac-toe rules.
pub mod tictactoe;

pub use self::game::{GameSession, GameState, MoveError, SeatStatus, SessionMeta, SessionStatus};
pub use self::memory_match::{MemoryMatchState, PairOutcome};
pub use self::session_id::{GameType, ParticipantPair, Role, SessionId};
pub use self::tictactoe::{Mark, TicTacToeState};
