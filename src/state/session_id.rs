//! Session identity: game types, participant pairs, seat assignment and the
//! order-independent session key both players derive.

use std::fmt;

/// Games that can be played in a shared session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameType {
    /// Three in a row on a 3x3 board.
    TicTacToe,
    /// Find the pairs in a shuffled deck.
    MemoryMatch,
}

impl GameType {
    /// All playable games, in menu order.
    pub const ALL: [GameType; 2] = [GameType::TicTacToe, GameType::MemoryMatch];

    /// Display name, also used as the session key prefix and the `gameType` field.
    pub fn name(self) -> &'static str {
        match self {
            GameType::TicTacToe => "Tic Tac Toe",
            GameType::MemoryMatch => "Memory Match",
        }
    }

    /// Parse a display name or a short alias (`tictactoe`, `memory`).
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "tictactoe" | "ttt" => Some(GameType::TicTacToe),
            "memorymatch" | "memory" => Some(GameType::MemoryMatch),
            _ => None,
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Seat of a participant, derived from the sorted participant pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    /// Lexicographically first participant.
    #[default]
    Player1,
    /// Lexicographically second participant.
    Player2,
}

impl Role {
    /// The opposite seat.
    pub fn other(self) -> Self {
        match self {
            Role::Player1 => Role::Player2,
            Role::Player2 => Role::Player1,
        }
    }
}

/// The two participants of a session, always held in sorted order so that
/// both clients agree on seats without storing them anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ParticipantPair {
    first: String,
    second: String,
}

impl ParticipantPair {
    /// Build a pair from two identifiers given in any order.
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            Self {
                first: a,
                second: b,
            }
        } else {
            Self {
                first: b,
                second: a,
            }
        }
    }

    /// Lexicographically first identifier.
    pub fn first(&self) -> &str {
        &self.first
    }

    /// Lexicographically second identifier.
    pub fn second(&self) -> &str {
        &self.second
    }

    /// Seat of `participant`, or `None` when they are not part of the pair.
    pub fn role_of(&self, participant: &str) -> Option<Role> {
        if participant == self.first {
            Some(Role::Player1)
        } else if participant == self.second {
            Some(Role::Player2)
        } else {
            None
        }
    }

    /// Identifier sitting in `role`.
    pub fn participant(&self, role: Role) -> &str {
        match role {
            Role::Player1 => &self.first,
            Role::Player2 => &self.second,
        }
    }

    /// Whether both seats are taken by the same identifier.
    pub fn is_degenerate(&self) -> bool {
        self.first == self.second
    }
}

/// Key of the shared session document: `{game name}_{first id}_{second id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Derive the key for `game_type` between two participants. Commutative in
    /// the participants.
    pub fn derive(game_type: GameType, a: &str, b: &str) -> Self {
        Self::for_pair(game_type, &ParticipantPair::new(a, b))
    }

    /// Key for an already sorted pair.
    pub fn for_pair(game_type: GameType, pair: &ParticipantPair) -> Self {
        Self(format!(
            "{}_{}_{}",
            game_type.name(),
            pair.first(),
            pair.second()
        ))
    }

    /// Document id in the sessions collection.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
