//! Memory-match rules: a shuffled deck of paired faces, players take turns
//! turning two cards over and keep the turn while they find pairs.

use std::fmt;

use rand::{Rng, seq::SliceRandom};

use crate::dao::models::MemoryMatchDocument;

use super::{
    game::{MoveError, SessionStatus},
    session_id::Role,
};

/// Cards face-up awaiting resolution once a turn has flipped two.
pub const MAX_FLIPPED: usize = 2;

/// How a pair of flipped cards resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairOutcome {
    /// Both faces are equal: the cards stay up and the player scores.
    Match,
    /// Faces differ: the cards go back down and the turn passes.
    Mismatch,
}

/// Complete state of one memory-match game.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemoryMatchState {
    /// Face of every card, in deck order.
    pub cards: Vec<String>,
    /// Face-up flag per card, same length as `cards`.
    pub revealed: Vec<bool>,
    /// Cards turned this turn and not yet resolved, at most [`MAX_FLIPPED`].
    pub flipped: Vec<usize>,
    /// Pairs found by `player1`.
    pub score_player1: u32,
    /// Pairs found by `player2`.
    pub score_player2: u32,
    /// Seat allowed to flip next.
    pub current_turn: Role,
    /// `Ongoing` until every card is face-up, then `Finished`.
    pub status: SessionStatus,
}

impl MemoryMatchState {
    /// Deal a fresh deck holding every face twice, shuffled, with a random
    /// opening player.
    pub fn new_game<R: Rng + ?Sized>(faces: &[String], rng: &mut R) -> Self {
        let mut cards = faces
            .iter()
            .chain(faces.iter())
            .cloned()
            .collect::<Vec<_>>();
        cards.shuffle(rng);
        let current_turn = if rng.random_bool(0.5) {
            Role::Player1
        } else {
            Role::Player2
        };

        Self {
            revealed: vec![false; cards.len()],
            cards,
            current_turn,
            ..Self::default()
        }
    }

    /// Turn card `index` face-up for `role`.
    ///
    /// Resolution of a completed pair is a separate step so that the
    /// intermediate state can be shown to both players first.
    pub fn flip(&self, role: Role, index: usize) -> Result<Self, MoveError> {
        if self.status.is_terminal() {
            return Err(MoveError::GameAlreadyOver);
        }
        let revealed = *self.revealed.get(index).ok_or(MoveError::OutOfRange {
            index,
            len: self.cards.len(),
        })?;
        if revealed || self.flipped.contains(&index) {
            return Err(MoveError::CardAlreadyRevealed(index));
        }
        if self.flipped.len() >= MAX_FLIPPED {
            return Err(MoveError::PairPending);
        }
        if role != self.current_turn {
            return Err(MoveError::NotYourTurn);
        }

        let mut next = self.clone();
        next.revealed[index] = true;
        next.flipped.push(index);
        Ok(next)
    }

    /// The two flipped indices, once a pair is complete.
    pub fn pending_pair(&self) -> Option<(usize, usize)> {
        match self.flipped.as_slice() {
            &[first, second] => Some((first, second)),
            _ => None,
        }
    }

    /// How the pending pair will resolve.
    pub fn pending_outcome(&self) -> Option<PairOutcome> {
        let (first, second) = self.pending_pair()?;
        if self.cards[first] == self.cards[second] {
            Some(PairOutcome::Match)
        } else {
            Some(PairOutcome::Mismatch)
        }
    }

    /// Settle the pending pair. A match scores for the player on turn and may
    /// finish the game; a mismatch hides both cards and passes the turn.
    /// Without a complete pair the state is returned unchanged.
    pub fn resolve_pending_pair(&self) -> Self {
        let Some((first, second)) = self.pending_pair() else {
            return self.clone();
        };

        let mut next = self.clone();
        next.flipped.clear();
        if self.cards[first] == self.cards[second] {
            match self.current_turn {
                Role::Player1 => next.score_player1 = next.score_player1.saturating_add(1),
                Role::Player2 => next.score_player2 = next.score_player2.saturating_add(1),
            }
            if next.revealed.iter().all(|&up| up) {
                next.status = SessionStatus::Finished;
            }
        } else {
            next.revealed[first] = false;
            next.revealed[second] = false;
            next.current_turn = self.current_turn.other();
        }
        next
    }

    /// Reshuffle a fresh deck of the same faces and clear every score.
    pub fn reset<R: Rng + ?Sized>(&self, faces: &[String], rng: &mut R) -> Self {
        Self::new_game(faces, rng)
    }

    /// Pairs found by `role`.
    pub fn score(&self, role: Role) -> u32 {
        match role {
            Role::Player1 => self.score_player1,
            Role::Player2 => self.score_player2,
        }
    }

    /// Number of pairs in the deck.
    pub fn pair_count(&self) -> usize {
        self.cards.len() / 2
    }
}

impl From<&MemoryMatchDocument> for MemoryMatchState {
    fn from(document: &MemoryMatchDocument) -> Self {
        let cards = document.board_values.clone();

        let mut revealed = document.board_revealed.clone();
        revealed.resize(cards.len(), false);

        let mut flipped = Vec::with_capacity(MAX_FLIPPED);
        for &index in &document.flipped_indices {
            if index < cards.len() && !flipped.contains(&index) && flipped.len() < MAX_FLIPPED {
                flipped.push(index);
            }
        }

        Self {
            cards,
            revealed,
            flipped,
            score_player1: document.score_player1,
            score_player2: document.score_player2,
            current_turn: parse_role(&document.current_turn),
            status: match SessionStatus::parse(&document.game_status) {
                SessionStatus::Finished => SessionStatus::Finished,
                _ => SessionStatus::Ongoing,
            },
        }
    }
}

impl MemoryMatchState {
    /// Copy the game fields into a stored document.
    pub fn write_into(&self, document: &mut MemoryMatchDocument) {
        document.board_values = self.cards.clone();
        document.board_revealed = self.revealed.clone();
        document.flipped_indices = self.flipped.clone();
        document.score_player1 = self.score_player1;
        document.score_player2 = self.score_player2;
        document.current_turn = role_name(self.current_turn).to_string();
        document.game_status = self.status.as_str().to_string();
    }
}

fn parse_role(value: &str) -> Role {
    match value {
        "player2" => Role::Player2,
        _ => Role::Player1,
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::Player1 => "player1",
        Role::Player2 => "player2",
    }
}

impl fmt::Display for MemoryMatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (row, cards) in self.cards.chunks(4).enumerate() {
            if row > 0 {
                writeln!(f)?;
            }
            for (col, face) in cards.iter().enumerate() {
                let index = row * 4 + col;
                if col > 0 {
                    f.write_str(" ")?;
                }
                if self.revealed.get(index).copied().unwrap_or(false) {
                    write!(f, "{face:>2}")?;
                } else {
                    write!(f, "{index:>2}")?;
                }
            }
        }
        write!(
            f,
            "\nplayer1 {} - {} player2",
            self.score_player1, self.score_player2
        )
    }
}
