//! Tic-tac-toe rules: a 3x3 board, `X` always belongs to the first participant
//! of the sorted pair, a coin flip decides who opens.

use std::fmt;

use rand::Rng;

use crate::dao::models::TicTacToeDocument;

use super::{
    game::{MoveError, SessionStatus},
    session_id::Role,
};

/// Number of cells on the board.
pub const BOARD_SIZE: usize = 9;

const LINES: [[usize; 3]; 8] = [
    // Rows
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    // Columns
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    // Diagonals
    [0, 4, 8],
    [2, 4, 6],
];

/// Symbol placed on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mark {
    /// Played by `player1`.
    #[default]
    X,
    /// Played by `player2`.
    O,
}

impl Mark {
    /// The opponent's symbol.
    pub fn other(self) -> Self {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }

    /// Symbol assigned to a seat.
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Player1 => Mark::X,
            Role::Player2 => Mark::O,
        }
    }

    /// Stored form of the symbol.
    pub fn as_str(self) -> &'static str {
        match self {
            Mark::X => "X",
            Mark::O => "O",
        }
    }

    /// Parse a stored symbol; anything but `"X"`/`"O"` is not a mark.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "X" => Some(Mark::X),
            "O" => Some(Mark::O),
            _ => None,
        }
    }
}

/// Complete state of one tic-tac-toe match.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TicTacToeState {
    /// Cells in row-major order, `None` when empty.
    pub board: [Option<Mark>; BOARD_SIZE],
    /// Symbol expected to move next. Frozen once the game is over.
    pub current_turn: Mark,
    /// `Ongoing`, `Won` or `Draw`.
    pub status: SessionStatus,
    /// Set exactly when `status` is `Won`.
    pub winner: Option<Mark>,
}

impl TicTacToeState {
    /// Empty board with a randomly chosen opening symbol.
    pub fn new_game<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            current_turn: if rng.random_bool(0.5) { Mark::X } else { Mark::O },
            ..Self::default()
        }
    }

    /// Place `mark` on `cell`, returning the next state.
    ///
    /// The placed symbol is checked against all eight lines; a full board
    /// without a line is a draw, otherwise the turn passes.
    pub fn apply_move(&self, mark: Mark, cell: usize) -> Result<Self, MoveError> {
        if self.status.is_terminal() {
            return Err(MoveError::GameAlreadyOver);
        }
        let slot = self.board.get(cell).ok_or(MoveError::OutOfRange {
            index: cell,
            len: BOARD_SIZE,
        })?;
        if slot.is_some() {
            return Err(MoveError::CellOccupied(cell));
        }
        if mark != self.current_turn {
            return Err(MoveError::NotYourTurn);
        }

        let mut next = self.clone();
        next.board[cell] = Some(mark);

        if next.winning_line(mark).is_some() {
            next.status = SessionStatus::Won;
            next.winner = Some(mark);
        } else if next.is_full() {
            next.status = SessionStatus::Draw;
        } else {
            next.current_turn = mark.other();
        }
        Ok(next)
    }

    /// Clear the board and flip a coin for the opening symbol.
    pub fn reset<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        Self::new_game(rng)
    }

    /// First line completed by `mark`, if any.
    pub fn winning_line(&self, mark: Mark) -> Option<[usize; 3]> {
        LINES
            .into_iter()
            .find(|line| line.iter().all(|&cell| self.board[cell] == Some(mark)))
    }

    /// Whether every cell holds a symbol.
    pub fn is_full(&self) -> bool {
        self.board.iter().all(Option::is_some)
    }

    /// Cells holding `mark`.
    pub fn count(&self, mark: Mark) -> usize {
        self.board.iter().filter(|cell| **cell == Some(mark)).count()
    }
}

impl From<&TicTacToeDocument> for TicTacToeState {
    fn from(document: &TicTacToeDocument) -> Self {
        let board = if document.board.len() == BOARD_SIZE {
            let mut board = [None; BOARD_SIZE];
            for (slot, stored) in board.iter_mut().zip(&document.board) {
                *slot = Mark::parse(stored);
            }
            board
        } else {
            [None; BOARD_SIZE]
        };

        let mut state = Self {
            board,
            current_turn: Mark::parse(&document.current_turn).unwrap_or_default(),
            ..Self::default()
        };
        // A winner only exists alongside `won`; a win without one is read off the board.
        match SessionStatus::parse(&document.game_status) {
            SessionStatus::Won => {
                let winner = document
                    .winner
                    .as_deref()
                    .and_then(Mark::parse)
                    .or_else(|| {
                        [Mark::X, Mark::O]
                            .into_iter()
                            .find(|&mark| state.winning_line(mark).is_some())
                    });
                if let Some(mark) = winner {
                    state.status = SessionStatus::Won;
                    state.winner = Some(mark);
                }
            }
            SessionStatus::Draw => state.status = SessionStatus::Draw,
            _ => {}
        }
        state
    }
}

impl TicTacToeState {
    /// Copy the game fields into a stored document.
    pub fn write_into(&self, document: &mut TicTacToeDocument) {
        document.board = self
            .board
            .iter()
            .map(|cell| cell.map(Mark::as_str).unwrap_or_default().to_string())
            .collect();
        document.current_turn = self.current_turn.as_str().to_string();
        document.game_status = self.status.as_str().to_string();
        document.winner = self.winner.map(|mark| mark.as_str().to_string());
    }
}

impl fmt::Display for TicTacToeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (row, cells) in self.board.chunks(3).enumerate() {
            if row > 0 {
                writeln!(f)?;
            }
            for (col, cell) in cells.iter().enumerate() {
                if col > 0 {
                    f.write_str(" ")?;
                }
                match cell {
                    Some(mark) => f.write_str(mark.as_str())?,
                    None => write!(f, "{}", row * 3 + col)?,
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn board(layout: &str) -> [Option<Mark>; BOARD_SIZE] {
        let mut board = [None; BOARD_SIZE];
        for (slot, c) in board.iter_mut().zip(layout.chars()) {
            *slot = match c {
                'X' => Some(Mark::X),
                'O' => Some(Mark::O),
                _ => None,
            };
        }
        board
    }

    fn state(layout: &str, turn: Mark) -> TicTacToeState {
        TicTacToeState {
            board: board(layout),
            current_turn: turn,
            ..TicTacToeState::default()
        }
    }

    #[test]
    fn completing_a_row_wins() {
        let game = state("XX.OO....", Mark::X);
        let next = game.apply_move(Mark::X, 2).unwrap();

        assert_eq!(next.status, SessionStatus::Won);
        assert_eq!(next.winner, Some(Mark::X));
        assert_eq!(next.current_turn, Mark::X);
    }

    #[test]
    fn full_board_without_line_is_draw() {
        let game = state("XOXXOOOX.", Mark::X);
        let next = game.apply_move(Mark::X, 8).unwrap();

        assert_eq!(next.status, SessionStatus::Draw);
        assert_eq!(next.winner, None);
    }

    #[test]
    fn final_cell_completing_a_line_wins_instead_of_drawing() {
        let game = state("OXXXOOXO.", Mark::O);
        let next = game.apply_move(Mark::O, 8).unwrap();

        assert_eq!(next.status, SessionStatus::Won);
        assert_eq!(next.winner, Some(Mark::O));
    }

    #[test]
    fn legal_move_changes_exactly_one_cell_and_passes_turn() {
        let game = state("X...O....", Mark::X);
        let next = game.apply_move(Mark::X, 8).unwrap();

        let changed = game
            .board
            .iter()
            .zip(next.board.iter())
            .filter(|(before, after)| before != after)
            .count();
        assert_eq!(changed, 1);
        assert_eq!(next.status, SessionStatus::Ongoing);
        assert_eq!(next.current_turn, Mark::O);
    }

    #[test]
    fn wrong_turn_is_rejected() {
        let game = state(".........", Mark::O);
        assert_eq!(game.apply_move(Mark::X, 0), Err(MoveError::NotYourTurn));
    }

    #[test]
    fn occupied_cell_is_rejected() {
        let game = state("X........", Mark::O);
        assert_eq!(game.apply_move(Mark::O, 0), Err(MoveError::CellOccupied(0)));
    }

    #[test]
    fn finished_game_rejects_moves() {
        let game = TicTacToeState {
            status: SessionStatus::Won,
            winner: Some(Mark::X),
            ..state("XXX.OO...", Mark::X)
        };
        assert_eq!(game.apply_move(Mark::X, 3), Err(MoveError::GameAlreadyOver));
    }

    #[test]
    fn out_of_range_cell_is_rejected() {
        let game = state(".........", Mark::X);
        assert_eq!(
            game.apply_move(Mark::X, 9),
            Err(MoveError::OutOfRange { index: 9, len: 9 })
        );
    }

    #[test]
    fn random_playouts_keep_mark_counts_balanced() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let mut game = TicTacToeState::new_game(&mut rng);
            while game.status == SessionStatus::Ongoing {
                let empty: Vec<usize> = (0..BOARD_SIZE).filter(|&c| game.board[c].is_none()).collect();
                let cell = empty[rng.random_range(0..empty.len())];
                game = game.apply_move(game.current_turn, cell).unwrap();

                let (x, o) = (game.count(Mark::X), game.count(Mark::O));
                assert!(x.abs_diff(o) <= 1, "unbalanced board {game:?}");
            }
            match game.status {
                SessionStatus::Won => assert!(game.winner.is_some()),
                SessionStatus::Draw => assert!(game.winner.is_none() && game.is_full()),
                other => panic!("unexpected terminal status {other:?}"),
            }
        }
    }

    #[test]
    fn reset_clears_board() {
        let mut rng = StdRng::seed_from_u64(1);
        let game = TicTacToeState {
            status: SessionStatus::Won,
            winner: Some(Mark::O),
            ..state("OOOXX.X..", Mark::O)
        };
        let fresh = game.reset(&mut rng);

        assert_eq!(fresh.status, SessionStatus::Ongoing);
        assert_eq!(fresh.winner, None);
        assert!(fresh.board.iter().all(Option::is_none));
    }

    #[test]
    fn decoding_defaults_every_field() {
        let decoded = TicTacToeState::from(&TicTacToeDocument::default());
        assert_eq!(decoded, TicTacToeState::default());

        let document = TicTacToeDocument {
            board: vec!["X".into(); 4],
            current_turn: "?".into(),
            game_status: "finished".into(),
            winner: Some("Q".into()),
            ..TicTacToeDocument::default()
        };
        assert_eq!(TicTacToeState::from(&document), TicTacToeState::default());
    }

    #[test]
    fn decoding_keeps_winner_only_with_a_win() {
        let stale_winner = TicTacToeDocument {
            board: vec![String::new(); BOARD_SIZE],
            game_status: "ongoing".into(),
            winner: Some("X".into()),
            ..TicTacToeDocument::default()
        };
        let decoded = TicTacToeState::from(&stale_winner);
        assert_eq!(decoded.status, SessionStatus::Ongoing);
        assert_eq!(decoded.winner, None);

        let draw_with_winner = TicTacToeDocument {
            game_status: "draw".into(),
            winner: Some("O".into()),
            ..stale_winner.clone()
        };
        assert_eq!(TicTacToeState::from(&draw_with_winner).winner, None);
    }

    #[test]
    fn decoding_a_win_without_winner_reads_the_board() {
        let mut document = TicTacToeDocument {
            board: ["O", "O", "O", "X", "X", "", "X", "", ""]
                .map(String::from)
                .to_vec(),
            game_status: "won".into(),
            winner: None,
            ..TicTacToeDocument::default()
        };
        let decoded = TicTacToeState::from(&document);
        assert_eq!(decoded.status, SessionStatus::Won);
        assert_eq!(decoded.winner, Some(Mark::O));

        document.board = vec![String::new(); BOARD_SIZE];
        let decoded = TicTacToeState::from(&document);
        assert_eq!(decoded.status, SessionStatus::Ongoing);
        assert_eq!(decoded.winner, None);
    }

    #[test]
    fn stale_winner_is_not_carried_into_later_moves() {
        let document = TicTacToeDocument {
            board: vec![String::new(); BOARD_SIZE],
            current_turn: "X".into(),
            game_status: "ongoing".into(),
            winner: Some("O".into()),
            ..TicTacToeDocument::default()
        };
        let next = TicTacToeState::from(&document).apply_move(Mark::X, 4).unwrap();
        assert_eq!(next.winner, None);
    }

    #[test]
    fn renders_grid_with_cell_numbers() {
        let game = state("X...O...X", Mark::O);
        assert_eq!(game.to_string(), "X 1 2\n3 O 5\n6 7 X");
    }
}
