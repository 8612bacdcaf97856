//! Board Engine
//!
//! Fixed 6x7 grid with gravity fill. Row 0 is the top row, so a piece
//! dropped into an empty column lands on row `ROWS - 1`.
//!
//! All operations are pure given the same board.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::game::state::Mark;

/// Number of rows.
pub const ROWS: usize = 6;

/// Number of columns.
pub const COLS: usize = 7;

/// Pieces in a row needed to win.
pub const CONNECT: usize = 4;

/// Index of the center column.
pub const CENTER_COLUMN: usize = COLS / 2;

/// The four axes through a cell: horizontal, vertical, and both diagonals.
pub const DIRECTIONS: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

/// Errors from dropping a piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BoardError {
    /// Column index outside `0..COLS`.
    #[error("invalid column")]
    InvalidColumn,
    /// No empty cell left in the column.
    #[error("column is full")]
    ColumnFull,
}

/// Connect Four grid.
///
/// Invariant: a cell above an empty cell in the same column is empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<Vec<u8>>", try_from = "Vec<Vec<u8>>")]
pub struct Board {
    cells: [[Option<Mark>; COLS]; ROWS],
}

impl Board {
    /// Create an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cell contents, or `None` for empty or out of range.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<Mark> {
        self.cells.get(row).and_then(|r| r.get(col)).copied().flatten()
    }

    /// Whether a piece can be dropped into `col`.
    #[inline]
    pub fn can_drop(&self, col: usize) -> bool {
        col < COLS && self.cells[0][col].is_none()
    }

    /// Drop `mark` into `column` and return the row it landed on.
    pub fn apply_move(&mut self, column: usize, mark: Mark) -> Result<usize, BoardError> {
        if column >= COLS {
            return Err(BoardError::InvalidColumn);
        }

        let row = (0..ROWS)
            .rev()
            .find(|&r| self.cells[r][column].is_none())
            .ok_or(BoardError::ColumnFull)?;

        self.cells[row][column] = Some(mark);
        Ok(row)
    }

    /// True if `CONNECT` or more pieces of `mark` run through `(row, col)`
    /// along any axis.
    pub fn check_win(&self, row: usize, col: usize, mark: Mark) -> bool {
        DIRECTIONS.iter().any(|&(dr, dc)| {
            let (forward, _) = self.scan(row, col, dr, dc, mark);
            let (backward, _) = self.scan(row, col, -dr, -dc, mark);
            1 + forward + backward >= CONNECT
        })
    }

    /// True when no column accepts another piece.
    pub fn is_full(&self) -> bool {
        (0..COLS).all(|col| !self.can_drop(col))
    }

    /// Columns that accept a piece, ascending.
    pub fn valid_columns(&self) -> Vec<usize> {
        (0..COLS).filter(|&col| self.can_drop(col)).collect()
    }

    /// Walk from `(row, col)` (exclusive) in direction `(dr, dc)` for at most
    /// `CONNECT - 1` steps.
    ///
    /// Returns the number of contiguous `mark` cells and whether the first
    /// non-matching cell within reach is empty.
    pub fn scan(&self, row: usize, col: usize, dr: isize, dc: isize, mark: Mark) -> (usize, bool) {
        let mut count = 0;
        for step in 1..CONNECT as isize {
            let r = row as isize + dr * step;
            let c = col as isize + dc * step;
            if r < 0 || r >= ROWS as isize || c < 0 || c >= COLS as isize {
                break;
            }
            match self.cells[r as usize][c as usize] {
                Some(m) if m == mark => count += 1,
                None => return (count, true),
                Some(_) => break,
            }
        }
        (count, false)
    }

    /// Number of pieces on the board.
    pub fn piece_count(&self) -> usize {
        self.cells.iter().flatten().filter(|c| c.is_some()).count()
    }

    /// Check the gravity invariant for every column.
    pub fn respects_gravity(&self) -> bool {
        (0..COLS).all(|col| {
            (1..ROWS).all(|row| self.cells[row][col].is_some() || self.cells[row - 1][col].is_none())
        })
    }
}

impl From<Board> for Vec<Vec<u8>> {
    fn from(board: Board) -> Self {
        board
            .cells
            .iter()
            .map(|row| row.iter().map(|cell| cell.map_or(0, u8::from)).collect())
            .collect()
    }
}

impl TryFrom<Vec<Vec<u8>>> for Board {
    type Error = String;

    fn try_from(rows: Vec<Vec<u8>>) -> Result<Self, Self::Error> {
        if rows.len() != ROWS || rows.iter().any(|r| r.len() != COLS) {
            return Err(format!("board must be {ROWS}x{COLS}"));
        }

        let mut board = Board::new();
        for (r, row) in rows.iter().enumerate() {
            for (c, &value) in row.iter().enumerate() {
                board.cells[r][c] = match value {
                    0 => None,
                    v => Some(Mark::try_from(v)?),
                };
            }
        }

        if !board.respects_gravity() {
            return Err("board has a floating piece".to_string());
        }
        Ok(board)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn drop_all(board: &mut Board, moves: &[(usize, Mark)]) {
        for &(col, mark) in moves {
            board.apply_move(col, mark).unwrap();
        }
    }

    #[test]
    fn test_gravity_fill() {
        let mut board = Board::new();
        assert_eq!(board.apply_move(3, Mark::A), Ok(5));
        assert_eq!(board.apply_move(3, Mark::B), Ok(4));
        assert_eq!(board.get(5, 3), Some(Mark::A));
        assert_eq!(board.get(4, 3), Some(Mark::B));
        assert_eq!(board.get(3, 3), None);
    }

    #[test]
    fn test_invalid_column() {
        let mut board = Board::new();
        assert_eq!(board.apply_move(COLS, Mark::A), Err(BoardError::InvalidColumn));
        assert_eq!(board.piece_count(), 0);
    }

    #[test]
    fn test_column_full() {
        let mut board = Board::new();
        for i in 0..ROWS {
            let mark = if i % 2 == 0 { Mark::A } else { Mark::B };
            board.apply_move(0, mark).unwrap();
        }
        let before = board.clone();
        assert_eq!(board.apply_move(0, Mark::A), Err(BoardError::ColumnFull));
        assert_eq!(board, before);
        assert_eq!(board.valid_columns(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_horizontal_win() {
        for mark in [Mark::A, Mark::B] {
            let mut board = Board::new();
            drop_all(&mut board, &[(1, mark), (2, mark), (3, mark)]);
            assert!(!board.check_win(5, 3, mark));
            let row = board.apply_move(4, mark).unwrap();
            assert!(board.check_win(row, 4, mark));
            // Completing the run from the middle also counts
            assert!(board.check_win(5, 2, mark));
        }
    }

    #[test]
    fn test_vertical_win() {
        for mark in [Mark::A, Mark::B] {
            let mut board = Board::new();
            drop_all(&mut board, &[(6, mark), (6, mark), (6, mark)]);
            assert!(!board.check_win(3, 6, mark));
            let row = board.apply_move(6, mark).unwrap();
            assert_eq!(row, 2);
            assert!(board.check_win(row, 6, mark));
        }
    }

    #[test]
    fn test_rising_diagonal_win() {
        for mark in [Mark::A, Mark::B] {
            let other = mark.opponent();
            let mut board = Board::new();
            drop_all(&mut board, &[
                (0, mark),
                (1, other), (1, mark),
                (2, other), (2, other), (2, mark),
                (3, other), (3, other), (3, other),
            ]);
            let row = board.apply_move(3, mark).unwrap();
            assert_eq!(row, 2);
            assert!(board.check_win(row, 3, mark));
        }
    }

    #[test]
    fn test_falling_diagonal_win() {
        for mark in [Mark::A, Mark::B] {
            let other = mark.opponent();
            let mut board = Board::new();
            drop_all(&mut board, &[
                (6, mark),
                (5, other), (5, mark),
                (4, other), (4, other), (4, mark),
                (3, other), (3, other), (3, other),
            ]);
            let row = board.apply_move(3, mark).unwrap();
            assert!(board.check_win(row, 3, mark));
        }
    }

    #[test]
    fn test_no_win_with_gap() {
        let mut board = Board::new();
        drop_all(&mut board, &[(0, Mark::A), (1, Mark::A), (3, Mark::A), (4, Mark::B)]);
        for col in [0, 1, 3] {
            assert!(!board.check_win(5, col, Mark::A));
        }
    }

    #[test]
    fn test_full_board() {
        let mut board = Board::new();
        // Column pattern that never lines up four
        let pattern = [Mark::A, Mark::A, Mark::B, Mark::B, Mark::A, Mark::A, Mark::B];
        for row in 0..ROWS {
            for (col, &mark) in pattern.iter().enumerate() {
                let mark = if row % 2 == 0 { mark } else { mark.opponent() };
                board.apply_move(col, mark).unwrap();
            }
        }
        assert!(board.is_full());
        assert!(board.valid_columns().is_empty());
    }

    #[test]
    fn test_scan_open_end() {
        let mut board = Board::new();
        drop_all(&mut board, &[(2, Mark::A), (3, Mark::A)]);
        assert_eq!(board.scan(5, 1, 0, 1, Mark::A), (2, true));
        assert_eq!(board.scan(5, 1, 0, -1, Mark::A), (0, true));
        assert_eq!(board.scan(5, 0, 0, -1, Mark::A), (0, false));
    }

    #[test]
    fn test_board_json_shape() {
        let mut board = Board::new();
        board.apply_move(0, Mark::B).unwrap();
        let json = serde_json::to_value(&board).unwrap();
        assert_eq!(json[5][0], 2);
        assert_eq!(json[0][0], 0);

        let floating = serde_json::json!([
            [1, 0, 0, 0, 0, 0, 0],
            [0, 0, 0, 0, 0, 0, 0],
            [0, 0, 0, 0, 0, 0, 0],
            [0, 0, 0, 0, 0, 0, 0],
            [0, 0, 0, 0, 0, 0, 0],
            [0, 0, 0, 0, 0, 0, 0]
        ]);
        assert!(serde_json::from_value::<Board>(floating).is_err());
    }

    proptest! {
        #[test]
        fn prop_gravity_holds(moves in proptest::collection::vec(0usize..COLS + 1, 0..60)) {
            let mut board = Board::new();
            let mut mark = Mark::A;
            for col in moves {
                let before = board.piece_count();
                match board.apply_move(col, mark) {
                    Ok(row) => {
                        prop_assert_eq!(board.get(row, col), Some(mark));
                        prop_assert_eq!(board.piece_count(), before + 1);
                        mark = mark.opponent();
                    }
                    Err(_) => prop_assert_eq!(board.piece_count(), before),
                }
                prop_assert!(board.respects_gravity());
            }
        }
    }
}
