//! Heuristic Opponent
//!
//! Stateless move selection for the scripted side. Difficulty follows the
//! human's consecutive-win streak: higher levels make fewer deliberate
//! mistakes, always block, and look further ahead.
//!
//! The lookahead averages the scores of every own-mark reply instead of
//! taking an adversarial minimum. This keeps the difficulty curve gentle
//! and is intentional.

use tracing::trace;

use crate::core::rng::RandomSource;
use crate::game::board::{Board, CENTER_COLUMN, COLS, CONNECT, DIRECTIONS};
use crate::game::state::Mark;

/// Highest difficulty level.
pub const MAX_DIFFICULTY: u32 = 5;

/// Below this level the opponent may throw a move.
const MISTAKE_THRESHOLD: u32 = 3;

/// From this level on, threats are always blocked.
const ALWAYS_BLOCK_THRESHOLD: u32 = 2;

/// Columns tried first when throwing a move.
const EDGE_COLUMNS: [usize; 4] = [0, 6, 1, 5];

/// Center-out column order.
const CENTER_ORDER: [usize; COLS] = [3, 2, 4, 1, 5, 0, 6];

/// Difficulty for a human's consecutive-win streak.
pub fn difficulty_for_streak(streak: u32) -> u32 {
    streak.min(MAX_DIFFICULTY)
}

/// Probability of a deliberate mistake: 0.30 at level 0, falling 0.05 per
/// level, never below 0.05.
pub fn mistake_chance(difficulty: u32) -> f64 {
    (0.3 - difficulty.min(MAX_DIFFICULTY) as f64 * 0.05).max(0.05)
}

/// Pick a column for `mark`. Returns `None` only when the board is full.
pub fn select_move<R: RandomSource>(
    board: &Board,
    mark: Mark,
    difficulty: u32,
    rng: &mut R,
) -> Option<usize> {
    let difficulty = difficulty.min(MAX_DIFFICULTY);
    let mistake = mistake_chance(difficulty);
    let valid = board.valid_columns();
    if valid.is_empty() {
        return None;
    }

    if difficulty < MISTAKE_THRESHOLD && rng.next_f64() < mistake {
        trace!(difficulty, "throwing a move");
        return Some(
            EDGE_COLUMNS
                .iter()
                .copied()
                .find(|&col| board.can_drop(col))
                .unwrap_or_else(|| valid[rng.next_index(valid.len())]),
        );
    }

    if let Some(col) = valid.iter().copied().find(|&col| wins_with(board, col, mark)) {
        return Some(col);
    }

    let opponent = mark.opponent();
    let threats: Vec<usize> = valid
        .iter()
        .copied()
        .filter(|&col| wins_with(board, col, opponent))
        .collect();
    if let Some(&block) = threats.first() {
        if difficulty >= ALWAYS_BLOCK_THRESHOLD || rng.next_f64() > mistake {
            return Some(block);
        }
        trace!(difficulty, column = block, "missed a block");
    }

    if let Some(col) = strategic_move(board, mark, difficulty) {
        return Some(col);
    }

    if difficulty >= 1 {
        if let Some(col) = CENTER_ORDER.iter().copied().find(|&col| board.can_drop(col)) {
            return Some(col);
        }
    }

    Some(valid[rng.next_index(valid.len())])
}

/// True if dropping `mark` into `col` completes a line.
fn wins_with(board: &Board, col: usize, mark: Mark) -> bool {
    let mut trial = board.clone();
    match trial.apply_move(col, mark) {
        Ok(row) => trial.check_win(row, col, mark),
        Err(_) => false,
    }
}

/// Lookahead depth for a difficulty level.
fn lookahead_depth(difficulty: u32) -> u32 {
    match difficulty {
        d if d >= 3 => 2,
        d if d >= 1 => 1,
        _ => 0,
    }
}

/// Column with the highest positional score plus averaged lookahead.
/// Ties keep the lowest column.
fn strategic_move(board: &Board, mark: Mark, difficulty: u32) -> Option<usize> {
    let depth = lookahead_depth(difficulty);
    let mut best: Option<(usize, i64)> = None;

    for col in board.valid_columns() {
        let mut trial = board.clone();
        let Ok(row) = trial.apply_move(col, mark) else {
            continue;
        };
        let score = evaluate_position(&trial, row, col, mark) + future_score(&trial, mark, depth);
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((col, score));
        }
    }

    best.map(|(col, _)| col)
}

/// Integer mean over every legal `mark` reply of its positional score plus
/// the next ply's mean.
fn future_score(board: &Board, mark: Mark, depth: u32) -> i64 {
    if depth == 0 {
        return 0;
    }

    let valid = board.valid_columns();
    if valid.is_empty() {
        return 0;
    }

    let total: i64 = valid
        .iter()
        .map(|&col| {
            let mut trial = board.clone();
            match trial.apply_move(col, mark) {
                Ok(row) => {
                    evaluate_position(&trial, row, col, mark) + future_score(&trial, mark, depth - 1)
                }
                Err(_) => 0,
            }
        })
        .sum();

    total / valid.len() as i64
}

/// Positional score of the piece at `(row, col)`.
fn evaluate_position(board: &Board, row: usize, col: usize, mark: Mark) -> i64 {
    let lines: i64 = DIRECTIONS
        .iter()
        .map(|&(dr, dc)| evaluate_direction(board, row, col, dr, dc, mark))
        .sum();

    let center_bonus = match col.abs_diff(CENTER_COLUMN) {
        0 => 3,
        1 => 2,
        _ => 0,
    };

    lines + center_bonus
}

fn evaluate_direction(board: &Board, row: usize, col: usize, dr: isize, dc: isize, mark: Mark) -> i64 {
    let (forward, forward_open) = board.scan(row, col, dr, dc, mark);
    let (backward, backward_open) = board.scan(row, col, -dr, -dc, mark);
    let count = 1 + forward + backward;
    let open = forward_open as u8 + backward_open as u8;

    match (count, open) {
        (c, _) if c >= CONNECT => 1000,
        (3, o) if o > 0 => 50,
        (2, o) if o > 0 => 10,
        (1, o) if o > 1 => 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::DeterministicRng;

    /// Serves scripted float draws in order; index draws return 0.
    struct ScriptedSource {
        draws: Vec<f64>,
        taken: usize,
    }

    impl ScriptedSource {
        fn new(draws: &[f64]) -> Self {
            Self { draws: draws.to_vec(), taken: 0 }
        }
    }

    impl RandomSource for ScriptedSource {
        fn next_f64(&mut self) -> f64 {
            let v = self.draws[self.taken];
            self.taken += 1;
            v
        }

        fn next_index(&mut self, _len: usize) -> usize {
            0
        }
    }

    /// Fails the test if any random draw is made.
    struct NoDraws;

    impl RandomSource for NoDraws {
        fn next_f64(&mut self) -> f64 {
            panic!("unexpected random draw");
        }

        fn next_index(&mut self, _len: usize) -> usize {
            panic!("unexpected random draw");
        }
    }

    /// B holds the bottom row of columns 0..=2; A sits on top of 0 and 1.
    /// Column 3 wins for B.
    fn b_threatens_three() -> Board {
        let mut board = Board::new();
        for (col, mark) in [(0, Mark::B), (0, Mark::A), (1, Mark::B), (1, Mark::A), (2, Mark::B)] {
            board.apply_move(col, mark).unwrap();
        }
        board
    }

    #[test]
    fn test_difficulty_and_mistake_curve() {
        assert_eq!(difficulty_for_streak(0), 0);
        assert_eq!(difficulty_for_streak(9), MAX_DIFFICULTY);
        assert!((mistake_chance(0) - 0.30).abs() < 1e-9);
        assert!((mistake_chance(2) - 0.20).abs() < 1e-9);
        assert!((mistake_chance(5) - 0.05).abs() < 1e-9);
        assert!((mistake_chance(40) - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_takes_winning_column() {
        let board = b_threatens_three();
        let mut source = ScriptedSource::new(&[0.99]);
        assert_eq!(select_move(&board, Mark::B, 2, &mut source), Some(3));
        assert_eq!(source.taken, 1);

        assert_eq!(select_move(&board, Mark::B, 3, &mut NoDraws), Some(3));
    }

    #[test]
    fn test_mistake_prefers_edge() {
        let board = b_threatens_three();
        let mut source = ScriptedSource::new(&[0.0]);
        assert_eq!(select_move(&board, Mark::B, 0, &mut source), Some(0));
    }

    #[test]
    fn test_blocks_opponent_threat() {
        // Same layout with the marks swapped: A now threatens column 3
        let mut board = Board::new();
        for (col, mark) in [(0, Mark::A), (0, Mark::B), (1, Mark::A), (1, Mark::B), (2, Mark::A)] {
            board.apply_move(col, mark).unwrap();
        }
        assert_eq!(select_move(&board, Mark::B, 4, &mut NoDraws), Some(3));

        // Low difficulty blocks when the second draw clears the mistake chance
        let mut source = ScriptedSource::new(&[0.9, 0.9]);
        assert_eq!(select_move(&board, Mark::B, 0, &mut source), Some(3));
        assert_eq!(source.taken, 2);
    }

    #[test]
    fn test_empty_board_prefers_center() {
        let board = Board::new();
        for difficulty in 3..=MAX_DIFFICULTY {
            assert_eq!(select_move(&board, Mark::B, difficulty, &mut NoDraws), Some(CENTER_COLUMN));
        }
        let mut source = ScriptedSource::new(&[0.99]);
        assert_eq!(select_move(&board, Mark::B, 1, &mut source), Some(CENTER_COLUMN));
    }

    #[test]
    fn test_positional_scores_on_empty_board() {
        let board = Board::new();
        let scores: Vec<i64> = (0..COLS)
            .map(|col| {
                let mut trial = board.clone();
                let row = trial.apply_move(col, Mark::A).unwrap();
                evaluate_position(&trial, row, col, Mark::A)
            })
            .collect();
        assert_eq!(scores, vec![0, 1, 3, 4, 3, 1, 0]);
    }

    #[test]
    fn test_lookahead_is_an_average() {
        let mut board = Board::new();
        board.apply_move(0, Mark::A).unwrap();

        let replies: Vec<i64> = board
            .valid_columns()
            .into_iter()
            .map(|col| {
                let mut trial = board.clone();
                let row = trial.apply_move(col, Mark::A).unwrap();
                evaluate_position(&trial, row, col, Mark::A)
            })
            .collect();
        let mean = replies.iter().sum::<i64>() / replies.len() as i64;

        assert_eq!(future_score(&board, Mark::A, 1), mean);
        assert_eq!(future_score(&board, Mark::A, 1), 4);
        assert_eq!(future_score(&board, Mark::A, 0), 0);
    }

    #[test]
    fn test_full_board_has_no_move() {
        let mut board = Board::new();
        let pattern = [Mark::A, Mark::A, Mark::B, Mark::B, Mark::A, Mark::A, Mark::B];
        for row in 0..6 {
            for (col, &mark) in pattern.iter().enumerate() {
                let mark = if row % 2 == 0 { mark } else { mark.opponent() };
                board.apply_move(col, mark).unwrap();
            }
        }
        let mut rng = DeterministicRng::new(1);
        assert_eq!(select_move(&board, Mark::B, 0, &mut rng), None);
    }

    #[test]
    fn test_always_legal_with_seeded_rng() {
        let mut rng = DeterministicRng::new(42);
        let mut board = Board::new();
        let mut mark = Mark::A;
        while let Some(col) = select_move(&board, mark, 1, &mut rng) {
            assert!(board.can_drop(col));
            let row = board.apply_move(col, mark).unwrap();
            if board.check_win(row, col, mark) {
                break;
            }
            mark = mark.opponent();
        }
        assert!(board.respects_gravity());
    }
}
