//! Leaderboard and aggregate statistics.
//!
//! Derived from finished games only. Everything here can be rebuilt by
//! replaying [`GameRecord`]s in the order they were recorded.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::game::state::{Game, GameId, GameStatus, Mark, Winner};

/// Result of one finished game, as handed to the persistence layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRecord {
    /// Game identifier.
    pub id: GameId,
    /// Slot A display name.
    pub player1: String,
    /// Slot B display name.
    pub player2: String,
    /// Winner display name, or `"draw"`.
    pub winner: String,
    /// Seconds from creation to the final move.
    pub duration_seconds: f64,
    /// Slot B was the scripted opponent.
    pub was_scripted: bool,
    /// Game creation time.
    pub created_at: DateTime<Utc>,
    /// Winning slot. Disambiguates the winner when both names match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winning_slot: Option<Mark>,
}

impl GameRecord {
    /// Build a record from a finished game. Returns `None` for games that
    /// are not finished or never got a second player.
    pub fn from_game(game: &Game, now: DateTime<Utc>) -> Option<Self> {
        if game.status != GameStatus::Finished {
            return None;
        }
        let player2 = game.player2.as_ref()?;

        let winning_slot = match game.winner {
            Winner::Player1 => Some(Mark::A),
            Winner::Player2 => Some(Mark::B),
            Winner::None | Winner::Draw => None,
        };

        Some(Self {
            id: game.id.clone(),
            player1: game.player1.username.clone(),
            player2: player2.username.clone(),
            winner: game.winner_name()?,
            duration_seconds: game.elapsed_seconds(now),
            was_scripted: game.is_bot,
            created_at: game.created_at,
            winning_slot,
        })
    }

    /// Slot that won, falling back to a name match for older records.
    pub fn winner_slot(&self) -> Option<Mark> {
        if self.winning_slot.is_some() {
            return self.winning_slot;
        }
        if self.winner == self.player1 {
            Some(Mark::A)
        } else if self.winner == self.player2 {
            Some(Mark::B)
        } else {
            None
        }
    }
}

/// Per-player aggregate.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    /// Display name.
    pub username: String,
    /// Games won.
    pub wins: u32,
    /// Games finished.
    pub games_played: u32,
    /// `wins / games_played * 100`.
    pub win_rate: f64,
    /// Fastest winning game in seconds, 0 when the player has never won.
    pub best_time: f64,
    /// Total seconds across all finished games.
    pub total_time: f64,
}

impl PlayerStats {
    fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            ..Default::default()
        }
    }

    fn record(&mut self, won: bool, duration: f64) {
        self.games_played += 1;
        self.total_time += duration;
        if won {
            self.wins += 1;
            if self.best_time == 0.0 || duration < self.best_time {
                self.best_time = duration;
            }
        }
        self.win_rate = self.wins as f64 / self.games_played as f64 * 100.0;
    }
}

/// Aggregate game statistics.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStats {
    /// Finished games.
    pub total_games: u64,
    /// Finished games against the scripted opponent.
    pub bot_games: u64,
    /// Finished human-vs-human games.
    pub human_games: u64,
    /// Mean game duration in seconds.
    pub avg_duration: f64,
    /// Games currently waiting or playing.
    pub active_games: usize,
}

/// Leaderboard, win streaks, and totals.
#[derive(Clone, Debug, Default)]
pub struct Leaderboard {
    players: BTreeMap<String, PlayerStats>,
    streaks: BTreeMap<String, u32>,
    total_games: u64,
    scripted_games: u64,
    total_duration: f64,
}

impl Leaderboard {
    /// Create an empty leaderboard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay stored records in order.
    pub fn from_history<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a GameRecord>,
    {
        let mut board = Self::new();
        for record in records {
            board.record(record);
        }
        board
    }

    /// Fold one finished game into the aggregates. Slot A is always human;
    /// slot B counts only when it is not scripted.
    pub fn record(&mut self, record: &GameRecord) {
        let winner = record.winner_slot();
        let duration = record.duration_seconds;

        self.credit(&record.player1, winner == Some(Mark::A), duration);
        if !record.was_scripted {
            self.credit(&record.player2, winner == Some(Mark::B), duration);
        }

        self.total_games += 1;
        if record.was_scripted {
            self.scripted_games += 1;
        }
        self.total_duration += duration;
    }

    fn credit(&mut self, username: &str, won: bool, duration: f64) {
        self.players
            .entry(username.to_string())
            .or_insert_with(|| PlayerStats::new(username))
            .record(won, duration);

        let streak = self.streaks.entry(username.to_string()).or_insert(0);
        *streak = if won { *streak + 1 } else { 0 };
    }

    /// Consecutive wins for a player, 0 if unknown.
    pub fn streak(&self, username: &str) -> u32 {
        self.streaks.get(username).copied().unwrap_or(0)
    }

    #[cfg(test)]
    fn player(&self, username: &str) -> Option<&PlayerStats> {
        self.players.get(username)
    }

    /// Top `n` players by fastest win. Players without a win sort last.
    pub fn top(&self, n: usize) -> Vec<PlayerStats> {
        let mut entries: Vec<PlayerStats> = self.players.values().cloned().collect();
        entries.sort_by(|a, b| compare_best_time(a.best_time, b.best_time));
        entries.truncate(n);
        entries
    }

    /// Aggregate stats with the caller-supplied active game count.
    pub fn summary(&self, active_games: usize) -> GameStats {
        let avg_duration = if self.total_games == 0 {
            0.0
        } else {
            self.total_duration / self.total_games as f64
        };

        GameStats {
            total_games: self.total_games,
            bot_games: self.scripted_games,
            human_games: self.total_games - self.scripted_games,
            avg_duration,
            active_games,
        }
    }
}

fn compare_best_time(a: f64, b: f64) -> Ordering {
    match (a > 0.0, b > 0.0) {
        (true, true) => a.total_cmp(&b),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => Ordering::Equal,
    }
}
