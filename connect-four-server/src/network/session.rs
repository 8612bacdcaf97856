//! Game Session Management
//!
//! The registry of live games and the single-slot matchmaking queue.
//! Every mutation runs under one write lock; collaborators (event stream,
//! store, hub notices) are called only after that lock is released.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::core::rng::DeterministicRng;
use crate::game::bot::{difficulty_for_streak, select_move};
use crate::game::events::GameEvent;
use crate::game::leaderboard::{GameRecord, GameStats, Leaderboard, PlayerStats};
use crate::game::state::{Game, GameId, GameStatus, Mark, Move, MoveError, Player};
use crate::persistence::{EventSink, GameStore};

/// Registry timing and limits.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Wait before a lone player is paired with the scripted opponent.
    pub pairing_timeout: Duration,
    /// Pause before the scripted opponent replies.
    pub scripted_move_delay: Duration,
    /// Interval between stale-game sweeps.
    pub sweep_interval: Duration,
    /// Finished games are evicted this long after their last move.
    pub finished_retention: Duration,
    /// Waiting games are evicted this long after creation.
    pub waiting_retention: Duration,
    /// Display names are truncated to this many characters.
    pub max_name_len: usize,
    /// Leaderboard entries returned by [`SessionManager::leaderboard`].
    pub leaderboard_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pairing_timeout: Duration::from_secs(10),
            scripted_move_delay: Duration::from_millis(500),
            sweep_interval: Duration::from_secs(5 * 60),
            finished_retention: Duration::from_secs(30 * 60),
            waiting_retention: Duration::from_secs(15 * 60),
            max_name_len: 20,
            leaderboard_size: 10,
        }
    }
}

/// Session errors. The display text is sent to clients verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Display name empty after trimming.
    #[error("Valid username is required")]
    InvalidName,

    /// No game with that id.
    #[error("game not found")]
    GameNotFound,

    /// Name matches neither slot.
    #[error("player not found")]
    PlayerNotFound,

    /// Game already left `waiting`.
    #[error("game is not active")]
    NotWaiting,

    /// Slot B already taken.
    #[error("game is full")]
    GameFull,

    /// Reconnect with a name not in the game.
    #[error("Not authorized for this game")]
    Unauthorized,

    /// Move rejected by the game.
    #[error(transparent)]
    Move(#[from] MoveError),
}

/// Registry-driven changes the hub must hear about.
#[derive(Debug, Clone)]
pub enum GameNotice {
    /// The pairing timeout filled slot B with the scripted opponent.
    ScriptedOpponentJoined(Game),
    /// The sweep evicted a game.
    Evicted(GameId),
}

/// Result of a join request.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    /// Game snapshot after the join.
    pub game: Game,
    /// The joining player.
    pub player: Player,
    /// The game is still waiting for an opponent.
    pub is_waiting: bool,
}

/// State guarded by the registry lock.
struct RegistryState {
    games: BTreeMap<GameId, Game>,
    waiting: Option<Player>,
    leaderboard: Leaderboard,
    rng: DeterministicRng,
}

impl RegistryState {
    fn waiting_game_of(&self, username: &str) -> Option<GameId> {
        self.games
            .values()
            .find(|g| g.status == GameStatus::Waiting && g.player1.username == username)
            .map(|g| g.id.clone())
    }

    fn clear_queue_for(&mut self, username: &str) {
        if self.waiting.as_ref().is_some_and(|p| p.username == username) {
            self.waiting = None;
        }
    }

    /// Fold a finished game into the leaderboard. Returns the record to
    /// persist, if the game just finished.
    fn settle(&mut self, game: &Game, now: DateTime<Utc>) -> Option<GameRecord> {
        let record = GameRecord::from_game(game, now)?;
        self.leaderboard.record(&record);
        Some(record)
    }
}

/// Side effects collected under the lock and run after it is released.
#[derive(Default)]
struct Effects {
    events: Vec<GameEvent>,
    record: Option<GameRecord>,
}

// =============================================================================
// SESSION MANAGER
// =============================================================================

/// Owns all games and the matchmaking queue.
pub struct SessionManager {
    config: SessionConfig,
    state: RwLock<RegistryState>,
    store: Option<Arc<dyn GameStore>>,
    events: Option<Arc<dyn EventSink>>,
    notices: Option<mpsc::UnboundedSender<GameNotice>>,
}

impl SessionManager {
    /// Create an empty registry with no collaborators.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: RwLock::new(RegistryState {
                games: BTreeMap::new(),
                waiting: None,
                leaderboard: Leaderboard::new(),
                rng: DeterministicRng::from_clock(),
            }),
            store: None,
            events: None,
            notices: None,
        }
    }

    /// Persist finished games to `store`.
    pub fn with_store(mut self, store: Arc<dyn GameStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Publish lifecycle events to `sink`.
    pub fn with_events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Send registry-driven changes to `tx`.
    pub fn with_notices(mut self, tx: mpsc::UnboundedSender<GameNotice>) -> Self {
        self.notices = Some(tx);
        self
    }

    /// Seed the scripted opponent's random source.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.state.get_mut().rng = DeterministicRng::new(seed);
        self
    }

    /// Start from a rebuilt leaderboard.
    pub fn with_leaderboard(mut self, leaderboard: Leaderboard) -> Self {
        self.state.get_mut().leaderboard = leaderboard;
        self
    }

    /// Registry configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn normalize_name(&self, username: &str) -> Result<String, SessionError> {
        let trimmed = username.trim();
        if trimmed.is_empty() {
            return Err(SessionError::InvalidName);
        }
        Ok(trimmed.chars().take(self.config.max_name_len).collect())
    }

    /// Pair with the queued player, rejoin an existing wait, or open a new
    /// waiting game and schedule the pairing timeout.
    pub async fn find_or_create(self: &Arc<Self>, username: &str) -> Result<JoinOutcome, SessionError> {
        let username = self.normalize_name(username)?;
        let player = Player::human(username.clone());

        let mut guard = self.state.write().await;
        let state = &mut *guard;

        if let Some(queued) = state.waiting.clone() {
            if queued.username != username {
                if let Some(game) = state
                    .waiting_game_of(&queued.username)
                    .and_then(|id| state.games.get_mut(&id))
                {
                    game.add_player2(player.clone());
                    let snapshot = game.clone();
                    state.waiting = None;
                    drop(guard);

                    info!(game_id = %snapshot.id, player1 = %queued.username, player2 = %username, "players paired");
                    self.run_effects(Effects {
                        events: vec![GameEvent::started(&snapshot)],
                        record: None,
                    });
                    return Ok(JoinOutcome {
                        game: snapshot,
                        player,
                        is_waiting: false,
                    });
                }
            } else {
                if let Some(game) = state
                    .waiting_game_of(&username)
                    .and_then(|id| state.games.get(&id))
                {
                    debug!(game_id = %game.id, player = %username, "rejoined waiting game");
                    return Ok(JoinOutcome {
                        game: game.clone(),
                        player,
                        is_waiting: true,
                    });
                }
                state.waiting = None;
            }
        }

        let game = Game::new(player.clone());
        let game_id = game.id.clone();
        state.games.insert(game_id.clone(), game.clone());
        state.waiting = Some(player.clone());
        drop(guard);

        info!(game_id = %game_id, player = %username, "created waiting game");
        self.schedule_pairing_timeout(game_id);

        Ok(JoinOutcome {
            game,
            player,
            is_waiting: true,
        })
    }

    /// Join a specific waiting game by id.
    pub async fn join_specific(&self, username: &str, game_id: &str) -> Result<JoinOutcome, SessionError> {
        let username = self.normalize_name(username)?;
        let player = Player::human(username.clone());

        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let game = state.games.get_mut(game_id).ok_or(SessionError::GameNotFound)?;

        if game.player1.username == username {
            return Ok(JoinOutcome {
                is_waiting: game.status == GameStatus::Waiting,
                game: game.clone(),
                player,
            });
        }
        if game.status != GameStatus::Waiting {
            return Err(SessionError::NotWaiting);
        }
        if game.player2.is_some() {
            return Err(SessionError::GameFull);
        }

        game.add_player2(player.clone());
        let snapshot = game.clone();
        state.clear_queue_for(&snapshot.player1.username);
        drop(guard);

        info!(game_id = %snapshot.id, player1 = %snapshot.player1.username, player2 = %username, "joined specific game");
        self.run_effects(Effects {
            events: vec![GameEvent::started(&snapshot)],
            record: None,
        });

        Ok(JoinOutcome {
            game: snapshot,
            player,
            is_waiting: false,
        })
    }

    /// Apply a human move. Finishing moves update the leaderboard and are
    /// persisted.
    pub async fn apply_player_move(
        &self,
        game_id: &str,
        column: usize,
        username: &str,
    ) -> Result<(Move, Game), SessionError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let game = state.games.get_mut(game_id).ok_or(SessionError::GameNotFound)?;
        let mark = game.human_slot(username).ok_or(SessionError::PlayerNotFound)?;
        let mv = game.make_move(column, mark)?;
        let snapshot = game.clone();
        let effects = Self::after_move(state, &snapshot, &mv);
        drop(guard);

        self.run_effects(effects);
        Ok((mv, snapshot))
    }

    /// Let the scripted opponent move if it holds the turn. `Ok(None)` when
    /// there is nothing to do.
    pub async fn apply_scripted_move(&self, game_id: &str) -> Result<Option<(Move, Game)>, SessionError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let game = state.games.get_mut(game_id).ok_or(SessionError::GameNotFound)?;
        if !game.is_scripted_turn() {
            return Ok(None);
        }

        let difficulty = difficulty_for_streak(state.leaderboard.streak(&game.player1.username));
        let Some(column) = select_move(&game.board, Mark::B, difficulty, &mut state.rng) else {
            return Ok(None);
        };

        let mv = game.make_move(column, Mark::B)?;
        let snapshot = game.clone();
        let effects = Self::after_move(state, &snapshot, &mv);
        drop(guard);

        debug!(game_id = %snapshot.id, column, difficulty, "scripted move");
        self.run_effects(effects);
        Ok(Some((mv, snapshot)))
    }

    fn after_move(state: &mut RegistryState, game: &Game, mv: &Move) -> Effects {
        let mut effects = Effects {
            events: vec![GameEvent::move_made(game, mv)],
            record: None,
        };

        if game.status == GameStatus::Finished {
            let now = Utc::now();
            effects.record = state.settle(game, now);
            effects.events.extend(GameEvent::finished(game, now));
            info!(game_id = %game.id, winner = ?game.winner, "game finished");
        }

        effects
    }

    /// Fill slot B with the scripted opponent if the game is still waiting.
    pub async fn inject_scripted_opponent(&self, game_id: &str) -> Option<Game> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let game = state.games.get_mut(game_id)?;
        if game.status != GameStatus::Waiting {
            return None;
        }

        game.add_player2(Player::scripted());
        let snapshot = game.clone();
        state.clear_queue_for(&snapshot.player1.username);
        drop(guard);

        info!(game_id = %snapshot.id, player = %snapshot.player1.username, "scripted opponent joined");
        self.notify(GameNotice::ScriptedOpponentJoined(snapshot.clone()));
        self.run_effects(Effects {
            events: vec![GameEvent::started(&snapshot)],
            record: None,
        });

        Some(snapshot)
    }

    fn schedule_pairing_timeout(self: &Arc<Self>, game_id: GameId) {
        let manager = Arc::clone(self);
        let delay = self.config.pairing_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            manager.inject_scripted_opponent(&game_id).await;
        });
    }

    /// Reconnect check: the game must exist and list `username` in a slot.
    pub async fn reconnect(&self, game_id: &str, username: &str) -> Result<Game, SessionError> {
        let state = self.state.read().await;
        let game = state.games.get(game_id).ok_or(SessionError::GameNotFound)?;
        if !game.has_player(username.trim()) {
            return Err(SessionError::Unauthorized);
        }
        Ok(game.clone())
    }

    /// Snapshot of a game.
    pub async fn get_game(&self, game_id: &str) -> Option<Game> {
        self.state.read().await.games.get(game_id).cloned()
    }

    /// Top players by fastest win.
    pub async fn leaderboard(&self) -> Vec<PlayerStats> {
        self.state.read().await.leaderboard.top(self.config.leaderboard_size)
    }

    /// Aggregate statistics. Active games are those waiting or playing.
    pub async fn stats(&self) -> GameStats {
        let state = self.state.read().await;
        let active = state
            .games
            .values()
            .filter(|g| g.status != GameStatus::Finished)
            .count();
        state.leaderboard.summary(active)
    }

    /// Current consecutive-win streak for a player.
    pub async fn streak(&self, username: &str) -> u32 {
        self.state.read().await.leaderboard.streak(username)
    }

    /// Display name of the queued player, if any.
    pub async fn queued_player(&self) -> Option<String> {
        self.state.read().await.waiting.as_ref().map(|p| p.username.clone())
    }

    /// Number of games held.
    pub async fn game_count(&self) -> usize {
        self.state.read().await.games.len()
    }

    /// Evict stale games as of `now`. Returns the evicted ids.
    pub async fn sweep_stale(&self, now: DateTime<Utc>) -> Vec<GameId> {
        let finished_retention = self.config.finished_retention;
        let waiting_retention = self.config.waiting_retention;
        let age = |since: DateTime<Utc>| (now - since).to_std().unwrap_or_default();

        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let stale: Vec<(GameId, GameStatus, String)> = state
            .games
            .values()
            .filter(|g| match g.status {
                GameStatus::Finished => age(g.last_move) > finished_retention,
                GameStatus::Waiting => age(g.created_at) > waiting_retention,
                GameStatus::Playing => false,
            })
            .map(|g| (g.id.clone(), g.status, g.player1.username.clone()))
            .collect();

        for (id, status, player1) in &stale {
            state.games.remove(id);
            if *status == GameStatus::Waiting {
                state.clear_queue_for(player1);
            }
        }
        drop(guard);

        let mut evicted = Vec::with_capacity(stale.len());
        for (id, status, _) in stale {
            info!(game_id = %id, status = ?status, "evicted stale game");
            self.notify(GameNotice::Evicted(id.clone()));
            evicted.push(id);
        }
        evicted
    }

    /// Run the periodic sweep until shutdown.
    pub async fn run_sweep_loop(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(self.config.sweep_interval);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.sweep_stale(Utc::now()).await;
                    if !evicted.is_empty() {
                        debug!(count = evicted.len(), "sweep complete");
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
    }

    fn notify(&self, notice: GameNotice) {
        if let Some(tx) = &self.notices {
            if tx.send(notice).is_err() {
                debug!("notice receiver dropped");
            }
        }
    }

    fn run_effects(&self, effects: Effects) {
        if let Some(sink) = &self.events {
            for event in &effects.events {
                sink.publish(event.event_type(), event.payload());
            }
        }

        if let (Some(store), Some(record)) = (&self.store, effects.record) {
            let store = Arc::clone(store);
            tokio::task::spawn_blocking(move || {
                if let Err(e) = store.record_finished_game(&record) {
                    warn!(game_id = %record.id, error = %e, "failed to persist game result");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{Winner, SCRIPTED_NAME};
    use crate::persistence::{BroadcastEventSink, MemoryGameStore};

    fn manager() -> Arc<SessionManager> {
        Arc::new(SessionManager::new(SessionConfig::default()).with_rng_seed(7))
    }

    #[tokio::test]
    async fn test_alice_and_bob_play_to_a_win() {
        let sessions = manager();

        let alice = sessions.find_or_create("Alice").await.unwrap();
        assert!(alice.is_waiting);
        assert_eq!(alice.game.status, GameStatus::Waiting);
        assert_eq!(sessions.queued_player().await.as_deref(), Some("Alice"));

        let bob = sessions.find_or_create("Bob").await.unwrap();
        assert!(!bob.is_waiting);
        assert_eq!(bob.game.id, alice.game.id);
        assert_eq!(bob.game.status, GameStatus::Playing);
        assert_eq!(bob.game.player1.username, "Alice");
        assert_eq!(bob.game.player2.as_ref().unwrap().username, "Bob");
        assert_eq!(bob.game.current_turn, Mark::A);
        assert!(sessions.queued_player().await.is_none());

        let id = alice.game.id.clone();
        let (mv, game) = sessions.apply_player_move(&id, 3, "Alice").await.unwrap();
        assert_eq!(mv.row, 5);
        assert_eq!(game.current_turn, Mark::B);

        // Bob stacks next door, Alice completes the column
        for _ in 0..3 {
            sessions.apply_player_move(&id, 4, "Bob").await.unwrap();
            let (_, game) = sessions.apply_player_move(&id, 3, "Alice").await.unwrap();
            if game.status == GameStatus::Finished {
                assert_eq!(game.winner, Winner::Player1);
            }
        }

        let game = sessions.get_game(&id).await.unwrap();
        assert_eq!(game.status, GameStatus::Finished);
        assert_eq!(game.winner, Winner::Player1);
        assert_eq!(sessions.streak("Alice").await, 1);
        assert_eq!(sessions.stats().await.human_games, 1);

        let board = sessions.leaderboard().await;
        assert_eq!(board[0].username, "Alice");
        assert_eq!(board[1].best_time, 0.0);
    }

    #[tokio::test]
    async fn test_same_name_rejoins_waiting_game() {
        let sessions = manager();

        let first = sessions.find_or_create("  carol  ").await.unwrap();
        let second = sessions.find_or_create("carol").await.unwrap();

        assert_eq!(first.game.id, second.game.id);
        assert!(second.is_waiting);
        assert_eq!(first.player.username, "carol");
        assert_eq!(sessions.game_count().await, 1);
    }

    #[tokio::test]
    async fn test_name_validation() {
        let sessions = manager();
        assert_eq!(sessions.find_or_create("   ").await.unwrap_err(), SessionError::InvalidName);

        let long = sessions.find_or_create(&"x".repeat(30)).await.unwrap();
        assert_eq!(long.player.username.len(), 20);
    }

    #[tokio::test]
    async fn test_join_specific_rules() {
        let sessions = manager();
        assert_eq!(
            sessions.join_specific("dave", "missing").await.unwrap_err(),
            SessionError::GameNotFound
        );

        let created = sessions.find_or_create("erin").await.unwrap();
        let id = created.game.id.clone();

        let again = sessions.join_specific("erin", &id).await.unwrap();
        assert!(again.is_waiting);

        let joined = sessions.join_specific("frank", &id).await.unwrap();
        assert!(!joined.is_waiting);
        assert_eq!(joined.game.status, GameStatus::Playing);
        assert!(sessions.queued_player().await.is_none());

        assert_eq!(
            sessions.join_specific("gina", &id).await.unwrap_err(),
            SessionError::NotWaiting
        );
        assert_eq!(SessionError::NotWaiting.to_string(), "game is not active");
        // Slot A can still fetch the game idempotently
        assert!(sessions.join_specific("erin", &id).await.is_ok());
    }

    #[tokio::test]
    async fn test_move_errors_are_typed() {
        let sessions = manager();
        let id = sessions.find_or_create("hal").await.unwrap().game.id;

        assert_eq!(
            sessions.apply_player_move(&id, 0, "hal").await.unwrap_err(),
            SessionError::Move(MoveError::NotActive)
        );

        sessions.find_or_create("ivy").await.unwrap();
        assert_eq!(
            sessions.apply_player_move(&id, 0, "ivy").await.unwrap_err(),
            SessionError::Move(MoveError::NotYourTurn)
        );
        assert_eq!(
            sessions.apply_player_move(&id, 0, "zoe").await.unwrap_err(),
            SessionError::PlayerNotFound
        );
        assert_eq!(
            sessions.apply_player_move("nope", 0, "hal").await.unwrap_err(),
            SessionError::GameNotFound
        );
        assert_eq!(
            SessionError::Move(MoveError::ColumnFull).to_string(),
            "column is full"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pairing_timeout_injects_scripted_opponent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sessions = Arc::new(
            SessionManager::new(SessionConfig::default())
                .with_rng_seed(1)
                .with_notices(tx),
        );

        let id = sessions.find_or_create("jack").await.unwrap().game.id;
        tokio::time::sleep(Duration::from_secs(11)).await;

        let game = sessions.get_game(&id).await.unwrap();
        assert_eq!(game.status, GameStatus::Playing);
        assert!(game.is_bot);
        assert_eq!(game.player2.as_ref().unwrap().username, SCRIPTED_NAME);
        assert!(sessions.queued_player().await.is_none());

        match rx.recv().await {
            Some(GameNotice::ScriptedOpponentJoined(g)) => assert_eq!(g.id, id),
            other => panic!("unexpected notice: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pairing_timeout_is_noop_after_human_pairs() {
        let sessions = manager();
        let id = sessions.find_or_create("kim").await.unwrap().game.id;
        sessions.find_or_create("lee").await.unwrap();

        tokio::time::sleep(Duration::from_secs(11)).await;

        let game = sessions.get_game(&id).await.unwrap();
        assert!(!game.is_bot);
        assert_eq!(game.player2.unwrap().username, "lee");
    }

    #[tokio::test]
    async fn test_scripted_move_only_on_its_turn() {
        let sessions = manager();
        let id = sessions.find_or_create("mia").await.unwrap().game.id;
        sessions.inject_scripted_opponent(&id).await.unwrap();
        assert!(sessions.inject_scripted_opponent(&id).await.is_none());

        assert!(sessions.apply_scripted_move(&id).await.unwrap().is_none());

        // A human sharing the scripted name cannot act for it
        assert_eq!(
            sessions.apply_player_move(&id, 0, SCRIPTED_NAME).await.unwrap_err(),
            SessionError::PlayerNotFound
        );

        sessions.apply_player_move(&id, 3, "mia").await.unwrap();
        let (mv, game) = sessions.apply_scripted_move(&id).await.unwrap().unwrap();
        assert_eq!(mv.player, Mark::B);
        assert_eq!(game.current_turn, Mark::A);
        assert!(sessions.apply_scripted_move(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_finished_game_is_persisted_and_published() {
        let store = Arc::new(MemoryGameStore::new());
        let sink = Arc::new(BroadcastEventSink::new(64));
        let mut events = sink.subscribe();
        let sessions = Arc::new(
            SessionManager::new(SessionConfig::default())
                .with_store(store.clone())
                .with_events(sink.clone()),
        );

        let id = sessions.find_or_create("ned").await.unwrap().game.id;
        sessions.find_or_create("ola").await.unwrap();
        for _ in 0..3 {
            sessions.apply_player_move(&id, 0, "ned").await.unwrap();
            sessions.apply_player_move(&id, 1, "ola").await.unwrap();
        }
        sessions.apply_player_move(&id, 0, "ned").await.unwrap();

        for _ in 0..100 {
            if !store.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let history = store.load_history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].winner, "ned");
        assert!(!history[0].was_scripted);

        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            kinds.push(event.event_type);
        }
        assert_eq!(kinds.first().map(String::as_str), Some("game_started"));
        assert_eq!(kinds.last().map(String::as_str), Some("game_finished"));
        assert_eq!(kinds.iter().filter(|k| *k == "move_made").count(), 7);
    }

    #[tokio::test]
    async fn test_sweep_evicts_stale_games() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sessions = Arc::new(SessionManager::new(SessionConfig::default()).with_notices(tx));

        let waiting = sessions.find_or_create("pat").await.unwrap().game.id;
        assert!(sessions.sweep_stale(Utc::now()).await.is_empty());

        let later = Utc::now() + chrono::Duration::minutes(16);
        let evicted = sessions.sweep_stale(later).await;
        assert_eq!(evicted, vec![waiting.clone()]);
        assert!(sessions.get_game(&waiting).await.is_none());
        assert!(sessions.queued_player().await.is_none());
        assert!(matches!(rx.recv().await, Some(GameNotice::Evicted(id)) if id == waiting));

        let id = sessions.find_or_create("quin").await.unwrap().game.id;
        sessions.find_or_create("rae").await.unwrap();
        // Playing games are never swept
        let much_later = Utc::now() + chrono::Duration::hours(2);
        assert!(sessions.sweep_stale(much_later).await.is_empty());
        assert_eq!(sessions.stats().await.active_games, 1);
        assert!(sessions.get_game(&id).await.is_some());
    }

    #[tokio::test]
    async fn test_sweep_keeps_finished_games_for_retention_window() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sessions = Arc::new(SessionManager::new(SessionConfig::default()).with_notices(tx));

        let id = sessions.find_or_create("uma").await.unwrap().game.id;
        sessions.find_or_create("vic").await.unwrap();
        for _ in 0..3 {
            sessions.apply_player_move(&id, 0, "uma").await.unwrap();
            sessions.apply_player_move(&id, 1, "vic").await.unwrap();
        }
        let (_, game) = sessions.apply_player_move(&id, 0, "uma").await.unwrap();
        assert_eq!(game.status, GameStatus::Finished);

        let kept = game.last_move + chrono::Duration::minutes(29);
        assert!(sessions.sweep_stale(kept).await.is_empty());
        assert!(sessions.get_game(&id).await.is_some());

        let expired = game.last_move + chrono::Duration::minutes(31);
        assert_eq!(sessions.sweep_stale(expired).await, vec![id.clone()]);
        assert!(sessions.get_game(&id).await.is_none());
        assert!(matches!(rx.recv().await, Some(GameNotice::Evicted(evicted)) if evicted == id));
    }

    #[tokio::test]
    async fn test_reconnect_requires_membership() {
        let sessions = manager();
        let id = sessions.find_or_create("sam").await.unwrap().game.id;

        assert!(sessions.reconnect(&id, "sam").await.is_ok());
        assert_eq!(sessions.reconnect(&id, "tess").await.unwrap_err(), SessionError::Unauthorized);
        assert_eq!(sessions.reconnect("gone", "sam").await.unwrap_err(), SessionError::GameNotFound);
    }
}
