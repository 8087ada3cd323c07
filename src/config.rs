//! Runtime configuration loaded from environment variables

use chrono::TimeDelta;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Timing and scoring constants of the round engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Initial time budget of a new session
    pub game_seconds: i64,
    /// Added to the deadline for a correct, in-time answer
    pub correct_bonus_seconds: i64,
    /// Removed from the deadline for an incorrect answer
    pub incorrect_penalty_seconds: i64,
    /// Render buffer before a round's timer starts
    pub round_delay_seconds: i64,
    /// Cap on the streak-indexed score of a single answer
    pub max_streak_bonus: u32,
    /// Default leaderboard page size
    pub page_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            game_seconds: 30,
            correct_bonus_seconds: 5,
            incorrect_penalty_seconds: 5,
            round_delay_seconds: 1,
            max_streak_bonus: 10,
            page_size: 30,
        }
    }
}

/// Largest page a leaderboard query may ask for
pub const MAX_PAGE_SIZE: usize = 100;

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
}

impl EngineConfig {
    /// Load config from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            game_seconds: env_parse("GAME_SECONDS").unwrap_or(defaults.game_seconds),
            correct_bonus_seconds: env_parse("CORRECT_BONUS_SECONDS")
                .unwrap_or(defaults.correct_bonus_seconds),
            incorrect_penalty_seconds: env_parse::<i64>("INCORRECT_PENALTY_SECONDS")
                .map(i64::abs)
                .unwrap_or(defaults.incorrect_penalty_seconds),
            round_delay_seconds: env_parse("ROUND_DELAY_SECONDS")
                .unwrap_or(defaults.round_delay_seconds),
            max_streak_bonus: env_parse("MAX_STREAK_BONUS").unwrap_or(defaults.max_streak_bonus),
            page_size: env_parse::<usize>("LEADERBOARD_PAGE_SIZE")
                .map(|n| n.clamp(1, MAX_PAGE_SIZE))
                .unwrap_or(defaults.page_size),
        };

        tracing::info!(
            game_seconds = config.game_seconds,
            correct_bonus_seconds = config.correct_bonus_seconds,
            incorrect_penalty_seconds = config.incorrect_penalty_seconds,
            round_delay_seconds = config.round_delay_seconds,
            max_streak_bonus = config.max_streak_bonus,
            "Engine config loaded"
        );

        config
    }

    pub fn game_length(&self) -> TimeDelta {
        TimeDelta::seconds(self.game_seconds)
    }

    pub fn round_delay(&self) -> TimeDelta {
        TimeDelta::seconds(self.round_delay_seconds)
    }
}

/// Process-level settings of the HTTP server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub catalog_path: PathBuf,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let port: u16 = env_parse("PORT").unwrap_or(4270);
        let addr = std::env::var("BIND_ADDR")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], port)));

        let catalog_path = std::env::var("CATALOG_PATH")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data/resources.json"));

        Self { addr, catalog_path }
    }
}
