//! Tournament settings.
//!
//! A configuration is created programmatically with [`Configuration::new()`] and the `with_*`
//! setters, from environment variables with [`Configuration::from_env()`], or from a
//! configuration file with [`Configuration::with_conf_file()`]. It is consumed once when the
//! tournament starts and never changes afterwards.
//!
//! # Environment Variables
//!
//! All values are optional. Flags are enabled by the (case-insensitive) value `"true"`.
//!
//! - `TOURNAMENT_PLAYERS`: number of players (default: `8`)
//! - `TOURNAMENT_ROWS`, `TOURNAMENT_COLS`: court grid (default: `1` x `2`)
//! - `TOURNAMENT_MATCHES`: matches each player plays before leaving (default: `3`)
//! - `TOURNAMENT_JOIN_ATTEMPTS`: join attempts before a stuck lobby is flushed (default: `8`)
//! - `TOURNAMENT_MAX_KICKS`: rejections after which a player gives up (default: `16`)
//! - `TOURNAMENT_SET_MIN_MS`, `TOURNAMENT_SET_MAX_MS`: set duration window (default: `1000`-`4000`)
//! - `TOURNAMENT_SCORE_TICK_MS`: player scoring tick (default: `50`)
//! - `TOURNAMENT_SEED`: seed for every random draw (default: none, entropy)
//! - `TOURNAMENT_VERBOSE`: print finished matches (default: `true`)
//! - `TOURNAMENT_LOG`: log to a file (default: `false`)
//! - `TOURNAMENT_DEBUG`: log everything down to `TRACE` (default: `false`)
//!
//! # Configuration File
//!
//! One `KEY : value` pair per line:
//!
//! ```text
//! F : 2
//! C : 3
//! K : 4
//! ```
//!
//! `F` (rows), `C` (columns) and `K` (matches per player) are required. `N` (players),
//! `J` (join attempts), `X` (max kicks) and `D` (debug, `0` or `1`) are optional.

use std::{env, path::Path, time::Duration};

use anyhow::{bail, Context};
use tracing::warn;

use crate::tide::TideSchedule;

/// Settings for one tournament run.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub(crate) players: usize,
    pub(crate) rows: usize,
    pub(crate) cols: usize,
    pub(crate) matches_per_player: usize,
    pub(crate) join_attempts_max: usize,
    pub(crate) max_kicks: usize,
    pub(crate) set_duration_min: Duration,
    pub(crate) set_duration_max: Duration,
    pub(crate) score_tick: Duration,
    pub(crate) seed: Option<u64>,
    pub(crate) verbose: bool,
    pub(crate) log: bool,
    pub(crate) debug: bool,
    pub(crate) tide: TideSchedule,
}

impl Configuration {
    /// Create a configuration with default parameters.
    ///
    /// By default:
    /// - 8 players on a 1 x 2 court grid, 3 matches each.
    /// - A lobby is flushed after 8 join attempts; a player gives up after 16 rejections.
    /// - Sets last between 1 and 4 seconds, players score every 50 ms.
    /// - Finished matches are printed, nothing is logged to file.
    pub fn new() -> Self {
        Self {
            players: 8,
            rows: 1,
            cols: 2,
            matches_per_player: 3,
            join_attempts_max: 8,
            max_kicks: 16,
            set_duration_min: Duration::from_secs(1),
            set_duration_max: Duration::from_secs(4),
            score_tick: Duration::from_millis(50),
            seed: None,
            verbose: true,
            log: false,
            debug: false,
            tide: TideSchedule::default(),
        }
    }

    /// Create a configuration from environment variables, see the module documentation.
    ///
    /// Unset or unparsable variables keep their default value.
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        fn get_env_usize(var: &str, default: usize) -> usize {
            env::var(var)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        fn get_env_millis(var: &str, default: Duration) -> Duration {
            env::var(var)
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        }

        let default = Self::new();
        Self {
            players: get_env_usize("TOURNAMENT_PLAYERS", default.players),
            rows: get_env_usize("TOURNAMENT_ROWS", default.rows),
            cols: get_env_usize("TOURNAMENT_COLS", default.cols),
            matches_per_player: get_env_usize("TOURNAMENT_MATCHES", default.matches_per_player),
            join_attempts_max: get_env_usize("TOURNAMENT_JOIN_ATTEMPTS", default.join_attempts_max),
            max_kicks: get_env_usize("TOURNAMENT_MAX_KICKS", default.max_kicks),
            set_duration_min: get_env_millis("TOURNAMENT_SET_MIN_MS", default.set_duration_min),
            set_duration_max: get_env_millis("TOURNAMENT_SET_MAX_MS", default.set_duration_max),
            score_tick: get_env_millis("TOURNAMENT_SCORE_TICK_MS", default.score_tick),
            seed: env::var("TOURNAMENT_SEED").ok().and_then(|v| v.parse().ok()),
            verbose: get_env_flag("TOURNAMENT_VERBOSE", default.verbose),
            log: get_env_flag("TOURNAMENT_LOG", default.log),
            debug: get_env_flag("TOURNAMENT_DEBUG", default.debug),
            tide: default.tide,
        }
    }

    /// Override fields with the content of a configuration file.
    ///
    /// # Errors
    /// The file cannot be read, a line is malformed, or a required key is missing.
    pub fn with_conf_file(self, path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("could not read configuration file '{}'", path.display()))?;
        self.with_conf_str(&text)
            .with_context(|| format!("invalid configuration file '{}'", path.display()))
    }

    /// Same as [`with_conf_file`](Self::with_conf_file), from the file content.
    pub fn with_conf_str(mut self, text: &str) -> anyhow::Result<Self> {
        let (mut rows, mut cols, mut matches) = (false, false, false);
        for (key, value) in parse_key_values(text)? {
            let value = value as usize;
            match key.as_str() {
                "F" => {
                    self.rows = value;
                    rows = true;
                }
                "C" => {
                    self.cols = value;
                    cols = true;
                }
                "K" => {
                    self.matches_per_player = value;
                    matches = true;
                }
                "N" => self.players = value,
                "J" => self.join_attempts_max = value,
                "X" => self.max_kicks = value,
                "D" => self.debug = value != 0,
                other => warn!("unknown configuration key '{other}' ignored"),
            }
        }
        if !(rows && cols && matches) {
            bail!("missing parameters: F, C and K are all required");
        }
        Ok(self)
    }

    /// Set the number of players.
    pub fn with_players(mut self, value: usize) -> Self {
        self.players = value;
        self
    }

    /// Set the court grid. The tournament has `rows * cols` courts.
    pub fn with_grid(mut self, rows: usize, cols: usize) -> Self {
        self.rows = rows;
        self.cols = cols;
        self
    }

    /// Set how many matches a player plays before leaving.
    pub fn with_matches_per_player(mut self, value: usize) -> Self {
        self.matches_per_player = value;
        self
    }

    /// Set how many join attempts a non-empty lobby tolerates before being flushed.
    pub fn with_join_attempts_max(mut self, value: usize) -> Self {
        self.join_attempts_max = value;
        self
    }

    /// Set after how many rejections a player leaves the tournament.
    pub fn with_max_kicks(mut self, value: usize) -> Self {
        self.max_kicks = value;
        self
    }

    /// Set the window a set duration is drawn from.
    pub fn with_set_duration(mut self, min: Duration, max: Duration) -> Self {
        self.set_duration_min = min;
        self.set_duration_max = max;
        self
    }

    /// Set how often a player scores during a set.
    pub fn with_score_tick(mut self, value: Duration) -> Self {
        self.score_tick = value;
        self
    }

    /// Make every random draw reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Enable or disable printing finished matches.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Enable or disable `TRACE` level logs.
    pub fn with_debug(mut self, value: bool) -> Self {
        self.debug = value;
        self
    }

    /// Set the court closing schedule.
    pub fn with_tide(mut self, tide: TideSchedule) -> Self {
        self.tide = tide;
        self
    }

    /// Number of courts.
    pub fn courts(&self) -> usize {
        self.rows * self.cols
    }

    /// Number of players.
    pub fn players(&self) -> usize {
        self.players
    }

    /// Check the configuration can run a tournament.
    ///
    /// # Errors
    /// Empty court grid, zero quotas or an inverted set duration window.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.courts() == 0 {
            bail!("the court grid is empty ({} x {})", self.rows, self.cols);
        }
        if self.matches_per_player == 0 {
            bail!("players must play at least one match");
        }
        if self.join_attempts_max == 0 {
            bail!("a lobby must tolerate at least one join attempt");
        }
        if self.max_kicks == 0 {
            bail!("players must tolerate at least one rejection");
        }
        if self.set_duration_min > self.set_duration_max {
            bail!(
                "minimum set duration ({:?}) is greater than maximum set duration ({:?})",
                self.set_duration_min,
                self.set_duration_max
            );
        }
        if self.score_tick.is_zero() {
            bail!("score tick must not be zero");
        }
        Ok(())
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses `KEY : value` lines. Blank lines are skipped.
pub(crate) fn parse_key_values(text: &str) -> anyhow::Result<Vec<(String, u64)>> {
    let mut pairs = vec![];
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            bail!("line {}: expected 'KEY : value', got '{line}'", number + 1);
        };
        let value = value
            .trim()
            .parse::<u64>()
            .with_context(|| format!("line {}: could not parse '{}'", number + 1, value.trim()))?;
        pairs.push((key.trim().to_string(), value));
    }
    Ok(pairs)
}
