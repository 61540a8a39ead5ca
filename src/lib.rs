//! # Doubles Tournament
//!
//! A multi-court doubles tournament simulator. Players form teams of two, teams face each other
//! on courts in best-of-five matches, and nobody is ever paired twice with the same partner.
//!
//! It provides:
//! - Partner-exclusion team assembly (`Lobby`), one lobby per court
//! - A court actor running the lobby, set and match loop (`Court`)
//! - A player actor with pluggable scoring (`Player`, `SetScorer`)
//! - A shared registry doing admission control and score keeping (`TournamentRegistry`)
//! - A launcher that runs everything on threads and reports the standings (`Tournament`)
//!
//! Every court and every player runs on its own thread. They talk through in-memory channels
//! addressed by id (see [`protocol`]) and share nothing but the [`registry`].
//!
//! # Documentation Overview
//!
//! - For the matchmaking rules, see the [`lobby`] module.
//! - For the court state machine and the set loop, see the [`court`] module.
//! - For admission control and wind-down, see the [`registry`] and [`tournament`] modules.
//! - For settings, see [`Configuration`](crate::configuration::Configuration).
//!
//! # Usage Example
//!
//! ```no_run
//! use std::time::Duration;
//! use doubles_tournament::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Configuration::new()
//!         .with_players(12)
//!         .with_grid(1, 3)
//!         .with_matches_per_player(2)
//!         .with_set_duration(Duration::from_millis(100), Duration::from_millis(400));
//!
//!     let report = Tournament::new(config)?.run()?;
//!     for (player, points) in report.standings {
//!         println!("{player:03}: {points}");
//!     }
//!     Ok(())
//! }
//! ```

pub use anyhow;
pub mod configuration;
pub mod court;
pub mod lobby;
mod logger;
pub mod partners_table;
pub mod player;
pub mod protocol;
pub mod registry;
pub mod scores;
pub mod team;
pub mod tide;
pub mod tournament;

/// Commonly used types for quick access.
///
/// ```rust
/// use doubles_tournament::prelude::*;
/// ```
pub mod prelude {
    pub use crate::configuration::Configuration;
    pub use crate::court::MatchReport;
    pub use crate::player::{FixedScore, RandomWalk, SetScorer};
    pub use crate::tide::{TideEvent, TideSchedule};
    pub use crate::tournament::{Tournament, TournamentReport};
}
