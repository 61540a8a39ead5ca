//! Tournament launcher.
//!
//! [`Tournament::run`] spawns one thread per court and per player, plus one for the tide schedule
//! when there is one, then watches the tournament from the calling thread:
//!
//! - finished matches are collected (and printed when `verbose` is set);
//! - once fewer players remain than a match needs, every court is woken so it can notice and shut
//!   down;
//! - when every remaining player sits in a lobby that can no longer fill, every court is woken so
//!   those lobbies get flushed.
//!
//! The run ends when the last court exits. All threads are joined before returning.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context};
use tracing::{error, info, instrument, trace, warn};

use crate::configuration::Configuration;
use crate::court::{Court, MatchReport};
use crate::logger::init_logger;
use crate::partners_table::PartnersTable;
use crate::player::{Player, PlayerSummary};
use crate::protocol::{CourtId, Mailboxes, Message, MessageKind, PlayerId};
use crate::registry::TournamentRegistry;
use crate::team::PLAYERS_PER_MATCH;

/// How long the control loop waits for a match report before re-checking the registry.
const WATCH_INTERVAL: Duration = Duration::from_millis(20);

/// Everything a finished tournament produced.
#[derive(Debug, Clone)]
pub struct TournamentReport {
    /// Finished matches, in the order the launcher received them.
    pub matches: Vec<MatchReport>,
    /// `(player, points)`, best first, ties by id.
    pub standings: Vec<(PlayerId, u32)>,
    /// One summary per player that exited cleanly, by id.
    pub players: Vec<PlayerSummary>,
    pub partners: PartnersTable,
}

impl TournamentReport {
    pub fn total_points(&self) -> u32 {
        self.standings.iter().map(|(_, points)| points).sum()
    }
}

pub struct Tournament {
    config: Configuration,
}

impl Tournament {
    /// Create a [`Tournament`], installing the file logger if `config.log` is set.
    ///
    /// # Errors
    /// Invalid configuration, or the logger could not be installed.
    #[instrument(skip_all)]
    pub fn new(config: Configuration) -> anyhow::Result<Self> {
        config.validate()?;
        if config.log {
            init_logger(config.debug)?;
        }
        trace!(?config);
        Ok(Self { config })
    }

    /// Runs the whole tournament and blocks until it is over.
    ///
    /// # Errors
    /// A thread could not be spawned or panicked.
    #[instrument(skip_all)]
    pub fn run(&self) -> anyhow::Result<TournamentReport> {
        let players = self.config.players;
        let courts = self.config.courts();
        info!(players, courts, "tournament starting");

        let registry = Arc::new(TournamentRegistry::new(players, courts));
        let (mailboxes, inboxes) = Mailboxes::new(players, courts);
        let mailboxes = Arc::new(mailboxes);
        let (tx_report, rx_report) = mpsc::channel();

        let mut court_handles = Vec::with_capacity(courts);
        for (id, inbox) in inboxes.courts.into_iter().enumerate() {
            let court = Court::new(
                id,
                inbox,
                registry.clone(),
                mailboxes.clone(),
                &self.config,
            )
            .with_reports(tx_report.clone());
            court_handles.push(spawn_court(court, registry.clone(), mailboxes.clone())?);
        }
        // the report channel disconnects once every court exited
        drop(tx_report);

        let mut player_handles = Vec::with_capacity(players);
        for (id, inbox) in inboxes.players.into_iter().enumerate() {
            let player = Player::new(
                id as PlayerId,
                inbox,
                registry.clone(),
                mailboxes.clone(),
                &self.config,
            );
            player_handles.push(
                thread::Builder::new()
                    .name(format!("player-{id:03}"))
                    .spawn(move || player.run())
                    .context("could not spawn player thread")?,
            );
        }

        let (tide_cancel, tide_handle) = self.spawn_tide(&registry, &mailboxes)?;

        let matches = self.watch(&registry, &mailboxes, rx_report);

        let mut panicked = 0;
        for (id, handle) in court_handles.into_iter().enumerate() {
            match handle.join() {
                Ok(Ok(played)) => trace!(court = id, played, "court thread joined"),
                Ok(Err(_)) => {} // logged by the court thread
                Err(_) => panicked += 1,
            }
        }
        let mut summaries = Vec::with_capacity(players);
        for (id, handle) in player_handles.into_iter().enumerate() {
            match handle.join() {
                Ok(Ok(summary)) => summaries.push(summary),
                Ok(Err(e)) => error!(critical = true, player = id, "player failed: {e:?}"),
                Err(_) => panicked += 1,
            }
        }
        drop(tide_cancel);
        if let Some(handle) = tide_handle {
            if handle.join().is_err() {
                panicked += 1;
            }
        }
        if panicked > 0 {
            return Err(anyhow!("{panicked} tournament thread(s) panicked"));
        }

        let report = TournamentReport {
            matches,
            standings: registry.standings(),
            players: summaries,
            partners: registry.partners(),
        };
        info!(
            matches = report.matches.len(),
            points = report.total_points(),
            "tournament over"
        );
        Ok(report)
    }

    fn spawn_tide(
        &self,
        registry: &Arc<TournamentRegistry>,
        mailboxes: &Arc<Mailboxes>,
    ) -> anyhow::Result<(Sender<()>, Option<JoinHandle<usize>>)> {
        let (cancel_tx, cancel_rx) = mpsc::channel();
        if self.config.tide.is_empty() {
            return Ok((cancel_tx, None));
        }
        let tide = self.config.tide.clone();
        let rows = self.config.rows;
        let registry = registry.clone();
        let mailboxes = mailboxes.clone();
        let handle = thread::Builder::new()
            .name("tide".to_string())
            .spawn(move || tide.run(&registry, &mailboxes, rows, &cancel_rx))
            .context("could not spawn tide thread")?;
        Ok((cancel_tx, Some(handle)))
    }

    /// Control loop. Returns once every court exited.
    fn watch(
        &self,
        registry: &TournamentRegistry,
        mailboxes: &Mailboxes,
        rx_report: Receiver<MatchReport>,
    ) -> Vec<MatchReport> {
        let mut matches = vec![];
        let mut winding_down = false;
        loop {
            match rx_report.recv_timeout(WATCH_INTERVAL) {
                Ok(report) => {
                    if self.config.verbose {
                        print_match_report(&report);
                    }
                    matches.push(report);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if !winding_down && registry.active_players() < PLAYERS_PER_MATCH {
                winding_down = true;
                info!(
                    active_players = registry.active_players(),
                    "not enough players left for a match, closing courts"
                );
                mailboxes.wake_all_courts();
            } else if !winding_down && registry.lobby_stalled() {
                warn!("every remaining player waits in a lobby that cannot fill");
                mailboxes.wake_all_courts();
            }
        }
        matches
    }
}

/// Runs `court` on its own thread. A court that fails is disabled and its players released.
fn spawn_court(
    court: Court,
    registry: Arc<TournamentRegistry>,
    mailboxes: Arc<Mailboxes>,
) -> anyhow::Result<JoinHandle<anyhow::Result<usize>>> {
    let id: CourtId = court.id();
    thread::Builder::new()
        .name(format!("court-{id:03}"))
        .spawn(move || {
            let result = court.run();
            if let Err(e) = &result {
                error!(critical = true, court = id, "court failed: {e:?}");
                for player in registry.fail_court(id) {
                    let reject = Message::new(MessageKind::MatchReject, player);
                    let _ = mailboxes.send_to_player(player, reject);
                }
            }
            result
        })
        .context("could not spawn court thread")
}

fn print_match_report(report: &MatchReport) {
    let team = |members: &[PlayerId]| {
        members
            .iter()
            .map(|p| format!("{p:03}"))
            .collect::<Vec<_>>()
            .join("+")
    };
    // clear line, green court, default teams, yellow sets, start of line
    println!(
        "\x1b[2K\x1b[32mcourt {:03}: \x1b[39m[{}] \x1b[33m{}-{}\x1b[39m [{}] {}\x1b[0G",
        report.court,
        team(&report.home),
        report.home_sets,
        report.away_sets,
        team(&report.away),
        report.credits
    );
}
