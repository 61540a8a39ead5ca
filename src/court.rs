//! Court actor.
//!
//! A court runs on its own thread and cycles through the same states forever:
//!
//! 1. open a lobby and answer join requests until two teams of two are seated;
//! 2. play up to [`SETS_AMOUNT`] sets, stopping once a team wins [`SETS_WINNING`];
//! 3. book the result in the registry, release the players and start over.
//!
//! The court leaves the loop when it is disabled or when too few players remain for another
//! match. Before exiting it rejects everyone still seated and every request already in flight, so
//! that no player waits forever on a court that is gone.

use std::fmt;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::configuration::Configuration;
use crate::lobby::{JoinOutcome, Lobby};
use crate::protocol::{CourtId, CourtSignal, Mailboxes, Message, MessageKind, PlayerId};
use crate::registry::{Closure, TournamentRegistry};
use crate::scores::{Credits, SETS_AMOUNT, SETS_WINNING};
use crate::team::TeamSide;

/// Summary of a finished match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchReport {
    pub court: CourtId,
    pub home: Vec<PlayerId>,
    pub away: Vec<PlayerId>,
    pub home_sets: u8,
    pub away_sets: u8,
    /// `(home, away)` team totals, one entry per set played.
    pub set_scores: Vec<(u64, u64)>,
    pub credits: Credits,
}

impl fmt::Display for MatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let team = |members: &[PlayerId]| {
            members
                .iter()
                .map(|p| format!("{p:03}"))
                .collect::<Vec<_>>()
                .join("+")
        };
        write!(
            f,
            "court {:03}: [{}] {}-{} [{}] ({})",
            self.court,
            team(&self.home),
            self.home_sets,
            self.away_sets,
            team(&self.away),
            self.credits
        )
    }
}

enum LobbyEnd {
    Complete,
    Closed(Closure),
}

pub struct Court {
    id: CourtId,
    inbox: Receiver<CourtSignal>,
    registry: Arc<TournamentRegistry>,
    mailboxes: Arc<Mailboxes>,
    reports: Option<Sender<MatchReport>>,
    lobby: Lobby,
    set_duration_min: Duration,
    set_duration_max: Duration,
    rng: StdRng,
}

impl Court {
    pub fn new(
        id: CourtId,
        inbox: Receiver<CourtSignal>,
        registry: Arc<TournamentRegistry>,
        mailboxes: Arc<Mailboxes>,
        config: &Configuration,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id as u64)),
            None => StdRng::from_entropy(),
        };
        Self {
            id,
            inbox,
            registry,
            mailboxes,
            reports: None,
            lobby: Lobby::new(config.join_attempts_max),
            set_duration_min: config.set_duration_min,
            set_duration_max: config.set_duration_max,
            rng,
        }
    }

    /// Send a [`MatchReport`] on `reports` after every match.
    pub fn with_reports(mut self, reports: Sender<MatchReport>) -> Self {
        self.reports = Some(reports);
        self
    }

    pub fn id(&self) -> CourtId {
        self.id
    }

    /// Runs the court until it is disabled or the tournament winds down.
    ///
    /// Returns the number of matches played.
    ///
    /// # Errors
    /// A player broke the protocol or the inbox closed. The caller is expected to call
    /// [`TournamentRegistry::fail_court`] and reject the players it returns.
    #[instrument(name = "court", skip_all, fields(id = self.id))]
    pub fn run(mut self) -> anyhow::Result<usize> {
        let mut matches = 0;
        loop {
            if let Some(closure) = self.registry.open_lobby(self.id) {
                self.shut_down(closure)?;
                return Ok(matches);
            }
            self.lobby.reset();
            debug!("lobby open");

            match self.fill_lobby()? {
                LobbyEnd::Complete => {
                    let report = self.play_match()?;
                    matches += 1;
                    if let Some(reports) = &self.reports {
                        // the receiver may be gone already, the registry holds the result anyway
                        let _ = reports.send(report);
                    }
                }
                LobbyEnd::Closed(closure) => {
                    self.shut_down(closure)?;
                    return Ok(matches);
                }
            }
        }
    }

    fn recv(&self) -> anyhow::Result<CourtSignal> {
        self.inbox
            .recv()
            .with_context(|| format!("inbox of court {:03} closed", self.id))
    }

    fn send(&self, player: PlayerId, kind: MessageKind) -> anyhow::Result<()> {
        self.mailboxes.send_to_player(player, Message::new(kind, player))
    }

    fn broadcast(&self, players: &[PlayerId], kind: MessageKind) -> anyhow::Result<()> {
        for &player in players {
            self.send(player, kind)?;
        }
        Ok(())
    }

    /// Gives the seat back and tells the player.
    fn reject(&self, player: PlayerId) -> anyhow::Result<()> {
        self.registry.release_seat(self.id, player);
        self.send(player, MessageKind::MatchReject)
    }

    fn fill_lobby(&mut self) -> anyhow::Result<LobbyEnd> {
        loop {
            match self.recv()? {
                CourtSignal::Message(msg) if msg.kind == MessageKind::JoinRequest => {
                    self.handle_join(msg.player_id)?;
                    if self.lobby.is_complete() {
                        return Ok(LobbyEnd::Complete);
                    }
                }
                CourtSignal::Message(msg) => bail!(
                    "protocol violation: court {:03} got {} from player {:03} while assembling teams",
                    self.id,
                    msg.kind,
                    msg.player_id
                ),
                CourtSignal::Wake => {
                    if let Some(closure) = self.registry.closure(self.id) {
                        return Ok(LobbyEnd::Closed(closure));
                    }
                    if !self.lobby.is_empty() && self.registry.lobby_stalled() {
                        warn!(seated = ?self.lobby.seated(), "lobbies stalled, releasing everyone");
                        for player in self.lobby.flush() {
                            self.reject(player)?;
                        }
                    }
                }
            }
        }
    }

    fn handle_join(&mut self, player: PlayerId) -> anyhow::Result<()> {
        let registry = Arc::clone(&self.registry);
        let lobby = &mut self.lobby;
        let outcome = registry.with_partners(|partners| lobby.admit(player, partners));

        match outcome {
            JoinOutcome::Seated(side) => {
                info!(
                    player,
                    %side,
                    connected = self.lobby.connected_players(),
                    "player joined"
                );
                self.send(player, MessageKind::MatchAccept)
            }
            JoinOutcome::AlreadySeated(side) => {
                warn!(player, %side, "player asked again for the seat it holds");
                self.send(player, MessageKind::MatchAccept)
            }
            JoinOutcome::Rejected => {
                debug!(player, "no conflict-free seat");
                self.reject(player)
            }
            JoinOutcome::Flushed(players) => {
                error!(
                    critical = true,
                    ?players,
                    attempts = self.lobby.attempts(),
                    "lobby stuck, kicking everyone"
                );
                for player in players {
                    self.reject(player)?;
                }
                Ok(())
            }
        }
    }

    fn set_duration(&mut self) -> Duration {
        self.rng
            .gen_range(self.set_duration_min..=self.set_duration_max)
    }

    fn play_match(&mut self) -> anyhow::Result<MatchReport> {
        let seated = self.lobby.seated();
        self.registry.start_match(self.id, &seated)?;
        info!(home = %self.lobby.home(), away = %self.lobby.away(), "match started");

        let mut set_scores = Vec::with_capacity(SETS_AMOUNT as usize);
        for set in 1..=SETS_AMOUNT {
            self.broadcast(&seated, MessageKind::SetStart)?;
            let duration = self.set_duration();
            trace!(set, ?duration, "set started");
            thread::sleep(duration);
            self.broadcast(&seated, MessageKind::SetEnd)?;

            let (home, away) = self.collect_scores(&seated)?;
            set_scores.push((home, away));
            let winner = if home >= away {
                TeamSide::Home
            } else {
                TeamSide::Away
            };
            self.lobby.team_mut(winner).win_set();
            debug!(set, home, away, %winner, "set over");

            if self.lobby.team(winner).sets_won() == SETS_WINNING {
                break;
            }
        }

        // book first: players are free to ask for a new seat as soon as they hear MATCH_END
        let credits = self
            .registry
            .finish_match(self.id, self.lobby.home(), self.lobby.away())?;
        self.broadcast(&seated, MessageKind::MatchEnd)?;

        let report = MatchReport {
            court: self.id,
            home: self.lobby.home().members().to_vec(),
            away: self.lobby.away().members().to_vec(),
            home_sets: self.lobby.home().sets_won(),
            away_sets: self.lobby.away().sets_won(),
            set_scores,
            credits,
        };
        info!(%report, "match over");
        Ok(report)
    }

    /// Waits for one score from each seated player, returns the `(home, away)` totals.
    fn collect_scores(&self, seated: &[PlayerId]) -> anyhow::Result<(u64, u64)> {
        let mut scores: Vec<Option<u64>> = vec![None; seated.len()];
        while scores.iter().any(Option::is_none) {
            match self.recv()? {
                CourtSignal::Wake => trace!("wake ignored during a set"),
                CourtSignal::Message(msg) if msg.kind == MessageKind::PlayerScore => {
                    let Some(index) = seated.iter().position(|&p| p == msg.player_id) else {
                        bail!(
                            "protocol violation: court {:03} got a score from player {:03} who is not on court",
                            self.id,
                            msg.player_id
                        );
                    };
                    if scores[index].replace(msg.score).is_some() {
                        bail!(
                            "protocol violation: player {:03} reported twice in the same set",
                            msg.player_id
                        );
                    }
                    trace!(player = msg.player_id, score = msg.score, "score received");
                }
                CourtSignal::Message(msg) => bail!(
                    "protocol violation: court {:03} got {} from player {:03} during a set",
                    self.id,
                    msg.kind,
                    msg.player_id
                ),
            }
        }

        let mut totals = (0u64, 0u64);
        for (&player, score) in seated.iter().zip(scores) {
            let score = score.unwrap_or(0);
            if self.lobby.home().contains(player) {
                totals.0 = totals.0.saturating_add(score);
            } else {
                totals.1 = totals.1.saturating_add(score);
            }
        }
        Ok(totals)
    }

    /// Disables the court and answers everything still pending.
    fn shut_down(&mut self, closure: Closure) -> anyhow::Result<()> {
        info!(?closure, "court shutting down");
        self.registry.disable_court(self.id);
        for player in self.lobby.flush() {
            self.reject(player)?;
        }
        while self.registry.reserved_seats(self.id) > 0 {
            match self.recv()? {
                CourtSignal::Wake => {}
                CourtSignal::Message(msg) if msg.kind == MessageKind::JoinRequest => {
                    self.reject(msg.player_id)?;
                }
                CourtSignal::Message(msg) => bail!(
                    "protocol violation: closed court {:03} got {} from player {:03}",
                    self.id,
                    msg.kind,
                    msg.player_id
                ),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Inboxes;
    use crate::registry::{Admission, CourtStatus, PlayerStatus};

    fn setup(
        players: usize,
        join_attempts_max: usize,
    ) -> (Court, Arc<TournamentRegistry>, Arc<Mailboxes>, Inboxes) {
        let registry = Arc::new(TournamentRegistry::new(players, 1));
        let (mailboxes, mut inboxes) = Mailboxes::new(players, 1);
        let mailboxes = Arc::new(mailboxes);
        let config = Configuration::new()
            .with_set_duration(Duration::from_millis(1), Duration::from_millis(2))
            .with_join_attempts_max(join_attempts_max)
            .with_seed(7);
        let court = Court::new(
            0,
            inboxes.courts.remove(0),
            registry.clone(),
            mailboxes.clone(),
            &config,
        );
        (court, registry, mailboxes, inboxes)
    }

    fn reserve(registry: &TournamentRegistry, player: PlayerId) {
        assert!(matches!(
            registry.reserve_seat(player).unwrap(),
            Admission::Seat { court: 0, .. }
        ));
    }

    #[test]
    fn match_report_display() {
        let report = MatchReport {
            court: 2,
            home: vec![0, 1],
            away: vec![2, 3],
            home_sets: 3,
            away_sets: 1,
            set_scores: vec![],
            credits: Credits { home: 3, away: 0 },
        };
        assert_eq!(
            report.to_string(),
            "court 002: [000+001] 3-1 [002+003] (home +3, away +0)"
        );
    }

    #[test]
    fn stuck_lobby_releases_every_seat() {
        let (mut court, registry, mailboxes, inboxes) = setup(5, 2);
        for p in 0..3 {
            reserve(&registry, p);
            mailboxes.send_to_court(0, Message::join_request(p)).unwrap();
        }
        for _ in 0..3 {
            let CourtSignal::Message(msg) = court.recv().unwrap() else {
                panic!("unexpected wake");
            };
            court.handle_join(msg.player_id).unwrap();
        }

        let replies = |p: usize| {
            inboxes.players[p]
                .try_iter()
                .map(|m| m.kind)
                .collect::<Vec<_>>()
        };
        assert_eq!(replies(0), [MessageKind::MatchAccept, MessageKind::MatchReject]);
        assert_eq!(replies(1), [MessageKind::MatchAccept, MessageKind::MatchReject]);
        assert_eq!(replies(2), [MessageKind::MatchReject]);
        assert!(court.lobby.is_empty());
        assert_eq!(registry.reserved_seats(0), 0);
        reserve(&registry, 2);
    }

    #[test]
    fn shut_down_answers_requests_in_flight() {
        let (court, registry, mailboxes, inboxes) = setup(5, 8);
        reserve(&registry, 0);
        reserve(&registry, 1);
        mailboxes.send_to_court(0, Message::join_request(0)).unwrap();
        mailboxes.send_to_court(0, Message::join_request(1)).unwrap();
        mailboxes.wake_court(0);
        registry.disable_court(0);

        assert_eq!(court.run().unwrap(), 0);
        assert_eq!(registry.court_status(0), Some(CourtStatus::Disabled));
        assert_eq!(registry.reserved_seats(0), 0);
        for p in 0..2 {
            assert_eq!(
                inboxes.players[p].try_recv().unwrap().kind,
                MessageKind::MatchReject
            );
        }
    }

    #[test]
    fn stalled_lobby_is_flushed_on_wake() {
        let registry = Arc::new(TournamentRegistry::new(5, 2));
        let (mailboxes, mut inboxes) = Mailboxes::new(5, 2);
        let mailboxes = Arc::new(mailboxes);
        let court = Court::new(
            0,
            inboxes.courts.remove(0),
            registry.clone(),
            mailboxes.clone(),
            &Configuration::new(),
        );

        // 0, 1 and 2 wait on court 0, 4 alone on court 1: nobody is left to complete either
        for p in 0..4 {
            reserve(&registry, p);
        }
        assert!(matches!(
            registry.reserve_seat(4).unwrap(),
            Admission::Seat { court: 1, .. }
        ));
        registry.leave(3);
        assert!(registry.lobby_stalled());

        for p in 0..3 {
            mailboxes.send_to_court(0, Message::join_request(p)).unwrap();
        }
        mailboxes.wake_court(0);
        let handle = thread::spawn(move || court.run());

        let timeout = Duration::from_secs(5);
        for p in 0..3 {
            let inbox = &inboxes.players[p];
            assert_eq!(
                inbox.recv_timeout(timeout).unwrap().kind,
                MessageKind::MatchAccept
            );
            assert_eq!(
                inbox.recv_timeout(timeout).unwrap().kind,
                MessageKind::MatchReject
            );
        }
        let snapshot = registry.snapshot();
        assert!(snapshot.courts[0].occupants.is_empty());
        assert_eq!(snapshot.courts[1].occupants, vec![4]);
        assert!(snapshot.players[..3]
            .iter()
            .all(|&p| p == PlayerStatus::Idle));
        assert!(!registry.lobby_stalled());

        // wind down so the court exits
        registry.leave(4);
        mailboxes.wake_court(0);
        assert_eq!(handle.join().unwrap().unwrap(), 0);
        assert_eq!(registry.court_status(0), Some(CourtStatus::Disabled));
    }

    #[test]
    fn protocol_violation_in_lobby_is_an_error() {
        let (court, _registry, mailboxes, _inboxes) = setup(4, 8);
        mailboxes.send_to_court(0, Message::score(1, 5)).unwrap();
        assert!(court.run().is_err());
    }
}
