//! Player actor.
//!
//! A player repeatedly reserves a seat, asks the court to join, and plays until the match ends or
//! it gets kicked. It leaves the tournament once it played its quota of matches, got rejected too
//! many times, or no court will ever admit it again.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, instrument, trace, warn};

use crate::configuration::Configuration;
use crate::protocol::{CourtId, Mailboxes, Message, MessageKind, PlayerId};
use crate::registry::{Admission, TournamentRegistry};

/// Upper bound on one wait for a free seat. The player re-checks the registry afterwards.
const VACANCY_POLL: Duration = Duration::from_millis(100);

/// Decides how many points a player earns on each scoring tick of a set.
pub trait SetScorer: Send {
    fn tick(&mut self) -> u64;
}

/// Earns between 0 and `max_step` points per tick.
pub struct RandomWalk {
    rng: StdRng,
    max_step: u64,
}

impl RandomWalk {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng, max_step: 10 }
    }
}

impl SetScorer for RandomWalk {
    fn tick(&mut self) -> u64 {
        self.rng.gen_range(0..=self.max_step)
    }
}

/// Earns the same amount on every tick.
pub struct FixedScore(pub u64);

impl SetScorer for FixedScore {
    fn tick(&mut self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerSummary {
    pub id: PlayerId,
    pub matches_played: usize,
    pub kicks: usize,
}

enum MatchOutcome {
    Finished,
    Kicked,
}

pub struct Player {
    id: PlayerId,
    inbox: Receiver<Message>,
    registry: Arc<TournamentRegistry>,
    mailboxes: Arc<Mailboxes>,
    scorer: Box<dyn SetScorer>,
    matches_per_player: usize,
    max_kicks: usize,
    score_tick: Duration,
    matches_played: usize,
    kicks: usize,
}

impl Player {
    pub fn new(
        id: PlayerId,
        inbox: Receiver<Message>,
        registry: Arc<TournamentRegistry>,
        mailboxes: Arc<Mailboxes>,
        config: &Configuration,
    ) -> Self {
        // courts use seed + court id, keep players apart from them
        let seed = config
            .seed
            .map(|s| s.wrapping_add(0x5eed_0000).wrapping_add(id as u64));
        Self {
            id,
            inbox,
            registry,
            mailboxes,
            scorer: Box::new(RandomWalk::new(seed)),
            matches_per_player: config.matches_per_player,
            max_kicks: config.max_kicks,
            score_tick: config.score_tick,
            matches_played: 0,
            kicks: 0,
        }
    }

    pub fn with_scorer(mut self, scorer: Box<dyn SetScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Plays until one of the leaving conditions holds, then leaves the tournament.
    ///
    /// The player leaves the registry even when it fails, so that courts never wait on it.
    #[instrument(name = "player", skip_all, fields(id = self.id))]
    pub fn run(mut self) -> anyhow::Result<PlayerSummary> {
        let result = self.play_tournament();
        self.registry.leave(self.id);
        result?;
        info!(
            matches = self.matches_played,
            kicks = self.kicks,
            "player done"
        );
        Ok(PlayerSummary {
            id: self.id,
            matches_played: self.matches_played,
            kicks: self.kicks,
        })
    }

    fn play_tournament(&mut self) -> anyhow::Result<()> {
        loop {
            if self.matches_played >= self.matches_per_player {
                debug!("match quota reached");
                return Ok(());
            }
            if self.kicks >= self.max_kicks {
                warn!(kicks = self.kicks, "rejected too many times, giving up");
                return Ok(());
            }

            match self.registry.reserve_seat(self.id)? {
                Admission::Closed(closure) => {
                    debug!(?closure, "no court will admit anyone anymore");
                    return Ok(());
                }
                Admission::Wait => self.registry.wait_for_vacancy(VACANCY_POLL),
                Admission::Seat { court, seat } => {
                    trace!(court, seat, "seat reserved, asking to join");
                    let outcome = match self
                        .mailboxes
                        .send_to_court(court, Message::join_request(self.id))
                    {
                        Ok(()) => self.play_on(court)?,
                        Err(e) => self.await_release(court, e)?,
                    };
                    match outcome {
                        MatchOutcome::Finished => self.matches_played += 1,
                        MatchOutcome::Kicked => self.kicks += 1,
                    }
                }
            }
        }
    }

    fn recv(&self) -> anyhow::Result<Message> {
        self.inbox
            .recv()
            .with_context(|| format!("inbox of player {:03} closed", self.id))
    }

    /// Waits for the join reply, then serves sets until the match ends.
    fn play_on(&mut self, court: CourtId) -> anyhow::Result<MatchOutcome> {
        let reply = self.recv()?;
        match reply.kind {
            MessageKind::MatchAccept => trace!(court, "seated"),
            MessageKind::MatchReject => {
                trace!(court, "rejected");
                return Ok(MatchOutcome::Kicked);
            }
            other => bail!(
                "protocol violation: player {:03} expected a join reply from court {court:03}, got {other}",
                self.id
            ),
        }

        loop {
            let msg = self.recv()?;
            match msg.kind {
                MessageKind::SetStart => {
                    let Some(score) = self.play_set()? else {
                        return Ok(MatchOutcome::Kicked);
                    };
                    let sent = self
                        .mailboxes
                        .send_to_court(court, Message::score(self.id, score));
                    if let Err(e) = sent {
                        return self.await_release(court, e);
                    }
                }
                MessageKind::MatchEnd => {
                    debug!(court, "match over");
                    return Ok(MatchOutcome::Finished);
                }
                MessageKind::MatchReject => {
                    debug!(court, "kicked from the lobby");
                    return Ok(MatchOutcome::Kicked);
                }
                other => bail!(
                    "protocol violation: player {:03} got {other} from court {court:03}",
                    self.id
                ),
            }
        }
    }

    /// The court mailbox closed while this player held a seat on it: the court failed. Its
    /// players are always sent a MATCH_REJECT once the court is taken down, wait for it.
    fn await_release(
        &self,
        court: CourtId,
        cause: anyhow::Error,
    ) -> anyhow::Result<MatchOutcome> {
        warn!(court, "court unreachable, waiting to be released: {cause:#}");
        loop {
            let msg = self.recv()?;
            match msg.kind {
                MessageKind::MatchReject => return Ok(MatchOutcome::Kicked),
                MessageKind::SetStart | MessageKind::SetEnd | MessageKind::MatchAccept => {
                    trace!(court, kind = %msg.kind, "dropped message from a failed court");
                }
                other => bail!(
                    "protocol violation: player {:03} got {other} from failed court {court:03}",
                    self.id
                ),
            }
        }
    }

    /// Scores until SET_END. `None` if the player was kicked meanwhile.
    fn play_set(&mut self) -> anyhow::Result<Option<u64>> {
        let mut score = 0u64;
        loop {
            match self.inbox.recv_timeout(self.score_tick) {
                Err(RecvTimeoutError::Timeout) => {
                    score = score.saturating_add(self.scorer.tick());
                }
                Err(RecvTimeoutError::Disconnected) => {
                    bail!("inbox of player {:03} closed", self.id)
                }
                Ok(msg) => match msg.kind {
                    MessageKind::SetEnd => return Ok(Some(score)),
                    MessageKind::MatchReject => return Ok(None),
                    other => bail!(
                        "protocol violation: player {:03} got {other} during a set",
                        self.id
                    ),
                },
            }
        }
    }
}
