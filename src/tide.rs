//! Scheduled court closing.
//!
//! A tide file lists timed events, one `KEY : microseconds` pair per line:
//!
//! ```text
//! F : 2000000
//! E : 1000000
//! ```
//!
//! `F` (flow) waits the given delay, then disables as many courts as the grid has rows, highest
//! index first.
//! `E` (ebb) is accepted for compatibility but has no effect: a disabled court never reopens.
//! Delays are relative to the previous event.

use std::path::Path;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::{info, warn};

use crate::configuration::parse_key_values;
use crate::protocol::Mailboxes;
use crate::registry::{CourtStatus, TournamentRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TideEvent {
    /// Disable more courts after the delay.
    Flow(Duration),
    /// Would reopen a row; ignored.
    Ebb(Duration),
}

impl TideEvent {
    pub fn delay(&self) -> Duration {
        match *self {
            TideEvent::Flow(d) | TideEvent::Ebb(d) => d,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TideSchedule {
    events: Vec<TideEvent>,
}

impl TideSchedule {
    pub fn new(events: Vec<TideEvent>) -> Self {
        Self { events }
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let mut events = vec![];
        for (key, micros) in parse_key_values(text)? {
            let delay = Duration::from_micros(micros);
            match key.as_str() {
                "F" => events.push(TideEvent::Flow(delay)),
                "E" => events.push(TideEvent::Ebb(delay)),
                other => bail!("unknown tide event '{other}', expected F or E"),
            }
        }
        Ok(Self { events })
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("could not read tide file '{}'", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid tide file '{}'", path.display()))
    }

    pub fn events(&self) -> &[TideEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Plays the schedule. Returns early as soon as `cancel` receives a message or hangs up.
    ///
    /// Returns the number of courts disabled.
    pub fn run(
        &self,
        registry: &TournamentRegistry,
        mailboxes: &Mailboxes,
        courts_per_flow: usize,
        cancel: &Receiver<()>,
    ) -> usize {
        let mut disabled = 0;
        for event in &self.events {
            match cancel.recv_timeout(event.delay()) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return disabled,
            }
            match event {
                TideEvent::Flow(_) => {
                    disabled += flow(registry, mailboxes, courts_per_flow);
                }
                TideEvent::Ebb(_) => warn!("ebb ignored, disabled courts stay disabled"),
            }
        }
        disabled
    }
}

/// Disables up to `count` courts, highest index first, and wakes them.
fn flow(registry: &TournamentRegistry, mailboxes: &Mailboxes, count: usize) -> usize {
    let open = registry
        .snapshot()
        .courts
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, c)| c.status != CourtStatus::Disabled)
        .map(|(i, _)| i)
        .take(count)
        .collect::<Vec<_>>();

    let mut disabled = 0;
    for court in open {
        if registry.disable_court(court) {
            mailboxes.wake_court(court);
            disabled += 1;
        }
    }
    info!(disabled, "tide flow");
    disabled
}
