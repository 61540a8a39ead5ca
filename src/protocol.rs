//! Messages exchanged between player and court actors.
//!
//! Every logical event is one fixed-shape [`Message`]: a kind, the player it concerns and a score
//! (only meaningful for [`MessageKind::PlayerScore`]). Players and courts are addressed by id
//! through [`Mailboxes`], which replaces any kind of named-channel bookkeeping: whoever knows an
//! id can reach its owner.
//!
//! Protocol rules:
//! - a player sends exactly one [`MessageKind::JoinRequest`] per court attempt and then waits for
//!   exactly one [`MessageKind::MatchAccept`] or [`MessageKind::MatchReject`];
//! - a seated player answers each [`MessageKind::SetStart`] with exactly one
//!   [`MessageKind::PlayerScore`], sent once the court signals [`MessageKind::SetEnd`];
//! - [`MessageKind::MatchEnd`] releases the player. A [`MessageKind::MatchReject`] received while
//!   seated means the player was kicked from the lobby.

use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};

use anyhow::{anyhow, Context};

/// Player identifier, contiguous from 0.
pub type PlayerId = u32;

/// Court identifier, contiguous from 0.
pub type CourtId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// player -> court: "let me join your lobby"
    JoinRequest,
    /// court -> player: seat granted
    MatchAccept,
    /// court -> player: seat denied, or seated player kicked
    MatchReject,
    /// court -> seated players: begin scoring
    SetStart,
    /// court -> seated players: stop scoring and report
    SetEnd,
    /// player -> court: this set's score
    PlayerScore,
    /// court -> seated players: match over, back to the free pool
    MatchEnd,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::JoinRequest => "JOIN_REQUEST",
            MessageKind::MatchAccept => "MATCH_ACCEPT",
            MessageKind::MatchReject => "MATCH_REJECT",
            MessageKind::SetStart => "SET_START",
            MessageKind::SetEnd => "SET_END",
            MessageKind::PlayerScore => "PLAYER_SCORE",
            MessageKind::MatchEnd => "MATCH_END",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub player_id: PlayerId,
    pub score: u64,
}

impl Message {
    pub fn new(kind: MessageKind, player_id: PlayerId) -> Self {
        Self {
            kind,
            player_id,
            score: 0,
        }
    }

    pub fn join_request(player_id: PlayerId) -> Self {
        Self::new(MessageKind::JoinRequest, player_id)
    }

    pub fn score(player_id: PlayerId, score: u64) -> Self {
        Self {
            kind: MessageKind::PlayerScore,
            player_id,
            score,
        }
    }
}

/// What a court can find in its inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourtSignal {
    Message(Message),
    /// Re-check the registry: the court may have been disabled, the tournament may be winding
    /// down, or the lobbies may be stalled.
    Wake,
}

/// Sending halves of every actor inbox, indexed by id.
#[derive(Debug)]
pub struct Mailboxes {
    players: Vec<Sender<Message>>,
    courts: Vec<Sender<CourtSignal>>,
}

/// Receiving halves produced alongside [`Mailboxes`], to be moved into their actors.
pub struct Inboxes {
    pub players: Vec<Receiver<Message>>,
    pub courts: Vec<Receiver<CourtSignal>>,
}

impl Mailboxes {
    pub fn new(players: usize, courts: usize) -> (Mailboxes, Inboxes) {
        let (player_tx, player_rx): (Vec<_>, Vec<_>) = (0..players)
            .map(|_| mpsc::channel::<Message>())
            .unzip();
        let (court_tx, court_rx): (Vec<_>, Vec<_>) = (0..courts)
            .map(|_| mpsc::channel::<CourtSignal>())
            .unzip();
        (
            Mailboxes {
                players: player_tx,
                courts: court_tx,
            },
            Inboxes {
                players: player_rx,
                courts: court_rx,
            },
        )
    }

    pub fn send_to_player(&self, player: PlayerId, msg: Message) -> anyhow::Result<()> {
        self.players
            .get(player as usize)
            .ok_or_else(|| anyhow!("no mailbox for player {player:03}"))?
            .send(msg)
            .with_context(|| format!("mailbox of player {player:03} is closed ({})", msg.kind))
    }

    pub fn send_to_court(&self, court: CourtId, msg: Message) -> anyhow::Result<()> {
        self.signal_court(court, CourtSignal::Message(msg))
            .with_context(|| format!("could not deliver {} to court {court:03}", msg.kind))
    }

    pub fn signal_court(&self, court: CourtId, signal: CourtSignal) -> anyhow::Result<()> {
        self.courts
            .get(court)
            .ok_or_else(|| anyhow!("no mailbox for court {court:03}"))?
            .send(signal)
            .with_context(|| format!("mailbox of court {court:03} is closed"))
    }

    /// Wakes a court, ignoring courts that already exited.
    pub fn wake_court(&self, court: CourtId) {
        let _ = self.signal_court(court, CourtSignal::Wake);
    }

    pub fn wake_all_courts(&self) {
        for court in 0..self.courts.len() {
            self.wake_court(court);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_reach_their_owner() {
        let (mailboxes, inboxes) = Mailboxes::new(2, 1);
        mailboxes
            .send_to_player(1, Message::new(MessageKind::SetStart, 1))
            .unwrap();
        mailboxes.send_to_court(0, Message::score(1, 42)).unwrap();

        assert!(inboxes.players[0].try_recv().is_err());
        assert_eq!(inboxes.players[1].try_recv().unwrap().kind, MessageKind::SetStart);
        assert_eq!(
            inboxes.courts[0].try_recv().unwrap(),
            CourtSignal::Message(Message {
                kind: MessageKind::PlayerScore,
                player_id: 1,
                score: 42
            })
        );
    }

    #[test]
    fn unknown_or_closed_mailbox_is_an_error() {
        let (mailboxes, inboxes) = Mailboxes::new(1, 1);
        assert!(mailboxes.send_to_player(5, Message::join_request(5)).is_err());
        drop(inboxes);
        assert!(mailboxes.send_to_player(0, Message::join_request(0)).is_err());
        assert!(mailboxes.send_to_court(0, Message::join_request(0)).is_err());
        // waking a gone court is not an error
        mailboxes.wake_all_courts();
    }
}
