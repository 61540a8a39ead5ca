use std::fmt;

use crate::partners_table::PartnersTable;
use crate::protocol::PlayerId;

pub const PLAYERS_PER_MATCH: usize = 4;
pub const PLAYERS_PER_TEAM: usize = PLAYERS_PER_MATCH / 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeamSide {
    Home,
    Away,
}

impl fmt::Display for TeamSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeamSide::Home => f.write_str("home"),
            TeamSide::Away => f.write_str("away"),
        }
    }
}

/// Up to [`PLAYERS_PER_TEAM`] players plus the sets they won in the current match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Team {
    members: Vec<PlayerId>,
    sets_won: u8,
}

impl Team {
    pub fn new() -> Self {
        Self {
            members: Vec::with_capacity(PLAYERS_PER_TEAM),
            sets_won: 0,
        }
    }

    pub fn members(&self) -> &[PlayerId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= PLAYERS_PER_TEAM
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.members.contains(&player)
    }

    /// True if `player` may be added: the team has room, does not hold the player already and
    /// no member has ever been a teammate of the player.
    pub fn can_join(&self, player: PlayerId, partners: &PartnersTable) -> bool {
        !self.is_full()
            && !self.contains(player)
            && self
                .members
                .iter()
                .all(|&member| !partners.have_played(member, player))
    }

    /// Adds `player`. Returns false (and leaves the team untouched) if the team is full or
    /// already holds the player.
    pub fn join(&mut self, player: PlayerId) -> bool {
        if self.is_full() || self.contains(player) {
            return false;
        }
        self.members.push(player);
        true
    }

    pub fn sets_won(&self) -> u8 {
        self.sets_won
    }

    pub fn win_set(&mut self) {
        self.sets_won += 1;
    }

    /// Removes every member and forgets the set count.
    pub fn clear(&mut self) {
        self.members.clear();
        self.sets_won = 0;
    }

    /// Every unordered pair of teammates.
    pub fn partner_pairs(&self) -> Vec<(PlayerId, PlayerId)> {
        let mut pairs = vec![];
        for (i, &a) in self.members.iter().enumerate() {
            for &b in &self.members[i + 1..] {
                pairs.push((a, b));
            }
        }
        pairs
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self
            .members
            .iter()
            .map(|id| format!("{id:03}"))
            .collect::<Vec<_>>()
            .join("+");
        write!(f, "[{names}]")
    }
}
