//! Symmetric "has been a teammate of" relation.
//!
//! The table only ever grows: once two players have shared a team they can never be paired on
//! the same team again for the rest of the tournament.

use crate::protocol::PlayerId;

/// Square boolean matrix indexed by [`PlayerId`] x [`PlayerId`].
///
/// Lookups and marks with an out-of-range id are silently ignored: [`have_played`] answers
/// `false` and [`mark_played`] does nothing.
///
/// [`have_played`]: PartnersTable::have_played
/// [`mark_played`]: PartnersTable::mark_played
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartnersTable {
    players: usize,
    table: Vec<bool>,
}

impl PartnersTable {
    /// Creates an empty table for `players` players (ids `0..players`).
    pub fn new(players: usize) -> Self {
        Self {
            players,
            table: vec![false; players * players],
        }
    }

    /// Number of players the table was created for.
    pub fn players(&self) -> usize {
        self.players
    }

    fn index(&self, a: PlayerId, b: PlayerId) -> Option<usize> {
        let (a, b) = (a as usize, b as usize);
        if a >= self.players || b >= self.players {
            return None;
        }
        Some(a * self.players + b)
    }

    /// True if `a` and `b` have already been teammates.
    pub fn have_played(&self, a: PlayerId, b: PlayerId) -> bool {
        self.index(a, b).map(|i| self.table[i]).unwrap_or(false)
    }

    /// Marks `a` and `b` as former teammates, in both directions.
    pub fn mark_played(&mut self, a: PlayerId, b: PlayerId) {
        let (Some(ab), Some(ba)) = (self.index(a, b), self.index(b, a)) else {
            return;
        };
        self.table[ab] = true;
        self.table[ba] = true;
    }

    /// All marked pairs `(a, b)` with `a < b`.
    pub fn pairs(&self) -> Vec<(PlayerId, PlayerId)> {
        let mut pairs = vec![];
        for a in 0..self.players {
            for b in (a + 1)..self.players {
                if self.table[a * self.players + b] {
                    pairs.push((a as PlayerId, b as PlayerId));
                }
            }
        }
        pairs
    }
}
