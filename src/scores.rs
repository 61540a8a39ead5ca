//! Match outcome and tournament point tally.

use std::fmt;

use crate::protocol::PlayerId;

/// Maximum number of sets in a match.
pub const SETS_AMOUNT: u8 = 5;
/// Sets needed to win a match.
pub const SETS_WINNING: u8 = 3;

/// Points credited to each member of the home and away teams at the end of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Credits {
    pub home: u32,
    pub away: u32,
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "home +{}, away +{}", self.home, self.away)
    }
}

/// Points earned by each team from the final set count.
///
/// | home | away | credits |
/// |------|------|---------|
/// | 0-1  | 3    | 0 / 3   |
/// | 2    | 3    | 1 / 2   |
/// | 3    | 2    | 2 / 1   |
/// | 3    | 0-1  | 3 / 0   |
///
/// Returns `None` for a set count no finished match can have.
pub fn match_credits(home_sets: u8, away_sets: u8) -> Option<Credits> {
    let (home, away) = match (home_sets, away_sets) {
        (0 | 1, SETS_WINNING) => (0, 3),
        (2, SETS_WINNING) => (1, 2),
        (SETS_WINNING, 2) => (2, 1),
        (SETS_WINNING, 0 | 1) => (3, 0),
        _ => return None,
    };
    Some(Credits { home, away })
}

/// Cross-match point tally, one counter per player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreAggregator {
    points: Vec<u32>,
}

impl ScoreAggregator {
    pub fn new(players: usize) -> Self {
        Self {
            points: vec![0; players],
        }
    }

    /// Adds `points` to every player of `team`. Unknown ids are ignored.
    pub fn credit(&mut self, team: &[PlayerId], points: u32) {
        for &player in team {
            if let Some(total) = self.points.get_mut(player as usize) {
                *total += points;
            }
        }
    }

    pub fn points(&self, player: PlayerId) -> u32 {
        self.points.get(player as usize).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.points.iter().sum()
    }

    /// `(player, points)` sorted by points, best first, then by id.
    pub fn standings(&self) -> Vec<(PlayerId, u32)> {
        let mut standings = self
            .points
            .iter()
            .enumerate()
            .map(|(id, &points)| (id as PlayerId, points))
            .collect::<Vec<_>>();
        standings.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        standings
    }
}
