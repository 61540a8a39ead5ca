//! Team assembly.
//!
//! A [`Lobby`] is the pre-match state of a court: two teams being filled one join request at a
//! time. Each arrival is decided on the spot from the current teams and the partners table, in
//! this order:
//!
//! 1. empty lobby: the player seeds the home team;
//! 2. one player seated: home if the two never were teammates, away otherwise;
//! 3. third and fourth arrivals: home if it has room and no conflict, else away under the same
//!    test, else the player is rejected.
//!
//! Every join attempt made while the lobby is non-empty is counted. When the count reaches the
//! configured maximum before four players are seated, the whole lobby is flushed: everybody is
//! rejected and the lobby starts over. This keeps a court from waiting forever on a player pool
//! that cannot produce two conflict-free pairs.

use crate::partners_table::PartnersTable;
use crate::protocol::PlayerId;
use crate::team::{Team, TeamSide, PLAYERS_PER_MATCH};

/// Result of one join attempt. Every player listed must receive exactly one reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The player got a seat on the given team.
    Seated(TeamSide),
    /// The player already holds a seat on that team; nothing changed.
    AlreadySeated(TeamSide),
    /// No conflict-free seat for this player.
    Rejected,
    /// The lobby got stuck: all these players (seated ones first, then the arrival if it was not
    /// seated) must be rejected. The lobby is empty again.
    Flushed(Vec<PlayerId>),
}

#[derive(Debug, Clone)]
pub struct Lobby {
    home: Team,
    away: Team,
    attempts: usize,
    join_attempts_max: usize,
}

impl Lobby {
    pub fn new(join_attempts_max: usize) -> Self {
        Self {
            home: Team::new(),
            away: Team::new(),
            attempts: 0,
            join_attempts_max,
        }
    }

    pub fn home(&self) -> &Team {
        &self.home
    }

    pub fn away(&self) -> &Team {
        &self.away
    }

    pub fn team(&self, side: TeamSide) -> &Team {
        match side {
            TeamSide::Home => &self.home,
            TeamSide::Away => &self.away,
        }
    }

    pub fn team_mut(&mut self, side: TeamSide) -> &mut Team {
        match side {
            TeamSide::Home => &mut self.home,
            TeamSide::Away => &mut self.away,
        }
    }

    pub fn connected_players(&self) -> usize {
        self.home.len() + self.away.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connected_players() == 0
    }

    pub fn is_complete(&self) -> bool {
        self.connected_players() == PLAYERS_PER_MATCH
    }

    /// Join attempts counted since the lobby became non-empty.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn side_of(&self, player: PlayerId) -> Option<TeamSide> {
        if self.home.contains(player) {
            Some(TeamSide::Home)
        } else if self.away.contains(player) {
            Some(TeamSide::Away)
        } else {
            None
        }
    }

    /// Every seated player, home first.
    pub fn seated(&self) -> Vec<PlayerId> {
        self.home
            .members()
            .iter()
            .chain(self.away.members())
            .copied()
            .collect()
    }

    /// Empties both teams and the attempt counter.
    pub fn reset(&mut self) {
        self.home.clear();
        self.away.clear();
        self.attempts = 0;
    }

    /// Removes everyone, returning who was seated.
    pub fn flush(&mut self) -> Vec<PlayerId> {
        let seated = self.seated();
        self.reset();
        seated
    }

    fn place(&self, player: PlayerId, partners: &PartnersTable) -> Option<TeamSide> {
        match self.connected_players() {
            0 => Some(TeamSide::Home),
            1 => {
                let first = self.seated()[0];
                if partners.have_played(first, player) {
                    Some(TeamSide::Away)
                } else {
                    Some(TeamSide::Home)
                }
            }
            n if n < PLAYERS_PER_MATCH => [TeamSide::Home, TeamSide::Away]
                .into_iter()
                .find(|&side| self.team(side).can_join(player, partners)),
            _ => None,
        }
    }

    /// Decides where `player` goes. See the module documentation for the rules.
    pub fn admit(&mut self, player: PlayerId, partners: &PartnersTable) -> JoinOutcome {
        if let Some(side) = self.side_of(player) {
            return JoinOutcome::AlreadySeated(side);
        }
        if !self.is_empty() {
            self.attempts += 1;
        }

        let placed = self.place(player, partners);
        if let Some(side) = placed {
            let joined = self.team_mut(side).join(player);
            debug_assert!(joined, "placement picked a team that refused the player");
        }

        if !self.is_complete() && self.attempts >= self.join_attempts_max {
            let mut flushed = self.flush();
            if placed.is_none() {
                flushed.push(player);
            }
            return JoinOutcome::Flushed(flushed);
        }

        match placed {
            Some(side) => JoinOutcome::Seated(side),
            None => JoinOutcome::Rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_played(players: &[PlayerId], n: usize) -> PartnersTable {
        let mut pt = PartnersTable::new(n);
        for (i, &a) in players.iter().enumerate() {
            for &b in &players[i + 1..] {
                pt.mark_played(a, b);
            }
        }
        pt
    }

    #[test]
    fn first_arrival_seeds_home() {
        let mut pt = PartnersTable::new(4);
        pt.mark_played(0, 1);
        let mut lobby = Lobby::new(8);
        assert_eq!(lobby.admit(3, &pt), JoinOutcome::Seated(TeamSide::Home));
        assert_eq!(lobby.attempts(), 0);
    }

    #[test]
    fn second_arrival_joins_home_unless_former_partner() {
        let pt = PartnersTable::new(4);
        let mut lobby = Lobby::new(8);
        lobby.admit(0, &pt);
        assert_eq!(lobby.admit(1, &pt), JoinOutcome::Seated(TeamSide::Home));

        let mut pt = PartnersTable::new(4);
        pt.mark_played(0, 1);
        let mut lobby = Lobby::new(8);
        lobby.admit(0, &pt);
        assert_eq!(lobby.admit(1, &pt), JoinOutcome::Seated(TeamSide::Away));
    }

    #[test]
    fn fresh_players_fill_home_then_away() {
        let pt = PartnersTable::new(4);
        let mut lobby = Lobby::new(8);
        for id in 0..4 {
            assert!(matches!(lobby.admit(id, &pt), JoinOutcome::Seated(_)));
        }
        assert!(lobby.is_complete());
        assert_eq!(lobby.home().members(), &[0, 1]);
        assert_eq!(lobby.away().members(), &[2, 3]);
    }

    #[test]
    fn third_arrival_avoids_conflicting_team() {
        let mut pt = PartnersTable::new(4);
        pt.mark_played(0, 1);
        pt.mark_played(0, 2);
        let mut lobby = Lobby::new(8);
        lobby.admit(0, &pt);
        lobby.admit(1, &pt); // away
        assert_eq!(lobby.admit(2, &pt), JoinOutcome::Seated(TeamSide::Away));
        assert_eq!(lobby.away().members(), &[1, 2]);
    }

    #[test]
    fn conflicting_arrival_goes_away() {
        let mut pt = PartnersTable::new(4);
        pt.mark_played(0, 2);
        let mut lobby = Lobby::new(8);
        lobby.admit(0, &pt);
        lobby.admit(1, &pt); // home, no conflict
        assert_eq!(lobby.admit(2, &pt), JoinOutcome::Seated(TeamSide::Away));
        assert_eq!(lobby.admit(3, &pt), JoinOutcome::Seated(TeamSide::Away));
        assert!(lobby.is_complete());
    }

    #[test]
    fn no_conflict_free_slot_means_reject() {
        let pt = all_played(&[0, 1, 2], 4);
        let mut lobby = Lobby::new(8);
        assert_eq!(lobby.admit(0, &pt), JoinOutcome::Seated(TeamSide::Home));
        assert_eq!(lobby.admit(1, &pt), JoinOutcome::Seated(TeamSide::Away));
        assert_eq!(lobby.admit(2, &pt), JoinOutcome::Rejected);
        assert_eq!(lobby.connected_players(), 2);
    }

    #[test]
    fn full_team_is_never_offered() {
        let pt = PartnersTable::new(5);
        let mut lobby = Lobby::new(8);
        lobby.admit(0, &pt);
        lobby.admit(1, &pt);
        lobby.admit(2, &pt);
        assert_eq!(lobby.admit(3, &pt), JoinOutcome::Seated(TeamSide::Away));
        assert_eq!(lobby.home().len(), 2);
        assert_eq!(lobby.away().len(), 2);
    }

    #[test]
    fn seated_player_is_not_added_again() {
        let pt = PartnersTable::new(4);
        let mut lobby = Lobby::new(8);
        lobby.admit(0, &pt);
        lobby.admit(1, &pt);
        assert_eq!(lobby.admit(1, &pt), JoinOutcome::AlreadySeated(TeamSide::Home));
        assert_eq!(lobby.connected_players(), 2);
        assert_eq!(lobby.attempts(), 1);
    }

    #[test]
    fn stuck_lobby_is_flushed() {
        let pt = all_played(&[0, 1, 2], 4);
        let mut lobby = Lobby::new(3);
        lobby.admit(0, &pt);
        lobby.admit(1, &pt); // attempt 1
        assert_eq!(lobby.admit(2, &pt), JoinOutcome::Rejected); // attempt 2
        assert_eq!(lobby.admit(2, &pt), JoinOutcome::Flushed(vec![0, 1, 2])); // attempt 3
        assert!(lobby.is_empty());
        assert!(lobby.home().is_empty());
        assert!(lobby.away().is_empty());
        assert_eq!(lobby.attempts(), 0);

        // and the lobby seeds again
        assert_eq!(lobby.admit(2, &pt), JoinOutcome::Seated(TeamSide::Home));
    }

    #[test]
    fn flush_includes_a_just_seated_arrival() {
        let pt = PartnersTable::new(4);
        let mut lobby = Lobby::new(2);
        lobby.admit(0, &pt);
        lobby.admit(1, &pt);
        assert_eq!(lobby.admit(2, &pt), JoinOutcome::Flushed(vec![0, 1, 2]));
    }

    #[test]
    fn completing_lobby_is_not_flushed() {
        let pt = PartnersTable::new(4);
        let mut lobby = Lobby::new(3);
        for id in 0..4 {
            assert!(matches!(lobby.admit(id, &pt), JoinOutcome::Seated(_)));
        }
        assert!(lobby.is_complete());
    }
}
