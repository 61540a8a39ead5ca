//! Tournament-wide shared state.
//!
//! The [`TournamentRegistry`] is the only state shared between court and player actors: court
//! occupancy and status, per-player status, the active-player counter, the partners table and
//! the point tally. Everything lives behind one mutex and every accessor is a short
//! read-decide-write critical section. No accessor blocks on a channel while holding the lock.
//!
//! Admission works by reservation: a player picks a court and takes a seat here *before*
//! contacting the court. The court then runs team assembly and releases the seat of every player
//! it rejects.

use std::cmp::Reverse;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use tracing::{debug, info, trace};

use crate::partners_table::PartnersTable;
use crate::protocol::{CourtId, PlayerId};
use crate::scores::{match_credits, Credits, ScoreAggregator};
use crate::team::{Team, PLAYERS_PER_MATCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourtStatus {
    /// Idle, no lobby running.
    Free,
    /// Accepting join requests.
    Lobby,
    /// Four seats reserved or match in progress.
    Busy,
    /// Removed from the tournament, terminal.
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourtDescriptor {
    pub status: CourtStatus,
    /// Players holding a seat, in reservation order.
    pub occupants: Vec<PlayerId>,
    /// The court started playing with its current occupants.
    pub playing: bool,
}

impl CourtDescriptor {
    fn new() -> Self {
        Self {
            status: CourtStatus::Free,
            occupants: Vec::with_capacity(PLAYERS_PER_MATCH),
            playing: false,
        }
    }

    pub fn num_players(&self) -> usize {
        self.occupants.len()
    }

    /// Drops `player`'s seat. A court that was full but not playing accepts joins again.
    fn remove_occupant(&mut self, player: PlayerId) -> bool {
        let Some(pos) = self.occupants.iter().position(|&p| p == player) else {
            return false;
        };
        self.occupants.remove(pos);
        if self.status == CourtStatus::Busy && !self.playing {
            self.status = CourtStatus::Lobby;
        }
        true
    }

    fn is_admittable(&self) -> bool {
        matches!(self.status, CourtStatus::Free | CourtStatus::Lobby)
            && self.occupants.len() < PLAYERS_PER_MATCH
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    Idle,
    /// Holds a seat on a court that has not started playing.
    Seated(CourtId),
    Playing(CourtId),
    /// Out of the tournament for good.
    Left,
}

/// Why a court, or the whole tournament, stopped admitting players.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closure {
    /// The court was disabled (for a player: every court is).
    Disabled,
    /// Fewer active players than a match needs.
    WindDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A seat was reserved; `seat` is its index in the court's occupant list.
    Seat { court: CourtId, seat: usize },
    /// Every usable court is full right now.
    Wait,
    Closed(Closure),
}

/// Copy of the registry content, for reports and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub courts: Vec<CourtDescriptor>,
    pub players: Vec<PlayerStatus>,
    pub active_players: usize,
    pub matches_played: usize,
}

#[derive(Debug)]
struct RegistryState {
    courts: Vec<CourtDescriptor>,
    players: Vec<PlayerStatus>,
    active_players: usize,
    matches_played: usize,
    partners: PartnersTable,
    scores: ScoreAggregator,
}

impl RegistryState {
    fn closure(&self) -> Option<Closure> {
        if self.active_players < PLAYERS_PER_MATCH {
            Some(Closure::WindDown)
        } else if self
            .courts
            .iter()
            .all(|c| c.status == CourtStatus::Disabled)
        {
            Some(Closure::Disabled)
        } else {
            None
        }
    }

    /// A player asking for a seat right now would be told to wait.
    fn must_wait(&self) -> bool {
        self.closure().is_none() && !self.courts.iter().any(CourtDescriptor::is_admittable)
    }

    fn court(&self, court: CourtId) -> anyhow::Result<&CourtDescriptor> {
        self.courts
            .get(court)
            .ok_or_else(|| anyhow!("unknown court {court:03}"))
    }

    fn court_mut(&mut self, court: CourtId) -> anyhow::Result<&mut CourtDescriptor> {
        self.courts
            .get_mut(court)
            .ok_or_else(|| anyhow!("unknown court {court:03}"))
    }

    fn player_mut(&mut self, player: PlayerId) -> anyhow::Result<&mut PlayerStatus> {
        self.players
            .get_mut(player as usize)
            .ok_or_else(|| anyhow!("unknown player {player:03}"))
    }

    fn set_player(&mut self, player: PlayerId, status: PlayerStatus) {
        if let Some(s) = self.players.get_mut(player as usize) {
            *s = status;
        }
    }
}

pub struct TournamentRegistry {
    state: Mutex<RegistryState>,
    /// Notified whenever a seat may have become available or the tournament closed.
    vacancy: Condvar,
}

impl TournamentRegistry {
    pub fn new(players: usize, courts: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                courts: (0..courts).map(|_| CourtDescriptor::new()).collect(),
                players: vec![PlayerStatus::Idle; players],
                active_players: players,
                matches_played: 0,
                partners: PartnersTable::new(players),
                scores: ScoreAggregator::new(players),
            }),
            vacancy: Condvar::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().expect("poisoned")
    }

    pub fn active_players(&self) -> usize {
        self.state().active_players
    }

    pub fn matches_played(&self) -> usize {
        self.state().matches_played
    }

    /// Reserves a seat for `player` on the admittable court with the most players (lowest index
    /// on ties). The court turns [`CourtStatus::Busy`] when its last seat is taken.
    ///
    /// # Errors
    /// Unknown player, or a player that already holds a seat or left.
    pub fn reserve_seat(&self, player: PlayerId) -> anyhow::Result<Admission> {
        let mut state = self.state();
        let status = *state.player_mut(player)?;
        if status != PlayerStatus::Idle {
            bail!("player {player:03} cannot reserve a seat while {status:?}");
        }
        if let Some(closure) = state.closure() {
            return Ok(Admission::Closed(closure));
        }

        let best = state
            .courts
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_admittable())
            .max_by_key(|(i, c)| (c.num_players(), Reverse(*i)))
            .map(|(i, _)| i);
        let Some(court) = best else {
            return Ok(Admission::Wait);
        };

        let descriptor = &mut state.courts[court];
        descriptor.occupants.push(player);
        let seat = descriptor.occupants.len() - 1;
        if descriptor.occupants.len() == PLAYERS_PER_MATCH {
            descriptor.status = CourtStatus::Busy;
        }
        state.set_player(player, PlayerStatus::Seated(court));
        trace!(player, court, seat, "seat reserved");
        Ok(Admission::Seat { court, seat })
    }

    /// Blocks until a court may have a free seat or the tournament closed, for at most
    /// `timeout`.
    pub fn wait_for_vacancy(&self, timeout: Duration) {
        let state = self.state();
        let _ = self
            .vacancy
            .wait_timeout_while(state, timeout, |s| s.must_wait())
            .expect("poisoned");
    }

    /// Takes `player` out of the tournament. Returns false if it already left.
    pub fn leave(&self, player: PlayerId) -> bool {
        let mut state = self.state();
        let Some(status) = state.players.get(player as usize).copied() else {
            return false;
        };
        match status {
            PlayerStatus::Left => return false,
            PlayerStatus::Seated(court) => {
                if let Some(c) = state.courts.get_mut(court) {
                    c.remove_occupant(player);
                }
            }
            PlayerStatus::Idle | PlayerStatus::Playing(_) => {}
        }
        state.set_player(player, PlayerStatus::Left);
        state.active_players -= 1;
        info!(
            player,
            active_players = state.active_players,
            "player left the tournament"
        );
        drop(state);
        self.vacancy.notify_all();
        true
    }

    /// Gives back the seat `player` reserved on `court`. Returns false if it held none.
    pub fn release_seat(&self, court: CourtId, player: PlayerId) -> bool {
        let mut state = self.state();
        let Ok(descriptor) = state.court_mut(court) else {
            return false;
        };
        if !descriptor.remove_occupant(player) {
            return false;
        }
        if state.players.get(player as usize) == Some(&PlayerStatus::Seated(court)) {
            state.set_player(player, PlayerStatus::Idle);
        }
        trace!(player, court, "seat released");
        drop(state);
        self.vacancy.notify_all();
        true
    }

    /// Why `court` must stop, if it must.
    pub fn closure(&self, court: CourtId) -> Option<Closure> {
        let state = self.state();
        match state.court(court) {
            Ok(c) if c.status != CourtStatus::Disabled => {
                if state.active_players < PLAYERS_PER_MATCH {
                    Some(Closure::WindDown)
                } else {
                    None
                }
            }
            _ => Some(Closure::Disabled),
        }
    }

    /// FREE -> LOBBY. Returns the reason instead if the court must not open another lobby.
    pub fn open_lobby(&self, court: CourtId) -> Option<Closure> {
        let mut state = self.state();
        let wind_down = state.active_players < PLAYERS_PER_MATCH;
        let Ok(descriptor) = state.court_mut(court) else {
            return Some(Closure::Disabled);
        };
        if descriptor.status == CourtStatus::Disabled {
            return Some(Closure::Disabled);
        }
        if wind_down {
            return Some(Closure::WindDown);
        }
        if descriptor.status == CourtStatus::Free {
            descriptor.status = CourtStatus::Lobby;
        }
        None
    }

    pub fn court_status(&self, court: CourtId) -> Option<CourtStatus> {
        self.state().courts.get(court).map(|c| c.status)
    }

    /// Seats currently reserved on `court`, whether or not the court processed the request yet.
    pub fn reserved_seats(&self, court: CourtId) -> usize {
        self.state()
            .courts
            .get(court)
            .map(CourtDescriptor::num_players)
            .unwrap_or(0)
    }

    /// LOBBY -> BUSY with the given players on court.
    pub fn start_match(&self, court: CourtId, players: &[PlayerId]) -> anyhow::Result<()> {
        let mut state = self.state();
        let descriptor = state.court_mut(court)?;
        if descriptor.status != CourtStatus::Disabled {
            descriptor.status = CourtStatus::Busy;
        }
        descriptor.playing = true;
        for &player in players {
            state.set_player(player, PlayerStatus::Playing(court));
        }
        debug!(court, ?players, "match started");
        Ok(())
    }

    /// Books a finished match: credits both teams, marks every teammate pair as partners,
    /// clears the court's seats and puts it back to FREE (unless it was disabled meanwhile).
    pub fn finish_match(&self, court: CourtId, home: &Team, away: &Team) -> anyhow::Result<Credits> {
        let credits = match_credits(home.sets_won(), away.sets_won()).with_context(|| {
            format!(
                "court {court:03}: match cannot end at {}-{}",
                home.sets_won(),
                away.sets_won()
            )
        })?;

        let mut state = self.state();
        let descriptor = state.court_mut(court)?;
        descriptor.occupants.clear();
        descriptor.playing = false;
        if descriptor.status != CourtStatus::Disabled {
            descriptor.status = CourtStatus::Free;
        }

        state.scores.credit(home.members(), credits.home);
        state.scores.credit(away.members(), credits.away);
        for (a, b) in home.partner_pairs().into_iter().chain(away.partner_pairs()) {
            state.partners.mark_played(a, b);
        }
        for &player in home.members().iter().chain(away.members()) {
            if state.players.get(player as usize) == Some(&PlayerStatus::Playing(court)) {
                state.set_player(player, PlayerStatus::Idle);
            }
        }
        state.matches_played += 1;
        drop(state);

        self.vacancy.notify_all();
        Ok(credits)
    }

    /// Administratively removes `court`. Returns false if it already was.
    pub fn disable_court(&self, court: CourtId) -> bool {
        let mut state = self.state();
        let Ok(descriptor) = state.court_mut(court) else {
            return false;
        };
        if descriptor.status == CourtStatus::Disabled {
            return false;
        }
        descriptor.status = CourtStatus::Disabled;
        drop(state);
        info!(court, "court disabled");
        self.vacancy.notify_all();
        true
    }

    /// Disables a court that died and hands back everyone holding a seat on it.
    pub fn fail_court(&self, court: CourtId) -> Vec<PlayerId> {
        let mut state = self.state();
        let Ok(descriptor) = state.court_mut(court) else {
            return vec![];
        };
        descriptor.status = CourtStatus::Disabled;
        descriptor.playing = false;
        let occupants = std::mem::take(&mut descriptor.occupants);
        for &player in &occupants {
            if !matches!(state.players.get(player as usize), Some(PlayerStatus::Left)) {
                state.set_player(player, PlayerStatus::Idle);
            }
        }
        drop(state);
        self.vacancy.notify_all();
        occupants
    }

    /// Every active player holds a seat in a lobby that cannot fill: nobody is left to arrive.
    pub fn lobby_stalled(&self) -> bool {
        let state = self.state();
        if state.active_players < PLAYERS_PER_MATCH {
            return false;
        }
        if state
            .courts
            .iter()
            .any(|c| c.playing || c.num_players() == PLAYERS_PER_MATCH)
        {
            return false;
        }
        let seated = state
            .players
            .iter()
            .filter(|p| matches!(p, PlayerStatus::Seated(_)))
            .count();
        seated > 0 && seated == state.active_players
    }

    /// Runs `f` with the partners table, under the registry lock.
    pub fn with_partners<R>(&self, f: impl FnOnce(&PartnersTable) -> R) -> R {
        f(&self.state().partners)
    }

    pub fn have_played(&self, a: PlayerId, b: PlayerId) -> bool {
        self.state().partners.have_played(a, b)
    }

    pub fn partners(&self) -> PartnersTable {
        self.state().partners.clone()
    }

    pub fn points(&self, player: PlayerId) -> u32 {
        self.state().scores.points(player)
    }

    pub fn standings(&self) -> Vec<(PlayerId, u32)> {
        self.state().scores.standings()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let state = self.state();
        RegistrySnapshot {
            courts: state.courts.clone(),
            players: state.players.clone(),
            active_players: state.active_players,
            matches_played: state.matches_played,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seat(admission: anyhow::Result<Admission>) -> (CourtId, usize) {
        match admission.unwrap() {
            Admission::Seat { court, seat } => (court, seat),
            other => panic!("expected a seat, got {other:?}"),
        }
    }

    fn team(members: &[PlayerId], sets: u8) -> Team {
        let mut team = Team::new();
        for &m in members {
            team.join(m);
        }
        for _ in 0..sets {
            team.win_set();
        }
        team
    }

    #[test]
    fn fullest_court_is_chosen_lowest_index_on_ties() {
        let registry = TournamentRegistry::new(8, 3);
        assert_eq!(seat(registry.reserve_seat(0)), (0, 0));
        assert_eq!(seat(registry.reserve_seat(1)), (0, 1));

        registry.disable_court(0);
        assert_eq!(seat(registry.reserve_seat(2)), (1, 0));
        assert_eq!(seat(registry.reserve_seat(3)), (1, 1));
    }

    #[test]
    fn fourth_seat_flips_busy_and_court_stops_admitting() {
        let registry = TournamentRegistry::new(8, 2);
        for p in 0..4 {
            assert_eq!(seat(registry.reserve_seat(p)), (0, p as usize));
        }
        assert_eq!(registry.court_status(0), Some(CourtStatus::Busy));
        assert_eq!(seat(registry.reserve_seat(4)), (1, 0));
    }

    #[test]
    fn releasing_a_seat_reopens_the_lobby() {
        let registry = TournamentRegistry::new(4, 1);
        for p in 0..4 {
            seat(registry.reserve_seat(p));
        }
        assert!(registry.release_seat(0, 3));
        assert!(!registry.release_seat(0, 3));
        assert_eq!(registry.court_status(0), Some(CourtStatus::Lobby));
        assert_eq!(registry.reserved_seats(0), 3);
        assert_eq!(registry.snapshot().players[3], PlayerStatus::Idle);
        assert_eq!(seat(registry.reserve_seat(3)), (0, 3));
    }

    #[test]
    fn full_courts_mean_wait() {
        let registry = TournamentRegistry::new(5, 1);
        for p in 0..4 {
            seat(registry.reserve_seat(p));
        }
        assert_eq!(registry.reserve_seat(4).unwrap(), Admission::Wait);
        // returns after the timeout even with nothing happening
        registry.wait_for_vacancy(Duration::from_millis(5));
    }

    #[test]
    fn seated_player_cannot_reserve_twice() {
        let registry = TournamentRegistry::new(4, 2);
        seat(registry.reserve_seat(0));
        assert!(registry.reserve_seat(0).is_err());
        assert!(registry.reserve_seat(17).is_err());
    }

    #[test]
    fn too_few_players_closes_admission() {
        let registry = TournamentRegistry::new(4, 1);
        assert!(registry.leave(3));
        assert!(!registry.leave(3));
        assert_eq!(registry.active_players(), 3);
        assert_eq!(
            registry.reserve_seat(0).unwrap(),
            Admission::Closed(Closure::WindDown)
        );
        assert_eq!(registry.open_lobby(0), Some(Closure::WindDown));
        assert_eq!(registry.closure(0), Some(Closure::WindDown));
    }

    #[test]
    fn disabled_courts_close_admission() {
        let registry = TournamentRegistry::new(4, 2);
        assert!(registry.disable_court(0));
        assert!(!registry.disable_court(0));
        assert_eq!(registry.open_lobby(0), Some(Closure::Disabled));
        assert_eq!(registry.open_lobby(1), None);
        assert_eq!(registry.court_status(1), Some(CourtStatus::Lobby));
        registry.disable_court(1);
        assert_eq!(
            registry.reserve_seat(0).unwrap(),
            Admission::Closed(Closure::Disabled)
        );
    }

    #[test]
    fn finishing_a_match_books_everything() {
        let registry = TournamentRegistry::new(4, 1);
        for p in 0..4 {
            seat(registry.reserve_seat(p));
        }
        registry.start_match(0, &[0, 1, 2, 3]).unwrap();
        assert_eq!(registry.snapshot().players[2], PlayerStatus::Playing(0));

        let credits = registry
            .finish_match(0, &team(&[0, 1], 3), &team(&[2, 3], 2))
            .unwrap();
        assert_eq!(credits, Credits { home: 2, away: 1 });
        assert_eq!(registry.points(0), 2);
        assert_eq!(registry.points(3), 1);
        assert!(registry.have_played(0, 1));
        assert!(registry.have_played(3, 2));
        assert!(!registry.have_played(0, 2));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.matches_played, 1);
        assert_eq!(snapshot.courts[0].status, CourtStatus::Free);
        assert!(snapshot.courts[0].occupants.is_empty());
        assert!(snapshot.players.iter().all(|p| *p == PlayerStatus::Idle));
    }

    #[test]
    fn unfinished_match_cannot_be_booked() {
        let registry = TournamentRegistry::new(4, 1);
        assert!(registry
            .finish_match(0, &team(&[0, 1], 2), &team(&[2, 3], 2))
            .is_err());
        assert_eq!(registry.matches_played(), 0);
    }

    #[test]
    fn disabled_during_match_stays_disabled() {
        let registry = TournamentRegistry::new(4, 1);
        for p in 0..4 {
            seat(registry.reserve_seat(p));
        }
        registry.start_match(0, &[0, 1, 2, 3]).unwrap();
        registry.disable_court(0);
        registry
            .finish_match(0, &team(&[0, 1], 0), &team(&[2, 3], 3))
            .unwrap();
        assert_eq!(registry.court_status(0), Some(CourtStatus::Disabled));
        assert_eq!(registry.open_lobby(0), Some(Closure::Disabled));
    }

    #[test]
    fn failed_court_hands_back_its_occupants() {
        let registry = TournamentRegistry::new(6, 2);
        seat(registry.reserve_seat(0));
        seat(registry.reserve_seat(1));
        assert_eq!(registry.fail_court(0), vec![0, 1]);
        assert_eq!(registry.court_status(0), Some(CourtStatus::Disabled));
        assert_eq!(seat(registry.reserve_seat(0)), (1, 0));
    }

    #[test]
    fn stalled_lobbies_are_detected() {
        let registry = TournamentRegistry::new(4, 2);
        seat(registry.reserve_seat(0));
        seat(registry.reserve_seat(1));
        seat(registry.reserve_seat(2));
        assert!(!registry.lobby_stalled());
        // the last player ends up alone on the other court
        registry.disable_court(0);
        seat(registry.reserve_seat(3));
        assert!(registry.lobby_stalled());
        registry.release_seat(1, 3);
        assert!(!registry.lobby_stalled());
    }

    #[test]
    fn leaving_while_seated_frees_the_seat() {
        let registry = TournamentRegistry::new(5, 1);
        seat(registry.reserve_seat(0));
        assert!(registry.leave(0));
        assert_eq!(registry.reserved_seats(0), 0);
        assert_eq!(registry.snapshot().players[0], PlayerStatus::Left);
    }

    #[test]
    fn leaving_a_full_lobby_reopens_it() {
        let registry = TournamentRegistry::new(6, 1);
        for p in 0..4 {
            seat(registry.reserve_seat(p));
        }
        assert_eq!(registry.court_status(0), Some(CourtStatus::Busy));
        assert_eq!(registry.reserve_seat(4).unwrap(), Admission::Wait);

        assert!(registry.leave(3));
        assert_eq!(registry.court_status(0), Some(CourtStatus::Lobby));
        assert_eq!(registry.snapshot().courts[0].occupants, vec![0, 1, 2]);
        assert_eq!(seat(registry.reserve_seat(4)), (0, 3));
    }

    #[test]
    fn leaving_a_playing_court_keeps_it_busy() {
        let registry = TournamentRegistry::new(6, 1);
        for p in 0..4 {
            seat(registry.reserve_seat(p));
        }
        registry.start_match(0, &[0, 1, 2, 3]).unwrap();
        assert!(registry.leave(3));
        assert_eq!(registry.court_status(0), Some(CourtStatus::Busy));
    }
}
