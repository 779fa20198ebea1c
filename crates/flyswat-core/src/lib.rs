pub mod leaderboard;
pub mod net;
pub mod session;
pub mod target;
pub mod time;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::leaderboard::{EntryId, LeaderboardEntry, NewEntry};
    use crate::session::{Session, SessionConfig, SessionEvent, SessionResult};
    use crate::target::Target;

    /// Deterministic RNG for spawn tests.
    pub fn seeded_rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    /// Session config with a short countdown and default cadence.
    pub fn short_session_config(duration_secs: u32) -> SessionConfig {
        SessionConfig {
            duration_secs,
            ..SessionConfig::default()
        }
    }

    /// A session already in the `Running` phase.
    pub fn running_session(config: SessionConfig) -> Session {
        let mut session = Session::new(config);
        session.start();
        session
    }

    /// Call `spawn` `n` times, returning the targets that were created.
    pub fn spawn_n(session: &mut Session, rng: &mut StdRng, n: usize) -> Vec<Target> {
        (0..n).filter_map(|_| session.spawn(rng)).collect()
    }

    /// Run `n` ticks, returning all accumulated events.
    pub fn run_ticks(session: &mut Session, n: usize) -> Vec<SessionEvent> {
        let mut all_events = Vec::new();
        for _ in 0..n {
            all_events.extend(session.tick());
        }
        all_events
    }

    /// Every `Ended` result in an event list.
    pub fn ended_results(events: &[SessionEvent]) -> Vec<SessionResult> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Ended(r) => Some(*r),
                _ => None,
            })
            .collect()
    }

    /// A validated submission with the given name, score and timestamp.
    pub fn make_new_entry(name: &str, score: u32, created_at_ms: u64) -> NewEntry {
        NewEntry {
            name: name.to_string(),
            score,
            created_at_ms,
        }
    }

    /// A stored entry with a generated name.
    pub fn make_entry(id: EntryId, score: u32, created_at_ms: u64) -> LeaderboardEntry {
        make_new_entry(&format!("Player{id}"), score, created_at_ms).into_entry(id)
    }
}
