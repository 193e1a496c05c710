use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info};

use crate::engine::{CombinationEngine, GenerateRequest, GenerationStatus, Strategy};
use crate::error::{ErrorKind, PickerError, Result};
use crate::grouper::group_matches;
use crate::state::{Combination, ExhaustedReason, MatchUnit, RawMatch, SessionPhase, SessionState};

pub const DEFAULT_MAX_ATTEMPTS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Picked(Combination),
    Exhausted(ExhaustedReason),
}

impl Selection {
    pub fn combination(&self) -> Option<&Combination> {
        match self {
            Selection::Picked(combo) => Some(combo),
            Selection::Exhausted(_) => None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Selection::Exhausted(_))
    }

    /// `Some(ExpectedEnd)` when the session has run dry.
    pub fn kind(&self) -> Option<ErrorKind> {
        self.is_exhausted().then_some(ErrorKind::ExpectedEnd)
    }
}

/// Hands out one previously unused combination per call.
pub struct SessionSelector {
    engine: CombinationEngine,
    max_attempts: usize,
}

impl SessionSelector {
    pub fn new(engine: CombinationEngine, max_attempts: usize) -> Self {
        Self {
            engine,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn engine(&self) -> &CombinationEngine {
        &self.engine
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Picks the next fresh combination and registers its key in `session`
    /// before returning it.
    ///
    /// Per-call targets override the ones the session was started with.
    /// Only key collisions and empty sampling rounds are retried; every
    /// error propagates on first sight.
    pub fn pick_next(
        &mut self,
        units: &[MatchUnit],
        stake: f64,
        session: &mut SessionState,
        target_favorites: Option<usize>,
        target_underdogs: Option<usize>,
    ) -> Result<Selection> {
        match session.phase {
            SessionPhase::Idle => return Err(PickerError::SessionNotActive),
            SessionPhase::Exhausted => {
                let reason = session
                    .exhausted_reason
                    .unwrap_or(ExhaustedReason::SpaceCovered);
                return Ok(Selection::Exhausted(reason));
            }
            SessionPhase::Active => {}
        }

        let favorites = target_favorites.or(session.target_favorites);
        let underdogs = target_underdogs.or(session.target_underdogs);

        for attempt in 1..=self.max_attempts {
            let request = GenerateRequest {
                units,
                stake,
                previous_keys: &session.used_keys,
                max_combinations: 1,
                target_favorites: favorites,
                target_underdogs: underdogs,
            };
            let generation = self.engine.generate(&request)?;
            if generation.status == GenerationStatus::EmptyInput {
                return Ok(exhaust(session, ExhaustedReason::NoMatches));
            }

            let stats = generation.stats;
            if let Some(combo) = generation.combinations.into_iter().next() {
                if session.register(combo.key.clone()) {
                    debug!(
                        attempt,
                        key = %combo.key,
                        favorites = combo.favorite_count,
                        underdogs = combo.underdog_count,
                        potential_return = combo.potential_return,
                        "combination accepted"
                    );
                    return Ok(Selection::Picked(combo));
                }
                debug!(attempt, key = %combo.key, "combination key already used, retrying");
                continue;
            }

            if stats.valid_possible_combinations <= session.used_keys.len() as u128 {
                return Ok(exhaust(session, ExhaustedReason::SpaceCovered));
            }
            if generation.strategy == Some(Strategy::Exhaustive) {
                return Ok(exhaust(session, ExhaustedReason::NothingFresh));
            }
            debug!(attempt, "sampling found nothing fresh, retrying");
        }

        Ok(exhaust(session, ExhaustedReason::AttemptsSpent))
    }

    /// `pick_next` over the matches the session was started with.
    pub fn pick_for_session(&mut self, stake: f64, session: &mut SessionState) -> Result<Selection> {
        let units = group_matches(&session.original_matches).ordered_units();
        self.pick_next(&units, stake, session, None, None)
    }
}

fn exhaust(session: &mut SessionState, reason: ExhaustedReason) -> Selection {
    session.mark_exhausted(reason);
    info!(%reason, accepted = session.accepted, used = session.used_keys.len(), "session exhausted");
    Selection::Exhausted(reason)
}

/// Single-writer access to a `SessionState` shared across threads.
///
/// The lock is held from generation through key registration, so two
/// callers can never claim the same key.
#[derive(Debug, Default)]
pub struct SessionHandle {
    inner: Mutex<SessionState>,
}

impl SessionHandle {
    pub fn new(state: SessionState) -> Self {
        Self {
            inner: Mutex::new(state),
        }
    }

    pub fn start(
        &self,
        matches: Vec<RawMatch>,
        target_favorites: Option<usize>,
        target_underdogs: Option<usize>,
    ) -> Result<()> {
        self.lock()?.start(matches, target_favorites, target_underdogs);
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        self.lock()?.stop();
        Ok(())
    }

    pub fn snapshot(&self) -> Result<SessionState> {
        Ok(self.lock()?.clone())
    }

    pub fn pick_next(
        &self,
        selector: &mut SessionSelector,
        units: &[MatchUnit],
        stake: f64,
        target_favorites: Option<usize>,
        target_underdogs: Option<usize>,
    ) -> Result<Selection> {
        let mut session = self.lock()?;
        selector.pick_next(units, stake, &mut session, target_favorites, target_underdogs)
    }

    fn lock(&self) -> Result<MutexGuard<'_, SessionState>> {
        self.inner.lock().map_err(|_| PickerError::SessionPoisoned)
    }
}
