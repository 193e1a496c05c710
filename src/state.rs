use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One side of a match as handed over by the match-acquisition collaborator.
///
/// Text and odds fields are optional so a malformed record can be dropped by
/// the grouper instead of failing the whole batch at parse time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMatch {
    #[serde(default)]
    pub match_id: Option<String>,
    #[serde(default)]
    pub participant_name: Option<String>,
    #[serde(default)]
    pub opponent_name: Option<String>,
    #[serde(default)]
    pub odds_decimal: Option<f64>,
    #[serde(default)]
    pub opponent_odds_decimal: Option<f64>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub is_live: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Favorite,
    Underdog,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Favorite => write!(f, "FAV"),
            Side::Underdog => write!(f, "DOG"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pick {
    pub match_id: String,
    pub participant_name: String,
    pub odds_decimal: f64,
    pub side: Side,
}

/// A binary choice for one match. `favorite.odds_decimal <= underdog.odds_decimal`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchUnit {
    pub match_id: String,
    pub favorite: Pick,
    pub underdog: Pick,
}

impl MatchUnit {
    pub fn pick(&self, side: Side) -> &Pick {
        match side {
            Side::Favorite => &self.favorite,
            Side::Underdog => &self.underdog,
        }
    }
}

/// One pick per match, ordered by match id. This is what gets handed to the
/// wager-submission collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Combination {
    pub players: Vec<Pick>,
    pub key: String,
    pub favorite_count: usize,
    pub underdog_count: usize,
    pub potential_return: f64,
}

/// Why a session ran out of fresh combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExhaustedReason {
    /// Nothing survived grouping.
    NoMatches,
    /// Every valid combination has already been used.
    SpaceCovered,
    /// A full walk found nothing unused under the payout cap.
    NothingFresh,
    /// Every sampling retry came back empty.
    AttemptsSpent,
}

impl fmt::Display for ExhaustedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ExhaustedReason::NoMatches => "no usable matches",
            ExhaustedReason::SpaceCovered => "every valid combination already used",
            ExhaustedReason::NothingFresh => "no unused combination under the payout cap",
            ExhaustedReason::AttemptsSpent => "sampling retries found nothing new",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    #[default]
    Idle,
    Active,
    Exhausted,
}

/// Everything that lives for one betting session.
///
/// `used_keys` only grows while the session is active; `stop` discards it.
/// Callers embedding this in a concurrent host must serialize access, see
/// `selector::SessionHandle`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub used_keys: HashSet<String>,
    #[serde(default)]
    pub original_matches: Vec<RawMatch>,
    #[serde(default)]
    pub target_favorites: Option<usize>,
    #[serde(default)]
    pub target_underdogs: Option<usize>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub accepted: usize,
    #[serde(default)]
    pub exhausted_reason: Option<ExhaustedReason>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(
        &mut self,
        matches: Vec<RawMatch>,
        target_favorites: Option<usize>,
        target_underdogs: Option<usize>,
    ) {
        self.phase = SessionPhase::Active;
        self.used_keys.clear();
        self.original_matches = matches;
        self.target_favorites = target_favorites;
        self.target_underdogs = target_underdogs;
        self.started_at = Some(Utc::now());
        self.accepted = 0;
        self.exhausted_reason = None;
    }

    /// Seeds the dedup set from an external store after `start`.
    pub fn restore_keys<I>(&mut self, keys: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.used_keys.extend(keys);
    }

    pub fn stop(&mut self) {
        *self = Self::default();
    }

    pub fn is_active(&self) -> bool {
        self.phase == SessionPhase::Active
    }

    pub fn is_exhausted(&self) -> bool {
        self.phase == SessionPhase::Exhausted
    }

    pub(crate) fn register(&mut self, key: String) -> bool {
        let inserted = self.used_keys.insert(key);
        if inserted {
            self.accepted += 1;
        }
        inserted
    }

    pub(crate) fn mark_exhausted(&mut self, reason: ExhaustedReason) {
        if self.phase == SessionPhase::Active {
            self.phase = SessionPhase::Exhausted;
            self.exhausted_reason = Some(reason);
        }
    }
}
