use std::borrow::Cow;
use std::collections::HashSet;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::DEFAULT_PAYOUT_CAP;
use crate::error::{PickerError, Result};
use crate::state::{Combination, MatchUnit, Pick, Side};

/// Largest match count that is walked exhaustively by default.
pub const EXHAUSTIVE_MAX_MATCHES: usize = 30;
/// Upper bound on shuffles per call for the sampled strategy.
pub const SAMPLE_BUDGET: usize = 10_000;
/// Share of units that contribute their favorite when no split is requested.
pub const DEFAULT_FAVORITE_SHARE: f64 = 0.6;
pub const KEY_DELIMITER: &str = "|";
pub const DEFAULT_MAX_COMBINATIONS: usize = 100;

// Pick masks are u64; bit 63 stays free so the Gosper step cannot overflow.
const MAX_MASK_BITS: usize = 63;

/// Binomial coefficient `C(n, k)` by the multiplicative method.
///
/// Exact while the running product fits a `u128`; past that the same product
/// is taken in `f64` and rounded, saturating at `u128::MAX`.
pub fn binomial(n: u64, k: u64) -> u128 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    if k == 0 {
        return 1;
    }

    let mut exact: Option<u128> = Some(1);
    for i in 1..=k {
        // After step i the value is C(n - k + i, i), so the division is exact.
        exact = exact
            .and_then(|r| r.checked_mul(u128::from(n - k + i)))
            .map(|r| r / u128::from(i));
        if exact.is_none() {
            break;
        }
    }
    exact.unwrap_or_else(|| binomial_approx(n, k))
}

fn binomial_approx(n: u64, k: u64) -> u128 {
    let mut result = 1.0_f64;
    for i in 1..=k {
        result *= (n - k + i) as f64;
        result /= i as f64;
    }
    // Float-to-int casts saturate, including for infinity.
    result.round() as u128
}

/// `2^n` combinations ignoring the split, saturating.
pub fn total_combinations(n: usize) -> u128 {
    u32::try_from(n)
        .ok()
        .and_then(|bits| 1u128.checked_shl(bits))
        .unwrap_or(u128::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum SplitAdjustment {
    /// Neither side was usable; the 60/40 default was applied.
    Defaulted,
    /// Counts did not sum to the match count and were scaled to fit.
    Rescaled {
        requested_favorites: usize,
        requested_underdogs: usize,
    },
    /// A count exceeded the match count and was clamped.
    Clamped {
        requested_favorites: Option<usize>,
        requested_underdogs: Option<usize>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSplit {
    pub favorites: usize,
    pub underdogs: usize,
    pub adjustment: Option<SplitAdjustment>,
}

impl TargetSplit {
    fn exact(favorites: usize, underdogs: usize) -> Self {
        Self {
            favorites,
            underdogs,
            adjustment: None,
        }
    }

    fn adjusted(favorites: usize, underdogs: usize, adjustment: SplitAdjustment) -> Self {
        Self {
            favorites,
            underdogs,
            adjustment: Some(adjustment),
        }
    }
}

/// Default 60/40 favorite split, never putting every unit on one side
/// when there is more than one unit.
pub fn default_split(n: usize) -> TargetSplit {
    let mut favorites = ((n as f64) * DEFAULT_FAVORITE_SHARE).round() as usize;
    favorites = favorites.min(n);
    if n > 1 {
        if favorites == n {
            favorites = n - 1;
        } else if favorites == 0 {
            favorites = 1;
        }
    }
    TargetSplit::exact(favorites, n - favorites)
}

/// Reconciles requested favorite/underdog counts with `n` units.
///
/// Never fails: mismatches are rescaled, impossible counts clamped, and the
/// repair is recorded on the result and logged.
pub fn resolve_split(
    n: usize,
    favorites: Option<usize>,
    underdogs: Option<usize>,
) -> TargetSplit {
    let split = match (favorites, underdogs) {
        (None, None) => default_split(n),
        (Some(f), None) if f > n => TargetSplit::adjusted(
            n,
            0,
            SplitAdjustment::Clamped {
                requested_favorites: favorites,
                requested_underdogs: None,
            },
        ),
        (Some(f), None) => TargetSplit::exact(f, n - f),
        (None, Some(d)) if d > n => TargetSplit::adjusted(
            0,
            n,
            SplitAdjustment::Clamped {
                requested_favorites: None,
                requested_underdogs: underdogs,
            },
        ),
        (None, Some(d)) => TargetSplit::exact(n - d, d),
        (Some(f), Some(d)) => reconcile_pair(n, f, d),
    };

    if let Some(adjustment) = split.adjustment {
        warn!(
            matches = n,
            requested_favorites = ?favorites,
            requested_underdogs = ?underdogs,
            favorites = split.favorites,
            underdogs = split.underdogs,
            ?adjustment,
            "favorite/underdog split adjusted"
        );
    }
    split
}

fn reconcile_pair(n: usize, f: usize, d: usize) -> TargetSplit {
    let clamped = SplitAdjustment::Clamped {
        requested_favorites: Some(f),
        requested_underdogs: Some(d),
    };
    if f > n {
        return TargetSplit::adjusted(n, 0, clamped);
    }
    if d > n {
        return TargetSplit::adjusted(0, n, clamped);
    }
    let sum = f + d;
    if sum == n {
        return TargetSplit::exact(f, d);
    }
    if sum == 0 {
        let base = default_split(n);
        return TargetSplit::adjusted(base.favorites, base.underdogs, SplitAdjustment::Defaulted);
    }
    let scaled = ((f as f64) * (n as f64) / (sum as f64)).round() as usize;
    let favorites = scaled.min(n);
    TargetSplit::adjusted(
        favorites,
        n - favorites,
        SplitAdjustment::Rescaled {
            requested_favorites: f,
            requested_underdogs: d,
        },
    )
}

/// Canonical dedup identity: picks sorted by match id, joined as
/// `match_id:participant_name` with `|`.
///
/// Picks without a match id are left out of the key. A selection with no
/// usable pick at all is an `InvalidSelection`.
pub fn combination_key(picks: &[Pick]) -> Result<String> {
    let mut usable: Vec<&Pick> = Vec::with_capacity(picks.len());
    for pick in picks {
        if pick.match_id.trim().is_empty() {
            warn!(participant = %pick.participant_name, "pick without match id left out of key");
            continue;
        }
        usable.push(pick);
    }
    if usable.is_empty() {
        return Err(PickerError::InvalidSelection);
    }

    usable.sort_by(|a, b| {
        a.match_id
            .cmp(&b.match_id)
            .then_with(|| a.participant_name.cmp(&b.participant_name))
    });
    Ok(usable
        .iter()
        .map(|p| {
            format!(
                "{}:{}",
                escape_key_part(&p.match_id),
                escape_key_part(&p.participant_name)
            )
        })
        .collect::<Vec<_>>()
        .join(KEY_DELIMITER))
}

/// Backslash-escapes the key delimiters so distinct selections never share
/// a key. Plain ids and names pass through unchanged.
fn escape_key_part(part: &str) -> Cow<'_, str> {
    if !part.contains(['\\', ':', '|']) {
        return Cow::Borrowed(part);
    }
    let mut escaped = String::with_capacity(part.len() + 4);
    for ch in part.chars() {
        if matches!(ch, '\\' | ':' | '|') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    Cow::Owned(escaped)
}

/// Single-bets payout: every pick is staked separately, so returns add up.
pub fn potential_return(picks: &[Pick], stake: f64) -> f64 {
    picks.iter().map(|p| stake * p.odds_decimal).sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Every pick mask with the target split, each exactly once.
    Exhaustive,
    /// Bounded random shuffles; may repeat or miss combinations.
    Sampled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GenerationStatus {
    /// No match units to combine.
    EmptyInput,
    /// The requested number of combinations was produced.
    Complete,
    /// Some combinations were produced, fewer than requested.
    Partial,
    /// Nothing new passed the filters.
    Exhausted,
}

/// Informational counts. For `Strategy::Sampled` the remaining count is
/// approximate: it assumes every unseen mask is still reachable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationStats {
    pub total_matches: usize,
    pub total_possible_combinations: u128,
    pub valid_possible_combinations: u128,
    pub combinations_generated: usize,
    pub previously_used_combinations: usize,
    pub remaining_combinations: u128,
    pub rejected_over_cap: usize,
    pub rejected_duplicate: usize,
    pub attempts: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Generation {
    pub combinations: Vec<Combination>,
    pub stats: GenerationStats,
    pub split: TargetSplit,
    pub strategy: Option<Strategy>,
    pub status: GenerationStatus,
}

impl Generation {
    fn empty_input() -> Self {
        Self {
            combinations: Vec::new(),
            stats: GenerationStats::default(),
            split: TargetSplit::exact(0, 0),
            strategy: None,
            status: GenerationStatus::EmptyInput,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerateRequest<'a> {
    pub units: &'a [MatchUnit],
    pub stake: f64,
    pub previous_keys: &'a HashSet<String>,
    pub max_combinations: usize,
    pub target_favorites: Option<usize>,
    pub target_underdogs: Option<usize>,
}

impl<'a> GenerateRequest<'a> {
    pub fn new(units: &'a [MatchUnit], stake: f64, previous_keys: &'a HashSet<String>) -> Self {
        Self {
            units,
            stake,
            previous_keys,
            max_combinations: DEFAULT_MAX_COMBINATIONS,
            target_favorites: None,
            target_underdogs: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub payout_cap: f64,
    pub exhaustive_threshold: usize,
    pub sample_budget: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            payout_cap: DEFAULT_PAYOUT_CAP,
            exhaustive_threshold: EXHAUSTIVE_MAX_MATCHES,
            sample_budget: SAMPLE_BUDGET,
        }
    }
}

impl EngineConfig {
    pub fn strategy_for(&self, n: usize) -> Strategy {
        if n <= self.exhaustive_threshold.min(MAX_MASK_BITS) {
            Strategy::Exhaustive
        } else {
            Strategy::Sampled
        }
    }
}

pub struct CombinationEngine {
    config: EngineConfig,
    rng: StdRng,
}

impl CombinationEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic sampling, for tests and replays.
    pub fn with_seed(config: EngineConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn generate(&mut self, request: &GenerateRequest<'_>) -> Result<Generation> {
        if !(request.stake.is_finite() && request.stake > 0.0) {
            return Err(PickerError::InvalidConfig(format!(
                "stake must be a positive number, got {}",
                request.stake
            )));
        }
        let cap = self.config.payout_cap;
        if !(cap.is_finite() && cap > 0.0) {
            return Err(PickerError::InvalidConfig(format!(
                "payout cap must be a positive number, got {cap}"
            )));
        }

        let units = ordered_units(request.units);
        let n = units.len();
        if n == 0 {
            return Ok(Generation::empty_input());
        }

        let split = resolve_split(n, request.target_favorites, request.target_underdogs);
        let strategy = self.config.strategy_for(n);
        let valid = binomial(n as u64, split.favorites as u64);
        debug!(
            matches = n,
            ?strategy,
            favorites = split.favorites,
            underdogs = split.underdogs,
            valid = %valid,
            previous = request.previous_keys.len(),
            "generating combinations"
        );

        let mut sink = Sink::new(request, self.config.payout_cap);
        let payouts = PayoutTable::new(&units, request.stake);
        let cheapest = payouts.cheapest(split.underdogs);
        if request.max_combinations > 0 && sink.clearly_over_cap(cheapest) {
            debug!(
                cheapest,
                payout_cap = self.config.payout_cap,
                "no selection with this split fits under the payout cap"
            );
            sink.rejected_over_cap = usize::try_from(valid).unwrap_or(usize::MAX);
        } else if request.max_combinations > 0 {
            match strategy {
                Strategy::Exhaustive => enumerate(&units, split, &payouts, &mut sink)?,
                Strategy::Sampled => {
                    let attempts = valid.min(self.config.sample_budget as u128) as usize;
                    sample(&units, split, attempts, &payouts, &mut self.rng, &mut sink)?
                }
            }
        }

        let generated = sink.accepted.len();
        let status = if request.max_combinations == 0 || generated == request.max_combinations {
            GenerationStatus::Complete
        } else if generated > 0 {
            GenerationStatus::Partial
        } else {
            GenerationStatus::Exhausted
        };
        let claimed = (request.previous_keys.len() + sink.seen.len()) as u128;
        let stats = GenerationStats {
            total_matches: n,
            total_possible_combinations: total_combinations(n),
            valid_possible_combinations: valid,
            combinations_generated: generated,
            previously_used_combinations: request.previous_keys.len(),
            remaining_combinations: valid.saturating_sub(claimed),
            rejected_over_cap: sink.rejected_over_cap,
            rejected_duplicate: sink.rejected_duplicate,
            attempts: sink.attempts,
        };

        Ok(Generation {
            combinations: sink.accepted,
            stats,
            split,
            strategy: Some(strategy),
            status,
        })
    }
}

fn ordered_units(units: &[MatchUnit]) -> Vec<&MatchUnit> {
    let mut ordered: Vec<&MatchUnit> = units.iter().collect();
    ordered.sort_by(|a, b| a.match_id.cmp(&b.match_id));
    let before = ordered.len();
    ordered.dedup_by(|a, b| a.match_id == b.match_id);
    if ordered.len() != before {
        warn!(
            duplicates = before - ordered.len(),
            "duplicate match ids in engine input, keeping first"
        );
    }
    ordered
}

/// Stake-scaled return of the all-favorite selection plus the change each
/// unit adds when it flips to its underdog.
struct PayoutTable {
    base: f64,
    flips: Vec<f64>,
}

impl PayoutTable {
    fn new(units: &[&MatchUnit], stake: f64) -> Self {
        let base = units.iter().map(|u| stake * u.favorite.odds_decimal).sum();
        let flips = units
            .iter()
            .map(|u| stake * (u.underdog.odds_decimal - u.favorite.odds_decimal))
            .collect();
        Self { base, flips }
    }

    fn for_mask(&self, mask: u64) -> f64 {
        let mut total = self.base;
        let mut rest = mask;
        while rest != 0 {
            total += self.flips[rest.trailing_zeros() as usize];
            rest &= rest - 1;
        }
        total
    }

    fn for_sides(&self, sides: &[Side]) -> f64 {
        self.flips
            .iter()
            .zip(sides)
            .filter(|(_, side)| **side == Side::Underdog)
            .fold(self.base, |total, (flip, _)| total + flip)
    }

    /// Lowest return any selection with `underdogs` flips can reach.
    fn cheapest(&self, underdogs: usize) -> f64 {
        let mut flips = self.flips.clone();
        flips.sort_by(f64::total_cmp);
        self.base + flips.iter().take(underdogs).sum::<f64>()
    }
}

/// Filters candidates and collects the accepted ones.
struct Sink<'a> {
    previous_keys: &'a HashSet<String>,
    seen: HashSet<String>,
    accepted: Vec<Combination>,
    stake: f64,
    payout_cap: f64,
    // Covers rounding between a table estimate and the exact per-pick sum.
    cap_slack: f64,
    max: usize,
    rejected_over_cap: usize,
    rejected_duplicate: usize,
    attempts: usize,
}

impl<'a> Sink<'a> {
    fn new(request: &GenerateRequest<'a>, payout_cap: f64) -> Self {
        Self {
            previous_keys: request.previous_keys,
            seen: HashSet::new(),
            accepted: Vec::new(),
            stake: request.stake,
            payout_cap,
            cap_slack: payout_cap.abs() * 1e-9,
            max: request.max_combinations,
            rejected_over_cap: 0,
            rejected_duplicate: 0,
            attempts: 0,
        }
    }

    fn clearly_over_cap(&self, estimate: f64) -> bool {
        estimate > self.payout_cap + self.cap_slack
    }

    /// Picks are only materialized once `estimate` clears the cap.
    /// Returns `true` once the requested count is reached.
    fn offer(&mut self, estimate: f64, build: impl FnOnce() -> Vec<Pick>) -> Result<bool> {
        self.attempts += 1;
        if self.clearly_over_cap(estimate) {
            self.rejected_over_cap += 1;
            return Ok(false);
        }
        let players = build();
        let potential_return = potential_return(&players, self.stake);
        if potential_return > self.payout_cap {
            self.rejected_over_cap += 1;
            return Ok(false);
        }
        let key = combination_key(&players)?;
        if self.previous_keys.contains(&key) || self.seen.contains(&key) {
            self.rejected_duplicate += 1;
            return Ok(false);
        }

        let favorite_count = players.iter().filter(|p| p.side == Side::Favorite).count();
        let underdog_count = players.len() - favorite_count;
        self.seen.insert(key.clone());
        self.accepted.push(Combination {
            players,
            key,
            favorite_count,
            underdog_count,
            potential_return,
        });
        Ok(self.accepted.len() >= self.max)
    }
}

fn enumerate(
    units: &[&MatchUnit],
    split: TargetSplit,
    payouts: &PayoutTable,
    sink: &mut Sink<'_>,
) -> Result<()> {
    for mask in MaskWalk::new(units.len(), split.underdogs) {
        let build = || {
            units
                .iter()
                .enumerate()
                .map(|(j, unit)| {
                    let side = if mask & (1u64 << j) == 0 {
                        Side::Favorite
                    } else {
                        Side::Underdog
                    };
                    unit.pick(side).clone()
                })
                .collect()
        };
        if sink.offer(payouts.for_mask(mask), build)? {
            break;
        }
    }
    Ok(())
}

fn sample(
    units: &[&MatchUnit],
    split: TargetSplit,
    attempts: usize,
    payouts: &PayoutTable,
    rng: &mut StdRng,
    sink: &mut Sink<'_>,
) -> Result<()> {
    let n = units.len();
    let mut order: Vec<usize> = (0..n).collect();
    let mut sides = vec![Side::Underdog; n];
    for _ in 0..attempts {
        order.shuffle(rng);
        for (rank, &idx) in order.iter().enumerate() {
            sides[idx] = if rank < split.favorites {
                Side::Favorite
            } else {
                Side::Underdog
            };
        }
        let build = || {
            units
                .iter()
                .zip(&sides)
                .map(|(unit, &side)| unit.pick(side).clone())
                .collect()
        };
        if sink.offer(payouts.for_sides(&sides), build)? {
            break;
        }
    }
    Ok(())
}

/// Ascending walk over the `n`-bit masks with exactly `ones` bits set.
///
/// Yields the same sequence as filtering `0..2^n` by popcount, without
/// visiting the rejected masks.
struct MaskWalk {
    next: Option<u64>,
    limit: u64,
}

impl MaskWalk {
    fn new(n: usize, ones: usize) -> Self {
        let n = n.min(MAX_MASK_BITS);
        let next = if ones > n {
            None
        } else {
            Some((1u64 << ones) - 1)
        };
        Self {
            next,
            limit: 1u64 << n,
        }
    }
}

impl Iterator for MaskWalk {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let mask = self.next?;
        self.next = if mask == 0 {
            None
        } else {
            // Gosper's hack: next larger integer with the same popcount.
            let low = mask & mask.wrapping_neg();
            let ripple = mask + low;
            let following = (((ripple ^ mask) >> 2) / low) | ripple;
            (following < self.limit).then_some(following)
        };
        Some(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pick(match_id: &str, name: &str, odds: f64, side: Side) -> Pick {
        Pick {
            match_id: match_id.to_string(),
            participant_name: name.to_string(),
            odds_decimal: odds,
            side,
        }
    }

    #[test]
    fn binomial_edges_and_symmetry() {
        assert_eq!(binomial(5, 3), 10);
        assert_eq!(binomial(7, 0), 1);
        assert_eq!(binomial(7, 7), 1);
        assert_eq!(binomial(3, 4), 0);
        assert_eq!(binomial(0, 0), 1);
        for n in 0..=40u64 {
            for k in 0..=n {
                assert_eq!(binomial(n, k), binomial(n, n - k), "C({n},{k})");
            }
        }
        assert_eq!(binomial(30, 15), 155_117_520);
        assert_eq!(binomial(60, 30), 118_264_581_564_861_424);
    }

    #[test]
    fn binomial_matches_pascal_rule() {
        for n in 1..=60u64 {
            for k in 1..n {
                assert_eq!(binomial(n, k), binomial(n - 1, k - 1) + binomial(n - 1, k));
            }
        }
    }

    #[test]
    fn binomial_saturates_instead_of_overflowing() {
        assert_eq!(binomial(2000, 1000), u128::MAX);
        assert!(binomial(130, 65) > 0);
    }

    #[test]
    fn total_combinations_saturates() {
        assert_eq!(total_combinations(0), 1);
        assert_eq!(total_combinations(10), 1024);
        assert_eq!(total_combinations(200), u128::MAX);
    }

    #[test]
    fn mask_walk_counts_match_binomial() {
        for n in 0..=12usize {
            for ones in 0..=n {
                let masks: Vec<u64> = MaskWalk::new(n, ones).collect();
                assert_eq!(masks.len() as u128, binomial(n as u64, ones as u64));
                assert!(masks.windows(2).all(|w| w[0] < w[1]));
                assert!(masks.iter().all(|m| m.count_ones() as usize == ones));
            }
        }
        assert_eq!(MaskWalk::new(3, 4).count(), 0);
    }

    #[test]
    fn default_split_is_sixty_forty_with_minority_floor() {
        assert_eq!(default_split(5), TargetSplit::exact(3, 2));
        assert_eq!(default_split(10), TargetSplit::exact(6, 4));
        assert_eq!(default_split(2), TargetSplit::exact(1, 1));
        assert_eq!(default_split(1), TargetSplit::exact(1, 0));
        assert_eq!(default_split(0), TargetSplit::exact(0, 0));
    }

    #[test]
    fn resolve_split_derives_missing_side() {
        assert_eq!(resolve_split(6, Some(4), None), TargetSplit::exact(4, 2));
        assert_eq!(resolve_split(6, None, Some(1)), TargetSplit::exact(5, 1));
        assert_eq!(resolve_split(6, Some(2), Some(4)), TargetSplit::exact(2, 4));
    }

    #[test]
    fn resolve_split_rescales_mismatched_sums() {
        let split = resolve_split(10, Some(3), Some(2));
        assert_eq!((split.favorites, split.underdogs), (6, 4));
        assert!(matches!(split.adjustment, Some(SplitAdjustment::Rescaled { .. })));
    }

    #[test]
    fn resolve_split_clamps_impossible_counts() {
        let split = resolve_split(4, Some(9), Some(1));
        assert_eq!((split.favorites, split.underdogs), (4, 0));
        assert!(matches!(split.adjustment, Some(SplitAdjustment::Clamped { .. })));

        let split = resolve_split(4, None, Some(7));
        assert_eq!((split.favorites, split.underdogs), (0, 4));

        let split = resolve_split(4, Some(0), Some(0));
        assert_eq!((split.favorites, split.underdogs), (2, 2));
        assert_eq!(split.adjustment, Some(SplitAdjustment::Defaulted));
    }

    #[test]
    fn key_is_order_independent() {
        let a = pick("m2", "Bravo", 2.5, Side::Underdog);
        let b = pick("m1", "Alpha", 1.5, Side::Favorite);
        let c = pick("m3", "Charlie", 1.8, Side::Favorite);
        let k1 = combination_key(&[a.clone(), b.clone(), c.clone()]).unwrap();
        let k2 = combination_key(&[c, a, b]).unwrap();
        assert_eq!(k1, k2);
        assert_eq!(k1, "m1:Alpha|m2:Bravo|m3:Charlie");
    }

    #[test]
    fn key_skips_picks_without_match_id() {
        let picks = [
            pick("", "Ghost", 1.9, Side::Favorite),
            pick("m1", "Alpha", 1.5, Side::Favorite),
        ];
        assert_eq!(combination_key(&picks).unwrap(), "m1:Alpha");

        let only_bad = [pick("  ", "Ghost", 1.9, Side::Favorite)];
        assert_eq!(combination_key(&only_bad), Err(PickerError::InvalidSelection));
        assert_eq!(combination_key(&[]), Err(PickerError::InvalidSelection));
    }

    #[test]
    fn delimiters_inside_names_do_not_merge_keys() {
        // Unescaped, both selections would read "a:x|b:z|b:w".
        let first = [
            pick("a", "x|b:z", 1.5, Side::Favorite),
            pick("b", "w", 2.5, Side::Underdog),
        ];
        let second = [
            pick("a", "x", 2.5, Side::Underdog),
            pick("b", "z|b:w", 1.5, Side::Favorite),
        ];
        let k1 = combination_key(&first).unwrap();
        let k2 = combination_key(&second).unwrap();
        assert_ne!(k1, k2);
        assert_eq!(k1, r"a:x\|b\:z|b:w");
        assert_eq!(k2, r"a:x|b:z\|b\:w");
        assert_eq!(
            combination_key(&[pick("m1", r"back\slash", 1.5, Side::Favorite)]).unwrap(),
            r"m1:back\\slash"
        );
    }

    #[test]
    fn payout_table_agrees_with_per_pick_sum() {
        let units: Vec<MatchUnit> = [("m1", 1.5, 4.0), ("m2", 1.2, 7.5), ("m3", 2.1, 1.9)]
            .iter()
            .map(|&(id, fav, dog)| MatchUnit {
                match_id: id.to_string(),
                favorite: pick(id, "F", fav, Side::Favorite),
                underdog: pick(id, "D", dog, Side::Underdog),
            })
            .collect();
        let refs: Vec<&MatchUnit> = units.iter().collect();
        let table = PayoutTable::new(&refs, 10.0);

        // Bit 1 flips m2 to its underdog.
        let picks = [units[0].favorite.clone(), units[1].underdog.clone(), units[2].favorite.clone()];
        let exact = potential_return(&picks, 10.0);
        assert!((table.for_mask(0b010) - exact).abs() < 1e-9);
        let sides = [Side::Favorite, Side::Underdog, Side::Favorite];
        assert!((table.for_sides(&sides) - exact).abs() < 1e-9);

        // Cheapest single flip is m3 (1.9 - 2.1), cheapest pair adds m1.
        assert!((table.cheapest(1) - (48.0 - 2.0)).abs() < 1e-9);
        assert!((table.cheapest(2) - (48.0 - 2.0 + 25.0)).abs() < 1e-9);
    }

    #[test]
    fn potential_return_is_additive() {
        let picks = [
            pick("m1", "A", 1.5, Side::Favorite),
            pick("m2", "B", 2.0, Side::Underdog),
        ];
        assert!((potential_return(&picks, 10.0) - 35.0).abs() < 1e-9);
    }

    #[test]
    fn strategy_switches_above_threshold() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.strategy_for(30), Strategy::Exhaustive);
        assert_eq!(cfg.strategy_for(31), Strategy::Sampled);

        let wide = EngineConfig {
            exhaustive_threshold: 500,
            ..EngineConfig::default()
        };
        assert_eq!(wide.strategy_for(64), Strategy::Sampled);
    }
}
