use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, info};

use crate::state::{MatchUnit, Pick, RawMatch, Side};

/// Odds assumed when a side arrives without usable odds.
pub const DEFAULT_ODDS: f64 = 2.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupReport {
    pub live: usize,
    pub malformed: usize,
}

impl GroupReport {
    pub fn dropped(&self) -> usize {
        self.live + self.malformed
    }
}

#[derive(Debug, Clone, Default)]
pub struct GroupedMatches {
    pub units: BTreeMap<String, MatchUnit>,
    pub report: GroupReport,
}

impl GroupedMatches {
    /// Units in match-id order, the order the engine indexes them in.
    pub fn ordered_units(&self) -> Vec<MatchUnit> {
        self.units.values().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }
}

#[derive(Debug, Clone)]
struct SeenSide {
    seen: usize,
    name: String,
    odds: f64,
    flagged_favorite: bool,
}

#[derive(Debug, Default)]
struct Bucket {
    sides: Vec<SeenSide>,
    opponent: Option<(String, f64)>,
}

/// Collapses raw side records into one `MatchUnit` per match id.
///
/// Live records and records without a match id or participant name are
/// dropped. A match seen from one side only gets its opponent synthesized
/// from the record's opponent fields, or a placeholder at default odds when
/// the record names no opponent.
pub fn group_matches(raw: &[RawMatch]) -> GroupedMatches {
    let mut report = GroupReport::default();
    let mut buckets: HashMap<String, Bucket> = HashMap::new();
    let mut live_ids: HashSet<String> = HashSet::new();

    for (seen, record) in raw.iter().enumerate() {
        if record.is_live {
            if let Some(match_id) = non_blank(record.match_id.as_deref()) {
                live_ids.insert(match_id.to_string());
            }
            report.live += 1;
            continue;
        }
        let Some(match_id) = non_blank(record.match_id.as_deref()) else {
            debug!(index = seen, "dropping record without match id");
            report.malformed += 1;
            continue;
        };
        let Some(name) = non_blank(record.participant_name.as_deref()) else {
            debug!(index = seen, match_id = %match_id, "dropping record without participant name");
            report.malformed += 1;
            continue;
        };

        let bucket = buckets.entry(match_id.to_string()).or_default();
        if bucket.sides.iter().any(|s| s.name == name) {
            continue;
        }
        bucket.sides.push(SeenSide {
            seen,
            name: name.to_string(),
            odds: sanitize_odds(record.odds_decimal),
            flagged_favorite: record.is_favorite,
        });
        if bucket.opponent.is_none() {
            if let Some(opp) = non_blank(record.opponent_name.as_deref()) {
                bucket.opponent = Some((
                    opp.to_string(),
                    sanitize_odds(record.opponent_odds_decimal),
                ));
            }
        }
    }

    let mut units = BTreeMap::new();
    for (match_id, mut bucket) in buckets {
        // One live side takes the whole match out of the pool.
        if live_ids.contains(&match_id) {
            report.live += bucket.sides.len();
            continue;
        }
        if bucket.sides.len() == 1 {
            let only = &bucket.sides[0];
            let (name, odds) = match bucket.opponent.take() {
                Some((name, odds)) if name != only.name => (name, odds),
                _ => {
                    debug!(match_id = %match_id, "one-sided match without opponent, using placeholder");
                    (placeholder_opponent(&only.name), DEFAULT_ODDS)
                }
            };
            let synthesized = SeenSide {
                seen: usize::MAX,
                name,
                odds,
                flagged_favorite: !only.flagged_favorite,
            };
            bucket.sides.push(synthesized);
        }

        bucket.sides.truncate(2);
        bucket.sides.sort_by(|a, b| {
            a.odds
                .total_cmp(&b.odds)
                .then(b.flagged_favorite.cmp(&a.flagged_favorite))
                .then(a.seen.cmp(&b.seen))
        });
        let mut sides = bucket.sides.into_iter();
        let (Some(fav), Some(dog)) = (sides.next(), sides.next()) else {
            continue;
        };

        let unit = MatchUnit {
            favorite: Pick {
                match_id: match_id.clone(),
                participant_name: fav.name,
                odds_decimal: fav.odds,
                side: Side::Favorite,
            },
            underdog: Pick {
                match_id: match_id.clone(),
                participant_name: dog.name,
                odds_decimal: dog.odds,
                side: Side::Underdog,
            },
            match_id: match_id.clone(),
        };
        units.insert(match_id, unit);
    }

    if report.dropped() > 0 {
        info!(
            live = report.live,
            malformed = report.malformed,
            kept = units.len(),
            "dropped match records while grouping"
        );
    }

    GroupedMatches { units, report }
}

fn placeholder_opponent(participant: &str) -> String {
    format!("{participant} opponent")
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn sanitize_odds(odds: Option<f64>) -> f64 {
    match odds {
        Some(o) if o.is_finite() && o > 0.0 => o,
        _ => DEFAULT_ODDS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side(id: &str, name: &str, odds: f64, fav: bool) -> RawMatch {
        RawMatch {
            match_id: Some(id.to_string()),
            participant_name: Some(name.to_string()),
            opponent_name: None,
            odds_decimal: Some(odds),
            opponent_odds_decimal: None,
            is_favorite: fav,
            is_live: false,
        }
    }

    #[test]
    fn two_sides_order_by_odds() {
        let raw = vec![side("m1", "Dog", 3.1, false), side("m1", "Fav", 1.4, true)];
        let grouped = group_matches(&raw);
        let unit = &grouped.units["m1"];
        assert_eq!(unit.favorite.participant_name, "Fav");
        assert_eq!(unit.underdog.participant_name, "Dog");
        assert_eq!(grouped.report.dropped(), 0);
    }

    #[test]
    fn odds_tie_prefers_flagged_favorite_then_first_seen() {
        let raw = vec![side("m1", "A", 1.9, false), side("m1", "B", 1.9, true)];
        let unit = &group_matches(&raw).units["m1"];
        assert_eq!(unit.favorite.participant_name, "B");

        let raw = vec![side("m2", "A", 1.9, false), side("m2", "B", 1.9, false)];
        let unit = &group_matches(&raw).units["m2"];
        assert_eq!(unit.favorite.participant_name, "A");
    }

    #[test]
    fn single_side_synthesizes_opponent_with_default_odds() {
        let mut raw = side("m1", "Home", 1.6, true);
        raw.opponent_name = Some("Away".to_string());
        let unit = &group_matches(&[raw]).units["m1"];
        assert_eq!(unit.favorite.participant_name, "Home");
        assert_eq!(unit.underdog.participant_name, "Away");
        assert_eq!(unit.underdog.odds_decimal, DEFAULT_ODDS);
    }

    #[test]
    fn single_side_without_opponent_gets_placeholder() {
        let unit = &group_matches(&[side("m1", "Home", 1.6, true)]).units["m1"];
        assert_eq!(unit.favorite.participant_name, "Home");
        assert_eq!(unit.underdog.participant_name, "Home opponent");
        assert_eq!(unit.underdog.odds_decimal, DEFAULT_ODDS);

        // Opponent field naming the participant itself is no opponent at all.
        let mut raw = side("m2", "Away", 3.4, false);
        raw.opponent_name = Some("Away".to_string());
        let unit = &group_matches(&[raw]).units["m2"];
        assert_eq!(unit.favorite.participant_name, "Away opponent");
        assert_eq!(unit.underdog.participant_name, "Away");
    }

    #[test]
    fn live_side_excludes_whole_match() {
        let mut live = side("m1", "Fav", 1.4, true);
        live.is_live = true;
        let mut other = side("m1", "Dog", 2.9, false);
        other.opponent_name = Some("Fav".to_string());
        let grouped = group_matches(&[live, other]);
        assert!(grouped.is_empty());
        assert_eq!(grouped.report.live, 2);
    }

    #[test]
    fn sanitize_odds_rejects_non_positive() {
        assert_eq!(sanitize_odds(Some(0.0)), DEFAULT_ODDS);
        assert_eq!(sanitize_odds(Some(-1.5)), DEFAULT_ODDS);
        assert_eq!(sanitize_odds(Some(f64::NAN)), DEFAULT_ODDS);
        assert_eq!(sanitize_odds(None), DEFAULT_ODDS);
        assert_eq!(sanitize_odds(Some(1.25)), 1.25);
    }
}
