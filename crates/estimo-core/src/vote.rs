//! Vote validation and estimation arithmetic.
//!
//! Every function here is pure. The REST reveal path and the realtime
//! protocol handler both go through these, so they must agree exactly.
//!
//! - [`validate_vote`] checks a card label against a [`VotingSystem`]
//! - [`calculate_average`] returns the raw mean of the numeric votes
//! - [`round_to_nearest_card`] snaps a mean onto the card scale (ties go up)
//! - [`has_only_non_numeric_votes`] separates "all `?`" from "all `0`"
//! - [`determine_estimation`] picks the label stored on a task after a round

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{EstimoError, Result};

/// The "not decided yet" card. Never averaged.
pub const SENTINEL: &str = "?";

const FIBONACCI_CARDS: &[&str] = &[
    "?", "0", "0.5", "1", "2", "3", "5", "8", "13", "20", "40", "100",
];

/// A named card deck.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VotingSystem {
    /// DBS Fibonacci deck (default).
    #[default]
    DbsFibo,
    /// Plain Fibonacci deck; same cards as [`VotingSystem::DbsFibo`].
    Fibonacci,
}

impl VotingSystem {
    /// Parse a voting-system tag.
    pub fn parse(tag: &str) -> Result<Self> {
        match tag {
            "dbs_fibo" => Ok(Self::DbsFibo),
            "fibonacci" => Ok(Self::Fibonacci),
            other => Err(EstimoError::UnknownVotingSystem(other.to_owned())),
        }
    }

    /// Tag used on the wire and in storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DbsFibo => "dbs_fibo",
            Self::Fibonacci => "fibonacci",
        }
    }

    /// Every card label, sentinel first, numeric cards ascending.
    pub fn cards(self) -> &'static [&'static str] {
        match self {
            Self::DbsFibo | Self::Fibonacci => FIBONACCI_CARDS,
        }
    }

    /// Whether `value` is a card of this deck.
    pub fn contains(self, value: &str) -> bool {
        self.cards().contains(&value)
    }

    /// Numeric cards with their float values, ascending.
    fn numeric_cards(self) -> impl Iterator<Item = (&'static str, f64)> {
        self.cards()
            .iter()
            .copied()
            .filter(|c| *c != SENTINEL)
            .filter_map(|c| c.parse::<f64>().ok().map(|v| (c, v)))
    }

    /// Label of the card whose value is exactly `value`, if any.
    #[allow(clippy::float_cmp)]
    pub fn card_label(self, value: f64) -> Option<&'static str> {
        self.numeric_cards()
            .find(|(_, v)| *v == value)
            .map(|(label, _)| label)
    }
}

impl FromStr for VotingSystem {
    type Err = EstimoError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for VotingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated card label.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Vote {
    value: String,
}

impl Vote {
    /// Validate `value` against `system` and wrap it.
    pub fn new(value: &str, system: VotingSystem) -> Result<Self> {
        validate_vote(value, system)?;
        Ok(Self {
            value: value.to_owned(),
        })
    }

    /// The card label.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// True unless this is the sentinel.
    pub fn is_numeric(&self) -> bool {
        is_numeric(&self.value)
    }

    /// Float value of a numeric vote.
    pub fn to_float(&self) -> Result<f64> {
        to_float(&self.value)
    }
}

/// Reject anything that is not a card of `system`.
pub fn validate_vote(value: &str, system: VotingSystem) -> Result<()> {
    if system.contains(value) {
        Ok(())
    } else {
        Err(EstimoError::InvalidVote(format!(
            "{value:?} is not a valid {system} card"
        )))
    }
}

/// True unless `value` is the sentinel.
pub fn is_numeric(value: &str) -> bool {
    value != SENTINEL
}

/// Parse a numeric vote. Fails on the sentinel and on non-numbers.
pub fn to_float(value: &str) -> Result<f64> {
    if !is_numeric(value) {
        return Err(EstimoError::InvalidVote(
            "the ? card has no numeric value".into(),
        ));
    }
    value
        .parse::<f64>()
        .map_err(|_| EstimoError::InvalidVote(format!("{value:?} is not numeric")))
}

/// Raw mean of the numeric votes.
///
/// Fails with [`EstimoError::NoVotes`] on an empty map and with
/// [`EstimoError::InvalidVote`] if any value is not a card. Returns `0.0`
/// when every vote is the sentinel. Summation happens in ascending value
/// order so the result does not depend on map iteration order.
pub fn calculate_average(votes: &HashMap<String, String>, system: VotingSystem) -> Result<f64> {
    if votes.is_empty() {
        return Err(EstimoError::NoVotes);
    }

    let mut numeric = Vec::with_capacity(votes.len());
    for value in votes.values() {
        let vote = Vote::new(value, system)?;
        if vote.is_numeric() {
            numeric.push(vote.to_float()?);
        }
    }

    if numeric.is_empty() {
        return Ok(0.0);
    }

    numeric.sort_by(f64::total_cmp);
    let sum: f64 = numeric.iter().sum();
    #[allow(clippy::cast_precision_loss)]
    let count = numeric.len() as f64;
    Ok(sum / count)
}

/// Snap `average` to the closest numeric card of `system`.
///
/// Equidistant cards resolve to the larger one. Values outside the deck
/// clamp to its smallest or largest card.
pub fn round_to_nearest_card(average: f64, system: VotingSystem) -> f64 {
    let mut best: Option<(f64, f64)> = None;
    for (_, card) in system.numeric_cards() {
        let distance = (average - card).abs();
        best = match best {
            None => Some((card, distance)),
            Some((_, best_distance)) if distance <= best_distance => Some((card, distance)),
            keep => keep,
        };
    }
    best.map_or(0.0, |(card, _)| card)
}

/// True iff every vote is the sentinel. Values that fail validation are skipped.
pub fn has_only_non_numeric_votes(votes: &HashMap<String, String>, system: VotingSystem) -> bool {
    votes
        .values()
        .filter_map(|v| Vote::new(v, system).ok())
        .all(|v| !v.is_numeric())
}

/// Estimation label recorded on a task when a revealed round is cleared.
///
/// The card nearest to `average` when there is one, otherwise the unanimous
/// vote, otherwise the sentinel.
pub fn determine_estimation(
    votes: &HashMap<String, String>,
    average: Option<f64>,
    system: VotingSystem,
) -> String {
    if let Some(avg) = average {
        let card = round_to_nearest_card(avg, system);
        return system
            .card_label(card)
            .map_or_else(|| format!("{card:.1}"), ToOwned::to_owned);
    }

    let mut values = votes.values();
    match values.next() {
        Some(first) if values.all(|v| v == first) => first.clone(),
        _ => SENTINEL.to_owned(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    fn votes(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(u, v)| ((*u).to_owned(), (*v).to_owned()))
            .collect()
    }

    const SYS: VotingSystem = VotingSystem::DbsFibo;

    // ── voting systems ──────────────────────────────────────────────

    #[test]
    fn parse_known_tags() {
        assert_eq!(VotingSystem::parse("dbs_fibo").unwrap(), VotingSystem::DbsFibo);
        assert_eq!(VotingSystem::parse("fibonacci").unwrap(), VotingSystem::Fibonacci);
    }

    #[test]
    fn unknown_tag_rejected_distinctly() {
        assert_matches!(
            VotingSystem::parse("tshirt"),
            Err(EstimoError::UnknownVotingSystem(tag)) if tag == "tshirt"
        );
    }

    #[test]
    fn serde_uses_tag() {
        let json = serde_json::to_string(&VotingSystem::DbsFibo).unwrap();
        assert_eq!(json, "\"dbs_fibo\"");
        let back: VotingSystem = serde_json::from_str("\"fibonacci\"").unwrap();
        assert_eq!(back, VotingSystem::Fibonacci);
    }

    // ── validation ──────────────────────────────────────────────────

    #[test]
    fn every_card_accepted() {
        for card in ["?", "0", "0.5", "1", "2", "3", "5", "8", "13", "20", "40", "100"] {
            assert!(validate_vote(card, SYS).is_ok(), "{card} should be valid");
        }
    }

    #[test]
    fn off_deck_values_rejected() {
        for value in ["4", "1.5", "-1", "999", "", " 5", "5.0", "abc"] {
            assert_matches!(validate_vote(value, SYS), Err(EstimoError::InvalidVote(_)));
        }
    }

    #[test]
    fn sentinel_is_not_numeric() {
        assert!(!is_numeric("?"));
        assert!(is_numeric("0"));
        assert_matches!(to_float("?"), Err(EstimoError::InvalidVote(_)));
        assert!((to_float("0.5").unwrap() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn vote_wraps_value() {
        let vote = Vote::new("13", SYS).unwrap();
        assert_eq!(vote.value(), "13");
        assert!(vote.is_numeric());
        assert!((vote.to_float().unwrap() - 13.0).abs() < f64::EPSILON);
    }

    // ── averaging ───────────────────────────────────────────────────

    #[test]
    fn average_of_three() {
        let avg = calculate_average(&votes(&[("a", "5"), ("b", "8"), ("c", "5")]), SYS).unwrap();
        assert!((avg - 6.0).abs() < f64::EPSILON);
    }

    #[test]
    fn average_ignores_sentinel() {
        let avg = calculate_average(&votes(&[("a", "5"), ("b", "?"), ("c", "8")]), SYS).unwrap();
        assert!((avg - 6.5).abs() < f64::EPSILON);
    }

    #[test]
    fn average_of_empty_is_no_votes() {
        assert_matches!(calculate_average(&HashMap::new(), SYS), Err(EstimoError::NoVotes));
    }

    #[test]
    fn all_sentinel_averages_to_zero() {
        let all_q = votes(&[("a", "?"), ("b", "?")]);
        let avg = calculate_average(&all_q, SYS).unwrap();
        assert!(avg.abs() < f64::EPSILON);
        assert!(has_only_non_numeric_votes(&all_q, SYS));
    }

    #[test]
    fn all_zero_averages_to_zero_but_is_numeric() {
        let zeros = votes(&[("a", "0"), ("b", "0")]);
        let avg = calculate_average(&zeros, SYS).unwrap();
        assert!(avg.abs() < f64::EPSILON);
        assert!(!has_only_non_numeric_votes(&zeros, SYS));
    }

    #[test]
    fn invalid_value_fails_whole_average() {
        assert_matches!(
            calculate_average(&votes(&[("a", "5"), ("b", "4")]), SYS),
            Err(EstimoError::InvalidVote(_))
        );
    }

    #[test]
    fn only_non_numeric_skips_invalid_values() {
        assert!(has_only_non_numeric_votes(&votes(&[("a", "?"), ("b", "banana")]), SYS));
        assert!(!has_only_non_numeric_votes(&votes(&[("a", "?"), ("b", "3")]), SYS));
    }

    // ── rounding ────────────────────────────────────────────────────

    #[test]
    fn rounding_ties_break_up() {
        assert!((round_to_nearest_card(4.0, SYS) - 5.0).abs() < f64::EPSILON);
        assert!((round_to_nearest_card(6.5, SYS) - 8.0).abs() < f64::EPSILON);
        assert!((round_to_nearest_card(0.75, SYS) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rounding_picks_closest() {
        assert!((round_to_nearest_card(7.67, SYS) - 8.0).abs() < f64::EPSILON);
        assert!((round_to_nearest_card(6.0, SYS) - 5.0).abs() < f64::EPSILON);
        assert!((round_to_nearest_card(0.2, SYS) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rounding_clamps() {
        assert!((round_to_nearest_card(150.0, SYS) - 100.0).abs() < f64::EPSILON);
        assert!(round_to_nearest_card(-5.0, SYS).abs() < f64::EPSILON);
    }

    // ── estimation ──────────────────────────────────────────────────

    #[test]
    fn estimation_uses_rounded_average() {
        let v = votes(&[("a", "5"), ("b", "8")]);
        assert_eq!(determine_estimation(&v, Some(6.5), SYS), "8");
        assert_eq!(determine_estimation(&v, Some(0.5), SYS), "0.5");
    }

    #[test]
    fn estimation_falls_back_to_unanimous_value() {
        let v = votes(&[("a", "?"), ("b", "?")]);
        assert_eq!(determine_estimation(&v, None, SYS), "?");
    }

    #[test]
    fn estimation_without_consensus_is_sentinel() {
        let v = votes(&[("a", "?"), ("b", "banana")]);
        assert_eq!(determine_estimation(&v, None, SYS), SENTINEL);
        assert_eq!(determine_estimation(&HashMap::new(), None, SYS), SENTINEL);
    }

    #[test]
    fn card_label_lookup() {
        assert_eq!(SYS.card_label(0.5), Some("0.5"));
        assert_eq!(SYS.card_label(100.0), Some("100"));
        assert_eq!(SYS.card_label(4.0), None);
    }

    // ── properties ──────────────────────────────────────────────────

    proptest! {
        #[test]
        fn non_cards_are_rejected(value in "\\PC{0,6}") {
            prop_assume!(!FIBONACCI_CARDS.contains(&value.as_str()));
            prop_assert!(validate_vote(&value, SYS).is_err());
        }

        #[test]
        fn rounding_always_lands_on_a_card(avg in -50.0f64..200.0) {
            let card = round_to_nearest_card(avg, SYS);
            prop_assert!(SYS.card_label(card).is_some());
        }

        #[test]
        fn average_within_vote_range(
            picks in proptest::collection::vec(1usize..FIBONACCI_CARDS.len(), 1..12)
        ) {
            let map: HashMap<String, String> = picks
                .iter()
                .enumerate()
                .map(|(i, p)| (format!("u{i}"), FIBONACCI_CARDS[*p].to_owned()))
                .collect();
            let values: Vec<f64> = map.values().map(|v| v.parse::<f64>().unwrap()).collect();
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let avg = calculate_average(&map, SYS).unwrap();
            prop_assert!(avg >= min - 1e-9 && avg <= max + 1e-9);
        }
    }
}
