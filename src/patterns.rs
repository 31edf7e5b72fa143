use std::fmt;

use serde::{Deserialize, Serialize};

use crate::outcome::Outcome;
use crate::record::MatchFeatureRecord;

/// Closed set of mined pattern identifiers. `Display` gives the stable
/// wire string used in storage keys and sync payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternId {
    AllPredictDifferent,
    HandicapDifferent,
    HighUpsetScoreDiff,
    OuPredictionDifferent,
    BttsDifferent,
    HplBtStrongConsensus,
    HighConfidence,
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PatternId::AllPredictDifferent => "PAT_A_ALL_PREDICT_DIFFERENT",
            PatternId::HandicapDifferent => "PAT_B_HANDICAP_DIFFERENT",
            PatternId::HighUpsetScoreDiff => "PAT_C_HIGH_UPSET_SCORE_DIFF",
            PatternId::OuPredictionDifferent => "PAT_D_OU_PREDICTION_DIFFERENT",
            PatternId::BttsDifferent => "PAT_E_BTTS_DIFFERENT",
            PatternId::HplBtStrongConsensus => "SC_A_HPL_BT_STRONG_CONSENSUS",
            PatternId::HighConfidence => "SC_B_HIGH_CONFIDENCE",
        };
        write!(f, "{s}")
    }
}

/// Which side of the hit/miss split a ruleset (and its store) covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Miss,
    Hit,
}

impl Direction {
    pub fn label(self) -> &'static str {
        match self {
            Direction::Miss => "Miss patterns",
            Direction::Hit => "Hit patterns",
        }
    }

    pub fn marker(self) -> &'static str {
        match self {
            Direction::Miss => "⚠️",
            Direction::Hit => "✅",
        }
    }
}

/// Product-tuned rule thresholds. Defaults match the shipped values; they
/// are configuration, not invariants.
#[derive(Debug, Clone, Copy)]
pub struct RuleThresholds {
    pub upset_diff: f64,
    pub strong_consensus_prob: f64,
    pub high_confidence_prob: f64,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            upset_diff: 0.3,
            strong_consensus_prob: 0.70,
            high_confidence_prob: 0.75,
        }
    }
}

/// Classification keeps "confirmed no pattern" distinct from "could not
/// classify" so callers can treat the two differently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Matched(Vec<PatternId>),
    NoMatch,
    Error(String),
}

impl Classification {
    pub fn matched(&self) -> &[PatternId] {
        match self {
            Classification::Matched(ids) => ids,
            _ => &[],
        }
    }
}

/// Runs the ruleset for `direction` against one record. Records whose
/// outcome is indeterminate cannot be classified at all; records on the
/// other side of the split confirm as no-match.
pub fn classify(
    record: &MatchFeatureRecord,
    direction: Direction,
    thresholds: &RuleThresholds,
) -> Classification {
    if !record.check.is_miss && !record.check.is_success {
        return Classification::Error(format!(
            "row {}: record has no settled outcome to classify against",
            record.row
        ));
    }
    let applicable = match direction {
        Direction::Miss => record.check.is_miss,
        Direction::Hit => record.check.is_success,
    };
    if !applicable {
        return Classification::NoMatch;
    }

    let ids = match direction {
        Direction::Miss => miss_rules(record, thresholds),
        Direction::Hit => hit_rules(record, thresholds),
    };
    if ids.is_empty() {
        Classification::NoMatch
    } else {
        Classification::Matched(ids)
    }
}

fn miss_rules(record: &MatchFeatureRecord, thresholds: &RuleThresholds) -> Vec<PatternId> {
    let mut ids = Vec::new();

    let five = [
        record.hybrid,
        record.hpl,
        record.bt,
        record.osl,
        record.regression,
    ];
    if all_pairwise_distinct(&five) {
        ids.push(PatternId::AllPredictDifferent);
    }

    if let (Some(handicap), Some(hybrid)) = (record.handicap, record.hybrid) {
        if handicap != hybrid {
            ids.push(PatternId::HandicapDifferent);
        }
    }

    if let Some(diff) = record.upset_score_diff {
        if diff.abs() > thresholds.upset_diff {
            ids.push(PatternId::HighUpsetScoreDiff);
        }
    }

    if secondary_differs(record.ou_prediction.as_deref(), record.hybrid) {
        ids.push(PatternId::OuPredictionDifferent);
    }
    if secondary_differs(record.btts_prediction.as_deref(), record.hybrid) {
        ids.push(PatternId::BttsDifferent);
    }

    ids
}

fn hit_rules(record: &MatchFeatureRecord, thresholds: &RuleThresholds) -> Vec<PatternId> {
    let mut ids = Vec::new();
    let Some(hybrid) = record.hybrid else {
        return ids;
    };

    let hpl_conf = confidence_for(hybrid, record.hpl_home_prob, record.hpl_away_prob);
    let bt_conf = confidence_for(hybrid, record.bt_home_prob, record.bt_away_prob);

    if record.hpl == Some(hybrid)
        && record.bt == Some(hybrid)
        && hpl_conf > thresholds.strong_consensus_prob
        && bt_conf > thresholds.strong_consensus_prob
    {
        ids.push(PatternId::HplBtStrongConsensus);
    }

    if record.hpl == Some(hybrid) && hpl_conf > thresholds.high_confidence_prob {
        ids.push(PatternId::HighConfidence);
    }

    ids
}

fn all_pairwise_distinct(labels: &[Option<Outcome>]) -> bool {
    // Unknown labels cannot be shown distinct from anything.
    if labels.iter().any(Option::is_none) {
        return false;
    }
    for i in 0..labels.len() {
        for j in (i + 1)..labels.len() {
            if labels[i] == labels[j] {
                return false;
            }
        }
    }
    true
}

/// A secondary pick differs from the hybrid pick when it is present and
/// does not resolve to the same outcome. Picks from a different label
/// alphabet (Over/Under, BTTS yes/no) always differ.
fn secondary_differs(secondary: Option<&str>, hybrid: Option<Outcome>) -> bool {
    let (Some(raw), Some(hybrid)) = (secondary, hybrid) else {
        return false;
    };
    Outcome::parse_label(raw) != Some(hybrid)
}

/// Per-outcome model confidence. Draw confidence is whatever the two-sided
/// model leaves over after home/away.
fn confidence_for(outcome: Outcome, home_prob: f64, away_prob: f64) -> f64 {
    match outcome {
        Outcome::Home => home_prob,
        Outcome::Away => away_prob,
        Outcome::Draw => (1.0 - home_prob - away_prob).max(0.0),
    }
}
