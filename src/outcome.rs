use std::fmt;

use serde::{Deserialize, Serialize};

/// The three possible full-time outcomes. All label parsing happens here,
/// once, at the boundary; internal logic only ever sees this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Home => write!(f, "HomeWin"),
            Outcome::Draw => write!(f, "Draw"),
            Outcome::Away => write!(f, "AwayWin"),
        }
    }
}

/// Actual-result field after parsing: either no usable result yet, or a
/// settled outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultField {
    Pending,
    Settled(Outcome),
}

/// Hit/miss verdict for one record. Both flags false means indeterminate;
/// they are never both true.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCheck {
    pub is_miss: bool,
    pub is_success: bool,
}

const PENDING_SENTINELS: &[&str] = &["", "-", "n/a", "null", "경기 전"];

impl Outcome {
    /// Parses a prediction or result label, accepting every synonym the
    /// upstream feeds produce: full words, H/D/A letters, 1X2 codes and the
    /// Korean source labels.
    pub fn parse_label(raw: &str) -> Option<Outcome> {
        let folded = raw.trim().to_lowercase();
        let key: String = folded.chars().filter(|c| !c.is_whitespace()).collect();
        match key.as_str() {
            "homewin" | "home" | "h" | "1" | "홈승" | "홈" => Some(Outcome::Home),
            "draw" | "d" | "x" | "무승부" | "무" => Some(Outcome::Draw),
            "awaywin" | "away" | "a" | "2" | "원정승" | "원정" => Some(Outcome::Away),
            _ => None,
        }
    }

    pub fn from_score(home: i32, away: i32) -> Outcome {
        if home > away {
            Outcome::Home
        } else if home < away {
            Outcome::Away
        } else {
            Outcome::Draw
        }
    }
}

/// Parses the actual-result field. Score strings like "2-1" convert to an
/// outcome; pending sentinels and anything unrecognized stay `Pending`.
pub fn parse_result(raw: &str) -> ResultField {
    let trimmed = raw.trim();
    if PENDING_SENTINELS.contains(&trimmed.to_lowercase().as_str()) {
        return ResultField::Pending;
    }
    if let Some(outcome) = parse_score(trimmed) {
        return ResultField::Settled(outcome);
    }
    match Outcome::parse_label(trimmed) {
        Some(outcome) => ResultField::Settled(outcome),
        None => ResultField::Pending,
    }
}

fn parse_score(raw: &str) -> Option<Outcome> {
    let (home_raw, away_raw) = raw.split_once('-')?;
    let home = home_raw.trim().parse::<i32>().ok()?;
    let away = away_raw.trim().parse::<i32>().ok()?;
    Some(Outcome::from_score(home, away))
}

/// Compares a prediction label against the actual-result field. Pure and
/// total: every input combination returns a verdict, nothing panics.
/// Against a settled result, anything short of an exact or synonym match
/// is a miss — including a prediction label we cannot recognize at all.
pub fn check_prediction(prediction: &str, actual: &str) -> OutcomeCheck {
    if prediction.trim().is_empty() {
        return OutcomeCheck::default();
    }
    match parse_result(actual) {
        ResultField::Pending => OutcomeCheck::default(),
        ResultField::Settled(result) => {
            let is_success = Outcome::parse_label(prediction) == Some(result);
            OutcomeCheck {
                is_miss: !is_success,
                is_success,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_strings_convert_to_outcomes() {
        assert_eq!(parse_result("2-1"), ResultField::Settled(Outcome::Home));
        assert_eq!(parse_result("1-1"), ResultField::Settled(Outcome::Draw));
        assert_eq!(parse_result("0-3"), ResultField::Settled(Outcome::Away));
    }

    #[test]
    fn synonyms_are_equivalent() {
        for label in ["H", "Home", "HomeWin", " 홈 승 ", "1"] {
            assert_eq!(Outcome::parse_label(label), Some(Outcome::Home), "{label}");
        }
        for label in ["D", "x", "무승부", "Draw"] {
            assert_eq!(Outcome::parse_label(label), Some(Outcome::Draw), "{label}");
        }
        for label in ["A", "away", "원정 승", "2"] {
            assert_eq!(Outcome::parse_label(label), Some(Outcome::Away), "{label}");
        }
    }

    #[test]
    fn pending_sentinels_are_indeterminate() {
        for raw in ["", "-", "N/A", "null", "  "] {
            assert_eq!(parse_result(raw), ResultField::Pending, "{raw:?}");
            let check = check_prediction("HomeWin", raw);
            assert!(!check.is_miss && !check.is_success);
        }
    }

    #[test]
    fn verdict_flags_are_mutually_exclusive() {
        let hit = check_prediction("HomeWin", "3-0");
        assert!(hit.is_success && !hit.is_miss);
        let miss = check_prediction("HomeWin", "1-2");
        assert!(miss.is_miss && !miss.is_success);
    }

    #[test]
    fn unrecognized_prediction_against_settled_result_is_a_miss() {
        for raw in ["???", "gibberish", "Over"] {
            let check = check_prediction(raw, "2-1");
            assert!(check.is_miss, "{raw}");
            assert!(!check.is_success, "{raw}");
        }
        // Without a settled result it stays indeterminate.
        let pending = check_prediction("gibberish", "N/A");
        assert!(!pending.is_miss && !pending.is_success);
    }
}
