use serde_json::Value;
use thiserror::Error;

use crate::outcome::{self, Outcome, OutcomeCheck, ResultField};

/// One raw input from the upstream collaborator. The shape is declared by
/// the variant; `from_value` is the only place that ever sniffs a payload.
#[derive(Debug, Clone)]
pub enum RawInput {
    /// Ordered cell texts from a results-table row.
    TableRow { cells: Vec<String> },
    /// Flat record carrying a nested JSON analysis blob plus the
    /// top-level final result field.
    Dataset {
        analysis: String,
        final_result: String,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("input shape is ambiguous: cannot tell table row from dataset record")]
    AmbiguousInput,
    #[error("table row has {got} cells, need at least {need}")]
    InsufficientCells { got: usize, need: usize },
    #[error("analysis payload is not well-formed JSON: {0}")]
    MalformedPayload(String),
    #[error("required field `{0}` is missing or empty")]
    MissingRequiredField(&'static str),
}

/// Cell index per feature for the table-row shape. Built once from config
/// and never mutated. Probability columns are optional; tables that do not
/// carry them fall back to 0.0.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    pub hybrid: usize,
    pub hpl: usize,
    pub bt: usize,
    pub osl: usize,
    pub regression: usize,
    pub handicap: usize,
    pub upset_diff: usize,
    pub ou: usize,
    pub btts: usize,
    pub hpl_home_prob: Option<usize>,
    pub hpl_away_prob: Option<usize>,
    pub bt_home_prob: Option<usize>,
    pub bt_away_prob: Option<usize>,
    pub reg_home_prob: Option<usize>,
    pub reg_away_prob: Option<usize>,
    pub min_cells: usize,
}

impl Default for ColumnMap {
    fn default() -> Self {
        // Leading columns (0..=2) are date/home/away, not features.
        Self {
            hybrid: 3,
            hpl: 4,
            bt: 5,
            osl: 6,
            regression: 7,
            handicap: 8,
            upset_diff: 9,
            ou: 10,
            btts: 11,
            hpl_home_prob: Some(12),
            hpl_away_prob: Some(13),
            bt_home_prob: None,
            bt_away_prob: None,
            reg_home_prob: None,
            reg_away_prob: None,
            min_cells: 15,
        }
    }
}

/// Canonical per-match feature set. All labels are parsed to [`Outcome`]
/// on ingestion; probabilities are normalized into [0,1]. Secondary
/// over/under and BTTS picks keep their raw label (a different alphabet
/// than the 1X2 outcomes).
#[derive(Debug, Clone)]
pub struct MatchFeatureRecord {
    pub row: usize,
    pub hybrid: Option<Outcome>,
    pub hpl: Option<Outcome>,
    pub bt: Option<Outcome>,
    pub osl: Option<Outcome>,
    pub regression: Option<Outcome>,
    pub handicap: Option<Outcome>,
    pub upset_score_diff: Option<f64>,
    pub ou_prediction: Option<String>,
    pub btts_prediction: Option<String>,
    pub hpl_home_prob: f64,
    pub hpl_away_prob: f64,
    pub bt_home_prob: f64,
    pub bt_away_prob: f64,
    pub reg_home_prob: f64,
    pub reg_away_prob: f64,
    pub result: ResultField,
    pub check: OutcomeCheck,
}

impl RawInput {
    /// Boundary shape detection for callers that only have loose JSON.
    /// An object with a nested `analysis` string is a dataset record; a
    /// bare array or `{"cells": [...]}` is a table row. Both discriminators
    /// at once (or neither) is ambiguous and refused.
    pub fn from_value(value: &Value) -> Result<RawInput, NormalizeError> {
        if let Value::Array(items) = value {
            return Ok(RawInput::TableRow {
                cells: items.iter().map(text_of).collect(),
            });
        }
        let Value::Object(map) = value else {
            return Err(NormalizeError::AmbiguousInput);
        };
        let has_analysis = map.contains_key("analysis");
        let has_cells = map.contains_key("cells");
        match (has_analysis, has_cells) {
            (true, true) | (false, false) => Err(NormalizeError::AmbiguousInput),
            (true, false) => Ok(RawInput::Dataset {
                analysis: text_of(&map["analysis"]),
                final_result: map.get("finalResult").map(text_of).unwrap_or_default(),
            }),
            (false, true) => {
                let Value::Array(items) = &map["cells"] else {
                    return Err(NormalizeError::AmbiguousInput);
                };
                Ok(RawInput::TableRow {
                    cells: items.iter().map(text_of).collect(),
                })
            }
        }
    }
}

/// Normalizes one raw input into a feature record. `Ok(None)` means the
/// match has no settled result yet and is excluded from analysis; that is
/// a valid terminal state, not an error.
pub fn normalize(
    input: &RawInput,
    columns: &ColumnMap,
    row: usize,
) -> Result<Option<MatchFeatureRecord>, NormalizeError> {
    match input {
        RawInput::TableRow { cells } => normalize_row(cells, columns, row),
        RawInput::Dataset {
            analysis,
            final_result,
        } => normalize_dataset(analysis, final_result, row),
    }
}

fn normalize_row(
    cells: &[String],
    columns: &ColumnMap,
    row: usize,
) -> Result<Option<MatchFeatureRecord>, NormalizeError> {
    if cells.len() < columns.min_cells {
        return Err(NormalizeError::InsufficientCells {
            got: cells.len(),
            need: columns.min_cells,
        });
    }

    let cell = |idx: usize| cells.get(idx).map(String::as_str).unwrap_or("");
    let hybrid_raw = cell(columns.hybrid);
    if hybrid_raw.trim().is_empty() {
        return Err(NormalizeError::MissingRequiredField("hybridPrediction"));
    }

    // The last cell is always the actual result, whatever the map says.
    let actual_raw = cells.last().map(String::as_str).unwrap_or("");
    let result = outcome::parse_result(actual_raw);
    if result == ResultField::Pending {
        return Ok(None);
    }

    let hybrid = Outcome::parse_label(hybrid_raw);
    let prob = |idx: Option<usize>| idx.map(|i| coerce_prob(cell(i))).unwrap_or(0.0);

    Ok(Some(MatchFeatureRecord {
        row,
        hybrid,
        hpl: Outcome::parse_label(cell(columns.hpl)),
        bt: Outcome::parse_label(cell(columns.bt)),
        osl: Outcome::parse_label(cell(columns.osl)),
        regression: Outcome::parse_label(cell(columns.regression)),
        handicap: Outcome::parse_label(cell(columns.handicap)),
        upset_score_diff: parse_optional_f64(cell(columns.upset_diff)),
        ou_prediction: non_empty(cell(columns.ou)),
        btts_prediction: non_empty(cell(columns.btts)),
        hpl_home_prob: prob(columns.hpl_home_prob),
        hpl_away_prob: prob(columns.hpl_away_prob),
        bt_home_prob: prob(columns.bt_home_prob),
        bt_away_prob: prob(columns.bt_away_prob),
        reg_home_prob: prob(columns.reg_home_prob),
        reg_away_prob: prob(columns.reg_away_prob),
        result,
        check: outcome::check_prediction(hybrid_raw, actual_raw),
    }))
}

fn normalize_dataset(
    analysis: &str,
    final_result: &str,
    row: usize,
) -> Result<Option<MatchFeatureRecord>, NormalizeError> {
    let blob: Value = serde_json::from_str(analysis)
        .map_err(|err| NormalizeError::MalformedPayload(err.to_string()))?;
    let Value::Object(map) = &blob else {
        return Err(NormalizeError::MalformedPayload(
            "analysis blob is not an object".to_string(),
        ));
    };

    let field = |key: &str| map.get(key).map(text_of).unwrap_or_default();
    let hybrid_raw = field("hybridPrediction");
    if hybrid_raw.trim().is_empty() {
        return Err(NormalizeError::MissingRequiredField("hybridPrediction"));
    }

    let result = outcome::parse_result(final_result);
    if result == ResultField::Pending {
        return Ok(None);
    }

    let num = |key: &str| map.get(key).map(coerce_prob_value).unwrap_or(0.0);

    Ok(Some(MatchFeatureRecord {
        row,
        hybrid: Outcome::parse_label(&hybrid_raw),
        hpl: Outcome::parse_label(&field("hplPrediction")),
        bt: Outcome::parse_label(&field("btPrediction")),
        osl: Outcome::parse_label(&field("oslPrediction")),
        regression: Outcome::parse_label(&field("regressionPrediction")),
        handicap: Outcome::parse_label(&field("handicapPrediction")),
        upset_score_diff: map.get("upsetScoreDiff").and_then(value_as_f64),
        ou_prediction: non_empty(&field("ouPrediction")),
        btts_prediction: non_empty(&field("bttsPrediction")),
        hpl_home_prob: num("hplHomeProb"),
        hpl_away_prob: num("hplAwayProb"),
        bt_home_prob: num("btHomeProb"),
        bt_away_prob: num("btAwayProb"),
        reg_home_prob: num("regHomeProb"),
        reg_away_prob: num("regAwayProb"),
        result,
        check: outcome::check_prediction(&hybrid_raw, final_result),
    }))
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "-" {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_optional_f64(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

/// Lenient probability coercion: bad numeric text becomes 0.0, and values
/// above 1 are read as percentages. Upstream sources are inconsistent
/// about the scale.
fn coerce_prob(raw: &str) -> f64 {
    let v = raw.trim().trim_end_matches('%').parse::<f64>().unwrap_or(0.0);
    scale_prob(v)
}

fn coerce_prob_value(value: &Value) -> f64 {
    let v = value_as_f64(value).unwrap_or(0.0);
    scale_prob(v)
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    }
}

fn scale_prob(v: f64) -> f64 {
    let v = if v > 1.0 { v / 100.0 } else { v };
    v.clamp(0.0, 1.0)
}
