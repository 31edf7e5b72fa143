use std::collections::BTreeMap;

use crate::outcome::Outcome;

/// Per-match labels from the independent sub-models, plus the signed
/// home-minus-away momentum differential. The models themselves are black
/// boxes; only their picks arrive here.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelOutputBundle {
    pub poisson: Option<Outcome>,
    pub bradley_terry: Option<Outcome>,
    pub osl: Option<Outcome>,
    pub regression: Option<Outcome>,
    pub fuzzy: Option<Outcome>,
    pub upset_diff: f64,
}

/// Blending configuration. Tuning constants, applied identically to every
/// match within a run.
#[derive(Debug, Clone, Copy)]
pub struct ConsensusConfig {
    pub poisson_weight: f64,
    pub bradley_terry_weight: f64,
    pub osl_weight: f64,
    pub regression_weight: f64,
    pub fuzzy_weight: f64,
    pub triple_agreement_bonus: f64,
    pub pair_agreement_bonus: f64,
    pub momentum_threshold: f64,
    pub momentum_bonus: f64,
    pub disagreement_penalty: f64,
    pub contested_gap: f64,
    pub strong_score: f64,
    pub normal_score: f64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            poisson_weight: 3.0,
            bradley_terry_weight: 2.5,
            osl_weight: 2.0,
            regression_weight: 1.2,
            fuzzy_weight: 1.0,
            triple_agreement_bonus: 2.0,
            pair_agreement_bonus: 1.0,
            momentum_threshold: 0.2,
            momentum_bonus: 0.8,
            disagreement_penalty: 0.3,
            contested_gap: 0.5,
            strong_score: 6.0,
            normal_score: 3.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusLabel {
    Pick(Outcome),
    Contested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceBand {
    Strong,
    Normal,
    Weak,
}

/// Blended result for one match. Scores are weighted tallies, not
/// probabilities, with an entry for every outcome; `reasons` records
/// which models and bonuses backed each outcome.
#[derive(Debug, Clone)]
pub struct ConsensusResult {
    pub scores: BTreeMap<Outcome, f64>,
    pub reasons: BTreeMap<Outcome, Vec<String>>,
    pub label: ConsensusLabel,
    pub band: ConfidenceBand,
}

/// Blends the sub-model picks into one score per outcome and a final
/// label. Pure and deterministic: identical inputs and configuration give
/// identical output.
pub fn score(bundle: &ModelOutputBundle, config: &ConsensusConfig) -> ConsensusResult {
    // Every outcome scores, even without contributions: the tie-break
    // compares against those implicit zeros.
    let mut tally = Tally::new();
    for outcome in [Outcome::Home, Outcome::Draw, Outcome::Away] {
        tally.scores.insert(outcome, 0.0);
        tally.reasons.insert(outcome, Vec::new());
    }

    let high_weight = [
        ("poisson", bundle.poisson, config.poisson_weight),
        ("bradley_terry", bundle.bradley_terry, config.bradley_terry_weight),
        ("osl", bundle.osl, config.osl_weight),
    ];
    let low_weight = [
        ("regression", bundle.regression, config.regression_weight),
        ("fuzzy", bundle.fuzzy, config.fuzzy_weight),
    ];

    for (name, pick, weight) in high_weight.iter().chain(low_weight.iter()) {
        if let Some(outcome) = pick {
            tally.add(*outcome, *weight, name);
        }
    }

    // Agreement bonus over the three highest-weighted models. An
    // abstaining model does not spoil the pair bonus for the two that
    // did pick and agree.
    let top_picks: Vec<Outcome> = high_weight.iter().filter_map(|(_, p, _)| *p).collect();
    if top_picks.len() == 3 && top_picks.iter().all(|p| *p == top_picks[0]) {
        tally.add(top_picks[0], config.triple_agreement_bonus, "triple_agreement");
    } else {
        for outcome in [Outcome::Home, Outcome::Draw, Outcome::Away] {
            if top_picks.iter().filter(|p| **p == outcome).count() == 2 {
                tally.add(outcome, config.pair_agreement_bonus, "pair_agreement");
            }
        }
    }

    // Momentum/upset bonus from the signed differential.
    if bundle.upset_diff > config.momentum_threshold {
        tally.add(Outcome::Home, config.momentum_bonus, "momentum");
    } else if bundle.upset_diff < -config.momentum_threshold {
        tally.add(Outcome::Away, config.momentum_bonus, "momentum");
    }

    // Disagreement penalty, applied after the bonuses: every low-weight
    // model that contradicts a high-weight model drags that model's
    // predicted outcome down.
    for (_, low_pick, _) in &low_weight {
        let Some(low_pick) = low_pick else { continue };
        for (high_name, high_pick, _) in &high_weight {
            let Some(high_pick) = high_pick else { continue };
            if low_pick != high_pick {
                tally.add(
                    *high_pick,
                    -config.disagreement_penalty,
                    &format!("{high_name}_disputed"),
                );
            }
        }
    }

    let mut ranked: Vec<(Outcome, f64)> = tally
        .scores
        .iter()
        .map(|(outcome, score)| (*outcome, *score))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let (label, top_score) = match ranked.as_slice() {
        [(first, s1), (_, s2), ..] => {
            if (s1 - s2) < config.contested_gap {
                (ConsensusLabel::Contested, *s1)
            } else {
                (ConsensusLabel::Pick(*first), *s1)
            }
        }
        _ => (ConsensusLabel::Contested, 0.0),
    };

    let band = if top_score >= config.strong_score {
        ConfidenceBand::Strong
    } else if top_score >= config.normal_score {
        ConfidenceBand::Normal
    } else {
        ConfidenceBand::Weak
    };

    ConsensusResult {
        scores: tally.scores,
        reasons: tally.reasons,
        label,
        band,
    }
}

struct Tally {
    scores: BTreeMap<Outcome, f64>,
    reasons: BTreeMap<Outcome, Vec<String>>,
}

impl Tally {
    fn new() -> Self {
        Self {
            scores: BTreeMap::new(),
            reasons: BTreeMap::new(),
        }
    }

    fn add(&mut self, outcome: Outcome, amount: f64, reason: &str) {
        *self.scores.entry(outcome).or_insert(0.0) += amount;
        self.reasons
            .entry(outcome)
            .or_default()
            .push(reason.to_string());
    }
}
