use matchminer::consensus::{
    ConfidenceBand, ConsensusConfig, ConsensusLabel, ModelOutputBundle, score,
};
use matchminer::outcome::Outcome;

#[test]
fn near_equal_three_way_split_is_inconclusive() {
    let bundle = ModelOutputBundle {
        poisson: Some(Outcome::Home),
        bradley_terry: Some(Outcome::Draw),
        osl: Some(Outcome::Away),
        regression: None,
        fuzzy: None,
        upset_diff: 0.0,
    };
    let config = ConsensusConfig {
        poisson_weight: 2.0,
        bradley_terry_weight: 2.0,
        osl_weight: 2.0,
        ..ConsensusConfig::default()
    };
    let result = score(&bundle, &config);
    assert_eq!(result.label, ConsensusLabel::Contested);
}

#[test]
fn agreement_and_momentum_compound() {
    let bundle = ModelOutputBundle {
        poisson: Some(Outcome::Away),
        bradley_terry: Some(Outcome::Away),
        osl: Some(Outcome::Away),
        regression: Some(Outcome::Away),
        fuzzy: Some(Outcome::Away),
        upset_diff: -0.6,
    };
    let result = score(&bundle, &ConsensusConfig::default());
    assert_eq!(result.label, ConsensusLabel::Pick(Outcome::Away));
    assert_eq!(result.band, ConfidenceBand::Strong);
    let reasons = &result.reasons[&Outcome::Away];
    assert!(reasons.iter().any(|r| r == "triple_agreement"));
    assert!(reasons.iter().any(|r| r == "momentum"));
}

#[test]
fn dissenting_low_weight_models_drag_the_leader() {
    // Two high-weight models split; the low-weight dissenters pull the
    // nominal leader below its rival.
    let bundle = ModelOutputBundle {
        poisson: Some(Outcome::Home),
        bradley_terry: Some(Outcome::Away),
        osl: None,
        regression: Some(Outcome::Away),
        fuzzy: Some(Outcome::Away),
        upset_diff: 0.0,
    };
    let config = ConsensusConfig {
        poisson_weight: 2.6,
        bradley_terry_weight: 2.5,
        disagreement_penalty: 0.3,
        contested_gap: 0.5,
        ..ConsensusConfig::default()
    };
    // Home: 2.6 - 2 x 0.3 = 2.0; Away: 2.5 + 1.2 + 1.0 = 4.7. Clear away.
    let result = score(&bundle, &config);
    assert_eq!(result.label, ConsensusLabel::Pick(Outcome::Away));
    assert!((result.scores[&Outcome::Home] - 2.0).abs() < 1e-9);
    assert!((result.scores[&Outcome::Away] - 4.7).abs() < 1e-9);
}

#[test]
fn label_is_argmax_when_gap_is_clear() {
    let bundle = ModelOutputBundle {
        poisson: Some(Outcome::Draw),
        bradley_terry: Some(Outcome::Draw),
        osl: Some(Outcome::Home),
        regression: None,
        fuzzy: None,
        upset_diff: 0.0,
    };
    let result = score(&bundle, &ConsensusConfig::default());
    // Draw: 3.0 + 2.5 + 1.0 pair bonus = 6.5 vs Home 2.0.
    assert_eq!(result.label, ConsensusLabel::Pick(Outcome::Draw));
    assert_eq!(result.band, ConfidenceBand::Strong);
}

#[test]
fn band_tracks_score_magnitude() {
    let lone = ModelOutputBundle {
        poisson: Some(Outcome::Home),
        ..ModelOutputBundle::default()
    };
    let result = score(&lone, &ConsensusConfig::default());
    assert_eq!(result.label, ConsensusLabel::Pick(Outcome::Home));
    assert_eq!(result.band, ConfidenceBand::Weak);
}
