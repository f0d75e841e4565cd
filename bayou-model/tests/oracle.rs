//! Scoring model tests with randomly initialised weights.

use approx::assert_relative_eq;
use bayou_core::beam::{DecoderInput, Edge};
use bayou_core::{synthesize, BeamConfig, CoreError, EvidenceKind, EvidenceSet, ScoringOracle};
use bayou_model::{BayouModel, EvidenceConfig, ModelConfig, ModelVocabulary};
use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use serde_json::json;
use tempfile::tempdir;

const VOCAB: &str = r#"{
    "decoder": ["DSubTree", "STOP", "DBranch", "DLoop", "DExcept",
                "java.io.BufferedReader.readLine()", "java.io.BufferedReader.close()"],
    "evidence": {"apicalls": ["readLine", "close"], "types": ["BufferedReader"]}
}"#;

fn config() -> ModelConfig {
    ModelConfig {
        latent_size: 8,
        units: 6,
        embedding_size: 4,
        batch_size: 3,
        evidence: vec![
            EvidenceConfig {
                kind: EvidenceKind::ApiCalls,
                units: 5,
                sigma: 0.5,
            },
            EvidenceConfig {
                kind: EvidenceKind::Types,
                units: 3,
                sigma: 1.0,
            },
        ],
    }
}

fn random_model() -> (BayouModel, VarMap) {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let vocab = ModelVocabulary::from_json(VOCAB).unwrap();
    let model = BayouModel::from_parts(config(), vocab, vb).unwrap();
    (model, varmap)
}

fn evidence() -> EvidenceSet {
    EvidenceSet::from_json(&json!({"apicalls": ["readLine"], "types": ["BufferedReader"]}))
}

#[test]
fn test_encode_shapes_and_covariance() {
    let (model, _) = random_model();
    let latent = model.encode(&evidence()).unwrap();
    assert_eq!(latent.mean.len(), 8);
    // precisions 4 and 1
    for c in &latent.covariance {
        assert_relative_eq!(*c, 1.0 / 6.0, epsilon = 1e-6);
    }

    let prior = model.encode(&EvidenceSet::new()).unwrap();
    assert!(prior.mean.iter().all(|m| *m == 0.0));
    assert!(prior.covariance.iter().all(|c| *c == 1.0));
}

#[test]
fn test_step_contract() {
    let (model, _) = random_model();
    let state = model.initial_state(&[0.1; 8]).unwrap();
    assert_eq!(state.len(), 6);

    let control = model.vocabulary().control();
    let inputs: Vec<_> = [Edge::Sibling, Edge::Child, Edge::Sibling]
        .iter()
        .map(|&edge| DecoderInput {
            symbol: control.subtree,
            edge,
            state: &state,
        })
        .collect();
    let output = model.step(&inputs).unwrap();

    assert_eq!(output.states.len(), 3);
    for (scores, ids) in output.log_probs.iter().zip(&output.indices) {
        assert_eq!(scores.len(), 3);
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        assert!(ids.iter().all(|&id| id < 7));
        let mass: f32 = scores.iter().map(|s| s.exp()).sum();
        assert!(mass <= 1.0 + 1e-5);
    }
    // same input and edge give the same row
    assert_eq!(output.indices[0], output.indices[2]);
    for (x, y) in output.log_probs[0].iter().zip(&output.log_probs[2]) {
        assert_relative_eq!(*x, *y, epsilon = 1e-6);
    }
}

#[test]
fn test_rejects_wrong_batch_and_latent() {
    let (model, _) = random_model();
    let state = model.initial_state(&[0.0; 8]).unwrap();
    let one = [DecoderInput {
        symbol: 0,
        edge: Edge::Sibling,
        state: &state,
    }];
    assert!(matches!(model.step(&one), Err(CoreError::Oracle { .. })));
    assert!(matches!(
        model.initial_state(&[0.0; 3]),
        Err(CoreError::DimensionMismatch {
            expected: 8,
            actual: 3
        })
    ));
}

#[test]
fn test_synthesize_with_random_weights() {
    let (model, _) = random_model();
    let config = BeamConfig::new(3).with_max_rounds(6);
    match synthesize(&model, &evidence(), config) {
        Ok(asts) => {
            assert!(!asts.is_empty() && asts.len() <= 3);
            assert!(asts.windows(2).all(|w| w[0].log_probability >= w[1].log_probability));
            assert!(asts.iter().all(|a| a.probability <= 1.0));
        }
        Err(CoreError::BeamExhausted { rounds }) => assert_eq!(rounds, 6),
        Err(e) => panic!("unexpected error: {}", e),
    }
}

#[test]
fn test_beam_width_follows_batch_size_override() {
    let (model, _) = random_model();
    let model = model.with_batch_size(5).unwrap();
    assert_eq!(model.batch_size(), 5);
    assert_eq!(model.config().batch_size, 5);

    let config = BeamConfig::new(5).with_max_rounds(4);
    match synthesize(&model, &evidence(), config) {
        Ok(asts) => assert!(!asts.is_empty() && asts.len() <= 5),
        Err(CoreError::BeamExhausted { rounds }) => assert_eq!(rounds, 4),
        Err(e) => panic!("unexpected error: {}", e),
    }
    assert!(matches!(
        synthesize(&model, &evidence(), BeamConfig::new(3)),
        Err(CoreError::OracleContractViolation { .. })
    ));

    let (model, _) = random_model();
    assert!(model.with_batch_size(0).is_err());
}

#[test]
fn test_load_from_directory() {
    let (model, varmap) = random_model();
    let dir = tempdir().unwrap();
    varmap.save(dir.path().join("model.safetensors")).unwrap();
    std::fs::write(
        dir.path().join("config.json"),
        serde_json::to_string(&config()).unwrap(),
    )
    .unwrap();
    std::fs::write(dir.path().join("vocab.json"), VOCAB).unwrap();

    let loaded = BayouModel::load(dir.path()).unwrap();
    let a = model.encode(&evidence()).unwrap();
    let b = loaded.encode(&evidence()).unwrap();
    for (x, y) in a.mean.iter().zip(&b.mean) {
        assert_relative_eq!(*x, *y, epsilon = 1e-6);
    }
}

#[test]
fn test_load_missing_directory() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope");
    assert!(BayouModel::load(&missing).is_err());
}
