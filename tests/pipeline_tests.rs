/// Integration tests for the feature-alignment and inference pipeline.
///
/// Run with: cargo test --test pipeline_tests -- --nocapture
use std::collections::BTreeMap;

use rainfall_api::adjust::{adjust_prediction, calculated_annual_rainfall, confidence_label};
use rainfall_api::data::Dataset;
use rainfall_api::error::ApiError;
use rainfall_api::model::{LogisticParams, MeanImputer, ModelArtifact, StandardScaler};
use rainfall_api::pipeline::ModelService;
use rainfall_api::types::{InputRecord, RegionalStats, Subdivision};

const TOY_SCHEMA: [&str; 5] = ["YEAR", "JAN", "FEB", "MONSOON", "SUBDIVISION_KERALA"];

fn kerala_stats() -> RegionalStats {
    RegionalStats {
        avg_annual_rainfall: 3000.0,
        monsoon_rainfall_pct: 68.0,
        rain_probability: 0.6,
        sample_count: 13,
    }
}

/// Identity-scaled artifact over a tiny fixed schema so feature values
/// pass through preprocessing unchanged.
fn toy_artifact() -> ModelArtifact {
    let n = TOY_SCHEMA.len();
    let mut regional_stats = BTreeMap::new();
    regional_stats.insert("KERALA".to_string(), kerala_stats());
    ModelArtifact {
        feature_columns: TOY_SCHEMA.iter().map(|s| s.to_string()).collect(),
        classifier: LogisticParams {
            intercept: 0.0,
            weights: vec![0.0; n],
        },
        scaler: StandardScaler {
            means: vec![0.0; n],
            stds: vec![1.0; n],
        },
        imputer: Some(MeanImputer { means: vec![0.0; n] }),
        feature_importance: None,
        regional_stats: Some(regional_stats),
    }
}

fn toy_service() -> ModelService {
    ModelService::new(Some(toy_artifact()), Dataset::synthetic())
}

#[test]
fn test_schema_alignment() {
    let service = toy_service();

    let mut record = InputRecord::new();
    record.set("YEAR", 2023);
    record.set("JAN", 12.5);
    record.set("WIND_SPEED", 99.0); // not in the schema, must be dropped
    record.set("HUMIDITY", 55.0);

    let v = service.prepare_features(&record).unwrap();
    assert_eq!(v.len(), TOY_SCHEMA.len(), "vector must match schema length");
    assert_eq!(v[0], 2023.0, "YEAR must land in schema position 0");
    assert_eq!(v[1], 12.5, "JAN must land in schema position 1");
    assert_eq!(v[2], 0.0, "missing FEB must be zero-filled");
    assert_eq!(v[3], 0.0, "missing MONSOON must be zero-filled");
    println!("✓ schema alignment: {v:?}");
}

#[test]
fn test_sentinel_values_become_zero() {
    let service = toy_service();

    let mut record = InputRecord::new();
    record.set("YEAR", 2023);
    record.set("JAN", "nan");
    record.set("FEB", "");
    record.set("MONSOON", serde_json::Value::Null);
    record.set("SUBDIVISION_KERALA", "NULL");

    let v = service.prepare_features(&record).unwrap();
    assert!(v.iter().all(|x| x.is_finite()), "no NaN may reach inference");
    assert_eq!(&v[1..], &[0.0, 0.0, 0.0, 0.0]);
    println!("✓ sentinel normalization: {v:?}");
}

#[test]
fn test_imputer_mismatch_falls_back_to_zero_fill() {
    let mut artifact = toy_artifact();
    // Wrong feature count: transform must fail and the pipeline degrade.
    artifact.imputer = Some(MeanImputer {
        means: vec![5.0; 2],
    });
    let service = ModelService::new(Some(artifact), Dataset::synthetic());

    let mut record = InputRecord::new();
    record.set("YEAR", 2023);
    record.set("JAN", "nan");

    let v = service.prepare_features(&record).unwrap();
    assert_eq!(v.len(), TOY_SCHEMA.len(), "degraded path keeps the shape");
    assert!(v.iter().all(|x| x.is_finite()));

    let out = service.predict(&record).expect("request must still complete");
    assert!((0.0..=1.0).contains(&out.prediction));
    println!("✓ imputer fallback: prediction {:.4}", out.prediction);
}

#[test]
fn test_scaler_mismatch_passes_unscaled() {
    let mut artifact = toy_artifact();
    artifact.scaler = StandardScaler {
        means: vec![0.0; 3],
        stds: vec![1.0; 3],
    };
    let service = ModelService::new(Some(artifact), Dataset::synthetic());

    let mut record = InputRecord::new();
    record.set("YEAR", 2023);
    record.set("JAN", 42.0);

    let v = service.prepare_features(&record).unwrap();
    assert_eq!(v[1], 42.0, "unscaled value must pass through on failure");
    println!("✓ scaler degradation: {v:?}");
}

#[test]
fn test_scaling_applies_fitted_parameters() {
    let mut artifact = toy_artifact();
    artifact.scaler = StandardScaler {
        means: vec![2000.0, 0.0, 0.0, 0.0, 0.0],
        stds: vec![10.0, 1.0, 1.0, 1.0, 1.0],
    };
    let service = ModelService::new(Some(artifact), Dataset::synthetic());

    let mut record = InputRecord::new();
    record.set("YEAR", 2020);

    let v = service.prepare_features(&record).unwrap();
    assert!((v[0] - 2.0).abs() < 1e-12, "(2020-2000)/10 = 2");
    println!("✓ standardization: {v:?}");
}

#[test]
fn test_prediction_always_bounded() {
    let mut artifact = toy_artifact();
    artifact.classifier = LogisticParams {
        intercept: 0.0,
        weights: vec![1e6; TOY_SCHEMA.len()],
    };
    let service = ModelService::new(Some(artifact), Dataset::synthetic());

    let mut record = InputRecord::new();
    record.set("YEAR", 2023);
    record.set("JAN", 1e9);
    record.set("SUBDIVISION_KERALA", 1);
    record.set("MONSOON", 1);
    record.set("RainToday", 1);

    let out = service.predict(&record).unwrap();
    assert!(
        (0.0..=1.0).contains(&out.prediction),
        "probability out of range: {}",
        out.prediction
    );
    println!("✓ bounded output: {:.4}", out.prediction);
}

#[test]
fn test_adjuster_clamps_out_of_range_raw() {
    let record = InputRecord::new();
    for raw in [-0.5, 1.7, f64::MAX, f64::MIN] {
        let adj = adjust_prediction(raw, &record, None);
        assert!(
            (0.0..=1.0).contains(&adj.probability),
            "raw {raw} produced {}",
            adj.probability
        );
    }
    println!("✓ adjuster clamps arbitrary raw outputs");
}

#[test]
fn test_adjuster_is_idempotent() {
    let stats = kerala_stats();
    let mut record = InputRecord::new();
    record.set("YEAR", 2023);
    record.set("MONSOON", 1);
    record.set("SUBDIVISION_KERALA", 1);
    record.set("RainToday", 1);

    let a = adjust_prediction(0.5, &record, Some((Subdivision::Kerala, &stats)));
    let b = adjust_prediction(0.5, &record, Some((Subdivision::Kerala, &stats)));
    assert_eq!(a, b, "same inputs must give the same result");
    println!("✓ adjuster idempotent: {:.5}", a.probability);
}

#[test]
fn test_kerala_monsoon_rain_today_scenario() {
    // blend: 0.5*0.7 + 0.6*0.3 = 0.53
    // monsoon + high-rainfall boost: 0.53*1.3 = 0.689
    // rain-today boost: 0.689*1.15 = 0.79235
    let stats = kerala_stats();
    let mut record = InputRecord::new();
    record.set("YEAR", 2023);
    record.set("MONSOON", 1);
    record.set("SUBDIVISION_KERALA", 1);
    record.set("RainToday", 1);

    let adj = adjust_prediction(0.5, &record, Some((Subdivision::Kerala, &stats)));
    assert!(
        (adj.probability - 0.79235).abs() < 1e-9,
        "expected ~0.79235, got {}",
        adj.probability
    );
    println!("✓ worked scenario: {:.5}", adj.probability);
}

#[test]
fn test_no_subdivision_skips_regional_blend() {
    let mut record = InputRecord::new();
    record.set("YEAR", 2023);

    let adj = adjust_prediction(0.9, &record, None);
    assert!((adj.probability - 0.9).abs() < 1e-12);
    assert_eq!(adj.confidence, "High");
    println!("✓ blend skipped without subdivision flag");
}

#[test]
fn test_boosts_cap_at_095() {
    let stats = kerala_stats();
    let mut record = InputRecord::new();
    record.set("YEAR", 2023);
    record.set("MONSOON", 1);
    record.set("SUBDIVISION_KERALA", 1);
    record.set("RainToday", 1);

    let adj = adjust_prediction(1.0, &record, Some((Subdivision::Kerala, &stats)));
    assert!(adj.probability <= 0.95, "boosts must cap at 0.95");
    println!("✓ boost cap: {:.5}", adj.probability);
}

#[test]
fn test_confidence_bands() {
    assert_eq!(confidence_label(0.85), "High");
    assert_eq!(confidence_label(0.1), "High");
    assert_eq!(confidence_label(0.7), "Medium");
    assert_eq!(confidence_label(0.3), "Medium");
    assert_eq!(confidence_label(0.5), "Low");
    assert_eq!(confidence_label(0.65), "Low");
    println!("✓ confidence bands match documented thresholds");
}

#[test]
fn test_calculated_annual_rainfall() {
    let mut record = InputRecord::new();
    record.set("YEAR", 2023);
    record.set("JAN", 10.0);
    record.set("FEB", 20.0);

    let annual = calculated_annual_rainfall(&record).expect("monthly values supplied");
    assert!((annual - 30.0).abs() < 1e-12);

    // Sentinel strings and nulls do not count as supplied.
    let mut empty = InputRecord::new();
    empty.set("YEAR", 2023);
    empty.set("JAN", "nan");
    empty.set("FEB", "");
    empty.set("MAR", serde_json::Value::Null);
    assert!(calculated_annual_rainfall(&empty).is_none());

    // Mixed: only the real number contributes.
    let mut mixed = InputRecord::new();
    mixed.set("YEAR", 2023);
    mixed.set("JAN", "nan");
    mixed.set("FEB", 20.0);
    assert_eq!(calculated_annual_rainfall(&mixed), Some(20.0));
    println!("✓ calculated annual rainfall = {annual}");
}

#[test]
fn test_sentinel_monthly_does_not_attach_calculated_annual() {
    let service = toy_service();

    let mut record = InputRecord::new();
    record.set("YEAR", 2023);
    record.set("JAN", "nan");
    record.set("SUBDIVISION_KERALA", 1);

    let out = service.predict(&record).unwrap();
    let info = out.regional_info.expect("regional info expected");
    assert_eq!(info["subdivision"], "KERALA");
    assert!(
        info.get("calculated_annual_rainfall").is_none(),
        "sentinel-only monthly input must not yield a derived annual"
    );
    println!("✓ no derived annual for sentinel-only monthly fields");
}

#[test]
fn test_calculated_annual_attached_to_regional_info() {
    let service = toy_service();

    let mut record = InputRecord::new();
    record.set("YEAR", 2023);
    record.set("JAN", 10.0);
    record.set("FEB", 20.0);
    record.set("SUBDIVISION_KERALA", 1);

    let out = service.predict(&record).unwrap();
    let info = out.regional_info.expect("regional info expected");
    assert_eq!(info["subdivision"], "KERALA");
    assert_eq!(info["calculated_annual_rainfall"], 30.0);
    println!("✓ regional info: {info}");
}

#[test]
fn test_missing_year_is_validation_error() {
    let service = toy_service();

    let mut record = InputRecord::new();
    record.set("JAN", 10.0);

    let err = service.predict(&record).unwrap_err();
    assert!(
        matches!(err, ApiError::Validation(_)),
        "expected validation error, got {err:?}"
    );
    println!("✓ missing YEAR rejected: {err}");
}

#[test]
fn test_predict_without_model_fails() {
    let service = ModelService::new(None, Dataset::synthetic());

    let mut record = InputRecord::new();
    record.set("YEAR", 2023);

    let err = service.predict(&record).unwrap_err();
    assert!(matches!(err, ApiError::ModelNotLoaded));
    println!("✓ inference without a model refused: {err}");
}

#[test]
fn test_lazy_imputer_fallback_completes() {
    let mut artifact = toy_artifact();
    artifact.imputer = None;
    let service = ModelService::new(Some(artifact), Dataset::synthetic());

    let mut record = InputRecord::new();
    record.set("YEAR", 2023);
    record.set("JAN", "nan");

    // First call synthesizes the imputer from the training data; a second
    // call reuses it and must agree.
    let a = service.prepare_features(&record).unwrap();
    let b = service.prepare_features(&record).unwrap();
    assert_eq!(a, b);
    assert!(a.iter().all(|x| x.is_finite()));
    println!("✓ lazy imputer fallback: {a:?}");
}

#[test]
fn test_unknown_region_treated_as_no_region() {
    // Stats map lacks the flagged subdivision: the blend must be skipped.
    let mut artifact = toy_artifact();
    artifact.regional_stats = Some(BTreeMap::new());
    let service = ModelService::new(Some(artifact), Dataset::synthetic());

    let mut record = InputRecord::new();
    record.set("YEAR", 2023);
    record.set("SUBDIVISION_KERALA", 1);

    let out = service.predict(&record).unwrap();
    // Zero-weight classifier gives raw 0.5; no blend, no boosts apply.
    assert!((out.prediction - 0.5).abs() < 1e-12);
    println!("✓ unknown regional stats ignored: {:.4}", out.prediction);
}
