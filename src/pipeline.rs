use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::adjust::{adjust_prediction, calculated_annual_rainfall};
use crate::config::Config;
use crate::data::Dataset;
use crate::error::ApiError;
use crate::model::{MeanImputer, ModelArtifact};
use crate::types::{InputRecord, PredictionOutput, RegionalStats, Subdivision};

/// Shared, read-only prediction service: the trained artifact, the dataset
/// backing the statistics endpoints, and a one-shot guard for the lazy
/// imputer fallback. Constructed once at startup, then only read.
pub struct ModelService {
    artifact: Option<ModelArtifact>,
    dataset: Dataset,
    // Fitted on first use when the artifact carries no imputer. The lock
    // guarantees concurrent first requests fit it exactly once.
    fallback_imputer: Mutex<Option<MeanImputer>>,
}

impl ModelService {
    pub fn new(artifact: Option<ModelArtifact>, dataset: Dataset) -> ModelService {
        ModelService {
            artifact,
            dataset,
            fallback_imputer: Mutex::new(None),
        }
    }

    /// Load the persisted artifact, or train a new one when it is absent
    /// or unreadable. Fails only if training itself fails.
    pub fn startup(config: &Config) -> Result<ModelService> {
        let dataset = Dataset::load_or_synthesize(&config.data_path);

        let artifact = match ModelArtifact::load(&config.model_path) {
            Ok(artifact) => {
                tracing::info!("model loaded from {}", config.model_path.display());
                artifact
            }
            Err(e) => {
                tracing::warn!("model not loadable ({e:#}); training a new one");
                let artifact =
                    ModelArtifact::train(&dataset).context("failed to train fallback model")?;
                if let Err(e) = artifact.save(&config.model_path) {
                    tracing::warn!("failed to persist model artifact: {e:#}");
                } else {
                    tracing::info!("model saved to {}", config.model_path.display());
                }
                artifact
            }
        };

        Ok(ModelService::new(Some(artifact), dataset))
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn artifact(&self) -> Option<&ModelArtifact> {
        self.artifact.as_ref()
    }

    /// Full pipeline: validate, align to the training schema, impute,
    /// scale, run inference, then apply the heuristic adjustment chain.
    pub fn predict(&self, record: &InputRecord) -> Result<PredictionOutput, ApiError> {
        record.validate()?;
        let artifact = self.artifact.as_ref().ok_or(ApiError::ModelNotLoaded)?;

        let features = self.prepare(artifact, record);
        let raw = artifact.classifier.predict_proba(&features);

        let region = self.resolve_region(artifact, record);
        let adjusted = adjust_prediction(raw, record, region.as_ref().map(|(s, st)| (*s, st)));

        Ok(PredictionOutput {
            prediction: adjusted.probability,
            input_data: record.clone(),
            confidence: adjusted.confidence.to_string(),
            regional_info: build_regional_info(record, region),
        })
    }

    /// Prepared feature vector: exactly `feature_columns` long, in
    /// training order, free of NaN. Never fails; preprocessing problems
    /// degrade and are logged.
    pub fn prepare_features(&self, record: &InputRecord) -> Result<Vec<f64>, ApiError> {
        let artifact = self.artifact.as_ref().ok_or(ApiError::ModelNotLoaded)?;
        Ok(self.prepare(artifact, record))
    }

    fn prepare(&self, artifact: &ModelArtifact, record: &InputRecord) -> Vec<f64> {
        // Schema resolution: training-time order is positional truth for
        // the scaler and classifier. Missing features become 0, extra
        // input fields are dropped.
        let mut v: Vec<f64> = artifact
            .feature_columns
            .iter()
            .map(|col| record.coerced(col).unwrap_or(0.0))
            .collect();

        self.impute(artifact, &mut v);

        if let Err(e) = artifact.scaler.transform(&mut v) {
            tracing::warn!("scaling failed, serving unscaled features: {e}");
        }

        // Nothing non-finite may reach the classifier.
        for x in v.iter_mut() {
            if x.is_nan() {
                *x = 0.0;
            }
        }
        v
    }

    fn impute(&self, artifact: &ModelArtifact, v: &mut [f64]) {
        let result = match artifact.imputer.as_ref() {
            Some(imputer) => imputer.transform(v),
            None => {
                let mut guard = self.fallback_imputer.lock();
                let imputer = guard.get_or_insert_with(|| {
                    tracing::warn!(
                        "artifact carries no imputer; fitting mean imputer from training data"
                    );
                    let x = self.dataset.feature_matrix(&artifact.feature_columns);
                    MeanImputer::fit(&x)
                });
                imputer.transform(v)
            }
        };
        if let Err(e) = result {
            tracing::warn!("imputation failed, zero-filling missing values: {e}");
            for x in v.iter_mut() {
                if x.is_nan() {
                    *x = 0.0;
                }
            }
        }
    }

    fn resolve_region(
        &self,
        artifact: &ModelArtifact,
        record: &InputRecord,
    ) -> Option<(Subdivision, RegionalStats)> {
        let sub = Subdivision::from_record(record)?;
        let stats = artifact.regional_stats.as_ref()?.get(sub.name())?;
        Some((sub, stats.clone()))
    }

    /// Run one inference on an all-zeros record to surface model problems
    /// at startup rather than on the first request.
    pub fn warmup(&self) -> Result<(), ApiError> {
        let mut record = InputRecord::new();
        record.set("YEAR", 2023);
        let out = self.predict(&record)?;
        tracing::info!("warmup prediction ok ({:.4})", out.prediction);
        Ok(())
    }
}

fn build_regional_info(
    record: &InputRecord,
    region: Option<(Subdivision, RegionalStats)>,
) -> Option<Value> {
    let mut info = match region {
        Some((sub, stats)) => json!({
            "subdivision": sub.name(),
            "avg_annual_rainfall": stats.avg_annual_rainfall,
            "monsoon_rainfall_pct": stats.monsoon_rainfall_pct,
            "rain_probability": stats.rain_probability,
            "sample_count": stats.sample_count,
        }),
        None => json!({}),
    };

    // Derived from the request, distinct from the dataset's ANNUAL mean.
    if let Some(annual) = calculated_annual_rainfall(record) {
        info["calculated_annual_rainfall"] = json!(annual);
    }

    match info.as_object() {
        Some(map) if map.is_empty() => None,
        _ => Some(info),
    }
}
