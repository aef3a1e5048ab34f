use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use linfa::prelude::*;
use linfa_logistic::LogisticRegression;
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::data::Dataset;
use crate::types::RegionalStats;

/// Fitted binary logistic classifier, reduced to its parameters so the
/// artifact serializes as plain data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticParams {
    pub intercept: f64,
    pub weights: Vec<f64>,
}

impl LogisticParams {
    /// Probability of the positive class ("rain tomorrow").
    pub fn predict_proba(&self, x: &[f64]) -> f64 {
        let z: f64 = self.intercept
            + self
                .weights
                .iter()
                .zip(x)
                .map(|(w, v)| w * v)
                .sum::<f64>();
        let p = 1.0 / (1.0 + (-z).exp());
        // exp() can overflow z to +/-inf; keep the output a probability.
        if p.is_nan() {
            0.5
        } else {
            p.clamp(0.0, 1.0)
        }
    }
}

/// Per-feature standardization fitted on the training split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(x: &Array2<f64>) -> StandardScaler {
        let n = x.nrows().max(1) as f64;
        let means: Vec<f64> = x
            .axis_iter(Axis(1))
            .map(|col| col.sum() / n)
            .collect();
        let stds: Vec<f64> = x
            .axis_iter(Axis(1))
            .zip(&means)
            .map(|(col, &m)| (col.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / n).sqrt())
            .collect();
        StandardScaler { means, stds }
    }

    /// In-place transform. Errors on a feature-count mismatch; constant
    /// columns (std 0) are centered only.
    pub fn transform(&self, x: &mut [f64]) -> Result<()> {
        if x.len() != self.means.len() {
            bail!(
                "scaler feature length mismatch: got {}, expected {}",
                x.len(),
                self.means.len()
            );
        }
        for ((v, m), s) in x.iter_mut().zip(&self.means).zip(&self.stds) {
            *v = (*v - m) / if *s > 0.0 { *s } else { 1.0 };
        }
        Ok(())
    }

    fn transform_matrix(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = x.clone();
        for mut row in out.axis_iter_mut(Axis(0)) {
            for (j, v) in row.iter_mut().enumerate() {
                let s = self.stds[j];
                *v = (*v - self.means[j]) / if s > 0.0 { s } else { 1.0 };
            }
        }
        out
    }
}

/// Mean-strategy imputer: replaces NaN entries with the per-feature mean
/// observed at fit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeanImputer {
    pub means: Vec<f64>,
}

impl MeanImputer {
    pub fn fit(x: &Array2<f64>) -> MeanImputer {
        let means = x
            .axis_iter(Axis(1))
            .map(|col| {
                let finite: Vec<f64> = col.iter().copied().filter(|v| v.is_finite()).collect();
                if finite.is_empty() {
                    0.0
                } else {
                    finite.iter().sum::<f64>() / finite.len() as f64
                }
            })
            .collect();
        MeanImputer { means }
    }

    pub fn transform(&self, x: &mut [f64]) -> Result<()> {
        if x.len() != self.means.len() {
            bail!(
                "imputer feature length mismatch: got {}, expected {}",
                x.len(),
                self.means.len()
            );
        }
        for (v, m) in x.iter_mut().zip(&self.means) {
            if v.is_nan() {
                *v = *m;
            }
        }
        Ok(())
    }
}

/// Everything training produces. Loaded once at startup and treated as
/// read-only for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub feature_columns: Vec<String>,
    pub classifier: LogisticParams,
    pub scaler: StandardScaler,
    pub imputer: Option<MeanImputer>,
    pub feature_importance: Option<BTreeMap<String, f64>>,
    pub regional_stats: Option<BTreeMap<String, RegionalStats>>,
}

impl ModelArtifact {
    pub fn load(path: &Path) -> Result<ModelArtifact> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read model artifact at {}", path.display()))?;
        bincode::deserialize(&bytes)
            .with_context(|| format!("failed to decode model artifact at {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let bytes = bincode::serialize(self).context("failed to encode model artifact")?;
        std::fs::write(path, bytes)
            .with_context(|| format!("failed to write model artifact to {}", path.display()))?;
        Ok(())
    }

    /// Train a fresh model on the dataset: 80/20 shuffled split, scaler
    /// fit on the training portion, logistic regression on the scaled
    /// features, held-out accuracy logged.
    pub fn train(dataset: &Dataset) -> Result<ModelArtifact> {
        if dataset.is_empty() {
            bail!("cannot train: dataset is empty");
        }

        let feature_columns = dataset.feature_columns();
        let x = dataset.feature_matrix(&feature_columns);
        let y = dataset.labels()?;

        // Deterministic split so retraining on the same data reproduces
        // the same model.
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let mut indices: Vec<usize> = (0..x.nrows()).collect();
        indices.shuffle(&mut rng);
        let n_test = (x.nrows() / 5).max(1);
        let (test_idx, train_idx) = indices.split_at(n_test);

        let x_train = x.select(Axis(0), train_idx);
        let y_train = y.select(Axis(0), train_idx);
        let x_test = x.select(Axis(0), test_idx);
        let y_test = y.select(Axis(0), test_idx);

        let scaler = StandardScaler::fit(&x_train);
        let x_train_scaled = scaler.transform_matrix(&x_train);

        let train_ds = linfa::Dataset::new(x_train_scaled, y_train);
        let fitted = LogisticRegression::default()
            .max_iterations(300)
            .fit(&train_ds)
            .map_err(|e| anyhow!("logistic regression fit failed: {e}"))?;

        let classifier = LogisticParams {
            intercept: fitted.intercept(),
            weights: fitted.params().to_vec(),
        };

        let accuracy = holdout_accuracy(&classifier, &scaler, &x_test, &y_test);
        tracing::info!(
            "model trained on {} rows ({} features), held-out accuracy {:.4}",
            train_idx.len(),
            feature_columns.len(),
            accuracy
        );

        let feature_importance: BTreeMap<String, f64> = feature_columns
            .iter()
            .zip(&classifier.weights)
            .map(|(c, w)| (c.clone(), w.abs()))
            .collect();

        let imputer = MeanImputer::fit(&x);
        let regional_stats = dataset.regional_stats();

        Ok(ModelArtifact {
            feature_columns,
            classifier,
            scaler,
            imputer: Some(imputer),
            feature_importance: Some(feature_importance),
            regional_stats: Some(regional_stats),
        })
    }
}

fn holdout_accuracy(
    params: &LogisticParams,
    scaler: &StandardScaler,
    x_test: &Array2<f64>,
    y_test: &Array1<i32>,
) -> f64 {
    if x_test.nrows() == 0 {
        return 0.0;
    }
    let scaled = scaler.transform_matrix(x_test);
    let correct = scaled
        .axis_iter(Axis(0))
        .zip(y_test.iter())
        .filter(|(row, &label)| {
            let p = params.predict_proba(row.as_slice().unwrap_or(&[]));
            (p > 0.5) as i32 == label
        })
        .count();
    correct as f64 / x_test.nrows() as f64
}
