use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ndarray::{Array1, Array2};
use rand::Rng;
use serde_json::{json, Value};

use crate::types::{RegionalStats, Subdivision, MONTHS, SEASON_FLAGS};

pub const LABEL_COLUMN: &str = "PredictedRainTomorrow";
pub const RAIN_TODAY_COLUMN: &str = "RainToday";

const MONSOON_MONTHS: [&str; 4] = ["JUN", "JUL", "AUG", "SEP"];

/// In-memory tabular dataset: one numeric row per (subdivision, year)
/// observation, plus the resolved subdivision per row for the regional
/// endpoints.
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
    region: Vec<Option<Subdivision>>,
}

/// Full column contract of the dataset, in canonical order.
pub fn standard_columns() -> Vec<String> {
    let mut cols = vec!["YEAR".to_string()];
    cols.extend(MONTHS.iter().map(|m| m.to_string()));
    for agg in ["Jan_Feb", "Mar_May", "Jun_Sep", "Oct_Dec", "ANNUAL"] {
        cols.push(agg.to_string());
    }
    cols.extend(SEASON_FLAGS.iter().map(|s| s.to_string()));
    cols.extend(Subdivision::ALL.iter().map(|s| s.column().to_string()));
    cols.push(RAIN_TODAY_COLUMN.to_string());
    cols.push(LABEL_COLUMN.to_string());
    cols
}

fn is_binary_column(name: &str) -> bool {
    name.starts_with("SUBDIVISION_")
        || SEASON_FLAGS.contains(&name)
        || name == RAIN_TODAY_COLUMN
        || name == LABEL_COLUMN
}

impl Dataset {
    /// Load the CSV at `path`, checking a few fallback locations; when no
    /// file is found or parsing fails, generate a synthetic dataset so the
    /// service can still train and serve.
    pub fn load_or_synthesize(path: &Path) -> Dataset {
        let mut candidates: Vec<PathBuf> = vec![path.to_path_buf()];
        candidates.push(PathBuf::from("./rainfall_data.csv"));
        candidates.push(PathBuf::from("./data/rainfall_data.csv"));
        candidates.push(PathBuf::from("../data/rainfall_data.csv"));

        for candidate in &candidates {
            if !candidate.exists() {
                continue;
            }
            match Self::from_csv(candidate) {
                Ok(ds) => {
                    tracing::info!(
                        "dataset loaded from {} ({} rows, {} columns)",
                        candidate.display(),
                        ds.len(),
                        ds.columns.len()
                    );
                    return ds;
                }
                Err(e) => {
                    tracing::warn!("failed to load dataset {}: {e:#}", candidate.display());
                }
            }
        }

        tracing::warn!("no dataset found; generating synthetic rainfall data");
        Self::synthetic()
    }

    pub fn from_csv(path: &Path) -> Result<Dataset> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open dataset at {}", path.display()))?;
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .has_headers(true)
            .from_reader(file);

        let headers = rdr.headers().context("failed to read CSV headers")?.clone();
        let name_col = headers.iter().position(|h| h == "SUBDIVISION");

        // Numeric columns are everything except the textual SUBDIVISION tag.
        let columns: Vec<String> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != name_col)
            .map(|(_, h)| h.to_string())
            .collect();

        let mut rows = Vec::new();
        let mut region = Vec::new();
        for result in rdr.records() {
            let raw = result.context("failed to read CSV record")?;
            if raw.iter().all(|f| f.trim().is_empty()) {
                continue;
            }
            if raw.len() != headers.len() {
                tracing::warn!(
                    "skipping line {}: expected {} fields, found {}",
                    raw.position().map(|p| p.line()).unwrap_or(0),
                    headers.len(),
                    raw.len()
                );
                continue;
            }

            let mut row = Vec::with_capacity(columns.len());
            let mut sub = name_col
                .and_then(|i| raw.get(i))
                .and_then(Subdivision::parse);
            for (i, field) in raw.iter().enumerate() {
                if Some(i) == name_col {
                    continue;
                }
                let name = &headers[i];
                let mut v: f64 = field.trim().parse().unwrap_or(0.0);
                if !v.is_finite() {
                    v = 0.0;
                }
                if is_binary_column(name) {
                    v = if v != 0.0 { 1.0 } else { 0.0 };
                }
                row.push(v);
            }
            if sub.is_none() {
                // Fall back to the one-hot flags.
                sub = Subdivision::ALL.iter().copied().find(|s| {
                    columns
                        .iter()
                        .position(|c| c == s.column())
                        .map(|idx| row[idx] == 1.0)
                        .unwrap_or(false)
                });
            }
            rows.push(row);
            region.push(sub);
        }

        if rows.is_empty() {
            bail!("dataset at {} contains no rows", path.display());
        }
        Ok(Dataset {
            columns,
            rows,
            region,
        })
    }

    /// Synthetic data with the same column contract as the real dataset:
    /// one row per subdivision per year 2010-2022, monthly rainfall drawn
    /// from region-class ranges, rain flags drawn from season- and
    /// region-adjusted probabilities.
    pub fn synthetic() -> Dataset {
        let mut rng = rand::thread_rng();
        let columns = standard_columns();
        let mut rows = Vec::new();
        let mut region = Vec::new();

        for sub in Subdivision::ALL {
            for year in 2010..=2022 {
                let ranges = monthly_ranges(sub);
                let monthly: Vec<f64> = ranges
                    .iter()
                    .map(|&(lo, hi)| rng.gen_range(lo..hi))
                    .collect();

                let jan_feb: f64 = monthly[0] + monthly[1];
                let mar_may: f64 = monthly[2..5].iter().sum();
                let jun_sep: f64 = monthly[5..9].iter().sum();
                let oct_dec: f64 = monthly[9..12].iter().sum();
                let annual: f64 = monthly.iter().sum();

                // Pick a "current month" to set the seasonal indicators.
                let month = rng.gen_range(0usize..12);
                let spring = (2..=4).contains(&month);
                let summer = (5..=7).contains(&month);
                let monsoon = (5..=8).contains(&month);
                let autumn = (8..=10).contains(&month);
                let winter = month == 11 || month <= 1;

                let mut rain_p: f64 = if monsoon {
                    0.8
                } else if summer {
                    0.5
                } else if spring {
                    0.4
                } else if autumn {
                    0.3
                } else if winter {
                    0.2
                } else {
                    0.0
                };
                if sub.is_high_rainfall() {
                    rain_p += 0.2;
                } else if matches!(sub, Subdivision::WestRajasthan | Subdivision::SaurashtraKutch)
                {
                    rain_p -= 0.2;
                }
                let rain_today = rng.gen::<f64>() < rain_p;

                let tomorrow_p =
                    (rain_p + if rain_today { 0.2 } else { -0.1 }).clamp(0.0, 1.0);
                let rain_tomorrow = rng.gen::<f64>() < tomorrow_p;

                let mut row = Vec::with_capacity(columns.len());
                row.push(year as f64);
                row.extend_from_slice(&monthly);
                row.extend_from_slice(&[jan_feb, mar_may, jun_sep, oct_dec, annual]);
                for flag in [spring, summer, monsoon, autumn, winter] {
                    row.push(flag as u8 as f64);
                }
                for other in Subdivision::ALL {
                    row.push((other == sub) as u8 as f64);
                }
                row.push(rain_today as u8 as f64);
                row.push(rain_tomorrow as u8 as f64);

                rows.push(row);
                region.push(Some(sub));
            }
        }

        tracing::info!(
            "generated synthetic dataset with {} rows and {} columns",
            rows.len(),
            columns.len()
        );
        Dataset {
            columns,
            rows,
            region,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn col_idx(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    fn column_values(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.col_idx(name)?;
        Some(self.rows.iter().map(|r| r[idx]).collect())
    }

    /// Columns the model trains on: everything except the label and the
    /// same-day rain flag.
    pub fn feature_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.as_str() != LABEL_COLUMN && c.as_str() != RAIN_TODAY_COLUMN)
            .cloned()
            .collect()
    }

    /// Row-major feature matrix in `cols` order. A column absent from the
    /// dataset yields zeros, mirroring how requests are schema-aligned.
    pub fn feature_matrix(&self, cols: &[String]) -> Array2<f64> {
        let indices: Vec<Option<usize>> = cols.iter().map(|c| self.col_idx(c)).collect();
        let mut m = Array2::zeros((self.rows.len(), cols.len()));
        for (i, row) in self.rows.iter().enumerate() {
            for (j, idx) in indices.iter().enumerate() {
                if let Some(idx) = idx {
                    m[(i, j)] = row[*idx];
                }
            }
        }
        m
    }

    pub fn labels(&self) -> Result<Array1<i32>> {
        let values = self
            .column_values(LABEL_COLUMN)
            .or_else(|| self.column_values(RAIN_TODAY_COLUMN));
        match values {
            Some(v) => Ok(Array1::from_iter(v.into_iter().map(|x| x as i32))),
            None => bail!("dataset has neither {LABEL_COLUMN} nor {RAIN_TODAY_COLUMN} column"),
        }
    }

    fn rows_for(&self, sub: Subdivision) -> Vec<usize> {
        self.region
            .iter()
            .enumerate()
            .filter(|(_, r)| **r == Some(sub))
            .map(|(i, _)| i)
            .collect()
    }

    fn mean_over(&self, rows: &[usize], col: &str) -> Option<f64> {
        let idx = self.col_idx(col)?;
        if rows.is_empty() {
            return None;
        }
        Some(rows.iter().map(|&i| self.rows[i][idx]).sum::<f64>() / rows.len() as f64)
    }

    /// Per-subdivision aggregates baked into the model artifact and used
    /// by the prediction adjuster.
    pub fn regional_stats(&self) -> BTreeMap<String, RegionalStats> {
        let mut out = BTreeMap::new();
        for sub in Subdivision::ALL {
            let rows = self.rows_for(sub);
            if rows.is_empty() {
                continue;
            }
            let avg_annual = self.mean_over(&rows, "ANNUAL").unwrap_or(0.0);
            let monsoon_pct = if avg_annual > 0.0 {
                self.mean_over(&rows, "Jun_Sep").unwrap_or(0.0) / avg_annual * 100.0
            } else {
                0.0
            };
            let rain_probability = self.mean_over(&rows, LABEL_COLUMN).unwrap_or(0.0);
            out.insert(
                sub.name().to_string(),
                RegionalStats {
                    avg_annual_rainfall: avg_annual,
                    monsoon_rainfall_pct: monsoon_pct,
                    rain_probability,
                    sample_count: rows.len(),
                },
            );
        }
        out
    }

    /// Dataset-wide descriptive statistics for the /stats endpoint.
    pub fn rainfall_statistics(&self) -> Option<Value> {
        if self.is_empty() {
            return None;
        }
        let years = self.column_values("YEAR");
        let annual = self.column_values("ANNUAL");

        let overall = annual.as_deref().map(|a| {
            json!({
                "mean_annual_rainfall": mean(a),
                "max_annual_rainfall": a.iter().copied().fold(f64::MIN, f64::max),
                "min_annual_rainfall": a.iter().copied().fold(f64::MAX, f64::min),
                "std_annual_rainfall": std_dev(a),
            })
        });

        let subdivisions: Vec<&str> = Subdivision::ALL
            .iter()
            .filter(|s| !self.rows_for(**s).is_empty())
            .map(|s| s.name())
            .collect();

        let mut stats = json!({
            "total_records": self.len(),
            "time_period": {
                "start_year": years.as_deref().map(|y| y.iter().copied().fold(f64::MAX, f64::min) as i64),
                "end_year": years.as_deref().map(|y| y.iter().copied().fold(f64::MIN, f64::max) as i64),
            },
            "overall_stats": overall,
            "subdivisions": subdivisions,
        });

        // Seasonal totals require the full set of monthly columns.
        if MONTHS.iter().all(|m| self.col_idx(m).is_some()) {
            let season_mean = |months: &[&str]| {
                let idx: Vec<usize> = months.iter().map(|m| self.col_idx(m).unwrap()).collect();
                let totals: Vec<f64> = self
                    .rows
                    .iter()
                    .map(|r| idx.iter().map(|&i| r[i]).sum())
                    .collect();
                mean(&totals)
            };
            stats["seasonal_stats"] = json!({
                "winter": season_mean(&["JAN", "FEB"]),
                "pre_monsoon": season_mean(&["MAR", "APR", "MAY"]),
                "monsoon": season_mean(&MONSOON_MONTHS),
                "post_monsoon": season_mean(&["OCT", "NOV", "DEC"]),
            });
        }

        Some(stats)
    }

    /// Regional profile for the /regional-data endpoint: monthly averages,
    /// a seasonal-pattern description, headline aggregates, and per-year
    /// annual rainfall history.
    pub fn regional_data(&self, sub: Subdivision) -> Option<Value> {
        let rows = self.rows_for(sub);
        if rows.is_empty() {
            return None;
        }

        let mut monthly_averages = serde_json::Map::new();
        for month in MONTHS {
            if let Some(avg) = self.mean_over(&rows, month) {
                monthly_averages.insert(month.to_string(), json!(avg));
            }
        }

        let seasonal_pattern = match monthly_averages
            .iter()
            .max_by(|a, b| {
                let (a, b) = (a.1.as_f64().unwrap_or(0.0), b.1.as_f64().unwrap_or(0.0));
                a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(k, _)| k.as_str())
        {
            Some(m) if MONSOON_MONTHS.contains(&m) => format!(
                "{} receives most of its rainfall during the Southwest Monsoon season \
                 (June-September), with peak rainfall in {m}.",
                sub.name()
            ),
            Some(m) if m == "OCT" || m == "NOV" => format!(
                "{} receives significant rainfall during the Northeast Monsoon \
                 (October-December), with peak rainfall in {m}.",
                sub.name()
            ),
            Some(m) => format!(
                "{} has an unusual rainfall pattern with peak rainfall in {m}.",
                sub.name()
            ),
            None => format!("No monthly data available for {}.", sub.name()),
        };

        let avg_annual = self.mean_over(&rows, "ANNUAL").unwrap_or(0.0);
        let monsoon_pct = if avg_annual > 0.0 {
            self.mean_over(&rows, "Jun_Sep").unwrap_or(0.0) / avg_annual * 100.0
        } else {
            0.0
        };
        let rain_probability = self.mean_over(&rows, LABEL_COLUMN).unwrap_or(0.0);

        let mut historical: Vec<Value> = Vec::new();
        if let (Some(year_idx), Some(annual_idx)) = (self.col_idx("YEAR"), self.col_idx("ANNUAL"))
        {
            let mut seen: Vec<i64> = Vec::new();
            let mut entries: Vec<(i64, f64)> = Vec::new();
            for &i in &rows {
                let year = self.rows[i][year_idx] as i64;
                if !(1901..=2023).contains(&year) || seen.contains(&year) {
                    continue;
                }
                seen.push(year);
                entries.push((year, self.rows[i][annual_idx]));
            }
            entries.sort_by_key(|(y, _)| *y);
            historical = entries
                .into_iter()
                .map(|(year, annual)| json!({ "year": year, "annual_rainfall": annual }))
                .collect();
        }

        Some(json!({
            "subdivision": sub.name(),
            "avg_annual_rainfall": avg_annual,
            "monsoon_rainfall_pct": monsoon_pct,
            "rain_probability": rain_probability,
            "monthly_averages": Value::Object(monthly_averages),
            "seasonal_pattern": seasonal_pattern,
            "historical_data": historical,
        }))
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Monthly rainfall ranges (mm) by region class, used by the synthetic
/// generator.
fn monthly_ranges(sub: Subdivision) -> [(f64, f64); 12] {
    if sub.is_high_rainfall() {
        [
            (10.0, 50.0),
            (15.0, 60.0),
            (30.0, 80.0),
            (80.0, 150.0),
            (150.0, 300.0),
            (500.0, 800.0),
            (700.0, 1000.0),
            (600.0, 900.0),
            (300.0, 500.0),
            (200.0, 350.0),
            (100.0, 200.0),
            (30.0, 80.0),
        ]
    } else if matches!(sub, Subdivision::WestRajasthan | Subdivision::SaurashtraKutch) {
        [
            (0.0, 10.0),
            (0.0, 15.0),
            (0.0, 20.0),
            (5.0, 25.0),
            (10.0, 30.0),
            (20.0, 60.0),
            (50.0, 150.0),
            (40.0, 120.0),
            (20.0, 60.0),
            (5.0, 25.0),
            (0.0, 15.0),
            (0.0, 10.0),
        ]
    } else {
        [
            (5.0, 30.0),
            (10.0, 40.0),
            (15.0, 50.0),
            (30.0, 80.0),
            (50.0, 150.0),
            (100.0, 300.0),
            (150.0, 400.0),
            (120.0, 350.0),
            (80.0, 250.0),
            (40.0, 150.0),
            (20.0, 80.0),
            (10.0, 40.0),
        ]
    }
}
