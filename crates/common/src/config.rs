use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: General,
    pub input: Input,
    pub features: Features,
    pub labels: Labels,
    pub model: Model,
    pub output: Output,
    pub observability: Observability,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct General {
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for General {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Input {
    /// Raw `actionData.amount` values are divided by this (USDC-style 6 decimals).
    pub amount_scale: f64,
    pub default_usd_price: f64,
}

impl Default for Input {
    fn default() -> Self {
        Self {
            amount_scale: 1e6,
            default_usd_price: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Features {
    pub entropy_epsilon: f64,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            entropy_epsilon: 1e-9,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Labels {
    pub risky_min_liquidations: u32,
    pub risky_max_borrow_repay_ratio: f64,
    pub safe_min_tx_count: u32,
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            risky_min_liquidations: 3,
            risky_max_borrow_repay_ratio: 2.0,
            safe_min_tx_count: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Model {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub reg_lambda: f64,
    pub gamma: f64,
    pub min_child_weight: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub seed: u64,
    /// When unset the mean label is used.
    pub base_score: Option<f64>,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            max_depth: 4,
            learning_rate: 0.3,
            reg_lambda: 1.0,
            gamma: 0.0,
            min_child_weight: 1.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            seed: 42,
            base_score: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Output {
    pub dir: String,
    pub scores_file: String,
    pub histogram_file: String,
    pub shap_file: String,
    pub histogram_bins: usize,
}

impl Default for Output {
    fn default() -> Self {
        Self {
            dir: ".".to_string(),
            scores_file: "scores.csv".to_string(),
            histogram_file: "score_hist.png".to_string(),
            shap_file: "shap_summary.png".to_string(),
            histogram_bins: 20,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Observability {
    /// When set, Prometheus exposition text is written here after the run.
    pub metrics_path: Option<String>,
}

impl Config {
    /// Explicit path must exist; otherwise `config/default.toml` is used when
    /// present and built-in defaults when it is not.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => p,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if !default_path.exists() {
                    return Ok(Self::default());
                }
                default_path
            }
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_toml_str(s)
    }
}
