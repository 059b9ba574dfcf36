use std::path::Path;

use common::config::Input;
use common::types::{NumberOrString, RawTransaction};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed transaction JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("record {index}: field {field} is not a number: {value:?}")]
    InvalidNumber {
        index: usize,
        field: &'static str,
        value: String,
    },
}

/// Flat per-event row, one per input record.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub wallet: Option<String>,
    /// Unix seconds.
    pub timestamp: Option<i64>,
    pub action: Option<String>,
    /// Token quantity after fixed-point scaling.
    pub amount: f64,
    pub usd_price: f64,
}

impl Transaction {
    pub fn usd_amount(&self) -> f64 {
        self.amount * self.usd_price
    }
}

pub fn load_transactions(path: &Path, cfg: &Input) -> Result<Vec<Transaction>, LoadError> {
    tracing::info!(path = %path.display(), "loading transactions");
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let txs = parse_transactions(&content, cfg)?;
    tracing::info!(records = txs.len(), "transactions loaded");
    Ok(txs)
}

pub fn parse_transactions(json: &str, cfg: &Input) -> Result<Vec<Transaction>, LoadError> {
    let raw: Vec<RawTransaction> = serde_json::from_str(json)?;
    raw.into_iter()
        .enumerate()
        .map(|(index, tx)| flatten(index, tx, cfg))
        .collect()
}

fn flatten(index: usize, tx: RawTransaction, cfg: &Input) -> Result<Transaction, LoadError> {
    let data = tx.action_data.unwrap_or_default();

    let amount = match data.amount {
        Some(v) => number(index, "actionData.amount", &v)? / cfg.amount_scale,
        None => 0.0,
    };
    let usd_price = match data.asset_price_usd {
        Some(v) => number(index, "actionData.assetPriceUSD", &v)?,
        None => cfg.default_usd_price,
    };
    let timestamp = match tx.timestamp {
        Some(v) => Some(number(index, "timestamp", &v)?.floor() as i64),
        None => None,
    };

    Ok(Transaction {
        wallet: tx.user_wallet,
        timestamp,
        action: tx.action,
        amount,
        usd_price,
    })
}

fn number(index: usize, field: &'static str, v: &NumberOrString) -> Result<f64, LoadError> {
    v.as_f64().ok_or_else(|| LoadError::InvalidNumber {
        index,
        field,
        value: v.raw(),
    })
}
