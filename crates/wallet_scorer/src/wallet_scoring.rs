use std::path::Path;

use anyhow::{Context, Result};

use crate::wallet_features::{WalletFeatures, FEATURE_NAMES};
use crate::wallet_labels::PseudoLabel;

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 1000.0;

/// Clip to [0, 1000] and round half-to-even.
pub fn score_prediction(raw: f64) -> u32 {
    if raw.is_nan() {
        return MIN_SCORE as u32;
    }
    raw.clamp(MIN_SCORE, MAX_SCORE).round_ties_even() as u32
}

pub fn score_predictions(raw: &[f64]) -> Vec<u32> {
    raw.iter().copied().map(score_prediction).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredWallet {
    pub features: WalletFeatures,
    pub label: PseudoLabel,
    pub score: u32,
}

impl ScoredWallet {
    pub fn wallet(&self) -> &str {
        &self.features.wallet
    }

    fn csv_record(&self) -> Vec<String> {
        let f = &self.features;
        vec![
            self.wallet().to_string(),
            f.tx_count.to_string(),
            float(f.total_usd),
            float(f.avg_tx_usd),
            float(f.std_tx_usd),
            f.active_days.to_string(),
            float(f.txn_per_day),
            f.deposit_count.to_string(),
            f.borrow_count.to_string(),
            f.repay_count.to_string(),
            f.redeemunderlying_count.to_string(),
            f.liquidationcall_count.to_string(),
            float(f.net_deposit_usd),
            float(f.net_borrow_usd),
            float(f.borrow_repay_ratio),
            f.liquidation_flag.to_string(),
            float(f.liquidation_freq),
            f.days_since_last_tx.to_string(),
            float(f.entropy_of_actions),
            self.label.value().to_string(),
            self.score.to_string(),
        ]
    }
}

/// Shortest representation that parses back to the same value; always has a
/// decimal point or exponent.
fn float(v: f64) -> String {
    format!("{v:?}")
}

pub fn csv_header() -> Vec<&'static str> {
    let mut header = Vec::with_capacity(FEATURE_NAMES.len() + 3);
    header.push("wallet");
    header.extend(FEATURE_NAMES);
    header.push("label");
    header.push("score");
    header
}

/// Overwrites `path`.
pub fn write_scores_csv(path: &Path, wallets: &[ScoredWallet]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(csv_header())?;
    for w in wallets {
        writer.write_record(w.csv_record())?;
    }
    writer
        .flush()
        .with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(path = %path.display(), rows = wallets.len(), "scores written");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreSummary {
    pub min: u32,
    pub max: u32,
    pub mean: f64,
}

impl ScoreSummary {
    pub fn from_scores(scores: &[u32]) -> Option<Self> {
        let min = *scores.iter().min()?;
        let max = *scores.iter().max()?;
        let mean = scores.iter().map(|&s| f64::from(s)).sum::<f64>() / scores.len() as f64;
        Some(Self { min, max, mean })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(wallet: &str) -> WalletFeatures {
        WalletFeatures {
            wallet: wallet.to_string(),
            tx_count: 2,
            total_usd: 4.0,
            avg_tx_usd: 2.0,
            std_tx_usd: 0.0,
            active_days: 2,
            txn_per_day: 1.0,
            deposit_count: 2,
            borrow_count: 0,
            repay_count: 0,
            redeemunderlying_count: 0,
            liquidationcall_count: 0,
            net_deposit_usd: 4.0,
            net_borrow_usd: 0.0,
            borrow_repay_ratio: 0.0,
            liquidation_flag: 0,
            liquidation_freq: 0.0,
            days_since_last_tx: 10,
            entropy_of_actions: -1.4426950408889634e-9,
        }
    }

    #[test]
    fn test_scores_are_clipped() {
        assert_eq!(
            score_predictions(&[-50.0, 1500.0, 1e300, f64::NEG_INFINITY]),
            vec![0, 1000, 1000, 0]
        );
        assert_eq!(score_prediction(f64::NAN), 0);
    }

    #[test]
    fn test_scores_round_half_to_even() {
        assert_eq!(
            score_predictions(&[500.5, 501.5, 499.4, 799.6]),
            vec![500, 502, 499, 800]
        );
    }

    #[test]
    fn test_header_shape() {
        let header = csv_header();
        assert_eq!(header.len(), 21);
        assert_eq!(header[0], "wallet");
        assert_eq!(header[1], "tx_count");
        assert_eq!(header[18], "entropy_of_actions");
        assert_eq!(header[19], "label");
        assert_eq!(header[20], "score");
    }

    #[test]
    fn test_write_scores_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.csv");
        let wallets = vec![
            ScoredWallet {
                features: features("0xabc"),
                label: PseudoLabel::Neutral,
                score: 500,
            },
            ScoredWallet {
                features: features("0xdef"),
                label: PseudoLabel::Safe,
                score: 812,
            },
        ];
        write_scores_csv(&path, &wallets).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("wallet,tx_count,total_usd,"));
        assert!(lines[0].ends_with(",entropy_of_actions,label,score"));
        assert!(lines[1].starts_with("0xabc,2,4.0,2.0,0.0,2,1.0,2,0,0,0,0,4.0,0.0,0.0,0,0.0,10,"));
        assert!(lines[1].ends_with(",500,500"));
        assert!(lines[2].ends_with(",800,812"));

        let mut reader = csv::Reader::from_path(&path).unwrap();
        for record in reader.records() {
            let record = record.unwrap();
            assert_eq!(record.len(), 21);
            let entropy: f64 = record[18].parse().unwrap();
            assert!((entropy - features("x").entropy_of_actions).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn test_write_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.csv");
        std::fs::write(&path, "stale\nstale\nstale\nstale\n").unwrap();
        write_scores_csv(&path, &[]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn test_summary() {
        let s = ScoreSummary::from_scores(&[200, 500, 800]).unwrap();
        assert_eq!((s.min, s.max), (200, 800));
        assert!((s.mean - 500.0).abs() < f64::EPSILON);
        assert!(ScoreSummary::from_scores(&[]).is_none());
    }
}
