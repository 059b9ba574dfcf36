use common::config::Labels;

use crate::wallet_features::WalletFeatures;

/// Heuristic proxy target used in place of ground-truth credit outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PseudoLabel {
    Risky,
    Neutral,
    Safe,
}

impl PseudoLabel {
    pub const ALL: [Self; 3] = [Self::Risky, Self::Neutral, Self::Safe];

    pub fn value(self) -> u32 {
        match self {
            Self::Risky => 200,
            Self::Neutral => 500,
            Self::Safe => 800,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Risky => "risky",
            Self::Neutral => "neutral",
            Self::Safe => "safe",
        }
    }
}

/// Thresholds for the pseudo-labels. Built from config or defaults.
#[derive(Debug, Clone)]
pub struct LabelRules {
    pub risky_min_liquidations: u32,
    pub risky_max_borrow_repay_ratio: f64,
    pub safe_min_tx_count: u32,
}

impl Default for LabelRules {
    fn default() -> Self {
        Self::from_config(&Labels::default())
    }
}

impl LabelRules {
    pub fn from_config(cfg: &Labels) -> Self {
        Self {
            risky_min_liquidations: cfg.risky_min_liquidations,
            risky_max_borrow_repay_ratio: cfg.risky_max_borrow_repay_ratio,
            safe_min_tx_count: cfg.safe_min_tx_count,
        }
    }

    fn is_risky(&self, f: &WalletFeatures) -> bool {
        f.liquidationcall_count >= self.risky_min_liquidations
            || f.borrow_repay_ratio > self.risky_max_borrow_repay_ratio
    }

    fn is_safe(&self, f: &WalletFeatures) -> bool {
        f.tx_count >= self.safe_min_tx_count
            && f.liquidationcall_count == 0
            && f.net_deposit_usd > 0.0
    }
}

/// Risky wins over safe when both hold.
pub fn label_wallet(features: &WalletFeatures, rules: &LabelRules) -> PseudoLabel {
    if rules.is_risky(features) {
        PseudoLabel::Risky
    } else if rules.is_safe(features) {
        PseudoLabel::Safe
    } else {
        PseudoLabel::Neutral
    }
}

pub fn label_wallets(features: &[WalletFeatures], rules: &LabelRules) -> Vec<PseudoLabel> {
    tracing::info!(wallets = features.len(), "assigning pseudo-labels");
    let labels: Vec<PseudoLabel> = features.iter().map(|f| label_wallet(f, rules)).collect();

    for label in PseudoLabel::ALL {
        let n = labels.iter().filter(|l| **l == label).count();
        metrics::counter!("scorer_wallet_labels_total", "label" => label.as_str())
            .increment(n as u64);
        tracing::info!(label = label.as_str(), wallets = n, "label distribution");
    }
    labels
}
