use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use common::config::Features;

use crate::ingestion::Transaction;

const SECS_PER_DAY: i64 = 86_400;

pub const N_FEATURES: usize = 18;

/// Model input order; also the CSV column order after `wallet`.
pub const FEATURE_NAMES: [&str; N_FEATURES] = [
    "tx_count",
    "total_usd",
    "avg_tx_usd",
    "std_tx_usd",
    "active_days",
    "txn_per_day",
    "deposit_count",
    "borrow_count",
    "repay_count",
    "redeemunderlying_count",
    "liquidationcall_count",
    "net_deposit_usd",
    "net_borrow_usd",
    "borrow_repay_ratio",
    "liquidation_flag",
    "liquidation_freq",
    "days_since_last_tx",
    "entropy_of_actions",
];

/// Lending actions with a dedicated count column. Matching is exact and
/// case-sensitive; anything else only contributes to the totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownAction {
    Deposit,
    Borrow,
    Repay,
    RedeemUnderlying,
    LiquidationCall,
}

impl KnownAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(Self::Deposit),
            "borrow" => Some(Self::Borrow),
            "repay" => Some(Self::Repay),
            "redeemunderlying" => Some(Self::RedeemUnderlying),
            "liquidationcall" => Some(Self::LiquidationCall),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Borrow => "borrow",
            Self::Repay => "repay",
            Self::RedeemUnderlying => "redeemunderlying",
            Self::LiquidationCall => "liquidationcall",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WalletFeatures {
    pub wallet: String,
    pub tx_count: u32,
    pub total_usd: f64,
    pub avg_tx_usd: f64,
    pub std_tx_usd: f64,
    pub active_days: i64,
    pub txn_per_day: f64,
    pub deposit_count: u32,
    pub borrow_count: u32,
    pub repay_count: u32,
    pub redeemunderlying_count: u32,
    pub liquidationcall_count: u32,
    pub net_deposit_usd: f64,
    pub net_borrow_usd: f64,
    pub borrow_repay_ratio: f64,
    pub liquidation_flag: u8,
    pub liquidation_freq: f64,
    pub days_since_last_tx: i64,
    pub entropy_of_actions: f64,
}

impl WalletFeatures {
    pub fn to_row(&self) -> [f64; N_FEATURES] {
        [
            f64::from(self.tx_count),
            self.total_usd,
            self.avg_tx_usd,
            self.std_tx_usd,
            self.active_days as f64,
            self.txn_per_day,
            f64::from(self.deposit_count),
            f64::from(self.borrow_count),
            f64::from(self.repay_count),
            f64::from(self.redeemunderlying_count),
            f64::from(self.liquidationcall_count),
            self.net_deposit_usd,
            self.net_borrow_usd,
            self.borrow_repay_ratio,
            f64::from(self.liquidation_flag),
            self.liquidation_freq,
            self.days_since_last_tx as f64,
            self.entropy_of_actions,
        ]
    }
}

/// Per-wallet running aggregates.
#[derive(Default)]
struct WalletAccumulator<'a> {
    usd_amounts: Vec<f64>,
    first_seen: Option<DateTime<Utc>>,
    last_seen: Option<DateTime<Utc>>,
    action_counts: HashMap<&'a str, u32>,
    deposit_usd: f64,
    redeem_usd: f64,
    borrow_usd: f64,
    repay_usd: f64,
}

impl<'a> WalletAccumulator<'a> {
    fn push(&mut self, tx: &'a Transaction) {
        let usd = tx.usd_amount();
        self.usd_amounts.push(usd);

        if let Some(ts) = tx.timestamp.and_then(|s| DateTime::<Utc>::from_timestamp(s, 0)) {
            self.first_seen = Some(self.first_seen.map_or(ts, |f| f.min(ts)));
            self.last_seen = Some(self.last_seen.map_or(ts, |l| l.max(ts)));
        }

        let Some(action) = tx.action.as_deref() else {
            return;
        };
        *self.action_counts.entry(action).or_insert(0) += 1;
        match KnownAction::parse(action) {
            Some(KnownAction::Deposit) => self.deposit_usd += usd,
            Some(KnownAction::RedeemUnderlying) => self.redeem_usd += usd,
            Some(KnownAction::Borrow) => self.borrow_usd += usd,
            Some(KnownAction::Repay) => self.repay_usd += usd,
            Some(KnownAction::LiquidationCall) | None => {}
        }
    }

    fn count(&self, action: KnownAction) -> u32 {
        self.action_counts
            .get(action.as_str())
            .copied()
            .unwrap_or(0)
    }

    fn finish(self, wallet: String, as_of: DateTime<Utc>, epsilon: f64) -> WalletFeatures {
        let tx_count = self.usd_amounts.len() as u32;
        let total_usd: f64 = self.usd_amounts.iter().sum();
        let avg_tx_usd = mean(&self.usd_amounts);
        let std_tx_usd = sample_std(&self.usd_amounts);

        let (active_days, days_since_last_tx) = match (self.first_seen, self.last_seen) {
            (Some(first), Some(last)) => (whole_days(last - first) + 1, whole_days(as_of - last)),
            _ => (1, 0),
        };
        let day_divisor = if active_days == 0 {
            1.0
        } else {
            active_days as f64
        };

        let deposit_count = self.count(KnownAction::Deposit);
        let borrow_count = self.count(KnownAction::Borrow);
        let repay_count = self.count(KnownAction::Repay);
        let redeemunderlying_count = self.count(KnownAction::RedeemUnderlying);
        let liquidationcall_count = self.count(KnownAction::LiquidationCall);

        WalletFeatures {
            wallet,
            tx_count,
            total_usd: finite_or_zero(total_usd),
            avg_tx_usd: finite_or_zero(avg_tx_usd),
            std_tx_usd: finite_or_zero(std_tx_usd),
            active_days,
            txn_per_day: finite_or_zero(f64::from(tx_count) / day_divisor),
            deposit_count,
            borrow_count,
            repay_count,
            redeemunderlying_count,
            liquidationcall_count,
            net_deposit_usd: finite_or_zero(self.deposit_usd - self.redeem_usd),
            net_borrow_usd: finite_or_zero(self.borrow_usd - self.repay_usd),
            borrow_repay_ratio: f64::from(borrow_count) / (f64::from(repay_count) + 1.0),
            liquidation_flag: u8::from(liquidationcall_count > 0),
            liquidation_freq: finite_or_zero(f64::from(liquidationcall_count) / day_divisor),
            days_since_last_tx,
            entropy_of_actions: finite_or_zero(action_entropy(
                self.action_counts.values().copied(),
                epsilon,
            )),
        }
    }
}

/// Aggregate transactions into one feature row per wallet, ordered by wallet id.
/// Rows without a wallet id are skipped. `as_of` anchors `days_since_last_tx`.
pub fn engineer_features(
    txs: &[Transaction],
    as_of: DateTime<Utc>,
    cfg: &Features,
) -> Vec<WalletFeatures> {
    tracing::info!(transactions = txs.len(), as_of = %as_of, "engineering features");

    let mut by_wallet: BTreeMap<&str, WalletAccumulator<'_>> = BTreeMap::new();
    let mut without_wallet = 0_u64;
    let mut unknown_actions = 0_u64;

    for tx in txs {
        let Some(wallet) = tx.wallet.as_deref() else {
            without_wallet += 1;
            continue;
        };
        if tx
            .action
            .as_deref()
            .is_some_and(|a| KnownAction::parse(a).is_none())
        {
            unknown_actions += 1;
        }
        by_wallet.entry(wallet).or_default().push(tx);
    }

    if without_wallet > 0 {
        tracing::warn!(
            rows = without_wallet,
            "transactions without userWallet skipped"
        );
        metrics::counter!("scorer_transactions_without_wallet_total").increment(without_wallet);
    }
    if unknown_actions > 0 {
        tracing::warn!(
            rows = unknown_actions,
            "transactions with unrecognized action counted in totals only"
        );
    }

    let features: Vec<WalletFeatures> = by_wallet
        .into_iter()
        .map(|(wallet, acc)| acc.finish(wallet.to_string(), as_of, cfg.entropy_epsilon))
        .collect();
    tracing::info!(wallets = features.len(), "wallet features computed");
    features
}

/// Whole elapsed days, floored (negative spans round toward -inf).
fn whole_days(span: chrono::TimeDelta) -> i64 {
    span.num_seconds().div_euclid(SECS_PER_DAY)
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample standard deviation (n - 1); 0 when fewer than two values.
fn sample_std(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let ss: f64 = xs.iter().map(|x| (x - m).powi(2)).sum();
    (ss / (xs.len() - 1) as f64).sqrt()
}

/// Shannon entropy (bits) of an action histogram, smoothed by `epsilon`
/// inside the log.
pub fn action_entropy(counts: impl IntoIterator<Item = u32>, epsilon: f64) -> f64 {
    let counts: Vec<u32> = counts.into_iter().filter(|&c| c > 0).collect();
    let total: u32 = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }
    -counts
        .iter()
        .map(|&c| {
            let p = f64::from(c) / f64::from(total);
            p * (p + epsilon).log2()
        })
        .sum::<f64>()
}

fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}
