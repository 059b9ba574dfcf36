use serde::Deserialize;

/// A JSON scalar that upstream exports encode either as a number or as a
/// decimal string (`"amount": "2000000"`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(f64),
    Text(String),
}

impl NumberOrString {
    /// `None` when the text is not a finite number.
    pub fn as_f64(&self) -> Option<f64> {
        let v = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        v.is_finite().then_some(v)
    }

    /// Original representation, for error messages.
    pub fn raw(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

/// One Aave V2 protocol event as exported by the transaction indexer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTransaction {
    #[serde(rename = "userWallet")]
    pub user_wallet: Option<String>,
    pub timestamp: Option<NumberOrString>,
    pub action: Option<String>,
    #[serde(rename = "actionData")]
    pub action_data: Option<RawActionData>,
}

/// Nested `actionData` payload. Only the fields the scorer reads are mapped.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawActionData {
    pub amount: Option<NumberOrString>,
    #[serde(rename = "assetPriceUSD")]
    pub asset_price_usd: Option<NumberOrString>,
    #[serde(rename = "assetSymbol")]
    pub asset_symbol: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_or_string_parses_both_shapes() {
        let n: NumberOrString = serde_json::from_str("2000000").unwrap();
        let s: NumberOrString = serde_json::from_str("\"2000000\"").unwrap();
        assert_eq!(n.as_f64(), Some(2_000_000.0));
        assert_eq!(s.as_f64(), Some(2_000_000.0));
    }

    #[test]
    fn test_number_or_string_rejects_garbage() {
        let s: NumberOrString = serde_json::from_str("\"12abc\"").unwrap();
        assert_eq!(s.as_f64(), None);
        assert_eq!(s.raw(), "12abc");
        let nan = NumberOrString::Text("NaN".to_string());
        assert_eq!(nan.as_f64(), None);
    }

    #[test]
    fn test_raw_transaction_full_record() {
        let json = r#"{
            "_id": {"$oid": "681d38fed63812d4655f571a"},
            "userWallet": "0x00000000001accfa9cef68cf5371a23025b6d4b6",
            "network": "polygon",
            "protocol": "aave_v2",
            "txHash": "0x695c69acf608fbf5d38e48ca5535e118cc213a89e3d6d2e66e6b0e3b2e8d4190",
            "logId": "0x695c69acf608fbf5d38e48ca5535e118cc213a89e3d6d2e66e6b0e3b2e8d4190_Deposit",
            "timestamp": 1629178166,
            "blockNumber": 1629178166,
            "action": "deposit",
            "actionData": {
                "type": "Deposit",
                "amount": "2000000000",
                "assetSymbol": "USDC",
                "assetPriceUSD": "0.9938318274296357543568636362026045",
                "poolId": "0x2791bca1f2de4661ed88a30c99a7a9449aa84174",
                "userId": "0x00000000001accfa9cef68cf5371a23025b6d4b6"
            }
        }"#;
        let tx: RawTransaction = serde_json::from_str(json).unwrap();
        assert_eq!(
            tx.user_wallet.as_deref(),
            Some("0x00000000001accfa9cef68cf5371a23025b6d4b6")
        );
        assert_eq!(tx.action.as_deref(), Some("deposit"));
        assert_eq!(tx.timestamp.and_then(|t| t.as_f64()), Some(1_629_178_166.0));
        let data = tx.action_data.unwrap();
        assert_eq!(data.asset_symbol.as_deref(), Some("USDC"));
        let price = data.asset_price_usd.and_then(|p| p.as_f64()).unwrap();
        assert!((price - 0.9938).abs() < 1e-4);
    }

    #[test]
    fn test_raw_transaction_missing_fields() {
        let tx: RawTransaction = serde_json::from_str(r#"{"actionData": null}"#).unwrap();
        assert!(tx.user_wallet.is_none());
        assert!(tx.timestamp.is_none());
        assert!(tx.action.is_none());
        assert!(tx.action_data.is_none());
    }
}
