//! Payment Record (spec §3, §9)
//!
//! On disk this is schemaless across `direct`/`bridge`; here it is a tagged
//! variant with a shared header, per the design notes (§9): "a typed
//! implementation should use a tagged variant `Record = Direct{...} |
//! Bridge{...}` with shared header fields."

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    WaitingDeposit,
    DepositReceived,
    Bridging,
    Confirming,
    Confirmed,
    Expired,
    Error,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::Expired | Self::Error)
    }
}

/// Fields every record carries regardless of `kind` (spec §3 "Identity").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordHeader {
    pub payment_id: String,
    pub business_id: String,
    pub business_name: String,
    pub settlement_wallet: String,
    #[serde(default)]
    pub chat_id: Option<String>,
    pub token: String,
    pub settlement_chain: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub confirmations: Option<u64>,
    #[serde(default)]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expired_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectFields {
    #[serde(flatten)]
    pub header: RecordHeader,
    /// Human-readable expected amount (e.g. `"100.00"`), the monitor's
    /// `parse_units(amount, decimals)` input (spec §4.D.1). Not explicitly
    /// named in the §3 data model's `direct` attribute list, but required
    /// for the monitor to know what it is looking for — see DESIGN.md.
    pub amount: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeFields {
    #[serde(flatten)]
    pub header: RecordHeader,
    pub source_chain: String,
    pub input_token_mint: String,
    pub output_token_address: String,
    pub raw_input_amount: u128,
    pub raw_output_amount: u128,
    pub relay_fee: f64,
    pub temp_wallet_pubkey: String,
    pub deposit_address: String,
    pub temp_private_key_sealed: String,
    pub spoke_pool_source: String,
    pub spoke_pool_destination: String,
    pub destination_chain_id: u64,
    pub quote_timestamp: i64,
    pub fill_deadline: i64,
    #[serde(default)]
    pub deposit_tx_sig: Option<String>,
    #[serde(default)]
    pub actual_input_amount: Option<u128>,
}

/// The tagged payment record. `kind` is the serde tag so the on-disk JSON
/// carries `"kind": "direct" | "bridge"` exactly as §3 describes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentRecord {
    Direct(DirectFields),
    Bridge(BridgeFields),
}

impl PaymentRecord {
    pub fn header(&self) -> &RecordHeader {
        match self {
            PaymentRecord::Direct(d) => &d.header,
            PaymentRecord::Bridge(b) => &b.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut RecordHeader {
        match self {
            PaymentRecord::Direct(d) => &mut d.header,
            PaymentRecord::Bridge(b) => &mut b.header,
        }
    }

    pub fn payment_id(&self) -> &str {
        &self.header().payment_id
    }

    pub fn status(&self) -> PaymentStatus {
        self.header().status
    }

    pub fn set_status(&mut self, status: PaymentStatus) {
        self.header_mut().status = status;
    }

    pub fn as_bridge(&self) -> Option<&BridgeFields> {
        match self {
            PaymentRecord::Bridge(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_bridge_mut(&mut self) -> Option<&mut BridgeFields> {
        match self {
            PaymentRecord::Bridge(b) => Some(b),
            _ => None,
        }
    }
}

/// Notification payload (spec §3, §6). Carries a `type` discriminator plus
/// whatever a front-end needs to render the confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    DirectConfirmed {
        payment_id: String,
        tx_hash: String,
        token: String,
        chain: String,
        confirmations: u64,
        confirmed_at: DateTime<Utc>,
    },
    BridgeConfirmed {
        payment_id: String,
        tx_hash: String,
        deposit_tx_sig: String,
        settlement_chain: String,
        output_amount: u128,
        confirmations: u64,
        confirmed_at: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> RecordHeader {
        RecordHeader {
            payment_id: "pay_abc".into(),
            business_id: "biz_1".into(),
            business_name: "Example Co".into(),
            settlement_wallet: "0x1111111111111111111111111111111111111111".into(),
            chat_id: None,
            token: "USDC".into(),
            settlement_chain: "polygon".into(),
            status: PaymentStatus::Pending,
            created_at: Utc::now(),
            expires_at: Utc::now(),
            tx_hash: None,
            confirmations: None,
            confirmed_at: None,
            expired_at: None,
            error: None,
        }
    }

    #[test]
    fn test_direct_roundtrips_through_json_with_kind_tag() {
        let record = PaymentRecord::Direct(DirectFields {
            header: header(),
            amount: "100.00".into(),
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "direct");
        let back: PaymentRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.payment_id(), "pay_abc");
    }

    #[test]
    fn test_status_is_terminal() {
        assert!(PaymentStatus::Confirmed.is_terminal());
        assert!(PaymentStatus::Expired.is_terminal());
        assert!(PaymentStatus::Error.is_terminal());
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(!PaymentStatus::Bridging.is_terminal());
    }

    #[test]
    fn test_set_status_mutates_shared_header() {
        let mut record = PaymentRecord::Direct(DirectFields {
            header: header(),
            amount: "100.00".into(),
        });
        record.set_status(PaymentStatus::Confirming);
        assert_eq!(record.status(), PaymentStatus::Confirming);
    }
}
