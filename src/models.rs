use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};

/// Marketplace a receipt originated from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Store {
    Test,
    Apple,
    Google,
}

/// Receipt validation status as reported by the IAP service.
///
/// The wire format carries the service's numeric enum values; anything
/// outside the published set is kept verbatim in `Unrecognized` so the
/// reconciler can flag it instead of guessing.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ReceiptStatus {
    Init,
    ValidationRequest,
    Valid,
    Invalid,
    Unknown,
    Unrecognized(i64),
}

impl ReceiptStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReceiptStatus::Invalid | ReceiptStatus::Unknown)
    }
}

impl From<i64> for ReceiptStatus {
    fn from(raw: i64) -> Self {
        match raw {
            0 => Self::Init,
            1 => Self::ValidationRequest,
            20 => Self::Valid,
            91 => Self::Invalid,
            99 => Self::Unknown,
            other => Self::Unrecognized(other),
        }
    }
}

impl From<ReceiptStatus> for i64 {
    fn from(status: ReceiptStatus) -> Self {
        match status {
            ReceiptStatus::Init => 0,
            ReceiptStatus::ValidationRequest => 1,
            ReceiptStatus::Valid => 20,
            ReceiptStatus::Invalid => 91,
            ReceiptStatus::Unknown => 99,
            ReceiptStatus::Unrecognized(raw) => raw,
        }
    }
}

/// On-chain delivery status for a validated receipt, as observed by the
/// service. This client only reads it; it never drives the transaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum TxStatus {
    Created,
    Staged,
    Success,
    Failure,
    Invalid,
    NotFound,
    FailToCreate,
    Unknown,
    Unrecognized(i64),
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TxStatus::Success
                | TxStatus::Failure
                | TxStatus::Invalid
                | TxStatus::NotFound
                | TxStatus::FailToCreate
                | TxStatus::Unknown
        )
    }
}

impl From<i64> for TxStatus {
    fn from(raw: i64) -> Self {
        match raw {
            0 => Self::Created,
            1 => Self::Staged,
            20 => Self::Success,
            91 => Self::Failure,
            92 => Self::Invalid,
            93 => Self::NotFound,
            94 => Self::FailToCreate,
            99 => Self::Unknown,
            other => Self::Unrecognized(other),
        }
    }
}

impl From<TxStatus> for i64 {
    fn from(status: TxStatus) -> Self {
        match status {
            TxStatus::Created => 0,
            TxStatus::Staged => 1,
            TxStatus::Success => 20,
            TxStatus::Failure => 91,
            TxStatus::Invalid => 92,
            TxStatus::NotFound => 93,
            TxStatus::FailToCreate => 94,
            TxStatus::Unknown => 99,
            TxStatus::Unrecognized(raw) => raw,
        }
    }
}

/// One catalog entry. Replaced wholesale on every successful fetch,
/// never patched in place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    pub currency: String,
    #[serde(default)]
    pub active: bool,
}

/// The service's view of one submitted receipt, keyed by `uuid`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReceiptRecord {
    pub uuid: String,
    pub store: Store,
    pub agent_address: String,
    pub avatar_address: String,
    pub status: ReceiptStatus,
    pub tx_status: TxStatus,
    #[serde(default)]
    pub tx_id: Option<String>,
    #[serde(default)]
    pub purchased_at: Option<DateTime<Utc>>,
}

/// Body of a purchase submission. `data` is the store receipt blob,
/// passed through opaque.
#[derive(Clone, Debug, Serialize)]
pub struct PurchaseRequest {
    pub store: Store,
    pub data: String,
    pub agent_address: String,
    pub avatar_address: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_status__known_wire_values__round_trip() {
        for status in [
            ReceiptStatus::Init,
            ReceiptStatus::ValidationRequest,
            ReceiptStatus::Valid,
            ReceiptStatus::Invalid,
            ReceiptStatus::Unknown,
        ] {
            assert_eq!(ReceiptStatus::from(i64::from(status)), status);
        }
    }

    #[test]
    fn receipt_status__out_of_range_value__is_preserved() {
        let status = ReceiptStatus::from(57);
        assert_eq!(status, ReceiptStatus::Unrecognized(57));
        assert_eq!(i64::from(status), 57);
        assert!(!status.is_terminal());
    }

    #[test]
    fn tx_status__known_wire_values__round_trip() {
        for status in [
            TxStatus::Created,
            TxStatus::Staged,
            TxStatus::Success,
            TxStatus::Failure,
            TxStatus::Invalid,
            TxStatus::NotFound,
            TxStatus::FailToCreate,
            TxStatus::Unknown,
        ] {
            assert_eq!(TxStatus::from(i64::from(status)), status);
        }
    }

    #[test]
    fn receipt_record__deserializes_numeric_statuses() {
        let body = r#"{
            "uuid": "a1b2",
            "store": "GOOGLE",
            "agent_address": "0xagent",
            "avatar_address": "0xavatar",
            "status": 20,
            "tx_status": 1,
            "tx_id": "0xdead"
        }"#;
        let record: ReceiptRecord = serde_json::from_str(body).unwrap();
        assert_eq!(record.status, ReceiptStatus::Valid);
        assert_eq!(record.tx_status, TxStatus::Staged);
        assert_eq!(record.store, Store::Google);
        assert_eq!(record.purchased_at, None);
    }
}
