use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Payment service a QR code points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QrCodeKind {
    Venmo,
    Paypal,
    Cashapp,
}

impl fmt::Display for QrCodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QrCodeKind::Venmo => write!(f, "venmo"),
            QrCodeKind::Paypal => write!(f, "paypal"),
            QrCodeKind::Cashapp => write!(f, "cashapp"),
        }
    }
}

impl FromStr for QrCodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "venmo" => Ok(QrCodeKind::Venmo),
            "paypal" => Ok(QrCodeKind::Paypal),
            "cashapp" => Ok(QrCodeKind::Cashapp),
            _ => Err(format!(
                "Invalid QR code kind '{}'. Valid options: venmo, paypal, cashapp",
                s
            )),
        }
    }
}

/// A stored payment QR code image shown at point of sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentQrCode {
    pub id: Uuid,
    pub kind: QrCodeKind,
    #[serde(with = "serde_bytes")]
    pub image: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentQrCode {
    pub fn new(kind: QrCodeKind, image: Vec<u8>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            image,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qr_code_kind_parse() {
        assert_eq!(QrCodeKind::from_str("venmo").unwrap(), QrCodeKind::Venmo);
        assert_eq!(QrCodeKind::from_str("CashApp").unwrap(), QrCodeKind::Cashapp);
        assert!(QrCodeKind::from_str("zelle").is_err());
    }

    #[test]
    fn test_payment_qr_code_new() {
        let code = PaymentQrCode::new(QrCodeKind::Venmo, vec![1, 2, 3]);

        assert_eq!(code.kind, QrCodeKind::Venmo);
        assert_eq!(code.image, vec![1, 2, 3]);
    }

    #[test]
    fn test_payment_qr_code_json_roundtrip() {
        let code = PaymentQrCode::new(QrCodeKind::Paypal, vec![4, 5, 6]);

        let json = serde_json::to_string(&code).unwrap();
        let parsed: PaymentQrCode = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.id, code.id);
        assert_eq!(parsed.kind, code.kind);
        assert_eq!(parsed.image, code.image);
    }
}
