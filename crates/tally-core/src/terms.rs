//! # Payment Methods and Terms
//!
//! The closed sets of payment methods and payment terms accepted by the
//! engines. Request types carry these as strings (what the caller sends);
//! parsing them here is the first thing every engine operation does, before
//! any transaction is opened.
//!
//! ## Which Set Applies Where
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Document            Creation method            Later payments          │
//! │  ─────────────────   ────────────────────────   ──────────────────────  │
//! │  Sale                SalePaymentMethod          SalePaymentMethod       │
//! │                      cash card transfer credit  (same set)              │
//! │                                                                         │
//! │  Purchase order      PurchasePaymentMethod      SettlementMethod        │
//! │                      cash transfer credit qris  cash card transfer      │
//! │                                                 check wire              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::CoreError;

// =============================================================================
// Sale Payment Method
// =============================================================================

/// How a sale is paid for, and how later instalments on it are paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum SalePaymentMethod {
    Cash,
    Card,
    Transfer,
    Credit,
}

string_enum!(SalePaymentMethod, |other: &str| CoreError::InvalidPaymentMethod {
    method: other.to_string(),
    allowed: SalePaymentMethod::allowed(),
}, {
    Cash => "cash",
    Card => "card",
    Transfer => "transfer",
    Credit => "credit",
});

impl SalePaymentMethod {
    /// The term a sale gets when the caller doesn't pick one.
    ///
    /// Credit sales are net 30 by default; everything else settles at once.
    pub const fn default_term(&self) -> PaymentTerm {
        match self {
            SalePaymentMethod::Credit => PaymentTerm::Net30,
            _ => PaymentTerm::Cash,
        }
    }
}

// =============================================================================
// Purchase Payment Method
// =============================================================================

/// How a purchase order is paid for at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum PurchasePaymentMethod {
    #[default]
    Cash,
    Transfer,
    Credit,
    /// QR code payment.
    Qris,
}

string_enum!(PurchasePaymentMethod, |other: &str| CoreError::InvalidPaymentMethod {
    method: other.to_string(),
    allowed: PurchasePaymentMethod::allowed(),
}, {
    Cash => "cash",
    Transfer => "transfer",
    Credit => "credit",
    Qris => "qris",
});

impl PurchasePaymentMethod {
    /// Payment days used when a credit order doesn't say.
    pub const DEFAULT_CREDIT_DAYS: i64 = 30;

    #[inline]
    pub const fn is_credit(&self) -> bool {
        matches!(self, PurchasePaymentMethod::Credit)
    }
}

// =============================================================================
// Settlement Method
// =============================================================================

/// How an instalment against an open purchase order balance is paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum SettlementMethod {
    Cash,
    Card,
    Transfer,
    Check,
    Wire,
}

string_enum!(SettlementMethod, |other: &str| CoreError::InvalidPaymentMethod {
    method: other.to_string(),
    allowed: SettlementMethod::allowed(),
}, {
    Cash => "cash",
    Card => "card",
    Transfer => "transfer",
    Check => "check",
    Wire => "wire",
});

// =============================================================================
// Payment Term
// =============================================================================

/// Payment schedule class: settle now, or N days after the document date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum PaymentTerm {
    #[default]
    Cash,
    Net7,
    Net15,
    Net30,
    Net60,
    Net90,
}

string_enum!(PaymentTerm, |other: &str| CoreError::InvalidPaymentTerm(other.to_string()), {
    Cash => "cash",
    Net7 => "net7",
    Net15 => "net15",
    Net30 => "net30",
    Net60 => "net60",
    Net90 => "net90",
});

impl PaymentTerm {
    /// Days between the document date and the due date.
    pub const fn days(&self) -> i64 {
        match self {
            PaymentTerm::Cash => 0,
            PaymentTerm::Net7 => 7,
            PaymentTerm::Net15 => 15,
            PaymentTerm::Net30 => 30,
            PaymentTerm::Net60 => 60,
            PaymentTerm::Net90 => 90,
        }
    }

    #[inline]
    pub const fn is_cash(&self) -> bool {
        matches!(self, PaymentTerm::Cash)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sale_methods() {
        assert_eq!("cash".parse::<SalePaymentMethod>().unwrap(), SalePaymentMethod::Cash);
        assert_eq!("credit".parse::<SalePaymentMethod>().unwrap(), SalePaymentMethod::Credit);

        let err = "bitcoin".parse::<SalePaymentMethod>().unwrap_err();
        assert!(matches!(err, CoreError::InvalidPaymentMethod { .. }));
        assert_eq!(
            err.to_string(),
            "Invalid payment method 'bitcoin', expected one of: cash, card, transfer, credit"
        );
    }

    #[test]
    fn test_purchase_and_settlement_sets_differ() {
        assert!("qris".parse::<PurchasePaymentMethod>().is_ok());
        assert!("card".parse::<PurchasePaymentMethod>().is_err());
        assert!("wire".parse::<SettlementMethod>().is_ok());
        assert!("qris".parse::<SettlementMethod>().is_err());
    }

    #[test]
    fn test_default_term() {
        assert_eq!(SalePaymentMethod::Credit.default_term(), PaymentTerm::Net30);
        assert_eq!(SalePaymentMethod::Card.default_term(), PaymentTerm::Cash);
    }

    #[test]
    fn test_term_days() {
        let days: Vec<i64> = PaymentTerm::ALL.iter().map(|t| t.days()).collect();
        assert_eq!(days, vec![0, 7, 15, 30, 60, 90]);
        assert!(matches!(
            "net45".parse::<PaymentTerm>(),
            Err(CoreError::InvalidPaymentTerm(_))
        ));
    }

    #[test]
    fn test_serde_uses_lowercase() {
        let json = serde_json::to_string(&PaymentTerm::Net15).unwrap();
        assert_eq!(json, "\"net15\"");
        let method: PurchasePaymentMethod = serde_json::from_str("\"qris\"").unwrap();
        assert_eq!(method, PurchasePaymentMethod::Qris);
    }
}
