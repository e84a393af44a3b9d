use crate::error::{BridgeError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A cart total in minor currency units (cents).
///
/// Totals are never negative. Conversion to major units always carries two
/// decimal places, which is the format wallet descriptors expect. Deserializing
/// goes through the same check as [`Amount::from_minor_units`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Self = Self(0);

    pub fn from_minor_units(value: i64) -> Result<Self> {
        if value >= 0 {
            Ok(Self(value))
        } else {
            Err(BridgeError::InvalidArgument(
                "Amount must not be negative".to_string(),
            ))
        }
    }

    pub fn minor_units(&self) -> i64 {
        self.0
    }

    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    /// Formats the total as `<major>.<minor>`, e.g. `1050` becomes `"10.50"`.
    pub fn to_major_string(&self) -> String {
        self.to_decimal().to_string()
    }
}

impl TryFrom<i64> for Amount {
    type Error = BridgeError;

    fn try_from(value: i64) -> Result<Self> {
        Self::from_minor_units(value)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.to_decimal()
    }
}
