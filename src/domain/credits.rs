use crate::error::OrchestratorError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

/// A strictly positive number of entitlement credits granted per payment.
///
/// Wraps `rust_decimal::Decimal` so fractional credit plans stay exact.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Credits(Decimal);

impl Credits {
    pub const ONE: Self = Self(Decimal::ONE);

    pub fn new(value: Decimal) -> Result<Self, OrchestratorError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(OrchestratorError::Validation(
                "Credits must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Credits {
    type Error = OrchestratorError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Credits> for Decimal {
    fn from(credits: Credits) -> Self {
        credits.0
    }
}

/// Running total of credits held by an owner in the entitlement ledger.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct CreditBalance(pub Decimal);

impl CreditBalance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl From<Credits> for CreditBalance {
    fn from(credits: Credits) -> Self {
        Self(credits.0)
    }
}

impl Add for CreditBalance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for CreditBalance {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}
