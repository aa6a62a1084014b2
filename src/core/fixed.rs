//! Two-Decimal Fixed-Point Values
//!
//! Multipliers and money amounts are integers counting hundredths.
//! Game logic never touches floats; `f64` only appears at the wire boundary.
//!
//! ## Format
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Multiplier(u32)  - hundredths of a multiplier  (0.35 = 35) │
//! │  Amount(u64)      - cents of a wager/payout  (10.00 = 1000) │
//! │                                                             │
//! │  payout = round_half_up(cents * hundredths / 100)           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A multiplier stepping by 0.01 from 0.10 therefore reaches exactly 0.35,
//! which matters because crash detection compares against the crash point.

use std::fmt;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

/// Fractional units per whole unit (two decimal places).
pub const HUNDREDTHS_PER_UNIT: u64 = 100;

/// Round-multiplier in hundredths.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Multiplier(u32);

impl Multiplier {
    /// 0.00x
    pub const ZERO: Multiplier = Multiplier(0);

    /// 1.00x
    pub const ONE: Multiplier = Multiplier(100);

    /// Create from a raw count of hundredths.
    #[inline]
    pub const fn from_hundredths(hundredths: u32) -> Self {
        Self(hundredths)
    }

    /// Raw count of hundredths.
    #[inline]
    pub const fn hundredths(self) -> u32 {
        self.0
    }

    /// Round a decimal to the nearest hundredth.
    ///
    /// Returns `None` for NaN, infinities, negatives and values that do not fit.
    pub fn from_f64(value: f64) -> Option<Self> {
        let scaled = round_to_hundredths(value)?;
        if scaled > u32::MAX as f64 {
            return None;
        }
        Some(Self(scaled as u32))
    }

    /// Convert for display and the wire. Never feed the result back into game logic.
    #[inline]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / HUNDREDTHS_PER_UNIT as f64
    }

    /// Add another multiplier, clamping at the maximum representable value.
    #[inline]
    pub fn saturating_add(self, other: Multiplier) -> Multiplier {
        Multiplier(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_two_decimals(f, self.0 as u64)
    }
}

/// Wager or payout in cents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u64);

impl Amount {
    /// No money.
    pub const ZERO: Amount = Amount(0);

    /// Create from a raw count of cents.
    #[inline]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Raw count of cents.
    #[inline]
    pub const fn cents(self) -> u64 {
        self.0
    }

    /// True for a zero amount.
    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Round a decimal to the nearest cent (half away from zero).
    ///
    /// Returns `None` for NaN, infinities, negatives and values that do not fit.
    pub fn from_f64(value: f64) -> Option<Self> {
        let scaled = round_to_hundredths(value)?;
        if scaled >= u64::MAX as f64 {
            return None;
        }
        Some(Self(scaled as u64))
    }

    /// Convert for display and the wire.
    #[inline]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / HUNDREDTHS_PER_UNIT as f64
    }

    /// Multiply by a round multiplier, rounding half-up to the cent.
    ///
    /// ```
    /// use crash_game::core::fixed::{Amount, Multiplier};
    ///
    /// let bet = Amount::from_cents(1000);                  // 10.00
    /// let payout = bet.scale(Multiplier::from_hundredths(200)); // x2.00
    /// assert_eq!(payout, Amount::from_cents(2000));        // 20.00
    /// ```
    pub fn scale(self, multiplier: Multiplier) -> Amount {
        let wide = self.0 as u128 * multiplier.0 as u128;
        let half = (HUNDREDTHS_PER_UNIT / 2) as u128;
        let rounded = (wide + half) / HUNDREDTHS_PER_UNIT as u128;
        Amount(u64::try_from(rounded).unwrap_or(u64::MAX))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_two_decimals(f, self.0)
    }
}

fn round_to_hundredths(value: f64) -> Option<f64> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * HUNDREDTHS_PER_UNIT as f64).round())
}

fn write_two_decimals(f: &mut fmt::Formatter<'_>, raw: u64) -> fmt::Result {
    write!(f, "{}.{:02}", raw / HUNDREDTHS_PER_UNIT, raw % HUNDREDTHS_PER_UNIT)
}

// =============================================================================
// SERDE (plain JSON numbers on the wire)
// =============================================================================

impl Serialize for Multiplier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

impl<'de> Deserialize<'de> for Multiplier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Multiplier::from_f64(value)
            .ok_or_else(|| de::Error::custom(format!("invalid multiplier: {}", value)))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Amount::from_f64(value)
            .ok_or_else(|| de::Error::custom(format!("invalid amount: {}", value)))
    }
}

// =============================================================================
// TESTS
// =============================================================================
