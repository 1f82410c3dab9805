//! Pricing and commission calculation.
//!
//! A pure module: given the lesson parameters, a base-rate table, and the
//! commission rate snapshotted at booking time, it produces the pro fee,
//! the platform fee, and the total. No side effects, fully deterministic.

use serde::{Deserialize, Serialize};

use crate::booking::{BookingError, Money};

/// Floor applied to the pro fee before the commission is computed, so
/// low-ball custom rates never produce a degenerate platform fee.
pub const MINIMUM_FEE: Money = Money::from_cents(50 * 100);

/// Number of players sharing one lesson slot. Between 1 and 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerCount(u8);

impl PlayerCount {
    /// Validates and wraps a raw player count.
    pub fn try_new(players: u8) -> Result<Self, BookingError> {
        if (1..=3).contains(&players) {
            Ok(Self(players))
        } else {
            Err(BookingError::InvalidPlayerCount { players })
        }
    }

    /// Returns the count as a plain integer.
    pub fn get(&self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for PlayerCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lesson length, in holes played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Holes {
    /// 9-hole lesson.
    Nine,
    /// 18-hole lesson.
    Eighteen,
}

impl Holes {
    /// Validates a raw hole count (9 or 18).
    pub fn try_from_u8(holes: u8) -> Result<Self, BookingError> {
        match holes {
            9 => Ok(Holes::Nine),
            18 => Ok(Holes::Eighteen),
            _ => Err(BookingError::InvalidHoles { holes }),
        }
    }

    /// Returns the hole count as a plain integer.
    pub fn as_u8(&self) -> u8 {
        match self {
            Holes::Nine => 9,
            Holes::Eighteen => 18,
        }
    }
}

impl std::fmt::Display for Holes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Platform commission percentage, stored in basis points so a booking's
/// snapshot survives later changes to the platform-wide rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommissionRate(u32);

impl CommissionRate {
    /// Creates a rate from basis points (1/100th of a percent).
    pub fn from_basis_points(bps: u32) -> Self {
        Self(bps)
    }

    /// Creates a rate from a whole percentage.
    pub fn from_percent(percent: u32) -> Self {
        Self(percent * 100)
    }

    /// Returns the rate in basis points.
    pub fn basis_points(&self) -> u32 {
        self.0
    }

    /// Applies the rate to an amount, rounding half-up to the cent.
    pub fn apply(&self, amount: Money) -> Money {
        let raw = amount.cents() * i64::from(self.0);
        Money::from_cents((raw + 5_000) / 10_000)
    }
}

impl std::fmt::Display for CommissionRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

/// Per-player base rates by lesson length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateTable {
    /// Base rate for a 9-hole lesson, per player.
    pub nine: Money,
    /// Base rate for an 18-hole lesson, per player.
    pub eighteen: Money,
}

impl RateTable {
    /// Returns the per-player base rate for the given lesson length.
    pub fn rate_for(&self, holes: Holes) -> Money {
        match holes {
            Holes::Nine => self.nine,
            Holes::Eighteen => self.eighteen,
        }
    }
}

impl Default for RateTable {
    fn default() -> Self {
        Self {
            nine: Money::from_units(15),
            eighteen: Money::from_units(25),
        }
    }
}

/// The price breakdown computed at booking time and stored on the booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Fee owed to the teaching pro.
    pub pro_fee: Money,
    /// Platform fee commission on top of the pro fee.
    pub platform_fee: Money,
    /// Amount charged to the golfer.
    pub total: Money,
    /// Commission rate snapshot used for this quote.
    pub commission_rate: CommissionRate,
}

/// Computes the price for a lesson.
///
/// `pro_fee = max(rate_table[holes] × players, MINIMUM_FEE)`. The platform
/// fee is the commission applied to the pro fee, rounded half-up once; the
/// pro fee itself is never rounded because the rate table is fixed-point.
pub fn compute_quote(
    players: PlayerCount,
    holes: Holes,
    rate_table: &RateTable,
    commission_rate: CommissionRate,
) -> Quote {
    let raw_fee = rate_table.rate_for(holes).multiply(u32::from(players.get()));
    let pro_fee = raw_fee.max(MINIMUM_FEE);
    let platform_fee = commission_rate.apply(pro_fee);

    Quote {
        pro_fee,
        platform_fee,
        total: pro_fee + platform_fee,
        commission_rate,
    }
}
