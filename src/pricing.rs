// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Fare computation.
//!
//! [`compute_fare`] is a pure function from a ride request and a set of
//! pricing constants to an itemized fare breakdown:
//!
//! ```text
//! base_fare = distance_km * per_km_rate * (pooled ? pooling_discount_factor : 1)
//! total     = base_fare + flat_taxes_and_fees
//! ```
//!
//! No rounding is applied during computation. Stored amounts keep full
//! precision; [`FareBreakdown::display_total`] and friends round to two
//! decimal places for presentation only.
//!
//! # Example
//!
//! ```
//! use fare_ledger_rs::{compute_fare, PricingConstants, RideRequest, ServiceTier};
//! use rust_decimal_macros::dec;
//!
//! let request = RideRequest {
//!     pickup_label: "Toronto".into(),
//!     dropoff_label: "Ottawa".into(),
//!     tier: ServiceTier::Private,
//!     distance_km: dec!(50),
//! };
//! let breakdown = compute_fare(&request, &PricingConstants::default()).unwrap();
//! assert_eq!(breakdown.total(), dec!(117.50));
//! ```

use crate::EngineError;
use crate::tier::ServiceTier;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Fixed pricing policy, injected rather than hard-coded.
///
/// The defaults are the production constants (CAD): $2.15/km, a 0.35
/// rate multiplier for pooled tiers, and $10.00 flat taxes and fees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingConstants {
    /// Currency per kilometre for non-pooled tiers.
    pub per_km_rate: Decimal,
    /// Multiplier applied to the per-km rate for pooled tiers; in (0, 1].
    pub pooling_discount_factor: Decimal,
    /// Flat amount added on top of the base fare.
    pub flat_taxes_and_fees: Decimal,
}

impl PricingConstants {
    /// Creates a validated set of constants.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidRequest`] if the per-km rate is not
    /// positive, the discount factor is outside `(0, 1]`, or the flat
    /// fees are negative.
    pub fn new(
        per_km_rate: Decimal,
        pooling_discount_factor: Decimal,
        flat_taxes_and_fees: Decimal,
    ) -> Result<Self, EngineError> {
        let constants = Self {
            per_km_rate,
            pooling_discount_factor,
            flat_taxes_and_fees,
        };
        constants.validate()?;
        Ok(constants)
    }

    /// Checks the policy bounds without consuming the constants.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.per_km_rate <= Decimal::ZERO {
            return Err(EngineError::InvalidRequest("per-km rate must be positive"));
        }
        if self.pooling_discount_factor <= Decimal::ZERO
            || self.pooling_discount_factor > Decimal::ONE
        {
            return Err(EngineError::InvalidRequest(
                "pooling discount factor must be in (0, 1]",
            ));
        }
        if self.flat_taxes_and_fees < Decimal::ZERO {
            return Err(EngineError::InvalidRequest(
                "flat taxes and fees must not be negative",
            ));
        }
        Ok(())
    }
}

impl Default for PricingConstants {
    fn default() -> Self {
        Self {
            per_km_rate: dec!(2.15),
            pooling_discount_factor: dec!(0.35),
            flat_taxes_and_fees: dec!(10.00),
        }
    }
}

/// A rider's booking request, immutable once priced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RideRequest {
    pub pickup_label: String,
    pub dropoff_label: String,
    pub tier: ServiceTier,
    /// Estimated trip distance; must be positive.
    pub distance_km: Decimal,
}

impl RideRequest {
    /// Human-readable route, used as the transaction label.
    pub fn route_label(&self) -> String {
        format!("{} to {}", self.pickup_label, self.dropoff_label)
    }
}

/// Itemized result of pricing a single ride request.
///
/// Constructed only by [`compute_fare`], which guarantees
/// `total == base_fare + taxes_and_fees` and `base_fare >= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FareBreakdown {
    base_fare: Decimal,
    taxes_and_fees: Decimal,
    total: Decimal,
    tier: ServiceTier,
    discount_applied: bool,
}

impl FareBreakdown {
    /// Decimal places used for presentation; stored values are exact.
    pub const DISPLAY_PRECISION: u32 = 2;

    pub fn base_fare(&self) -> Decimal {
        self.base_fare
    }

    pub fn taxes_and_fees(&self) -> Decimal {
        self.taxes_and_fees
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    pub fn tier(&self) -> ServiceTier {
        self.tier
    }

    pub fn discount_applied(&self) -> bool {
        self.discount_applied
    }

    /// Base fare rounded for display.
    pub fn display_base_fare(&self) -> Decimal {
        self.base_fare.round_dp(Self::DISPLAY_PRECISION)
    }

    /// Total rounded for display.
    pub fn display_total(&self) -> Decimal {
        self.total.round_dp(Self::DISPLAY_PRECISION)
    }
}

/// Prices a ride request against the given constants.
///
/// Pure function: no side effects, no hidden state, identical inputs
/// yield identical breakdowns. Women-only tiers price exactly as their
/// [`ServiceTier::rate_counterpart`].
///
/// # Errors
///
/// - [`EngineError::InvalidRequest`] - distance is zero or negative, or
///   the constants fail validation.
pub fn compute_fare(
    request: &RideRequest,
    constants: &PricingConstants,
) -> Result<FareBreakdown, EngineError> {
    constants.validate()?;
    if request.distance_km <= Decimal::ZERO {
        return Err(EngineError::InvalidRequest("distance must be positive"));
    }

    let pooled = request.tier.is_pooled();
    let rate = if pooled {
        constants.per_km_rate * constants.pooling_discount_factor
    } else {
        constants.per_km_rate
    };
    let base_fare = request.distance_km * rate;
    let total = base_fare + constants.flat_taxes_and_fees;

    Ok(FareBreakdown {
        base_fare,
        taxes_and_fees: constants.flat_taxes_and_fees,
        total,
        tier: request.tier,
        discount_applied: pooled,
    })
}

/// Amount saved by pooling instead of riding private over the same
/// distance. Zero when the discount factor is 1.
pub fn pooling_savings(
    distance_km: Decimal,
    constants: &PricingConstants,
) -> Result<Decimal, EngineError> {
    constants.validate()?;
    if distance_km <= Decimal::ZERO {
        return Err(EngineError::InvalidRequest("distance must be positive"));
    }
    let full = distance_km * constants.per_km_rate;
    Ok(full - full * constants.pooling_discount_factor)
}
