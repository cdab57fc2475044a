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

//! Recorded charges.
//!
//! A [`Transaction`] exists only for charges that were authorized; a
//! declined or abandoned checkout leaves no trace. Records are immutable
//! once created and are never updated or deleted by this engine.

use crate::base::TransactionId;
use crate::pricing::FareBreakdown;
use crate::tier::ServiceTier;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Status of a recorded transaction.
///
/// Only successful charges are ever recorded, so this enum has a single
/// variant: the invariant is enforced by construction, not by a runtime
/// filter. The ledger additionally filters defensively when loading
/// persisted data (see [`crate::TransactionLedger`]).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Successful,
}

impl TransactionStatus {
    /// Stable wire name, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Successful => "successful",
        }
    }
}

/// An immutable record of one successfully charged ride.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    id: TransactionId,
    route_label: String,
    occurred_at: DateTime<Utc>,
    amount: Decimal,
    tier: ServiceTier,
    status: TransactionStatus,
}

impl Transaction {
    /// Builds the record for an authorized charge. The only constructor;
    /// status is always [`TransactionStatus::Successful`].
    pub(crate) fn from_charge(breakdown: &FareBreakdown, route_label: &str) -> Self {
        Self {
            id: TransactionId::generate(),
            route_label: route_label.to_string(),
            occurred_at: Utc::now(),
            amount: breakdown.total(),
            tier: breakdown.tier(),
            status: TransactionStatus::Successful,
        }
    }

    /// Rebuilds a record from its persisted fields.
    pub(crate) fn from_stored(
        id: TransactionId,
        route_label: String,
        occurred_at: DateTime<Utc>,
        amount: Decimal,
        tier: ServiceTier,
    ) -> Self {
        Self {
            id,
            route_label,
            occurred_at,
            amount,
            tier,
            status: TransactionStatus::Successful,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn route_label(&self) -> &str {
        &self.route_label
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// Charged amount; the full-precision fare total.
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn tier(&self) -> ServiceTier {
        self.tier
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::{PricingConstants, RideRequest, compute_fare};
    use rust_decimal_macros::dec;

    #[test]
    fn charge_record_copies_breakdown_total() {
        let breakdown = compute_fare(
            &RideRequest {
                pickup_label: "A".into(),
                dropoff_label: "B".into(),
                tier: ServiceTier::Pooled,
                distance_km: dec!(50),
            },
            &PricingConstants::default(),
        )
        .unwrap();

        let before = Utc::now();
        let tx = Transaction::from_charge(&breakdown, "A to B");

        assert_eq!(tx.amount(), dec!(47.625));
        assert_eq!(tx.tier(), ServiceTier::Pooled);
        assert_eq!(tx.status(), TransactionStatus::Successful);
        assert_eq!(tx.route_label(), "A to B");
        assert!(tx.occurred_at() >= before);
    }

    #[test]
    fn status_wire_name_is_lowercase() {
        assert_eq!(TransactionStatus::Successful.as_str(), "successful");
        assert_eq!(
            serde_json::to_string(&TransactionStatus::Successful).unwrap(),
            "\"successful\""
        );
    }
}
