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

//! Service tiers and their pricing/eligibility profiles.
//!
//! Tiers form a closed set. The women-only variants change who may share
//! the ride, not how it is priced: each inherits the rate structure of
//! its base counterpart.

use crate::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ride service category selected at booking time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceTier {
    Private,
    Pooled,
    WomenOnlyPooled,
    WomenOnlyPrivate,
}

/// Pricing and eligibility metadata for a tier.
///
/// | Tier | pooled | eligibility |
/// |------|--------|-------------|
/// | Private | false | all riders |
/// | Pooled | true | all riders |
/// | WomenOnlyPooled | true | women only |
/// | WomenOnlyPrivate | false | women only |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierProfile {
    /// Whether the pooling discount factor applies to the per-km rate.
    pub pooled: bool,
    /// Who may share the vehicle; informational, no effect on price.
    pub eligibility: &'static str,
}

impl ServiceTier {
    /// All tiers, in display order.
    pub const ALL: [ServiceTier; 4] = [
        ServiceTier::Private,
        ServiceTier::Pooled,
        ServiceTier::WomenOnlyPooled,
        ServiceTier::WomenOnlyPrivate,
    ];

    /// Returns the pricing/eligibility profile for this tier.
    pub fn profile(self) -> TierProfile {
        match self {
            ServiceTier::Private => TierProfile {
                pooled: false,
                eligibility: "all riders",
            },
            ServiceTier::Pooled => TierProfile {
                pooled: true,
                eligibility: "all riders",
            },
            ServiceTier::WomenOnlyPooled => TierProfile {
                pooled: true,
                eligibility: "women only",
            },
            ServiceTier::WomenOnlyPrivate => TierProfile {
                pooled: false,
                eligibility: "women only",
            },
        }
    }

    /// Whether this tier is priced at the discounted pooling rate.
    pub fn is_pooled(self) -> bool {
        self.profile().pooled
    }

    /// The tier whose rate structure this tier inherits.
    ///
    /// Women-only tiers price exactly as their base counterpart.
    pub fn rate_counterpart(self) -> ServiceTier {
        match self {
            ServiceTier::WomenOnlyPooled => ServiceTier::Pooled,
            ServiceTier::WomenOnlyPrivate => ServiceTier::Private,
            other => other,
        }
    }

    /// Stable wire name, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceTier::Private => "private",
            ServiceTier::Pooled => "pooled",
            ServiceTier::WomenOnlyPooled => "women-only-pooled",
            ServiceTier::WomenOnlyPrivate => "women-only-private",
        }
    }
}

impl fmt::Display for ServiceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ServiceTier {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(ServiceTier::Private),
            "pooled" => Ok(ServiceTier::Pooled),
            "women-only-pooled" => Ok(ServiceTier::WomenOnlyPooled),
            "women-only-private" => Ok(ServiceTier::WomenOnlyPrivate),
            _ => Err(EngineError::InvalidRequest("unknown service tier")),
        }
    }
}
