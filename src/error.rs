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

//! Error types for fare computation, payment bookkeeping, and checkout.

use thiserror::Error;

/// Engine processing errors.
///
/// None of these are swallowed internally; every failure reaches the
/// caller. Storage failures are retried at most once before surfacing;
/// authorization failures are never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Pricing input failed local validation (never retried)
    #[error("invalid ride request: {0}")]
    InvalidRequest(&'static str),

    /// Referenced payment method does not exist
    #[error("payment method not found")]
    NotFound,

    /// Persistence read or write failed
    #[error("storage failure: {0}")]
    Storage(String),

    /// Persisted data uses a schema newer than this build understands
    #[error("unsupported storage schema version {0}")]
    UnsupportedSchema(u32),

    /// The gateway declined the charge; terminal for this attempt
    #[error("authorization declined")]
    AuthorizationDeclined,

    /// Another checkout for this rider is already authorizing
    #[error("checkout already in flight")]
    CheckoutInFlight,

    /// Checkout was attempted without a priced booking
    #[error("no priced booking to check out")]
    NoPricedBooking,

    /// Checkout was attempted without a selected payment method
    #[error("no payment method selected")]
    NoMethodSelected,
}

#[cfg(test)]
mod tests {
    use super::EngineError;

    #[test]
    fn error_display_messages() {
        assert_eq!(
            EngineError::InvalidRequest("distance must be positive").to_string(),
            "invalid ride request: distance must be positive"
        );
        assert_eq!(EngineError::NotFound.to_string(), "payment method not found");
        assert_eq!(
            EngineError::Storage("disk full".into()).to_string(),
            "storage failure: disk full"
        );
        assert_eq!(
            EngineError::UnsupportedSchema(9).to_string(),
            "unsupported storage schema version 9"
        );
        assert_eq!(
            EngineError::AuthorizationDeclined.to_string(),
            "authorization declined"
        );
        assert_eq!(
            EngineError::CheckoutInFlight.to_string(),
            "checkout already in flight"
        );
        assert_eq!(
            EngineError::NoPricedBooking.to_string(),
            "no priced booking to check out"
        );
        assert_eq!(
            EngineError::NoMethodSelected.to_string(),
            "no payment method selected"
        );
    }

    #[test]
    fn errors_are_cloneable() {
        let error = EngineError::AuthorizationDeclined;
        let cloned = error.clone();
        assert_eq!(error, cloned);
    }
}
