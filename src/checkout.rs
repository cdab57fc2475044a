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

//! Checkout state machine and the authorization seam.
//!
//! Checkout follows a per-rider state machine:
//!
//! - [`Idle`] → [`MethodSelected`] (via select)
//! - [`MethodSelected`] → [`Authorizing`] (via checkout)
//! - [`Authorizing`] → [`Idle`] (authorized; charge recorded, booking cleared)
//! - [`Authorizing`] → [`MethodSelected`] (declined; error surfaced, nothing written)
//!
//! `Authorizing` is the only suspending state: it covers the gateway
//! round trip. At most one checkout per rider may be authorizing at a
//! time; a second attempt fails fast instead of queueing. Abandoning a
//! booking is allowed from `Idle` and `MethodSelected` only — once the
//! authorization call has been dispatched the outcome must be awaited,
//! otherwise the charge state would be ambiguous.
//!
//! [`Idle`]: CheckoutState::Idle
//! [`MethodSelected`]: CheckoutState::MethodSelected
//! [`Authorizing`]: CheckoutState::Authorizing

use crate::base::MethodId;
use crate::payment_method::PaymentMethod;
use crate::pricing::{FareBreakdown, RideRequest};
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;

/// Where a rider's checkout currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum CheckoutState {
    /// No payment method selected.
    Idle,
    /// A method is selected; authorization has not been dispatched.
    MethodSelected { method: MethodId },
    /// The authorization call is in flight.
    Authorizing { method: MethodId },
}

impl CheckoutState {
    pub fn is_authorizing(&self) -> bool {
        matches!(self, CheckoutState::Authorizing { .. })
    }
}

/// The in-progress booking occupying a rider's single booking slot.
///
/// Created when a request is priced; cleared when checkout completes or
/// the booking is abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricedBooking {
    pub request: RideRequest,
    pub breakdown: FareBreakdown,
}

/// Outcome of one authorization attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Authorized,
    Declined,
}

/// Payment-authorization collaborator.
///
/// This is the seam where a real payment gateway belongs. The engine
/// calls it with the selected method and the fare total, outside any
/// internal lock, and never retries it on its own.
pub trait AuthorizationGateway: Send + Sync {
    fn authorize(&self, method: &PaymentMethod, amount: Decimal) -> AuthOutcome;
}

/// Stand-in gateway: waits a fixed delay, then approves unconditionally.
///
/// Mirrors the simulated processing the engine was originally driven
/// against. Useful for demos and tests; not a payment integration.
#[derive(Debug, Clone)]
pub struct FixedDelayGateway {
    delay: Duration,
}

impl FixedDelayGateway {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Approves immediately, without the simulated latency.
    pub fn instant() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl AuthorizationGateway for FixedDelayGateway {
    fn authorize(&self, _method: &PaymentMethod, _amount: Decimal) -> AuthOutcome {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        AuthOutcome::Authorized
    }
}

/// Gateway that declines every attempt. Test double for the declined
/// path.
#[derive(Debug, Clone, Default)]
pub struct DecliningGateway;

impl AuthorizationGateway for DecliningGateway {
    fn authorize(&self, _method: &PaymentMethod, _amount: Decimal) -> AuthOutcome {
        AuthOutcome::Declined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::MethodId;
    use crate::payment_method::{PaymentMethod, PaymentMethodKind};
    use rust_decimal_macros::dec;

    fn method() -> PaymentMethod {
        PaymentMethod {
            id: MethodId::generate(),
            kind: PaymentMethodKind::CreditCard,
            display_suffix: "4242".into(),
            expiry: "12/27".into(),
            is_default: true,
        }
    }

    #[test]
    fn fixed_delay_gateway_always_approves() {
        let gateway = FixedDelayGateway::instant();
        assert_eq!(
            gateway.authorize(&method(), dec!(117.50)),
            AuthOutcome::Authorized
        );
    }

    #[test]
    fn declining_gateway_always_declines() {
        let gateway = DecliningGateway;
        assert_eq!(
            gateway.authorize(&method(), dec!(117.50)),
            AuthOutcome::Declined
        );
    }

    #[test]
    fn only_authorizing_counts_as_in_flight() {
        let method = MethodId::generate();
        assert!(!CheckoutState::Idle.is_authorizing());
        assert!(!CheckoutState::MethodSelected { method }.is_authorizing());
        assert!(CheckoutState::Authorizing { method }.is_authorizing());
    }
}
