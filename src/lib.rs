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

//! # Fare Ledger
//!
//! This library provides a fare computation and payment bookkeeping
//! engine for ride bookings: pricing across service tiers, rider-scoped
//! payment methods, a checkout state machine, and an append-only ledger
//! of successful charges.
//!
//! ## Core Components
//!
//! - [`Engine`]: Central façade managing per-rider sessions
//! - [`compute_fare`]: Pure fare computation over [`PricingConstants`]
//! - [`PaymentMethodStore`]: Saved payment instruments for a rider
//! - [`TransactionLedger`]: Append-only record of successful charges
//! - [`BlobStore`]: Persistence seam (in-memory and JSON-file backed)
//! - [`AuthorizationGateway`]: Payment-authorization seam
//!
//! ## Example
//!
//! ```
//! use fare_ledger_rs::{
//!     Engine, FixedDelayGateway, MemoryStore, PaymentMethodInput, PaymentMethodKind,
//!     PricingConstants, RideRequest, RiderId, ServiceTier,
//! };
//! use rust_decimal_macros::dec;
//! use std::sync::Arc;
//!
//! let engine = Engine::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(FixedDelayGateway::instant()),
//!     PricingConstants::default(),
//! )
//! .unwrap();
//!
//! let rider = RiderId(1);
//!
//! // Price a booking.
//! let breakdown = engine
//!     .price(
//!         rider,
//!         RideRequest {
//!             pickup_label: "Toronto".into(),
//!             dropoff_label: "Ottawa".into(),
//!             tier: ServiceTier::Private,
//!             distance_km: dec!(50),
//!         },
//!     )
//!     .unwrap();
//! assert_eq!(breakdown.total(), dec!(117.50));
//!
//! // Save a payment method and check out.
//! let method = engine
//!     .add_payment_method(
//!         rider,
//!         PaymentMethodInput {
//!             kind: PaymentMethodKind::CreditCard,
//!             display_suffix: "4242".into(),
//!             expiry: Some("12/27".into()),
//!         },
//!     )
//!     .unwrap();
//! engine.select_method(rider, method.id).unwrap();
//! let transaction = engine.checkout(rider).unwrap();
//! assert_eq!(transaction.amount(), dec!(117.50));
//! ```
//!
//! ## Thread Safety
//!
//! Riders are fully independent; within one rider, at most one checkout
//! may be authorizing at a time and concurrent attempts fail fast with
//! [`EngineError::CheckoutInFlight`].

pub mod base;
mod checkout;
mod engine;
pub mod error;
mod ledger;
mod payment_method;
mod pricing;
pub mod storage;
mod tier;
mod transaction;

pub use base::{MethodId, RiderId, TransactionId};
pub use checkout::{
    AuthOutcome, AuthorizationGateway, CheckoutState, DecliningGateway, FixedDelayGateway,
    PricedBooking,
};
pub use engine::Engine;
pub use error::EngineError;
pub use ledger::TransactionLedger;
pub use payment_method::{
    NO_EXPIRY, PaymentMethod, PaymentMethodInput, PaymentMethodKind, PaymentMethodStore,
};
pub use pricing::{FareBreakdown, PricingConstants, RideRequest, compute_fare, pooling_savings};
pub use storage::{BlobStore, JsonFileStore, MemoryStore};
pub use tier::{ServiceTier, TierProfile};
pub use transaction::{Transaction, TransactionStatus};
