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

//! Fare and ledger engine.
//!
//! The [`Engine`] is the central component tying pricing, payment
//! methods, the checkout state machine, and the transaction ledger
//! together. Each rider gets an isolated session holding their saved
//! methods, their ledger, the single booking slot, and their checkout
//! state; sessions are hydrated from the injected [`BlobStore`] on
//! first touch.
//!
//! # Checkout Flow
//!
//! | Step | Operation | Effect |
//! |------|-----------|--------|
//! | 1 | [`Engine::price`] | Computes the fare, fills the booking slot |
//! | 2 | [`Engine::select_method`] | Picks a saved payment method |
//! | 3 | [`Engine::checkout`] | Authorizes, records the charge, clears the slot |
//!
//! # Thread Safety
//!
//! Sessions live in a [`DashMap`], so riders proceed fully in parallel.
//! Within one rider, the authorization call runs outside every lock;
//! concurrent operations observe the `Authorizing` state and fail with
//! [`EngineError::CheckoutInFlight`] instead of blocking.
//!
//! # Invariants
//!
//! - At most one checkout per rider is authorizing at any time.
//! - A declined authorization writes nothing: no transaction, no
//!   booking-slot mutation.
//! - The booking slot is cleared only by a recorded charge or an
//!   explicit abandon.
//! - Authorization is never retried by the engine; storage operations
//!   are retried at most once.

use crate::base::{MethodId, RiderId};
use crate::checkout::{AuthOutcome, AuthorizationGateway, CheckoutState, PricedBooking};
use crate::ledger::TransactionLedger;
use crate::payment_method::{PaymentMethod, PaymentMethodInput, PaymentMethodStore};
use crate::pricing::{FareBreakdown, PricingConstants, RideRequest, compute_fare};
use crate::storage::BlobStore;
use crate::transaction::Transaction;
use crate::EngineError;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Backoff before the single storage retry.
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Per-rider state: payment methods, ledger, booking slot, checkout.
///
/// Lock order within a session is checkout state first, then the
/// booking slot; nothing holds either lock across the gateway call.
struct RiderSession {
    methods: PaymentMethodStore,
    ledger: TransactionLedger,
    booking: Mutex<Option<PricedBooking>>,
    checkout: Mutex<CheckoutState>,
}

impl RiderSession {
    fn load(
        rider: RiderId,
        store: Arc<dyn BlobStore>,
        retry_backoff: Duration,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            methods: PaymentMethodStore::load(rider, Arc::clone(&store), retry_backoff)?,
            ledger: TransactionLedger::load(rider, store, retry_backoff)?,
            booking: Mutex::new(None),
            checkout: Mutex::new(CheckoutState::Idle),
        })
    }
}

/// Fare computation and payment bookkeeping engine.
pub struct Engine {
    sessions: DashMap<RiderId, Arc<RiderSession>>,
    store: Arc<dyn BlobStore>,
    gateway: Arc<dyn AuthorizationGateway>,
    constants: PricingConstants,
    retry_backoff: Duration,
}

impl Engine {
    /// Creates an engine over the given persistence and authorization
    /// collaborators.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidRequest`] if the pricing constants fail
    /// validation.
    pub fn new(
        store: Arc<dyn BlobStore>,
        gateway: Arc<dyn AuthorizationGateway>,
        constants: PricingConstants,
    ) -> Result<Self, EngineError> {
        Self::with_retry_backoff(store, gateway, constants, DEFAULT_RETRY_BACKOFF)
    }

    /// Like [`Engine::new`] with an explicit storage retry backoff.
    /// Tests pass [`Duration::ZERO`].
    pub fn with_retry_backoff(
        store: Arc<dyn BlobStore>,
        gateway: Arc<dyn AuthorizationGateway>,
        constants: PricingConstants,
        retry_backoff: Duration,
    ) -> Result<Self, EngineError> {
        constants.validate()?;
        Ok(Self {
            sessions: DashMap::new(),
            store,
            gateway,
            constants,
            retry_backoff,
        })
    }

    /// The pricing policy this engine applies.
    pub fn constants(&self) -> &PricingConstants {
        &self.constants
    }

    /// Riders with a hydrated session, in ascending id order.
    pub fn riders(&self) -> Vec<RiderId> {
        let mut riders: Vec<RiderId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        riders.sort();
        riders
    }

    /// Prices a ride request and fills the rider's booking slot.
    ///
    /// Re-pricing replaces any previous un-checked-out booking.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidRequest`] - distance is zero or negative.
    /// - [`EngineError::CheckoutInFlight`] - an authorization is running.
    /// - [`EngineError::Storage`] - session hydration failed.
    pub fn price(
        &self,
        rider: RiderId,
        request: RideRequest,
    ) -> Result<FareBreakdown, EngineError> {
        let session = self.session(rider)?;
        let breakdown = compute_fare(&request, &self.constants)?;

        let state = session.checkout.lock();
        if state.is_authorizing() {
            return Err(EngineError::CheckoutInFlight);
        }
        *session.booking.lock() = Some(PricedBooking { request, breakdown });
        drop(state);

        tracing::debug!(rider = %rider, total = %breakdown.total(), "booking priced");
        Ok(breakdown)
    }

    /// The rider's in-progress priced booking, if any.
    pub fn current_booking(&self, rider: RiderId) -> Result<Option<PricedBooking>, EngineError> {
        let session = self.session(rider)?;
        let booking = session.booking.lock().clone();
        Ok(booking)
    }

    /// Abandons the in-progress booking: clears the slot and resets the
    /// checkout machine.
    ///
    /// # Errors
    ///
    /// - [`EngineError::CheckoutInFlight`] - the authorization call has
    ///   already been dispatched; the outcome must be awaited.
    pub fn abandon_booking(&self, rider: RiderId) -> Result<(), EngineError> {
        let session = self.session(rider)?;
        let mut state = session.checkout.lock();
        if state.is_authorizing() {
            return Err(EngineError::CheckoutInFlight);
        }
        *state = CheckoutState::Idle;
        *session.booking.lock() = None;
        tracing::debug!(rider = %rider, "booking abandoned");
        Ok(())
    }

    /// Adds a payment method for the rider.
    pub fn add_payment_method(
        &self,
        rider: RiderId,
        input: PaymentMethodInput,
    ) -> Result<PaymentMethod, EngineError> {
        self.session(rider)?.methods.add(input)
    }

    /// Removes a payment method.
    ///
    /// A selection pointing at the removed method is caught at checkout
    /// time, not here.
    pub fn remove_payment_method(&self, rider: RiderId, id: MethodId) -> Result<(), EngineError> {
        self.session(rider)?.methods.remove(id)
    }

    /// The rider's saved methods in insertion order.
    pub fn payment_methods(&self, rider: RiderId) -> Result<Vec<PaymentMethod>, EngineError> {
        Ok(self.session(rider)?.methods.list())
    }

    /// The rider's default method, if one exists.
    pub fn default_payment_method(
        &self,
        rider: RiderId,
    ) -> Result<Option<PaymentMethod>, EngineError> {
        Ok(self.session(rider)?.methods.default_method())
    }

    /// Selects the payment method to charge at checkout.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] - no method with that id.
    /// - [`EngineError::CheckoutInFlight`] - an authorization is running.
    pub fn select_method(&self, rider: RiderId, id: MethodId) -> Result<(), EngineError> {
        let session = self.session(rider)?;
        let mut state = session.checkout.lock();
        if state.is_authorizing() {
            return Err(EngineError::CheckoutInFlight);
        }
        if session.methods.get(id).is_none() {
            return Err(EngineError::NotFound);
        }
        *state = CheckoutState::MethodSelected { method: id };
        Ok(())
    }

    /// The rider's current checkout state.
    pub fn checkout_state(&self, rider: RiderId) -> Result<CheckoutState, EngineError> {
        Ok(*self.session(rider)?.checkout.lock())
    }

    /// Runs the checkout: authorize the selected method for the priced
    /// total, record the charge, clear the booking slot.
    ///
    /// On success the checkout machine returns to idle. A declined
    /// authorization surfaces [`EngineError::AuthorizationDeclined`]
    /// and keeps the method selected so the rider can retry explicitly;
    /// nothing is recorded. If the charge was authorized but recording
    /// it failed, the booking is kept, the method stays selected, and
    /// the storage error surfaces; the engine never re-authorizes on
    /// its own.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NoMethodSelected`] - checkout from idle.
    /// - [`EngineError::NoPricedBooking`] - nothing has been priced.
    /// - [`EngineError::NotFound`] - the selected method was removed.
    /// - [`EngineError::CheckoutInFlight`] - already authorizing.
    /// - [`EngineError::AuthorizationDeclined`] - gateway declined.
    /// - [`EngineError::Storage`] - recording the charge failed.
    pub fn checkout(&self, rider: RiderId) -> Result<Transaction, EngineError> {
        let session = self.session(rider)?;

        // Claim the in-flight slot and snapshot the inputs.
        let (method, booking) = {
            let mut state = session.checkout.lock();
            let method_id = match *state {
                CheckoutState::Authorizing { .. } => return Err(EngineError::CheckoutInFlight),
                CheckoutState::Idle => return Err(EngineError::NoMethodSelected),
                CheckoutState::MethodSelected { method } => method,
            };
            let booking = match session.booking.lock().clone() {
                Some(booking) => booking,
                None => return Err(EngineError::NoPricedBooking),
            };
            let method = match session.methods.get(method_id) {
                Some(method) => method,
                None => {
                    // Stale selection; the method was removed.
                    *state = CheckoutState::Idle;
                    return Err(EngineError::NotFound);
                }
            };
            *state = CheckoutState::Authorizing { method: method_id };
            (method, booking)
        };

        tracing::debug!(rider = %rider, total = %booking.breakdown.total(), "authorization dispatched");
        let outcome = self.gateway.authorize(&method, booking.breakdown.total());

        match outcome {
            AuthOutcome::Authorized => {
                let recorded = session
                    .ledger
                    .record_successful_charge(&booking.breakdown, &booking.request.route_label());
                match recorded {
                    Ok(transaction) => {
                        let mut state = session.checkout.lock();
                        *session.booking.lock() = None;
                        *state = CheckoutState::Idle;
                        tracing::debug!(rider = %rider, transaction = %transaction.id(), "checkout complete");
                        Ok(transaction)
                    }
                    Err(error) => {
                        let mut state = session.checkout.lock();
                        *state = CheckoutState::MethodSelected { method: method.id };
                        tracing::warn!(rider = %rider, error = %error, "authorized charge could not be recorded");
                        Err(error)
                    }
                }
            }
            AuthOutcome::Declined => {
                let mut state = session.checkout.lock();
                *state = CheckoutState::MethodSelected { method: method.id };
                tracing::debug!(rider = %rider, "authorization declined");
                Err(EngineError::AuthorizationDeclined)
            }
        }
    }

    /// The rider's successful transactions in chronological order.
    pub fn transactions(&self, rider: RiderId) -> Result<Vec<Transaction>, EngineError> {
        Ok(self.session(rider)?.ledger.list_successful())
    }

    /// Fetches the rider's session, hydrating it from storage on first
    /// touch (this is where the ledger's load-time heal runs).
    fn session(&self, rider: RiderId) -> Result<Arc<RiderSession>, EngineError> {
        if let Some(existing) = self.sessions.get(&rider) {
            return Ok(Arc::clone(existing.value()));
        }
        match self.sessions.entry(rider) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let session = Arc::new(RiderSession::load(
                    rider,
                    Arc::clone(&self.store),
                    self.retry_backoff,
                )?);
                entry.insert(Arc::clone(&session));
                Ok(session)
            }
        }
    }
}
