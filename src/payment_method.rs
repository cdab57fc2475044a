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

//! Saved payment instruments for a rider.
//!
//! The store keeps the rider's methods in insertion order and persists
//! the full list on every mutation (replace-whole-collection, never
//! incremental). Writes follow write-then-commit ordering: the new list
//! is persisted first and the in-memory state only updates once the
//! write succeeds, so a failed write leaves the store unchanged.
//!
//! The first method ever added becomes the default. Removing the
//! default does NOT promote another method; the rider must pick a new
//! default explicitly. Intentionally preserved as-is pending a product
//! decision.

use crate::base::{MethodId, RiderId};
use crate::storage::{BlobStore, decode_collection, encode_collection, with_retry};
use crate::EngineError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Expiry recorded for instruments that do not expire (wallets).
pub const NO_EXPIRY: &str = "N/A";

/// Kind of payment instrument.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentMethodKind {
    CreditCard,
    DebitCard,
    DigitalWallet,
}

/// A saved payment instrument.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentMethod {
    pub id: MethodId,
    pub kind: PaymentMethodKind,
    /// Display handle: last card digits, or a wallet label.
    pub display_suffix: String,
    /// `MM/YY`, or [`NO_EXPIRY`] for wallets.
    pub expiry: String,
    pub is_default: bool,
}

/// Rider-supplied fields for a new payment method.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentMethodInput {
    pub kind: PaymentMethodKind,
    pub display_suffix: String,
    /// Omitted for wallets; recorded as [`NO_EXPIRY`].
    pub expiry: Option<String>,
}

/// Rider-scoped collection of saved payment methods.
pub struct PaymentMethodStore {
    rider: RiderId,
    store: Arc<dyn BlobStore>,
    retry_backoff: Duration,
    methods: Mutex<Vec<PaymentMethod>>,
}

/// Storage key for a rider's payment method collection.
pub(crate) fn storage_key(rider: RiderId) -> String {
    format!("rider-{}-payment-methods", rider)
}

impl PaymentMethodStore {
    /// Loads the rider's persisted methods, or starts empty if none.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Storage`] - the blob could not be read (after
    ///   one retry) or does not parse.
    /// - [`EngineError::UnsupportedSchema`] - persisted by a newer build.
    pub fn load(
        rider: RiderId,
        store: Arc<dyn BlobStore>,
        retry_backoff: Duration,
    ) -> Result<Self, EngineError> {
        let key = storage_key(rider);
        let methods = match with_retry(retry_backoff, || store.get(&key))? {
            Some(bytes) => decode_collection(&bytes)?,
            None => Vec::new(),
        };
        Ok(Self {
            rider,
            store,
            retry_backoff,
            methods: Mutex::new(methods),
        })
    }

    /// Adds a method, assigning a fresh id.
    ///
    /// The method becomes the default iff the store was empty at call
    /// time. The updated list is persisted before the in-memory state
    /// changes.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Storage`] - persisting the updated list failed;
    ///   the store is left unchanged.
    pub fn add(&self, input: PaymentMethodInput) -> Result<PaymentMethod, EngineError> {
        let mut methods = self.methods.lock();

        let method = PaymentMethod {
            id: MethodId::generate(),
            kind: input.kind,
            display_suffix: input.display_suffix,
            expiry: input.expiry.unwrap_or_else(|| NO_EXPIRY.to_string()),
            is_default: methods.is_empty(),
        };

        let mut updated = methods.clone();
        updated.push(method.clone());
        self.persist(&updated)?;

        *methods = updated;
        tracing::debug!(rider = %self.rider, method = %method.id, "payment method added");
        Ok(method)
    }

    /// Removes the method with the given id.
    ///
    /// Does not reassign the default flag to a surviving method.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] - no method with that id.
    /// - [`EngineError::Storage`] - persisting the updated list failed;
    ///   the store is left unchanged.
    pub fn remove(&self, id: MethodId) -> Result<(), EngineError> {
        let mut methods = self.methods.lock();

        let index = methods
            .iter()
            .position(|m| m.id == id)
            .ok_or(EngineError::NotFound)?;

        let mut updated = methods.clone();
        updated.remove(index);
        self.persist(&updated)?;

        *methods = updated;
        tracing::debug!(rider = %self.rider, method = %id, "payment method removed");
        Ok(())
    }

    /// All saved methods in insertion order.
    pub fn list(&self) -> Vec<PaymentMethod> {
        self.methods.lock().clone()
    }

    /// Looks up a single method by id.
    pub fn get(&self, id: MethodId) -> Option<PaymentMethod> {
        self.methods.lock().iter().find(|m| m.id == id).cloned()
    }

    /// The rider's default method, if one exists.
    pub fn default_method(&self) -> Option<PaymentMethod> {
        self.methods.lock().iter().find(|m| m.is_default).cloned()
    }

    fn persist(&self, methods: &[PaymentMethod]) -> Result<(), EngineError> {
        let key = storage_key(self.rider);
        let bytes = encode_collection(methods)?;
        with_retry(self.retry_backoff, || self.store.set(&key, &bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn card_input(suffix: &str) -> PaymentMethodInput {
        PaymentMethodInput {
            kind: PaymentMethodKind::CreditCard,
            display_suffix: suffix.to_string(),
            expiry: Some("12/27".to_string()),
        }
    }

    fn empty_store() -> PaymentMethodStore {
        PaymentMethodStore::load(RiderId(1), Arc::new(MemoryStore::new()), Duration::ZERO).unwrap()
    }

    #[test]
    fn first_method_becomes_default() {
        let store = empty_store();
        let first = store.add(card_input("4242")).unwrap();
        let second = store.add(card_input("1881")).unwrap();

        assert!(first.is_default);
        assert!(!second.is_default);

        let listed = store.list();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].is_default);
        assert!(!listed[1].is_default);
    }

    #[test]
    fn wallet_records_no_expiry() {
        let store = empty_store();
        let wallet = store
            .add(PaymentMethodInput {
                kind: PaymentMethodKind::DigitalWallet,
                display_suffix: "GPay".to_string(),
                expiry: None,
            })
            .unwrap();
        assert_eq!(wallet.expiry, NO_EXPIRY);
    }

    #[test]
    fn remove_unknown_id_is_not_found() {
        let store = empty_store();
        store.add(card_input("4242")).unwrap();

        let result = store.remove(MethodId::generate());
        assert_eq!(result, Err(EngineError::NotFound));
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn removing_default_does_not_promote_another() {
        let store = empty_store();
        let first = store.add(card_input("4242")).unwrap();
        store.add(card_input("1881")).unwrap();

        store.remove(first.id).unwrap();

        let listed = store.list();
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].is_default);
        assert!(store.default_method().is_none());
    }

    #[test]
    fn failed_write_leaves_memory_unchanged() {
        let backing = Arc::new(MemoryStore::new());
        let store =
            PaymentMethodStore::load(RiderId(1), backing.clone(), Duration::ZERO)
                .unwrap();
        store.add(card_input("4242")).unwrap();

        // Two injected failures defeat the single retry.
        backing.fail_next_writes(2);
        let result = store.add(card_input("1881"));
        assert!(matches!(result, Err(EngineError::Storage(_))));
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn single_transient_failure_is_retried() {
        let backing = Arc::new(MemoryStore::new());
        let store =
            PaymentMethodStore::load(RiderId(1), backing.clone(), Duration::ZERO)
                .unwrap();

        backing.fail_next_writes(1);
        assert!(store.add(card_input("4242")).is_ok());
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn methods_survive_reload() {
        let backing = Arc::new(MemoryStore::new());
        {
            let store =
                PaymentMethodStore::load(RiderId(7), backing.clone(), Duration::ZERO)
                    .unwrap();
            store.add(card_input("4242")).unwrap();
            store.add(card_input("1881")).unwrap();
        }

        let reloaded =
            PaymentMethodStore::load(RiderId(7), backing.clone(), Duration::ZERO)
                .unwrap();
        let listed = reloaded.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].display_suffix, "4242");
        assert!(listed[0].is_default);
    }
}
