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

//! Append-only ledger of successful charges.
//!
//! Every recorded transaction has status `successful` by construction.
//! Previously persisted data may not: the load path filters out any
//! record with another status and, when the filter drops something,
//! rewrites the healed list immediately. This self-heal runs exactly
//! once, at repository construction, never at read time.

use crate::base::{RiderId, TransactionId};
use crate::pricing::FareBreakdown;
use crate::storage::{BlobStore, decode_collection, encode_collection, with_retry};
use crate::tier::ServiceTier;
use crate::transaction::{Transaction, TransactionStatus};
use crate::EngineError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Persisted record shape.
///
/// `status` is a free-form string here, not [`TransactionStatus`]: old
/// data may carry statuses this engine never writes, and the heal step
/// must be able to read them in order to drop them.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredTransaction {
    id: TransactionId,
    route: String,
    occurred_at: DateTime<Utc>,
    amount: Decimal,
    tier: ServiceTier,
    status: String,
}

impl StoredTransaction {
    fn from_transaction(tx: &Transaction) -> Self {
        Self {
            id: tx.id(),
            route: tx.route_label().to_string(),
            occurred_at: tx.occurred_at(),
            amount: tx.amount(),
            tier: tx.tier(),
            status: tx.status().as_str().to_string(),
        }
    }

    fn into_transaction(self) -> Transaction {
        Transaction::from_stored(self.id, self.route, self.occurred_at, self.amount, self.tier)
    }
}

/// Rider-scoped, chronological list of successful charges.
pub struct TransactionLedger {
    rider: RiderId,
    store: Arc<dyn BlobStore>,
    retry_backoff: Duration,
    transactions: Mutex<Vec<Transaction>>,
}

/// Storage key for a rider's transaction collection.
pub(crate) fn storage_key(rider: RiderId) -> String {
    format!("rider-{}-transactions", rider)
}

impl TransactionLedger {
    /// Loads the rider's persisted ledger, filtering out any record
    /// whose status is not `successful` and rewriting the healed list
    /// when the filter dropped something.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Storage`] - the blob could not be read or does
    ///   not parse; also if rewriting the healed list fails.
    /// - [`EngineError::UnsupportedSchema`] - persisted by a newer build.
    pub fn load(
        rider: RiderId,
        store: Arc<dyn BlobStore>,
        retry_backoff: Duration,
    ) -> Result<Self, EngineError> {
        let key = storage_key(rider);
        let stored: Vec<StoredTransaction> = match with_retry(retry_backoff, || store.get(&key))? {
            Some(bytes) => decode_collection(&bytes)?,
            None => Vec::new(),
        };

        let total = stored.len();
        let successful: Vec<StoredTransaction> = stored
            .into_iter()
            .filter(|tx| tx.status == TransactionStatus::Successful.as_str())
            .collect();

        let ledger = Self {
            rider,
            store,
            retry_backoff,
            transactions: Mutex::new(
                successful.iter().cloned().map(StoredTransaction::into_transaction).collect(),
            ),
        };

        // Heal the persisted copy so the bad records never come back.
        if successful.len() != total {
            tracing::warn!(
                rider = %rider,
                dropped = total - successful.len(),
                "dropping non-successful transaction records from persisted ledger"
            );
            ledger.persist(&successful)?;
        }

        Ok(ledger)
    }

    /// Records an authorized charge.
    ///
    /// Assigns a fresh id and the current timestamp, fixes status to
    /// `successful`, appends, and persists the full list before the
    /// in-memory state changes.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Storage`] - persisting the updated list failed;
    ///   the ledger is left unchanged.
    pub fn record_successful_charge(
        &self,
        breakdown: &FareBreakdown,
        route_label: &str,
    ) -> Result<Transaction, EngineError> {
        let mut transactions = self.transactions.lock();

        let transaction = Transaction::from_charge(breakdown, route_label);

        let mut updated = transactions.clone();
        updated.push(transaction.clone());
        let stored: Vec<StoredTransaction> =
            updated.iter().map(StoredTransaction::from_transaction).collect();
        self.persist(&stored)?;

        *transactions = updated;
        tracing::debug!(
            rider = %self.rider,
            transaction = %transaction.id(),
            amount = %transaction.amount(),
            "charge recorded"
        );
        Ok(transaction)
    }

    /// All recorded charges in chronological (insertion) order.
    pub fn list_successful(&self) -> Vec<Transaction> {
        self.transactions.lock().clone()
    }

    fn persist(&self, stored: &[StoredTransaction]) -> Result<(), EngineError> {
        let key = storage_key(self.rider);
        let bytes = encode_collection(stored)?;
        with_retry(self.retry_backoff, || self.store.set(&key, &bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::{PricingConstants, RideRequest, compute_fare};
    use crate::storage::MemoryStore;
    use rust_decimal_macros::dec;

    fn breakdown() -> FareBreakdown {
        compute_fare(
            &RideRequest {
                pickup_label: "A".into(),
                dropoff_label: "B".into(),
                tier: ServiceTier::Private,
                distance_km: dec!(50),
            },
            &PricingConstants::default(),
        )
        .unwrap()
    }

    #[test]
    fn recorded_charge_appears_in_listing() {
        let ledger =
            TransactionLedger::load(RiderId(1), Arc::new(MemoryStore::new()), Duration::ZERO)
                .unwrap();

        let before = Utc::now();
        let tx = ledger.record_successful_charge(&breakdown(), "A to B").unwrap();

        let listed = ledger.list_successful();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], tx);
        assert_eq!(listed[0].amount(), dec!(117.50));
        assert_eq!(listed[0].status(), TransactionStatus::Successful);
        assert!(listed[0].occurred_at() >= before);
    }

    #[test]
    fn charges_list_in_insertion_order() {
        let ledger =
            TransactionLedger::load(RiderId(1), Arc::new(MemoryStore::new()), Duration::ZERO)
                .unwrap();

        let first = ledger.record_successful_charge(&breakdown(), "A to B").unwrap();
        let second = ledger.record_successful_charge(&breakdown(), "B to C").unwrap();

        let listed = ledger.list_successful();
        assert_eq!(listed[0].id(), first.id());
        assert_eq!(listed[1].id(), second.id());
    }

    #[test]
    fn failed_write_leaves_ledger_unchanged() {
        let backing = Arc::new(MemoryStore::new());
        let ledger =
            TransactionLedger::load(RiderId(1), backing.clone(), Duration::ZERO).unwrap();

        backing.fail_next_writes(2);
        let result = ledger.record_successful_charge(&breakdown(), "A to B");
        assert!(matches!(result, Err(EngineError::Storage(_))));
        assert!(ledger.list_successful().is_empty());
    }

    #[test]
    fn load_filters_and_heals_non_successful_records() {
        let backing = Arc::new(MemoryStore::new());
        let key = storage_key(RiderId(1));

        // A persisted mix of good and bad records, in the legacy shape.
        let blob = format!(
            r#"[
                {{"id":"{good}","route":"A to B","occurred_at":"2025-06-01T12:00:00Z","amount":"117.50","tier":"private","status":"successful"}},
                {{"id":"{bad}","route":"B to C","occurred_at":"2025-06-02T12:00:00Z","amount":"47.625","tier":"pooled","status":"pending"}}
            ]"#,
            good = uuid::Uuid::new_v4(),
            bad = uuid::Uuid::new_v4(),
        );
        backing.set(&key, blob.as_bytes()).unwrap();

        let ledger =
            TransactionLedger::load(RiderId(1), backing.clone(), Duration::ZERO).unwrap();

        let listed = ledger.list_successful();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].route_label(), "A to B");

        // The healed (and now versioned) list was written back.
        let healed = backing.get(&key).unwrap().unwrap();
        let healed_text = String::from_utf8(healed).unwrap();
        assert!(healed_text.contains("\"version\":1"));
        assert!(!healed_text.contains("pending"));
    }

    #[test]
    fn clean_load_does_not_rewrite() {
        let backing = Arc::new(MemoryStore::new());
        let key = storage_key(RiderId(1));

        {
            let ledger =
                TransactionLedger::load(RiderId(1), backing.clone(), Duration::ZERO).unwrap();
            ledger.record_successful_charge(&breakdown(), "A to B").unwrap();
        }
        let persisted = backing.get(&key).unwrap().unwrap();

        // Reload with writes disabled: a clean load must not write.
        backing.fail_next_writes(u32::MAX);
        let reloaded =
            TransactionLedger::load(RiderId(1), backing.clone(), Duration::ZERO).unwrap();
        backing.fail_next_writes(0);

        assert_eq!(reloaded.list_successful().len(), 1);
        assert_eq!(backing.get(&key).unwrap().unwrap(), persisted);
    }
}
