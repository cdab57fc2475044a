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

//! Payment method store integration tests.

use fare_ledger_rs::{
    EngineError, MemoryStore, MethodId, PaymentMethodInput, PaymentMethodKind, PaymentMethodStore,
    RiderId,
};
use fare_ledger_rs::storage::BlobStore;
use std::sync::Arc;
use std::time::Duration;

fn make_card(suffix: &str) -> PaymentMethodInput {
    PaymentMethodInput {
        kind: PaymentMethodKind::CreditCard,
        display_suffix: suffix.into(),
        expiry: Some("12/27".into()),
    }
}

fn make_wallet(label: &str) -> PaymentMethodInput {
    PaymentMethodInput {
        kind: PaymentMethodKind::DigitalWallet,
        display_suffix: label.into(),
        expiry: None,
    }
}

fn load_store(backing: &Arc<MemoryStore>, rider: u64) -> PaymentMethodStore {
    let store: Arc<dyn BlobStore> = backing.clone();
    PaymentMethodStore::load(RiderId(rider), store, Duration::ZERO).unwrap()
}

#[test]
fn add_assigns_unique_ids_and_insertion_order() {
    let backing = Arc::new(MemoryStore::new());
    let store = load_store(&backing, 1);

    let a = store.add(make_card("1111")).unwrap();
    let b = store.add(make_card("2222")).unwrap();
    let c = store.add(make_wallet("GPay")).unwrap();

    assert_ne!(a.id, b.id);
    assert_ne!(b.id, c.id);

    let listed = store.list();
    let suffixes: Vec<&str> = listed.iter().map(|m| m.display_suffix.as_str()).collect();
    assert_eq!(suffixes, ["1111", "2222", "GPay"]);
}

#[test]
fn default_flag_follows_first_add_only() {
    let backing = Arc::new(MemoryStore::new());
    let store = load_store(&backing, 1);

    let first = store.add(make_card("1111")).unwrap();
    assert!(first.is_default);

    let second = store.add(make_card("2222")).unwrap();
    assert!(!second.is_default);

    // The first method keeps its flag.
    let listed = store.list();
    assert!(listed[0].is_default);
    assert!(!listed[1].is_default);
}

#[test]
fn default_is_not_reassigned_after_removal() {
    let backing = Arc::new(MemoryStore::new());
    let store = load_store(&backing, 1);

    let first = store.add(make_card("1111")).unwrap();
    store.add(make_card("2222")).unwrap();
    store.remove(first.id).unwrap();

    // Adding after removal does not resurrect the flag either: the
    // store was not empty at call time.
    let third = store.add(make_card("3333")).unwrap();
    assert!(!third.is_default);
    assert!(store.default_method().is_none());
}

#[test]
fn remove_missing_id_fails_and_leaves_list_unchanged() {
    let backing = Arc::new(MemoryStore::new());
    let store = load_store(&backing, 1);

    store.add(make_card("1111")).unwrap();
    let before = store.list();

    let result = store.remove(MethodId::generate());
    assert_eq!(result, Err(EngineError::NotFound));
    assert_eq!(store.list(), before);
}

#[test]
fn every_mutation_rewrites_the_whole_collection() {
    let backing = Arc::new(MemoryStore::new());
    let store = load_store(&backing, 1);

    store.add(make_card("1111")).unwrap();
    let after_one = backing.get("rider-1-payment-methods").unwrap().unwrap();

    store.add(make_card("2222")).unwrap();
    let after_two = backing.get("rider-1-payment-methods").unwrap().unwrap();

    // The persisted blob is the full list, not a delta.
    assert!(after_two.len() > after_one.len());
    let text = String::from_utf8(after_two).unwrap();
    assert!(text.contains("1111"));
    assert!(text.contains("2222"));
}

#[test]
fn write_failure_is_surfaced_and_state_rolls_back() {
    let backing = Arc::new(MemoryStore::new());
    let store = load_store(&backing, 1);
    store.add(make_card("1111")).unwrap();

    backing.fail_next_writes(2); // defeats the single retry
    let result = store.add(make_card("2222"));
    assert!(matches!(result, Err(EngineError::Storage(_))));

    // In-memory state is unchanged, and so is the persisted blob.
    assert_eq!(store.list().len(), 1);
    let text =
        String::from_utf8(backing.get("rider-1-payment-methods").unwrap().unwrap()).unwrap();
    assert!(!text.contains("2222"));
}

#[test]
fn remove_write_failure_keeps_the_method() {
    let backing = Arc::new(MemoryStore::new());
    let store = load_store(&backing, 1);
    let method = store.add(make_card("1111")).unwrap();

    backing.fail_next_writes(2);
    let result = store.remove(method.id);
    assert!(matches!(result, Err(EngineError::Storage(_))));
    assert_eq!(store.list().len(), 1);

    // And removal works once storage recovers.
    store.remove(method.id).unwrap();
    assert!(store.list().is_empty());
}

#[test]
fn riders_do_not_share_methods() {
    let backing = Arc::new(MemoryStore::new());
    let store_one = load_store(&backing, 1);
    let store_two = load_store(&backing, 2);

    store_one.add(make_card("1111")).unwrap();

    assert_eq!(store_one.list().len(), 1);
    assert!(store_two.list().is_empty());
}

#[test]
fn reload_preserves_ids_order_and_default() {
    let backing = Arc::new(MemoryStore::new());
    let original: Vec<_> = {
        let store = load_store(&backing, 1);
        store.add(make_card("1111")).unwrap();
        store.add(make_wallet("GPay")).unwrap();
        store.list()
    };

    let reloaded = load_store(&backing, 1);
    assert_eq!(reloaded.list(), original);
}

#[test]
fn legacy_unversioned_blob_is_accepted() {
    let backing = Arc::new(MemoryStore::new());
    let id = MethodId::generate();
    let blob = format!(
        r#"[{{"id":"{id}","kind":"credit-card","display_suffix":"4242","expiry":"12/27","is_default":true}}]"#
    );
    backing.set("rider-1-payment-methods", blob.as_bytes()).unwrap();

    let store = load_store(&backing, 1);
    let listed = store.list();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, id);
    assert!(listed[0].is_default);
}
