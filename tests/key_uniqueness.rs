//! Key-uniqueness invariant at the integration level: a lookup key may only
//! ever be installed once within a given layer's table, but the same key
//! bytes are free to appear in a different layer's table, since uniqueness
//! is scoped per layer rather than per server.

use std::sync::Arc;
use std::thread;

use duskmesh_crypto::EncryptionKeypair;
use duskmesh_keytable::{try_mark_used, KeyLookupTable, KeyTableError};

#[test]
fn the_same_verification_key_is_rejected_twice_in_one_layer_table() {
    let table = KeyLookupTable::new(EncryptionKeypair::generate());
    let vk = [42u8; 32];
    table.add_key(vk, [1u8; 32], 0, 1, [9u8; 32]).unwrap();

    let second = table.add_key(vk, [2u8; 32], 0, 1, [10u8; 32]);
    assert!(matches!(second, Err(KeyTableError::Duplicate(_))));
    // The rejected insert must not have clobbered the original record.
    assert_eq!(table.num_keys(), 1);
}

#[test]
fn the_same_verification_key_may_appear_in_two_different_layer_tables() {
    // Uniqueness is a per-layer property of the `KeyLookupTable`, not a
    // global one across the whole mesh - a client could in principle reuse
    // lookup-key material across two rounds' path establishments and both
    // layers install it independently.
    let layer0 = KeyLookupTable::new(EncryptionKeypair::generate());
    let layer1 = KeyLookupTable::new(EncryptionKeypair::generate());
    let vk = [7u8; 32];

    assert!(layer0.add_key(vk, [1u8; 32], 0, 1, [9u8; 32]).is_ok());
    assert!(layer1.add_key(vk, [1u8; 32], 1, 2, [9u8; 32]).is_ok());
}

#[test]
fn only_one_of_many_concurrent_installs_of_the_same_key_succeeds() {
    let table = Arc::new(KeyLookupTable::new(EncryptionKeypair::generate()));
    let vk = [3u8; 32];

    let handles: Vec<_> = (0..8u8)
        .map(|i| {
            let table = table.clone();
            thread::spawn(move || table.add_key(vk, [i; 32], 0, 1, [i; 32]))
        })
        .collect();

    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|r| r.is_ok())
        .count();

    assert_eq!(successes, 1);
    assert_eq!(table.num_keys(), 1);
}

#[test]
fn only_one_of_many_concurrent_first_uses_of_a_record_succeeds() {
    // Mirrors the forgery this invariant exists to block: two colluding
    // clients racing to spend the same bootstrap record in the same layer
    // must not both get through.
    let table = KeyLookupTable::new(EncryptionKeypair::generate());
    let vk = [9u8; 32];
    let record = table.add_key(vk, [1u8; 32], 0, 1, [2u8; 32]).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let record = record.clone();
            thread::spawn(move || try_mark_used(&record, &vk))
        })
        .collect();

    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|r| r.is_ok())
        .count();

    assert_eq!(successes, 1);
}

#[test]
fn revoking_a_key_frees_its_slot_for_reinstallation() {
    let table = KeyLookupTable::new(EncryptionKeypair::generate());
    let vk = [5u8; 32];
    table.add_key(vk, [1u8; 32], 0, 1, [9u8; 32]).unwrap();
    table.revoke_key(&vk);

    assert!(table.add_key(vk, [2u8; 32], 0, 1, [10u8; 32]).is_ok());
}
