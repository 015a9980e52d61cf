//! Query router tests: latest, historical (both engines), proofs, and error
//! surfaces.

mod fixtures;

use fixtures::{commitment_store, key_query};
use strata_store::{KVStore, QueryRequest};
use strata_types::StoreError;

#[test]
fn test_historical_reads_with_state_storage() {
    let store = commitment_store(&["bank"], true);

    store.write("bank", b"k", b"v1");
    let c1 = store.root.commit(true);
    store.write("bank", b"k", b"v2");
    let c2 = store.root.commit(true);
    store.wait_for_ss(c2.version);

    // Served from state storage (height < latest, no proof).
    let at_v1 = store
        .root
        .query(&key_query("bank", b"k", c1.version, false))
        .unwrap();
    assert_eq!(at_v1.value, b"v1");
    assert_eq!(at_v1.height, c1.version);

    // Served from the live tree.
    let at_v2 = store
        .root
        .query(&key_query("bank", b"k", c2.version, false))
        .unwrap();
    assert_eq!(at_v2.value, b"v2");
}

#[test]
fn test_historical_reads_without_state_storage() {
    let store = commitment_store(&["bank"], false);

    store.write("bank", b"k", b"v1");
    let c1 = store.root.commit(true);
    store.write("bank", b"k", b"v2");
    store.root.commit(true);

    // Served from a read-only historical commitment engine.
    let at_v1 = store
        .root
        .query(&key_query("bank", b"k", c1.version, false))
        .unwrap();
    assert_eq!(at_v1.value, b"v1");
}

#[test]
fn test_historical_proof_verifies_against_historical_app_hash() {
    let store = commitment_store(&["bank"], true);

    store.write("bank", b"k", b"v1");
    let c1 = store.root.commit(true);
    store.write("bank", b"k", b"v2");
    let c2 = store.root.commit(true);
    store.wait_for_ss(c2.version);

    // prove forces the historical commitment path even with state storage
    // enabled.
    let res = store
        .root
        .query(&key_query("bank", b"k", c1.version, true))
        .unwrap();
    assert_eq!(res.value, b"v1");
    let proof = res.proof_ops.expect("proof requested");
    proof.verify("bank", b"k", Some(b"v1"), c1.hash).unwrap();
    // It must not verify against the latest app hash.
    assert!(proof.verify("bank", b"k", Some(b"v1"), c2.hash).is_err());
}

#[test]
fn test_latest_proof_roundtrip() {
    let store = commitment_store(&["bank", "staking"], false);
    store.write("bank", b"acct", b"42");
    store.write("staking", b"val", b"7");
    let commit = store.root.commit(true);

    for (name, key, value) in [("bank", b"acct".as_slice(), b"42".as_slice()), ("staking", b"val", b"7")] {
        let res = store.root.query(&key_query(name, key, 0, true)).unwrap();
        assert_eq!(res.value, value);
        res.proof_ops
            .unwrap()
            .verify(name, key, Some(value), commit.hash)
            .unwrap();
    }
}

#[test]
fn test_absence_proof_roundtrip() {
    let store = commitment_store(&["bank"], false);
    store.write("bank", b"b", b"2");
    store.write("bank", b"d", b"4");
    let commit = store.root.commit(true);

    let res = store.root.query(&key_query("bank", b"c", 0, true)).unwrap();
    assert!(res.value.is_empty());
    res.proof_ops
        .unwrap()
        .verify("bank", b"c", None, commit.hash)
        .unwrap();
}

#[test]
fn test_subspace_query() {
    let store = commitment_store(&["bank"], false);
    store.write("bank", b"acct/1", b"10");
    store.write("bank", b"acct/2", b"20");
    store.write("bank", b"other", b"x");
    store.root.commit(true);

    let res = store
        .root
        .query(&QueryRequest {
            path: "/bank/subspace".to_string(),
            data: b"acct/".to_vec(),
            height: 0,
            prove: false,
        })
        .unwrap();

    let pairs: Vec<(Vec<u8>, Vec<u8>)> = bincode::deserialize(&res.value).unwrap();
    assert_eq!(
        pairs,
        vec![
            (b"acct/1".to_vec(), b"10".to_vec()),
            (b"acct/2".to_vec(), b"20".to_vec()),
        ]
    );
}

#[test]
fn test_query_reads_committed_state_only() {
    let store = commitment_store(&["bank"], false);
    store.write("bank", b"k", b"committed");
    store.root.commit(true);

    // Buffered but uncommitted write is invisible to queries.
    store.write("bank", b"k", b"pending");
    let res = store.root.query(&key_query("bank", b"k", 0, false)).unwrap();
    assert_eq!(res.value, b"committed");
}

#[test]
fn test_query_error_surfaces() {
    let store = commitment_store(&["bank"], false);
    store.write("bank", b"k", b"v");
    store.root.commit(true);

    assert!(matches!(
        store.root.query(&key_query("nope", b"k", 0, false)),
        Err(StoreError::UnknownStore { .. })
    ));
    assert!(matches!(
        store.root.query(&QueryRequest {
            path: "bank/key".to_string(),
            data: b"k".to_vec(),
            height: 0,
            prove: false,
        }),
        Err(StoreError::UnknownRequest(_))
    ));
    assert!(matches!(
        store.root.query(&QueryRequest {
            path: "/bank/unknown".to_string(),
            data: b"k".to_vec(),
            height: 0,
            prove: false,
        }),
        Err(StoreError::UnknownRequest(_))
    ));
    assert!(matches!(
        store.root.query(&key_query("bank", b"", 0, false)),
        Err(StoreError::UnknownRequest(_))
    ));
}

#[test]
fn test_height_above_latest_serves_live_tree() {
    let store = commitment_store(&["bank"], false);
    store.write("bank", b"k", b"v");
    let commit = store.root.commit(true);

    let res = store
        .root
        .query(&key_query("bank", b"k", commit.version + 5, false))
        .unwrap();
    assert_eq!(res.value, b"v");
}

#[test]
fn test_cache_multi_store_isolates_writes() {
    let store = commitment_store(&["bank"], false);
    store.write("bank", b"k", b"v");
    store.root.commit(true);

    let cache = store.root.cache_multi_store();
    let cached_bank = cache.store(store.key("bank")).unwrap();
    cached_bank.set(b"k", b"dirty");
    assert_eq!(cached_bank.get(b"k"), Some(b"dirty".to_vec()));

    // Root unchanged until the cache is written back.
    assert_eq!(
        store.root.kv_store(store.key("bank")).get(b"k"),
        Some(b"v".to_vec())
    );
    cache.write();
    assert_eq!(
        store.root.kv_store(store.key("bank")).get(b"k"),
        Some(b"dirty".to_vec())
    );
}

#[test]
fn test_versioned_cache_multi_store_uses_state_storage() {
    let store = commitment_store(&["bank"], true);
    store.write("bank", b"k", b"v1");
    let c1 = store.root.commit(true);
    store.write("bank", b"k", b"v2");
    let c2 = store.root.commit(true);
    store.wait_for_ss(c2.version);

    let pinned = store.root.cache_multi_store_with_version(c1.version).unwrap();
    let bank = pinned.store_by_name("bank").unwrap();
    assert_eq!(bank.get(b"k"), Some(b"v1".to_vec()));

    // At the latest version the live store backs the cache.
    let live = store.root.cache_multi_store_with_version(c2.version).unwrap();
    assert_eq!(
        live.store_by_name("bank").unwrap().get(b"k"),
        Some(b"v2".to_vec())
    );
}
