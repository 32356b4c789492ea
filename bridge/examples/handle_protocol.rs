use std::sync::mpsc;
use std::thread;

use rand_core::OsRng;

use enclave_ecdh::application::DefaultPlatform;
use enclave_ecdh::crypto::{PublicKeyBytes, P256_PUBLIC_KEY_SIZE};
use enclave_ecdh::crypto_impl::SoftwareEnclave;
use enclave_ecdh::ffi::*;
use enclave_ecdh::Bridge;

type TestBridge = Bridge<DefaultPlatform>;

const ROUNDS: usize = 64;

/// One party: generate an enclave key, swap public keys with the other party, agree on a secret
/// and hand the secret's bytes back.
fn party(
    name: &'static str,
    bridge: TestBridge,
    send: mpsc::Sender<PublicKeyBytes>,
    recv: mpsc::Receiver<PublicKeyBytes>,
    results: mpsc::Sender<(&'static str, Vec<u8>)>,
) {
    for _ in 0..ROUNDS {
        let key = bridge.generate_enclave_key().unwrap();
        send.send(bridge.public_key(&key).unwrap()).unwrap();
        let peer = recv.recv().unwrap();
        let secret = bridge.compute_shared_secret(&key, peer.as_ref()).unwrap();
        let mut bytes = vec![0u8; bridge.len(&secret).unwrap()];
        bridge.copy(&secret, &mut bytes).unwrap();
        bridge.release(secret).unwrap();
        bridge.release(key).unwrap();
        results.send((name, bytes)).unwrap();
    }
}

fn alice_and_bob() {
    let bridge = TestBridge::new(OsRng, SoftwareEnclave::new());
    let (alice_out, bob_in) = mpsc::channel();
    let (bob_out, alice_in) = mpsc::channel();
    let (results_send, results) = mpsc::channel();

    let alice = {
        let (bridge, results_send) = (bridge.clone(), results_send.clone());
        thread::spawn(move || party("alice", bridge, alice_out, alice_in, results_send))
    };
    let bob = {
        let bridge = bridge.clone();
        thread::spawn(move || party("bob", bridge, bob_out, bob_in, results_send))
    };
    alice.join().unwrap();
    bob.join().unwrap();

    let mut by_alice = Vec::new();
    let mut by_bob = Vec::new();
    for (name, secret) in results.iter() {
        match name {
            "alice" => by_alice.push(secret),
            _ => by_bob.push(secret),
        }
    }
    assert_eq!(by_alice.len(), ROUNDS);
    assert_eq!(by_alice, by_bob);
    assert_eq!(bridge.registry().live_count(), 0);
    println!("alice and bob agreed on {} secrets", ROUNDS);
}

fn c_abi() {
    let before = enclave_ecdh_live_objects();
    unsafe {
        let mut key = 0u64;
        assert_eq!(enclave_ecdh_generate_key(&mut key), ENCLAVE_ECDH_OK);

        let mut peer = [0u8; P256_PUBLIC_KEY_SIZE];
        assert_eq!(enclave_ecdh_random_public_key(peer.as_mut_ptr(), peer.len()), ENCLAVE_ECDH_OK);

        let mut secret = 0u64;
        assert_eq!(enclave_ecdh_shared_secret(key, peer.as_ptr(), peer.len(), &mut secret), ENCLAVE_ECDH_OK);

        let len = enclave_ecdh_object_len(secret);
        let mut buf = vec![0u8; len as usize];
        assert_eq!(enclave_ecdh_object_copy(secret, buf.as_mut_ptr(), buf.len()), len);
        println!("shared secret through the C ABI: {} bytes", len);

        assert_eq!(enclave_ecdh_release_object(secret), ENCLAVE_ECDH_OK);
        assert_eq!(enclave_ecdh_release_object(key), ENCLAVE_ECDH_OK);
        assert_eq!(enclave_ecdh_release_object(key), ENCLAVE_ECDH_STALE_HANDLE);
    }
    assert_eq!(enclave_ecdh_live_objects(), before);
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    alice_and_bob();
    c_abi();
}
