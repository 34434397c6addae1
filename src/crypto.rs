//! Passphrase-derived body encryption (§4.6, §6): when a `Driver` has a
//! crypto passphrase configured, the body bytes of every encoded message
//! (except those in the skip set) are encrypted under a key derived from
//! the passphrase, using the head bytes as the nonce. AES-CTR is
//! symmetric, so encrypt and decrypt are the same operation.

use aes::cipher::{KeyIvInit, StreamCipher};
use aes::Aes256;
use sha2::{Digest, Sha256};

use crate::result::Result;

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

fn derive_key(passphrase: &str) -> [u8; 32] {
    let digest = Sha256::digest(passphrase.as_bytes());
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest);
    key
}

/// Head bytes are hashed down to a 16-byte IV rather than used directly,
/// since a short head (as small as one byte for a fieldless message) can't
/// supply a full AES block on its own.
fn derive_iv(head_bytes: &[u8]) -> [u8; 16] {
    let digest = Sha256::digest(head_bytes);
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&digest[..16]);
    iv
}

/// Applies the keystream derived from `(passphrase, head_bytes)` to
/// `body`, returning the transformed bytes. Because CTR mode XORs a
/// keystream, calling this twice with the same inputs recovers the
/// original plaintext.
pub fn apply_keystream(passphrase: &str, head_bytes: &[u8], body: &[u8]) -> Result<Vec<u8>> {
    let key = derive_key(passphrase);
    let iv = derive_iv(head_bytes);
    let mut buf = body.to_vec();
    let mut cipher = Aes256Ctr::new(&key.into(), &iv.into());
    cipher.apply_keystream(&mut buf);
    Ok(buf)
}
