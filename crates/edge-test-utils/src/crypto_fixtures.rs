//! ES256 signing keys for testing
//!
//! Keys are freshly generated per call; the load balancer rotates keys the
//! same way, so tests never rely on fixed key material.

use base64::engine::general_purpose;
use base64::Engine;
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};

/// DER prefix of a P-256 `SubjectPublicKeyInfo`; the 65-byte uncompressed
/// point follows it.
const P256_SPKI_PREFIX: [u8; 26] = [
    0x30, 0x59, 0x30, 0x13, 0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01, 0x06, 0x08, 0x2a,
    0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07, 0x03, 0x42, 0x00,
];

/// A P-256 signing key published under a key identifier.
///
/// # Example
/// ```rust,ignore
/// let key = TestSigningKey::generate("kid-1");
/// let pem = key.public_key_pem();
/// assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
/// ```
pub struct TestSigningKey {
    kid: String,
    key_pair: EcdsaKeyPair,
    rng: SystemRandom,
}

impl TestSigningKey {
    /// Generate a new key for `kid`.
    pub fn generate(kid: &str) -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
            .expect("Failed to generate P-256 key");
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
                .expect("Failed to load generated P-256 key");

        Self {
            kid: kid.to_string(),
            key_pair,
            rng,
        }
    }

    /// Key identifier this key is published under.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Public key as a PEM `SubjectPublicKeyInfo`, the format the regional
    /// key endpoint serves.
    pub fn public_key_pem(&self) -> String {
        let mut der = P256_SPKI_PREFIX.to_vec();
        der.extend_from_slice(self.key_pair.public_key().as_ref());

        let encoded = general_purpose::STANDARD.encode(der);
        let body = encoded
            .as_bytes()
            .chunks(64)
            .map(|line| std::str::from_utf8(line).expect("base64 is ASCII"))
            .collect::<Vec<_>>()
            .join("\n");

        format!("-----BEGIN PUBLIC KEY-----\n{body}\n-----END PUBLIC KEY-----\n")
    }

    /// Raw `r || s` ES256 signature over `message`.
    pub fn sign_message(&self, message: &[u8]) -> Vec<u8> {
        self.key_pair
            .sign(&self.rng, message)
            .expect("ECDSA signing failed")
            .as_ref()
            .to_vec()
    }
}

impl std::fmt::Debug for TestSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestSigningKey")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_pem_shape() {
        let key = TestSigningKey::generate("kid-1");
        let pem = key.public_key_pem();

        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----\n"));
        assert!(pem.ends_with("-----END PUBLIC KEY-----\n"));
        assert_eq!(key.kid(), "kid-1");
    }

    #[test]
    fn test_keys_are_distinct() {
        let a = TestSigningKey::generate("kid-1");
        let b = TestSigningKey::generate("kid-1");

        assert_ne!(a.public_key_pem(), b.public_key_pem());
    }

    #[test]
    fn test_signature_is_fixed_width() {
        let key = TestSigningKey::generate("kid-1");
        assert_eq!(key.sign_message(b"header.payload").len(), 64);
    }
}
