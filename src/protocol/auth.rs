//! Shared-secret message authentication.
//!
//! Signed payload layout:
//!
//! ```text
//! [HMAC-SHA256 TAG (32 bytes)] [PAYLOAD (variable)]
//! ```
//!
//! The tag is computed over the payload bytes only. Verification compares
//! tags in constant time.

use std::fmt;

use hmac::digest::{Key, KeyInit};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::{Error, Result, SIGNATURE_LEN};

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies payloads with a shared secret.
///
/// Cheap to share: wrap in an `Arc` and hand the same instance to any
/// number of endpoints.
#[derive(Clone)]
pub struct Authenticator {
    mac: HmacSha256,
}

impl Authenticator {
    /// Create an authenticator from an opaque shared secret.
    #[must_use]
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();
        // HMAC key block: secrets longer than the block are hashed first,
        // shorter ones are zero padded.
        let mut key = Key::<HmacSha256>::default();
        if secret.len() > key.len() {
            let digest = Sha256::digest(secret);
            key[..digest.len()].copy_from_slice(&digest);
        } else {
            key[..secret.len()].copy_from_slice(secret);
        }
        Self {
            mac: <HmacSha256 as KeyInit>::new(&key),
        }
    }

    /// Compute the authentication tag for `payload`.
    #[must_use]
    pub fn signature(&self, payload: &[u8]) -> [u8; SIGNATURE_LEN] {
        let mut mac = self.mac.clone();
        mac.update(payload);
        let mut tag = [0u8; SIGNATURE_LEN];
        tag.copy_from_slice(&mac.finalize().into_bytes());
        tag
    }

    /// Return `payload` prefixed with its authentication tag.
    #[must_use]
    pub fn signed(&self, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(SIGNATURE_LEN + payload.len());
        out.extend_from_slice(&self.signature(payload));
        out.extend_from_slice(payload);
        out
    }

    /// Strip the authentication tag without verifying it.
    pub fn unsigned<'a>(&self, signed: &'a [u8]) -> Result<&'a [u8]> {
        split(signed).map(|(_, payload)| payload)
    }

    /// Check the embedded tag against the embedded payload.
    ///
    /// # Errors
    ///
    /// - [`Error::Authentication`] if `signed` is too short to carry a tag
    /// - [`Error::InvalidSignature`] if the tag does not match
    pub fn auth(&self, signed: &[u8]) -> Result<()> {
        let (tag, payload) = split(signed)?;
        let expected = self.signature(payload);
        if bool::from(expected.as_slice().ct_eq(tag)) {
            Ok(())
        } else {
            Err(Error::InvalidSignature)
        }
    }

    /// Verify `signed` and return the raw payload.
    pub fn verified<'a>(&self, signed: &'a [u8]) -> Result<&'a [u8]> {
        self.auth(signed)?;
        self.unsigned(signed)
    }
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator").finish_non_exhaustive()
    }
}

fn split(signed: &[u8]) -> Result<(&[u8], &[u8])> {
    if signed.len() < SIGNATURE_LEN {
        return Err(Error::Authentication(format!(
            "signed payload is {} bytes, shorter than the {SIGNATURE_LEN}-byte tag",
            signed.len()
        )));
    }
    Ok(signed.split_at(SIGNATURE_LEN))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn rfc_4231_case_2() {
        let auth = Authenticator::new(b"Jefe");
        let expected = "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843";
        assert_eq!(hex(&auth.signature(b"what do ya want for nothing?")), expected);
    }

    #[test]
    fn rfc_4231_long_key() {
        let auth = Authenticator::new([0xaau8; 131]);
        let expected = "60e431591ee0b67f0d8a26aacbf5b77f8e0bc6213728c5140546040f0ee37f54";
        assert_eq!(
            hex(&auth.signature(b"Test Using Larger Than Block-Size Key - Hash Key First")),
            expected
        );
    }

    #[test]
    fn key_block_matches_variable_length_keying() {
        for len in [0usize, 1, 32, 63, 64, 65, 200] {
            let secret: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let mut reference = <HmacSha256 as Mac>::new_from_slice(&secret).unwrap();
            reference.update(b"payload");
            let expected = reference.finalize().into_bytes();
            assert_eq!(
                Authenticator::new(&secret).signature(b"payload").as_slice(),
                expected.as_slice(),
                "secret of {len} bytes"
            );
        }
    }

    #[test]
    fn signed_layout_is_tag_then_payload() {
        let auth = Authenticator::new("secret");
        let signed = auth.signed(b"hello");
        assert_eq!(signed.len(), SIGNATURE_LEN + 5);
        assert_eq!(&signed[..SIGNATURE_LEN], &auth.signature(b"hello"));
        assert_eq!(auth.unsigned(&signed).unwrap(), b"hello");
    }

    #[test]
    fn signing_is_deterministic() {
        let a = Authenticator::new("secret");
        let b = Authenticator::new("secret");
        assert_eq!(a.signed(b"payload"), b.signed(b"payload"));
    }

    #[test]
    fn empty_payload_is_signable() {
        let auth = Authenticator::new("secret");
        let signed = auth.signed(b"");
        assert_eq!(auth.verified(&signed).unwrap(), b"");
    }

    #[test]
    fn truncated_input_is_an_authentication_error() {
        let auth = Authenticator::new("secret");
        let err = auth.auth(b"too short").unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
        assert!(matches!(auth.unsigned(b"").unwrap_err(), Error::Authentication(_)));
    }

    #[test]
    fn unsigned_does_not_verify() {
        let auth = Authenticator::new("secret");
        let mut forged = vec![0u8; SIGNATURE_LEN];
        forged.extend_from_slice(b"body");
        assert_eq!(auth.unsigned(&forged).unwrap(), b"body");
        assert!(matches!(auth.auth(&forged), Err(Error::InvalidSignature)));
    }

    proptest! {
        #[test]
        fn verify_accepts_own_signature(
            payload in proptest::collection::vec(any::<u8>(), 0..256),
            secret in proptest::collection::vec(any::<u8>(), 1..64),
        ) {
            let auth = Authenticator::new(&secret);
            let signed = auth.signed(&payload);
            prop_assert_eq!(auth.verified(&signed).unwrap(), payload.as_slice());
        }

        #[test]
        fn verify_rejects_other_secret(
            payload in proptest::collection::vec(any::<u8>(), 0..256),
            secret in any::<[u8; 16]>(),
            other in any::<[u8; 16]>(),
        ) {
            prop_assume!(secret != other);
            let signed = Authenticator::new(&secret).signed(&payload);
            let result = Authenticator::new(&other).auth(&signed);
            prop_assert!(matches!(result, Err(Error::InvalidSignature)));
        }

        #[test]
        fn verify_rejects_any_bit_flip(
            payload in proptest::collection::vec(any::<u8>(), 1..128),
            index in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let auth = Authenticator::new("secret");
            let mut signed = auth.signed(&payload);
            let at = index.index(signed.len());
            signed[at] ^= 1 << bit;
            prop_assert!(matches!(auth.auth(&signed), Err(Error::InvalidSignature)));
        }
    }
}
