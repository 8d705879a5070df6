// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Secret Wiping
//!
//! Seed material handed to [`SecretBuffer::expose`] is overwritten once the
//! closure returns, whatever it returned.

use eventd_sdk::secret::WIPE_BYTE;
use eventd_sdk::SecretBuffer;
use proptest::prelude::*;

proptest! {
    /// Exposure sees the original bytes and leaves only wipe bytes behind
    #[test]
    fn prop_expose_wipes_every_byte(bytes in prop::collection::vec(any::<u8>(), 1..256)) {
        let original = bytes.clone();
        let mut secret = SecretBuffer::new(bytes);

        let seen = secret.expose(|contents| contents.to_vec());

        prop_assert_eq!(seen, original.clone());
        prop_assert_eq!(secret.len(), original.len());
        prop_assert!(secret.as_bytes().iter().all(|b| *b == WIPE_BYTE));
    }

    /// A failing closure still wipes the buffer
    #[test]
    fn prop_failed_expose_still_wipes(bytes in prop::collection::vec(any::<u8>(), 1..64)) {
        let mut secret = SecretBuffer::new(bytes);

        let result: Result<(), String> = secret.expose(|_| Err("rejected".to_string()));

        prop_assert!(result.is_err());
        prop_assert!(secret.is_wiped());
    }

    /// Debug output never contains the secret text
    #[test]
    fn prop_debug_is_redacted(seed in "SU[A-Z2-7]{20,56}") {
        let secret = SecretBuffer::from(seed.as_str());
        let rendered = format!("{:?}", secret);

        prop_assert!(!rendered.contains(&seed));
    }
}
