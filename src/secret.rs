// Copyright (c) 2025 - Cowboy AI, Inc.
//! Scoped storage for NKey seed material
//!
//! [`SecretBuffer`] owns the bytes of a seed and overwrites them when it is
//! dropped or explicitly wiped, so a seed never outlives the scope that
//! needed it. Borrowing the contents goes through [`SecretBuffer::expose`],
//! which wipes the buffer on every exit path of the closure, including an
//! early `?` return or a panic.

use serde::{Deserialize, Deserializer};
use std::fmt;
use std::sync::atomic::{compiler_fence, Ordering};

/// Byte written over seed material when it is wiped.
pub const WIPE_BYTE: u8 = b'x';

/// Owned secret bytes that are overwritten on drop.
#[derive(Clone, Default)]
pub struct SecretBuffer {
    bytes: Vec<u8>,
}

impl SecretBuffer {
    /// Take ownership of secret bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Current contents. After a wipe this is all [`WIPE_BYTE`].
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// True once every byte has been overwritten.
    pub fn is_wiped(&self) -> bool {
        self.bytes.iter().all(|b| *b == WIPE_BYTE)
    }

    /// Overwrite every byte in place. The length is kept so callers can
    /// still observe that the buffer was wiped rather than truncated.
    pub fn wipe(&mut self) {
        wipe_slice(&mut self.bytes);
    }

    /// Run `f` over the secret, then wipe the buffer whatever `f` returns.
    pub fn expose<R>(&mut self, f: impl FnOnce(&[u8]) -> R) -> R {
        let guard = WipeGuard(&mut self.bytes);
        f(&guard.0[..])
    }
}

/// Wipes the borrowed bytes when it goes out of scope.
struct WipeGuard<'a>(&'a mut Vec<u8>);

impl Drop for WipeGuard<'_> {
    fn drop(&mut self) {
        wipe_slice(self.0);
    }
}

impl Drop for SecretBuffer {
    fn drop(&mut self) {
        self.wipe();
    }
}

impl From<&str> for SecretBuffer {
    fn from(secret: &str) -> Self {
        Self::new(secret.as_bytes().to_vec())
    }
}

impl From<String> for SecretBuffer {
    fn from(secret: String) -> Self {
        Self::new(secret.into_bytes())
    }
}

impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBuffer(<{} bytes redacted>)", self.bytes.len())
    }
}

impl<'de> Deserialize<'de> for SecretBuffer {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(Self::from(value))
    }
}

/// Overwrite a slice with [`WIPE_BYTE`].
pub fn wipe_slice(buf: &mut [u8]) {
    buf.fill(WIPE_BYTE);
    // keep the stores observable for a buffer that is about to be freed
    std::hint::black_box(&*buf);
    compiler_fence(Ordering::SeqCst);
}
