// Copyright (c) 2025 - Cowboy AI, Inc.
//! NKey challenge/response authentication
//!
//! The server sends a nonce on connect; the client answers with its public
//! user key and the nonce signed by the matching seed. Seeds arrive either
//! as a raw value from the options or as a seed file. In both cases the
//! bytes holding the seed live in a [`SecretBuffer`]. The key pair is never
//! kept: it is decoded for each nonce and the working copy of the seed is
//! wiped right after signing.

use async_nats::{Auth, AuthError, ConnectOptions};
use nkeys::KeyPair;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::errors::{EventdError, EventdResult};
use crate::secret::SecretBuffer;

/// Directory, relative to the working directory, that holds seed files
/// configured with a relative path.
pub const SEED_DIRECTORY: &str = "etc";

/// Seed prefixes for operator, account and user seeds
const SEED_PREFIXES: [&str; 3] = ["SO", "SA", "SU"];

/// A validated user public key and the seed that signs server nonces.
///
/// Only the extracted seed is retained, in a [`SecretBuffer`]. Every
/// signature decodes the key pair from a working copy of that seed and wipes
/// the copy as soon as the nonce is signed.
#[derive(Clone)]
pub struct NkeyAuth {
    public_key: String,
    seed: Arc<SecretBuffer>,
}

impl NkeyAuth {
    /// Validate a raw user seed.
    ///
    /// `secret` is wiped before this returns, whether or not the seed was
    /// valid.
    pub fn from_seed(secret: &mut SecretBuffer) -> EventdResult<Self> {
        let (public_key, seed) = secret.expose(|bytes| {
            let contents = std::str::from_utf8(bytes)
                .map_err(|_| EventdError::InvalidNkey("seed is not valid UTF-8".to_string()))?;
            let seed = extract_seed(contents).ok_or_else(|| {
                EventdError::InvalidNkey("no nkey seed found in value".to_string())
            })?;
            let public_key = KeyPair::from_seed(seed)?.public_key();
            Ok::<_, EventdError>((public_key, SecretBuffer::from(seed)))
        })?;

        if !is_user_public_key(&public_key) {
            return Err(EventdError::InvalidNkey(
                "not a valid nkey user seed".to_string(),
            ));
        }

        debug!(public_key = %public_key, "Validated nkey user seed");
        Ok(Self {
            public_key,
            seed: Arc::new(seed),
        })
    }

    /// Load a user seed from a seed file.
    ///
    /// Relative paths are resolved against `<cwd>/etc`. The file may hold a
    /// bare seed or a decorated seed block as written by `nsc`.
    pub fn from_seed_file(path: impl AsRef<Path>) -> EventdResult<Self> {
        let path = normalize_seed_path(path.as_ref())?;
        let contents = std::fs::read(&path).map_err(|e| {
            EventdError::NkeyFile(format!("failed to read '{}': {e}", path.display()))
        })?;
        let mut secret = SecretBuffer::new(contents);
        Self::from_seed(&mut secret)
    }

    /// Public user key sent to the server
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Sign a server-issued nonce
    pub fn sign(&self, nonce: &[u8]) -> EventdResult<Vec<u8>> {
        let mut working = SecretBuffer::clone(&self.seed);
        sign_with(&mut working, nonce)
    }

    /// Connect options that answer the server's nonce challenge, on the first
    /// connect and on every reconnect, by signing with this seed.
    pub fn connect_options(&self) -> ConnectOptions {
        let auth = self.clone();
        ConnectOptions::with_auth_callback(move |nonce: Vec<u8>| {
            let auth = auth.clone();
            async move {
                let signature = auth
                    .sign(&nonce)
                    .map_err(|e| AuthError::new(format!("unable to sign nonce: {e}")))?;

                let mut credentials = Auth::new();
                credentials.nkey = Some(auth.public_key.clone());
                credentials.signature = Some(signature);
                Ok(credentials)
            }
        })
    }
}

impl fmt::Debug for NkeyAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NkeyAuth")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// Resolve a seed file path: absolute paths pass through, relative paths are
/// joined onto `<cwd>/etc`.
pub fn normalize_seed_path(path: &Path) -> EventdResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| {
        EventdError::NkeyFile(format!(
            "cannot resolve '{}' without a working directory: {e}",
            path.display()
        ))
    })?;
    Ok(resolve_seed_path(path, &cwd))
}

/// Resolve `path` against `cwd` the way [`normalize_seed_path`] does.
pub fn resolve_seed_path(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(SEED_DIRECTORY).join(path)
    }
}

/// Decode the key pair held in `seed` and sign `nonce`. `seed` is wiped on
/// return.
fn sign_with(seed: &mut SecretBuffer, nonce: &[u8]) -> EventdResult<Vec<u8>> {
    seed.expose(|bytes| {
        let seed = std::str::from_utf8(bytes)
            .map_err(|_| EventdError::InvalidNkey("seed is not valid UTF-8".to_string()))?;
        let key_pair = KeyPair::from_seed(seed)?;
        Ok::<_, EventdError>(key_pair.sign(nonce)?)
    })
}

fn is_user_public_key(public_key: &str) -> bool {
    public_key.starts_with('U') && KeyPair::from_public_key(public_key).is_ok()
}

/// Find the seed in a raw value or a decorated block, skipping `---` marker
/// lines and anything (such as a JWT) that is not a seed.
fn extract_seed(contents: &str) -> Option<&str> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("---"))
        .find(|line| SEED_PREFIXES.iter().any(|prefix| line.starts_with(prefix)))
}
