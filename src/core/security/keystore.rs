// Copyright (c) 2026 Driftmesh
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]

//! Keystore: the node's long-lived Ed25519 identity.
//!
//! On first start a key pair is generated and persisted (owner-only read,
//! atomic write); later starts load it for the process lifetime.
//!
//! ## Key encryption format
//! If `DRIFTMESH_KEY_PASSPHRASE` is set, `node.key` is stored as
//! `MAGIC(8) || SALT(16) || NONCE(12) || CIPHERTEXT+TAG(..)`
//! where the ciphertext is AES-256-GCM over the Ed25519 PKCS#8 bytes.
//! The `production` feature refuses to run without a passphrase.

use ring::{
    aead, pbkdf2,
    rand::{SecureRandom, SystemRandom},
    signature::{Ed25519KeyPair, KeyPair, UnparsedPublicKey, ED25519},
};
use std::{
    fs,
    io::Write,
    num::NonZeroU32,
    path::Path,
};
use thiserror::Error;
use zeroize::Zeroize;

use crate::core::types::{PublicKey, Signature};

fn passphrase_from_env() -> Option<String> {
    match std::env::var("DRIFTMESH_KEY_PASSPHRASE") {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

const KEY_FILE_MAGIC: &[u8] = b"DMSHKEY1"; // 8 bytes
const KEY_SALT_LEN: usize = 16;
const KEY_NONCE_LEN: usize = 12;

// PBKDF2 baseline; override via DRIFTMESH_PBKDF2_ITERS, clamped to a sane range.
const PBKDF2_ITERS_DEFAULT: u32 = 100_000;

fn pbkdf2_iters() -> NonZeroU32 {
    let iters = std::env::var("DRIFTMESH_PBKDF2_ITERS")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(PBKDF2_ITERS_DEFAULT)
        .clamp(10_000, 10_000_000);
    NonZeroU32::new(iters)
        .unwrap_or_else(|| NonZeroU32::new(PBKDF2_ITERS_DEFAULT).expect("nonzero"))
}

/// Keystore errors.
#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("io")]
    Io,
    #[error("invalid key encoding")]
    InvalidKey,
    #[error("missing passphrase (set DRIFTMESH_KEY_PASSPHRASE)")]
    MissingPassphrase,
    #[error("crypto")]
    Crypto,
    #[error("bad signature")]
    BadSignature,
}

/// Signer backend abstraction (HSM compatible).
pub trait SignerBackend: Send + Sync {
    /// Public key bytes (Ed25519, 32 bytes).
    fn public_key(&self) -> [u8; 32];
    /// Sign message bytes.
    fn sign(&self, msg: &[u8]) -> Result<Signature, KeystoreError>;
}

/// File-backed Ed25519 backend.
pub struct FileEd25519Backend {
    keypair: Ed25519KeyPair,
}

fn set_private_perms_best_effort(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
}

/// Atomic write to disk (best-effort fsync, then rename).
fn atomic_write_private(path: &Path, bytes: &[u8]) -> Result<(), KeystoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|_| KeystoreError::Io)?;
    }

    let mut tmp = path.to_path_buf();
    tmp.set_extension("tmp");

    {
        let mut f = fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp)
            .map_err(|_| KeystoreError::Io)?;
        f.write_all(bytes).map_err(|_| KeystoreError::Io)?;
        let _ = f.sync_all();
    }

    set_private_perms_best_effort(&tmp);
    fs::rename(&tmp, path).map_err(|_| KeystoreError::Io)?;
    set_private_perms_best_effort(path);
    Ok(())
}

fn derive_aes256gcm_key(
    passphrase: &[u8],
    salt: &[u8; KEY_SALT_LEN],
) -> Result<[u8; 32], KeystoreError> {
    let mut out = [0u8; 32];
    pbkdf2::derive(pbkdf2::PBKDF2_HMAC_SHA256, pbkdf2_iters(), salt, passphrase, &mut out);
    Ok(out)
}

fn encrypt_pkcs8(passphrase: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, KeystoreError> {
    let rng = SystemRandom::new();

    let mut salt = [0u8; KEY_SALT_LEN];
    rng.fill(&mut salt).map_err(|_| KeystoreError::Crypto)?;

    let mut nonce_bytes = [0u8; KEY_NONCE_LEN];
    rng.fill(&mut nonce_bytes).map_err(|_| KeystoreError::Crypto)?;
    let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);

    let mut key = derive_aes256gcm_key(passphrase, &salt)?;
    let unbound =
        aead::UnboundKey::new(&aead::AES_256_GCM, &key).map_err(|_| KeystoreError::Crypto)?;
    let less_safe = aead::LessSafeKey::new(unbound);

    // ciphertext buffer = plaintext + tag
    let mut in_out = plaintext.to_vec();
    less_safe
        .seal_in_place_append_tag(nonce, aead::Aad::empty(), &mut in_out)
        .map_err(|_| KeystoreError::Crypto)?;

    key.zeroize();

    let mut out =
        Vec::with_capacity(KEY_FILE_MAGIC.len() + KEY_SALT_LEN + KEY_NONCE_LEN + in_out.len());
    out.extend_from_slice(KEY_FILE_MAGIC);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&in_out);
    Ok(out)
}

fn decrypt_pkcs8(passphrase: &[u8], bytes: &[u8]) -> Result<Vec<u8>, KeystoreError> {
    if bytes.len() < KEY_FILE_MAGIC.len() + KEY_SALT_LEN + KEY_NONCE_LEN + 16 {
        return Err(KeystoreError::InvalidKey);
    }
    if &bytes[..KEY_FILE_MAGIC.len()] != KEY_FILE_MAGIC {
        // Not encrypted; caller treats as plaintext PKCS#8.
        return Ok(bytes.to_vec());
    }

    let mut salt = [0u8; KEY_SALT_LEN];
    salt.copy_from_slice(&bytes[KEY_FILE_MAGIC.len()..KEY_FILE_MAGIC.len() + KEY_SALT_LEN]);
    let mut nonce_bytes = [0u8; KEY_NONCE_LEN];
    nonce_bytes.copy_from_slice(
        &bytes[KEY_FILE_MAGIC.len() + KEY_SALT_LEN
            ..KEY_FILE_MAGIC.len() + KEY_SALT_LEN + KEY_NONCE_LEN],
    );
    let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);

    let mut key = derive_aes256gcm_key(passphrase, &salt)?;
    let unbound =
        aead::UnboundKey::new(&aead::AES_256_GCM, &key).map_err(|_| KeystoreError::Crypto)?;
    let less_safe = aead::LessSafeKey::new(unbound);

    let mut in_out = bytes[KEY_FILE_MAGIC.len() + KEY_SALT_LEN + KEY_NONCE_LEN..].to_vec();
    let plain = less_safe
        .open_in_place(nonce, aead::Aad::empty(), &mut in_out)
        .map_err(|_| KeystoreError::Crypto)?;

    key.zeroize();
    Ok(plain.to_vec())
}

impl FileEd25519Backend {
    /// Load or create an Ed25519 PKCS#8 key file.
    ///
    /// If `DRIFTMESH_KEY_PASSPHRASE` is set, the key file is encrypted at rest.
    pub fn load_or_create(path: &Path) -> Result<Self, KeystoreError> {
        let pass = passphrase_from_env();

        #[cfg(feature = "production")]
        if pass.is_none() {
            return Err(KeystoreError::MissingPassphrase);
        }

        if path.exists() {
            let bytes = fs::read(path).map_err(|_| KeystoreError::Io)?;
            let pkcs8 = if bytes.starts_with(KEY_FILE_MAGIC) {
                let Some(p) = pass.as_deref() else {
                    return Err(KeystoreError::MissingPassphrase);
                };
                decrypt_pkcs8(p.as_bytes(), &bytes)?
            } else {
                bytes
            };
            let kp = Ed25519KeyPair::from_pkcs8(&pkcs8).map_err(|_| KeystoreError::InvalidKey)?;
            return Ok(Self { keypair: kp });
        }

        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).map_err(|_| KeystoreError::InvalidKey)?;

        // Write key: encrypted if passphrase is present.
        let mut buf = pkcs8.as_ref().to_vec();
        let on_disk = if let Some(p) = pass.as_deref() {
            let enc = encrypt_pkcs8(p.as_bytes(), &buf)?;
            buf.zeroize();
            enc
        } else {
            buf.clone()
        };
        atomic_write_private(path, &on_disk)?;
        buf.zeroize();

        let kp =
            Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).map_err(|_| KeystoreError::InvalidKey)?;
        Ok(Self { keypair: kp })
    }
}

impl SignerBackend for FileEd25519Backend {
    fn public_key(&self) -> [u8; 32] {
        let pk = self.keypair.public_key().as_ref();
        let mut out = [0u8; 32];
        out.copy_from_slice(pk);
        out
    }

    fn sign(&self, msg: &[u8]) -> Result<Signature, KeystoreError> {
        let sig = self.keypair.sign(msg);
        Ok(Signature(sig.as_ref().to_vec()))
    }
}

/// Keystore wrapper. Owns the backend for the process lifetime.
pub struct Keystore<B: SignerBackend> {
    backend: B,
}

impl Keystore<FileEd25519Backend> {
    /// Load or create the node key at `key_path`.
    pub fn open(key_path: &Path) -> Result<Self, KeystoreError> {
        let backend = FileEd25519Backend::load_or_create(key_path)?;
        Ok(Self { backend })
    }
}

impl<B: SignerBackend> Keystore<B> {
    /// Wrap an arbitrary backend (tests, HSM).
    pub fn from_backend(backend: B) -> Self {
        Self { backend }
    }

    /// The node's public key.
    pub fn node_public_key(&self) -> PublicKey {
        PublicKey::from_bytes(self.backend.public_key())
    }

    /// Short digest of the public key, `<16 lowercase hex chars>`.
    pub fn node_fingerprint(&self) -> String {
        fingerprint(&self.node_public_key())
    }

    /// Sign message bytes with the node key.
    pub fn sign(&self, msg: &[u8]) -> Result<Signature, KeystoreError> {
        self.backend.sign(msg)
    }
}

/// Short digest of a public key (first 8 bytes of SHA-256, hex).
pub fn fingerprint(pk: &PublicKey) -> String {
    let digest = ring::digest::digest(&ring::digest::SHA256, pk.as_bytes());
    hex::encode(&digest.as_ref()[..8])
}

/// Verify a detached signature.
pub fn verify(pk: &PublicKey, msg: &[u8], sig: &Signature) -> Result<(), KeystoreError> {
    // ring requires signature length 64 for Ed25519
    if sig.0.len() != 64 {
        return Err(KeystoreError::BadSignature);
    }
    let key = UnparsedPublicKey::new(&ED25519, pk.as_bytes());
    key.verify(msg, &sig.0).map_err(|_| KeystoreError::BadSignature)
}
