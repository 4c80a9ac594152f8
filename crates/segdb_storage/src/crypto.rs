//! Key derivation and authenticated encryption.
//!
//! ## Security Model
//!
//! - Keys are derived from a passphrase with PBKDF2-HMAC-SHA-256
//! - Data is encrypted with AES-CBC and PKCS7 padding
//! - A fresh random IV is generated per encryption and prepended
//! - An optional HMAC-SHA-256 tag over `IV || ciphertext` is appended and
//!   verified before any decryption is attempted
//! - Key material is zeroized on drop
//!
//! ## Layout
//!
//! ```text
//! | iv (16) | ciphertext (N * 16) | tag (32, optional) |
//! ```

use crate::compression;
use crate::error::{StorageError, StorageResult};
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha256 = Hmac<Sha256>;

/// Size of the CBC initialisation vector in bytes.
pub const IV_SIZE: usize = 16;
/// Size of the HMAC-SHA-256 integrity tag in bytes.
pub const TAG_SIZE: usize = 32;
/// Size of the derived HMAC key in bytes.
pub const HMAC_KEY_SIZE: usize = 32;
/// Size of a generated salt in bytes (256 bits).
pub const SALT_SIZE: usize = 32;
/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 10_000;
/// Smallest PBKDF2 iteration count accepted.
pub const MIN_ITERATIONS: u32 = 1_000;
/// AES block size in bytes.
const BLOCK_SIZE: usize = 16;

/// Supported AES-CBC variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EncryptionAlgorithm {
    /// AES-128 in CBC mode.
    Aes128Cbc,
    /// AES-192 in CBC mode.
    Aes192Cbc,
    /// AES-256 in CBC mode.
    #[default]
    Aes256Cbc,
}

impl EncryptionAlgorithm {
    /// Returns the AES key length in bytes.
    #[must_use]
    pub const fn key_len(self) -> usize {
        match self {
            Self::Aes128Cbc => 16,
            Self::Aes192Cbc => 24,
            Self::Aes256Cbc => 32,
        }
    }

    /// Returns the algorithm for a key size in bits.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Configuration`] for sizes other than 128, 192, 256.
    pub fn from_key_bits(bits: u32) -> StorageResult<Self> {
        match bits {
            128 => Ok(Self::Aes128Cbc),
            192 => Ok(Self::Aes192Cbc),
            256 => Ok(Self::Aes256Cbc),
            other => Err(StorageError::Configuration(format!(
                "unsupported AES key size: {other} bits"
            ))),
        }
    }

    /// Returns the canonical name (`AES-128`, `AES-192`, `AES-256`).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Aes128Cbc => "AES-128",
            Self::Aes192Cbc => "AES-192",
            Self::Aes256Cbc => "AES-256",
        }
    }
}

impl fmt::Display for EncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EncryptionAlgorithm {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.trim_end_matches("cbc") {
            "aes128" => Ok(Self::Aes128Cbc),
            "aes192" => Ok(Self::Aes192Cbc),
            "aes256" | "aes" => Ok(Self::Aes256Cbc),
            _ => Err(StorageError::Configuration(format!(
                "unsupported encryption algorithm: {s}"
            ))),
        }
    }
}

/// Derived key material: the AES key and the HMAC key.
///
/// Both keys are zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    cipher_key: Vec<u8>,
    mac_key: [u8; HMAC_KEY_SIZE],
}

impl KeyMaterial {
    /// Builds key material from raw keys.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Configuration`] if `cipher_key` is not 16, 24,
    /// or 32 bytes long.
    pub fn from_parts(cipher_key: &[u8], mac_key: [u8; HMAC_KEY_SIZE]) -> StorageResult<Self> {
        if !matches!(cipher_key.len(), 16 | 24 | 32) {
            return Err(StorageError::Configuration(format!(
                "invalid AES key size: {} bytes",
                cipher_key.len()
            )));
        }
        Ok(Self {
            cipher_key: cipher_key.to_vec(),
            mac_key,
        })
    }

    /// Returns the AES key.
    ///
    /// # Security
    ///
    /// Don't log or persist the result.
    #[must_use]
    pub fn cipher_key(&self) -> &[u8] {
        &self.cipher_key
    }

    /// Returns the HMAC key.
    #[must_use]
    pub fn mac_key(&self) -> &[u8; HMAC_KEY_SIZE] {
        &self.mac_key
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("cipher_key", &"[REDACTED]")
            .field("mac_key", &"[REDACTED]")
            .finish()
    }
}

/// Generates a random 256-bit salt.
#[must_use]
pub fn generate_salt() -> Vec<u8> {
    let mut salt = vec![0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Derives key material from a passphrase with PBKDF2-HMAC-SHA-256.
///
/// The derived output is `key_len + 32` bytes: the AES key followed by the
/// HMAC key.
///
/// # Errors
///
/// Returns [`StorageError::Configuration`] if the passphrase or salt is
/// empty, or `iterations` is below [`MIN_ITERATIONS`].
pub fn derive_key_material(
    passphrase: &[u8],
    salt: &[u8],
    iterations: u32,
    algorithm: EncryptionAlgorithm,
) -> StorageResult<KeyMaterial> {
    if passphrase.is_empty() {
        return Err(StorageError::Configuration("passphrase must not be empty".into()));
    }
    if salt.is_empty() {
        return Err(StorageError::Configuration("salt must not be empty".into()));
    }
    if iterations < MIN_ITERATIONS {
        return Err(StorageError::Configuration(format!(
            "PBKDF2 iterations must be at least {MIN_ITERATIONS}, got {iterations}"
        )));
    }

    let key_len = algorithm.key_len();
    let mut okm = vec![0u8; key_len + HMAC_KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase, salt, iterations, &mut okm);

    let mut mac_key = [0u8; HMAC_KEY_SIZE];
    mac_key.copy_from_slice(&okm[key_len..]);
    let material = KeyMaterial::from_parts(&okm[..key_len], mac_key);

    okm.zeroize();
    mac_key.zeroize();
    material
}

/// Returns the lowercase hex SHA-256 digest of `data`.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Encrypts and decrypts whole files.
///
/// This is the encryption service consumed by
/// [`EncryptedFileAccess`](crate::EncryptedFileAccess).
///
/// # Example
///
/// ```rust
/// use segdb_storage::{CipherService, EncryptionAlgorithm};
///
/// let cipher = CipherService::from_passphrase(
///     b"correct horse",
///     b"0123456789abcdef",
///     1_000,
///     EncryptionAlgorithm::Aes256Cbc,
/// )
/// .unwrap();
///
/// let sealed = cipher.encrypt(b"secret").unwrap();
/// assert_eq!(cipher.decrypt(&sealed).unwrap(), b"secret");
/// ```
pub struct CipherService {
    algorithm: EncryptionAlgorithm,
    keys: KeyMaterial,
    compress: bool,
    integrity_check: bool,
}

impl CipherService {
    /// Creates a cipher service with integrity tags on and compression off.
    #[must_use]
    pub fn new(algorithm: EncryptionAlgorithm, keys: KeyMaterial) -> Self {
        Self {
            algorithm,
            keys,
            compress: false,
            integrity_check: true,
        }
    }

    /// Derives keys from a passphrase and creates a cipher service.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Configuration`] for invalid derivation settings.
    pub fn from_passphrase(
        passphrase: &[u8],
        salt: &[u8],
        iterations: u32,
        algorithm: EncryptionAlgorithm,
    ) -> StorageResult<Self> {
        let keys = derive_key_material(passphrase, salt, iterations, algorithm)?;
        Ok(Self::new(algorithm, keys))
    }

    /// Enables gzip of plaintext before encryption.
    #[must_use]
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    /// Enables or disables the trailing HMAC tag.
    #[must_use]
    pub fn with_integrity_check(mut self, enabled: bool) -> Self {
        self.integrity_check = enabled;
        self
    }

    /// Returns the configured algorithm.
    #[must_use]
    pub fn algorithm(&self) -> EncryptionAlgorithm {
        self.algorithm
    }

    /// Returns true if plaintext is compressed before encryption.
    #[must_use]
    pub fn compresses(&self) -> bool {
        self.compress
    }

    /// Returns true if an HMAC tag is written and verified.
    #[must_use]
    pub fn checks_integrity(&self) -> bool {
        self.integrity_check
    }

    /// Encrypts `plaintext`.
    ///
    /// Output: `iv || ciphertext || [tag]`.
    ///
    /// # Errors
    ///
    /// Returns an error if compression or the cipher setup fails.
    pub fn encrypt(&self, plaintext: &[u8]) -> StorageResult<Vec<u8>> {
        let compressed;
        let body = if self.compress {
            compressed = compression::gzip(plaintext)?;
            compressed.as_slice()
        } else {
            plaintext
        };

        let mut iv = [0u8; IV_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);

        let ciphertext = self.cbc_encrypt(&iv, body)?;

        let tag_len = if self.integrity_check { TAG_SIZE } else { 0 };
        let mut out = Vec::with_capacity(IV_SIZE + ciphertext.len() + tag_len);
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);

        if self.integrity_check {
            let tag = self.compute_tag(&out)?;
            out.extend_from_slice(&tag);
        }

        Ok(out)
    }

    /// Decrypts data produced by [`encrypt`](Self::encrypt).
    ///
    /// When integrity checking is on the tag is verified first; the
    /// ciphertext is never decrypted if it does not match.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Integrity`] if the tag does not match
    /// - [`StorageError::Encryption`] if the input is malformed or the
    ///   padding is invalid (wrong key or corrupt ciphertext)
    /// - [`StorageError::Compression`] if decompression fails
    pub fn decrypt(&self, data: &[u8]) -> StorageResult<Vec<u8>> {
        let tag_len = if self.integrity_check { TAG_SIZE } else { 0 };
        if data.len() < IV_SIZE + BLOCK_SIZE + tag_len {
            return Err(StorageError::Encryption("ciphertext too short".into()));
        }

        let (sealed, tag) = data.split_at(data.len() - tag_len);
        if self.integrity_check {
            self.verify_tag(sealed, tag)?;
        }

        let (iv, ciphertext) = sealed.split_at(IV_SIZE);
        if ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(StorageError::Encryption(
                "ciphertext is not a whole number of blocks".into(),
            ));
        }

        let plaintext = self.cbc_decrypt(iv, ciphertext)?;
        if self.compress {
            compression::gunzip(&plaintext)
        } else {
            Ok(plaintext)
        }
    }

    fn cbc_encrypt(&self, iv: &[u8], data: &[u8]) -> StorageResult<Vec<u8>> {
        let key = self.keys.cipher_key();
        let ciphertext = match self.algorithm {
            EncryptionAlgorithm::Aes128Cbc => cbc::Encryptor::<aes::Aes128>::new_from_slices(key, iv)
                .map_err(|_| invalid_key(self.algorithm, key.len()))?
                .encrypt_padded_vec_mut::<Pkcs7>(data),
            EncryptionAlgorithm::Aes192Cbc => cbc::Encryptor::<aes::Aes192>::new_from_slices(key, iv)
                .map_err(|_| invalid_key(self.algorithm, key.len()))?
                .encrypt_padded_vec_mut::<Pkcs7>(data),
            EncryptionAlgorithm::Aes256Cbc => cbc::Encryptor::<aes::Aes256>::new_from_slices(key, iv)
                .map_err(|_| invalid_key(self.algorithm, key.len()))?
                .encrypt_padded_vec_mut::<Pkcs7>(data),
        };
        Ok(ciphertext)
    }

    fn cbc_decrypt(&self, iv: &[u8], data: &[u8]) -> StorageResult<Vec<u8>> {
        let key = self.keys.cipher_key();
        let result = match self.algorithm {
            EncryptionAlgorithm::Aes128Cbc => cbc::Decryptor::<aes::Aes128>::new_from_slices(key, iv)
                .map_err(|_| invalid_key(self.algorithm, key.len()))?
                .decrypt_padded_vec_mut::<Pkcs7>(data),
            EncryptionAlgorithm::Aes192Cbc => cbc::Decryptor::<aes::Aes192>::new_from_slices(key, iv)
                .map_err(|_| invalid_key(self.algorithm, key.len()))?
                .decrypt_padded_vec_mut::<Pkcs7>(data),
            EncryptionAlgorithm::Aes256Cbc => cbc::Decryptor::<aes::Aes256>::new_from_slices(key, iv)
                .map_err(|_| invalid_key(self.algorithm, key.len()))?
                .decrypt_padded_vec_mut::<Pkcs7>(data),
        };
        result.map_err(|_| {
            StorageError::Encryption("invalid padding: wrong key or corrupt ciphertext".into())
        })
    }

    fn compute_tag(&self, data: &[u8]) -> StorageResult<[u8; TAG_SIZE]> {
        let mut mac = HmacSha256::new_from_slice(self.keys.mac_key())
            .map_err(|e| StorageError::Encryption(e.to_string()))?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().into())
    }

    fn verify_tag(&self, data: &[u8], tag: &[u8]) -> StorageResult<()> {
        let mut mac = HmacSha256::new_from_slice(self.keys.mac_key())
            .map_err(|e| StorageError::Encryption(e.to_string()))?;
        mac.update(data);
        mac.verify_slice(tag)
            .map_err(|_| StorageError::Integrity("HMAC tag mismatch".into()))
    }
}

fn invalid_key(algorithm: EncryptionAlgorithm, actual: usize) -> StorageError {
    StorageError::Encryption(format!(
        "{algorithm} expects a {}-byte key, got {actual}",
        algorithm.key_len()
    ))
}

impl fmt::Debug for CipherService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherService")
            .field("algorithm", &self.algorithm)
            .field("compress", &self.compress)
            .field("integrity_check", &self.integrity_check)
            .finish_non_exhaustive()
    }
}
