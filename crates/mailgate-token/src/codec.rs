//! Token encoding and decoding.

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Fixed wire-format version literal. Tokens with any other version fail
/// decoding.
const VERSION: &str = "v1";

/// Minimum number of dot-separated parts: version, mode, tag-and-value.
const REQUIRED_PARTS: usize = 3;

/// Length of the hex HMAC-SHA256 tag prefixing the encoded value.
const TAG_LEN: usize = 64;

/// AES-256-CBC initialization vector length in bytes.
const IV_LEN: usize = 16;

/// Number of random bytes in a `Salt`-mode salt (hex-encoded on the wire).
const SALT_LEN: usize = 10;

/// Error building an [`Encoder`] from an invalid secret.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    /// The secret was not valid base64.
    #[error("secret is not valid base64")]
    InvalidBase64,
}

/// Trust mode of an encoded token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeMode {
    /// HMAC only. Deterministic: identical inputs yield identical tokens.
    Basic,
    /// HMAC plus a random salt. Repeated calls yield unrelated tokens.
    Salt,
    /// HMAC plus AES-256-CBC encryption of every field. The IV travels as
    /// the last field, itself unencrypted.
    Encrypted,
}

impl EncodeMode {
    /// Wire representation of this mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "b",
            Self::Salt => "s",
            Self::Encrypted => "e",
        }
    }

    /// Parse the wire representation. Unknown modes are `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "b" => Some(Self::Basic),
            "s" => Some(Self::Salt),
            "e" => Some(Self::Encrypted),
            _ => None,
        }
    }
}

/// Encodes and decodes authenticated link tokens.
///
/// The wire format is a dot-separated ASCII string, safe for use as a URL
/// query parameter value without further escaping:
///
/// ```text
/// v1 . <mode> . <64-char hex tag><encoded value> . <encoded arg>...
/// ```
///
/// Decoding never fails with an error: any forged, truncated, or malformed
/// token simply yields `None`, so untrusted input cannot trigger
/// error-handling side effects.
#[derive(Clone)]
pub struct Encoder {
    secret: Vec<u8>,
    mode: EncodeMode,
}

impl Encoder {
    /// Create an encoder from a raw secret.
    #[must_use]
    pub const fn new(secret: Vec<u8>, mode: EncodeMode) -> Self {
        Self { secret, mode }
    }

    /// Create an encoder from a base64-encoded secret.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::InvalidBase64`] if the secret does not decode.
    pub fn from_base64(secret: &str, mode: EncodeMode) -> Result<Self, SecretError> {
        let decoded = STANDARD
            .decode(secret)
            .map_err(|_| SecretError::InvalidBase64)?;

        Ok(Self::new(decoded, mode))
    }

    /// Clone this encoder with a different mode, sharing the secret.
    #[must_use]
    pub fn with_mode(&self, mode: EncodeMode) -> Self {
        Self::new(self.secret.clone(), mode)
    }

    /// Encode a value and its arguments into a token.
    ///
    /// Trailing `None` arguments are dropped to keep short tokens short;
    /// interior `None`s are preserved as empty segments and round-trip back
    /// as `None`.
    #[must_use]
    pub fn encode(&self, value: &str, arguments: &[Option<&str>]) -> String {
        let mut args: Vec<Option<Vec<u8>>> = arguments
            .iter()
            .map(|arg| arg.map(|s| s.as_bytes().to_vec()))
            .collect();

        while matches!(args.last(), Some(None)) {
            args.pop();
        }

        let mut iv = Vec::new();

        match self.mode {
            EncodeMode::Basic => {}
            EncodeMode::Salt => {
                let mut salt = [0_u8; SALT_LEN];
                rand::thread_rng().fill_bytes(&mut salt);
                args.push(Some(hex::encode(salt).into_bytes()));
            }
            EncodeMode::Encrypted => {
                let mut bytes = [0_u8; IV_LEN];
                rand::thread_rng().fill_bytes(&mut bytes);
                iv = bytes.to_vec();
            }
        }

        let mut hash_parts: Vec<&[u8]> = vec![self.mode.as_str().as_bytes(), value.as_bytes()];

        for arg in &args {
            hash_parts.push(arg.as_deref().unwrap_or(b""));
        }

        if !iv.is_empty() {
            hash_parts.push(&iv);
        }

        let tag = self.tag(&hash_parts);

        let mut token = format!(
            "{VERSION}.{}.{tag}{}",
            self.mode.as_str(),
            self.encode_field(Some(value.as_bytes()), &iv),
        );

        for arg in &args {
            token.push('.');
            token.push_str(&self.encode_field(arg.as_deref(), &iv));
        }

        if !iv.is_empty() {
            // The IV itself travels base64-encoded but unencrypted.
            token.push('.');
            token.push_str(&self.encode_field(Some(&iv), &[]));
        }

        token
    }

    /// Decode and verify a token, returning `[value, args...]`.
    ///
    /// Returns `None` on any malformation, unknown version or mode, or tag
    /// mismatch. The synthetic salt/IV field is stripped before returning.
    #[must_use]
    pub fn decode(&self, token: &str) -> Option<Vec<Option<String>>> {
        let parts: Vec<&str> = token.split('.').collect();

        if parts.len() < REQUIRED_PARTS || parts[0] != VERSION {
            return None;
        }

        let mode = EncodeMode::parse(parts[1])?;

        let head = parts[2].as_bytes();

        if head.len() < TAG_LEN {
            return None;
        }

        let (tag, value_field) = head.split_at(TAG_LEN);
        let mut arg_fields: Vec<&[u8]> = parts[3..].iter().map(|p| p.as_bytes()).collect();

        let mut iv = Vec::new();

        if mode == EncodeMode::Encrypted {
            let iv_field = arg_fields.pop()?;
            iv = self.decode_field(iv_field, &[])??;

            if iv.len() != IV_LEN {
                return None;
            }
        }

        let value = self.decode_field(value_field, &iv)??;

        let mut values: Vec<Option<Vec<u8>>> = vec![Some(value)];

        for field in arg_fields {
            values.push(self.decode_field(field, &iv)?);
        }

        let mut hash_parts: Vec<&[u8]> = vec![mode.as_str().as_bytes()];

        for value in &values {
            hash_parts.push(value.as_deref().unwrap_or(b""));
        }

        if !iv.is_empty() {
            hash_parts.push(&iv);
        }

        let expected = self.tag(&hash_parts);

        if !bool::from(expected.as_bytes().ct_eq(tag)) {
            return None;
        }

        if mode == EncodeMode::Salt {
            // Strip the synthetic salt argument.
            values.pop();
        }

        if values.is_empty() {
            return None;
        }

        values
            .into_iter()
            .map(|value| match value {
                None => Some(None),
                Some(bytes) => String::from_utf8(bytes).ok().map(Some),
            })
            .collect()
    }

    /// Lowercase hex HMAC-SHA256 over the given parts joined with `.`.
    fn tag(&self, parts: &[&[u8]]) -> String {
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            // HMAC accepts keys of any length.
            Err(_) => unreachable!(),
        };

        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                mac.update(b".");
            }

            mac.update(part);
        }

        hex::encode(mac.finalize().into_bytes())
    }

    /// Encode one field: encrypt when an IV is given, then base64 without
    /// padding. `None` encodes as the empty segment.
    fn encode_field(&self, value: Option<&[u8]>, iv: &[u8]) -> String {
        let Some(value) = value else {
            return String::new();
        };

        if iv.is_empty() {
            URL_SAFE_NO_PAD.encode(value)
        } else {
            URL_SAFE_NO_PAD.encode(self.encrypt(value, iv))
        }
    }

    /// Decode one field. The outer `None` rejects the whole token; the inner
    /// `None` is a preserved null argument (the empty segment).
    fn decode_field(&self, field: &[u8], iv: &[u8]) -> Option<Option<Vec<u8>>> {
        if field.is_empty() {
            return Some(None);
        }

        let decoded = URL_SAFE_NO_PAD.decode(field).ok()?;

        if iv.is_empty() {
            Some(Some(decoded))
        } else {
            Some(Some(self.decrypt(&decoded, iv)?))
        }
    }

    fn aes_key(&self) -> [u8; 32] {
        // OpenSSL key semantics: zero-pad or truncate to the cipher key size.
        let mut key = [0_u8; 32];
        let len = self.secret.len().min(32);
        key[..len].copy_from_slice(&self.secret[..len]);
        key
    }

    fn encrypt(&self, plaintext: &[u8], iv: &[u8]) -> Vec<u8> {
        let mut iv_bytes = [0_u8; IV_LEN];
        iv_bytes.copy_from_slice(iv);

        Aes256CbcEnc::new(&self.aes_key().into(), &iv_bytes.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8], iv: &[u8]) -> Option<Vec<u8>> {
        let mut iv_bytes = [0_u8; IV_LEN];

        if iv.len() != IV_LEN {
            return None;
        }

        iv_bytes.copy_from_slice(iv);

        Aes256CbcDec::new(&self.aes_key().into(), &iv_bytes.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .ok()
    }
}

impl std::fmt::Debug for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The secret must never leak into logs.
        f.debug_struct("Encoder")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
