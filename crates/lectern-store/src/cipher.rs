use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::key_provider::KeyMaterial;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Envelope format version written by this store.
pub const ENVELOPE_VERSION: u32 = 1;
/// CBC initialization vector length in bytes.
pub const IV_LENGTH: usize = 16;
/// AES block length in bytes; ciphertext is always a whole number of blocks.
const BLOCK_LENGTH: usize = 16;

/// On-disk container for an encrypted document.
///
/// Files written by the legacy system carry only `iv` and `data` and are
/// recognized structurally; everything written by this store also carries
/// the `v` tag so the format is unambiguous going forward.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Envelope {
    #[serde(rename = "v", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    pub iv: String,
    pub data: String,
}

impl Envelope {
    /// Recognize the envelope shape in a parsed document: a top-level
    /// object whose `iv` and `data` are strings, with an optional `v` tag.
    /// A plaintext document that happens to use exactly these keys is
    /// indistinguishable from legacy ciphertext and will surface as a
    /// decrypt failure rather than be returned as data.
    pub fn detect(document: &Value) -> Option<Envelope> {
        let object = document.as_object()?;
        let iv = object.get("iv")?.as_str()?;
        let data = object.get("data")?.as_str()?;
        let version = match object.get("v") {
            Some(tag) => Some(u32::try_from(tag.as_u64()?).ok()?),
            None => None,
        };
        Some(Envelope {
            version,
            iv: iv.to_string(),
            data: data.to_string(),
        })
    }
}

/// Failures while sealing or opening an envelope. No I/O happens here;
/// the document store wraps these with the affected path.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("document cannot be serialized: {0}")]
    Serialize(String),
    #[error("envelope field is not valid hex: {0}")]
    Encoding(String),
    #[error("initialization vector must be {IV_LENGTH} bytes, got {0}")]
    InvalidIv(usize),
    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u32),
    #[error("ciphertext rejected: {0}")]
    Decrypt(String),
}

/// Seal a document: canonical JSON, a fresh random 128-bit IV per call
/// (CBC leaks plaintext relationships if an IV is ever reused), AES-256
/// with PKCS#7 padding, hex-encoded fields.
pub fn encrypt(key: &KeyMaterial, document: &Value) -> Result<Envelope, CipherError> {
    let plaintext =
        serde_json::to_vec(document).map_err(|err| CipherError::Serialize(err.to_string()))?;

    let mut iv = [0u8; IV_LENGTH];
    OsRng.fill_bytes(&mut iv);

    let ciphertext = Aes256CbcEnc::new(&key.bytes.into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(&plaintext);

    Ok(Envelope {
        version: Some(ENVELOPE_VERSION),
        iv: hex::encode(iv),
        data: hex::encode(ciphertext),
    })
}

/// Open an envelope. Fails if the hex fields do not decode, the ciphertext
/// length or padding is invalid, or the decrypted bytes are not valid JSON.
/// The JSON check is what rejects a wrong key instead of returning garbage
/// that merely looks like a document.
pub fn decrypt(key: &KeyMaterial, envelope: &Envelope) -> Result<Value, CipherError> {
    if let Some(version) = envelope.version {
        if version != ENVELOPE_VERSION {
            return Err(CipherError::UnsupportedVersion(version));
        }
    }

    let iv_bytes = hex::decode(&envelope.iv).map_err(|err| CipherError::Encoding(err.to_string()))?;
    let iv: [u8; IV_LENGTH] = iv_bytes
        .as_slice()
        .try_into()
        .map_err(|_| CipherError::InvalidIv(iv_bytes.len()))?;

    let ciphertext =
        hex::decode(&envelope.data).map_err(|err| CipherError::Encoding(err.to_string()))?;
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LENGTH != 0 {
        return Err(CipherError::Decrypt(format!(
            "ciphertext length {} is not a whole number of blocks",
            ciphertext.len()
        )));
    }

    let plaintext = Aes256CbcDec::new(&key.bytes.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| CipherError::Decrypt("invalid padding".to_string()))?;

    serde_json::from_slice(&plaintext)
        .map_err(|_| CipherError::Decrypt("decrypted bytes are not valid JSON".to_string()))
}
