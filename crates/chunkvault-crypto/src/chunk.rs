//! Per-chunk AES-256-GCM encryption/decryption
//!
//! Encrypted chunk format (binary):
//! ```text
//! [16 bytes: random nonce][4 bytes: aad_len, big-endian][aad_len bytes: AAD]
//! [N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! AAD = `chunk_index:<decimal>` with an optional
//! `;original_filepath:<hint>` suffix. The tag authenticates both the
//! ciphertext and the AAD; the AAD itself is stored in the clear.

use aes_gcm::{
    aead::{consts::U16, Aead, KeyInit, Payload},
    aes::Aes256,
    AesGcm, Nonce,
};
use rand::RngCore;

use chunkvault_core::{VaultError, VaultResult};

use crate::kdf::DerivedKey;
use crate::{AAD_LEN_SIZE, NONCE_SIZE, TAG_SIZE};

/// AES-256-GCM with the format's 128-bit nonce.
///
/// The 128-bit nonce space is accepted because volumes are small and keys
/// are per-file and short-lived.
type ChunkCipher = AesGcm<Aes256, U16>;

/// Encrypt one chunk under `key`.
///
/// - `chunk_index`: zero-based position of this chunk within its file
/// - `path_hint`: optional source path, embedded in the AAD
///
/// Returns the full framed chunk bytes.
pub fn encode(
    plaintext: &[u8],
    key: &DerivedKey,
    chunk_index: u64,
    path_hint: Option<&str>,
) -> VaultResult<Vec<u8>> {
    let cipher = ChunkCipher::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::<U16>::from_slice(&nonce_bytes);

    let aad = build_aad(chunk_index, path_hint);

    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|e| VaultError::Other(anyhow::anyhow!("chunk encryption failed: {e}")))?;

    let aad_len = u32::try_from(aad.len())
        .map_err(|_| VaultError::Other(anyhow::anyhow!("AAD exceeds u32 length")))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + AAD_LEN_SIZE + aad.len() + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&aad_len.to_be_bytes());
    out.extend_from_slice(&aad);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt one framed chunk under `key`.
///
/// Structural problems (truncation, impossible AAD length) fail with
/// `MalformedChunk`; tag verification failure fails with `Authentication`.
/// Any single-bit corruption of nonce, AAD, ciphertext, or tag is rejected.
///
/// On success returns the plaintext and the AAD actually embedded in the
/// chunk, so the caller can cross-check the declared index against the
/// expected position.
pub fn decode(data: &[u8], key: &DerivedKey) -> VaultResult<(Vec<u8>, Vec<u8>)> {
    let min = NONCE_SIZE + AAD_LEN_SIZE + TAG_SIZE;
    if data.len() < min {
        return Err(VaultError::MalformedChunk(format!(
            "{} bytes, minimum is {min}",
            data.len()
        )));
    }

    let mut aad_len_bytes = [0u8; AAD_LEN_SIZE];
    aad_len_bytes.copy_from_slice(&data[NONCE_SIZE..NONCE_SIZE + AAD_LEN_SIZE]);
    let aad_len = u32::from_be_bytes(aad_len_bytes) as usize;

    let Some(body_len) = data
        .len()
        .checked_sub(NONCE_SIZE + AAD_LEN_SIZE + TAG_SIZE)
    else {
        return Err(VaultError::MalformedChunk("truncated frame".into()));
    };
    if aad_len > body_len {
        return Err(VaultError::MalformedChunk(format!(
            "declared AAD length {aad_len} exceeds remaining {body_len} bytes"
        )));
    }

    let nonce = Nonce::<U16>::from_slice(&data[..NONCE_SIZE]);
    let aad_start = NONCE_SIZE + AAD_LEN_SIZE;
    let aad = &data[aad_start..aad_start + aad_len];
    // Ciphertext and trailing tag, as one slice for verified decryption.
    let ciphertext = &data[aad_start + aad_len..];

    let cipher = ChunkCipher::new(key.as_bytes().into());
    let plaintext = cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| {
            VaultError::Authentication("chunk tag verification failed (wrong key or tampered data)".into())
        })?;

    Ok((plaintext, aad.to_vec()))
}

/// AAD layout: index first, hint second, joined with `;`.
fn build_aad(chunk_index: u64, path_hint: Option<&str>) -> Vec<u8> {
    let mut aad = format!("chunk_index:{chunk_index}").into_bytes();
    if let Some(hint) = path_hint {
        aad.extend_from_slice(b";original_filepath:");
        aad.extend_from_slice(hint.as_bytes());
    }
    aad
}

/// Parse the chunk index declared in an AAD, if it has the expected prefix.
pub fn declared_index(aad: &[u8]) -> Option<u64> {
    let rest = aad.strip_prefix(b"chunk_index:")?;
    let digits = rest.split(|&b| b == b';').next()?;
    std::str::from_utf8(digits).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KEY_SIZE;

    fn test_key() -> DerivedKey {
        DerivedKey::from_bytes([42u8; KEY_SIZE])
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let key = test_key();
        let plaintext = b"hello, encrypted world!";

        let encoded = encode(plaintext, &key, 0, None).unwrap();
        let (decoded, aad) = decode(&encoded, &key).unwrap();

        assert_eq!(&decoded, plaintext);
        assert_eq!(aad, b"chunk_index:0");
    }

    #[test]
    fn test_aad_with_path_hint() {
        let key = test_key();

        let encoded = encode(b"data", &key, 7, Some("docs/report.txt")).unwrap();
        let (_, aad) = decode(&encoded, &key).unwrap();

        assert_eq!(
            aad,
            b"chunk_index:7;original_filepath:docs/report.txt"
        );
        assert_eq!(declared_index(&aad), Some(7));
    }

    #[test]
    fn test_encode_decode_empty() {
        let key = test_key();

        let encoded = encode(b"", &key, 3, None).unwrap();
        let (decoded, aad) = decode(&encoded, &key).unwrap();

        assert!(decoded.is_empty());
        assert_eq!(declared_index(&aad), Some(3));
    }

    #[test]
    fn test_encoded_size() {
        let key = test_key();
        let plaintext = vec![0u8; 1000];

        let encoded = encode(&plaintext, &key, 0, None).unwrap();

        // nonce (16) + aad_len (4) + aad ("chunk_index:0") + plaintext + tag (16)
        assert_eq!(encoded.len(), 16 + 4 + 13 + 1000 + 16);
    }

    #[test]
    fn test_decode_wrong_key() {
        let encoded = encode(b"secret data", &test_key(), 0, None).unwrap();
        let other = DerivedKey::from_bytes([43u8; KEY_SIZE]);

        let result = decode(&encoded, &other);
        assert!(matches!(result, Err(VaultError::Authentication(_))));
    }

    #[test]
    fn test_decode_too_short() {
        let result = decode(&[0u8; 35], &test_key());
        assert!(matches!(result, Err(VaultError::MalformedChunk(_))));
    }

    #[test]
    fn test_decode_impossible_aad_len() {
        let key = test_key();
        let mut encoded = encode(b"payload", &key, 0, None).unwrap();
        // Declare an AAD longer than the whole frame.
        encoded[NONCE_SIZE..NONCE_SIZE + AAD_LEN_SIZE]
            .copy_from_slice(&u32::MAX.to_be_bytes());

        let result = decode(&encoded, &key);
        assert!(matches!(result, Err(VaultError::MalformedChunk(_))));
    }

    #[test]
    fn test_tampered_nonce() {
        let key = test_key();
        let mut encoded = encode(b"secret data", &key, 0, None).unwrap();
        encoded[0] ^= 0x01;

        assert!(matches!(
            decode(&encoded, &key),
            Err(VaultError::Authentication(_))
        ));
    }

    #[test]
    fn test_tampered_aad() {
        let key = test_key();
        let mut encoded = encode(b"secret data", &key, 0, None).unwrap();
        encoded[NONCE_SIZE + AAD_LEN_SIZE] ^= 0x01;

        assert!(matches!(
            decode(&encoded, &key),
            Err(VaultError::Authentication(_))
        ));
    }

    #[test]
    fn test_tampered_ciphertext() {
        let key = test_key();
        let mut encoded = encode(b"secret data", &key, 0, None).unwrap();
        let ct_start = NONCE_SIZE + AAD_LEN_SIZE + "chunk_index:0".len();
        encoded[ct_start] ^= 0x01;

        assert!(matches!(
            decode(&encoded, &key),
            Err(VaultError::Authentication(_))
        ));
    }

    #[test]
    fn test_tampered_tag() {
        let key = test_key();
        let mut encoded = encode(b"secret data", &key, 0, None).unwrap();
        let last = encoded.len() - 1;
        encoded[last] ^= 0x01;

        assert!(matches!(
            decode(&encoded, &key),
            Err(VaultError::Authentication(_))
        ));
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let key = test_key();
        let a = encode(b"same plaintext", &key, 0, None).unwrap();
        let b = encode(b"same plaintext", &key, 0, None).unwrap();

        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE], "nonces must not repeat");
        assert_ne!(a, b);
    }

    #[test]
    fn test_declared_index_parsing() {
        assert_eq!(declared_index(b"chunk_index:0"), Some(0));
        assert_eq!(declared_index(b"chunk_index:42;original_filepath:x"), Some(42));
        assert_eq!(declared_index(b"chunk_index:"), None);
        assert_eq!(declared_index(b"index:3"), None);
        assert_eq!(declared_index(b""), None);
    }
}
