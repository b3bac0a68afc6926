//! AES encryption/decryption for PDF.
//!
//! PDFs use AES in CBC mode. Strings and streams carry a random 16-byte IV
//! in front of PKCS#7-padded ciphertext; the R6 key-wrapping values (/UE,
//! /OE) and the hash rounds of Algorithm 2.B use unpadded CBC, and /Perms
//! is a single ECB block.
//!
//! - AES-128: 16-byte key (AESV2, V=4, R=4)
//! - AES-256: 32-byte key (AESV3, V=5, R=5/6)
//!
//! PDF Spec: Section 7.6.2 - General Encryption Algorithm

use crate::error::{Error, Result};
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes256};
use cbc::{Decryptor, Encryptor};

type Aes128CbcEnc = Encryptor<Aes128>;
type Aes128CbcDec = Decryptor<Aes128>;
type Aes256CbcEnc = Encryptor<Aes256>;
type Aes256CbcDec = Decryptor<Aes256>;

const BLOCK: usize = 16;

/// CBC-encrypt whole blocks without padding. Key must be 16 or 32 bytes.
pub fn cbc_encrypt_no_padding(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if iv.len() != BLOCK {
        return Err(Error::Encryption("IV must be 16 bytes".to_string()));
    }
    if data.len() % BLOCK != 0 {
        return Err(Error::Encryption(format!(
            "unpadded AES input of {} bytes is not block aligned",
            data.len()
        )));
    }

    let mut buffer = data.to_vec();
    let len = buffer.len();
    let result = match key.len() {
        16 => Aes128CbcEnc::new(key.into(), iv.into())
            .encrypt_padded_mut::<NoPadding>(&mut buffer, len)
            .map(|_| ()),
        32 => Aes256CbcEnc::new(key.into(), iv.into())
            .encrypt_padded_mut::<NoPadding>(&mut buffer, len)
            .map(|_| ()),
        n => return Err(Error::Encryption(format!("AES key must be 16 or 32 bytes, got {}", n))),
    };
    result.map_err(|_| Error::Encryption("AES encryption failed".to_string()))?;
    Ok(buffer)
}

/// CBC-decrypt whole blocks without removing padding.
pub fn cbc_decrypt_no_padding(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if iv.len() != BLOCK {
        return Err(Error::Encryption("IV must be 16 bytes".to_string()));
    }
    if data.len() % BLOCK != 0 {
        return Err(Error::Encryption(format!(
            "AES ciphertext of {} bytes is not block aligned",
            data.len()
        )));
    }

    let mut buffer = data.to_vec();
    let result = match key.len() {
        16 => Aes128CbcDec::new(key.into(), iv.into())
            .decrypt_padded_mut::<NoPadding>(&mut buffer)
            .map(|_| ()),
        32 => Aes256CbcDec::new(key.into(), iv.into())
            .decrypt_padded_mut::<NoPadding>(&mut buffer)
            .map(|_| ()),
        n => return Err(Error::Encryption(format!("AES key must be 16 or 32 bytes, got {}", n))),
    };
    result.map_err(|_| Error::Encryption("AES decryption failed".to_string()))?;
    Ok(buffer)
}

/// Encrypt with PKCS#7 padding and a fresh random IV, returning `IV || ciphertext`.
pub fn encrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let iv = super::algorithms::random_bytes(BLOCK);

    // Apply PKCS#7 padding manually
    let mut padded = data.to_vec();
    let padding_len = BLOCK - (data.len() % BLOCK);
    padded.extend(std::iter::repeat_n(padding_len as u8, padding_len));

    let ciphertext = cbc_encrypt_no_padding(key, &iv, &padded)?;
    let mut out = iv;
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt `IV || ciphertext` and strip PKCS#7 padding.
///
/// An empty input decrypts to an empty output.
pub fn decrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    if data.len() < BLOCK {
        return Err(Error::Encryption(format!(
            "AES payload of {} bytes is shorter than its IV",
            data.len()
        )));
    }
    let (iv, ciphertext) = data.split_at(BLOCK);
    if ciphertext.is_empty() {
        return Ok(Vec::new());
    }

    let decrypted = cbc_decrypt_no_padding(key, iv, ciphertext)?;

    // Remove PKCS#7 padding manually
    let padding_len = decrypted[decrypted.len() - 1] as usize;
    if padding_len == 0 || padding_len > BLOCK {
        return Err(Error::Encryption("Invalid PKCS#7 padding".to_string()));
    }
    let data_len = decrypted.len() - padding_len;
    if decrypted[data_len..].iter().any(|&b| b as usize != padding_len) {
        return Err(Error::Encryption("Invalid PKCS#7 padding".to_string()));
    }
    Ok(decrypted[..data_len].to_vec())
}

/// Single-block AES-256 ECB, as used for /Perms. ECB over one block equals
/// CBC with a zero IV.
pub fn ecb_encrypt_block(key: &[u8], block: &[u8; 16]) -> Result<Vec<u8>> {
    cbc_encrypt_no_padding(key, &[0u8; BLOCK], block)
}

/// Inverse of [`ecb_encrypt_block`].
pub fn ecb_decrypt_block(key: &[u8], block: &[u8]) -> Result<Vec<u8>> {
    if block.len() < BLOCK {
        return Err(Error::Encryption("/Perms is shorter than one AES block".to_string()));
    }
    cbc_decrypt_no_padding(key, &[0u8; BLOCK], &block[..BLOCK])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aes128_round_trip() {
        let key = b"0123456789abcdef";
        let plaintext = b"Hello, AES encryption!";
        let ciphertext = encrypt(key, plaintext).unwrap();
        assert_eq!(ciphertext.len(), 16 + 32);
        assert_eq!(decrypt(key, &ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn test_aes256_round_trip() {
        let key = [0x42u8; 32];
        let ciphertext = encrypt(&key, b"Exactly16bytes!!").unwrap();
        // Block-aligned input gains a full padding block
        assert_eq!(ciphertext.len(), 16 + 32);
        assert_eq!(decrypt(&key, &ciphertext).unwrap(), b"Exactly16bytes!!");
    }

    #[test]
    fn test_random_iv_differs() {
        let key = [1u8; 16];
        assert_ne!(encrypt(&key, b"same").unwrap(), encrypt(&key, b"same").unwrap());
    }

    #[test]
    fn test_empty_payloads() {
        let key = [3u8; 16];
        assert!(decrypt(&key, b"").unwrap().is_empty());
        let ciphertext = encrypt(&key, b"").unwrap();
        assert!(decrypt(&key, &ciphertext).unwrap().is_empty());
    }

    #[test]
    fn test_short_payload_is_an_error() {
        assert!(matches!(decrypt(&[0u8; 16], b"short"), Err(Error::Encryption(_))));
    }

    #[test]
    fn test_wrong_key_is_detected_or_garbled() {
        let ciphertext = encrypt(&[1u8; 16], b"attack at dawn").unwrap();
        match decrypt(&[2u8; 16], &ciphertext) {
            Ok(plain) => assert_ne!(plain, b"attack at dawn"),
            Err(e) => assert!(matches!(e, Error::Encryption(_))),
        }
    }

    #[test]
    fn test_invalid_key_length() {
        assert!(cbc_encrypt_no_padding(b"short", &[0u8; 16], &[0u8; 16]).is_err());
    }

    #[test]
    fn test_fips197_aes128_block() {
        // FIPS-197 C.1
        let key: Vec<u8> = (0u8..16).collect();
        let plain: [u8; 16] = [
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff,
        ];
        let expected = [
            0x69, 0xc4, 0xe0, 0xd8, 0x6a, 0x7b, 0x04, 0x30, 0xd8, 0xcd, 0xb7, 0x80, 0x70, 0xb4, 0xc5, 0x5a,
        ];
        assert_eq!(ecb_encrypt_block(&key, &plain).unwrap(), expected);
        assert_eq!(ecb_decrypt_block(&key, &expected).unwrap(), plain);
    }
}
