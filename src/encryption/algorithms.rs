//! PDF encryption algorithms.
//!
//! Key derivation and password validation for the standard security handler.
//!
//! PDF Spec: Section 7.6.3 - Standard Security Handler (Algorithms 1-7, R2-R4)
//! PDF 2.0 Spec (ISO 32000-2:2020): Section 7.6.4.3 - Algorithms 2.A, 2.B, 8-13 (R5/R6)

use super::aes;
use super::rc4::{rc4_crypt, rc4_xor_rounds};
use crate::error::{Error, Result};
use md5::{Digest, Md5};
use sha2::{Sha256, Sha384, Sha512};

/// Padding string used in PDF encryption (32 bytes).
///
/// PDF Spec: Algorithm 2, step 1
const PADDING: &[u8; 32] = b"\x28\xBF\x4E\x5E\x4E\x75\x8A\x41\
                              \x64\x00\x4E\x56\xFF\xFA\x01\x08\
                              \x2E\x2E\x00\xB6\xD0\x68\x3E\x80\
                              \x2F\x0C\xA9\xFE\x64\x53\x69\x7A";

/// Inputs of the MD5-based algorithms (R2-R4) that come from the
/// encryption dictionary and trailer.
#[derive(Debug, Clone)]
pub struct LegacyParams<'a> {
    /// /O (32 bytes)
    pub owner_key: &'a [u8],
    /// /P
    pub permissions: i32,
    /// First element of /ID
    pub file_id: &'a [u8],
    /// /R
    pub revision: u32,
    /// File key length in bytes (5-16)
    pub key_length: usize,
    /// /EncryptMetadata
    pub encrypt_metadata: bool,
}

/// Pad or truncate a password to 32 bytes using the standard padding.
///
/// PDF Spec: Algorithm 2, step a
pub fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = [0u8; 32];
    let pass_len = password.len().min(32);
    padded[..pass_len].copy_from_slice(&password[..pass_len]);
    padded[pass_len..].copy_from_slice(&PADDING[..32 - pass_len]);
    padded
}

/// Compute the file encryption key from a user password (Algorithm 2).
pub fn compute_encryption_key(password: &[u8], params: &LegacyParams<'_>) -> Vec<u8> {
    let key_length = params.key_length.clamp(5, 16);
    let mut hasher = Md5::new();

    // Steps a-b: padded password
    hasher.update(pad_password(password));
    // Step c: owner password hash
    hasher.update(params.owner_key);
    // Step d: permissions as 32-bit little-endian
    hasher.update(params.permissions.to_le_bytes());
    // Step e: file identifier
    hasher.update(params.file_id);
    // Step f: for R >= 4 with unencrypted metadata, pass 0xFFFFFFFF
    if params.revision >= 4 && !params.encrypt_metadata {
        hasher.update([0xFF, 0xFF, 0xFF, 0xFF]);
    }
    let mut hash = hasher.finalize().to_vec();

    // Step h: for R >= 3, 50 additional MD5 iterations over the first n bytes
    if params.revision >= 3 {
        for _ in 0..50 {
            hash = Md5::digest(&hash[..key_length]).to_vec();
        }
    }

    hash.truncate(if params.revision == 2 { 5 } else { key_length });
    hash
}

/// Compute the /U value from a file key (Algorithm 4 for R2, Algorithm 5 for R3+).
pub fn compute_user_hash(key: &[u8], file_id: &[u8], revision: u32) -> Vec<u8> {
    if revision == 2 {
        return rc4_crypt(key, PADDING);
    }

    let mut hasher = Md5::new();
    hasher.update(PADDING);
    hasher.update(file_id);
    let hash = hasher.finalize();

    let mut result = rc4_xor_rounds(key, &hash, 20, false);
    // Arbitrary padding to 32 bytes
    result.extend_from_slice(&[0u8; 16]);
    result
}

/// RC4 key derived from the owner password (Algorithm 3, steps a-d).
fn owner_rc4_key(owner_password: &[u8], revision: u32, key_length: usize) -> Vec<u8> {
    let key_length = if revision == 2 { 5 } else { key_length.clamp(5, 16) };
    let mut hash = Md5::digest(pad_password(owner_password)).to_vec();
    if revision >= 3 {
        for _ in 0..50 {
            hash = Md5::digest(&hash).to_vec();
        }
    }
    hash.truncate(key_length);
    hash
}

/// Compute the /O value (Algorithm 3). An empty owner password falls back to
/// the user password.
pub fn compute_owner_hash(owner_password: &[u8], user_password: &[u8], revision: u32, key_length: usize) -> Vec<u8> {
    let password = if owner_password.is_empty() {
        user_password
    } else {
        owner_password
    };
    let key = owner_rc4_key(password, revision, key_length);
    let padded_user = pad_password(user_password);

    if revision == 2 {
        rc4_crypt(&key, &padded_user)
    } else {
        rc4_xor_rounds(&key, &padded_user, 20, false)
    }
}

/// Authenticate a user password (Algorithm 6). Returns the file key.
pub fn authenticate_user_password(password: &[u8], user_key: &[u8], params: &LegacyParams<'_>) -> Option<Vec<u8>> {
    let key = compute_encryption_key(password, params);
    let expected = compute_user_hash(&key, params.file_id, params.revision);

    // R2 compares all 32 bytes, R3+ only the first 16
    let compare = if params.revision == 2 { 32 } else { 16 };
    if user_key.len() < compare {
        return None;
    }
    constant_time_compare(&user_key[..compare], &expected[..compare]).then_some(key)
}

/// Authenticate an owner password (Algorithm 7). Returns the file key.
///
/// Decrypting /O with the owner-derived RC4 key yields the padded user
/// password, which is then checked with Algorithm 6.
pub fn authenticate_owner_password(password: &[u8], user_key: &[u8], params: &LegacyParams<'_>) -> Option<Vec<u8>> {
    if params.owner_key.len() < 32 {
        return None;
    }
    let key = owner_rc4_key(password, params.revision, params.key_length);
    let owner = &params.owner_key[..32];
    let user_password = if params.revision == 2 {
        rc4_crypt(&key, owner)
    } else {
        rc4_xor_rounds(&key, owner, 20, true)
    };
    authenticate_user_password(&user_password, user_key, params)
}

/// Compute the per-object key (Algorithm 1).
///
/// The file key is extended with the low 3 bytes of the object number and
/// the low 2 bytes of the generation, plus `sAlT` for AES-128, then hashed.
pub fn object_key(file_key: &[u8], object_number: u32, generation: u16, aes: bool) -> Vec<u8> {
    let mut hasher = Md5::new();
    hasher.update(file_key);
    hasher.update(&object_number.to_le_bytes()[..3]);
    hasher.update(generation.to_le_bytes());
    if aes {
        hasher.update(b"sAlT");
    }
    let hash = hasher.finalize();
    let key_len = (file_key.len() + 5).min(16);
    hash[..key_len].to_vec()
}

/// Truncate a password to 127 bytes (R5/R6), backing off to a UTF-8
/// character boundary.
pub fn truncate_password_utf8(password: &[u8]) -> &[u8] {
    if password.len() <= 127 {
        return password;
    }
    let mut end = 127;
    while end > 0 && (password[end] & 0xC0) == 0x80 {
        end -= 1;
    }
    &password[..end]
}

/// Password hash for R5 (SHA-256) and R6 (Algorithm 2.B).
///
/// `udata` is the 48-byte /U string for owner computations and empty for
/// user computations.
pub fn hash_r5_r6(password: &[u8], salt: &[u8], udata: &[u8], revision: u32) -> Result<Vec<u8>> {
    let password = truncate_password_utf8(password);

    let mut hasher = Sha256::new();
    hasher.update(password);
    hasher.update(salt);
    hasher.update(udata);
    let mut k = hasher.finalize().to_vec();

    if revision < 6 {
        return Ok(k);
    }

    let mut round = 0u32;
    loop {
        // K1 = (password || K || udata) repeated 64 times
        let mut unit = Vec::with_capacity(password.len() + k.len() + udata.len());
        unit.extend_from_slice(password);
        unit.extend_from_slice(&k);
        unit.extend_from_slice(udata);
        let k1 = unit.repeat(64);

        let e = aes::cbc_encrypt_no_padding(&k[..16], &k[16..32], &k1)?;

        // Sum of the first 16 bytes mod 3 picks the next hash
        let selector = e[..16].iter().map(|&b| b as u32).sum::<u32>() % 3;
        k = match selector {
            0 => Sha256::digest(&e).to_vec(),
            1 => Sha384::digest(&e).to_vec(),
            _ => Sha512::digest(&e).to_vec(),
        };

        round += 1;
        let last = e[e.len() - 1] as u32;
        if round >= 64 && last <= round - 32 {
            break;
        }
    }

    k.truncate(32);
    Ok(k)
}

/// /O, /U, /OE, /UE and the file key recovered from an R5/R6 dictionary.
#[derive(Debug, Clone)]
pub struct ModernParams<'a> {
    /// /O (48 bytes)
    pub owner_key: &'a [u8],
    /// /U (48 bytes)
    pub user_key: &'a [u8],
    /// /OE (32 bytes)
    pub owner_encryption: &'a [u8],
    /// /UE (32 bytes)
    pub user_encryption: &'a [u8],
    /// /R
    pub revision: u32,
}

/// Authenticate an R5/R6 user password (Algorithm 11) and unwrap /UE.
pub fn authenticate_user_password_r6(password: &[u8], params: &ModernParams<'_>) -> Result<Option<Vec<u8>>> {
    if params.user_key.len() < 48 {
        return Err(Error::Encryption(format!("/U is {} bytes, expected 48", params.user_key.len())));
    }
    let u = params.user_key;
    let hash = hash_r5_r6(password, &u[32..40], &[], params.revision)?;
    if !constant_time_compare(&hash, &u[..32]) {
        return Ok(None);
    }
    let key_hash = hash_r5_r6(password, &u[40..48], &[], params.revision)?;
    unwrap_file_key(&key_hash, params.user_encryption, "UE").map(Some)
}

/// Authenticate an R5/R6 owner password (Algorithm 12) and unwrap /OE.
pub fn authenticate_owner_password_r6(password: &[u8], params: &ModernParams<'_>) -> Result<Option<Vec<u8>>> {
    if params.owner_key.len() < 48 || params.user_key.len() < 48 {
        return Err(Error::Encryption("/O and /U must be 48 bytes".to_string()));
    }
    let o = params.owner_key;
    let udata = &params.user_key[..48];
    let hash = hash_r5_r6(password, &o[32..40], udata, params.revision)?;
    if !constant_time_compare(&hash, &o[..32]) {
        return Ok(None);
    }
    let key_hash = hash_r5_r6(password, &o[40..48], udata, params.revision)?;
    unwrap_file_key(&key_hash, params.owner_encryption, "OE").map(Some)
}

fn unwrap_file_key(key_hash: &[u8], wrapped: &[u8], name: &str) -> Result<Vec<u8>> {
    if wrapped.len() != 32 {
        return Err(Error::Encryption(format!("/{} is {} bytes, expected 32", name, wrapped.len())));
    }
    aes::cbc_decrypt_no_padding(key_hash, &[0u8; 16], wrapped)
}

/// Values written into a fresh R6 encryption dictionary.
#[derive(Debug, Clone)]
pub struct R6Values {
    /// /U
    pub user_key: Vec<u8>,
    /// /UE
    pub user_encryption: Vec<u8>,
    /// /O
    pub owner_key: Vec<u8>,
    /// /OE
    pub owner_encryption: Vec<u8>,
    /// /Perms
    pub perms: Vec<u8>,
}

/// Compute /U, /UE, /O, /OE and /Perms for a file key (Algorithms 8-10).
pub fn compute_r6_values(
    file_key: &[u8],
    user_password: &[u8],
    owner_password: &[u8],
    permissions: i32,
    encrypt_metadata: bool,
) -> Result<R6Values> {
    // Algorithm 8: /U and /UE
    let user_salts = random_bytes(16);
    let mut user_key = hash_r5_r6(user_password, &user_salts[..8], &[], 6)?;
    user_key.extend_from_slice(&user_salts);
    let ue_key = hash_r5_r6(user_password, &user_salts[8..], &[], 6)?;
    let user_encryption = aes::cbc_encrypt_no_padding(&ue_key, &[0u8; 16], file_key)?;

    // Algorithm 9: /O and /OE, bound to the full /U
    let owner_salts = random_bytes(16);
    let mut owner_key = hash_r5_r6(owner_password, &owner_salts[..8], &user_key, 6)?;
    owner_key.extend_from_slice(&owner_salts);
    let oe_key = hash_r5_r6(owner_password, &owner_salts[8..], &user_key, 6)?;
    let owner_encryption = aes::cbc_encrypt_no_padding(&oe_key, &[0u8; 16], file_key)?;

    // Algorithm 10: /Perms
    let mut block = [0u8; 16];
    block[..4].copy_from_slice(&permissions.to_le_bytes());
    block[4..8].copy_from_slice(&[0xFF; 4]);
    block[8] = if encrypt_metadata { b'T' } else { b'F' };
    block[9..12].copy_from_slice(b"adb");
    block[12..].copy_from_slice(&random_bytes(4));
    let perms = aes::ecb_encrypt_block(file_key, &block)?;

    Ok(R6Values {
        user_key,
        user_encryption,
        owner_key,
        owner_encryption,
        perms,
    })
}

/// Check /Perms against /P and /EncryptMetadata (Algorithm 13).
pub fn perms_match(file_key: &[u8], perms: &[u8], permissions: i32, encrypt_metadata: bool) -> bool {
    let Ok(block) = aes::ecb_decrypt_block(file_key, perms) else {
        return false;
    };
    let metadata_flag = if encrypt_metadata { b'T' } else { b'F' };
    &block[9..12] == b"adb" && block[..4] == permissions.to_le_bytes() && block[8] == metadata_flag
}

/// Random bytes from UUID v4 values hashed through SHA-256.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut result = Vec::with_capacity(len);
    while result.len() < len {
        let mut hasher = Sha256::new();
        hasher.update(uuid::Uuid::new_v4().as_bytes());
        hasher.update(uuid::Uuid::new_v4().as_bytes());
        let hash = hasher.finalize();
        let remaining = len - result.len();
        result.extend_from_slice(&hash[..remaining.min(32)]);
    }
    result
}

/// Constant-time comparison to prevent timing attacks.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy<'a>(owner_key: &'a [u8], file_id: &'a [u8], revision: u32, key_length: usize) -> LegacyParams<'a> {
        LegacyParams {
            owner_key,
            permissions: -4,
            file_id,
            revision,
            key_length,
            encrypt_metadata: true,
        }
    }

    #[test]
    fn test_pad_password() {
        let padded = pad_password(b"test");
        assert_eq!(&padded[..4], b"test");
        assert_eq!(&padded[4..], &PADDING[..28]);
        assert_eq!(pad_password(b""), *PADDING);
        let long = b"this is a very long password that exceeds 32 bytes";
        assert_eq!(&pad_password(long)[..], &long[..32]);
    }

    #[test]
    fn test_key_lengths() {
        let o = [0u8; 32];
        assert_eq!(compute_encryption_key(b"user", &legacy(&o, b"id", 2, 16)).len(), 5);
        assert_eq!(compute_encryption_key(b"user", &legacy(&o, b"id", 3, 16)).len(), 16);
        assert_eq!(compute_encryption_key(b"user", &legacy(&o, b"id", 3, 7)).len(), 7);
    }

    #[test]
    fn test_encrypt_metadata_changes_r4_key() {
        let o = [9u8; 32];
        let mut params = legacy(&o, b"id", 4, 16);
        let with = compute_encryption_key(b"", &params);
        params.encrypt_metadata = false;
        assert_ne!(with, compute_encryption_key(b"", &params));
    }

    fn legacy_round_trip(revision: u32, key_length: usize) {
        let file_id = b"0123456789abcdef";
        let o = compute_owner_hash(b"owner", b"user", revision, key_length);
        assert_eq!(o.len(), 32);
        let params = legacy(&o, file_id, revision, key_length);
        let key = compute_encryption_key(b"user", &params);
        let u = compute_user_hash(&key, file_id, revision);
        assert_eq!(u.len(), 32);

        assert_eq!(authenticate_user_password(b"user", &u, &params), Some(key.clone()));
        assert_eq!(authenticate_user_password(b"wrong", &u, &params), None);
        assert_eq!(authenticate_owner_password(b"owner", &u, &params), Some(key));
        assert_eq!(authenticate_owner_password(b"user-not-owner", &u, &params), None);
    }

    #[test]
    fn test_r2_passwords() {
        legacy_round_trip(2, 5);
    }

    #[test]
    fn test_r3_passwords() {
        legacy_round_trip(3, 16);
    }

    #[test]
    fn test_r4_passwords() {
        legacy_round_trip(4, 16);
    }

    #[test]
    fn test_empty_owner_uses_user_password() {
        assert_eq!(compute_owner_hash(b"", b"user", 3, 16), compute_owner_hash(b"user", b"user", 3, 16));
    }

    #[test]
    fn test_object_key_lengths() {
        assert_eq!(object_key(&[1u8; 5], 1, 0, false).len(), 10);
        assert_eq!(object_key(&[1u8; 16], 1, 0, true).len(), 16);
        assert_ne!(object_key(&[1u8; 16], 1, 0, false), object_key(&[1u8; 16], 2, 0, false));
        assert_ne!(object_key(&[1u8; 16], 1, 0, false), object_key(&[1u8; 16], 1, 0, true));
    }

    #[test]
    fn test_truncate_password_utf8() {
        let long = "é".repeat(100);
        let truncated = truncate_password_utf8(long.as_bytes());
        assert!(truncated.len() <= 127);
        assert!(std::str::from_utf8(truncated).is_ok());
    }

    #[test]
    fn test_r5_hash_is_plain_sha256() {
        let hash = hash_r5_r6(b"pw", b"saltsalt", b"", 5).unwrap();
        assert_eq!(hash, Sha256::digest(b"pwsaltsalt").to_vec());
    }

    #[test]
    fn test_r6_hash_is_deterministic_and_distinct() {
        let a = hash_r5_r6(b"pw", b"saltsalt", b"", 6).unwrap();
        assert_eq!(a.len(), 32);
        assert_eq!(a, hash_r5_r6(b"pw", b"saltsalt", b"", 6).unwrap());
        assert_ne!(a, hash_r5_r6(b"pw", b"saltsalt", b"", 5).unwrap());
        assert_ne!(a, hash_r5_r6(b"px", b"saltsalt", b"", 6).unwrap());
    }

    #[test]
    fn test_r6_round_trip() {
        let file_key = random_bytes(32);
        let values = compute_r6_values(&file_key, b"user", b"owner", -4, true).unwrap();
        assert_eq!(values.user_key.len(), 48);
        assert_eq!(values.owner_key.len(), 48);
        assert_eq!(values.perms.len(), 16);

        let params = ModernParams {
            owner_key: &values.owner_key,
            user_key: &values.user_key,
            owner_encryption: &values.owner_encryption,
            user_encryption: &values.user_encryption,
            revision: 6,
        };
        assert_eq!(authenticate_user_password_r6(b"user", &params).unwrap(), Some(file_key.clone()));
        assert_eq!(authenticate_owner_password_r6(b"owner", &params).unwrap(), Some(file_key.clone()));
        assert_eq!(authenticate_user_password_r6(b"owner", &params).unwrap(), None);
        assert_eq!(authenticate_owner_password_r6(b"user", &params).unwrap(), None);
        assert!(perms_match(&file_key, &values.perms, -4, true));
        assert!(!perms_match(&file_key, &values.perms, -4, false));
    }

    #[test]
    fn test_short_u_is_an_error() {
        let params = ModernParams {
            owner_key: &[0u8; 48],
            user_key: &[0u8; 10],
            owner_encryption: &[0u8; 32],
            user_encryption: &[0u8; 32],
            revision: 6,
        };
        assert!(authenticate_user_password_r6(b"", &params).is_err());
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare(b"test1234", b"test1234"));
        assert!(!constant_time_compare(b"test1234", b"test1235"));
        assert!(!constant_time_compare(b"test", b"testing"));
    }

    #[test]
    fn test_random_bytes() {
        assert_eq!(random_bytes(40).len(), 40);
        assert_ne!(random_bytes(16), random_bytes(16));
    }
}
