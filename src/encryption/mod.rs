//! PDF encryption support.
//!
//! This module implements the standard security handler (ISO 32000-1:2008,
//! Section 7.6, and ISO 32000-2 for R6). It supports:
//!
//! - RC4 encryption (40-bit and 128-bit), revisions 2-4
//! - AES-128 (AESV2) through crypt filters, revision 4
//! - AES-256 (AESV3), revisions 5 and 6
//! - User and owner password authentication and classification
//! - Creating fresh `/Encrypt` dictionaries for writing
//!
//! Names, numbers, dictionary keys, the `/Encrypt` dictionary itself and
//! cross-reference streams are never encrypted. `/Permissions` are exposed
//! for policy decisions only; nothing here enforces them.
//!
//! # References
//!
//! - PDF Spec Section 7.6: Encryption
//! - PDF Spec Section 7.6.3: Standard Security Handler
//! - PDF 2.0 Spec Section 7.6.4.3.4: Algorithm 2.B

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};
use bitflags::bitflags;

mod aes;
mod algorithms;
mod handler;
mod rc4;

pub use handler::SecurityHandler;

/// Fresh 16-byte value for the first `/ID` element.
pub fn generate_file_id() -> Vec<u8> {
    algorithms::random_bytes(16)
}

/// Encryption algorithm used when creating a new `/Encrypt` dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// RC4 with 40-bit key (V=1, R=2)
    RC4_40,
    /// RC4 with 128-bit key (V=2, R=3)
    Rc4_128,
    /// AES with 128-bit key in CBC mode (V=4, R=4)
    Aes128,
    /// AES with 256-bit key in CBC mode (V=5, R=6)
    Aes256,
}

impl Algorithm {
    /// Get the key length in bytes for this algorithm.
    pub fn key_length(&self) -> usize {
        match self {
            Algorithm::RC4_40 => 5,
            Algorithm::Rc4_128 | Algorithm::Aes128 => 16,
            Algorithm::Aes256 => 32,
        }
    }

    /// `(V, R)` written for this algorithm.
    pub fn version_revision(&self) -> (u32, u32) {
        match self {
            Algorithm::RC4_40 => (1, 2),
            Algorithm::Rc4_128 => (2, 3),
            Algorithm::Aes128 => (4, 4),
            Algorithm::Aes256 => (5, 6),
        }
    }

    /// Check if this is an AES algorithm.
    pub fn is_aes(&self) -> bool {
        matches!(self, Algorithm::Aes128 | Algorithm::Aes256)
    }
}

/// Cipher applied to a class of data (strings or streams).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    /// `/None` or `/Identity`: data is stored in the clear
    Identity,
    /// RC4 with a per-object key
    V2,
    /// AES-128-CBC with a per-object key
    AesV2,
    /// AES-256-CBC with the file key
    AesV3,
}

impl CryptMethod {
    /// Map a `/CFM` name.
    pub fn from_cfm(name: &str) -> Result<Self> {
        match name {
            "None" | "Identity" => Ok(CryptMethod::Identity),
            "V2" => Ok(CryptMethod::V2),
            "AESV2" => Ok(CryptMethod::AesV2),
            "AESV3" => Ok(CryptMethod::AesV3),
            other => Err(Error::Encryption(format!("Unknown crypt filter method: {}", other))),
        }
    }
}

/// Classification of a supplied password.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PasswordValidity {
    /// Neither password matched; no key is available
    #[default]
    Invalid,
    /// The user password matched
    UserPassword,
    /// The owner password matched
    OwnerPassword,
}

impl PasswordValidity {
    /// Whether a file key was derived.
    pub fn is_valid(&self) -> bool {
        !matches!(self, PasswordValidity::Invalid)
    }
}

bitflags! {
    /// User access permissions (`/P`).
    ///
    /// Per PDF spec Table 22. Bits are numbered from 1 in the spec.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u32 {
        /// Bit 3: print
        const PRINT = 1 << 2;
        /// Bit 4: modify contents
        const MODIFY = 1 << 3;
        /// Bit 5: copy or extract text and graphics
        const COPY = 1 << 4;
        /// Bit 6: add or modify annotations, fill forms
        const ANNOTATE = 1 << 5;
        /// Bit 9: fill existing form fields (R>=3)
        const FILL_FORMS = 1 << 8;
        /// Bit 10: extract for accessibility (R>=3)
        const EXTRACT_ACCESSIBILITY = 1 << 9;
        /// Bit 11: assemble the document (R>=3)
        const ASSEMBLE = 1 << 10;
        /// Bit 12: faithful high-quality print (R>=3)
        const PRINT_HIGH_QUALITY = 1 << 11;
    }
}

impl Permissions {
    /// Bits that must be set in every written `/P` value.
    const RESERVED: u32 = 0xFFFF_F0C0;

    /// Create permissions from the `/P` value.
    pub fn from_p(p: i32) -> Self {
        Self::from_bits_truncate(p as u32)
    }

    /// `/P` value with the reserved bits set.
    pub fn to_p(&self) -> i32 {
        (self.bits() | Self::RESERVED) as i32
    }

    /// Check if printing is allowed.
    pub fn can_print(&self) -> bool {
        self.contains(Permissions::PRINT)
    }

    /// Check if modifying the document is allowed.
    pub fn can_modify(&self) -> bool {
        self.contains(Permissions::MODIFY)
    }

    /// Check if copying text/graphics is allowed.
    pub fn can_copy(&self) -> bool {
        self.contains(Permissions::COPY)
    }

    /// Check if adding/modifying annotations is allowed.
    pub fn can_annotate(&self) -> bool {
        self.contains(Permissions::ANNOTATE)
    }
}

/// Parsed `/Encrypt` dictionary.
///
/// PDF Spec: Section 7.6.1 - General
#[derive(Debug, Clone)]
pub struct EncryptDict {
    /// Filter name (should be "Standard")
    pub filter: String,
    /// Algorithm version (V)
    pub version: u32,
    /// Key length in bits (Length)
    pub length: Option<u32>,
    /// Revision number (R): 2-6
    pub revision: u32,
    /// Owner password hash (O): 32 or 48 bytes
    pub owner_key: Vec<u8>,
    /// User password hash (U): 32 or 48 bytes
    pub user_key: Vec<u8>,
    /// User permissions (P)
    pub permissions: i32,
    /// EncryptMetadata flag, true by default
    pub encrypt_metadata: bool,
    /// OE (R5/R6)
    pub owner_encryption: Option<Vec<u8>>,
    /// UE (R5/R6)
    pub user_encryption: Option<Vec<u8>>,
    /// Perms (R5/R6)
    pub perms: Option<Vec<u8>>,
    /// Crypt filter map (CF)
    pub crypt_filters: Dictionary,
    /// Default stream crypt filter name (StmF)
    pub stream_filter: Option<String>,
    /// Default string crypt filter name (StrF)
    pub string_filter: Option<String>,
}

impl EncryptDict {
    /// Parse an encryption dictionary.
    ///
    /// # Errors
    ///
    /// `Encryption` when a required entry is missing, `UnsupportedEncryption`
    /// for a non-standard filter or an unknown V/R combination.
    pub fn from_dict(dict: &Dictionary) -> Result<Self> {
        let int = |key: &str| dict.get(key).and_then(Object::as_integer);
        let bytes = |key: &str| dict.get(key).and_then(Object::as_string).map(<[u8]>::to_vec);
        let missing = |key: &str| Error::Encryption(format!("Encrypt dictionary missing /{}", key));

        let filter = dict
            .get("Filter")
            .and_then(Object::as_name)
            .ok_or_else(|| missing("Filter"))?
            .to_string();
        let version = int("V").unwrap_or(0).max(0) as u32;
        let revision = int("R").ok_or_else(|| missing("R"))?.max(0) as u32;

        if filter != "Standard" || !matches!(version, 1 | 2 | 4 | 5) || !(2..=6).contains(&revision) {
            return Err(Error::UnsupportedEncryption { version, revision });
        }

        Ok(EncryptDict {
            filter,
            version,
            length: int("Length").map(|l| l.max(0) as u32),
            revision,
            owner_key: bytes("O").ok_or_else(|| missing("O"))?,
            user_key: bytes("U").ok_or_else(|| missing("U"))?,
            permissions: int("P").ok_or_else(|| missing("P"))? as i32,
            encrypt_metadata: dict.get("EncryptMetadata").and_then(Object::as_bool).unwrap_or(true),
            owner_encryption: bytes("OE"),
            user_encryption: bytes("UE"),
            perms: bytes("Perms"),
            crypt_filters: dict.get("CF").and_then(Object::as_dict).cloned().unwrap_or_default(),
            stream_filter: dict.get("StmF").and_then(Object::as_name).map(str::to_string),
            string_filter: dict.get("StrF").and_then(Object::as_name).map(str::to_string),
        })
    }

    /// Get the effective file key length in bytes.
    pub fn key_length_bytes(&self) -> usize {
        match (self.version, self.length) {
            (5, _) => 32,
            (4, _) => 16,
            (_, Some(bits)) if (40..=128).contains(&bits) => (bits / 8) as usize,
            _ => 5,
        }
    }

    /// Resolve a crypt filter name against `/CF`.
    pub fn crypt_method(&self, name: Option<&str>) -> Result<CryptMethod> {
        match self.version {
            1 | 2 => return Ok(CryptMethod::V2),
            5 if name.is_none() => return Ok(CryptMethod::AesV3),
            _ => {},
        }
        let Some(name) = name else {
            return Ok(CryptMethod::Identity);
        };
        if name == "Identity" {
            return Ok(CryptMethod::Identity);
        }
        let filter = self
            .crypt_filters
            .get(name)
            .and_then(Object::as_dict)
            .ok_or_else(|| Error::Encryption(format!("Crypt filter '{}' not found in /CF", name)))?;
        CryptMethod::from_cfm(filter.get("CFM").and_then(Object::as_name).unwrap_or("None"))
    }
}

/// Summary of the active security handler, computed once per successful
/// password check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityContext {
    /// `/V`
    pub version: u32,
    /// `/R`
    pub revision: u32,
    /// File key length in bytes
    pub key_length: usize,
    /// Method applied to strings
    pub string_method: CryptMethod,
    /// Method applied to streams
    pub stream_method: CryptMethod,
    /// How the password was classified
    pub validity: PasswordValidity,
    /// Decoded `/P`
    pub permissions: Permissions,
    /// `/EncryptMetadata`
    pub encrypt_metadata: bool,
}

/// Parameters for encrypting a document on save.
#[derive(Debug, Clone)]
pub struct EncryptionConfig {
    /// Password that opens the document
    pub user_password: Vec<u8>,
    /// Password granting full access; empty means "same as user password"
    pub owner_password: Vec<u8>,
    /// Cipher and revision
    pub algorithm: Algorithm,
    /// Granted permissions
    pub permissions: Permissions,
    /// Encrypt XMP metadata streams too
    pub encrypt_metadata: bool,
}

impl EncryptionConfig {
    /// AES-256 (R6) with all permissions granted.
    pub fn new(user_password: impl AsRef<[u8]>, owner_password: impl AsRef<[u8]>) -> Self {
        Self {
            user_password: user_password.as_ref().to_vec(),
            owner_password: owner_password.as_ref().to_vec(),
            algorithm: Algorithm::Aes256,
            permissions: Permissions::all(),
            encrypt_metadata: true,
        }
    }

    /// Choose the cipher.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Choose the granted permissions.
    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    /// Leave metadata streams unencrypted when `false`.
    pub fn with_encrypt_metadata(mut self, encrypt: bool) -> Self {
        self.encrypt_metadata = encrypt;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::dictionary;

    fn encrypt_dict(v: i64, r: i64) -> Dictionary {
        dictionary([
            ("Filter", Object::name("Standard")),
            ("V", Object::Integer(v)),
            ("R", Object::Integer(r)),
            ("O", Object::string(vec![0u8; 32])),
            ("U", Object::string(vec![0u8; 32])),
            ("P", Object::Integer(-4)),
        ])
    }

    #[test]
    fn test_parse_rc4_dict() {
        let dict = EncryptDict::from_dict(&encrypt_dict(2, 3)).unwrap();
        assert_eq!(dict.revision, 3);
        assert_eq!(dict.key_length_bytes(), 5);
        assert!(dict.encrypt_metadata);
        assert_eq!(dict.crypt_method(None).unwrap(), CryptMethod::V2);
    }

    #[test]
    fn test_length_in_bits() {
        let mut raw = encrypt_dict(2, 3);
        raw.insert("Length".into(), Object::Integer(128));
        assert_eq!(EncryptDict::from_dict(&raw).unwrap().key_length_bytes(), 16);
    }

    #[test]
    fn test_unsupported_combinations() {
        assert!(matches!(
            EncryptDict::from_dict(&encrypt_dict(3, 3)),
            Err(Error::UnsupportedEncryption { version: 3, revision: 3 })
        ));
        assert!(matches!(
            EncryptDict::from_dict(&encrypt_dict(4, 7)),
            Err(Error::UnsupportedEncryption { .. })
        ));
        let mut raw = encrypt_dict(2, 3);
        raw.insert("Filter".into(), Object::name("Adobe.PubSec"));
        assert!(matches!(EncryptDict::from_dict(&raw), Err(Error::UnsupportedEncryption { .. })));
    }

    #[test]
    fn test_missing_owner_hash() {
        let mut raw = encrypt_dict(2, 3);
        raw.shift_remove("O");
        assert!(matches!(EncryptDict::from_dict(&raw), Err(Error::Encryption(_))));
    }

    #[test]
    fn test_crypt_filters() {
        let mut raw = encrypt_dict(4, 4);
        raw.insert(
            "CF".into(),
            Object::Dictionary(dictionary([(
                "StdCF",
                Object::Dictionary(dictionary([("CFM", Object::name("AESV2"))])),
            )])),
        );
        raw.insert("StmF".into(), Object::name("StdCF"));
        let dict = EncryptDict::from_dict(&raw).unwrap();
        assert_eq!(dict.crypt_method(dict.stream_filter.as_deref()).unwrap(), CryptMethod::AesV2);
        assert_eq!(dict.crypt_method(dict.string_filter.as_deref()).unwrap(), CryptMethod::Identity);
        assert_eq!(dict.crypt_method(Some("Identity")).unwrap(), CryptMethod::Identity);
        assert!(dict.crypt_method(Some("Missing")).is_err());
    }

    #[test]
    fn test_permissions_round_trip() {
        let perms = Permissions::PRINT | Permissions::COPY;
        let p = perms.to_p();
        assert!(p < 0);
        assert_eq!(Permissions::from_p(p), perms);
        assert!(Permissions::from_p(-4).can_print());
        assert!(!Permissions::from_p(-4 & !(1 << 4)).can_copy());
        assert_eq!(Permissions::all().to_p(), -4);
    }

    #[test]
    fn test_algorithm_versions() {
        assert_eq!(Algorithm::Aes256.version_revision(), (5, 6));
        assert_eq!(Algorithm::RC4_40.key_length(), 5);
        assert!(Algorithm::Aes128.is_aes());
    }
}
