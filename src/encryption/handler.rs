//! Standard security handler.
//!
//! Authenticates passwords, derives per-object keys and encrypts or
//! decrypts every string and stream payload of an object.

use super::algorithms::{self, LegacyParams, ModernParams};
use super::{aes, rc4};
use super::{
    Algorithm, CryptMethod, EncryptDict, EncryptionConfig, PasswordValidity, Permissions, SecurityContext,
};
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef, StringFormat, dictionary};
use bytes::Bytes;

/// Nesting limit for walking an object's strings.
const MAX_WALK_DEPTH: u32 = 256;

/// Security handler for one document.
///
/// Created from the trailer's `/Encrypt` dictionary and the first `/ID`
/// element, then unlocked with [`authenticate`](Self::authenticate).
#[derive(Debug, Clone)]
pub struct SecurityHandler {
    dict: EncryptDict,
    file_id: Vec<u8>,
    string_method: CryptMethod,
    stream_method: CryptMethod,
    key: Option<Vec<u8>>,
    validity: PasswordValidity,
}

impl SecurityHandler {
    /// Create a handler for an existing `/Encrypt` dictionary.
    ///
    /// # Errors
    ///
    /// `UnsupportedEncryption` for anything but the standard handler at
    /// V 1, 2, 4 or 5 and R 2-6; `Encryption` for malformed entries.
    pub fn new(encrypt: &Dictionary, file_id: &[u8]) -> Result<Self> {
        let dict = EncryptDict::from_dict(encrypt)?;
        let string_method = dict.crypt_method(dict.string_filter.as_deref())?;
        let stream_method = dict.crypt_method(dict.stream_filter.as_deref())?;

        log::info!(
            "PDF is encrypted (V={}, R={}, strings {:?}, streams {:?})",
            dict.version,
            dict.revision,
            string_method,
            stream_method
        );

        Ok(Self {
            dict,
            file_id: file_id.to_vec(),
            string_method,
            stream_method,
            key: None,
            validity: PasswordValidity::Invalid,
        })
    }

    /// Build a fresh `/Encrypt` dictionary and a handler already holding
    /// its file key.
    pub fn create(config: &EncryptionConfig, file_id: &[u8]) -> Result<(Self, Dictionary)> {
        let (version, revision) = config.algorithm.version_revision();
        let key_length = config.algorithm.key_length();
        let p = config.permissions.to_p();
        let owner_password = if config.owner_password.is_empty() {
            &config.user_password
        } else {
            &config.owner_password
        };

        let mut encrypt = dictionary([
            ("Filter", Object::name("Standard")),
            ("V", Object::Integer(version as i64)),
            ("R", Object::Integer(revision as i64)),
            ("Length", Object::Integer((key_length * 8) as i64)),
            ("P", Object::Integer(p as i64)),
        ]);

        let file_key = if revision >= 5 {
            let file_key = algorithms::random_bytes(32);
            let values = algorithms::compute_r6_values(
                &file_key,
                &config.user_password,
                owner_password,
                p,
                config.encrypt_metadata,
            )?;
            encrypt.insert("O".into(), Object::hex_string(values.owner_key));
            encrypt.insert("U".into(), Object::hex_string(values.user_key));
            encrypt.insert("OE".into(), Object::hex_string(values.owner_encryption));
            encrypt.insert("UE".into(), Object::hex_string(values.user_encryption));
            encrypt.insert("Perms".into(), Object::hex_string(values.perms));
            file_key
        } else {
            let owner_key = algorithms::compute_owner_hash(owner_password, &config.user_password, revision, key_length);
            let params = LegacyParams {
                owner_key: &owner_key,
                permissions: p,
                file_id,
                revision,
                key_length,
                encrypt_metadata: config.encrypt_metadata,
            };
            let file_key = algorithms::compute_encryption_key(&config.user_password, &params);
            let user_key = algorithms::compute_user_hash(&file_key, file_id, revision);
            encrypt.insert("O".into(), Object::hex_string(owner_key));
            encrypt.insert("U".into(), Object::hex_string(user_key));
            file_key
        };

        if config.algorithm.is_aes() {
            let cfm = if config.algorithm == Algorithm::Aes256 { "AESV3" } else { "AESV2" };
            let std_cf = dictionary([
                ("Type", Object::name("CryptFilter")),
                ("CFM", Object::name(cfm)),
                ("AuthEvent", Object::name("DocOpen")),
                ("Length", Object::Integer(key_length as i64)),
            ]);
            encrypt.insert(
                "CF".into(),
                Object::Dictionary(dictionary([("StdCF", Object::Dictionary(std_cf))])),
            );
            encrypt.insert("StmF".into(), Object::name("StdCF"));
            encrypt.insert("StrF".into(), Object::name("StdCF"));
        }
        if !config.encrypt_metadata {
            encrypt.insert("EncryptMetadata".into(), Object::Boolean(false));
        }

        let mut handler = Self::new(&encrypt, file_id)?;
        handler.key = Some(file_key);
        handler.validity = PasswordValidity::OwnerPassword;
        Ok((handler, encrypt))
    }

    /// Authenticate with a password, trying it as the owner password first.
    ///
    /// On success the file key is cached for the handler's lifetime.
    pub fn authenticate(&mut self, password: &[u8]) -> Result<PasswordValidity> {
        let (validity, key) = if self.dict.revision >= 5 {
            self.authenticate_modern(password)?
        } else {
            self.authenticate_legacy(password)
        };

        match &key {
            Some(key) => {
                log::info!("Password accepted as {:?}", validity);
                if self.dict.revision >= 5 {
                    self.check_perms(key);
                }
            },
            None => log::info!("Password rejected"),
        }

        if key.is_some() || !self.validity.is_valid() {
            self.key = key;
            self.validity = validity;
        }
        Ok(validity)
    }

    fn legacy_params(&self) -> LegacyParams<'_> {
        let owner_key = &self.dict.owner_key[..self.dict.owner_key.len().min(32)];
        LegacyParams {
            owner_key,
            permissions: self.dict.permissions,
            file_id: &self.file_id,
            revision: self.dict.revision,
            key_length: self.dict.key_length_bytes(),
            encrypt_metadata: self.dict.encrypt_metadata,
        }
    }

    fn authenticate_legacy(&self, password: &[u8]) -> (PasswordValidity, Option<Vec<u8>>) {
        let params = self.legacy_params();
        if let Some(key) = algorithms::authenticate_owner_password(password, &self.dict.user_key, &params) {
            return (PasswordValidity::OwnerPassword, Some(key));
        }
        if let Some(key) = algorithms::authenticate_user_password(password, &self.dict.user_key, &params) {
            return (PasswordValidity::UserPassword, Some(key));
        }
        (PasswordValidity::Invalid, None)
    }

    fn authenticate_modern(&self, password: &[u8]) -> Result<(PasswordValidity, Option<Vec<u8>>)> {
        let missing = |key: &str| Error::Encryption(format!("Encrypt dictionary missing /{}", key));
        let params = ModernParams {
            owner_key: &self.dict.owner_key,
            user_key: &self.dict.user_key,
            owner_encryption: self.dict.owner_encryption.as_deref().ok_or_else(|| missing("OE"))?,
            user_encryption: self.dict.user_encryption.as_deref().ok_or_else(|| missing("UE"))?,
            revision: self.dict.revision,
        };
        if let Some(key) = algorithms::authenticate_owner_password_r6(password, &params)? {
            return Ok((PasswordValidity::OwnerPassword, Some(key)));
        }
        if let Some(key) = algorithms::authenticate_user_password_r6(password, &params)? {
            return Ok((PasswordValidity::UserPassword, Some(key)));
        }
        Ok((PasswordValidity::Invalid, None))
    }

    fn check_perms(&self, key: &[u8]) {
        match &self.dict.perms {
            Some(perms) => {
                if !algorithms::perms_match(key, perms, self.dict.permissions, self.dict.encrypt_metadata) {
                    log::warn!("/Perms does not match /P; continuing with /P");
                }
            },
            None => log::debug!("No /Perms entry to validate"),
        }
    }

    /// How the last successful (or first failed) password was classified.
    pub fn validity(&self) -> PasswordValidity {
        self.validity
    }

    /// Check if a file key is available.
    pub fn is_authenticated(&self) -> bool {
        self.key.is_some()
    }

    /// Get the permissions.
    pub fn permissions(&self) -> Permissions {
        Permissions::from_p(self.dict.permissions)
    }

    /// The parsed `/Encrypt` dictionary.
    pub fn encrypt_dict(&self) -> &EncryptDict {
        &self.dict
    }

    /// Summary of the active handler.
    pub fn context(&self) -> SecurityContext {
        SecurityContext {
            version: self.dict.version,
            revision: self.dict.revision,
            key_length: self.dict.key_length_bytes(),
            string_method: self.string_method,
            stream_method: self.stream_method,
            validity: self.validity,
            permissions: self.permissions(),
            encrypt_metadata: self.dict.encrypt_metadata,
        }
    }

    /// Key used for one object under `method` (Algorithm 1, or the file
    /// key itself for AES-256).
    pub fn object_key(&self, id: ObjectRef, method: CryptMethod) -> Result<Vec<u8>> {
        let file_key = self.key.as_deref().ok_or(Error::PasswordRequired)?;
        Ok(match method {
            CryptMethod::AesV3 => file_key.to_vec(),
            CryptMethod::AesV2 => algorithms::object_key(file_key, id.id, id.gen, true),
            CryptMethod::V2 | CryptMethod::Identity => algorithms::object_key(file_key, id.id, id.gen, false),
        })
    }

    /// Method for a stream, honouring `/Crypt` filters, unencrypted metadata
    /// and cross-reference streams.
    pub fn stream_method_for(&self, dict: &Dictionary) -> Result<CryptMethod> {
        match dict.get("Type").and_then(Object::as_name) {
            Some("XRef") => return Ok(CryptMethod::Identity),
            Some("Metadata") if !self.dict.encrypt_metadata => return Ok(CryptMethod::Identity),
            _ => {},
        }

        let first_filter = match dict.get("Filter") {
            Some(Object::Name(name)) => name.as_str(),
            Some(Object::Array(names)) => names.first().and_then(Object::as_name),
            _ => None,
        };
        if first_filter == Some("Crypt") {
            let params = match dict.get("DecodeParms") {
                Some(Object::Array(params)) => params.first().and_then(Object::as_dict),
                Some(other) => other.as_dict(),
                None => None,
            };
            let name = params.and_then(|p| p.get("Name")).and_then(Object::as_name).unwrap_or("Identity");
            return self.dict.crypt_method(Some(name));
        }
        Ok(self.stream_method)
    }

    fn apply(&self, id: ObjectRef, method: CryptMethod, data: &[u8], encrypt: bool) -> Result<Vec<u8>> {
        if method == CryptMethod::Identity {
            return Ok(data.to_vec());
        }
        let key = self.object_key(id, method)?;
        match (method, encrypt) {
            (CryptMethod::V2, _) => Ok(rc4::rc4_crypt(&key, data)),
            (_, true) => aes::encrypt(&key, data),
            (_, false) => aes::decrypt(&key, data),
        }
    }

    /// Decrypt a string belonging to object `id`.
    pub fn decrypt_string(&self, id: ObjectRef, data: &[u8]) -> Result<Vec<u8>> {
        self.apply(id, self.string_method, data, false)
    }

    /// Encrypt a string belonging to object `id`.
    pub fn encrypt_string(&self, id: ObjectRef, data: &[u8]) -> Result<Vec<u8>> {
        self.apply(id, self.string_method, data, true)
    }

    /// Decrypt the raw payload of stream object `id`.
    pub fn decrypt_stream(&self, id: ObjectRef, dict: &Dictionary, data: &[u8]) -> Result<Vec<u8>> {
        self.apply(id, self.stream_method_for(dict)?, data, false)
    }

    /// Encrypt the raw payload of stream object `id`.
    pub fn encrypt_stream(&self, id: ObjectRef, dict: &Dictionary, data: &[u8]) -> Result<Vec<u8>> {
        self.apply(id, self.stream_method_for(dict)?, data, true)
    }

    /// Decrypt every string and stream payload inside `object` in place.
    pub fn decrypt_object(&self, id: ObjectRef, object: &mut Object) -> Result<()> {
        self.walk(id, object, false, 0)
    }

    /// Encrypt every string and stream payload inside `object` in place.
    pub fn encrypt_object(&self, id: ObjectRef, object: &mut Object) -> Result<()> {
        self.walk(id, object, true, 0)
    }

    fn walk(&self, id: ObjectRef, object: &mut Object, encrypt: bool, depth: u32) -> Result<()> {
        if depth > MAX_WALK_DEPTH {
            return Err(Error::RecursionLimitExceeded(MAX_WALK_DEPTH));
        }
        match object {
            Object::String(bytes, format) => {
                *bytes = self.apply(id, self.string_method, bytes, encrypt)?;
                // Ciphertext is binary; the plaintext's own syntax is unknown
                *format = if encrypt { StringFormat::Hexadecimal } else { StringFormat::Literal };
            },
            Object::Array(items) => {
                for item in items {
                    self.walk(id, item, encrypt, depth + 1)?;
                }
            },
            Object::Dictionary(dict) => {
                for value in dict.values_mut() {
                    self.walk(id, value, encrypt, depth + 1)?;
                }
            },
            Object::Stream { dict, data } => {
                // Cross-reference streams are stored entirely in the clear
                if dict.get("Type").and_then(Object::as_name) == Some("XRef") {
                    return Ok(());
                }
                let method = self.stream_method_for(dict)?;
                *data = Bytes::from(self.apply(id, method, data, encrypt)?);
                for value in dict.values_mut() {
                    self.walk(id, value, encrypt, depth + 1)?;
                }
            },
            _ => {},
        }
        Ok(())
    }
}
