//! Encrypted seed phrases and their HD key hierarchies
//!
//! Seed blobs are base64 `AES-256-CBC(PKCS#7, zero IV)` ciphertexts of a
//! normalised BIP39 mnemonic. The AES key comes from PBKDF2-HMAC-SHA256 over
//! the salt-prefixed root password and is derived once per session into a
//! [`SessionKey`], which callers pass by reference.
//!
//! Plaintext password and mnemonic only live inside [`Zeroizing`] buffers
//! for the duration of [`SeedVault::open`] / [`encrypt_seed`].

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bip39::{Language, Mnemonic};
use coins_bip32::path::DerivationPath;
use coins_bip32::prelude::*;
use k256::ecdsa::SigningKey;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{Error, Result};

/// Fixed salt, also prefixed to the password before key derivation
pub const SEED_SALT: &str = "!%Fr3nchXc0re+Aut0C0mp0und3r!$";

/// PBKDF2 iteration count
pub const KDF_ITERATIONS: u32 = 65_536;

/// Account-level BIP44 path (coin type 118); address index is appended
pub const HD_ACCOUNT_PATH: &str = "m/44'/118'/0'/0";

const KEY_LENGTH: usize = 32;
const ZERO_IV: [u8; 16] = [0u8; 16];

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AES-256 key derived from the root password
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_LENGTH]);

impl SessionKey {
    /// Run the (slow) password KDF; call once per session
    pub fn derive(password: &str) -> Self {
        let mut material = Zeroizing::new(String::with_capacity(SEED_SALT.len() + password.len()));
        material.push_str(SEED_SALT);
        material.push_str(password);

        let mut key = [0u8; KEY_LENGTH];
        pbkdf2_hmac::<Sha256>(
            material.as_bytes(),
            SEED_SALT.as_bytes(),
            KDF_ITERATIONS,
            &mut key,
        );

        Self(key)
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Collapse whitespace runs and lower-case a seed phrase
pub fn normalize_mnemonic(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Encrypt a seed phrase into the base64 blob format read by [`SeedVault`]
pub fn encrypt_seed(key: &SessionKey, phrase: &str) -> Result<String> {
    let normalized = Zeroizing::new(normalize_mnemonic(phrase));
    Mnemonic::parse_in(Language::English, normalized.as_str())
        .map_err(|e| Error::KeyDerivation(format!("Invalid seed phrase: {}", e)))?;

    let cipher = Aes256CbcEnc::new_from_slices(key.as_bytes(), &ZERO_IV)
        .map_err(|e| Error::Internal(format!("AES key setup: {}", e)))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(normalized.as_bytes());

    Ok(STANDARD.encode(ciphertext))
}

/// Decrypt one blob back into its normalised mnemonic
pub fn decrypt_seed(key: &SessionKey, blob: &str) -> Result<Zeroizing<String>> {
    let ciphertext = STANDARD
        .decode(blob.trim())
        .map_err(|e| Error::Decryption(format!("seed is not valid base64: {}", e)))?;

    let cipher = Aes256CbcDec::new_from_slices(key.as_bytes(), &ZERO_IV)
        .map_err(|e| Error::Internal(format!("AES key setup: {}", e)))?;
    let plaintext = Zeroizing::new(
        cipher
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| Error::Decryption("wrong password or corrupted seed".to_string()))?,
    );

    let phrase = std::str::from_utf8(&plaintext)
        .map_err(|_| Error::Decryption("wrong password or corrupted seed".to_string()))?;

    Ok(Zeroizing::new(normalize_mnemonic(phrase)))
}

/// One decrypted seed phrase: master key plus account-level hierarchy
pub struct SeedUnit {
    account_root: XPriv,
    resolved_index: Option<u32>,
}

impl SeedUnit {
    /// Build the hierarchy from a mnemonic phrase
    pub fn from_mnemonic(phrase: &str) -> Result<Self> {
        let normalized = Zeroizing::new(normalize_mnemonic(phrase));
        let mnemonic = Mnemonic::parse_in(Language::English, normalized.as_str())
            .map_err(|e| Error::Decryption(format!("decrypted text is not a mnemonic: {}", e)))?;

        let seed = Zeroizing::new(mnemonic.to_seed(""));

        let master = XPriv::root_from_seed(seed.as_slice(), None)
            .map_err(|e| Error::KeyDerivation(format!("master key: {}", e)))?;

        let path = HD_ACCOUNT_PATH
            .parse::<DerivationPath>()
            .map_err(|e| Error::KeyDerivation(format!("invalid path {}: {}", HD_ACCOUNT_PATH, e)))?;

        let account_root = master
            .derive_path(&path)
            .map_err(|e| Error::KeyDerivation(format!("{}: {}", HD_ACCOUNT_PATH, e)))?;

        Ok(Self {
            account_root,
            resolved_index: None,
        })
    }

    /// Private key at `m/44'/118'/0'/0/{index}`
    pub fn derive(&self, index: u32) -> Result<SigningKey> {
        let child = self
            .account_root
            .derive_child(index)
            .map_err(|e| Error::KeyDerivation(format!("{}/{}: {}", HD_ACCOUNT_PATH, index, e)))?;

        let key: &SigningKey = child.as_ref();
        Ok(key.clone())
    }

    /// Index fixed by the last successful delegator resolution
    pub fn resolved_index(&self) -> Option<u32> {
        self.resolved_index
    }

    pub(crate) fn set_resolved_index(&mut self, index: Option<u32>) {
        self.resolved_index = index;
    }
}

impl std::fmt::Debug for SeedUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedUnit")
            .field("resolved_index", &self.resolved_index)
            .finish_non_exhaustive()
    }
}

/// All seed units of a session
#[derive(Debug, Default)]
pub struct SeedVault {
    units: Vec<SeedUnit>,
}

impl SeedVault {
    /// Decrypt every blob with one password
    ///
    /// Any failure is fatal: a wrong password or corrupted blob aborts the
    /// whole vault rather than silently dropping a seed.
    pub fn open(password: Zeroizing<String>, blobs: &[String]) -> Result<Self> {
        if blobs.is_empty() {
            return Err(Error::Config("no encrypted seed phrases supplied".to_string()));
        }

        let key = SessionKey::derive(password.as_str());
        drop(password);

        let mut units = Vec::with_capacity(blobs.len());
        for (i, blob) in blobs.iter().enumerate() {
            let phrase = decrypt_seed(&key, blob)?;
            units.push(SeedUnit::from_mnemonic(phrase.as_str())?);
            debug!("Seed #{} decrypted", i);
        }

        info!("Decrypted {} seed phrase(s)", units.len());
        Ok(Self { units })
    }

    /// Vault over already-built units
    pub fn from_units(units: Vec<SeedUnit>) -> Self {
        Self { units }
    }

    pub fn units(&self) -> &[SeedUnit] {
        &self.units
    }

    pub fn units_mut(&mut self) -> &mut [SeedUnit] {
        &mut self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const TEST_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon \
         abandon abandon abandon abandon abandon about";

    pub(crate) const OTHER_MNEMONIC: &str = "legal winner thank year wave sausage worth useful \
         legal winner thank yellow";

    #[test]
    fn test_normalize_mnemonic() {
        assert_eq!(
            normalize_mnemonic("  Legal   WINNER\tthank \n year "),
            "legal winner thank year"
        );
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let key = SessionKey::derive("correct horse");
        let blob = encrypt_seed(&key, "  ABANDON abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon   About").unwrap();

        let phrase = decrypt_seed(&key, &blob).unwrap();
        assert_eq!(phrase.as_str(), normalize_mnemonic(TEST_MNEMONIC));
    }

    #[test]
    fn test_decrypts_existing_blob() {
        // PBKDF2 over salt||password, AES-256-CBC, zero IV
        let blob = "Sd8AUqj93lD/ADOLIPXwsN0bK7yRx1QOXw+hZ351wC3TfnZa/AlwKLDbogR2x0RN9OInOYy9iqZfs2z/wDDOk7JfAfUFfWCSTFnEaQEDb7c=";

        let phrase = decrypt_seed(&SessionKey::derive("hunter2"), blob).unwrap();
        assert_eq!(phrase.as_str(), OTHER_MNEMONIC);

        let vault = SeedVault::open(Zeroizing::new("hunter2".to_string()), &[blob.to_string()]);
        assert_eq!(vault.unwrap().len(), 1);
    }

    #[test]
    fn test_known_address_at_index_zero() {
        let prefixes = crate::wallet::AddressPrefixes::new("cosmos", "cosmosvaloper");
        let key = SeedUnit::from_mnemonic(TEST_MNEMONIC).unwrap().derive(0).unwrap();

        assert_eq!(
            prefixes.delegator_address(&key).unwrap(),
            "cosmos19rl4cm2hmr8afy4kldpxz3fka4jguq0auqdal4"
        );
    }

    #[test]
    fn test_wrong_password_fails() {
        let blob = encrypt_seed(&SessionKey::derive("correct horse"), TEST_MNEMONIC).unwrap();

        let result = SeedVault::open(Zeroizing::new("battery staple".to_string()), &[blob]);
        assert!(matches!(result, Err(Error::Decryption(_))));
    }

    #[test]
    fn test_corrupted_blob_fails() {
        let key = SessionKey::derive("pw");
        assert!(matches!(
            decrypt_seed(&key, "not base64 !!"),
            Err(Error::Decryption(_))
        ));
    }

    #[test]
    fn test_open_vault() {
        let key = SessionKey::derive("pw");
        let blobs = vec![
            encrypt_seed(&key, TEST_MNEMONIC).unwrap(),
            encrypt_seed(&key, OTHER_MNEMONIC).unwrap(),
        ];

        let vault = SeedVault::open(Zeroizing::new("pw".to_string()), &blobs).unwrap();
        assert_eq!(vault.len(), 2);
        assert!(vault.units().iter().all(|u| u.resolved_index().is_none()));
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let unit = SeedUnit::from_mnemonic(TEST_MNEMONIC).unwrap();

        let a = unit.derive(3).unwrap();
        let b = unit.derive(3).unwrap();
        let c = unit.derive(4).unwrap();

        assert_eq!(a.to_bytes(), b.to_bytes());
        assert_ne!(a.to_bytes(), c.to_bytes());
    }

    #[test]
    fn test_rejects_non_mnemonic() {
        assert!(SeedUnit::from_mnemonic("hello world").is_err());
        assert!(encrypt_seed(&SessionKey::derive("pw"), "hello world").is_err());
    }
}
