//! Decoding of the database password stored by the DJ software's agent.
//!
//! The `dp` option holds base64 of the password encrypted with Blowfish in
//! ECB mode under a fixed application key, PKCS#5 padded.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use blowfish::Blowfish;
use ecb::cipher::block_padding::Pkcs7;
use ecb::cipher::{BlockDecryptMut, KeyInit};

use crate::errors::{Result, SettingsError};

/// Fixed key the agent uses for the stored password.
pub const AGENT_KEY: &[u8] = b"ZOwUlUZYqe9Rdm6j";

const BLOCK: usize = 8;

type BlowfishEcbDec = ecb::Decryptor<Blowfish>;

/// Decode and decrypt a stored `dp` value into the plain password.
pub fn decrypt_password(encoded: &str) -> Result<String> {
    let mut data = STANDARD
        .decode(encoded.trim())
        .map_err(|e| SettingsError::InvalidCredential(format!("base64: {e}")))?;

    if data.is_empty() || data.len() % BLOCK != 0 {
        return Err(SettingsError::InvalidCredential(format!(
            "ciphertext length {} is not a multiple of {BLOCK}",
            data.len()
        )));
    }

    let plain = BlowfishEcbDec::new_from_slice(AGENT_KEY)
        .map_err(|_| SettingsError::InvalidCredential("bad key length".into()))?
        .decrypt_padded_mut::<Pkcs7>(&mut data)
        .map_err(|_| SettingsError::InvalidCredential("bad padding".into()))?;
    let text = std::str::from_utf8(plain)
        .map_err(|_| SettingsError::InvalidCredential("password is not UTF-8".into()))?;
    Ok(text.trim().to_string())
}
