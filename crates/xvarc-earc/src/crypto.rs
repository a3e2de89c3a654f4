//! Payload decryption using AES-128-CBC.
//!
//! Encrypted entries use a single static key and a per-entry IV recovered from
//! the payload trailer. Data is zero padded; padding is kept in the output.

use cipher::block_padding::NoPadding;
use cipher::generic_array::GenericArray;
use cipher::{BlockDecryptMut, KeyIvInit};

use crate::entry::IV_SIZE;
use crate::{Error, Result};

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// The AES-128 key used for entry payloads.
///
/// Shipped with the game client; not a secret.
pub const PAYLOAD_KEY: [u8; 16] = [
    0x9C, 0x6C, 0x5D, 0x41, 0x15, 0x52, 0x3F, 0x17, 0x5A, 0xD3, 0xF8, 0xB7, 0x75, 0x58, 0x1E, 0xCF,
];

/// AES block size.
const BLOCK_SIZE: usize = 16;

/// Decrypt payload data in place.
///
/// The data length must be a multiple of the AES block size (16 bytes).
pub fn decrypt_in_place(data: &mut [u8], iv: &[u8; IV_SIZE]) -> Result<()> {
    if data.is_empty() {
        return Ok(());
    }

    if data.len() % BLOCK_SIZE != 0 {
        return Err(Error::Decryption(format!(
            "data length {} is not a multiple of {BLOCK_SIZE}",
            data.len()
        )));
    }

    let key = GenericArray::from_slice(&PAYLOAD_KEY);
    let iv = GenericArray::from_slice(iv);

    Aes128CbcDec::new(key, iv)
        .decrypt_padded_mut::<NoPadding>(data)
        .map_err(|_| Error::Decryption("decryption failed".to_string()))?;

    Ok(())
}

/// Decrypt payload data to a new buffer, keeping trailing zero padding.
pub fn decrypt(data: &[u8], iv: &[u8; IV_SIZE]) -> Result<Vec<u8>> {
    let mut buffer = data.to_vec();
    decrypt_in_place(&mut buffer, iv)?;
    Ok(buffer)
}
