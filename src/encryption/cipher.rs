//! Block and stream ciphers used by the standard security handler.
//!
//! ISO 32000-1 §7.6.2: RC4 for V 1/2 and the `/V2` crypt filter, AES-CBC with
//! the IV stored in front of the ciphertext for `/AESV2` and `/AESV3`.

use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes256};

type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const BLOCK: usize = 16;

/// RC4 keystream XOR. Symmetric, so it both encrypts and decrypts.
pub fn rc4(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut s: [u8; 256] = std::array::from_fn(|i| i as u8);
    if key.is_empty() {
        return data.to_vec();
    }

    let mut j = 0u8;
    for i in 0..256 {
        j = j.wrapping_add(s[i]).wrapping_add(key[i % key.len()]);
        s.swap(i, j as usize);
    }

    let (mut i, mut j) = (0u8, 0u8);
    data.iter()
        .map(|byte| {
            i = i.wrapping_add(1);
            j = j.wrapping_add(s[i as usize]);
            s.swap(i as usize, j as usize);
            let k = s[i as usize].wrapping_add(s[j as usize]);
            byte ^ s[k as usize]
        })
        .collect()
}

/// Decrypt a string or stream body whose first 16 bytes are the IV, then
/// strip PKCS#7 padding. The key length picks AES-128 or AES-256.
pub fn aes_cbc_decrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>, &'static str> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    if data.len() < BLOCK {
        return Err("AES data shorter than its IV");
    }
    let (iv, body) = data.split_at(BLOCK);
    if body.is_empty() {
        return Ok(Vec::new());
    }

    let plain = cbc_decrypt_raw(key, iv, body)?;
    let pad = plain.last().copied().unwrap_or(0) as usize;
    if pad == 0 || pad > BLOCK || pad > plain.len() {
        return Err("invalid PKCS#7 padding");
    }
    let keep = plain.len() - pad;
    if plain[keep..].iter().any(|&b| b as usize != pad) {
        return Err("invalid PKCS#7 padding");
    }
    Ok(plain[..keep].to_vec())
}

/// CBC decrypt without padding removal. `data` must be whole blocks.
pub fn cbc_decrypt_raw(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, &'static str> {
    if data.len() % BLOCK != 0 {
        return Err("AES data is not a whole number of blocks");
    }

    let mut buffer = data.to_vec();
    match key.len() {
        16 => {
            Aes128CbcDec::new_from_slices(key, iv)
                .map_err(|_| "bad AES-128 key or IV")?
                .decrypt_padded_mut::<NoPadding>(&mut buffer)
                .map_err(|_| "AES-128 decryption failed")?;
        },
        32 => {
            Aes256CbcDec::new_from_slices(key, iv)
                .map_err(|_| "bad AES-256 key or IV")?
                .decrypt_padded_mut::<NoPadding>(&mut buffer)
                .map_err(|_| "AES-256 decryption failed")?;
        },
        _ => return Err("AES key must be 16 or 32 bytes"),
    }
    Ok(buffer)
}

/// AES-128-CBC encrypt without padding. Only the revision 6 password hash
/// encrypts, and its input is always whole blocks.
pub fn aes128_cbc_encrypt_raw(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, &'static str> {
    if data.len() % BLOCK != 0 {
        return Err("AES data is not a whole number of blocks");
    }

    let mut buffer = data.to_vec();
    let len = buffer.len();
    Aes128CbcEnc::new_from_slices(key, iv)
        .map_err(|_| "bad AES-128 key or IV")?
        .encrypt_padded_mut::<NoPadding>(&mut buffer, len)
        .map_err(|_| "AES-128 encryption failed")?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rc4_known_vector() {
        // Key "Key", plaintext "Plaintext"
        let out = rc4(b"Key", b"Plaintext");
        assert_eq!(out, vec![0xBB, 0xF3, 0x16, 0xE8, 0xD9, 0x40, 0xAF, 0x0A, 0xD3]);
        assert_eq!(rc4(b"Key", &out), b"Plaintext".to_vec());
    }

    #[test]
    fn test_aes_roundtrip_with_padding() {
        let key = [7u8; 16];
        let iv = [9u8; 16];
        let mut padded = b"Case 0042".to_vec();
        padded.extend(std::iter::repeat(7u8).take(7));

        let mut data = iv.to_vec();
        data.extend(aes128_cbc_encrypt_raw(&key, &iv, &padded).unwrap());
        assert_eq!(aes_cbc_decrypt(&key, &data).unwrap(), b"Case 0042".to_vec());
    }

    #[test]
    fn test_aes_rejects_partial_block() {
        let mut data = vec![0u8; 16];
        data.extend([1u8; 5]);
        assert!(aes_cbc_decrypt(&[0u8; 16], &data).is_err());
        assert!(aes_cbc_decrypt(&[0u8; 16], &[1, 2, 3]).is_err());
    }

    #[test]
    fn test_aes_bad_key_length() {
        assert!(cbc_decrypt_raw(&[0u8; 5], &[0u8; 16], &[0u8; 16]).is_err());
    }

    #[test]
    fn test_iv_only_is_empty() {
        assert_eq!(aes_cbc_decrypt(&[0u8; 32], &[0u8; 16]).unwrap(), Vec::<u8>::new());
    }
}
