//! Password checks and file-key derivation for the standard security handler.
//!
//! Revisions 2-4 derive an MD5-based key (ISO 32000-1 §7.6.3.3, algorithms
//! 2 through 7). Revisions 5 and 6 store the file key wrapped under a
//! SHA-2 based password hash (ISO 32000-2 §7.6.4.3).

use md5::{Digest, Md5};
use sha2::{Sha256, Sha384, Sha512};

use super::cipher::{aes128_cbc_encrypt_raw, cbc_decrypt_raw, rc4};

/// Padding string appended to short passwords.
const PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// Values from the encryption dictionary and trailer that feed the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordData {
    /// `/R`
    pub revision: u8,
    /// File key length in bytes (5..=16 for revisions 2-4, 32 above)
    pub key_length: usize,
    /// `/O`
    pub owner: Vec<u8>,
    /// `/U`
    pub user: Vec<u8>,
    /// `/OE`, revisions 5 and 6
    pub owner_key: Vec<u8>,
    /// `/UE`, revisions 5 and 6
    pub user_key: Vec<u8>,
    /// `/P`
    pub permissions: i32,
    /// `/EncryptMetadata`
    pub encrypt_metadata: bool,
    /// First element of the trailer `/ID`
    pub file_id: Vec<u8>,
}

/// Recover the file key from `password`, trying it as the user password
/// and then as the owner password. `None` means neither matched.
pub fn file_key(data: &PasswordData, password: &[u8]) -> Result<Option<Vec<u8>>, &'static str> {
    if data.revision >= 5 {
        return sha_file_key(data, password);
    }

    let padded = pad_password(password);
    if let Some(key) = md5_user_key(data, &padded) {
        log::debug!("Password accepted as user password");
        return Ok(Some(key));
    }

    let recovered = recover_user_password(data, password);
    let key = md5_user_key(data, &recovered);
    if key.is_some() {
        log::debug!("Password accepted as owner password");
    }
    Ok(key)
}

fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = PADDING;
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PADDING[..32 - len]);
    padded
}

fn md5_key_length(data: &PasswordData) -> usize {
    if data.revision == 2 {
        5
    } else {
        data.key_length.clamp(5, 16)
    }
}

/// Algorithm 2: key from a padded password.
fn derive_md5_key(data: &PasswordData, padded: &[u8; 32]) -> Vec<u8> {
    let n = md5_key_length(data);

    let mut hasher = Md5::new();
    hasher.update(padded);
    hasher.update(&data.owner[..data.owner.len().min(32)]);
    hasher.update(data.permissions.to_le_bytes());
    hasher.update(&data.file_id);
    if data.revision >= 4 && !data.encrypt_metadata {
        hasher.update([0xFF; 4]);
    }
    let mut digest = hasher.finalize().to_vec();

    if data.revision >= 3 {
        for _ in 0..50 {
            digest = Md5::digest(&digest[..n]).to_vec();
        }
    }
    digest.truncate(n);
    digest
}

/// Algorithms 4-6: derive the key and confirm it against `/U`.
fn md5_user_key(data: &PasswordData, padded: &[u8; 32]) -> Option<Vec<u8>> {
    let key = derive_md5_key(data, padded);

    let matches = if data.revision == 2 {
        data.user.get(..32) == Some(&rc4(&key, &PADDING)[..])
    } else {
        let mut hasher = Md5::new();
        hasher.update(PADDING);
        hasher.update(&data.file_id);
        let mut check = rc4(&key, &hasher.finalize());
        for i in 1..=19u8 {
            check = rc4(&xor_key(&key, i), &check);
        }
        data.user.get(..16) == Some(&check[..16])
    };

    matches.then_some(key)
}

/// Algorithm 7: decrypt `/O` with the owner password to get the padded
/// user password back.
fn recover_user_password(data: &PasswordData, owner_password: &[u8]) -> [u8; 32] {
    let n = md5_key_length(data);
    let mut digest = Md5::digest(pad_password(owner_password)).to_vec();
    if data.revision >= 3 {
        for _ in 0..50 {
            digest = Md5::digest(&digest).to_vec();
        }
    }
    let key = &digest[..n];

    let mut user = data.owner[..data.owner.len().min(32)].to_vec();
    if data.revision == 2 {
        user = rc4(key, &user);
    } else {
        for i in (0..=19u8).rev() {
            user = rc4(&xor_key(key, i), &user);
        }
    }

    let mut padded = PADDING;
    let len = user.len().min(32);
    padded[..len].copy_from_slice(&user[..len]);
    padded
}

fn xor_key(key: &[u8], value: u8) -> Vec<u8> {
    key.iter().map(|b| b ^ value).collect()
}

/// Revisions 5 and 6: check the password against `/U` then `/O`, and unwrap
/// `/UE` or `/OE` with the matching intermediate key.
fn sha_file_key(data: &PasswordData, password: &[u8]) -> Result<Option<Vec<u8>>, &'static str> {
    if data.user.len() < 48 || data.owner.len() < 48 {
        return Err("/U and /O must hold 48 bytes");
    }
    let password = &password[..password.len().min(127)];
    let user = &data.user[..48];
    let owner = &data.owner[..48];
    let zero_iv = [0u8; 16];

    if hash(data.revision, password, &user[32..40], &[])? == user[..32] {
        let intermediate = hash(data.revision, password, &user[40..48], &[])?;
        let wrapped = data.user_key.get(..32).ok_or("/UE must hold 32 bytes")?;
        log::debug!("Password accepted as user password");
        return cbc_decrypt_raw(&intermediate, &zero_iv, wrapped).map(Some);
    }

    if hash(data.revision, password, &owner[32..40], user)? == owner[..32] {
        let intermediate = hash(data.revision, password, &owner[40..48], user)?;
        let wrapped = data.owner_key.get(..32).ok_or("/OE must hold 32 bytes")?;
        log::debug!("Password accepted as owner password");
        return cbc_decrypt_raw(&intermediate, &zero_iv, wrapped).map(Some);
    }

    Ok(None)
}

/// Plain SHA-256 for revision 5, algorithm 2.B for revision 6.
fn hash(revision: u8, password: &[u8], salt: &[u8], user: &[u8]) -> Result<[u8; 32], &'static str> {
    let mut k = Sha256::new()
        .chain_update(password)
        .chain_update(salt)
        .chain_update(user)
        .finalize()
        .to_vec();

    if revision >= 6 {
        let mut round = 0u32;
        loop {
            let mut block = Vec::with_capacity(64 * (password.len() + k.len() + user.len()));
            for _ in 0..64 {
                block.extend_from_slice(password);
                block.extend_from_slice(&k);
                block.extend_from_slice(user);
            }
            let e = aes128_cbc_encrypt_raw(&k[..16], &k[16..32], &block)?;

            let selector = e[..16].iter().map(|&b| u32::from(b)).sum::<u32>() % 3;
            k = match selector {
                0 => Sha256::digest(&e).to_vec(),
                1 => Sha384::digest(&e).to_vec(),
                _ => Sha512::digest(&e).to_vec(),
            };

            round += 1;
            let last = e.last().copied().map(u32::from).unwrap_or(0);
            if round >= 64 && last + 32 <= round {
                break;
            }
        }
    }

    let mut out = [0u8; 32];
    out.copy_from_slice(&k[..32]);
    Ok(out)
}
