//! Standard security handler over a loaded lopdf document.
//!
//! Reads `/Encrypt`, authenticates a password, then decrypts every string
//! and stream in place. Strings nested in dictionaries and arrays are
//! included; the encryption dictionary and cross-reference streams are not.

use lopdf::xref::XrefEntry;
use lopdf::{Dictionary, Document, Object, ObjectId};
use md5::{Digest, Md5};

use super::algorithms::{file_key, PasswordData};
use super::cipher::{aes_cbc_decrypt, rc4};
use super::DecryptFailure;

/// How a class of objects (strings or streams) is encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    /// Left as is
    Identity,
    /// RC4 with a per-object key
    Rc4,
    /// AES-128-CBC with a per-object key
    AesV2,
    /// AES-256-CBC with the file key
    AesV3,
}

/// Parsed `/Encrypt` dictionary of the standard security handler.
#[derive(Debug, Clone)]
pub struct SecurityHandler {
    version: i64,
    password_data: PasswordData,
    strings: CryptMethod,
    streams: CryptMethod,
    encrypt_id: Option<ObjectId>,
}

impl SecurityHandler {
    /// Read the handler from the trailer of `doc`.
    pub fn from_document(doc: &Document) -> Result<Self, DecryptFailure> {
        let entry = doc
            .trailer
            .get(b"Encrypt")
            .map_err(|_| unsupported("trailer has no /Encrypt"))?;
        let encrypt_id = entry.as_reference().ok();
        let dict = match encrypt_id {
            Some(id) => doc.get_object(id).and_then(Object::as_dict),
            None => entry.as_dict(),
        }
        .map_err(|_| unsupported("/Encrypt is not a dictionary"))?;

        let filter = dict.get(b"Filter").and_then(Object::as_name).unwrap_or_default();
        if filter != b"Standard" {
            return Err(unsupported(format!(
                "security handler /{}",
                String::from_utf8_lossy(filter)
            )));
        }

        let version = dict.get(b"V").and_then(Object::as_i64).unwrap_or(0);
        let revision = dict.get(b"R").and_then(Object::as_i64).unwrap_or(0);
        if !(2..=6).contains(&revision) {
            return Err(unsupported(format!("standard handler revision {}", revision)));
        }

        let length_bits = dict.get(b"Length").and_then(Object::as_i64).ok();
        let (strings, streams, key_length) = match version {
            1 => (CryptMethod::Rc4, CryptMethod::Rc4, 5),
            2 => (CryptMethod::Rc4, CryptMethod::Rc4, bits_to_bytes(length_bits.unwrap_or(40))),
            4 => (
                crypt_filter(dict, b"StrF")?,
                crypt_filter(dict, b"StmF")?,
                bits_to_bytes(length_bits.unwrap_or(128)),
            ),
            5 => (crypt_filter(dict, b"StrF")?, crypt_filter(dict, b"StmF")?, 32),
            other => return Err(unsupported(format!("encryption version /V {}", other))),
        };

        let password_data = PasswordData {
            revision: revision as u8,
            key_length,
            owner: byte_string(dict, b"O")?,
            user: byte_string(dict, b"U")?,
            owner_key: byte_string(dict, b"OE").unwrap_or_default(),
            user_key: byte_string(dict, b"UE").unwrap_or_default(),
            permissions: dict.get(b"P").and_then(Object::as_i64).unwrap_or(0) as i32,
            encrypt_metadata: dict
                .get(b"EncryptMetadata")
                .and_then(Object::as_bool)
                .unwrap_or(true),
            file_id: first_file_id(doc),
        };

        Ok(Self {
            version,
            password_data,
            strings,
            streams,
            encrypt_id,
        })
    }

    /// `/V` of the encryption dictionary.
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Method applied to strings and streams, in that order.
    pub fn methods(&self) -> (CryptMethod, CryptMethod) {
        (self.strings, self.streams)
    }

    /// Find the file key for `password`.
    pub fn authenticate(&self, password: &[u8]) -> Result<Vec<u8>, DecryptFailure> {
        match file_key(&self.password_data, password) {
            Ok(Some(key)) => Ok(key),
            Ok(None) => Err(DecryptFailure::WrongPassword),
            Err(reason) => Err(unsupported(reason)),
        }
    }

    /// Decrypt every object of `doc` with `key` and drop `/Encrypt`.
    pub fn decrypt_document(&self, doc: &mut Document, key: &[u8]) -> Result<(), DecryptFailure> {
        // Objects packed in an object stream are dropped by the loader when
        // the container is still encrypted.
        let missing = doc.reference_table.entries.iter().any(|(&num, entry)| {
            matches!(entry, XrefEntry::Compressed { .. }) && !doc.objects.contains_key(&(num, 0))
        });
        if missing {
            return Err(unsupported("objects inside encrypted object streams"));
        }

        let ids: Vec<ObjectId> = doc.objects.keys().copied().collect();
        for id in ids {
            if Some(id) == self.encrypt_id {
                continue;
            }
            let Some(object) = doc.objects.get_mut(&id) else {
                continue;
            };

            match object {
                Object::Stream(stream) => {
                    if stream.dict.type_is(b"XRef") {
                        continue;
                    }
                    self.decrypt_strings_in_dict(&mut stream.dict, id, key)?;

                    let plain_metadata =
                        stream.dict.type_is(b"Metadata") && !self.password_data.encrypt_metadata;
                    if !plain_metadata {
                        let content = self.apply(self.streams, id, key, &stream.content)?;
                        stream.set_content(content);
                    }
                },
                other => self.decrypt_strings(other, id, key)?,
            }
        }

        if let Some(id) = self.encrypt_id {
            doc.objects.remove(&id);
        }
        doc.trailer.remove(b"Encrypt");
        Ok(())
    }

    fn decrypt_strings(&self, object: &mut Object, id: ObjectId, key: &[u8]) -> Result<(), DecryptFailure> {
        match object {
            Object::String(bytes, _) => {
                *bytes = self.apply(self.strings, id, key, bytes)?;
            },
            Object::Array(items) => {
                for item in items.iter_mut() {
                    self.decrypt_strings(item, id, key)?;
                }
            },
            Object::Dictionary(dict) => self.decrypt_strings_in_dict(dict, id, key)?,
            _ => {},
        }
        Ok(())
    }

    fn decrypt_strings_in_dict(
        &self,
        dict: &mut Dictionary,
        id: ObjectId,
        key: &[u8],
    ) -> Result<(), DecryptFailure> {
        for (_, value) in dict.iter_mut() {
            self.decrypt_strings(value, id, key)?;
        }
        Ok(())
    }

    fn apply(&self, method: CryptMethod, id: ObjectId, key: &[u8], data: &[u8]) -> Result<Vec<u8>, DecryptFailure> {
        match method {
            CryptMethod::Identity => Ok(data.to_vec()),
            CryptMethod::Rc4 => Ok(rc4(&object_key(key, id, false), data)),
            CryptMethod::AesV2 => aes_cbc_decrypt(&object_key(key, id, true), data)
                .map_err(|reason| corrupt(id, reason)),
            CryptMethod::AesV3 => aes_cbc_decrypt(key, data).map_err(|reason| corrupt(id, reason)),
        }
    }
}

/// Algorithm 1: per-object key for RC4 and AES-128.
fn object_key(key: &[u8], (num, generation): ObjectId, aes: bool) -> Vec<u8> {
    let mut hasher = Md5::new();
    hasher.update(key);
    hasher.update(&num.to_le_bytes()[..3]);
    hasher.update(generation.to_le_bytes());
    if aes {
        hasher.update(b"sAlT");
    }
    let digest = hasher.finalize();
    digest[..(key.len() + 5).min(16)].to_vec()
}

fn crypt_filter(dict: &Dictionary, entry: &[u8]) -> Result<CryptMethod, DecryptFailure> {
    let name = dict.get(entry).and_then(Object::as_name).unwrap_or(&b"Identity"[..]);
    if name == b"Identity" {
        return Ok(CryptMethod::Identity);
    }

    let method = dict
        .get(b"CF")
        .and_then(Object::as_dict)
        .and_then(|filters| filters.get(name))
        .and_then(Object::as_dict)
        .and_then(|filter| filter.get(b"CFM"))
        .and_then(Object::as_name)
        .unwrap_or(&b"None"[..]);
    match method {
        b"V2" => Ok(CryptMethod::Rc4),
        b"AESV2" => Ok(CryptMethod::AesV2),
        b"AESV3" => Ok(CryptMethod::AesV3),
        other => Err(unsupported(format!(
            "crypt filter method /{}",
            String::from_utf8_lossy(other)
        ))),
    }
}

fn byte_string(dict: &Dictionary, key: &[u8]) -> Result<Vec<u8>, DecryptFailure> {
    dict.get(key)
        .and_then(Object::as_str)
        .map(<[u8]>::to_vec)
        .map_err(|_| unsupported(format!("/{} is missing", String::from_utf8_lossy(key))))
}

fn first_file_id(doc: &Document) -> Vec<u8> {
    doc.trailer
        .get(b"ID")
        .and_then(Object::as_array)
        .ok()
        .and_then(|ids| ids.first())
        .and_then(|id| id.as_str().ok())
        .map(<[u8]>::to_vec)
        .unwrap_or_default()
}

fn bits_to_bytes(bits: i64) -> usize {
    (bits.clamp(40, 128) / 8) as usize
}

fn unsupported(reason: impl Into<String>) -> DecryptFailure {
    DecryptFailure::Unsupported(reason.into())
}

fn corrupt(id: ObjectId, reason: &str) -> DecryptFailure {
    DecryptFailure::Unsupported(format!("object {} {}: {}", id.0, id.1, reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn encrypted_doc(encrypt: Dictionary) -> Document {
        let mut doc = Document::with_version("1.6");
        let id = doc.add_object(encrypt);
        doc.trailer.set("Encrypt", id);
        doc.trailer.set(
            "ID",
            vec![
                Object::string_literal(b"0123456789abcdef".to_vec()),
                Object::string_literal(b"0123456789abcdef".to_vec()),
            ],
        );
        doc
    }

    fn standard(v: i64, r: i64) -> Dictionary {
        dictionary! {
            "Filter" => "Standard",
            "V" => v,
            "R" => r,
            "O" => Object::string_literal(vec![0u8; 32]),
            "U" => Object::string_literal(vec![0u8; 32]),
            "P" => -4,
        }
    }

    #[test]
    fn test_object_key_lengths() {
        assert_eq!(object_key(&[1; 5], (3, 0), false).len(), 10);
        assert_eq!(object_key(&[1; 16], (3, 0), true).len(), 16);
        assert_ne!(object_key(&[1; 16], (3, 0), true), object_key(&[1; 16], (3, 0), false));
    }

    #[test]
    fn test_rc4_handler() {
        let handler = SecurityHandler::from_document(&encrypted_doc(standard(2, 3))).unwrap();
        assert_eq!(handler.version(), 2);
        assert_eq!(handler.methods(), (CryptMethod::Rc4, CryptMethod::Rc4));
        assert_eq!(handler.password_data.key_length, 5);
        assert_eq!(handler.password_data.file_id, b"0123456789abcdef".to_vec());
    }

    #[test]
    fn test_aes_crypt_filters() {
        let mut dict = standard(4, 4);
        dict.set("Length", 128);
        dict.set(
            "CF",
            dictionary! { "StdCF" => dictionary! { "CFM" => "AESV2", "Length" => 16 } },
        );
        dict.set("StmF", "StdCF");
        dict.set("StrF", "StdCF");
        let handler = SecurityHandler::from_document(&encrypted_doc(dict)).unwrap();
        assert_eq!(handler.methods(), (CryptMethod::AesV2, CryptMethod::AesV2));
        assert_eq!(handler.password_data.key_length, 16);
    }

    #[test]
    fn test_missing_filters_default_to_identity() {
        let handler = SecurityHandler::from_document(&encrypted_doc(standard(4, 4))).unwrap();
        assert_eq!(handler.methods(), (CryptMethod::Identity, CryptMethod::Identity));
    }

    #[test]
    fn test_public_key_handler_is_unsupported() {
        let mut dict = standard(4, 4);
        dict.set("Filter", "Adobe.PubSec");
        let err = SecurityHandler::from_document(&encrypted_doc(dict)).unwrap_err();
        assert!(matches!(err, DecryptFailure::Unsupported(ref m) if m.contains("Adobe.PubSec")));
    }

    #[test]
    fn test_unknown_version_and_revision() {
        assert!(SecurityHandler::from_document(&encrypted_doc(standard(3, 3))).is_err());
        assert!(SecurityHandler::from_document(&encrypted_doc(standard(2, 7))).is_err());
    }

    #[test]
    fn test_unknown_crypt_method() {
        let mut dict = standard(4, 4);
        dict.set("CF", dictionary! { "StdCF" => dictionary! { "CFM" => "None" } });
        dict.set("StmF", "StdCF");
        assert!(SecurityHandler::from_document(&encrypted_doc(dict)).is_err());
    }

    #[test]
    fn test_decrypt_nested_strings() {
        let mut doc = encrypted_doc(standard(2, 3));
        let handler = SecurityHandler::from_document(&doc).unwrap();
        let key = [5u8; 5];

        let id = doc.new_object_id();
        let secret = rc4(&object_key(&key, id, false), b"Maria Souza");
        doc.objects.insert(
            id,
            Object::Dictionary(dictionary! {
                "Kids" => vec![Object::Dictionary(dictionary! {
                    "T" => Object::string_literal(secret),
                })],
            }),
        );

        handler.decrypt_document(&mut doc, &key).unwrap();
        assert!(doc.trailer.get(b"Encrypt").is_err());
        let kids = doc.get_object(id).unwrap().as_dict().unwrap().get(b"Kids").unwrap();
        let title = kids.as_array().unwrap()[0].as_dict().unwrap().get(b"T").unwrap();
        assert_eq!(title.as_str().unwrap(), b"Maria Souza");
    }
}
