//! Standard Security Handler (ISO 32000-1, 7.6.3)

use log::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{PDFResolverError, PDFResult};
use crate::pdf::{Dictionary, Object};
use crate::security::{CryptMethod, SecurityState};
use crate::{EncryptionAlgorithm, Permissions};

/// Validated contents of an `/Encrypt` dictionary
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionDict {
    #[zeroize(skip)]
    pub version: u8,
    #[zeroize(skip)]
    pub revision: u8,
    /// File key length in bytes
    #[zeroize(skip)]
    pub key_length: usize,
    /// First 32 bytes of `/O`
    pub owner_hash: Vec<u8>,
    /// First 32 bytes of `/U`
    pub user_hash: Vec<u8>,
    /// `/P` reinterpreted as unsigned
    #[zeroize(skip)]
    pub permissions: u32,
    #[zeroize(skip)]
    pub encrypt_metadata: bool,
    #[zeroize(skip)]
    pub stream_method: CryptMethod,
    #[zeroize(skip)]
    pub string_method: CryptMethod,
    #[zeroize(skip)]
    pub named_filters: Vec<(String, CryptMethod)>,
}

impl std::fmt::Debug for EncryptionDict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionDict")
            .field("version", &self.version)
            .field("revision", &self.revision)
            .field("key_length", &self.key_length)
            .field("permissions", &format_args!("{:#010x}", self.permissions))
            .field("encrypt_metadata", &self.encrypt_metadata)
            .field("stream_method", &self.stream_method)
            .field("string_method", &self.string_method)
            .finish()
    }
}

impl EncryptionDict {
    /// Validate an encryption dictionary for the Standard handler
    ///
    /// Everything that would prevent decryption is reported here rather
    /// than on first use.
    pub fn from_dict(dict: &Dictionary) -> PDFResult<Self> {
        match dict.get_name("Filter") {
            Some("Standard") => {}
            Some(other) => return Err(PDFResolverError::UnsupportedFilter(other.to_string())),
            None => return Err(PDFResolverError::malformed("encryption dictionary without /Filter")),
        }

        let v = dict.get_integer("V").unwrap_or(0);
        let r = dict
            .get_integer("R")
            .ok_or_else(|| PDFResolverError::malformed("encryption dictionary without /R"))?;
        let (version, revision) = match (v, r) {
            (1, 2) | (1, 3) | (2, 2) | (2, 3) | (4, 4) => (v as u8, r as u8),
            _ => {
                return Err(PDFResolverError::UnsupportedRevision {
                    version: v,
                    revision: r,
                })
            }
        };

        let owner_hash = verification_string(dict, "O")?;
        let user_hash = verification_string(dict, "U")?;
        let permissions = dict
            .get_integer("P")
            .ok_or_else(|| PDFResolverError::malformed("encryption dictionary without /P"))?
            as i32 as u32;
        let encrypt_metadata = dict.get_bool("EncryptMetadata").unwrap_or(true);

        let mut key_length = match version {
            1 => 5,
            _ => key_length_bits(dict.get_integer("Length").unwrap_or(if version == 4 { 128 } else { 40 }))?,
        };

        let (stream_method, string_method, named_filters) = if version == 4 {
            let filters = crypt_filters(dict)?;
            let (stream_method, stream_len) = select_filter(dict, "StmF", &filters)?;
            let (string_method, string_len) = select_filter(dict, "StrF", &filters)?;
            match (stream_len, string_len) {
                (Some(a), Some(b)) if a != b => {
                    return Err(PDFResolverError::malformed(format!(
                        "stream and string crypt filters disagree on key length ({} vs {})",
                        a, b
                    )))
                }
                (Some(len), _) | (None, Some(len)) => key_length = len,
                (None, None) => {}
            }
            let methods = filters.into_iter().map(|(name, method, _)| (name, method)).collect();
            (stream_method, string_method, methods)
        } else {
            (CryptMethod::RC4, CryptMethod::RC4, Vec::new())
        };

        // Revision 2 only knows 40-bit keys.
        if revision == 2 {
            key_length = 5;
        }
        if !(5..=16).contains(&key_length) {
            return Err(PDFResolverError::UnsupportedKeyLength(key_length));
        }
        if (stream_method == CryptMethod::AESV2 || string_method == CryptMethod::AESV2)
            && key_length != 16
        {
            return Err(PDFResolverError::UnsupportedKeyLength(key_length));
        }

        Ok(Self {
            version,
            revision,
            key_length,
            owner_hash,
            user_hash,
            permissions,
            encrypt_metadata,
            stream_method,
            string_method,
            named_filters,
        })
    }

    pub fn algorithm(&self) -> EncryptionAlgorithm {
        if self.stream_method == CryptMethod::AESV2 || self.string_method == CryptMethod::AESV2 {
            EncryptionAlgorithm::AES_128
        } else if self.key_length == 5 {
            EncryptionAlgorithm::RC4_40
        } else {
            EncryptionAlgorithm::RC4_128
        }
    }
}

/// `/O` or `/U`; longer values are cut to the 32 bytes R2 to R4 use
fn verification_string(dict: &Dictionary, key: &str) -> PDFResult<Vec<u8>> {
    match dict.get_string(key) {
        Some(bytes) if bytes.len() >= 32 => Ok(bytes[..32].to_vec()),
        Some(bytes) => Err(PDFResolverError::malformed(format!(
            "/{} is {} bytes, expected 32",
            key,
            bytes.len()
        ))),
        None => Err(PDFResolverError::malformed(format!(
            "encryption dictionary without /{}",
            key
        ))),
    }
}

fn key_length_bits(bits: i64) -> PDFResult<usize> {
    if bits % 8 != 0 || !(40..=128).contains(&bits) {
        return Err(PDFResolverError::invalid_dict_value(
            "Length",
            format!("{} is not a multiple of 8 between 40 and 128", bits),
        ));
    }
    Ok((bits / 8) as usize)
}

/// Entries of `/CF` as `(name, method, key length in bytes)`
fn crypt_filters(dict: &Dictionary) -> PDFResult<Vec<(String, CryptMethod, Option<usize>)>> {
    let cf = match dict.get("CF") {
        None => return Ok(Vec::new()),
        Some(Object::Dictionary(cf)) => cf,
        Some(other) => {
            return Err(PDFResolverError::invalid_dict_value(
                "CF",
                format!("expected dictionary, found {}", other.type_name()),
            ))
        }
    };

    let mut filters = Vec::with_capacity(cf.len());
    for (name, value) in cf.iter() {
        let entry = value.expect_dict()?;
        let method = match entry.get_name("CFM").unwrap_or("None") {
            "None" => CryptMethod::None,
            "V2" => CryptMethod::RC4,
            "AESV2" => CryptMethod::AESV2,
            other => return Err(PDFResolverError::UnsupportedCryptMethod(other.to_string())),
        };
        // Producers disagree on bits or bytes here.
        let length = entry.get_integer("Length").map(|len| {
            if len > 16 {
                (len / 8) as usize
            } else {
                len.max(0) as usize
            }
        });
        filters.push((name.clone(), method, length));
    }
    Ok(filters)
}

fn select_filter(
    dict: &Dictionary,
    key: &str,
    filters: &[(String, CryptMethod, Option<usize>)],
) -> PDFResult<(CryptMethod, Option<usize>)> {
    let name = dict.get_name(key).unwrap_or("Identity");
    if name == "Identity" {
        return Ok((CryptMethod::None, None));
    }
    filters
        .iter()
        .find(|(n, _, _)| n == name)
        .map(|(_, method, length)| match method {
            CryptMethod::None => (CryptMethod::None, None),
            _ => (*method, *length),
        })
        .ok_or_else(|| {
            PDFResolverError::malformed(format!("/{} names unknown crypt filter /{}", key, name))
        })
}

/// Standard security handler for password-based encryption
#[derive(Debug, Clone)]
pub struct StandardSecurityHandler {
    pub(crate) dict: EncryptionDict,
    /// First element of the trailer `/ID`
    pub(crate) file_id: Vec<u8>,
}

impl StandardSecurityHandler {
    pub fn new(dict: &Dictionary, file_id: &[u8]) -> PDFResult<Self> {
        let dict = EncryptionDict::from_dict(dict)?;
        debug!("Standard security handler: {:?}", dict);
        Ok(Self {
            dict,
            file_id: file_id.to_vec(),
        })
    }

    /// Try the password as user password, then as owner password
    pub fn authenticate_password(&self, password: &[u8]) -> PDFResult<SecurityState> {
        let file_key = match self.authenticate_user_password(password) {
            Ok(key) => {
                info!("Authenticated with user password");
                key
            }
            Err(PDFResolverError::AuthenticationFailed) => {
                let key = self.authenticate_owner_password(password)?;
                info!("Authenticated with owner password");
                key
            }
            Err(e) => return Err(e),
        };

        Ok(SecurityState::new(
            file_key.to_vec(),
            self.dict.stream_method,
            self.dict.string_method,
            self.dict.revision,
            self.dict.encrypt_metadata,
        )
        .with_named_filters(self.dict.named_filters.clone()))
    }

    pub fn dict(&self) -> &EncryptionDict {
        &self.dict
    }

    pub fn algorithm(&self) -> EncryptionAlgorithm {
        self.dict.algorithm()
    }

    pub fn permissions(&self) -> Permissions {
        Permissions::new(self.dict.permissions)
    }

    pub fn revision(&self) -> u8 {
        self.dict.revision
    }
}
