//! RC4 provider implementation

use ::rc4::consts::{U1, U10, U11, U12, U13, U14, U15, U16, U2, U3, U4, U5, U6, U7, U8, U9};
use ::rc4::{KeyInit, Rc4, StreamCipher};

use super::CryptoProvider;
use crate::error::{PDFResolverError, PDFResult};

// `Rc4` fixes its key size in the type, so pick the instantiation at runtime.
macro_rules! rc4_dispatch {
    ($key:expr, $data:expr, $($len:literal => $size:ty),+ $(,)?) => {
        match $key.len() {
            $(
                $len => {
                    let mut cipher = Rc4::<$size>::new_from_slice($key)
                        .map_err(|_| PDFResolverError::InvalidKeyLength($key.len()))?;
                    cipher.apply_keystream($data);
                }
            )+
            other => return Err(PDFResolverError::InvalidKeyLength(other)),
        }
    };
}

/// Apply the RC4 keystream for `key` to `data` in place
///
/// Keys of 1 to 16 bytes are accepted, which covers every key the
/// Standard handler derives.
pub fn rc4_apply(key: &[u8], data: &mut [u8]) -> PDFResult<()> {
    rc4_dispatch!(key, data,
        1 => U1, 2 => U2, 3 => U3, 4 => U4,
        5 => U5, 6 => U6, 7 => U7, 8 => U8,
        9 => U9, 10 => U10, 11 => U11, 12 => U12,
        13 => U13, 14 => U14, 15 => U15, 16 => U16,
    );
    Ok(())
}

/// RC4 decryption provider
#[derive(Debug, Default, Clone, Copy)]
pub struct RC4Provider;

impl CryptoProvider for RC4Provider {
    fn decrypt(&self, data: &[u8], key: &[u8]) -> PDFResult<Vec<u8>> {
        let mut output = data.to_vec();
        rc4_apply(key, &mut output)?;
        Ok(output)
    }
}
