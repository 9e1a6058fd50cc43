//! AES-128-CBC provider implementation

use ::aes::cipher::{generic_array::GenericArray, BlockDecrypt, KeyInit};
use ::aes::{Aes128, Block};

use super::CryptoProvider;
use crate::error::{PDFResolverError, PDFResult};

const BLOCK_SIZE: usize = 16;

/// AES-128 decryption provider
///
/// Payloads carry a 16-byte IV prefix followed by CBC ciphertext whose
/// plaintext ends in PKCS#7 padding.
#[derive(Debug, Default, Clone, Copy)]
pub struct AESProvider;

impl AESProvider {
    fn decrypt_cbc(cipher: &Aes128, iv: &[u8], body: &[u8]) -> Vec<u8> {
        let mut output = body.to_vec();
        let mut prev_block = Block::clone_from_slice(iv);

        for chunk in output.chunks_exact_mut(BLOCK_SIZE) {
            let saved_block = Block::clone_from_slice(chunk);
            cipher.decrypt_block(GenericArray::from_mut_slice(chunk));

            for (b, p) in chunk.iter_mut().zip(prev_block.iter()) {
                *b ^= p;
            }
            prev_block = saved_block;
        }

        output
    }
}

impl CryptoProvider for AESProvider {
    fn decrypt(&self, data: &[u8], key: &[u8]) -> PDFResult<Vec<u8>> {
        if key.len() != BLOCK_SIZE {
            return Err(PDFResolverError::InvalidKeyLength(key.len()));
        }
        if data.len() < BLOCK_SIZE {
            return Err(PDFResolverError::invalid_length("AES initialization vector"));
        }

        let (iv, body) = data.split_at(BLOCK_SIZE);
        if body.is_empty() {
            return Ok(Vec::new());
        }
        if body.len() % BLOCK_SIZE != 0 {
            return Err(PDFResolverError::invalid_length("AES ciphertext block alignment"));
        }

        let cipher = Aes128::new_from_slice(key)
            .map_err(|_| PDFResolverError::InvalidKeyLength(key.len()))?;
        let mut plain = Self::decrypt_cbc(&cipher, iv, body);

        let pad = plain[plain.len() - 1];
        if pad == 0 || pad as usize > BLOCK_SIZE || pad as usize > plain.len() {
            return Err(PDFResolverError::InvalidPadding(pad));
        }
        plain.truncate(plain.len() - pad as usize);
        Ok(plain)
    }
}

/// CBC-encrypt already block-aligned data, no padding added
#[cfg(test)]
pub(crate) fn encrypt_blocks(key: &[u8], iv: &[u8], data: &[u8]) -> Vec<u8> {
    use ::aes::cipher::BlockEncrypt;

    let cipher = Aes128::new_from_slice(key).unwrap();
    let mut output = iv.to_vec();
    let mut prev_block = Block::clone_from_slice(iv);

    for chunk in data.chunks(BLOCK_SIZE) {
        let mut block = Block::clone_from_slice(chunk);
        for (b, p) in block.iter_mut().zip(prev_block.iter()) {
            *b ^= p;
        }
        cipher.encrypt_block(&mut block);
        output.extend_from_slice(&block);
        prev_block = block;
    }

    output
}

/// CBC-encrypt with PKCS#7 padding, IV prepended
#[cfg(test)]
pub(crate) fn encrypt_padded(key: &[u8], iv: &[u8], data: &[u8]) -> Vec<u8> {
    let pad = BLOCK_SIZE - data.len() % BLOCK_SIZE;
    let mut padded = data.to_vec();
    padded.extend(std::iter::repeat(pad as u8).take(pad));
    encrypt_blocks(key, iv, &padded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::{thread_rng, RngCore};
    use rstest::rstest;

    fn random_iv() -> [u8; 16] {
        let mut iv = [0u8; 16];
        thread_rng().fill_bytes(&mut iv);
        iv
    }

    #[test]
    fn test_aes_128_roundtrip() {
        let key = [1u8; 16];
        let data = b"Test AES-128 decryption with CBC mode";
        let encrypted = encrypt_padded(&key, &random_iv(), data);

        let decrypted = AESProvider.decrypt(&encrypted, &key).unwrap();
        assert_eq!(decrypted, data.to_vec());
    }

    #[test]
    fn test_full_padding_block() {
        let key = [7u8; 16];
        let data = [0x41u8; 32];
        let encrypted = encrypt_padded(&key, &random_iv(), &data);
        assert_eq!(encrypted.len(), 16 + 48);

        assert_eq!(AESProvider.decrypt(&encrypted, &key).unwrap(), data.to_vec());
    }

    #[rstest]
    #[case(0)]
    #[case(17)]
    #[case(255)]
    fn test_bad_padding_is_rejected(#[case] pad: u8) {
        let key = [3u8; 16];
        let mut block = [0x20u8; 16];
        block[15] = pad;
        let encrypted = encrypt_blocks(&key, &random_iv(), &block);

        assert!(matches!(
            AESProvider.decrypt(&encrypted, &key),
            Err(PDFResolverError::InvalidPadding(p)) if p == pad
        ));
    }

    #[test]
    fn test_iv_only_payload_is_empty() {
        let key = [1u8; 16];
        assert!(AESProvider.decrypt(&[0u8; 16], &key).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_key_length() {
        let data = vec![0u8; 32];
        assert!(matches!(
            AESProvider.decrypt(&data, &[1u8; 24]),
            Err(PDFResolverError::InvalidKeyLength(24))
        ));
    }

    #[test]
    fn test_invalid_data_length() {
        let key = vec![1u8; 16];
        assert!(matches!(
            AESProvider.decrypt(&[0u8; 8], &key),
            Err(PDFResolverError::InvalidDataLength { .. })
        ));
        assert!(matches!(
            AESProvider.decrypt(&[0u8; 40], &key),
            Err(PDFResolverError::InvalidDataLength { .. })
        ));
    }
}
