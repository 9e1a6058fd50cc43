//! Decryption of strings and streams inside resolved objects

use log::trace;

use super::key_derivation::compute_object_key;
use super::{CryptMethod, SecurityState};
use crate::crypto::provider_for;
use crate::error::{PDFResolverError, PDFResult};
use crate::pdf::{Dictionary, Object, Stream};

/// Decrypt one string or stream payload belonging to object `id gen`
pub fn decrypt_bytes(
    state: &SecurityState,
    id: u32,
    generation: u16,
    is_string: bool,
    data: &[u8],
) -> PDFResult<Vec<u8>> {
    let method = if is_string {
        state.string_method
    } else {
        state.stream_method
    };
    decrypt_with(state, id, generation, method, data)
}

fn decrypt_with(
    state: &SecurityState,
    id: u32,
    generation: u16,
    method: CryptMethod,
    data: &[u8],
) -> PDFResult<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    match provider_for(method) {
        None => Ok(data.to_vec()),
        Some(provider) => {
            let key = compute_object_key(state.file_key(), id, generation, method);
            provider.decrypt(data, &key)
        }
    }
}

/// Decrypt every string and stream body reachable from `object` in place
///
/// Callers skip objects that are never encrypted (the encryption
/// dictionary, cross-reference streams and object stream members).
pub fn decrypt_object(
    state: &SecurityState,
    id: u32,
    generation: u16,
    object: &mut Object,
) -> PDFResult<()> {
    match object {
        Object::String(bytes) => {
            let plain = decrypt_bytes(state, id, generation, true, bytes)?;
            *bytes = plain;
        }
        Object::Array(items) => {
            for item in items.iter_mut() {
                decrypt_object(state, id, generation, item)?;
            }
        }
        Object::Dictionary(dict) => decrypt_dict(state, id, generation, dict)?,
        // Cross-reference streams are stored entirely in the clear.
        Object::Stream(stream) if stream.is_type("XRef") => {}
        Object::Stream(stream) => {
            decrypt_dict(state, id, generation, stream.dict_mut())?;
            if let Some(method) = stream_method(state, stream)? {
                trace!("Decrypting stream {} {} with {:?}", id, generation, method);
                let plain = decrypt_with(state, id, generation, method, stream.data())?;
                stream.set_data(plain);
            }
        }
        _ => {}
    }
    Ok(())
}

fn decrypt_dict(
    state: &SecurityState,
    id: u32,
    generation: u16,
    dict: &mut Dictionary,
) -> PDFResult<()> {
    for value in dict.values_mut() {
        decrypt_object(state, id, generation, value)?;
    }
    Ok(())
}

/// Cipher for a stream body, `None` when the body is stored in the clear
fn stream_method(state: &SecurityState, stream: &Stream) -> PDFResult<Option<CryptMethod>> {
    if state.skips_metadata() && stream.is_type("Metadata") {
        return Ok(None);
    }

    let method = match stream.crypt_filter_name() {
        Some(name) => state.named_method(&name).ok_or_else(|| {
            PDFResolverError::malformed(format!("stream selects unknown crypt filter /{}", name))
        })?,
        None => state.stream_method,
    };
    Ok(match method {
        CryptMethod::None => None,
        method => Some(method),
    })
}
