//! Stream filters needed to read cross-reference and object streams

use std::io::Read;

use flate2::read::ZlibDecoder;
use log::{trace, warn};

use crate::error::{PDFResolverError, PDFResult};
use crate::pdf::Dictionary;

/// PDF stream filters
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    FlateDecode,
    /// Crypt filter; carries the `/Name` from its decode parameters
    Crypt(String),
}

/// Predictor parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PredictorParams {
    pub predictor: u8,
    pub columns: usize,
    pub colors: usize,
    pub bits_per_component: usize,
}

impl PredictorParams {
    fn from_dict(params: &Dictionary) -> Option<Self> {
        let predictor = params.get_integer("Predictor")?;
        if predictor <= 1 {
            return None;
        }
        Some(Self {
            predictor: predictor.clamp(0, 255) as u8,
            columns: params.get_integer("Columns").unwrap_or(1).max(1) as usize,
            colors: params.get_integer("Colors").unwrap_or(1).max(1) as usize,
            bits_per_component: params.get_integer("BitsPerComponent").unwrap_or(8).max(1) as usize,
        })
    }

    fn bytes_per_pixel(&self) -> PDFResult<usize> {
        let bits = self
            .colors
            .checked_mul(self.bits_per_component)
            .ok_or_else(predictor_overflow)?;
        Ok(bits_to_bytes(bits).max(1))
    }

    fn bytes_per_row(&self) -> PDFResult<usize> {
        let bits = self
            .columns
            .checked_mul(self.colors)
            .and_then(|n| n.checked_mul(self.bits_per_component))
            .ok_or_else(predictor_overflow)?;
        Ok(bits_to_bytes(bits))
    }
}

fn bits_to_bytes(bits: usize) -> usize {
    bits / 8 + usize::from(bits % 8 != 0)
}

fn predictor_overflow() -> PDFResolverError {
    PDFResolverError::DecompressionError("predictor row size overflows".to_string())
}

impl Filter {
    /// Create filter from name
    ///
    /// Only the filters the resolver needs are known; anything else fails
    /// closed.
    pub fn from_name(name: &str, params: Option<&Dictionary>) -> PDFResult<Self> {
        match name {
            "FlateDecode" | "Fl" => Ok(Filter::FlateDecode),
            "Crypt" => {
                let cf = params
                    .and_then(|p| p.get_name("Name"))
                    .unwrap_or("Identity");
                Ok(Filter::Crypt(cf.to_string()))
            }
            _ => Err(PDFResolverError::UnsupportedStreamFilter(name.to_string())),
        }
    }

    /// Decode data using this filter
    pub fn decode(
        &self,
        data: &[u8],
        params: Option<&Dictionary>,
        max_size: usize,
    ) -> PDFResult<Vec<u8>> {
        match self {
            Filter::FlateDecode => {
                let inflated = decode_flate(data, max_size)?;
                match params.and_then(PredictorParams::from_dict) {
                    Some(predictor) => apply_predictor(&inflated, &predictor),
                    None => Ok(inflated),
                }
            }
            // Decryption already happened when the object was resolved.
            Filter::Crypt(_) => Ok(data.to_vec()),
        }
    }
}

fn decode_flate(data: &[u8], max_size: usize) -> PDFResult<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data).take(max_size as u64 + 1);
    let mut output = Vec::with_capacity(data.len().saturating_mul(2).min(max_size));

    if let Err(e) = decoder.read_to_end(&mut output) {
        // Truncated deflate data is common; keep what inflated cleanly.
        if output.is_empty() {
            return Err(PDFResolverError::DecompressionError(e.to_string()));
        }
        warn!("Flate stream ended early after {} bytes: {}", output.len(), e);
    }
    if output.len() > max_size {
        return Err(PDFResolverError::LimitExceeded(format!(
            "decoded stream larger than {} bytes",
            max_size
        )));
    }

    trace!("Inflated {} bytes to {}", data.len(), output.len());
    Ok(output)
}

fn apply_predictor(data: &[u8], params: &PredictorParams) -> PDFResult<Vec<u8>> {
    // A row longer than the data only ever yields one partial row, so the
    // working buffers never need to exceed the data itself.
    let bpp = params.bytes_per_pixel()?;
    let row_len = params.bytes_per_row()?.min(data.len()).max(1);
    let bpp = bpp.min(row_len);

    match params.predictor {
        2 => decode_tiff(data, params, bpp, row_len),
        10..=15 => decode_png(data, bpp, row_len),
        other => Err(PDFResolverError::invalid_dict_value(
            "Predictor",
            format!("unknown predictor {}", other),
        )),
    }
}

fn decode_tiff(data: &[u8], params: &PredictorParams, bpp: usize, row_len: usize) -> PDFResult<Vec<u8>> {
    if params.bits_per_component != 8 {
        return Err(PDFResolverError::UnsupportedStreamFilter(format!(
            "TIFF predictor with {} bits per component",
            params.bits_per_component
        )));
    }
    let mut output = data.to_vec();

    for row in output.chunks_mut(row_len) {
        for i in bpp..row.len() {
            row[i] = row[i].wrapping_add(row[i - bpp]);
        }
    }
    Ok(output)
}

fn paeth(left: u8, up: u8, up_left: u8) -> u8 {
    let p = left as i16 + up as i16 - up_left as i16;
    let pa = (p - left as i16).abs();
    let pb = (p - up as i16).abs();
    let pc = (p - up_left as i16).abs();

    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        up
    } else {
        up_left
    }
}

fn decode_png(data: &[u8], bpp: usize, row_len: usize) -> PDFResult<Vec<u8>> {
    let mut output = Vec::with_capacity(data.len());
    let mut prev_row = vec![0u8; row_len];

    for chunk in data.chunks(row_len + 1) {
        let filter_type = chunk[0];
        let mut row = chunk[1..].to_vec();
        row.resize(row_len, 0);

        for i in 0..row_len {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = prev_row[i];
            let up_left = if i >= bpp { prev_row[i - bpp] } else { 0 };

            row[i] = match filter_type {
                0 => row[i],
                1 => row[i].wrapping_add(left),
                2 => row[i].wrapping_add(up),
                3 => row[i].wrapping_add(((left as u16 + up as u16) / 2) as u8),
                4 => row[i].wrapping_add(paeth(left, up, up_left)),
                other => {
                    return Err(PDFResolverError::DecompressionError(format!(
                        "invalid PNG row filter {}",
                        other
                    )))
                }
            };
        }

        // A short final row only contributes the bytes it carried.
        let carried = (chunk.len() - 1).min(row_len);
        output.extend_from_slice(&row[..carried]);
        prev_row = row;
    }

    Ok(output)
}
