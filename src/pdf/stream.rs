//! PDF stream object implementation

use log::trace;

use super::{Dictionary, Filter, Object};
use crate::error::PDFResult;

/// PDF stream object
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    /// Stream dictionary
    dictionary: Dictionary,
    /// Raw stream data, as stored in the file until decrypted
    data: Vec<u8>,
    /// Absolute offset of the first data byte
    data_offset: u64,
}

impl Stream {
    /// Create new stream object
    pub fn new(dictionary: Dictionary, data: Vec<u8>, data_offset: u64) -> Self {
        Self {
            dictionary,
            data,
            data_offset,
        }
    }

    pub fn dict(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn dict_mut(&mut self) -> &mut Dictionary {
        &mut self.dictionary
    }

    /// Raw (undecoded) bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_offset(&self) -> u64 {
        self.data_offset
    }

    /// Replace the raw bytes, e.g. after decryption
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    pub fn is_type(&self, name: &str) -> bool {
        self.dictionary.is_type(name)
    }

    /// Filter names in the order they are applied when decoding
    pub fn filter_names(&self) -> Vec<&str> {
        match self.dictionary.get("Filter") {
            Some(Object::Name(name)) => vec![name.as_str()],
            Some(Object::Array(array)) => array.iter().filter_map(Object::as_name).collect(),
            _ => Vec::new(),
        }
    }

    /// Decode parameters matching the filter at `index`
    fn filter_params(&self, index: usize) -> Option<&Dictionary> {
        match self.dictionary.get("DecodeParms") {
            Some(Object::Dictionary(dict)) if index == 0 => Some(dict),
            Some(Object::Array(array)) => match array.get(index) {
                Some(Object::Dictionary(dict)) => Some(dict),
                _ => None,
            },
            _ => None,
        }
    }

    /// Parse the `/Filter` chain
    pub fn filters(&self) -> PDFResult<Vec<Filter>> {
        self.filter_names()
            .into_iter()
            .enumerate()
            .map(|(i, name)| Filter::from_name(name, self.filter_params(i)))
            .collect()
    }

    /// `/Name` of a leading `/Crypt` filter, if any
    pub fn crypt_filter_name(&self) -> Option<String> {
        match self.filters() {
            Ok(filters) => match filters.first() {
                Some(Filter::Crypt(name)) => Some(name.clone()),
                _ => None,
            },
            Err(_) => None,
        }
    }

    /// Decode stream data by applying its filters in order
    pub fn decode(&self, max_size: usize) -> PDFResult<Vec<u8>> {
        let filters = self.filters()?;
        trace!("Decoding stream with {} filters", filters.len());

        let mut data = self.data.clone();
        for (i, filter) in filters.iter().enumerate() {
            trace!("Applying filter: {:?}", filter);
            data = filter.decode(&data, self.filter_params(i), max_size)?;
        }
        Ok(data)
    }
}
