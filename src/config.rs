//! Resolver tunables

/// Limits and search windows used while loading and resolving a document
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Bytes at the end of the file searched for `startxref`
    pub tail_window: usize,
    /// Maximum number of cross-reference sections visited per document
    pub max_xref_sections: usize,
    /// Maximum number of reference hops followed by `get_object`
    pub max_reference_depth: usize,
    /// Maximum `/N` accepted for an object stream
    pub max_object_stream_objects: usize,
    /// Maximum decompressed size of a single stream
    pub max_decoded_stream_size: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            tail_window: 1024,
            max_xref_sections: 256,
            max_reference_depth: 32,
            max_object_stream_objects: 1_000_000,
            max_decoded_stream_size: 256 * 1024 * 1024,
        }
    }
}

impl ResolverConfig {
    pub fn with_tail_window(mut self, bytes: usize) -> Self {
        self.tail_window = bytes;
        self
    }

    pub fn with_max_xref_sections(mut self, sections: usize) -> Self {
        self.max_xref_sections = sections;
        self
    }

    pub fn with_max_reference_depth(mut self, depth: usize) -> Self {
        self.max_reference_depth = depth;
        self
    }

    pub fn with_max_object_stream_objects(mut self, count: usize) -> Self {
        self.max_object_stream_objects = count;
        self
    }

    pub fn with_max_decoded_stream_size(mut self, bytes: usize) -> Self {
        self.max_decoded_stream_size = bytes;
        self
    }
}
