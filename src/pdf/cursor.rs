//! Seekable byte source used by the parsers

use std::io::{self, BufRead, BufReader, Cursor, Read, Seek, SeekFrom};

const SCAN_CHUNK: usize = 4096;

/// Buffered, seekable view over a PDF byte source
///
/// The seek position is shared mutable state: one cursor serves one
/// document and is never used from two places at once.
#[derive(Debug)]
pub struct ByteCursor<R> {
    inner: BufReader<R>,
    len: u64,
}

impl ByteCursor<Cursor<Vec<u8>>> {
    /// Cursor over an owned in-memory buffer
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let len = data.len() as u64;
        Self {
            inner: BufReader::new(Cursor::new(data)),
            len,
        }
    }
}

impl<R: Read + Seek> ByteCursor<R> {
    pub fn new(mut reader: R) -> io::Result<Self> {
        let len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        Ok(Self {
            inner: BufReader::new(reader),
            len,
        })
    }

    /// Total length of the source
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn tell(&mut self) -> io::Result<u64> {
        self.inner.stream_position()
    }

    pub fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    pub fn is_eof(&mut self) -> io::Result<bool> {
        Ok(self.peek_byte()?.is_none())
    }

    pub fn peek_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(self.inner.fill_buf()?.first().copied())
    }

    pub fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let byte = self.peek_byte()?;
        if byte.is_some() {
            self.inner.consume(1);
        }
        Ok(byte)
    }

    /// Read exactly `n` bytes, failing with `UnexpectedEof` past the end
    pub fn read_n(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let pos = self.tell()?;
        if pos.saturating_add(n as u64) > self.len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("read of {} bytes at {} passes end of data", n, pos),
            ));
        }
        let mut buf = vec![0u8; n];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read one line, accepting `\n`, `\r` or `\r\n` as terminator
    ///
    /// The terminator is consumed but not returned. At end of data the
    /// bytes read so far are returned.
    pub fn read_line(&mut self) -> io::Result<Vec<u8>> {
        let mut line = Vec::new();
        while let Some(byte) = self.read_byte()? {
            match byte {
                b'\n' => break,
                b'\r' => {
                    if self.peek_byte()? == Some(b'\n') {
                        self.inner.consume(1);
                    }
                    break;
                }
                _ => line.push(byte),
            }
        }
        Ok(line)
    }

    /// Find the next occurrence of `pattern` at or after the current
    /// position, searching at most `limit` bytes
    ///
    /// Returns the absolute offset of the match. The cursor position is
    /// left unspecified.
    pub fn find_forward(&mut self, pattern: &[u8], limit: u64) -> io::Result<Option<u64>> {
        if pattern.is_empty() {
            return Ok(None);
        }
        let start = self.tell()?;
        let end = start.saturating_add(limit).min(self.len);
        let mut window_start = start;
        let mut window: Vec<u8> = Vec::with_capacity(SCAN_CHUNK + pattern.len());

        while window_start + (window.len() as u64) < end {
            let remaining = end - window_start - window.len() as u64;
            let take = remaining.min(SCAN_CHUNK as u64) as usize;
            let chunk = self.read_n(take)?;
            window.extend_from_slice(&chunk);

            if let Some(idx) = find_sequence(&window, pattern) {
                return Ok(Some(window_start + idx as u64));
            }

            // Keep a tail so matches spanning two chunks are found.
            let keep = pattern.len() - 1;
            if window.len() > keep {
                let drop = window.len() - keep;
                window.drain(..drop);
                window_start += drop as u64;
            }
        }

        Ok(None)
    }
}

/// Find the first occurrence of `sequence` in `data`
pub fn find_sequence(data: &[u8], sequence: &[u8]) -> Option<usize> {
    if sequence.is_empty() || sequence.len() > data.len() {
        return None;
    }
    data.windows(sequence.len()).position(|w| w == sequence)
}

/// Find the last occurrence of `sequence` in `data`
pub fn find_sequence_backwards(data: &[u8], sequence: &[u8]) -> Option<usize> {
    if sequence.is_empty() || sequence.len() > data.len() {
        return None;
    }
    data.windows(sequence.len()).rposition(|w| w == sequence)
}
