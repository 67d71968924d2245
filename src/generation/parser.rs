//! Incremental JSON parser for streaming responses
//!
//! Ollama streams newline-delimited JSON objects, but network chunks do not
//! respect object boundaries. The parser accumulates bytes and extracts each
//! complete top-level object with a single-pass bracket-matching scan:
//! - Buffer: 1MB maximum
//! - Braces inside strings (and escaped quotes) are ignored

use crate::errors::{QueryError, Result};

/// Maximum buffer size (1MB)
pub const MAX_BUFFER_SIZE: usize = 1_048_576;

/// Incremental JSON object parser
#[derive(Debug)]
pub struct JsonParser {
    /// Accumulation buffer
    buffer: Vec<u8>,

    /// Maximum buffer size
    max_buffer_size: usize,
}

impl JsonParser {
    /// Create new JSON parser with default settings
    pub fn new() -> Self {
        Self::with_capacity(MAX_BUFFER_SIZE)
    }

    /// Create parser with custom buffer capacity
    pub fn with_capacity(max_buffer_size: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            max_buffer_size,
        }
    }

    /// Add bytes to parser and attempt to extract the first complete object
    pub fn add_bytes(&mut self, bytes: &[u8]) -> Result<Option<String>> {
        if self.buffer.len() + bytes.len() > self.max_buffer_size {
            return Err(QueryError::JsonParse(format!(
                "Buffer overflow: {} bytes exceeds maximum {}",
                self.buffer.len() + bytes.len(),
                self.max_buffer_size
            )));
        }

        self.buffer.extend_from_slice(bytes);

        self.next_object()
    }

    /// Extract the next complete object already in the buffer
    pub fn next_object(&mut self) -> Result<Option<String>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        if let Some((start, end)) = self.find_complete_json()? {
            let json_str = String::from_utf8_lossy(&self.buffer[start..=end]).to_string();

            // Remove processed bytes (including any separator before `start`)
            self.buffer.drain(..=end);

            return Ok(Some(json_str));
        }

        Ok(None)
    }

    /// Find complete JSON object using bracket matching
    ///
    /// Returns: Some((start_index, end_index)) or None
    fn find_complete_json(&self) -> Result<Option<(usize, usize)>> {
        let mut depth: i32 = 0;
        let mut start: Option<usize> = None;
        let mut in_string = false;
        let mut escape_next = false;

        for (i, &byte) in self.buffer.iter().enumerate() {
            if escape_next {
                escape_next = false;
                continue;
            }

            if byte == b'\\' && in_string {
                escape_next = true;
                continue;
            }

            if byte == b'"' {
                in_string = !in_string;
                continue;
            }

            if in_string {
                continue;
            }

            match byte {
                b'{' => {
                    if depth == 0 {
                        start = Some(i);
                    }
                    depth += 1;
                }
                b'}' => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(QueryError::JsonParse(
                            "Mismatched braces: too many closing braces".to_string(),
                        ));
                    }
                    if depth == 0 {
                        if let Some(start) = start {
                            return Ok(Some((start, i)));
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(None)
    }

    /// True if the buffer holds anything besides whitespace
    pub fn has_partial(&self) -> bool {
        self.buffer.iter().any(|b| !b.is_ascii_whitespace())
    }

    /// Get current buffer size
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for JsonParser {
    fn default() -> Self {
        Self::new()
    }
}
