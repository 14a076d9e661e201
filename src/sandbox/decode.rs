//! Universal output decoding.
//!
//! Process output crosses the container boundary in exactly two shapes:
//! already-decoded text, or a byte sequence. Transports that deliver other
//! wire forms (JSON strings, arrays of byte values) normalize into
//! [`OutputChunk`] at the edge, so nothing downstream probes for shape.

use serde_json::Value;

/// One chunk of process output at the transport boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    Text(String),
    Bytes(Vec<u8>),
}

impl OutputChunk {
    /// Decode to UTF-8 text. Byte sequences that are not valid UTF-8 decode
    /// lossily rather than failing the stream.
    pub fn decode(&self) -> String {
        match self {
            OutputChunk::Text(text) => text.clone(),
            OutputChunk::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    /// Normalize a JSON wire value into a chunk: strings pass through as
    /// text, arrays of byte values become a byte sequence, and anything
    /// else degrades to its JSON rendering as text.
    pub fn from_wire(value: &Value) -> Self {
        match value {
            Value::String(s) => OutputChunk::Text(s.clone()),
            Value::Array(items) => {
                let bytes: Option<Vec<u8>> = items
                    .iter()
                    .map(|item| item.as_u64().and_then(|n| u8::try_from(n).ok()))
                    .collect();
                match bytes {
                    Some(bytes) => OutputChunk::Bytes(bytes),
                    None => OutputChunk::Text(value.to_string()),
                }
            }
            other => OutputChunk::Text(other.to_string()),
        }
    }
}

impl From<String> for OutputChunk {
    fn from(text: String) -> Self {
        OutputChunk::Text(text)
    }
}

impl From<&str> for OutputChunk {
    fn from(text: &str) -> Self {
        OutputChunk::Text(text.to_string())
    }
}

impl From<Vec<u8>> for OutputChunk {
    fn from(bytes: Vec<u8>) -> Self {
        OutputChunk::Bytes(bytes)
    }
}

impl From<&[u8]> for OutputChunk {
    fn from(bytes: &[u8]) -> Self {
        OutputChunk::Bytes(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_bytes_and_byte_value_arrays_decode_identically() {
        let text = "Server running on port 3000\n";

        let as_text = OutputChunk::from(text);
        let as_bytes = OutputChunk::from(text.as_bytes());
        let as_wire_array = OutputChunk::from_wire(&serde_json::json!(
            text.bytes().collect::<Vec<u8>>()
        ));

        assert_eq!(as_text.decode(), text);
        assert_eq!(as_bytes.decode(), text);
        assert_eq!(as_wire_array.decode(), text);
    }

    #[test]
    fn invalid_utf8_decodes_lossily() {
        let chunk = OutputChunk::Bytes(vec![0x68, 0x69, 0xFF, 0x21]);
        assert_eq!(chunk.decode(), "hi\u{FFFD}!");
    }

    #[test]
    fn wire_string_is_text() {
        let chunk = OutputChunk::from_wire(&serde_json::json!("hello"));
        assert_eq!(chunk, OutputChunk::Text("hello".to_string()));
    }

    #[test]
    fn wire_array_with_non_bytes_degrades_to_text() {
        let chunk = OutputChunk::from_wire(&serde_json::json!([104, 300]));
        assert_eq!(chunk, OutputChunk::Text("[104,300]".to_string()));
    }

    #[test]
    fn empty_chunks_decode_to_empty_string() {
        assert_eq!(OutputChunk::Text(String::new()).decode(), "");
        assert_eq!(OutputChunk::Bytes(Vec::new()).decode(), "");
    }
}
