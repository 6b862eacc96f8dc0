//! Sample decoder
//!
//! Turns inbound byte chunks into heart-rate samples. The wearable writes
//! one textual float literal per chunk with no delimiter or length prefix,
//! so each chunk is parsed independently; a chunk that is not valid UTF-8
//! or does not parse as a float yields no sample and is counted, never
//! surfaced as an error.
//!
//! Known wire-format limitation: because the link has no framing, a value
//! split across two reads cannot be reassembled; each fragment is parsed
//! on its own and is dropped, or decodes as a distinct value, depending on
//! where the split fell. Kept for byte-exact compatibility with the
//! wearable protocol (see DESIGN.md).

use std::sync::atomic::{AtomicU64, Ordering};

/// Stateless per-chunk decoder with a malformed-chunk counter.
pub struct SampleDecoder {
    malformed: AtomicU64,
}

impl SampleDecoder {
    pub fn new() -> Self {
        Self {
            malformed: AtomicU64::new(0),
        }
    }

    /// Decode one chunk into zero or one samples.
    ///
    /// Each call is independent; no state is carried across chunks.
    pub fn decode(&self, chunk: &[u8]) -> impl Iterator<Item = f32> {
        let sample = std::str::from_utf8(chunk)
            .ok()
            .and_then(|text| text.trim().parse::<f32>().ok());
        if sample.is_none() {
            self.malformed.fetch_add(1, Ordering::Relaxed);
        }
        sample.into_iter()
    }

    /// Number of chunks dropped because they did not parse.
    pub fn malformed_count(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }
}

impl Default for SampleDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_float_literal() {
        let decoder = SampleDecoder::new();
        let samples: Vec<f32> = decoder.decode(b"72.5").collect();
        assert_eq!(samples, vec![72.5]);
        assert_eq!(decoder.malformed_count(), 0);
    }

    #[test]
    fn test_trims_surrounding_whitespace() {
        let decoder = SampleDecoder::new();
        let samples: Vec<f32> = decoder.decode(b"  68\n").collect();
        assert_eq!(samples, vec![68.0]);
    }

    #[test]
    fn test_malformed_chunk_yields_nothing() {
        let decoder = SampleDecoder::new();
        assert_eq!(decoder.decode(b"beat").count(), 0);
        assert_eq!(decoder.decode(b"72.5 80.1").count(), 0);
        assert_eq!(decoder.decode(&[0xFF, 0xFE]).count(), 0);
        assert_eq!(decoder.malformed_count(), 3);
    }

    #[test]
    fn test_calls_are_independent() {
        let decoder = SampleDecoder::new();
        // A value split across chunks is lost, not fused.
        assert_eq!(decoder.decode(b"72.").count(), 1); // "72." parses as 72.0
        assert_eq!(decoder.decode(b".5").count(), 1); // ".5" parses as 0.5
        let samples: Vec<f32> = decoder.decode(b"90").collect();
        assert_eq!(samples, vec![90.0]);
    }
}
