// src/hal/protocol.rs
//! Wire protocol of the EMG shield
//!
//! Each frame is `0xCC 0xCC` followed by seven payload bytes:
//! `[counter, sequence, c2, c3, c4, c5, packed_high_bits]`. The four channel
//! readings are 10-bit values whose two top bits live in `packed_high_bits`.
//!
//! A pair of `0xCC` bytes inside a payload is indistinguishable from a real
//! header. The parser does not try to detect that; it always consumes the
//! full payload after a header, so a corrupt frame can never overlap the next.

use crate::config::constants::hal::READ_CHUNK_SIZE;
use crate::config::constants::protocol::*;
use crate::config::constants::signal::CHANNEL_COUNT;
use crate::error::{EmgError, Result};
use crate::hal::traits::{is_transient, ByteSource};
use tracing::trace;

/// One synchronized multi-channel sample set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Device-internal counter byte
    pub counter: u8,
    /// Rolling sample sequence counter
    pub sequence: u8,
    /// Samples in packet order (packet index 2..=5)
    pub samples: [u16; CHANNEL_COUNT],
}

impl Frame {
    /// Decode a full payload
    pub fn decode(payload: &[u8; PAYLOAD_LEN]) -> Self {
        let packed = payload[PACKED_HIGH_BITS_OFFSET];
        let mut samples = [0u16; CHANNEL_COUNT];
        for (slot, sample) in samples.iter_mut().enumerate() {
            let (mask, shift) = HIGH_BIT_LAYOUT[slot];
            let low = payload[2 + slot] as u16;
            *sample = (((packed & mask) as u16) << shift) | low;
        }
        Self {
            counter: payload[0],
            sequence: payload[1],
            samples,
        }
    }

    /// Encode back to wire bytes, header included
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut bytes = [0u8; FRAME_LEN];
        bytes[0] = HEADER_BYTE;
        bytes[1] = HEADER_BYTE;
        bytes[2] = self.counter;
        bytes[3] = self.sequence;
        let mut packed = 0u8;
        for (slot, &sample) in self.samples.iter().enumerate() {
            let (mask, shift) = HIGH_BIT_LAYOUT[slot];
            bytes[4 + slot] = (sample & 0xFF) as u8;
            packed |= ((sample >> shift) as u8) & mask;
        }
        bytes[HEADER_LEN + PACKED_HIGH_BITS_OFFSET] = packed;
        bytes
    }

    /// Sample for a packet index (2..=5)
    pub fn sample_at(&self, packet_index: u8) -> Option<u16> {
        let slot = packet_index.checked_sub(FIRST_PACKET_INDEX)? as usize;
        self.samples.get(slot).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    /// Looking for the header; `primed` once one header byte has been seen
    Seeking { primed: bool },
    /// Collecting payload bytes; `filled` bytes written so far
    Payload { filled: usize },
}

/// Byte-at-a-time frame extractor
#[derive(Debug)]
pub struct FrameParser {
    state: ParserState,
    payload: [u8; PAYLOAD_LEN],
    chunk: [u8; READ_CHUNK_SIZE],
    chunk_pos: usize,
    chunk_len: usize,
    frames_emitted: u64,
    bytes_skipped: u64,
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Seeking { primed: false },
            payload: [0; PAYLOAD_LEN],
            chunk: [0; READ_CHUNK_SIZE],
            chunk_pos: 0,
            chunk_len: 0,
            frames_emitted: 0,
            bytes_skipped: 0,
        }
    }

    /// Feed one byte; returns a frame when its last payload byte arrives
    pub fn push(&mut self, byte: u8) -> Option<Frame> {
        match self.state {
            ParserState::Seeking { primed } => {
                if byte == HEADER_BYTE {
                    self.state = if primed {
                        ParserState::Payload { filled: 0 }
                    } else {
                        ParserState::Seeking { primed: true }
                    };
                } else {
                    if primed {
                        self.bytes_skipped += 1;
                    }
                    self.bytes_skipped += 1;
                    self.state = ParserState::Seeking { primed: false };
                }
                None
            }
            ParserState::Payload { filled } => {
                self.payload[filled] = byte;
                let filled = filled + 1;
                if filled == PAYLOAD_LEN {
                    self.state = ParserState::Seeking { primed: false };
                    self.frames_emitted += 1;
                    Some(Frame::decode(&self.payload))
                } else {
                    self.state = ParserState::Payload { filled };
                    None
                }
            }
        }
    }

    /// Feed a slice, collecting every completed frame
    pub fn push_slice(&mut self, bytes: &[u8]) -> Vec<Frame> {
        bytes.iter().filter_map(|&b| self.push(b)).collect()
    }

    /// Pull bytes from `source` until a frame completes
    ///
    /// Returns `Ok(None)` when the source timed out with no complete frame;
    /// partial progress is kept for the next call. When the source closes,
    /// any partial frame is dropped and [`EmgError::StreamClosed`] returned.
    pub fn next_frame<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> Result<Option<Frame>> {
        loop {
            while self.chunk_pos < self.chunk_len {
                let byte = self.chunk[self.chunk_pos];
                self.chunk_pos += 1;
                if let Some(frame) = self.push(byte) {
                    return Ok(Some(frame));
                }
            }

            match source.read_bytes(&mut self.chunk) {
                Ok(0) => {
                    if self.in_frame() {
                        trace!("stream closed mid-frame, dropping partial payload");
                    }
                    self.reset();
                    return Err(EmgError::StreamClosed);
                }
                Ok(n) => {
                    self.chunk_pos = 0;
                    self.chunk_len = n;
                }
                Err(e) if is_transient(&e) => return Ok(None),
                Err(e) => {
                    self.reset();
                    return Err(EmgError::Io(e));
                }
            }
        }
    }

    /// True while part of a header or payload has been consumed
    pub fn in_frame(&self) -> bool {
        self.state != ParserState::Seeking { primed: false }
    }

    /// Forget any partial frame and buffered bytes
    pub fn reset(&mut self) {
        self.state = ParserState::Seeking { primed: false };
        self.chunk_pos = 0;
        self.chunk_len = 0;
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    /// Bytes discarded while hunting for a header
    pub fn bytes_skipped(&self) -> u64 {
        self.bytes_skipped
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::simulator::MemorySource;

    #[test]
    fn test_decode_documented_example() {
        let mut parser = FrameParser::new();
        let frames = parser.push_slice(&[0xCC, 0xCC, 0x01, 0x05, 0x10, 0x20, 0x30, 0x40, 0xC0]);
        assert_eq!(frames.len(), 1);
        let frame = frames[0];
        assert_eq!(frame.counter, 1);
        assert_eq!(frame.sequence, 5);
        assert_eq!(frame.samples, [0x10, 0x20, 0x30, 0x340]);
    }

    #[test]
    fn test_each_channel_uses_own_high_bits() {
        let mut parser = FrameParser::new();
        let frames = parser.push_slice(&[0xCC, 0xCC, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF, 0b0110_1100]);
        // ch0 bits 00, ch1 bits 11, ch2 bits 10, ch3 bits 01
        assert_eq!(frames[0].samples, [0x0FF, 0x3FF, 0x2FF, 0x1FF]);
    }

    #[test]
    fn test_encode_inverts_decode() {
        let frame = Frame { counter: 7, sequence: 200, samples: [0, 1023, 512, 257] };
        let mut parser = FrameParser::new();
        assert_eq!(parser.push_slice(&frame.encode()), vec![frame]);
    }

    #[test]
    fn test_sample_at_packet_index() {
        let frame = Frame { counter: 0, sequence: 0, samples: [10, 20, 30, 40] };
        assert_eq!(frame.sample_at(2), Some(10));
        assert_eq!(frame.sample_at(5), Some(40));
        assert_eq!(frame.sample_at(1), None);
        assert_eq!(frame.sample_at(6), None);
    }

    #[test]
    fn test_single_header_byte_is_not_enough() {
        let mut parser = FrameParser::new();
        let frames =
            parser.push_slice(&[0xCC, 0x00, 0xCC, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]);
        assert!(frames.is_empty());
        assert!(!parser.in_frame());
        assert_eq!(parser.bytes_skipped(), 10);
    }

    #[test]
    fn test_header_value_inside_payload_is_data() {
        let mut parser = FrameParser::new();
        let mut bytes = vec![0xCC, 0xCC, 0x01, 0x02, 0xCC, 0xCC, 0x00, 0x00, 0x00];
        bytes.extend_from_slice(&[0xCC, 0xCC, 0x02, 0x03, 0x11, 0x22, 0x33, 0x44, 0x00]);
        let frames = parser.push_slice(&bytes);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].samples[0], 0xCC);
        assert_eq!(frames[1].sequence, 3);
        assert_eq!(frames[1].samples, [0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn test_next_frame_reports_closed_stream_without_partial_frame() {
        let mut source = MemorySource::new(vec![0xCC, 0xCC, 0x01, 0x02, 0x03]);
        let mut parser = FrameParser::new();
        let err = parser.next_frame(&mut source).unwrap_err();
        assert!(err.is_stream_closed());
        assert!(!parser.in_frame());
    }

    #[test]
    fn test_next_frame_reads_across_chunks() {
        let frame = Frame { counter: 9, sequence: 1, samples: [1, 2, 3, 4] };
        let mut bytes = vec![0x55; READ_CHUNK_SIZE - 3];
        bytes.extend_from_slice(&frame.encode());
        let mut source = MemorySource::new(bytes);
        let mut parser = FrameParser::new();
        assert_eq!(parser.next_frame(&mut source).unwrap(), Some(frame));
        assert!(parser.next_frame(&mut source).unwrap_err().is_stream_closed());
    }
}
