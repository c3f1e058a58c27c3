// tests/parser_tests.rs
//! Frame parser behaviour on realistic byte streams

use olimex_emg::hal::{Frame, FrameParser, MemorySource};
use proptest::prelude::*;

fn expected_samples(low: [u8; 4], packed: u8) -> [u16; 4] {
    [
        (((packed & 0x03) as u16) << 8) | low[0] as u16,
        (((packed & 0x0C) as u16) << 6) | low[1] as u16,
        (((packed & 0x30) as u16) << 4) | low[2] as u16,
        (((packed & 0xC0) as u16) << 2) | low[3] as u16,
    ]
}

#[test]
fn test_documented_frame() {
    let mut parser = FrameParser::new();
    let frames = parser.push_slice(&[0xCC, 0xCC, 0x01, 0x05, 0x10, 0x20, 0x30, 0x40, 0xC0]);
    assert_eq!(
        frames,
        vec![Frame { counter: 1, sequence: 5, samples: [16, 32, 48, 832] }]
    );
}

#[test]
fn test_resync_after_garbage() {
    let good = Frame { counter: 3, sequence: 9, samples: [100, 200, 300, 400] };
    let mut bytes = vec![0x01, 0xCC, 0x7F, 0x00, 0xFF];
    bytes.extend_from_slice(&good.encode());
    bytes.extend_from_slice(&good.encode());

    let mut parser = FrameParser::new();
    let frames = parser.push_slice(&bytes);
    assert_eq!(frames, vec![good, good]);
    assert_eq!(parser.frames_emitted(), 2);
}

#[test]
fn test_spurious_header_inside_payload_does_not_overlap() {
    // A frame whose low bytes happen to contain CC CC, followed by real frames
    let tricky = Frame { counter: 0xCC, sequence: 0xCC, samples: [0xCC, 0xCC, 1, 2] };
    let next = Frame { counter: 1, sequence: 1, samples: [5, 6, 7, 8] };
    let mut bytes = tricky.encode().to_vec();
    bytes.extend_from_slice(&next.encode());

    let mut parser = FrameParser::new();
    let frames = parser.push_slice(&bytes);
    assert_eq!(frames, vec![tricky, next]);
}

#[test]
fn test_truncated_stream_signals_closed() {
    let frame = Frame { counter: 1, sequence: 2, samples: [1, 2, 3, 4] };
    let mut bytes = frame.encode().to_vec();
    bytes.extend_from_slice(&frame.encode()[..6]);
    let mut source = MemorySource::new(bytes);
    let mut parser = FrameParser::new();

    assert_eq!(parser.next_frame(&mut source).unwrap(), Some(frame));
    let err = parser.next_frame(&mut source).unwrap_err();
    assert!(err.is_stream_closed());
    assert_eq!(parser.frames_emitted(), 1);
}

#[test]
fn test_fed_source_delivers_frames_as_they_arrive() {
    let mut source = MemorySource::open();
    let feed = source.feed();
    let mut parser = FrameParser::new();

    // Nothing buffered yet: the parser reports "no frame" rather than closing
    assert_eq!(parser.next_frame(&mut source).unwrap(), None);

    let frame = Frame { counter: 4, sequence: 4, samples: [9, 9, 9, 9] };
    let bytes = frame.encode();
    feed.push(&bytes[..4]);
    assert_eq!(parser.next_frame(&mut source).unwrap(), None);
    feed.push(&bytes[4..]);
    assert_eq!(parser.next_frame(&mut source).unwrap(), Some(frame));
}

proptest! {
    #[test]
    fn prop_every_valid_payload_decodes(
        counter in any::<u8>(),
        sequence in any::<u8>(),
        low in any::<[u8; 4]>(),
        packed in any::<u8>(),
    ) {
        let bytes = [0xCC, 0xCC, counter, sequence, low[0], low[1], low[2], low[3], packed];
        let mut parser = FrameParser::new();
        let frames = parser.push_slice(&bytes);
        prop_assert_eq!(frames.len(), 1);
        prop_assert_eq!(frames[0].counter, counter);
        prop_assert_eq!(frames[0].sequence, sequence);
        prop_assert_eq!(frames[0].samples, expected_samples(low, packed));
        prop_assert!(frames[0].samples.iter().all(|&s| s <= 1023));
    }

    #[test]
    fn prop_encode_decode_inverse(samples in any::<[u16; 4]>().prop_map(|s| s.map(|v| v & 0x3FF))) {
        let frame = Frame { counter: 0, sequence: 0, samples };
        let mut parser = FrameParser::new();
        prop_assert_eq!(parser.push_slice(&frame.encode()), vec![frame]);
    }
}
