//! Frame encoding/decoding.
//!
//! Every message, in both directions, uses the same layout:
//!
//! ```text
//! +------+-----+-----+-------------------+-------+-------+
//! | 0x3A | tag | len | payload[0..len]   | cs_hi | cs_lo |
//! +------+-----+-----+-------------------+-------+-------+
//! ```
//!
//! The checksum is the 16-bit wrapping sum of every byte from the prefix
//! through the end of the payload, sent big-endian.
//!
//! Serial reads are not message-aligned, so inbound data goes through
//! [`decode`] (or the buffering [`FrameDecoder`]), which skips noise before a
//! prefix and resynchronizes one byte at a time after a checksum mismatch.

use bytes::{Buf, BufMut, BytesMut};
use log::trace;

use crate::constants::*;
use crate::error::{ProtocolError, ProtocolResult};

/// A complete, checksum-validated protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    tag: u8,
    payload: Vec<u8>,
    checksum: u16,
}

impl Frame {
    /// Build a frame, computing its checksum.
    pub fn new(tag: u8, payload: &[u8]) -> ProtocolResult<Self> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLong {
                max: MAX_PAYLOAD_SIZE,
                actual: payload.len(),
            });
        }

        Ok(Frame {
            tag,
            payload: payload.to_vec(),
            checksum: frame_checksum(tag, payload),
        })
    }

    /// Frame tag.
    pub fn tag(&self) -> u8 {
        self.tag
    }

    /// Frame payload (without length byte or checksum).
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The 16-bit checksum carried by this frame.
    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    /// Number of bytes this frame occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload.len() + CHECKSUM_SIZE
    }

    /// Serialize the frame for transmission.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.push(FRAME_PREFIX);
        buf.push(self.tag);
        buf.push(self.payload.len() as u8);
        buf.extend_from_slice(&self.payload);
        buf.put_u16(self.checksum);
        buf
    }
}

/// Wrapping 16-bit sum of `bytes`.
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0u16, |sum, &b| sum.wrapping_add(u16::from(b)))
}

/// Checksum of a frame's header and payload without assembling it first.
fn frame_checksum(tag: u8, payload: &[u8]) -> u16 {
    checksum(&[FRAME_PREFIX, tag, payload.len() as u8]).wrapping_add(checksum(payload))
}

/// Encode a tag and payload into wire bytes.
///
/// Fails only if the payload is longer than the length byte can express.
pub fn encode(tag: u8, payload: &[u8]) -> ProtocolResult<Vec<u8>> {
    Ok(Frame::new(tag, payload)?.encode())
}

/// Try to decode one frame from the front of `buffer`.
///
/// Returns the frame (if a complete valid one was found) and the number of
/// bytes the caller should drop from the front of the buffer. `(None, n)`
/// means "need more data"; the `n` bytes are noise that can never start a
/// frame and are safe to discard.
///
/// A frame whose checksum validates is always taken whole, whatever its tag
/// or length, so prefix bytes inside its payload are never rescanned.
pub fn decode(buffer: &[u8]) -> (Option<Frame>, usize) {
    let mut start = 0;

    loop {
        // Skip everything before the next prefix
        let Some(offset) = buffer[start..].iter().position(|&b| b == FRAME_PREFIX) else {
            return (None, buffer.len());
        };
        start += offset;
        let candidate = &buffer[start..];

        if candidate.len() < HEADER_SIZE {
            return (None, start);
        }

        let len = candidate[2] as usize;
        let body_len = HEADER_SIZE + len;
        let total = body_len + CHECKSUM_SIZE;
        if candidate.len() < total {
            return (None, start);
        }

        let expected = checksum(&candidate[..body_len]);
        let received = u16::from_be_bytes([candidate[body_len], candidate[body_len + 1]]);

        if expected == received {
            let frame = Frame {
                tag: candidate[1],
                payload: candidate[HEADER_SIZE..body_len].to_vec(),
                checksum: received,
            };
            return (Some(frame), start + total);
        }

        trace!(
            "resync: checksum mismatch at offset {} (expected 0x{:04X}, got 0x{:04X})",
            start,
            expected,
            received
        );
        start += 1;
    }
}

/// Accumulates serial reads and yields complete frames.
///
/// Frames may be split across any number of pushes, and a single push may
/// carry several frames.
#[derive(Debug)]
pub struct FrameDecoder {
    /// Bytes received but not yet consumed.
    buffer: BytesMut,
    /// Total noise and resync bytes dropped so far.
    discarded: u64,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        FrameDecoder {
            buffer: BytesMut::with_capacity(MAX_FRAME_SIZE),
            discarded: 0,
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Decode the next complete frame, or `None` if more data is needed.
    pub fn next_frame(&mut self) -> Option<Frame> {
        let (frame, consumed) = decode(&self.buffer);
        let skipped = match &frame {
            Some(frame) => consumed - frame.encoded_len(),
            None => consumed,
        };
        self.discarded += skipped as u64;
        self.buffer.advance(consumed);
        frame
    }

    /// Push `data` and return every frame that is now complete.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Frame> {
        self.push(data);
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame() {
            frames.push(frame);
        }
        frames
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes dropped as noise or during resync.
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded
    }

    /// Clear the buffer (e.g. after the port is reopened).
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const STATUS_100: [u8; 8] = [0x3A, 0x02, 0x03, 0x01, 0x64, 0x09, 0x00, 0xAD];

    #[test]
    fn test_checksum_known_vector() {
        // 3A 02 03 01 64 09 -> 0x00AD
        assert_eq!(checksum(&STATUS_100[..6]), 0x00AD);
    }

    #[test]
    fn test_checksum_wraps() {
        let bytes = vec![0xFF; 300];
        assert_eq!(checksum(&bytes), ((0xFFu32 * 300) % 65536) as u16);
    }

    #[test]
    fn test_encode_known_frame() {
        let encoded = encode(TAG_CCT, &[0x01, 0x64, 0x09]).unwrap();
        assert_eq!(encoded, STATUS_100);
    }

    #[test]
    fn test_encode_empty_payload() {
        let encoded = encode(TAG_POWER, &[]).unwrap();
        assert_eq!(encoded, vec![0x3A, 0x06, 0x00, 0x00, 0x40]);
    }

    #[test]
    fn test_frame_rejects_oversized_payload() {
        let err = Frame::new(TAG_CCT, &[0u8; 256]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::PayloadTooLong {
                max: 255,
                actual: 256
            }
        );
    }

    #[test]
    fn test_decode_known_frame() {
        let (frame, consumed) = decode(&STATUS_100);
        let frame = frame.expect("should decode frame");
        assert_eq!(consumed, 8);
        assert_eq!(frame.tag(), TAG_CCT);
        assert_eq!(frame.payload(), &[0x01, 0x64, 0x09]);
        assert_eq!(frame.payload()[1], 100);
        assert_eq!(frame.checksum(), 0x00AD);
    }

    #[test]
    fn test_decode_skips_leading_noise() {
        let data = [0xFF, 0xFF, 0x3A, 0x02, 0x03, 0x01, 0x0A, 0x09, 0x00, 0x53];
        let (frame, consumed) = decode(&data);
        let frame = frame.expect("should decode frame");
        assert_eq!(consumed, data.len());
        assert_eq!(frame.payload()[1], 10);
    }

    #[test]
    fn test_decode_need_more_data() {
        // Prefix only
        assert_eq!(decode(&[0x3A]), (None, 0));
        // Header but incomplete payload
        assert_eq!(decode(&STATUS_100[..5]), (None, 0));
        // Missing last checksum byte
        assert_eq!(decode(&STATUS_100[..7]), (None, 0));
        // Noise before an incomplete frame is still consumed
        assert_eq!(decode(&[0x00, 0x11, 0x3A, 0x02]), (None, 2));
    }

    #[test]
    fn test_decode_all_noise() {
        assert_eq!(decode(&[0x01, 0x02, 0x03]), (None, 3));
        assert_eq!(decode(&[]), (None, 0));
    }

    #[test]
    fn test_decode_resyncs_after_stray_prefix() {
        let mut data = vec![0x3A];
        data.extend_from_slice(&STATUS_100);
        let (frame, consumed) = decode(&data);
        assert_eq!(frame.expect("should decode frame").encode(), STATUS_100);
        assert_eq!(consumed, data.len());
    }

    #[test]
    fn test_decode_resyncs_after_bad_checksum() {
        let mut corrupt = STATUS_100;
        corrupt[7] ^= 0xFF;
        let mut data = corrupt.to_vec();
        data.extend_from_slice(&STATUS_100);

        let (frame, consumed) = decode(&data);
        assert_eq!(frame.expect("should decode frame").encode(), STATUS_100);
        assert_eq!(consumed, data.len());
    }

    #[test]
    fn test_decode_long_header_waits_for_payload() {
        // 0x3A 0x02 0xFF claims a 255-byte payload
        let mut data = vec![0x3A, 0x02, 0xFF];
        data.extend_from_slice(&STATUS_100);
        assert_eq!(decode(&data), (None, 0));

        // Once the claimed payload is in and the checksum fails, resync
        // finds the status frame inside it
        data.resize(3 + 255 + 2, 0x00);
        let (frame, consumed) = decode(&data);
        assert_eq!(frame.expect("should decode frame").encode(), STATUS_100);
        assert_eq!(consumed, 3 + STATUS_100.len());
    }

    /// An unknown-tag frame whose payload carries a complete CCT frame.
    fn long_frame_with_embedded_status() -> Vec<u8> {
        let mut payload = vec![0x11; 33];
        let inner = encode(TAG_CCT, &[CCT_MODE, 0x05, 0x09]).unwrap();
        payload[10..10 + inner.len()].copy_from_slice(&inner);
        encode(0x07, &payload).unwrap()
    }

    #[test]
    fn test_decode_long_frame_not_rescanned() {
        let data = long_frame_with_embedded_status();
        let (frame, consumed) = decode(&data);
        let frame = frame.expect("should decode frame");
        assert_eq!(frame.tag(), 0x07);
        assert_eq!(frame.payload().len(), 33);
        assert_eq!(consumed, data.len());
    }

    #[test]
    fn test_frame_decoder_takes_long_frames_whole() {
        let mut decoder = FrameDecoder::new();
        let mut data = encode(0x07, &[0x11; 40]).unwrap();
        data.extend_from_slice(&long_frame_with_embedded_status());

        let frames = decoder.feed(&data);
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|frame| frame.tag() == 0x07));
        assert_eq!(frames[0].payload(), &[0x11; 40]);
        assert_eq!(decoder.discarded_bytes(), 0);
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_frame_decoder_partial() {
        let mut decoder = FrameDecoder::new();

        decoder.push(&STATUS_100[..4]);
        assert!(decoder.next_frame().is_none());
        assert_eq!(decoder.buffered_len(), 4);

        decoder.push(&STATUS_100[4..]);
        let frame = decoder.next_frame().expect("should decode frame");
        assert_eq!(frame.encode(), STATUS_100);
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_frame_decoder_multiple() {
        let mut decoder = FrameDecoder::new();
        let second = encode(TAG_CCT, &[0x01, 0x0A, 0x09]).unwrap();

        let mut data = STATUS_100.to_vec();
        data.extend_from_slice(&second);

        let frames = decoder.feed(&data);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].payload()[1], 100);
        assert_eq!(frames[1].payload()[1], 10);
        assert!(decoder.next_frame().is_none());
    }

    #[test]
    fn test_frame_decoder_counts_discarded() {
        let mut decoder = FrameDecoder::new();
        let mut data = vec![0xFF, 0xFF, 0x3A];
        data.extend_from_slice(&STATUS_100);

        let frames = decoder.feed(&data);
        assert_eq!(frames.len(), 1);
        assert_eq!(decoder.discarded_bytes(), 3);
    }

    #[test]
    fn test_frame_decoder_one_byte_at_a_time() {
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for &b in STATUS_100.iter().chain(STATUS_100.iter()) {
            frames.extend(decoder.feed(&[b]));
        }
        assert_eq!(frames.len(), 2);
    }

    /// Garbage that can never be mistaken for a frame: bytes other than the
    /// prefix, plus self-contained stray headers with a wrong checksum.
    fn garbage() -> impl Strategy<Value = Vec<u8>> {
        let byte = || any::<u8>().prop_filter("not a prefix", |b| *b != FRAME_PREFIX);
        let noise = byte().prop_map(|b| vec![b]);
        let stray = (byte(), byte(), byte())
            .prop_filter("checksum must be wrong", |(tag, hi, lo)| {
                frame_checksum(*tag, &[]) != u16::from_be_bytes([*hi, *lo])
            })
            .prop_map(|(tag, hi, lo)| vec![FRAME_PREFIX, tag, 0x00, hi, lo]);
        proptest::collection::vec(prop_oneof![3 => noise, 1 => stray], 0..32)
            .prop_map(|chunks| chunks.concat())
    }

    proptest! {
        #[test]
        fn prop_round_trip(tag in any::<u8>(), payload in proptest::collection::vec(any::<u8>(), 0..=255)) {
            let encoded = encode(tag, &payload).unwrap();
            let (frame, consumed) = decode(&encoded);
            let frame = frame.expect("round trip should decode");
            prop_assert_eq!(consumed, encoded.len());
            prop_assert_eq!(frame.tag(), tag);
            prop_assert_eq!(frame.payload(), payload.as_slice());
            prop_assert_eq!(frame, Frame::new(tag, &payload).unwrap());
        }

        #[test]
        fn prop_split_stream_equivalence(
            tag in any::<u8>(),
            payload in proptest::collection::vec(any::<u8>(), 0..=255),
            split in any::<prop::sample::Index>(),
        ) {
            let encoded = encode(tag, &payload).unwrap();
            let at = split.index(encoded.len() + 1);

            let mut whole = FrameDecoder::new();
            let expected = whole.feed(&encoded);

            let mut parts = FrameDecoder::new();
            let mut got = parts.feed(&encoded[..at]);
            got.extend(parts.feed(&encoded[at..]));

            prop_assert_eq!(expected.len(), 1);
            prop_assert_eq!(got, expected);
        }

        #[test]
        fn prop_resync_after_garbage(
            junk in garbage(),
            brightness in 0u8..=100,
            temp in any::<u8>(),
        ) {
            let frame = Frame::new(TAG_CCT, &[CCT_MODE, brightness, temp]).unwrap();
            let mut data = junk.clone();
            data.extend_from_slice(&frame.encode());

            let mut decoder = FrameDecoder::new();
            let frames = decoder.feed(&data);

            prop_assert_eq!(frames, vec![frame]);
            prop_assert_eq!(decoder.buffered_len(), 0);
            prop_assert_eq!(decoder.discarded_bytes(), junk.len() as u64);
        }
    }
}
