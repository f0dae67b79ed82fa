//! RFC 6455 frame encoding and incremental decoding
//!
//! Frames are written in one piece: header (FIN/opcode byte, 7, 16 or 64
//! bit length, optional masking key) followed by the payload, masked when
//! the writer is a client.
//!
//! Reading happens on non-blocking sockets, so [`FrameDecoder`] accepts
//! input in arbitrary pieces and walks through four stages: the first two
//! header bytes, the header length they imply, the rest of the header,
//! and finally the payload.

use crate::error::{Result, WebSocketError};

const FIN: u8 = 0x80;
const RESERVED: u8 = 0x70;
const MASKED: u8 = 0x80;
const MAX_CONTROL_PAYLOAD: u64 = 125;

/// Frame opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Opcode::Continuation),
            0x1 => Some(Opcode::Text),
            0x2 => Some(Opcode::Binary),
            0x8 => Some(Opcode::Close),
            0x9 => Some(Opcode::Ping),
            0xA => Some(Opcode::Pong),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Opcode::Continuation => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
        }
    }

    /// Close, ping and pong
    pub fn is_control(self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }
}

/// A decoded frame with its payload unmasked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

/// XOR `data` with `mask`, where `data` starts `offset` bytes into the payload
pub fn apply_mask(data: &mut [u8], mask: [u8; 4], offset: usize) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[(offset + i) % 4];
    }
}

/// Encode a frame header for a payload of `len` bytes
pub fn encode_header(opcode: Opcode, fin: bool, len: u64, mask: Option<[u8; 4]>) -> Vec<u8> {
    let mut head = Vec::with_capacity(14);
    head.push(if fin { FIN } else { 0 } | opcode.as_u8());

    let mask_bit = if mask.is_some() { MASKED } else { 0 };
    if len < 126 {
        head.push(mask_bit | len as u8);
    } else if len < 0x10000 {
        head.push(mask_bit | 126);
        head.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        head.push(mask_bit | 127);
        head.extend_from_slice(&len.to_be_bytes());
    }

    if let Some(key) = mask {
        head.extend_from_slice(&key);
    }
    head
}

/// Encode a complete frame, masking the payload when a key is given
pub fn encode_frame(opcode: Opcode, fin: bool, payload: &[u8], mask: Option<[u8; 4]>) -> Vec<u8> {
    let mut out = encode_header(opcode, fin, payload.len() as u64, mask);
    let start = out.len();
    out.extend_from_slice(payload);
    if let Some(key) = mask {
        apply_mask(&mut out[start..], key, 0);
    }
    out
}

/// Result of feeding bytes to a [`FrameDecoder`]
#[derive(Debug, PartialEq, Eq)]
pub enum DecodeStatus {
    /// All input was consumed and the frame is not complete yet
    Incomplete,
    /// A frame is complete; bytes past `consumed` belong to the next one
    Complete { frame: Frame, consumed: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Head,
    Header,
    Payload,
}

/// Incremental frame decoder
#[derive(Debug)]
pub struct FrameDecoder {
    stage: Stage,
    require_mask: bool,
    max_payload: u64,
    head: [u8; 14],
    head_read: usize,
    head_len: usize,
    opcode: Opcode,
    mask: Option<[u8; 4]>,
    payload_len: usize,
    payload: Vec<u8>,
}

impl FrameDecoder {
    /// Create a decoder; `require_mask` is set when reading frames sent by a client
    pub fn new(require_mask: bool) -> Self {
        Self {
            stage: Stage::Head,
            require_mask,
            max_payload: u64::MAX,
            head: [0; 14],
            head_read: 0,
            head_len: 2,
            opcode: Opcode::Continuation,
            mask: None,
            payload_len: 0,
            payload: Vec::new(),
        }
    }

    /// Reject frames with payloads above `max` bytes
    pub fn with_max_payload(mut self, max: usize) -> Self {
        self.max_payload = max as u64;
        self
    }

    /// Feed input, returning at most one complete frame
    pub fn push(&mut self, data: &[u8]) -> Result<DecodeStatus> {
        let mut pos = 0;
        loop {
            match self.stage {
                Stage::Head => {
                    pos += self.fill_head(2, &data[pos..]);
                    if self.head_read < 2 {
                        return Ok(DecodeStatus::Incomplete);
                    }
                    if let Err(e) = self.check_head() {
                        self.reset();
                        return Err(e);
                    }
                    self.stage = Stage::Header;
                }
                Stage::Header => {
                    pos += self.fill_head(self.head_len, &data[pos..]);
                    if self.head_read < self.head_len {
                        return Ok(DecodeStatus::Incomplete);
                    }
                    if let Err(e) = self.read_header() {
                        self.reset();
                        return Err(e);
                    }
                    self.stage = Stage::Payload;
                }
                Stage::Payload => {
                    let start = self.payload.len();
                    let take = (self.payload_len - start).min(data.len() - pos);
                    self.payload.extend_from_slice(&data[pos..pos + take]);
                    pos += take;
                    if let Some(mask) = self.mask {
                        apply_mask(&mut self.payload[start..], mask, start);
                    }
                    if self.payload.len() < self.payload_len {
                        return Ok(DecodeStatus::Incomplete);
                    }

                    let frame = Frame {
                        fin: self.head[0] & FIN != 0,
                        opcode: self.opcode,
                        payload: std::mem::take(&mut self.payload),
                    };
                    self.reset();
                    return Ok(DecodeStatus::Complete { frame, consumed: pos });
                }
            }
        }
    }

    fn fill_head(&mut self, upto: usize, data: &[u8]) -> usize {
        let take = upto.saturating_sub(self.head_read).min(data.len());
        self.head[self.head_read..self.head_read + take].copy_from_slice(&data[..take]);
        self.head_read += take;
        take
    }

    /// Stages one and two: validate the first bytes, size the header
    fn check_head(&mut self) -> Result<()> {
        let (b0, b1) = (self.head[0], self.head[1]);
        if b0 & RESERVED != 0 {
            return Err(WebSocketError::Protocol("reserved bits set".to_string()));
        }

        self.opcode = Opcode::from_u8(b0 & 0x0f)
            .ok_or_else(|| WebSocketError::Protocol(format!("unknown opcode 0x{:x}", b0 & 0x0f)))?;

        let masked = b1 & MASKED != 0;
        if self.require_mask && !masked {
            return Err(WebSocketError::Protocol("unmasked frame from client".to_string()));
        }

        let len7 = b1 & 0x7f;
        if self.opcode.is_control() && (b0 & FIN == 0 || u64::from(len7) > MAX_CONTROL_PAYLOAD) {
            return Err(WebSocketError::Protocol("invalid control frame".to_string()));
        }

        let extended = match len7 {
            126 => 2,
            127 => 8,
            _ => 0,
        };
        self.head_len = 2 + extended + if masked { 4 } else { 0 };
        Ok(())
    }

    /// Stage three: payload length and masking key
    fn read_header(&mut self) -> Result<()> {
        let len7 = self.head[1] & 0x7f;
        let (len, key_at) = match len7 {
            126 => (u64::from(u16::from_be_bytes([self.head[2], self.head[3]])), 4),
            127 => {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&self.head[2..10]);
                (u64::from_be_bytes(bytes), 10)
            }
            n => (u64::from(n), 2),
        };

        if len > self.max_payload || usize::try_from(len).is_err() {
            return Err(WebSocketError::Protocol(format!("frame of {} bytes exceeds limit", len)));
        }

        self.mask = if self.head[1] & MASKED != 0 {
            let mut key = [0u8; 4];
            key.copy_from_slice(&self.head[key_at..key_at + 4]);
            Some(key)
        } else {
            None
        };

        self.payload_len = len as usize;
        self.payload = Vec::with_capacity(self.payload_len.min(64 * 1024));
        Ok(())
    }

    fn reset(&mut self) {
        self.stage = Stage::Head;
        self.head_read = 0;
        self.head_len = 2;
        self.mask = None;
        self.payload_len = 0;
        self.payload.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    const KEY: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

    fn decode_all(decoder: &mut FrameDecoder, data: &[u8]) -> Frame {
        match decoder.push(data).unwrap() {
            DecodeStatus::Complete { frame, consumed } => {
                assert_eq!(consumed, data.len());
                frame
            }
            DecodeStatus::Incomplete => panic!("frame not complete"),
        }
    }

    #[rstest]
    #[case(0, vec![0x81, 0x00])]
    #[case(125, vec![0x81, 125])]
    #[case(126, vec![0x81, 126, 0x00, 126])]
    #[case(65535, vec![0x81, 126, 0xff, 0xff])]
    #[case(65536, vec![0x81, 127, 0, 0, 0, 0, 0, 1, 0, 0])]
    fn test_header_length_forms(#[case] len: u64, #[case] expected: Vec<u8>) {
        assert_eq!(encode_header(Opcode::Text, true, len, None), expected);
    }

    #[test]
    fn test_rfc_masked_hello() {
        // RFC 6455 section 5.7
        let frame = encode_frame(Opcode::Text, true, b"Hello", Some(KEY));
        assert_eq!(frame, vec![0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58]);

        let mut decoder = FrameDecoder::new(true);
        let decoded = decode_all(&mut decoder, &frame);
        assert_eq!(decoded.payload, b"Hello");
        assert_eq!(decoded.opcode, Opcode::Text);
        assert!(decoded.fin);
    }

    #[test]
    fn test_byte_by_byte_input() {
        let payload = vec![7u8; 300];
        let frame = encode_frame(Opcode::Binary, true, &payload, Some(KEY));
        let mut decoder = FrameDecoder::new(true);

        for byte in &frame[..frame.len() - 1] {
            assert_eq!(decoder.push(std::slice::from_ref(byte)).unwrap(), DecodeStatus::Incomplete);
        }
        let last = decode_all(&mut decoder, &frame[frame.len() - 1..]);
        assert_eq!(last.payload, payload);
    }

    #[test]
    fn test_two_frames_in_one_read() {
        let mut data = encode_frame(Opcode::Ping, true, b"abc", None);
        let first_len = data.len();
        data.extend(encode_frame(Opcode::Text, true, b"{}", None));

        let mut decoder = FrameDecoder::new(false);
        let status = decoder.push(&data).unwrap();
        let DecodeStatus::Complete { frame, consumed } = status else {
            panic!("expected a frame");
        };
        assert_eq!(frame.opcode, Opcode::Ping);
        assert_eq!(consumed, first_len);

        let second = decode_all(&mut decoder, &data[consumed..]);
        assert_eq!(second.payload, b"{}");
    }

    #[test]
    fn test_reserved_bits_rejected() {
        let mut frame = encode_frame(Opcode::Text, true, b"x", Some(KEY));
        frame[0] |= 0x40;
        let mut decoder = FrameDecoder::new(true);
        assert!(matches!(decoder.push(&frame), Err(WebSocketError::Protocol(_))));
    }

    #[test]
    fn test_unmasked_client_frame_rejected() {
        let frame = encode_frame(Opcode::Text, true, b"x", None);
        assert!(FrameDecoder::new(true).push(&frame).is_err());
        assert!(FrameDecoder::new(false).push(&frame).is_ok());
    }

    #[test]
    fn test_unknown_opcode_rejected() {
        let mut decoder = FrameDecoder::new(false);
        assert!(decoder.push(&[0x83, 0x00]).is_err());
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let header = encode_header(Opcode::Binary, true, 2048, None);
        let mut decoder = FrameDecoder::new(false).with_max_payload(1024);
        assert!(decoder.push(&header).is_err());
    }

    #[test]
    fn test_fragmented_ping_rejected() {
        let frame = encode_frame(Opcode::Ping, false, b"", None);
        assert!(FrameDecoder::new(false).push(&frame).is_err());
    }

    proptest! {
        #[test]
        fn test_masked_round_trip(
            len in prop::sample::select(vec![0usize, 1, 125, 126, 127, 65535, 65536]),
            mask in any::<[u8; 4]>(),
            fin in any::<bool>(),
            seed in any::<u8>(),
            split in 0usize..70000,
        ) {
            let payload: Vec<u8> = (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect();
            let opcode = if fin { Opcode::Text } else { Opcode::Binary };
            let encoded = encode_frame(opcode, fin, &payload, Some(mask));

            let split = split.min(encoded.len());
            let mut decoder = FrameDecoder::new(true);
            let frame = match decoder.push(&encoded[..split]).unwrap() {
                DecodeStatus::Complete { frame, consumed } => {
                    prop_assert_eq!(consumed, encoded.len());
                    frame
                }
                DecodeStatus::Incomplete => match decoder.push(&encoded[split..]).unwrap() {
                    DecodeStatus::Complete { frame, .. } => frame,
                    DecodeStatus::Incomplete => panic!("frame not complete"),
                },
            };

            prop_assert_eq!(frame.payload, payload);
            prop_assert_eq!(frame.opcode, opcode);
            prop_assert_eq!(frame.fin, fin);
        }
    }
}
