//! WebSocket handshake and framing, the subset the log/command channel
//! needs: HTTP upgrade on accept, binary frames in both directions,
//! client-side masking honored on decode, no fragmentation.

use crate::error::{Error, ErrorKind, Result};
use base64::Engine as _;
use sha1::{Digest, Sha1};

pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

pub const OP_CONT: u8 = 0x0;
pub const OP_TEXT: u8 = 0x1;
pub const OP_BIN: u8 = 0x2;
pub const OP_CLOSE: u8 = 0x8;

/// Derives the `Sec-WebSocket-Accept` value for a client key.
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// Parses an HTTP upgrade request and produces the `101 Switching
/// Protocols` response. Fails with `ParseFailed` when no
/// `Sec-WebSocket-Key` header is present.
pub fn handshake_response(request: &str) -> Result<String> {
    let key = request
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case("Sec-WebSocket-Key")
                .then(|| value.trim().to_string())
        })
        .ok_or_else(|| Error::new(ErrorKind::ParseFailed))?;

    Ok(format!(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\
         Connection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n\r\n",
        accept_key(&key)
    ))
}

/// Does this buffer begin like an HTTP upgrade rather than a protocol
/// frame?
pub fn looks_like_http(buf: &[u8]) -> bool {
    buf.starts_with(b"GET ")
}

/// Outcome of one decode step.
#[derive(Debug, PartialEq, Eq)]
pub enum WsDecode {
    /// Not enough input for a complete frame; consume nothing and wait.
    NeedMore,
    Frame {
        opcode: u8,
        fin: bool,
        payload: Vec<u8>,
        /// Bytes of input this frame consumed.
        consumed: usize,
    },
}

/// Decodes one frame from the front of `input`. A frame's payload may
/// concatenate multiple inner protocol messages; the caller loops over
/// both frames and messages.
pub fn ws_decode(input: &[u8]) -> Result<WsDecode> {
    if input.len() < 2 {
        return Ok(WsDecode::NeedMore);
    }

    let fin = input[0] & 0x80 != 0;
    let opcode = input[0] & 0x0f;
    let masked = input[1] & 0x80 != 0;
    let len7 = (input[1] & 0x7f) as usize;

    let mut off = 2;
    let len = match len7 {
        126 => {
            if input.len() < off + 2 {
                return Ok(WsDecode::NeedMore);
            }
            let len = u16::from_be_bytes([input[off], input[off + 1]]) as usize;
            off += 2;
            len
        }
        127 => {
            if input.len() < off + 8 {
                return Ok(WsDecode::NeedMore);
            }
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&input[off..off + 8]);
            let len = u64::from_be_bytes(bytes);
            if len > usize::MAX as u64 {
                return Err(Error::new(ErrorKind::TooLarge));
            }
            off += 8;
            len as usize
        }
        len => len,
    };

    let mask = if masked {
        if input.len() < off + 4 {
            return Ok(WsDecode::NeedMore);
        }
        let mask = [input[off], input[off + 1], input[off + 2], input[off + 3]];
        off += 4;
        Some(mask)
    } else {
        None
    };

    if input.len() < off + len {
        return Ok(WsDecode::NeedMore);
    }

    let mut payload = input[off..off + len].to_vec();
    if let Some(mask) = mask {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= mask[i % 4];
        }
    }

    Ok(WsDecode::Frame {
        opcode,
        fin,
        payload,
        consumed: off + len,
    })
}

/// Wraps a payload in a single unmasked `fin=1, opcode=binary` frame,
/// picking the 7/16/64-bit length encoding as needed.
pub fn ws_encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 10);
    out.push(0x80 | OP_BIN);

    if payload.len() <= 125 {
        out.push(payload.len() as u8);
    } else if payload.len() <= u16::MAX as usize {
        out.push(126);
        out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    } else {
        out.push(127);
        out.extend_from_slice(&(payload.len() as u64).to_be_bytes());
    }

    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc_sample_accept_key() {
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn handshake_reply_contains_accept() {
        let request = "GET /chat HTTP/1.1\r\n\
                       Host: server.example.com\r\n\
                       Upgrade: websocket\r\n\
                       Connection: Upgrade\r\n\
                       Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
                       Sec-WebSocket-Version: 13\r\n\r\n";
        let reply = handshake_response(request).unwrap();
        assert!(reply.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(reply.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
    }

    #[test]
    fn handshake_without_key_fails() {
        let err = handshake_response("GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseFailed);
    }

    fn round_trip(payload: &[u8]) -> (Vec<u8>, usize) {
        let wire = ws_encode(payload);
        match ws_decode(&wire).unwrap() {
            WsDecode::Frame {
                opcode,
                fin,
                payload,
                consumed,
            } => {
                assert_eq!(opcode, OP_BIN);
                assert!(fin);
                (payload, consumed)
            }
            WsDecode::NeedMore => panic!("complete frame reported short"),
        }
    }

    #[test]
    fn small_payload_has_two_byte_header() {
        for len in [0usize, 1, 125] {
            let payload = vec![0xab; len];
            let wire = ws_encode(&payload);
            assert_eq!(wire.len(), 2 + len);
            let (decoded, consumed) = round_trip(&payload);
            assert_eq!(decoded, payload);
            assert_eq!(consumed, wire.len());
        }
    }

    #[test]
    fn medium_payload_adds_two_length_bytes() {
        for len in [126usize, 1000, 65535] {
            let payload = vec![0xcd; len];
            let wire = ws_encode(&payload);
            assert_eq!(wire.len(), 4 + len);
            let (decoded, _) = round_trip(&payload);
            assert_eq!(decoded, payload);
        }
    }

    #[test]
    fn large_payload_adds_eight_length_bytes() {
        let payload = vec![0xef; 70_000];
        let wire = ws_encode(&payload);
        assert_eq!(wire.len(), 10 + payload.len());
        let (decoded, _) = round_trip(&payload);
        assert_eq!(decoded, payload);
    }

    #[test]
    fn masked_payload_is_unmasked() {
        // hand-built masked frame: "abcd" xor mask
        let mask = [0x10u8, 0x20, 0x30, 0x40];
        let clear = b"abcd";
        let mut wire = vec![0x80 | OP_BIN, 0x80 | 4];
        wire.extend_from_slice(&mask);
        wire.extend(clear.iter().zip(mask.iter().cycle()).map(|(b, m)| b ^ m));

        match ws_decode(&wire).unwrap() {
            WsDecode::Frame { payload, .. } => assert_eq!(payload, clear),
            WsDecode::NeedMore => panic!("short"),
        }
    }

    #[test]
    fn arbitrary_splits_never_yield_spurious_frames() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(300).collect();
        let wire = ws_encode(&payload);

        for cut in 1..wire.len() {
            // first half alone: must report short without consuming
            match ws_decode(&wire[..cut]).unwrap() {
                WsDecode::NeedMore => {}
                WsDecode::Frame { .. } => panic!("frame decoded from {cut} bytes"),
            }
            // the reassembled whole decodes to the original
            let mut rejoined = wire[..cut].to_vec();
            rejoined.extend_from_slice(&wire[cut..]);
            match ws_decode(&rejoined).unwrap() {
                WsDecode::Frame { payload: got, consumed, .. } => {
                    assert_eq!(got, payload);
                    assert_eq!(consumed, wire.len());
                }
                WsDecode::NeedMore => panic!("whole frame reported short"),
            }
        }
    }
}
