//! Framing layer: everything after the greeting travels in frames.
//!
//! A frame is a flags byte, a length, then the payload. Bit 0 of the
//! flags is MORE (another frame of the same message follows), bit 1 is
//! LONG (8-byte big-endian length instead of 1 byte), bit 2 is COMMAND
//! (protocol traffic such as READY rather than application data). Bits
//! 3..7 are reserved and must be zero.

use bytes::Bytes;

use crate::codec::{Decoder, Encoder};
use crate::error::{Result, WireError};

pub const FLAG_MORE: u8 = 0x01;
pub const FLAG_LONG: u8 = 0x02;
pub const FLAG_COMMAND: u8 = 0x04;

const RESERVED_MASK: u8 = 0xF8;

/// Name of the handshake-completing command.
pub const READY: &str = "READY";
/// Metadata key carrying the peer's socket type.
pub const KEY_SOCKET_TYPE: &str = "Socket-Type";
/// Metadata key carrying the peer's identity (always empty here).
pub const KEY_IDENTITY: &str = "Identity";

/// One decoded frame: either protocol traffic or application data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Command(Command),
    Data(DataFrame),
}

impl Frame {
    /// Whether another frame of the same logical message follows.
    /// Commands never span frames.
    #[must_use]
    pub fn more(&self) -> bool {
        match self {
            Self::Command(_) => false,
            Self::Data(d) => d.more,
        }
    }

    #[must_use]
    pub fn encode(&self) -> Bytes {
        match self {
            Self::Command(c) => c.encode(),
            Self::Data(d) => d.encode(),
        }
    }

    /// Decode a complete frame (flags byte, length, payload).
    pub fn decode(raw: &Bytes) -> Result<Self> {
        let dec = Decoder::new(raw);
        let flags = dec.read_u8(0)?;
        if flags & RESERVED_MASK != 0 {
            return Err(WireError::protocol(format!(
                "reserved flag bits set: {flags:#04x}"
            )));
        }

        let (body_offset, len) = if flags & FLAG_LONG != 0 {
            (9usize, usize::try_from(dec.read_u64(1)?).map_err(|_| {
                WireError::protocol("frame length exceeds addressable memory")
            })?)
        } else {
            (2usize, usize::from(dec.read_u8(1)?))
        };

        // Validate the range, then slice out of the refcounted buffer.
        dec.read_bytes(body_offset, len)?;
        let payload = raw.slice(body_offset..body_offset + len);

        if flags & FLAG_COMMAND != 0 {
            let cdec = Decoder::new(&payload);
            let name_len = usize::from(cdec.read_u8(0)?);
            let name = cdec
                .read_str(1, name_len)
                .map_err(|_| WireError::protocol("command name is not utf-8"))?
                .to_string();
            let body = payload.slice(1 + name_len..);
            Ok(Self::Command(Command { name, body }))
        } else {
            Ok(Self::Data(DataFrame {
                payload,
                more: flags & FLAG_MORE != 0,
            }))
        }
    }
}

/// Application data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub payload: Bytes,
    pub more: bool,
}

impl DataFrame {
    #[must_use]
    pub fn new(payload: impl Into<Bytes>, more: bool) -> Self {
        Self {
            payload: payload.into(),
            more,
        }
    }

    #[must_use]
    pub fn encode(&self) -> Bytes {
        let flags = if self.more { FLAG_MORE } else { 0 };
        encode_frame(flags, &self.payload)
    }
}

/// Protocol command frame: a 1-byte-length-prefixed name and a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub body: Bytes,
}

impl Command {
    /// Parse the body as alternating metadata properties: a key with a
    /// 1-byte length prefix, then a value with a 4-byte big-endian prefix.
    /// Returns the flat `[key, value, key, value, ..]` sequence.
    pub fn metadata(&self) -> Result<Vec<String>> {
        let dec = Decoder::new(&self.body);
        let mut out = Vec::new();
        let mut at = 0usize;
        while at < dec.len() {
            let klen = usize::from(dec.read_u8(at)?);
            let key = dec
                .read_str(at + 1, klen)
                .map_err(|_| WireError::protocol("metadata key is not utf-8"))?;
            at += 1 + klen;

            let vlen = dec.read_u32(at)? as usize;
            let value = dec
                .read_str(at + 4, vlen)
                .map_err(|_| WireError::protocol("metadata value is not utf-8"))?;
            at += 4 + vlen;

            out.push(key.to_string());
            out.push(value.to_string());
        }
        Ok(out)
    }

    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut enc = Encoder::with_capacity(1 + self.name.len() + self.body.len());
        enc.put_str_u8(&self.name);
        enc.put_slice(&self.body);
        encode_frame(FLAG_COMMAND, &enc.freeze())
    }
}

/// Build a READY command carrying the given metadata properties.
#[must_use]
pub fn ready(metadata: &[(&str, &str)]) -> Command {
    let body_len: usize = metadata
        .iter()
        .map(|(k, v)| 1 + k.len() + 4 + v.len())
        .sum();
    let mut enc = Encoder::with_capacity(body_len);
    for (key, value) in metadata {
        enc.put_str_u8(key);
        enc.put_str_u32(value);
    }
    Command {
        name: READY.to_string(),
        body: enc.freeze(),
    }
}

/// Encode a frame header plus payload. LONG is chosen automatically for
/// payloads that do not fit a 1-byte length.
#[must_use]
pub fn encode_frame(flags: u8, payload: &[u8]) -> Bytes {
    if payload.len() > usize::from(u8::MAX) {
        let mut enc = Encoder::with_capacity(9 + payload.len());
        enc.put_u8(flags | FLAG_LONG);
        enc.put_u64(payload.len() as u64);
        enc.put_slice(payload);
        enc.freeze()
    } else {
        let mut enc = Encoder::with_capacity(2 + payload.len());
        enc.put_u8(flags);
        enc.put_u8(payload.len() as u8);
        enc.put_slice(payload);
        enc.freeze()
    }
}

/// Header length implied by a flags byte: flags + length field.
#[must_use]
pub(crate) const fn header_len(flags: u8) -> usize {
    if flags & FLAG_LONG != 0 {
        9
    } else {
        2
    }
}

/// Payload length carried by a complete header.
pub(crate) fn body_len(header: &[u8]) -> Result<usize> {
    let dec = Decoder::new(header);
    let flags = dec.read_u8(0)?;
    if flags & FLAG_LONG != 0 {
        usize::try_from(dec.read_u64(1)?)
            .map_err(|_| WireError::protocol("frame length exceeds addressable memory"))
    } else {
        Ok(usize::from(dec.read_u8(1)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip_data(len: usize, more: bool) {
        let payload = vec![0x5A; len];
        let raw = DataFrame::new(payload.clone(), more).encode();

        let long = len > 255;
        assert_eq!(raw.len(), header_len(raw[0]) + len);
        assert_eq!(raw[0] & FLAG_LONG != 0, long);

        match Frame::decode(&raw).unwrap() {
            Frame::Data(d) => {
                assert_eq!(&d.payload[..], &payload[..]);
                assert_eq!(d.more, more);
            }
            Frame::Command(_) => panic!("decoded a command"),
        }
    }

    #[test]
    fn data_frames_roundtrip() {
        roundtrip_data(0, false);
        roundtrip_data(5, true);
        roundtrip_data(255, false);
        roundtrip_data(256, true);
        roundtrip_data(100_000, false);
    }

    #[test]
    fn ready_roundtrips_with_metadata() {
        let raw = ready(&[(KEY_SOCKET_TYPE, "REQ")]).encode();
        let frame = Frame::decode(&raw).unwrap();
        assert!(!frame.more());

        match frame {
            Frame::Command(c) => {
                assert_eq!(c.name, READY);
                assert_eq!(c.metadata().unwrap(), vec!["Socket-Type", "REQ"]);
            }
            Frame::Data(_) => panic!("decoded data"),
        }
    }

    #[test]
    fn truncated_metadata_fails() {
        let cmd = Command {
            name: READY.to_string(),
            body: Bytes::from_static(&[3, b'k', b'e', b'y', 0, 0]),
        };
        assert!(cmd.metadata().is_err());
    }

    #[test]
    fn reserved_bits_rejected() {
        let mut raw = DataFrame::new("hi", false).encode().to_vec();
        raw[0] |= 0x10;
        assert!(matches!(
            Frame::decode(&Bytes::from(raw)),
            Err(WireError::Protocol(_))
        ));
    }

    #[test]
    fn truncated_payload_rejected() {
        let raw = DataFrame::new("hello", false).encode();
        assert!(Frame::decode(&raw.slice(..raw.len() - 1)).is_err());
    }
}
