//! The fixed 64-byte greeting exchanged first on every connection.
//!
//! Layout:
//! ```text
//! [0]      0xFF          signature head
//! [1..8]   padding
//! [8]      0x01          signature mark
//! [9]      0x7F          signature tail
//! [10]     major version
//! [11]     minor version
//! [12..32] security mechanism (ASCII, NUL-padded to 20 bytes)
//! [32]     as-server flag
//! [33..64] padding
//! ```
//!
//! Only the NULL security mechanism is supported.

use bytes::Bytes;

use crate::codec::{Decoder, Encoder};
use crate::error::{Result, WireError};

/// A greeting is always exactly 64 bytes.
pub const GREETING_SIZE: usize = 64;

pub(crate) const SIG_HEAD: u8 = 0xFF;
pub(crate) const SIG_MARK: u8 = 0x01;
pub(crate) const SIG_TAIL: u8 = 0x7F;

const MECHANISM_NULL: &str = "NULL";
const MECHANISM_FIELD: usize = 20;

/// Parsed (or to-be-encoded) greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    major: u8,
    minor: u8,
    mechanism: String,
    as_server: bool,
}

impl Default for Greeting {
    fn default() -> Self {
        Self::new(3, 0)
    }
}

impl Greeting {
    /// Greeting for the given protocol version, NULL mechanism, client role.
    #[must_use]
    pub fn new(major: u8, minor: u8) -> Self {
        Self {
            major,
            minor,
            mechanism: MECHANISM_NULL.to_string(),
            as_server: false,
        }
    }

    #[must_use]
    pub const fn major(&self) -> u8 {
        self.major
    }

    #[must_use]
    pub const fn minor(&self) -> u8 {
        self.minor
    }

    #[must_use]
    pub fn mechanism(&self) -> &str {
        &self.mechanism
    }

    #[must_use]
    pub const fn as_server(&self) -> bool {
        self.as_server
    }

    #[must_use]
    pub fn is_null_mechanism(&self) -> bool {
        self.mechanism == MECHANISM_NULL
    }

    /// Encode into the fixed 64-byte wire form.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut enc = Encoder::with_capacity(GREETING_SIZE);

        // Signature
        enc.put_u8(SIG_HEAD);
        enc.put_slice(&[0u8; 7]);
        enc.put_u8(SIG_MARK);
        enc.put_u8(SIG_TAIL);

        // Version
        enc.put_u8(self.major);
        enc.put_u8(self.minor);

        // Mechanism, NUL-padded to 20 bytes
        let mech = self.mechanism.as_bytes();
        let mech = &mech[..mech.len().min(MECHANISM_FIELD)];
        enc.put_slice(mech);
        enc.put_slice(&vec![0u8; MECHANISM_FIELD - mech.len()]);

        // As-server flag
        enc.put_u8(u8::from(self.as_server));

        // Padding
        enc.put_slice(&[0u8; 31]);

        enc.freeze()
    }

    /// Parse a 64-byte greeting.
    ///
    /// A peer that does not present the fixed signature bytes is not a
    /// valid peer of this protocol. Trailing NULs are stripped from the
    /// mechanism field; interior NULs would make the name invalid anyway,
    /// so only the tail is trimmed.
    pub fn parse(src: &[u8]) -> Result<Self> {
        if src.len() < GREETING_SIZE {
            return Err(WireError::handshake(format!(
                "short greeting: {} of {GREETING_SIZE} bytes",
                src.len()
            )));
        }

        let dec = Decoder::new(src);
        let head = dec.read_u8(0)?;
        let mark = dec.read_u8(8)?;
        let tail = dec.read_u8(9)?;
        if head != SIG_HEAD || mark != SIG_MARK || tail != SIG_TAIL {
            return Err(WireError::handshake(format!(
                "bad signature: {head:#04x}..{mark:#04x} {tail:#04x}"
            )));
        }

        let major = dec.read_u8(10)?;
        let minor = dec.read_u8(11)?;

        let mechanism = dec
            .read_str(12, MECHANISM_FIELD)
            .map_err(|_| WireError::handshake("mechanism field is not ASCII"))?
            .trim_end_matches('\0')
            .to_string();

        let as_server = dec.read_u8(32)? & 0x01 != 0;

        Ok(Self {
            major,
            minor,
            mechanism,
            as_server,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let b = Greeting::new(3, 0).encode();
        assert_eq!(b.len(), GREETING_SIZE);
        assert_eq!(b[0], 0xFF);
        assert_eq!(b[8], 0x01);
        assert_eq!(b[9], 0x7F);

        let g = Greeting::parse(&b).unwrap();
        assert_eq!(g.major(), 3);
        assert_eq!(g.minor(), 0);
        assert_eq!(g.mechanism(), "NULL");
        assert!(!g.as_server());
    }

    #[test]
    fn bad_signature_rejected() {
        let mut b = Greeting::default().encode().to_vec();
        b[0] = 0x00;
        assert!(matches!(
            Greeting::parse(&b),
            Err(WireError::Handshake(_))
        ));
    }

    #[test]
    fn short_buffer_rejected() {
        let b = Greeting::default().encode();
        assert!(Greeting::parse(&b[..63]).is_err());
    }

    #[test]
    fn mechanism_trims_only_trailing_nuls() {
        let b = Greeting::default().encode();
        let g = Greeting::parse(&b).unwrap();
        // "NULL" ends right next to the NUL padding and must survive intact.
        assert_eq!(g.mechanism(), "NULL");
        assert!(g.is_null_mechanism());
    }
}
