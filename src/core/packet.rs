use crate::config::{MAGIC_BYTES, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};
use crate::error::{NemoriaError, Result};

/// Size of the fixed header: magic (4) + version (1) + length (4).
pub const HEADER_SIZE: usize = 9;

/// One length-delimited frame of the wire protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub version: u8,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload,
        }
    }

    /// Serialize to `[magic][version][len BE][payload]`.
    ///
    /// Payloads over [`MAX_PAYLOAD_SIZE`] are refused with `OversizedPacket`.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        self.write_header(&mut out)?;
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    pub(crate) fn write_header(&self, out: &mut impl Extend<u8>) -> Result<()> {
        let length = self.payload.len();
        if length > MAX_PAYLOAD_SIZE {
            return Err(NemoriaError::OversizedPacket(length));
        }
        let length = u32::try_from(length).map_err(|_| NemoriaError::OversizedPacket(length))?;
        out.extend(MAGIC_BYTES);
        out.extend([self.version]);
        out.extend(length.to_be_bytes());
        Ok(())
    }

    /// Validate a header and return the payload length it announces.
    ///
    /// `header` must hold at least [`HEADER_SIZE`] bytes.
    pub fn parse_header(header: &[u8]) -> Result<usize> {
        if header.len() < HEADER_SIZE || header[0..4] != MAGIC_BYTES {
            return Err(NemoriaError::InvalidHeader);
        }
        let version = header[4];
        if version != PROTOCOL_VERSION {
            return Err(NemoriaError::UnsupportedVersion(version));
        }
        let length = u32::from_be_bytes([header[5], header[6], header[7], header[8]]) as usize;
        if length > MAX_PAYLOAD_SIZE {
            return Err(NemoriaError::OversizedPacket(length));
        }
        Ok(length)
    }

    /// Parse one complete packet from `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let length = Self::parse_header(bytes)?;
        let end = HEADER_SIZE + length;
        if bytes.len() < end {
            return Err(NemoriaError::InvalidHeader);
        }
        Ok(Self {
            version: bytes[4],
            payload: bytes[HEADER_SIZE..end].to_vec(),
        })
    }
}
