use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::packet::{Packet, HEADER_SIZE};
use crate::error::NemoriaError;

/// Tokio codec framing [`Packet`]s over a byte stream.
///
/// The header is validated as soon as it is buffered, so an oversized length
/// claim is rejected before any payload memory is reserved.
#[derive(Debug, Default, Clone, Copy)]
pub struct PacketCodec;

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = NemoriaError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, NemoriaError> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let length = Packet::parse_header(&src[..HEADER_SIZE])?;
        let total = HEADER_SIZE + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let version = src[4];
        let mut frame = src.split_to(total);
        frame.advance(HEADER_SIZE);
        Ok(Some(Packet {
            version,
            payload: frame.to_vec(),
        }))
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = NemoriaError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), NemoriaError> {
        let mut header = Vec::with_capacity(HEADER_SIZE);
        item.write_header(&mut header)?;
        dst.reserve(HEADER_SIZE + item.payload.len());
        dst.put_slice(&header);
        dst.put_slice(&item.payload);
        Ok(())
    }
}
