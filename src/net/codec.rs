use bytes::{Buf, BufMut, BytesMut};
use std::convert::TryInto;
use tokio::io;
use tokio_util::codec::{Decoder, Encoder};

/// Total size in bytes used for storing a frame's length prefix.
const LEN_SIZE: usize = 8;

#[inline]
fn frame_size(msg_size: usize) -> usize {
    LEN_SIZE + msg_size
}

/// Length-prefixed framing codec shared by every RMI connection: each frame is an 8-byte
/// big-endian length followed by that many bytes of CBOR-encoded payload.
///
/// This is the wire-level "stream header" referenced by the skeleton's per-connection
/// protocol - the receiver cannot make progress on a frame until the sender has committed to
/// (and therefore written) its length prefix.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct FrameCodec;

impl<'a> Encoder<&'a [u8]> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: &'a [u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(frame_size(item.len()));
        dst.put_u64(item.len() as u64);
        dst.put(item);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Vec<u8>;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LEN_SIZE {
            return Ok(None);
        }

        let msg_len = u64::from_be_bytes(src[..LEN_SIZE].try_into().unwrap());
        if msg_len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "frame cannot have a message length of 0",
            ));
        }

        let frame_len = frame_size(msg_len as usize);
        if src.len() >= frame_len {
            let data = src[LEN_SIZE..frame_len].to_vec();
            src.advance(frame_len);
            Ok(Some(data))
        } else {
            Ok(None)
        }
    }
}
