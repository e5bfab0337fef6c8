//! Frame-oriented transport shared by every stub and skeleton.

mod codec;
pub use codec::FrameCodec;

mod transport;
pub use transport::{InmemoryStream, InmemoryTransport, Transport, TransportReader, TransportWriter};
