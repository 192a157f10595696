//! Video transport engine.
//!
//! Frames are captured at a small fixed resolution, compressed to JPEG and split into chunks
//! that each fit into a single UDP datagram. The receiving side collects chunks per frame id,
//! decodes completed frames and hands them to a callback.
//!
//! Every chunk carries a 12 byte header:
//!
//! ```text
//! [u64 BE frame id][u16 BE total chunks][u16 BE chunk index][JPEG fragment]
//! ```

#![warn(unreachable_pub)]

mod codec;
mod device;
mod engine;
mod packet;
mod reassembly;

pub use codec::{CodecError, JpegCodec, VideoFrame};
pub use device::{DeviceError, VideoCapture, VideoDevices};
pub use engine::{EngineError, FrameCallback, VideoConfig, VideoEngine, VideoStats};
pub use packet::{Chunk, ChunkHeader, FragmentError, HEADER_LEN, fragment};
pub use reassembly::{ChunkRejected, FrameReassembler};
