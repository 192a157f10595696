//! Audio transport engine.
//!
//! Captures 20ms chunks of linear PCM, compresses them with G.711 μ-law, prefixes every
//! chunk with a 2 byte sequence number and sends it as a single UDP datagram. Received
//! datagrams are decompressed and handed to the playback device in arrival order.
//!
//! There is no jitter buffer: reordered or lost packets are accepted as audible artifacts.

#![warn(unreachable_pub)]

mod device;
mod engine;
mod packet;

pub use device::{AudioCapture, AudioDevices, AudioFormat, AudioPlayback, DeviceError};
pub use engine::{AudioConfig, AudioEngine, AudioStats, EngineError};
pub use packet::{AudioPacket, HEADER_LEN};
