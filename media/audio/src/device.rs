use async_trait::async_trait;
use std::io;

/// PCM format the devices are opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    /// Narrowband telephony: 8 kHz mono, 16 bit signed samples
    pub const NARROWBAND: AudioFormat = AudioFormat {
        sample_rate: 8000,
        channels: 1,
    };
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("no {0} device available")]
    Unavailable(&'static str),
    #[error("audio format {0:?} is not supported by the device")]
    UnsupportedFormat(AudioFormat),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Microphone or any other source of linear PCM samples
#[async_trait]
pub trait AudioCapture: Send {
    /// Wait for the next chunk and write it into `samples`.
    ///
    /// Returns the number of samples written, `0` signals that the source has ended.
    async fn read(&mut self, samples: &mut [i16]) -> Result<usize, DeviceError>;
}

/// Speaker or any other sink of linear PCM samples
#[async_trait]
pub trait AudioPlayback: Send {
    async fn write(&mut self, samples: &[i16]) -> Result<(), DeviceError>;
}

/// Opens capture & playback devices for the engine.
///
/// Devices are opened every time the engine starts and released (dropped) when it stops.
pub trait AudioDevices: Send + Sync {
    fn open_capture(&self, format: AudioFormat) -> Result<Box<dyn AudioCapture>, DeviceError>;

    fn open_playback(&self, format: AudioFormat) -> Result<Box<dyn AudioPlayback>, DeviceError>;
}
