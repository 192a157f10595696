use crate::codec::VideoFrame;
use async_trait::async_trait;
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("no camera available")]
    Unavailable,
    #[error("camera does not support {width}x{height}")]
    UnsupportedResolution { width: u32, height: u32 },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Camera or any other source of frames
#[async_trait]
pub trait VideoCapture: Send {
    /// Wait for the next frame, `None` signals that the source has ended
    async fn capture(&mut self) -> Result<Option<VideoFrame>, DeviceError>;
}

/// Opens the camera every time the engine starts, it is dropped when the engine stops
pub trait VideoDevices: Send + Sync {
    fn open_camera(&self, width: u32, height: u32) -> Result<Box<dyn VideoCapture>, DeviceError>;
}
