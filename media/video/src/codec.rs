use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageFormat};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("frame of {width}x{height} needs {expected} bytes of RGB data, got {len}")]
    InvalidFrame {
        width: u32,
        height: u32,
        expected: usize,
        len: usize,
    },
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// Uncompressed video frame, packed 8 bit RGB
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, data: impl Into<Bytes>) -> Result<Self, CodecError> {
        let data = data.into();
        let expected = width as usize * height as usize * 3;

        if data.len() != expected {
            return Err(CodecError::InvalidFrame {
                width,
                height,
                expected,
                len: data.len(),
            });
        }

        Ok(Self {
            width,
            height,
            data,
        })
    }
}

/// Lossy JPEG compression of [`VideoFrame`]s
#[derive(Debug, Clone, Copy)]
pub struct JpegCodec {
    quality: u8,
}

impl JpegCodec {
    /// `quality` ranges from 1 to 100
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn encode(&self, frame: &VideoFrame) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();

        JpegEncoder::new_with_quality(&mut out, self.quality).encode(
            &frame.data,
            frame.width,
            frame.height,
            ExtendedColorType::Rgb8,
        )?;

        Ok(out)
    }

    pub fn decode(&self, jpeg: &[u8]) -> Result<VideoFrame, CodecError> {
        let image = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)?.to_rgb8();

        Ok(VideoFrame {
            width: image.width(),
            height: image.height(),
            data: Bytes::from(image.into_raw()),
        })
    }
}

impl Default for JpegCodec {
    fn default() -> Self {
        Self::new(60)
    }
}
