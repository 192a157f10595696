#![allow(dead_code)]

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use talk_video::{DeviceError, VideoCapture, VideoDevices, VideoFrame};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Horizontal/vertical color gradient, compresses well
pub fn gradient(width: u32, height: u32, shift: u8) -> VideoFrame {
    let mut data = Vec::with_capacity((width * height * 3) as usize);

    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&[
                ((x * 255 / width) as u8).wrapping_add(shift),
                (y * 255 / height) as u8,
                96,
            ]);
        }
    }

    VideoFrame::new(width, height, data).unwrap()
}

/// Camera producing gradient frames as fast as they are requested
pub struct TestCamera {
    pub opened: AtomicUsize,
    available: bool,
}

impl TestCamera {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            opened: AtomicUsize::new(0),
            available: true,
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            opened: AtomicUsize::new(0),
            available: false,
        })
    }
}

struct GradientCapture {
    width: u32,
    height: u32,
    count: u8,
}

#[async_trait]
impl VideoCapture for GradientCapture {
    async fn capture(&mut self) -> Result<Option<VideoFrame>, DeviceError> {
        self.count = self.count.wrapping_add(1);
        Ok(Some(gradient(self.width, self.height, self.count)))
    }
}

impl VideoDevices for TestCamera {
    fn open_camera(&self, width: u32, height: u32) -> Result<Box<dyn VideoCapture>, DeviceError> {
        if !self.available {
            return Err(DeviceError::Unavailable);
        }

        self.opened.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(GradientCapture {
            width,
            height,
            count: 0,
        }))
    }
}

/// Poll `f` until it returns true, panics after 5 seconds
pub async fn wait_until<F, Fut>(mut f: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !f().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
