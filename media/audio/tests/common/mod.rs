#![allow(dead_code)]

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use talk_audio::{AudioCapture, AudioDevices, AudioFormat, AudioPlayback, DeviceError};
use tokio::sync::{broadcast, mpsc};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// In-memory devices: captured chunks are fed through a broadcast channel,
/// played samples are forwarded to an mpsc channel
pub struct TestDevices {
    pub capture_tx: broadcast::Sender<Vec<i16>>,
    played_tx: mpsc::UnboundedSender<Vec<i16>>,
    pub capture_opened: AtomicUsize,
    pub playback_opened: AtomicUsize,
    capture_available: bool,
}

impl TestDevices {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<i16>>) {
        Self::with_capture(true)
    }

    pub fn without_microphone() -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<i16>>) {
        Self::with_capture(false)
    }

    fn with_capture(capture_available: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<i16>>) {
        let (capture_tx, _) = broadcast::channel(64);
        let (played_tx, played_rx) = mpsc::unbounded_channel();

        let devices = Arc::new(Self {
            capture_tx,
            played_tx,
            capture_opened: AtomicUsize::new(0),
            playback_opened: AtomicUsize::new(0),
            capture_available,
        });

        (devices, played_rx)
    }
}

struct TestCapture(broadcast::Receiver<Vec<i16>>);

#[async_trait]
impl AudioCapture for TestCapture {
    async fn read(&mut self, samples: &mut [i16]) -> Result<usize, DeviceError> {
        loop {
            match self.0.recv().await {
                Ok(chunk) => {
                    let len = chunk.len().min(samples.len());
                    samples[..len].copy_from_slice(&chunk[..len]);
                    return Ok(len);
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return Ok(0),
            }
        }
    }
}

struct TestPlayback(mpsc::UnboundedSender<Vec<i16>>);

#[async_trait]
impl AudioPlayback for TestPlayback {
    async fn write(&mut self, samples: &[i16]) -> Result<(), DeviceError> {
        let _ = self.0.send(samples.to_vec());
        Ok(())
    }
}

impl AudioDevices for TestDevices {
    fn open_capture(&self, _format: AudioFormat) -> Result<Box<dyn AudioCapture>, DeviceError> {
        if !self.capture_available {
            return Err(DeviceError::Unavailable("capture"));
        }

        let receiver = self.capture_tx.subscribe();
        self.capture_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TestCapture(receiver)))
    }

    fn open_playback(&self, _format: AudioFormat) -> Result<Box<dyn AudioPlayback>, DeviceError> {
        self.playback_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TestPlayback(self.played_tx.clone())))
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
