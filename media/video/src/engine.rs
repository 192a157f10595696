use crate::codec::{JpegCodec, VideoFrame};
use crate::device::{VideoCapture, VideoDevices};
use crate::packet::{Chunk, HEADER_LEN, fragment};
use crate::reassembly::FrameReassembler;
use parking_lot::{Mutex as SyncMutex, RwLock};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::select;
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, spawn_blocking};
use tokio::time::{Instant, interval_at, sleep};
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to bind video socket, {0}")]
    Bind(#[source] io::Error),
}

/// Receives decoded frames, either remote frames or the local preview
pub type FrameCallback = Arc<dyn Fn(VideoFrame) + Send + Sync>;

/// Video engine configuration
#[derive(Debug, Clone)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,

    /// Time between two captured frames, capture & encode time included
    pub frame_interval: Duration,

    /// JPEG quality, 1 to 100
    pub quality: u8,

    /// Fragment bytes per datagram, excluding the chunk header
    pub max_chunk_payload: usize,

    /// Encoded frames needing more chunks are dropped
    pub max_chunks: usize,

    pub sweep_interval: Duration,

    /// The sweep clears the reassembly table when more incomplete frames are pending
    pub sweep_threshold: usize,

    /// Hard limit of incomplete frames in the reassembly table
    pub reassembly_capacity: usize,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            frame_interval: Duration::from_millis(50),
            quality: 60,
            max_chunk_payload: 1400,
            max_chunks: 100,
            sweep_interval: Duration::from_secs(5),
            sweep_threshold: 50,
            reassembly_capacity: 128,
        }
    }
}

/// Frame counters of the engine, kept across restarts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VideoStats {
    pub frames_sent: u64,
    /// Encoded frames that exceeded the chunk limit
    pub frames_dropped: u64,
    pub frames_received: u64,
    pub frames_undecodable: u64,
    /// Undersized or inconsistent chunks
    pub chunks_discarded: u64,
    /// Incomplete frames removed by the periodic sweep
    pub frames_swept: u64,
}

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    dropped: AtomicU64,
    received: AtomicU64,
    undecodable: AtomicU64,
    discarded: AtomicU64,
    swept: AtomicU64,
}

#[derive(Default)]
struct Callbacks {
    remote: RwLock<Option<FrameCallback>>,
    local: RwLock<Option<FrameCallback>>,
}

impl Callbacks {
    fn deliver(slot: &RwLock<Option<FrameCallback>>, frame: VideoFrame) {
        let callback = slot.read().clone();

        if let Some(callback) = callback {
            callback(frame);
        }
    }
}

struct Running {
    local_addr: SocketAddr,
    remote: SocketAddr,
    cancel: CancellationToken,
    tasks: [JoinHandle<()>; 3],
}

/// Sends & receives video to/from a single remote peer.
///
/// Mirrors the audio engine: [`start`](VideoEngine::start) binds the socket and opens the camera,
/// [`stop`](VideoEngine::stop) closes both again. Decoded frames are delivered through callbacks.
pub struct VideoEngine {
    devices: Arc<dyn VideoDevices>,
    config: VideoConfig,
    state: Mutex<Option<Running>>,
    is_running: AtomicBool,
    counters: Arc<Counters>,
    callbacks: Arc<Callbacks>,
}

impl VideoEngine {
    pub fn new(devices: Arc<dyn VideoDevices>, config: VideoConfig) -> Self {
        Self {
            devices,
            config,
            state: Mutex::new(None),
            is_running: AtomicBool::new(false),
            counters: Arc::default(),
            callbacks: Arc::default(),
        }
    }

    /// Called with every successfully decoded frame from the peer
    pub fn set_remote_frame_callback<F>(&self, f: F)
    where
        F: Fn(VideoFrame) + Send + Sync + 'static,
    {
        *self.callbacks.remote.write() = Some(Arc::new(f));
    }

    /// Called with every captured frame before it is encoded
    pub fn set_local_frame_callback<F>(&self, f: F)
    where
        F: Fn(VideoFrame) + Send + Sync + 'static,
    {
        *self.callbacks.local.write() = Some(Arc::new(f));
    }

    pub fn clear_frame_callbacks(&self) {
        *self.callbacks.remote.write() = None;
        *self.callbacks.local.write() = None;
    }

    /// Bind `local_port` and start sending to & receiving from `remote`.
    ///
    /// Does nothing if the engine is already running.
    pub async fn start(&self, remote: SocketAddr, local_port: u16) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;

        if let Some(running) = &*state {
            log::debug!(
                "video engine already running ({} -> {}), ignoring start",
                running.local_addr,
                running.remote
            );
            return Ok(());
        }

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, local_port))
            .await
            .map_err(EngineError::Bind)?;
        let local_addr = socket.local_addr().map_err(EngineError::Bind)?;
        let socket = Arc::new(socket);

        let cancel = CancellationToken::new();
        let reassembler = Arc::new(SyncMutex::new(FrameReassembler::new(
            self.config.reassembly_capacity,
            self.config.max_chunks,
        )));

        let send_task = tokio::spawn(capture_and_send(
            self.devices.clone(),
            self.config.clone(),
            socket.clone(),
            remote,
            cancel.clone(),
            self.counters.clone(),
            self.callbacks.clone(),
        ));

        let receive_task = tokio::spawn(receive_and_render(
            JpegCodec::new(self.config.quality),
            socket,
            reassembler.clone(),
            cancel.clone(),
            self.counters.clone(),
            self.callbacks.clone(),
        ));

        let sweep_task = tokio::spawn(sweep_stale_frames(
            reassembler,
            self.config.sweep_interval,
            self.config.sweep_threshold,
            cancel.clone(),
            self.counters.clone(),
        ));

        log::info!("video engine started, local {local_addr} -> remote {remote}");

        *state = Some(Running {
            local_addr,
            remote,
            cancel,
            tasks: [send_task, receive_task, sweep_task],
        });
        self.is_running.store(true, Ordering::Release);

        Ok(())
    }

    /// Stop all loops, close the socket and release the camera.
    ///
    /// Does nothing if the engine is not running. Once this returns the local port is free again.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;

        let Some(running) = state.take() else {
            return;
        };

        self.is_running.store(false, Ordering::Release);
        running.cancel.cancel();

        for task in running.tasks {
            if let Err(e) = task.await {
                log::error!("video engine task failed, {e}");
            }
        }

        log::info!(
            "video engine stopped, local {} -> remote {}",
            running.local_addr,
            running.remote
        );
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Address the socket is bound to while running
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.state.lock().await.as_ref().map(|r| r.local_addr)
    }

    /// Address chunks are sent to while running
    pub async fn remote_addr(&self) -> Option<SocketAddr> {
        self.state.lock().await.as_ref().map(|r| r.remote)
    }

    pub fn stats(&self) -> VideoStats {
        VideoStats {
            frames_sent: self.counters.sent.load(Ordering::Relaxed),
            frames_dropped: self.counters.dropped.load(Ordering::Relaxed),
            frames_received: self.counters.received.load(Ordering::Relaxed),
            frames_undecodable: self.counters.undecodable.load(Ordering::Relaxed),
            chunks_discarded: self.counters.discarded.load(Ordering::Relaxed),
            frames_swept: self.counters.swept.load(Ordering::Relaxed),
        }
    }
}

async fn capture_and_send(
    devices: Arc<dyn VideoDevices>,
    config: VideoConfig,
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
    cancel: CancellationToken,
    counters: Arc<Counters>,
    callbacks: Arc<Callbacks>,
) {
    let mut camera: Box<dyn VideoCapture> = match devices.open_camera(config.width, config.height)
    {
        Ok(camera) => camera,
        Err(e) => {
            log::error!("failed to open camera, {e}");
            return;
        }
    };

    let codec = JpegCodec::new(config.quality);
    let mut frame_id: u64 = 0;

    loop {
        let started = Instant::now();

        let captured = select! {
            _ = cancel.cancelled() => break,
            captured = camera.capture() => captured,
        };

        let frame = match captured {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                log::info!("camera ended");
                break;
            }
            Err(e) => {
                log::error!("failed to capture video frame, {e}");
                break;
            }
        };

        Callbacks::deliver(&callbacks.local, frame.clone());

        // JPEG encoding takes milliseconds per frame, keep it off the runtime workers
        let encoded = match spawn_blocking(move || codec.encode(&frame)).await {
            Ok(encoded) => encoded,
            Err(e) => {
                log::error!("video encoder task failed, {e}");
                break;
            }
        };

        match encoded {
            Ok(jpeg) => {
                frame_id += 1;

                match fragment(frame_id, &jpeg, config.max_chunk_payload, config.max_chunks) {
                    Ok(datagrams) => {
                        for datagram in datagrams {
                            if let Err(e) = socket.send_to(&datagram, remote).await {
                                log::debug!("failed to send video chunk to {remote}, {e}");
                            }
                        }

                        counters.sent.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        log::warn!("dropping video frame {frame_id}, {e}");
                        counters.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            Err(e) => log::warn!("failed to encode video frame, {e}"),
        }

        select! {
            _ = cancel.cancelled() => break,
            _ = sleep(config.frame_interval.saturating_sub(started.elapsed())) => {}
        }
    }
}

async fn receive_and_render(
    codec: JpegCodec,
    socket: Arc<UdpSocket>,
    reassembler: Arc<SyncMutex<FrameReassembler>>,
    cancel: CancellationToken,
    counters: Arc<Counters>,
    callbacks: Arc<Callbacks>,
) {
    let mut buf = vec![0u8; HEADER_LEN + u16::MAX as usize];

    loop {
        let received = select! {
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => received,
        };

        let (len, source) = match received {
            Ok(received) => received,
            Err(e) => {
                log::debug!("failed to receive video chunk, {e}");
                continue;
            }
        };

        let Some(chunk) = Chunk::parse(&buf[..len]) else {
            log::trace!("discarding undersized video chunk ({len} bytes) from {source}");
            counters.discarded.fetch_add(1, Ordering::Relaxed);
            continue;
        };

        let frame_id = chunk.header.frame_id;
        let inserted = reassembler.lock().insert(chunk);

        let jpeg = match inserted {
            Ok(Some(jpeg)) => jpeg,
            Ok(None) => continue,
            Err(e) => {
                log::trace!("discarding video chunk from {source}, {e}");
                counters.discarded.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };

        counters.received.fetch_add(1, Ordering::Relaxed);

        let decoded = match spawn_blocking(move || codec.decode(&jpeg)).await {
            Ok(decoded) => decoded,
            Err(e) => {
                log::error!("video decoder task failed, {e}");
                break;
            }
        };

        match decoded {
            Ok(frame) => Callbacks::deliver(&callbacks.remote, frame),
            Err(e) => {
                log::warn!("failed to decode video frame {frame_id}, {e}");
                counters.undecodable.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

async fn sweep_stale_frames(
    reassembler: Arc<SyncMutex<FrameReassembler>>,
    period: Duration,
    threshold: usize,
    cancel: CancellationToken,
    counters: Arc<Counters>,
) {
    let mut interval = interval_at(Instant::now() + period, period);

    loop {
        select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let swept = reassembler.lock().sweep(threshold);

        if swept > 0 {
            log::debug!("cleared {swept} incomplete video frames");
            counters.swept.fetch_add(swept as u64, Ordering::Relaxed);
        }
    }
}
