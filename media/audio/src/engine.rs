use crate::device::{AudioCapture, AudioDevices, AudioFormat, AudioPlayback};
use crate::packet::{AudioPacket, HEADER_LEN};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::net::UdpSocket;
use tokio::select;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Largest datagram the receive loop accepts, anything longer is truncated by the socket
const RECV_BUFFER_LEN: usize = 2048;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to bind audio socket, {0}")]
    Bind(#[source] io::Error),
}

/// Audio engine configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub format: AudioFormat,

    /// Samples per captured chunk and thus per packet
    pub chunk_samples: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            format: AudioFormat::NARROWBAND,
            // 20ms at 8kHz
            chunk_samples: 160,
        }
    }
}

/// Packet counters of the engine, kept across restarts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AudioStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    /// Datagrams shorter than the header
    pub packets_discarded: u64,
    /// Received packets that were not the direct successor of the previous one
    pub sequence_discontinuities: u64,
}

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    received: AtomicU64,
    discarded: AtomicU64,
    discontinuities: AtomicU64,
}

struct Running {
    local_addr: SocketAddr,
    remote: SocketAddr,
    cancel: CancellationToken,
    tasks: [JoinHandle<()>; 2],
}

/// Sends & receives audio to/from a single remote peer.
///
/// Created once and reused for every call: [`start`](AudioEngine::start) binds the socket and opens
/// the devices, [`stop`](AudioEngine::stop) closes both again.
pub struct AudioEngine {
    devices: Arc<dyn AudioDevices>,
    config: AudioConfig,
    state: Mutex<Option<Running>>,
    is_running: AtomicBool,
    counters: Arc<Counters>,
}

impl AudioEngine {
    pub fn new(devices: Arc<dyn AudioDevices>, config: AudioConfig) -> Self {
        Self {
            devices,
            config,
            state: Mutex::new(None),
            is_running: AtomicBool::new(false),
            counters: Arc::default(),
        }
    }

    /// Bind `local_port` and start sending to & receiving from `remote`.
    ///
    /// Does nothing if the engine is already running.
    pub async fn start(&self, remote: SocketAddr, local_port: u16) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;

        if let Some(running) = &*state {
            log::debug!(
                "audio engine already running ({} -> {}), ignoring start",
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

        let send_task = tokio::spawn(capture_and_send(
            self.devices.clone(),
            self.config.clone(),
            socket.clone(),
            remote,
            cancel.clone(),
            self.counters.clone(),
        ));

        let receive_task = tokio::spawn(receive_and_play(
            self.devices.clone(),
            self.config.format,
            socket,
            cancel.clone(),
            self.counters.clone(),
        ));

        log::info!("audio engine started, local {local_addr} -> remote {remote}");

        *state = Some(Running {
            local_addr,
            remote,
            cancel,
            tasks: [send_task, receive_task],
        });
        self.is_running.store(true, Ordering::Release);

        Ok(())
    }

    /// Stop both loops, close the socket and release the devices.
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
                log::error!("audio engine task failed, {e}");
            }
        }

        log::info!(
            "audio engine stopped, local {} -> remote {}",
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

    /// Address packets are sent to while running
    pub async fn remote_addr(&self) -> Option<SocketAddr> {
        self.state.lock().await.as_ref().map(|r| r.remote)
    }

    pub fn stats(&self) -> AudioStats {
        AudioStats {
            packets_sent: self.counters.sent.load(Ordering::Relaxed),
            packets_received: self.counters.received.load(Ordering::Relaxed),
            packets_discarded: self.counters.discarded.load(Ordering::Relaxed),
            sequence_discontinuities: self.counters.discontinuities.load(Ordering::Relaxed),
        }
    }
}

async fn capture_and_send(
    devices: Arc<dyn AudioDevices>,
    config: AudioConfig,
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
    cancel: CancellationToken,
    counters: Arc<Counters>,
) {
    let mut capture: Box<dyn AudioCapture> = match devices.open_capture(config.format) {
        Ok(capture) => capture,
        Err(e) => {
            log::error!("failed to open audio capture device, {e}");
            return;
        }
    };

    let mut samples = vec![0i16; config.chunk_samples];
    let mut datagram = Vec::with_capacity(HEADER_LEN + config.chunk_samples);
    let mut sequence: u16 = 0;

    loop {
        let read = select! {
            _ = cancel.cancelled() => break,
            read = capture.read(&mut samples) => read,
        };

        let len = match read {
            Ok(0) => {
                log::info!("audio capture device ended");
                break;
            }
            Ok(len) => len.min(samples.len()),
            Err(e) => {
                log::error!("failed to read from audio capture device, {e}");
                break;
            }
        };

        datagram.clear();
        AudioPacket::write_header(sequence, &mut datagram);
        g711::encode_samples(&samples[..len], &mut datagram);
        sequence = sequence.wrapping_add(1);

        match socket.send_to(&datagram, remote).await {
            Ok(_) => {
                counters.sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => log::debug!("failed to send audio packet to {remote}, {e}"),
        }
    }
}

async fn receive_and_play(
    devices: Arc<dyn AudioDevices>,
    format: AudioFormat,
    socket: Arc<UdpSocket>,
    cancel: CancellationToken,
    counters: Arc<Counters>,
) {
    let mut playback: Box<dyn AudioPlayback> = match devices.open_playback(format) {
        Ok(playback) => playback,
        Err(e) => {
            log::error!("failed to open audio playback device, {e}");
            return;
        }
    };

    let mut buf = vec![0u8; RECV_BUFFER_LEN];
    let mut samples = Vec::new();
    let mut last_sequence: Option<u16> = None;

    loop {
        let received = select! {
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => received,
        };

        let (len, source) = match received {
            Ok(received) => received,
            Err(e) => {
                log::debug!("failed to receive audio packet, {e}");
                continue;
            }
        };

        let Some(packet) = AudioPacket::parse(&buf[..len]) else {
            log::trace!("discarding undersized audio packet ({len} bytes) from {source}");
            counters.discarded.fetch_add(1, Ordering::Relaxed);
            continue;
        };

        counters.received.fetch_add(1, Ordering::Relaxed);

        if let Some(last) = last_sequence {
            if packet.sequence != last.wrapping_add(1) {
                log::trace!(
                    "audio sequence discontinuity, expected {} got {}",
                    last.wrapping_add(1),
                    packet.sequence
                );
                counters.discontinuities.fetch_add(1, Ordering::Relaxed);
            }
        }

        last_sequence = Some(packet.sequence);

        if packet.payload.is_empty() {
            continue;
        }

        samples.clear();
        g711::decode_samples(&packet.payload, &mut samples);

        let written = select! {
            _ = cancel.cancelled() => break,
            written = playback.write(&samples) => written,
        };

        if let Err(e) = written {
            log::error!("failed to write to audio playback device, {e}");
            break;
        }
    }
}
