#![allow(dead_code)]

use async_trait::async_trait;
use audio::{AudioCapture, AudioConfig, AudioDevices, AudioEngine, AudioFormat, AudioPlayback};
use sdp::SessionDescription;
use std::net::{Ipv4Addr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use talk_sip_ua::{
    Body, Credentials, Dialog, IncomingRequest, IncomingResponse, Method, OutgoingRequest,
    OutgoingResponse, ProviderError, ServerTransaction, SipEvent, SipProvider, StatusCode,
    TransactionKey, UserAgent, UserAgentConfig, UserAgentEvent,
};
use tokio::sync::mpsc;
use video::{VideoCapture, VideoConfig, VideoDevices, VideoEngine};

pub const ACCOUNT: &str = "sip:alice@example.com";
pub const REGISTRAR: &str = "sip:example.com";
pub const BOB: &str = "sip:bob@example.com";

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Everything the user agent hands to the provider
#[derive(Debug, Clone)]
pub enum Sent {
    Request {
        transaction: TransactionKey,
        request: OutgoingRequest,
    },
    Response {
        transaction: ServerTransaction,
        response: OutgoingResponse,
    },
    Authenticate {
        transaction: TransactionKey,
        challenged: TransactionKey,
    },
    Cancel(TransactionKey),
    InDialog(Method),
    Ack(u32),
}

pub struct MockProvider {
    sent: mpsc::UnboundedSender<Sent>,
    next_key: AtomicU64,
}

impl MockProvider {
    fn key(&self) -> TransactionKey {
        TransactionKey(self.next_key.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl SipProvider for MockProvider {
    fn local_ip(&self) -> Ipv4Addr {
        Ipv4Addr::LOCALHOST
    }

    async fn send_request(&self, request: OutgoingRequest) -> Result<TransactionKey, ProviderError> {
        let transaction = self.key();

        let _ = self.sent.send(Sent::Request {
            transaction: transaction.clone(),
            request,
        });

        Ok(transaction)
    }

    async fn respond(
        &self,
        transaction: &ServerTransaction,
        response: OutgoingResponse,
    ) -> Result<(), ProviderError> {
        let _ = self.sent.send(Sent::Response {
            transaction: transaction.clone(),
            response,
        });

        Ok(())
    }

    async fn authenticate(
        &self,
        challenge: &IncomingResponse,
        credentials: &Credentials,
    ) -> Result<TransactionKey, ProviderError> {
        assert_eq!(credentials.username, "alice");

        let transaction = self.key();

        let _ = self.sent.send(Sent::Authenticate {
            transaction: transaction.clone(),
            challenged: challenge.transaction.clone(),
        });

        Ok(transaction)
    }

    async fn cancel(&self, transaction: &TransactionKey) -> Result<(), ProviderError> {
        let _ = self.sent.send(Sent::Cancel(transaction.clone()));
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockDialog {
    sent: mpsc::UnboundedSender<Sent>,
}

#[async_trait]
impl Dialog for MockDialog {
    async fn send_request(&self, method: Method) -> Result<TransactionKey, ProviderError> {
        let _ = self.sent.send(Sent::InDialog(method));
        Ok(TransactionKey(u64::MAX))
    }

    async fn send_ack(&self, cseq: u32) -> Result<(), ProviderError> {
        let _ = self.sent.send(Sent::Ack(cseq));
        Ok(())
    }
}

/// Microphone which never produces samples and a speaker discarding everything
struct SilentAudio;

struct SilentCapture;

#[async_trait]
impl AudioCapture for SilentCapture {
    async fn read(&mut self, _samples: &mut [i16]) -> Result<usize, audio::DeviceError> {
        std::future::pending().await
    }
}

struct DiscardPlayback;

#[async_trait]
impl AudioPlayback for DiscardPlayback {
    async fn write(&mut self, _samples: &[i16]) -> Result<(), audio::DeviceError> {
        Ok(())
    }
}

impl AudioDevices for SilentAudio {
    fn open_capture(&self, _: AudioFormat) -> Result<Box<dyn AudioCapture>, audio::DeviceError> {
        Ok(Box::new(SilentCapture))
    }

    fn open_playback(&self, _: AudioFormat) -> Result<Box<dyn AudioPlayback>, audio::DeviceError> {
        Ok(Box::new(DiscardPlayback))
    }
}

/// No camera, the video engine only receives
struct NoCamera;

impl VideoDevices for NoCamera {
    fn open_camera(&self, _: u32, _: u32) -> Result<Box<dyn VideoCapture>, video::DeviceError> {
        Err(video::DeviceError::Unavailable)
    }
}

fn free_udp_port() -> u16 {
    UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))
        .and_then(|socket| socket.local_addr())
        .map(|addr| addr.port())
        .unwrap()
}

pub struct Harness {
    pub ua: UserAgent,
    pub events: mpsc::UnboundedReceiver<UserAgentEvent>,
    pub sent: mpsc::UnboundedReceiver<Sent>,
    sent_tx: mpsc::UnboundedSender<Sent>,
    next_server_transaction: u64,
}

impl Harness {
    pub fn new() -> Self {
        init_logger();

        let (sent_tx, sent) = mpsc::unbounded_channel();

        let provider = Arc::new(MockProvider {
            sent: sent_tx.clone(),
            next_key: AtomicU64::new(1),
        });

        let mut config = UserAgentConfig::new(
            ACCOUNT,
            REGISTRAR,
            Credentials {
                username: "alice".into(),
                password: "secret".into(),
                realm: None,
            },
        );
        config.audio_port = free_udp_port();
        config.video_port = free_udp_port();

        let audio = AudioEngine::new(Arc::new(SilentAudio), AudioConfig::default());
        let video = VideoEngine::new(Arc::new(NoCamera), VideoConfig::default());

        let (ua, events) = UserAgent::new(config, provider, audio, video);

        Self {
            ua,
            events,
            sent,
            sent_tx,
            next_server_transaction: 1,
        }
    }

    pub fn dialog(&self) -> Arc<dyn Dialog> {
        Arc::new(MockDialog {
            sent: self.sent_tx.clone(),
        })
    }

    pub async fn next_sent(&mut self) -> Sent {
        tokio::time::timeout(Duration::from_secs(5), self.sent.recv())
            .await
            .expect("nothing sent in time")
            .expect("provider is gone")
    }

    pub async fn next_event(&mut self) -> UserAgentEvent {
        tokio::time::timeout(Duration::from_secs(5), self.events.recv())
            .await
            .expect("no event in time")
            .expect("user agent is gone")
    }

    /// Expect a response and return its status code and body
    pub async fn next_response(&mut self) -> (ServerTransaction, StatusCode, Option<Body>) {
        match self.next_sent().await {
            Sent::Response {
                transaction,
                response,
            } => (transaction, response.code, response.body),
            other => panic!("expected response, got {other:?}"),
        }
    }

    /// Expect a request outside of a dialog
    pub async fn next_request(&mut self) -> (TransactionKey, OutgoingRequest) {
        match self.next_sent().await {
            Sent::Request {
                transaction,
                request,
            } => (transaction, request),
            other => panic!("expected request, got {other:?}"),
        }
    }

    /// Inject a request from `from`, returns the server transaction it was sent with
    pub fn receive_request(
        &mut self,
        method: Method,
        from: &str,
        body: Option<Body>,
    ) -> ServerTransaction {
        let transaction = ServerTransaction(self.next_server_transaction);
        self.next_server_transaction += 1;

        let dialog = (method == Method::INVITE).then(|| self.dialog());

        self.ua.handle_event(SipEvent::Request(IncomingRequest {
            method,
            from: from.into(),
            body,
            transaction: transaction.clone(),
            dialog,
        }));

        transaction
    }

    pub fn receive_response(
        &self,
        method: Method,
        code: StatusCode,
        transaction: TransactionKey,
        body: Option<Body>,
        expires: Option<u32>,
    ) {
        let dialog = (method == Method::INVITE && code.is_success()).then(|| self.dialog());

        self.ua.handle_event(SipEvent::Response(IncomingResponse {
            code,
            method,
            transaction,
            to: BOB.into(),
            cseq: 1,
            body,
            expires,
            dialog,
        }));
    }

    /// Assert that nothing else was sent to the provider
    pub fn assert_nothing_sent(&mut self) {
        if let Ok(sent) = self.sent.try_recv() {
            panic!("unexpected {sent:?}");
        }
    }
}

/// Session description of a peer receiving audio (and video) on localhost
pub fn remote_description(audio_port: u16, video_port: Option<u16>) -> Body {
    Body::sdp(SessionDescription::new(
        Ipv4Addr::LOCALHOST,
        audio_port,
        video_port,
    ))
}

pub fn parse(body: &Option<Body>) -> SessionDescription {
    let body = body.as_ref().expect("missing body");
    SessionDescription::parse(&String::from_utf8_lossy(&body.content))
}

pub async fn wait_until(mut f: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !f() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
