use crate::call_table::{CallInfo, CallState, CallTable};
use crate::media::Media;
use crate::provider::{
    Body, Credentials, IncomingRequest, IncomingResponse, Method, OutgoingRequest,
    OutgoingResponse, ProviderError, ServerTransaction, SipEvent, SipProvider, StatusCode,
    TransactionKey,
};
use crate::registration::{RegisterError, Registrar, RegistrationStatus, ResponseAction};
use crate::uri;
use audio::AudioEngine;
use parking_lot::Mutex;
use rand::Rng;
use sdp::SessionDescription;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use video::VideoEngine;

/// Errors returned by the call & message operations of [`UserAgent`]
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("no pending invitation from {0}")]
    NoPendingInvite(String),
    #[error("already in a call with {0}")]
    AlreadyInCall(String),
    #[error("invalid SIP URI {0:?}")]
    InvalidUri(String),
}

/// Configuration of a [`UserAgent`]
#[derive(Debug, Clone)]
pub struct UserAgentConfig {
    /// Address of record of the local user, e.g. `sip:alice@example.com`
    pub account: String,

    /// URI of the registrar, e.g. `sip:example.com`
    pub registrar: String,

    pub credentials: Credentials,

    /// Address put into session descriptions, defaults to the provider's address
    pub local_ip: Option<Ipv4Addr>,

    /// Local UDP port of the audio engine
    pub audio_port: u16,

    /// Local UDP port of the video engine
    pub video_port: u16,

    /// Requested binding lifetime
    pub expiry: Duration,

    /// Fraction of the granted expiry after which the binding is refreshed
    pub refresh_ratio: f64,

    /// Timeout of automatic refresh attempts
    pub refresh_timeout: Duration,
}

impl UserAgentConfig {
    /// Create a config with random media ports and the default registration timings
    pub fn new(
        account: impl Into<String>,
        registrar: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        let mut rng = rand::rng();

        Self {
            account: account.into(),
            registrar: registrar.into(),
            credentials,
            local_ip: None,
            audio_port: rng.random_range(50000..51000),
            video_port: rng.random_range(52000..53000),
            expiry: Duration::from_secs(3600),
            refresh_ratio: 0.8,
            refresh_timeout: Duration::from_secs(10),
        }
    }
}

/// Why a call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// [`UserAgent::hangup`] was called
    LocalHangup,
    /// The peer sent BYE
    RemoteHangup,
    /// The invitation was rejected locally
    Declined,
    /// The peer cancelled its invitation
    Cancelled,
    /// The peer answered the invitation with an error response
    Rejected(StatusCode),
    /// The transaction or answering it failed
    Failed,
}

/// Notification emitted by the [`UserAgent`]
#[derive(Debug)]
pub enum UserAgentEvent {
    IncomingCall(IncomingCall),
    CallActive {
        remote: String,
        video: bool,
    },
    CallTerminated {
        remote: String,
        reason: TerminationReason,
    },
    Message {
        from: String,
        body: String,
    },
}

/// An invitation waiting to be accepted or rejected
#[derive(Debug)]
pub struct IncomingCall {
    remote: String,
    video: bool,
    user_agent: Weak<Inner>,
}

impl IncomingCall {
    /// Normalized URI of the caller
    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Returns if the offer contains video
    pub fn has_video(&self) -> bool {
        self.video
    }

    /// Same as [`UserAgent::answer_call`]
    pub async fn accept(&self) -> Result<(), CallError> {
        self.user_agent()?.answer_call(&self.remote).await
    }

    /// Same as [`UserAgent::reject_call`]
    pub async fn reject(&self) -> Result<(), CallError> {
        self.user_agent()?.reject_call(&self.remote).await
    }

    fn user_agent(&self) -> Result<UserAgent, CallError> {
        self.user_agent
            .upgrade()
            .map(|inner| UserAgent { inner })
            .ok_or_else(|| CallError::NoPendingInvite(self.remote.clone()))
    }
}

struct PendingInvite {
    transaction: ServerTransaction,
    offer: SessionDescription,
}

struct Inner {
    config: UserAgentConfig,
    local_ip: Ipv4Addr,
    provider: Arc<dyn SipProvider>,

    registrar: Registrar,
    calls: CallTable,
    pending_invites: Mutex<HashMap<String, PendingInvite>>,
    media: Media,

    events: mpsc::UnboundedSender<UserAgentEvent>,
    signaling: mpsc::UnboundedSender<SipEvent>,
}

/// SIP user agent with a single registration and one audio & video engine.
///
/// Cheap to clone, all clones share the same state. Signaling events of the provider are passed
/// in through [`UserAgent::handle_event`], notifications for the application are sent to the
/// receiver returned by [`UserAgent::new`].
#[derive(Clone)]
pub struct UserAgent {
    inner: Arc<Inner>,
}

impl UserAgent {
    /// Create a new user agent.
    ///
    /// # Panics
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(
        config: UserAgentConfig,
        provider: Arc<dyn SipProvider>,
        audio: AudioEngine,
        video: VideoEngine,
    ) -> (Self, mpsc::UnboundedReceiver<UserAgentEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (signaling, signaling_rx) = mpsc::unbounded_channel();

        let local_ip = config.local_ip.unwrap_or_else(|| provider.local_ip());
        let media = Media::new(audio, video, config.audio_port, config.video_port);

        let inner = Arc::new(Inner {
            config,
            local_ip,
            provider,
            registrar: Registrar::default(),
            calls: CallTable::default(),
            pending_invites: Mutex::new(HashMap::new()),
            media,
            events,
            signaling,
        });

        tokio::spawn(dispatch_task(Arc::downgrade(&inner), signaling_rx));

        (Self { inner }, events_rx)
    }

    /// Pass an event of the SIP provider to the user agent.
    ///
    /// Never blocks, events are handled in order on a separate task.
    pub fn handle_event(&self, event: SipEvent) {
        if self.inner.signaling.send(event).is_err() {
            log::warn!("dropping SIP event, event dispatcher is gone");
        }
    }

    /// Register with the registrar, waits up to `timeout` for the result.
    ///
    /// On success the binding is refreshed automatically before it expires.
    pub async fn register(&self, timeout: Duration) -> Result<(), RegisterError> {
        let expires = u32::try_from(self.inner.config.expiry.as_secs()).unwrap_or(u32::MAX);

        let granted = self
            .inner
            .registrar
            .register(&*self.inner.provider, self.register_request(expires), timeout)
            .await
            .inspect_err(|e| {
                log::warn!("registration with {} failed, {e}", self.inner.config.registrar)
            })?;

        log::info!(
            "registered {} with {} for {}s",
            self.inner.config.account,
            self.inner.config.registrar,
            granted.as_secs()
        );

        self.schedule_refresh(granted);

        Ok(())
    }

    /// Remove the binding from the registrar, waits up to `timeout` for the result
    pub async fn unregister(&self, timeout: Duration) -> Result<(), RegisterError> {
        self.inner.registrar.cancel_refresh();

        let result = self
            .inner
            .registrar
            .register(&*self.inner.provider, self.register_request(0), timeout)
            .await;

        // a refresh which was already running may have scheduled the next one
        self.inner.registrar.cancel_refresh();

        match &result {
            Ok(_) => log::info!("unregistered from {}", self.inner.config.registrar),
            Err(e) => log::warn!("unregister from {} failed, {e}", self.inner.config.registrar),
        }

        result.map(|_| ())
    }

    fn register_request(&self, expires: u32) -> OutgoingRequest {
        OutgoingRequest {
            method: Method::REGISTER,
            uri: self.inner.config.registrar.clone(),
            from: self.inner.config.account.clone(),
            body: None,
            expires: Some(expires),
        }
    }

    fn schedule_refresh(&self, granted: Duration) {
        if granted.is_zero() {
            log::warn!("registrar granted no binding lifetime, not scheduling a refresh");
            self.inner.registrar.cancel_refresh();
            return;
        }

        let delay = granted.mul_f64(self.inner.config.refresh_ratio.clamp(0.0, 1.0));
        let user_agent = Arc::downgrade(&self.inner);

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let Some(inner) = user_agent.upgrade() else {
                return;
            };

            inner.registrar.refresh_started();

            let user_agent = UserAgent { inner };
            log::debug!("refreshing registration");

            if let Err(e) = user_agent
                .register(user_agent.inner.config.refresh_timeout)
                .await
            {
                log::warn!("failed to refresh registration, {e}");
            }
        });

        log::debug!("registration refresh in {}s", delay.as_secs());
        self.inner.registrar.schedule_refresh(task);
    }

    /// Call `target`, with video if `video` is set.
    ///
    /// Returns once the INVITE is sent, the outcome is reported through [`UserAgentEvent`]s.
    pub async fn start_call(&self, target: &str, video: bool) -> Result<(), CallError> {
        let remote = normalize(target)?;

        self.inner
            .calls
            .start_outgoing(&remote, video)
            .map_err(|_| CallError::AlreadyInCall(remote.clone()))?;

        let offer = self.inner.media.local_description(self.inner.local_ip, video);

        let request = OutgoingRequest {
            method: Method::INVITE,
            uri: remote.clone(),
            from: self.inner.config.account.clone(),
            body: Some(Body::sdp(offer)),
            expires: None,
        };

        match self.inner.provider.send_request(request).await {
            Ok(transaction) => {
                self.inner
                    .calls
                    .set_invite_transaction(&remote, transaction);

                log::info!("calling {remote} (video: {video})");
                Ok(())
            }
            Err(e) => {
                self.inner.calls.terminate(&remote);
                log::warn!("failed to send INVITE to {remote}, {e}");
                Err(e.into())
            }
        }
    }

    /// Accept the pending invitation from `from`.
    ///
    /// Starts the engines for the offered media and answers with a session description that
    /// contains video only if the offer did.
    pub async fn answer_call(&self, from: &str) -> Result<(), CallError> {
        let remote = normalize(from)?;

        let invite = self.inner.pending_invites.lock().remove(&remote);
        let Some(invite) = invite else {
            return Err(CallError::NoPendingInvite(remote));
        };

        self.inner.media.start(&invite.offer).await;

        let answer = self
            .inner
            .media
            .local_description(self.inner.local_ip, invite.offer.has_video());

        if let Err(e) = self.inner.calls.mark_active(&remote, None) {
            log::warn!("cannot answer call, {e}");
            self.inner.media.stop().await;
            return Err(CallError::NoPendingInvite(remote));
        }

        let response = OutgoingResponse::with_body(StatusCode::OK, Body::sdp(answer));

        if let Err(e) = self
            .inner
            .provider
            .respond(&invite.transaction, response)
            .await
        {
            log::warn!("failed to answer call from {remote}, {e}");

            self.inner.calls.terminate(&remote);
            self.inner.media.stop().await;
            self.emit(UserAgentEvent::CallTerminated {
                remote,
                reason: TerminationReason::Failed,
            });

            return Err(e.into());
        }

        log::info!("answered call from {remote}");

        self.emit(UserAgentEvent::CallActive {
            remote,
            video: invite.offer.has_video(),
        });

        Ok(())
    }

    /// Reject the pending invitation from `from` with 486 Busy Here
    pub async fn reject_call(&self, from: &str) -> Result<(), CallError> {
        let remote = normalize(from)?;

        let invite = self.inner.pending_invites.lock().remove(&remote);
        let Some(invite) = invite else {
            return Err(CallError::NoPendingInvite(remote));
        };

        self.inner.calls.terminate(&remote);

        let result = self
            .inner
            .provider
            .respond(
                &invite.transaction,
                OutgoingResponse::new(StatusCode::BUSY_HERE),
            )
            .await;

        log::info!("rejected call from {remote}");

        self.emit(UserAgentEvent::CallTerminated {
            remote,
            reason: TerminationReason::Declined,
        });

        result.map_err(CallError::from)
    }

    /// End the call with `target`.
    ///
    /// Always stops both engines. An active call is ended with BYE, an unanswered outgoing call is
    /// cancelled and an incoming call that is still ringing is rejected. Calling this without a
    /// call does nothing else.
    pub async fn hangup(&self, target: &str) -> Result<(), CallError> {
        self.inner.media.stop().await;

        let remote = normalize(target)?;

        let Some((previous, session)) = self.inner.calls.terminate(&remote) else {
            log::debug!("hangup without a call with {remote}");
            return Ok(());
        };

        match previous {
            CallState::Active => {
                if let Some(dialog) = &session.dialog {
                    if let Err(e) = dialog.send_request(Method::BYE).await {
                        log::warn!("failed to send BYE to {remote}, {e}");
                    }
                }
            }
            CallState::OutgoingInit => {
                if let Some(transaction) = &session.invite_transaction {
                    if let Err(e) = self.inner.provider.cancel(transaction).await {
                        log::warn!("failed to cancel INVITE to {remote}, {e}");
                    }
                }
            }
            CallState::IncomingRinging => {
                let invite = self.inner.pending_invites.lock().remove(&remote);

                if let Some(invite) = invite {
                    self.respond(
                        &invite.transaction,
                        OutgoingResponse::new(StatusCode::BUSY_HERE),
                    )
                    .await;
                }
            }
            CallState::Terminated => {}
        }

        log::info!("hung up call with {remote}");

        self.emit(UserAgentEvent::CallTerminated {
            remote,
            reason: TerminationReason::LocalHangup,
        });

        Ok(())
    }

    /// Send an instant message, the response is not awaited
    pub async fn send_message(&self, target: &str, text: &str) -> Result<(), CallError> {
        let remote = normalize(target)?;

        let request = OutgoingRequest {
            method: Method::MESSAGE,
            uri: remote,
            from: self.inner.config.account.clone(),
            body: Some(Body::text(text)),
            expires: None,
        };

        self.inner.provider.send_request(request).await?;

        Ok(())
    }

    /// Stop the refresh timer, remove the binding if registered and stop both engines
    pub async fn shutdown(&self, timeout: Duration) {
        self.inner.registrar.cancel_refresh();

        if self.is_registered() {
            if let Err(e) = self.unregister(timeout).await {
                log::warn!("failed to unregister during shutdown, {e}");
            }
        }

        self.inner.media.stop().await;

        log::info!("user agent {} shut down", self.inner.config.account);
    }

    pub fn is_registered(&self) -> bool {
        self.inner.registrar.is_registered()
    }

    pub fn registration(&self) -> RegistrationStatus {
        self.inner.registrar.status()
    }

    /// State of the call with `remote`, `None` if there is none
    pub fn call_state(&self, remote: &str) -> Option<CallState> {
        let remote = uri::normalize(remote)?;
        self.inner.calls.get(&remote).map(|info| info.state)
    }

    pub fn calls(&self) -> Vec<CallInfo> {
        self.inner.calls.list()
    }

    pub fn audio(&self) -> &AudioEngine {
        &self.inner.media.audio
    }

    /// The video engine, used to register the frame callbacks
    pub fn video(&self) -> &VideoEngine {
        &self.inner.media.video
    }

    pub fn local_ip(&self) -> Ipv4Addr {
        self.inner.local_ip
    }

    pub fn config(&self) -> &UserAgentConfig {
        &self.inner.config
    }

    fn emit(&self, event: UserAgentEvent) {
        if self.inner.events.send(event).is_err() {
            log::trace!("user agent event receiver is gone");
        }
    }

    async fn respond(&self, transaction: &ServerTransaction, response: OutgoingResponse) {
        let code = response.code;

        if let Err(e) = self.inner.provider.respond(transaction, response).await {
            log::warn!("failed to send {code} response, {e}");
        }
    }

    async fn dispatch(&self, event: SipEvent) {
        match event {
            SipEvent::Request(request) => self.handle_request(request).await,
            SipEvent::Response(response) => self.handle_response(response).await,
            SipEvent::Timeout(transaction) => {
                log::debug!("transaction {transaction:?} timed out");
                self.handle_transaction_failure(transaction);
            }
            SipEvent::TransportError(transaction) => {
                log::debug!("transaction {transaction:?} failed with a transport error");
                self.handle_transaction_failure(transaction);
            }
        }
    }

    async fn handle_request(&self, request: IncomingRequest) {
        let Some(remote) = uri::normalize(&request.from) else {
            log::warn!("rejecting {} with invalid From {:?}", request.method, request.from);

            if request.method != Method::ACK {
                self.respond(
                    &request.transaction,
                    OutgoingResponse::new(StatusCode::BAD_REQUEST),
                )
                .await;
            }

            return;
        };

        if request.method == Method::INVITE {
            self.handle_invite(remote, request).await;
        } else if request.method == Method::ACK {
            self.handle_ack(remote, request);
        } else if request.method == Method::BYE {
            self.handle_bye(remote, request).await;
        } else if request.method == Method::CANCEL {
            self.handle_cancel(remote, request).await;
        } else if request.method == Method::MESSAGE {
            self.handle_message(remote, request).await;
        } else {
            log::debug!("rejecting unsupported {} request from {remote}", request.method);

            self.respond(
                &request.transaction,
                OutgoingResponse::new(StatusCode::METHOD_NOT_ALLOWED),
            )
            .await;
        }
    }

    async fn handle_invite(&self, remote: String, request: IncomingRequest) {
        let offer = parse_body(request.body.as_ref());
        let video = offer.has_video();

        if let Err(e) = self
            .inner
            .calls
            .accept_incoming(&remote, video, request.dialog.clone())
        {
            log::info!("rejecting INVITE, {e}");

            self.respond(
                &request.transaction,
                OutgoingResponse::new(StatusCode::BUSY_HERE),
            )
            .await;

            return;
        }

        self.inner.pending_invites.lock().insert(
            remote.clone(),
            PendingInvite {
                transaction: request.transaction.clone(),
                offer,
            },
        );

        self.respond(
            &request.transaction,
            OutgoingResponse::new(StatusCode::RINGING),
        )
        .await;

        log::info!("incoming call from {remote} (video: {video})");

        self.emit(UserAgentEvent::IncomingCall(IncomingCall {
            remote,
            video,
            user_agent: Arc::downgrade(&self.inner),
        }));
    }

    fn handle_ack(&self, remote: String, request: IncomingRequest) {
        if self.inner.calls.get(&remote).map(|info| info.state) != Some(CallState::IncomingRinging) {
            log::trace!("ACK from {remote} does not change any call");
            return;
        }

        self.inner.pending_invites.lock().remove(&remote);

        match self.inner.calls.mark_active(&remote, request.dialog) {
            Ok(info) => {
                log::info!("call with {remote} confirmed by ACK");

                self.emit(UserAgentEvent::CallActive {
                    remote,
                    video: info.video,
                });
            }
            Err(e) => log::debug!("ignoring ACK, {e}"),
        }
    }

    async fn handle_bye(&self, remote: String, request: IncomingRequest) {
        self.respond(&request.transaction, OutgoingResponse::new(StatusCode::OK))
            .await;

        if self.inner.calls.terminate(&remote).is_none() {
            log::debug!("BYE from {remote} without a call");
            return;
        }

        let invite = self.inner.pending_invites.lock().remove(&remote);

        if let Some(invite) = invite {
            self.respond(
                &invite.transaction,
                OutgoingResponse::new(StatusCode::REQUEST_TERMINATED),
            )
            .await;
        }

        self.inner.media.stop().await;

        log::info!("call with {remote} ended by peer");

        self.emit(UserAgentEvent::CallTerminated {
            remote,
            reason: TerminationReason::RemoteHangup,
        });
    }

    async fn handle_cancel(&self, remote: String, request: IncomingRequest) {
        let invite = self.inner.pending_invites.lock().remove(&remote);

        let Some(invite) = invite else {
            log::debug!("CANCEL from {remote} without a pending invitation");

            self.respond(
                &request.transaction,
                OutgoingResponse::new(StatusCode::CALL_OR_TRANSACTION_DOES_NOT_EXIST),
            )
            .await;

            return;
        };

        self.respond(&request.transaction, OutgoingResponse::new(StatusCode::OK))
            .await;
        self.respond(
            &invite.transaction,
            OutgoingResponse::new(StatusCode::REQUEST_TERMINATED),
        )
        .await;

        if self
            .inner
            .calls
            .terminate_if(&remote, CallState::IncomingRinging)
            .is_some()
        {
            log::info!("call from {remote} cancelled by peer");

            self.emit(UserAgentEvent::CallTerminated {
                remote,
                reason: TerminationReason::Cancelled,
            });
        }
    }

    async fn handle_message(&self, remote: String, request: IncomingRequest) {
        self.respond(&request.transaction, OutgoingResponse::new(StatusCode::OK))
            .await;

        let body = request
            .body
            .as_ref()
            .map(|body| body.to_text().into_owned())
            .unwrap_or_default();

        self.emit(UserAgentEvent::Message { from: remote, body });
    }

    async fn handle_response(&self, response: IncomingResponse) {
        if response.method == Method::REGISTER {
            if let ResponseAction::Authenticate = self.inner.registrar.handle_response(&response) {
                log::debug!("answering {} challenge of the registrar", response.code);

                self.inner
                    .registrar
                    .authenticate(
                        &*self.inner.provider,
                        &response,
                        &self.inner.config.credentials,
                    )
                    .await;
            }
        } else if response.method == Method::INVITE {
            self.handle_invite_response(response).await;
        } else {
            log::debug!(
                "{} response to {} for {}",
                response.code,
                response.method,
                response.to
            );
        }
    }

    async fn handle_invite_response(&self, response: IncomingResponse) {
        let remote = self
            .inner
            .calls
            .find_by_invite_transaction(&response.transaction)
            .or_else(|| uri::normalize(&response.to));

        let Some(remote) = remote else {
            log::warn!("ignoring INVITE response with invalid To {:?}", response.to);
            return;
        };

        let Some(info) = self.inner.calls.get(&remote) else {
            if response.code.is_success() {
                // the 2xx crossed our CANCEL
                self.close_orphaned_dialog(&remote, &response).await;
            } else {
                log::debug!("ignoring {} response to INVITE, no call with {remote}", response.code);
            }

            return;
        };

        if response.code.is_provisional() {
            log::trace!("call with {remote} got {}", response.code);
            return;
        }

        if info.state != CallState::OutgoingInit {
            if response.code.is_success() {
                if info.state == CallState::Active {
                    // retransmitted 2xx, the ACK got lost
                    self.send_ack(&remote, &response).await;
                } else {
                    self.close_orphaned_dialog(&remote, &response).await;
                }
            }

            return;
        }

        if !response.code.is_success() {
            if self.inner.calls.terminate(&remote).is_some() {
                log::info!("call to {remote} failed with {}", response.code);

                self.emit(UserAgentEvent::CallTerminated {
                    remote,
                    reason: TerminationReason::Rejected(response.code),
                });
            }

            return;
        }

        self.send_ack(&remote, &response).await;

        let answer = parse_body(response.body.as_ref());
        self.inner.media.start(&answer).await;

        match self.inner.calls.mark_active(&remote, response.dialog.clone()) {
            Ok(_) => {
                log::info!("call with {remote} is active");

                self.emit(UserAgentEvent::CallActive {
                    remote,
                    video: answer.has_video(),
                });
            }
            Err(e) => {
                // hung up while the answer was processed
                log::debug!("not activating call, {e}");
                self.inner.media.stop().await;
                self.send_bye(&remote, &response).await;
            }
        }
    }

    /// Acknowledge a 2xx for a call that already ended and end the dialog it established
    async fn close_orphaned_dialog(&self, remote: &str, response: &IncomingResponse) {
        log::info!("{} to INVITE for ended call with {remote}, closing its dialog", response.code);

        self.send_ack(remote, response).await;
        self.send_bye(remote, response).await;
    }

    async fn send_bye(&self, remote: &str, response: &IncomingResponse) {
        let Some(dialog) = &response.dialog else {
            return;
        };

        if let Err(e) = dialog.send_request(Method::BYE).await {
            log::warn!("failed to send BYE to {remote}, {e}");
        }
    }

    async fn send_ack(&self, remote: &str, response: &IncomingResponse) {
        let Some(dialog) = &response.dialog else {
            log::warn!("successful INVITE response from {remote} without dialog, cannot ACK");
            return;
        };

        if let Err(e) = dialog.send_ack(response.cseq).await {
            log::warn!("failed to send ACK to {remote}, {e}");
        }
    }

    fn handle_transaction_failure(&self, transaction: TransactionKey) {
        if self.inner.registrar.transaction_failed(&transaction) {
            return;
        }

        let Some(remote) = self.inner.calls.find_by_invite_transaction(&transaction) else {
            return;
        };

        if self
            .inner
            .calls
            .terminate_if(&remote, CallState::OutgoingInit)
            .is_some()
        {
            log::info!("call to {remote} failed, INVITE transaction failed");

            self.emit(UserAgentEvent::CallTerminated {
                remote,
                reason: TerminationReason::Failed,
            });
        }
    }
}

async fn dispatch_task(user_agent: Weak<Inner>, mut events: mpsc::UnboundedReceiver<SipEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = user_agent.upgrade() else {
            break;
        };

        UserAgent { inner }.dispatch(event).await;
    }
}

fn normalize(uri: &str) -> Result<String, CallError> {
    uri::normalize(uri).ok_or_else(|| CallError::InvalidUri(uri.into()))
}

/// Parse a session description body, a missing body results in an empty description
fn parse_body(body: Option<&Body>) -> SessionDescription {
    SessionDescription::parse(&body.map(Body::to_text).unwrap_or_default())
}
