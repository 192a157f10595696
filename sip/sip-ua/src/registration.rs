use crate::provider::{
    Credentials, IncomingResponse, OutgoingRequest, ProviderError, SipProvider, StatusCode,
    TransactionKey,
};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};

/// Any errors that might be encountered while registering with a SIP registrar.
#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("no final response to REGISTER in time")]
    Timeout,
    #[error("authentication of REGISTER request failed with {0}")]
    AuthenticationFailed(StatusCode),
    #[error("got response to REGISTER with unexpected status code {0}")]
    Failed(StatusCode),
    #[error("REGISTER transaction failed")]
    TransportFailure,
}

/// Snapshot of the registration state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationStatus {
    pub registered: bool,
    /// Binding lifetime granted by the registrar
    pub expiry: Option<Duration>,
    pub last_refresh: Option<Instant>,
    pub refresh_scheduled: bool,
}

#[derive(Default)]
struct State {
    registered: bool,
    expiry: Option<Duration>,
    last_refresh: Option<Instant>,
}

/// The single REGISTER attempt in flight
struct Attempt {
    /// Transaction the final response must belong to, `None` while the request is being sent
    transaction: Option<TransactionKey>,
    requested: u32,
    challenged: bool,
    result: oneshot::Sender<Result<Duration, RegisterError>>,
}

/// What to do with a response to the pending attempt
pub(crate) enum ResponseAction {
    Ignore,
    Authenticate,
}

/// Registration state of the user agent.
///
/// Attempts are serialized, only a single REGISTER transaction is ever pending.
#[derive(Default)]
pub(crate) struct Registrar {
    serialize: AsyncMutex<()>,
    attempt: Mutex<Option<Attempt>>,
    state: Mutex<State>,
    refresh: Mutex<Option<JoinHandle<()>>>,
}

impl Registrar {
    /// Send a REGISTER with `expires` and wait up to `timeout_after` for the outcome.
    ///
    /// Returns the granted binding lifetime. Responses arriving after the timeout are ignored.
    pub(crate) async fn register(
        &self,
        provider: &dyn SipProvider,
        request: OutgoingRequest,
        timeout_after: Duration,
    ) -> Result<Duration, RegisterError> {
        let _serialize = self.serialize.lock().await;

        let requested = request.expires.unwrap_or_default();
        let (tx, rx) = oneshot::channel();

        *self.attempt.lock() = Some(Attempt {
            transaction: None,
            requested,
            challenged: false,
            result: tx,
        });

        let result = match provider.send_request(request).await {
            Ok(transaction) => {
                if let Some(attempt) = &mut *self.attempt.lock() {
                    if !attempt.challenged {
                        attempt.transaction = Some(transaction);
                    }
                }

                match timeout(timeout_after, rx).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(_)) => Err(RegisterError::TransportFailure),
                    Err(_) => Err(RegisterError::Timeout),
                }
            }
            Err(e) => Err(RegisterError::Provider(e)),
        };

        self.attempt.lock().take();

        let mut state = self.state.lock();

        match &result {
            Ok(granted) if requested > 0 => {
                state.registered = true;
                state.expiry = Some(*granted);
                state.last_refresh = Some(Instant::now());
            }
            Ok(_) => {
                state.registered = false;
                state.expiry = None;
            }
            Err(_) if requested > 0 => {
                state.registered = false;
            }
            Err(_) => {}
        }

        result
    }

    fn matches(attempt: &Attempt, transaction: &TransactionKey) -> bool {
        attempt
            .transaction
            .as_ref()
            .is_none_or(|pending| pending == transaction)
    }

    /// Handle a response to a REGISTER request.
    ///
    /// Finishes the pending attempt on final responses, a first challenge is passed back to the
    /// caller as [`ResponseAction::Authenticate`].
    pub(crate) fn handle_response(&self, response: &IncomingResponse) -> ResponseAction {
        let mut attempt = self.attempt.lock();

        let Some(pending) = attempt.as_mut() else {
            log::debug!("ignoring REGISTER response, no registration pending");
            return ResponseAction::Ignore;
        };

        if !Self::matches(pending, &response.transaction) {
            log::debug!("ignoring stale REGISTER response {}", response.code);
            return ResponseAction::Ignore;
        }

        if response.code.is_provisional() {
            return ResponseAction::Ignore;
        }

        let result = if response.code.is_success() {
            let granted = response.expires.unwrap_or(pending.requested);
            Ok(Duration::from_secs(u64::from(granted)))
        } else if response.code.is_challenge() {
            if !pending.challenged {
                pending.challenged = true;
                // the authenticated request gets a new transaction
                pending.transaction = None;
                return ResponseAction::Authenticate;
            }

            Err(RegisterError::AuthenticationFailed(response.code))
        } else {
            Err(RegisterError::Failed(response.code))
        };

        if let Some(pending) = attempt.take() {
            let _ = pending.result.send(result);
        }

        ResponseAction::Ignore
    }

    /// Answer a challenge, the attempt fails if the provider cannot create the authenticated request
    pub(crate) async fn authenticate(
        &self,
        provider: &dyn SipProvider,
        challenge: &IncomingResponse,
        credentials: &Credentials,
    ) {
        match provider.authenticate(challenge, credentials).await {
            Ok(transaction) => {
                if let Some(attempt) = &mut *self.attempt.lock() {
                    attempt.transaction = Some(transaction);
                }
            }
            Err(e) => self.fail(RegisterError::Provider(e)),
        }
    }

    /// Fail the pending attempt if it is waiting on `transaction`
    pub(crate) fn transaction_failed(&self, transaction: &TransactionKey) -> bool {
        let is_pending = self
            .attempt
            .lock()
            .as_ref()
            .is_some_and(|attempt| attempt.transaction.as_ref() == Some(transaction));

        if is_pending {
            self.fail(RegisterError::TransportFailure);
        }

        is_pending
    }

    fn fail(&self, error: RegisterError) {
        if let Some(attempt) = self.attempt.lock().take() {
            let _ = attempt.result.send(Err(error));
        }
    }

    /// Replace any scheduled refresh with `task`
    pub(crate) fn schedule_refresh(&self, task: JoinHandle<()>) {
        if let Some(previous) = self.refresh.lock().replace(task) {
            previous.abort();
        }
    }

    /// Called by the refresh task once it fires, so it no longer counts as scheduled
    pub(crate) fn refresh_started(&self) {
        self.refresh.lock().take();
    }

    pub(crate) fn cancel_refresh(&self) {
        if let Some(task) = self.refresh.lock().take() {
            task.abort();
        }
    }

    pub(crate) fn is_registered(&self) -> bool {
        self.state.lock().registered
    }

    pub(crate) fn status(&self) -> RegistrationStatus {
        let state = self.state.lock();

        RegistrationStatus {
            registered: state.registered,
            expiry: state.expiry,
            last_refresh: state.last_refresh,
            refresh_scheduled: self.refresh.lock().as_ref().is_some_and(|t| !t.is_finished()),
        }
    }
}
