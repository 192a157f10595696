use crate::provider::{Dialog, TransactionKey};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;

/// State of a single call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// INVITE sent, waiting for a final response
    OutgoingInit,
    /// INVITE received and answered with 180 Ringing
    IncomingRinging,
    /// Dialog confirmed, media negotiated
    Active,
    /// Terminal, the session is removed from the table
    Terminated,
}

impl CallState {
    fn can_transition_to(self, next: CallState) -> bool {
        use CallState::*;

        matches!(
            (self, next),
            (OutgoingInit, Active)
                | (OutgoingInit, Terminated)
                | (IncomingRinging, Active)
                | (IncomingRinging, Terminated)
                | (Active, Terminated)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallDirection {
    Outgoing,
    Incoming,
}

#[derive(Debug, thiserror::Error)]
pub enum CallStateError {
    #[error("no call with {0}")]
    NotFound(String),
    #[error("a call with {0} already exists")]
    Exists(String),
    #[error("call with {remote} cannot go from {from:?} to {to:?}")]
    InvalidTransition {
        remote: String,
        from: CallState,
        to: CallState,
    },
}

/// Snapshot of a call as returned by the status queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallInfo {
    pub remote: String,
    pub direction: CallDirection,
    pub state: CallState,
    /// Video was offered (outgoing) or is part of the offer (incoming)
    pub video: bool,
    pub created: Instant,
}

#[derive(Debug)]
pub(crate) struct CallSession {
    pub(crate) remote: String,
    pub(crate) direction: CallDirection,
    pub(crate) state: CallState,
    pub(crate) video: bool,
    pub(crate) dialog: Option<Arc<dyn Dialog>>,
    /// Client transaction of an outgoing INVITE, needed to CANCEL it
    pub(crate) invite_transaction: Option<TransactionKey>,
    created: Instant,
}

impl CallSession {
    fn new(remote: String, direction: CallDirection, video: bool) -> Self {
        Self {
            remote,
            direction,
            state: match direction {
                CallDirection::Outgoing => CallState::OutgoingInit,
                CallDirection::Incoming => CallState::IncomingRinging,
            },
            video,
            dialog: None,
            invite_transaction: None,
            created: Instant::now(),
        }
    }

    fn transition(&mut self, next: CallState) -> Result<(), CallStateError> {
        if !self.state.can_transition_to(next) {
            return Err(CallStateError::InvalidTransition {
                remote: self.remote.clone(),
                from: self.state,
                to: next,
            });
        }

        log::debug!("call with {}: {:?} -> {:?}", self.remote, self.state, next);
        self.state = next;

        Ok(())
    }

    fn info(&self) -> CallInfo {
        CallInfo {
            remote: self.remote.clone(),
            direction: self.direction,
            state: self.state,
            video: self.video,
            created: self.created,
        }
    }
}

/// All live calls keyed by the normalized remote URI.
///
/// Every operation locks the whole table, so operations on the same remote never interleave.
#[derive(Default)]
pub(crate) struct CallTable {
    calls: Mutex<HashMap<String, CallSession>>,
}

impl CallTable {
    fn insert(&self, session: CallSession) -> Result<(), CallStateError> {
        let mut calls = self.calls.lock();

        if calls.contains_key(&session.remote) {
            return Err(CallStateError::Exists(session.remote));
        }

        log::debug!(
            "call with {}: new {:?} session in {:?}",
            session.remote,
            session.direction,
            session.state
        );

        calls.insert(session.remote.clone(), session);
        Ok(())
    }

    pub(crate) fn start_outgoing(&self, remote: &str, video: bool) -> Result<(), CallStateError> {
        self.insert(CallSession::new(
            remote.into(),
            CallDirection::Outgoing,
            video,
        ))
    }

    pub(crate) fn accept_incoming(
        &self,
        remote: &str,
        video: bool,
        dialog: Option<Arc<dyn Dialog>>,
    ) -> Result<(), CallStateError> {
        let mut session = CallSession::new(remote.into(), CallDirection::Incoming, video);
        session.dialog = dialog;

        self.insert(session)
    }

    /// Remember the INVITE transaction of an outgoing call that is still initializing
    pub(crate) fn set_invite_transaction(&self, remote: &str, transaction: TransactionKey) {
        if let Some(session) = self.calls.lock().get_mut(remote) {
            if session.state == CallState::OutgoingInit {
                session.invite_transaction = Some(transaction);
            }
        }
    }

    /// Transition to [`CallState::Active`], replacing the dialog if one is given
    pub(crate) fn mark_active(
        &self,
        remote: &str,
        dialog: Option<Arc<dyn Dialog>>,
    ) -> Result<CallInfo, CallStateError> {
        let mut calls = self.calls.lock();

        let session = calls
            .get_mut(remote)
            .ok_or_else(|| CallStateError::NotFound(remote.into()))?;

        session.transition(CallState::Active)?;
        session.invite_transaction = None;

        if dialog.is_some() {
            session.dialog = dialog;
        }

        Ok(session.info())
    }

    /// Transition to [`CallState::Terminated`] and remove the call.
    ///
    /// Returns the state the call was in and the removed session, `None` if there was no call
    /// with `remote`.
    pub(crate) fn terminate(&self, remote: &str) -> Option<(CallState, CallSession)> {
        let mut calls = self.calls.lock();

        let mut session = calls.remove(remote)?;
        let previous = session.state;

        if let Err(e) = session.transition(CallState::Terminated) {
            log::warn!("{e}");
        }

        Some((previous, session))
    }

    /// Like [`terminate`](Self::terminate) but only if the call is still in `state`
    pub(crate) fn terminate_if(&self, remote: &str, state: CallState) -> Option<CallSession> {
        let mut calls = self.calls.lock();

        if calls.get(remote)?.state != state {
            return None;
        }

        let mut session = calls.remove(remote)?;
        session.transition(CallState::Terminated).ok()?;
        Some(session)
    }

    /// Find the outgoing call that is waiting on `transaction`
    pub(crate) fn find_by_invite_transaction(&self, transaction: &TransactionKey) -> Option<String> {
        self.calls
            .lock()
            .values()
            .find(|session| session.invite_transaction.as_ref() == Some(transaction))
            .map(|session| session.remote.clone())
    }

    pub(crate) fn get(&self, remote: &str) -> Option<CallInfo> {
        self.calls.lock().get(remote).map(CallSession::info)
    }

    pub(crate) fn list(&self) -> Vec<CallInfo> {
        self.calls.lock().values().map(CallSession::info).collect()
    }
}
