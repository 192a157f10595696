//! # SIP User Agent
//!
//! Registration, call sessions and media orchestration of a VoIP client.
//!
//! Notable types are
//!
//! - [`UserAgent`] the single point of control: registers with the registrar, starts, answers
//!   and ends calls and sends instant messages
//! - [`SipProvider`] & [`Dialog`] the SIP stack the user agent sends its requests through
//! - [`UserAgentEvent`] notifications about incoming calls, call state changes and messages
//!
//! Media is carried by the [`audio`] and [`video`] transport engines, which are started once a
//! call's session descriptions have been exchanged and stopped when it ends.

#![warn(unreachable_pub)]

pub mod provider;
pub mod uri;

mod call_table;
mod media;
mod registration;
mod user_agent;

pub use call_table::{CallDirection, CallInfo, CallState, CallStateError};
pub use provider::{
    Body, Credentials, Dialog, IncomingRequest, IncomingResponse, Method, OutgoingRequest,
    OutgoingResponse, ProviderError, ServerTransaction, SipEvent, SipProvider, StatusCode,
    TransactionKey,
};
pub use registration::{RegisterError, RegistrationStatus};
pub use user_agent::{
    CallError, IncomingCall, TerminationReason, UserAgent, UserAgentConfig, UserAgentEvent,
};
