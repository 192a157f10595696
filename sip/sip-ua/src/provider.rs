//! Interface to the SIP transport provider.
//!
//! The provider is a regular RFC 3261 stack. It owns message encoding, transactions,
//! retransmissions and digest authentication. The user agent only hands it methods, URIs and
//! bodies and receives [`SipEvent`]s back through [`UserAgent::handle_event`].
//!
//! [`UserAgent::handle_event`]: crate::UserAgent::handle_event

use async_trait::async_trait;
use bytes::Bytes;
use std::borrow::Cow;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

pub const CONTENT_TYPE_SDP: &str = "application/sdp";
pub const CONTENT_TYPE_TEXT: &str = "text/plain";

/// SIP request method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Method(Cow<'static, str>);

impl Method {
    pub const REGISTER: Method = Method(Cow::Borrowed("REGISTER"));
    pub const INVITE: Method = Method(Cow::Borrowed("INVITE"));
    pub const ACK: Method = Method(Cow::Borrowed("ACK"));
    pub const BYE: Method = Method(Cow::Borrowed("BYE"));
    pub const CANCEL: Method = Method(Cow::Borrowed("CANCEL"));
    pub const MESSAGE: Method = Method(Cow::Borrowed("MESSAGE"));

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Method {
    fn from(method: &str) -> Self {
        Method(Cow::Owned(method.to_ascii_uppercase()))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SIP response status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(u16);

impl StatusCode {
    pub const RINGING: StatusCode = StatusCode(180);
    pub const OK: StatusCode = StatusCode(200);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const UNAUTHORIZED: StatusCode = StatusCode(401);
    pub const FORBIDDEN: StatusCode = StatusCode(403);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const METHOD_NOT_ALLOWED: StatusCode = StatusCode(405);
    pub const PROXY_AUTHENTICATION_REQUIRED: StatusCode = StatusCode(407);
    pub const CALL_OR_TRANSACTION_DOES_NOT_EXIST: StatusCode = StatusCode(481);
    pub const BUSY_HERE: StatusCode = StatusCode(486);
    pub const REQUEST_TERMINATED: StatusCode = StatusCode(487);
    pub const SERVER_INTERNAL_ERROR: StatusCode = StatusCode(500);

    pub const fn from_u16(code: u16) -> Self {
        Self(code)
    }

    pub const fn into_u16(self) -> u16 {
        self.0
    }

    pub fn is_provisional(self) -> bool {
        (100..200).contains(&self.0)
    }

    pub fn is_success(self) -> bool {
        (200..300).contains(&self.0)
    }

    /// 401 or 407
    pub fn is_challenge(self) -> bool {
        self == Self::UNAUTHORIZED || self == Self::PROXY_AUTHENTICATION_REQUIRED
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a client transaction created by the provider
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionKey(pub u64);

/// Handle to an incoming request that still needs a response
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerTransaction(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    pub content_type: Cow<'static, str>,
    pub content: Bytes,
}

impl Body {
    pub fn sdp(sdp: impl ToString) -> Self {
        Self {
            content_type: Cow::Borrowed(CONTENT_TYPE_SDP),
            content: Bytes::from(sdp.to_string()),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content_type: Cow::Borrowed(CONTENT_TYPE_TEXT),
            content: Bytes::from(text.into()),
        }
    }

    /// Body as text, invalid UTF-8 is replaced
    pub fn to_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }
}

/// Request to be sent outside of any dialog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingRequest {
    pub method: Method,
    /// Request target
    pub uri: String,
    /// Identity of the local user
    pub from: String,
    pub body: Option<Body>,
    /// Requested binding lifetime in seconds, REGISTER only
    pub expires: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingResponse {
    pub code: StatusCode,
    pub body: Option<Body>,
}

impl OutgoingResponse {
    pub fn new(code: StatusCode) -> Self {
        Self { code, body: None }
    }

    pub fn with_body(code: StatusCode, body: Body) -> Self {
        Self {
            code,
            body: Some(body),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub method: Method,
    /// URI of the From header
    pub from: String,
    pub body: Option<Body>,
    pub transaction: ServerTransaction,
    /// Server side dialog, created by the provider for INVITE requests
    pub dialog: Option<Arc<dyn Dialog>>,
}

#[derive(Debug, Clone)]
pub struct IncomingResponse {
    pub code: StatusCode,
    /// Method of the request this response belongs to
    pub method: Method,
    pub transaction: TransactionKey,
    /// URI of the To header
    pub to: String,
    /// CSeq number, needed to acknowledge INVITE responses
    pub cseq: u32,
    pub body: Option<Body>,
    /// Binding lifetime granted by a registrar, in seconds
    pub expires: Option<u32>,
    /// Client side dialog, established by a successful INVITE
    pub dialog: Option<Arc<dyn Dialog>>,
}

/// Event delivered by the provider
#[derive(Debug, Clone)]
pub enum SipEvent {
    Request(IncomingRequest),
    Response(IncomingResponse),
    /// The transaction timed out without a final response
    Timeout(TransactionKey),
    /// The transaction failed because of a transport error
    TransportError(TransactionKey),
}

/// Digest credentials used to answer 401/407 challenges
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Only answer challenges for this realm, any realm if not set
    pub realm: Option<String>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("transport failure, {0}")]
    Transport(String),
    #[error("unknown transaction")]
    UnknownTransaction,
    #[error("cannot answer authentication challenge, {0}")]
    Authentication(String),
    #[error("{0}")]
    Other(String),
}

/// Established dialog as managed by the provider
#[async_trait]
pub trait Dialog: fmt::Debug + Send + Sync {
    /// Create a request inside this dialog and send it
    async fn send_request(&self, method: Method) -> Result<TransactionKey, ProviderError>;

    /// Acknowledge the successful INVITE response with the given CSeq number
    async fn send_ack(&self, cseq: u32) -> Result<(), ProviderError>;
}

#[async_trait]
pub trait SipProvider: Send + Sync {
    /// Address the provider's transport is bound to
    fn local_ip(&self) -> Ipv4Addr;

    /// Send a request outside of any dialog, returns the key of the created client transaction
    async fn send_request(&self, request: OutgoingRequest) -> Result<TransactionKey, ProviderError>;

    async fn respond(
        &self,
        transaction: &ServerTransaction,
        response: OutgoingResponse,
    ) -> Result<(), ProviderError>;

    /// Answer a 401/407 challenge by re-sending the challenged request with authorization.
    ///
    /// Returns the key of the newly created client transaction.
    async fn authenticate(
        &self,
        challenge: &IncomingResponse,
        credentials: &Credentials,
    ) -> Result<TransactionKey, ProviderError>;

    /// Cancel a pending INVITE client transaction
    async fn cancel(&self, transaction: &TransactionKey) -> Result<(), ProviderError>;
}
