pub mod chain;

use std::collections::HashMap;
use std::fmt::{self, Display};

use async_trait::async_trait;

use crate::authn::Subject;

pub const REASON_BAD_REQUEST: &str = "bad_request";
pub const REASON_UNAUTHENTICATED: &str = "unauthenticated";
pub const REASON_FORBIDDEN: &str = "forbidden";
pub const REASON_BACKEND_ERROR: &str = "authorization_backend_error";

/// A composable check that must pass before a request reaches its handler.
///
/// Guards are built once at route registration and shared by every request,
/// so they must not keep per-request state. Everything a guard learns about
/// the request goes into the [`GuardContext`] it is handed.
#[async_trait]
pub trait Guard: Send + Sync {
    fn kind(&self) -> GuardKind;

    fn name(&self) -> &str;

    /// Evaluates the guard against one request.
    ///
    /// # Returns
    ///
    /// * `GuardResult::Allow` - The request may proceed to the next guard
    /// * `GuardResult::Deny(_)` - The chain stops, the denial becomes the response
    async fn evaluate(&self, req: &RequestParts, ctx: &mut GuardContext) -> GuardResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardKind {
    Authentication,
    Authorization,
}

impl GuardKind {
    fn running(&self) -> Stage {
        match self {
            GuardKind::Authentication => Stage::Authenticating,
            GuardKind::Authorization => Stage::Authorizing,
        }
    }

    fn passed(&self) -> Stage {
        match self {
            GuardKind::Authentication => Stage::Authenticated,
            GuardKind::Authorization => Stage::Authorized,
        }
    }
}

/// Outcome of one guard. There is no "undecided" state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardResult {
    Allow,
    Deny(Denial),
}

impl GuardResult {
    pub fn is_allow(&self) -> bool {
        matches!(self, GuardResult::Allow)
    }
}

/// Why a request was stopped: the HTTP status, a machine-stable reason and a
/// short human-readable message. Internal causes never go in here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub status: u16,
    pub reason: &'static str,
    pub message: String,
}

impl Denial {
    pub fn bad_request(message: impl ToString) -> Self {
        Self {
            status: 400,
            reason: REASON_BAD_REQUEST,
            message: message.to_string(),
        }
    }

    pub fn unauthenticated(message: impl ToString) -> Self {
        Self {
            status: 401,
            reason: REASON_UNAUTHENTICATED,
            message: message.to_string(),
        }
    }

    pub fn forbidden() -> Self {
        Self {
            status: 403,
            reason: REASON_FORBIDDEN,
            message: String::from("Access denied"),
        }
    }

    pub fn backend_error() -> Self {
        Self {
            status: 500,
            reason: REASON_BACKEND_ERROR,
            message: String::from("Authorization backend error"),
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }
}

impl Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.status, self.reason, self.message)
    }
}

/// Progress of a request through its guard chain. `Dispatched` and `Denied`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Authenticating,
    Authenticated,
    Authorizing,
    Authorized,
    Dispatched,
    Denied,
}

/// Request-scoped context threaded through the guards by the chain.
#[derive(Debug)]
pub struct GuardContext {
    subject: Option<Subject>,
    stage: Stage,
}

impl GuardContext {
    pub fn new() -> Self {
        Self {
            subject: None,
            stage: Stage::Pending,
        }
    }

    pub fn subject(&self) -> Option<&Subject> {
        self.subject.as_ref()
    }

    pub fn set_subject(&mut self, subject: Subject) {
        self.subject = Some(subject);
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub(crate) fn set_stage(&mut self, stage: Stage) {
        self.stage = stage;
    }
}

impl Default for GuardContext {
    fn default() -> Self {
        Self::new()
    }
}

/// The parts of an inbound request the guards are allowed to see. Only the
/// adapter builds this from the transport request.
#[derive(Debug, Clone, Default)]
pub struct RequestParts {
    pub method: String,
    pub path: String,
    pub params: HashMap<String, String>,
    pub authorization: Option<String>,
    pub peer: Option<String>,
}

impl RequestParts {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    /// Returns a non-empty route parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .map(|value| value.as_str())
            .filter(|value| !value.is_empty())
    }
}

impl Display for RequestParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}
