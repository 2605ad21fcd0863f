//! # Request-scoped context
//!
//! Design note (§9): the token used to authorize an outbound metrics post is
//! threaded through the call chain as an explicit value, not read back out
//! of a process-global. [`RequestContext`] is that value — analogous to the
//! authenticated-identity extractor this codebase uses at its HTTP seam, but
//! expressed as a plain struct since route wiring itself is out of scope
//! here.

/// The environment claim (and, where applicable, the upstream bearer token)
/// carried alongside a single in-flight operation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub environment: String,
    bearer_token: Option<String>,
}

impl RequestContext {
    pub fn new(environment: impl Into<String>) -> Self {
        Self { environment: environment.into(), bearer_token: None }
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Reads the bearer token a request editor would inject into the
    /// `Authorization` header. Absence is a hard failure (§4.5 step 2): a
    /// flush must not be sent unauthenticated.
    pub fn bearer_token(&self) -> Result<&str, crate::errors::ProxyError> {
        self.bearer_token.as_deref().ok_or(crate::errors::ProxyError::MissingAuthContext)
    }
}
