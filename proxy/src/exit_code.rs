//! # Process exit codes (§6)
//!
//! The only place in the binary that cares about the numeric value; callers
//! elsewhere just return a [`ProxyExit`] and let `main` convert it.

use std::process::ExitCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyExit {
    /// Normal shutdown after the root cancellation token fired.
    Normal,
    /// Configuration failed to load or failed validation.
    ConfigError,
    /// Upstream was unreachable at startup after the bounded retry budget.
    UpstreamUnreachable,
}

impl From<ProxyExit> for ExitCode {
    fn from(exit: ProxyExit) -> Self {
        match exit {
            ProxyExit::Normal => ExitCode::from(0),
            ProxyExit::ConfigError => ExitCode::from(1),
            ProxyExit::UpstreamUnreachable => ExitCode::from(2),
        }
    }
}
