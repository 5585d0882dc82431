// ── Core error types ──
//
// User-facing errors from groundctl-core. Consumers never see HTTP status
// codes or JSON parse failures directly: the `From<groundctl_api::Error>`
// impl folds transport-layer errors into the three dispatch outcomes.

use thiserror::Error;

/// Why a remote operation did not succeed.
///
/// `Clone` so a single in-flight abort can hand the same outcome to
/// every caller that joined it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The server answered and said no. `reason` is its text, verbatim.
    #[error("Rejected by server: {reason}")]
    Rejected { reason: String },

    /// No acknowledgement within the command timeout.
    #[error("No acknowledgement within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The request never got a usable answer (refused, reset, garbled).
    #[error("Transport failure: {reason}")]
    Transport { reason: String },
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Local checks (never reach the network) ───────────────────────
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Not connected -- no server address has been set")]
    NotConnected,

    #[error("Configuration not found: {id}")]
    ConfigurationNotFound { id: String },

    // ── Remote outcomes ──────────────────────────────────────────────
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// A newer `connect()` started before this one finished.
    #[error("Connection to {address} was superseded by a newer attempt")]
    Superseded { address: String },
}

impl CoreError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// The dispatch outcome, if this error came from the server side.
    pub fn dispatch(&self) -> Option<&DispatchError> {
        match self {
            Self::Dispatch(e) => Some(e),
            _ => None,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<groundctl_api::Error> for DispatchError {
    fn from(err: groundctl_api::Error) -> Self {
        use groundctl_api::Error as Api;

        match err {
            Api::Rejected { reason, .. } => DispatchError::Rejected { reason },
            Api::Timeout { timeout_secs } => DispatchError::Timeout {
                timeout_ms: timeout_secs.saturating_mul(1000),
            },
            Api::Transport(ref e) if e.is_timeout() => DispatchError::Timeout { timeout_ms: 0 },
            Api::Transport(e) => DispatchError::Transport {
                reason: e.to_string(),
            },
            Api::InvalidUrl(e) => DispatchError::Transport {
                reason: format!("invalid URL: {e}"),
            },
            Api::InvalidAddress(address) => DispatchError::Transport {
                reason: format!("invalid server address '{address}'"),
            },
            Api::Tls(msg) => DispatchError::Transport {
                reason: format!("TLS error: {msg}"),
            },
            Api::WebSocketConnect(reason) => DispatchError::Transport {
                reason: format!("stream connection failed: {reason}"),
            },
            Api::WebSocketClosed { code, reason } => DispatchError::Transport {
                reason: format!("stream closed (code {code}): {reason}"),
            },
            Api::Deserialization { message, .. } => DispatchError::Transport {
                reason: format!("unreadable response: {message}"),
            },
        }
    }
}

impl From<groundctl_api::Error> for CoreError {
    fn from(err: groundctl_api::Error) -> Self {
        CoreError::Dispatch(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_reason_is_verbatim() {
        let api = groundctl_api::Error::Rejected {
            status: 400,
            reason: "unknown sequence 'pressurize'".into(),
        };
        let err = DispatchError::from(api);
        assert_eq!(
            err,
            DispatchError::Rejected {
                reason: "unknown sequence 'pressurize'".into()
            }
        );
    }

    #[test]
    fn api_timeout_maps_to_dispatch_timeout() {
        let err = DispatchError::from(groundctl_api::Error::Timeout { timeout_secs: 3 });
        assert_eq!(err, DispatchError::Timeout { timeout_ms: 3000 });
    }

    #[test]
    fn bad_address_is_transport_failure() {
        let err: CoreError = groundctl_api::Error::InvalidAddress("::".into()).into();
        assert!(matches!(
            err.dispatch(),
            Some(DispatchError::Transport { .. })
        ));
    }
}
