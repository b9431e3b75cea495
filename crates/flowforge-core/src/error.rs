use std::time::Duration;

use thiserror::Error;

use crate::traits::DependencyId;

/// Closed error taxonomy (spec §7). Every component raises only these kinds;
/// outer components translate rather than invent new ones.
#[derive(Error, Debug, Clone)]
pub enum FlowforgeError {
    /// Caller input rejected: unknown field, empty required value, unknown
    /// template, unknown node name. Never counted against a circuit.
    #[error("{message}")]
    Validation { message: String, detail: Option<String> },

    /// The requested composition cannot be realized: type mismatch, required
    /// input unsatisfied, or it would create a cycle.
    #[error("{message}")]
    StructuralIncompatibility {
        message: String,
        node_id: Option<String>,
        anchor: Option<String>,
    },

    /// A dependency is known-unhealthy.
    #[error("{dep} is temporarily unavailable, retry after {retry_after_s}s")]
    CircuitOpen {
        dep: DependencyId,
        retry_after_s: u64,
    },

    /// Network, timeout, or dependency 5xx. Retriable at the caller's
    /// discretion; internally this is what drives circuit transitions.
    #[error("transport error talking to {dep}: {message}")]
    Transport { dep: DependencyId, message: String },

    /// The Flowise service accepted the request but refused it for reasons
    /// beyond this system's own validation.
    #[error("gateway rejected the request: {message}")]
    GatewayRejection { message: String },

    /// A cancellation raced the gateway submission; success is unknown and
    /// must not be retried blindly.
    #[error("submission outcome is ambiguous after cancellation during {operation}")]
    SubmissionAmbiguous { operation: String },
}

impl FlowforgeError {
    pub fn validation(message: impl Into<String>) -> Self {
        FlowforgeError::Validation {
            message: message.into(),
            detail: None,
        }
    }

    pub fn validation_with_detail(message: impl Into<String>, detail: impl Into<String>) -> Self {
        FlowforgeError::Validation {
            message: message.into(),
            detail: Some(detail.into()),
        }
    }

    pub fn structural(message: impl Into<String>) -> Self {
        FlowforgeError::StructuralIncompatibility {
            message: message.into(),
            node_id: None,
            anchor: None,
        }
    }

    pub fn structural_at(
        message: impl Into<String>,
        node_id: impl Into<String>,
        anchor: impl Into<String>,
    ) -> Self {
        FlowforgeError::StructuralIncompatibility {
            message: message.into(),
            node_id: Some(node_id.into()),
            anchor: Some(anchor.into()),
        }
    }

    pub fn circuit_open(dep: DependencyId, retry_after: Duration) -> Self {
        FlowforgeError::CircuitOpen {
            dep,
            retry_after_s: retry_after.as_secs(),
        }
    }

    pub fn transport(dep: DependencyId, message: impl Into<String>) -> Self {
        FlowforgeError::Transport {
            dep,
            message: message.into(),
        }
    }

    /// True for failures that should count against a dependency's circuit
    /// (spec §4.1 failure taxonomy distinction).
    pub fn is_transport(&self) -> bool {
        matches!(self, FlowforgeError::Transport { .. })
    }

    /// The single-sentence, token-budgeted explanation required by spec §7.
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

pub type Result<T> = std::result::Result<T, FlowforgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_count_against_circuits() {
        let e = FlowforgeError::transport(DependencyId::Gateway, "timeout");
        assert!(e.is_transport());
        let v = FlowforgeError::validation("bad input");
        assert!(!v.is_transport());
    }
}
