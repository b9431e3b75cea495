//! Translates the closed `FlowforgeError` taxonomy (spec §7) into `rmcp`'s
//! wire error shape. Validation-class errors map to `invalid_params` so an
//! AI-assistant client can tell "fix your request" apart from "try later".

use rmcp::ErrorData as McpError;

pub fn to_mcp_error(err: flowforge_core::FlowforgeError) -> McpError {
    use flowforge_core::FlowforgeError::*;
    let detail = serde_json::json!({ "message": err.user_message() });
    match err {
        Validation { message, .. } => McpError::invalid_params(message, Some(detail)),
        StructuralIncompatibility { message, .. } => McpError::invalid_params(message, Some(detail)),
        CircuitOpen { .. } | Transport { .. } | GatewayRejection { .. } | SubmissionAmbiguous { .. } => {
            McpError::internal_error(err.user_message(), Some(detail))
        }
    }
}
