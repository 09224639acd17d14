//! Request body enrichment for AI routes that act on behalf of a user.
//!
//! Session-derived fields overwrite anything the client sent under the same
//! keys, so a browser cannot claim another tenant or user.

use portcullis_domain::SessionClaims;
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Enrichment failures
#[derive(Debug, Error)]
pub enum EnrichError {
    /// Body is not valid JSON
    #[error("Request body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Body is JSON but not an object
    #[error("Request body must be a JSON object")]
    NotAnObject,
}

/// Merge session context into a JSON body and serialize it once
///
/// The returned bytes are what gets signed and sent. An empty body starts
/// from `{}`.
pub fn enrich_body(
    raw: &[u8],
    claims: &SessionClaims,
    tool_execution_token: &str,
) -> Result<Vec<u8>, EnrichError> {
    let mut body = if raw.iter().all(u8::is_ascii_whitespace) {
        Map::new()
    } else {
        match serde_json::from_slice::<Value>(raw)? {
            Value::Object(map) => map,
            _ => return Err(EnrichError::NotAnObject),
        }
    };

    body.insert("tenantId".to_string(), json!(claims.tenant_id));
    body.insert(
        "user".to_string(),
        json!({
            "userId": claims.user_id,
            "email": claims.email,
            "displayName": claims.display_name_or_email(),
            "role": claims.role,
            "permissions": claims.permissions,
        }),
    );
    body.insert("toolExecutionToken".to_string(), json!(tool_execution_token));

    Ok(serde_json::to_vec(&Value::Object(body))?)
}
