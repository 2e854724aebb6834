//! Request body transformation pipeline.
//!
//! Every inbound completion request passes through five ordered steps, each
//! individually disabled by the absence of its configuration:
//!
//! 1. **Decode** the raw body as a JSON object
//! 2. **System-prompt injection** (prompt file re-read per request)
//! 3. **Preprocess hook** (script host `preprocess`)
//! 4. **Routing hook** (script host `route`, else configured defaults)
//! 5. **Finalize**: force the resolved `model` field, re-encode
//!
//! The pipeline is synchronous and owns its payload; the only shared state it
//! touches is the read-only configuration and the (internally locked)
//! [`ScriptHost`].

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::error::{GatewayError, Result};
use crate::script::ScriptHost;

/// Which API shape the caller used, derived from the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// OpenAI-style chat completion with a `messages` array.
    Chat,
    /// Anthropic-style legacy completion with a single `prompt` string.
    LegacyCompletion,
}

impl RequestKind {
    /// Derive the request kind from the inbound path.
    pub fn from_path(path: &str) -> Self {
        if path.starts_with("/v1/complete") {
            Self::LegacyCompletion
        } else {
            Self::Chat
        }
    }
}

/// The resolved `{model, endpoint, credential}` tuple for one upstream call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    /// Model identifier forced into the outbound body.
    pub model: String,
    /// Full upstream endpoint URL.
    pub endpoint: String,
    /// Credential sent as `Authorization: Bearer <credential>`.
    pub credential: String,
}

impl RouteDecision {
    /// Validate a routing script's return value.
    ///
    /// Fails closed: every field must be present as a non-empty string.
    pub fn from_script_value(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            GatewayError::Routing("route entry point must return an object".to_string())
        })?;

        let field = |key: &str| -> Result<String> {
            object
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .ok_or_else(|| {
                    GatewayError::Routing(format!(
                        "route result is missing a non-empty string field '{key}'"
                    ))
                })
        };

        Ok(Self {
            model: field("model")?,
            endpoint: field("endpointURL")?,
            credential: field("credential")?,
        })
    }
}

/// Transformed body plus the routing decision for the upstream call.
#[derive(Debug)]
pub struct TransformedRequest {
    /// Re-encoded JSON body.
    pub body: Vec<u8>,
    /// Where (and as whom) to send it.
    pub route: RouteDecision,
}

/// The body transformation pipeline.
pub struct BodyTransformer {
    defaults: RouteDecision,
    system_prompt: Option<PathBuf>,
    scripts: Option<Arc<ScriptHost>>,
}

impl BodyTransformer {
    /// Create a transformer with process-wide default routing.
    pub fn new(
        defaults: RouteDecision,
        system_prompt: Option<PathBuf>,
        scripts: Option<Arc<ScriptHost>>,
    ) -> Self {
        Self {
            defaults,
            system_prompt,
            scripts,
        }
    }

    /// Run the five pipeline steps over a raw request body.
    pub fn transform(&self, raw: &[u8], kind: RequestKind) -> Result<TransformedRequest> {
        let decoded: Value = serde_json::from_slice(raw)
            .map_err(|e| GatewayError::Decode(format!("invalid JSON body: {e}")))?;
        let Value::Object(mut object) = decoded else {
            return Err(GatewayError::Decode(
                "request body must be a JSON object".to_string(),
            ));
        };

        if let Some(path) = &self.system_prompt {
            // Re-read on every request so prompt edits take effect immediately.
            let prompt_text = fs::read_to_string(path)?;
            inject_system_prompt(&mut object, &prompt_text, kind)?;
        }

        let mut payload = Value::Object(object);

        if let Some(host) = self.scripts.as_ref().filter(|h| h.has_preprocess()) {
            let replaced = host.preprocess(&payload)?;
            if !replaced.is_object() {
                return Err(GatewayError::Middleware(
                    "preprocess must return a JSON object".to_string(),
                ));
            }
            payload = replaced;
        }

        let route = match self.scripts.as_ref().filter(|h| h.has_route()) {
            Some(host) => RouteDecision::from_script_value(&host.route(&payload)?)?,
            None => self.defaults.clone(),
        };

        if let Some(object) = payload.as_object_mut() {
            object.insert("model".to_string(), Value::String(route.model.clone()));
        }

        let body = serde_json::to_vec(&payload)
            .map_err(|e| GatewayError::Encode(format!("failed to re-encode body: {e}")))?;

        Ok(TransformedRequest { body, route })
    }
}

/// Splice the system prompt into the payload according to the API shape.
fn inject_system_prompt(
    payload: &mut Map<String, Value>,
    prompt_text: &str,
    kind: RequestKind,
) -> Result<()> {
    match kind {
        RequestKind::LegacyCompletion => {
            let original = payload.get("prompt").and_then(Value::as_str).ok_or_else(|| {
                GatewayError::MissingField(
                    "legacy completion body requires a string 'prompt' field".to_string(),
                )
            })?;
            let spliced = format!("{prompt_text}\n\nHuman: {original}\n\nAssistant:");
            payload.insert("prompt".to_string(), Value::String(spliced));
        }
        RequestKind::Chat => {
            let messages = payload
                .get_mut("messages")
                .and_then(Value::as_array_mut)
                .ok_or_else(|| {
                    GatewayError::MissingField(
                        "chat body requires a 'messages' array".to_string(),
                    )
                })?;
            messages.insert(0, json!({"role": "system", "content": prompt_text}));
        }
    }
    Ok(())
}
