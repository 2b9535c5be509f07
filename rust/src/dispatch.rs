//! Operation manifests for the remote knowledge-base API and the seam a
//! transport plugs into. Nothing here touches the network: an operation is
//! rendered into a [`DispatchRequest`] and handed to a [`Dispatcher`].

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Header carrying a knowledge-base subscription key.
pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Failure reported by manifest handling or by a dispatcher.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct DispatchError {
    pub message: String,
}

impl DispatchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let method = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        };
        f.write_str(method)
    }
}

/// One callable operation: a URL template with `{param}` placeholders.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDescriptor {
    pub name: String,
    pub method: HttpMethod,
    pub path: String,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub entity_name: Option<String>,
}

/// A fully rendered request, ready for a transport.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DispatchRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl DispatchRequest {
    pub fn with_subscription_key(mut self, key: &str) -> Self {
        self.headers
            .push((SUBSCRIPTION_KEY_HEADER.to_string(), key.to_string()));
        self
    }
}

impl OperationDescriptor {
    /// Renders the operation against `endpoint`. Every declared parameter must
    /// be supplied, and operations naming a body entity need a body.
    pub fn prepare(
        &self,
        endpoint: &str,
        params: &HashMap<String, String>,
        body: Option<Value>,
    ) -> Result<DispatchRequest, DispatchError> {
        if let Some(missing) = self.params.iter().find(|p| !params.contains_key(p.as_str())) {
            return Err(DispatchError::new(format!(
                "operation '{}' requires parameter '{missing}'",
                self.name
            )));
        }
        if let (Some(entity), None) = (&self.entity_name, &body) {
            return Err(DispatchError::new(format!(
                "operation '{}' requires a {entity} body",
                self.name
            )));
        }

        let path = render_template(&self.path, params)?;
        let url = format!("{}/{}", endpoint.trim_end_matches('/'), path.trim_start_matches('/'));
        Ok(DispatchRequest {
            method: self.method,
            url,
            headers: Vec::new(),
            body,
        })
    }
}

/// Replaces each `{name}` in `template` with its value from `params`.
pub fn render_template(
    template: &str,
    params: &HashMap<String, String>,
) -> Result<String, DispatchError> {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        rendered.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after.find('}').ok_or_else(|| {
            DispatchError::new(format!("unterminated placeholder in '{template}'"))
        })?;
        let key = &after[..end];
        let value = params
            .get(key)
            .ok_or_else(|| DispatchError::new(format!("missing value for '{{{key}}}'")))?;
        rendered.push_str(value);
        rest = &after[end + 1..];
    }
    rendered.push_str(rest);
    Ok(rendered)
}

/// Collection of operations for one remote API.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationManifest {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub operations: Vec<OperationDescriptor>,
}

impl OperationManifest {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DispatchError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            DispatchError::new(format!("manifest unreadable: {}: {e}", path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            DispatchError::new(format!("manifest parse failed: {}: {e}", path.display()))
        })
    }

    pub fn operation(&self, name: &str) -> Option<&OperationDescriptor> {
        self.operations.iter().find(|op| op.name == name)
    }

    /// Looks up `name` and renders it against the manifest endpoint.
    pub fn prepare(
        &self,
        name: &str,
        params: &HashMap<String, String>,
        body: Option<Value>,
    ) -> Result<DispatchRequest, DispatchError> {
        let operation = self
            .operation(name)
            .ok_or_else(|| DispatchError::new(format!("unknown operation '{name}'")))?;
        operation.prepare(&self.endpoint, params, body)
    }
}

/// Transport that executes a rendered request.
pub trait Dispatcher {
    fn dispatch(&self, request: &DispatchRequest) -> Result<Value, DispatchError>;
}
