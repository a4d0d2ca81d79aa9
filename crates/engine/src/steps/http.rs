//! Reference `HTTP Request` step backed by `reqwest`.

use std::{collections::HashMap, str::FromStr, time::Duration};

use async_trait::async_trait;
use reqwest::{
    Client, Method,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::{
    error::StepError,
    registry::{Step, StepContext, StepOutput},
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Authentication derived from integration credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RequestAuth {
    Bearer(String),
    Basic { username: String, password: String },
}

impl RequestAuth {
    fn from_credentials(credentials: &HashMap<String, String>) -> Option<Self> {
        if let Some(token) = credentials.get("apiKey").or_else(|| credentials.get("token")) {
            return Some(Self::Bearer(token.clone()));
        }
        match (credentials.get("username"), credentials.get("password")) {
            (Some(username), Some(password)) => Some(Self::Basic {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }
}

/// Request described by a node's resolved input.
#[derive(Debug, Clone, PartialEq)]
struct RequestSpec {
    url: String,
    method: Method,
    headers: Vec<(String, String)>,
    body: Option<Value>,
    integration_id: Option<String>,
}

impl RequestSpec {
    fn from_input(input: &Map<String, Value>) -> Result<Self, StepError> {
        let url = input
            .get("url")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| StepError::invalid_input("missing url"))?
            .to_string();

        let method = match input.get("method").and_then(Value::as_str).map(str::trim) {
            None | Some("") => Method::GET,
            Some(name) => Method::from_str(&name.to_ascii_uppercase())
                .map_err(|_| StepError::invalid_input(format!("invalid HTTP method: {name}")))?,
        };

        let headers = match input.get("headers") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Object(entries)) => entries
                .iter()
                .map(|(name, value)| {
                    let value = match value {
                        Value::String(text) => text.clone(),
                        other => other.to_string(),
                    };
                    (name.clone(), value)
                })
                .collect(),
            Some(_) => return Err(StepError::invalid_input("headers must be an object")),
        };

        let body = match input.get("body") {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) if text.is_empty() => None,
            Some(other) => Some(other.clone()),
        };

        let integration_id = input
            .get("integrationId")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        Ok(Self {
            url,
            method,
            headers,
            body,
            integration_id,
        })
    }

    fn header_map(&self) -> Result<HeaderMap, StepError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|_| StepError::invalid_input(format!("invalid header name: {name}")))?;
            let value = HeaderValue::from_str(value).map_err(|_| StepError::invalid_input(format!("invalid value for header {name}")))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

/// Sends one HTTP request per invocation.
#[derive(Debug, Clone)]
pub struct HttpRequestStep {
    client: Client,
}

impl HttpRequestStep {
    pub fn new() -> Result<Self, StepError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|error| StepError::external(format!("failed to build HTTP client: {error}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Step for HttpRequestStep {
    async fn run(&self, input: &Map<String, Value>, context: &StepContext) -> Result<StepOutput, StepError> {
        let spec = RequestSpec::from_input(input)?;
        let mut request = self.client.request(spec.method.clone(), &spec.url).headers(spec.header_map()?);

        if let Some(integration_id) = spec.integration_id.as_deref() {
            let credentials = context.credentials().get_credentials(integration_id).await?;
            request = match RequestAuth::from_credentials(&credentials) {
                Some(RequestAuth::Bearer(token)) => request.bearer_auth(token),
                Some(RequestAuth::Basic { username, password }) => request.basic_auth(username, Some(password)),
                None => request,
            };
        }

        request = match spec.body {
            Some(Value::String(text)) => request.body(text),
            Some(body) => request.json(&body),
            None => request,
        };

        debug!(
            node_id = context.node_id(),
            method = %spec.method,
            url = %spec.url,
            authenticated = spec.integration_id.is_some(),
            "sending HTTP request"
        );
        let response = request
            .send()
            .await
            .map_err(|error| StepError::external(format!("network error: {}", error_chain(&error))))?;

        let status = response.status();
        let headers: Map<String, Value> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|text| (name.as_str().to_string(), Value::String(text.to_string()))))
            .collect();
        let text = response
            .text()
            .await
            .map_err(|error| StepError::external(format!("failed to read response body: {error}")))?;
        debug!(node_id = context.node_id(), status = status.as_u16(), "HTTP response received");

        if !status.is_success() {
            return Ok(StepOutput::Failure(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown Status")
            )));
        }

        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
        Ok(StepOutput::Success(json!({
            "status": status.as_u16(),
            "ok": true,
            "headers": headers,
            "body": body,
        })))
    }
}

/// Renders an error with its sources, since reqwest keeps the cause out of `Display`.
fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
