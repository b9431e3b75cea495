//! The `reqwest`-based `FlowiseGateway` implementation — the one real
//! outbound HTTP dependency (spec §6.2). No retry loop here: retries are the
//! circuit breaker's job, not the client's.

use async_trait::async_trait;
use flowforge_core::config::GatewayConfig;
use flowforge_core::{CreatedChatflow, DependencyId, FlowforgeError, FlowiseGateway, NodeDescriptor, Result};
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct FlowiseApiError {
    message: Option<String>,
    error: Option<String>,
}

impl FlowiseApiError {
    fn message(self) -> String {
        self.message.or(self.error).unwrap_or_else(|| "unknown gateway error".into())
    }
}

pub struct HttpFlowiseGateway {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpFlowiseGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_s))
            .user_agent("flowforge-mcp/0.1")
            .build()
            .map_err(|e| FlowforgeError::transport(DependencyId::Gateway, e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.as_ref().map(|s| s.expose_secret().to_string()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Classifies the HTTP response: 2xx → `Ok`, 4xx → `GatewayRejection`
    /// (not counted against the circuit by callers), 5xx/network → `Transport`.
    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<Value> {
        let response = builder
            .send()
            .await
            .map_err(|e| FlowforgeError::transport(DependencyId::Gateway, e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            response
                .json::<Value>()
                .await
                .map_err(|e| FlowforgeError::transport(DependencyId::Gateway, format!("decoding response: {e}")))
        } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
            Err(FlowforgeError::transport(
                DependencyId::Gateway,
                format!("gateway returned {status}"),
            ))
        } else {
            let body = response.json::<FlowiseApiError>().await.ok();
            let message = body.map(FlowiseApiError::message).unwrap_or_else(|| format!("gateway returned {status}"));
            Err(FlowforgeError::GatewayRejection { message })
        }
    }
}

#[async_trait]
impl FlowiseGateway for HttpFlowiseGateway {
    async fn list_nodes(&self) -> Result<Vec<NodeDescriptor>> {
        let value = self.send(self.auth(self.client.get(self.url("/api/v1/nodes")))).await?;
        serde_json::from_value(value)
            .map_err(|e| FlowforgeError::transport(DependencyId::Gateway, format!("decoding node list: {e}")))
    }

    async fn create_chatflow(&self, name: &str, flow_data: Value, deployed: bool) -> Result<CreatedChatflow> {
        let body = serde_json::json!({
            "name": name,
            "flowData": serde_json::to_string(&flow_data).unwrap_or_default(),
            "type": "CHATFLOW",
            "deployed": deployed,
        });
        let value = self
            .send(self.auth(self.client.post(self.url("/api/v1/chatflows")).json(&body)))
            .await?;
        serde_json::from_value(value)
            .map_err(|e| FlowforgeError::transport(DependencyId::Gateway, format!("decoding created chatflow: {e}")))
    }

    async fn get_chatflow(&self, id: &str) -> Result<Value> {
        self.send(self.auth(self.client.get(self.url(&format!("/api/v1/chatflows/{id}")))))
            .await
    }

    async fn update_chatflow(&self, id: &str, flow_data: Value) -> Result<()> {
        let body = serde_json::json!({ "flowData": serde_json::to_string(&flow_data).unwrap_or_default() });
        self.send(self.auth(self.client.put(self.url(&format!("/api/v1/chatflows/{id}"))).json(&body)))
            .await?;
        Ok(())
    }

    async fn delete_chatflow(&self, id: &str) -> Result<()> {
        self.send(self.auth(self.client.delete(self.url(&format!("/api/v1/chatflows/{id}")))))
            .await?;
        Ok(())
    }

    async fn run_prediction(&self, id: &str, input: Value) -> Result<Value> {
        self.send(self.auth(self.client.post(self.url(&format!("/api/v1/prediction/{id}"))).json(&input)))
            .await
    }
}
