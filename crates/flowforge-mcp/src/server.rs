//! The `rmcp` tool router exposing spec §6.1's five operations. Grounded on
//! the teacher's `core-rag-mcp-server`: each tool method returns a
//! `BoxFuture<'_, Result<String, McpError>>` via `.boxed()`, with JSON
//! parameter structs deserialized through rmcp's own re-exported `schemars`.

use futures::future::BoxFuture;
use futures::FutureExt;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{EmptyObject, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo};
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler};

use crate::app::Components;
use crate::error::to_mcp_error;
use crate::ops;
use crate::params::{BuildFlowParams, SearchNodesParams, SearchTemplatesParams};

#[derive(Clone)]
pub struct FlowforgeServer {
    components: Components,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl FlowforgeServer {
    pub fn new(components: Components) -> Self {
        Self {
            components,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Search the node catalog for Flowise node types matching a free-text query")]
    pub fn search_nodes(&self, params: Parameters<SearchNodesParams>) -> BoxFuture<'_, Result<String, McpError>> {
        let p = params.0;
        async move {
            let hits = ops::search_nodes(
                &self.components,
                &p.query,
                p.max_results,
                p.similarity_threshold,
                p.category.as_deref(),
            )
            .await
            .map_err(to_mcp_error)?;
            Ok(serde_json::to_string_pretty(&hits).unwrap_or_default())
        }
        .boxed()
    }

    #[tool(description = "Search the template library for curated flows matching a free-text query")]
    pub fn search_templates(&self, params: Parameters<SearchTemplatesParams>) -> BoxFuture<'_, Result<String, McpError>> {
        let p = params.0;
        async move {
            let hits = ops::search_templates(&self.components, &p.query, p.max_results, p.similarity_threshold)
                .await
                .map_err(to_mcp_error)?;
            Ok(serde_json::to_string_pretty(&hits).unwrap_or_default())
        }
        .boxed()
    }

    #[tool(
        description = "Build and submit a Flowise chatflow, either from a template_id (with optional parameter_overrides) or from a node_list to compose and connect automatically"
    )]
    pub fn build_flow(&self, params: Parameters<BuildFlowParams>) -> BoxFuture<'_, Result<String, McpError>> {
        let p = params.0;
        async move {
            let created = ops::build_flow_op(&self.components, p).await.map_err(to_mcp_error)?;
            Ok(serde_json::to_string_pretty(&serde_json::json!({
                "chatflow_id": created.id,
                "chatflow_name": created.name,
            }))
            .unwrap_or_default())
        }
        .boxed()
    }

    #[tool(description = "Force a refresh of the node catalog from the Flowise gateway, returning the added/changed/deprecated counts")]
    pub fn refresh_node_catalog(&self, _params: Parameters<EmptyObject>) -> BoxFuture<'_, Result<String, McpError>> {
        async move {
            let summary = ops::refresh_node_catalog(&self.components).await.map_err(to_mcp_error)?;
            Ok(serde_json::to_string_pretty(&summary).unwrap_or_default())
        }
        .boxed()
    }

    #[tool(description = "Report circuit breaker state, catalog age, and vector collection sizes; never fails")]
    pub fn get_system_health(&self, _params: Parameters<EmptyObject>) -> BoxFuture<'_, Result<String, McpError>> {
        async move {
            let health = ops::get_system_health(&self.components).await;
            Ok(serde_json::to_string_pretty(&health).unwrap_or_default())
        }
        .boxed()
    }
}

#[tool_handler]
impl ServerHandler for FlowforgeServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "flowforge-mcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
            },
            instructions: Some(
                "Builds Flowise chatflows on request: search_nodes/search_templates find candidate \
                 node types and curated templates, build_flow composes or instantiates a graph and \
                 submits it to Flowise, refresh_node_catalog forces a catalog sync, and \
                 get_system_health reports dependency and catalog state."
                    .into(),
            ),
        }
    }
}
