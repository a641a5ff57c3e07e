//! Skillbox MCP Server
//!
//! An MCP server that publishes a [`Toolbox`] over the Model Context Protocol:
//! the `skill` tool for loading skill instructions, and `bash`, `read_file`
//! and `write_file` for working in the sandbox.

use std::path::PathBuf;
use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    model::*,
    service::{RequestContext, RoleServer},
};
use skillbox::skills::{self, DEFAULT_MOUNT, Discovery};
use skillbox::{SandboxConfig, SetupError, ToolDefinition, ToolError, Toolbox};

/// Everything needed to bring the server up.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// Sandbox settings.
    pub sandbox: SandboxConfig,
    /// Directory of skill bundles. `None` serves no skills.
    pub skills_dir: Option<PathBuf>,
}

/// Errors while starting the server.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    /// The sandbox could not be created.
    #[error(transparent)]
    Sandbox(#[from] skillbox::SandboxError),
    /// Skill discovery or upload failed.
    #[error(transparent)]
    Setup(#[from] SetupError),
}

/// MCP server exposing the skillbox tools.
#[derive(Clone)]
pub struct SkillboxServer {
    toolbox: Arc<Toolbox>,
}

impl std::fmt::Debug for SkillboxServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkillboxServer")
            .field("toolbox", &self.toolbox)
            .finish()
    }
}

impl SkillboxServer {
    /// Serve an already initialized toolbox.
    pub fn new(toolbox: Toolbox) -> Self {
        Self {
            toolbox: Arc::new(toolbox),
        }
    }

    /// Build the sandbox, discover and upload skills, and return a server.
    pub async fn start(config: &ServerConfig) -> Result<Self, StartError> {
        let sandbox = Arc::new(config.sandbox.build().await?);

        let discovery = match &config.skills_dir {
            Some(dir) => skills::discover_at(dir, DEFAULT_MOUNT)
                .await
                .map_err(SetupError::from)?,
            None => Discovery::default(),
        };

        let mut toolbox = Toolbox::new(sandbox);
        toolbox.initialize(discovery).await?;
        Ok(Self::new(toolbox))
    }

    /// The toolbox behind this server.
    pub fn toolbox(&self) -> &Toolbox {
        &self.toolbox
    }

    fn to_mcp_tool(definition: ToolDefinition) -> Tool {
        let input_schema = match definition.parameters {
            serde_json::Value::Object(map) => Arc::new(map),
            _ => Arc::new(serde_json::Map::new()),
        };
        let title = match definition.name.as_str() {
            "skill" => Some("Load Skill Instructions".into()),
            "bash" => Some("Run Shell Command".into()),
            "read_file" => Some("Read File".into()),
            "write_file" => Some("Write File".into()),
            _ => None,
        };

        Tool {
            name: definition.name.into(),
            title,
            description: Some(definition.description.into()),
            input_schema,
            output_schema: None,
            annotations: None,
            icons: None,
            meta: None,
        }
    }

    /// Tools as advertised over MCP.
    pub fn tools(&self) -> Vec<Tool> {
        self.toolbox
            .definitions()
            .into_iter()
            .map(Self::to_mcp_tool)
            .collect()
    }

    /// Run a tool call and convert the outcome to MCP terms.
    pub async fn call(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, McpError> {
        let arguments = arguments
            .map(serde_json::Value::Object)
            .unwrap_or(serde_json::Value::Null);

        match self.toolbox.invoke(name, arguments).await {
            Ok(output) if output.is_error => Ok(CallToolResult::error(vec![Content::text(output.text)])),
            Ok(output) => Ok(CallToolResult::success(vec![Content::text(output.text)])),
            Err(e @ (ToolError::Validation { .. } | ToolError::UnknownTool(_))) => {
                Err(McpError::invalid_params(e.to_string(), None))
            }
            Err(e) => Err(McpError::internal_error(e.to_string(), None)),
        }
    }
}

impl ServerHandler for SkillboxServer {
    fn get_info(&self) -> ServerInfo {
        let mut instructions = String::from(
            "Skillbox provides skills and a sandboxed shell. Call 'skill' with a skill name to \
            read its instructions, then use 'bash' to run its scripts from /skills/<name>/. \
            The shell supports pipes, redirects and common utilities like cat, grep, cut, sort, \
            uniq, head, tail and wc. It cannot reach the network or the host filesystem.",
        );
        let index = self.toolbox.skill_index();
        if !index.is_empty() {
            instructions.push_str("\n\nAvailable skills:\n");
            instructions.push_str(&index);
        }

        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(instructions),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: self.tools(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        self.call(request.name.as_ref(), request.arguments).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::fs;

    use serde_json::json;

    use super::*;

    fn args(value: serde_json::Value) -> Option<JsonObject> {
        match value {
            serde_json::Value::Object(map) => Some(map),
            _ => None,
        }
    }

    fn text(result: &CallToolResult) -> String {
        result.content[0]
            .as_text()
            .map(|t| t.text.clone())
            .expect("text content")
    }

    async fn server_with_skill() -> (tempfile::TempDir, SkillboxServer) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("csv")).unwrap();
        fs::write(
            dir.path().join("csv/SKILL.md"),
            "---\nname: csv\ndescription: CSV tools\n---\nRun sort.\n",
        )
        .unwrap();

        let config = ServerConfig {
            skills_dir: Some(dir.path().to_path_buf()),
            ..ServerConfig::default()
        };
        let server = SkillboxServer::start(&config).await.unwrap();
        (dir, server)
    }

    #[tokio::test]
    async fn test_tools_have_schemas() {
        let (_dir, server) = server_with_skill().await;
        let tools = server.tools();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_ref()).collect();
        assert_eq!(names, vec!["skill", "bash", "read_file", "write_file"]);
        assert!(tools[1].input_schema.contains_key("properties"));
        assert!(tools[0]
            .description
            .as_deref()
            .unwrap()
            .contains("csv    CSV tools"));
    }

    #[tokio::test]
    async fn test_call_outcomes() {
        let (_dir, server) = server_with_skill().await;

        let result = server.call("skill", args(json!({"name": "csv"}))).await.unwrap();
        assert_eq!(text(&result), "Run sort.");
        assert_ne!(result.is_error, Some(true));

        let result = server
            .call("bash", args(json!({"command": "ls /nope"})))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));

        let err = server.call("bash", None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);

        let err = server.call("exec", args(json!({}))).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_instructions_list_skills() {
        let (_dir, server) = server_with_skill().await;
        let info = server.get_info();
        assert!(info.instructions.unwrap().contains("csv    CSV tools"));
    }
}
