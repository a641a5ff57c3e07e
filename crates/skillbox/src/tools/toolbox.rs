//! The toolbox: skill discovery, upload, and tool dispatch.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{
    BASH_TOOL, BashParams, READ_FILE_TOOL, ReadFileParams, SKILL_TOOL, SetupError, SkillParams,
    ToolDefinition, ToolError, ToolOutput, ToolRegistry, ToolSummary, WRITE_FILE_TOOL,
    WriteFileParams,
};
use crate::sandbox::{Sandbox, SandboxError, SandboxFile, UploadReport};
use crate::skills::{self, DEFAULT_MOUNT, Discovery, SkillRegistry, render_index};

/// Lifecycle of a [`Toolbox`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolboxState {
    /// Skills have not been uploaded yet; every call fails.
    Uninitialized,
    /// Waiting for a call.
    Ready,
    /// A call is running.
    Invoked,
}

/// Marks a call in flight until dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The tools an agent can call: `skill`, `bash`, `read_file` and
/// `write_file`.
///
/// Created uninitialized around a sandbox. [`initialize`](Self::initialize)
/// uploads the discovered skill files and makes the tools callable.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use serde_json::json;
/// use skillbox::{Toolbox, VirtualSandbox};
///
/// let sandbox = Arc::new(VirtualSandbox::in_memory().await?);
/// let toolbox = Toolbox::setup(sandbox, "./skills").await?;
///
/// let out = toolbox.invoke("skill", json!({"name": "csv"})).await?;
/// let out = toolbox.invoke("bash", json!({"command": "sh /skills/csv/filter.sh West /sales.csv"})).await?;
/// ```
pub struct Toolbox {
    sandbox: Arc<dyn Sandbox>,
    registry: Option<Arc<dyn SkillRegistry>>,
    in_flight: AtomicUsize,
}

impl fmt::Debug for Toolbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Toolbox")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Toolbox {
    /// Create an uninitialized toolbox over `sandbox`.
    pub fn new(sandbox: Arc<dyn Sandbox>) -> Self {
        Self {
            sandbox,
            registry: None,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Discover skills in `skills_dir`, upload them under `/skills`, and
    /// return a ready toolbox.
    pub async fn setup(
        sandbox: Arc<dyn Sandbox>,
        skills_dir: impl Into<PathBuf>,
    ) -> Result<Self, SetupError> {
        let discovery = skills::discover_at(skills_dir, DEFAULT_MOUNT).await?;
        let mut toolbox = Self::new(sandbox);
        toolbox.initialize(discovery).await?;
        Ok(toolbox)
    }

    /// Upload every discovered skill file and move to
    /// [`ToolboxState::Ready`].
    ///
    /// # Errors
    ///
    /// Any upload failure is fatal; the toolbox stays uninitialized.
    pub async fn initialize(&mut self, discovery: Discovery) -> Result<UploadReport, SetupError> {
        if self.registry.is_some() {
            return Err(SetupError::AlreadyInitialized);
        }

        let report = self.sandbox.write_files(&discovery.files).await?;
        info!(
            skills = discovery.skills.len(),
            files = report.len(),
            "toolbox ready"
        );
        let registry: Arc<dyn SkillRegistry> = Arc::new(discovery);
        self.registry = Some(registry);
        Ok(report)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ToolboxState {
        if self.registry.is_none() {
            ToolboxState::Uninitialized
        } else if self.in_flight.load(Ordering::SeqCst) > 0 {
            ToolboxState::Invoked
        } else {
            ToolboxState::Ready
        }
    }

    /// The sandbox the tools run against.
    pub fn sandbox(&self) -> &Arc<dyn Sandbox> {
        &self.sandbox
    }

    /// Advertised skills, or an empty index before setup.
    pub fn skill_index(&self) -> String {
        self.registry
            .as_ref()
            .map(|r| render_index(&r.list_skills()))
            .unwrap_or_default()
    }

    /// Definitions for every tool, with schemas.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::for_params::<SkillParams>(SKILL_TOOL, self.skill_description()),
            ToolDefinition::for_params::<BashParams>(
                BASH_TOOL,
                "Run a command line in the sandbox. Supports pipes, redirects, &&, ||, \
                 variables and globs, plus utilities like cat, grep, cut, sort, uniq, head, \
                 tail, wc and tr. Run skill scripts with `sh /skills/<name>/<script>`. \
                 A nonzero exit code is reported, not raised.",
            ),
            ToolDefinition::for_params::<ReadFileParams>(
                READ_FILE_TOOL,
                "Read a text file from the sandbox.",
            ),
            ToolDefinition::for_params::<WriteFileParams>(
                WRITE_FILE_TOOL,
                "Write a text file in the sandbox, creating parent directories.",
            ),
        ]
    }

    fn skill_description(&self) -> String {
        let mut description = String::from(
            "Load the full instructions for a skill. Skill files live under /skills/<name>/.",
        );
        let index = self.skill_index();
        if index.is_empty() {
            description.push_str("\n\nNo skills are available.");
        } else {
            description.push_str("\n\nAvailable skills:\n");
            description.push_str(&index);
        }
        description
    }

    /// Call a tool by name with JSON arguments.
    ///
    /// # Errors
    ///
    /// `Err` only when the call never reached the sandbox: the toolbox is not
    /// ready, the tool is unknown, or the arguments are invalid. Everything
    /// else, including failed commands, is an `Ok` with `is_error` set.
    pub async fn invoke(&self, name: &str, arguments: Value) -> Result<ToolOutput, ToolError> {
        let Some(registry) = &self.registry else {
            return Err(ToolError::NotReady {
                tool: name.to_string(),
            });
        };
        let _call = InFlight::enter(&self.in_flight);
        debug!(tool = name, "invoking tool");

        let output = match name {
            SKILL_TOOL => {
                let params: SkillParams = parse_arguments(name, arguments)?;
                require_non_empty(name, "name", &params.name)?;
                load_skill(&**registry, &params.name)
            }
            BASH_TOOL => {
                let params: BashParams = parse_arguments(name, arguments)?;
                require_non_empty(name, "command", &params.command)?;
                if params.timeout_ms == Some(0) {
                    return Err(validation(name, "timeout_ms must be greater than 0"));
                }
                let result = self
                    .sandbox
                    .execute(&params.command, params.timeout_ms.map(Duration::from_millis))
                    .await;
                ToolOutput::from_command(&result)
            }
            READ_FILE_TOOL => {
                let params: ReadFileParams = parse_arguments(name, arguments)?;
                require_non_empty(name, "path", &params.path)?;
                match self.sandbox.read_file(&params.path).await {
                    Ok(data) => ToolOutput::text(String::from_utf8_lossy(&data)),
                    Err(e) => ToolOutput::error(e.to_string()),
                }
            }
            WRITE_FILE_TOOL => {
                let params: WriteFileParams = parse_arguments(name, arguments)?;
                require_non_empty(name, "path", &params.path)?;
                let bytes = params.content.len();
                let file = SandboxFile::new(params.path.clone(), params.content);
                match self.sandbox.write_files(&[file]).await {
                    Ok(_) => ToolOutput::text(format!("wrote {bytes} bytes to {}", params.path)),
                    Err(SandboxError::PartialUpload { source, .. }) => {
                        ToolOutput::error(source.to_string())
                    }
                    Err(e) => ToolOutput::error(e.to_string()),
                }
            }
            _ => return Err(ToolError::UnknownTool(name.to_string())),
        };

        if output.is_error {
            warn!(tool = name, output = %output.text, "tool call failed");
        }
        Ok(output)
    }
}

impl ToolRegistry for Toolbox {
    fn list_tools(&self) -> Vec<ToolSummary> {
        self.definitions().iter().map(ToolDefinition::summary).collect()
    }

    fn get_tool(&self, name: &str) -> Option<ToolDefinition> {
        self.definitions().into_iter().find(|t| t.name == name)
    }
}

fn load_skill(registry: &dyn SkillRegistry, name: &str) -> ToolOutput {
    match registry.instructions(name) {
        Some(instructions) => ToolOutput::text(instructions),
        None => {
            let available: Vec<String> = registry.list_skills().into_iter().map(|s| s.name).collect();
            if available.is_empty() {
                ToolOutput::error(format!("unknown skill '{name}'; no skills are available"))
            } else {
                ToolOutput::error(format!(
                    "unknown skill '{name}'; available skills: {}",
                    available.join(", ")
                ))
            }
        }
    }
}

fn validation(tool: &str, message: impl Into<String>) -> ToolError {
    ToolError::Validation {
        tool: tool.to_string(),
        message: message.into(),
    }
}

fn parse_arguments<P: DeserializeOwned>(tool: &str, arguments: Value) -> Result<P, ToolError> {
    let arguments = match arguments {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    };
    serde_json::from_value(arguments).map_err(|e| validation(tool, e.to_string()))
}

fn require_non_empty(tool: &str, field: &str, value: &str) -> Result<(), ToolError> {
    if value.trim().is_empty() {
        return Err(validation(tool, format!("`{field}` must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::sandbox::VirtualSandbox;
    use crate::skills::SkillManifest;

    fn discovery() -> Discovery {
        let text = "---\nname: csv\ndescription: CSV tools\n---\n\nUse filter.sh.\n";
        let manifest = SkillManifest::parse(text).unwrap();
        let mut discovery = Discovery::default();
        discovery.skills.push(skills::SkillSummary {
            name: manifest.name.clone(),
            description: manifest.description.clone(),
        });
        discovery
            .instructions_by_name
            .insert(manifest.name.clone(), manifest.instructions.clone());
        discovery.files.push(SandboxFile::new("/skills/csv/SKILL.md", text));
        discovery.files.push(SandboxFile::new(
            "/skills/csv/filter.sh",
            "grep \"$1\" \"$2\"\n",
        ));
        discovery
    }

    async fn ready() -> Toolbox {
        let sandbox = Arc::new(VirtualSandbox::in_memory().await.unwrap());
        let mut toolbox = Toolbox::new(sandbox);
        toolbox.initialize(discovery()).await.unwrap();
        toolbox
    }

    #[tokio::test]
    async fn test_not_callable_before_ready() {
        let sandbox = Arc::new(VirtualSandbox::in_memory().await.unwrap());
        let toolbox = Toolbox::new(sandbox);
        assert_eq!(toolbox.state(), ToolboxState::Uninitialized);

        let err = toolbox
            .invoke("bash", json!({"command": "ls"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotReady { .. }));
    }

    #[tokio::test]
    async fn test_initialize_uploads_and_readies() {
        let sandbox = Arc::new(VirtualSandbox::in_memory().await.unwrap());
        let mut toolbox = Toolbox::new(sandbox.clone());
        let report = toolbox.initialize(discovery()).await.unwrap();

        assert_eq!(report.len(), 2);
        assert_eq!(toolbox.state(), ToolboxState::Ready);
        assert!(sandbox.vfs().exists("/skills/csv/filter.sh").await.unwrap());

        let err = toolbox.initialize(discovery()).await.unwrap_err();
        assert!(matches!(err, SetupError::AlreadyInitialized));
    }

    #[tokio::test]
    async fn test_skill_progressive_disclosure() {
        let toolbox = ready().await;

        let skill = toolbox.get_tool("skill").unwrap();
        assert!(skill.description.contains("csv    CSV tools"));
        assert!(!skill.description.contains("Use filter.sh"));

        let out = toolbox.invoke("skill", json!({"name": "csv"})).await.unwrap();
        assert_eq!(out.text, "Use filter.sh.");
        assert!(!out.is_error);

        let out = toolbox.invoke("skill", json!({"name": "xml"})).await.unwrap();
        assert!(out.is_error);
        assert!(out.text.contains("available skills: csv"));
    }

    #[tokio::test]
    async fn test_bash_runs_skill_script() {
        let toolbox = ready().await;
        toolbox
            .invoke(
                "write_file",
                json!({"path": "/sales.csv", "content": "West,apple,10\nEast,pear,7\n"}),
            )
            .await
            .unwrap();

        let out = toolbox
            .invoke(
                "bash",
                json!({"command": "sh /skills/csv/filter.sh West /sales.csv"}),
            )
            .await
            .unwrap();
        assert_eq!(out.text, "West,apple,10\n");
        assert_eq!(out.structured.unwrap()["exit_code"], 0);
        assert_eq!(toolbox.state(), ToolboxState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bash_timeout_capped_at_sandbox_limit() {
        let sandbox = VirtualSandbox::builder()
            .limits(crate::ResourceLimits {
                timeout: Duration::from_millis(100),
                ..crate::ResourceLimits::default()
            })
            .build()
            .await
            .unwrap();
        let mut toolbox = Toolbox::new(Arc::new(sandbox));
        toolbox.initialize(discovery()).await.unwrap();

        let started = tokio::time::Instant::now();
        let out = toolbox
            .invoke(
                "bash",
                json!({"command": "sleep 5", "timeout_ms": 100_000_000}),
            )
            .await
            .unwrap();
        assert!(out.is_error);
        assert!(out.text.contains("timed out after 100ms"), "{}", out.text);
        assert!(started.elapsed() < Duration::from_secs(1));

        let out = toolbox
            .invoke("bash", json!({"command": "sleep 5", "timeout_ms": 20}))
            .await
            .unwrap();
        assert!(out.text.contains("timed out after 20ms"), "{}", out.text);
    }

    #[tokio::test]
    async fn test_failures_are_data() {
        let toolbox = ready().await;

        let out = toolbox
            .invoke("bash", json!({"command": "cat /missing.txt"}))
            .await
            .unwrap();
        assert!(out.is_error);
        assert!(out.text.contains("No such file or directory"));

        let out = toolbox
            .invoke("read_file", json!({"path": "/missing.txt"}))
            .await
            .unwrap();
        assert!(out.is_error);

        let out = toolbox
            .invoke("read_file", json!({"path": "/../../etc/passwd"}))
            .await
            .unwrap();
        assert!(out.is_error);
        assert!(out.text.contains("escapes"));
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let toolbox = ready().await;

        for (tool, args) in [
            ("bash", json!({})),
            ("bash", json!({"command": 42})),
            ("bash", json!({"command": "  "})),
            ("bash", json!({"command": "ls", "timeout_ms": 0})),
            ("bash", json!({"command": "ls", "extra": true})),
            ("skill", json!({"name": ""})),
            ("read_file", Value::Null),
            ("write_file", json!({"path": "/x"})),
        ] {
            let err = toolbox.invoke(tool, args.clone()).await.unwrap_err();
            assert!(
                matches!(err, ToolError::Validation { .. }),
                "{tool} {args}: {err:?}"
            );
        }

        let err = toolbox.invoke("python", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(ref n) if n == "python"));
    }

    #[tokio::test]
    async fn test_definitions() {
        let toolbox = ready().await;
        let names: Vec<String> = toolbox.list_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["skill", "bash", "read_file", "write_file"]);
        assert!(toolbox.has_tool("bash"));
        assert!(!toolbox.has_tool("exec"));
    }
}
