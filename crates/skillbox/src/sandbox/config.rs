//! Serializable sandbox configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{SandboxError, VirtualSandbox};
use crate::limits::ResourceLimits;

/// Settings for a [`VirtualSandbox`].
///
/// ```json
/// { "root": "/srv/agent", "prefix": "/workspace", "working_dir": "/", "limits": { "max_output_bytes": 65536, "timeout": 5000 } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Real directory backing the sandbox. `None` keeps everything in memory.
    pub root: Option<PathBuf>,
    /// Directory under `root` that becomes the sandbox's `/`.
    pub prefix: String,
    /// Working directory for commands, in sandbox coordinates.
    pub working_dir: String,
    /// Limits applied to every command.
    pub limits: ResourceLimits,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            root: None,
            prefix: "/".to_string(),
            working_dir: "/".to_string(),
            limits: ResourceLimits::default(),
        }
    }
}

impl SandboxConfig {
    /// Build a sandbox from these settings.
    pub async fn build(&self) -> Result<VirtualSandbox, SandboxError> {
        let mut builder = VirtualSandbox::builder()
            .prefix(&self.prefix)
            .working_dir(&self.working_dir)
            .limits(self.limits.clone());
        if let Some(root) = &self.root {
            builder = builder.root(root);
        }
        builder.build().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: SandboxConfig =
            serde_json::from_str(r#"{"prefix": "/workspace", "limits": {"max_output_bytes": 10, "timeout": 250}}"#)
                .unwrap();
        assert_eq!(config.root, None);
        assert_eq!(config.prefix, "/workspace");
        assert_eq!(config.working_dir, "/");
        assert_eq!(config.limits.timeout, Duration::from_millis(250));
        assert_eq!(config.limits.max_output_bytes, 10);
    }

    #[tokio::test]
    async fn test_build_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = SandboxConfig {
            root: Some(dir.path().to_path_buf()),
            prefix: "/box".into(),
            ..SandboxConfig::default()
        };
        let sandbox = config.build().await.unwrap();
        assert_eq!(sandbox.vfs().root(), dir.path().join("box"));
        assert!(dir.path().join("box").is_dir());
    }
}
