//! Skillbox MCP Server
//!
//! This binary discovers skills, uploads them into a sandbox, and serves the
//! skillbox tools over stdio.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use rmcp::ServiceExt;
use skillbox::{ResourceLimits, SandboxConfig};
use skillbox_mcp::{ServerConfig, SkillboxServer};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Serve skills and a sandboxed shell over MCP (stdio).
#[derive(Debug, Parser)]
#[command(name = "skillbox-mcp", version, about)]
struct Args {
    /// Directory of skill bundles, one subdirectory per skill.
    #[arg(long, env = "SKILLBOX_SKILLS_DIR")]
    skills_dir: Option<PathBuf>,

    /// Real directory backing the sandbox (default: in memory).
    #[arg(long, env = "SKILLBOX_ROOT")]
    root: Option<PathBuf>,

    /// Directory under the root that becomes the sandbox's `/`.
    #[arg(long, env = "SKILLBOX_PREFIX", default_value = "/")]
    prefix: String,

    /// Working directory for commands.
    #[arg(long, default_value = "/")]
    working_dir: String,

    /// Default command timeout in milliseconds.
    #[arg(long, env = "SKILLBOX_TIMEOUT_MS", default_value_t = 30_000)]
    timeout_ms: u64,

    /// Maximum bytes kept for each of stdout and stderr.
    #[arg(long, default_value_t = 1024 * 1024)]
    max_output_bytes: u64,
}

impl Args {
    fn config(self) -> ServerConfig {
        ServerConfig {
            sandbox: SandboxConfig {
                root: self.root,
                prefix: self.prefix,
                working_dir: self.working_dir,
                limits: ResourceLimits {
                    max_output_bytes: self.max_output_bytes,
                    timeout: Duration::from_millis(self.timeout_ms),
                },
            },
            skills_dir: self.skills_dir,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing - output to stderr so it doesn't interfere with MCP stdio
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = Args::parse().config();
    tracing::info!(skills_dir = ?config.skills_dir, "Starting Skillbox MCP server");

    let server = SkillboxServer::start(&config).await?;

    let service = server
        .serve(rmcp::transport::stdio())
        .await
        .inspect_err(|e| {
            tracing::error!("Failed to start MCP service: {}", e);
        })?;

    tracing::info!("Skillbox MCP server running");

    service.waiting().await?;

    tracing::info!("Skillbox MCP server shutting down");

    Ok(())
}
