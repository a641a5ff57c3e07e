//! Skillbox CLI - run commands and inspect skills against a sandbox
//!
//! Usage:
//!   skillbox -c "command"            Execute a command string
//!   skillbox script.sh               Execute a script file from the host
//!   skillbox                         Read a script from stdin
//!   skillbox --skills-dir DIR --list-skills     List discovered skills
//!   skillbox --skills-dir DIR --show-skill NAME Print a skill's instructions

use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use skillbox::sandbox::Sandbox;
use skillbox::skills::{self, SkillRegistry};
use skillbox::{CommandResult, ResourceLimits, SandboxConfig, Toolbox};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "skillbox", version, about = "Run commands in a skillbox sandbox")]
struct Cli {
    /// Command string to execute.
    #[arg(short = 'c', conflicts_with = "script")]
    command: Option<String>,

    /// Host script file to execute.
    script: Option<PathBuf>,

    /// Directory of skill bundles to upload under /skills.
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

    /// Command timeout in milliseconds.
    #[arg(long, env = "SKILLBOX_TIMEOUT_MS", default_value_t = 30_000)]
    timeout_ms: u64,

    /// List discovered skills and exit.
    #[arg(long, conflicts_with_all = ["command", "script", "show_skill"])]
    list_skills: bool,

    /// Print a skill's instructions and exit.
    #[arg(long, value_name = "NAME", conflicts_with_all = ["command", "script"])]
    show_skill: Option<String>,
}

impl Cli {
    fn sandbox_config(&self) -> SandboxConfig {
        SandboxConfig {
            root: self.root.clone(),
            prefix: self.prefix.clone(),
            working_dir: self.working_dir.clone(),
            limits: ResourceLimits {
                timeout: Duration::from_millis(self.timeout_ms),
                ..ResourceLimits::default()
            },
        }
    }

    fn script_text(&self) -> anyhow::Result<String> {
        if let Some(command) = &self.command {
            return Ok(command.clone());
        }
        if let Some(path) = &self.script {
            return std::fs::read_to_string(path)
                .with_context(|| format!("{}: cannot read script", path.display()));
        }

        let mut script = String::new();
        io::stdin()
            .read_to_string(&mut script)
            .context("failed to read stdin")?;
        Ok(script)
    }
}

async fn list_skills(skills_dir: Option<PathBuf>) -> anyhow::Result<ExitCode> {
    let dir = skills_dir.context("--skills-dir is required to list skills")?;
    let discovery = skills::discover(dir).await?;
    print!("{}", discovery.index());
    Ok(ExitCode::SUCCESS)
}

async fn show_skill(skills_dir: Option<PathBuf>, name: &str) -> anyhow::Result<ExitCode> {
    let dir = skills_dir.context("--skills-dir is required to show a skill")?;
    let discovery = skills::discover(dir).await?;
    match discovery.instructions(name) {
        Some(instructions) => {
            println!("{instructions}");
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!("skillbox: unknown skill '{name}'");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    if cli.list_skills {
        return list_skills(cli.skills_dir).await;
    }
    if let Some(name) = &cli.show_skill {
        return show_skill(cli.skills_dir.clone(), name).await;
    }

    if cli.command.is_none() && cli.script.is_none() && io::stdin().is_terminal() {
        anyhow::bail!("no command given; use -c, a script file, or pipe a script on stdin");
    }
    let script = cli.script_text()?;

    let sandbox = Arc::new(cli.sandbox_config().build().await?);
    if let Some(dir) = &cli.skills_dir {
        Toolbox::setup(sandbox.clone(), dir).await?;
    }

    let result = sandbox.execute_command(&script).await;
    write_output(&mut io::stdout().lock(), &mut io::stderr().lock(), &result)?;

    Ok(ExitCode::from(u8::try_from(result.exit_code).unwrap_or(1)))
}

fn write_output(
    stdout: &mut impl Write,
    stderr: &mut impl Write,
    result: &CommandResult,
) -> anyhow::Result<()> {
    stdout
        .write_all(result.stdout.as_bytes())
        .and_then(|()| stdout.flush())
        .context("failed to write stdout")?;
    stderr
        .write_all(result.stderr.as_bytes())
        .and_then(|()| stderr.flush())
        .context("failed to write stderr")?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .init();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("skillbox: {e:#}");
            ExitCode::FAILURE
        }
    }
}
