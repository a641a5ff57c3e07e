//! End-to-end tests: skills directory on disk, through discovery and upload,
//! to tool calls against the sandbox.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use skillbox::sandbox::Sandbox;
use skillbox::skills::{self, SkillSummary};
use skillbox::{SandboxFile, SetupError, SkillError, Toolbox, ToolboxState, VirtualSandbox};
use tempfile::TempDir;

const CSV_MANIFEST: &str = "\
---
name: csv
description: Filter and sort CSV files
---

# CSV

Filter rows by region and sort by amount:

    sh /skills/csv/top.sh REGION FILE
";

const TOP_SCRIPT: &str = "\
#!/bin/sh
# Rows for one region, largest amount first
grep \"^$1,\" \"$2\" | sort -t, -k3 -nr
";

const TEXT_MANIFEST: &str = "\
---
name: text
description: Count words and lines
---

Use `wc` on the file.
";

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn skills_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "csv/SKILL.md", CSV_MANIFEST);
    write(dir.path(), "csv/top.sh", TOP_SCRIPT);
    write(dir.path(), "text/SKILL.md", TEXT_MANIFEST);
    write(dir.path(), "text/data/sample.txt", "one two\nthree\n");
    dir
}

const SALES: &str = "\
West,apple,10
East,pear,7
West,kiwi,25
North,plum,3
West,fig,4
East,lime,12
";

/// The filter+sort computed directly over the rows.
fn expected_top(region: &str) -> String {
    let mut rows: Vec<(&str, i64)> = SALES
        .lines()
        .filter(|line| line.split(',').next() == Some(region))
        .map(|line| (line, line.rsplit(',').next().unwrap().parse().unwrap()))
        .collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1));
    rows.iter().map(|(line, _)| format!("{line}\n")).collect()
}

#[tokio::test]
async fn test_discovery_covers_both_skills() {
    let dir = skills_dir();
    let discovery = skills::discover(dir.path()).await.unwrap();

    assert_eq!(
        discovery.skills,
        vec![
            SkillSummary {
                name: "csv".into(),
                description: "Filter and sort CSV files".into()
            },
            SkillSummary {
                name: "text".into(),
                description: "Count words and lines".into()
            },
        ]
    );

    let mut paths: Vec<&str> = discovery.files.iter().map(|f| f.path.as_str()).collect();
    paths.sort();
    assert_eq!(
        paths,
        vec![
            "/skills/csv/SKILL.md",
            "/skills/csv/top.sh",
            "/skills/text/SKILL.md",
            "/skills/text/data/sample.txt",
        ]
    );
}

#[tokio::test]
async fn test_ls_skills_after_upload() {
    let dir = skills_dir();
    let sandbox = Arc::new(VirtualSandbox::in_memory().await.unwrap());
    let toolbox = Toolbox::setup(sandbox.clone(), dir.path()).await.unwrap();
    assert_eq!(toolbox.state(), ToolboxState::Ready);

    let result = sandbox.execute_command("ls /skills").await;
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "csv\ntext\n");

    let result = sandbox.execute_command("cat /skills/text/data/sample.txt | wc -w").await;
    assert_eq!(result.stdout, "3\n");
}

#[tokio::test]
async fn test_disk_sandbox_with_prefix() {
    let dir = skills_dir();
    let root = tempfile::tempdir().unwrap();
    let sandbox = Arc::new(
        VirtualSandbox::builder()
            .root(root.path())
            .prefix("/workspace")
            .build()
            .await
            .unwrap(),
    );
    Toolbox::setup(sandbox.clone(), dir.path()).await.unwrap();

    assert!(root.path().join("workspace/skills/csv/top.sh").is_file());
    assert!(!root.path().join("workspace/workspace").exists());
    assert_eq!(sandbox.execute_command("ls /skills").await.stdout, "csv\ntext\n");
}

#[tokio::test]
async fn test_filter_and_sort_matches_direct_computation() {
    let sandbox = VirtualSandbox::in_memory().await.unwrap();
    sandbox
        .write_files(&[SandboxFile::new("/sales.csv", SALES)])
        .await
        .unwrap();

    let result = sandbox
        .execute_command("grep '^West,' /sales.csv | sort -t, -k3 -nr")
        .await;
    assert_eq!(result.exit_code, 0, "stderr: {}", result.stderr);
    assert_eq!(result.stdout, expected_top("West"));
    assert_eq!(result.stdout, "West,kiwi,25\nWest,apple,10\nWest,fig,4\n");
}

#[tokio::test]
async fn test_skill_script_through_tools() {
    let dir = skills_dir();
    let sandbox = Arc::new(VirtualSandbox::in_memory().await.unwrap());
    let toolbox = Toolbox::setup(sandbox, dir.path()).await.unwrap();

    let instructions = toolbox
        .invoke("skill", json!({"name": "csv"}))
        .await
        .unwrap();
    assert!(instructions.text.contains("sh /skills/csv/top.sh REGION FILE"));

    toolbox
        .invoke("write_file", json!({"path": "/sales.csv", "content": SALES}))
        .await
        .unwrap();
    let out = toolbox
        .invoke("bash", json!({"command": "sh /skills/csv/top.sh East /sales.csv"}))
        .await
        .unwrap();
    assert!(!out.is_error, "{}", out.text);
    assert_eq!(out.text, expected_top("East"));

    let out = toolbox
        .invoke("bash", json!({"command": "sh /skills/csv/top.sh East /sales.csv > /east.csv && wc -l < /east.csv"}))
        .await
        .unwrap();
    assert_eq!(out.text, "2\n");
}

#[tokio::test]
async fn test_missing_file_is_a_result() {
    let sandbox = VirtualSandbox::in_memory().await.unwrap();
    let result = sandbox.execute_command("sort -n /nope.csv").await;
    assert_ne!(result.exit_code, 0);
    assert!(!result.stderr.is_empty());

    let result = sandbox.execute_command("frobnicate --all").await;
    assert_eq!(result.exit_code, skillbox::EXIT_COMMAND_NOT_FOUND);
}

#[tokio::test]
async fn test_timeout_returns_promptly() {
    let sandbox = VirtualSandbox::in_memory().await.unwrap();
    let started = Instant::now();
    let result = sandbox
        .execute("sleep 30", Some(Duration::from_millis(100)))
        .await;

    assert!(result.timed_out);
    assert_eq!(result.exit_code, skillbox::EXIT_TIMEOUT);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_duplicate_skill_names_abort_setup() {
    let dir = skills_dir();
    write(dir.path(), "csv-copy/SKILL.md", CSV_MANIFEST);

    let sandbox = Arc::new(VirtualSandbox::in_memory().await.unwrap());
    let err = Toolbox::setup(sandbox, dir.path()).await.unwrap_err();
    assert!(matches!(
        err,
        SetupError::Discovery(SkillError::AmbiguousSkill { ref name, .. }) if name == "csv"
    ));
}

#[tokio::test]
async fn test_empty_skills_directory() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = Arc::new(VirtualSandbox::in_memory().await.unwrap());
    let toolbox = Toolbox::setup(sandbox, dir.path()).await.unwrap();

    assert_eq!(toolbox.skill_index(), "");
    let out = toolbox.invoke("skill", json!({"name": "csv"})).await.unwrap();
    assert!(out.is_error);
}

#[tokio::test]
async fn test_path_escape_rejected_everywhere() {
    let sandbox = VirtualSandbox::in_memory().await.unwrap();

    assert!(sandbox.read_file("/../etc/passwd").await.unwrap_err().is_escape());

    let result = sandbox.execute_command("cat ../../etc/passwd").await;
    assert_ne!(result.exit_code, 0);
    assert!(result.stderr.contains("escapes"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_under_disk_root_cannot_reach_host() {
    let root = tempfile::tempdir().unwrap();
    let outside = tempfile::tempdir().unwrap();
    fs::write(outside.path().join("secret.txt"), "TOPSECRET").unwrap();
    std::os::unix::fs::symlink(outside.path(), root.path().join("link")).unwrap();

    let sandbox = VirtualSandbox::builder()
        .root(root.path())
        .build()
        .await
        .unwrap();

    let result = sandbox.execute_command("cat /link/secret.txt").await;
    assert_ne!(result.exit_code, 0);
    assert!(!result.stdout.contains("TOPSECRET"));
    assert!(result.stderr.contains("escapes"), "{}", result.stderr);

    let result = sandbox.execute_command("echo pwned > /link/planted.txt").await;
    assert_ne!(result.exit_code, 0);
    assert!(!outside.path().join("planted.txt").exists());

    assert!(sandbox.read_file("/link/secret.txt").await.unwrap_err().is_escape());
    let err = sandbox
        .write_files(&[SandboxFile::new("/link/upload.txt", "x")])
        .await
        .unwrap_err();
    assert!(matches!(err, skillbox::SandboxError::PartialUpload { .. }));
    assert!(!outside.path().join("upload.txt").exists());
}
