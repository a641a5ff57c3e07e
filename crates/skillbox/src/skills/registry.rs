//! Skills directory scanning and the registry of discovered skills.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{SkillError, SkillManifest};
use crate::sandbox::SandboxFile;
use crate::vfs::path;

/// Manifest file name inside each skill directory.
pub const MANIFEST_FILE: &str = "SKILL.md";

/// Where skills appear inside the sandbox.
pub const DEFAULT_MOUNT: &str = "/skills";

/// Name and description of a skill, for advertisement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SkillSummary {
    /// Skill name (unique identifier).
    pub name: String,
    /// One-line description.
    pub description: String,
}

/// Access to discovered skills.
///
/// Summaries are cheap and always available; instructions are looked up only
/// when a skill is requested by name.
pub trait SkillRegistry: Send + Sync {
    /// List all skills (name and description only).
    fn list_skills(&self) -> Vec<SkillSummary>;

    /// Full instructions for a skill.
    fn instructions(&self, name: &str) -> Option<String>;

    /// Check if a skill exists.
    fn has_skill(&self, name: &str) -> bool {
        self.instructions(name).is_some()
    }
}

/// Result of scanning a skills directory.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Skill summaries, sorted by name.
    pub skills: Vec<SkillSummary>,
    /// Every file of every skill, at its sandbox path.
    pub files: Vec<SandboxFile>,
    /// Manifest bodies keyed by skill name.
    pub instructions_by_name: BTreeMap<String, String>,
    /// Parsed manifests keyed by skill name.
    pub manifests: BTreeMap<String, SkillManifest>,
}

impl Discovery {
    /// The aligned `name  description` listing of all skills.
    pub fn index(&self) -> String {
        render_index(&self.skills)
    }

    /// Whether no skills were found.
    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}

impl SkillRegistry for Discovery {
    fn list_skills(&self) -> Vec<SkillSummary> {
        self.skills.clone()
    }

    fn instructions(&self, name: &str) -> Option<String> {
        self.instructions_by_name.get(name).cloned()
    }
}

/// Scan `skills_dir`, placing skill files under [`DEFAULT_MOUNT`].
pub async fn discover(skills_dir: impl Into<PathBuf>) -> Result<Discovery, SkillError> {
    discover_at(skills_dir, DEFAULT_MOUNT).await
}

/// Scan `skills_dir`, placing skill files under `mount`.
///
/// A missing skills directory yields an empty discovery. Subdirectories
/// without a manifest are skipped with a warning. Invalid manifests and
/// duplicate names fail the whole scan.
pub async fn discover_at(
    skills_dir: impl Into<PathBuf>,
    mount: &str,
) -> Result<Discovery, SkillError> {
    let skills_dir = skills_dir.into();
    let mount = path::normalize(mount).map_err(|e| SkillError::InvalidMount(e.to_string()))?;

    let discovery = tokio::task::spawn_blocking(move || scan(&skills_dir, &mount)).await??;
    info!(
        skills = discovery.skills.len(),
        files = discovery.files.len(),
        "discovered skills"
    );
    Ok(discovery)
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> SkillError + '_ {
    move |source| SkillError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn scan(skills_dir: &Path, mount: &str) -> Result<Discovery, SkillError> {
    let mut discovery = Discovery::default();
    if !skills_dir.exists() {
        warn!(dir = %skills_dir.display(), "skills directory does not exist");
        return Ok(discovery);
    }

    let mut dirs: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(skills_dir).map_err(io_error(skills_dir))? {
        let entry = entry.map_err(io_error(skills_dir))?;
        let entry_path = entry.path();
        if entry_path.is_dir() {
            dirs.push(entry_path);
        } else {
            debug!(path = %entry_path.display(), "ignoring non-directory in skills directory");
        }
    }
    dirs.sort();

    let mut sources: BTreeMap<String, PathBuf> = BTreeMap::new();
    for dir in dirs {
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            warn!(dir = %dir.display(), "skipping skill directory without {MANIFEST_FILE}");
            continue;
        }

        let text = fs::read_to_string(&manifest_path).map_err(io_error(&manifest_path))?;
        let mut manifest =
            SkillManifest::parse(&text).map_err(|reason| SkillError::InvalidManifest {
                path: manifest_path.clone(),
                reason,
            })?;

        if let Some(first) = sources.get(&manifest.name) {
            return Err(SkillError::AmbiguousSkill {
                name: manifest.name,
                first: first.clone(),
                second: dir,
            });
        }

        let files = collect_files(&dir)?;
        for (rel, content) in files {
            discovery.files.push(SandboxFile::new(
                format!("{mount}/{}/{rel}", manifest.name).replace("//", "/"),
                content,
            ));
            manifest.files.push(rel);
        }

        debug!(
            skill = %manifest.name,
            files = manifest.files.len(),
            dir = %dir.display(),
            "loaded skill"
        );

        discovery.skills.push(SkillSummary {
            name: manifest.name.clone(),
            description: manifest.description.clone(),
        });
        discovery
            .instructions_by_name
            .insert(manifest.name.clone(), manifest.instructions.clone());
        sources.insert(manifest.name.clone(), dir);
        discovery.manifests.insert(manifest.name.clone(), manifest);
    }

    discovery.skills.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(discovery)
}

/// Regular files under a skill directory as (`/`-separated relative path,
/// content). Symlinks are skipped.
fn collect_files(dir: &Path) -> Result<Vec<(String, Vec<u8>)>, SkillError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            SkillError::Io {
                path,
                source: e.into(),
            }
        })?;

        if entry.file_type().is_symlink() {
            warn!(path = %entry.path().display(), "skipping symlink in skill directory");
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(dir)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let content = fs::read(entry.path()).map_err(io_error(entry.path()))?;
        files.push((rel, content));
    }
    Ok(files)
}

/// Render skills as an aligned listing, one per line.
///
/// ```text
/// csv     Filter, sort and summarize CSV files
/// text    Count and transform text files
/// ```
pub fn render_index(skills: &[SkillSummary]) -> String {
    if skills.is_empty() {
        return String::new();
    }

    let max_name_len = skills.iter().map(|s| s.name.len()).max().unwrap_or(0);
    let padding = max_name_len + 4;

    let mut output = String::new();
    for skill in skills {
        output.push_str(&skill.name);
        output.push_str(&" ".repeat(padding - skill.name.len()));
        output.push_str(&skill.description);
        output.push('\n');
    }
    output
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn manifest(name: &str, description: &str) -> String {
        format!("---\nname: {name}\ndescription: {description}\n---\n\n# {name}\n\nDetails for {name}.\n")
    }

    #[tokio::test]
    async fn test_discover_two_skills() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "csv/SKILL.md", &manifest("csv", "CSV tools"));
        write(dir.path(), "csv/filter.sh", "grep \"$1\" \"$2\"\n");
        write(dir.path(), "csv/lib/helpers.sh", "# helpers\n");
        write(dir.path(), "text/SKILL.md", &manifest("text", "Text tools"));

        let discovery = discover(dir.path()).await.unwrap();

        assert_eq!(
            discovery.skills,
            vec![
                SkillSummary {
                    name: "csv".into(),
                    description: "CSV tools".into()
                },
                SkillSummary {
                    name: "text".into(),
                    description: "Text tools".into()
                },
            ]
        );

        let paths: Vec<&str> = discovery.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "/skills/csv/SKILL.md",
                "/skills/csv/filter.sh",
                "/skills/csv/lib/helpers.sh",
                "/skills/text/SKILL.md",
            ]
        );
        assert_eq!(
            discovery.manifests["csv"].files,
            vec!["SKILL.md", "filter.sh", "lib/helpers.sh"]
        );
        assert_eq!(
            discovery.instructions("csv").unwrap(),
            "# csv\n\nDetails for csv."
        );
        assert!(discovery.instructions("nope").is_none());
    }

    #[tokio::test]
    async fn test_files_use_manifest_name() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "csv-v2/SKILL.md", &manifest("csv", "CSV tools"));

        let discovery = discover_at(dir.path(), "/opt/skills/").await.unwrap();
        assert_eq!(discovery.files[0].path, "/opt/skills/csv/SKILL.md");
    }

    #[tokio::test]
    async fn test_root_mount() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "csv/SKILL.md", &manifest("csv", "CSV tools"));

        let discovery = discover_at(dir.path(), "/").await.unwrap();
        assert_eq!(discovery.files[0].path, "/csv/SKILL.md");
    }

    #[tokio::test]
    async fn test_skips_directories_without_manifest() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "csv/SKILL.md", &manifest("csv", "CSV tools"));
        write(dir.path(), "drafts/notes.md", "not a skill");
        write(dir.path(), "README.md", "top-level file");

        let discovery = discover(dir.path()).await.unwrap();
        assert_eq!(discovery.skills.len(), 1);
        assert!(discovery.files.iter().all(|f| f.path.starts_with("/skills/csv/")));
    }

    #[tokio::test]
    async fn test_duplicate_names_are_ambiguous() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a/SKILL.md", &manifest("csv", "First"));
        write(dir.path(), "b/SKILL.md", &manifest("csv", "Second"));

        let err = discover(dir.path()).await.unwrap_err();
        match err {
            SkillError::AmbiguousSkill { name, first, second } => {
                assert_eq!(name, "csv");
                assert!(first.ends_with("a"));
                assert!(second.ends_with("b"));
            }
            other => panic!("expected AmbiguousSkill, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_names_are_case_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a/SKILL.md", &manifest("csv", "lower"));
        write(dir.path(), "b/SKILL.md", &manifest("CSV", "upper"));

        let discovery = discover(dir.path()).await.unwrap();
        assert_eq!(discovery.skills.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_manifest_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "bad/SKILL.md", "no front matter here");

        let err = discover(dir.path()).await.unwrap_err();
        assert!(matches!(err, SkillError::InvalidManifest { .. }));
        assert!(err.to_string().contains("SKILL.md"));
    }

    #[tokio::test]
    async fn test_empty_and_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let discovery = discover(dir.path()).await.unwrap();
        assert!(discovery.is_empty());
        assert!(discovery.files.is_empty());

        let discovery = discover(dir.path().join("does-not-exist")).await.unwrap();
        assert!(discovery.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_mount() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_at(dir.path(), "/../up").await.unwrap_err();
        assert!(matches!(err, SkillError::InvalidMount(_)));
    }

    #[test]
    fn test_render_index() {
        let skills = vec![
            SkillSummary {
                name: "csv".into(),
                description: "CSV tools".into(),
            },
            SkillSummary {
                name: "markdown".into(),
                description: "Markdown tools".into(),
            },
        ];

        let index = render_index(&skills);
        let lines: Vec<&str> = index.lines().collect();
        assert_eq!(lines[0], "csv         CSV tools");
        assert_eq!(lines[1], "markdown    Markdown tools");
        assert_eq!(render_index(&[]), "");
    }
}
