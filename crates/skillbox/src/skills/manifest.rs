//! `SKILL.md` parsing.
//!
//! A manifest is YAML front matter between `---` lines followed by a
//! free-form Markdown body:
//!
//! ```text
//! ---
//! name: csv
//! description: Filter, sort and summarize CSV files
//! ---
//!
//! # CSV
//!
//! Run `sh /skills/csv/filter.sh <column-value> <file>` ...
//! ```
//!
//! The front matter is advertised; the body is the instructions, only shown
//! when the skill is requested by name.

use serde::Deserialize;

/// Longest accepted skill name.
pub const MAX_NAME_LEN: usize = 64;

/// Longest accepted description.
pub const MAX_DESCRIPTION_LEN: usize = 1024;

/// A parsed skill manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillManifest {
    /// Unique skill name.
    pub name: String,
    /// Short description, always visible to the agent.
    pub description: String,
    /// Manifest body, shown only on request.
    pub instructions: String,
    /// Files in the skill directory, relative to it, `/`-separated.
    pub files: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FrontMatter {
    name: Option<String>,
    description: Option<String>,
}

impl SkillManifest {
    /// Parse manifest text. The returned manifest has no files yet.
    ///
    /// Errors are human-readable reasons.
    pub fn parse(text: &str) -> Result<Self, String> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let (header, body) = split_front_matter(text)?;

        let front: FrontMatter = if header.trim().is_empty() {
            FrontMatter {
                name: None,
                description: None,
            }
        } else {
            serde_yaml::from_str(header).map_err(|e| format!("invalid front matter: {e}"))?
        };

        let name = front
            .name
            .map(|n| n.trim().to_string())
            .ok_or("missing `name` in front matter")?;
        validate_name(&name)?;

        let description = front
            .description
            .map(|d| d.trim().to_string())
            .ok_or("missing `description` in front matter")?;
        if description.is_empty() {
            return Err("`description` must not be empty".into());
        }
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(format!(
                "`description` is longer than {MAX_DESCRIPTION_LEN} characters"
            ));
        }

        Ok(Self {
            name,
            description,
            instructions: body.trim().to_string(),
            files: Vec::new(),
        })
    }
}

/// Check a skill name: 1-64 ASCII letters, digits, `-` or `_`.
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("`name` must not be empty".into());
    }
    if name.len() > MAX_NAME_LEN {
        return Err(format!("`name` is longer than {MAX_NAME_LEN} characters"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(format!("`name` contains invalid character {c:?}"));
    }
    Ok(())
}

/// Split `---\n<yaml>\n---\n<body>`.
fn split_front_matter(text: &str) -> Result<(&str, &str), String> {
    let mut lines = text.split_inclusive('\n');
    match lines.next() {
        Some(first) if first.trim_end() == "---" => {}
        _ => return Err("manifest must start with a `---` front matter block".into()),
    }

    let header_start = text.find('\n').map_or(text.len(), |i| i + 1);
    let mut offset = header_start;
    for line in lines {
        if line.trim_end() == "---" {
            let header = &text[header_start..offset];
            let body = &text[offset + line.len()..];
            return Ok((header, body));
        }
        offset += line.len();
    }
    Err("unterminated front matter block".into())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const CSV: &str = "---\nname: csv\ndescription: Filter and sort CSV files\nversion: 1.0\n---\n\n# CSV\n\nUse filter.sh.\n";

    #[test]
    fn test_parse() {
        let manifest = SkillManifest::parse(CSV).unwrap();
        assert_eq!(manifest.name, "csv");
        assert_eq!(manifest.description, "Filter and sort CSV files");
        assert_eq!(manifest.instructions, "# CSV\n\nUse filter.sh.");
        assert!(manifest.files.is_empty());
    }

    #[test]
    fn test_crlf_and_bom() {
        let text = "\u{feff}---\r\nname: text\r\ndescription: Text tools\r\n---\r\nBody\r\n";
        let manifest = SkillManifest::parse(text).unwrap();
        assert_eq!(manifest.name, "text");
        assert_eq!(manifest.description, "Text tools");
        assert_eq!(manifest.instructions, "Body");
    }

    #[test]
    fn test_multiline_description() {
        let text = "---\nname: csv\ndescription: >\n  Folded\n  description\n---\n";
        let manifest = SkillManifest::parse(text).unwrap();
        assert_eq!(manifest.description, "Folded description");
        assert_eq!(manifest.instructions, "");
    }

    #[test]
    fn test_missing_front_matter() {
        let err = SkillManifest::parse("# Just markdown\n").unwrap_err();
        assert!(err.contains("front matter"));

        let err = SkillManifest::parse("---\nname: x\n").unwrap_err();
        assert!(err.contains("unterminated"));
    }

    #[test]
    fn test_missing_fields() {
        let err = SkillManifest::parse("---\ndescription: d\n---\n").unwrap_err();
        assert!(err.contains("name"));

        let err = SkillManifest::parse("---\nname: x\n---\n").unwrap_err();
        assert!(err.contains("description"));

        let err = SkillManifest::parse("---\nname: x\ndescription: '  '\n---\n").unwrap_err();
        assert!(err.contains("empty"));
    }

    #[test]
    fn test_invalid_yaml() {
        let err = SkillManifest::parse("---\nname: [unclosed\n---\n").unwrap_err();
        assert!(err.contains("invalid front matter"));
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("csv-tools_2").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("has space").is_err());
        assert!(validate_name("../escape").is_err());
        assert!(validate_name(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_description_length() {
        let long = "d".repeat(MAX_DESCRIPTION_LEN + 1);
        let text = format!("---\nname: x\ndescription: {long}\n---\n");
        assert!(SkillManifest::parse(&text).is_err());
    }
}
