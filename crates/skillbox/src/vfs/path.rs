//! Virtual path normalization.
//!
//! Virtual paths are `/`-separated strings in the sandbox's coordinate space.
//! Normalization folds `.` and `..` segments and collapses repeated
//! separators. A `..` that would climb above the virtual root is rejected
//! rather than clamped, so `/../etc` is an error and never silently becomes
//! `/etc`.

use super::FsError;

/// Split a virtual path into its normalized components.
///
/// Relative paths are interpreted against the virtual root.
pub fn components(path: &str) -> Result<Vec<&str>, FsError> {
    if path.contains('\0') {
        return Err(FsError::InvalidPath(path.escape_default().to_string()));
    }

    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                if parts.pop().is_none() {
                    return Err(FsError::PathEscape(path.to_string()));
                }
            }
            name => parts.push(name),
        }
    }
    Ok(parts)
}

/// Normalize a virtual path to its canonical absolute form (`/a/b`).
///
/// Normalization is idempotent: `normalize(normalize(p)) == normalize(p)`.
pub fn normalize(path: &str) -> Result<String, FsError> {
    let parts = components(path)?;
    Ok(format!("/{}", parts.join("/")))
}

/// Resolve `path` against the virtual directory `cwd`.
///
/// Absolute paths ignore `cwd`. The result is normalized.
pub fn join(cwd: &str, path: &str) -> Result<String, FsError> {
    if path.starts_with('/') {
        normalize(path)
    } else {
        normalize(&format!("{}/{}", cwd.trim_end_matches('/'), path))
    }
}

/// Final component of a normalized virtual path, `None` for the root.
pub fn file_name(path: &str) -> Option<&str> {
    path.rsplit('/').find(|s| !s.is_empty())
}

/// Parent directory of a normalized virtual path (the root is its own parent).
pub fn parent(path: &str) -> &str {
    match path.trim_end_matches('/').rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_basic() {
        assert_eq!(normalize("/a/b/c").unwrap(), "/a/b/c");
        assert_eq!(normalize("a/b").unwrap(), "/a/b");
        assert_eq!(normalize("/").unwrap(), "/");
        assert_eq!(normalize("").unwrap(), "/");
    }

    #[test]
    fn test_normalize_dots() {
        assert_eq!(normalize("/a/./b/../c").unwrap(), "/a/c");
        assert_eq!(normalize("//a///b/").unwrap(), "/a/b");
        assert_eq!(normalize("/a/..").unwrap(), "/");
    }

    #[test]
    fn test_normalize_rejects_escape() {
        assert!(matches!(normalize("/.."), Err(FsError::PathEscape(_))));
        assert!(matches!(
            normalize("/a/../../etc/passwd"),
            Err(FsError::PathEscape(_))
        ));
        assert!(matches!(normalize("../x"), Err(FsError::PathEscape(_))));
    }

    #[test]
    fn test_normalize_rejects_nul() {
        assert!(matches!(normalize("/a\0b"), Err(FsError::InvalidPath(_))));
    }

    #[test]
    fn test_normalize_idempotent() {
        for p in ["/a/./b/../c", "x/y/z", "/", "/skills//csv/", "./a/b/.."] {
            let once = normalize(p).unwrap();
            assert_eq!(normalize(&once).unwrap(), once, "input: {p}");
        }
    }

    #[test]
    fn test_join() {
        assert_eq!(join("/home", "file.txt").unwrap(), "/home/file.txt");
        assert_eq!(join("/home/", "../etc").unwrap(), "/etc");
        assert_eq!(join("/home", "/abs").unwrap(), "/abs");
        assert!(join("/", "../../x").is_err());
    }

    #[test]
    fn test_file_name_and_parent() {
        assert_eq!(file_name("/a/b.txt"), Some("b.txt"));
        assert_eq!(file_name("/"), None);
        assert_eq!(parent("/a/b.txt"), "/a");
        assert_eq!(parent("/a"), "/");
        assert_eq!(parent("/"), "/");
    }
}
