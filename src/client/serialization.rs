//! Path handling for JSON request bodies
//!
//! Paths are sent as resolved absolute paths with `/` separators on every
//! platform, so the service sees the same value whichever OS the client runs on.

use serde::{Serialize, Serializer};
use std::io;
use std::path::{Component, Path, PathBuf, Prefix};

/// A path that serializes as its resolved absolute, forward-slash form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath(pub PathBuf);

impl From<PathBuf> for ResolvedPath {
    fn from(path: PathBuf) -> Self {
        ResolvedPath(path)
    }
}

impl From<&Path> for ResolvedPath {
    fn from(path: &Path) -> Self {
        ResolvedPath(path.to_path_buf())
    }
}

impl From<&str> for ResolvedPath {
    fn from(path: &str) -> Self {
        ResolvedPath(PathBuf::from(path))
    }
}

impl Serialize for ResolvedPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_resolved_path(&self.0, serializer)
    }
}

/// `serialize_with` helper for path fields.
///
/// ```
/// #[derive(serde::Serialize)]
/// struct Upload {
///     #[serde(serialize_with = "deta_client::serialize_resolved_path")]
///     source: std::path::PathBuf,
/// }
/// ```
pub fn serialize_resolved_path<P, S>(path: &P, serializer: S) -> Result<S::Ok, S::Error>
where
    P: AsRef<Path>,
    S: Serializer,
{
    let resolved = resolve_posix(path.as_ref()).map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&resolved)
}

/// Resolves a path against the working directory, following symlinks where
/// the path exists, and renders it with `/` separators.
pub fn resolve_posix(path: &Path) -> io::Result<String> {
    let absolute = match std::fs::canonicalize(path) {
        Ok(canonical) => canonical,
        Err(_) => std::path::absolute(path)?,
    };
    Ok(to_posix(&absolute))
}

fn to_posix(path: &Path) -> String {
    let mut prefix = String::new();
    let mut segments: Vec<String> = Vec::new();

    for component in path.components() {
        match component {
            Component::Prefix(p) => {
                prefix = match p.kind() {
                    Prefix::Disk(letter) | Prefix::VerbatimDisk(letter) => {
                        format!("{}:", letter as char)
                    }
                    _ => p.as_os_str().to_string_lossy().replace('\\', "/"),
                };
            }
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                segments.pop();
            }
            Component::Normal(segment) => segments.push(segment.to_string_lossy().into_owned()),
        }
    }

    format!("{prefix}/{}", segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_to_posix_normalizes_parent_components() {
        assert_eq!(to_posix(Path::new("/data/./raw/../files/a.txt")), "/data/files/a.txt");
        assert_eq!(to_posix(Path::new("/")), "/");
    }

    #[test]
    fn test_relative_path_becomes_absolute() {
        let resolved = resolve_posix(Path::new("some/relative/file.txt")).unwrap();
        assert!(resolved.starts_with('/') || resolved.chars().nth(1) == Some(':'));
        assert!(resolved.ends_with("/some/relative/file.txt"));
        assert!(!resolved.contains('\\'));
    }

    #[test]
    fn test_existing_path_is_canonicalized() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("report.csv");
        std::fs::write(&file, "a,b").unwrap();

        let indirect = dir.path().join("..").join(dir.path().file_name().unwrap()).join("report.csv");
        assert_eq!(
            resolve_posix(&indirect).unwrap(),
            resolve_posix(&file).unwrap()
        );
    }

    #[test]
    fn test_resolved_path_in_json_body() {
        #[derive(Serialize)]
        struct Upload {
            name: String,
            #[serde(serialize_with = "serialize_resolved_path")]
            source: PathBuf,
            backup: ResolvedPath,
        }

        let upload = Upload {
            name: "report".to_string(),
            source: PathBuf::from("/var/data/../data/report.csv"),
            backup: ResolvedPath::from("/var/backups/./report.csv"),
        };

        let value = serde_json::to_value(&upload).unwrap();
        let source = value["source"].as_str().unwrap();
        let backup = value["backup"].as_str().unwrap();
        assert!(source.ends_with("/data/report.csv"));
        assert!(!source.contains(".."));
        assert!(backup.ends_with("/backups/report.csv"));
        assert_eq!(value["name"], json!("report"));
    }
}
