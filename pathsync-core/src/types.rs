//! Domain types shared by every sync view.
//!
//! Relative paths are always `/`-separated [`RelPath`] values, whatever the
//! host platform; they are converted to `PathBuf` only at the filesystem edge.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// RelPath
// ---------------------------------------------------------------------------

/// A path relative to the sync root, e.g. `docs/notes/a.txt`.
///
/// Never empty, never absolute, never contains `.` or `..` components.
/// Ordering is plain string ordering of the components joined by `/`,
/// which places a directory before everything inside it.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelPath(String);

impl RelPath {
    /// Parse a `/`- or `\`-separated relative path.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let mut parts = Vec::new();
        for part in raw.split(['/', '\\']) {
            match part {
                "" | "." => continue,
                ".." => return Err(CoreError::InvalidPath(raw.to_string())),
                other => parts.push(other),
            }
        }
        if parts.is_empty() || raw.starts_with('/') {
            return Err(CoreError::InvalidPath(raw.to_string()));
        }
        Ok(Self(parts.join("/")))
    }

    /// Express `path` relative to `root`.
    pub fn from_path(root: &Path, path: &Path) -> Result<Self, CoreError> {
        let relative = path
            .strip_prefix(root)
            .map_err(|_| CoreError::InvalidPath(path.display().to_string()))?;
        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(name) => parts.push(name.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => return Err(CoreError::InvalidPath(path.display().to_string())),
            }
        }
        if parts.is_empty() {
            return Err(CoreError::InvalidPath(path.display().to_string()));
        }
        Ok(Self(parts.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Absolute location of this path under `root`.
    pub fn to_path(&self, root: &Path) -> PathBuf {
        let mut out = root.to_path_buf();
        for part in self.0.split('/') {
            out.push(part);
        }
        out
    }

    /// Final component.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Containing directory, or `None` for top-level entries.
    pub fn parent(&self) -> Option<RelPath> {
        self.0.rfind('/').map(|idx| Self(self.0[..idx].to_string()))
    }

    /// Every proper ancestor, nearest first.
    pub fn ancestors(&self) -> Vec<RelPath> {
        let mut out = Vec::new();
        let mut current = self.parent();
        while let Some(path) = current {
            current = path.parent();
            out.push(path);
        }
        out
    }

    /// Number of components (`a` is 1, `a/b` is 2).
    pub fn depth(&self) -> usize {
        self.0.split('/').count()
    }

    /// `true` if `other` lives strictly below `self`.
    pub fn is_ancestor_of(&self, other: &RelPath) -> bool {
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0.as_bytes()[self.0.len()] == b'/'
    }

    /// `true` if the two paths are equal or one contains the other.
    pub fn is_related_to(&self, other: &RelPath) -> bool {
        self == other || self.is_ancestor_of(other) || other.is_ancestor_of(self)
    }

    /// Sibling path with `suffix` inserted before the extension:
    /// `dir/report.txt` + `_x` → `dir/report_x.txt`.
    pub fn with_stem_suffix(&self, suffix: &str) -> RelPath {
        let name = self.file_name();
        let renamed = match name.rfind('.') {
            Some(idx) if idx > 0 => format!("{}{}{}", &name[..idx], suffix, &name[idx..]),
            _ => format!("{name}{suffix}"),
        };
        match self.parent() {
            Some(parent) => Self(format!("{}/{}", parent.0, renamed)),
            None => Self(renamed),
        }
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<&str> for RelPath {
    type Error = CoreError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// PathRecord
// ---------------------------------------------------------------------------

/// State of one path in one view (index, local or remote).
///
/// `content_hash` is a lower-case hex SHA-256 digest; it is empty for
/// directories. `modified_time` is advisory only: equality of content is
/// always decided by the hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRecord {
    /// Filled from the map key on load; not repeated in the persisted body.
    #[serde(skip)]
    pub relative_path: RelPath,
    #[serde(default)]
    pub content_hash: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_directory: bool,
}

impl PathRecord {
    pub fn file(
        relative_path: RelPath,
        content_hash: impl Into<String>,
        size: u64,
        modified_time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            relative_path,
            content_hash: content_hash.into(),
            size,
            modified_time,
            is_directory: false,
        }
    }

    pub fn directory(relative_path: RelPath, modified_time: Option<DateTime<Utc>>) -> Self {
        Self {
            relative_path,
            content_hash: String::new(),
            size: 0,
            modified_time,
            is_directory: true,
        }
    }

    /// Content equality: hash for files, kind for directories.
    ///
    /// A file with an empty (unknown) hash never equals anything.
    pub fn same_content(&self, other: &PathRecord) -> bool {
        match (self.is_directory, other.is_directory) {
            (true, true) => true,
            (false, false) => !self.content_hash.is_empty() && self.content_hash == other.content_hash,
            _ => false,
        }
    }
}

/// One current-state view of a tree, keyed by relative path.
pub type Snapshot = BTreeMap<RelPath, PathRecord>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> RelPath {
        RelPath::parse(s).unwrap()
    }

    #[test]
    fn parse_normalises_separators() {
        assert_eq!(p("a\\b//c").as_str(), "a/b/c");
        assert_eq!(p("./a/./b").as_str(), "a/b");
    }

    #[test]
    fn parse_rejects_escapes_and_absolute() {
        assert!(RelPath::parse("../x").is_err());
        assert!(RelPath::parse("/etc/passwd").is_err());
        assert!(RelPath::parse("").is_err());
    }

    #[test]
    fn from_path_strips_root() {
        let root = Path::new("/data/project");
        let rel = RelPath::from_path(root, &root.join("docs").join("a.txt")).unwrap();
        assert_eq!(rel.as_str(), "docs/a.txt");
        assert_eq!(rel.to_path(root), root.join("docs").join("a.txt"));
        assert!(RelPath::from_path(root, root).is_err());
    }

    #[test]
    fn ancestry_respects_component_boundaries() {
        assert!(p("a").is_ancestor_of(&p("a/b")));
        assert!(p("a").is_ancestor_of(&p("a/b/c")));
        assert!(!p("a").is_ancestor_of(&p("ab/c")));
        assert!(!p("a").is_ancestor_of(&p("a")));
        assert!(p("a/b").is_related_to(&p("a")));
        assert!(!p("a/b").is_related_to(&p("a/c")));
    }

    #[test]
    fn ancestors_nearest_first() {
        assert_eq!(p("a/b/c").ancestors(), vec![p("a/b"), p("a")]);
        assert!(p("a").ancestors().is_empty());
        assert_eq!(p("a/b/c").depth(), 3);
    }

    #[test]
    fn stem_suffix_keeps_extension() {
        assert_eq!(p("d/report.txt").with_stem_suffix("_X").as_str(), "d/report_X.txt");
        assert_eq!(p("Makefile").with_stem_suffix("_X").as_str(), "Makefile_X");
        assert_eq!(p(".env").with_stem_suffix("_X").as_str(), ".env_X");
    }

    #[test]
    fn same_content_is_hash_only() {
        let a = PathRecord::file(p("a"), "aa", 1, None);
        let mut b = PathRecord::file(p("a"), "aa", 999, Some(Utc::now()));
        assert!(a.same_content(&b));
        b.content_hash = "bb".into();
        assert!(!a.same_content(&b));

        let unknown = PathRecord::file(p("a"), "", 1, None);
        assert!(!unknown.same_content(&unknown.clone()));

        let dir = PathRecord::directory(p("a"), None);
        assert!(dir.same_content(&PathRecord::directory(p("a"), Some(Utc::now()))));
        assert!(!dir.same_content(&a));
    }
}
