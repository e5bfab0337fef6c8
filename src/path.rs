use crate::error::{Error, Result};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use walkdir::WalkDir;

/// An immutable, hierarchical path: a finite ordered sequence of non-empty components, none of
/// which contain `/` or `:`. The empty sequence is the root.
///
/// Two paths are equal iff their component sequences are equal - never by comparing the
/// serialized string as a prefix, which would incorrectly treat `/foobar` as containing `/foo`.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path {
    components: Vec<String>,
}

impl Path {
    /// Returns the root path.
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Parses `s` into a path.
    ///
    /// Fails with `InvalidArgument` if `s` does not start with `/`, contains `:`, or has a
    /// component (after collapsing repeated `/`) that is empty-after-trim, contains `:`, or
    /// contains `/`.
    pub fn parse(s: &str) -> Result<Self> {
        if !s.starts_with('/') {
            return Err(Error::invalid_argument(format!(
                "path must start with '/': {:?}",
                s
            )));
        }
        if s.contains(':') {
            return Err(Error::invalid_argument(format!(
                "path must not contain ':': {:?}",
                s
            )));
        }

        let components = s
            .split('/')
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect::<Vec<_>>();

        for c in &components {
            validate_component(c)?;
        }

        Ok(Self { components })
    }

    /// Returns a new path equal to `self` with `component` appended.
    pub fn append(&self, component: impl Into<String>) -> Result<Self> {
        let component = component.into();
        validate_component(&component)?;

        let mut components = self.components.clone();
        components.push(component);
        Ok(Self { components })
    }

    /// `true` iff this path is the root.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Returns the parent of this path. Fails with `InvalidArgument` on the root.
    pub fn parent(&self) -> Result<Self> {
        if self.is_root() {
            return Err(Error::invalid_argument("the root path has no parent"));
        }
        Ok(Self {
            components: self.components[..self.components.len() - 1].to_vec(),
        })
    }

    /// Returns the last component of this path. Fails with `InvalidArgument` on the root.
    pub fn last(&self) -> Result<&str> {
        self.components
            .last()
            .map(String::as_str)
            .ok_or_else(|| Error::invalid_argument("the root path has no last component"))
    }

    /// `true` iff `other`'s component sequence is a prefix of `self`'s. Every path is a subpath
    /// of itself.
    pub fn is_subpath(&self, other: &Path) -> bool {
        if other.components.len() > self.components.len() {
            return false;
        }
        self.components
            .iter()
            .zip(other.components.iter())
            .all(|(a, b)| a == b)
    }

    /// Lazily iterates over components, outermost first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(String::as_str)
    }

    /// Number of components (0 for the root).
    pub fn depth(&self) -> usize {
        self.components.len()
    }

    /// Enumerates the local filesystem tree rooted at `dir`, returning paths - relative to
    /// `dir` - of every regular file found.
    ///
    /// Fails with `NotFound` if `dir` does not exist, with `InvalidArgument` if `dir` exists
    /// but is not a directory.
    pub fn list_local(dir: &std::path::Path) -> Result<Vec<Path>> {
        if !dir.exists() {
            return Err(Error::not_found(format!(
                "{} does not exist",
                dir.display()
            )));
        }
        if !dir.is_dir() {
            return Err(Error::invalid_argument(format!(
                "{} is not a directory",
                dir.display()
            )));
        }

        let mut paths = Vec::new();
        for entry in WalkDir::new(dir) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry.path().strip_prefix(dir).map_err(|_| {
                Error::invalid_argument(format!(
                    "{} is not contained within {}",
                    entry.path().display(),
                    dir.display()
                ))
            })?;

            let mut path = Path::root();
            for part in relative.components() {
                let part = part.as_os_str().to_string_lossy();
                path = path.append(part.into_owned())?;
            }
            paths.push(path);
        }

        Ok(paths)
    }

    /// Returns the local-filesystem handle corresponding to this path, joined component-wise
    /// under `root`.
    pub fn to_local_file(&self, root: &std::path::Path) -> PathBuf {
        let mut buf = root.to_path_buf();
        for component in &self.components {
            buf.push(component);
        }
        buf
    }
}

fn validate_component(c: &str) -> Result<()> {
    if c.is_empty() {
        return Err(Error::invalid_argument("path component must not be empty"));
    }
    if c.contains('/') || c.contains(':') {
        return Err(Error::invalid_argument(format!(
            "path component must not contain '/' or ':': {:?}",
            c
        )));
    }
    Ok(())
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return write!(f, "/");
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Path {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Path::parse(s)
    }
}

impl Serialize for Path {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct PathVisitor;

        impl<'de> Visitor<'de> for PathVisitor {
            type Value = Path;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string of the form /c1/c2/... or /")
            }

            fn visit_str<E>(self, v: &str) -> std::result::Result<Path, E>
            where
                E: de::Error,
            {
                Path::parse(v).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(PathVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_format_round_trip() {
        let p = Path::parse("/a/b/c").unwrap();
        assert_eq!(p.to_string(), "/a/b/c");
        assert_eq!(Path::parse(&p.to_string()).unwrap(), p);
    }

    #[test]
    fn parse_root() {
        let p = Path::parse("/").unwrap();
        assert!(p.is_root());
        assert_eq!(p.to_string(), "/");
    }

    #[test]
    fn parse_collapses_repeated_slashes() {
        let p = Path::parse("//a///b").unwrap();
        assert_eq!(p.to_string(), "/a/b");
    }

    #[test]
    fn parse_rejects_missing_leading_slash() {
        assert!(Path::parse("a/b").is_err());
    }

    #[test]
    fn parse_rejects_colon() {
        assert!(Path::parse("/a:b").is_err());
    }

    #[test]
    fn append_and_parent_are_inverses() {
        let p = Path::parse("/a/b/c").unwrap();
        let parent = p.parent().unwrap();
        let last = p.last().unwrap().to_string();
        let rebuilt = parent.append(last).unwrap();
        assert_eq!(rebuilt, p);
        assert_eq!(rebuilt.parent().unwrap(), parent);
    }

    #[test]
    fn root_has_no_parent_or_last() {
        let root = Path::root();
        assert!(root.parent().is_err());
        assert!(root.last().is_err());
    }

    #[test]
    fn append_rejects_invalid_component() {
        assert!(Path::root().append("").is_err());
        assert!(Path::root().append("a/b").is_err());
        assert!(Path::root().append("a:b").is_err());
    }

    #[test]
    fn is_subpath_is_reflexive() {
        let p = Path::parse("/a/b").unwrap();
        assert!(p.is_subpath(&p));
    }

    #[test]
    fn is_subpath_true_for_ancestor() {
        let parent = Path::parse("/a").unwrap();
        let child = parent.append("b").unwrap();
        assert!(child.is_subpath(&parent));
        assert!(!parent.is_subpath(&child));
    }

    #[test]
    fn is_subpath_rejects_string_prefix_false_positive() {
        let foobar = Path::parse("/foobar").unwrap();
        let foo = Path::parse("/foo").unwrap();
        assert!(!foobar.is_subpath(&foo));
    }

    #[test]
    fn iter_yields_components_outermost_first() {
        let p = Path::parse("/a/b/c").unwrap();
        assert_eq!(p.iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn equal_paths_hash_equal() {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let p1 = Path::parse("/a/b").unwrap();
        let p2 = Path::parse("//a///b").unwrap();
        assert_eq!(p1, p2);

        let mut h1 = DefaultHasher::new();
        p1.hash(&mut h1);
        let mut h2 = DefaultHasher::new();
        p2.hash(&mut h2);
        assert_eq!(h1.finish(), h2.finish());
    }

    #[test]
    fn to_local_file_joins_components_under_root() {
        let p = Path::parse("/a/b").unwrap();
        let root = std::path::Path::new("/tmp/storage");
        assert_eq!(p.to_local_file(root), std::path::PathBuf::from("/tmp/storage/a/b"));
    }

    #[test]
    fn list_local_fails_for_missing_directory() {
        let dir = std::path::Path::new("/definitely/does/not/exist/rmifs-test");
        assert!(Path::list_local(dir).is_err());
    }

    #[test]
    fn list_local_enumerates_relative_file_paths() {
        let tmp = assert_fs::TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("a")).unwrap();
        std::fs::write(tmp.path().join("a/x"), b"hi").unwrap();
        std::fs::write(tmp.path().join("y"), b"hi").unwrap();

        let mut paths = Path::list_local(tmp.path())
            .unwrap()
            .into_iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>();
        paths.sort();

        assert_eq!(paths, vec!["/a/x".to_string(), "/y".to_string()]);
    }

    #[test]
    fn serde_round_trips_through_cbor() {
        let p = Path::parse("/a/b/c").unwrap();
        let bytes = serde_cbor::to_vec(&p).unwrap();
        let back: Path = serde_cbor::from_slice(&bytes).unwrap();
        assert_eq!(p, back);
    }
}
