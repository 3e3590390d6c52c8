//! Host path to workspace path translation.

use std::collections::HashMap;
use std::sync::Mutex;

/// Leading components with no meaning inside the workspace. Dropped from
/// absolute host paths that resolve nowhere else. A leading `home` is
/// stripped too, unless `daytona` appears elsewhere in the path.
const SYSTEM_ROOTS: &[&str] = &["Users", "usr", "var", "Library", "System", "Applications"];

/// Host paths containing this segment are treated as already-remote and
/// returned unchanged. Substring containment, not an exact prefix: callers
/// that speak remote paths sometimes hand back strings they got from us.
const REMOTE_HOME_SEGMENT: &str = "/home/daytona";

/// Translates host-shaped paths into workspace paths, with a monotonic
/// cache. Deterministic: racing writers on the same key converge on the
/// same value, so last-writer-wins is safe.
pub struct PathMapper {
    root_dir: String,
    host_home: Option<String>,
    cache: Mutex<HashMap<String, String>>,
}

impl PathMapper {
    pub fn new(root_dir: impl Into<String>) -> Self {
        let host_home = dirs::home_dir().map(|home| home.to_string_lossy().into_owned());
        Self::with_host_home(root_dir, host_home)
    }

    pub fn with_host_home(root_dir: impl Into<String>, host_home: Option<String>) -> Self {
        Self {
            root_dir: root_dir.into(),
            host_home,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn root_dir(&self) -> &str {
        &self.root_dir
    }

    /// Map a host path to a workspace path.
    ///
    /// Simple filenames root directly under the workspace root; paths under
    /// the host home keep their home-relative tail; other absolute paths
    /// lose their host-system prefix. The result is cached by exact input.
    pub fn map(&self, host: &str) -> String {
        if let Some(hit) = self
            .cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(host)
        {
            return hit.clone();
        }
        let mapped = self.translate(host);
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(host.to_string(), mapped.clone());
        mapped
    }

    fn translate(&self, host: &str) -> String {
        let is_absolute = host.starts_with('/');
        let has_separator = host.contains('/') || host.contains('\\');

        if !is_absolute && !has_separator {
            return self.join(host);
        }

        if is_absolute {
            if let Some(home) = &self.host_home {
                if host == home {
                    return self.root_dir.clone();
                }
                if let Some(rel) = host.strip_prefix(home.as_str()) {
                    if let Some(tail) = rel.strip_prefix('/') {
                        return self.join(tail);
                    }
                }
            }
            if host.contains(REMOTE_HOME_SEGMENT) {
                return host.to_string();
            }
            let mut components: Vec<&str> = host.split('/').filter(|c| !c.is_empty()).collect();
            let keep_home = host.contains("daytona");
            while let Some(first) = components.first() {
                let strip = if *first == "home" {
                    !keep_home
                } else {
                    SYSTEM_ROOTS.contains(first)
                };
                if !strip {
                    break;
                }
                components.remove(0);
            }
            if components.is_empty() {
                return self.root_dir.clone();
            }
            return self.join(&components.join("/"));
        }

        // Relative path with a separator: root it as-is.
        self.join(host.trim_start_matches("./"))
    }

    fn join(&self, tail: &str) -> String {
        format!("{}/{}", self.root_dir.trim_end_matches('/'), tail)
    }
}

/// Directory portion of a workspace path, if it has one.
pub(crate) fn parent_dir(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    let idx = trimmed.rfind('/')?;
    if idx == 0 {
        return Some("/".to_string());
    }
    Some(trimmed[..idx].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ROOT: &str = "/home/daytona";

    fn mapper() -> PathMapper {
        PathMapper::with_host_home(ROOT, Some("/Users/alice".to_string()))
    }

    #[test]
    fn test_simple_filename_roots_directly() {
        let mapper = mapper();
        assert_eq!(mapper.map("notes.txt"), "/home/daytona/notes.txt");
        assert_eq!(mapper.map("app.py"), "/home/daytona/app.py");
    }

    #[test]
    fn test_host_home_prefix_keeps_relative_tail() {
        let mapper = mapper();
        assert_eq!(
            mapper.map("/Users/alice/project/a.py"),
            "/home/daytona/project/a.py"
        );
        assert_eq!(mapper.map("/Users/alice"), "/home/daytona");
    }

    #[test]
    fn test_home_prefix_requires_component_boundary() {
        let mapper = mapper();
        // /Users/alicex is a different user, not a path under /Users/alice.
        assert_eq!(mapper.map("/Users/alicex/f"), "/home/daytona/alicex/f");
    }

    #[test]
    fn test_remote_home_passes_through() {
        let mapper = mapper();
        assert_eq!(mapper.map("/home/daytona/x/y.txt"), "/home/daytona/x/y.txt");
        assert_eq!(mapper.map("/tmp/home/daytona/z"), "/tmp/home/daytona/z");
    }

    #[test]
    fn test_system_prefixes_are_stripped() {
        let mapper = mapper();
        assert_eq!(mapper.map("/Users/bob/f.txt"), "/home/daytona/bob/f.txt");
        assert_eq!(mapper.map("/usr/local/bin/tool"), "/home/daytona/local/bin/tool");
        assert_eq!(mapper.map("/home/carol/f"), "/home/daytona/carol/f");
        assert_eq!(mapper.map("/opt/thing"), "/home/daytona/opt/thing");
    }

    #[test]
    fn test_home_kept_when_daytona_appears_elsewhere() {
        let mapper = mapper();
        // Not the literal /home/daytona segment, so no pass-through, but
        // `daytona` elsewhere in the path keeps the leading `home`.
        assert_eq!(
            mapper.map("/home/alice/daytona-project/f"),
            "/home/daytona/home/alice/daytona-project/f"
        );
    }

    #[test]
    fn test_relative_path_with_separator_roots_verbatim() {
        let mapper = mapper();
        assert_eq!(mapper.map("sub/dir/f.txt"), "/home/daytona/sub/dir/f.txt");
        assert_eq!(mapper.map("./sub/f.txt"), "/home/daytona/sub/f.txt");
    }

    #[test]
    fn test_mapping_is_stable() {
        let mapper = mapper();
        let first = mapper.map("/Users/alice/project/a.py");
        let second = mapper.map("/Users/alice/project/a.py");
        assert_eq!(first, second);
        assert_eq!(mapper.map("plain.txt"), mapper.map("plain.txt"));
    }

    #[test]
    fn test_no_host_home_falls_back_to_strip() {
        let mapper = PathMapper::with_host_home(ROOT, None);
        assert_eq!(mapper.map("/Users/alice/f"), "/home/daytona/alice/f");
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir("/home/daytona/a/b.txt").as_deref(), Some("/home/daytona/a"));
        assert_eq!(parent_dir("/top.txt").as_deref(), Some("/"));
        assert_eq!(parent_dir("bare"), None);
    }
}
