//! Path normalization shared by the scanner, stores, resolver and dispatcher.

use std::path::{Component, Path, PathBuf};

/// Lexically normalize a path:
/// - strip quotes;
/// - unify separators to `/`;
/// - drop `.` and empty components;
/// - resolve `..` (never above the root);
/// - drop the trailing separator.
///
/// Never touches the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    let trimmed = raw.trim().trim_matches(|c| c == '"' || c == '\'');
    let unified = trimmed.replace('\\', "/");

    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in Path::new(&unified).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return PathBuf::from(".");
    }
    parts.iter().map(|c| c.as_os_str()).collect()
}

/// Case-folded, `/`-separated key for comparisons across mounts that do
/// not preserve case.
pub fn compare_key(path: &Path) -> String {
    normalize_path(path).to_string_lossy().to_lowercase()
}

/// True if `candidate` is `base` or nested under it, ignoring case.
pub fn is_within_ignore_case(candidate: &Path, base: &Path) -> bool {
    let candidate = compare_key(candidate);
    let base = compare_key(base);
    if candidate == base {
        return true;
    }
    if base == "/" {
        return candidate.starts_with('/');
    }
    candidate
        .strip_prefix(&base)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// A path is excluded when it equals or sits under an exclude entry.
/// Matching is component-wise: `/a/b` excludes `/a/b/c` but not `/a/bc`.
pub fn is_excluded(path: &Path, excludes: &[PathBuf]) -> bool {
    excludes.iter().any(|exclude| path.starts_with(exclude))
}

/// Number of normal components, `/a/b/c` has depth 3.
pub fn depth(path: &Path) -> usize {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count()
}

/// Prefix of `path` keeping at most `depth` normal components.
pub fn truncate_to_depth(path: &Path, depth: usize) -> PathBuf {
    let mut out = PathBuf::new();
    let mut kept = 0;
    for component in path.components() {
        if let Component::Normal(_) = component {
            if kept == depth {
                break;
            }
            kept += 1;
        }
        out.push(component.as_os_str());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_cleans_lexically() {
        assert_eq!(normalize_path(Path::new("/mnt//media/./tv/")), PathBuf::from("/mnt/media/tv"));
        assert_eq!(normalize_path(Path::new("\"/mnt/media\"")), PathBuf::from("/mnt/media"));
        assert_eq!(normalize_path(Path::new("/mnt/media/../tv")), PathBuf::from("/mnt/tv"));
        assert_eq!(normalize_path(Path::new("/../x")), PathBuf::from("/x"));
        assert_eq!(normalize_path(Path::new("/")), PathBuf::from("/"));
        assert_eq!(normalize_path(Path::new("a\\b\\c")), PathBuf::from("a/b/c"));
        assert_eq!(normalize_path(Path::new("../a")), PathBuf::from("../a"));
    }

    #[test]
    fn within_ignores_case_and_respects_components() {
        assert!(is_within_ignore_case(Path::new("/Media/Movies/Foo"), Path::new("/media/movies")));
        assert!(is_within_ignore_case(Path::new("/media/movies"), Path::new("/media/movies/")));
        assert!(!is_within_ignore_case(Path::new("/media/movies2"), Path::new("/media/movies")));
        assert!(is_within_ignore_case(Path::new("/anything"), Path::new("/")));
    }

    #[test]
    fn exclusion_is_prefix_with_separator() {
        let excludes = vec![PathBuf::from("/mnt/media/tmp")];
        assert!(is_excluded(Path::new("/mnt/media/tmp"), &excludes));
        assert!(is_excluded(Path::new("/mnt/media/tmp/a.mkv"), &excludes));
        assert!(!is_excluded(Path::new("/mnt/media/tmpfiles/a.mkv"), &excludes));
    }

    #[test]
    fn depth_and_truncation() {
        let path = Path::new("/a/b/c/d");
        assert_eq!(depth(path), 4);
        assert_eq!(truncate_to_depth(path, 2), PathBuf::from("/a/b"));
        assert_eq!(truncate_to_depth(path, 10), PathBuf::from("/a/b/c/d"));
    }
}
