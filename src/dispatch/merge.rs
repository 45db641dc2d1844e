//! Collapse changed files into as few refresh directories as possible and
//! split them into batches.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::paths::{depth, truncate_to_depth};

/// One refresh call: a directory and the changed files it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryGroup {
    pub dir: PathBuf,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy)]
pub struct MergeOptions {
    pub enabled: bool,
    pub max_depth: usize,
}

/// Group `(dir, file)` pairs by directory and, when enabled, merge them:
/// - directories deeper than `max_depth` move up to that depth, but never
///   above the deepest library root containing them;
/// - directories under an already selected ancestor fold into it.
///
/// Output is sorted by directory.
pub fn plan<I>(entries: I, roots: &[PathBuf], options: MergeOptions) -> Vec<DirectoryGroup>
where
    I: IntoIterator<Item = (PathBuf, PathBuf)>,
{
    let mut by_dir: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
    for (dir, file) in entries {
        let dir = if options.enabled {
            cap_depth(&dir, roots, options.max_depth)
        } else {
            dir
        };
        by_dir.entry(dir).or_default().push(file);
    }

    if !options.enabled {
        return finish(by_dir);
    }

    let mut shallow_first: Vec<(PathBuf, Vec<PathBuf>)> = by_dir.into_iter().collect();
    shallow_first.sort_by(|(a, _), (b, _)| depth(a).cmp(&depth(b)).then_with(|| a.cmp(b)));

    let mut selected: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
    for (dir, files) in shallow_first {
        let ancestor = selected
            .keys()
            .find(|existing| dir != **existing && dir.starts_with(existing))
            .cloned();
        match ancestor {
            Some(ancestor) => {
                tracing::trace!(dir = %dir.display(), into = %ancestor.display(), "directory merged");
                selected.entry(ancestor).or_default().extend(files);
            }
            None => {
                selected.insert(dir, files);
            }
        }
    }

    finish(selected)
}

fn cap_depth(dir: &Path, roots: &[PathBuf], max_depth: usize) -> PathBuf {
    if depth(dir) <= max_depth {
        return dir.to_path_buf();
    }
    let floor = roots
        .iter()
        .filter(|root| dir.starts_with(root))
        .map(|root| depth(root))
        .max()
        .unwrap_or(0);
    truncate_to_depth(dir, max_depth.max(floor))
}

fn finish(groups: BTreeMap<PathBuf, Vec<PathBuf>>) -> Vec<DirectoryGroup> {
    groups
        .into_iter()
        .map(|(dir, mut files)| {
            files.sort();
            files.dedup();
            DirectoryGroup { dir, files }
        })
        .collect()
}

/// Fill batches in order until adding the next directory would exceed
/// `batch_size` files. A directory is never split across batches.
pub fn batches(groups: Vec<DirectoryGroup>, batch_size: usize) -> Vec<Vec<DirectoryGroup>> {
    let batch_size = batch_size.max(1);
    let mut out = Vec::new();
    let mut current: Vec<DirectoryGroup> = Vec::new();
    let mut count = 0;

    for group in groups {
        if !current.is_empty() && count + group.files.len() > batch_size {
            out.push(std::mem::take(&mut current));
            count = 0;
        }
        count += group.files.len();
        current.push(group);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(file: &str) -> (PathBuf, PathBuf) {
        let file = PathBuf::from(file);
        (file.parent().unwrap().to_path_buf(), file)
    }

    fn on() -> MergeOptions {
        MergeOptions {
            enabled: true,
            max_depth: 5,
        }
    }

    #[test]
    fn files_in_one_directory_make_one_group() {
        let groups = plan(
            [pair("/m/Movies/A/a.mkv"), pair("/m/Movies/A/a2.mkv")],
            &[],
            on(),
        );
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].dir, PathBuf::from("/m/Movies/A"));
        assert_eq!(groups[0].files.len(), 2);
    }

    #[test]
    fn deep_directories_collapse_to_max_depth() {
        let groups = plan(
            [
                pair("/m/tv/Show/Season 1/extras/x/e1.mkv"),
                pair("/m/tv/Show/Season 1/extras/y/e2.mkv"),
            ],
            &[],
            on(),
        );
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].dir, PathBuf::from("/m/tv/Show/Season 1/extras"));
        assert_eq!(groups[0].files.len(), 2);
    }

    #[test]
    fn collapse_never_goes_above_library_root() {
        let roots = vec![PathBuf::from("/vol/dav/media/library/tv/anime")];
        let groups = plan(
            [pair("/vol/dav/media/library/tv/anime/Title/S01/e1.mkv")],
            &roots,
            MergeOptions {
                enabled: true,
                max_depth: 3,
            },
        );
        assert_eq!(groups[0].dir, PathBuf::from("/vol/dav/media/library/tv/anime"));
    }

    #[test]
    fn child_folds_into_selected_ancestor() {
        let groups = plan(
            [pair("/m/tv/Show/s.mkv"), pair("/m/tv/Show/Season 1/e1.mkv")],
            &[],
            on(),
        );
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].dir, PathBuf::from("/m/tv/Show"));
        assert_eq!(groups[0].files.len(), 2);
    }

    #[test]
    fn sibling_prefix_is_not_an_ancestor() {
        let groups = plan([pair("/m/tv/Show/a.mkv"), pair("/m/tv/Show 2/b.mkv")], &[], on());
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn merging_disabled_keeps_parents() {
        let groups = plan(
            [pair("/m/tv/Show/s.mkv"), pair("/m/tv/Show/Season 1/e1.mkv")],
            &[],
            MergeOptions {
                enabled: false,
                max_depth: 1,
            },
        );
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn batches_respect_file_budget_without_splitting_directories() {
        let group = |dir: &str, n: usize| DirectoryGroup {
            dir: PathBuf::from(dir),
            files: (0..n).map(|i| PathBuf::from(format!("{dir}/{i}.mkv"))).collect(),
        };
        let out = batches(vec![group("/a", 4), group("/b", 4), group("/c", 4), group("/d", 12)], 10);
        let sizes: Vec<usize> = out.iter().map(|b| b.iter().map(|g| g.files.len()).sum()).collect();
        assert_eq!(sizes, vec![8, 4, 12]);
    }
}
