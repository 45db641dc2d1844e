use std::path::{Path, PathBuf};

use super::{LibraryTarget, MatchKind, MatchResult, MediaType};
use crate::config::PathMapping;
use crate::paths::{compare_key, is_within_ignore_case, normalize_path};

const NAME_SEGMENT_BONUS: usize = 5;

/// Picks the library that should index a changed path.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    mappings: Vec<PathMapping>,
}

struct Candidate<'a> {
    target: &'a LibraryTarget,
    score: usize,
    kind: MatchKind,
    root: Option<&'a Path>,
}

impl Resolver {
    pub fn new(mut mappings: Vec<PathMapping>) -> Self {
        // most specific host prefix first
        mappings.sort_by_key(|m| std::cmp::Reverse(compare_key(&m.host).len()));
        Resolver { mappings }
    }

    /// Translate a scanner-side path into the media server's view of it.
    pub fn map_path(&self, path: &Path) -> PathBuf {
        let path = normalize_path(path);
        for mapping in &self.mappings {
            if !is_within_ignore_case(&path, &mapping.host) {
                continue;
            }
            let skip = normalize_path(&mapping.host).components().count();
            let mut mapped = normalize_path(&mapping.container);
            mapped.extend(path.components().skip(skip));
            return mapped;
        }
        path
    }

    pub fn resolve(&self, path: &Path, targets: &[LibraryTarget]) -> Option<MatchResult> {
        let path = self.map_path(path);
        let key = compare_key(&path);
        let inferred = MediaType::infer(&path);

        let mut containment = None;
        if inferred != MediaType::Unknown {
            containment = best_containment(&path, targets, |t| t.media_type == inferred);
        }
        if containment.is_none() {
            containment = best_containment(&path, targets, |_| true);
        }
        if containment.is_none() {
            containment = best_reverse(&path, &key, targets);
        }

        let chosen = match (containment, best_name(&path, &key, targets)) {
            (None, name) => name,
            (Some(c), Some(n)) if n.score > c.score => Some(n),
            (c, _) => c,
        }?;

        let relative_path = match (chosen.kind, chosen.root) {
            (MatchKind::Containment, Some(root)) => {
                let skip = normalize_path(root).components().count();
                path.components().skip(skip).collect()
            }
            _ => PathBuf::new(),
        };

        tracing::debug!(
            path = %path.display(),
            library = %chosen.target.name,
            id = %chosen.target.id,
            score = chosen.score,
            kind = ?chosen.kind,
            "library resolved"
        );

        Some(MatchResult {
            target: chosen.target.clone(),
            score: chosen.score,
            kind: chosen.kind,
            root: chosen.root.map(normalize_path),
            relative_path,
        })
    }
}

/// Ties keep the first candidate seen, so only a strictly higher score replaces.
fn keep_best<'a>(best: &mut Option<Candidate<'a>>, candidate: Candidate<'a>) {
    if best.as_ref().map_or(true, |b| candidate.score > b.score) {
        *best = Some(candidate);
    }
}

fn best_containment<'a, F>(path: &Path, targets: &'a [LibraryTarget], accept: F) -> Option<Candidate<'a>>
where
    F: Fn(&LibraryTarget) -> bool,
{
    let mut best = None;
    for target in targets.iter().filter(|t| accept(t)) {
        for root in &target.root_paths {
            if is_within_ignore_case(path, root) {
                keep_best(
                    &mut best,
                    Candidate {
                        target,
                        score: compare_key(root).chars().count(),
                        kind: MatchKind::Containment,
                        root: Some(root.as_path()),
                    },
                );
            }
        }
    }
    best
}

fn best_reverse<'a>(path: &Path, key: &str, targets: &'a [LibraryTarget]) -> Option<Candidate<'a>> {
    let mut best = None;
    for target in targets {
        if target.root_paths.iter().any(|root| is_within_ignore_case(root, path)) {
            keep_best(
                &mut best,
                Candidate {
                    target,
                    score: key.chars().count(),
                    kind: MatchKind::Reverse,
                    root: None,
                },
            );
        }
    }
    best
}

fn best_name<'a>(path: &Path, key: &str, targets: &'a [LibraryTarget]) -> Option<Candidate<'a>> {
    let last = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let mut best = None;
    for target in targets {
        let name = target.name.trim().to_lowercase();
        if name.is_empty() || !key.contains(&name) {
            continue;
        }
        let mut score = name.chars().count() * 2;
        if last == name {
            score += NAME_SEGMENT_BONUS;
        }
        keep_best(
            &mut best,
            Candidate {
                target,
                score,
                kind: MatchKind::Name,
                root: None,
            },
        );
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: &str, name: &str, media_type: MediaType, roots: &[&str]) -> LibraryTarget {
        LibraryTarget {
            id: id.to_string(),
            name: name.to_string(),
            media_type,
            root_paths: roots.iter().map(PathBuf::from).collect(),
        }
    }

    #[test]
    fn deepest_root_wins() {
        let targets = vec![
            target("1", "All", MediaType::Unknown, &["/mnt/media"]),
            target("2", "Films", MediaType::Movie, &["/mnt/media/Movies"]),
        ];
        let hit = Resolver::default()
            .resolve(Path::new("/mnt/media/Movies/Alien (1979)"), &targets)
            .unwrap();
        assert_eq!(hit.target.id, "2");
        assert_eq!(hit.kind, MatchKind::Containment);
        assert_eq!(hit.relative_path, PathBuf::from("Alien (1979)"));
        assert_eq!(hit.score, "/mnt/media/movies".len());
    }

    #[test]
    fn deeper_root_wins_regardless_of_order() {
        let targets = vec![
            target("2", "Films", MediaType::Unknown, &["/mnt/media/Movies"]),
            target("1", "All", MediaType::Unknown, &["/mnt/media"]),
        ];
        let hit = Resolver::default()
            .resolve(Path::new("/mnt/media/Movies/x"), &targets)
            .unwrap();
        assert_eq!(hit.target.id, "2");
    }

    #[test]
    fn matching_is_case_insensitive() {
        let targets = vec![target("1", "Shows", MediaType::Show, &["/MNT/Media/TV"])];
        let hit = Resolver::default()
            .resolve(Path::new("/mnt/media/tv/Show/S01"), &targets)
            .unwrap();
        assert_eq!(hit.target.id, "1");
        assert_eq!(hit.relative_path, PathBuf::from("Show/S01"));
    }

    #[test]
    fn type_match_beats_deeper_mistyped_root() {
        let targets = vec![
            target("1", "Everything", MediaType::Movie, &["/m"]),
            target("2", "Series", MediaType::Show, &["/m/downloads"]),
        ];
        let hit = Resolver::default()
            .resolve(Path::new("/m/downloads/movies/Alien"), &targets)
            .unwrap();
        assert_eq!(hit.target.id, "1");
    }

    #[test]
    fn falls_back_to_any_type_when_no_typed_root_contains() {
        let targets = vec![
            target("1", "Kids", MediaType::Show, &["/m/kids"]),
            target("2", "Everything", MediaType::Unknown, &["/m/mixed"]),
        ];
        let hit = Resolver::default()
            .resolve(Path::new("/m/mixed/movies/Alien"), &targets)
            .unwrap();
        assert_eq!(hit.target.id, "2");
    }

    #[test]
    fn umbrella_path_matches_nested_root() {
        let targets = vec![target("1", "Films", MediaType::Movie, &["/mnt/media/Movies"])];
        let hit = Resolver::default().resolve(Path::new("/mnt/media"), &targets).unwrap();
        assert_eq!(hit.kind, MatchKind::Reverse);
        assert_eq!(hit.score, "/mnt/media".len());
        assert!(hit.relative_path.as_os_str().is_empty());
    }

    #[test]
    fn name_fallback_with_segment_bonus() {
        let targets = vec![
            target("1", "Anime", MediaType::Show, &["/elsewhere"]),
            target("2", "Docs", MediaType::Movie, &["/other"]),
        ];
        let hit = Resolver::default()
            .resolve(Path::new("/data/stuff/anime"), &targets)
            .unwrap();
        assert_eq!(hit.target.id, "1");
        assert_eq!(hit.kind, MatchKind::Name);
        assert_eq!(hit.score, 2 * 5 + 5);
    }

    #[test]
    fn name_overrides_only_when_strictly_higher() {
        // containment "/m" scores 2; the name "Documentaries" scores 26
        let targets = vec![
            target("1", "Root", MediaType::Unknown, &["/m"]),
            target("2", "Documentaries", MediaType::Unknown, &["/nowhere"]),
        ];
        let hit = Resolver::default()
            .resolve(Path::new("/m/documentaries/x"), &targets)
            .unwrap();
        assert_eq!(hit.target.id, "2");

        // a long root outscores a short name
        let targets = vec![
            target("1", "Root", MediaType::Unknown, &["/mnt/storage/library"]),
            target("2", "TV", MediaType::Unknown, &["/nowhere"]),
        ];
        let hit = Resolver::default()
            .resolve(Path::new("/mnt/storage/library/tv"), &targets)
            .unwrap();
        assert_eq!(hit.target.id, "1");
    }

    #[test]
    fn ties_keep_first_found() {
        let targets = vec![
            target("1", "A", MediaType::Unknown, &["/m/x"]),
            target("2", "B", MediaType::Unknown, &["/m/x"]),
        ];
        let hit = Resolver::default().resolve(Path::new("/m/x/y"), &targets).unwrap();
        assert_eq!(hit.target.id, "1");
    }

    #[test]
    fn no_match_is_none() {
        let targets = vec![target("1", "Films", MediaType::Movie, &["/mnt/media/Movies"])];
        assert!(Resolver::default().resolve(Path::new("/srv/other"), &targets).is_none());
        assert!(Resolver::default().resolve(Path::new("/srv/other"), &[]).is_none());
    }

    #[test]
    fn host_paths_are_mapped_before_matching() {
        let resolver = Resolver::new(vec![PathMapping {
            host: PathBuf::from("/volume1/media"),
            container: PathBuf::from("/data"),
        }]);
        assert_eq!(
            resolver.map_path(Path::new("/volume1/media/Movies/A")),
            PathBuf::from("/data/Movies/A")
        );
        assert_eq!(resolver.map_path(Path::new("/volume1/mediax")), PathBuf::from("/volume1/mediax"));

        let targets = vec![target("9", "Films", MediaType::Movie, &["/data/Movies"])];
        let hit = resolver
            .resolve(Path::new("/volume1/media/Movies/A"), &targets)
            .unwrap();
        assert_eq!(hit.target.id, "9");
        assert_eq!(hit.relative_path, PathBuf::from("A"));
    }
}
