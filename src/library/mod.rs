//! Media server libraries and matching changed paths to them.

pub mod resolver;

use std::path::{Path, PathBuf};

use serde::Serialize;

pub use crate::service::LibraryProvider;
pub use resolver::Resolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Show,
    Music,
    Unknown,
}

impl MediaType {
    /// Plex section types: `movie`, `show`, `artist`.
    pub fn from_section_type(kind: &str) -> MediaType {
        match kind.trim().to_ascii_lowercase().as_str() {
            "movie" => MediaType::Movie,
            "show" => MediaType::Show,
            "artist" | "music" => MediaType::Music,
            _ => MediaType::Unknown,
        }
    }

    /// Guess the media type from keyword segments in `path`.
    pub fn infer(path: &Path) -> MediaType {
        for segment in path.iter().rev() {
            let segment = segment.to_string_lossy().to_lowercase();
            let kind = match segment.as_str() {
                "movie" | "movies" | "film" | "films" | "电影" => MediaType::Movie,
                "show" | "shows" | "tv" | "series" | "电视剧" => MediaType::Show,
                "music" | "音乐" => MediaType::Music,
                _ => continue,
            };
            return kind;
        }
        MediaType::Unknown
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Show => "show",
            MediaType::Music => "music",
            MediaType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A library section as the media server reports it. Rebuilt every cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryTarget {
    pub id: String,
    pub name: String,
    pub media_type: MediaType,
    pub root_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// path sits under a library root
    Containment,
    /// a library root sits under the path
    Reverse,
    /// library name appears in the path
    Name,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub target: LibraryTarget,
    pub score: usize,
    pub kind: MatchKind,
    /// the library root that matched, for containment matches
    pub root: Option<PathBuf>,
    pub relative_path: PathBuf,
}
