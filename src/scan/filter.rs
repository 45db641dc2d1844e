//! Decides which directory entries count as primary media.

use std::path::Path;

use super::EntryKind;

// sidecars: artwork, subtitles, metadata, server databases
const AUXILIARY_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "bmp", "gif", "webp", "tbn",
    "srt", "ass", "ssa", "sub", "idx", "vtt", "sup",
    "nfo", "txt", "url", "xml", "ini", "log", "db", "dat", "info", "md",
    "metadata", "plex", "tmdb", "themoviedb", "tvdb", "thetvdb",
    "part", "tmp", "!qb", "aria2",
];

const MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "m4v", "ts", "m2ts", "webm", "mpg", "mpeg",
    "mp3", "flac", "m4a", "aac", "ogg", "opus", "wav", "alac", "ape",
];

// artwork names; a video called "cover.mkv" is still media
const ARTWORK_KEYWORDS: &[&str] = &[
    "poster", "cover", "fanart", "discart", "folder", "banner", "clearlogo", "thumb", "landscape",
];

const AUXILIARY_DIRS: &[&str] = &[
    ".actors", ".extras", ".sample", ".samples", "extras", "samples", "sample",
    "subtitles", "subs", "metadata", "posters", "thumbs", "covers", "@eadir", ".@__thumb",
];

/// Why an entry was left out of the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    Auxiliary,
    Other,
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub fn is_media(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| MEDIA_EXTENSIONS.contains(&ext.as_str()))
}

/// Sidecar files are excluded regardless of size.
pub fn is_auxiliary_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };

    // dot files: .DS_Store, ._resource forks, .plexmatch
    if name.starts_with('.') {
        return true;
    }

    if let Some(ext) = extension_of(path) {
        if AUXILIARY_EXTENSIONS.contains(&ext.as_str()) {
            return true;
        }
    }

    if is_media(path) {
        return false;
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
        .to_ascii_lowercase();
    ARTWORK_KEYWORDS.iter().any(|k| stem.contains(k))
}

pub fn is_auxiliary_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_ascii_lowercase())
        .is_some_and(|n| AUXILIARY_DIRS.contains(&n.as_str()))
}

pub fn classify(path: &Path, kind: EntryKind) -> Verdict {
    match kind {
        EntryKind::Dir if is_auxiliary_dir(path) => Verdict::Auxiliary,
        EntryKind::Dir => Verdict::Keep,
        EntryKind::File if is_auxiliary_file(path) => Verdict::Auxiliary,
        EntryKind::File => Verdict::Keep,
        EntryKind::Other => Verdict::Other,
    }
}
