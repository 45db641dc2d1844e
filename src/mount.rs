//! Mount kind detection and per-kind I/O policy.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    Local,
    Smb,
    #[serde(alias = "dav")]
    WebDav,
    Nfs,
    Unknown,
}

impl MountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MountKind::Local => "local",
            MountKind::Smb => "smb",
            MountKind::WebDav => "webdav",
            MountKind::Nfs => "nfs",
            MountKind::Unknown => "unknown",
        }
    }

    /// map a filesystem type from the mount table. `source` and `mount_point`
    /// matter because webdav is usually a fuse mount with a telling name.
    pub fn from_fs_type(fs_type: &str, source: &str, mount_point: &str) -> MountKind {
        let fs = fs_type.to_ascii_lowercase();
        match fs.as_str() {
            "nfs" | "nfs4" => return MountKind::Nfs,
            "cifs" | "smb" | "smb2" | "smb3" | "smbfs" => return MountKind::Smb,
            _ => {}
        }

        if source.to_ascii_lowercase().contains("webdav")
            || mount_point.to_ascii_lowercase().contains("webdav")
        {
            return MountKind::WebDav;
        }

        match fs.as_str() {
            "fuse" | "fuse.webdav" | "davfs" | "fuse.rclone" => MountKind::WebDav,
            "ext2" | "ext3" | "ext4" | "xfs" | "btrfs" | "zfs" | "apfs" | "hfs" | "tmpfs"
            | "overlay" | "ntfs" | "ntfs3" => MountKind::Local,
            _ => MountKind::Unknown,
        }
    }
}

impl std::fmt::Display for MountKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How strictly permission errors are treated while scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionCheck {
    /// permission errors are logged at warn and the path skipped
    Strict,
    /// fuse mounts report spurious EACCES, logged at debug only
    Relaxed,
}

/// Timeout, retry and concurrency defaults for one kind of mount.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MountPolicy {
    pub kind: MountKind,
    pub retries: u32,
    pub retry_delay: Duration,
    pub io_timeout: Duration,
    pub permission: PermissionCheck,
    /// candidate file count above which metadata lookups go parallel
    pub parallel_threshold: usize,
    /// workers added per grow step
    pub grow_step: usize,
    /// throughput (files/s) considered healthy / degraded
    pub healthy_throughput: f64,
    pub degraded_throughput: f64,
    pub keepalive: Option<Duration>,
}

impl MountPolicy {
    pub fn for_kind(kind: MountKind) -> Self {
        let local = MountPolicy {
            kind,
            retries: 1,
            retry_delay: Duration::from_secs(1),
            io_timeout: Duration::from_secs(10),
            permission: PermissionCheck::Strict,
            parallel_threshold: 1000,
            grow_step: 1,
            healthy_throughput: 20.0,
            degraded_throughput: 5.0,
            keepalive: None,
        };

        match kind {
            MountKind::Local => local,
            MountKind::WebDav => MountPolicy {
                retries: 5,
                retry_delay: Duration::from_secs(10),
                io_timeout: Duration::from_secs(30),
                permission: PermissionCheck::Relaxed,
                parallel_threshold: 200,
                grow_step: 4,
                healthy_throughput: 5.0,
                degraded_throughput: 1.5,
                keepalive: Some(Duration::from_secs(8)),
                ..local
            },
            MountKind::Smb => MountPolicy {
                retries: 5,
                retry_delay: Duration::from_secs(10),
                io_timeout: Duration::from_secs(30),
                grow_step: 2,
                keepalive: Some(Duration::from_secs(15)),
                ..local
            },
            MountKind::Nfs => MountPolicy {
                retries: 3,
                retry_delay: Duration::from_secs(5),
                io_timeout: Duration::from_secs(20),
                grow_step: 2,
                ..local
            },
            MountKind::Unknown => MountPolicy {
                retries: 3,
                retry_delay: Duration::from_secs(5),
                io_timeout: Duration::from_secs(20),
                permission: PermissionCheck::Relaxed,
                ..local
            },
        }
    }

    pub fn is_slow_protocol(&self) -> bool {
        matches!(self.kind, MountKind::WebDav)
    }
}

/// One line of the mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub source: String,
    pub mount_point: PathBuf,
    pub fs_type: String,
}

/// Parse `/proc/mounts` style text. Malformed lines are skipped.
pub fn parse_mount_table(text: &str) -> Vec<MountEntry> {
    text.lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let source = parts.next()?;
            let mount_point = parts.next()?;
            let fs_type = parts.next()?;
            Some(MountEntry {
                source: unescape_octal(source),
                mount_point: PathBuf::from(unescape_octal(mount_point)),
                fs_type: fs_type.to_string(),
            })
        })
        .collect()
}

// the kernel escapes space, tab, newline and backslash as \ooo
fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let value = digits.iter().fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
                if let Ok(value) = u8::try_from(value) {
                    out.push(value);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Classifies paths by the mount they live on.
#[derive(Debug, Clone, Default)]
pub struct MountClassifier {
    overrides: Vec<(PathBuf, MountKind)>,
    table: Vec<MountEntry>,
}

impl MountClassifier {
    pub fn new(overrides: Vec<(PathBuf, MountKind)>, table: Vec<MountEntry>) -> Self {
        MountClassifier { overrides, table }
    }

    /// Build from the running system's mount table. Platforms without
    /// `/proc/mounts` fall back to overrides and path heuristics.
    pub fn from_system(overrides: Vec<(PathBuf, MountKind)>) -> Self {
        let table = match std::fs::read_to_string("/proc/mounts") {
            Ok(text) => parse_mount_table(&text),
            Err(e) => {
                tracing::debug!(error = %e, "mount table unavailable, using path heuristics");
                Vec::new()
            }
        };
        MountClassifier::new(overrides, table)
    }

    pub fn classify(&self, path: &Path) -> MountKind {
        // configured overrides win, longest prefix first
        if let Some((_, kind)) = self
            .overrides
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix))
            .max_by_key(|(prefix, _)| prefix.as_os_str().len())
        {
            return *kind;
        }

        if let Some(entry) = self
            .table
            .iter()
            .filter(|e| path.starts_with(&e.mount_point))
            .max_by_key(|e| e.mount_point.as_os_str().len())
        {
            let kind = MountKind::from_fs_type(
                &entry.fs_type,
                &entry.source,
                &entry.mount_point.to_string_lossy(),
            );
            // a root "/" on ext4 says nothing useful about /mnt/smb style paths
            if kind != MountKind::Local || entry.mount_point != Path::new("/") {
                return kind;
            }
        }

        classify_by_pattern(path)
    }

    pub fn policy(&self, path: &Path) -> MountPolicy {
        MountPolicy::for_kind(self.classify(path))
    }
}

/// Guess from the path alone.
pub fn classify_by_pattern(path: &Path) -> MountKind {
    const SMB_PREFIXES: &[&str] = &["/mnt/smb", "/media/smb"];
    const NFS_PREFIXES: &[&str] = &["/mnt/nfs", "/media/nfs"];

    if SMB_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return MountKind::Smb;
    }
    if NFS_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return MountKind::Nfs;
    }

    let lower = path.to_string_lossy().to_lowercase();
    if lower.contains("webdav") {
        MountKind::WebDav
    } else if lower.contains("nfs") {
        MountKind::Nfs
    } else if lower.contains("smb") || lower.contains("cifs") {
        MountKind::Smb
    } else {
        MountKind::Local
    }
}
