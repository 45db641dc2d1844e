use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mediawatch::config::ScanConfig;
use mediawatch::mount::{MountKind, MountPolicy};
use mediawatch::scan::{ScanOptions, Scanner};
use mediawatch::shutdown::Shutdown;
use mediawatch::store::SnapshotStore;
use std::fs::{self, File};
use std::path::Path;
use tempfile::TempDir;

const MB: u64 = 1024 * 1024;

/// Fixture generator for media library layouts. Files are sparse so large
/// sizes cost no disk.
mod fixtures {
    use super::*;

    fn sparse(path: &Path, size: u64) -> std::io::Result<()> {
        File::create(path)?.set_len(size)
    }

    /// Movies/<Title (Year)>/<Title>.mkv plus artwork and subtitles
    pub fn create_movie_library(base: &Path, movies: usize) -> std::io::Result<()> {
        for i in 0..movies {
            let dir = base.join(format!("Movie {i} ({})", 1950 + i % 70));
            fs::create_dir_all(&dir)?;
            sparse(&dir.join(format!("Movie {i}.mkv")), 800 * MB)?;
            sparse(&dir.join("poster.jpg"), 200 * 1024)?;
            sparse(&dir.join(format!("Movie {i}.en.srt")), 60 * 1024)?;
            fs::write(dir.join("movie.nfo"), "<movie/>")?;
        }
        Ok(())
    }

    /// Shows/<Show>/Season NN/<Show> SxxEyy.mkv
    pub fn create_show_library(base: &Path, shows: usize, seasons: usize, episodes: usize) -> std::io::Result<()> {
        for s in 0..shows {
            for season in 1..=seasons {
                let dir = base.join(format!("Show {s}")).join(format!("Season {season:02}"));
                fs::create_dir_all(&dir)?;
                for e in 1..=episodes {
                    sparse(&dir.join(format!("Show {s} S{season:02}E{e:02}.mkv")), 350 * MB)?;
                }
                sparse(&dir.join("season.jpg"), 100 * 1024)?;
            }
        }
        Ok(())
    }
}

fn options() -> ScanOptions {
    ScanOptions::from_config(&ScanConfig::default(), MountPolicy::for_kind(MountKind::Local))
}

/// Benchmark: small library, inline metadata lookups
fn bench_small_library(c: &mut Criterion) {
    c.bench_function("scan_small_movie_library", |b| {
        let temp_dir = TempDir::new().unwrap();
        fixtures::create_movie_library(temp_dir.path(), 20).unwrap();
        let scanner = Scanner::local(Shutdown::new());
        let options = options();

        b.iter(|| {
            let report = scanner.scan(black_box(temp_dir.path()), &options).unwrap();
            black_box(report);
        });
    });
}

/// Benchmark: show libraries of growing size, crossing the parallel threshold
fn bench_show_library(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan_show_library");

    for shows in [5, 20, 60] {
        group.bench_with_input(BenchmarkId::new("shows", shows), &shows, |b, &shows| {
            let temp_dir = TempDir::new().unwrap();
            fixtures::create_show_library(temp_dir.path(), shows, 4, 10).unwrap();
            let scanner = Scanner::local(Shutdown::new());
            let options = options();

            b.iter(|| {
                let report = scanner.scan(black_box(temp_dir.path()), &options).unwrap();
                black_box(report);
            });
        });
    }

    group.finish();
}

/// Benchmark: diff of two consecutive scans with a handful of new episodes
fn bench_diff(c: &mut Criterion) {
    c.bench_function("diff_with_new_episodes", |b| {
        let temp_dir = TempDir::new().unwrap();
        fixtures::create_show_library(temp_dir.path(), 30, 4, 10).unwrap();
        let scanner = Scanner::local(Shutdown::new());
        let options = options();
        let before = scanner.scan(temp_dir.path(), &options).unwrap().snapshot;

        fixtures::create_show_library(&temp_dir.path().join("New"), 1, 1, 5).unwrap();
        let after = scanner.scan(temp_dir.path(), &options).unwrap().snapshot;

        b.iter(|| {
            let diff = SnapshotStore::diff(black_box(Some(&before)), black_box(&after));
            assert_eq!(diff.added.len(), 5);
            black_box(diff);
        });
    });
}

/// Benchmark: memory tracking is populated
fn bench_memory_usage(c: &mut Criterion) {
    c.bench_function("scan_memory_tracking", |b| {
        let temp_dir = TempDir::new().unwrap();
        fixtures::create_movie_library(&temp_dir.path().join("Movies"), 50).unwrap();
        fixtures::create_show_library(&temp_dir.path().join("Shows"), 10, 2, 8).unwrap();
        let scanner = Scanner::local(Shutdown::new());
        let options = options();

        b.iter(|| {
            let report = scanner.scan(black_box(temp_dir.path()), &options).unwrap();
            assert!(
                report.stats.peak_memory_bytes.is_some(),
                "Memory tracking should be enabled"
            );
            black_box(report);
        });
    });
}

criterion_group!(
    benches,
    bench_small_library,
    bench_show_library,
    bench_diff,
    bench_memory_usage,
);

criterion_main!(benches);
