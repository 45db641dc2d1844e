use clap::Parser;
use mediawatch::cli::{Cli, Command, LibrariesArgs, ResolveArgs, RunArgs, ScanArgs};
use mediawatch::config::Config;
use mediawatch::library::{LibraryProvider, Resolver};
use mediawatch::mount::MountClassifier;
use mediawatch::pipeline::Daemon;
use mediawatch::plex::PlexClient;
use mediawatch::report::{self, json, table, ScanView};
use mediawatch::scan::{ScanOptions, Scanner};
use mediawatch::shutdown::Shutdown;
use mediawatch::store::{SnapshotStore, StoreError};
use mediawatch::logging;
use std::fmt::Display;

fn exit_with(context: &str, err: impl Display) -> ! {
    eprintln!("{context}: {err}");
    std::process::exit(1);
}

fn open_snapshots(config: &Config) -> SnapshotStore {
    let dir = config
        .state_dir()
        .unwrap_or_else(|e| exit_with("Error resolving state directory", e));
    SnapshotStore::open(dir).unwrap_or_else(|e| exit_with("Error opening snapshot store", e))
}

fn plex_client(config: &Config) -> PlexClient {
    if !config.plex.enabled {
        exit_with("Plex integration is disabled", "set plex.enabled = true");
    }
    if let Err(e) = config.validate() {
        exit_with("Invalid config", e);
    }
    PlexClient::from_config(&config.plex).unwrap_or_else(|e| exit_with("Error creating Plex client", e))
}

fn run(config: &Config, args: &RunArgs) {
    if let Err(e) = config.validate_for_daemon() {
        exit_with("Invalid config", e);
    }

    let shutdown = Shutdown::new();
    if let Err(e) = shutdown.install_signal_handler() {
        tracing::warn!(error = %e, "signal handler not installed, stop with kill -9");
    }

    let daemon = Daemon::from_config(config, shutdown).unwrap_or_else(|e| exit_with("Error starting", e));

    if args.once {
        let report = daemon.run_cycle();
        if args.json {
            println!("{}", json::render(&report));
        } else {
            print!("{}", table::render_cycle(&report));
        }
        if report.failed + report.timed_out > 0 {
            std::process::exit(2);
        }
    } else {
        daemon.run();
    }
}

fn scan(config: &Config, args: &ScanArgs) {
    let mounts = MountClassifier::from_system(config.mount_overrides());
    let options = ScanOptions::from_config(&config.scan, mounts.policy(&args.root));
    let scanner = Scanner::local(Shutdown::new());

    let report = scanner
        .scan(&args.root, &options)
        .unwrap_or_else(|e| exit_with("Error scanning", e));

    let snapshots = open_snapshots(config);
    let previous = match snapshots.load(&args.root) {
        Ok(previous) => previous,
        Err(e @ StoreError::Corrupt { .. }) => {
            eprintln!("warning: {e}, diffing against an empty tree");
            None
        }
        Err(e) => exit_with("Error loading snapshot", e),
    };

    let diff = SnapshotStore::diff(previous.as_ref(), &report.snapshot);
    report::print_scan(&ScanView::new(&report, &diff, previous.is_none()), args.json, args.verbose);

    if args.save {
        match snapshots.save(&report.snapshot) {
            Ok(path) if !args.json => println!("\nsnapshot saved: {}", path.display()),
            Ok(_) => {}
            Err(e) => exit_with("Error saving snapshot", e),
        }
    }
}

fn resolve(config: &Config, args: &ResolveArgs) {
    let libraries = plex_client(config)
        .list_libraries()
        .unwrap_or_else(|e| exit_with("Error listing libraries", e));

    let resolver = Resolver::new(config.path_mappings.clone());
    match resolver.resolve(&args.path, &libraries) {
        Some(hit) if args.json => println!("{}", json::render(&hit)),
        Some(hit) => {
            println!("library: {} (id {}, {})", hit.target.name, hit.target.id, hit.target.media_type);
            println!("match:   {:?}, score {}", hit.kind, hit.score);
            if let Some(root) = &hit.root {
                println!("root:    {}", root.display());
            }
            if !hit.relative_path.as_os_str().is_empty() {
                println!("rest:    {}", hit.relative_path.display());
            }
            println!("sent as: {}", resolver.map_path(&args.path).display());
        }
        None => {
            eprintln!("No library matches {}", args.path.display());
            std::process::exit(1);
        }
    }
}

fn clean(config: &Config) {
    let snapshots = open_snapshots(config);
    let report = snapshots
        .clean_old(config.snapshots.retention, config.snapshots.max_count)
        .unwrap_or_else(|e| exit_with("Error cleaning snapshots", e));

    for path in &report.removed {
        println!("{}", path.display());
    }
    println!(
        "\nremoved {} snapshots, kept {} ({})",
        report.removed.len(),
        report.kept,
        snapshots.dir().display()
    );
}

fn libraries(config: &Config, args: &LibrariesArgs) {
    let libraries = plex_client(config)
        .list_libraries()
        .unwrap_or_else(|e| exit_with("Error listing libraries", e));

    if args.json {
        println!("{}", json::render(&libraries));
    } else {
        print!("{}", table::render_libraries(&libraries));
    }
}

fn main() {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).unwrap_or_else(|e| exit_with("Error loading config", e));
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Err(e) = logging::init(&config.logging) {
        eprintln!("warning: logging not initialized: {e}");
    }

    match &cli.command {
        Command::Run(args) => run(&config, args),
        Command::Scan(args) => scan(&config, args),
        Command::Resolve(args) => resolve(&config, args),
        Command::Clean => clean(&config),
        Command::Libraries(args) => libraries(&config, args),
    }
}
