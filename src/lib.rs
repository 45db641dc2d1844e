pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod library;
pub mod logging;
pub mod mount;
pub mod paths;
pub mod pipeline;
pub mod plex;
pub mod report;
pub mod scan;
pub mod service;
pub mod shutdown;
pub mod snapshot;
pub mod store;
pub mod util;
