//! Static file server that answers directory requests with generated listings.

mod config;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use dirlisting::{MimeResolver, StatCache, WorkerContext};

use crate::config::{ServerConfig, SettingsFile};
use crate::server::AppState;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = match std::env::var_os("DIRLIST_CONFIG").map(PathBuf::from) {
        Some(path) => match SettingsFile::load(&path) {
            Ok(settings) => {
                log::info!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                log::error!("Invalid settings file {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => SettingsFile::default(),
    };

    let config = ServerConfig::from_settings_and_env(Some(&settings.server));
    let ctx = WorkerContext::new(config.max_connections)
        .with_stat_cache(StatCache::new(settings.server.etag))
        .with_mime(MimeResolver::new(
            settings.server.mime_use_xattr,
            settings.server.mime_xattr_name.clone(),
        ))
        .with_server_tag(config.server_tag.clone());
    log::debug!(
        "Up to {} concurrent listings, footer tag {:?}",
        ctx.limiter.max_in_progress(),
        ctx.server_tag
    );

    let state = Arc::new(AppState {
        ctx,
        listing: Arc::new(settings.dir_listing),
        docroot: config.docroot.clone(),
    });

    // One worker: the limiter and stat cache are per worker
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = runtime.block_on(server::run(config, state)) {
        log::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
