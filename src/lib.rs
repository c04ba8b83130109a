mod browser;
pub mod config;
pub mod controller;
pub mod dom;
pub mod groups;
pub mod session;
pub mod upload;

#[cfg(test)]
mod testing;

use config::InjectorConfig;
use std::path::PathBuf;

/// Entry point for the binary: `doc-upload-injector [config.json]`.
pub fn run() -> anyhow::Result<()> {
    env_logger::init();

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = InjectorConfig::load(config_path.as_deref())?;

    log::info!(
        "DocUploadInjector starting for {} (admin group '{}')",
        config.app_url,
        config.admin_group
    );

    // Page notices and the upload batch interleave only at awaits.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(controller::run_injector(config))
}
