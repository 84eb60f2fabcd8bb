// SPDX-License-Identifier: MPL-2.0

use backdrop_config::{MapProperties, SettingsStore, StoreConfig, locate_workspace_document};
use backdrop_lib::{
    Context, ImageProvider, Loader,
    engine::{BackdropEngine, EngineConfig},
};
use clap::Parser;
use eyre::WrapErr;
use std::path::{Path, PathBuf};
use tracing_subscriber::prelude::*;

/// Backdrop - background images for editor surfaces
#[derive(Parser, Debug)]
#[command(name = "backdrop")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Workspace directory or `.backdrop.ron` document to attach to
    #[arg(long, value_name = "DIR|FILE")]
    workspace: Option<PathBuf>,

    /// RON file with the host's option properties for the global record
    #[arg(long, value_name = "FILE")]
    host_properties: Option<PathBuf>,

    /// Load the selected images once, print them and exit
    #[arg(long)]
    once: bool,

    /// With --once, write the first selected image to this PNG file
    #[arg(long, value_name = "PNG", requires = "once")]
    export: Option<PathBuf>,

    /// Write the global document with default values if it does not exist
    #[arg(long)]
    write_defaults: bool,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    if std::env::var("RUST_SPANTRACE").is_err() {
        unsafe {
            std::env::set_var("RUST_SPANTRACE", "0");
        }
    }

    init_logger();

    let args = Args::parse();
    let store = StoreConfig::default();

    if args.write_defaults {
        return write_defaults(store);
    }

    let workspace = args.workspace.as_deref().and_then(workspace_document);
    let host_properties = args
        .host_properties
        .as_deref()
        .map(MapProperties::from_ron_file)
        .transpose()
        .wrap_err("failed to read host properties")?;

    if args.once {
        return run_once(store, workspace, host_properties, args.export.as_deref());
    }

    BackdropEngine::run(EngineConfig {
        store,
        workspace,
        host_properties,
        watch: true,
    })?;

    Ok(())
}

/// A directory is searched upwards for its workspace document.
fn workspace_document(path: &Path) -> Option<PathBuf> {
    if !path.is_dir() {
        return Some(path.to_path_buf());
    }

    let document = locate_workspace_document(path);
    if document.is_none() {
        tracing::info!(path = %path.display(), "no workspace document found, using global configuration");
    }
    document
}

fn write_defaults(store: StoreConfig) -> color_eyre::Result<()> {
    let path = store.global_document.clone();
    let mut store = SettingsStore::new(store);

    if store.save_default_document()? {
        println!("Wrote default configuration to {}", path.display());
    } else {
        println!("{} already exists", path.display());
    }
    Ok(())
}

fn run_once(
    store: StoreConfig,
    workspace: Option<PathBuf>,
    host_properties: Option<MapProperties>,
    export: Option<&Path>,
) -> color_eyre::Result<()> {
    let mut context = Context::new(store, Loader::Inline);
    if let Some(host) = host_properties {
        context = context.with_host(Box::new(host));
    }

    let selected = context.attach(workspace);

    for provider in &selected {
        match provider.current_image() {
            Some(image) => {
                let (width, height) = image.pixel_size();
                println!(
                    "{:?}\t{}\t{width}x{height}",
                    provider.kind(),
                    provider.scope()
                );
            }
            None => println!("{:?}\t{}\tnone", provider.kind(), provider.scope()),
        }
    }

    if let Some(path) = export {
        let image = selected
            .iter()
            .find_map(|provider| provider.current_image())
            .ok_or_else(|| eyre::eyre!("no image to export"))?;
        image
            .pixels()
            .save(path)
            .wrap_err_with(|| format!("failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), "exported background image");
    }

    Ok(())
}

/// Every crate of the workspace logs under a target starting with this.
const LOG_TARGET_PREFIX: &str = env!("CARGO_PKG_NAME");

/// Level requested through `RUST_LOG`, `INFO` when unset or unparsable.
fn log_level(requested: Option<&str>) -> tracing::Level {
    requested
        .and_then(|level| level.trim().parse().ok())
        .unwrap_or(tracing::Level::INFO)
}

/// Errors are always shown. Anything else only from our own crates.
fn shows(target: &str, level: tracing::Level, max: tracing::Level) -> bool {
    level == tracing::Level::ERROR || (target.starts_with(LOG_TARGET_PREFIX) && level <= max)
}

fn init_logger() {
    let max = log_level(std::env::var("RUST_LOG").ok().as_deref());

    let format = tracing_subscriber::fmt::format()
        .pretty()
        .without_time()
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_thread_names(true);

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .event_format(format)
        .with_filter(tracing_subscriber::filter::filter_fn(move |metadata| {
            shows(metadata.target(), *metadata.level(), max)
        }));

    tracing_subscriber::registry().with(layer).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_calls_library() {
        let _run: fn(EngineConfig) -> eyre::Result<()> = BackdropEngine::run;
        let _ = EngineConfig::default();
    }

    #[test]
    fn workspace_file_is_used_as_is() {
        let document = PathBuf::from("/nonexistent/ws/.backdrop.ron");
        assert_eq!(workspace_document(&document), Some(document));
    }

    #[test]
    fn log_level_defaults_to_info() {
        assert_eq!(log_level(None), tracing::Level::INFO);
        assert_eq!(log_level(Some("nonsense")), tracing::Level::INFO);
        assert_eq!(log_level(Some(" debug ")), tracing::Level::DEBUG);
    }

    #[test]
    fn only_workspace_targets_pass_below_error() {
        let max = tracing::Level::DEBUG;
        assert!(shows("backdrop_lib::engine", tracing::Level::DEBUG, max));
        assert!(shows("backdrop_config::store", tracing::Level::INFO, max));
        assert!(!shows("backdrop_lib::engine", tracing::Level::TRACE, max));
        assert!(!shows("calloop::loop_logic", tracing::Level::WARN, max));
        assert!(shows("calloop::loop_logic", tracing::Level::ERROR, max));
    }

    #[test]
    fn arguments_parse() {
        let args = Args::parse_from(["backdrop", "--once", "--export", "out.png"]);
        assert!(args.once);
        assert_eq!(args.export, Some(PathBuf::from("out.png")));
        assert!(Args::try_parse_from(["backdrop", "--export", "out.png"]).is_err());
    }
}
