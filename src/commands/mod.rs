//! Command implementations
//!
//! Every command resolves settings, connects, and hands a manifest or a set
//! of roots to one of the sync engines.

pub mod cleanup;
pub mod download;
pub mod kinds;
pub mod populate;

use anyhow::{Context as AnyhowContext, Result, anyhow};
use syncgraph::Manifest;
use towerkit::Client;

use crate::Context;
use crate::config::{self, Settings};
use crate::ui;

/// Settings with flag/env overrides applied.
pub fn settings(ctx: &Context) -> Result<Settings> {
    let mut settings = Settings::load()?;
    settings.apply(&ctx.connection);
    Ok(settings)
}

/// Connect and verify reachability and credentials.
///
/// A failure here aborts the command before any resource work.
pub fn connect(ctx: &Context, settings: &Settings) -> Result<Client> {
    let connection = settings.connection()?;
    if !ctx.quiet {
        ui::kv("Controller", &connection.api_base());
    }

    let client = Client::connect(connection);
    startup_check(client.check_connection())?;
    Ok(client)
}

/// Abort on connectivity and credential failures. Any other answer from
/// `ping/` or `me/` is reported and the run goes on.
fn startup_check(result: towerkit::Result<()>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.category().is_fatal_at_start() => {
            let category = e.category();
            Err(anyhow!("{}: {e}\n  {}", category.description(), category.advice()))
        }
        Err(e) => {
            ui::warn(&format!("Connection check inconclusive: {e}"));
            Ok(())
        }
    }
}

/// Load the manifest from a path, the config directory, or the built-in sample.
pub fn load_manifest(explicit: Option<&str>) -> Result<Manifest> {
    let manifest = match config::manifest_path(explicit)? {
        Some(path) => {
            log::info!("Loading manifest {}", path.display());
            Manifest::load(&path).with_context(|| format!("Could not load {}", path.display()))?
        }
        None => {
            log::info!("Using the built-in sample manifest");
            Manifest::sample().context("Built-in sample manifest is invalid")?
        }
    };

    for warning in manifest.validate() {
        ui::warn(&warning);
    }
    Ok(manifest)
}
