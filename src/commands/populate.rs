//! `aapsync populate`

use anyhow::Result;
use std::time::Duration;
use syncgraph::{ProvisionOptions, Provisioner, RefCache};

use crate::Context;
use crate::cli::PopulateArgs;
use crate::progress::TerminalProgress;
use crate::ui;

/// Provisioning options from settings, adjusted by flags.
fn options(settings_options: ProvisionOptions, args: &PopulateArgs) -> ProvisionOptions {
    let mut options = settings_options;
    options.wait_for_projects = !args.no_wait;
    if let Some(secs) = args.sync_timeout {
        options.sync_deadline = Duration::from_secs(secs);
    }
    if let Some(secs) = args.poll_interval {
        options.poll_interval = Duration::from_secs(secs);
    }
    options
}

pub fn run(ctx: &Context, args: PopulateArgs) -> Result<()> {
    let settings = super::settings(ctx)?;
    let manifest = super::load_manifest(args.manifest.as_deref())?;
    let client = super::connect(ctx, &settings)?;
    let options = options(settings.provision_options(), &args);

    if !ctx.quiet {
        ui::info(&format!(
            "Provisioning {} declared resources",
            manifest.total()
        ));
    }

    let mut cache = RefCache::new();
    let mut progress = TerminalProgress::new(ctx.verbose, ctx.quiet);
    let outcome = Provisioner::new(&client, &mut cache, options).run(&manifest, &mut progress);

    if let Some(wait) = &outcome.wait {
        ui::print_wait(wait);
    }
    ui::print_report("Populate", &outcome.report);
    if !outcome.report.total().is_success() {
        ui::dim("Failed resources are not rolled back; re-run populate to complete the graph.");
    }
    Ok(())
}
