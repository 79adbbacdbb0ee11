//! `aapsync cleanup`

use anyhow::Result;
use syncgraph::{Decommissioner, RefCache, SWEEP_KINDS};

use crate::Context;
use crate::cli::CleanupArgs;
use crate::progress::{PromptConfirm, TerminalProgress};
use crate::ui;

pub fn run(ctx: &Context, args: CleanupArgs) -> Result<()> {
    let settings = super::settings(ctx)?;
    let protected = settings.protected_names();

    let mut cache = RefCache::new();
    let mut progress = TerminalProgress::new(ctx.verbose, ctx.quiet);
    let mut confirm = PromptConfirm::new(args.yes);

    let (title, report) = if args.all_non_default {
        let client = super::connect(ctx, &settings)?;
        if !ctx.quiet {
            ui::header("Protected");
            for kind in SWEEP_KINDS {
                let names = protected.names(kind);
                if !names.is_empty() {
                    ui::kv(&kind.to_string(), &names.join(", "));
                }
            }
        }
        let report = Decommissioner::new(&client, &mut cache, protected)
            .sweep(&mut progress, &mut confirm)?;
        ("Cleanup (all non-default)", report)
    } else {
        let manifest = super::load_manifest(args.manifest.as_deref())?;
        let client = super::connect(ctx, &settings)?;
        let report = Decommissioner::new(&client, &mut cache, protected)
            .run(&manifest, &mut progress, &mut confirm)?;
        ("Cleanup", report)
    };

    ui::print_report(title, &report);
    Ok(())
}
