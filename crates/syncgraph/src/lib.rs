//! # Syncgraph
//!
//! Dependency-ordered resource sync for automation controllers.
//!
//! Three engines share one model of resource kinds and references:
//!
//! - [`Provisioner`]: creates a declared [`Manifest`] kind by kind in
//!   [`PROVISION_ORDER`], through an idempotent create-or-find upsert, wires
//!   memberships, workflow edges and role grants, and waits for project syncs
//! - [`Decommissioner`]: deletes declared resources in the exact reverse
//!   order, or sweeps everything that is not protected or managed
//! - [`Collector`]: downloads resources and every resource they reference,
//!   exactly once each, into an [`AssetSink`]
//!
//! ## Core Concepts
//!
//! - **ResourceKind**: a node of the kind dependency DAG
//! - **ResourceKey**: a bare name, or a `(scope, name)` pair for teams,
//!   hosts and groups
//! - **Cache**: run-scoped `kind × key → id` map consulted before every
//!   reference is wired
//! - **ApplyResult**: per-instance outcome; failures never cross a kind
//!   boundary
//!
//! ## Example
//!
//! ```ignore
//! use syncgraph::{Manifest, NoProgress, ProvisionOptions, Provisioner, RefCache};
//! use towerkit::{Auth, Client, ConnectionConfig};
//!
//! let client = Client::connect(ConnectionConfig::new(
//!     "http://awx.lab.local:32000",
//!     Auth::Basic { username: "admin".into(), password: "secret".into() },
//! ));
//! client.check_connection()?;
//!
//! let manifest = Manifest::sample()?;
//! let mut cache = RefCache::new();
//! let outcome = Provisioner::new(&client, &mut cache, ProvisionOptions::default())
//!     .run(&manifest, &mut NoProgress);
//! println!("{} created", outcome.report.total().created);
//! ```
//!
//! Progress and confirmation go through [`ProgressCallback`] and
//! [`ConfirmCallback`], so the engines carry no terminal UI.

pub mod cache;
pub mod collect;
pub mod context;
pub mod decommission;
pub mod error;
pub mod kind;
pub mod manifest;
pub mod provision;
pub mod sink;
pub mod types;
pub mod upsert;
pub mod waiter;

// Re-export main types at crate root
pub use cache::{Cache, RefCache, ResourceKey};
pub use collect::{Collector, REDACTED, VisitedSet, redact};
pub use context::{AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback};
pub use decommission::{Decommissioner, ProtectedNames, SWEEP_KINDS};
pub use error::{Result, SyncError};
pub use kind::{PROVISION_ORDER, ResourceKind, decommission_order};
pub use manifest::Manifest;
pub use provision::{ProvisionReport, Provisioner};
pub use sink::{AssetSink, DirectorySink, MemorySink, safe_filename};
pub use types::{ApplyResult, ProvisionOptions, SyncReport, SyncSummary};
pub use upsert::{Lookup, Resolver, Upserted, id_of};
pub use waiter::{WaitReport, WaitState, Waiter};
