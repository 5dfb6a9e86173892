//! Deploy and manage Docker Compose applications on a single VM.
//!
//! master-builder stages every deployment of a project into its own
//! versioned directory, brings it up, then tears down the previous
//! version. All projects sit behind one shared Traefik reverse
//! proxy, optionally terminating TLS with ACME-issued or static
//! certificates.
//!
//! # Overview
//!
//! - [`Layout`] locates everything under the home directory
//!   (`$MB_HOME` or `~/.master-builder`).
//! - [`ConfigStore`] persists the one-time choices made by
//!   [`init`], as a [`PersistedConfig`].
//! - [`Ingress`] converges the proxy: compose file, dynamic TLS
//!   file, shared network, and the running container.
//! - [`Deployer`] runs the deploy protocol for a project.
//! - [`prepare`] turns a local compose project into a
//!   self-contained document, and [`SshSession`] ships it to a
//!   server that runs the deploy.
//!
//! Everything that talks to Docker goes through a
//! [`CommandRunner`](cmd::CommandRunner), so the whole lifecycle can
//! be driven by a fake in tests.
//!
//! # Layout
//!
//! ```text
//! <home>/
//!   config.yml
//!   deployments/<project>/<deployment-id>/docker-compose.yml
//!   ingress/docker-compose.yml
//!   ingress/dynamic.yaml
//!   letsencrypt/
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use master_builder::cmd::SystemRunner;
//! use master_builder::deploy::DeployRequest;
//! use master_builder::{Deployer, Docker, InitOptions, Layout, init};
//!
//! fn main() -> anyhow::Result<()> {
//!     let layout = Layout::detect()?;
//!     let store = layout.config_store();
//!     init::run(&store, &InitOptions::acme("ops@example.com"))?;
//!
//!     let config = store.load_initialized()?;
//!     let runner = SystemRunner::new();
//!     let deployer = Deployer::new(&layout, &config, Docker::new(&runner));
//!
//!     let request = DeployRequest::new(
//!         "app",
//!         "services:\n  app:\n    image: nginx\n",
//!     )
//!     .before(["app:nginx -t".parse()?]);
//!
//!     let outcome = deployer.deploy(&request)?;
//!     println!("deployed {}", outcome.id);
//!     Ok(())
//! }
//! ```
//!
//! # Known limitations
//!
//! A deploy that fails midway is not rolled back: the new deployment
//! directory stays, and previous deployments already taken down stay
//! gone. Concurrent deploys of one project are refused by a lock
//! file, but `compose` and `ingress` commands take no lock.

// Allow noisy pedantic lints that don't add value for a
// deployment tool crate.
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod cli;
pub mod cmd;
pub mod config;
pub mod deploy;
pub mod docker;
pub mod error;
pub mod hook;
pub mod ingress;
pub mod init;
pub mod prepare;
pub mod remote;
pub mod report;

pub use config::{ConfigStore, Layout, PersistedConfig};
pub use deploy::{DeployOutcome, DeployRequest, Deployer};
pub use docker::Docker;
pub use hook::Hook;
pub use ingress::{FileChange, Ingress, IngressMode};
pub use init::InitOptions;
pub use prepare::PrepareOptions;
pub use remote::{SshSession, SshTarget};
