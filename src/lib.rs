//! # edgeos-bouncer - CrowdSec bouncer for EdgeOS routers
//!
//! Keeps a firewall address group on an Ubiquiti EdgeRouter equal to the set
//! of IPv4 addresses currently banned by a CrowdSec Local API.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  CLI (clap)                                                 │
//! │    └── Commands: run, show, sync, version                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Config (serde_yaml + environment overrides)                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Feed (reqwest)            ──mpsc──▶  Reconciler (tokio)     │
//! │    └── LAPI decision stream            ├── Ingest           │
//! │                                        ├── Planner          │
//! │                                        └── DeviceGateway    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Gateway (EdgeOsClient)                                     │
//! │    └── login + CSRF, GET / set / delete over api/edge       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use edgeos_bouncer::gateway::EdgeOsClient;
//! use edgeos_bouncer::ingest::{Decision, DecisionBatch};
//! use edgeos_bouncer::reconciler::{EngineSettings, Reconciler};
//! use edgeos_bouncer::signal::ShutdownToken;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let gateway = EdgeOsClient::new(
//!         "https://192.168.1.1/",
//!         "ubnt",
//!         "secret".into(),
//!         true,
//!         Duration::from_secs(30),
//!     )?;
//!     let settings = EngineSettings {
//!         group: "crowdsec".to_string(),
//!         ..Default::default()
//!     };
//!     let mut reconciler = Reconciler::bootstrap(gateway, settings).await?;
//!
//!     reconciler.ingest(&DecisionBatch {
//!         new: vec![Decision::ban("203.0.113.7")],
//!         deleted: vec![],
//!     });
//!     let outcome = reconciler.run_cycle(&ShutdownToken::new()).await;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`address_set`] - Ordered IPv4 sets and set differences
//! - [`planner`] - Turns a diff into bounded update payloads
//! - [`ingest`] - Folds decision batches into the desired set
//! - [`reconciler`] - Event loop, apply and verify cycle
//! - [`gateway`] - EdgeOS HTTP API client
//! - [`feed`] - CrowdSec LAPI stream client
//! - [`config`] - Configuration parsing and validation
//! - [`lock`] - File locking for concurrent execution prevention
//! - [`signal`] - Graceful shutdown signal handling

pub mod address_set;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod feed;
pub mod gateway;
pub mod ingest;
pub mod lock;
pub mod planner;
pub mod reconciler;
pub mod signal;
pub mod validation;

pub use address_set::{AddressGroup, AddressSet};
pub use cli::{Cli, Commands};
pub use config::Config;
pub use error::BouncerError;
