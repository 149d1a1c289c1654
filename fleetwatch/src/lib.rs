//! Configuration-derived state for a fleet of Kea DHCP daemons.
//!
//! Each monitored daemon periodically reports its configuration. This
//! library turns those configurations into durable facts: the log files a
//! daemon writes, the High Availability services it takes part in and the
//! subnets it serves. Facts about one daemon may be discovered while
//! processing another, so HA services are assembled gradually as peers
//! report in.
//!
//! # Architecture
//!
//! ## Configuration
//!
//! - [`kea_config`]: Parsed and normalized daemon configuration with its hash
//! - [`control_url`]: Control endpoints and peer URL matching
//! - [`subnets`]: Subnets and pool capacities served by a daemon
//! - [`bigcounter`]: Counter that widens past `u64` for IPv6 pool sizes
//!
//! ## Derived State
//!
//! - [`extract`]: HA peer facts and log targets read from one configuration
//! - [`ha_detect`]: Matching HA facts to services and attributing roles
//! - [`log_allow`]: Per-daemon allow-list of viewable log files
//!
//! ## Persistence
//!
//! - [`store`]: SQLite state database with per-daemon write locks
//! - [`reconcile`]: Applying configurations with staleness checks
//! - [`engine`]: Store plus the published allow-lists
//!
//! ## Tooling
//!
//! - [`config`]: Settings file loading with embedded defaults
//! - [`logging`]: `tracing` subscriber setup
//! - [`inspect`]: Configuration tree visualization
//! - [`report`]: Terminal-friendly colored output
//!
//! # Workflow
//!
//! 1. **Register** apps and their daemons in the [`store`]
//! 2. **Refresh** a daemon with each configuration it reports
//! 3. **Extract** log targets and the HA peer fact outside any lock
//! 4. **Commit** the configuration, log targets and services under the
//!    daemon's lock, unless another writer changed the daemon first
//! 5. **Publish** the new log allow-list
//!
//! # Examples
//!
//! ```ignore
//! use fleetwatch::engine::Engine;
//! use fleetwatch::store::StoreConfig;
//!
//! let engine = Engine::open(StoreConfig::at("fleetwatch.sqlite3"))?;
//! let outcome = engine.refresh(daemon_id, &raw_config)?;
//! println!("services: {}", outcome.services.len());
//! assert!(engine.log_allowed(daemon_id, "/var/log/kea/kea-dhcp4.log"));
//! ```
//!
//! # Built on config-tree-core
//!
//! Parsing, normalization and hashing of JSON configuration trees live in
//! `config-tree-core`. All Kea-specific logic is contained in this crate.

pub mod bigcounter;
pub mod config;
pub mod control_url;
pub mod engine;
pub mod error;
pub mod extract;
pub mod ha_detect;
pub mod inspect;
pub mod kea_config;
pub mod log_allow;
pub mod logging;
pub mod model;
pub mod reconcile;
pub mod report;
pub mod store;
pub mod subnets;

pub use error::{FleetError, FleetResult};
