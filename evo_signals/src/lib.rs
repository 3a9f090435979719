//! EVO Signals
//!
//! Signal binding and memory-layout engine for real-time modules (GAMs):
//! declarative signal definitions are resolved against a shared namespace,
//! verified against a type introspection registry and compiled into flat,
//! double-buffered memory images accessed by memory-mapped brokers.
//!
//! # Module Structure
//!
//! - [`definition`] - Signal definition trees, containers and modules
//! - [`verify`] - Structural verification against the [`introspection`] registry
//! - [`namespace`] - Shared signals, data sources, allocation and state preparation
//! - [`binding`] - Resolution of module signals into the namespace
//! - [`broker`] - Memory-mapped brokers (layout, selection, copy loops)
//! - [`application`] - End-to-end configuration and state transitions
//! - [`config`] - TOML configuration loading
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use evo_signals::prelude::*;
//!
//! # fn main() -> Result<(), SignalError> {
//! let mut namespace = DataSourceContainer::new();
//! namespace.add_data_source("DDB1")?;
//!
//! let producer = Gam::new("A", &["Run"]).with_container(SignalsContainer::new(
//!     "Outputs",
//!     Direction::OUTPUT,
//!     vec![SignalDefinition::leaf("X", "uint32").with_path("DDB1.X").with_default("1")],
//! ));
//! let mut app = RealTimeApplication::new("demo", IntrospectionRegistry::new(), namespace, vec![producer]);
//! app.configure()?;
//! app.prepare_next_state("Run")?;
//! app.change_state()?;
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod binding;
pub mod broker;
pub mod config;
pub mod consts;
pub mod definition;
pub mod dimensions;
pub mod error;
pub mod introspection;
pub mod namespace;
pub mod prelude;
pub mod state;
pub mod text;
pub mod types;
pub mod verify;
