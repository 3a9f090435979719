//! Prelude module for common re-exports.
//!
//! ```rust
//! use evo_signals::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ApplicationConfig, ConfigError, ConfigLoader, LogLevel, SharedConfig};

// ─── Errors ─────────────────────────────────────────────────────────
pub use crate::error::{SignalError, SignalResult};

// ─── Definitions ────────────────────────────────────────────────────
pub use crate::definition::{Direction, Gam, MemberKind, SignalDefinition, SignalKind, SignalsContainer};
pub use crate::dimensions::Dimensions;
pub use crate::introspection::{ClassInfo, IntrospectionMember, IntrospectionRegistry};
pub use crate::types::PrimitiveType;

// ─── Namespace & binding ────────────────────────────────────────────
pub use crate::binding::{BoundGam, bind};
pub use crate::namespace::{BrokerKinds, DataSourceContainer, SharedSignal, SignalId};
pub use crate::state::RealTimeStateInfo;
pub use crate::verify::verify;

// ─── Brokers ────────────────────────────────────────────────────────
pub use crate::broker::{BrokerKind, ExternalRegion, MemoryArea, MemoryMapBroker, SignalLocation};

// ─── Application ────────────────────────────────────────────────────
pub use crate::application::{MemoryPlan, RealTimeApplication};
