//! Memory-mapped brokers.
//!
//! - [`memory`]: byte arenas holding the module-side image
//! - [`selection`]: sample-window and block tables
//! - [`map`]: the broker itself (entries, finalise, accessors, copy loops)

pub mod map;
pub mod memory;
pub mod selection;

pub use map::{BrokerEntry, BrokerKind, ExternalRegion, MemoryMapBroker, SignalLocation};
pub use memory::{AreaId, LOCAL_AREA, MemoryArea};
pub use selection::{Block, SampleWindow};
