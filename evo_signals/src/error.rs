//! Error types for signal binding, verification and broker construction.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while binding, verifying or laying out signals.
///
/// Every failure is deterministic: re-running the same configuration
/// reproduces the same error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalError {
    // ─── Definitions ────────────────────────────────────────────────
    /// A definition declares no type.
    #[error("The type of signal {signal} cannot be empty")]
    EmptyType {
        /// Signal name
        signal: String,
    },

    /// A definition is structurally invalid (e.g. a node carrying dimensions).
    #[error("Invalid definition {signal}: {reason}")]
    InvalidDefinition {
        /// Signal name
        signal: String,
        /// What is wrong
        reason: String,
    },

    /// Merging into a definition marked final.
    #[error("Trying to merge the final definition {signal} with local configuration data")]
    FinalDefinition {
        /// Definition name
        signal: String,
    },

    // ─── Introspection ──────────────────────────────────────────────
    /// Structured type absent from the registry.
    #[error("Type {type_name} not registered")]
    TypeNotRegistered {
        /// Type name
        type_name: String,
    },

    /// Registered class with a size of zero bytes.
    #[error("Type {type_name} has a size of zero bytes")]
    ZeroSizedType {
        /// Type name
        type_name: String,
    },

    /// Structured type registered without member layout.
    #[error("Type {type_name} not introspectable")]
    NotIntrospectable {
        /// Type name
        type_name: String,
    },

    /// Child count differs from the registered member count.
    #[error("Signal {signal} declares {found} members but {type_name} defines {expected}")]
    MemberCountMismatch {
        /// Signal name
        signal: String,
        /// Type name
        type_name: String,
        /// Registered member count
        expected: usize,
        /// Declared child count
        found: usize,
    },

    /// A registered member has no matching child definition.
    #[error("Member {member} of {type_name} not found in signal {signal}")]
    MemberNotFound {
        /// Member name
        member: String,
        /// Signal name
        signal: String,
        /// Type name
        type_name: String,
    },

    /// Member type differs from the registered one.
    #[error("Type mismatch for the member {member}: declared {found}, introspection defines {expected}")]
    MemberTypeMismatch {
        /// Member name
        member: String,
        /// Registered type
        expected: String,
        /// Declared type
        found: String,
    },

    /// Member dimensionality differs from the registered one.
    #[error("Number of dimensions not compatible for {member}: declared {found}, introspection defines {expected}")]
    DimensionMismatch {
        /// Member name
        member: String,
        /// Registered number of dimensions
        expected: usize,
        /// Declared number of dimensions
        found: usize,
    },

    /// Element count of one dimension differs from the registered one.
    #[error("Number of elements in dimension {dimension} not compatible for {member}: declared {found}, introspection defines {expected}")]
    ElementsMismatch {
        /// Member name
        member: String,
        /// Dimension index
        dimension: usize,
        /// Registered element count
        expected: u32,
        /// Declared element count
        found: u32,
    },

    /// Arrays of structured types are not supported.
    #[error("Unsupported multi-dimensional structure {signal} of type {type_name}")]
    MultiDimensionalStructure {
        /// Signal name
        signal: String,
        /// Type name
        type_name: String,
    },

    // ─── Namespace ──────────────────────────────────────────────────
    /// The first path segment names no namespace group.
    #[error("Data source {group} not found (path {path})")]
    DataSourceNotFound {
        /// Group name
        group: String,
        /// Full path
        path: String,
    },

    /// No shared signal at the given path.
    #[error("Shared signal {path} not found")]
    SignalNotFound {
        /// Full path
        path: String,
    },

    /// A sampled signal would have to create the signal it reads.
    #[error("The sampled signal {signal} must be linked to an existing shared signal ({path})")]
    SampledSignalNotLinked {
        /// Signal name
        signal: String,
        /// Resolved path
        path: String,
    },

    /// The path collides with an existing node or signal.
    #[error("Path {path} conflicts with an existing namespace entry")]
    PathConflict {
        /// Full path
        path: String,
    },

    /// The shared signal already has a different type.
    #[error("Shared signal {path} type already set to {existing}, cannot bind {requested}")]
    TypeConflict {
        /// Full path
        path: String,
        /// Type already set
        existing: String,
        /// Type requested by the binding
        requested: String,
    },

    /// A module with the same name was already bound.
    #[error("Module {module} is already bound to the namespace")]
    DuplicateModule {
        /// Module name
        module: String,
    },

    /// More than one producer writes the signal in one state.
    #[error("Shared signal {path} has {count} producers in state {state}")]
    MultipleProducers {
        /// Full path
        path: String,
        /// State name
        state: String,
        /// Number of producers
        count: usize,
    },

    /// Storage access before `allocate()`.
    #[error("The memory of shared signal {path} has to be allocated first")]
    NotAllocated {
        /// Full path
        path: String,
    },

    /// A default value cannot be converted to the signal type.
    #[error("Invalid default value {value:?} for {signal}: {reason}")]
    InvalidDefault {
        /// Signal name or path
        signal: String,
        /// Default text
        value: String,
        /// What is wrong
        reason: String,
    },

    // ─── Broker ─────────────────────────────────────────────────────
    /// Mutation attempted after `finalise()`.
    #[error("The broker is finalised, no more signals can be added")]
    BrokerFinalised,

    /// Access attempted before `finalise()`.
    #[error("The broker is not finalised")]
    BrokerNotFinalised,

    /// The shared signal does not accept this broker kind.
    #[error("Shared signal {path} does not support the {kind} broker")]
    UnsupportedBroker {
        /// Full path
        path: String,
        /// Broker kind
        kind: String,
    },

    /// Operation not available for this broker kind.
    #[error("Operation requires a {expected} broker, this is a {found}")]
    WrongBrokerKind {
        /// Required kind
        expected: String,
        /// Actual kind
        found: String,
    },

    /// The module-side type differs from the shared signal type.
    #[error("Signal {signal} type {requested} does not match shared signal {path} type {existing}")]
    BrokerTypeMismatch {
        /// Signal name
        signal: String,
        /// Shared signal path
        path: String,
        /// Shared signal type
        existing: String,
        /// Module-side type
        requested: String,
    },

    /// A second synchronised signal in one broker.
    #[error("Trying to add the sync signal {signal} on a broker which already contains a sync signal")]
    DuplicateSync {
        /// Signal name
        signal: String,
    },

    /// Malformed `Samples` matrix.
    #[error("The field \"Samples\" of {signal} must declare a nx3 matrix {{{{a,b,c}}...}} with b<=a<=c: {reason}")]
    MalformedSamples {
        /// Signal name
        signal: String,
        /// What is wrong
        reason: String,
    },

    /// Malformed `Operation` matrix.
    #[error("The field \"Operation\" of {signal} must declare a nx2 matrix {{{{a,b}}...}} with a<=b<elements: {reason}")]
    MalformedOperation {
        /// Signal name
        signal: String,
        /// What is wrong
        reason: String,
    },

    /// The module requests more elements than are available.
    #[error("Signal {signal} requests {requested} elements but only {available} are available")]
    TooManyElements {
        /// Signal name
        signal: String,
        /// Requested elements
        requested: u32,
        /// Available elements
        available: u32,
    },

    /// Entry index out of range.
    #[error("Signal index {index} out of range ({count} signals)")]
    InvalidIndex {
        /// Requested index
        index: usize,
        /// Number of entries
        count: usize,
    },

    /// A resolved region does not lie inside its memory area.
    #[error("Signal {signal} region [{offset}, {offset}+{size}) exceeds memory area of {area_size} bytes")]
    InvalidRegion {
        /// Signal name
        signal: String,
        /// Byte offset
        offset: usize,
        /// Byte size
        size: usize,
        /// Area size
        area_size: usize,
    },

    /// External memory area id never attached.
    #[error("Unknown external memory area {area}")]
    UnknownArea {
        /// Area id
        area: usize,
    },

    // ─── Application ────────────────────────────────────────────────
    /// No module with this name.
    #[error("Module {module} not found")]
    ModuleNotFound {
        /// Module name
        module: String,
    },

    /// A module names a template that is not declared.
    #[error("Template {template} of module {module} not found")]
    TemplateNotFound {
        /// Template name
        template: String,
        /// Module name
        module: String,
    },

    /// Operation requires `configure()` first.
    #[error("The application is not configured")]
    NotConfigured,

    /// `configure()` called twice.
    #[error("The application is already configured")]
    AlreadyConfigured,

    // ─── Text ───────────────────────────────────────────────────────
    /// Structured-text literal could not be parsed.
    #[error("Failed to parse {input:?}: {reason}")]
    Parse {
        /// Input text
        input: String,
        /// What is wrong
        reason: String,
    },

    // ─── Configuration ──────────────────────────────────────────────
    /// Configuration loading failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for signal operations
pub type SignalResult<T> = Result<T, SignalError>;
