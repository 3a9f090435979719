//! Configuration loading.
//!
//! An application file describes the introspection registry, the shared
//! namespace and the modules:
//!
//! ```toml
//! [shared]
//! log_level = "info"
//! service_name = "pid-loop"
//!
//! [types.TrackError]
//! size = 8
//! members = [ { name = "Par1", type = "uint32", offset = 0 },
//!             { name = "Par2", type = "uint32", offset = 4 } ]
//!
//! [data.DDB1]
//! Class = "DataSource"
//! "+X" = { Type = "uint32", Default = "1" }
//!
//! [gams.Pid]
//! States = ["state1"]
//! "+Inputs" = { Class = "GAMSignalsContainer", IsInput = true, "+Error" = { Type = "uint32", Path = "DDB1.X" } }
//! ```
//!
//! Module and namespace tables are walked by hand: child keys start with a
//! sigil (`+` regular, `$` domain) and their declaration order is kept.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::consts::PATH_SEPARATOR;
use crate::definition::{Direction, Gam, MemberKind, SignalDefinition, SignalsContainer};
use crate::dimensions::Dimensions;
use crate::error::SignalResult;
use crate::introspection::{ClassInfo, IntrospectionMember, IntrospectionRegistry};
use crate::namespace::{DataSourceContainer, SharedSignal};

/// Error type for configuration loading operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// `EnvFilter` directive for this level.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields.
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "pid-loop"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// # Errors
    ///
    /// `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loading of TOML files into any deserialisable type.
///
/// - `ConfigError::FileNotFound` if the file does not exist
/// - `ConfigError::ParseError` if the TOML is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

// ─── Application file ───────────────────────────────────────────────

/// One member of a `[types.X]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub offset: u32,
    #[serde(default)]
    pub dimensions: String,
}

/// `[types.X]`: one introspection registry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeConfig {
    pub size: u32,
    /// Empty for a registered but non-introspectable type.
    #[serde(default)]
    pub members: Vec<MemberConfig>,
}

/// Whole application file.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationConfig {
    pub shared: SharedConfig,
    #[serde(default)]
    pub types: BTreeMap<String, TypeConfig>,
    /// Namespace groups.
    #[serde(default)]
    pub data: toml::Table,
    /// Modules, in execution order.
    #[serde(default)]
    pub gams: toml::Table,
    /// Local defaults merged into modules naming them as `Template`.
    #[serde(default)]
    pub templates: toml::Table,
}

impl ApplicationConfig {
    /// Parse from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        for (name, ty) in &self.types {
            if ty.size == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "type {name} must have a positive size"
                )));
            }
        }
        Ok(())
    }

    /// Build the introspection registry from `[types]`.
    pub fn registry(&self) -> SignalResult<IntrospectionRegistry> {
        let mut registry = IntrospectionRegistry::new();
        for (name, ty) in &self.types {
            let info = if ty.members.is_empty() {
                ClassInfo::opaque(ty.size)
            } else {
                let mut members = Vec::with_capacity(ty.members.len());
                for m in &ty.members {
                    members.push(IntrospectionMember::new(
                        &m.name,
                        &m.type_name,
                        m.offset,
                        Dimensions::parse(&m.dimensions)?,
                    ));
                }
                ClassInfo::introspectable(ty.size, members)
            };
            registry.register(name, info);
        }
        Ok(registry)
    }

    /// Build the namespace from `[data]`, with its pre-declared signals.
    pub fn namespace(&self) -> SignalResult<DataSourceContainer> {
        let mut namespace = DataSourceContainer::new();
        for (group, value) in &self.data {
            let table = value
                .as_table()
                .ok_or_else(|| invalid(&format!("data source {group} must be a table")))?;
            namespace.add_data_source(group)?;
            declare_signals(&mut namespace, group, table)?;
        }
        Ok(namespace)
    }

    /// Modules from `[gams]`, in declaration order.
    pub fn gams(&self) -> Result<Vec<Gam>, ConfigError> {
        self.gams
            .iter()
            .map(|(name, value)| gam_from_value(name, value))
            .collect()
    }

    pub fn templates(&self) -> Result<BTreeMap<String, Gam>, ConfigError> {
        self.templates
            .iter()
            .map(|(name, value)| Ok((name.clone(), gam_from_value(name, value)?)))
            .collect()
    }
}

fn invalid(reason: &str) -> ConfigError {
    ConfigError::ValidationError(reason.to_string())
}

fn bare_name(key: &str) -> (MemberKind, &str) {
    MemberKind::split_key(key).unwrap_or((MemberKind::Regular, key))
}

fn declare_signals(
    namespace: &mut DataSourceContainer,
    prefix: &str,
    table: &toml::Table,
) -> SignalResult<()> {
    for (key, value) in table {
        if key == "Class" {
            continue;
        }
        let (_, name) = bare_name(key);
        let Some(child) = value.as_table() else {
            warn!(key = %key, group = prefix, "Ignoring non-table entry in data source");
            continue;
        };
        let path = format!("{prefix}{PATH_SEPARATOR}{name}");
        if child.contains_key("Type") {
            let dimensions = text_field(child, "Dimensions");
            let elements = if dimensions.trim().is_empty() {
                0
            } else {
                Dimensions::parse(&dimensions)?.element_count()
            };
            let signal = SharedSignal::new(name, &path, &text_field(child, "Type"))
                .with_elements(elements)
                .with_samples(u32_field(child, "Samples", &path)?.unwrap_or(1))
                .with_default(&text_field(child, "Default"));
            namespace.insert_signal(signal)?;
        } else {
            declare_signals(namespace, &path, child)?;
        }
    }
    Ok(())
}

fn gam_from_value(name: &str, value: &toml::Value) -> Result<Gam, ConfigError> {
    let table = value
        .as_table()
        .ok_or_else(|| invalid(&format!("module {name} must be a table")))?;
    let states = match table.get("States") {
        None => Vec::new(),
        Some(toml::Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid(&format!("States of {name} must be strings")))
            })
            .collect::<Result<_, _>>()?,
        Some(toml::Value::String(s)) => vec![s.clone()],
        Some(_) => return Err(invalid(&format!("States of {name} must be a list"))),
    };
    let template = table.get("Template").and_then(|v| v.as_str()).map(str::to_string);

    let mut containers = Vec::new();
    for (key, value) in table {
        let Some((_, container_name)) = MemberKind::split_key(key) else {
            continue;
        };
        let child = value
            .as_table()
            .ok_or_else(|| invalid(&format!("container {name}.{key} must be a table")))?;
        containers.push(container_from_table(container_name, child)?);
    }

    Ok(Gam {
        name: name.to_string(),
        states,
        template,
        containers,
    })
}

fn container_from_table(name: &str, table: &toml::Table) -> Result<SignalsContainer, ConfigError> {
    let class = text_field(table, "Class");
    if !class.is_empty() && class != "GAMSignalsContainer" {
        return Err(invalid(&format!("container {name} has unknown class {class}")));
    }
    let mut direction = Direction::empty();
    if bool_field(table, "IsInput", name)? {
        direction |= Direction::INPUT;
    }
    if bool_field(table, "IsOutput", name)? {
        direction |= Direction::OUTPUT;
    }
    let mut container = SignalsContainer::new(name, direction, signal_children(table, name)?);
    container.is_final = bool_field(table, "IsFinal", name)?;
    Ok(container)
}

fn signal_children(table: &toml::Table, owner: &str) -> Result<Vec<SignalDefinition>, ConfigError> {
    let mut out = Vec::new();
    for (key, value) in table {
        let Some((kind, name)) = MemberKind::split_key(key) else {
            continue;
        };
        let child = value
            .as_table()
            .ok_or_else(|| invalid(&format!("signal {owner}.{name} must be a table")))?;
        out.push(signal_from_table(name, kind, child)?);
    }
    Ok(out)
}

fn signal_from_table(
    name: &str,
    kind: MemberKind,
    table: &toml::Table,
) -> Result<SignalDefinition, ConfigError> {
    let sampled = match text_field(table, "Class").as_str() {
        "" => table.contains_key("Samples"),
        "GAMGenericSignal" => false,
        "GAMSampledSignal" => true,
        other => return Err(invalid(&format!("signal {name} has unknown class {other}"))),
    };
    let type_name = text_field(table, "Type");
    let children = signal_children(table, name)?;

    let mut definition = if sampled {
        if !children.is_empty() {
            return Err(invalid(&format!("sampled signal {name} cannot have members")));
        }
        SignalDefinition::sampled(name, &type_name, &text_field(table, "Samples"))
    } else {
        if table.contains_key("Samples") {
            warn!(signal = name, "Samples ignored on a generic signal");
        }
        SignalDefinition::node(name, &type_name, children)
    };
    definition.member_kind = kind;
    definition.path = text_field(table, "Path");
    definition.default_value = text_field(table, "Default");
    definition.dimensions = text_field(table, "Dimensions");
    definition.operation = text_field(table, "Operation");
    definition.cycles = u32_field(table, "Cycles", name)?.unwrap_or(0);
    definition.is_final = bool_field(table, "IsFinal", name)?;
    Ok(definition)
}

// ─── Value helpers ──────────────────────────────────────────────────

/// Structured-text rendering of a TOML value.
fn to_text(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Integer(i) => i.to_string(),
        toml::Value::Float(f) => f.to_string(),
        toml::Value::Boolean(b) => b.to_string(),
        toml::Value::Datetime(d) => d.to_string(),
        toml::Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(to_text).collect();
            format!("{{{}}}", inner.join(", "))
        }
        toml::Value::Table(t) => {
            let inner: Vec<String> = t.iter().map(|(k, v)| format!("{k} = {}", to_text(v))).collect();
            format!("{{ {} }}", inner.join(" "))
        }
    }
}

fn text_field(table: &toml::Table, key: &str) -> String {
    table.get(key).map(to_text).unwrap_or_default()
}

fn u32_field(table: &toml::Table, key: &str, owner: &str) -> Result<Option<u32>, ConfigError> {
    let Some(value) = table.get(key) else {
        return Ok(None);
    };
    let parsed = match value {
        toml::Value::Integer(i) => u32::try_from(*i).ok(),
        toml::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed
        .map(Some)
        .ok_or_else(|| invalid(&format!("{key} of {owner} must be an unsigned integer")))
}

fn bool_field(table: &toml::Table, key: &str, owner: &str) -> Result<bool, ConfigError> {
    match table.get(key) {
        None => Ok(false),
        Some(toml::Value::Boolean(b)) => Ok(*b),
        Some(toml::Value::Integer(i)) => Ok(*i != 0),
        Some(toml::Value::String(s)) if s == "true" || s == "1" => Ok(true),
        Some(toml::Value::String(s)) if s == "false" || s == "0" => Ok(false),
        Some(_) => Err(invalid(&format!("{key} of {owner} must be a boolean"))),
    }
}
