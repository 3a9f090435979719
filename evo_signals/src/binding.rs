//! Signal resolution: binds a module's definitions to shared signals.
//!
//! Binding never mutates the module. It returns a [`BoundGam`] whose
//! definitions carry their resolved paths, ready for broker construction.

use tracing::{debug, error, warn};

use crate::consts::{
    ABSOLUTE_TIME_SIGNAL, BLOCK_COLUMNS, GAM_TIMES_GROUP, PATH_SEPARATOR, RELATIVE_TIME_SIGNAL,
    TIME_SIGNAL_TYPE,
};
use crate::definition::{Direction, Gam, SignalDefinition, SignalsContainer};
use crate::error::{SignalError, SignalResult};
use crate::introspection::IntrospectionRegistry;
use crate::namespace::{BrokerKinds, DataSourceContainer, SharedSignal, SignalId};
use crate::text::parse_matrix;
use crate::verify::verify;

/// Container whose definitions have resolved paths.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundContainer {
    pub name: String,
    pub direction: Direction,
    pub signals: Vec<SignalDefinition>,
}

/// Result of binding one module.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundGam {
    pub name: String,
    pub states: Vec<String>,
    pub containers: Vec<BoundContainer>,
    /// Absolute and relative timing signal definitions.
    pub timing: Vec<SignalDefinition>,
}

impl BoundGam {
    /// Resolved definitions of every container accepting `direction`.
    pub fn signals(&self, direction: Direction) -> impl Iterator<Item = &SignalDefinition> {
        self.containers
            .iter()
            .filter(move |c| c.direction.contains(direction))
            .flat_map(|c| c.signals.iter())
    }
}

/// Bind every signal of `gam` into `namespace`.
///
/// Existing shared signals gain `gam` as consumer (input containers) and/or
/// producer (output containers) in each of its states; missing ones are
/// created. Structured definitions are verified against `registry` first.
/// Two timing signals are added under `GAM_Times.<gam>`.
pub fn bind(
    namespace: &mut DataSourceContainer,
    gam: &Gam,
    registry: &IntrospectionRegistry,
) -> SignalResult<BoundGam> {
    if gam.name.is_empty() {
        error!("Cannot bind a module without a name");
        return Err(SignalError::InvalidDefinition {
            signal: String::new(),
            reason: "module name cannot be empty".to_string(),
        });
    }
    namespace.register_module(&gam.name)?;

    let mut containers = Vec::with_capacity(gam.containers.len());
    for container in &gam.containers {
        containers.push(bind_container(namespace, gam, container, registry)?);
    }

    let timing = timing_definitions(&gam.name);
    for definition in &timing {
        let id = bind_leaf(namespace, gam, definition, &definition.path, Direction::empty())?;
        if let Some(signal) = namespace.signal_mut(id) {
            signal.supported = BrokerKinds::INPUT_READER;
        }
    }

    debug!(module = %gam.name, containers = containers.len(), "Module bound");
    Ok(BoundGam {
        name: gam.name.clone(),
        states: gam.states.clone(),
        containers,
        timing,
    })
}

/// `<gam>AbsoluteUsecTime` and `<gam>RelativeUsecTime`.
pub fn timing_definitions(gam: &str) -> Vec<SignalDefinition> {
    [ABSOLUTE_TIME_SIGNAL, RELATIVE_TIME_SIGNAL]
        .iter()
        .map(|suffix| {
            SignalDefinition::leaf(&format!("{gam}{suffix}"), TIME_SIGNAL_TYPE)
                .with_path(&format!("{GAM_TIMES_GROUP}.{gam}.{suffix}"))
                .with_default("0")
                .into_final()
        })
        .collect()
}

fn bind_container(
    namespace: &mut DataSourceContainer,
    gam: &Gam,
    container: &SignalsContainer,
    registry: &IntrospectionRegistry,
) -> SignalResult<BoundContainer> {
    let mut signals = Vec::with_capacity(container.signals.len());
    for definition in &container.signals {
        verify(definition, registry)?;
        signals.push(resolve(namespace, gam, definition, "", container.direction)?);
    }
    Ok(BoundContainer {
        name: container.name.clone(),
        direction: container.direction,
        signals,
    })
}

/// Walk a definition in pre-order, returning a copy with paths resolved.
fn resolve(
    namespace: &mut DataSourceContainer,
    gam: &Gam,
    definition: &SignalDefinition,
    prefix: &str,
    direction: Direction,
) -> SignalResult<SignalDefinition> {
    let path = definition.resolved_path(prefix);
    let mut resolved = definition.clone();
    resolved.path = path.clone();

    if !definition.is_leaf() {
        definition.validate()?;
        let child_prefix = format!("{path}{PATH_SEPARATOR}");
        let mut children = Vec::with_capacity(definition.children().len());
        for child in definition.children() {
            children.push(resolve(namespace, gam, child, &child_prefix, direction)?);
        }
        if let Some(slot) = resolved.children_mut() {
            *slot = children;
        }
        return Ok(resolved);
    }

    bind_leaf(namespace, gam, definition, &path, direction)?;
    Ok(resolved)
}

fn bind_leaf(
    namespace: &mut DataSourceContainer,
    gam: &Gam,
    definition: &SignalDefinition,
    path: &str,
    direction: Direction,
) -> SignalResult<SignalId> {
    let required = required_elements(definition)?;

    let id = match namespace.find(path) {
        Some(id) => {
            let Some(signal) = namespace.signal_mut(id) else {
                return Err(SignalError::SignalNotFound {
                    path: path.to_string(),
                });
            };
            configure_existing(signal, definition, required)?;
            debug!(module = %gam.name, signal = %definition.name, path, "Bound to existing shared signal");
            id
        }
        None => {
            if definition.is_sampled() {
                error!(signal = %definition.name, path, "Sampled signal must read an existing shared signal");
                return Err(SignalError::SampledSignalNotLinked {
                    signal: definition.name.clone(),
                    path: path.to_string(),
                });
            }
            let name = path.rsplit(PATH_SEPARATOR).next().unwrap_or(path);
            let signal = SharedSignal::new(name, path, &definition.type_name)
                .with_elements(required)
                .with_default(&definition.default_value);
            let id = namespace.insert_signal(signal)?;
            debug!(module = %gam.name, signal = %definition.name, path, "Created shared signal");
            id
        }
    };

    if let Some(signal) = namespace.signal_mut(id) {
        signal.register(&gam.name, &gam.states, direction);
    }
    Ok(id)
}

fn configure_existing(
    signal: &mut SharedSignal,
    definition: &SignalDefinition,
    required: u32,
) -> SignalResult<()> {
    if definition.type_name.is_empty() {
        return Err(SignalError::EmptyType {
            signal: definition.name.clone(),
        });
    }
    if signal.type_name.is_empty() {
        signal.type_name = definition.type_name.clone();
    } else if signal.type_name != definition.type_name {
        error!(
            path = %signal.path,
            existing = %signal.type_name,
            requested = %definition.type_name,
            "Type conflict"
        );
        return Err(SignalError::TypeConflict {
            path: signal.path.clone(),
            existing: signal.type_name.clone(),
            requested: definition.type_name.clone(),
        });
    }

    if !definition.default_value.is_empty() {
        if signal.default_value.is_empty() {
            signal.default_value = definition.default_value.clone();
        } else if signal.default_value != definition.default_value {
            warn!(
                path = %signal.path,
                kept = %signal.default_value,
                ignored = %definition.default_value,
                "Conflicting default values, keeping the first one"
            );
        }
    }

    signal.elements = signal.elements.max(required);
    Ok(())
}

/// Elements a binding needs: the declared count or past the last block.
fn required_elements(definition: &SignalDefinition) -> SignalResult<u32> {
    let declared = definition.shape()?.element_count();
    if definition.operation.trim().is_empty() {
        return Ok(declared);
    }
    let blocks = parse_matrix::<BLOCK_COLUMNS>(&definition.operation).map_err(|reason| {
        error!(signal = %definition.name, %reason, "Malformed operation");
        SignalError::MalformedOperation {
            signal: definition.name.clone(),
            reason,
        }
    })?;
    let past_end = blocks
        .iter()
        .map(|[_, end]| end.saturating_add(1))
        .max()
        .unwrap_or(declared);
    Ok(declared.max(past_end))
}
