//! Real-time application: registry, namespace and modules wired together.
//!
//! Configuration runs once, in this order:
//!
//! 1. merge each module with its template
//! 2. verify and bind every module (declaration order)
//! 3. verify producer ownership in the namespace
//! 4. allocate shared storage
//! 5. build and finalise one input and one output broker per module
//!
//! State transitions are then `prepare_next_state()` followed by
//! `change_state()`.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::binding::{BoundGam, bind};
use crate::broker::{Block, BrokerKind, MemoryMapBroker, SampleWindow};
use crate::config::ApplicationConfig;
use crate::definition::{Direction, Gam, SignalDefinition};
use crate::error::{SignalError, SignalResult};
use crate::introspection::IntrospectionRegistry;
use crate::namespace::{DataSourceContainer, StateRecord};
use crate::state::RealTimeStateInfo;

/// Brokers of one module. A direction without signals has no broker.
#[derive(Debug, Clone)]
pub struct GamBrokers {
    pub gam: String,
    pub input: Option<MemoryMapBroker>,
    pub output: Option<MemoryMapBroker>,
}

#[derive(Debug, Clone)]
pub struct RealTimeApplication {
    name: String,
    registry: IntrospectionRegistry,
    namespace: DataSourceContainer,
    gams: Vec<Gam>,
    templates: BTreeMap<String, Gam>,
    bound: Vec<BoundGam>,
    brokers: Vec<GamBrokers>,
    state: RealTimeStateInfo,
    configured: bool,
}

impl RealTimeApplication {
    pub fn new(
        name: &str,
        registry: IntrospectionRegistry,
        namespace: DataSourceContainer,
        gams: Vec<Gam>,
    ) -> Self {
        Self {
            name: name.to_string(),
            registry,
            namespace,
            gams,
            templates: BTreeMap::new(),
            bound: Vec::new(),
            brokers: Vec::new(),
            state: RealTimeStateInfo::new(),
            configured: false,
        }
    }

    pub fn with_templates(mut self, templates: BTreeMap<String, Gam>) -> Self {
        self.templates = templates;
        self
    }

    /// Build an unconfigured application from a validated file.
    pub fn from_config(config: &ApplicationConfig) -> SignalResult<Self> {
        config.validate()?;
        Ok(Self::new(
            &config.shared.service_name,
            config.registry()?,
            config.namespace()?,
            config.gams()?,
        )
        .with_templates(config.templates()?))
    }

    pub fn configure(&mut self) -> SignalResult<()> {
        if self.configured {
            return Err(SignalError::AlreadyConfigured);
        }

        for gam in &mut self.gams {
            let Some(name) = gam.template.clone() else {
                continue;
            };
            let Some(template) = self.templates.get(&name) else {
                error!(module = %gam.name, template = %name, "Template not found");
                return Err(SignalError::TemplateNotFound {
                    template: name,
                    module: gam.name.clone(),
                });
            };
            gam.merge_with_local(template)?;
        }

        let mut bound = Vec::with_capacity(self.gams.len());
        for gam in &self.gams {
            bound.push(bind(&mut self.namespace, gam, &self.registry)?);
        }
        self.namespace.verify_namespace()?;
        self.namespace.allocate(&self.registry)?;

        let mut brokers = Vec::with_capacity(bound.len());
        for gam in &bound {
            brokers.push(GamBrokers {
                gam: gam.name.clone(),
                input: self.build_broker(BrokerKind::InputReader, gam.signals(Direction::INPUT))?,
                output: self.build_broker(BrokerKind::OutputWriter, gam.signals(Direction::OUTPUT))?,
            });
        }

        self.bound = bound;
        self.brokers = brokers;
        self.configured = true;
        info!(
            application = %self.name,
            modules = self.gams.len(),
            signals = self.namespace.len(),
            "Application configured"
        );
        Ok(())
    }

    fn build_broker<'a>(
        &self,
        kind: BrokerKind,
        signals: impl Iterator<Item = &'a SignalDefinition>,
    ) -> SignalResult<Option<MemoryMapBroker>> {
        let mut broker = MemoryMapBroker::new(kind);
        for definition in signals {
            broker.add_signal(&self.namespace, &self.registry, definition, None)?;
        }
        if broker.get_number_of_signals() == 0 {
            return Ok(None);
        }
        broker.finalise()?;
        Ok(Some(broker))
    }

    fn ensure_configured(&self) -> SignalResult<()> {
        if self.configured {
            Ok(())
        } else {
            Err(SignalError::NotConfigured)
        }
    }

    /// Prepare the buffers every signal will expose in `next`.
    pub fn prepare_next_state(&mut self, next: &str) -> SignalResult<()> {
        self.ensure_configured()?;
        self.state.next_state = next.to_string();
        self.namespace.prepare_next_state(&self.state, &self.registry)?;
        debug!(from = %self.state.current_state, to = next, "Next state prepared");
        Ok(())
    }

    /// Switch to the prepared state and swap the active buffer.
    pub fn change_state(&mut self) -> SignalResult<()> {
        self.ensure_configured()?;
        self.state.commit();
        info!(
            state = %self.state.current_state,
            active_buffer = self.state.active_buffer,
            "State changed"
        );
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &RealTimeStateInfo {
        &self.state
    }

    pub fn registry(&self) -> &IntrospectionRegistry {
        &self.registry
    }

    pub fn namespace(&self) -> &DataSourceContainer {
        &self.namespace
    }

    pub fn namespace_mut(&mut self) -> &mut DataSourceContainer {
        &mut self.namespace
    }

    pub fn gams(&self) -> &[Gam] {
        &self.gams
    }

    pub fn bound(&self) -> &[BoundGam] {
        &self.bound
    }

    pub fn brokers(&self, gam: &str) -> Option<&GamBrokers> {
        self.brokers.iter().find(|b| b.gam == gam)
    }

    pub fn brokers_mut(&mut self, gam: &str) -> Option<&mut GamBrokers> {
        self.brokers.iter_mut().find(|b| b.gam == gam)
    }

    /// Copy the inputs of `gam` from the active buffer.
    pub fn read_inputs(&mut self, gam: &str) -> SignalResult<()> {
        self.ensure_configured()?;
        let active = self.state.active_buffer;
        let brokers = self
            .brokers
            .iter_mut()
            .find(|b| b.gam == gam)
            .ok_or_else(|| SignalError::ModuleNotFound {
                module: gam.to_string(),
            })?;
        match brokers.input.as_mut() {
            Some(broker) => broker.read(&self.namespace, active),
            None => Ok(()),
        }
    }

    /// Copy the outputs of `gam` into the active buffer.
    pub fn write_outputs(&mut self, gam: &str) -> SignalResult<()> {
        self.ensure_configured()?;
        let active = self.state.active_buffer;
        let brokers = self
            .brokers
            .iter_mut()
            .find(|b| b.gam == gam)
            .ok_or_else(|| SignalError::ModuleNotFound {
                module: gam.to_string(),
            })?;
        match brokers.output.as_mut() {
            Some(broker) => broker.write(&mut self.namespace, active),
            None => Ok(()),
        }
    }

    /// Serialisable description of the whole layout.
    pub fn memory_plan(&self) -> MemoryPlan {
        let signals = self
            .namespace
            .signal_ids()
            .into_iter()
            .filter_map(|id| self.namespace.signal(id))
            .map(|s| SharedSignalPlan {
                path: s.path.clone(),
                type_name: s.type_name.clone(),
                elements: s.elements,
                samples: s.number_of_samples,
                default_value: s.default_value.clone(),
                slot_bytes: s.slot_size(&self.registry).unwrap_or(0),
                storage: [s.storage_of(0), s.storage_of(1)],
                records: s.records().to_vec(),
            })
            .collect();

        let data_sources = self
            .namespace
            .data_sources()
            .iter()
            .map(|ds| DataSourcePlan {
                name: ds.name().to_string(),
                timing: ds.timing,
                signals: ds
                    .signal_ids()
                    .into_iter()
                    .filter_map(|id| self.namespace.signal(id))
                    .map(|s| s.path.clone())
                    .collect(),
            })
            .collect();

        let gams = self
            .brokers
            .iter()
            .map(|b| {
                let bound = self.bound.iter().find(|g| g.name == b.gam);
                GamPlan {
                    name: b.gam.clone(),
                    states: bound.map(|g| g.states.clone()).unwrap_or_default(),
                    timing: bound
                        .map(|g| g.timing.iter().map(|t| t.path.clone()).collect())
                        .unwrap_or_default(),
                    brokers: [b.input.as_ref(), b.output.as_ref()]
                        .into_iter()
                        .flatten()
                        .map(BrokerPlan::from_broker)
                        .collect(),
                }
            })
            .collect();

        MemoryPlan {
            application: self.name.clone(),
            state: self.state.clone(),
            modules: self.namespace.modules().to_vec(),
            data_sources,
            signals,
            gams,
        }
    }
}

// ─── Memory plan ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct MemoryPlan {
    pub application: String,
    pub state: RealTimeStateInfo,
    /// Modules in binding order.
    pub modules: Vec<String>,
    pub data_sources: Vec<DataSourcePlan>,
    pub signals: Vec<SharedSignalPlan>,
    pub gams: Vec<GamPlan>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataSourcePlan {
    pub name: String,
    /// Reserved timing group.
    pub timing: bool,
    /// Signal paths in tree order.
    pub signals: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SharedSignalPlan {
    pub path: String,
    pub type_name: String,
    pub elements: u32,
    pub samples: u32,
    pub default_value: String,
    pub slot_bytes: usize,
    /// Physical storage behind slots 0 and 1.
    pub storage: [usize; 2],
    pub records: Vec<StateRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GamPlan {
    pub name: String,
    pub states: Vec<String>,
    /// Paths of the absolute and relative timing signals.
    pub timing: Vec<String>,
    pub brokers: Vec<BrokerPlan>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrokerPlan {
    pub kind: BrokerKind,
    pub sync: bool,
    pub bytes: usize,
    pub entries: Vec<EntryPlan>,
}

impl BrokerPlan {
    fn from_broker(broker: &MemoryMapBroker) -> Self {
        Self {
            kind: broker.kind(),
            sync: broker.is_sync(),
            bytes: broker.entries().iter().map(|e| e.size).sum(),
            entries: broker
                .entries()
                .iter()
                .enumerate()
                .map(|(index, e)| EntryPlan {
                    index,
                    name: e.name.clone(),
                    path: e.path.clone(),
                    offset: e.offset,
                    size: e.size,
                    elements: e.elements,
                    samples: e.samples,
                    cycles: e.cycles,
                    blocks: e.blocks.clone(),
                    windows: e.windows.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryPlan {
    pub index: usize,
    pub name: String,
    pub path: String,
    pub offset: usize,
    pub size: usize,
    pub elements: u32,
    pub samples: u32,
    pub cycles: u32,
    pub blocks: Vec<Block>,
    pub windows: Vec<SampleWindow>,
}

impl fmt::Display for MemoryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Application {}", self.application)?;
        if !self.state.current_state.is_empty() {
            writeln!(
                f,
                "State {} (active buffer {})",
                self.state.current_state, self.state.active_buffer
            )?;
        }
        for ds in &self.data_sources {
            writeln!(
                f,
                "Data source {}{} signals={}",
                ds.name,
                if ds.timing { " (timing)" } else { "" },
                ds.signals.len()
            )?;
        }
        writeln!(f, "\nShared signals:")?;
        for s in &self.signals {
            writeln!(
                f,
                "  {:<40} {:<10} elements={:<4} samples={:<4} bytes={:<6} storage={:?}",
                s.path, s.type_name, s.elements, s.samples, s.slot_bytes, s.storage
            )?;
        }
        for gam in &self.gams {
            writeln!(f, "\nModule {} states={:?}", gam.name, gam.states)?;
            for broker in &gam.brokers {
                writeln!(
                    f,
                    "  {} bytes={} sync={}",
                    broker.kind, broker.bytes, broker.sync
                )?;
                for e in &broker.entries {
                    writeln!(
                        f,
                        "    [{}] {:<30} -> {:<40} offset={:<6} size={:<6} cycles={} samples={}",
                        e.index, e.name, e.path, e.offset, e.size, e.cycles, e.samples
                    )?;
                }
            }
        }
        Ok(())
    }
}
