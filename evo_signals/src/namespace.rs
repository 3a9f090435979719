//! Shared signal namespace.
//!
//! The [`DataSourceContainer`] owns every [`SharedSignal`] in an arena
//! (addressed by [`SignalId`]) and a tree of named groups ([`DataSource`])
//! mapping dot paths onto arena ids. Storage is allocated once, after all
//! modules are bound, and double buffered: each signal has two physical
//! storages and two logical slots pointing into them.
//!
//! ```text
//!  DDB1 ─┬─ X ............ SignalId(0)
//!        └─ Motor ─┬─ Pos  SignalId(1)
//!                  └─ Vel  SignalId(2)
//!  GAM_Times ─ Pid ─┬─ AbsoluteUsecTime
//!                   └─ RelativeUsecTime
//! ```

use bitflags::bitflags;
use serde::Serialize;
use tracing::{debug, error, trace, warn};

use crate::consts::{BUFFER_COUNT, DEFAULT_NUMBER_OF_SAMPLES, GAM_TIMES_GROUP, PATH_SEPARATOR};
use crate::definition::Direction;
use crate::error::{SignalError, SignalResult};
use crate::introspection::IntrospectionRegistry;
use crate::state::RealTimeStateInfo;

bitflags! {
    /// Broker kinds a shared signal can be attached to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BrokerKinds: u8 {
        /// Copies shared memory into a module.
        const INPUT_READER  = 0x01;
        /// Copies module memory into shared memory.
        const OUTPUT_WRITER = 0x02;
    }
}

impl Default for BrokerKinds {
    fn default() -> Self {
        Self::all()
    }
}

/// Index of a shared signal in the namespace arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SignalId(pub usize);

// ─── Shared signal ──────────────────────────────────────────────────

/// Producers and consumers of a signal in one real-time state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StateRecord {
    pub state: String,
    pub producers: Vec<String>,
    pub consumers: Vec<String>,
}

/// Namespace-side storage cell of one signal.
#[derive(Debug, Clone)]
pub struct SharedSignal {
    pub name: String,
    pub path: String,
    /// Empty until the first binding sets it.
    pub type_name: String,
    /// Elements per sample. 0 until declared or bound.
    pub elements: u32,
    /// Ring depth.
    pub number_of_samples: u32,
    pub default_value: String,
    pub supported: BrokerKinds,
    records: Vec<StateRecord>,
    storage: Option<[Vec<u8>; BUFFER_COUNT]>,
    /// Physical storage behind each logical slot.
    used: [usize; BUFFER_COUNT],
}

impl SharedSignal {
    pub fn new(name: &str, path: &str, type_name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            type_name: type_name.to_string(),
            elements: 0,
            number_of_samples: DEFAULT_NUMBER_OF_SAMPLES,
            default_value: String::new(),
            supported: BrokerKinds::default(),
            records: Vec::new(),
            storage: None,
            used: [0, 1],
        }
    }

    pub fn with_elements(mut self, elements: u32) -> Self {
        self.elements = elements;
        self
    }

    pub fn with_samples(mut self, samples: u32) -> Self {
        self.number_of_samples = samples.max(1);
        self
    }

    pub fn with_default(mut self, value: &str) -> Self {
        self.default_value = value.to_string();
        self
    }

    /// Register `module` in every state of `states` according to `direction`.
    pub fn register(&mut self, module: &str, states: &[String], direction: Direction) {
        if direction.is_empty() {
            return;
        }
        for state in states {
            let index = match self.records.iter().position(|r| &r.state == state) {
                Some(i) => i,
                None => {
                    self.records.push(StateRecord {
                        state: state.clone(),
                        ..StateRecord::default()
                    });
                    self.records.len() - 1
                }
            };
            let record = &mut self.records[index];
            if direction.contains(Direction::INPUT) && !record.consumers.iter().any(|m| m == module) {
                record.consumers.push(module.to_string());
            }
            if direction.contains(Direction::OUTPUT) && !record.producers.iter().any(|m| m == module) {
                record.producers.push(module.to_string());
            }
        }
    }

    pub fn records(&self) -> &[StateRecord] {
        &self.records
    }

    pub fn record(&self, state: &str) -> Option<&StateRecord> {
        self.records.iter().find(|r| r.state == state)
    }

    /// `true` if any module produces or consumes the signal in `state`.
    pub fn is_used_in(&self, state: &str) -> bool {
        self.record(state)
            .is_some_and(|r| !r.producers.is_empty() || !r.consumers.is_empty())
    }

    /// Bytes of one sample.
    pub fn sample_size(&self, registry: &IntrospectionRegistry) -> SignalResult<usize> {
        Ok(registry.type_size(&self.type_name)? as usize * self.elements.max(1) as usize)
    }

    /// Bytes of one slot (all samples).
    pub fn slot_size(&self, registry: &IntrospectionRegistry) -> SignalResult<usize> {
        Ok(self.sample_size(registry)? * self.number_of_samples as usize)
    }

    #[inline]
    pub fn is_allocated(&self) -> bool {
        self.storage.is_some()
    }

    /// Reserve both storages and validate the default value.
    pub fn allocate(&mut self, registry: &IntrospectionRegistry) -> SignalResult<()> {
        if self.type_name.is_empty() {
            error!(path = %self.path, "Shared signal has no type");
            return Err(SignalError::EmptyType {
                signal: self.path.clone(),
            });
        }
        self.elements = self.elements.max(1);
        let size = self.slot_size(registry)?;
        if !self.default_value.is_empty() {
            let mut scratch = vec![0u8; self.sample_size(registry)?];
            self.encode_default(registry, &mut scratch)?;
        }
        self.storage = Some([vec![0u8; size], vec![0u8; size]]);
        self.used = [0, 1];
        trace!(path = %self.path, bytes = size, "Allocated shared signal");
        Ok(())
    }

    fn encode_default(&self, registry: &IntrospectionRegistry, sample: &mut [u8]) -> SignalResult<()> {
        registry
            .encode_default(&self.type_name, self.elements, &self.default_value, sample)
            .map_err(|reason| {
                error!(path = %self.path, value = %self.default_value, %reason, "Invalid default value");
                SignalError::InvalidDefault {
                    signal: self.path.clone(),
                    value: self.default_value.clone(),
                    reason,
                }
            })
    }

    /// Physical storage index behind logical `slot`.
    #[inline]
    pub fn storage_of(&self, slot: usize) -> usize {
        self.used[slot % BUFFER_COUNT]
    }

    /// Contents of logical `slot`.
    pub fn slot(&self, slot: usize) -> SignalResult<&[u8]> {
        let index = self.storage_of(slot);
        self.storage
            .as_ref()
            .map(|s| s[index].as_slice())
            .ok_or_else(|| SignalError::NotAllocated {
                path: self.path.clone(),
            })
    }

    pub fn slot_mut(&mut self, slot: usize) -> SignalResult<&mut [u8]> {
        let index = self.storage_of(slot);
        let path = &self.path;
        self.storage
            .as_mut()
            .map(|s| s[index].as_mut_slice())
            .ok_or_else(|| SignalError::NotAllocated { path: path.clone() })
    }

    /// Point the next slot at the storage the next state must see.
    ///
    /// The next slot aliases the active storage unless the signal becomes
    /// live in the next state and has a default, in which case the default
    /// is written into the storage the active slot does not use.
    pub fn prepare_next_state(
        &mut self,
        info: &RealTimeStateInfo,
        registry: &IntrospectionRegistry,
    ) -> SignalResult<()> {
        if self.storage.is_none() {
            return Err(SignalError::NotAllocated {
                path: self.path.clone(),
            });
        }
        let active = info.active_buffer % BUFFER_COUNT;
        let next = info.next_buffer();
        self.used[next] = self.used[active];

        let entering = !self.is_used_in(&info.current_state) && self.is_used_in(&info.next_state);
        if !entering {
            return Ok(());
        }
        if self.default_value.is_empty() {
            warn!(
                path = %self.path,
                state = %info.next_state,
                "Signal enters use without a default value, keeping its previous contents"
            );
            return Ok(());
        }

        let sample_size = self.sample_size(registry)?;
        let mut sample = vec![0u8; sample_size];
        self.encode_default(registry, &mut sample)?;

        let target = BUFFER_COUNT - 1 - self.used[active];
        if let Some(storage) = self.storage.as_mut() {
            for chunk in storage[target].chunks_exact_mut(sample_size) {
                chunk.copy_from_slice(&sample);
            }
        }
        self.used[next] = target;
        debug!(path = %self.path, storage = target, "Default value written for the next state");
        Ok(())
    }
}

// ─── Namespace tree ─────────────────────────────────────────────────

/// Child of a namespace node.
#[derive(Debug, Clone)]
pub enum NodeEntry {
    Node(NamespaceNode),
    Signal { name: String, id: SignalId },
}

impl NodeEntry {
    pub fn name(&self) -> &str {
        match self {
            Self::Node(n) => &n.name,
            Self::Signal { name, .. } => name,
        }
    }
}

/// Intermediate level of a dot path.
#[derive(Debug, Clone, Default)]
pub struct NamespaceNode {
    pub name: String,
    pub entries: Vec<NodeEntry>,
}

impl NamespaceNode {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: Vec::new(),
        }
    }

    fn entry(&self, name: &str) -> Option<&NodeEntry> {
        self.entries.iter().find(|e| e.name() == name)
    }

    fn child_node_mut(&mut self, name: &str, path: &str) -> SignalResult<&mut NamespaceNode> {
        let index = match self.entries.iter().position(|e| e.name() == name) {
            Some(i) => i,
            None => {
                self.entries.push(NodeEntry::Node(NamespaceNode::new(name)));
                self.entries.len() - 1
            }
        };
        match &mut self.entries[index] {
            NodeEntry::Node(node) => Ok(node),
            NodeEntry::Signal { .. } => Err(SignalError::PathConflict {
                path: path.to_string(),
            }),
        }
    }

    fn collect_ids(&self, out: &mut Vec<SignalId>) {
        for entry in &self.entries {
            match entry {
                NodeEntry::Node(node) => node.collect_ids(out),
                NodeEntry::Signal { id, .. } => out.push(*id),
            }
        }
    }
}

/// Named group of shared signals.
#[derive(Debug, Clone)]
pub struct DataSource {
    pub root: NamespaceNode,
    /// Reserved group holding the timing signals.
    pub timing: bool,
}

impl DataSource {
    pub fn name(&self) -> &str {
        &self.root.name
    }

    /// Signal ids in declaration order.
    pub fn signal_ids(&self) -> Vec<SignalId> {
        let mut ids = Vec::new();
        self.root.collect_ids(&mut ids);
        ids
    }
}

// ─── Container ──────────────────────────────────────────────────────

/// Root of the shared namespace.
#[derive(Debug, Clone, Default)]
pub struct DataSourceContainer {
    groups: Vec<DataSource>,
    signals: Vec<SharedSignal>,
    modules: Vec<String>,
    allocated: bool,
}

impl DataSourceContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty group.
    pub fn add_data_source(&mut self, name: &str) -> SignalResult<()> {
        if name.is_empty() || name.contains(PATH_SEPARATOR) || self.data_source(name).is_some() {
            error!(group = name, "Invalid or duplicate data source name");
            return Err(SignalError::PathConflict {
                path: name.to_string(),
            });
        }
        self.groups.push(DataSource {
            root: NamespaceNode::new(name),
            timing: name == GAM_TIMES_GROUP,
        });
        Ok(())
    }

    pub fn data_source(&self, name: &str) -> Option<&DataSource> {
        self.groups.iter().find(|g| g.name() == name)
    }

    pub fn data_sources(&self) -> &[DataSource] {
        &self.groups
    }

    /// Resolve a dot path to a shared signal.
    pub fn find(&self, path: &str) -> Option<SignalId> {
        let mut segments = path.split(PATH_SEPARATOR);
        let group = self.data_source(segments.next()?)?;
        let mut node = &group.root;
        let mut segments = segments.peekable();
        while let Some(segment) = segments.next() {
            match (node.entry(segment)?, segments.peek()) {
                (NodeEntry::Node(child), Some(_)) => node = child,
                (NodeEntry::Signal { id, .. }, None) => return Some(*id),
                _ => return None,
            }
        }
        None
    }

    /// Insert a new shared signal at `signal.path`.
    ///
    /// The group must exist, except for the reserved timing group which is
    /// created on demand. Intermediate nodes are created as needed.
    pub fn insert_signal(&mut self, signal: SharedSignal) -> SignalResult<SignalId> {
        let path = signal.path.clone();
        let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
        let (group, rest) = match segments.split_first() {
            Some((g, rest)) if !rest.is_empty() && segments.iter().all(|s| !s.is_empty()) => {
                (*g, rest)
            }
            _ => {
                error!(path = %path, "Malformed shared signal path");
                return Err(SignalError::PathConflict { path });
            }
        };

        if self.data_source(group).is_none() {
            if group == GAM_TIMES_GROUP {
                debug!("Creating the {GAM_TIMES_GROUP} data source");
                self.add_data_source(group)?;
            } else {
                error!(group, path = %path, "Data source not found");
                return Err(SignalError::DataSourceNotFound {
                    group: group.to_string(),
                    path,
                });
            }
        }

        let id = SignalId(self.signals.len());
        {
            let Some(ds) = self.groups.iter_mut().find(|g| g.root.name == group) else {
                return Err(SignalError::DataSourceNotFound {
                    group: group.to_string(),
                    path,
                });
            };
            let (leaf, parents) = match rest.split_last() {
                Some(split) => split,
                None => return Err(SignalError::PathConflict { path }),
            };
            let mut node = &mut ds.root;
            for segment in parents {
                node = node.child_node_mut(segment, &path)?;
            }
            if node.entry(leaf).is_some() {
                error!(path = %path, "Path already taken");
                return Err(SignalError::PathConflict { path });
            }
            node.entries.push(NodeEntry::Signal {
                name: leaf.to_string(),
                id,
            });
        }
        self.signals.push(signal);
        Ok(id)
    }

    pub fn signal(&self, id: SignalId) -> Option<&SharedSignal> {
        self.signals.get(id.0)
    }

    pub fn signal_mut(&mut self, id: SignalId) -> Option<&mut SharedSignal> {
        self.signals.get_mut(id.0)
    }

    pub fn signal_by_path(&self, path: &str) -> SignalResult<&SharedSignal> {
        self.find(path)
            .and_then(|id| self.signal(id))
            .ok_or_else(|| SignalError::SignalNotFound {
                path: path.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// Every signal id, walking the groups in order.
    pub fn signal_ids(&self) -> Vec<SignalId> {
        self.groups.iter().flat_map(DataSource::signal_ids).collect()
    }

    /// Record a bound module; a name can be bound once.
    pub fn register_module(&mut self, name: &str) -> SignalResult<()> {
        if self.modules.iter().any(|m| m == name) {
            error!(module = name, "Module already bound");
            return Err(SignalError::DuplicateModule {
                module: name.to_string(),
            });
        }
        self.modules.push(name.to_string());
        Ok(())
    }

    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    #[inline]
    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    /// Allocate the storage of every shared signal.
    pub fn allocate(&mut self, registry: &IntrospectionRegistry) -> SignalResult<()> {
        for id in self.signal_ids() {
            if let Some(signal) = self.signals.get_mut(id.0) {
                signal.allocate(registry)?;
            }
        }
        self.allocated = true;
        debug!(signals = self.signals.len(), "Namespace allocated");
        Ok(())
    }

    /// Check producer ownership in every state of every signal.
    ///
    /// More than one producer in a state fails; a state without consumers
    /// only warns.
    pub fn verify_namespace(&self) -> SignalResult<()> {
        let mut first_error = None;
        for id in self.signal_ids() {
            let Some(signal) = self.signal(id) else {
                continue;
            };
            for record in signal.records() {
                if record.producers.len() > 1 {
                    error!(
                        path = %signal.path,
                        state = %record.state,
                        producers = ?record.producers,
                        "Multiple producers in one state"
                    );
                    first_error.get_or_insert(SignalError::MultipleProducers {
                        path: signal.path.clone(),
                        state: record.state.clone(),
                        count: record.producers.len(),
                    });
                }
                if record.consumers.is_empty() {
                    warn!(path = %signal.path, state = %record.state, "No consumers");
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Prepare every signal's next buffer slot.
    pub fn prepare_next_state(
        &mut self,
        info: &RealTimeStateInfo,
        registry: &IntrospectionRegistry,
    ) -> SignalResult<()> {
        for signal in &mut self.signals {
            signal.prepare_next_state(info, registry)?;
        }
        Ok(())
    }
}
