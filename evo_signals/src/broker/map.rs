//! Memory-mapped broker.
//!
//! Compiles a module's bound signals into a flat, statically addressed
//! layout. Life cycle:
//!
//! ```text
//! new() ── add_signal()* ── finalise() ── get_signal()/read()/write()
//!             Building         │            Finalised
//! ```
//!
//! Each leaf becomes one [`BrokerEntry`]; its module-side footprint is
//! `typeSize × cycles × samples × elements`, laid out as `cycles` frames of
//! `samples` consecutive samples.

use core::fmt;

use serde::Serialize;
use tracing::{debug, error, trace};

use super::memory::{AreaId, LOCAL_AREA, MemoryArea};
use super::selection::{self, Block, SampleWindow};
use crate::consts::PATH_SEPARATOR;
use crate::definition::SignalDefinition;
use crate::error::{SignalError, SignalResult};
use crate::introspection::IntrospectionRegistry;
use crate::namespace::{BrokerKinds, DataSourceContainer, SignalId};

// ─── Kinds and locations ────────────────────────────────────────────

/// Copy direction of a broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BrokerKind {
    /// Shared signal → module.
    InputReader,
    /// Module → shared signal.
    OutputWriter,
}

impl BrokerKind {
    pub const fn flag(self) -> BrokerKinds {
        match self {
            Self::InputReader => BrokerKinds::INPUT_READER,
            Self::OutputWriter => BrokerKinds::OUTPUT_WRITER,
        }
    }
}

impl fmt::Display for BrokerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InputReader => "InputReader",
            Self::OutputWriter => "OutputWriter",
        })
    }
}

/// Externally owned destination of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalRegion {
    /// Area returned by [`MemoryMapBroker::attach_area`].
    pub area: AreaId,
    /// Offset of the signal inside that area.
    pub offset: usize,
}

/// Resolved module-side address of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SignalLocation {
    pub area: AreaId,
    pub offset: usize,
    pub size: usize,
}

// ─── Entry ──────────────────────────────────────────────────────────

/// One compiled leaf signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrokerEntry {
    /// Dot-joined definition names from the top-level signal.
    pub name: String,
    pub path: String,
    pub signal: SignalId,
    pub type_name: String,
    pub type_size: usize,
    pub area: AreaId,
    pub offset: usize,
    /// Whole footprint in bytes.
    pub size: usize,
    /// Module-side elements per sample.
    pub elements: u32,
    /// Samples per frame.
    pub samples: u32,
    /// Frames, at least 1.
    pub cycles: u32,
    pub sync: bool,
    pub windows: Vec<SampleWindow>,
    pub blocks: Vec<Block>,
    /// Bytes of one sample of the shared signal.
    pub sample_stride: usize,
    /// Bytes of one frame.
    pub frame_size: usize,
}

impl BrokerEntry {
    #[inline]
    pub fn location(&self) -> SignalLocation {
        SignalLocation {
            area: self.area,
            offset: self.offset,
            size: self.size,
        }
    }

    /// Visit every `(module_offset, shared_offset, len)` copy of `frame`.
    fn for_each_copy(
        &self,
        frame: u32,
        mut copy: impl FnMut(usize, usize, usize) -> SignalResult<()>,
    ) -> SignalResult<()> {
        let module_sample = self.type_size * self.elements as usize;
        let mut module = self.offset + frame as usize * self.frame_size;
        for window in &self.windows {
            for sample in window.begin..window.begin + window.count {
                let shared = sample as usize * self.sample_stride;
                let mut cursor = module;
                for block in &self.blocks {
                    copy(cursor, shared + block.begin_byte, block.size)?;
                    cursor += block.size;
                }
                module += module_sample;
            }
        }
        Ok(())
    }

    fn region_error(&self, offset: usize, size: usize, area_size: usize) -> SignalError {
        error!(signal = %self.name, offset, size, area_size, "Region outside memory area");
        SignalError::InvalidRegion {
            signal: self.name.clone(),
            offset,
            size,
            area_size,
        }
    }
}

// ─── Broker ─────────────────────────────────────────────────────────

/// Flat memory image of one module's signals in one direction.
#[derive(Debug, Clone)]
pub struct MemoryMapBroker {
    kind: BrokerKind,
    entries: Vec<BrokerEntry>,
    /// `areas[0]` is the local area, the rest are attached.
    areas: Vec<MemoryArea>,
    finalised: bool,
    synchronised: bool,
    cycle_counter: u32,
}

impl MemoryMapBroker {
    pub fn new(kind: BrokerKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
            areas: vec![MemoryArea::new()],
            finalised: false,
            synchronised: false,
            cycle_counter: 0,
        }
    }

    #[inline]
    pub fn kind(&self) -> BrokerKind {
        self.kind
    }

    #[inline]
    pub fn is_finalised(&self) -> bool {
        self.finalised
    }

    /// `true` once a signal with `cycles > 0` was added.
    #[inline]
    pub fn is_sync(&self) -> bool {
        self.synchronised
    }

    #[inline]
    pub fn get_number_of_signals(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[BrokerEntry] {
        &self.entries
    }

    /// Attach an externally laid out area.
    pub fn attach_area(&mut self, area: MemoryArea) -> SignalResult<AreaId> {
        if self.finalised {
            return Err(SignalError::BrokerFinalised);
        }
        self.areas.push(area);
        Ok(AreaId(self.areas.len() - 1))
    }

    pub fn area(&self, id: AreaId) -> Option<&MemoryArea> {
        self.areas.get(id.0)
    }

    pub fn area_mut(&mut self, id: AreaId) -> Option<&mut MemoryArea> {
        self.areas.get_mut(id.0)
    }

    /// Add a bound signal (and every leaf below it).
    ///
    /// Leaf paths resolve as in binding: an explicit path, or the parent's
    /// path followed by the leaf name.
    /// Leaves are placed in the local area unless `external` is given.
    /// On failure no entry of `definition` is kept and earlier entries are
    /// untouched.
    pub fn add_signal(
        &mut self,
        namespace: &DataSourceContainer,
        registry: &IntrospectionRegistry,
        definition: &SignalDefinition,
        external: Option<ExternalRegion>,
    ) -> SignalResult<()> {
        if self.finalised {
            error!(signal = %definition.name, "Broker already finalised");
            return Err(SignalError::BrokerFinalised);
        }
        let (area, base) = match external {
            Some(region) if region.area != LOCAL_AREA && region.area.0 < self.areas.len() => {
                (region.area, region.offset)
            }
            Some(region) => return Err(SignalError::UnknownArea { area: region.area.0 }),
            None => (LOCAL_AREA, self.areas[LOCAL_AREA.0].reserved()),
        };

        let mut pending = Vec::new();
        let mut sync = self.synchronised;
        let footprint = self.compile(
            namespace,
            registry,
            definition,
            &definition.name,
            "",
            base,
            None,
            &mut pending,
            &mut sync,
        )?;

        if external.is_none() {
            self.areas[LOCAL_AREA.0].reserve(footprint);
        }
        for entry in &mut pending {
            entry.area = area;
            trace!(
                signal = %entry.name,
                offset = entry.offset,
                size = entry.size,
                "Broker entry"
            );
        }
        self.synchronised = sync;
        self.entries.extend(pending);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn compile(
        &self,
        namespace: &DataSourceContainer,
        registry: &IntrospectionRegistry,
        definition: &SignalDefinition,
        qualified: &str,
        prefix: &str,
        offset: usize,
        member_span: Option<usize>,
        pending: &mut Vec<BrokerEntry>,
        sync: &mut bool,
    ) -> SignalResult<usize> {
        let path = definition.resolved_path(prefix);
        if definition.is_leaf() {
            let entry = self.leaf_entry(namespace, registry, definition, qualified, &path, offset, sync)?;
            if let Some(span) = member_span.filter(|&span| span != entry.size) {
                error!(signal = %qualified, span, size = entry.size, "Member footprint differs from its layout");
                return Err(SignalError::InvalidDefinition {
                    signal: qualified.to_string(),
                    reason: format!(
                        "structure member needs {span} bytes but selects {}",
                        entry.size
                    ),
                });
            }
            let size = entry.size;
            pending.push(entry);
            return Ok(size);
        }

        if !definition.shape()?.is_scalar() {
            return Err(SignalError::MultiDimensionalStructure {
                signal: qualified.to_string(),
                type_name: definition.type_name.clone(),
            });
        }
        let class = registry
            .find(&definition.type_name)
            .ok_or_else(|| SignalError::TypeNotRegistered {
                type_name: definition.type_name.clone(),
            })?;
        let members = class
            .members
            .as_ref()
            .ok_or_else(|| SignalError::NotIntrospectable {
                type_name: definition.type_name.clone(),
            })?;
        let child_prefix = format!("{path}{PATH_SEPARATOR}");
        for member in members {
            let child = definition
                .find_child(&member.name)
                .ok_or_else(|| SignalError::MemberNotFound {
                    member: member.name.clone(),
                    signal: qualified.to_string(),
                    type_name: definition.type_name.clone(),
                })?;
            let span = registry.type_size(&member.type_name)? as usize
                * member.dimensions.element_count() as usize;
            self.compile(
                namespace,
                registry,
                child,
                &format!("{qualified}.{}", child.name),
                &child_prefix,
                offset + member.byte_offset as usize,
                Some(span),
                pending,
                sync,
            )?;
        }
        Ok(registry.type_size(&definition.type_name)? as usize)
    }

    #[allow(clippy::too_many_arguments)]
    fn leaf_entry(
        &self,
        namespace: &DataSourceContainer,
        registry: &IntrospectionRegistry,
        definition: &SignalDefinition,
        qualified: &str,
        path: &str,
        offset: usize,
        sync: &mut bool,
    ) -> SignalResult<BrokerEntry> {
        let Some(id) = namespace.find(path) else {
            error!(signal = %qualified, path, "Shared signal not bound");
            return Err(SignalError::SignalNotFound {
                path: path.to_string(),
            });
        };
        let shared = namespace
            .signal(id)
            .ok_or_else(|| SignalError::SignalNotFound {
                path: path.to_string(),
            })?;

        if !shared.supported.contains(self.kind.flag()) {
            error!(path, kind = %self.kind, "Broker kind not supported by the shared signal");
            return Err(SignalError::UnsupportedBroker {
                path: path.to_string(),
                kind: self.kind.to_string(),
            });
        }
        if shared.type_name != definition.type_name {
            error!(signal = %qualified, path, existing = %shared.type_name, requested = %definition.type_name, "Type mismatch");
            return Err(SignalError::BrokerTypeMismatch {
                signal: qualified.to_string(),
                path: path.to_string(),
                existing: shared.type_name.clone(),
                requested: definition.type_name.clone(),
            });
        }

        let type_size = registry.type_size(&definition.type_name)? as usize;
        let elements = definition.shape()?.element_count();
        let ds_elements = shared.elements.max(1);
        let number_of_samples = shared.number_of_samples.max(1);

        let windows = match definition.samples() {
            Some(text) => {
                let rows = selection::parse_samples(qualified, text)?;
                selection::sample_windows(qualified, &rows, number_of_samples)?
            }
            None => vec![selection::latest_sample(number_of_samples)],
        };
        let samples: u32 = windows.iter().map(|w| w.count).sum();

        let blocks = if definition.operation.trim().is_empty() {
            vec![selection::full_block(qualified, type_size, elements, ds_elements)?]
        } else {
            let rows = selection::parse_operation(qualified, &definition.operation)?;
            selection::blocks(qualified, &rows, type_size, elements, ds_elements)?
        };

        let is_sync = definition.cycles > 0;
        if is_sync {
            if *sync {
                error!(signal = %qualified, "Broker already has a sync signal");
                return Err(SignalError::DuplicateSync {
                    signal: qualified.to_string(),
                });
            }
            *sync = true;
        }
        let cycles = definition.cycles.max(1);
        let frame_size = type_size * samples as usize * elements as usize;

        Ok(BrokerEntry {
            name: qualified.to_string(),
            path: path.to_string(),
            signal: id,
            type_name: definition.type_name.clone(),
            type_size,
            area: LOCAL_AREA,
            offset,
            size: frame_size * cycles as usize,
            elements,
            samples,
            cycles,
            sync: is_sync,
            windows,
            blocks,
            sample_stride: type_size * ds_elements as usize,
            frame_size,
        })
    }

    /// Allocate the local area and check every entry lies inside its area.
    pub fn finalise(&mut self) -> SignalResult<()> {
        if self.finalised {
            return Err(SignalError::BrokerFinalised);
        }
        self.areas[LOCAL_AREA.0].allocate();
        for entry in &self.entries {
            let area = self
                .areas
                .get(entry.area.0)
                .ok_or(SignalError::UnknownArea { area: entry.area.0 })?;
            if area.region(entry.offset, entry.size).is_none() {
                return Err(entry.region_error(entry.offset, entry.size, area.len()));
            }
        }
        self.finalised = true;
        debug!(
            kind = %self.kind,
            signals = self.entries.len(),
            bytes = self.areas[LOCAL_AREA.0].len(),
            sync = self.synchronised,
            "Broker finalised"
        );
        Ok(())
    }

    fn ensure_finalised(&self) -> SignalResult<()> {
        if self.finalised {
            Ok(())
        } else {
            Err(SignalError::BrokerNotFinalised)
        }
    }

    fn entry(&self, index: usize) -> SignalResult<&BrokerEntry> {
        self.ensure_finalised()?;
        self.entries.get(index).ok_or(SignalError::InvalidIndex {
            index,
            count: self.entries.len(),
        })
    }

    pub fn get_signal(&self, index: usize) -> SignalResult<SignalLocation> {
        self.entry(index).map(BrokerEntry::location)
    }

    /// Location and index of the entry with qualified name `name`.
    pub fn get_signal_by_name(&self, name: &str) -> SignalResult<(SignalLocation, usize)> {
        self.ensure_finalised()?;
        self.entries
            .iter()
            .position(|e| e.name == name)
            .map(|i| (self.entries[i].location(), i))
            .ok_or_else(|| SignalError::SignalNotFound {
                path: name.to_string(),
            })
    }

    pub fn get_signal_size(&self, index: usize) -> SignalResult<usize> {
        self.entry(index).map(|e| e.size)
    }

    pub fn get_signal_number_of_samples(&self, index: usize) -> SignalResult<u32> {
        self.entry(index).map(|e| e.samples)
    }

    /// Module-side bytes of entry `index`.
    pub fn signal_bytes(&self, index: usize) -> SignalResult<&[u8]> {
        let entry = self.entry(index)?;
        let area = self
            .areas
            .get(entry.area.0)
            .ok_or(SignalError::UnknownArea { area: entry.area.0 })?;
        area.region(entry.offset, entry.size)
            .ok_or_else(|| entry.region_error(entry.offset, entry.size, area.len()))
    }

    pub fn signal_bytes_mut(&mut self, index: usize) -> SignalResult<&mut [u8]> {
        self.ensure_finalised()?;
        let count = self.entries.len();
        let entry = self
            .entries
            .get(index)
            .ok_or(SignalError::InvalidIndex { index, count })?;
        let area = self
            .areas
            .get_mut(entry.area.0)
            .ok_or(SignalError::UnknownArea { area: entry.area.0 })?;
        let area_size = area.len();
        area.region_mut(entry.offset, entry.size)
            .ok_or_else(|| entry.region_error(entry.offset, entry.size, area_size))
    }

    fn ensure_kind(&self, expected: BrokerKind) -> SignalResult<()> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(SignalError::WrongBrokerKind {
                expected: expected.to_string(),
                found: self.kind.to_string(),
            })
        }
    }

    /// Copy the selected samples and blocks of every entry from the shared
    /// signals' `active_buffer` slot into module memory.
    pub fn read(&mut self, namespace: &DataSourceContainer, active_buffer: usize) -> SignalResult<()> {
        self.ensure_kind(BrokerKind::InputReader)?;
        self.ensure_finalised()?;
        let counter = self.cycle_counter;
        for entry in &self.entries {
            let shared = namespace
                .signal(entry.signal)
                .ok_or_else(|| SignalError::SignalNotFound {
                    path: entry.path.clone(),
                })?;
            let src = shared.slot(active_buffer)?;
            let area = self
                .areas
                .get_mut(entry.area.0)
                .ok_or(SignalError::UnknownArea { area: entry.area.0 })?;
            entry.for_each_copy(counter % entry.cycles, |module, shared_offset, len| {
                let from = src
                    .get(shared_offset..shared_offset + len)
                    .ok_or_else(|| entry.region_error(shared_offset, len, src.len()))?;
                let area_size = area.len();
                let to = area
                    .region_mut(module, len)
                    .ok_or_else(|| entry.region_error(module, len, area_size))?;
                to.copy_from_slice(from);
                Ok(())
            })?;
        }
        if self.synchronised {
            self.cycle_counter = self.cycle_counter.wrapping_add(1);
        }
        Ok(())
    }

    /// Copy module memory of every entry into the shared signals'
    /// `active_buffer` slot.
    pub fn write(&mut self, namespace: &mut DataSourceContainer, active_buffer: usize) -> SignalResult<()> {
        self.ensure_kind(BrokerKind::OutputWriter)?;
        self.ensure_finalised()?;
        let counter = self.cycle_counter;
        for entry in &self.entries {
            let area = self
                .areas
                .get(entry.area.0)
                .ok_or(SignalError::UnknownArea { area: entry.area.0 })?;
            let shared = namespace
                .signal_mut(entry.signal)
                .ok_or_else(|| SignalError::SignalNotFound {
                    path: entry.path.clone(),
                })?;
            let dst = shared.slot_mut(active_buffer)?;
            entry.for_each_copy(counter % entry.cycles, |module, shared_offset, len| {
                let from = area
                    .region(module, len)
                    .ok_or_else(|| entry.region_error(module, len, area.len()))?;
                let dst_size = dst.len();
                let to = dst
                    .get_mut(shared_offset..shared_offset + len)
                    .ok_or_else(|| entry.region_error(shared_offset, len, dst_size))?;
                to.copy_from_slice(from);
                Ok(())
            })?;
        }
        if self.synchronised {
            self.cycle_counter = self.cycle_counter.wrapping_add(1);
        }
        Ok(())
    }
}
