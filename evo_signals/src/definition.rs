//! Declarative signal definitions of a module.
//!
//! A [`Gam`] owns an ordered list of [`SignalsContainer`]s, each holding a
//! tree of [`SignalDefinition`]s. Definitions are immutable once configured;
//! binding returns resolved copies (see [`crate::binding`]).

use bitflags::bitflags;
use tracing::error;

use crate::consts::{DOMAIN_SIGIL, REGULAR_SIGIL};
use crate::dimensions::Dimensions;
use crate::error::{SignalError, SignalResult};

// ─── Member kind ────────────────────────────────────────────────────

/// How a child is introduced in configuration keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemberKind {
    /// `+Name`
    #[default]
    Regular,
    /// `$Name`
    Domain,
}

impl MemberKind {
    /// Split a configuration key into its kind and bare name.
    ///
    /// Returns `None` if the key carries no sigil.
    pub fn split_key(key: &str) -> Option<(Self, &str)> {
        if let Some(name) = key.strip_prefix(REGULAR_SIGIL) {
            Some((Self::Regular, name))
        } else {
            key.strip_prefix(DOMAIN_SIGIL).map(|name| (Self::Domain, name))
        }
    }
}

// ─── Signal definition ──────────────────────────────────────────────

/// Discriminates the shape of a definition without looking at its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// Primitive or opaque scalar/array.
    Leaf,
    /// Leaf reading historical samples of an existing shared signal.
    Sampled,
    /// Structured signal with children.
    Node,
}

/// Kind-specific payload of a definition.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalBody {
    /// Ordinary signal; a leaf iff `children` is empty.
    Generic { children: Vec<SignalDefinition> },
    /// Sampled signal with its `Samples` matrix text (may be empty).
    Sampled { samples: String },
}

/// One signal as declared by a module.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDefinition {
    pub name: String,
    pub member_kind: MemberKind,
    pub type_name: String,
    /// Dot path into the namespace; empty means "derive from the parent".
    pub path: String,
    pub default_value: String,
    /// Shape text, e.g. `"[4]"`.
    pub dimensions: String,
    /// Block selection matrix text, e.g. `"{{2,5}}"`.
    pub operation: String,
    /// Cycle count, 0 means once.
    pub cycles: u32,
    pub is_final: bool,
    pub body: SignalBody,
}

impl SignalDefinition {
    /// Generic leaf.
    pub fn leaf(name: &str, type_name: &str) -> Self {
        Self {
            name: name.to_string(),
            member_kind: MemberKind::Regular,
            type_name: type_name.to_string(),
            path: String::new(),
            default_value: String::new(),
            dimensions: String::new(),
            operation: String::new(),
            cycles: 0,
            is_final: false,
            body: SignalBody::Generic {
                children: Vec::new(),
            },
        }
    }

    /// Structured node.
    pub fn node(name: &str, type_name: &str, children: Vec<SignalDefinition>) -> Self {
        Self {
            body: SignalBody::Generic { children },
            ..Self::leaf(name, type_name)
        }
    }

    /// Sampled leaf.
    pub fn sampled(name: &str, type_name: &str, samples: &str) -> Self {
        Self {
            body: SignalBody::Sampled {
                samples: samples.to_string(),
            },
            ..Self::leaf(name, type_name)
        }
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    pub fn with_default(mut self, value: &str) -> Self {
        self.default_value = value.to_string();
        self
    }

    pub fn with_dimensions(mut self, dimensions: &str) -> Self {
        self.dimensions = dimensions.to_string();
        self
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = operation.to_string();
        self
    }

    pub fn with_cycles(mut self, cycles: u32) -> Self {
        self.cycles = cycles;
        self
    }

    pub fn with_member_kind(mut self, kind: MemberKind) -> Self {
        self.member_kind = kind;
        self
    }

    pub fn into_final(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn kind(&self) -> SignalKind {
        match &self.body {
            SignalBody::Sampled { .. } => SignalKind::Sampled,
            SignalBody::Generic { children } if children.is_empty() => SignalKind::Leaf,
            SignalBody::Generic { .. } => SignalKind::Node,
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.kind() != SignalKind::Node
    }

    #[inline]
    pub fn is_sampled(&self) -> bool {
        self.kind() == SignalKind::Sampled
    }

    pub fn children(&self) -> &[SignalDefinition] {
        match &self.body {
            SignalBody::Generic { children } => children,
            SignalBody::Sampled { .. } => &[],
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<SignalDefinition>> {
        match &mut self.body {
            SignalBody::Generic { children } => Some(children),
            SignalBody::Sampled { .. } => None,
        }
    }

    /// `Samples` matrix text, if this is a sampled signal and it is set.
    pub fn samples(&self) -> Option<&str> {
        match &self.body {
            SignalBody::Sampled { samples } if !samples.trim().is_empty() => Some(samples),
            _ => None,
        }
    }

    pub fn find_child(&self, name: &str) -> Option<&SignalDefinition> {
        self.children().iter().find(|c| c.name == name)
    }

    /// Parsed shape.
    pub fn shape(&self) -> SignalResult<Dimensions> {
        Dimensions::parse(&self.dimensions)
    }

    /// Path of this definition under `prefix` (`parent_path + "."`).
    pub fn resolved_path(&self, prefix: &str) -> String {
        if self.path.is_empty() {
            format!("{prefix}{}", self.name)
        } else {
            self.path.clone()
        }
    }

    /// Local structural rules: a declared type, and no dimensions on nodes.
    pub fn validate(&self) -> SignalResult<()> {
        if self.type_name.is_empty() {
            error!(signal = %self.name, "The type cannot be empty");
            return Err(SignalError::EmptyType {
                signal: self.name.clone(),
            });
        }
        if self.kind() == SignalKind::Node && !self.shape()?.is_scalar() {
            error!(signal = %self.name, type_name = %self.type_name, "Unsupported multi-dimensional structure");
            return Err(SignalError::MultiDimensionalStructure {
                signal: self.name.clone(),
                type_name: self.type_name.clone(),
            });
        }
        self.children().iter().try_for_each(SignalDefinition::validate)
    }

    /// Fill empty fields from `local`, merge children by name and append the
    /// ones only `local` declares.
    pub fn merge_with_local(&mut self, local: &SignalDefinition) -> SignalResult<()> {
        if self.is_final {
            error!(signal = %self.name, "Merging a final definition");
            return Err(SignalError::FinalDefinition {
                signal: self.name.clone(),
            });
        }
        fill(&mut self.type_name, &local.type_name);
        fill(&mut self.path, &local.path);
        fill(&mut self.default_value, &local.default_value);
        fill(&mut self.dimensions, &local.dimensions);
        fill(&mut self.operation, &local.operation);
        if self.cycles == 0 {
            self.cycles = local.cycles;
        }

        let becomes_sampled = match (&mut self.body, &local.body) {
            (SignalBody::Sampled { samples }, SignalBody::Sampled { samples: theirs }) => {
                fill(samples, theirs);
                false
            }
            (SignalBody::Generic { children }, SignalBody::Generic { children: theirs }) => {
                for other in theirs {
                    match children.iter_mut().find(|c| c.name == other.name) {
                        Some(mine) => mine.merge_with_local(other)?,
                        None => children.push(other.clone()),
                    }
                }
                false
            }
            (SignalBody::Sampled { .. }, SignalBody::Generic { children: theirs })
                if theirs.is_empty() =>
            {
                false
            }
            (SignalBody::Generic { children }, SignalBody::Sampled { .. })
                if children.is_empty() =>
            {
                true
            }
            _ => {
                return Err(SignalError::InvalidDefinition {
                    signal: self.name.clone(),
                    reason: "a sampled signal cannot be merged with a structured one".to_string(),
                });
            }
        };
        if becomes_sampled {
            self.body = local.body.clone();
        }
        Ok(())
    }
}

fn fill(field: &mut String, from: &str) {
    if field.is_empty() {
        *field = from.to_string();
    }
}

// ─── Containers ─────────────────────────────────────────────────────

bitflags! {
    /// Data direction of a signals container.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Direction: u8 {
        /// Signals are read by the module (consumer).
        const INPUT  = 0x01;
        /// Signals are written by the module (producer).
        const OUTPUT = 0x02;
    }
}

/// Group of definitions sharing one direction.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalsContainer {
    pub name: String,
    pub direction: Direction,
    pub is_final: bool,
    pub signals: Vec<SignalDefinition>,
}

impl SignalsContainer {
    pub fn new(name: &str, direction: Direction, signals: Vec<SignalDefinition>) -> Self {
        Self {
            name: name.to_string(),
            direction,
            is_final: false,
            signals,
        }
    }

    #[inline]
    pub fn is_input(&self) -> bool {
        self.direction.contains(Direction::INPUT)
    }

    #[inline]
    pub fn is_output(&self) -> bool {
        self.direction.contains(Direction::OUTPUT)
    }

    pub fn merge_with_local(&mut self, local: &SignalsContainer) -> SignalResult<()> {
        if self.is_final {
            error!(container = %self.name, "Merging a final container");
            return Err(SignalError::FinalDefinition {
                signal: self.name.clone(),
            });
        }
        if self.direction.is_empty() {
            self.direction = local.direction;
        }
        for other in &local.signals {
            match self.signals.iter_mut().find(|s| s.name == other.name) {
                Some(mine) => mine.merge_with_local(other)?,
                None => self.signals.push(other.clone()),
            }
        }
        Ok(())
    }
}

// ─── Module ─────────────────────────────────────────────────────────

/// A real-time processing module and its declared signals.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Gam {
    pub name: String,
    /// Real-time states the module is active in.
    pub states: Vec<String>,
    /// Name of the template merged in before verification.
    pub template: Option<String>,
    pub containers: Vec<SignalsContainer>,
}

impl Gam {
    pub fn new(name: &str, states: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            states: states.iter().map(|s| s.to_string()).collect(),
            template: None,
            containers: Vec::new(),
        }
    }

    pub fn with_container(mut self, container: SignalsContainer) -> Self {
        self.containers.push(container);
        self
    }

    pub fn merge_with_local(&mut self, local: &Gam) -> SignalResult<()> {
        if self.states.is_empty() {
            self.states = local.states.clone();
        }
        for other in &local.containers {
            match self.containers.iter_mut().find(|c| c.name == other.name) {
                Some(mine) => mine.merge_with_local(other)?,
                None => self.containers.push(other.clone()),
            }
        }
        Ok(())
    }

    /// Every top-level definition, in declaration order.
    pub fn signals(&self) -> impl Iterator<Item = &SignalDefinition> {
        self.containers.iter().flat_map(|c| c.signals.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_node_and_sampled_kinds() {
        assert_eq!(SignalDefinition::leaf("a", "uint32").kind(), SignalKind::Leaf);
        assert_eq!(
            SignalDefinition::sampled("a", "uint32", "{{0,0,1}}").kind(),
            SignalKind::Sampled
        );
        let node = SignalDefinition::node("n", "T", vec![SignalDefinition::leaf("a", "uint32")]);
        assert_eq!(node.kind(), SignalKind::Node);
        assert!(!node.is_leaf());
    }

    #[test]
    fn split_member_keys() {
        assert_eq!(
            MemberKind::split_key("+Par1"),
            Some((MemberKind::Regular, "Par1"))
        );
        assert_eq!(
            MemberKind::split_key("$Par1"),
            Some((MemberKind::Domain, "Par1"))
        );
        assert_eq!(MemberKind::split_key("Class"), None);
    }

    #[test]
    fn resolved_path_uses_prefix_only_when_empty() {
        let a = SignalDefinition::leaf("X", "uint32");
        assert_eq!(a.resolved_path("DDB1."), "DDB1.X");
        let b = a.clone().with_path("DDB2.Y");
        assert_eq!(b.resolved_path("DDB1."), "DDB2.Y");
    }

    #[test]
    fn node_with_dimensions_is_invalid() {
        let node = SignalDefinition::node("n", "T", vec![SignalDefinition::leaf("a", "uint32")])
            .with_dimensions("[2]");
        assert!(matches!(
            node.validate(),
            Err(SignalError::MultiDimensionalStructure { .. })
        ));
        assert!(matches!(
            SignalDefinition::leaf("a", "").validate(),
            Err(SignalError::EmptyType { .. })
        ));
    }

    #[test]
    fn merge_fills_and_appends() {
        let mut global = SignalDefinition::node(
            "n",
            "T",
            vec![SignalDefinition::leaf("a", "").with_path("DDB1.A")],
        );
        let local = SignalDefinition::node(
            "n",
            "",
            vec![
                SignalDefinition::leaf("a", "uint32").with_path("DDB9.A"),
                SignalDefinition::leaf("b", "float32"),
            ],
        )
        .with_default("{ a = 1 }");
        global.merge_with_local(&local).unwrap();

        assert_eq!(global.type_name, "T");
        assert_eq!(global.default_value, "{ a = 1 }");
        let a = global.find_child("a").unwrap();
        assert_eq!(a.type_name, "uint32");
        assert_eq!(a.path, "DDB1.A");
        assert_eq!(global.children().len(), 2);
    }

    #[test]
    fn merge_into_final_fails() {
        let mut global = SignalDefinition::leaf("a", "uint32").into_final();
        let local = SignalDefinition::leaf("a", "uint32").with_default("1");
        assert!(matches!(
            global.merge_with_local(&local),
            Err(SignalError::FinalDefinition { .. })
        ));
        assert!(global.default_value.is_empty());
    }

    #[test]
    fn gam_merge_adds_containers() {
        let mut gam = Gam::new("Pid", &["s1"]);
        let template = Gam::new("Tpl", &["other"]).with_container(SignalsContainer::new(
            "Inputs",
            Direction::INPUT,
            vec![SignalDefinition::leaf("e", "uint32")],
        ));
        gam.merge_with_local(&template).unwrap();
        assert_eq!(gam.states, vec!["s1".to_string()]);
        assert_eq!(gam.containers.len(), 1);
        assert!(gam.containers[0].is_input());
        assert_eq!(gam.signals().count(), 1);
    }
}
