//! Type introspection registry.
//!
//! Explicit registry of structured types: total size plus the ordered member
//! layout. It is built once (usually from the `[types]` configuration table)
//! and passed by reference to verification, binding and broker construction.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::error;

use crate::dimensions::Dimensions;
use crate::error::{SignalError, SignalResult};
use crate::text::{self, TextValue};
use crate::types::PrimitiveType;

/// One member of a structured type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntrospectionMember {
    /// Member name, without sigil.
    pub name: String,
    /// Primitive or structured type name.
    pub type_name: String,
    /// Offset of the member from the start of the structure.
    pub byte_offset: u32,
    /// Member shape.
    pub dimensions: Dimensions,
}

impl IntrospectionMember {
    pub fn new(name: &str, type_name: &str, byte_offset: u32, dimensions: Dimensions) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            byte_offset,
            dimensions,
        }
    }
}

/// Registered class.
///
/// A class without `members` is known (its size can be used) but cannot be
/// verified member by member.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassInfo {
    /// Total size of one instance in bytes.
    pub class_size: u32,
    /// Ordered member layout, `None` if not introspectable.
    pub members: Option<Vec<IntrospectionMember>>,
}

impl ClassInfo {
    pub fn introspectable(class_size: u32, members: Vec<IntrospectionMember>) -> Self {
        Self {
            class_size,
            members: Some(members),
        }
    }

    pub fn opaque(class_size: u32) -> Self {
        Self {
            class_size,
            members: None,
        }
    }
}

/// Lookup from structured type name to its layout.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IntrospectionRegistry {
    classes: BTreeMap<String, ClassInfo>,
}

impl IntrospectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a class.
    pub fn register(&mut self, type_name: &str, info: ClassInfo) {
        self.classes.insert(type_name.to_string(), info);
    }

    pub fn find(&self, type_name: &str) -> Option<&ClassInfo> {
        self.classes.get(type_name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Byte size of one element of `type_name`: primitive width or class size.
    pub fn type_size(&self, type_name: &str) -> SignalResult<u32> {
        if let Some(p) = PrimitiveType::from_name(type_name) {
            return Ok(p.byte_size());
        }
        let class = self
            .find(type_name)
            .ok_or_else(|| SignalError::TypeNotRegistered {
                type_name: type_name.to_string(),
            })?;
        if class.class_size == 0 {
            error!(type_name, "Registered type has no size");
            return Err(SignalError::ZeroSizedType {
                type_name: type_name.to_string(),
            });
        }
        Ok(class.class_size)
    }

    /// Encode a textual default value of `elements` elements of `type_name`
    /// into `out`.
    ///
    /// Arrays take a `{a, b, ...}` list, or a single scalar copied into every
    /// element. Structured types take a `{ Member = value ... }` table; absent
    /// members stay zero.
    pub fn encode_default(
        &self,
        type_name: &str,
        elements: u32,
        text: &str,
        out: &mut [u8],
    ) -> Result<(), String> {
        let value = text::parse(text).map_err(|e| e.to_string())?;
        self.encode_value(type_name, elements, &value, out)
    }

    fn encode_value(
        &self,
        type_name: &str,
        elements: u32,
        value: &TextValue,
        out: &mut [u8],
    ) -> Result<(), String> {
        let size = self.type_size(type_name).map_err(|e| e.to_string())? as usize;
        let total = size * elements as usize;
        if out.len() != total {
            return Err(format!("expected {total} bytes, got {}", out.len()));
        }

        if let Some(p) = PrimitiveType::from_name(type_name) {
            let scalars = value
                .flatten_scalars()
                .ok_or_else(|| format!("a table is not a valid {p} value"))?;
            return match scalars.len() {
                1 => out
                    .chunks_exact_mut(size)
                    .try_for_each(|chunk| p.encode(scalars[0], chunk)),
                n if n == elements as usize => out
                    .chunks_exact_mut(size)
                    .zip(scalars)
                    .try_for_each(|(chunk, s)| p.encode(s, chunk)),
                n => Err(format!("{n} values given for {elements} elements")),
            };
        }

        if elements != 1 {
            return Err(format!("arrays of {type_name} cannot take a default"));
        }
        let info = self
            .find(type_name)
            .ok_or_else(|| format!("type {type_name} not registered"))?;
        let members = info
            .members
            .as_ref()
            .ok_or_else(|| format!("type {type_name} not introspectable"))?;
        if !matches!(value, TextValue::Table(_)) {
            return Err(format!("{type_name} default must be a {{ Member = value }} table"));
        }
        out.fill(0);
        for member in members {
            let Some(v) = value.get(&member.name) else {
                continue;
            };
            let n = member.dimensions.element_count();
            let msize = self.type_size(&member.type_name).map_err(|e| e.to_string())? as usize
                * n as usize;
            let start = member.byte_offset as usize;
            let region = out
                .get_mut(start..start + msize)
                .ok_or_else(|| format!("member {} lies outside {type_name}", member.name))?;
            self.encode_value(&member.type_name, n, v, region)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> IntrospectionRegistry {
        let mut r = IntrospectionRegistry::new();
        r.register(
            "TrackError",
            ClassInfo::introspectable(
                12,
                vec![
                    IntrospectionMember::new("Par1", "uint32", 0, Dimensions::scalar()),
                    IntrospectionMember::new("Par2", "uint32", 4, Dimensions::from_elements(&[2])),
                ],
            ),
        );
        r.register("Blob", ClassInfo::opaque(16));
        r
    }

    #[test]
    fn type_sizes() {
        let r = registry();
        assert_eq!(r.type_size("uint16").unwrap(), 2);
        assert_eq!(r.type_size("TrackError").unwrap(), 12);
        assert_eq!(r.type_size("Blob").unwrap(), 16);
        assert!(matches!(
            r.type_size("Missing"),
            Err(SignalError::TypeNotRegistered { .. })
        ));
    }

    #[test]
    fn zero_sized_class_has_no_type_size() {
        let mut r = registry();
        r.register("Empty", ClassInfo::opaque(0));
        assert!(matches!(
            r.type_size("Empty"),
            Err(SignalError::ZeroSizedType { .. })
        ));
    }

    #[test]
    fn encode_primitive_array() {
        let r = registry();
        let mut out = [0u8; 12];
        r.encode_default("uint32", 3, "{1, 2, 3}", &mut out).unwrap();
        assert_eq!(u32::from_ne_bytes(out[8..12].try_into().unwrap()), 3);

        r.encode_default("uint32", 3, "5", &mut out).unwrap();
        assert_eq!(u32::from_ne_bytes(out[4..8].try_into().unwrap()), 5);

        assert!(r.encode_default("uint32", 3, "{1, 2}", &mut out).is_err());
    }

    #[test]
    fn encode_structure() {
        let r = registry();
        let mut out = [0xffu8; 12];
        r.encode_default("TrackError", 1, "{ Par2 = { 7 8 } }", &mut out)
            .unwrap();
        assert_eq!(u32::from_ne_bytes(out[0..4].try_into().unwrap()), 0);
        assert_eq!(u32::from_ne_bytes(out[4..8].try_into().unwrap()), 7);
        assert_eq!(u32::from_ne_bytes(out[8..12].try_into().unwrap()), 8);
    }

    #[test]
    fn opaque_structure_has_no_default() {
        let r = registry();
        let mut out = [0u8; 16];
        assert!(r.encode_default("Blob", 1, "{ A = 1 }", &mut out).is_err());
    }
}
