//! Primitive signal types.
//!
//! A type name either resolves here (primitive) or must be looked up in
//! the [`IntrospectionRegistry`](crate::introspection::IntrospectionRegistry)
//! (structured).

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// Primitive types a signal can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum PrimitiveType {
    Bool = 0,
    Char8 = 1,
    Int8 = 2,
    Uint8 = 3,
    Int16 = 4,
    Uint16 = 5,
    Int32 = 6,
    Uint32 = 7,
    Int64 = 8,
    Uint64 = 9,
    Float32 = 10,
    Float64 = 11,
}

impl PrimitiveType {
    /// Resolve a type name, `None` if not primitive.
    pub fn from_name(name: &str) -> Option<Self> {
        name.parse().ok()
    }

    /// Width in bits.
    pub const fn bits(self) -> u32 {
        match self {
            Self::Bool | Self::Char8 | Self::Int8 | Self::Uint8 => 8,
            Self::Int16 | Self::Uint16 => 16,
            Self::Int32 | Self::Uint32 | Self::Float32 => 32,
            Self::Int64 | Self::Uint64 | Self::Float64 => 64,
        }
    }

    /// Storage size in bytes: `(bits + 7) / 8`.
    #[inline]
    pub const fn byte_size(self) -> u32 {
        self.bits().div_ceil(8)
    }

    /// Encode one textual element into `out` (native endianness).
    ///
    /// `out` must be exactly [`byte_size`](Self::byte_size) long.
    pub fn encode(self, text: &str, out: &mut [u8]) -> Result<(), String> {
        let text = text.trim().trim_matches('"');
        if out.len() != self.byte_size() as usize {
            return Err(format!(
                "{self} needs {} bytes, got {}",
                self.byte_size(),
                out.len()
            ));
        }
        match self {
            Self::Bool => {
                let v: u8 = match text {
                    "true" | "1" => 1,
                    "false" | "0" => 0,
                    _ => return Err(format!("{text:?} is not a bool")),
                };
                out[0] = v;
            }
            Self::Char8 => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii() => out[0] = c as u8,
                    _ => out[0] = parse_int::<u8>(text)?,
                }
            }
            Self::Int8 => out.copy_from_slice(&parse_int::<i8>(text)?.to_ne_bytes()),
            Self::Uint8 => out.copy_from_slice(&parse_int::<u8>(text)?.to_ne_bytes()),
            Self::Int16 => out.copy_from_slice(&parse_int::<i16>(text)?.to_ne_bytes()),
            Self::Uint16 => out.copy_from_slice(&parse_int::<u16>(text)?.to_ne_bytes()),
            Self::Int32 => out.copy_from_slice(&parse_int::<i32>(text)?.to_ne_bytes()),
            Self::Uint32 => out.copy_from_slice(&parse_int::<u32>(text)?.to_ne_bytes()),
            Self::Int64 => out.copy_from_slice(&parse_int::<i64>(text)?.to_ne_bytes()),
            Self::Uint64 => out.copy_from_slice(&parse_int::<u64>(text)?.to_ne_bytes()),
            Self::Float32 => out.copy_from_slice(&parse_float(text)?.to_ne_bytes()),
            Self::Float64 => {
                let v: f64 = text
                    .parse()
                    .map_err(|e| format!("{text:?} is not a float64: {e}"))?;
                out.copy_from_slice(&v.to_ne_bytes());
            }
        }
        Ok(())
    }
}

fn parse_int<T: FromStr>(text: &str) -> Result<T, String>
where
    T::Err: fmt::Display,
{
    if let Some(hex) = text.strip_prefix("0x") {
        let wide = u64::from_str_radix(hex, 16).map_err(|e| format!("{text:?}: {e}"))?;
        return wide
            .to_string()
            .parse::<T>()
            .map_err(|e| format!("{text:?}: {e}"));
    }
    text.parse::<T>().map_err(|e| format!("{text:?}: {e}"))
}

fn parse_float(text: &str) -> Result<f32, String> {
    text.parse::<f32>()
        .map_err(|e| format!("{text:?} is not a float32: {e}"))
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Char8 => "char8",
            Self::Int8 => "int8",
            Self::Uint8 => "uint8",
            Self::Int16 => "int16",
            Self::Uint16 => "uint16",
            Self::Int32 => "int32",
            Self::Uint32 => "uint32",
            Self::Int64 => "int64",
            Self::Uint64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        };
        f.write_str(name)
    }
}

impl FromStr for PrimitiveType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bool" => Ok(Self::Bool),
            "char8" => Ok(Self::Char8),
            "int8" => Ok(Self::Int8),
            "uint8" => Ok(Self::Uint8),
            "int16" => Ok(Self::Int16),
            "uint16" => Ok(Self::Uint16),
            "int32" => Ok(Self::Int32),
            "uint32" => Ok(Self::Uint32),
            "int64" => Ok(Self::Int64),
            "uint64" => Ok(Self::Uint64),
            "float32" => Ok(Self::Float32),
            "float64" => Ok(Self::Float64),
            _ => Err(format!("unknown primitive type: {s:?}")),
        }
    }
}
