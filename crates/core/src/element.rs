//! Element: the unit of storage inside a Stack
//!
//! Every Stack is created for exactly one `ElementType` and only ever holds
//! elements carrying that tag. Conversion between types happens explicitly,
//! through `Element::convert_to` (used by bring).
//!
//! ## Byte payload form
//!
//! ```text
//! Int64    8 bytes, big-endian two's complement
//! Float64  8 bytes, big-endian IEEE-754 bits
//! Bool     1 byte, 0 or 1
//! Text     UTF-8
//! Bytes    raw
//! ```
//!
//! The byte form is what `convert_to(ElementType::Bytes)` produces and what
//! `Element::from_payload` accepts back.

use crate::error::ConversionError;
use std::fmt;

/// The fixed element type of a Stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Int64,
    Float64,
    Bool,
    Text,
    Bytes,
}

impl ElementType {
    pub fn name(self) -> &'static str {
        match self {
            ElementType::Int64 => "int64",
            ElementType::Float64 => "float64",
            ElementType::Bool => "bool",
            ElementType::Text => "text",
            ElementType::Bytes => "bytes",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed value
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Int64(i64),
    Float64(f64),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
}

impl Element {
    pub fn element_type(&self) -> ElementType {
        match self {
            Element::Int64(_) => ElementType::Int64,
            Element::Float64(_) => ElementType::Float64,
            Element::Bool(_) => ElementType::Bool,
            Element::Text(_) => ElementType::Text,
            Element::Bytes(_) => ElementType::Bytes,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Element::Int64(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Element::Float64(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Element::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Element::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Element::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Byte-level representation of the payload
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Element::Int64(n) => n.to_be_bytes().to_vec(),
            Element::Float64(x) => x.to_bits().to_be_bytes().to_vec(),
            Element::Bool(b) => vec![u8::from(*b)],
            Element::Text(s) => s.as_bytes().to_vec(),
            Element::Bytes(b) => b.clone(),
        }
    }

    /// Rebuild an element from its byte payload.
    ///
    /// Fails when the length does not fit the tag (8 for numerics, 1 for
    /// Bool) or when Text is not valid UTF-8.
    pub fn from_payload(ty: ElementType, bytes: &[u8]) -> Result<Element, ConversionError> {
        let fail = |reason: &str| ConversionError::new(ElementType::Bytes, ty, reason);
        match ty {
            ElementType::Int64 => {
                let raw: [u8; 8] = bytes
                    .try_into()
                    .map_err(|_| fail("expected exactly 8 bytes"))?;
                Ok(Element::Int64(i64::from_be_bytes(raw)))
            }
            ElementType::Float64 => {
                let raw: [u8; 8] = bytes
                    .try_into()
                    .map_err(|_| fail("expected exactly 8 bytes"))?;
                Ok(Element::Float64(f64::from_bits(u64::from_be_bytes(raw))))
            }
            ElementType::Bool => match bytes {
                [0] => Ok(Element::Bool(false)),
                [1] => Ok(Element::Bool(true)),
                _ => Err(fail("expected a single 0 or 1 byte")),
            },
            ElementType::Text => String::from_utf8(bytes.to_vec())
                .map(Element::Text)
                .map_err(|_| fail("invalid UTF-8")),
            ElementType::Bytes => Ok(Element::Bytes(bytes.to_vec())),
        }
    }

    /// Convert to another element type.
    ///
    /// Same-type conversion is the identity. See the module docs for the byte
    /// form; numeric text is decimal.
    pub fn convert_to(&self, target: ElementType) -> Result<Element, ConversionError> {
        let source = self.element_type();
        if source == target {
            return Ok(self.clone());
        }
        let fail = |reason: String| ConversionError::new(source, target, reason);

        match (self, target) {
            // Int64
            (Element::Int64(n), ElementType::Float64) => Ok(Element::Float64(*n as f64)),
            (Element::Int64(n), ElementType::Bool) => Ok(Element::Bool(*n != 0)),
            (Element::Int64(n), ElementType::Text) => Ok(Element::Text(n.to_string())),

            // Float64
            (Element::Float64(x), ElementType::Int64) => float_to_int(*x)
                .map(Element::Int64)
                .ok_or_else(|| fail(format!("{} does not fit in int64", x))),
            (Element::Float64(x), ElementType::Bool) => Ok(Element::Bool(*x != 0.0)),
            (Element::Float64(x), ElementType::Text) => Ok(Element::Text(x.to_string())),

            // Bool
            (Element::Bool(b), ElementType::Int64) => Ok(Element::Int64(i64::from(*b))),
            (Element::Bool(b), ElementType::Float64) => {
                Ok(Element::Float64(if *b { 1.0 } else { 0.0 }))
            }
            (Element::Bool(b), ElementType::Text) => Ok(Element::Text(b.to_string())),

            // Text
            (Element::Text(s), ElementType::Int64) => s
                .parse::<i64>()
                .map(Element::Int64)
                .map_err(|_| fail(format!("'{}' is not an integer", s))),
            (Element::Text(s), ElementType::Float64) => s
                .parse::<f64>()
                .map(Element::Float64)
                .map_err(|_| fail(format!("'{}' is not a number", s))),
            (Element::Text(s), ElementType::Bool) => match s.as_str() {
                "true" | "1" => Ok(Element::Bool(true)),
                "false" | "0" | "" => Ok(Element::Bool(false)),
                _ => Err(fail(format!("'{}' is not a boolean", s))),
            },

            // Bytes
            (Element::Bytes(b), ElementType::Bool) => {
                Ok(Element::Bool(!(b.is_empty() || b.as_slice() == [0])))
            }
            (Element::Bytes(b), ty) => Element::from_payload(ty, b),

            // Anything -> Bytes uses the payload form
            (e, ElementType::Bytes) => Ok(Element::Bytes(e.payload())),

            // Same-type pairs returned above
            (_, _) => Err(fail("unsupported conversion".to_string())),
        }
    }
}

/// Truncate toward zero; None for NaN, infinities and out-of-range values
fn float_to_int(x: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is itself out of range
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if !x.is_finite() {
        return None;
    }
    let t = x.trunc();
    if t >= -LIMIT && t < LIMIT {
        Some(t as i64)
    } else {
        None
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Int64(n) => write!(f, "{}", n),
            Element::Float64(x) => write!(f, "{}", x),
            Element::Bool(b) => write!(f, "{}", b),
            Element::Text(s) => write!(f, "{:?}", s),
            Element::Bytes(b) => {
                f.write_str("0x")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

impl From<i64> for Element {
    fn from(n: i64) -> Self {
        Element::Int64(n)
    }
}

impl From<f64> for Element {
    fn from(x: f64) -> Self {
        Element::Float64(x)
    }
}

impl From<bool> for Element {
    fn from(b: bool) -> Self {
        Element::Bool(b)
    }
}

impl From<String> for Element {
    fn from(s: String) -> Self {
        Element::Text(s)
    }
}

impl From<&str> for Element {
    fn from(s: &str) -> Self {
        Element::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Element {
    fn from(b: Vec<u8>) -> Self {
        Element::Bytes(b)
    }
}
