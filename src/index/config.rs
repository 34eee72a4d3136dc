//! Index configuration
//!
//! Which attributes are indexed, and for which kinds of assertion.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Kinds of index kept for one attribute.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IndexMask: u16 {
        const PRESENT = 0x01;
        const EQUALITY = 0x02;
        const APPROX = 0x04;
        const SUBSTR = 0x08;
        const ORDERED = 0x10;
        const COMPONENT = 0x20;
    }
}

impl IndexMask {
    /// Parses one configured kind name.
    pub fn from_kind(name: &str) -> Option<Self> {
        Some(match name.trim().to_ascii_lowercase().as_str() {
            "pres" | "present" => IndexMask::PRESENT,
            "eq" | "equality" => IndexMask::EQUALITY,
            "approx" => IndexMask::APPROX,
            "sub" | "substr" => IndexMask::SUBSTR,
            "ord" | "ordered" => IndexMask::ORDERED,
            "comp" | "component" => IndexMask::COMPONENT,
            _ => return None,
        })
    }
}

/// One configured attribute index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub attr: String,
    pub kinds: Vec<String>,
}

impl IndexSpec {
    pub fn new(attr: impl Into<String>, kinds: &[&str]) -> Self {
        Self {
            attr: attr.into(),
            kinds: kinds.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Combined mask, or the first kind name that does not parse.
    pub fn mask(&self) -> Result<IndexMask, String> {
        self.kinds.iter().try_fold(IndexMask::empty(), |acc, kind| {
            IndexMask::from_kind(kind)
                .map(|m| acc | m)
                .ok_or_else(|| kind.clone())
        })
    }
}
