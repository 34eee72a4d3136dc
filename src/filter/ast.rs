//! Search filter tree
//!
//! Filters arrive already parsed. Attribute names are kept as given and
//! resolved against the schema during evaluation.

use std::fmt;

use crate::schema::Substrings;

use super::component::ComponentFilter;

/// Attribute value assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ava {
    pub attr: String,
    pub value: Vec<u8>,
}

impl Ava {
    pub fn new(attr: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            attr: attr.into(),
            value: value.into(),
        }
    }
}

/// Substring assertion on one attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstringAssertion {
    pub attr: String,
    pub pieces: Substrings,
}

/// Extensible match: an optional rule, an optional attribute and a value,
/// or a component assertion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchingRuleAssertion {
    pub rule: Option<String>,
    pub attr: Option<String>,
    pub value: Vec<u8>,
    pub dn_attributes: bool,
    pub component: Option<ComponentFilter>,
}

/// Result of a filter the caller already evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Computed {
    True,
    False,
    Undefined,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equality(Ava),
    Substrings(SubstringAssertion),
    Approx(Ava),
    GreaterOrEqual(Ava),
    LessOrEqual(Ava),
    Present(String),
    Extensible(MatchingRuleAssertion),
    Computed(Computed),
}

impl Filter {
    pub fn eq(attr: &str, value: impl Into<Vec<u8>>) -> Self {
        Filter::Equality(Ava::new(attr, value))
    }

    pub fn approx(attr: &str, value: impl Into<Vec<u8>>) -> Self {
        Filter::Approx(Ava::new(attr, value))
    }

    pub fn ge(attr: &str, value: impl Into<Vec<u8>>) -> Self {
        Filter::GreaterOrEqual(Ava::new(attr, value))
    }

    pub fn le(attr: &str, value: impl Into<Vec<u8>>) -> Self {
        Filter::LessOrEqual(Ava::new(attr, value))
    }

    pub fn present(attr: &str) -> Self {
        Filter::Present(attr.to_string())
    }

    pub fn substrings(attr: &str, initial: Option<&str>, any: &[&str], final_value: Option<&str>) -> Self {
        Filter::Substrings(SubstringAssertion {
            attr: attr.to_string(),
            pieces: Substrings {
                initial: initial.map(|s| s.as_bytes().to_vec()),
                any: any.iter().map(|s| s.as_bytes().to_vec()).collect(),
                final_value: final_value.map(|s| s.as_bytes().to_vec()),
            },
        })
    }

    /// Extensible match of `rule` against `attr`.
    pub fn extensible(rule: Option<&str>, attr: Option<&str>, value: impl Into<Vec<u8>>) -> Self {
        Filter::Extensible(MatchingRuleAssertion {
            rule: rule.map(str::to_string),
            attr: attr.map(str::to_string),
            value: value.into(),
            ..Default::default()
        })
    }

    pub fn not(inner: Filter) -> Self {
        Filter::Not(Box::new(inner))
    }
}

fn write_value(f: &mut fmt::Formatter<'_>, value: &[u8]) -> fmt::Result {
    for &b in value {
        match b {
            b'*' | b'(' | b')' | b'\\' | 0 => write!(f, "\\{b:02x}")?,
            0x20..=0x7e => write!(f, "{}", b as char)?,
            _ => write!(f, "\\{b:02x}")?,
        }
    }
    Ok(())
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(children) | Filter::Or(children) => {
                f.write_str(if matches!(self, Filter::And(_)) { "(&" } else { "(|" })?;
                for child in children {
                    write!(f, "{child}")?;
                }
                f.write_str(")")
            }
            Filter::Not(inner) => write!(f, "(!{inner})"),
            Filter::Equality(ava) | Filter::Approx(ava) | Filter::GreaterOrEqual(ava) | Filter::LessOrEqual(ava) => {
                let op = match self {
                    Filter::Approx(_) => "~=",
                    Filter::GreaterOrEqual(_) => ">=",
                    Filter::LessOrEqual(_) => "<=",
                    _ => "=",
                };
                write!(f, "({}{op}", ava.attr)?;
                write_value(f, &ava.value)?;
                f.write_str(")")
            }
            Filter::Substrings(sa) => {
                write!(f, "({}=", sa.attr)?;
                if let Some(initial) = &sa.pieces.initial {
                    write_value(f, initial)?;
                }
                f.write_str("*")?;
                for piece in &sa.pieces.any {
                    write_value(f, piece)?;
                    f.write_str("*")?;
                }
                if let Some(fin) = &sa.pieces.final_value {
                    write_value(f, fin)?;
                }
                f.write_str(")")
            }
            Filter::Present(attr) => write!(f, "({attr}=*)"),
            Filter::Extensible(mra) => {
                f.write_str("(")?;
                if let Some(attr) = &mra.attr {
                    f.write_str(attr)?;
                }
                if mra.dn_attributes {
                    f.write_str(":dn")?;
                }
                if let Some(rule) = &mra.rule {
                    write!(f, ":{rule}")?;
                }
                if mra.component.is_some() {
                    f.write_str(":componentFilterMatch")?;
                }
                f.write_str(":=")?;
                write_value(f, &mra.value)?;
                f.write_str(")")
            }
            Filter::Computed(Computed::True) => f.write_str("(&)"),
            Filter::Computed(Computed::False) => f.write_str("(|)"),
            Filter::Computed(Computed::Undefined) => f.write_str("(?=undefined)"),
        }
    }
}
