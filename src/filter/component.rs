//! Component matching
//!
//! A component assertion tests parts of a structured attribute value. The
//! engine does not understand value structure itself; a caller-supplied
//! [`ComponentIndex`] turns stored values and asserted items into keys.

use std::fmt;

use crate::schema::AttributeType;

/// Boolean combination of component items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentFilter {
    And(Vec<ComponentFilter>),
    Or(Vec<ComponentFilter>),
    Not(Box<ComponentFilter>),
    Item(ComponentItem),
}

/// One asserted component: a path into the value, an optional rule and
/// the asserted bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentItem {
    pub path: String,
    pub rule: Option<String>,
    pub value: Vec<u8>,
}

impl ComponentItem {
    pub fn new(path: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            rule: None,
            value: value.into(),
        }
    }
}

/// Key generation for component indexes.
pub trait ComponentIndex: Send + Sync + fmt::Debug {
    /// Keys for the stored values of `attr`.
    fn index_keys(&self, attr: &AttributeType, values: &[Vec<u8>]) -> Vec<Vec<u8>>;

    /// Keys an item must find, or `None` if it cannot use the index.
    fn assertion_keys(&self, attr: &AttributeType, item: &ComponentItem) -> Option<Vec<Vec<u8>>>;
}
