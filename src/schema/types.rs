//! Attribute types
//!
//! An attribute type names an attribute and carries the matching rules the
//! engine may use for it, one slot per index kind.

use std::cmp::Ordering;
use std::sync::Arc;

use super::rules::MatchingRule;

/// Shared handle to an attribute type.
pub type AttrDesc = Arc<AttributeType>;

/// A named attribute and its matching-rule capabilities.
#[derive(Debug, Clone)]
pub struct AttributeType {
    name: String,
    equality: Option<Arc<dyn MatchingRule>>,
    ordering: Option<Arc<dyn MatchingRule>>,
    substr: Option<Arc<dyn MatchingRule>>,
    approx: Option<Arc<dyn MatchingRule>>,
    sorted_values: bool,
}

impl AttributeType {
    /// Attribute with no matching rules.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            equality: None,
            ordering: None,
            substr: None,
            approx: None,
            sorted_values: false,
        }
    }

    pub fn with_equality(mut self, rule: Arc<dyn MatchingRule>) -> Self {
        self.equality = Some(rule);
        self
    }

    pub fn with_ordering(mut self, rule: Arc<dyn MatchingRule>) -> Self {
        self.ordering = Some(rule);
        self
    }

    pub fn with_substr(mut self, rule: Arc<dyn MatchingRule>) -> Self {
        self.substr = Some(rule);
        self
    }

    pub fn with_approx(mut self, rule: Arc<dyn MatchingRule>) -> Self {
        self.approx = Some(rule);
        self
    }

    /// Values of this type are kept sorted by the equality rule.
    pub fn sorted(mut self) -> Self {
        self.sorted_values = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Case-insensitive name comparison.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn equality(&self) -> Option<&Arc<dyn MatchingRule>> {
        self.equality.as_ref()
    }

    pub fn ordering(&self) -> Option<&Arc<dyn MatchingRule>> {
        self.ordering.as_ref()
    }

    pub fn substr(&self) -> Option<&Arc<dyn MatchingRule>> {
        self.substr.as_ref()
    }

    pub fn approx(&self) -> Option<&Arc<dyn MatchingRule>> {
        self.approx.as_ref()
    }

    pub fn sorted_values(&self) -> bool {
        self.sorted_values
    }

    /// Comparison form of `value` under the equality rule.
    pub fn normalize(&self, value: &[u8]) -> Vec<u8> {
        match &self.equality {
            Some(rule) => rule.normalize(value),
            None => value.to_vec(),
        }
    }

    /// Orders two normalized values under the equality rule.
    pub fn compare_values(&self, a: &[u8], b: &[u8]) -> Ordering {
        match &self.equality {
            Some(rule) => rule.compare(a, b),
            None => a.cmp(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::rules::{CaseIgnoreMatch, OctetStringMatch};

    #[test]
    fn test_builder_and_lookup() {
        let attr = AttributeType::new("cn")
            .with_equality(Arc::new(CaseIgnoreMatch))
            .sorted();
        assert!(attr.is("CN"));
        assert!(attr.sorted_values());
        assert!(attr.ordering().is_none());
        assert_eq!(attr.normalize(b"Foo  Bar"), b"foo bar".to_vec());
    }

    #[test]
    fn test_without_equality_rule_is_bytewise() {
        let attr = AttributeType::new("blob");
        assert_eq!(attr.compare_values(b"a", b"B"), Ordering::Greater);
        let attr = AttributeType::new("blob").with_equality(Arc::new(OctetStringMatch));
        assert_eq!(attr.normalize(b"A"), b"A".to_vec());
    }
}
