//! Schema lookup
//!
//! The engine consumes the schema through the [`Schema`] trait. The
//! surrounding server owns schema definition; [`StaticSchema`] is a fixed
//! registry for embedders and tests.

use std::collections::HashMap;
use std::sync::Arc;

use super::rules::{
    ApproxMatch, CaseIgnoreMatch, CaseIgnoreOrderingMatch, CaseIgnoreSubstringsMatch,
    DistinguishedNameMatch, DnRelation, DnScopeMatch, IntegerMatch, IntegerOrderingMatch,
    MatchingRule, OctetStringMatch,
};
use super::types::{AttrDesc, AttributeType};

/// Attribute type and matching rule resolution.
pub trait Schema: Send + Sync {
    /// Attribute type by name, case-insensitively.
    fn attribute(&self, name: &str) -> Option<AttrDesc>;

    /// Matching rule by name, case-insensitively.
    fn matching_rule(&self, name: &str) -> Option<Arc<dyn MatchingRule>>;
}

/// In-memory registry of attribute types and matching rules.
#[derive(Debug, Default)]
pub struct StaticSchema {
    attrs: HashMap<String, AttrDesc>,
    rules: HashMap<String, Arc<dyn MatchingRule>>,
}

impl StaticSchema {
    /// Registry holding only the built-in matching rules.
    pub fn new() -> Self {
        let mut schema = Self::default();
        let rules: [Arc<dyn MatchingRule>; 12] = [
            Arc::new(OctetStringMatch),
            Arc::new(CaseIgnoreMatch),
            Arc::new(CaseIgnoreSubstringsMatch),
            Arc::new(CaseIgnoreOrderingMatch),
            Arc::new(IntegerMatch),
            Arc::new(IntegerOrderingMatch),
            Arc::new(ApproxMatch),
            Arc::new(DistinguishedNameMatch),
            Arc::new(DnScopeMatch::new(DnRelation::Subtree)),
            Arc::new(DnScopeMatch::new(DnRelation::OneLevel)),
            Arc::new(DnScopeMatch::new(DnRelation::Subordinate)),
            Arc::new(DnScopeMatch::new(DnRelation::Superior)),
        ];
        for rule in rules {
            schema.register_rule(rule);
        }
        schema
    }

    /// Built-in rules plus a small set of common directory attributes.
    pub fn standard() -> Self {
        let mut schema = Self::new();
        let ci = schema.rule("caseIgnoreMatch");
        let ci_sub = schema.rule("caseIgnoreSubstringsMatch");
        let ci_ord = schema.rule("caseIgnoreOrderingMatch");
        let approx = schema.rule("approxMatch");
        let int_eq = schema.rule("integerMatch");
        let int_ord = schema.rule("integerOrderingMatch");
        let dn_eq = schema.rule("distinguishedNameMatch");

        let text = |name: &str| {
            let mut attr = AttributeType::new(name);
            if let Some(r) = &ci {
                attr = attr.with_equality(Arc::clone(r));
            }
            if let Some(r) = &ci_sub {
                attr = attr.with_substr(Arc::clone(r));
            }
            if let Some(r) = &ci_ord {
                attr = attr.with_ordering(Arc::clone(r));
            }
            if let Some(r) = &approx {
                attr = attr.with_approx(Arc::clone(r));
            }
            attr
        };
        let dn_valued = |name: &str| {
            let attr = AttributeType::new(name);
            match &dn_eq {
                Some(r) => attr.with_equality(Arc::clone(r)),
                None => attr,
            }
        };
        let integer = |name: &str| {
            let mut attr = AttributeType::new(name);
            if let Some(r) = &int_eq {
                attr = attr.with_equality(Arc::clone(r));
            }
            if let Some(r) = &int_ord {
                attr = attr.with_ordering(Arc::clone(r));
            }
            attr
        };

        let mut attrs = Vec::new();
        for name in ["cn", "sn", "givenName", "ou", "o", "dc", "uid", "mail", "description"] {
            attrs.push(text(name));
        }
        let object_class = AttributeType::new("objectClass");
        attrs.push(match &ci {
            Some(r) => object_class.with_equality(Arc::clone(r)),
            None => object_class,
        });
        attrs.push(dn_valued("member").sorted());
        attrs.push(dn_valued("uniqueMember").sorted());
        attrs.push(dn_valued("entryDN"));
        attrs.push(integer("uidNumber"));
        attrs.push(integer("gidNumber"));
        attrs.push(AttributeType::new("userPassword"));
        for attr in attrs {
            schema.register(attr);
        }
        schema
    }

    /// Adds a matching rule, replacing any rule of the same name.
    pub fn register_rule(&mut self, rule: Arc<dyn MatchingRule>) {
        self.rules.insert(rule.name().to_ascii_lowercase(), rule);
    }

    /// Adds an attribute type, replacing any type of the same name.
    pub fn register(&mut self, attr: AttributeType) -> AttrDesc {
        let desc = Arc::new(attr);
        self.attrs
            .insert(desc.name().to_ascii_lowercase(), Arc::clone(&desc));
        desc
    }

    fn rule(&self, name: &str) -> Option<Arc<dyn MatchingRule>> {
        self.rules.get(&name.to_ascii_lowercase()).cloned()
    }
}

impl Schema for StaticSchema {
    fn attribute(&self, name: &str) -> Option<AttrDesc> {
        self.attrs.get(&name.to_ascii_lowercase()).cloned()
    }

    fn matching_rule(&self, name: &str) -> Option<Arc<dyn MatchingRule>> {
        self.rule(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_attributes_resolve_case_insensitively() {
        let schema = StaticSchema::standard();
        let cn = schema.attribute("CN").unwrap();
        assert_eq!(cn.name(), "cn");
        assert!(cn.substr().is_some());
        assert!(schema.attribute("member").unwrap().sorted_values());
        assert!(schema.attribute("nosuch").is_none());
    }

    #[test]
    fn test_rules_by_name() {
        let schema = StaticSchema::new();
        let rule = schema.matching_rule("DNSUBTREEMATCH").unwrap();
        assert_eq!(rule.dn_relation(), Some(DnRelation::Subtree));
        assert!(schema.matching_rule("bogusMatch").is_none());
    }
}
