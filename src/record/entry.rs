//! In-memory records
//!
//! A record is its identifier, its DN, an ordered list of attributes and a
//! cached summary of its structural object classes. Each attribute keeps
//! its raw values and, when any of them differs from its comparison form,
//! the normalized values in a parallel list.

use bitflags::bitflags;

use crate::dn::Dn;
use crate::idl::Id;
use crate::schema::AttrDesc;

bitflags! {
    /// Structural categories a record belongs to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ObjectClassFlags: u32 {
        const ALIAS = 0x01;
        const REFERRAL = 0x02;
        const SUBENTRY = 0x04;
        const DYNAMIC = 0x08;
        const COLLECTIVE_SUBENTRY = 0x10;
        const GLUE = 0x20;
        const SYNC_PROVIDER_SUBENTRY = 0x40;
        const SYNC_CONSUMER_SUBENTRY = 0x80;
    }
}

impl ObjectClassFlags {
    /// Flags implied by a set of objectClass values.
    pub fn from_object_classes<V: AsRef<[u8]>>(values: &[V]) -> Self {
        let mut flags = ObjectClassFlags::empty();
        for value in values {
            let Ok(name) = std::str::from_utf8(value.as_ref()) else {
                continue;
            };
            flags |= match name.trim().to_ascii_lowercase().as_str() {
                "alias" => ObjectClassFlags::ALIAS,
                "referral" => ObjectClassFlags::REFERRAL,
                "subentry" | "ldapsubentry" => ObjectClassFlags::SUBENTRY,
                "dynamicobject" => ObjectClassFlags::DYNAMIC,
                "collectiveattributesubentry" => ObjectClassFlags::COLLECTIVE_SUBENTRY,
                "glue" => ObjectClassFlags::GLUE,
                "syncprovidersubentry" => ObjectClassFlags::SYNC_PROVIDER_SUBENTRY,
                "syncconsumersubentry" => ObjectClassFlags::SYNC_CONSUMER_SUBENTRY,
                _ => ObjectClassFlags::empty(),
            };
        }
        flags
    }
}

bitflags! {
    /// Per-attribute storage flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AttrFlags: u8 {
        /// Values are in equality-rule order.
        const SORTED = 0x01;
        /// Values live in the side table.
        const BIG_MULTI = 0x02;
        /// Stored unsorted; sorted while decoding.
        const SORTED_ON_READ = 0x04;
    }
}

/// One attribute of a record.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub desc: AttrDesc,
    pub vals: Vec<Vec<u8>>,
    /// Present only when some value differs from its normalized form.
    pub nvals: Option<Vec<Vec<u8>>>,
    pub flags: AttrFlags,
}

impl Attribute {
    /// Builds an attribute, normalizing values with the equality rule.
    pub fn new(desc: AttrDesc, vals: Vec<Vec<u8>>) -> Self {
        let normalized: Vec<Vec<u8>> = vals.iter().map(|v| desc.normalize(v)).collect();
        let nvals = (normalized != vals).then_some(normalized);
        let mut attr = Self {
            desc,
            vals,
            nvals,
            flags: AttrFlags::empty(),
        };
        if attr.desc.sorted_values() {
            attr.sort_values();
        }
        attr
    }

    /// Builds an attribute from already-normalized parts.
    pub fn from_parts(desc: AttrDesc, vals: Vec<Vec<u8>>, nvals: Option<Vec<Vec<u8>>>, flags: AttrFlags) -> Self {
        Self {
            desc,
            vals,
            nvals,
            flags,
        }
    }

    pub fn name(&self) -> &str {
        self.desc.name()
    }

    pub fn len(&self) -> usize {
        self.vals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vals.is_empty()
    }

    /// Comparison forms, one per value.
    pub fn normalized(&self) -> &[Vec<u8>] {
        self.nvals.as_deref().unwrap_or(&self.vals)
    }

    pub fn has_distinct_normalized(&self) -> bool {
        self.nvals.is_some()
    }

    /// Position of the value equal to `value` under the equality rule.
    pub fn position_of(&self, value: &[u8]) -> Option<usize> {
        let probe = self.desc.normalize(value);
        self.normalized()
            .iter()
            .position(|n| self.desc.compare_values(n, &probe).is_eq())
    }

    /// Index of the first value that equals an earlier one.
    pub fn first_duplicate(&self) -> Option<usize> {
        let norm = self.normalized();
        (1..norm.len()).find(|&i| {
            norm[..i]
                .iter()
                .any(|earlier| self.desc.compare_values(earlier, &norm[i]).is_eq())
        })
    }

    /// Sorts values into equality-rule order and flags them sorted.
    pub fn sort_values(&mut self) {
        let mut order: Vec<usize> = (0..self.vals.len()).collect();
        {
            let norm = self.normalized();
            order.sort_by(|&a, &b| self.desc.compare_values(&norm[a], &norm[b]));
        }
        self.vals = order.iter().map(|&i| self.vals[i].clone()).collect();
        if let Some(nvals) = &self.nvals {
            self.nvals = Some(order.iter().map(|&i| nvals[i].clone()).collect());
        }
        self.flags |= AttrFlags::SORTED;
    }

    /// Same attribute with `vals` replaced, keeping storage flags.
    pub fn with_values(&self, vals: Vec<Vec<u8>>) -> Self {
        let mut next = Attribute::new(self.desc.clone(), vals);
        next.flags |= self.flags & AttrFlags::BIG_MULTI;
        next
    }

    /// Same type, same raw and normalized values.
    pub fn same_values(&self, other: &Attribute) -> bool {
        self.desc.is(other.desc.name()) && self.vals == other.vals && self.nvals == other.nvals
    }
}

/// A directory record.
#[derive(Debug, Clone)]
pub struct Record {
    pub id: Id,
    pub dn: Dn,
    pub attrs: Vec<Attribute>,
    pub oc_flags: ObjectClassFlags,
}

impl Record {
    pub fn new(id: Id, dn: Dn) -> Self {
        Self {
            id,
            dn,
            attrs: Vec::new(),
            oc_flags: ObjectClassFlags::empty(),
        }
    }

    /// Adds an attribute built from raw values.
    pub fn with_attr<V: AsRef<[u8]>>(mut self, desc: AttrDesc, vals: &[V]) -> Self {
        let vals = vals.iter().map(|v| v.as_ref().to_vec()).collect();
        self.put_attribute(Attribute::new(desc, vals));
        self
    }

    pub fn attr(&self, name: &str) -> Option<&Attribute> {
        self.attrs.iter().find(|a| a.desc.is(name))
    }

    pub fn attr_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.attrs.iter_mut().find(|a| a.desc.is(name))
    }

    /// Replaces the attribute of the same type, or appends it.
    pub fn put_attribute(&mut self, attr: Attribute) {
        match self.attrs.iter_mut().find(|a| a.desc.is(attr.name())) {
            Some(slot) => *slot = attr,
            None => self.attrs.push(attr),
        }
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<Attribute> {
        let pos = self.attrs.iter().position(|a| a.desc.is(name))?;
        Some(self.attrs.remove(pos))
    }

    /// Recomputes the structural flags from objectClass.
    pub fn refresh_oc_flags(&mut self) {
        self.oc_flags = match self.attr("objectClass") {
            Some(oc) => ObjectClassFlags::from_object_classes(&oc.vals),
            None => ObjectClassFlags::empty(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Schema, StaticSchema};

    fn schema() -> StaticSchema {
        StaticSchema::standard()
    }

    #[test]
    fn test_nvals_only_when_distinct() {
        let s = schema();
        let same = Attribute::new(s.attribute("cn").unwrap(), vec![b"alice".to_vec()]);
        assert!(!same.has_distinct_normalized());
        let differs = Attribute::new(s.attribute("cn").unwrap(), vec![b"Alice".to_vec()]);
        assert_eq!(differs.normalized(), &[b"alice".to_vec()]);
    }

    #[test]
    fn test_sorted_types_sort_on_build() {
        let s = schema();
        let member = Attribute::new(
            s.attribute("member").unwrap(),
            vec![b"cn=b,dc=com".to_vec(), b"cn=a,dc=com".to_vec()],
        );
        assert!(member.flags.contains(AttrFlags::SORTED));
        assert_eq!(member.vals[0], b"cn=a,dc=com".to_vec());
    }

    #[test]
    fn test_position_and_duplicates() {
        let s = schema();
        let attr = Attribute::new(
            s.attribute("mail").unwrap(),
            vec![b"A@x".to_vec(), b"b@x".to_vec(), b"a@X".to_vec()],
        );
        assert_eq!(attr.position_of(b"B@X"), Some(1));
        assert_eq!(attr.first_duplicate(), Some(2));
    }

    #[test]
    fn test_oc_flags() {
        let s = schema();
        let mut rec = Record::new(1, Dn::parse("cn=x,dc=com").unwrap())
            .with_attr(s.attribute("objectClass").unwrap(), &["top", "Alias", "glue"]);
        rec.refresh_oc_flags();
        assert_eq!(rec.oc_flags, ObjectClassFlags::ALIAS | ObjectClassFlags::GLUE);
        assert!(rec.remove_attribute("objectclass").is_some());
        rec.refresh_oc_flags();
        assert!(rec.oc_flags.is_empty());
    }
}
