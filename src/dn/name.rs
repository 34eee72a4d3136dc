//! Distinguished names
//!
//! A DN is kept as its relative names, leaf first, in both original and
//! normalized form. Normalization lowercases attribute types and values,
//! trims and folds whitespace, and orders the parts of a multi-valued RDN.

use std::fmt;

use super::errors::{DnError, DnResult};

/// A parsed distinguished name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Dn {
    name: String,
    nname: String,
    rdns: Vec<String>,
    nrdns: Vec<String>,
}

/// Splits at every unescaped `sep`.
fn split_unescaped(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == sep {
            parts.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts
}

fn fold_value(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn normalize_rdn(dn: &str, rdn: &str) -> DnResult<String> {
    let mut avas = Vec::new();
    for ava in split_unescaped(rdn, '+') {
        let (attr, value) = ava
            .split_once('=')
            .ok_or_else(|| DnError::invalid(dn, format!("component {rdn:?} has no '='")))?;
        let attr = attr.trim();
        if attr.is_empty() {
            return Err(DnError::invalid(dn, format!("component {rdn:?} has no type")));
        }
        avas.push(format!("{}={}", attr.to_ascii_lowercase(), fold_value(value)));
    }
    avas.sort();
    Ok(avas.join("+"))
}

impl Dn {
    /// Parses a DN string. The empty string is the root DN.
    pub fn parse(s: &str) -> DnResult<Dn> {
        if s.trim().is_empty() {
            return Ok(Dn::default());
        }
        let mut rdns = Vec::new();
        let mut nrdns = Vec::new();
        for rdn in split_unescaped(s, ',') {
            let rdn = rdn.trim();
            if rdn.is_empty() {
                return Err(DnError::invalid(s, "empty component"));
            }
            nrdns.push(normalize_rdn(s, rdn)?);
            rdns.push(rdn.to_string());
        }
        Ok(Dn::from_parts(rdns, nrdns))
    }

    fn from_parts(rdns: Vec<String>, nrdns: Vec<String>) -> Dn {
        Dn {
            name: rdns.join(","),
            nname: nrdns.join(","),
            rdns,
            nrdns,
        }
    }

    /// Original-case form.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Normalized form.
    pub fn nname(&self) -> &str {
        &self.nname
    }

    pub fn is_root(&self) -> bool {
        self.rdns.is_empty()
    }

    /// Number of relative names.
    pub fn len(&self) -> usize {
        self.rdns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rdns.is_empty()
    }

    /// Relative names, leaf first.
    pub fn rdns(&self) -> &[String] {
        &self.rdns
    }

    /// Normalized relative names, leaf first.
    pub fn nrdns(&self) -> &[String] {
        &self.nrdns
    }

    /// Leaf relative name.
    pub fn rdn(&self) -> Option<&str> {
        self.rdns.first().map(String::as_str)
    }

    /// Normalized leaf relative name.
    pub fn nrdn(&self) -> Option<&str> {
        self.nrdns.first().map(String::as_str)
    }

    /// The DN one level up; `None` for the root.
    pub fn parent(&self) -> Option<Dn> {
        if self.is_root() {
            return None;
        }
        Some(self.tail(self.len() - 1))
    }

    /// The last `n` relative names.
    pub fn tail(&self, n: usize) -> Dn {
        let skip = self.len().saturating_sub(n);
        Dn::from_parts(self.rdns[skip..].to_vec(), self.nrdns[skip..].to_vec())
    }

    /// True if `self` equals `ancestor` or lies below it.
    pub fn is_within(&self, ancestor: &Dn) -> bool {
        self.len() >= ancestor.len() && self.nrdns[self.len() - ancestor.len()..] == ancestor.nrdns[..]
    }

    /// A child of `self` named by `rdn`.
    pub fn child(&self, rdn: &str) -> DnResult<Dn> {
        let leaf = Dn::parse(rdn)?;
        if leaf.len() != 1 {
            return Err(DnError::invalid(rdn, "expected a single component"));
        }
        let mut rdns = leaf.rdns;
        rdns.extend(self.rdns.iter().cloned());
        let mut nrdns = leaf.nrdns;
        nrdns.extend(self.nrdns.iter().cloned());
        Ok(Dn::from_parts(rdns, nrdns))
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
