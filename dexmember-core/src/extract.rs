//! Per-unit member extraction.
//!
//! The decoder's three lists are reconciled so that declared and referenced
//! never overlap and `all` covers both.

use std::collections::HashSet;

use serde::Serialize;

use crate::member::Member;
use crate::unit::CanonicalUnit;

/// The member triple of one canonical unit (or of several, after merging).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnitMembers {
    /// Every member the unit touches
    pub all: Vec<Member>,
    /// Members defined in the unit
    pub declared: Vec<Member>,
    /// Members used but defined elsewhere
    pub referenced: Vec<Member>,
}

impl UnitMembers {
    /// Concatenate another triple onto this one. No dedup happens here.
    pub fn merge(&mut self, other: UnitMembers) {
        self.all.extend(other.all);
        self.declared.extend(other.declared);
        self.referenced.extend(other.referenced);
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty() && self.declared.is_empty() && self.referenced.is_empty()
    }
}

/// Pull the declared/referenced/all lists out of a unit.
///
/// Declared wins over referenced when a decoder reports a member in both, and
/// anything missing from `all` is added to it.
pub fn extract_members(unit: &dyn CanonicalUnit) -> UnitMembers {
    let mut all = unit.all_members();
    let declared = unit.declared_members();
    let reported_referenced = unit.referenced_members();

    let declared_set: HashSet<&Member> = declared.iter().collect();
    let reported = reported_referenced.len();
    let referenced: Vec<Member> = reported_referenced
        .into_iter()
        .filter(|m| !declared_set.contains(m))
        .collect();
    let overlapping = reported - referenced.len();

    let missing: Vec<Member> = {
        let known: HashSet<&Member> = all.iter().collect();
        declared
            .iter()
            .chain(referenced.iter())
            .filter(|m| !known.contains(m))
            .cloned()
            .collect()
    };

    if overlapping > 0 || !missing.is_empty() {
        tracing::debug!(
            unit = ?unit,
            overlapping,
            missing = missing.len(),
            "reconciled decoder member lists"
        );
    }
    all.extend(missing);

    UnitMembers {
        all,
        declared,
        referenced,
    }
}
