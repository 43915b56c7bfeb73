//! Canonical bytecode units.
//!
//! Every decoder and desugarer hands back units through [`CanonicalUnit`];
//! extraction never looks at the concrete type behind it.

use std::collections::BTreeSet;
use std::fmt;

use crate::descriptor::TypeDescriptor;
use crate::member::Member;

/// One decoded bytecode container, as seen by member extraction.
pub trait CanonicalUnit: Send + Sync + fmt::Debug {
    /// Every member symbol the unit touches.
    fn all_members(&self) -> Vec<Member>;

    /// Members defined by a type of this unit.
    fn declared_members(&self) -> Vec<Member>;

    /// Members used by this unit but defined elsewhere.
    fn referenced_members(&self) -> Vec<Member>;
}

/// A unit described by its defined types and the members it touches.
///
/// A member counts as declared exactly when its declaring type is defined in
/// the unit, so declared and referenced partition `members`.
#[derive(Debug, Clone, Default)]
pub struct MemberUnit {
    name: String,
    defined_types: BTreeSet<TypeDescriptor>,
    members: Vec<Member>,
}

impl MemberUnit {
    pub fn new(
        name: impl Into<String>,
        defined_types: BTreeSet<TypeDescriptor>,
        members: Vec<Member>,
    ) -> Self {
        Self {
            name: name.into(),
            defined_types,
            members,
        }
    }

    /// Name of the artifact (or archive entry) this unit came from.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn defined_types(&self) -> &BTreeSet<TypeDescriptor> {
        &self.defined_types
    }

    fn is_declared(&self, member: &Member) -> bool {
        self.defined_types.contains(member.declaring_type())
    }
}

impl CanonicalUnit for MemberUnit {
    fn all_members(&self) -> Vec<Member> {
        self.members.clone()
    }

    fn declared_members(&self) -> Vec<Member> {
        self.members
            .iter()
            .filter(|m| self.is_declared(m))
            .cloned()
            .collect()
    }

    fn referenced_members(&self) -> Vec<Member> {
        self.members
            .iter()
            .filter(|m| !self.is_declared(m))
            .cloned()
            .collect()
    }
}
