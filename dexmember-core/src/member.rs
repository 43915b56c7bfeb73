//! Method and field symbols with a canonical total order.
//!
//! Ordering is structural: declaring type, then name, then descriptor text,
//! with fields before methods as the last tie-break. Method descriptors start
//! with `(`, so a method sorts before a same-named field of its owner.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::descriptor::TypeDescriptor;

/// A method symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodMember {
    pub declaring_type: TypeDescriptor,
    pub name: String,
    pub parameter_types: Vec<TypeDescriptor>,
    pub return_type: TypeDescriptor,
}

impl MethodMember {
    pub fn new(
        declaring_type: TypeDescriptor,
        name: impl Into<String>,
        parameter_types: Vec<TypeDescriptor>,
        return_type: TypeDescriptor,
    ) -> Self {
        Self {
            declaring_type,
            name: name.into(),
            parameter_types,
            return_type,
        }
    }

    /// Raw method descriptor, e.g. `(ILjava/lang/String;)V`.
    pub fn descriptor(&self) -> String {
        let mut out = String::from("(");
        for param in &self.parameter_types {
            out.push_str(param.as_str());
        }
        out.push(')');
        out.push_str(self.return_type.as_str());
        out
    }
}

impl fmt::Display for MethodMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .parameter_types
            .iter()
            .map(TypeDescriptor::source_name)
            .collect();
        write!(
            f,
            "{} {}({}): {}",
            self.declaring_type,
            self.name,
            params.join(", "),
            self.return_type
        )
    }
}

/// A field symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldMember {
    pub declaring_type: TypeDescriptor,
    pub name: String,
    pub field_type: TypeDescriptor,
}

impl FieldMember {
    pub fn new(
        declaring_type: TypeDescriptor,
        name: impl Into<String>,
        field_type: TypeDescriptor,
    ) -> Self {
        Self {
            declaring_type,
            name: name.into(),
            field_type,
        }
    }
}

impl fmt::Display for FieldMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.declaring_type, self.name, self.field_type)
    }
}

/// A member symbol of either kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Member {
    Method(MethodMember),
    Field(FieldMember),
}

impl Member {
    pub fn declaring_type(&self) -> &TypeDescriptor {
        match self {
            Self::Method(m) => &m.declaring_type,
            Self::Field(f) => &f.declaring_type,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Method(m) => &m.name,
            Self::Field(f) => &f.name,
        }
    }

    /// Method descriptor or field type descriptor.
    pub fn descriptor(&self) -> String {
        match self {
            Self::Method(m) => m.descriptor(),
            Self::Field(f) => f.field_type.as_str().to_string(),
        }
    }

    pub fn as_method(&self) -> Option<&MethodMember> {
        match self {
            Self::Method(m) => Some(m),
            Self::Field(_) => None,
        }
    }

    pub fn as_field(&self) -> Option<&FieldMember> {
        match self {
            Self::Field(f) => Some(f),
            Self::Method(_) => None,
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Self::Field(_) => 0,
            Self::Method(_) => 1,
        }
    }
}

impl Ord for Member {
    fn cmp(&self, other: &Self) -> Ordering {
        self.declaring_type()
            .cmp(other.declaring_type())
            .then_with(|| self.name().cmp(other.name()))
            .then_with(|| self.descriptor().cmp(&other.descriptor()))
            .then_with(|| self.kind_rank().cmp(&other.kind_rank()))
    }
}

impl PartialOrd for Member {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<MethodMember> for Member {
    fn from(m: MethodMember) -> Self {
        Self::Method(m)
    }
}

impl From<FieldMember> for Member {
    fn from(f: FieldMember) -> Self {
        Self::Field(f)
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Method(m) => m.fmt(f),
            Self::Field(field) => field.fmt(f),
        }
    }
}
