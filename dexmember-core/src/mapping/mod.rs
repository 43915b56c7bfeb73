//! Translation of obfuscated identifiers back to their original names.
//!
//! # Components
//!
//! - [`ApiMapping`]: the type/field/method rename tables
//! - [`MappedUnit`]: a canonical unit viewed through a mapping
//! - `proguard`: loader for ProGuard/R8 `mapping.txt` files (feature `proguard`)
//!
//! Method entries are keyed by obfuscated name plus the *original* parameter
//! and return types, which is how ProGuard records them. Lookups therefore
//! translate a member's types first and then its name.

#[cfg(feature = "proguard")]
pub mod proguard;

use std::collections::HashMap;
use std::fmt;

use crate::descriptor::TypeDescriptor;
use crate::member::{FieldMember, Member, MethodMember};
use crate::unit::CanonicalUnit;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MethodKey {
    name: String,
    parameter_types: Vec<TypeDescriptor>,
    return_type: TypeDescriptor,
}

/// Renames for one obfuscated type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMapping {
    original: TypeDescriptor,
    fields: HashMap<String, String>,
    methods: HashMap<MethodKey, String>,
}

impl TypeMapping {
    fn new(original: TypeDescriptor) -> Self {
        Self {
            original,
            fields: HashMap::new(),
            methods: HashMap::new(),
        }
    }

    pub fn original(&self) -> &TypeDescriptor {
        &self.original
    }

    /// Record `obfuscated` → `original` for a field of this type.
    pub fn add_field(&mut self, obfuscated: impl Into<String>, original: impl Into<String>) -> &mut Self {
        self.fields.insert(obfuscated.into(), original.into());
        self
    }

    /// Record a method rename. Parameter and return descriptors are the
    /// original (unobfuscated) types.
    pub fn add_method(
        &mut self,
        obfuscated: impl Into<String>,
        parameter_types: &[&str],
        return_type: &str,
        original: impl Into<String>,
    ) -> &mut Self {
        let key = MethodKey {
            name: obfuscated.into(),
            parameter_types: parameter_types.iter().map(|p| TypeDescriptor::new(*p)).collect(),
            return_type: TypeDescriptor::new(return_type),
        };
        self.methods.insert(key, original.into());
        self
    }

    #[cfg_attr(not(feature = "proguard"), allow(dead_code))]
    pub(crate) fn insert_method(
        &mut self,
        obfuscated: String,
        parameter_types: Vec<TypeDescriptor>,
        return_type: TypeDescriptor,
        original: String,
    ) {
        let key = MethodKey {
            name: obfuscated,
            parameter_types,
            return_type,
        };
        self.methods.insert(key, original);
    }
}

/// Obfuscated → original identifier tables. The default is empty (identity).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiMapping {
    types: HashMap<TypeDescriptor, TypeMapping>,
}

impl ApiMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Number of mapped types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Add (or fetch) the entry for an obfuscated type and return it for
    /// member registration. Both arguments are type descriptors.
    pub fn add_type(&mut self, obfuscated: &str, original: &str) -> &mut TypeMapping {
        self.types
            .entry(TypeDescriptor::new(obfuscated))
            .or_insert_with(|| TypeMapping::new(TypeDescriptor::new(original)))
    }

    /// Translate a type, including array element types. Primitives and
    /// unmapped types pass through.
    pub fn map_type(&self, ty: &TypeDescriptor) -> TypeDescriptor {
        if ty.array_dimensions() > 0 {
            let element = ty.element_type();
            return match self.types.get(&element) {
                Some(mapping) => ty.with_element_type(&mapping.original),
                None => ty.clone(),
            };
        }
        match self.types.get(ty) {
            Some(mapping) => mapping.original.clone(),
            None => ty.clone(),
        }
    }

    pub fn map_field(&self, field: &FieldMember) -> FieldMember {
        let name = self
            .types
            .get(&field.declaring_type)
            .and_then(|t| t.fields.get(&field.name))
            .unwrap_or(&field.name);
        FieldMember::new(
            self.map_type(&field.declaring_type),
            name.clone(),
            self.map_type(&field.field_type),
        )
    }

    pub fn map_method(&self, method: &MethodMember) -> MethodMember {
        let parameter_types: Vec<TypeDescriptor> =
            method.parameter_types.iter().map(|p| self.map_type(p)).collect();
        let return_type = self.map_type(&method.return_type);

        let name = match self.types.get(&method.declaring_type) {
            Some(mapping) if !mapping.methods.is_empty() => {
                let key = MethodKey {
                    name: method.name.clone(),
                    parameter_types: parameter_types.clone(),
                    return_type: return_type.clone(),
                };
                mapping.methods.get(&key).unwrap_or(&method.name).clone()
            }
            _ => method.name.clone(),
        };

        MethodMember::new(
            self.map_type(&method.declaring_type),
            name,
            parameter_types,
            return_type,
        )
    }

    pub fn map_member(&self, member: &Member) -> Member {
        if self.is_empty() {
            return member.clone();
        }
        match member {
            Member::Method(m) => Member::Method(self.map_method(m)),
            Member::Field(f) => Member::Field(self.map_field(f)),
        }
    }
}

/// A canonical unit seen through an [`ApiMapping`].
pub struct MappedUnit<'a> {
    unit: &'a dyn CanonicalUnit,
    mapping: &'a ApiMapping,
}

impl<'a> MappedUnit<'a> {
    pub fn new(unit: &'a dyn CanonicalUnit, mapping: &'a ApiMapping) -> Self {
        Self { unit, mapping }
    }

    fn map_all(&self, members: Vec<Member>) -> Vec<Member> {
        if self.mapping.is_empty() {
            return members;
        }
        members.iter().map(|m| self.mapping.map_member(m)).collect()
    }
}

impl fmt::Debug for MappedUnit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedUnit")
            .field("unit", &self.unit)
            .field("mapped_types", &self.mapping.len())
            .finish()
    }
}

impl CanonicalUnit for MappedUnit<'_> {
    fn all_members(&self) -> Vec<Member> {
        self.map_all(self.unit.all_members())
    }

    fn declared_members(&self) -> Vec<Member> {
        self.map_all(self.unit.declared_members())
    }

    fn referenced_members(&self) -> Vec<Member> {
        self.map_all(self.unit.referenced_members())
    }
}
