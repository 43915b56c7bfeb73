//! JVM type descriptors as they appear in dex and class files.
//!
//! A descriptor is kept in its raw form (`I`, `Ljava/lang/String;`, `[[J`)
//! so ordering matches the byte order of the binary formats.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single JVM type descriptor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeDescriptor(String);

impl TypeDescriptor {
    /// Wrap an already well-formed descriptor.
    pub fn new(descriptor: impl Into<String>) -> Self {
        Self(descriptor.into())
    }

    /// Build a descriptor from a class-file internal name (`java/lang/Object`).
    ///
    /// Array classes are referenced by their descriptor in the constant pool,
    /// so names starting with `[` are kept verbatim.
    pub fn from_internal_name(name: &str) -> Self {
        if name.starts_with('[') {
            Self(name.to_string())
        } else {
            Self(format!("L{};", name))
        }
    }

    /// Build a descriptor from a dotted source name (`java.lang.Object`, `int[]`).
    pub fn from_source_name(name: &str) -> Self {
        let mut base = name.trim();
        let mut dims = 0;
        while let Some(stripped) = base.strip_suffix("[]") {
            base = stripped;
            dims += 1;
        }
        let element = match base {
            "void" => "V".to_string(),
            "boolean" => "Z".to_string(),
            "byte" => "B".to_string(),
            "char" => "C".to_string(),
            "short" => "S".to_string(),
            "int" => "I".to_string(),
            "long" => "J".to_string(),
            "float" => "F".to_string(),
            "double" => "D".to_string(),
            other => format!("L{};", other.replace('.', "/")),
        };
        Self(format!("{}{}", "[".repeat(dims), element))
    }

    /// The raw descriptor text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of leading array dimensions.
    pub fn array_dimensions(&self) -> usize {
        self.0.bytes().take_while(|b| *b == b'[').count()
    }

    /// The innermost element type for arrays, or the type itself.
    pub fn element_type(&self) -> TypeDescriptor {
        Self(self.0[self.array_dimensions()..].to_string())
    }

    /// Rebuild an array type around a new element type.
    pub fn with_element_type(&self, element: &TypeDescriptor) -> TypeDescriptor {
        Self(format!("{}{}", "[".repeat(self.array_dimensions()), element.0))
    }

    /// Whether this is a class (reference, non-array) type.
    pub fn is_class(&self) -> bool {
        self.0.starts_with('L') && self.0.ends_with(';')
    }

    /// Java source form: `int`, `java.lang.String`, `long[][]`.
    pub fn source_name(&self) -> String {
        let dims = self.array_dimensions();
        let element = &self.0[dims..];
        let base = match element {
            "V" => "void".to_string(),
            "Z" => "boolean".to_string(),
            "B" => "byte".to_string(),
            "C" => "char".to_string(),
            "S" => "short".to_string(),
            "I" => "int".to_string(),
            "J" => "long".to_string(),
            "F" => "float".to_string(),
            "D" => "double".to_string(),
            other => other
                .strip_prefix('L')
                .and_then(|s| s.strip_suffix(';'))
                .unwrap_or(other)
                .replace('/', "."),
        };
        format!("{}{}", base, "[]".repeat(dims))
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source_name())
    }
}

/// Length in bytes of the single descriptor at the start of `text`.
fn descriptor_len(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let dims = bytes.iter().take_while(|b| **b == b'[').count();
    match bytes.get(dims)? {
        b'Z' | b'B' | b'C' | b'S' | b'I' | b'J' | b'F' | b'D' | b'V' => Some(dims + 1),
        b'L' => text[dims..].find(';').map(|end| dims + end + 1),
        _ => None,
    }
}

/// Split a method descriptor `(I[Ljava/lang/String;)V` into parameter and return types.
///
/// Returns `None` when the text is not a well-formed method descriptor.
pub fn parse_method_descriptor(text: &str) -> Option<(Vec<TypeDescriptor>, TypeDescriptor)> {
    let rest = text.strip_prefix('(')?;
    let close = rest.find(')')?;
    let mut params_text = &rest[..close];
    let return_text = &rest[close + 1..];

    let mut params = Vec::new();
    while !params_text.is_empty() {
        let len = descriptor_len(params_text)?;
        let param = &params_text[..len];
        if param.ends_with('V') && param.len() == 1 {
            return None;
        }
        params.push(TypeDescriptor::new(param));
        params_text = &params_text[len..];
    }

    if descriptor_len(return_text)? != return_text.len() {
        return None;
    }
    Some((params, TypeDescriptor::new(return_text)))
}

/// Validate a single field descriptor.
pub fn parse_field_descriptor(text: &str) -> Option<TypeDescriptor> {
    match descriptor_len(text) {
        Some(len) if len == text.len() && text != "V" => Some(TypeDescriptor::new(text)),
        _ => None,
    }
}
