//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use dexmember_core::prelude::*;
//! ```

// Core types
pub use crate::error::{DexMemberError, DexMemberResult};
pub use crate::member::{FieldMember, Member, MethodMember};
pub use crate::descriptor::TypeDescriptor;

// Query facade
pub use crate::parser::{Artifact, DexParser, KindFilter, Scope, Selection};

// Configuration of a parser
pub use crate::desugar::DesugarConfig;
pub use crate::mapping::ApiMapping;

// Collaborator seams
pub use crate::convert::{ContainerKind, Decoder};
pub use crate::desugar::{ClassInput, Desugarer};
pub use crate::unit::CanonicalUnit;

#[cfg(feature = "d8")]
pub use crate::d8::D8Desugarer;
