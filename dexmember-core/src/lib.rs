//! dexmember-core: declared and referenced member extraction for Android and
//! JVM bytecode.
//!
//! Given dex images, class files, jars, apks or aars, this library lists every
//! method and field symbol they touch and splits them into members *declared*
//! by the inputs and members *referenced* from elsewhere.
//!
//! # Pipeline
//!
//! raw artifact bytes → [`convert`] (desugaring class files when needed) →
//! canonical units → [`mapping`] (optional de-obfuscation) → [`extract`] →
//! [`aggregate`] → cached, sorted lists behind [`DexParser`].
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use dexmember_core::prelude::*;
//!
//! let parser = DexParser::from_paths(&["app-release.apk"])?;
//! println!("{} canonical units", parser.unit_count()?);
//! for member in parser.referenced_members()? {
//!     println!("{}", member);
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`member`], [`descriptor`]: member values and their total order
//! - [`dex`], [`classfile`]: bytecode readers
//! - [`convert`], [`desugar`]: container detection and conversion
//! - [`mapping`]: obfuscation mapping
//! - [`extract`], [`aggregate`]: per-unit extraction and the parallel fold
//! - [`parser`]: the cached query facade
//! - [`scan`], [`config`], [`report`], [`logging`]: CLI support
//! - [`error`]: typed error handling
//!
//! # Cargo Features
//!
//! - `d8` (default): desugaring through an external `d8` executable
//! - `proguard` (default): ProGuard/R8 mapping file loader
//! - `full`: enable all optional features

pub mod aggregate;
pub mod classfile;
pub mod config;
pub mod convert;
pub mod descriptor;
pub mod desugar;
pub mod dex;
pub mod error;
pub mod extract;
pub mod logging;
pub mod mapping;
pub mod member;
pub mod mutf8;
pub mod parser;
pub mod prelude;
pub mod report;
pub mod scan;
pub mod unit;

#[cfg(feature = "d8")]
pub mod d8;

// ============================================================================
// Explicit Re-exports
// ============================================================================

// Error types
pub use error::{DexMemberError, DexMemberResult, IoResultExt};

// Member model
pub use descriptor::{parse_field_descriptor, parse_method_descriptor, TypeDescriptor};
pub use member::{FieldMember, Member, MethodMember};

// Canonical units and conversion
pub use classfile::{is_class_file, parse_class, ClassFile};
pub use convert::{convert, detect_kind, ContainerKind, Decoder};
pub use desugar::{
    ClassFileConverter, ClassInput, DesugarConfig, Desugarer, DEFAULT_MIN_API_LEVEL,
    MIN_API_LEVEL_FLOOR,
};
pub use dex::{is_dex, parse_dex, DexDecoder};
pub use unit::{CanonicalUnit, MemberUnit};

// Mapping
pub use mapping::{ApiMapping, MappedUnit, TypeMapping};

// Extraction and aggregation
pub use aggregate::{aggregate, AggregatedMembers};
pub use extract::{extract_members, UnitMembers};

// Query facade
pub use parser::{Artifact, DexParser, KindFilter, Scope, Selection};

// Configuration
pub use config::{
    load_config, load_config_file, DesugaringSection, DexMemberConfig, OutputConfig,
    CONFIG_FILE_NAME,
};

// Logging
pub use logging::init_logging;

// Reporting
pub use report::{format_json, format_plain, print_json, print_plain};

// File scanning
pub use scan::{gather_artifacts, gather_artifacts_in, has_artifact_extension, read_artifacts};

#[cfg(feature = "d8")]
pub use d8::{D8Desugarer, D8Invocation};

#[cfg(test)]
mod testing;
