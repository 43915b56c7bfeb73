//! Query facade over a set of bytecode artifacts.
//!
//! `ApiMapping::load_proguard` needs the `proguard` feature, which is on by
//! default.
//!
//! ```rust,ignore
//! use dexmember_core::prelude::*;
//!
//! let parser = DexParser::from_paths(&["app.apk", "lib.jar"])?
//!     .with_api_mapping(ApiMapping::load_proguard("mapping.txt".as_ref())?)
//!     .with_desugaring(DesugarConfig::new(21, vec![]));
//!
//! for method in parser.referenced_methods()? {
//!     println!("{}", method);
//! }
//! ```
//!
//! Nothing is decoded until the first query. The aggregated result is then
//! computed once and kept for the lifetime of the parser. Reconfiguring with
//! one of the `with_*` methods yields a new parser that shares the input
//! bytes and starts with an empty cache.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use crate::aggregate::{aggregate, AggregatedMembers};
use crate::convert::Decoder;
use crate::desugar::{ClassFileConverter, DesugarConfig, Desugarer};
use crate::dex::DexDecoder;
use crate::error::{DexMemberResult, IoResultExt};
use crate::mapping::ApiMapping;
use crate::member::{FieldMember, Member, MethodMember};

/// One named input buffer.
#[derive(Clone)]
pub struct Artifact {
    /// Display name used in logs and errors (usually the file path)
    pub name: String,
    pub bytes: Arc<[u8]>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read an artifact from disk, named by its path.
    pub fn read(path: &Path) -> DexMemberResult<Self> {
        let bytes = std::fs::read(path).with_path(path)?;
        Ok(Self::new(path.display().to_string(), bytes))
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Which classification to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    #[default]
    All,
    Declared,
    Referenced,
}

/// Which member kinds to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KindFilter {
    #[default]
    Both,
    Methods,
    Fields,
}

impl KindFilter {
    pub fn accepts(self, member: &Member) -> bool {
        match self {
            Self::Both => true,
            Self::Methods => matches!(member, Member::Method(_)),
            Self::Fields => matches!(member, Member::Field(_)),
        }
    }
}

/// A scope plus kind filter, as chosen on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selection {
    pub scope: Scope,
    pub kind: KindFilter,
}

impl Selection {
    pub fn new(scope: Scope, kind: KindFilter) -> Self {
        Self { scope, kind }
    }
}

fn methods(members: &[Member]) -> Vec<&MethodMember> {
    members.iter().filter_map(Member::as_method).collect()
}

fn fields(members: &[Member]) -> Vec<&FieldMember> {
    members.iter().filter_map(Member::as_field).collect()
}

/// Lazily extracts declared and referenced members from bytecode artifacts.
pub struct DexParser {
    inputs: Arc<[Artifact]>,
    mapping: Arc<ApiMapping>,
    desugaring: DesugarConfig,
    decoder: Arc<dyn Decoder>,
    desugarer: Arc<dyn Desugarer>,
    cache: OnceLock<AggregatedMembers>,
    /// Held while the first computation runs
    compute_lock: Mutex<()>,
}

impl DexParser {
    /// Create a parser over the given artifacts. Nothing is read yet.
    pub fn new(inputs: impl IntoIterator<Item = Artifact>) -> Self {
        Self::with_parts(
            inputs.into_iter().collect(),
            Arc::new(ApiMapping::default()),
            DesugarConfig::default(),
            Arc::new(DexDecoder),
            Arc::new(ClassFileConverter),
        )
    }

    /// Create a parser over anonymous buffers, named `input-0`, `input-1`, ...
    pub fn from_bytes<B: Into<Arc<[u8]>>>(inputs: impl IntoIterator<Item = B>) -> Self {
        Self::new(
            inputs
                .into_iter()
                .enumerate()
                .map(|(i, bytes)| Artifact::new(format!("input-{}", i), bytes)),
        )
    }

    /// Read every path into memory and create a parser over them.
    pub fn from_paths<P: AsRef<Path>>(paths: &[P]) -> DexMemberResult<Self> {
        let artifacts = paths
            .iter()
            .map(|p| Artifact::read(p.as_ref()))
            .collect::<DexMemberResult<Vec<_>>>()?;
        Ok(Self::new(artifacts))
    }

    fn with_parts(
        inputs: Arc<[Artifact]>,
        mapping: Arc<ApiMapping>,
        desugaring: DesugarConfig,
        decoder: Arc<dyn Decoder>,
        desugarer: Arc<dyn Desugarer>,
    ) -> Self {
        Self {
            inputs,
            mapping,
            desugaring,
            decoder,
            desugarer,
            cache: OnceLock::new(),
            compute_lock: Mutex::new(()),
        }
    }

    fn reconfigured(&self) -> Self {
        Self::with_parts(
            Arc::clone(&self.inputs),
            Arc::clone(&self.mapping),
            self.desugaring.clone(),
            Arc::clone(&self.decoder),
            Arc::clone(&self.desugarer),
        )
    }

    /// A new parser that renames members through `mapping`.
    pub fn with_api_mapping(&self, mapping: impl Into<Arc<ApiMapping>>) -> Self {
        Self {
            mapping: mapping.into(),
            ..self.reconfigured()
        }
    }

    /// A new parser with different desugaring settings.
    pub fn with_desugaring(&self, desugaring: DesugarConfig) -> Self {
        Self {
            desugaring,
            ..self.reconfigured()
        }
    }

    /// A new parser using another dex decoder.
    pub fn with_decoder(&self, decoder: Arc<dyn Decoder>) -> Self {
        Self {
            decoder,
            ..self.reconfigured()
        }
    }

    /// A new parser using another desugarer for class-file inputs.
    pub fn with_desugarer(&self, desugarer: Arc<dyn Desugarer>) -> Self {
        Self {
            desugarer,
            ..self.reconfigured()
        }
    }

    pub fn inputs(&self) -> &[Artifact] {
        &self.inputs
    }

    pub fn api_mapping(&self) -> &ApiMapping {
        &self.mapping
    }

    pub fn desugaring(&self) -> &DesugarConfig {
        &self.desugaring
    }

    /// The aggregated result, computing it on first use.
    ///
    /// Concurrent first callers wait for a single computation. A failed
    /// computation leaves the cache empty, so the next call tries again.
    pub fn aggregated(&self) -> DexMemberResult<&AggregatedMembers> {
        if let Some(result) = self.cache.get() {
            return Ok(result);
        }

        let _guard = self.compute_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(result) = self.cache.get() {
            return Ok(result);
        }

        let result = aggregate(
            &self.inputs,
            &self.mapping,
            &self.desugaring,
            self.decoder.as_ref(),
            self.desugarer.as_ref(),
        )?;
        Ok(self.cache.get_or_init(|| result))
    }

    pub fn all_members(&self) -> DexMemberResult<&[Member]> {
        Ok(&self.aggregated()?.all)
    }

    pub fn declared_members(&self) -> DexMemberResult<&[Member]> {
        Ok(&self.aggregated()?.declared)
    }

    pub fn referenced_members(&self) -> DexMemberResult<&[Member]> {
        Ok(&self.aggregated()?.referenced)
    }

    pub fn all_methods(&self) -> DexMemberResult<Vec<&MethodMember>> {
        Ok(methods(self.all_members()?))
    }

    pub fn all_fields(&self) -> DexMemberResult<Vec<&FieldMember>> {
        Ok(fields(self.all_members()?))
    }

    pub fn declared_methods(&self) -> DexMemberResult<Vec<&MethodMember>> {
        Ok(methods(self.declared_members()?))
    }

    pub fn declared_fields(&self) -> DexMemberResult<Vec<&FieldMember>> {
        Ok(fields(self.declared_members()?))
    }

    pub fn referenced_methods(&self) -> DexMemberResult<Vec<&MethodMember>> {
        Ok(methods(self.referenced_members()?))
    }

    pub fn referenced_fields(&self) -> DexMemberResult<Vec<&FieldMember>> {
        Ok(fields(self.referenced_members()?))
    }

    /// Number of canonical units produced from all inputs.
    pub fn unit_count(&self) -> DexMemberResult<usize> {
        Ok(self.aggregated()?.unit_count)
    }

    /// Members matching a selection, in sorted order.
    pub fn members(&self, selection: Selection) -> DexMemberResult<Vec<Member>> {
        let scoped = match selection.scope {
            Scope::All => self.all_members()?,
            Scope::Declared => self.declared_members()?,
            Scope::Referenced => self.referenced_members()?,
        };
        Ok(scoped
            .iter()
            .filter(|m| selection.kind.accepts(m))
            .cloned()
            .collect())
    }
}

impl fmt::Debug for DexParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DexParser")
            .field("inputs", &self.inputs)
            .field("mapped_types", &self.mapping.len())
            .field("desugaring", &self.desugaring)
            .field("computed", &self.cache.get().is_some())
            .finish()
    }
}
