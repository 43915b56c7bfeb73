//! Desugaring of class-file inputs into canonical units.
//!
//! The [`Desugarer`] trait is the seam to the conversion toolchain. Two
//! implementations ship with the crate:
//!
//! - [`ClassFileConverter`]: in-process, reads class files directly and
//!   performs no bytecode rewriting
//! - [`D8Desugarer`](crate::d8::D8Desugarer): drives an external `d8`
//!   executable (feature `d8`)

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use zip::ZipArchive;

use crate::classfile::{parse_class, ClassFile};
use crate::convert::{read_entry_bytes, ContainerKind};
use crate::error::{DexMemberError, DexMemberResult};
use crate::unit::{CanonicalUnit, MemberUnit};

/// Default minimum API level.
pub const DEFAULT_MIN_API_LEVEL: u32 = 29;

/// Lowest API level accepted by the desugarers.
pub const MIN_API_LEVEL_FLOOR: u32 = 1;

/// Desugaring settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesugarConfig {
    /// Minimum supported platform API level
    pub min_api_level: u32,
    /// Library archives used for symbol resolution only
    #[serde(default)]
    pub library_archives: Vec<PathBuf>,
}

impl Default for DesugarConfig {
    fn default() -> Self {
        Self {
            min_api_level: DEFAULT_MIN_API_LEVEL,
            library_archives: Vec::new(),
        }
    }
}

impl DesugarConfig {
    pub fn new(min_api_level: u32, library_archives: Vec<PathBuf>) -> Self {
        Self {
            min_api_level,
            library_archives,
        }
    }

    /// Check the API floor and that every library archive is a readable zip.
    pub fn validate(&self) -> DexMemberResult<()> {
        if self.min_api_level < MIN_API_LEVEL_FLOOR {
            return Err(DexMemberError::desugar(format!(
                "minimum API level {} is below {}",
                self.min_api_level, MIN_API_LEVEL_FLOOR
            )));
        }
        for archive in &self.library_archives {
            let file = File::open(archive).map_err(|e| {
                DexMemberError::desugar(format!(
                    "cannot open library archive {}: {}",
                    archive.display(),
                    e
                ))
            })?;
            ZipArchive::new(BufReader::new(file)).map_err(|e| {
                DexMemberError::desugar(format!(
                    "library archive {} is not a valid zip: {}",
                    archive.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}

/// One class-file input handed to a desugarer.
#[derive(Debug, Clone)]
pub struct ClassInput {
    pub name: String,
    /// [`ContainerKind::Class`] or [`ContainerKind::Jar`]
    pub kind: ContainerKind,
    pub bytes: Arc<[u8]>,
}

impl ClassInput {
    pub fn new(name: impl Into<String>, kind: ContainerKind, bytes: Arc<[u8]>) -> Self {
        Self {
            name: name.into(),
            kind,
            bytes,
        }
    }
}

/// Converts a group of class-file inputs into canonical units.
///
/// All inputs of one call belong to the same compilation and may reference
/// each other.
pub trait Desugarer: Send + Sync {
    fn desugar(
        &self,
        inputs: &[ClassInput],
        config: &DesugarConfig,
    ) -> DexMemberResult<Vec<Arc<dyn CanonicalUnit>>>;
}

/// In-process conversion of class files into a single unit per input group.
///
/// Library archives are validated but not otherwise consulted, and no
/// bytecode is rewritten. Defining the same class twice in one group is a
/// desugar failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassFileConverter;

impl ClassFileConverter {
    fn read_classes(input: &ClassInput) -> DexMemberResult<Vec<ClassFile>> {
        match input.kind {
            ContainerKind::Class => Ok(vec![parse_class(&input.name, &input.bytes)?]),
            ContainerKind::Jar => {
                let mut archive = ZipArchive::new(Cursor::new(&input.bytes[..])).map_err(|e| {
                    DexMemberError::decode(&input.name, format!("invalid zip archive: {}", e))
                })?;
                let mut classes = Vec::new();
                for index in 0..archive.len() {
                    let mut entry = archive.by_index(index).map_err(|e| {
                        DexMemberError::decode(&input.name, e.to_string())
                    })?;
                    let entry_name = entry.name().to_string();
                    if !entry_name.ends_with(".class") || is_excluded_class(&entry_name) {
                        continue;
                    }
                    let qualified = format!("{}!{}", input.name, entry_name);
                    let size = entry.size();
                    let bytes =
                        read_entry_bytes(&mut entry, size, input.bytes.len(), &qualified)?;
                    classes.push(parse_class(&qualified, &bytes)?);
                }
                Ok(classes)
            }
            other => Err(DexMemberError::desugar(format!(
                "{} is a {} container, expected class or jar",
                input.name, other
            ))),
        }
    }
}

/// Module and multi-release metadata classes carry no members of interest.
fn is_excluded_class(entry: &str) -> bool {
    entry.ends_with("module-info.class") || entry.starts_with("META-INF/")
}

impl Desugarer for ClassFileConverter {
    fn desugar(
        &self,
        inputs: &[ClassInput],
        config: &DesugarConfig,
    ) -> DexMemberResult<Vec<Arc<dyn CanonicalUnit>>> {
        config.validate()?;

        let mut defined_types = BTreeSet::new();
        let mut members = Vec::new();
        for input in inputs {
            for class in Self::read_classes(input)? {
                if !defined_types.insert(class.this_type.clone()) {
                    return Err(DexMemberError::desugar(format!(
                        "type {} is defined multiple times in {}",
                        class.this_type, input.name
                    )));
                }
                members.extend(class.declared);
                members.extend(class.references);
            }
        }

        if defined_types.is_empty() {
            return Ok(Vec::new());
        }
        // A reference to a member of the group and its definition are one id.
        members.sort();
        members.dedup();

        let name = inputs
            .iter()
            .map(|i| i.name.as_str())
            .collect::<Vec<_>>()
            .join("+");
        tracing::debug!(
            unit = %name,
            classes = defined_types.len(),
            min_api = config.min_api_level,
            "converted class files"
        );
        let unit: Arc<dyn CanonicalUnit> = Arc::new(MemberUnit::new(name, defined_types, members));
        Ok(vec![unit])
    }
}
