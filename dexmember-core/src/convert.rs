//! Container detection and conversion into canonical units.
//!
//! Dex images (bare or inside an apk) are decoded directly. Everything in
//! class-file form goes through the configured [`Desugarer`] first.
//!
//! Detection is by content, never by file name:
//! - `dex\nNNN\0` → [`ContainerKind::Dex`]
//! - `CAFEBABE` → [`ContainerKind::Class`]
//! - zip archives are classified by their entries (`classes*.dex` → apk,
//!   `classes.jar` → aar, anything else → jar)

use std::fmt;
use std::io::{Cursor, Read};
use std::sync::Arc;

use zip::ZipArchive;

use crate::classfile::is_class_file;
use crate::desugar::{ClassInput, DesugarConfig, Desugarer};
use crate::dex::is_dex;
use crate::error::{DexMemberError, DexMemberResult};
use crate::unit::CanonicalUnit;

const ZIP_LOCAL_HEADER: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_ARCHIVE: &[u8] = b"PK\x05\x06";

/// Supported container kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// A single dex image
    Dex,
    /// A single class file
    Class,
    /// A zip of class files
    Jar,
    /// An application package with one or more dex images
    Apk,
    /// A library package wrapping `classes.jar`
    Aar,
}

impl ContainerKind {
    /// Whether this kind must go through the desugarer.
    pub fn needs_desugaring(self) -> bool {
        matches!(self, Self::Class | Self::Jar | Self::Aar)
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dex => write!(f, "dex"),
            Self::Class => write!(f, "class"),
            Self::Jar => write!(f, "jar"),
            Self::Apk => write!(f, "apk"),
            Self::Aar => write!(f, "aar"),
        }
    }
}

/// Turns container bytes into a canonical unit.
pub trait Decoder: Send + Sync {
    fn decode(
        &self,
        name: &str,
        bytes: &[u8],
        kind: ContainerKind,
    ) -> DexMemberResult<Arc<dyn CanonicalUnit>>;
}

fn open_archive<'a>(name: &str, bytes: &'a [u8]) -> DexMemberResult<ZipArchive<Cursor<&'a [u8]>>> {
    ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| DexMemberError::decode(name, format!("invalid zip archive: {}", e)))
}

fn read_entry(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    archive_name: &str,
    archive_len: usize,
    entry_name: &str,
) -> DexMemberResult<Vec<u8>> {
    let qualified = format!("{}!{}", archive_name, entry_name);
    let mut entry = archive
        .by_name(entry_name)
        .map_err(|e| DexMemberError::decode(&qualified, e.to_string()))?;
    let size = entry.size();
    read_entry_bytes(&mut entry, size, archive_len, &qualified)
}

/// Buffer size to reserve for an entry claiming `declared` bytes.
///
/// The size field comes from the archive itself, so it is never trusted past
/// the length of the archive holding it.
pub(crate) fn capacity_hint(declared: u64, archive_len: usize) -> usize {
    usize::try_from(declared).map_or(archive_len, |n| n.min(archive_len))
}

/// Read a zip entry to the end with a bounded up-front reservation.
pub(crate) fn read_entry_bytes(
    entry: &mut impl Read,
    declared: u64,
    archive_len: usize,
    qualified: &str,
) -> DexMemberResult<Vec<u8>> {
    let mut bytes = Vec::with_capacity(capacity_hint(declared, archive_len));
    entry
        .read_to_end(&mut bytes)
        .map_err(|e| DexMemberError::decode(qualified, e.to_string()))?;
    Ok(bytes)
}

/// Position of a `classes.dex` / `classesN.dex` entry in multidex order.
fn dex_entry_index(entry: &str) -> Option<u32> {
    let middle = entry.strip_prefix("classes")?.strip_suffix(".dex")?;
    if middle.is_empty() {
        Some(1)
    } else {
        middle.parse().ok().filter(|n| *n >= 2)
    }
}

fn is_library_jar(entry: &str) -> bool {
    entry == "classes.jar"
        || entry
            .strip_prefix("libs/")
            .is_some_and(|rest| rest.ends_with(".jar") && !rest.contains('/'))
}

/// Identify the container kind of `bytes`.
pub fn detect_kind(name: &str, bytes: &[u8]) -> DexMemberResult<ContainerKind> {
    if is_dex(bytes) {
        return Ok(ContainerKind::Dex);
    }
    if is_class_file(bytes) {
        return Ok(ContainerKind::Class);
    }
    if bytes.starts_with(ZIP_LOCAL_HEADER) || bytes.starts_with(ZIP_EMPTY_ARCHIVE) {
        let archive = open_archive(name, bytes)?;
        let kind = if archive.file_names().any(|n| dex_entry_index(n).is_some()) {
            ContainerKind::Apk
        } else if archive.file_names().any(|n| n == "classes.jar") {
            ContainerKind::Aar
        } else {
            ContainerKind::Jar
        };
        return Ok(kind);
    }
    Err(DexMemberError::decode(
        name,
        "not a dex, class, jar, apk or aar container",
    ))
}

/// Expand an apk into its dex images, in `classes.dex`, `classes2.dex`, ... order.
fn apk_dex_entries(name: &str, bytes: &[u8]) -> DexMemberResult<Vec<(String, Vec<u8>)>> {
    let mut archive = open_archive(name, bytes)?;
    let mut entries: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|n| dex_entry_index(n).map(|i| (i, n.to_string())))
        .collect();
    entries.sort();

    entries
        .into_iter()
        .map(|(_, entry)| {
            let data = read_entry(&mut archive, name, bytes.len(), &entry)?;
            Ok((format!("{}!{}", name, entry), data))
        })
        .collect()
}

/// Pull `classes.jar` and `libs/*.jar` out of an aar.
fn aar_class_inputs(name: &str, bytes: &[u8]) -> DexMemberResult<Vec<ClassInput>> {
    let mut archive = open_archive(name, bytes)?;
    let mut jars: Vec<String> = archive
        .file_names()
        .filter(|n| is_library_jar(n))
        .map(str::to_string)
        .collect();
    // classes.jar first, then libs in name order
    jars.sort_by_key(|n| (n != "classes.jar", n.clone()));

    jars.into_iter()
        .map(|entry| {
            let data = read_entry(&mut archive, name, bytes.len(), &entry)?;
            Ok(ClassInput::new(
                format!("{}!{}", name, entry),
                ContainerKind::Jar,
                Arc::from(data),
            ))
        })
        .collect()
}

/// Convert one artifact into its canonical units.
pub fn convert(
    name: &str,
    bytes: &Arc<[u8]>,
    config: &DesugarConfig,
    decoder: &dyn Decoder,
    desugarer: &dyn Desugarer,
) -> DexMemberResult<Vec<Arc<dyn CanonicalUnit>>> {
    let kind = detect_kind(name, bytes)?;
    tracing::debug!(artifact = %name, kind = %kind, bytes = bytes.len(), "converting artifact");

    match kind {
        ContainerKind::Dex => Ok(vec![decoder.decode(name, bytes, kind)?]),
        ContainerKind::Apk => apk_dex_entries(name, bytes)?
            .into_iter()
            .map(|(entry, data)| decoder.decode(&entry, &data, ContainerKind::Dex))
            .collect(),
        ContainerKind::Class | ContainerKind::Jar => {
            let input = ClassInput::new(name, kind, Arc::clone(bytes));
            desugarer.desugar(&[input], config)
        }
        ContainerKind::Aar => {
            let inputs = aar_class_inputs(name, bytes)?;
            desugarer.desugar(&inputs, config)
        }
    }
}
