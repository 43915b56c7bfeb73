//! Parallel aggregation of member sets across artifacts.
//!
//! Each artifact is converted, renamed and extracted on the rayon pool. The
//! per-unit triples are concatenated and then sorted and deduplicated once.
//! The first failure aborts the whole aggregation.

use rayon::prelude::*;
use serde::Serialize;

use crate::convert::{convert, Decoder};
use crate::desugar::{DesugarConfig, Desugarer};
use crate::error::DexMemberResult;
use crate::extract::{extract_members, UnitMembers};
use crate::mapping::{ApiMapping, MappedUnit};
use crate::member::Member;
use crate::parser::Artifact;

/// Sorted, duplicate-free member lists over every canonical unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregatedMembers {
    pub all: Vec<Member>,
    pub declared: Vec<Member>,
    pub referenced: Vec<Member>,
    /// Number of canonical units the lists were built from
    pub unit_count: usize,
}

fn sorted_unique(mut members: Vec<Member>) -> Vec<Member> {
    members.sort_unstable();
    members.dedup();
    members
}

impl AggregatedMembers {
    /// Finish a merged triple.
    ///
    /// Classification stays local to each unit: a member referenced by one
    /// unit and declared by another is listed in both `declared` and
    /// `referenced`.
    pub fn from_units(members: UnitMembers, unit_count: usize) -> Self {
        Self {
            all: sorted_unique(members.all),
            declared: sorted_unique(members.declared),
            referenced: sorted_unique(members.referenced),
            unit_count,
        }
    }
}

/// Run one artifact through conversion, renaming and extraction.
fn process_artifact(
    artifact: &Artifact,
    mapping: &ApiMapping,
    config: &DesugarConfig,
    decoder: &dyn Decoder,
    desugarer: &dyn Desugarer,
) -> DexMemberResult<(UnitMembers, usize)> {
    let units = convert(&artifact.name, &artifact.bytes, config, decoder, desugarer)?;
    let mut members = UnitMembers::default();
    for unit in &units {
        let mapped = MappedUnit::new(unit.as_ref(), mapping);
        members.merge(extract_members(&mapped));
    }
    tracing::debug!(
        artifact = %artifact.name,
        units = units.len(),
        members = members.all.len(),
        "extracted artifact members"
    );
    Ok((members, units.len()))
}

/// Aggregate the members of every artifact.
pub fn aggregate(
    inputs: &[Artifact],
    mapping: &ApiMapping,
    config: &DesugarConfig,
    decoder: &dyn Decoder,
    desugarer: &dyn Desugarer,
) -> DexMemberResult<AggregatedMembers> {
    let per_artifact = inputs
        .par_iter()
        .map(|artifact| process_artifact(artifact, mapping, config, decoder, desugarer))
        .collect::<DexMemberResult<Vec<_>>>()?;

    let mut merged = UnitMembers::default();
    let mut unit_count = 0;
    for (members, units) in per_artifact {
        merged.merge(members);
        unit_count += units;
    }

    let result = AggregatedMembers::from_units(merged, unit_count);
    tracing::info!(
        artifacts = inputs.len(),
        units = result.unit_count,
        all = result.all.len(),
        declared = result.declared.len(),
        referenced = result.referenced.len(),
        "aggregated members"
    );
    Ok(result)
}
