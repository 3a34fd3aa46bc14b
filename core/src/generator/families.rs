use std::fmt;

use crate::model::InstructionSet;

/// A family member whose inline cache disagrees with its family.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FamilySizeMismatch {
    pub instruction: String,
    pub family: String,
    /// Cache units the family declares.
    pub declared: usize,
    /// `size - 1` of the instruction.
    pub expected: usize,
    /// Cache units actually laid out by the instruction's parts.
    pub cache_units: usize,
}

impl fmt::Display for FamilySizeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "family '{}' declares {} cache units but '{}' reserves {} and lays out {}",
            self.family, self.declared, self.instruction, self.expected, self.cache_units
        )
    }
}

/// Every family member whose cache footprint does not match, sorted by
/// instruction name. Generation does not depend on this; the emitted
/// `static_assert` catches the same mismatch when the output is compiled.
pub fn check_family_sizes(set: &InstructionSet) -> Vec<FamilySizeMismatch> {
    let mut mismatches: Vec<FamilySizeMismatch> = set
        .instructions
        .values()
        .filter_map(|inst| {
            let family = inst.family.as_ref()?;
            let expected = inst.size.saturating_sub(1);
            let cache_units = inst.cache_size();
            (family.size != expected || cache_units != expected).then(|| FamilySizeMismatch {
                instruction: inst.name.clone(),
                family: family.name.clone(),
                declared: family.size,
                expected,
                cache_units,
            })
        })
        .collect();
    mismatches.sort();
    mismatches
}
