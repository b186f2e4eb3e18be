//! Two-state parsimony over the species tree: at every leaf, two locus
//! families either are proximate (some pair of their genes lies within the
//! proximity threshold) or are not, and every change of state along a branch
//! costs one rearrangement.
use identity_hash::IntMap;
use itertools::Itertools;
use log::*;
use rayon::prelude::*;

use crate::dede::TriMatrix;
use crate::family::{Families, LocusFamilyID, StrainGenes};
use crate::genome::ProximityIndex;
use crate::island::{LocusIsland, Orientation};
use crate::species_tree::{NodeID, Subtree};

/// Score of a pair of islands that must never be merged.
pub const NEVER_MERGE: f64 = f64::NEG_INFINITY;

/// Whether any gene of `a` is within `threshold` genes of a gene of `b` on `strain`.
pub fn proximate(
    a: &impl StrainGenes,
    b: &impl StrainGenes,
    index: &ProximityIndex,
    threshold: usize,
    strain: NodeID,
) -> bool {
    let bs = b.genes_in(strain);
    a.genes_in(strain).iter().any(|&ga| bs.iter().any(|&gb| index.within(ga, gb, threshold)))
}

/// Whether `a` and `b` are proximate on at least one leaf of `subtree`.
pub fn proximity_subtree(
    a: &impl StrainGenes,
    b: &impl StrainGenes,
    index: &ProximityIndex,
    threshold: usize,
    subtree: &Subtree,
) -> bool {
    match subtree {
        Subtree::Leaf(strain) => proximate(a, b, index, threshold, *strain),
        Subtree::Internal { left, right, .. } => {
            proximity_subtree(a, b, index, threshold, left)
                || proximity_subtree(a, b, index, threshold, right)
        }
    }
}

/// Minimal rearrangement counts below the root of `subtree`, as
/// `(root not proximate, root proximate)`.
fn rec_costs(
    a: &impl StrainGenes,
    b: &impl StrainGenes,
    index: &ProximityIndex,
    threshold: usize,
    subtree: &Subtree,
) -> (u32, u32) {
    match subtree {
        Subtree::Leaf(strain) => {
            if proximate(a, b, index, threshold, *strain) {
                (1, 0)
            } else {
                (0, 1)
            }
        }
        Subtree::Internal { left, right, .. } => {
            let (l_far, l_near) = rec_costs(a, b, index, threshold, left);
            let (r_far, r_near) = rec_costs(a, b, index, threshold, right);
            (
                l_far.min(1 + l_near) + r_far.min(1 + r_near),
                l_near.min(1 + l_far) + r_near.min(1 + r_far),
            )
        }
    }
}

/// Parsimony cost of the observed leaf proximities of `a` and `b`, given
/// their state at the root of `subtree`.
pub fn rearrangement_cost(
    a: &impl StrainGenes,
    b: &impl StrainGenes,
    index: &ProximityIndex,
    threshold: usize,
    subtree: &Subtree,
    root_proximate: bool,
) -> u32 {
    let (far, near) = rec_costs(a, b, index, threshold, subtree);
    if root_proximate {
        near
    } else {
        far
    }
}

/// Cost assuming `a` and `b` were apart at the root minus cost assuming they
/// were together; positive values favour merging.
pub fn cost_differential(
    a: &impl StrainGenes,
    b: &impl StrainGenes,
    index: &ProximityIndex,
    threshold: usize,
    subtree: &Subtree,
) -> f64 {
    let (far, near) = rec_costs(a, b, index, threshold, subtree);
    far as f64 - near as f64
}

/// Cost differentials between every pair of a fixed set of locus families.
/// Lookups involving a locus family outside the set yield `None`.
pub struct CostDiffCache {
    index: IntMap<LocusFamilyID, usize>,
    m: TriMatrix<f64>,
}

impl CostDiffCache {
    pub fn build(
        locus_families: &[LocusFamilyID],
        families: &Families,
        index: &ProximityIndex,
        threshold: usize,
        subtree: &Subtree,
    ) -> CostDiffCache {
        let lfs = locus_families
            .iter()
            .unique()
            .filter_map(|&id| {
                let lf = families.locus_family(id);
                if lf.is_none() {
                    warn!("locus family {} not found in the catalog; it will never be merged", id);
                }
                lf
            })
            .collect::<Vec<_>>();

        let n = lfs.len();
        let diffs = (0..n)
            .into_par_iter()
            .flat_map_iter(|i| {
                let lfs = &lfs;
                (0..i).map(move |j| cost_differential(lfs[i], lfs[j], index, threshold, subtree))
            })
            .collect::<Vec<_>>();
        let m = TriMatrix::from_condensed(n, diffs);

        CostDiffCache { index: lfs.iter().enumerate().map(|(i, lf)| (lf.id, i)).collect(), m }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn get(&self, a: LocusFamilyID, b: LocusFamilyID) -> Option<f64> {
        match (self.index.get(&a), self.index.get(&b)) {
            (Some(&i), Some(&j)) if i != j => Some(self.m[(i, j)]),
            _ => None,
        }
    }
}

/// Best score over the four ways of joining `a` and `b` end to end, and the
/// orientation reaching it; `b` is meant to be merged into `a`.
///
/// Islands originating at different nodes, and locus families unknown to
/// `costs`, score [`NEVER_MERGE`]. Ties go to the lowest orientation code.
pub fn merge_score(a: &LocusIsland, b: &LocusIsland, costs: &CostDiffCache) -> (f64, Orientation) {
    if a.mrca != b.mrca {
        return (NEVER_MERGE, Orientation::LastFirst);
    }
    let (a_first, a_last, b_first, b_last) = match (a.first(), a.last(), b.first(), b.last()) {
        (Some(af), Some(al), Some(bf), Some(bl)) => (af, al, bf, bl),
        _ => return (NEVER_MERGE, Orientation::LastFirst),
    };
    let cd = |x, y| costs.get(x, y).unwrap_or(NEVER_MERGE);

    // With a single locus family, first and last ends are one and the same
    let a_single = a.len() == 1;
    let b_single = b.len() == 1;
    let last_first = cd(a_last, b_first);
    let last_last = if b_single { last_first } else { cd(a_last, b_last) };
    let first_first = if a_single { last_first } else { cd(a_first, b_first) };
    let first_last = match (a_single, b_single) {
        (true, true) => last_first,
        (true, false) => last_last,
        (false, true) => first_first,
        (false, false) => cd(a_first, b_last),
    };

    [last_first, last_last, first_first, first_last].iter().zip(Orientation::ALL.iter()).fold(
        (NEVER_MERGE, Orientation::LastFirst),
        |best, (&score, &o)| if score > best.0 { (score, o) } else { best },
    )
}
