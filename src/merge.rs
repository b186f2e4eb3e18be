use std::cmp::Reverse;
use std::collections::BTreeMap;

use itertools::Itertools;
use log::*;
use ordered_float::OrderedFloat;

use crate::family::Families;
use crate::genome::ProximityIndex;
use crate::island::{IslandID, LocusIsland, Orientation};
use crate::parsimony::{merge_score, CostDiffCache, NEVER_MERGE};
use crate::species_tree::Subtree;

type Scores = BTreeMap<(IslandID, IslandID), (f64, Orientation)>;

/// Score `a` against `b` under the key `(lower id, higher id)`, the island
/// with the lower ID being the one that would absorb the other.
fn store_score(a: &LocusIsland, b: &LocusIsland, costs: &CostDiffCache, scores: &mut Scores) {
    if a.id < b.id {
        scores.insert((a.id, b.id), merge_score(a, b, costs));
    } else {
        scores.insert((b.id, a.id), merge_score(b, a, costs));
    }
}

/// Greedily merge islands sharing the same origin, always picking the pair
/// with the highest merge score, until no pair scores at least
/// `score_threshold`. Among equally scored pairs, the one with the smallest
/// `(lower id, higher id)` wins; the returned islands are sorted by ID.
pub fn merge_at_node(
    islands: Vec<LocusIsland>,
    families: &Families,
    index: &ProximityIndex,
    proximity_threshold: usize,
    score_threshold: f64,
    subtree: &Subtree,
) -> Vec<LocusIsland> {
    if islands.len() < 2 {
        return islands;
    }

    let lfs = islands.iter().flat_map(|i| i.locus_families().iter().copied()).collect::<Vec<_>>();
    let costs = CostDiffCache::build(&lfs, families, index, proximity_threshold, subtree);

    let mut arena = islands.into_iter().map(|i| (i.id, i)).collect::<BTreeMap<_, _>>();
    let mut scores = Scores::new();
    for (a, b) in arena.values().tuple_combinations() {
        store_score(a, b, &costs, &mut scores);
    }

    loop {
        let best = scores.iter().max_by_key(|(k, (s, _))| (OrderedFloat(*s), Reverse(**k)));
        let (&(keep, absorbed), &(score, orientation)) = match best {
            Some(best) => best,
            None => break,
        };
        if score == NEVER_MERGE || score < score_threshold {
            break;
        }

        let other = match arena.remove(&absorbed) {
            Some(other) => other,
            None => break,
        };
        let survivor = match arena.get_mut(&keep) {
            Some(survivor) => survivor,
            None => break,
        };
        trace!(
            "Node {}: merging {} into {} with score {} ({:?})",
            subtree.root(),
            absorbed,
            keep,
            score,
            orientation
        );
        survivor.merge(other, orientation);

        scores.retain(|&(a, b), _| a != keep && b != keep && a != absorbed && b != absorbed);
        let survivor = &arena[&keep];
        for other in arena.values().filter(|other| other.id != keep) {
            store_score(survivor, other, &costs, &mut scores);
        }
    }

    arena.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsimony::tests::{everywhere, setup};
    use crate::species_tree::tests::four_leaves;

    fn chains(islands: &[LocusIsland]) -> Vec<(IslandID, Vec<usize>)> {
        islands.iter().map(|i| (i.id, i.locus_families().to_vec())).collect()
    }

    #[test]
    fn tiny_sets_are_returned_unchanged() {
        let t = four_leaves();
        let (fams, index) = setup(&t, &[(1, everywhere(1))]);
        assert!(merge_at_node(vec![], &fams, &index, 1, 0., &t.subtree(0)).is_empty());
        let one = vec![LocusIsland::singleton(1, 0, 1)];
        assert_eq!(merge_at_node(one.clone(), &fams, &index, 1, 0., &t.subtree(0)), one);
    }

    #[test]
    fn adjacent_families_form_one_chain() {
        let t = four_leaves();
        let lfs = [1, 2, 3, 4, 8].iter().map(|&k| (k, everywhere(k))).collect::<Vec<_>>();
        let (fams, index) = setup(&t, &lfs);
        let islands = [8, 3, 1, 4, 2].iter().map(|&k| LocusIsland::singleton(k, 0, k)).collect();

        let merged = merge_at_node(islands, &fams, &index, 1, 0., &t.subtree(0));
        assert_eq!(chains(&merged), vec![(1, vec![1, 2, 3, 4]), (8, vec![8])]);

        // Nothing left to merge
        let again = merge_at_node(merged.clone(), &fams, &index, 1, 0., &t.subtree(0));
        assert_eq!(again, merged);
    }

    #[test]
    fn lower_id_absorbs_in_chromosomal_order() {
        let t = four_leaves();
        let lfs = (1..=3).map(|k| (k, everywhere(k))).collect::<Vec<_>>();
        let (fams, index) = setup(&t, &lfs);
        let islands = vec![
            LocusIsland::singleton(10, 0, 3),
            LocusIsland::singleton(20, 0, 2),
            LocusIsland::singleton(30, 0, 1),
        ];
        let merged = merge_at_node(islands, &fams, &index, 1, 0., &t.subtree(0));
        assert_eq!(chains(&merged), vec![(10, vec![3, 2, 1])]);
    }

    #[test]
    fn score_threshold_stops_merging() {
        let t = four_leaves();
        let lfs = (1..=3).map(|k| (k, everywhere(k))).collect::<Vec<_>>();
        let (fams, index) = setup(&t, &lfs);
        let islands = (1..=3).map(|k| LocusIsland::singleton(k, 0, k)).collect::<Vec<_>>();

        let merged = merge_at_node(islands.clone(), &fams, &index, 1, 2.5, &t.subtree(0));
        assert_eq!(merged, islands);
        // A wider proximity threshold makes 1 and 3 neighbours too
        let merged = merge_at_node(islands, &fams, &index, 2, 0., &t.subtree(0));
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].len(), 3);
    }

    #[test]
    fn islands_from_other_nodes_are_left_alone() {
        let t = four_leaves();
        let lfs = (1..=2).map(|k| (k, everywhere(k))).collect::<Vec<_>>();
        let (fams, index) = setup(&t, &lfs);
        let islands = vec![LocusIsland::singleton(1, 0, 1), LocusIsland::singleton(2, 1, 2)];
        let merged = merge_at_node(islands.clone(), &fams, &index, 1, f64::MIN, &t.subtree(0));
        assert_eq!(merged, islands);
    }

    #[test]
    fn result_does_not_depend_on_thread_count() {
        let t = four_leaves();
        let lfs = (1..=8).map(|k| (k, everywhere(k))).collect::<Vec<_>>();
        let (fams, index) = setup(&t, &lfs);
        let islands = (1..=8).rev().map(|k| LocusIsland::singleton(k, 0, k)).collect::<Vec<_>>();

        let runs = [1, 2, 4]
            .iter()
            .map(|&n| {
                rayon::ThreadPoolBuilder::new().num_threads(n).build().unwrap().install(|| {
                    merge_at_node(islands.clone(), &fams, &index, 2, 0., &t.subtree(0))
                })
            })
            .collect::<Vec<_>>();
        assert!(runs.iter().all(|r| *r == runs[0]));
        assert_eq!(chains(&runs[0]), vec![(1, (1..=8).collect())]);
    }
}
