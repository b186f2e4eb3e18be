use log::*;

use crate::family::{Families, LocusFamily};
use crate::genome::ProximityIndex;
use crate::island::{IslandID, LocusIsland};
use crate::parsimony::proximity_subtree;
use crate::species_tree::Subtree;

/// The sole locus family of a singleton island.
fn sole_family<'a>(island: &LocusIsland, families: &'a Families) -> Option<&'a LocusFamily> {
    let lf = island.first().and_then(|id| families.locus_family(id));
    if lf.is_none() {
        warn!("island {} refers to no known locus family", island.id);
    }
    lf
}

/// Grow a cluster from `seed`, moving from `pool` every island transitively
/// proximate to it, until either nothing more is found or the cluster reaches
/// `max_cluster_size`.
fn populate_cluster(
    seed: LocusIsland,
    pool: &mut Vec<LocusIsland>,
    families: &Families,
    index: &ProximityIndex,
    threshold: usize,
    subtree: &Subtree,
    max_cluster_size: usize,
) -> Vec<LocusIsland> {
    let mut cluster = Vec::new();
    let mut on_deck = vec![seed];

    while let Some(current) = on_deck.pop() {
        let found = match sole_family(&current, families) {
            Some(current_lf) => pool
                .iter()
                .filter(|other| {
                    sole_family(other, families)
                        .map(|other_lf| proximity_subtree(current_lf, other_lf, index, threshold, subtree))
                        .unwrap_or(false)
                })
                .map(|other| other.id)
                .collect::<Vec<IslandID>>(),
            None => Vec::new(),
        };
        cluster.push(current);

        for id in found {
            if let Some(i) = pool.iter().position(|x| x.id == id) {
                on_deck.push(pool.remove(i));
            }
            if cluster.len() + on_deck.len() == max_cluster_size {
                // Whatever else was found stays in the pool
                cluster.append(&mut on_deck);
                return cluster;
            }
        }
    }
    cluster
}

/// Split the islands originating at one node into connected components of the
/// proximity graph over `subtree`, each holding at most `max_cluster_size`
/// islands. Returns the multi-island components first and the islands left
/// on their own second.
pub fn partition_by_proximity(
    mut islands: Vec<LocusIsland>,
    families: &Families,
    index: &ProximityIndex,
    threshold: usize,
    subtree: &Subtree,
    max_cluster_size: usize,
) -> (Vec<Vec<LocusIsland>>, Vec<LocusIsland>) {
    let mut clusters = Vec::new();
    let mut singletons = Vec::new();

    while let Some(seed) = islands.pop() {
        let mut cluster =
            populate_cluster(seed, &mut islands, families, index, threshold, subtree, max_cluster_size);
        if cluster.len() > 1 {
            clusters.push(cluster);
        } else {
            singletons.append(&mut cluster);
        }
    }

    debug!(
        "Node {}: {} clusters, {} singletons",
        subtree.root(),
        clusters.len(),
        singletons.len()
    );
    (clusters, singletons)
}
