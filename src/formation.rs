use std::io::Write;

use anyhow::*;
use indicatif::{ParallelProgressIterator, ProgressBar};
use log::*;
use rayon::prelude::*;

use crate::cluster::partition_by_proximity;
use crate::errors::RuntimeError;
use crate::family::Families;
use crate::genome::{read_name_map, GeneBook, ProximityIndex};
use crate::island::LocusIsland;
use crate::merge::merge_at_node;
use crate::species_tree::{NodeID, SpeciesTree};
use crate::utils::*;

/// Islands bucketed by origin node, indexed by node ID.
pub type IslandsByNode = Vec<Vec<LocusIsland>>;

#[derive(Debug, Clone)]
pub struct Settings {
    /// Widest gene distance the proximity index can answer for
    pub gene_proximity_range: usize,
    /// Proximity threshold used to build clusters and merge within them
    pub proximity_threshold_merge1: usize,
    /// Proximity threshold of the cross-cluster merge
    pub proximity_threshold_merge2: usize,
    /// Merge scores below this stop the merging
    pub rsc_threshold_merge1: f64,
    pub max_cluster_size: usize,
    /// Name of the node rooting the focal clade; the tree root if `None`
    pub root_focal_clade: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            gene_proximity_range: 2,
            proximity_threshold_merge1: 1,
            proximity_threshold_merge2: 1,
            rsc_threshold_merge1: 0.,
            max_cluster_size: 50,
            root_focal_clade: None,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        for (name, threshold) in [
            ("merge1", self.proximity_threshold_merge1),
            ("merge2", self.proximity_threshold_merge2),
        ] {
            if threshold < 1 || threshold > self.gene_proximity_range {
                bail!(RuntimeError::InvalidSettings(format!(
                    "the {} proximity threshold ({}) must lie between 1 and the gene proximity range ({})",
                    name, threshold, self.gene_proximity_range
                )));
            }
        }
        if self.max_cluster_size < 2 {
            bail!(RuntimeError::InvalidSettings(format!(
                "clusters must be allowed to hold at least 2 islands, not {}",
                self.max_cluster_size
            )));
        }
        if self.rsc_threshold_merge1.is_nan() {
            bail!(RuntimeError::InvalidSettings("the merge score threshold is not a number".into()));
        }
        Ok(())
    }

    pub fn focal_root(&self, species_tree: &SpeciesTree) -> Result<NodeID> {
        match &self.root_focal_clade {
            Some(name) => species_tree.node_by_name(name),
            None => Ok(species_tree.root()),
        }
    }
}

/// The outcome of island formation.
pub struct Formation {
    pub islands: IslandsByNode,
    /// Focal nodes, in the order they were processed
    pub focal_nodes: Vec<NodeID>,
    /// Number of islands at each node before merging
    pub before: Vec<usize>,
}

impl Formation {
    /// Number of islands at each node after merging
    pub fn after(&self) -> Vec<usize> {
        self.islands.iter().map(Vec::len).collect()
    }
}

fn progress_bar(len: usize, message: &'static str) -> ProgressBar {
    if atty::is(atty::Stream::Stderr) {
        let bar = ProgressBar::new(len as u64);
        bar.set_message(message);
        bar
    } else {
        ProgressBar::hidden()
    }
}

/// One single-family island per locus family, numbered after it and placed
/// at its origin node.
pub fn initial_islands(families: &Families, species_tree: &SpeciesTree) -> IslandsByNode {
    let mut r = vec![Vec::new(); species_tree.len()];
    for lf in families.iter_locus_families() {
        match r.get_mut(lf.mrca) {
            Some(bucket) => bucket.push(LocusIsland::singleton(lf.id, lf.mrca, lf.id)),
            None => warn!("locus family {} originates outside the species tree; skipped", lf.id),
        }
    }
    r
}

/// `root` and all its descendants, those with the most leaves below them first.
pub fn focal_nodes_by_descendants(species_tree: &SpeciesTree, root: NodeID) -> Vec<NodeID> {
    let mut r = std::iter::once(root).chain(species_tree.descendants(root)).collect::<Vec<_>>();
    r.sort_by_key(|&n| std::cmp::Reverse(species_tree.leaf_count(n)));
    r
}

/// Move the islands of every focal node out of `by_node`, split into
/// proximity clusters and lone islands.
pub fn partition_focal_nodes(
    by_node: &mut IslandsByNode,
    focal_nodes: &[NodeID],
    families: &Families,
    index: &ProximityIndex,
    threshold: usize,
    species_tree: &SpeciesTree,
    max_cluster_size: usize,
) -> (Vec<Vec<LocusIsland>>, Vec<LocusIsland>) {
    let mut clusters = Vec::new();
    let mut singletons = Vec::new();
    for &node in focal_nodes {
        let islands = std::mem::take(&mut by_node[node]);
        let (mut node_clusters, mut node_singletons) = partition_by_proximity(
            islands,
            families,
            index,
            threshold,
            &species_tree.subtree(node),
            max_cluster_size,
        );
        clusters.append(&mut node_clusters);
        singletons.append(&mut node_singletons);
    }
    (clusters, singletons)
}

/// Build the singleton islands, then merge them within proximity clusters
/// and across clusters at every node of the focal clade. Islands at nodes
/// outside of the focal clade are left unmerged.
pub fn make_islands(
    species_tree: &SpeciesTree,
    families: &Families,
    index: &ProximityIndex,
    settings: &Settings,
) -> Result<Formation> {
    settings.validate()?;
    let widest = settings.proximity_threshold_merge1.max(settings.proximity_threshold_merge2);
    if index.radius() < widest {
        bail!(RuntimeError::InvalidSettings(format!(
            "the proximity index only covers {} genes, but thresholds go up to {}",
            index.radius(),
            widest
        )));
    }
    let focal_nodes = focal_nodes_by_descendants(species_tree, settings.focal_root(species_tree)?);

    let mut by_node = initial_islands(families, species_tree);
    let before = by_node.iter().map(Vec::len).collect::<Vec<_>>();
    info!(
        "{} initial islands, {} focal nodes",
        before.iter().sum::<usize>(),
        focal_nodes.len()
    );

    let (clusters, singletons) = partition_focal_nodes(
        &mut by_node,
        &focal_nodes,
        families,
        index,
        settings.proximity_threshold_merge1,
        species_tree,
        settings.max_cluster_size,
    );
    info!("Merging within {} clusters; {} islands left alone", clusters.len(), singletons.len());

    let bar = progress_bar(clusters.len(), "Clusters");
    let merged = clusters
        .into_par_iter()
        .progress_with(bar.clone())
        .map(|cluster| {
            let subtree = species_tree.subtree(cluster[0].mrca);
            merge_at_node(
                cluster,
                families,
                index,
                settings.proximity_threshold_merge1,
                settings.rsc_threshold_merge1,
                &subtree,
            )
        })
        .collect::<Vec<_>>();
    bar.finish_and_clear();
    for island in merged.into_iter().flatten() {
        let mrca = island.mrca;
        by_node[mrca].push(island);
    }

    info!("Merging across clusters");
    let per_node = focal_nodes
        .iter()
        .map(|&node| (node, std::mem::take(&mut by_node[node])))
        .collect::<Vec<_>>();
    let bar = progress_bar(per_node.len(), "Nodes");
    let merged = per_node
        .into_par_iter()
        .progress_with(bar.clone())
        .map(|(node, islands)| {
            let merged = merge_at_node(
                islands,
                families,
                index,
                settings.proximity_threshold_merge2,
                settings.rsc_threshold_merge1,
                &species_tree.subtree(node),
            );
            (node, merged)
        })
        .collect::<Vec<_>>();
    bar.finish_and_clear();
    for (node, islands) in merged {
        by_node[node] = islands;
    }

    for island in singletons {
        let mrca = island.mrca;
        by_node[mrca].push(island);
    }
    for bucket in by_node.iter_mut() {
        bucket.sort_by_key(|i| i.id);
    }
    for &node in &focal_nodes {
        debug!("{}: {} -> {} islands", species_tree.name(node), before[node], by_node[node].len());
    }

    Ok(Formation { islands: by_node, focal_nodes, before })
}

/// One line per island, node after node, by ascending ID within a node.
pub fn write_islands<W: Write>(by_node: &IslandsByNode, species_tree: &SpeciesTree, out: &mut W) -> Result<()> {
    for bucket in by_node {
        let mut islands = bucket.iter().collect::<Vec<_>>();
        islands.sort_by_key(|i| i.id);
        for island in islands {
            writeln!(out, "{}", island.to_file_string(species_tree))?;
        }
    }
    Ok(out.flush()?)
}

pub fn read_islands(filename: &str, species_tree: &SpeciesTree) -> Result<IslandsByNode> {
    let mut r = vec![Vec::new(); species_tree.len()];
    for (i, l) in data_lines(filename)? {
        let island = LocusIsland::from_file_string(&l, species_tree)
            .with_context(|| format!("in {} at line {}", filename, i))?;
        let mrca = island.mrca;
        r[mrca].push(island);
    }
    for bucket in r.iter_mut() {
        bucket.sort_by_key(|i| i.id);
    }
    Ok(r)
}

pub fn write_summary<W: Write>(
    species_tree: &SpeciesTree,
    focal_nodes: &[NodeID],
    before: &[usize],
    after: &[usize],
    out: &mut W,
) -> Result<()> {
    writeln!(out, "Number of islands per node in focal clade:")?;
    let mut rows = vec![
        vec!["Node".to_string(), "Before merge".into(), "After merge".into()],
        vec!["----".to_string(), "------------".into(), "-----------".into()],
    ];
    for &node in focal_nodes {
        rows.push(vec![
            species_tree.name(node).to_string(),
            before.get(node).copied().unwrap_or(0).to_string(),
            after.get(node).copied().unwrap_or(0).to_string(),
        ]);
    }
    write_table(&rows, 2, out)
}

/// Island and locus family counts of every node holding islands.
pub fn write_counts<W: Write>(by_node: &IslandsByNode, species_tree: &SpeciesTree, out: &mut W) -> Result<()> {
    let mut rows = vec![vec!["Node".to_string(), "Islands".into(), "Locus families".into()]];
    for (node, bucket) in by_node.iter().enumerate().filter(|(_, b)| !b.is_empty()) {
        rows.push(vec![
            species_tree.name(node).to_string(),
            bucket.len().to_string(),
            bucket.iter().map(LocusIsland::len).sum::<usize>().to_string(),
        ]);
    }
    write_table(&rows, 0, out)
}

/// Input files of a full island formation run.
pub struct Inputs<'a> {
    pub species_tree: &'a str,
    pub gene_order: &'a str,
    pub families: &'a str,
    pub name_map: Option<&'a str>,
}

/// Read every input, form the islands and write them to `islands_out`, with
/// the merge summary written to `summary_out`.
pub fn run(inputs: &Inputs, settings: &Settings, islands_out: &str, summary_out: &str) -> Result<Formation> {
    settings.validate()?;
    let species_tree = SpeciesTree::from_newick_file(inputs.species_tree)?;
    settings.focal_root(&species_tree)?;
    let name_map = inputs.name_map.map(read_name_map).transpose()?;
    let book = GeneBook::from_gene_order_file(inputs.gene_order, &species_tree, name_map.as_ref())?;
    let families = Families::from_file(inputs.families, &species_tree, &book)?;
    let index = ProximityIndex::build(&book, settings.gene_proximity_range);

    let formation = make_islands(&species_tree, &families, &index, settings)?;

    info!("Writing islands to {}", islands_out);
    write_islands(&formation.islands, &species_tree, &mut create_file(islands_out)?)?;
    info!("Writing summary to {}", summary_out);
    write_summary(
        &species_tree,
        &formation.focal_nodes,
        &formation.before,
        &formation.after(),
        &mut create_file(summary_out)?,
    )?;
    Ok(formation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::LocusFamily;
    use crate::genome::tests::contig;
    use crate::species_tree::tests::four_leaves;

    /// Every strain carries `x1 .. x8`. Locus families 1-4 (genes 1-4) and 7
    /// originate at the root, 5 and 6 at i2 and 8 at i1.
    fn fixture(t: &SpeciesTree) -> (Families, ProximityIndex) {
        let mut book = GeneBook::new();
        for s in ["A", "B", "C", "D"] {
            let genes = (1..=8).map(|k| format!("{}{}", s.to_lowercase(), k)).collect::<Vec<_>>();
            book.add_strain(t.leaf_by_name(s).unwrap(), vec![contig(&genes.join(" "))]).unwrap();
        }
        let mut fams = Families::new();
        let mut add = |id: usize, mrca: &str, strains: &[&str]| {
            let mrca = t.node(mrca).unwrap();
            fams.add_family(id, mrca).unwrap();
            let mut lf = LocusFamily::new(id, id, mrca, None);
            lf.add_genes(&book, strains.iter().map(|s| book.id(&format!("{}{}", s, id)).unwrap()));
            fams.add_locus_family(lf).unwrap();
        };
        for k in [1, 2, 3, 4, 7] {
            add(k, "i0", &["a", "b", "c", "d"]);
        }
        add(5, "i2", &["c", "d"]);
        add(6, "i2", &["c", "d"]);
        add(8, "i1", &["a", "b"]);
        let index = ProximityIndex::build(&book, 2);
        (fams, index)
    }

    fn chains(by_node: &IslandsByNode) -> Vec<(usize, usize, Vec<usize>)> {
        by_node
            .iter()
            .flatten()
            .map(|i| (i.mrca, i.id, i.locus_families().to_vec()))
            .collect()
    }

    #[test]
    fn focal_nodes_are_sorted_by_leaf_count() {
        let t = four_leaves();
        assert_eq!(focal_nodes_by_descendants(&t, 0), vec![0, 1, 4, 2, 3, 5, 6]);
        assert_eq!(focal_nodes_by_descendants(&t, 4), vec![4, 5, 6]);
        assert_eq!(focal_nodes_by_descendants(&t, 6), vec![6]);
    }

    #[test]
    fn initial_islands_are_bucketed_by_origin() {
        let t = four_leaves();
        let (fams, _) = fixture(&t);
        let by_node = initial_islands(&fams, &t);
        assert_eq!(by_node.len(), 7);
        assert_eq!(by_node[0].iter().map(|i| i.id).collect::<Vec<_>>(), vec![1, 2, 3, 4, 7]);
        assert_eq!(by_node[4].iter().map(|i| i.id).collect::<Vec<_>>(), vec![5, 6]);
        assert!(by_node[1].iter().all(|i| i.len() == 1 && i.first() == Some(i.id)));
    }

    #[test]
    fn settings_are_validated() {
        let t = four_leaves();
        assert!(Settings::default().validate().is_ok());
        let too_far = Settings { proximity_threshold_merge2: 3, ..Default::default() };
        assert!(too_far.validate().is_err());
        let zero = Settings { proximity_threshold_merge1: 0, ..Default::default() };
        assert!(zero.validate().is_err());
        let tiny = Settings { max_cluster_size: 1, ..Default::default() };
        assert!(tiny.validate().is_err());
        let elsewhere = Settings { root_focal_clade: Some("nowhere".into()), ..Default::default() };
        assert!(elsewhere.focal_root(&t).is_err());
        let i2 = Settings { root_focal_clade: Some("i2".into()), ..Default::default() };
        assert_eq!(i2.focal_root(&t).unwrap(), 4);
    }

    #[test]
    fn islands_are_merged_at_every_focal_node() {
        let t = four_leaves();
        let (fams, index) = fixture(&t);
        let formation = make_islands(&t, &fams, &index, &Settings::default()).unwrap();
        assert_eq!(
            chains(&formation.islands),
            vec![
                (0, 1, vec![1, 2, 3, 4]),
                (0, 7, vec![7]),
                (1, 8, vec![8]),
                (4, 5, vec![5, 6]),
            ]
        );
        assert_eq!(formation.focal_nodes, vec![0, 1, 4, 2, 3, 5, 6]);
        assert_eq!(formation.before, vec![5, 1, 0, 0, 2, 0, 0]);
        assert_eq!(formation.after(), vec![2, 1, 0, 0, 1, 0, 0]);
    }

    #[test]
    fn second_pass_joins_capped_clusters() {
        let t = four_leaves();
        let (fams, index) = fixture(&t);
        let capped = Settings { max_cluster_size: 2, ..Default::default() };
        let formation = make_islands(&t, &fams, &index, &capped).unwrap();
        assert_eq!(formation.islands[0][0].locus_families(), &[1, 2, 3, 4]);
        assert_eq!(formation.after()[0], 2);
    }

    #[test]
    fn islands_outside_the_focal_clade_are_untouched() {
        let t = four_leaves();
        let (fams, index) = fixture(&t);
        let settings = Settings { root_focal_clade: Some("i2".into()), ..Default::default() };
        let formation = make_islands(&t, &fams, &index, &settings).unwrap();
        assert_eq!(formation.focal_nodes, vec![4, 5, 6]);
        assert_eq!(formation.islands[0].len(), 5);
        assert_eq!(chains(&formation.islands).last().unwrap(), &(4, 5, vec![5, 6]));
    }

    #[test]
    fn narrow_index_is_rejected() {
        let t = four_leaves();
        let (fams, _) = fixture(&t);
        let index = ProximityIndex::build(&GeneBook::new(), 1);
        let settings = Settings { proximity_threshold_merge2: 2, ..Default::default() };
        assert!(make_islands(&t, &fams, &index, &settings).is_err());
    }

    #[test]
    fn summary_lists_focal_nodes_in_order() {
        let t = four_leaves();
        let (fams, index) = fixture(&t);
        let formation = make_islands(&t, &fams, &index, &Settings::default()).unwrap();
        let mut out = Vec::<u8>::new();
        write_summary(&t, &formation.focal_nodes, &formation.before, &formation.after(), &mut out)
            .unwrap();
        let expected = [
            "Number of islands per node in focal clade:",
            "  Node  Before merge  After merge",
            "  ----  ------------  -----------",
            "  i0    5             2",
            "  i1    1             1",
            "  i2    2             1",
            "  A     0             0",
            "  B     0             0",
            "  C     0             0",
            "  D     0             0",
        ];
        assert_eq!(String::from_utf8(out).unwrap().lines().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn island_file_round_trip() {
        let t = four_leaves();
        let (fams, index) = fixture(&t);
        let formation = make_islands(&t, &fams, &index, &Settings::default()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("islands.out");
        let filename = path.to_str().unwrap();
        write_islands(&formation.islands, &t, &mut create_file(filename).unwrap()).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "1\ti0\t1\t2\t3\t4\n7\ti0\t7\n8\ti1\t8\n5\ti2\t5\t6\n");
        assert_eq!(read_islands(filename, &t).unwrap(), formation.islands);

        let mut out = Vec::<u8>::new();
        write_counts(&formation.islands, &t, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Node  Islands  Locus families\ni0    2        5\ni1    1        1\ni2    1        2\n"
        );
    }
}
