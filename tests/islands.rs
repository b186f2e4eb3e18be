use std::path::Path;

use xenoisle::formation::{self, Inputs, Settings};
use xenoisle::species_tree::SpeciesTree;

const TREE: &str = "(A,(B,C)i1)i0;";

/// Genes 1 and 2 are neighbours, as are 3 and 4; 2 and 3 lie 7 genes apart.
fn gene_order(strain: &str) -> String {
    let s = strain.to_lowercase();
    let filler = (1..=6).map(|k| format!("{}f{}", s, k)).collect::<Vec<_>>().join(" ");
    format!("{}.fna\t{s}1 {s}2 {} {s}3 {s}4\n", s, filler, s = s)
}

fn write_inputs(dir: &Path) -> (String, String, String, String) {
    let path = |name: &str| dir.join(name).to_str().unwrap().to_owned();

    std::fs::write(path("tree.nwk"), TREE).unwrap();
    std::fs::write(
        path("geneOrder.txt"),
        ["A", "B", "C"].iter().map(|s| gene_order(s)).collect::<String>(),
    )
    .unwrap();
    std::fs::write(path("names.txt"), "a.fna A\nb.fna B\nc.fna C\n").unwrap();
    let families = (1..=4)
        .map(|k| format!("{k}\ti0\tNone\tNone\tNone\t{k},i0,None,None,a{k},b{k},c{k}\n", k = k))
        .collect::<String>();
    std::fs::write(path("families.out"), families).unwrap();

    (path("tree.nwk"), path("geneOrder.txt"), path("families.out"), path("names.txt"))
}

fn run_in(dir: &Path, settings: &Settings) -> (String, String) {
    let (tree, gene_order, families, names) = write_inputs(dir);
    let inputs = Inputs {
        species_tree: &tree,
        gene_order: &gene_order,
        families: &families,
        name_map: Some(&names),
    };
    let out = dir.join("islands.out");
    let summary = dir.join("summary.out");
    formation::run(&inputs, settings, out.to_str().unwrap(), summary.to_str().unwrap()).unwrap();
    (std::fs::read_to_string(out).unwrap(), std::fs::read_to_string(summary).unwrap())
}

#[test]
fn neighbours_are_merged_into_two_islands() {
    let dir = tempfile::tempdir().unwrap();
    let (islands, summary) = run_in(dir.path(), &Settings::default());

    assert_eq!(islands, "1\ti0\t1\t2\n3\ti0\t3\t4\n");
    assert_eq!(
        summary.lines().collect::<Vec<_>>(),
        vec![
            "Number of islands per node in focal clade:",
            "  Node  Before merge  After merge",
            "  ----  ------------  -----------",
            "  i0    4             2",
            "  i1    0             0",
            "  A     0             0",
            "  B     0             0",
            "  C     0             0",
        ]
    );
}

#[test]
fn islands_can_be_read_back() {
    let dir = tempfile::tempdir().unwrap();
    run_in(dir.path(), &Settings::default());

    let tree = SpeciesTree::from_newick_str(TREE).unwrap();
    let by_node = formation::read_islands(dir.path().join("islands.out").to_str().unwrap(), &tree).unwrap();
    assert_eq!(by_node.len(), 5);
    assert_eq!(
        by_node[0].iter().map(|i| i.locus_families().to_vec()).collect::<Vec<_>>(),
        vec![vec![1, 2], vec![3, 4]]
    );
    assert!(by_node[1..].iter().all(Vec::is_empty));
}

#[test]
fn output_is_independent_of_thread_count() {
    let outputs = [1, 2, 4]
        .iter()
        .map(|&n| {
            let dir = tempfile::tempdir().unwrap();
            rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .unwrap()
                .install(|| run_in(dir.path(), &Settings::default()))
        })
        .collect::<Vec<_>>();
    assert!(outputs.iter().all(|o| *o == outputs[0]));
}

#[test]
fn strict_threshold_keeps_singletons() {
    let dir = tempfile::tempdir().unwrap();
    let strict = Settings { rsc_threshold_merge1: 10., ..Default::default() };
    let (islands, _) = run_in(dir.path(), &strict);
    assert_eq!(islands.lines().count(), 4);
}

#[test]
fn configuration_errors_abort_early() {
    let dir = tempfile::tempdir().unwrap();
    let (tree, gene_order, families, _) = write_inputs(dir.path());
    let out = dir.path().join("islands.out");
    let out = out.to_str().unwrap();

    // Gene order strains only resolve through the name map
    let inputs =
        Inputs { species_tree: &tree, gene_order: &gene_order, families: &families, name_map: None };
    assert!(formation::run(&inputs, &Settings::default(), out, out).is_err());

    let missing = Settings { root_focal_clade: Some("Z".into()), ..Default::default() };
    assert!(formation::run(&inputs, &missing, out, out).is_err());
    assert!(!Path::new(out).exists());

    assert!(SpeciesTree::from_newick_str("(A,B,C)i0;").is_err());
}
