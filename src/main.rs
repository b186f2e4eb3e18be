use anyhow::*;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use log::*;

use xenoisle::formation::{self, Inputs, Settings};
use xenoisle::species_tree::SpeciesTree;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Commands,

    #[clap(flatten)]
    verbose: Verbosity<InfoLevel>,

    /// Number of worker threads; 0 uses all cores
    #[clap(short, long, default_value_t = 0, global = true)]
    threads: usize,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Form genomic islands from locus families and gene order
    MakeIslands {
        /// Species tree, in Newick format
        #[clap(long)]
        tree: String,

        /// Gene order table, one strain per line
        #[clap(long)]
        gene_order: String,

        /// Family file, one family per line
        #[clap(long)]
        families: String,

        /// Maps the strain names of the gene order table to species tree names
        #[clap(long)]
        name_map: Option<String>,

        /// Where to write the islands
        #[clap(short, long, default_value = "islands.out")]
        out: String,

        /// Where to write the merge summary
        #[clap(long, default_value = "islands-summary.out")]
        summary: String,

        #[clap(long, default_value_t = 2)]
        gene_proximity_range: usize,

        #[clap(long, default_value_t = 1)]
        proximity_threshold_merge1: usize,

        /// Defaults to the merge1 threshold
        #[clap(long)]
        proximity_threshold_merge2: Option<usize>,

        #[clap(long, default_value_t = 0.0, allow_hyphen_values = true)]
        rsc_threshold_merge1: f64,

        #[clap(long, default_value_t = 50)]
        max_cluster_size: usize,

        /// Node rooting the clade where islands are merged; defaults to the tree root
        #[clap(long)]
        root_focal_clade: Option<String>,
    },

    /// Count the islands of an island file at each node
    Summary {
        #[clap(long)]
        tree: String,

        #[clap(long)]
        islands: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    buche::new()
        .timestamp(buche::Timestamp::Off)
        .verbosity(args.verbose.log_level_filter())
        .init()?;
    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build_global()
        .context("while setting up the thread pool")?;
    info!("Using {} threads", rayon::current_num_threads());

    match args.command {
        Commands::MakeIslands {
            tree,
            gene_order,
            families,
            name_map,
            out,
            summary,
            gene_proximity_range,
            proximity_threshold_merge1,
            proximity_threshold_merge2,
            rsc_threshold_merge1,
            max_cluster_size,
            root_focal_clade,
        } => {
            let settings = Settings {
                gene_proximity_range,
                proximity_threshold_merge1,
                proximity_threshold_merge2: proximity_threshold_merge2
                    .unwrap_or(proximity_threshold_merge1),
                rsc_threshold_merge1,
                max_cluster_size,
                root_focal_clade,
            };
            let inputs = Inputs {
                species_tree: &tree,
                gene_order: &gene_order,
                families: &families,
                name_map: name_map.as_deref(),
            };
            let formation = formation::run(&inputs, &settings, &out, &summary)?;
            info!(
                "{} islands written to {}",
                formation.islands.iter().map(Vec::len).sum::<usize>(),
                out
            );
        }
        Commands::Summary { tree, islands } => {
            let species_tree = SpeciesTree::from_newick_file(&tree)?;
            let by_node = formation::read_islands(&islands, &species_tree)?;
            formation::write_counts(&by_node, &species_tree, &mut std::io::stdout())?;
        }
    }

    Ok(())
}
