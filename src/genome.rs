use std::collections::HashMap;

use anyhow::*;
use log::*;
use rayon::prelude::*;

use crate::errors::RuntimeError;
use crate::species_tree::{NodeID, SpeciesTree};
use crate::utils::*;

pub type GeneID = usize;

pub struct Gene {
    pub name: String,
    pub strain: NodeID,
    pub contig: usize,
    pub pos: usize,
}

/// Every gene of every strain, numbered densely in order of appearance in
/// the gene order table.
#[derive(Default)]
pub struct GeneBook {
    genes: Vec<Gene>,
    by_name: HashMap<String, GeneID>,
    contigs: Vec<(NodeID, Vec<GeneID>)>,
}

/// Maps the strain names used in the gene order table to species tree names.
pub fn read_name_map(filename: &str) -> Result<HashMap<String, String>> {
    let mut r = HashMap::new();
    for (i, l) in data_lines(filename)? {
        if l.starts_with(char::is_whitespace) {
            continue;
        }
        let mut s = l.split_whitespace();
        match (s.next(), s.next(), s.next()) {
            (Some(file_name), Some(human), None) => {
                r.insert(file_name.to_owned(), human.to_owned());
            }
            _ => return Err(malformed(filename, i, "expected `<file name> <strain name>`")),
        }
    }
    Ok(r)
}

impl GeneBook {
    pub fn new() -> GeneBook {
        Default::default()
    }

    /// Parse a gene order table: one strain per line, the strain name then one
    /// tab-separated field per contig, genes separated by whitespace.
    pub fn from_gene_order_file(
        filename: &str,
        species_tree: &SpeciesTree,
        name_map: Option<&HashMap<String, String>>,
    ) -> Result<GeneBook> {
        info!("Parsing gene order from {}", filename);
        let mut book = GeneBook::new();
        for (i, l) in data_lines(filename)? {
            let mut fields = l.split('\t');
            let strain = fields.next().map(str::trim).filter(|s| !s.is_empty());
            let strain = strain.ok_or_else(|| malformed(filename, i, "missing strain name"))?;
            let strain = match name_map {
                Some(m) => m
                    .get(strain)
                    .ok_or_else(|| RuntimeError::UnmappedStrain(strain.to_owned()))?
                    .as_str(),
                None => strain,
            };
            let leaf = species_tree.leaf_by_name(strain)?;
            let contigs = fields
                .map(|c| c.split_whitespace().map(str::to_owned).collect::<Vec<_>>())
                .filter(|c| !c.is_empty())
                .collect::<Vec<_>>();
            book.add_strain(leaf, contigs)
                .with_context(|| format!("while reading {} at line {}", filename, i))?;
        }
        info!("Done: {} genes on {} contigs.", book.len(), book.contigs.len());
        Ok(book)
    }

    pub fn add_strain(&mut self, strain: NodeID, contigs: Vec<Vec<String>>) -> Result<()> {
        for genes in contigs {
            let contig = self.contigs.len();
            let mut ids = Vec::with_capacity(genes.len());
            for (pos, name) in genes.into_iter().enumerate() {
                let id = self.genes.len();
                if self.by_name.insert(name.clone(), id).is_some() {
                    bail!(RuntimeError::DuplicateId("gene", name));
                }
                self.genes.push(Gene { name, strain, contig, pos });
                ids.push(id);
            }
            self.contigs.push((strain, ids));
        }
        Ok(())
    }

    pub fn id(&self, name: &str) -> Result<GeneID> {
        self.by_name.get(name).copied().ok_or_else(|| RuntimeError::UnknownGene(name.to_owned()).into())
    }

    pub fn get(&self, id: GeneID) -> &Gene {
        &self.genes[id]
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    /// The gene order table, one (strain, ordered genes) entry per contig.
    pub fn contigs(&self) -> &[(NodeID, Vec<GeneID>)] {
        &self.contigs
    }
}

/// Chromosomal distances, in genes, between every pair of genes lying on the
/// same contig no further than the radius the index was built with.
pub struct ProximityIndex {
    radius: usize,
    distances: HashMap<(GeneID, GeneID), u32>,
}

impl ProximityIndex {
    pub fn build(book: &GeneBook, radius: usize) -> ProximityIndex {
        info!("Building gene proximity index with radius {}", radius);
        let distances = book
            .contigs()
            .par_iter()
            .flat_map_iter(|(_, genes)| {
                (0..genes.len()).flat_map(move |i| {
                    let end = genes.len().min(i.saturating_add(radius).saturating_add(1));
                    genes[i + 1..end].iter().enumerate().map(move |(d, &g)| {
                        let (a, b) = (genes[i].min(g), genes[i].max(g));
                        ((a, b), d as u32 + 1)
                    })
                })
            })
            .collect::<HashMap<_, _>>();
        debug!("{} proximate gene pairs", distances.len());
        ProximityIndex { radius, distances }
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    pub fn len(&self) -> usize {
        self.distances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distances.is_empty()
    }

    /// `None` if the genes are on different contigs or further apart than the
    /// index radius.
    pub fn distance(&self, g1: GeneID, g2: GeneID) -> Option<u32> {
        self.distances.get(&(g1.min(g2), g1.max(g2))).copied()
    }

    pub fn within(&self, g1: GeneID, g2: GeneID, threshold: usize) -> bool {
        self.distance(g1, g2).map(|d| d as usize <= threshold).unwrap_or(false)
    }
}
