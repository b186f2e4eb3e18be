use anyhow::*;
use identity_hash::IntMap;
use itertools::Itertools;
use log::*;
use smallvec::SmallVec;

use crate::errors::RuntimeError;
use crate::genome::{GeneBook, GeneID};
use crate::species_tree::{NodeID, SpeciesTree};
use crate::utils::*;

pub type FamilyID = usize;
pub type LocusFamilyID = usize;

/// What the island engine needs to know about a group of genes: which of
/// them sit on a given strain.
pub trait StrainGenes {
    fn genes_in(&self, strain: NodeID) -> &[GeneID];
}

/// The genes of one family occupying a single locus, tagged with the
/// species tree node where this locus is inferred to originate.
#[derive(Debug, Clone)]
pub struct LocusFamily {
    pub id: LocusFamilyID,
    pub family: FamilyID,
    pub mrca: NodeID,
    pub locus: Option<usize>,
    genes: IntMap<NodeID, SmallVec<[GeneID; 2]>>,
}

impl LocusFamily {
    pub fn new(id: LocusFamilyID, family: FamilyID, mrca: NodeID, locus: Option<usize>) -> Self {
        LocusFamily { id, family, mrca, locus, genes: Default::default() }
    }

    pub fn add_gene(&mut self, strain: NodeID, gene: GeneID) {
        self.genes.entry(strain).or_default().push(gene);
    }

    pub fn add_genes(&mut self, book: &GeneBook, genes: impl IntoIterator<Item = GeneID>) {
        for g in genes {
            self.add_gene(book.get(g).strain, g);
        }
    }

    /// The strains where this locus family is present, in ascending order.
    pub fn strains(&self) -> impl Iterator<Item = NodeID> + '_ {
        self.genes.keys().copied().sorted()
    }

    pub fn genes(&self) -> impl Iterator<Item = GeneID> + '_ {
        self.strains().flat_map(move |s| self.genes[&s].iter().copied())
    }
}

impl StrainGenes for LocusFamily {
    fn genes_in(&self, strain: NodeID) -> &[GeneID] {
        self.genes.get(&strain).map(|g| g.as_slice()).unwrap_or(&[])
    }
}

#[derive(Debug, Clone)]
pub struct Family {
    pub id: FamilyID,
    pub mrca: NodeID,
    locus_families: Vec<LocusFamilyID>,
}

impl Family {
    pub fn locus_families(&self) -> &[LocusFamilyID] {
        &self.locus_families
    }
}

/// Write-once catalog of families and locus families, both indexed by ID.
#[derive(Default)]
pub struct Families {
    families: IntMap<FamilyID, Family>,
    locus_families: IntMap<LocusFamilyID, LocusFamily>,
}

impl Families {
    pub fn new() -> Families {
        Default::default()
    }

    pub fn add_family(&mut self, id: FamilyID, mrca: NodeID) -> Result<()> {
        if self.families.contains_key(&id) {
            bail!(RuntimeError::DuplicateId("family", id.to_string()));
        }
        self.families.insert(id, Family { id, mrca, locus_families: Vec::new() });
        Ok(())
    }

    /// Register a locus family; its family must have been added first.
    pub fn add_locus_family(&mut self, lf: LocusFamily) -> Result<()> {
        if self.locus_families.contains_key(&lf.id) {
            bail!(RuntimeError::DuplicateId("locus family", lf.id.to_string()));
        }
        self.families
            .get_mut(&lf.family)
            .ok_or(RuntimeError::UnknownFamily(lf.family))?
            .locus_families
            .push(lf.id);
        self.locus_families.insert(lf.id, lf);
        Ok(())
    }

    pub fn family(&self, id: FamilyID) -> Option<&Family> {
        self.families.get(&id)
    }

    pub fn locus_family(&self, id: LocusFamilyID) -> Option<&LocusFamily> {
        self.locus_families.get(&id)
    }

    pub fn iter_families(&self) -> impl Iterator<Item = &Family> {
        self.families.keys().sorted().map(move |k| &self.families[k])
    }

    pub fn iter_locus_families(&self) -> impl Iterator<Item = &LocusFamily> {
        self.locus_families.keys().sorted().map(move |k| &self.locus_families[k])
    }

    pub fn family_count(&self) -> usize {
        self.families.len()
    }

    pub fn locus_family_count(&self) -> usize {
        self.locus_families.len()
    }

    /// Parse a family file: one family per line, as
    /// `famNum<TAB>mrca<TAB>geneTree<TAB>recon<TAB>sourceFam<TAB>lf1<TAB>lf2...`,
    /// where each locus family reads
    /// `lfNum,lfMrca,locusNum,reconRootKey,gene1,gene2...` and `locusNum` may
    /// be `None`. Gene trees, reconciliations and root keys are skipped.
    pub fn from_file(filename: &str, species_tree: &SpeciesTree, book: &GeneBook) -> Result<Families> {
        info!("Parsing families from {}", filename);
        let mut families = Families::new();
        for (i, l) in data_lines(filename)? {
            let mut fields = l.split('\t');
            let (id, mrca) = match (fields.next(), fields.next()) {
                (Some(id), Some(mrca)) => (parse_number(id, filename, i)?, mrca.trim()),
                _ => {
                    return Err(malformed(
                        filename,
                        i,
                        "expected `<family> <mrca> <gene tree> <recon> <source> <locus families>...`",
                    ))
                }
            };
            if fields.by_ref().take(3).count() < 3 {
                return Err(malformed(filename, i, "missing gene tree, reconciliation or source family"));
            }
            families.add_family(id, species_tree.node_by_name(mrca)?)?;

            for lf_str in fields.filter(|f| !f.trim().is_empty()) {
                let mut parts = lf_str.split(',').map(str::trim);
                let (lf_id, lf_mrca, locus) =
                    match (parts.next(), parts.next(), parts.next(), parts.next()) {
                        (Some(lf_id), Some(lf_mrca), Some(locus), Some(_root_key)) => {
                            (lf_id, lf_mrca, locus)
                        }
                        _ => {
                            return Err(malformed(
                                filename,
                                i,
                                format!("truncated locus family `{}`", lf_str),
                            ))
                        }
                    };
                let locus = if locus == "None" { None } else { Some(parse_number(locus, filename, i)?) };
                let mut lf = LocusFamily::new(
                    parse_number(lf_id, filename, i)?,
                    id,
                    species_tree.node_by_name(lf_mrca)?,
                    locus,
                );
                let genes = parts
                    .filter(|g| !g.is_empty())
                    .map(|g| book.id(g))
                    .collect::<Result<Vec<_>>>()
                    .with_context(|| format!("in {} at line {}", filename, i))?;
                lf.add_genes(book, genes);
                families.add_locus_family(lf)?;
            }
        }
        info!(
            "Done: {} families, {} locus families.",
            families.family_count(),
            families.locus_family_count()
        );
        Ok(families)
    }
}
