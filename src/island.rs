use anyhow::*;

use crate::family::LocusFamilyID;
use crate::species_tree::{NodeID, SpeciesTree};

pub type IslandID = usize;

/// Which ends of two chains `a` and `b` are joined when `b` is merged into `a`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Orientation {
    /// last of `a` next to first of `b`: `a b`
    LastFirst,
    /// last of `a` next to last of `b`: `a rev(b)`
    LastLast,
    /// first of `a` next to first of `b`: `rev(b) a`
    FirstFirst,
    /// first of `a` next to last of `b`: `b a`
    FirstLast,
}

impl Orientation {
    pub const ALL: [Orientation; 4] = [
        Orientation::LastFirst,
        Orientation::LastLast,
        Orientation::FirstFirst,
        Orientation::FirstLast,
    ];

    pub fn code(&self) -> u8 {
        match self {
            Orientation::LastFirst => 0,
            Orientation::LastLast => 1,
            Orientation::FirstFirst => 2,
            Orientation::FirstLast => 3,
        }
    }
}

impl TryFrom<u8> for Orientation {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        Orientation::ALL.get(code as usize).copied().ok_or_else(|| anyhow!("invalid orientation code {}", code))
    }
}

/// An ordered chain of locus families believed to have arisen together at
/// `mrca`, left to right in chromosomal order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocusIsland {
    pub id: IslandID,
    pub mrca: NodeID,
    locus_families: Vec<LocusFamilyID>,
}

impl LocusIsland {
    pub fn new(id: IslandID, mrca: NodeID, locus_families: Vec<LocusFamilyID>) -> LocusIsland {
        LocusIsland { id, mrca, locus_families }
    }

    pub fn singleton(id: IslandID, mrca: NodeID, locus_family: LocusFamilyID) -> LocusIsland {
        LocusIsland::new(id, mrca, vec![locus_family])
    }

    pub fn locus_families(&self) -> &[LocusFamilyID] {
        &self.locus_families
    }

    pub fn len(&self) -> usize {
        self.locus_families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locus_families.is_empty()
    }

    pub fn first(&self) -> Option<LocusFamilyID> {
        self.locus_families.first().copied()
    }

    pub fn last(&self) -> Option<LocusFamilyID> {
        self.locus_families.last().copied()
    }

    /// Absorb `other` into `self`; `self` keeps its ID.
    pub fn merge(&mut self, other: LocusIsland, orientation: Orientation) {
        debug_assert_eq!(self.mrca, other.mrca);
        let mut other = other.locus_families;
        match orientation {
            Orientation::LastFirst => self.locus_families.extend(other),
            Orientation::LastLast => self.locus_families.extend(other.into_iter().rev()),
            Orientation::FirstFirst => {
                other.reverse();
                other.append(&mut self.locus_families);
                self.locus_families = other;
            }
            Orientation::FirstLast => {
                other.append(&mut self.locus_families);
                self.locus_families = other;
            }
        }
    }

    /// `id<TAB>mrca name<TAB>lf1<TAB>lf2...`
    pub fn to_file_string(&self, species_tree: &SpeciesTree) -> String {
        std::iter::once(self.id.to_string())
            .chain(std::iter::once(species_tree.name(self.mrca).to_owned()))
            .chain(self.locus_families.iter().map(|lf| lf.to_string()))
            .collect::<Vec<_>>()
            .join("\t")
    }

    pub fn from_file_string(s: &str, species_tree: &SpeciesTree) -> Result<LocusIsland> {
        let mut fields = s.split('\t').map(str::trim);
        let id = fields
            .next()
            .filter(|f| !f.is_empty())
            .context("missing island ID")?
            .parse::<IslandID>()
            .context("invalid island ID")?;
        let mrca = species_tree.node_by_name(fields.next().context("missing island mrca")?)?;
        let locus_families = fields
            .filter(|f| !f.is_empty())
            .map(|f| f.parse::<LocusFamilyID>().with_context(|| format!("invalid locus family `{}`", f)))
            .collect::<Result<Vec<_>>>()?;
        ensure!(!locus_families.is_empty(), "island {} has no locus family", id);
        Ok(LocusIsland { id, mrca, locus_families })
    }
}
