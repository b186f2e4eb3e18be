pub mod cluster;
pub mod dede;
pub mod errors;
pub mod family;
pub mod formation;
pub mod genome;
pub mod island;
pub mod merge;
pub mod parsimony;
pub mod species_tree;
pub mod utils;
