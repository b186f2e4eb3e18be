use colored::Colorize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("failed to open {}", .filename.bright_yellow().bold())]
    CannotOpen { source: std::io::Error, filename: String },

    #[error("while creating {}", .filename.bright_yellow().bold())]
    WhileCreating { source: std::io::Error, filename: String },
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("{}:{line}: {reason}", .filename.yellow().bold())]
    MalformedLine { filename: String, line: usize, reason: String },

    #[error("{}:{line}: expected a number, found `{}`", .filename.yellow().bold(), .found.yellow())]
    NotANumber { filename: String, line: usize, found: String },
}

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("species {} not found in the provided species tree", .0.yellow().bold())]
    SpeciesNotFound(String),

    #[error("strain {} has no entry in the provided name map", .0.yellow().bold())]
    UnmappedStrain(String),

    #[error("node {} has {1} children; the species tree must be binary", .0.yellow().bold())]
    NonBinaryTree(String, usize),

    #[error("gene {} not found in the gene order table", .0.yellow().bold())]
    UnknownGene(String),

    #[error("family {} not found in the catalog", .0.to_string().yellow().bold())]
    UnknownFamily(usize),

    #[error("{0} {} is defined more than once", .1.yellow().bold())]
    DuplicateId(&'static str, String),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}
