use std::path::PathBuf;
use thiserror::Error;

/// Fatal conditions that can stop a run. `ConfigError`s are raised during
/// validation, before any external program has been launched; the rest may
/// surface at any point of the pipeline.
#[derive(Debug, Error)]
pub enum EndstateError {
    #[error("invalid input: {0}")]
    Config(String),

    #[error("internal error: {0} (this is a bug, please report it)")]
    Internal(String),

    #[error("trajectory mismatch: {0}")]
    TrajectoryMismatch(String),

    #[error("{prog} failed with {status}; check {output}")]
    SolverFailure {
        prog: String,
        status: String,
        output: String,
    },

    #[error("could not parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

/// Raised when two energy vectors of different lengths are combined at a
/// site that wants strict per-frame arithmetic. The composer catches this
/// and falls back to independent-variance propagation.
#[derive(Debug, Error)]
#[error("cannot combine energy vectors of length {left} and {right}")]
pub struct LengthError {
    pub left: usize,
    pub right: usize,
}

/// Errors from the namelist input parser. These are all `ConfigError`s in
/// spirit; they carry enough structure for the tests to assert on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("can't find input file ({0})")]
    FileNotFound(String),

    #[error("invalid input; terminate each namelist prior to starting another one")]
    UnterminatedNamespace,

    #[error("unrecognized namelist &{0}")]
    UnknownNamespace(String),

    #[error("unknown variable {token} in &{namespace}")]
    UnknownVariable { namespace: String, token: String },

    #[error("ambiguous variable {token} in &{namespace}: matches {first} and {second}")]
    AmbiguousPrefix {
        namespace: String,
        token: String,
        first: String,
        second: String,
    },

    #[error("variable {name} given more than once in &{namespace}")]
    DuplicateVariable { namespace: String, name: String },

    #[error("bad value for {name} in &{namespace}: expected {expected}, got `{got}`")]
    TypeMismatch {
        namespace: String,
        name: String,
        expected: &'static str,
        got: String,
    },

    #[error("namelist &{0} specified multiple times")]
    DuplicateNamespace(String),

    #[error("invalid input file; stray data outside any assignment in &{0}")]
    StrayField(String),
}
