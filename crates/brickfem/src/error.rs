//! Error types for model construction and solver orchestration.

use crate::clamping::ClampingState;
use std::path::PathBuf;
use thiserror::Error;

/// Derived brick dimensions that cannot be realized.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// A dimension or material constant must be strictly positive.
    #[error("{name} must be positive, got {value}")]
    NonPositive {
        /// Parameter or derived quantity.
        name: &'static str,
        /// Offending value.
        value: f64,
    },

    /// A dimension must not be negative.
    #[error("{name} must not be negative, got {value}")]
    Negative {
        /// Parameter.
        name: &'static str,
        /// Offending value.
        value: f64,
    },

    /// A cavity feature sits closer to a stud axis than the stud radius.
    #[error("{feature} clearance {clearance} does not exceed stud radius {stud_radius}")]
    NegativeClearance {
        /// Cavity feature (tube or pin).
        feature: &'static str,
        /// Distance from a stud axis to the feature surface.
        clearance: f64,
        /// Stud radius.
        stud_radius: f64,
    },

    /// A parameter is NaN or infinite.
    #[error("{0} must be finite")]
    NonFinite(&'static str),

    /// Poisson ratio outside the admissible range.
    #[error("poisson ratio must lie in (-1, 0.5), got {0}")]
    PoissonRatio(f64),
}

/// Invalid assembly or load input, detected before any solver call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Assembly name is empty or not usable as a file name.
    #[error("invalid assembly name '{0}'")]
    InvalidName(String),

    /// Assembly has no parts.
    #[error("assembly has no parts")]
    EmptyAssembly,

    /// Stud counts must be at least one.
    #[error("brick {brick_id}: stud counts must be >= 1, got {nx}x{nz}")]
    InvalidGrid {
        /// Brick definition.
        brick_id: u32,
        /// Studs along x.
        nx: u32,
        /// Studs along z.
        nz: u32,
    },

    /// A part references an undefined brick.
    #[error("part {part_id}: unknown brick_id {brick_id}")]
    UnknownBrick {
        /// Part instance.
        part_id: u32,
        /// Missing brick definition.
        brick_id: u32,
    },

    /// A boundary condition or load references an undefined part.
    #[error("{entry}: unknown part_id {part_id}")]
    UnknownPart {
        /// Referencing entry, e.g. `bc 2`.
        entry: String,
        /// Missing part.
        part_id: u32,
    },

    /// A set name is not one of the named sets a brick provides.
    #[error("{entry}: unknown set name '{set_name}'")]
    UnknownSet {
        /// Referencing entry.
        entry: String,
        /// Offending set name.
        set_name: String,
    },

    /// A set exists in general but not on the referenced brick.
    #[error("{entry}: part {part_id} has no set '{set_name}'")]
    DanglingSet {
        /// Referencing entry.
        entry: String,
        /// Part instance.
        part_id: u32,
        /// Set name.
        set_name: String,
    },

    /// Non-finite coordinate in a placement or load.
    #[error("{entry}: non-finite value")]
    NonFinite {
        /// Offending entry.
        entry: String,
    },

    /// Mesh size must be positive.
    #[error("mesh_size must be positive, got {0}")]
    MeshSize(f64),

    /// Friction coefficient must be non-negative.
    #[error("mu must be non-negative, got {0}")]
    Friction(f64),

    /// Rigid loading body is missing or has inconsistent parameters.
    #[error("rigid load {id}: {reason}")]
    MalformedRigidBody {
        /// Rigid load id.
        id: u32,
        /// What is wrong.
        reason: String,
    },

    /// Explicit load parameters are inconsistent.
    #[error("explicit_par: {0}")]
    MalformedExplicit(String),

    /// Invalid geometry parameters.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// A brick/grid combination the builder cannot realize.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    /// Cavity features do not fit inside the cavity.
    #[error("{brick}: {feature} does not fit inside the cavity")]
    FeatureOutsideCavity {
        /// Brick description.
        brick: String,
        /// Feature description.
        feature: String,
    },

    /// A solid dimension collapsed to zero or below.
    #[error("{brick}: degenerate {what} ({value})")]
    Degenerate {
        /// Brick description.
        brick: String,
        /// Collapsed dimension.
        what: &'static str,
        /// Its value.
        value: f64,
    },

    /// Invalid geometry parameters.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Failure of one of the clamping steps.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("clamping step '{}' did not converge in job '{job}' ({reason})", .failed.step_name())]
pub struct NonConvergence {
    /// Job that ran the clamping steps.
    pub job: String,
    /// Step that failed.
    pub failed: ClampingState,
    /// Last state that converged, if any.
    pub furthest: Option<ClampingState>,
    /// Solver-reported reason.
    pub reason: String,
}

/// Failure talking to the solver process.
#[derive(Error, Debug)]
pub enum SolverError {
    /// I/O error on the working area or the process.
    #[error("solver I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unreadable model, report or node file.
    #[error("malformed solver file: {0}")]
    Json(#[from] serde_json::Error),

    /// The solver process exited without writing its report.
    #[error("solver exited with {status} and no report at {path}")]
    MissingReport {
        /// Exit status description.
        status: String,
        /// Expected report path.
        path: PathBuf,
    },

    /// Input closed before the job's completion was confirmed. The solver
    /// process has been stopped.
    #[error("completion of job '{job}' was never confirmed (input closed)")]
    Unconfirmed {
        /// Job name.
        job: String,
    },

    /// Report does not mention a step the model defines.
    #[error("job '{job}' report has no entry for step '{step}'")]
    MissingStep {
        /// Job name.
        job: String,
        /// Step name.
        step: String,
    },
}

/// Clamped-state cache failures.
#[derive(Error, Debug)]
pub enum CacheError {
    /// No clamped state has been stored in this working area.
    #[error("no clamped state in {0}; run with clamping enabled first")]
    Missing(PathBuf),

    /// The stored state was produced for a different assembly or geometry.
    #[error("clamped state in {0} belongs to a different assembly; rerun clamping")]
    Stale(PathBuf),

    /// I/O error on the cache file.
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Corrupt cache file.
    #[error("corrupt cache file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Any failure of a model run.
#[derive(Error, Debug)]
pub enum BrickFemError {
    /// Invalid input.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Geometry cannot be built.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Clamping failed to converge.
    #[error(transparent)]
    NonConvergence(#[from] NonConvergence),

    /// Solver process failure.
    #[error(transparent)]
    Solver(#[from] SolverError),

    /// Clamped-state cache failure.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// I/O error on the working area.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to write a record.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<GeometryError> for BrickFemError {
    fn from(e: GeometryError) -> Self {
        BrickFemError::Config(ConfigError::Geometry(e))
    }
}

/// Result type for model runs.
pub type Result<T> = std::result::Result<T, BrickFemError>;
