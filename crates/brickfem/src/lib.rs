#![warn(missing_docs)]

//! brickfem - finite-element models of interlocking snap-fit bricks
//!
//! Builds brick solids from a compact parameter table, places them into an
//! assembly, clamps the studs into their cavities in three static steps
//! and appends either a static load step or separate explicit load models.
//! The finite-element solver itself is an external collaborator behind
//! the [`Solver`] trait.
//!
//! # Example
//!
//! ```rust,no_run
//! use brickfem::{make_model, CommandSolver, ModelInput, RunSettings};
//! use std::path::Path;
//!
//! let json = std::fs::read_to_string("case-1.json")?;
//! let spec = ModelInput::from_json(&json)?.validate()?;
//! let settings = RunSettings::default();
//! let mut solver = CommandSolver::new(settings.solver.clone());
//! let summary = make_model(&spec, &settings, &mut solver, Path::new("."))?;
//! println!("{} load case(s) in {}", summary.load_cases.len(), summary.workdir.display());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod assembly;
pub mod brick;
pub mod cache;
pub mod clamping;
pub mod color;
pub mod contact;
pub mod csg;
pub mod error;
pub mod geometry;
pub mod load;
pub mod pipeline;
pub mod placement;
pub mod solver;
pub mod widen;

pub use assembly::{Assembly, LoadSpec, ModelInput, ModelSpec};
pub use brick::{build, BrickDefinition, BrickSolid, BrickType, MeshSpec, NamedSet};
pub use clamping::{ClampedState, ClampingState};
pub use error::{
    BrickFemError, BuildError, CacheError, ConfigError, GeometryError, NonConvergence, Result,
    SolverError,
};
pub use geometry::{Dimensions, GeometryParams};
pub use load::LoadOutcome;
pub use pipeline::{build_model, make_model, LoadCase, RunSettings, RunSummary};
pub use placement::{place, PlacedModel};
pub use solver::{CommandSolver, CompletionWait, JobReport, MeshNode, Solver, StepReport, StepStatus};
