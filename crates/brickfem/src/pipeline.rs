//! One model run: build, place, clamp (or reuse the clamped state) and
//! load, inside a working area named after the assembly.

use crate::assembly::{Assembly, ExplicitLoad, LoadSpec, ModelSpec};
use crate::brick::MeshSpec;
use crate::cache::{self, CacheKey};
use crate::clamping::{self, ClampedState};
use crate::contact;
use crate::error::Result;
use crate::geometry::GeometryParams;
use crate::load::{self, LoadOutcome, DEFAULT_FRAMES};
use crate::placement::{self, PlacedModel};
use crate::solver::{Solver, SolverSettings};
use brickfem_ir::{ConstraintEnforcement, ElementFamily, ModelDocument};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Assembly record written into every working area.
pub const ASSEMBLY_RECORD: &str = "_dict-assembly.json";

/// Settings of a run that are not part of the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// External solver.
    pub solver: SolverSettings,
    /// Field output frames of explicit load steps.
    pub n_frames: u32,
    /// Normal enforcement of the brick contact property.
    pub contact_enforcement: ConstraintEnforcement,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            solver: SolverSettings::default(),
            n_frames: DEFAULT_FRAMES,
            contact_enforcement: ConstraintEnforcement::Default,
        }
    }
}

/// Working area name: `<name>-<impl|expl>-mesh<mesh in 1/100, 3 digits>mm`.
pub fn run_dir_name(name: &str, explicit: bool, mesh_size: f64) -> String {
    let mode = if explicit { "expl" } else { "impl" };
    let mesh = (mesh_size * 100.0).round() as u64;
    format!("{name}-{mode}-mesh{mesh:03}mm")
}

/// Parameter record of a load case.
pub fn parameter_record_path(workdir: &Path, job: &str) -> PathBuf {
    workdir.join(format!("{job}-par.json"))
}

#[derive(Serialize)]
struct AssemblyRecord<'a> {
    lego_geom: &'a GeometryParams,
    assembly: &'a Assembly,
}

#[derive(Serialize)]
struct ParameterRecord<'a> {
    explicit_par: Option<&'a ExplicitLoad>,
    t_step: Option<f64>,
}

fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

/// Remove files left by earlier runs of the assembly `name`: its job files
/// and the stored clamped state. Other files in the working area stay.
pub fn clear_job_files(workdir: &Path, name: &str) -> Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(workdir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if !file_name.starts_with(name) && file_name != cache::CACHE_FILE {
            continue;
        }
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(entry.path())?;
        } else {
            fs::remove_file(entry.path())?;
        }
        removed += 1;
    }
    if removed > 0 {
        debug!(workdir = %workdir.display(), removed, "cleared earlier job files");
    }
    Ok(removed)
}

/// Result of one load case.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadCase {
    /// Job that ran the load step.
    pub job: String,
    /// Step time of an explicit case.
    pub t_step: Option<f64>,
    /// How the load step ended.
    pub outcome: LoadOutcome,
}

/// What a run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Working area.
    pub workdir: PathBuf,
    /// Clamped state every load case started from.
    pub clamped: ClampedState,
    /// Whether the clamped state came from the cache.
    pub reused: bool,
    /// Load cases in run order.
    pub load_cases: Vec<LoadCase>,
}

/// Element family of a run: hexahedra for implicit runs, tetrahedra when
/// the clamped state feeds explicit models.
pub fn element_family(load: &LoadSpec) -> ElementFamily {
    if load.is_explicit() {
        ElementFamily::Tetrahedral
    } else {
        ElementFamily::HexReduced
    }
}

/// Build and place the assembly of a validated input.
pub fn build_model(spec: &ModelSpec) -> Result<PlacedModel> {
    let mesh = MeshSpec {
        size: spec.assembly.mesh_size,
        family: element_family(&spec.load),
    };
    let solids = placement::build_solids(&spec.assembly, &spec.dims, &mesh)?;
    let model = placement::place(&spec.assembly, &spec.dims, &solids)?;
    info!(
        assembly = %model.name,
        bricks = solids.len(),
        parts = model.parts.len(),
        instances = model.instances.len(),
        "model built"
    );
    Ok(model)
}

/// Run a model under `root`.
///
/// Implicit input runs the clamping steps and the static load step as one
/// job. Explicit input clamps once (or reuses the stored clamped state when
/// `spec.reuse` is set) and runs one explicit job per step time. A load step
/// that stops converging is reported in the summary, not as an error.
/// Unless the clamped state is reused, files of earlier runs of the same
/// assembly are removed from the working area first.
pub fn make_model<S: Solver + ?Sized>(
    spec: &ModelSpec,
    settings: &RunSettings,
    solver: &mut S,
    root: &Path,
) -> Result<RunSummary> {
    let assembly = &spec.assembly;
    let workdir = root.join(run_dir_name(
        &assembly.name,
        spec.load.is_explicit(),
        assembly.mesh_size,
    ));
    fs::create_dir_all(&workdir)?;
    if !spec.reuse {
        clear_job_files(&workdir, &assembly.name)?;
    }
    write_json(
        &workdir.join(ASSEMBLY_RECORD),
        &AssemblyRecord {
            lego_geom: &spec.dims.params,
            assembly,
        },
    )?;

    let mut model = build_model(spec)?;
    model.contact_enforcement = settings.contact_enforcement;
    let summary = match &spec.load {
        LoadSpec::Implicit => run_implicit(spec, &model, solver, &workdir)?,
        LoadSpec::Explicit(load) => run_explicit(spec, load, settings, &model, solver, &workdir)?,
    };
    info!(
        workdir = %summary.workdir.display(),
        load_cases = summary.load_cases.len(),
        reused = summary.reused,
        "run finished"
    );
    Ok(summary)
}

fn clamping_doc<S: Solver + ?Sized>(
    spec: &ModelSpec,
    model: &PlacedModel,
    solver: &mut S,
    workdir: &Path,
) -> Result<ModelDocument> {
    let plan = contact::plan(model, spec.dims.params.h_stud);
    let restart = spec.load.is_explicit();
    Ok(clamping::clamping_document(solver, model, &plan, &spec.dims, workdir, restart)?)
}

fn run_implicit<S: Solver + ?Sized>(
    spec: &ModelSpec,
    model: &PlacedModel,
    solver: &mut S,
    workdir: &Path,
) -> Result<RunSummary> {
    let mut doc = clamping_doc(spec, model, solver, workdir)?;
    load::add_implicit_load(&mut doc, &spec.assembly.loads_rp);
    write_json(
        &parameter_record_path(workdir, &doc.name),
        &ParameterRecord {
            explicit_par: None,
            t_step: None,
        },
    )?;

    let (clamped, report) = clamping::run_clamping(solver, &doc, workdir)?;
    let outcome = load::load_outcome(&clamped, &report)?;
    Ok(RunSummary {
        workdir: workdir.to_path_buf(),
        load_cases: vec![LoadCase {
            job: report.job,
            t_step: None,
            outcome,
        }],
        clamped,
        reused: false,
    })
}

fn run_explicit<S: Solver + ?Sized>(
    spec: &ModelSpec,
    load: &ExplicitLoad,
    settings: &RunSettings,
    model: &PlacedModel,
    solver: &mut S,
    workdir: &Path,
) -> Result<RunSummary> {
    let key = CacheKey::new(&spec.assembly, &spec.dims.params);
    let clamped = if spec.reuse {
        cache::load(workdir, &key)?
    } else {
        let mut doc = clamping_doc(spec, model, solver, workdir)?;
        load::add_explicit_prestep(&mut doc, &spec.assembly.loads_rp);
        let (clamped, _) = clamping::run_clamping(solver, &doc, workdir)?;
        cache::store(workdir, &key, &clamped)?;
        clamped
    };

    let mut load_cases = Vec::with_capacity(load.t_steps.len());
    for &t_step in &load.t_steps {
        let doc = load::explicit_document(
            model,
            &spec.assembly.loads_rp,
            load,
            t_step,
            &clamped,
            settings.n_frames,
        );
        write_json(
            &parameter_record_path(workdir, &doc.name),
            &ParameterRecord {
                explicit_par: Some(load),
                t_step: Some(t_step),
            },
        )?;
        info!(job = %doc.name, t_step, "running explicit load case");
        let report = solver.run(&doc, workdir)?;
        let outcome = load::load_outcome(&clamped, &report)?;
        debug!(job = %report.job, ?outcome, "load case finished");
        load_cases.push(LoadCase {
            job: report.job,
            t_step: Some(t_step),
            outcome,
        });
    }

    Ok(RunSummary {
        workdir: workdir.to_path_buf(),
        clamped,
        reused: spec.reuse,
        load_cases,
    })
}
