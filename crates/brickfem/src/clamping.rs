//! Contact clamping: the widen, contact and free steps that turn an
//! interpenetrating placement into an equilibrated, clamped assembly.
//!
//! The steps run as one job. Its report is then walked through the typed
//! states [`Widening`] → [`Contacting`] → [`Freeing`] → [`ClampedState`];
//! each transition consumes the previous state and only succeeds if that
//! step converged, so a [`ClampedState`] exists only for a fully clamped
//! job.

use crate::assembly::SetRef;
use crate::brick::NamedSet;
use crate::contact::{self, ContactPlan};
use crate::error::{BrickFemError, NonConvergence, SolverError};
use crate::geometry::Dimensions;
use crate::placement::PlacedModel;
use crate::solver::{JobReport, Solver, StepReport, StepStatus};
use crate::widen;
use brickfem_ir::{AnalysisKind, BoundaryCondition, ModelDocument, Procedure, INITIAL_STEP};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Step of the clamping sequence, followed by the load step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ClampingState {
    /// Cavities pushed out of the studs, stud tops held.
    Widen,
    /// Widening released, stud/cavity contact active.
    Contact,
    /// Stud tops released; the clamped configuration.
    Free,
    /// Loading.
    Load,
}

impl ClampingState {
    /// The three clamping steps in order.
    pub const CLAMPING: [ClampingState; 3] =
        [ClampingState::Widen, ClampingState::Contact, ClampingState::Free];

    /// Analysis step name.
    pub const fn step_name(self) -> &'static str {
        match self {
            ClampingState::Widen => "widen",
            ClampingState::Contact => "contact",
            ClampingState::Free => "free",
            ClampingState::Load => "load",
        }
    }
}

impl fmt::Display for ClampingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.step_name())
    }
}

/// Procedure of the three clamping steps.
pub fn clamping_procedure() -> Procedure {
    Procedure::Static {
        initial_increment: 1.0,
        min_increment: 1e-8,
        max_increment: 1.0,
        max_increments: 1000,
        nlgeom: true,
    }
}

/// Name of the fixity of `bc` entry `id`.
pub fn fixity_name(id: u32) -> String {
    format!("fix-brick-{id:02}")
}

/// Name of the stud-top fixity of a part.
pub fn top_fixity_name(part_id: u32) -> String {
    format!("fix-top-i{part_id}")
}

/// Build the clamping model of a placed assembly.
///
/// Holds every `bc` region from the start, holds all top faces until
/// `free`, widens engaged cavities in `widen` and activates one
/// surface-to-surface interaction per contact pair in `contact`. With
/// `restart` the `free` step writes a restart record for an explicit model
/// to import.
pub fn clamping_document<S: Solver + ?Sized>(
    solver: &mut S,
    model: &PlacedModel,
    plan: &ContactPlan,
    dims: &Dimensions,
    workdir: &Path,
    restart: bool,
) -> Result<ModelDocument, SolverError> {
    let [widen, contact, free] = ClampingState::CLAMPING.map(ClampingState::step_name);
    let mut doc = model.document(&model.name, AnalysisKind::Standard);
    doc.push_step(widen, clamping_procedure());
    doc.push_step(contact, clamping_procedure());
    doc.push_step(free, clamping_procedure()).restart = restart;

    for (&id, region) in &model.fixed {
        doc.boundary_conditions.push(BoundaryCondition::pinned(
            fixity_name(id),
            region.clone(),
            INITIAL_STEP,
        ));
    }
    for &part_id in model.placed.keys() {
        let target = SetRef {
            part_id,
            set: NamedSet::TopFaces,
        };
        if let Some(region) = model.region(&target) {
            let mut bc = BoundaryCondition::pinned(top_fixity_name(part_id), region, INITIAL_STEP);
            bc.deactivated_in = Some(free.to_string());
            doc.boundary_conditions.push(bc);
        }
    }

    let widening = widen::widen_conditions(solver, model, plan, dims, workdir, widen, contact)?;
    debug!(conditions = widening.len(), "widening conditions");
    doc.boundary_conditions.extend(widening);

    let property = contact::contact_property(model.mu, model.contact_enforcement);
    doc.contact_properties.insert(property.name.clone(), property);
    doc.interactions.extend(plan.interactions(contact));
    Ok(doc)
}

/// Converged clamped configuration, the baseline of every load case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClampedState {
    /// Job that ran the clamping steps.
    pub job: String,
    /// Its result archive.
    pub archive: PathBuf,
    /// Step holding the clamped configuration.
    pub step: String,
    /// Last converged increment of that step.
    pub increment: Option<u32>,
}

/// Entry state: the widen step has not been checked yet.
#[derive(Debug)]
pub struct Widening<'r> {
    report: &'r JobReport,
}

/// Widen converged.
#[derive(Debug)]
pub struct Contacting<'r> {
    report: &'r JobReport,
}

/// Contact converged.
#[derive(Debug)]
pub struct Freeing<'r> {
    report: &'r JobReport,
}

fn converged<'r>(
    report: &'r JobReport,
    state: ClampingState,
    furthest: Option<ClampingState>,
) -> Result<&'r StepReport, NonConvergence> {
    let fail = |reason: String| NonConvergence {
        job: report.job.clone(),
        failed: state,
        furthest,
        reason,
    };
    let step = report
        .step(state.step_name())
        .ok_or_else(|| fail("step not reported".to_string()))?;
    match &step.status {
        StepStatus::Completed => {
            debug!(job = %report.job, step = %state, "step converged");
            Ok(step)
        }
        StepStatus::Aborted(reason) => Err(fail(reason.clone())),
        StepStatus::NotRun => Err(fail("step did not run".to_string())),
    }
}

impl<'r> Widening<'r> {
    /// Start walking a clamping job's report.
    pub fn new(report: &'r JobReport) -> Self {
        Self { report }
    }

    /// Advance once `widen` converged.
    pub fn converge(self) -> Result<Contacting<'r>, NonConvergence> {
        converged(self.report, ClampingState::Widen, None)?;
        Ok(Contacting {
            report: self.report,
        })
    }
}

impl<'r> Contacting<'r> {
    /// Advance once `contact` converged.
    pub fn converge(self) -> Result<Freeing<'r>, NonConvergence> {
        converged(self.report, ClampingState::Contact, Some(ClampingState::Widen))?;
        Ok(Freeing {
            report: self.report,
        })
    }
}

impl<'r> Freeing<'r> {
    /// Finish once `free` converged.
    pub fn converge(self) -> Result<ClampedState, NonConvergence> {
        let step = converged(self.report, ClampingState::Free, Some(ClampingState::Contact))?;
        Ok(ClampedState {
            job: self.report.job.clone(),
            archive: self.report.archive.clone(),
            step: step.name.clone(),
            increment: step.last_converged_increment,
        })
    }
}

/// Walk a report through all clamping steps.
pub fn clamped_state(report: &JobReport) -> Result<ClampedState, NonConvergence> {
    Widening::new(report).converge()?.converge()?.converge()
}

/// Run a clamping model and check that every clamping step converged.
///
/// The report is returned alongside, since an implicit model carries its
/// load step in the same job.
pub fn run_clamping<S: Solver + ?Sized>(
    solver: &mut S,
    doc: &ModelDocument,
    workdir: &Path,
) -> Result<(ClampedState, JobReport), BrickFemError> {
    info!(job = %doc.name, steps = doc.steps.len(), "running clamping job");
    let report = solver.run(doc, workdir)?;
    let state = clamped_state(&report)?;
    info!(job = %state.job, "assembly clamped");
    Ok((state, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::ModelInput;
    use crate::brick::MeshSpec;
    use crate::placement::{build_solids, place};
    use crate::solver::MeshNode;
    use brickfem_ir::{DofValue, ElementFamily, Interaction, PartDef, Region, Vec3};

    fn report(statuses: &[(&str, StepStatus)]) -> JobReport {
        JobReport {
            job: "tower".to_string(),
            archive: PathBuf::from("tower.odb"),
            steps: statuses
                .iter()
                .map(|(name, status)| StepReport {
                    name: name.to_string(),
                    status: status.clone(),
                    last_converged_increment: status.is_completed().then_some(3),
                    time_reached: 1.0,
                })
                .collect(),
        }
    }

    #[test]
    fn all_steps_converged() {
        let r = report(&[
            ("widen", StepStatus::Completed),
            ("contact", StepStatus::Completed),
            ("free", StepStatus::Completed),
        ]);
        let state = clamped_state(&r).unwrap();
        assert_eq!(state.job, "tower");
        assert_eq!(state.step, "free");
        assert_eq!(state.increment, Some(3));
    }

    #[test]
    fn failure_reports_furthest_state() {
        let r = report(&[
            ("widen", StepStatus::Completed),
            ("contact", StepStatus::Aborted("too many attempts".to_string())),
            ("free", StepStatus::NotRun),
        ]);
        let err = clamped_state(&r).unwrap_err();
        assert_eq!(err.failed, ClampingState::Contact);
        assert_eq!(err.furthest, Some(ClampingState::Widen));
        assert_eq!(err.reason, "too many attempts");
        assert_eq!(
            err.to_string(),
            "clamping step 'contact' did not converge in job 'tower' (too many attempts)"
        );

        let err = clamped_state(&report(&[("widen", StepStatus::Aborted("x".into()))])).unwrap_err();
        assert_eq!(err.failed, ClampingState::Widen);
        assert_eq!(err.furthest, None);

        let err = clamped_state(&report(&[
            ("widen", StepStatus::Completed),
            ("contact", StepStatus::Completed),
        ]))
        .unwrap_err();
        assert_eq!(err.failed, ClampingState::Free);
        assert_eq!(err.reason, "step not reported");
    }

    #[test]
    fn transitions_consume_states_in_order() {
        let r = report(&[
            ("widen", StepStatus::Completed),
            ("contact", StepStatus::Completed),
            ("free", StepStatus::Completed),
        ]);
        let contacting = Widening::new(&r).converge().unwrap();
        let freeing = contacting.converge().unwrap();
        assert!(freeing.converge().is_ok());
    }

    struct OneNode;

    impl Solver for OneNode {
        fn mesh_set_nodes(
            &mut self,
            _part: &PartDef,
            _mesh_size: f64,
            _set: &str,
            _workdir: &Path,
        ) -> Result<Vec<MeshNode>, SolverError> {
            Ok(vec![MeshNode {
                label: 11,
                position: Vec3::new(1.0, 0.2, 0.0),
            }])
        }

        fn run(&mut self, _doc: &ModelDocument, _workdir: &Path) -> Result<JobReport, SolverError> {
            unreachable!()
        }
    }

    #[test]
    fn clamping_model_of_case_1() {
        let spec = ModelInput::from_json(
            r#"{"assembly": {"name": "case-1",
                "bricks": {"1": {"type": "base-plate", "nx": 1, "nz": 1},
                           "2": {"type": "regular", "nx": 1, "nz": 1}},
                "parts": {"1": {"brick_id": 1, "loc": [0, 0, 0]},
                          "2": {"brick_id": 2, "loc": [0, 0, 0]}},
                "bc": {"1": {"part_id": 1, "set_name": "BOTTOM"}},
                "mesh_size": 0.5, "mu": 0.2}}"#,
        )
        .unwrap()
        .validate()
        .unwrap();
        let mesh = MeshSpec {
            size: 0.5,
            family: ElementFamily::HexReduced,
        };
        let solids = build_solids(&spec.assembly, &spec.dims, &mesh).unwrap();
        let model = place(&spec.assembly, &spec.dims, &solids).unwrap();
        let plan = contact::plan(&model, spec.dims.params.h_stud);
        let dir = tempfile::tempdir().unwrap();
        let doc = clamping_document(&mut OneNode, &model, &plan, &spec.dims, dir.path(), false).unwrap();

        assert_eq!(doc.step_order(), vec!["Initial", "widen", "contact", "free"]);
        assert!(doc.steps.iter().all(|s| !s.restart));
        assert!(doc.dangling_references().is_empty(), "{:?}", doc.dangling_references());

        let order = doc.step_order();
        let fix = doc.boundary_condition("fix-brick-01").unwrap();
        assert_eq!(fix.region, Region::instance_set("BRICK01-TOP", "BOTTOM"));
        let top = doc.boundary_condition("fix-top-i2").unwrap();
        assert!(top.values_in("contact", &order).is_some());
        assert!(top.values_in("free", &order).is_none());
        assert!(doc.boundary_condition("fix-top-i1").is_some());

        let widen = doc.boundary_condition("u0-inst2n11").unwrap();
        assert_eq!(widen.created_in, "widen");
        assert!(widen.values_in("contact", &order).is_none());
        match widen.values_in("widen", &order).unwrap()[0] {
            DofValue::Value(ux) => assert!((ux - (spec.dims.stud_radius - 1.0)).abs() < 1e-12),
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(doc.interactions.len(), 1);
        match &doc.interactions[0] {
            Interaction::SurfaceToSurface {
                name, created_in, ..
            } => {
                assert_eq!(name, "cont-bt-2-1");
                assert_eq!(created_in, "contact");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(doc.contact_properties.contains_key("cont-prop"));
    }
}
