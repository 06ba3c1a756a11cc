//! End-to-end runs against a scripted solver.

use brickfem::{
    make_model, BrickFemError, CacheError, ClampingState, JobReport, LoadOutcome, MeshNode,
    ModelInput, RunSettings, Solver, SolverError, StepReport, StepStatus,
};
use brickfem_ir::{
    AnalysisKind, ConstraintEnforcement, DofValue, ModelDocument, NormalBehavior, PartDef, Vec3,
};
use std::path::{Path, PathBuf};

/// Answers mesh requests with a fixed node list and completes every step
/// up to an optional failing one.
#[derive(Default)]
struct ScriptedSolver {
    nodes: Vec<MeshNode>,
    fail: Option<(&'static str, &'static str)>,
    meshed: Vec<String>,
    runs: Vec<ModelDocument>,
}

impl ScriptedSolver {
    fn failing_at(step: &'static str, reason: &'static str) -> Self {
        Self {
            fail: Some((step, reason)),
            ..Self::with_cavity_node()
        }
    }

    fn with_cavity_node() -> Self {
        Self {
            nodes: vec![MeshNode {
                label: 42,
                position: Vec3::new(1.0, 0.5, 0.0),
            }],
            ..Self::default()
        }
    }
}

impl Solver for ScriptedSolver {
    fn mesh_set_nodes(
        &mut self,
        part: &PartDef,
        _mesh_size: f64,
        _set: &str,
        _workdir: &Path,
    ) -> Result<Vec<MeshNode>, SolverError> {
        self.meshed.push(part.name.clone());
        Ok(self.nodes.clone())
    }

    fn run(&mut self, doc: &ModelDocument, workdir: &Path) -> Result<JobReport, SolverError> {
        self.runs.push(doc.clone());
        let mut stopped = false;
        let steps = doc
            .steps
            .iter()
            .map(|step| {
                let status = match self.fail {
                    _ if stopped => StepStatus::NotRun,
                    Some((name, reason)) if name == step.name => {
                        stopped = true;
                        StepStatus::Aborted(reason.to_string())
                    }
                    _ => StepStatus::Completed,
                };
                StepReport {
                    name: step.name.clone(),
                    last_converged_increment: Some(if status.is_completed() { 20 } else { 7 }),
                    time_reached: if status.is_completed() { 1.0 } else { 0.35 },
                    status,
                }
            })
            .collect();
        Ok(JobReport {
            job: doc.name.clone(),
            archive: workdir.join(format!("{}.odb", doc.name)),
            steps,
        })
    }
}

const CASE_1: &str = r#"{
    "assembly": {
        "name": "case-1-pull-1x1",
        "bricks": {"1": {"type": "base-plate", "nx": 1, "nz": 1},
                   "2": {"type": "regular", "nx": 1, "nz": 1}},
        "parts": {"1": {"brick_id": 1, "loc": [0, 0, 0], "color": "Yellow"},
                  "2": {"brick_id": 2, "loc": [0, 0, 0], "color": "Red"}},
        "bc": {"1": {"part_id": 1, "set_name": "BOTTOM"}},
        "loads_rp": {"1": {"part_id": 2, "set_name": "STUD-11", "uy": 2.0}},
        "mesh_size": 0.5,
        "mu": 0.2
    }
}"#;

fn tower(is_new: u8, mu: f64) -> String {
    let parts: Vec<String> = (0..6)
        .map(|k| format!(r#""{}": {{"brick_id": 2, "loc": [0, {}, 0]}}"#, k + 2, 9.6 * f64::from(k)))
        .collect();
    format!(
        r#"{{
        "assembly": {{
            "name": "tower",
            "bricks": {{"1": {{"type": "base-plate", "nx": 2, "nz": 2}},
                       "2": {{"type": "regular", "nx": 2, "nz": 2}}}},
            "parts": {{"1": {{"brick_id": 1, "loc": [0, 0, 0]}}, {}}},
            "bc": {{"1": {{"part_id": 1, "set_name": "BOTTOM"}}}},
            "mesh_size": 1.0,
            "mu": {mu}
        }},
        "explicit_par": {{
            "t_step": [0.0005, 0.002], "is_acc": 0, "mass_scale_t": 0, "load_str": "-sphere",
            "loads_rigid": {{"1": {{"shape": "sphere", "loc": [-6, 28.8, 4], "radius": 4, "u": [20, 0, 0]}}}}
        }},
        "is_new": {is_new}
    }}"#,
        parts.join(", ")
    )
}

fn spec(json: &str) -> brickfem::ModelSpec {
    ModelInput::from_json(json).unwrap().validate().unwrap()
}

#[test]
fn case_1_implicit_pull_out() {
    let root = tempfile::tempdir().unwrap();
    let mut solver = ScriptedSolver::failing_at("load", "too many attempts made for this increment");
    let summary = make_model(&spec(CASE_1), &RunSettings::default(), &mut solver, root.path()).unwrap();

    let workdir = root.path().join("case-1-pull-1x1-impl-mesh050mm");
    assert_eq!(summary.workdir, workdir);
    assert!(workdir.join("_dict-assembly.json").exists());
    assert!(workdir.join("case-1-pull-1x1-par.json").exists());
    assert!(!workdir.join("_clamped-state.json").exists());
    assert!(!summary.reused);
    assert_eq!(summary.clamped.step, "free");

    // One job with all four steps.
    assert_eq!(solver.runs.len(), 1);
    let doc = &solver.runs[0];
    assert_eq!(doc.kind, AnalysisKind::Standard);
    assert_eq!(doc.step_order(), vec!["Initial", "widen", "contact", "free", "load"]);
    assert!(doc.dangling_references().is_empty(), "{:?}", doc.dangling_references());
    assert_eq!(solver.meshed, vec!["regular-1x1-BOT".to_string()]);
    assert!(doc.boundary_condition("u0-inst2n42").is_some());

    let order = doc.step_order();
    let rp = doc.boundary_condition("load-RP-1").unwrap();
    assert_eq!(rp.values_in("load", &order).unwrap()[1], DofValue::Value(2.0));
    assert_eq!(rp.values_in("load", &order).unwrap()[0], DofValue::Freed);

    // Disassembly during loading is a result, not an error.
    assert_eq!(summary.load_cases.len(), 1);
    match &summary.load_cases[0].outcome {
        LoadOutcome::Stopped {
            last_increment,
            reason,
            ..
        } => {
            assert_eq!(*last_increment, Some(7));
            assert!(reason.starts_with("too many attempts"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn clamping_failure_stops_the_run() {
    let root = tempfile::tempdir().unwrap();
    let mut solver = ScriptedSolver::failing_at("contact", "excessive penetration");
    let err = make_model(&spec(CASE_1), &RunSettings::default(), &mut solver, root.path()).unwrap_err();
    match err {
        BrickFemError::NonConvergence(nc) => {
            assert_eq!(nc.failed, ClampingState::Contact);
            assert_eq!(nc.furthest, Some(ClampingState::Widen));
            assert_eq!(nc.job, "case-1-pull-1x1");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(solver.runs.len(), 1);
}

#[test]
fn explicit_tower_reuses_the_clamped_state() {
    let root = tempfile::tempdir().unwrap();
    let settings = RunSettings::default();

    let mut fresh = ScriptedSolver::with_cavity_node();
    let first = make_model(&spec(&tower(1, 0.2)), &settings, &mut fresh, root.path()).unwrap();
    let workdir: PathBuf = root.path().join("tower-expl-mesh100mm");
    assert_eq!(first.workdir, workdir);
    assert!(workdir.join("_clamped-state.json").exists());
    assert!(!first.reused);

    // Clamping job, then one explicit job per step time.
    let names: Vec<&str> = fresh.runs.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["tower", "tower-sphere-000_5ms", "tower-sphere-002_0ms"]);
    let clamping = &fresh.runs[0];
    assert!(clamping.step("free").unwrap().restart);
    assert!(clamping.step("load").is_none());
    // Regular bricks are not split for tetrahedra; all six share one part.
    assert_eq!(fresh.meshed, vec!["regular-2x2-TOP".to_string()]);
    for k in 2..=7 {
        assert!(clamping.boundary_condition(&format!("u0-inst{k}n42")).is_some());
    }

    for doc in &fresh.runs[1..] {
        assert_eq!(doc.kind, AnalysisKind::Explicit);
        assert!(doc.dangling_references().is_empty(), "{:?}", doc.dangling_references());
        let state = doc.initial_state.as_ref().unwrap();
        assert_eq!((state.job.as_str(), state.step.as_str()), ("tower", "free"));
        let history: Vec<&str> = doc.history.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(history, vec!["ho-rigid-1", "ho-energy"]);
        assert!(workdir.join(format!("{}-par.json", doc.name)).exists());
    }
    assert!(first
        .load_cases
        .iter()
        .all(|c| c.outcome == LoadOutcome::Completed));

    let mut reuse = ScriptedSolver::with_cavity_node();
    let second = make_model(&spec(&tower(0, 0.2)), &settings, &mut reuse, root.path()).unwrap();
    assert!(second.reused);
    assert_eq!(second.clamped, first.clamped);
    assert!(reuse.meshed.is_empty());
    // Same explicit models as after a fresh clamping run.
    assert_eq!(reuse.runs, fresh.runs[1..].to_vec());
}

#[test]
fn reuse_requires_a_matching_clamped_state() {
    let root = tempfile::tempdir().unwrap();
    let settings = RunSettings::default();

    let mut solver = ScriptedSolver::with_cavity_node();
    let err = make_model(&spec(&tower(0, 0.2)), &settings, &mut solver, root.path()).unwrap_err();
    assert!(matches!(err, BrickFemError::Cache(CacheError::Missing(_))));
    assert!(solver.runs.is_empty());

    make_model(&spec(&tower(1, 0.2)), &settings, &mut solver, root.path()).unwrap();
    let mut again = ScriptedSolver::with_cavity_node();
    let err = make_model(&spec(&tower(0, 0.3)), &settings, &mut again, root.path()).unwrap_err();
    assert!(matches!(err, BrickFemError::Cache(CacheError::Stale(_))));
    assert!(again.runs.is_empty());
}

#[test]
fn implicit_input_ignores_the_reuse_flag() {
    let root = tempfile::tempdir().unwrap();
    let json = CASE_1.trim_end().trim_end_matches('}').to_string() + r#", "is_new": 0}"#;
    let spec = spec(&json);
    assert!(!spec.reuse);
    let mut solver = ScriptedSolver::with_cavity_node();
    let summary = make_model(&spec, &RunSettings::default(), &mut solver, root.path()).unwrap();
    assert_eq!(summary.load_cases[0].outcome, LoadOutcome::Completed);
    assert_eq!(solver.runs.len(), 1);
}

#[test]
fn fresh_runs_start_from_a_clean_working_area() {
    let root = tempfile::tempdir().unwrap();
    let workdir = root.path().join("tower-expl-mesh100mm");
    std::fs::create_dir_all(&workdir).unwrap();
    let leftover = workdir.join("tower-old-010_0ms-par.json");
    std::fs::write(&leftover, "{}").unwrap();
    std::fs::write(workdir.join("notes.txt"), "keep").unwrap();

    let settings = RunSettings::default();
    let mut solver = ScriptedSolver::with_cavity_node();
    make_model(&spec(&tower(1, 0.2)), &settings, &mut solver, root.path()).unwrap();
    assert!(!leftover.exists());
    assert!(workdir.join("notes.txt").exists());
    assert!(workdir.join("tower-sphere-000_5ms-par.json").exists());

    // Reuse keeps what the clamping run left behind.
    std::fs::write(&leftover, "{}").unwrap();
    let mut reuse = ScriptedSolver::with_cavity_node();
    make_model(&spec(&tower(0, 0.2)), &settings, &mut reuse, root.path()).unwrap();
    assert!(leftover.exists());
}

#[test]
fn augmented_lagrange_contact_reaches_every_model() {
    let root = tempfile::tempdir().unwrap();
    let settings = RunSettings {
        contact_enforcement: ConstraintEnforcement::AugmentedLagrange,
        ..RunSettings::default()
    };
    let mut solver = ScriptedSolver::with_cavity_node();
    make_model(&spec(&tower(1, 0.2)), &settings, &mut solver, root.path()).unwrap();
    assert_eq!(solver.runs.len(), 3);
    for doc in &solver.runs {
        let property = &doc.contact_properties["cont-prop"];
        assert_eq!(
            property.normal,
            NormalBehavior::Hard {
                allow_separation: true,
                enforcement: ConstraintEnforcement::AugmentedLagrange,
            }
        );
    }
}
