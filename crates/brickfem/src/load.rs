//! Load steps: a static step appended to the clamping job, or separate
//! explicit models seeded from the clamped state.

use crate::assembly::{ExplicitLoad, Kinematics, RigidLoad, RigidMotion, RpLoad};
use crate::clamping::{ClampedState, ClampingState};
use crate::color::DEFAULT_COLOR;
use crate::contact;
use crate::error::SolverError;
use crate::placement::{reference_point_name, PlacedModel};
use crate::solver::{JobReport, StepStatus};
use brickfem_ir::{
    AnalysisKind, BcChange, BcKind, BoundaryCondition, DofValue, HistoryRequest, InitialState,
    InitialVelocity, MassScaling, ModelDocument, PointMass, Procedure, Region, RigidBody,
    RigidShape, Vec3, INITIAL_STEP, RIGID_RP_SET,
};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Name of the load step.
pub const LOAD_STEP: &str = ClampingState::Load.step_name();

/// Name of the imported clamped configuration.
pub const INITIAL_STATE: &str = "from-impl";

/// History variables of a loaded reference point.
pub const RP_VARIABLES: [&str; 12] = [
    "U1", "U2", "U3", "UR1", "UR2", "UR3", "RF1", "RF2", "RF3", "RM1", "RM2", "RM3",
];

/// History variables of a rigid loading body.
pub const RIGID_VARIABLES: [&str; 9] = ["U1", "U2", "U3", "V1", "V2", "V3", "RF1", "RF2", "RF3"];

/// Whole-model energies.
pub const ENERGY_VARIABLES: [&str; 4] = ["ALLSE", "ALLKE", "ALLWK", "ALLFD"];

/// Default number of field output frames of an explicit step.
pub const DEFAULT_FRAMES: u32 = 80;

const EXPLICIT_HISTORY_INTERVALS: u32 = 500;

/// Procedure of the implicit load step.
pub fn implicit_load_procedure() -> Procedure {
    Procedure::Static {
        initial_increment: 0.05,
        min_increment: 1e-5,
        max_increment: 0.05,
        max_increments: 1000,
        nlgeom: true,
    }
}

/// Boundary condition name of reference-point load `id`.
pub fn rp_load_name(id: u32) -> String {
    format!("load-RP-{id}")
}

/// History request name of reference-point load `id`.
pub fn rp_history_name(id: u32) -> String {
    format!("ho-RP-{id}")
}

/// Part and instance name of rigid body `id`.
pub fn rigid_name(id: u32, shape: &RigidShape) -> String {
    match shape {
        RigidShape::Sphere { .. } => format!("rigid-sphere-{id}"),
        RigidShape::Cylinder { .. } => format!("rigid-cyl-{id}"),
    }
}

fn rp_region(id: u32) -> Region {
    Region::assembly_set(reference_point_name(id))
}

/// Declared components mapped through `f`, the rest set to `absent`.
fn dof_values(load: &RpLoad, absent: DofValue, f: impl Fn(f64) -> f64) -> [DofValue; 6] {
    load.values
        .map(|v| v.map_or(absent, |x| DofValue::Value(f(x))))
}

/// Hold the declared components of every loaded reference point at zero
/// from `free` on.
fn hold_reference_points(doc: &mut ModelDocument, loads: &BTreeMap<u32, RpLoad>) {
    let free = ClampingState::Free.step_name();
    for (&id, load) in loads {
        doc.boundary_conditions.push(BoundaryCondition {
            name: rp_load_name(id),
            kind: BcKind::Displacement,
            region: rp_region(id),
            created_in: free.to_string(),
            values: dof_values(load, DofValue::Unset, |_| 0.0),
            changes: Vec::new(),
            deactivated_in: None,
        });
    }
}

fn rp_history(doc: &mut ModelDocument, loads: &BTreeMap<u32, RpLoad>, step: &str, intervals: Option<u32>) {
    for &id in loads.keys() {
        doc.history.push(HistoryRequest {
            name: rp_history_name(id),
            step: step.to_string(),
            region: Some(rp_region(id)),
            variables: RP_VARIABLES.map(String::from).to_vec(),
            intervals,
        });
    }
}

/// Append the static load step to a clamping model.
///
/// Reference points are held from `free` on; in `load` their declared
/// components ramp to the targets and the others are released.
pub fn add_implicit_load(doc: &mut ModelDocument, loads: &BTreeMap<u32, RpLoad>) {
    doc.push_step(LOAD_STEP, implicit_load_procedure());
    hold_reference_points(doc, loads);
    for (&id, load) in loads {
        let name = rp_load_name(id);
        if let Some(bc) = doc.boundary_conditions.iter_mut().find(|bc| bc.name == name) {
            bc.changes.push(BcChange {
                step: LOAD_STEP.to_string(),
                values: dof_values(load, DofValue::Freed, |x| x),
            });
        }
    }
    rp_history(doc, loads, LOAD_STEP, None);
}

/// Prepare a clamping model for explicit loading: loaded reference points
/// are held during `free` so nothing drifts before the explicit step.
pub fn add_explicit_prestep(doc: &mut ModelDocument, loads: &BTreeMap<u32, RpLoad>) {
    hold_reference_points(doc, loads);
    rp_history(doc, loads, ClampingState::Free.step_name(), None);
}

/// How a load step ended.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Reached the target loads.
    Completed,
    /// Stopped converging, usually because the assembly came apart. The
    /// increments up to the last converged one are the result.
    Stopped {
        /// Solver-reported reason.
        reason: String,
        /// Last converged increment.
        last_increment: Option<u32>,
        /// Load fraction reached.
        time_reached: f64,
    },
}

/// Read the load step outcome of a job. Only a load case of a clamped
/// assembly has one.
pub fn load_outcome(
    clamped: &ClampedState,
    report: &JobReport,
) -> Result<LoadOutcome, SolverError> {
    let step = report.require(LOAD_STEP)?;
    let reason = match &step.status {
        StepStatus::Completed => {
            info!(job = %clamped.job, "load step completed");
            return Ok(LoadOutcome::Completed);
        }
        StepStatus::Aborted(reason) => reason.clone(),
        StepStatus::NotRun => "step did not run".to_string(),
    };
    warn!(
        job = %clamped.job,
        reason = %reason,
        time = step.time_reached,
        "load step stopped converging; keeping results up to the last converged increment"
    );
    Ok(LoadOutcome::Stopped {
        reason,
        last_increment: step.last_converged_increment,
        time_reached: step.time_reached,
    })
}

/// Step time in milliseconds, three decimals, zero-padded to five
/// characters with `_` for the decimal point: `0.0005` gives `000_5`.
pub fn ms_label(t_step: f64) -> String {
    let ms = (t_step * 1e6).round() / 1e3;
    let mut s = ms.to_string();
    if !s.contains('.') {
        s.push_str(".0");
    }
    format!("{s:0>5}").replace('.', "_")
}

/// Job name of an explicit load case.
pub fn explicit_job_name(name: &str, load_str: &str, t_step: f64) -> String {
    format!("{name}{load_str}-{}ms", ms_label(t_step))
}

/// Point mass with principal inertia about the global axes.
///
/// Sphere: `2/5 m r²` about every axis. Cylinder: `1/2 m r²` about its
/// axis and `l m² / 12` about the other two.
pub fn point_mass(shape: &RigidShape, mass: f64) -> PointMass {
    let inertia = match shape {
        RigidShape::Sphere { radius } => [0.4 * mass * radius * radius; 3],
        RigidShape::Cylinder {
            radius,
            length,
            axis,
        } => {
            let mut i = [length * mass * mass / 12.0; 3];
            i[axis.index()] = 0.5 * mass * radius * radius;
            i
        }
    };
    PointMass { mass, inertia }
}

/// Rigid part of a loading body.
pub fn rigid_body(load: &RigidLoad) -> RigidBody {
    RigidBody {
        name: rigid_name(load.id, &load.shape),
        shape: load.shape.clone(),
        reference_point: Vec3::from(load.center),
        color: DEFAULT_COLOR.to_string(),
        point_mass: match load.motion {
            RigidMotion::Free { mass, .. } => Some(point_mass(&load.shape, mass)),
            RigidMotion::Prescribed { .. } => None,
        },
    }
}

fn rate_kind(kinematics: Kinematics) -> BcKind {
    match kinematics {
        Kinematics::ConstantVelocity => BcKind::Velocity,
        Kinematics::ConstantAcceleration => BcKind::Acceleration,
    }
}

/// Fixity name of `bc` entry `id` in an explicit model.
pub fn explicit_fixity_name(id: u32) -> String {
    format!("fix-part-{id:02}")
}

/// Build the explicit model of one load case.
///
/// The brick instances are imported from the clamped state; contact is
/// one general contact. Prescribed loads reach their target at the end of
/// the step with the configured kinematic profile.
pub fn explicit_document(
    model: &PlacedModel,
    loads_rp: &BTreeMap<u32, RpLoad>,
    load: &ExplicitLoad,
    t_step: f64,
    clamped: &ClampedState,
    n_frames: u32,
) -> ModelDocument {
    let job = explicit_job_name(&model.name, &load.load_str, t_step);
    let mut doc = model.document(&job, AnalysisKind::Explicit);
    doc.initial_state = Some(InitialState {
        name: INITIAL_STATE.to_string(),
        job: clamped.job.clone(),
        step: clamped.step.clone(),
        instances: model.instance_names(),
    });

    let property = contact::contact_property(model.mu, model.contact_enforcement);
    doc.contact_properties.insert(property.name.clone(), property);
    doc.interactions.push(contact::general_contact(INITIAL_STEP));

    let step = doc.push_step(
        LOAD_STEP,
        Procedure::ExplicitDynamic {
            time_period: t_step,
            improved_dt_estimate: true,
            mass_scaling: load.mass_scale_t.map(|t| MassScaling {
                target_increment: t,
            }),
        },
    );
    step.field_intervals = Some(n_frames);

    for (&id, region) in &model.fixed {
        doc.boundary_conditions.push(BoundaryCondition::pinned(
            explicit_fixity_name(id),
            region.clone(),
            INITIAL_STEP,
        ));
    }

    let kind = rate_kind(load.kinematics);
    let rate = load.kinematics.rate_factor(t_step);
    for (&id, rp) in loads_rp {
        doc.boundary_conditions.push(BoundaryCondition {
            name: rp_load_name(id),
            kind,
            region: rp_region(id),
            created_in: LOAD_STEP.to_string(),
            values: dof_values(rp, DofValue::Unset, |u| u * rate),
            changes: Vec::new(),
            deactivated_in: None,
        });
    }
    rp_history(&mut doc, loads_rp, LOAD_STEP, Some(EXPLICIT_HISTORY_INTERVALS));

    for rigid in load.rigid.values() {
        let body = rigid_body(rigid);
        let region = Region::instance_set(body.name.clone(), RIGID_RP_SET);
        match rigid.motion {
            RigidMotion::Prescribed { u } => {
                let zero = DofValue::Value(0.0);
                let [ux, uy, uz] = u.map(|c| DofValue::Value(c * rate));
                doc.boundary_conditions.push(BoundaryCondition {
                    name: format!("load-rigid-{}", rigid.id),
                    kind,
                    region: region.clone(),
                    created_in: LOAD_STEP.to_string(),
                    values: [ux, uy, uz, zero, zero, zero],
                    changes: Vec::new(),
                    deactivated_in: None,
                });
            }
            RigidMotion::Free { v0: Some(v), .. } => {
                doc.initial_velocities.push(InitialVelocity {
                    name: format!("v-ini-{}", rigid.id),
                    region: region.clone(),
                    velocity: Vec3::from(v),
                });
            }
            RigidMotion::Free { v0: None, .. } => {}
        }
        doc.history.push(HistoryRequest {
            name: format!("ho-rigid-{}", rigid.id),
            step: LOAD_STEP.to_string(),
            region: Some(region),
            variables: RIGID_VARIABLES.map(String::from).to_vec(),
            intervals: Some(EXPLICIT_HISTORY_INTERVALS),
        });
        doc.rigid_bodies.insert(body.name.clone(), body);
    }

    doc.history.push(HistoryRequest {
        name: "ho-energy".to_string(),
        step: LOAD_STEP.to_string(),
        region: None,
        variables: ENERGY_VARIABLES.map(String::from).to_vec(),
        intervals: Some(EXPLICIT_HISTORY_INTERVALS),
    });

    debug!(
        job = %doc.name,
        t_step,
        rigid = doc.rigid_bodies.len(),
        rp_loads = loads_rp.len(),
        "explicit model"
    );
    doc
}
