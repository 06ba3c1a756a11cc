//! Assembly and load input, and its one-time validation into typed values.
//!
//! The raw `*Input` structures mirror the JSON input one to one. Everything
//! downstream consumes only the validated [`Assembly`] and [`LoadSpec`].

use crate::brick::{BrickDefinition, BrickId, BrickType, NamedSet};
use crate::color;
use crate::error::ConfigError;
use crate::geometry::{Dimensions, GeometryParams};
use brickfem_ir::{Axis, RigidShape};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of a placed part.
pub type PartId = u32;

/// Brick definition as written in the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrickInput {
    /// Brick type.
    #[serde(rename = "type")]
    pub kind: BrickType,
    /// Studs along x.
    pub nx: u32,
    /// Studs along z.
    pub nz: u32,
}

/// Part placement as written in the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartInput {
    /// Referenced brick definition.
    pub brick_id: BrickId,
    /// Origin: axis of stud `(1, 1)`, vertically per the brick type's convention.
    pub loc: [f64; 3],
    /// Palette name or hex color.
    #[serde(default, alias = "c", skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Fixed set as written in the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BcInput {
    /// Part carrying the set.
    pub part_id: PartId,
    /// Set name.
    pub set_name: String,
}

/// Reference-point load as written in the input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RpLoadInput {
    /// Part carrying the set.
    pub part_id: PartId,
    /// Set name.
    pub set_name: String,
    /// Displacement along x.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ux: Option<f64>,
    /// Displacement along y.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uy: Option<f64>,
    /// Displacement along z.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uz: Option<f64>,
    /// Rotation about x.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotx: Option<f64>,
    /// Rotation about y.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roty: Option<f64>,
    /// Rotation about z.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotz: Option<f64>,
}

/// The `assembly` input block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyInput {
    /// Assembly name, used for the working area and job names.
    pub name: String,
    /// Brick definitions by id.
    pub bricks: BTreeMap<BrickId, BrickInput>,
    /// Placed parts by id.
    pub parts: BTreeMap<PartId, PartInput>,
    /// Fixed sets by id.
    #[serde(default)]
    pub bc: BTreeMap<u32, BcInput>,
    /// Reference-point loads by id.
    #[serde(default)]
    pub loads_rp: BTreeMap<u32, RpLoadInput>,
    /// Global target element size.
    pub mesh_size: f64,
    /// Friction coefficient.
    pub mu: f64,
}

/// A single step time or a list of independently timed load cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepTimes {
    /// One load case.
    One(f64),
    /// Several load cases.
    Many(Vec<f64>),
}

/// Boolean written either as `true`/`false` or as `1`/`0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    /// JSON boolean.
    Bool(bool),
    /// Integer flag.
    Int(i64),
}

impl Flag {
    fn as_bool(self) -> Option<bool> {
        match self {
            Flag::Bool(b) => Some(b),
            Flag::Int(0) => Some(false),
            Flag::Int(1) => Some(true),
            Flag::Int(_) => None,
        }
    }
}

/// Cylinder axis: a unit axis vector or an axis letter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DirectionInput {
    /// Axis vector such as `[0, 0, 1]`.
    Vector([f64; 3]),
    /// `"x"`, `"y"` or `"z"`.
    Name(String),
}

impl DirectionInput {
    fn axis(&self) -> Option<Axis> {
        match self {
            DirectionInput::Vector(v) => {
                let ones: Vec<usize> = (0..3).filter(|&i| v[i].abs() == 1.0).collect();
                let zeros = v.iter().filter(|c| **c == 0.0).count();
                match (ones.as_slice(), zeros) {
                    ([0], 2) => Some(Axis::X),
                    ([1], 2) => Some(Axis::Y),
                    ([2], 2) => Some(Axis::Z),
                    _ => None,
                }
            }
            DirectionInput::Name(n) => match n.trim().to_ascii_lowercase().as_str() {
                "x" => Some(Axis::X),
                "y" => Some(Axis::Y),
                "z" => Some(Axis::Z),
                _ => None,
            },
        }
    }
}

/// Rigid loading body as written in the input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RigidLoadInput {
    /// `sphere`, `cylinder` or `cyl`.
    pub shape: String,
    /// Sphere center, or cylinder mid-length point.
    pub loc: [f64; 3],
    /// Radius.
    pub radius: f64,
    /// Cylinder axis.
    #[serde(default, alias = "dir", skip_serializing_if = "Option::is_none")]
    pub direction: Option<DirectionInput>,
    /// Cylinder length.
    #[serde(default, alias = "length", skip_serializing_if = "Option::is_none")]
    pub len: Option<f64>,
    /// Prescribed displacement reached at the end of the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub u: Option<[f64; 3]>,
    /// Mass of a free body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m: Option<f64>,
    /// Initial velocity of a free body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v0: Option<[f64; 3]>,
}

/// The `explicit_par` input block; empty means implicit loading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExplicitInput {
    /// Step time(s).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t_step: Option<StepTimes>,
    /// Constant acceleration (1) instead of constant velocity (0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_acc: Option<Flag>,
    /// Mass scaling target increment, 0 disables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mass_scale_t: Option<f64>,
    /// Suffix of the explicit job names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_str: Option<String>,
    /// Rigid loading bodies by id.
    #[serde(default)]
    pub loads_rigid: BTreeMap<u32, RigidLoadInput>,
}

impl ExplicitInput {
    /// Whether the block selects implicit loading.
    pub fn is_empty(&self) -> bool {
        self.t_step.is_none()
            && self.is_acc.is_none()
            && self.mass_scale_t.is_none()
            && self.load_str.is_none()
            && self.loads_rigid.is_empty()
    }
}

/// Complete model input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInput {
    /// Assembly block.
    pub assembly: AssemblyInput,
    /// Explicit load parameters; absent or empty for implicit loading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit_par: Option<ExplicitInput>,
    /// Dimension table; defaults apply to missing keys.
    #[serde(default)]
    pub lego_geom: GeometryParams,
    /// 1 runs clamping anew, 0 reuses the stored clamped state (explicit only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_new: Option<Flag>,
}

/// A part placement after validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartInstance {
    /// Part id.
    pub id: PartId,
    /// Referenced brick definition.
    pub brick_id: BrickId,
    /// Origin (axis of stud `(1, 1)`).
    pub loc: [f64; 3],
    /// Resolved 6-digit hex color.
    pub color: String,
}

/// A named set on a placed part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetRef {
    /// Part id.
    pub part_id: PartId,
    /// Set on the part's brick.
    pub set: NamedSet,
}

/// Reference-point load after validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpLoad {
    /// Coupled set.
    pub target: SetRef,
    /// Targets `(ux, uy, uz, rotx, roty, rotz)`; `None` leaves the component undeclared.
    pub values: [Option<f64>; 6],
}

impl RpLoad {
    /// Whether any component is declared.
    pub fn is_declared(&self, dof: usize) -> bool {
        self.values.get(dof).is_some_and(Option::is_some)
    }
}

/// Validated, immutable assembly description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assembly {
    /// Assembly name.
    pub name: String,
    /// Brick definitions by id.
    pub bricks: BTreeMap<BrickId, BrickDefinition>,
    /// Placed parts by id.
    pub parts: BTreeMap<PartId, PartInstance>,
    /// Fixed sets by id.
    pub bc: BTreeMap<u32, SetRef>,
    /// Reference-point loads by id.
    pub loads_rp: BTreeMap<u32, RpLoad>,
    /// Global target element size.
    pub mesh_size: f64,
    /// Friction coefficient.
    pub mu: f64,
}

impl Assembly {
    /// Validate the raw assembly block.
    pub fn from_input(input: &AssemblyInput) -> Result<Self, ConfigError> {
        let name = input.name.trim();
        if name.is_empty()
            || name.starts_with('.')
            || name.chars().any(|c| c == '/' || c == '\\' || c.is_control())
        {
            return Err(ConfigError::InvalidName(input.name.clone()));
        }
        if !(input.mesh_size.is_finite() && input.mesh_size > 0.0) {
            return Err(ConfigError::MeshSize(input.mesh_size));
        }
        if !(input.mu.is_finite() && input.mu >= 0.0) {
            return Err(ConfigError::Friction(input.mu));
        }
        if input.parts.is_empty() {
            return Err(ConfigError::EmptyAssembly);
        }

        let mut bricks = BTreeMap::new();
        for (&id, b) in &input.bricks {
            if b.nx == 0 || b.nz == 0 {
                return Err(ConfigError::InvalidGrid {
                    brick_id: id,
                    nx: b.nx,
                    nz: b.nz,
                });
            }
            bricks.insert(
                id,
                BrickDefinition {
                    id,
                    kind: b.kind,
                    nx: b.nx,
                    nz: b.nz,
                },
            );
        }

        let mut parts = BTreeMap::new();
        for (&id, p) in &input.parts {
            if !bricks.contains_key(&p.brick_id) {
                return Err(ConfigError::UnknownBrick {
                    part_id: id,
                    brick_id: p.brick_id,
                });
            }
            if p.loc.iter().any(|v| !v.is_finite()) {
                return Err(ConfigError::NonFinite {
                    entry: format!("part {id}"),
                });
            }
            parts.insert(
                id,
                PartInstance {
                    id,
                    brick_id: p.brick_id,
                    loc: p.loc,
                    color: color::resolve(p.color.as_deref()),
                },
            );
        }

        let resolve = |entry: String, part_id: PartId, set_name: &str| -> Result<SetRef, ConfigError> {
            let brick = parts
                .get(&part_id)
                .and_then(|p: &PartInstance| bricks.get(&p.brick_id))
                .ok_or_else(|| ConfigError::UnknownPart {
                    entry: entry.clone(),
                    part_id,
                })?;
            let set = NamedSet::parse(set_name).ok_or_else(|| ConfigError::UnknownSet {
                entry: entry.clone(),
                set_name: set_name.to_string(),
            })?;
            if !brick.provides(&set) {
                return Err(ConfigError::DanglingSet {
                    entry,
                    part_id,
                    set_name: set_name.to_string(),
                });
            }
            Ok(SetRef { part_id, set })
        };

        let mut bc = BTreeMap::new();
        for (&id, b) in &input.bc {
            bc.insert(id, resolve(format!("bc {id}"), b.part_id, &b.set_name)?);
        }

        let mut loads_rp = BTreeMap::new();
        for (&id, l) in &input.loads_rp {
            let entry = format!("loads_rp {id}");
            let target = resolve(entry.clone(), l.part_id, &l.set_name)?;
            let values = [l.ux, l.uy, l.uz, l.rotx, l.roty, l.rotz];
            if values.iter().flatten().any(|v| !v.is_finite()) {
                return Err(ConfigError::NonFinite { entry });
            }
            loads_rp.insert(id, RpLoad { target, values });
        }

        Ok(Self {
            name: name.to_string(),
            bricks,
            parts,
            bc,
            loads_rp,
            mesh_size: input.mesh_size,
            mu: input.mu,
        })
    }

    /// Brick definition of a part.
    pub fn brick_of(&self, part: &PartInstance) -> Option<&BrickDefinition> {
        self.bricks.get(&part.brick_id)
    }

    /// Parts with their brick definitions, in part id order.
    pub fn placed(&self) -> impl Iterator<Item = (&PartInstance, &BrickDefinition)> {
        self.parts
            .values()
            .filter_map(|p| self.brick_of(p).map(|b| (p, b)))
    }

    /// Brick definitions actually used by a part, in id order.
    pub fn used_bricks(&self) -> Vec<&BrickDefinition> {
        self.bricks
            .values()
            .filter(|b| self.parts.values().any(|p| p.brick_id == b.id))
            .collect()
    }
}

/// Kinematic profile of prescribed explicit loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Kinematics {
    /// Constant velocity `u / t`.
    ConstantVelocity,
    /// Constant acceleration `2 u / t²` from rest.
    ConstantAcceleration,
}

impl Kinematics {
    /// Factor turning a target displacement into the prescribed rate.
    pub fn rate_factor(self, t_step: f64) -> f64 {
        match self {
            Kinematics::ConstantVelocity => 1.0 / t_step,
            Kinematics::ConstantAcceleration => 2.0 / (t_step * t_step),
        }
    }
}

/// How a rigid loading body moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RigidMotion {
    /// Reference point driven to `u` by the end of the step, rotations held.
    Prescribed {
        /// Target displacement.
        u: [f64; 3],
    },
    /// Free body with a point mass, optionally launched with `v0`.
    Free {
        /// Mass.
        mass: f64,
        /// Initial velocity.
        v0: Option<[f64; 3]>,
    },
}

/// Validated rigid loading body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidLoad {
    /// Load id.
    pub id: u32,
    /// Surface shape.
    pub shape: RigidShape,
    /// Reference point: sphere center or cylinder mid-length point.
    pub center: [f64; 3],
    /// Motion.
    pub motion: RigidMotion,
}

impl RigidLoad {
    fn from_input(id: u32, r: &RigidLoadInput) -> Result<Self, ConfigError> {
        let bad = |reason: &str| ConfigError::MalformedRigidBody {
            id,
            reason: reason.to_string(),
        };
        let finite = |v: &[f64]| v.iter().all(|x| x.is_finite());
        if !finite(&r.loc) {
            return Err(bad("loc must be finite"));
        }
        if !(r.radius.is_finite() && r.radius > 0.0) {
            return Err(bad("radius must be positive"));
        }
        let shape = match r.shape.trim().to_ascii_lowercase().as_str() {
            "sphere" => RigidShape::Sphere { radius: r.radius },
            "cylinder" | "cyl" => {
                let axis = r
                    .direction
                    .as_ref()
                    .ok_or_else(|| bad("cylinder needs a direction"))?
                    .axis()
                    .ok_or_else(|| bad("direction must be a coordinate axis"))?;
                let length = r.len.ok_or_else(|| bad("cylinder needs len"))?;
                if !(length.is_finite() && length > 0.0) {
                    return Err(bad("len must be positive"));
                }
                RigidShape::Cylinder {
                    radius: r.radius,
                    length,
                    axis,
                }
            }
            other => return Err(bad(&format!("unknown shape '{other}'"))),
        };
        let motion = match (r.u, r.m) {
            (Some(_), Some(_)) => return Err(bad("give either u or m, not both")),
            (None, None) => return Err(bad("needs a displacement u or a mass m")),
            (Some(u), None) => {
                if r.v0.is_some() {
                    return Err(bad("v0 applies only to a free body with mass m"));
                }
                if !finite(&u) {
                    return Err(bad("u must be finite"));
                }
                RigidMotion::Prescribed { u }
            }
            (None, Some(mass)) => {
                if !(mass.is_finite() && mass > 0.0) {
                    return Err(bad("m must be positive"));
                }
                if r.v0.is_some_and(|v| !finite(&v)) {
                    return Err(bad("v0 must be finite"));
                }
                RigidMotion::Free { mass, v0: r.v0 }
            }
        };
        Ok(Self {
            id,
            shape,
            center: r.loc,
            motion,
        })
    }
}

/// Explicit loading after validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplicitLoad {
    /// Step times, one load case each.
    pub t_steps: Vec<f64>,
    /// Profile of prescribed loads.
    pub kinematics: Kinematics,
    /// Mass scaling target increment.
    pub mass_scale_t: Option<f64>,
    /// Job name suffix.
    pub load_str: String,
    /// Rigid loading bodies by id.
    pub rigid: BTreeMap<u32, RigidLoad>,
}

/// Load mode of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LoadSpec {
    /// Static load step appended to the clamping steps.
    Implicit,
    /// Separate explicit model(s) seeded from the clamped state.
    Explicit(ExplicitLoad),
}

impl LoadSpec {
    /// Validate the `explicit_par` block.
    pub fn from_input(input: Option<&ExplicitInput>) -> Result<Self, ConfigError> {
        let Some(e) = input.filter(|e| !e.is_empty()) else {
            return Ok(LoadSpec::Implicit);
        };
        let bad = |reason: &str| ConfigError::MalformedExplicit(reason.to_string());

        let t_steps = match &e.t_step {
            None => return Err(bad("t_step is required")),
            Some(StepTimes::One(t)) => vec![*t],
            Some(StepTimes::Many(ts)) => ts.clone(),
        };
        if t_steps.is_empty() {
            return Err(bad("t_step list is empty"));
        }
        if t_steps.iter().any(|t| !(t.is_finite() && *t > 0.0)) {
            return Err(bad("t_step must be positive"));
        }
        let kinematics = match e.is_acc.map(Flag::as_bool) {
            None | Some(Some(false)) => Kinematics::ConstantVelocity,
            Some(Some(true)) => Kinematics::ConstantAcceleration,
            Some(None) => return Err(bad("is_acc must be 0 or 1")),
        };
        let mass_scale_t = match e.mass_scale_t {
            None => None,
            Some(t) if t == 0.0 => None,
            Some(t) if t.is_finite() && t > 0.0 => Some(t),
            Some(_) => return Err(bad("mass_scale_t must be non-negative")),
        };
        let load_str = e.load_str.clone().unwrap_or_default();
        if load_str
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control())
        {
            return Err(bad("load_str must be usable in a file name"));
        }
        let rigid = e
            .loads_rigid
            .iter()
            .map(|(&id, r)| RigidLoad::from_input(id, r).map(|l| (id, l)))
            .collect::<Result<_, _>>()?;

        Ok(LoadSpec::Explicit(ExplicitLoad {
            t_steps,
            kinematics,
            mass_scale_t,
            load_str,
            rigid,
        }))
    }

    /// Whether loads run in separate explicit models.
    pub fn is_explicit(&self) -> bool {
        matches!(self, LoadSpec::Explicit(_))
    }
}

/// Everything a run needs, validated.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    /// Assembly.
    pub assembly: Assembly,
    /// Load mode.
    pub load: LoadSpec,
    /// Resolved dimensions.
    pub dims: Dimensions,
    /// Reuse the stored clamped state instead of clamping again.
    pub reuse: bool,
}

impl ModelInput {
    /// Parse a JSON input document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Validate the whole input once.
    ///
    /// Reuse is requested with `is_new = 0` and only honored in explicit
    /// mode; implicit runs always clamp.
    pub fn validate(&self) -> Result<ModelSpec, ConfigError> {
        let dims = self.lego_geom.derive()?;
        let assembly = Assembly::from_input(&self.assembly)?;
        let load = LoadSpec::from_input(self.explicit_par.as_ref())?;
        let is_new = match self.is_new.map(Flag::as_bool) {
            None => true,
            Some(Some(b)) => b,
            Some(None) => {
                return Err(ConfigError::MalformedExplicit(
                    "is_new must be 0 or 1".to_string(),
                ))
            }
        };
        Ok(ModelSpec {
            reuse: !is_new && load.is_explicit(),
            assembly,
            load,
            dims,
        })
    }
}
