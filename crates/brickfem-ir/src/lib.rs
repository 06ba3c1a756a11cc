//! Model description for snap-fit brick assemblies.
//!
//! This crate defines the document handed to the finite-element solver:
//! part solids as a DAG of CSG operations, geometric face selections,
//! instances, analysis steps, boundary conditions, contact definitions and
//! output requests.
//!
//! The description is purely declarative, with no mesh data. Meshing,
//! equilibrium iterations and time integration are handled by the solver.

#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unique identifier for a node in a part's CSG graph.
pub type NodeId = u64;

/// Name of the implicit first step every model starts from.
pub const INITIAL_STEP: &str = "Initial";

/// 3D vector with f64 components (millimeters in the N-mm-s system).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component.
    pub x: f64,
    /// Y component (vertical).
    pub y: f64,
    /// Z component.
    pub z: f64,
}

impl Vec3 {
    /// Create a new Vec3.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Component-wise sum.
    pub fn add(self, other: Vec3) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    /// Components as an array.
    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// CSG operation, the building block of a part solid.
///
/// Each variant is either a leaf primitive or a combining/transform operation
/// that references child nodes by [`NodeId`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CsgOp {
    /// Axis-aligned box with one corner at the origin, extending along +X, +Y, +Z.
    Cube {
        /// Size along each axis.
        size: Vec3,
    },
    /// Circular cylinder along +Y with its base centered at the origin.
    Cylinder {
        /// Radius of the cylinder.
        radius: f64,
        /// Height of the cylinder.
        height: f64,
    },
    /// Empty geometry (identity for union).
    Empty,
    /// Boolean union of two geometries.
    Union {
        /// Left operand.
        left: NodeId,
        /// Right operand.
        right: NodeId,
    },
    /// Boolean difference (left minus right).
    Difference {
        /// Left operand (base).
        left: NodeId,
        /// Right operand (subtracted).
        right: NodeId,
    },
    /// Translation by an offset vector.
    Translate {
        /// Child node to translate.
        child: NodeId,
        /// Translation offset.
        offset: Vec3,
    },
}

/// A node in a part's CSG graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier.
    pub id: NodeId,
    /// Optional human-readable name.
    pub name: Option<String>,
    /// The operation this node represents.
    pub op: CsgOp,
}

/// Open-ended axis-aligned bounds, like a face query by bounding box.
///
/// A missing limit does not constrain that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Lower x limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_min: Option<f64>,
    /// Upper x limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_max: Option<f64>,
    /// Lower y limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_min: Option<f64>,
    /// Upper y limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_max: Option<f64>,
    /// Lower z limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_min: Option<f64>,
    /// Upper z limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_max: Option<f64>,
}

impl Bounds {
    /// Unbounded on all sides.
    pub fn any() -> Self {
        Self::default()
    }

    /// Set the lower x limit.
    pub fn x_min(mut self, v: f64) -> Self {
        self.x_min = Some(v);
        self
    }

    /// Set the upper x limit.
    pub fn x_max(mut self, v: f64) -> Self {
        self.x_max = Some(v);
        self
    }

    /// Set the lower y limit.
    pub fn y_min(mut self, v: f64) -> Self {
        self.y_min = Some(v);
        self
    }

    /// Set the upper y limit.
    pub fn y_max(mut self, v: f64) -> Self {
        self.y_max = Some(v);
        self
    }

    /// Set the lower z limit.
    pub fn z_min(mut self, v: f64) -> Self {
        self.z_min = Some(v);
        self
    }

    /// Set the upper z limit.
    pub fn z_max(mut self, v: f64) -> Self {
        self.z_max = Some(v);
        self
    }

    /// Whether a point lies within the bounds (limits inclusive).
    pub fn contains(&self, p: Vec3) -> bool {
        let within = |v: f64, lo: Option<f64>, hi: Option<f64>| {
            lo.map_or(true, |lo| v >= lo) && hi.map_or(true, |hi| v <= hi)
        };
        within(p.x, self.x_min, self.x_max)
            && within(p.y, self.y_min, self.y_max)
            && within(p.z, self.z_min, self.z_max)
    }
}

/// Geometric selection of faces (or cells, for [`Selection::All`]) of a part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Selection {
    /// Every cell of the part.
    All,
    /// Faces lying entirely within the bounds.
    Within {
        /// Query bounds.
        bounds: Bounds,
    },
    /// Faces selected by any member.
    Union {
        /// Member selections.
        members: Vec<Selection>,
    },
    /// Faces of `base` not selected by `minus`.
    Difference {
        /// Base selection.
        base: Box<Selection>,
        /// Removed selection.
        minus: Box<Selection>,
    },
}

impl Selection {
    /// Faces lying entirely within `bounds`.
    pub fn within(bounds: Bounds) -> Self {
        Selection::Within { bounds }
    }

    /// Faces lying in the horizontal plane `y`, within tolerance `tol`.
    pub fn plane_y(y: f64, tol: f64) -> Self {
        Selection::within(Bounds::any().y_min(y - tol).y_max(y + tol))
    }

    /// Union of several selections.
    pub fn union(members: Vec<Selection>) -> Self {
        Selection::Union { members }
    }

    /// This selection minus another.
    pub fn minus(self, other: Selection) -> Self {
        Selection::Difference {
            base: Box::new(self),
            minus: Box::new(other),
        }
    }
}

/// Element family used to mesh a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementFamily {
    /// Linear hexahedra with reduced integration and enhanced hourglass control.
    HexReduced,
    /// Linear tetrahedra.
    Tetrahedral,
}

/// A deformable part: a CSG solid plus its named selections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartDef {
    /// Part name.
    pub name: String,
    /// Root node of the solid.
    pub root: NodeId,
    /// All nodes of the solid's CSG graph.
    pub nodes: BTreeMap<NodeId, Node>,
    /// Element family for meshing.
    pub element: ElementFamily,
    /// Heights of horizontal cell partition planes.
    pub partitions: Vec<f64>,
    /// Named node/face sets (boundary conditions, couplings, ties).
    pub sets: BTreeMap<String, Selection>,
    /// Named surfaces (contact, ties).
    pub surfaces: BTreeMap<String, Selection>,
    /// Material assigned to the whole part.
    pub material: String,
}

/// Coordinate axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    /// X axis.
    X,
    /// Y axis.
    Y,
    /// Z axis.
    Z,
}

impl Axis {
    /// Index of the axis (0, 1, 2).
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// Shape of a rigid loading body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum RigidShape {
    /// Spherical shell.
    Sphere {
        /// Sphere radius.
        radius: f64,
    },
    /// Open cylindrical shell centered on its reference point.
    Cylinder {
        /// Cylinder radius.
        radius: f64,
        /// Length along the axis.
        length: f64,
        /// Axis direction.
        axis: Axis,
    },
}

/// Point mass and principal rotary inertia attached to a reference point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointMass {
    /// Mass.
    pub mass: f64,
    /// Principal moments of inertia about the global axes.
    pub inertia: [f64; 3],
}

/// A discrete rigid surface part with its reference point set `RP`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidBody {
    /// Part and instance name.
    pub name: String,
    /// Shape of the surface.
    pub shape: RigidShape,
    /// Position of the reference point.
    pub reference_point: Vec3,
    /// Display color as a 6-digit hex string.
    pub color: String,
    /// Optional point mass at the reference point.
    pub point_mass: Option<PointMass>,
}

/// Name of the reference-point set every rigid body carries.
pub const RIGID_RP_SET: &str = "RP";

/// A placed instance of a part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// Instance name.
    pub name: String,
    /// Name of the instantiated part.
    pub part: String,
    /// Translation from part to global coordinates.
    pub offset: Vec3,
    /// Display color as a 6-digit hex string.
    pub color: String,
}

/// Linear elastic material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Material name.
    pub name: String,
    /// Young's modulus.
    pub youngs_modulus: f64,
    /// Poisson ratio.
    pub poisson_ratio: f64,
    /// Mass density.
    pub density: f64,
}

/// Reference to a named surface of an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceRef {
    /// Instance name.
    pub instance: String,
    /// Surface name on the instance's part.
    pub surface: String,
}

impl SurfaceRef {
    /// Create a surface reference.
    pub fn new(instance: impl Into<String>, surface: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            surface: surface.into(),
        }
    }
}

/// Region a boundary condition, coupling or output request acts on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Region {
    /// Named set of an instance.
    InstanceSet {
        /// Instance name.
        instance: String,
        /// Set name on the instance's part.
        set: String,
    },
    /// Assembly-level set, e.g. a reference point set.
    AssemblySet {
        /// Set name.
        name: String,
    },
    /// A single mesh node of an instance.
    Node {
        /// Instance name.
        instance: String,
        /// Node label in the part mesh.
        label: u64,
    },
}

impl Region {
    /// Named set of an instance.
    pub fn instance_set(instance: impl Into<String>, set: impl Into<String>) -> Self {
        Region::InstanceSet {
            instance: instance.into(),
            set: set.into(),
        }
    }

    /// Assembly-level set.
    pub fn assembly_set(name: impl Into<String>) -> Self {
        Region::AssemblySet { name: name.into() }
    }
}

/// Surface-based tie joining two split regions into one continuous body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tie {
    /// Constraint name.
    pub name: String,
    /// Main surface.
    pub main: SurfaceRef,
    /// Secondary surface.
    pub secondary: SurfaceRef,
}

/// Assembly-level reference point, stored in a set of the same name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoint {
    /// Set name of the point.
    pub name: String,
    /// Position.
    pub position: Vec3,
}

/// Rigid-body coupling of every node of a region to a reference point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupling {
    /// Constraint name.
    pub name: String,
    /// Name of the reference point set.
    pub reference_point: String,
    /// Coupled region.
    pub pin: Region,
}

/// Semi-automatic mass scaling of the whole model at the start of a step,
/// applied to elements whose stable increment is below the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MassScaling {
    /// Target stable time increment.
    pub target_increment: f64,
}

/// Solution procedure of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "procedure")]
pub enum Procedure {
    /// Static equilibrium with automatic incrementation.
    Static {
        /// Initial increment size.
        initial_increment: f64,
        /// Minimum increment size.
        min_increment: f64,
        /// Maximum increment size.
        max_increment: f64,
        /// Maximum number of increments.
        max_increments: u32,
        /// Geometric nonlinearity.
        nlgeom: bool,
    },
    /// Explicit dynamics.
    ExplicitDynamic {
        /// Step duration.
        time_period: f64,
        /// Improved stable time increment estimate.
        improved_dt_estimate: bool,
        /// Optional mass scaling.
        mass_scaling: Option<MassScaling>,
    },
}

/// An analysis step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Step name.
    pub name: String,
    /// Name of the preceding step.
    pub previous: String,
    /// Solution procedure.
    pub procedure: Procedure,
    /// Write a restart record at the end of the step.
    pub restart: bool,
    /// Number of field output intervals (solver default if absent).
    pub field_intervals: Option<u32>,
}

/// Prescribed value of one degree of freedom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DofValue {
    /// Not constrained by this condition.
    Unset,
    /// Released in this step.
    Freed,
    /// Prescribed magnitude.
    Value(f64),
}

impl DofValue {
    /// Scale a prescribed value, leaving `Unset`/`Freed` untouched.
    pub fn scaled(self, factor: f64) -> Self {
        match self {
            DofValue::Value(v) => DofValue::Value(v * factor),
            other => other,
        }
    }
}

/// Quantity a boundary condition prescribes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BcKind {
    /// Displacement and rotation.
    Displacement,
    /// Velocity and angular velocity.
    Velocity,
    /// Acceleration and angular acceleration.
    Acceleration,
}

/// Modified values of a boundary condition from a later step on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BcChange {
    /// Step in which the values change.
    pub step: String,
    /// New values (u1, u2, u3, ur1, ur2, ur3).
    pub values: [DofValue; 6],
}

/// A boundary condition over the step sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryCondition {
    /// Condition name.
    pub name: String,
    /// Prescribed quantity.
    pub kind: BcKind,
    /// Region the condition acts on.
    pub region: Region,
    /// Step in which the condition is created.
    pub created_in: String,
    /// Values (u1, u2, u3, ur1, ur2, ur3) from the creating step on.
    pub values: [DofValue; 6],
    /// Value changes in later steps.
    pub changes: Vec<BcChange>,
    /// Step in which the condition is deactivated.
    pub deactivated_in: Option<String>,
}

impl BoundaryCondition {
    /// Zero displacement on the three translational components.
    pub fn pinned(name: impl Into<String>, region: Region, created_in: impl Into<String>) -> Self {
        let zero = DofValue::Value(0.0);
        Self {
            name: name.into(),
            kind: BcKind::Displacement,
            region,
            created_in: created_in.into(),
            values: [zero, zero, zero, DofValue::Unset, DofValue::Unset, DofValue::Unset],
            changes: Vec::new(),
            deactivated_in: None,
        }
    }

    /// Values in effect during `step`, given the model's step order.
    ///
    /// Returns `None` if the condition is not active in that step.
    pub fn values_in(&self, step: &str, order: &[&str]) -> Option<[DofValue; 6]> {
        let pos = |name: &str| order.iter().position(|s| *s == name);
        let at = pos(step)?;
        if pos(&self.created_in)? > at {
            return None;
        }
        if let Some(off) = &self.deactivated_in {
            if pos(off).map_or(false, |p| p <= at) {
                return None;
            }
        }
        let mut values = self.values;
        for change in &self.changes {
            if pos(&change.step).map_or(false, |p| p <= at) {
                values = change.values;
            }
        }
        Some(values)
    }
}

/// How a hard contact constraint is enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintEnforcement {
    /// The solver's choice for the contact formulation.
    #[default]
    Default,
    /// Augmented Lagrange with default stiffness, unit stiffness scale
    /// factor and zero clearance at zero pressure.
    AugmentedLagrange,
}

/// Normal contact behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NormalBehavior {
    /// Hard pressure-overclosure relation.
    Hard {
        /// Allow separation after contact.
        allow_separation: bool,
        /// Constraint enforcement method.
        #[serde(default)]
        enforcement: ConstraintEnforcement,
    },
}

/// Tangential contact behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Tangential {
    /// No friction.
    Frictionless,
    /// Penalty friction.
    Penalty {
        /// Friction coefficient (static and kinetic).
        mu: f64,
        /// Maximum elastic slip as a fraction of the characteristic element length.
        elastic_slip_fraction: f64,
    },
}

/// Contact interaction property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactProperty {
    /// Property name.
    pub name: String,
    /// Normal behavior.
    pub normal: NormalBehavior,
    /// Tangential behavior.
    pub tangential: Tangential,
}

/// Contact interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Interaction {
    /// Penalty contact between two surfaces.
    SurfaceToSurface {
        /// Interaction name.
        name: String,
        /// Step in which the interaction becomes active.
        created_in: String,
        /// Main surface.
        main: SurfaceRef,
        /// Secondary surface.
        secondary: SurfaceRef,
        /// Contact property name.
        property: String,
        /// Finite sliding formulation.
        finite_sliding: bool,
    },
    /// General contact over all exterior surfaces, including self contact.
    General {
        /// Interaction name.
        name: String,
        /// Step in which the interaction becomes active.
        created_in: String,
        /// Contact property name.
        property: String,
    },
}

impl Interaction {
    /// Interaction name.
    pub fn name(&self) -> &str {
        match self {
            Interaction::SurfaceToSurface { name, .. } | Interaction::General { name, .. } => name,
        }
    }
}

/// History output request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRequest {
    /// Request name.
    pub name: String,
    /// Step in which the request is created.
    pub step: String,
    /// Output region, whole model if absent.
    pub region: Option<Region>,
    /// Output variable identifiers.
    pub variables: Vec<String>,
    /// Number of output intervals (every increment if absent).
    pub intervals: Option<u32>,
}

/// Initial velocity of a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialVelocity {
    /// Field name.
    pub name: String,
    /// Region.
    pub region: Region,
    /// Translational velocity.
    pub velocity: Vec3,
}

/// Deformed configuration and stress state imported from an earlier job.
///
/// Every listed instance is rebuilt from the deformed mesh at the end of
/// `step`, keeping the part's named sets; the reference configuration is
/// not updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialState {
    /// Field name.
    pub name: String,
    /// Source job name.
    pub job: String,
    /// Source step, last increment.
    pub step: String,
    /// Imported instances.
    pub instances: Vec<String>,
}

/// Kind of analysis a model runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    /// Implicit static analysis.
    Standard,
    /// Explicit dynamic analysis.
    Explicit,
}

/// A complete model, the unit of work submitted to the solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDocument {
    /// Format version string.
    pub version: String,
    /// Model name.
    pub name: String,
    /// Analysis kind.
    pub kind: AnalysisKind,
    /// Global target element size.
    pub mesh_size: f64,
    /// Materials, keyed by name.
    pub materials: BTreeMap<String, Material>,
    /// Deformable parts, keyed by name.
    pub parts: BTreeMap<String, PartDef>,
    /// Rigid loading bodies, keyed by name.
    pub rigid_bodies: BTreeMap<String, RigidBody>,
    /// Instances of deformable parts.
    pub instances: Vec<Instance>,
    /// Imported initial configuration, if seeded from an earlier job.
    pub initial_state: Option<InitialState>,
    /// Assembly reference points.
    pub reference_points: Vec<ReferencePoint>,
    /// Rigid-body couplings.
    pub couplings: Vec<Coupling>,
    /// Tie constraints.
    pub ties: Vec<Tie>,
    /// Analysis steps after [`INITIAL_STEP`], in order.
    pub steps: Vec<Step>,
    /// Boundary conditions.
    pub boundary_conditions: Vec<BoundaryCondition>,
    /// Contact properties, keyed by name.
    pub contact_properties: BTreeMap<String, ContactProperty>,
    /// Contact interactions.
    pub interactions: Vec<Interaction>,
    /// Initial velocities.
    pub initial_velocities: Vec<InitialVelocity>,
    /// History output requests.
    pub history: Vec<HistoryRequest>,
}

impl ModelDocument {
    /// Create an empty model.
    pub fn new(name: impl Into<String>, kind: AnalysisKind, mesh_size: f64) -> Self {
        Self {
            version: "0.1".to_string(),
            name: name.into(),
            kind,
            mesh_size,
            materials: BTreeMap::new(),
            parts: BTreeMap::new(),
            rigid_bodies: BTreeMap::new(),
            instances: Vec::new(),
            initial_state: None,
            reference_points: Vec::new(),
            couplings: Vec::new(),
            ties: Vec::new(),
            steps: Vec::new(),
            boundary_conditions: Vec::new(),
            contact_properties: BTreeMap::new(),
            interactions: Vec::new(),
            initial_velocities: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Step names in order, starting with [`INITIAL_STEP`].
    pub fn step_order(&self) -> Vec<&str> {
        std::iter::once(INITIAL_STEP)
            .chain(self.steps.iter().map(|s| s.name.as_str()))
            .collect()
    }

    /// Look up a step by name.
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Look up an instance by name.
    pub fn instance(&self, name: &str) -> Option<&Instance> {
        self.instances.iter().find(|i| i.name == name)
    }

    /// Look up a boundary condition by name.
    pub fn boundary_condition(&self, name: &str) -> Option<&BoundaryCondition> {
        self.boundary_conditions.iter().find(|b| b.name == name)
    }

    /// Append a step after the current last one.
    pub fn push_step(&mut self, name: impl Into<String>, procedure: Procedure) -> &mut Step {
        let previous = self
            .steps
            .last()
            .map_or_else(|| INITIAL_STEP.to_string(), |s| s.name.clone());
        self.steps.push(Step {
            name: name.into(),
            previous,
            procedure,
            restart: false,
            field_intervals: None,
        });
        let last = self.steps.len() - 1;
        &mut self.steps[last]
    }

    /// Describe every reference to a missing step, instance, set, surface,
    /// part or property. An empty list means the document is self-consistent.
    ///
    /// Sets of imported instances cannot be checked and are accepted.
    pub fn dangling_references(&self) -> Vec<String> {
        let mut out = Vec::new();
        let steps = self.step_order();
        let imported: Vec<&str> = self
            .initial_state
            .iter()
            .flat_map(|s| s.instances.iter().map(String::as_str))
            .collect();

        let check_step = |out: &mut Vec<String>, what: &str, step: &str| {
            if !steps.contains(&step) {
                out.push(format!("{what}: unknown step '{step}'"));
            }
        };

        enum Owner<'a> {
            Part(&'a PartDef),
            Rigid,
            Imported,
        }
        fn owner<'a>(doc: &'a ModelDocument, imported: &[&str], instance: &str) -> Option<Owner<'a>> {
            if let Some(inst) = doc.instance(instance) {
                if imported.contains(&instance) {
                    return Some(Owner::Imported);
                }
                return doc.parts.get(&inst.part).map(Owner::Part);
            }
            if doc.rigid_bodies.contains_key(instance) {
                return Some(Owner::Rigid);
            }
            None
        }

        let check_region = |out: &mut Vec<String>, what: &str, region: &Region| match region {
            Region::InstanceSet { instance, set } => match owner(self, &imported, instance) {
                None => out.push(format!("{what}: unknown instance '{instance}'")),
                Some(Owner::Part(part)) if !part.sets.contains_key(set) => {
                    out.push(format!("{what}: no set '{set}' on '{instance}'"))
                }
                Some(Owner::Rigid) if set != RIGID_RP_SET => {
                    out.push(format!("{what}: no set '{set}' on rigid '{instance}'"))
                }
                _ => {}
            },
            Region::AssemblySet { name } => {
                if !self.reference_points.iter().any(|rp| &rp.name == name) {
                    out.push(format!("{what}: unknown assembly set '{name}'"));
                }
            }
            Region::Node { instance, .. } => {
                if owner(self, &imported, instance).is_none() {
                    out.push(format!("{what}: unknown instance '{instance}'"));
                }
            }
        };

        let check_surface = |out: &mut Vec<String>, what: &str, s: &SurfaceRef| match owner(self, &imported, &s.instance) {
            None => out.push(format!("{what}: unknown instance '{}'", s.instance)),
            Some(Owner::Part(part)) if !part.surfaces.contains_key(&s.surface) => out.push(format!(
                "{what}: no surface '{}' on '{}'",
                s.surface, s.instance
            )),
            _ => {}
        };

        for inst in &self.instances {
            if !imported.contains(&inst.name.as_str()) && !self.parts.contains_key(&inst.part) {
                out.push(format!("instance {}: unknown part '{}'", inst.name, inst.part));
            }
        }
        for part in self.parts.values() {
            if !self.materials.contains_key(&part.material) {
                out.push(format!("part {}: unknown material '{}'", part.name, part.material));
            }
            if !part.nodes.contains_key(&part.root) {
                out.push(format!("part {}: missing root node {}", part.name, part.root));
            }
        }
        for step in &self.steps {
            check_step(&mut out, &format!("step {}", step.name), &step.previous);
        }
        if let Some(state) = &self.initial_state {
            for inst in &state.instances {
                if self.instance(inst).is_none() {
                    out.push(format!("initial state: unknown instance '{inst}'"));
                }
            }
        }
        for tie in &self.ties {
            let what = format!("tie {}", tie.name);
            check_surface(&mut out, &what, &tie.main);
            check_surface(&mut out, &what, &tie.secondary);
        }
        for c in &self.couplings {
            let what = format!("coupling {}", c.name);
            check_region(&mut out, &what, &c.pin);
            check_region(&mut out, &what, &Region::assembly_set(c.reference_point.clone()));
        }
        for bc in &self.boundary_conditions {
            let what = format!("boundary condition {}", bc.name);
            check_step(&mut out, &what, &bc.created_in);
            for change in &bc.changes {
                check_step(&mut out, &what, &change.step);
            }
            if let Some(off) = &bc.deactivated_in {
                check_step(&mut out, &what, off);
            }
            check_region(&mut out, &what, &bc.region);
        }
        for interaction in &self.interactions {
            let what = format!("interaction {}", interaction.name());
            match interaction {
                Interaction::SurfaceToSurface {
                    created_in,
                    main,
                    secondary,
                    property,
                    ..
                } => {
                    check_step(&mut out, &what, created_in);
                    check_surface(&mut out, &what, main);
                    check_surface(&mut out, &what, secondary);
                    if !self.contact_properties.contains_key(property) {
                        out.push(format!("{what}: unknown property '{property}'"));
                    }
                }
                Interaction::General {
                    created_in,
                    property,
                    ..
                } => {
                    check_step(&mut out, &what, created_in);
                    if !self.contact_properties.contains_key(property) {
                        out.push(format!("{what}: unknown property '{property}'"));
                    }
                }
            }
        }
        for v in &self.initial_velocities {
            check_region(&mut out, &format!("initial velocity {}", v.name), &v.region);
        }
        for h in &self.history {
            let what = format!("history request {}", h.name);
            check_step(&mut out, &what, &h.step);
            if let Some(region) = &h.region {
                check_region(&mut out, &what, region);
            }
        }
        out
    }
}
