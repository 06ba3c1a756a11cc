//! Assembly placer: brick solids instanced at the part origins.

use crate::assembly::{Assembly, PartId, SetRef};
use crate::brick::{self, BrickDefinition, BrickId, BrickSolid, MeshSpec, NamedSet, PieceRole, TIE};
use crate::error::{BuildError, ConfigError};
use crate::geometry::{Dimensions, GeometryParams};
use brickfem_ir::{
    AnalysisKind, ConstraintEnforcement, Coupling, ElementFamily, Instance, Material, ModelDocument, PartDef,
    ReferencePoint, Region, SurfaceRef, Tie, Vec3,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Name of the brick material.
pub const MATERIAL: &str = "ABS";

/// Instance name of a brick piece, `BRICK07-TOP` or `BRICK07-BOT`.
pub fn instance_name(part_id: PartId, role: PieceRole) -> String {
    format!("BRICK{part_id:02}-{}", role.suffix())
}

/// Assembly set holding the reference point of `loads_rp` entry `id`.
pub fn reference_point_name(id: u32) -> String {
    format!("RP-{id}")
}

/// One placed piece of a brick.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedPiece {
    /// Instance name.
    pub instance: String,
    /// Part name.
    pub part: String,
    /// Role within the brick.
    pub role: PieceRole,
    /// Translation from part to global coordinates.
    pub offset: Vec3,
}

/// A part instance with its brick and global layout.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedPart {
    /// Part id.
    pub id: PartId,
    /// Brick definition.
    pub brick: BrickDefinition,
    /// Origin.
    pub loc: [f64; 3],
    /// Display color.
    pub color: String,
    /// Pieces, top piece first.
    pub pieces: Vec<PlacedPiece>,
    /// Global vertical extent of the body without studs.
    pub y_range: (f64, f64),
    /// Grid offset of stud `(1, 1)`: `(round(x/b), round(z/b))`.
    pub grid: (i64, i64),
}

impl PlacedPart {
    /// Piece carrying the studs and top faces.
    pub fn top(&self) -> &PlacedPiece {
        &self.pieces[0]
    }

    /// Piece carrying the bottom face and cavity.
    pub fn bottom(&self) -> &PlacedPiece {
        &self.pieces[self.pieces.len() - 1]
    }

    /// Whether the brick is split into two tied pieces.
    pub fn is_split(&self) -> bool {
        self.pieces.len() > 1
    }

    /// Global grid cells of the studs, or none for tiles.
    pub fn stud_cells(&self) -> Vec<(i64, i64)> {
        if !self.brick.kind.has_studs() {
            return Vec::new();
        }
        let (gx, gz) = self.grid;
        (0..i64::from(self.brick.nz))
            .flat_map(|j| (0..i64::from(self.brick.nx)).map(move |i| (gx + i, gz + j)))
            .collect()
    }

    /// Global position of a named set's reference point: the center of its
    /// footprint in its plane.
    pub fn set_position(&self, set: &NamedSet, p: &GeometryParams) -> Vec3 {
        let [x, _, z] = self.loc;
        let (bottom, top) = self.y_range;
        let span = |n: u32| p.b * f64::from(n - 1) / 2.0;
        match set {
            NamedSet::Bottom => Vec3::new(x + span(self.brick.nx), bottom, z + span(self.brick.nz)),
            NamedSet::TopFaces => Vec3::new(x + span(self.brick.nx), top, z + span(self.brick.nz)),
            NamedSet::Stud { i, j } => Vec3::new(
                x + p.b * f64::from(i - 1),
                top + p.h_stud,
                z + p.b * f64::from(j - 1),
            ),
        }
    }
}

/// The assembly after placement: every instance, tie, reference point and
/// fixed region, ready to receive steps.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedModel {
    /// Assembly name.
    pub name: String,
    /// Brick material.
    pub material: Material,
    /// Element family of all brick parts.
    pub family: ElementFamily,
    /// Global element size.
    pub mesh_size: f64,
    /// Friction coefficient.
    pub mu: f64,
    /// Normal contact enforcement.
    pub contact_enforcement: ConstraintEnforcement,
    /// Built solids by brick id.
    pub solids: BTreeMap<BrickId, BrickSolid>,
    /// Part definitions by name.
    pub parts: BTreeMap<String, PartDef>,
    /// Placed parts by id.
    pub placed: BTreeMap<PartId, PlacedPart>,
    /// Instances in part id order, top piece first.
    pub instances: Vec<Instance>,
    /// Ties joining split pieces.
    pub ties: Vec<Tie>,
    /// Reference points of `loads_rp`, by load id.
    pub reference_points: BTreeMap<u32, ReferencePoint>,
    /// Rigid couplings of the loaded sets to their reference points.
    pub couplings: Vec<Coupling>,
    /// Regions of the `bc` entries, by bc id.
    pub fixed: BTreeMap<u32, Region>,
}

impl PlacedModel {
    /// Region of a named set on the piece that carries it.
    pub fn region(&self, target: &SetRef) -> Option<Region> {
        let placed = self.placed.get(&target.part_id)?;
        let set = target.set.set_name();
        placed
            .pieces
            .iter()
            .find(|piece| {
                self.parts
                    .get(&piece.part)
                    .is_some_and(|part| part.sets.contains_key(&set))
            })
            .map(|piece| Region::instance_set(piece.instance.clone(), set))
    }

    /// Names of all brick instances.
    pub fn instance_names(&self) -> Vec<String> {
        self.instances.iter().map(|i| i.name.clone()).collect()
    }

    /// A model document holding the placed geometry and constraints.
    pub fn document(&self, name: &str, kind: AnalysisKind) -> ModelDocument {
        let mut doc = ModelDocument::new(name, kind, self.mesh_size);
        doc.materials
            .insert(self.material.name.clone(), self.material.clone());
        doc.parts = self.parts.clone();
        doc.instances = self.instances.clone();
        doc.ties = self.ties.clone();
        doc.reference_points = self.reference_points.values().cloned().collect();
        doc.couplings = self.couplings.clone();
        doc
    }
}

/// Build the solids of every brick definition a part uses.
pub fn build_solids(
    assembly: &Assembly,
    dims: &Dimensions,
    mesh: &MeshSpec,
) -> Result<BTreeMap<BrickId, BrickSolid>, BuildError> {
    assembly
        .used_bricks()
        .into_iter()
        .map(|def| brick::build(def, dims, mesh, MATERIAL).map(|s| (def.id, s)))
        .collect()
}

/// Instance the solids at the part origins and resolve `bc` and `loads_rp`
/// into regions, reference points and couplings.
pub fn place(
    assembly: &Assembly,
    dims: &Dimensions,
    solids: &BTreeMap<BrickId, BrickSolid>,
) -> Result<PlacedModel, ConfigError> {
    let p = &dims.params;
    let mut parts = BTreeMap::new();
    let mut placed = BTreeMap::new();
    let mut instances = Vec::new();
    let mut ties = Vec::new();
    let mut family = ElementFamily::Tetrahedral;

    for part in assembly.parts.values() {
        let solid = solids
            .get(&part.brick_id)
            .ok_or(ConfigError::UnknownBrick {
                part_id: part.id,
                brick_id: part.brick_id,
            })?;
        let [x, y, z] = part.loc;
        let mut pieces = Vec::with_capacity(solid.pieces.len());
        for piece in &solid.pieces {
            family = piece.part.element;
            parts
                .entry(piece.part.name.clone())
                .or_insert_with(|| piece.part.clone());
            let placed_piece = PlacedPiece {
                instance: instance_name(part.id, piece.role),
                part: piece.part.name.clone(),
                role: piece.role,
                offset: Vec3::new(x, y + piece.y_offset, z),
            };
            instances.push(Instance {
                name: placed_piece.instance.clone(),
                part: placed_piece.part.clone(),
                offset: placed_piece.offset,
                color: part.color.clone(),
            });
            pieces.push(placed_piece);
        }

        if solid.is_split() {
            ties.push(Tie {
                name: format!("tie-part-{:02}", part.id),
                main: SurfaceRef::new(instance_name(part.id, PieceRole::Bottom), TIE),
                secondary: SurfaceRef::new(instance_name(part.id, PieceRole::Top), TIE),
            });
        }

        let (y0, y1) = solid.definition.kind.y_range(p);
        placed.insert(
            part.id,
            PlacedPart {
                id: part.id,
                brick: solid.definition.clone(),
                loc: part.loc,
                color: part.color.clone(),
                pieces,
                y_range: (y + y0, y + y1),
                grid: ((x / p.b).round() as i64, (z / p.b).round() as i64),
            },
        );
    }

    let mut model = PlacedModel {
        name: assembly.name.clone(),
        material: Material {
            name: MATERIAL.to_string(),
            youngs_modulus: p.material.youngs_modulus,
            poisson_ratio: p.material.poisson_ratio,
            density: p.material.density,
        },
        family,
        mesh_size: assembly.mesh_size,
        mu: assembly.mu,
        contact_enforcement: ConstraintEnforcement::Default,
        solids: solids.clone(),
        parts,
        placed,
        instances,
        ties,
        reference_points: BTreeMap::new(),
        couplings: Vec::new(),
        fixed: BTreeMap::new(),
    };

    for (&id, target) in &assembly.bc {
        let region = model.region(target).ok_or_else(|| dangling(format!("bc {id}"), target))?;
        model.fixed.insert(id, region);
    }

    for (&id, load) in &assembly.loads_rp {
        let target = &load.target;
        let region = model
            .region(target)
            .ok_or_else(|| dangling(format!("loads_rp {id}"), target))?;
        let position = model
            .placed
            .get(&target.part_id)
            .map(|part| part.set_position(&target.set, p))
            .ok_or_else(|| dangling(format!("loads_rp {id}"), target))?;
        let rp = reference_point_name(id);
        model.reference_points.insert(
            id,
            ReferencePoint {
                name: rp.clone(),
                position,
            },
        );
        model.couplings.push(Coupling {
            name: format!("RigBody-{rp}"),
            reference_point: rp,
            pin: region,
        });
    }

    debug!(
        assembly = %model.name,
        instances = model.instances.len(),
        ties = model.ties.len(),
        reference_points = model.reference_points.len(),
        "placed assembly"
    );
    Ok(model)
}

fn dangling(entry: String, target: &SetRef) -> ConfigError {
    ConfigError::DanglingSet {
        entry,
        part_id: target.part_id,
        set_name: target.set.set_name(),
    }
}
