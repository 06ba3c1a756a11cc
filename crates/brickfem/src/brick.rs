//! Brick types, definitions and the parametric solid builder.
//!
//! Local brick coordinates: x along the `nx` studs, y up, z along the `nz`
//! studs. The origin is the axis of stud `(1, 1)` on the brick's bottom
//! plane; stud `(i, j)` sits at `x = b (i - 1)`, `z = b (j - 1)`.

use crate::csg::Shape;
use crate::error::BuildError;
use crate::geometry::{Dimensions, GeometryParams, TOL};
use brickfem_ir::{Bounds, ElementFamily, PartDef, Selection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Identifier of a brick definition.
pub type BrickId = u32;

/// Cell set covering the whole part.
pub const SET_ALL: &str = "all";
/// Bottom face set.
pub const SET_BOTTOM: &str = "BOTTOM";
/// Top face and stud set.
pub const SET_TOP_FACES: &str = "TOP-FACES";
/// Split face of a two-piece brick (set and surface).
pub const TIE: &str = "tie";
/// Cavity faces a mating stud may penetrate; widened before contact.
pub const SET_CAVITY_TOUCH: &str = "cont-bot-touch";
/// Cavity faces in stud contact.
pub const SET_CAVITY: &str = "cont-bot";
/// Top face and studs, for stud/cavity contact.
pub const SURF_CONTACT_TOP: &str = "contact-top";
/// Bottom face and cavity faces, for stud/cavity contact.
pub const SURF_CONTACT_BOT: &str = "contact-bot";

/// The four brick families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BrickType {
    /// Full-height brick with cavity, tubes or pins, and ribs.
    #[serde(alias = "brick")]
    Regular,
    /// One-third height brick with cavity.
    Plate,
    /// One-third height brick with a flat top.
    Tile,
    /// Flat plate whose top face sits at the placement origin.
    BasePlate,
}

/// Where a brick type puts `y = 0` of its placement origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalOrigin {
    /// At the bottom plane of the brick.
    BottomPlane,
    /// At the bottom of the studs (the top face).
    StudBottom,
}

impl BrickType {
    /// Input tag of the type.
    pub fn name(self) -> &'static str {
        match self {
            BrickType::Regular => "regular",
            BrickType::Plate => "plate",
            BrickType::Tile => "tile",
            BrickType::BasePlate => "base-plate",
        }
    }

    /// Height of the body without studs.
    pub fn body_height(self, p: &GeometryParams) -> f64 {
        match self {
            BrickType::Regular => p.h,
            BrickType::Plate | BrickType::Tile => p.h / 3.0,
            BrickType::BasePlate => p.h_top,
        }
    }

    /// Vertical origin convention of the placement.
    pub fn vertical_origin(self) -> VerticalOrigin {
        match self {
            BrickType::BasePlate => VerticalOrigin::StudBottom,
            _ => VerticalOrigin::BottomPlane,
        }
    }

    /// Vertical extent of the body (without studs) relative to the placement origin.
    pub fn y_range(self, p: &GeometryParams) -> (f64, f64) {
        match self.vertical_origin() {
            VerticalOrigin::BottomPlane => (0.0, self.body_height(p)),
            VerticalOrigin::StudBottom => (-self.body_height(p), 0.0),
        }
    }

    /// Whether the top carries studs.
    pub fn has_studs(self) -> bool {
        self != BrickType::Tile
    }

    /// Whether the underside has a cavity.
    pub fn has_cavity(self) -> bool {
        self != BrickType::BasePlate
    }

    /// Whether the type is split into tie-joined pieces for hexahedral meshes.
    pub fn splits(self) -> bool {
        matches!(self, BrickType::Regular | BrickType::Plate)
    }
}

impl fmt::Display for BrickType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Named face set of a brick usable in boundary conditions and loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NamedSet {
    /// Bottom face.
    Bottom,
    /// All top faces including the studs.
    TopFaces,
    /// Top face of stud `(i, j)`, 1-based.
    Stud {
        /// Index along x.
        i: u32,
        /// Index along z.
        j: u32,
    },
}

impl NamedSet {
    /// Parse a set name, case-insensitive.
    ///
    /// Studs are written `STUD-i-j`; the compact `STUD-ij` form is accepted
    /// for single-digit indices.
    pub fn parse(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        match upper.as_str() {
            SET_BOTTOM => return Some(NamedSet::Bottom),
            SET_TOP_FACES => return Some(NamedSet::TopFaces),
            _ => {}
        }
        let rest = upper.strip_prefix("STUD-")?;
        let (i, j) = match rest.split_once('-') {
            Some((i, j)) => (i.parse().ok()?, j.parse().ok()?),
            None if rest.len() == 2 && rest.bytes().all(|c| c.is_ascii_digit()) => {
                let digits = rest.as_bytes();
                (u32::from(digits[0] - b'0'), u32::from(digits[1] - b'0'))
            }
            None => return None,
        };
        (i >= 1 && j >= 1).then_some(NamedSet::Stud { i, j })
    }

    /// Canonical set name.
    pub fn set_name(&self) -> String {
        match self {
            NamedSet::Bottom => SET_BOTTOM.to_string(),
            NamedSet::TopFaces => SET_TOP_FACES.to_string(),
            NamedSet::Stud { i, j } => stud_set_name(*i, *j),
        }
    }
}

impl fmt::Display for NamedSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.set_name())
    }
}

impl TryFrom<String> for NamedSet {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        NamedSet::parse(&s).ok_or_else(|| format!("unknown set name '{s}'"))
    }
}

impl From<NamedSet> for String {
    fn from(s: NamedSet) -> String {
        s.set_name()
    }
}

/// Set name of the top face of stud `(i, j)`.
pub fn stud_set_name(i: u32, j: u32) -> String {
    format!("STUD-{i}-{j}")
}

/// Outer side faces of a brick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SideFace {
    /// Face at minimum x.
    X0,
    /// Face at maximum x.
    X1,
    /// Face at minimum z.
    Z0,
    /// Face at maximum z.
    Z1,
}

impl SideFace {
    /// Surface name.
    pub fn name(self) -> &'static str {
        match self {
            SideFace::X0 => "x0",
            SideFace::X1 => "x1",
            SideFace::Z0 => "z0",
            SideFace::Z1 => "z1",
        }
    }

    /// All four faces.
    pub const ALL: [SideFace; 4] = [SideFace::X0, SideFace::X1, SideFace::Z0, SideFace::Z1];
}

/// Feature pattern inside the cavity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CavityPattern {
    /// No features (1×1 bricks, base-plates).
    None,
    /// Solid pins between the studs of a single-row brick.
    Pins,
    /// Annular tubes at the interior grid intersections.
    Tubes,
}

/// A brick definition: type and stud grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrickDefinition {
    /// Identifier.
    pub id: BrickId,
    /// Brick type.
    #[serde(rename = "type")]
    pub kind: BrickType,
    /// Studs along x.
    pub nx: u32,
    /// Studs along z.
    pub nz: u32,
}

/// Footprint of a rib wall in the cavity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rib {
    /// Extent along x.
    pub x: (f64, f64),
    /// Extent along z.
    pub z: (f64, f64),
}

impl BrickDefinition {
    /// Short label such as `regular-2x4`.
    pub fn label(&self) -> String {
        format!("{}-{}x{}", self.kind, self.nx, self.nz)
    }

    /// Feature pattern of the cavity.
    pub fn cavity_pattern(&self) -> CavityPattern {
        if !self.kind.has_cavity() {
            return CavityPattern::None;
        }
        match (self.nx.min(self.nz), self.nx.max(self.nz)) {
            (lo, _) if lo >= 2 => CavityPattern::Tubes,
            (1, hi) if hi > 1 => CavityPattern::Pins,
            _ => CavityPattern::None,
        }
    }

    /// Whether the brick provides the named set.
    pub fn provides(&self, set: &NamedSet) -> bool {
        match set {
            NamedSet::Bottom | NamedSet::TopFaces => true,
            NamedSet::Stud { i, j } => {
                self.kind.has_studs() && (1..=self.nx).contains(i) && (1..=self.nz).contains(j)
            }
        }
    }

    /// Local `(x, z)` of every stud axis with its 1-based grid index.
    pub fn stud_axes(&self, b: f64) -> Vec<((u32, u32), [f64; 2])> {
        let mut out = Vec::with_capacity((self.nx * self.nz) as usize);
        for j in 1..=self.nz {
            for i in 1..=self.nx {
                out.push(((i, j), [b * f64::from(i - 1), b * f64::from(j - 1)]));
            }
        }
        out
    }

    /// Centers of the pins or tubes.
    pub fn feature_centers(&self, b: f64) -> Vec<[f64; 2]> {
        let x_mid = mid_positions(self.nx, b);
        let z_mid = mid_positions(self.nz, b);
        match self.cavity_pattern() {
            CavityPattern::None => Vec::new(),
            CavityPattern::Pins if self.nz == 1 => x_mid.iter().map(|&x| [x, 0.0]).collect(),
            CavityPattern::Pins => z_mid.iter().map(|&z| [0.0, z]).collect(),
            CavityPattern::Tubes => z_mid
                .iter()
                .flat_map(|&z| x_mid.iter().map(move |&x| [x, z]))
                .collect(),
        }
    }

    /// Rib walls of the cavity.
    ///
    /// Only regular bricks have ribs, along an axis with an even stud count
    /// of at least four, at every second interior position. A rib runs
    /// perpendicular to that axis, from wall to pin or between wall and
    /// tubes. Zero rib thickness yields none.
    pub fn ribs(&self, d: &Dimensions) -> Vec<Rib> {
        if self.kind != BrickType::Regular {
            return Vec::new();
        }
        let p = &d.params;
        let b = p.b;
        let c = d.cavity_half_width;
        let x_mid = mid_positions(self.nx, b);
        let z_mid = mid_positions(self.nz, b);
        let x_end = b * f64::from(self.nx - 1) + c;
        let z_end = b * f64::from(self.nz - 1) + c;
        let every_second = |mids: &[f64]| -> Vec<f64> {
            mids.iter().skip(1).step_by(2).copied().collect()
        };

        let mut ribs = Vec::new();
        match self.cavity_pattern() {
            CavityPattern::None => {}
            CavityPattern::Pins => {
                let t = p.inside_small.t_rib;
                if t == 0.0 {
                    return ribs;
                }
                if self.nz == 1 && self.nx % 2 == 0 {
                    for x in every_second(&x_mid) {
                        ribs.push(Rib {
                            x: (x - t / 2.0, x + t / 2.0),
                            z: (-c, c),
                        });
                    }
                } else if self.nx == 1 && self.nz % 2 == 0 {
                    for z in every_second(&z_mid) {
                        ribs.push(Rib {
                            x: (-c, c),
                            z: (z - t / 2.0, z + t / 2.0),
                        });
                    }
                }
            }
            CavityPattern::Tubes => {
                let t = p.inside_big.t_rib;
                if t == 0.0 {
                    return ribs;
                }
                let reach = d.big_rib_reach;
                if self.nx % 2 == 0 {
                    for x in every_second(&x_mid) {
                        for (z0, z1) in rib_segments(&z_mid, -c, z_end, reach) {
                            ribs.push(Rib {
                                x: (x - t / 2.0, x + t / 2.0),
                                z: (z0, z1),
                            });
                        }
                    }
                }
                if self.nz % 2 == 0 {
                    for z in every_second(&z_mid) {
                        for (x0, x1) in rib_segments(&x_mid, -c, x_end, reach) {
                            ribs.push(Rib {
                                x: (x0, x1),
                                z: (z - t / 2.0, z + t / 2.0),
                            });
                        }
                    }
                }
            }
        }
        ribs
    }

    /// Rib height for this brick's cavity pattern.
    fn rib_height(&self, p: &GeometryParams) -> f64 {
        match self.cavity_pattern() {
            CavityPattern::Pins => p.inside_small.h_rib,
            _ => p.inside_big.h_rib,
        }
    }
}

/// Positions halfway between neighboring studs.
fn mid_positions(n: u32, b: f64) -> Vec<f64> {
    (0..n.saturating_sub(1))
        .map(|i| b * f64::from(i) + b / 2.0)
        .collect()
}

/// Wall-to-tube, tube-to-tube and tube-to-wall spans along one rib line.
fn rib_segments(tubes: &[f64], start: f64, end: f64, reach: f64) -> Vec<(f64, f64)> {
    let mut out = Vec::with_capacity(tubes.len() + 1);
    let mut from = start;
    for &c in tubes {
        out.push((from, c - reach));
        from = c + reach;
    }
    out.push((from, end));
    out
}

/// Meshing choices that shape the solid description.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshSpec {
    /// Global target element size.
    pub size: f64,
    /// Element family.
    pub family: ElementFamily,
}

/// Role of a piece within its brick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PieceRole {
    /// The brick is one piece.
    Whole,
    /// Top plate and studs of a split brick.
    Top,
    /// Walls and cavity features of a split brick.
    Bottom,
}

impl PieceRole {
    /// Suffix of part and instance names.
    pub fn suffix(self) -> &'static str {
        match self {
            PieceRole::Whole | PieceRole::Top => "TOP",
            PieceRole::Bottom => "BOT",
        }
    }
}

/// One meshed body of a brick.
#[derive(Debug, Clone, PartialEq)]
pub struct BrickPiece {
    /// Role within the brick.
    pub role: PieceRole,
    /// Vertical offset from the brick's placement origin to the piece's local origin.
    pub y_offset: f64,
    /// Solid, partitions and named sets.
    pub part: PartDef,
}

impl BrickPiece {
    /// Whether the piece carries the cavity faces.
    pub fn has_cavity_sets(&self) -> bool {
        self.part.sets.contains_key(SET_CAVITY_TOUCH)
    }
}

/// Built brick: one or two pieces plus the layout they were derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct BrickSolid {
    /// Source definition.
    pub definition: BrickDefinition,
    /// Cavity feature pattern.
    pub pattern: CavityPattern,
    /// Rib walls.
    pub ribs: Vec<Rib>,
    /// Stud radius.
    pub stud_radius: f64,
    /// Pieces, top piece first.
    pub pieces: Vec<BrickPiece>,
}

impl BrickSolid {
    /// Whether the brick is split into tie-joined pieces.
    pub fn is_split(&self) -> bool {
        self.pieces.len() > 1
    }

    /// Piece carrying the studs and top faces.
    pub fn top(&self) -> &BrickPiece {
        &self.pieces[0]
    }

    /// Piece carrying the bottom face and cavity.
    pub fn bottom(&self) -> &BrickPiece {
        &self.pieces[self.pieces.len() - 1]
    }

    /// Piece that defines the named set.
    pub fn piece_with_set(&self, set: &str) -> Option<&BrickPiece> {
        self.pieces.iter().find(|p| p.part.sets.contains_key(set))
    }
}

/// Build the solid description of one brick.
///
/// Regular bricks and plates meshed with hexahedra are split at
/// `body_height - h_top` into a top piece (plate and studs) and a bottom
/// piece (walls and cavity features), to be tied together, whenever the
/// studs are oversized. Everything else is one piece.
pub fn build(
    def: &BrickDefinition,
    d: &Dimensions,
    mesh: &MeshSpec,
    material: &str,
) -> Result<BrickSolid, BuildError> {
    let p = &d.params;
    let label = def.label();
    let kind = def.kind;
    let hb = kind.body_height(p);
    let pattern = def.cavity_pattern();
    let ribs = def.ribs(d);
    let split = kind.splits() && mesh.family == ElementFamily::HexReduced && p.delta_r != 0.0;

    check_features(def, d, pattern)?;

    let outer = Footprint::outer(def, d);
    let studs = if kind.has_studs() {
        Shape::union_all(
            "studs",
            def.stud_axes(p.b)
                .into_iter()
                .map(|(_, [x, z])| Shape::post("stud", d.stud_radius, p.h_stud, [x, 0.0, z])),
        )
    } else {
        None
    };
    let stud_top = if kind.has_studs() { p.h_stud } else { 0.0 };

    let void_height = hb - p.h_top;
    if kind.has_cavity() && void_height <= 0.0 {
        return Err(BuildError::Degenerate {
            brick: label,
            what: "cavity depth",
            value: void_height,
        });
    }
    let void = kind
        .has_cavity()
        .then(|| cavity_void(def, d, pattern, &ribs, void_height));

    let mut pieces = Vec::with_capacity(2);
    if split {
        // Top plate with studs, sitting on the split plane.
        let plate = outer.block("top-plate", 0.0, p.h_top);
        let solid = attach_studs(plate, studs.as_ref(), p.h_top);
        let mut part = new_part(&label, PieceRole::Top, solid, mesh, material);
        add_common_sets(&mut part, def, d, &outer, false, p.h_top, stud_top);
        part.sets.insert(TIE.to_string(), plane_below(TOL));
        part.surfaces.insert(TIE.to_string(), plane_below(TOL));
        add_partitions(&mut part, [p.h_top], p.h_top + stud_top);
        pieces.push(BrickPiece {
            role: PieceRole::Top,
            y_offset: void_height,
            part,
        });

        let walls = outer.block("walls", 0.0, void_height);
        let solid = match &void {
            Some(v) => walls.difference(v),
            None => walls,
        };
        let mut part = new_part(&label, PieceRole::Bottom, solid, mesh, material);
        part.sets.insert(SET_BOTTOM.to_string(), plane_below(TOL));
        add_side_surfaces(&mut part, &outer);
        part.sets.insert(
            TIE.to_string(),
            Selection::within(Bounds::any().y_min(void_height - TOL)),
        );
        part.surfaces.insert(
            TIE.to_string(),
            Selection::within(Bounds::any().y_min(void_height - TOL)),
        );
        add_cavity_sets(&mut part, def, d, mesh.size);
        add_partitions(
            &mut part,
            lower_partitions(def, d, mesh.size, hb),
            void_height,
        );
        pieces.push(BrickPiece {
            role: PieceRole::Bottom,
            y_offset: 0.0,
            part,
        });
    } else {
        let body = outer.block("body", 0.0, hb);
        let with_studs = attach_studs(body, studs.as_ref(), hb);
        let solid = match &void {
            Some(v) => with_studs.difference(v),
            None => with_studs,
        };
        let mut part = new_part(&label, PieceRole::Whole, solid, mesh, material);
        add_common_sets(&mut part, def, d, &outer, true, hb, stud_top);
        if kind.has_cavity() {
            add_cavity_sets(&mut part, def, d, mesh.size);
        }
        let mut planes = Vec::new();
        if kind.has_studs() {
            planes.push(hb);
        }
        if kind.has_cavity() {
            planes.push(void_height);
        }
        planes.extend(lower_partitions(def, d, mesh.size, hb));
        add_partitions(&mut part, planes, hb + stud_top);
        let y_offset = match kind.vertical_origin() {
            VerticalOrigin::BottomPlane => 0.0,
            VerticalOrigin::StudBottom => -hb,
        };
        pieces.push(BrickPiece {
            role: PieceRole::Whole,
            y_offset,
            part,
        });
    }

    debug!(
        brick = %label,
        pieces = pieces.len(),
        ribs = ribs.len(),
        pattern = ?pattern,
        "built brick solid"
    );

    Ok(BrickSolid {
        definition: def.clone(),
        pattern,
        ribs,
        stud_radius: d.stud_radius,
        pieces,
    })
}

/// Reject features that would poke through the cavity walls or each other.
fn check_features(def: &BrickDefinition, d: &Dimensions, pattern: CavityPattern) -> Result<(), BuildError> {
    let p = &d.params;
    let c = d.cavity_half_width;
    let outside = |feature: String| BuildError::FeatureOutsideCavity {
        brick: def.label(),
        feature,
    };
    match pattern {
        CavityPattern::None => Ok(()),
        CavityPattern::Pins => {
            if p.inside_small.r >= c {
                return Err(outside(format!("pin of radius {}", p.inside_small.r)));
            }
            Ok(())
        }
        CavityPattern::Tubes => {
            if p.inside_big.r >= p.b / 2.0 + c {
                return Err(outside(format!("tube of radius {}", p.inside_big.r)));
            }
            if 2.0 * p.inside_big.r >= p.b {
                return Err(outside(format!(
                    "tubes of radius {} at pitch {}",
                    p.inside_big.r, p.b
                )));
            }
            Ok(())
        }
    }
}

/// Rectangular x/z footprint.
struct Footprint {
    x: (f64, f64),
    z: (f64, f64),
}

impl Footprint {
    fn outer(def: &BrickDefinition, d: &Dimensions) -> Self {
        Self::around_grid(def, d.params.b, d.half_width)
    }

    fn cavity(def: &BrickDefinition, d: &Dimensions) -> Self {
        Self::around_grid(def, d.params.b, d.cavity_half_width)
    }

    fn around_grid(def: &BrickDefinition, b: f64, margin: f64) -> Self {
        Self {
            x: (-margin, b * f64::from(def.nx - 1) + margin),
            z: (-margin, b * f64::from(def.nz - 1) + margin),
        }
    }

    fn block(&self, name: &str, y0: f64, y1: f64) -> Shape {
        Shape::block(name, [self.x.0, y0, self.z.0], [self.x.1, y1, self.z.1])
    }

    fn bounds(&self) -> Bounds {
        Bounds::any()
            .x_min(self.x.0 - TOL)
            .x_max(self.x.1 + TOL)
            .z_min(self.z.0 - TOL)
            .z_max(self.z.1 + TOL)
    }
}

/// Region removed from the underside: the cavity box minus its features.
fn cavity_void(
    def: &BrickDefinition,
    d: &Dimensions,
    pattern: CavityPattern,
    ribs: &[Rib],
    height: f64,
) -> Shape {
    let p = &d.params;
    let cavity = Footprint::cavity(def, d).block("cavity", 0.0, height);
    let centers = def.feature_centers(p.b);
    let features: Vec<Shape> = match pattern {
        CavityPattern::None => Vec::new(),
        CavityPattern::Pins => centers
            .iter()
            .map(|&[x, z]| Shape::post("pin", p.inside_small.r, height, [x, 0.0, z]))
            .collect(),
        CavityPattern::Tubes => centers
            .iter()
            .map(|&[x, z]| {
                let outer = Shape::post("tube", p.inside_big.r, height, [x, 0.0, z]);
                let bore = Shape::post("tube-bore", d.tube_inner_radius, height, [x, 0.0, z]);
                &outer - &bore
            })
            .collect(),
    };
    let y_lo = (height - def.rib_height(p)).max(0.0);
    let rib_shapes = ribs
        .iter()
        .map(|r| Shape::block("rib", [r.x.0, y_lo, r.z.0], [r.x.1, height, r.z.1]));

    match Shape::union_all("cavity-features", features.into_iter().chain(rib_shapes)) {
        Some(f) => cavity.difference(&f),
        None => cavity,
    }
}

fn attach_studs(base: Shape, studs: Option<&Shape>, at: f64) -> Shape {
    match studs {
        Some(s) => base.union(&s.translate(0.0, at, 0.0)),
        None => base,
    }
}

fn new_part(label: &str, role: PieceRole, solid: Shape, mesh: &MeshSpec, material: &str) -> PartDef {
    let name = format!("{label}-{}", role.suffix());
    let (root, nodes) = solid.into_graph();
    let mut sets = BTreeMap::new();
    sets.insert(SET_ALL.to_string(), Selection::All);
    PartDef {
        name,
        root,
        nodes,
        element: mesh.family,
        partitions: Vec::new(),
        sets,
        surfaces: BTreeMap::new(),
        material: material.to_string(),
    }
}

fn plane_below(y: f64) -> Selection {
    Selection::within(Bounds::any().y_max(y))
}

/// Sets of the piece that carries the top: top faces, studs, sides, and
/// (for a whole brick) the bottom face.
fn add_common_sets(
    part: &mut PartDef,
    def: &BrickDefinition,
    d: &Dimensions,
    outer: &Footprint,
    with_bottom: bool,
    top: f64,
    stud_height: f64,
) {
    let b = d.params.b;
    if with_bottom {
        part.sets.insert(SET_BOTTOM.to_string(), plane_below(TOL));
    }
    part.sets.insert(
        SET_TOP_FACES.to_string(),
        Selection::within(Bounds::any().y_min(top - TOL)),
    );
    part.surfaces.insert(
        SURF_CONTACT_TOP.to_string(),
        Selection::within(Bounds::any().y_min(top - TOL)),
    );
    if def.kind.has_studs() {
        for ((i, j), [x, z]) in def.stud_axes(b) {
            part.sets.insert(
                stud_set_name(i, j),
                Selection::within(
                    Bounds::any()
                        .y_min(top + stud_height - 2.0 * TOL)
                        .x_min(x - b / 2.0)
                        .x_max(x + b / 2.0)
                        .z_min(z - b / 2.0)
                        .z_max(z + b / 2.0),
                ),
            );
        }
    }
    add_side_surfaces(part, outer);
}

fn add_side_surfaces(part: &mut PartDef, outer: &Footprint) {
    for face in SideFace::ALL {
        let bounds = match face {
            SideFace::X0 => Bounds::any().x_max(outer.x.0 + TOL),
            SideFace::X1 => Bounds::any().x_min(outer.x.1 - TOL),
            SideFace::Z0 => Bounds::any().z_max(outer.z.0 + TOL),
            SideFace::Z1 => Bounds::any().z_min(outer.z.1 - TOL),
        };
        part.surfaces
            .insert(face.name().to_string(), Selection::within(bounds));
    }
}

/// Cavity faces in the stud engagement zone, with and without the faces
/// a widening displacement must not move.
fn add_cavity_sets(part: &mut PartDef, def: &BrickDefinition, d: &Dimensions, mesh_size: f64) {
    let p = &d.params;
    let engage = p.h_stud + mesh_size;
    let zone = Selection::within(
        Footprint::cavity(def, d)
            .bounds()
            .y_max(engage + TOL),
    );
    let bottom = plane_below(TOL);
    let touch = zone.clone().minus(Selection::union(vec![
        bottom.clone(),
        Selection::plane_y(p.h / 3.0 - p.h_top, TOL),
        Selection::plane_y(engage, TOL),
    ]));
    let cont = zone.minus(Selection::union(vec![
        bottom.clone(),
        Selection::plane_y(engage, TOL),
    ]));
    part.sets.insert(SET_CAVITY_TOUCH.to_string(), touch);
    part.sets.insert(SET_CAVITY.to_string(), cont.clone());
    part.surfaces.insert(
        SURF_CONTACT_BOT.to_string(),
        Selection::union(vec![bottom, cont]),
    );
}

/// Partition planes of the lower walls: the stud engagement zone and the rib ends.
fn lower_partitions(def: &BrickDefinition, d: &Dimensions, mesh_size: f64, hb: f64) -> Vec<f64> {
    let p = &d.params;
    let mut planes = Vec::new();
    if def.kind == BrickType::Regular {
        planes.push(p.h_stud + mesh_size);
        let rib_base = hb - p.h_top - def.rib_height(p);
        if !def.ribs(d).is_empty() && rib_base > TOL {
            planes.push(rib_base);
        }
    }
    planes
}

/// Keep planes strictly inside the piece, sorted and without duplicates.
fn add_partitions(part: &mut PartDef, planes: impl IntoIterator<Item = f64>, height: f64) {
    let mut planes: Vec<f64> = planes
        .into_iter()
        .filter(|&y| y > TOL && y < height - TOL)
        .collect();
    planes.sort_by(f64::total_cmp);
    planes.dedup_by(|a, b| (*a - *b).abs() < TOL);
    part.partitions = planes;
}
