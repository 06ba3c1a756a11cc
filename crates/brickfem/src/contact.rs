//! Neighbour detection: which cavities get widened and which surfaces touch.

use crate::assembly::PartId;
use crate::brick::{PieceRole, SideFace, SURF_CONTACT_BOT, SURF_CONTACT_TOP};
use crate::geometry::TOL;
use crate::placement::{PlacedModel, PlacedPart};
use brickfem_ir::{
    ConstraintEnforcement, ContactProperty, Interaction, NormalBehavior, SurfaceRef, Tangential,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Name of the single contact property of a model.
pub const CONTACT_PROPERTY: &str = "cont-prop";

/// Name of the all-surfaces contact of explicit models.
pub const GENERAL_CONTACT: &str = "general-contact";

/// Elastic slip of penalty friction, as a fraction of the element length.
const ELASTIC_SLIP_FRACTION: f64 = 0.005;

/// Vertical relation of a second part to a first one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// The second part sits on the first one's studs.
    Top,
    /// The first part sits on the second one's studs.
    Bottom,
    /// The vertical ranges overlap.
    Side,
    /// No contact possible.
    None,
}

/// Classify two body ranges (without studs).
pub fn relation(first: (f64, f64), second: (f64, f64), h_stud: f64) -> Relation {
    let (lo1, hi1) = first;
    let (lo2, hi2) = second;
    if hi1 + h_stud > lo2 && hi1 <= lo2 + TOL {
        Relation::Top
    } else if hi2 + h_stud > lo1 && hi2 <= lo1 + TOL {
        Relation::Bottom
    } else if (hi2 > lo1 + TOL && hi2 < hi1 + TOL) || (lo2 < hi1 + TOL && lo2 > lo1 - TOL) {
        Relation::Side
    } else {
        Relation::None
    }
}

/// A surface pair that gets a contact interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactPair {
    /// Interaction name.
    pub name: String,
    /// Main surface.
    pub main: SurfaceRef,
    /// Secondary surface.
    pub secondary: SurfaceRef,
}

/// Result of neighbour detection over a placed assembly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContactPlan {
    /// Engaged cavities per part, as local 1-based stud indices. Every part
    /// has an entry, possibly empty.
    pub widen: BTreeMap<PartId, BTreeSet<(u32, u32)>>,
    /// Stud/cavity and side contact pairs.
    pub pairs: Vec<ContactPair>,
}

impl ContactPlan {
    /// Whether any cavity of the part is engaged by a stud.
    pub fn needs_widening(&self, part: PartId) -> bool {
        self.widen.get(&part).is_some_and(|cells| !cells.is_empty())
    }

    /// Surface-to-surface interactions, one per pair.
    pub fn interactions(&self, created_in: &str) -> Vec<Interaction> {
        self.pairs
            .iter()
            .map(|pair| Interaction::SurfaceToSurface {
                name: pair.name.clone(),
                created_in: created_in.to_string(),
                main: pair.main.clone(),
                secondary: pair.secondary.clone(),
                property: CONTACT_PROPERTY.to_string(),
                finite_sliding: true,
            })
            .collect()
    }
}

/// Detect engaged cavities and contact pairs between every two parts.
pub fn plan(model: &PlacedModel, h_stud: f64) -> ContactPlan {
    let mut out = ContactPlan::default();
    for (&k, upper) in &model.placed {
        let mut engaged = BTreeSet::new();
        for (&i, other) in &model.placed {
            if k == i {
                continue;
            }
            match relation(upper.y_range, other.y_range, h_stud) {
                Relation::Bottom if upper.brick.kind.has_cavity() => {
                    let cells = engaged_cavities(upper, other);
                    if !cells.is_empty() {
                        out.pairs.push(ContactPair {
                            name: format!("cont-bt-{k}-{i}"),
                            main: SurfaceRef::new(other.top().instance.clone(), SURF_CONTACT_TOP),
                            secondary: SurfaceRef::new(
                                upper.bottom().instance.clone(),
                                SURF_CONTACT_BOT,
                            ),
                        });
                        engaged.extend(cells);
                    }
                }
                Relation::Side => {
                    for (face1, face2) in side_faces(upper, other) {
                        out.pairs.extend(side_pairs(k, upper, i, other, face1, face2));
                    }
                }
                _ => {}
            }
        }
        out.widen.insert(k, engaged);
    }
    debug!(
        pairs = out.pairs.len(),
        widened = out.widen.values().filter(|c| !c.is_empty()).count(),
        "detected contact"
    );
    out
}

/// Cavity cells of `upper` (local, 1-based) sitting on a stud of `lower`.
fn engaged_cavities(upper: &PlacedPart, lower: &PlacedPart) -> BTreeSet<(u32, u32)> {
    let studs: BTreeSet<(i64, i64)> = lower.stud_cells().into_iter().collect();
    let (gx, gz) = upper.grid;
    let mut cells = BTreeSet::new();
    for j in 0..i64::from(upper.brick.nz) {
        for i in 0..i64::from(upper.brick.nx) {
            if studs.contains(&(gx + i, gz + j)) {
                // Non-negative and bounded by the grid size.
                cells.insert(((i + 1) as u32, (j + 1) as u32));
            }
        }
    }
    cells
}

/// Touching side faces when `second` is the +x or +z grid neighbour of `first`.
fn side_faces(first: &PlacedPart, second: &PlacedPart) -> BTreeSet<(SideFace, SideFace)> {
    let cells1 = footprint(first);
    let cells2: BTreeSet<(i64, i64)> = footprint(second).into_iter().collect();
    let mut faces = BTreeSet::new();
    for (x, z) in cells1 {
        if cells2.contains(&(x + 1, z)) {
            faces.insert((SideFace::X1, SideFace::X0));
        }
        if cells2.contains(&(x, z + 1)) {
            faces.insert((SideFace::Z1, SideFace::Z0));
        }
    }
    faces
}

fn footprint(part: &PlacedPart) -> Vec<(i64, i64)> {
    let (gx, gz) = part.grid;
    (0..i64::from(part.brick.nz))
        .flat_map(|j| (0..i64::from(part.brick.nx)).map(move |i| (gx + i, gz + j)))
        .collect()
}

/// One pair per piece combination of two side-by-side bricks.
fn side_pairs(
    k: PartId,
    first: &PlacedPart,
    i: PartId,
    second: &PlacedPart,
    face1: SideFace,
    face2: SideFace,
) -> Vec<ContactPair> {
    let tag = |role: PieceRole| match role {
        PieceRole::Top => 't',
        PieceRole::Whole | PieceRole::Bottom => 'b',
    };
    let mut pairs = Vec::new();
    for p1 in first.pieces.iter().rev() {
        for p2 in second.pieces.iter().rev() {
            pairs.push(ContactPair {
                name: format!("cont-side-{k}-{i}{}{}", tag(p1.role), tag(p2.role)),
                main: SurfaceRef::new(p1.instance.clone(), face1.name()),
                secondary: SurfaceRef::new(p2.instance.clone(), face2.name()),
            });
        }
    }
    pairs
}

/// Hard, separable contact with penalty friction (frictionless for `mu = 0`).
pub fn contact_property(mu: f64, enforcement: ConstraintEnforcement) -> ContactProperty {
    let tangential = if mu == 0.0 {
        Tangential::Frictionless
    } else {
        Tangential::Penalty {
            mu,
            elastic_slip_fraction: ELASTIC_SLIP_FRACTION,
        }
    };
    ContactProperty {
        name: CONTACT_PROPERTY.to_string(),
        normal: NormalBehavior::Hard {
            allow_separation: true,
            enforcement,
        },
        tangential,
    }
}

/// All-surfaces contact with self contact.
pub fn general_contact(created_in: &str) -> Interaction {
    Interaction::General {
        name: GENERAL_CONTACT.to_string(),
        created_in: created_in.to_string(),
        property: CONTACT_PROPERTY.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::ModelInput;
    use crate::brick::MeshSpec;
    use crate::placement::{build_solids, place};
    use brickfem_ir::ElementFamily;

    fn placed(json: &str, family: ElementFamily) -> PlacedModel {
        let spec = ModelInput::from_json(json).unwrap().validate().unwrap();
        let mesh = MeshSpec {
            size: spec.assembly.mesh_size,
            family,
        };
        let solids = build_solids(&spec.assembly, &spec.dims, &mesh).unwrap();
        place(&spec.assembly, &spec.dims, &solids).unwrap()
    }

    /// Running bond: four 2x1 bricks on top of three.
    const WALL: &str = r#"{"assembly": {
        "name": "wall",
        "bricks": {"1": {"type": "regular", "nx": 2, "nz": 1}},
        "parts": {"1": {"brick_id": 1, "loc": [0, 0, 0]},
                  "2": {"brick_id": 1, "loc": [16, 0, 0]},
                  "3": {"brick_id": 1, "loc": [32, 0, 0]},
                  "4": {"brick_id": 1, "loc": [48, 0, 0]},
                  "5": {"brick_id": 1, "loc": [8, -9.6, 0]},
                  "6": {"brick_id": 1, "loc": [24, -9.6, 0]},
                  "7": {"brick_id": 1, "loc": [40, -9.6, 0]}},
        "mesh_size": 1.0, "mu": 0.2}}"#;

    #[test]
    fn relations() {
        assert_eq!(relation((0.0, 9.6), (9.6, 19.2), 1.7), Relation::Top);
        assert_eq!(relation((9.6, 19.2), (0.0, 9.6), 1.7), Relation::Bottom);
        assert_eq!(relation((0.0, 9.6), (0.0, 9.6), 1.7), Relation::Side);
        assert_eq!(relation((0.0, 3.2), (1.0, 3.0), 1.7), Relation::Side);
        assert_eq!(relation((0.0, 9.6), (20.0, 29.6), 1.7), Relation::None);
        // Base-plate below a brick placed at the same origin.
        assert_eq!(relation((0.0, 9.6), (-1.5, 0.0), 1.7), Relation::Bottom);
    }

    #[test]
    fn running_bond_wall() {
        let m = placed(WALL, ElementFamily::Tetrahedral);
        let plan = plan(&m, 1.7);
        let cells = |k: PartId| plan.widen[&k].iter().copied().collect::<Vec<_>>();
        assert_eq!(cells(1), vec![(2, 1)]);
        assert_eq!(cells(2), vec![(1, 1), (2, 1)]);
        assert_eq!(cells(3), vec![(1, 1), (2, 1)]);
        assert_eq!(cells(4), vec![(1, 1)]);
        for k in 5..=7 {
            assert!(!plan.needs_widening(k));
        }

        let names: BTreeSet<&str> = plan.pairs.iter().map(|p| p.name.as_str()).collect();
        let expected: BTreeSet<&str> = [
            "cont-side-1-2bb",
            "cont-bt-1-5",
            "cont-side-2-3bb",
            "cont-bt-2-5",
            "cont-bt-2-6",
            "cont-side-3-4bb",
            "cont-bt-3-6",
            "cont-bt-3-7",
            "cont-bt-4-7",
            "cont-side-5-6bb",
            "cont-side-6-7bb",
        ]
        .into_iter()
        .collect();
        assert_eq!(names, expected);

        let bt = plan.pairs.iter().find(|p| p.name == "cont-bt-2-6").unwrap();
        assert_eq!(bt.main, SurfaceRef::new("BRICK06-TOP", SURF_CONTACT_TOP));
        assert_eq!(bt.secondary, SurfaceRef::new("BRICK02-TOP", SURF_CONTACT_BOT));
        let side = plan.pairs.iter().find(|p| p.name == "cont-side-1-2bb").unwrap();
        assert_eq!(side.main, SurfaceRef::new("BRICK01-TOP", "x1"));
        assert_eq!(side.secondary, SurfaceRef::new("BRICK02-TOP", "x0"));
    }

    #[test]
    fn split_side_pairs_cover_all_pieces() {
        let m = placed(WALL, ElementFamily::HexReduced);
        let plan = plan(&m, 1.7);
        let side: Vec<&ContactPair> = plan
            .pairs
            .iter()
            .filter(|p| p.name.starts_with("cont-side-1-2"))
            .collect();
        assert_eq!(side.len(), 4);
        let tt = side.iter().find(|p| p.name.ends_with("tt")).unwrap();
        assert_eq!(tt.main.instance, "BRICK01-TOP");
        assert_eq!(tt.secondary.instance, "BRICK02-TOP");
        let bb = side.iter().find(|p| p.name.ends_with("bb")).unwrap();
        assert_eq!(bb.main.instance, "BRICK01-BOT");
        // Stud contact lands on the cavity piece.
        let bt = plan.pairs.iter().find(|p| p.name == "cont-bt-1-5").unwrap();
        assert_eq!(bt.secondary.instance, "BRICK01-BOT");
        assert_eq!(bt.main.instance, "BRICK05-TOP");
    }

    #[test]
    fn tiles_have_no_studs_to_engage() {
        let m = placed(
            r#"{"assembly": {"name": "t",
                "bricks": {"1": {"type": "tile", "nx": 2, "nz": 2},
                           "2": {"type": "plate", "nx": 2, "nz": 2}},
                "parts": {"1": {"brick_id": 1, "loc": [0, 0, 0]},
                          "2": {"brick_id": 2, "loc": [0, 3.2, 0]}},
                "mesh_size": 1.0, "mu": 0.0}}"#,
            ElementFamily::Tetrahedral,
        );
        let plan = plan(&m, 1.7);
        assert!(plan.pairs.is_empty());
        assert!(!plan.needs_widening(2));
    }

    #[test]
    fn friction_property() {
        let d = ConstraintEnforcement::Default;
        assert_eq!(contact_property(0.0, d).tangential, Tangential::Frictionless);
        assert_eq!(
            contact_property(0.2, d).tangential,
            Tangential::Penalty {
                mu: 0.2,
                elastic_slip_fraction: 0.005
            }
        );
        let ix = ContactPlan {
            widen: BTreeMap::new(),
            pairs: vec![ContactPair {
                name: "cont-bt-2-1".into(),
                main: SurfaceRef::new("BRICK01-TOP", SURF_CONTACT_TOP),
                secondary: SurfaceRef::new("BRICK02-TOP", SURF_CONTACT_BOT),
            }],
        }
        .interactions("contact");
        assert_eq!(ix.len(), 1);
        assert_eq!(ix[0].name(), "cont-bt-2-1");
    }

    #[test]
    fn normal_enforcement() {
        let hard = |enforcement| NormalBehavior::Hard {
            allow_separation: true,
            enforcement,
        };
        assert_eq!(
            contact_property(0.2, ConstraintEnforcement::Default).normal,
            hard(ConstraintEnforcement::Default)
        );
        let aug = contact_property(0.2, ConstraintEnforcement::AugmentedLagrange);
        assert_eq!(aug.normal, hard(ConstraintEnforcement::AugmentedLagrange));
        assert_eq!(aug.name, CONTACT_PROPERTY);

        // Documents written before the option existed still load.
        let old: NormalBehavior =
            serde_json::from_str(r#"{"Hard": {"allow_separation": true}}"#).unwrap();
        assert_eq!(old, hard(ConstraintEnforcement::Default));
    }
}
