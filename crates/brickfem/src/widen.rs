//! Cavity widening: prescribed radial displacements that push cavity nodes
//! out of the studs they initially overlap.

use crate::brick::SET_CAVITY_TOUCH;
use crate::contact::ContactPlan;
use crate::error::SolverError;
use crate::geometry::Dimensions;
use crate::placement::PlacedModel;
use crate::solver::{MeshNode, Solver};
use brickfem_ir::{BcKind, BoundaryCondition, DofValue, Region};
use nalgebra::{Vector2, Vector3};
use std::collections::btree_map::{BTreeMap, Entry};
use std::path::Path;
use tracing::debug;

/// Prescribed displacement of one mesh node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeDisplacement {
    /// Node label.
    pub label: u64,
    /// Displacement, always horizontal.
    pub u: Vector3<f64>,
}

/// Displacements that move every node inside a stud back onto its
/// cylinder.
///
/// A node qualifies when its distance `r` to a stud axis is below
/// `stud_radius` and its height is at most `h_stud + mesh_size / 2`; it moves
/// radially outward by `stud_radius - r`. Nodes on an axis have no radial
/// direction and are left alone.
pub fn radial_displacements(
    nodes: &[MeshNode],
    axes: &[[f64; 2]],
    stud_radius: f64,
    h_stud: f64,
    mesh_size: f64,
) -> Vec<NodeDisplacement> {
    let reach = h_stud + mesh_size / 2.0;
    let mut out = Vec::new();
    for &[x0, z0] in axes {
        for node in nodes {
            let p = node.position;
            if p.y > reach {
                continue;
            }
            let d = Vector2::new(p.x - x0, p.z - z0);
            let r = d.norm();
            if r >= stud_radius || r == 0.0 {
                continue;
            }
            let push = d * ((stud_radius - r) / r);
            out.push(NodeDisplacement {
                label: node.label,
                u: Vector3::new(push.x, 0.0, push.y),
            });
        }
    }
    out
}

/// Boundary condition name of a widened node.
pub fn condition_name(part_id: u32, label: u64) -> String {
    format!("u0-inst{part_id}n{label}")
}

/// Widening conditions for every brick with an engaged cavity, created in
/// `created_in` and released in `released_in`.
///
/// Each cavity part is meshed once, however many instances share it.
pub fn widen_conditions<S: Solver + ?Sized>(
    solver: &mut S,
    model: &PlacedModel,
    plan: &ContactPlan,
    dims: &Dimensions,
    workdir: &Path,
    created_in: &str,
    released_in: &str,
) -> Result<Vec<BoundaryCondition>, SolverError> {
    let p = &dims.params;
    let mut meshed: BTreeMap<String, Vec<MeshNode>> = BTreeMap::new();
    let mut out = Vec::new();

    for (&id, placed) in &model.placed {
        if !plan.needs_widening(id) {
            continue;
        }
        let piece = placed.bottom();
        let Some(part) = model
            .parts
            .get(&piece.part)
            .filter(|part| part.sets.contains_key(SET_CAVITY_TOUCH))
        else {
            debug!(part_id = id, part = %piece.part, "no cavity set to widen");
            continue;
        };
        let nodes = match meshed.entry(part.name.clone()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                e.insert(solver.mesh_set_nodes(part, model.mesh_size, SET_CAVITY_TOUCH, workdir)?)
            }
        };

        let axes: Vec<[f64; 2]> = placed
            .brick
            .stud_axes(p.b)
            .into_iter()
            .map(|(_, axis)| axis)
            .collect();
        let moves = radial_displacements(nodes, &axes, dims.stud_radius, p.h_stud, model.mesh_size);
        debug!(part_id = id, nodes = moves.len(), "widening cavity");

        out.extend(moves.into_iter().map(|m| BoundaryCondition {
            name: condition_name(id, m.label),
            kind: BcKind::Displacement,
            region: Region::Node {
                instance: piece.instance.clone(),
                label: m.label,
            },
            created_in: created_in.to_string(),
            values: [
                DofValue::Value(m.u.x),
                DofValue::Value(0.0),
                DofValue::Value(m.u.z),
                DofValue::Unset,
                DofValue::Unset,
                DofValue::Unset,
            ],
            changes: Vec::new(),
            deactivated_in: Some(released_in.to_string()),
        }));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::ModelInput;
    use crate::brick::MeshSpec;
    use crate::contact;
    use crate::placement::{build_solids, place};
    use approx::assert_relative_eq;
    use brickfem_ir::{ElementFamily, ModelDocument, PartDef, Vec3};
    use crate::solver::JobReport;

    fn node(label: u64, x: f64, y: f64, z: f64) -> MeshNode {
        MeshNode {
            label,
            position: Vec3::new(x, y, z),
        }
    }

    #[test]
    fn only_overlapping_nodes_move() {
        let nodes = [
            node(1, 2.0, 0.0, 0.0),  // inside, r = 2
            node(2, 0.0, 1.0, -1.5), // inside, r = 1.5
            node(3, 2.5, 0.0, 0.0),  // outside the stud
            node(4, 2.0, 3.0, 0.0),  // above the engagement height
            node(5, 0.0, 0.0, 0.0),  // on the axis
            node(6, 9.0, 0.5, 0.0),  // second stud
        ];
        let moves = radial_displacements(&nodes, &[[0.0, 0.0], [8.0, 0.0]], 2.45, 1.7, 1.0);
        let labels: Vec<u64> = moves.iter().map(|m| m.label).collect();
        assert_eq!(labels, vec![1, 2, 6]);
        assert_relative_eq!(moves[0].u.x, 0.45, epsilon = 1e-12);
        assert_relative_eq!(moves[1].u.z, -0.95, epsilon = 1e-12);
        assert_relative_eq!(moves[2].u.x, 1.45, epsilon = 1e-12);
        assert!(moves.iter().all(|m| m.u.y == 0.0));
        // Moved nodes land on the stud cylinder.
        let moved = Vector2::new(0.0 + moves[1].u.x, -1.5 + moves[1].u.z);
        assert_relative_eq!(moved.norm(), 2.45, epsilon = 1e-12);
    }

    #[test]
    fn engagement_height_includes_half_an_element() {
        let nodes = [node(1, 1.0, 2.15, 0.0), node(2, 1.0, 2.25, 0.0)];
        let moves = radial_displacements(&nodes, &[[0.0, 0.0]], 2.45, 1.7, 1.0);
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].label, 1);
    }

    /// Returns a fixed node list and counts mesh requests.
    struct FixedNodes {
        nodes: Vec<MeshNode>,
        meshed: Vec<String>,
    }

    impl Solver for FixedNodes {
        fn mesh_set_nodes(
            &mut self,
            part: &PartDef,
            _mesh_size: f64,
            set: &str,
            _workdir: &Path,
        ) -> Result<Vec<MeshNode>, SolverError> {
            assert_eq!(set, SET_CAVITY_TOUCH);
            self.meshed.push(part.name.clone());
            Ok(self.nodes.clone())
        }

        fn run(&mut self, _doc: &ModelDocument, _workdir: &Path) -> Result<JobReport, SolverError> {
            unreachable!("widening never runs jobs")
        }
    }

    #[test]
    fn conditions_for_stacked_bricks() {
        let spec = ModelInput::from_json(
            r#"{"assembly": {"name": "stack",
                "bricks": {"1": {"type": "regular", "nx": 2, "nz": 2}},
                "parts": {"1": {"brick_id": 1, "loc": [0, 0, 0]},
                          "2": {"brick_id": 1, "loc": [0, 9.6, 0]},
                          "3": {"brick_id": 1, "loc": [0, 19.2, 0]}},
                "mesh_size": 1.0, "mu": 0.2}}"#,
        )
        .unwrap()
        .validate()
        .unwrap();
        let mesh = MeshSpec {
            size: 1.0,
            family: ElementFamily::HexReduced,
        };
        let solids = build_solids(&spec.assembly, &spec.dims, &mesh).unwrap();
        let model = place(&spec.assembly, &spec.dims, &solids).unwrap();
        let plan = contact::plan(&model, spec.dims.params.h_stud);

        let mut solver = FixedNodes {
            nodes: vec![node(7, 1.0, 0.5, 0.0), node(8, 4.0, 0.5, 4.0)],
            meshed: Vec::new(),
        };
        let dir = tempfile::tempdir().unwrap();
        let bcs = widen_conditions(&mut solver, &model, &plan, &spec.dims, dir.path(), "widen", "contact")
            .unwrap();

        // Both upper bricks share one cavity part.
        assert_eq!(solver.meshed.len(), 1);
        let names: Vec<&str> = bcs.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["u0-inst2n7", "u0-inst3n7"]);
        let bc = &bcs[0];
        assert_eq!(
            bc.region,
            Region::Node {
                instance: "BRICK02-BOT".to_string(),
                label: 7
            }
        );
        assert_eq!(bc.deactivated_in.as_deref(), Some("contact"));
        match bc.values[0] {
            DofValue::Value(ux) => assert_relative_eq!(ux, spec.dims.stud_radius - 1.0, epsilon = 1e-12),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(bc.values[1], DofValue::Value(0.0));
        assert_eq!(bc.values[3], DofValue::Unset);
    }
}
