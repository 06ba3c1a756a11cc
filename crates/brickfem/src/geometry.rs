//! Brick dimension table and derived constants.
//!
//! All lengths are in millimeters, forces in newtons, time in seconds.

use crate::error::GeometryError;
use serde::{Deserialize, Serialize};

/// Geometric tolerance for face queries and vertical contact checks.
pub const TOL: f64 = 1e-3;

/// Cavity features of bricks with one stud row (1×n, n×1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmallCavity {
    /// Radius of the solid pins between studs.
    pub r: f64,
    /// Rib thickness (0 disables ribs).
    pub t_rib: f64,
    /// Rib height, measured down from the cavity ceiling.
    pub h_rib: f64,
}

impl Default for SmallCavity {
    fn default() -> Self {
        Self {
            r: 1.6,
            t_rib: 1.1,
            h_rib: 8.1,
        }
    }
}

/// Cavity features of bricks with at least two stud rows both ways.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BigCavity {
    /// Outer radius of the tubes.
    pub r: f64,
    /// Tube wall thickness.
    pub t: f64,
    /// Rib thickness (0 disables ribs).
    pub t_rib: f64,
    /// Rib height, measured down from the cavity ceiling.
    pub h_rib: f64,
}

impl Default for BigCavity {
    fn default() -> Self {
        Self {
            r: 3.3,
            t: 0.9,
            t_rib: 0.9,
            h_rib: 6.8,
        }
    }
}

/// Linear elastic material of the bricks (ABS by default).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialParams {
    /// Young's modulus in MPa.
    #[serde(alias = "E")]
    pub youngs_modulus: f64,
    /// Poisson ratio.
    #[serde(alias = "nu")]
    pub poisson_ratio: f64,
    /// Density in t/mm³.
    #[serde(alias = "dens")]
    pub density: f64,
}

impl Default for MaterialParams {
    fn default() -> Self {
        Self {
            youngs_modulus: 2200.0,
            poisson_ratio: 0.35,
            density: 1e-9,
        }
    }
}

/// Compact parameter set describing every brick of a run.
///
/// Missing keys in the input fall back to the defaults of a standard
/// brick system. Besides the flat keys, the grouped keys
/// `"b, b_gap, b_wall"`, `"h, h_stud, h_top"` and `"E, nu, dens"` are
/// read as three-element arrays; a flat key wins over its group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "GeometryInput")]
pub struct GeometryParams {
    /// Stud pitch.
    pub b: f64,
    /// Gap between neighboring bricks, per side.
    pub b_gap: f64,
    /// Outer wall thickness.
    pub b_wall: f64,
    /// Height of a regular brick without stud.
    pub h: f64,
    /// Stud height.
    pub h_stud: f64,
    /// Thickness of the top plate; split height below the top face.
    pub h_top: f64,
    /// Pins and ribs of single-row bricks.
    #[serde(alias = "inside small")]
    pub inside_small: SmallCavity,
    /// Tubes and ribs of multi-row bricks.
    #[serde(alias = "inside big")]
    pub inside_big: BigCavity,
    /// Stud oversize, the intended snap-fit overlap.
    pub delta_r: f64,
    /// Brick material.
    pub material: MaterialParams,
}

impl Default for GeometryParams {
    fn default() -> Self {
        Self {
            b: 8.0,
            b_gap: 0.1,
            b_wall: 1.6,
            h: 9.6,
            h_stud: 1.7,
            h_top: 1.5,
            inside_small: SmallCavity::default(),
            inside_big: BigCavity::default(),
            delta_r: 0.05,
            material: MaterialParams::default(),
        }
    }
}

/// Raw `lego_geom` table as written in input files.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GeometryInput {
    b: Option<f64>,
    b_gap: Option<f64>,
    b_wall: Option<f64>,
    #[serde(rename = "b, b_gap, b_wall")]
    plan: Option<(f64, f64, f64)>,
    h: Option<f64>,
    h_stud: Option<f64>,
    h_top: Option<f64>,
    #[serde(rename = "h, h_stud, h_top")]
    heights: Option<(f64, f64, f64)>,
    #[serde(alias = "inside small")]
    inside_small: Option<SmallCavity>,
    #[serde(alias = "inside big")]
    inside_big: Option<BigCavity>,
    delta_r: Option<f64>,
    material: Option<MaterialParams>,
    #[serde(rename = "E, nu, dens")]
    elastic: Option<(f64, f64, f64)>,
}

impl From<GeometryInput> for GeometryParams {
    fn from(input: GeometryInput) -> Self {
        let mut p = GeometryParams::default();
        if let Some((b, b_gap, b_wall)) = input.plan {
            (p.b, p.b_gap, p.b_wall) = (b, b_gap, b_wall);
        }
        if let Some((h, h_stud, h_top)) = input.heights {
            (p.h, p.h_stud, p.h_top) = (h, h_stud, h_top);
        }
        if let Some(material) = input.material {
            p.material = material;
        }
        if let Some((e, nu, dens)) = input.elastic {
            p.material = MaterialParams {
                youngs_modulus: e,
                poisson_ratio: nu,
                density: dens,
            };
        }
        p.b = input.b.unwrap_or(p.b);
        p.b_gap = input.b_gap.unwrap_or(p.b_gap);
        p.b_wall = input.b_wall.unwrap_or(p.b_wall);
        p.h = input.h.unwrap_or(p.h);
        p.h_stud = input.h_stud.unwrap_or(p.h_stud);
        p.h_top = input.h_top.unwrap_or(p.h_top);
        p.delta_r = input.delta_r.unwrap_or(p.delta_r);
        p.inside_small = input.inside_small.unwrap_or(p.inside_small);
        p.inside_big = input.inside_big.unwrap_or(p.inside_big);
        p
    }
}

/// Resolved dimension table: the parameters plus every derived constant.
#[derive(Debug, Clone, PartialEq)]
pub struct Dimensions {
    /// Source parameters.
    pub params: GeometryParams,
    /// Stud radius `b/2 - b_gap - b_wall + delta_r`.
    pub stud_radius: f64,
    /// Distance from an edge stud axis to the outer wall face.
    pub half_width: f64,
    /// Distance from an edge stud axis to the inner wall face.
    pub cavity_half_width: f64,
    /// Inner radius of the tubes.
    pub tube_inner_radius: f64,
    /// Distance from a stud axis to the nearest tube surface.
    pub tube_clearance: f64,
    /// Distance from a stud axis to the nearest pin surface.
    pub pin_clearance: f64,
    /// Half chord where a small rib meets its pin.
    pub small_rib_reach: f64,
    /// Half chord where a big rib meets its tube.
    pub big_rib_reach: f64,
}

impl GeometryParams {
    /// Stud radius `R = b/2 - b_gap - b_wall + delta_r`.
    pub fn stud_radius(&self) -> f64 {
        self.b / 2.0 - self.b_gap - self.b_wall + self.delta_r
    }

    /// Check the parameters without keeping the derived table.
    pub fn validate(&self) -> Result<(), GeometryError> {
        self.derive().map(|_| ())
    }

    /// Resolve all derived dimensions.
    ///
    /// Fails if any length, radius or thickness is not strictly positive,
    /// or if a tube or pin would sit within stud radius of a stud axis.
    pub fn derive(&self) -> Result<Dimensions, GeometryError> {
        let s = &self.inside_small;
        let g = &self.inside_big;
        let m = &self.material;

        for (name, value) in [
            ("b", self.b),
            ("b_wall", self.b_wall),
            ("h", self.h),
            ("h_stud", self.h_stud),
            ("h_top", self.h_top),
            ("inside_small.r", s.r),
            ("inside_big.r", g.r),
            ("inside_big.t", g.t),
            ("youngs_modulus", m.youngs_modulus),
            ("density", m.density),
        ] {
            positive(name, value)?;
        }
        for (name, value) in [
            ("b_gap", self.b_gap),
            ("inside_small.t_rib", s.t_rib),
            ("inside_small.h_rib", s.h_rib),
            ("inside_big.t_rib", g.t_rib),
            ("inside_big.h_rib", g.h_rib),
        ] {
            non_negative(name, value)?;
        }
        if !self.delta_r.is_finite() {
            return Err(GeometryError::NonFinite("delta_r"));
        }
        if !(m.poisson_ratio > -1.0 && m.poisson_ratio < 0.5) {
            return Err(GeometryError::PoissonRatio(m.poisson_ratio));
        }

        let stud_radius = self.stud_radius();
        positive("stud radius", stud_radius)?;
        let half_width = self.b / 2.0 - self.b_gap;
        let cavity_half_width = half_width - self.b_wall;
        positive("cavity half width", cavity_half_width)?;
        positive("plate split height h/3 - h_top", self.h / 3.0 - self.h_top)?;
        let tube_inner_radius = g.r - g.t;
        positive("tube inner radius", tube_inner_radius)?;
        let small_rib_reach = rib_reach("small rib reach", s.r, s.t_rib)?;
        let big_rib_reach = rib_reach("big rib reach", g.r, g.t_rib)?;

        let tube_clearance = self.b / std::f64::consts::SQRT_2 - g.r;
        if tube_clearance <= stud_radius {
            return Err(GeometryError::NegativeClearance {
                feature: "tube",
                clearance: tube_clearance,
                stud_radius,
            });
        }
        let pin_clearance = self.b / 2.0 - s.r;
        if pin_clearance <= stud_radius {
            return Err(GeometryError::NegativeClearance {
                feature: "pin",
                clearance: pin_clearance,
                stud_radius,
            });
        }

        Ok(Dimensions {
            params: self.clone(),
            stud_radius,
            half_width,
            cavity_half_width,
            tube_inner_radius,
            tube_clearance,
            pin_clearance,
            small_rib_reach,
            big_rib_reach,
        })
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), GeometryError> {
    if !value.is_finite() {
        return Err(GeometryError::NonFinite(name));
    }
    if value <= 0.0 {
        return Err(GeometryError::NonPositive { name, value });
    }
    Ok(())
}

fn non_negative(name: &'static str, value: f64) -> Result<(), GeometryError> {
    if !value.is_finite() {
        return Err(GeometryError::NonFinite(name));
    }
    if value < 0.0 {
        return Err(GeometryError::Negative { name, value });
    }
    Ok(())
}

/// Half chord `sqrt(r² - t²/4)` where a rib of thickness `t` meets a circle of radius `r`.
fn rib_reach(name: &'static str, r: f64, t_rib: f64) -> Result<f64, GeometryError> {
    let sq = r * r - t_rib * t_rib / 4.0;
    positive(name, sq)?;
    Ok(sq.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_table() {
        let d = GeometryParams::default().derive().unwrap();
        assert_relative_eq!(d.stud_radius, 2.35, epsilon = 1e-12);
        assert_relative_eq!(d.half_width, 3.9, epsilon = 1e-12);
        assert_relative_eq!(d.cavity_half_width, 2.3, epsilon = 1e-12);
        assert_relative_eq!(d.tube_inner_radius, 2.4, epsilon = 1e-12);
        assert_relative_eq!(d.pin_clearance, 2.4, epsilon = 1e-12);
        assert_relative_eq!(d.tube_clearance, 8.0 / 2f64.sqrt() - 3.3, epsilon = 1e-12);
        assert_relative_eq!(d.big_rib_reach, (3.3f64 * 3.3 - 0.2025).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn stud_radius_below_cavity_clearances() {
        let d = GeometryParams::default().derive().unwrap();
        assert!(d.stud_radius > 0.0);
        assert!(d.stud_radius < d.tube_clearance);
        assert!(d.stud_radius < d.pin_clearance);
        // The wall overlap is exactly the stud oversize.
        assert_relative_eq!(d.stud_radius - d.cavity_half_width, 0.05, epsilon = 1e-12);
    }

    #[test]
    fn non_positive_stud_radius_rejected() {
        let p = GeometryParams {
            b_wall: 3.9,
            delta_r: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            p.validate(),
            Err(GeometryError::NonPositive { name: "stud radius", .. })
        ));
    }

    #[test]
    fn oversized_tube_rejected() {
        let mut p = GeometryParams::default();
        p.inside_big.r = 3.5;
        assert!(matches!(
            p.validate(),
            Err(GeometryError::NegativeClearance { feature: "tube", .. })
        ));
    }

    #[test]
    fn oversized_pin_rejected() {
        let mut p = GeometryParams::default();
        p.inside_small.r = 1.7;
        assert!(matches!(
            p.validate(),
            Err(GeometryError::NegativeClearance { feature: "pin", .. })
        ));
    }

    #[test]
    fn nan_and_negative_inputs_rejected() {
        let p = GeometryParams {
            h: f64::NAN,
            ..Default::default()
        };
        assert_eq!(p.validate(), Err(GeometryError::NonFinite("h")));

        let mut p = GeometryParams::default();
        p.inside_big.t_rib = -0.1;
        assert!(matches!(p.validate(), Err(GeometryError::Negative { .. })));

        let mut p = GeometryParams::default();
        p.material.poisson_ratio = 0.5;
        assert_eq!(p.validate(), Err(GeometryError::PoissonRatio(0.5)));
    }

    #[test]
    fn zero_rib_thickness_is_valid() {
        let mut p = GeometryParams::default();
        p.inside_small.t_rib = 0.0;
        p.inside_big.t_rib = 0.0;
        let d = p.derive().unwrap();
        assert_relative_eq!(d.small_rib_reach, 1.6, epsilon = 1e-12);
    }

    #[test]
    fn partial_input_uses_defaults() {
        let p: GeometryParams =
            serde_json::from_str(r#"{"delta_r": 0.0, "inside_big": {"t_rib": 0.0}}"#).unwrap();
        assert_eq!(p.delta_r, 0.0);
        assert_eq!(p.inside_big.t_rib, 0.0);
        assert_eq!(p.inside_big.r, 3.3);
        assert_eq!(p.b, 8.0);

        let p: GeometryParams =
            serde_json::from_str(r#"{"material": {"E": 1800.0}}"#).unwrap();
        assert_eq!(p.material.youngs_modulus, 1800.0);
        assert_eq!(p.material.density, 1e-9);
    }

    #[test]
    fn grouped_keys() {
        let p: GeometryParams = serde_json::from_str(
            r#"{"b, b_gap, b_wall": [8.0, 0.1, 1.6],
                "h, h_stud, h_top": [9.6, 1.8, 1.4],
                "inside small": {"r": 1.6, "t_rib": 1.1, "h_rib": 8.1},
                "inside big": {"r": 3.3, "t": 0.9, "t_rib": 0.0, "h_rib": 6.8},
                "delta_r": 0.04,
                "E, nu, dens": [1800.0, 0.3, 1.05e-9]}"#,
        )
        .unwrap();
        assert_eq!((p.h, p.h_stud, p.h_top), (9.6, 1.8, 1.4));
        assert_eq!(p.inside_big.t_rib, 0.0);
        assert_eq!(p.delta_r, 0.04);
        assert_eq!(
            p.material,
            MaterialParams {
                youngs_modulus: 1800.0,
                poisson_ratio: 0.3,
                density: 1.05e-9,
            }
        );

        // A flat key overrides its group.
        let p: GeometryParams =
            serde_json::from_str(r#"{"b, b_gap, b_wall": [8.0, 0.2, 1.5], "b_wall": 1.2}"#).unwrap();
        assert_eq!((p.b, p.b_gap, p.b_wall), (8.0, 0.2, 1.2));

        // The stored flat form reads back unchanged.
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(serde_json::from_str::<GeometryParams>(&json).unwrap(), p);
    }
}
