//! Parametric base shapes and the device-to-shape mapping.
//!
//! Each variant corresponds to a ShapeKernel class. Parameters are mm and are
//! always clamped into the range the kernel accepts before code is emitted.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::rules::rules_for;
use crate::spec::{DesignSpecification, DeviceType};

/// Parameter ranges as (min, max), mm.
pub mod ranges {
    pub const BOX_SIDE: (f64, f64) = (1.0, 1000.0);
    pub const SPHERE_RADIUS: (f64, f64) = (1.0, 500.0);
    pub const CYLINDER_RADIUS: (f64, f64) = (0.5, 200.0);
    pub const CYLINDER_HEIGHT: (f64, f64) = (1.0, 500.0);
    pub const PIPE_OUTER: (f64, f64) = (2.0, 200.0);
    pub const PIPE_INNER: (f64, f64) = (0.5, 199.0);
    pub const PIPE_LENGTH: (f64, f64) = (1.0, 1000.0);
    pub const LENS_RADIUS: (f64, f64) = (5.0, 200.0);
    pub const LENS_THICKNESS: (f64, f64) = (1.0, 100.0);
    pub const RING_MAJOR: (f64, f64) = (5.0, 200.0);
    pub const RING_MINOR: (f64, f64) = (1.0, 50.0);
}

fn clamp(v: f64, (lo, hi): (f64, f64)) -> f64 {
    if v.is_nan() { lo } else { v.clamp(lo, hi) }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum BaseShape {
    Box {
        length: f64,
        width: f64,
        height: f64,
    },
    Sphere {
        radius: f64,
    },
    Cylinder {
        radius: f64,
        height: f64,
    },
    Pipe {
        outer_radius: f64,
        inner_radius: f64,
        length: f64,
    },
    Lens {
        radius: f64,
        thickness: f64,
    },
    Ring {
        major_radius: f64,
        minor_radius: f64,
    },
}

impl BaseShape {
    /// ShapeKernel class name.
    pub fn kernel_class(&self) -> &'static str {
        match self {
            BaseShape::Box { .. } => "BaseBox",
            BaseShape::Sphere { .. } => "BaseSphere",
            BaseShape::Cylinder { .. } => "BaseCylinder",
            BaseShape::Pipe { .. } => "BasePipe",
            BaseShape::Lens { .. } => "BaseLens",
            BaseShape::Ring { .. } => "BaseRing",
        }
    }

    /// Surfaces with no flat faces get conformal lattices.
    pub fn is_curved(&self) -> bool {
        matches!(
            self,
            BaseShape::Sphere { .. } | BaseShape::Lens { .. } | BaseShape::Ring { .. }
        )
    }

    /// Copy with every parameter forced into its valid range.
    pub fn clamped(self) -> Self {
        use ranges::*;
        match self {
            BaseShape::Box { length, width, height } => BaseShape::Box {
                length: clamp(length, BOX_SIDE),
                width: clamp(width, BOX_SIDE),
                height: clamp(height, BOX_SIDE),
            },
            BaseShape::Sphere { radius } => BaseShape::Sphere {
                radius: clamp(radius, SPHERE_RADIUS),
            },
            BaseShape::Cylinder { radius, height } => BaseShape::Cylinder {
                radius: clamp(radius, CYLINDER_RADIUS),
                height: clamp(height, CYLINDER_HEIGHT),
            },
            BaseShape::Pipe { outer_radius, inner_radius, length } => {
                let outer = clamp(outer_radius, PIPE_OUTER);
                let inner = clamp(inner_radius, PIPE_INNER).min(outer - PIPE_INNER.0);
                BaseShape::Pipe {
                    outer_radius: outer,
                    inner_radius: inner.max(PIPE_INNER.0),
                    length: clamp(length, PIPE_LENGTH),
                }
            }
            BaseShape::Lens { radius, thickness } => BaseShape::Lens {
                radius: clamp(radius, LENS_RADIUS),
                thickness: clamp(thickness, LENS_THICKNESS),
            },
            BaseShape::Ring { major_radius, minor_radius } => {
                let major = clamp(major_radius, RING_MAJOR);
                BaseShape::Ring {
                    major_radius: major,
                    minor_radius: clamp(minor_radius, RING_MINOR).min(major),
                }
            }
        }
    }

    /// Solid volume, mm³.
    pub fn volume_mm3(&self) -> f64 {
        match *self {
            BaseShape::Box { length, width, height } => length * width * height,
            BaseShape::Sphere { radius } => 4.0 / 3.0 * PI * radius.powi(3),
            BaseShape::Cylinder { radius, height } => PI * radius * radius * height,
            BaseShape::Pipe { outer_radius, inner_radius, length } => {
                PI * (outer_radius.powi(2) - inner_radius.powi(2)) * length
            }
            // Biconvex approximation: two spherical caps of half the thickness.
            BaseShape::Lens { radius, thickness } => {
                let h = thickness / 2.0;
                2.0 * PI * h / 6.0 * (3.0 * radius * radius + h * h)
            }
            BaseShape::Ring { major_radius, minor_radius } => {
                2.0 * PI * PI * major_radius * minor_radius * minor_radius
            }
        }
    }

    /// Smallest outer extent, mm. Drives lattice cell sizing.
    pub fn min_extent(&self) -> f64 {
        match *self {
            BaseShape::Box { length, width, height } => length.min(width).min(height),
            BaseShape::Sphere { radius } => 2.0 * radius,
            BaseShape::Cylinder { radius, height } => (2.0 * radius).min(height),
            BaseShape::Pipe { outer_radius, length, .. } => (2.0 * outer_radius).min(length),
            BaseShape::Lens { thickness, .. } => thickness,
            BaseShape::Ring { minor_radius, .. } => 2.0 * minor_radius,
        }
    }

    /// Named parameters in constructor order.
    pub fn parameters(&self) -> Vec<(&'static str, f64)> {
        match *self {
            BaseShape::Box { length, width, height } => {
                vec![("length", length), ("width", width), ("height", height)]
            }
            BaseShape::Sphere { radius } => vec![("radius", radius)],
            BaseShape::Cylinder { radius, height } => vec![("radius", radius), ("height", height)],
            BaseShape::Pipe { outer_radius, inner_radius, length } => vec![
                ("outer_radius", outer_radius),
                ("inner_radius", inner_radius),
                ("length", length),
            ],
            BaseShape::Lens { radius, thickness } => {
                vec![("radius", radius), ("thickness", thickness)]
            }
            BaseShape::Ring { major_radius, minor_radius } => {
                vec![("major_radius", major_radius), ("minor_radius", minor_radius)]
            }
        }
    }
}

/// One named body of a design.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapePart {
    pub role: String,
    #[serde(flatten)]
    pub shape: BaseShape,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeRecommendation {
    /// The main body; lattice infill applies to this part.
    pub primary: ShapePart,
    pub secondary: Vec<ShapePart>,
    pub rationale: String,
}

impl ShapeRecommendation {
    pub fn parts(&self) -> impl Iterator<Item = &ShapePart> {
        std::iter::once(&self.primary).chain(self.secondary.iter())
    }

    pub fn total_volume_mm3(&self) -> f64 {
        self.parts().map(|p| p.shape.volume_mm3()).sum()
    }
}

fn part(role: &str, shape: BaseShape) -> ShapePart {
    ShapePart {
        role: role.to_string(),
        shape: shape.clamped(),
    }
}

/// Pick base shapes for a device from its dimensions.
pub fn recommend_shape(spec: &DesignSpecification) -> ShapeRecommendation {
    let d = &spec.dimensions;
    let min_wall = rules_for(spec.manufacturing_method()).min_wall_thickness_mm();
    match spec.device_type {
        DeviceType::RobotArm => {
            let reach = d.reach_mm.or(d.length_mm).unwrap_or(300.0);
            let outer = d.diameter_mm.unwrap_or(reach / 10.0) / 2.0;
            let wall = spec.wall_thickness_mm().unwrap_or(3.0).max(min_wall);
            let dof = spec.motion.dof.unwrap_or(3).max(1);
            let link_len = reach / f64::from(dof);
            ShapeRecommendation {
                primary: part(
                    "link",
                    BaseShape::Pipe {
                        outer_radius: outer,
                        inner_radius: (outer - wall).max(0.0),
                        length: link_len,
                    },
                ),
                secondary: vec![part("joint", BaseShape::Sphere { radius: outer + 2.0 })],
                rationale: format!(
                    "hollow pipe links ({dof} × {link_len:.0} mm) keep bending stiffness per gram high"
                ),
            }
        }
        DeviceType::Gripper => {
            let length = d.length_mm.unwrap_or(50.0);
            let jaw = d.jaw_width_mm.unwrap_or(30.0);
            let thickness = d.height_mm.unwrap_or(5.0).max(min_wall);
            ShapeRecommendation {
                primary: part(
                    "jaw",
                    BaseShape::Box {
                        length,
                        width: d.width_mm.unwrap_or(jaw / 2.0),
                        height: thickness,
                    },
                ),
                secondary: vec![part(
                    "palm",
                    BaseShape::Box {
                        length: jaw + 2.0 * thickness,
                        width: jaw,
                        height: thickness * 2.0,
                    },
                )],
                rationale: "flat box jaws give simple parallel contact faces".into(),
            }
        }
        DeviceType::LinearActuator => {
            let length = d.length_mm.unwrap_or(300.0);
            let width = d.width_mm.unwrap_or(40.0);
            let height = d.height_mm.unwrap_or(40.0);
            ShapeRecommendation {
                primary: part("rail", BaseShape::Box { length, width, height }),
                secondary: vec![part(
                    "rod",
                    BaseShape::Cylinder {
                        radius: d.diameter_mm.map_or(4.0, |v| v / 2.0),
                        height: d.stroke_mm.unwrap_or(length),
                    },
                )],
                rationale: "box rail for the carriage with a cylindrical guide rod".into(),
            }
        }
        DeviceType::PanTilt => {
            let width = d.width_mm.unwrap_or(60.0);
            let height = d.height_mm.unwrap_or(80.0);
            ShapeRecommendation {
                primary: part(
                    "base",
                    BaseShape::Cylinder {
                        radius: width / 2.0,
                        height: height / 2.0,
                    },
                ),
                secondary: vec![part("head", BaseShape::Sphere { radius: width / 3.0 })],
                rationale: "cylindrical pan base under a spherical tilt head".into(),
            }
        }
        DeviceType::Custom => ShapeRecommendation {
            primary: part(
                "body",
                BaseShape::Box {
                    length: d.length_mm.unwrap_or(100.0),
                    width: d.width_mm.unwrap_or(50.0),
                    height: d.height_mm.unwrap_or(30.0),
                },
            ),
            secondary: Vec::new(),
            rationale: "bounding box of the stated dimensions".into(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::ManufacturingMethod;
    use approx::assert_relative_eq;

    #[test]
    fn test_device_mapping() {
        let kinds: Vec<_> = DeviceType::ALL
            .iter()
            .map(|d| recommend_shape(&DesignSpecification::new(*d)).primary.shape.kernel_class())
            .collect();
        assert_eq!(kinds, ["BasePipe", "BaseBox", "BaseBox", "BaseCylinder", "BaseBox"]);
    }

    #[test]
    fn test_arm_pipe_wall_respects_process_minimum() {
        let mut spec = DesignSpecification::new(DeviceType::RobotArm);
        spec.dimensions.reach_mm = Some(400.0);
        spec.manufacturing = Some(ManufacturingMethod::Cnc);
        spec.requirements_mut().wall_thickness_mm = Some(0.2);
        let rec = recommend_shape(&spec);
        let BaseShape::Pipe { outer_radius, inner_radius, .. } = rec.primary.shape else {
            panic!("expected pipe");
        };
        assert_relative_eq!(outer_radius, 20.0);
        assert!(outer_radius - inner_radius >= 1.0 - 1e-9);
    }

    #[test]
    fn test_clamping() {
        let s = BaseShape::Box { length: 5000.0, width: 0.1, height: 10.0 }.clamped();
        assert_eq!(s, BaseShape::Box { length: 1000.0, width: 1.0, height: 10.0 });
        let p = BaseShape::Pipe { outer_radius: 3.0, inner_radius: 10.0, length: 50.0 }.clamped();
        let BaseShape::Pipe { outer_radius, inner_radius, .. } = p else { unreachable!() };
        assert!(inner_radius < outer_radius);
        let r = BaseShape::Ring { major_radius: 1.0, minor_radius: 80.0 }.clamped();
        assert_eq!(r, BaseShape::Ring { major_radius: 5.0, minor_radius: 5.0 });
    }

    #[test]
    fn test_volumes() {
        assert_relative_eq!(BaseShape::Box { length: 2.0, width: 3.0, height: 4.0 }.volume_mm3(), 24.0);
        assert_relative_eq!(
            BaseShape::Sphere { radius: 1.0 }.volume_mm3(),
            4.0 / 3.0 * PI,
            epsilon = 1e-12
        );
        let pipe = BaseShape::Pipe { outer_radius: 2.0, inner_radius: 1.0, length: 1.0 };
        assert_relative_eq!(pipe.volume_mm3(), 3.0 * PI, epsilon = 1e-12);
    }

    #[test]
    fn test_serde_tagging() {
        let json = serde_json::to_value(BaseShape::Sphere { radius: 4.0 }).unwrap();
        assert_eq!(json["shape"], "sphere");
        assert_eq!(json["radius"], 4.0);
    }

    #[test]
    fn test_total_volume_sums_parts() {
        let rec = recommend_shape(&DesignSpecification::new(DeviceType::PanTilt));
        let sum: f64 = rec.parts().map(|p| p.shape.volume_mm3()).sum();
        assert_relative_eq!(rec.total_volume_mm3(), sum);
        assert_eq!(rec.secondary.len(), 1);
    }
}
