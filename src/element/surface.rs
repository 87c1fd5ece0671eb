use crate::math::Rad;

/// Which two element-local axes span the cutout of a surface.
///
/// Mirrors and gratings live in the x-z plane (surface normal along y),
/// slits and image planes live in the x-y plane (surface normal along z).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaneDir {
	Xy,
	Xz,
}

pub const STYPE_QUADRIC: u32 = 0;
pub const STYPE_TOROID: u32 = 1;
pub const STYPE_PLANE_XY: u32 = 2;
pub const STYPE_PLANE_XZ: u32 = 3;
pub const STYPE_CUBIC: u32 = 4;

/// A potentially infinite curved surface in element-local space. Elements
/// combine a surface with a finite [`Cutout`](super::cutout::Cutout).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Surface {
	/// The infinite x-y plane, used by slits and image planes.
	PlaneXy,
	/// The infinite x-z plane, used by plane mirrors and gratings.
	PlaneXz,
	Quadric(QuadricSurface),
	Toroid(ToroidSurface),
	Cubic(CubicSurface),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuadricSurface {
	/// Selects the intersection branch, +1 or -1.
	pub icurv: i8,
	pub a11: f64,
	pub a12: f64,
	pub a13: f64,
	pub a14: f64,
	pub a22: f64,
	pub a23: f64,
	pub a24: f64,
	pub a33: f64,
	pub a34: f64,
	pub a44: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToroidKind {
	Convex,
	Concave,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ToroidSurface {
	pub long_radius: f64,
	pub short_radius: f64,
	pub kind: ToroidKind,
}

/// A quadric with additional third-order coefficients and an in-plane
/// rotation `psi` of the surface frame. `b_ij` is the coefficient of the
/// monomial `x_i² x_j` with (1, 2, 3) = (x, y, z).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CubicSurface {
	pub quadric: QuadricSurface,
	pub b12: f64,
	pub b21: f64,
	pub b23: f64,
	pub b32: f64,
	pub psi: Rad,
}

impl Surface {
	pub fn plane_dir(&self) -> PlaneDir {
		match self {
			Surface::PlaneXy => PlaneDir::Xy,
			_ => PlaneDir::Xz,
		}
	}

	/// Serializes to the fixed shader layout: one tag followed by up to 16
	/// payload values. Integer tags are encoded as f32 for uniform shader
	/// consumption.
	pub fn serialize(&self) -> [f32; 17] {
		let mut ser = [0.0f32; 17];
		match self {
			Surface::PlaneXy => {
				ser[0] = STYPE_PLANE_XY as f32;
			}
			Surface::PlaneXz => {
				ser[0] = STYPE_PLANE_XZ as f32;
			}
			Surface::Quadric(q) => {
				ser[0] = STYPE_QUADRIC as f32;
				q.write_params(&mut ser[1..12]);
			}
			Surface::Toroid(t) => {
				ser[0] = STYPE_TOROID as f32;
				ser[1] = t.long_radius as f32;
				ser[2] = t.short_radius as f32;
				ser[3] = match t.kind {
					ToroidKind::Convex => 0.0,
					ToroidKind::Concave => 1.0,
				};
			}
			Surface::Cubic(c) => {
				ser[0] = STYPE_CUBIC as f32;
				c.quadric.write_params(&mut ser[1..12]);
				ser[12] = c.b12 as f32;
				ser[13] = c.b21 as f32;
				ser[14] = c.b23 as f32;
				ser[15] = c.b32 as f32;
				ser[16] = c.psi.0 as f32;
			}
		}
		ser
	}
}

impl QuadricSurface {
	fn write_params(&self, out: &mut [f32]) {
		out[0] = self.icurv as f32;
		out[1] = self.a11 as f32;
		out[2] = self.a12 as f32;
		out[3] = self.a13 as f32;
		out[4] = self.a14 as f32;
		out[5] = self.a22 as f32;
		out[6] = self.a23 as f32;
		out[7] = self.a24 as f32;
		out[8] = self.a33 as f32;
		out[9] = self.a34 as f32;
		out[10] = self.a44 as f32;
	}

	/// Evaluates the quadric form `pᵀ A p` at a point.
	pub fn eval(&self, x: f64, y: f64, z: f64) -> f64 {
		self.a11 * x * x + self.a22 * y * y + self.a33 * z * z
			+ 2.0 * (self.a12 * x * y + self.a13 * x * z + self.a23 * y * z)
			+ 2.0 * (self.a14 * x + self.a24 * y + self.a34 * z)
			+ self.a44
	}

	pub fn is_finite(&self) -> bool {
		[self.a11, self.a12, self.a13, self.a14, self.a22, self.a23, self.a24, self.a33, self.a34, self.a44]
			.iter()
			.all(|a| a.is_finite())
	}
}

/// A sphere of the given radius, tangent to the origin.
pub fn make_sphere(radius: f64) -> Surface {
	Surface::Quadric(QuadricSurface {
		icurv: 1,
		a11: 1.0,
		a12: 0.0,
		a13: 0.0,
		a14: 0.0,
		a22: 1.0,
		a23: 0.0,
		a24: -radius,
		a33: 1.0,
		a34: 0.0,
		a44: 0.0,
	})
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CylinderDirection {
	LongRadius,
	ShortRadius,
}

/// A cylinder bent along either the long (meridional) or short (sagittal)
/// direction. A zero radius is derived from the arm lengths and grazing
/// incidence the way the legacy design tooling does.
pub fn make_cylinder(
	direction: CylinderDirection,
	mut radius: f64,
	incidence: Rad,
	entrance_arm: f64,
	exit_arm: f64,
) -> Surface {
	let (a11, a33) = match direction {
		CylinderDirection::LongRadius => (0.0, 1.0),
		CylinderDirection::ShortRadius => (1.0, 0.0),
	};

	if radius == 0.0 {
		radius = match direction {
			CylinderDirection::LongRadius => {
				2.0 / incidence.sin() / (1.0 / entrance_arm + 1.0 / exit_arm)
			}
			CylinderDirection::ShortRadius => {
				if entrance_arm == 0.0 || exit_arm == 0.0 || incidence.0 == 0.0 {
					0.0
				} else {
					2.0 * incidence.sin() / (1.0 / entrance_arm + 1.0 / exit_arm)
				}
			}
		};
	}

	let a24 = -radius;
	let icurv = if a24 > 0.0 { -1 } else { 1 };

	Surface::Quadric(QuadricSurface {
		icurv,
		a11,
		a12: 0.0,
		a13: 0.0,
		a14: 0.0,
		a22: 1.0,
		a23: 0.0,
		a24,
		a33,
		a34: 0.0,
		a44: 0.0,
	})
}

/// An ellipsoid defined by its half axes, with the surface frame placed at
/// the design incidence point.
pub fn make_ellipsoid(
	long_half_axis: f64,
	short_half_axis: f64,
	design_grazing: Rad,
	entrance_arm: f64,
	exit_arm: f64,
	figure_rotation_a11: f64,
) -> Surface {
	let a = long_half_axis;
	let b = short_half_axis;

	let y0 = if a > b {
		if design_grazing.0 > 0.0 {
			-b * b / design_grazing.tan() / (a * a - b * b).sqrt()
		} else {
			-b
		}
	} else {
		0.0
	};

	let z0 = if entrance_arm > exit_arm && -b < y0 {
		a * (b * b - y0 * y0).sqrt() / b
	} else if entrance_arm < exit_arm && -b < y0 {
		-a * (b * b - y0 * y0).sqrt() / b
	} else {
		0.0
	};

	let mt = if a > 0.0 && y0 < 0.0 { (b / a) * (b / a) * z0 / y0 } else { 0.0 };
	let tangent = Rad(mt.atan());
	let (sin_t, cos_t) = tangent.0.sin_cos();

	let a22 = cos_t * cos_t + (b * sin_t / a) * (b * sin_t / a);
	let a23 = (b * b - a * a) * cos_t * sin_t / (a * a);
	let a24 = (b / a) * (b / a) * z0 * sin_t + y0 * cos_t;
	let a33 = sin_t * sin_t + (b * cos_t / a) * (b * cos_t / a);
	let a34 = (b / a) * (b / a) * z0 * cos_t - y0 * sin_t;
	let a44 = -b * b + y0 * y0 + (z0 * b / a) * (z0 * b / a);

	Surface::Quadric(QuadricSurface {
		icurv: 1,
		a11: figure_rotation_a11,
		a12: 0.0,
		a13: 0.0,
		a14: 0.0,
		a22,
		a23,
		a24,
		a33,
		a34,
		a44,
	})
}

pub fn make_toroid(long_radius: f64, short_radius: f64, kind: ToroidKind) -> Surface {
	Surface::Toroid(ToroidSurface { long_radius, short_radius, kind })
}

/// A cone whose opening follows from the arm lengths, grazing incidence
/// and total length, as the legacy design tooling derives it.
pub fn make_cone(incidence: Rad, entrance_arm: f64, exit_arm: f64, total_length: f64) -> Surface {
	let zl = total_length;
	let ra = entrance_arm;
	let rb = exit_arm;

	let zl2 = (zl / 2.0) * (zl / 2.0);
	let sth = incidence.sin();
	let cth = incidence.cos();
	let rmax1 = (zl2 + ra * ra - zl * ra * cth).sqrt();
	let rmax2 = (zl2 + rb * rb + zl * rb * cth).sqrt();
	let rmin1 = (zl2 + ra * ra + zl * ra * cth).sqrt();
	let rmin2 = (zl2 + rb * rb - zl * rb * cth).sqrt();
	let thmax = (ra * sth / rmax1).asin();
	let thmin = (ra * sth / rmin1).asin();

	let upstream_radius = 2.0 * thmax.sin() / (1.0 / rmax1 + 1.0 / rmax2);
	let downstream_radius = 2.0 * thmin.sin() / (1.0 / rmin1 + 1.0 / rmin2);

	let cm = ((upstream_radius - downstream_radius) / zl) * ((upstream_radius - downstream_radius) / zl);

	let a11 = 1.0 - cm;
	let a22 = 1.0 - 2.0 * cm;
	let a23 = (cm - cm * cm).sqrt();
	let a24 = if a23 != 0.0 {
		-a23 * (upstream_radius / cm.sqrt() - zl / 2.0)
	} else {
		-upstream_radius
	};
	let icurv = if a22 > 0.0 { 1 } else { 0 };

	Surface::Quadric(QuadricSurface {
		icurv,
		a11,
		a12: 0.0,
		a13: 0.0,
		a14: 0.0,
		a22,
		a23,
		a24,
		a33: 0.0,
		a34: 0.0,
		a44: 0.0,
	})
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParaboloidFocus {
	Collimate,
	Focus,
}

/// A paraboloid placed at the design incidence point; `parameter_p` is
/// the semi-latus rectum of the parabola.
pub fn make_paraboloid(
	arm_length: f64,
	parameter_p: f64,
	focus: ParaboloidFocus,
	incidence: Rad,
	figure_rotation_a11: f64,
) -> Surface {
	let sign = match focus {
		ParaboloidFocus::Collimate => 1.0,
		ParaboloidFocus::Focus => -1.0,
	};

	let (sin1, cos1) = (2.0 * incidence.0).sin_cos();
	let y0 = arm_length * sin1;
	let z0 = arm_length * cos1 * sign;

	Surface::Quadric(QuadricSurface {
		icurv: 1,
		a11: figure_rotation_a11,
		a12: 0.0,
		a13: 0.0,
		a14: 0.0,
		a22: 1.0,
		a23: 0.0,
		a24: -y0,
		a33: 0.0,
		a34: -parameter_p,
		a44: y0 * y0 - 2.0 * parameter_p * z0 - parameter_p * parameter_p,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sphere_passes_through_origin() {
		if let Surface::Quadric(q) = make_sphere(500.0) {
			assert_eq!(q.eval(0.0, 0.0, 0.0), 0.0);
			// Apex of the sphere, two radii up.
			assert!(q.eval(0.0, 1000.0, 0.0).abs() < 1e-9);
		} else {
			panic!("sphere is not a quadric");
		}
	}

	#[test]
	fn cone_narrows_downstream() {
		let surface = make_cone(Rad(0.1), 5000.0, 5000.0, 100.0);

		if let Surface::Quadric(q) = surface {
			assert!(q.is_finite());
			// The tilt against the beam makes the upstream end wider, so
			// a genuine cone slope remains even for symmetric arms.
			assert!(q.a23 > 0.0, "a23 = {}", q.a23);
			assert!(q.a22 > 0.0 && q.icurv == 1);
			assert!(q.a24 < 0.0, "a24 = {}", q.a24);
		} else {
			panic!("cone is not a quadric");
		}
	}

	#[test]
	fn paraboloid_focus_flips_the_vertex_side() {
		let collimate = make_paraboloid(1000.0, 10.0, ParaboloidFocus::Collimate, Rad(0.1), 1.0);
		let focus = make_paraboloid(1000.0, 10.0, ParaboloidFocus::Focus, Rad(0.1), 1.0);

		match (collimate, focus) {
			(Surface::Quadric(c), Surface::Quadric(f)) => {
				assert_eq!(c.a24, f.a24);
				assert!(c.a44 < f.a44, "z0 sign must move the vertex");
			}
			_ => panic!("paraboloid is not a quadric"),
		}
	}

	#[test]
	fn serialized_tag_layout() {
		let ser = make_sphere(1.0).serialize();

		assert_eq!(ser[0], STYPE_QUADRIC as f32);
		assert_eq!(ser[1], 1.0, "icurv");
		assert_eq!(ser[8], -1.0, "a24");
	}
}
