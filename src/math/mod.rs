pub mod angle;
pub mod complex;
pub mod matrix;
pub mod num;

mod unit;

pub use angle::{Deg, Rad};
pub use complex::{Complex, Cplx, Field3};
pub use matrix::{DMat3, DMat4, DVec2, DVec3, DVec4, Matrix, Matrix3, Matrix4, Vector, Vector2, Vector3, Vector4};
pub use unit::Unit;

pub const PI: f64 = std::f64::consts::PI;

/// Reciprocal nanometer / electron-volt relationship.
pub const INM_TO_EV: f64 = 1.239852e3;

/// Photon wavelength (nm) from its energy (eV), or vice versa.
pub fn energy_to_wavelength(x: f64) -> f64 {
	if x == 0.0 {
		return 0.0;
	}
	INM_TO_EV / x
}

/// Clamps x to be in the range [min, max].
pub fn clamp(x: f64, min: f64, max: f64) -> f64 {
	x.max(min).min(max)
}

pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
	a + (b - a) * t
}

/// Rotation matrix from the three misalignment angles (psi, phi, chi),
/// applied in the order the legacy beamline tooling expects.
pub fn rotation_matrix(dpsi: f64, dphi: f64, dchi: f64) -> DMat4 {
	let (sps, cps) = dpsi.sin_cos();
	let (sph, cph) = dphi.sin_cos();
	let (sch, cch) = dchi.sin_cos();

	DMat4::from_array([
		cph * cch, -cps * sch - sps * sph * cch, -sps * sch + cps * sph * cch, 0.0,
		sch * cph, cps * cch - sps * sph * sch, sps * cch + cps * sph * sch, 0.0,
		-sph, -sps * cph, cps * cph, 0.0,
		0.0, 0.0, 0.0, 1.0,
	]).transpose()
}

/// Rodrigues rotation about a unit axis.
pub fn axis_angle_matrix(axis: DVec3, angle: Rad) -> DMat3 {
	let (s, c) = angle.0.sin_cos();
	let t = 1.0 - c;
	let (x, y, z) = (axis.x, axis.y, axis.z);

	DMat3::from_array([
		t * x * x + c, t * x * y - s * z, t * x * z + s * y,
		t * x * y + s * z, t * y * y + c, t * y * z - s * x,
		t * x * z - s * y, t * y * z + s * x, t * z * z + c,
	])
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn wavelength_of_one_kev() {
		assert!((energy_to_wavelength(1000.0) - 1.239852).abs() < 1e-9);
	}

	#[test]
	fn axis_angle_quarter_turn() {
		let m = axis_angle_matrix(DVec3::X, Rad(PI / 2.0));
		let v = m * DVec3::Y;

		assert!(v.distance(DVec3::Z) < 1e-12, "Y should rotate onto Z");
	}
}
