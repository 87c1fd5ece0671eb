use crate::math::{Cplx, DVec3, DVec4, Field3};

/// Converts a Stokes vector into a complex electric field, expressed in
/// the basis spanned by `forward` (propagation) and `up`.
///
/// The Stokes components are (intensity, linear 0°/90°, linear ±45°,
/// circular). Degenerate (unpolarized) remainders are dropped; the
/// returned field carries the polarized part.
pub fn stokes_to_field(stokes: DVec4, forward: DVec3, up: DVec3) -> Field3 {
	let f = forward.normalize().into_inner();
	let h = up.cross(f);
	let h = if h.length_sq() < 1e-24 {
		// `up` is parallel to the propagation direction, fall back to x.
		DVec3::X
	} else {
		h.normalize().into_inner()
	};
	let v = f.cross(h);

	let ex = (((stokes.x + stokes.y) / 2.0).max(0.0)).sqrt();
	let ey = (((stokes.x - stokes.y) / 2.0).max(0.0)).sqrt();
	let delta = stokes.w.atan2(stokes.z);
	let (sin_d, cos_d) = delta.sin_cos();

	let jones_x = Cplx::new(ex, 0.0);
	let jones_y = Cplx::new(ey * cos_d, ey * sin_d);

	Field3::new(
		jones_x * h.x + jones_y * v.x,
		jones_x * h.y + jones_y * v.y,
		jones_x * h.z + jones_y * v.z,
	)
}

/// Projects a field back onto a (forward, up) basis and returns the
/// Stokes vector of the transverse part.
pub fn field_to_stokes(field: Field3, forward: DVec3, up: DVec3) -> DVec4 {
	let f = forward.normalize().into_inner();
	let h = up.cross(f);
	let h = if h.length_sq() < 1e-24 { DVec3::X } else { h.normalize().into_inner() };
	let v = f.cross(h);

	let ex = field.x * h.x + field.y * h.y + field.z * h.z;
	let ey = field.x * v.x + field.y * v.y + field.z * v.z;

	let cross = ex * ey.conj();

	DVec4::new(
		ex.norm_sq() + ey.norm_sq(),
		ex.norm_sq() - ey.norm_sq(),
		2.0 * cross.re,
		-2.0 * cross.im,
	)
}

/// Complex Fresnel amplitude coefficients (rs, rp) for reflection off a
/// medium with refractive index `n2`, coming from `n1`, at the given
/// incidence cosine.
pub fn fresnel_reflection(n1: Cplx, n2: Cplx, cos_incidence: f64) -> (Cplx, Cplx) {
	let cos_i = Cplx::from_real(cos_incidence);
	let sin_i_sq = 1.0 - cos_incidence * cos_incidence;

	let ratio = n1 / n2;
	let sin_t_sq = ratio * ratio * sin_i_sq;
	let cos_t = (Cplx::from_real(1.0) - sin_t_sq).sqrt();

	let rs = (n1 * cos_i - n2 * cos_t) / (n1 * cos_i + n2 * cos_t);
	let rp = (n2 * cos_i - n1 * cos_t) / (n2 * cos_i + n1 * cos_t);

	(rs, rp)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn horizontal_polarization_maps_to_x() {
		let stokes = DVec4::new(1.0, 1.0, 0.0, 0.0);
		let field = stokes_to_field(stokes, DVec3::Z, DVec3::Y);

		assert!((field.x.norm() - 1.0).abs() < 1e-12);
		assert!(field.y.norm() < 1e-12);
		assert!(field.z.norm() < 1e-12);
	}

	#[test]
	fn stokes_round_trip() {
		// Fully polarized: S0² = S1² + S2² + S3².
		let stokes = DVec4::new(1.0, 0.3, -0.5, 0.66_f64.sqrt());
		let field = stokes_to_field(stokes, DVec3::Z, DVec3::Y);
		let back = field_to_stokes(field, DVec3::Z, DVec3::Y);

		assert!((back.x - stokes.x).abs() < 1e-9, "S0 {}", back.x);
		assert!((back.y - stokes.y).abs() < 1e-9, "S1 {}", back.y);
		assert!((back.z - stokes.z).abs() < 1e-9, "S2 {}", back.z);
		assert!((back.w - stokes.w).abs() < 1e-9, "S3 {}", back.w);
	}

	#[test]
	fn normal_incidence_has_unpolarized_reflectance() {
		let n1 = Cplx::from_real(1.0);
		let n2 = Cplx::from_real(1.5);
		let (rs, rp) = fresnel_reflection(n1, n2, 1.0);

		// At normal incidence |rs| = |rp| = (n2-n1)/(n2+n1).
		assert!((rs.norm() - 0.2).abs() < 1e-12);
		assert!((rp.norm() - 0.2).abs() < 1e-12);
	}

	#[test]
	fn grazing_incidence_is_totally_reflective() {
		let n1 = Cplx::from_real(1.0);
		let n2 = Cplx::new(0.99, 0.01);
		let (rs, _) = fresnel_reflection(n1, n2, 1e-6);

		assert!(rs.norm() > 0.99);
	}
}
