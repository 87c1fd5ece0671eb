use super::efield::fresnel_reflection;
use super::rand::RayRand;
use crate::element::behavior::{Behavior, CrystalBehavior, GratingBehavior, RzpBehavior, SlitBehavior};
use crate::element::cutout::Cutout;
use crate::element::record::Element;
use crate::material::MaterialTables;
use crate::math::{energy_to_wavelength, Cplx, DVec3, Field3, PI};
use crate::rays::Ray;

/// Outcome of applying an element's behavior at the hit point. The ray is
/// in element coordinates throughout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BehaveResult {
	/// The ray continues; direction and field have been updated.
	Continue,
	Absorbed,
	/// A diffraction angle left the physical domain.
	BeyondHorizon,
}

pub fn behave(ray: &mut Ray, element: &Element, normal: DVec3, materials: &MaterialTables) -> BehaveResult {
	match &element.behavior {
		Behavior::Mirror => {
			reflect_with_fresnel(ray, normal, element.material, materials);
			BehaveResult::Continue
		}
		Behavior::Grating(grating) => behave_grating(ray, element, normal, grating, materials),
		Behavior::Rzp(rzp) => behave_rzp(ray, element, normal, rzp, materials),
		Behavior::Slit(slit) => behave_slit(ray, slit),
		Behavior::Crystal(crystal) => behave_crystal(ray, normal, crystal),
		Behavior::ImagePlane => BehaveResult::Continue,
		Behavior::Absorb => BehaveResult::Absorbed,
	}
}

/// Specular reflection about the (possibly perturbed) normal, with the
/// field updated through the Fresnel coefficients of the element's
/// material. Without a material the element acts as an ideal mirror.
fn reflect_with_fresnel(ray: &mut Ray, normal: DVec3, material: i32, materials: &MaterialTables) {
	let incident = ray.direction;
	let cos_incidence = incident.dot(normal).abs().min(1.0);
	let reflected = (incident - normal * (2.0 * incident.dot(normal))).normalize().into_inner();

	let (rs, rp) = match materials.refractive_index(material, ray.energy) {
		Some((n, k)) => fresnel_reflection(Cplx::from_real(1.0), Cplx::new(n, -k), cos_incidence),
		// An ideal mirror flips the phase of both components.
		None => (Cplx::from_real(-1.0), Cplx::from_real(-1.0)),
	};

	apply_polarized_reflection(ray, incident, reflected, normal, rs, rp);
	ray.direction = reflected;
}

/// Splits the field into s and p components relative to the plane of
/// incidence, applies the amplitude coefficients and reassembles the
/// field along the outgoing direction.
fn apply_polarized_reflection(ray: &mut Ray, incident: DVec3, outgoing: DVec3, normal: DVec3, rs: Cplx, rp: Cplx) {
	let s_axis = incident.cross(normal);
	let s_hat = if s_axis.length_sq() < 1e-20 {
		// Normal incidence, the plane of incidence is degenerate.
		let fallback = incident.cross(DVec3::X);
		if fallback.length_sq() < 1e-20 {
			incident.cross(DVec3::Y).normalize().into_inner()
		} else {
			fallback.normalize().into_inner()
		}
	} else {
		s_axis.normalize().into_inner()
	};
	let p_in = s_hat.cross(incident);
	let p_out = s_hat.cross(outgoing);

	let dot = |f: &Field3, v: DVec3| f.x * v.x + f.y * v.y + f.z * v.z;
	let es = dot(&ray.field, s_hat) * rs;
	let ep = dot(&ray.field, p_in) * rp;

	ray.field = Field3::new(
		es * s_hat.x + ep * p_out.x,
		es * s_hat.y + ep * p_out.y,
		es * s_hat.z + ep * p_out.z,
	);
}

fn behave_grating(
	ray: &mut Ray,
	element: &Element,
	normal: DVec3,
	grating: &GratingBehavior,
	materials: &MaterialTables,
) -> BehaveResult {
	// Variable line spacing along the meridional direction.
	let z = ray.position.z;
	let vls = &grating.vls;
	let density = grating.line_density
		* (1.0
			+ 2.0 * vls[0] * z
			+ 3.0 * vls[1] * z * z
			+ 4.0 * vls[2] * z.powi(3)
			+ 5.0 * vls[3] * z.powi(4)
			+ 6.0 * vls[4] * z.powi(5)
			+ 7.0 * vls[5] * z.powi(6));

	// Update the field as a mirror reflection first, then bend the
	// reflected direction by the grating momentum.
	reflect_with_fresnel(ray, normal, element.material, materials);
	diffract_reflected(ray, grating.order, density, 0.0)
}

/// Applies the grating momentum to an already reflected direction.
fn diffract_reflected(ray: &mut Ray, order: f64, line_density_z: f64, line_density_x: f64) -> BehaveResult {
	let wavelength = energy_to_wavelength(ray.energy) * 1e-6;
	let ax = order * wavelength * line_density_x;
	let az = order * wavelength * line_density_z;

	let dx = ray.direction.x - ax;
	let dz = ray.direction.z - az;
	let dy_sq = 1.0 - dx * dx - dz * dz;
	if dy_sq < 0.0 {
		return BehaveResult::BeyondHorizon;
	}

	let dy = dy_sq.sqrt() * ray.direction.y.signum();
	ray.direction = DVec3::new(dx, dy, dz).normalize().into_inner();
	ray.order = order;
	BehaveResult::Continue
}

/// Local line density of a reflection zone plate at the hit point,
/// derived from the design geometry (four arm lengths, design angles and
/// wavelength). Returns (density_x, density_z) in lines per mm.
fn rzp_line_density(rzp: &RzpBehavior, point: DVec3, normal: DVec3) -> (f64, f64) {
	let s_alpha = rzp.design_alpha.sin();
	let c_alpha = rzp.design_alpha.cos();
	let s_beta = rzp.design_beta.sin();
	let c_beta = rzp.design_beta.cos();

	let risag = rzp.sagittal_entrance_arm;
	let rosag = rzp.sagittal_exit_arm;
	let rimer = rzp.meridional_entrance_arm;
	let romer = rzp.meridional_exit_arm;

	let (x, y, z) = (point.x, point.y, point.z);
	let (fx, fy, fz) = (normal.x, normal.y, normal.z);

	use crate::element::behavior::RzpImageType;

	let (xi, yi, zi, xm, ym, zm);
	match rzp.image_type {
		RzpImageType::PointToPoint => {
			if fx == 0.0 && fz == 0.0 {
				// Plane zone plate.
				zi = -(risag * c_alpha + z);
				xi = x;
				yi = risag * s_alpha;
				zm = rosag * c_beta - z;
				xm = x;
				ym = rosag * s_beta;
			} else {
				zi = fx * fz * x - (fx * fx + fy * fy) * (z + risag * c_alpha) + fy * fz * (y - risag * s_alpha);
				xi = fy * x - fx * y + fx * risag * s_alpha;
				yi = -(fx * x) - fy * y - fz * z - fz * risag * c_alpha + fy * risag * s_alpha;
				zm = fx * fz * x + (fx * fx + fy * fy) * (-z + rosag * c_beta) + fy * fz * (y - rosag * s_beta);
				xm = fy * x - fx * y + fx * rosag * s_beta;
				ym = -(fx * x) - fy * y - fz * z + fz * rosag * c_beta + fy * rosag * s_beta;
			}
		}
		RzpImageType::AstigmaticToAstigmatic => {
			let s_rim = if rimer < 0.0 { -1.0 } else { 1.0 };
			let s_rom = if romer < 0.0 { -1.0 } else { 1.0 };

			if fx == 0.0 && fz == 0.0 {
				zi = s_rim * (rimer * c_alpha + z);
				xi = s_rim * x * (c_alpha * z - 2.0 * s_alpha * s_alpha * rimer + s_alpha * y + rimer)
					/ (c_alpha * z - 2.0 * s_alpha * s_alpha * risag + s_alpha * y + risag);
				yi = s_rim * (-(rimer * s_alpha) + y);
				zm = s_rom * (romer * c_beta - z);
				xm = s_rom * x * (-(c_beta * z) - 2.0 * s_beta * s_beta * romer + s_beta * y + romer)
					/ (c_beta * z + 2.0 * s_beta * s_beta * rosag - s_beta * y - rosag);
				ym = s_rom * (romer * s_beta - y);
			} else {
				let c_2alpha = (2.0 * rzp.design_alpha.0).cos();
				let c_2beta = (2.0 * rzp.design_beta.0).cos();

				let denominator = z * c_alpha + risag * c_2alpha + y * s_alpha;
				let nominator = x * (z * c_alpha + rimer * c_2alpha + y * s_alpha);
				zi = s_rim
					* ((fx * fx + fy * fy) * (z + rimer * c_alpha) - fy * fz * (y - rimer * s_alpha)
						- fx * fz * nominator / denominator);
				xi = s_rim * (-(fx * y) + fx * rimer * s_alpha + fy * nominator / denominator);
				yi = s_rim * (fz * (z + rimer * c_alpha) + fy * (y - rimer * s_alpha) + fx * nominator / denominator);

				let denominator = -(z * c_beta) + rosag * c_2beta + y * s_beta;
				let nominator = x * (-(z * c_beta) + romer * c_2beta + y * s_beta);
				zm = s_rom
					* ((fx * fx + fy * fy) * (-z + romer * c_beta) + fy * fz * (y - romer * s_beta)
						+ fx * fz * nominator / denominator);
				xm = s_rom * (fx * (y - romer * s_beta) - fy * nominator / denominator);
				ym = s_rom * (fz * (-z + romer * c_beta) + fy * (-y + romer * s_beta) - fx * nominator / denominator);
			}

			let ris = (zi * zi + xi * xi + yi * yi).sqrt();
			let rms = (zm * zm + xm * xm + ym * ym).sqrt();

			// Meridional ray components carry the dispersion here.
			let ai = zi / ris;
			let bi = -xi / ris;
			let am = -zm / rms;
			let bm = xm / rms;

			let wl = rzp.design_wavelength * 1e-6;
			let dz = (ai + am) / (wl * rzp.design_order);
			let dx = (-bi - bm) / (wl * rzp.design_order);
			return (dx, dz);
		}
	}

	let ris = (zi * zi + xi * xi + yi * yi).sqrt();
	let rms = (zm * zm + xm * xm + ym * ym).sqrt();

	let ai = xi / ris;
	let am = xm / rms;
	let bi = zi / ris;
	let bm = zm / rms;

	// Design wavelength in mm so the densities come out in lines per mm.
	let wl = rzp.design_wavelength * 1e-6;
	let dx = (ai + am) / (wl * rzp.design_order);
	let dz = (-bi - bm) / (wl * rzp.design_order);
	(dx, dz)
}

fn behave_rzp(
	ray: &mut Ray,
	element: &Element,
	normal: DVec3,
	rzp: &RzpBehavior,
	materials: &MaterialTables,
) -> BehaveResult {
	// With the additional zeroth order enabled, half the rays reflect
	// like a plain mirror.
	let order = if rzp.additional_order && ray.rand.random_double() < 0.5 {
		0.0
	} else {
		rzp.order
	};

	let point = ray.position;
	// Shift by the Fresnel center offset before evaluating the zone
	// pattern.
	let shifted = DVec3::new(point.x, point.y, point.z - rzp.fresnel_z_offset);
	let (density_x, density_z) = rzp_line_density(rzp, shifted, DVec3::new(0.0, 1.0, 0.0));

	reflect_with_fresnel(ray, normal, element.material, materials);
	if order == 0.0 {
		ray.order = 0.0;
		return BehaveResult::Continue;
	}
	diffract_reflected(ray, order, density_z, density_x)
}

fn behave_slit(ray: &mut Ray, slit: &SlitBehavior) -> BehaveResult {
	// Slits stand in the x-y plane.
	let (x1, x2) = (ray.position.x, ray.position.y);

	if !slit.opening.contains(x1, x2) {
		return BehaveResult::Absorbed;
	}
	if slit.beamstop.contains(x1, x2) {
		return BehaveResult::Absorbed;
	}

	// The transmitted ray picks up edge diffraction.
	let wavelength = energy_to_wavelength(ray.energy);
	let mut dphi = ray.direction.x.atan2(ray.direction.z);
	let mut dpsi = (-ray.direction.y).asin();

	match slit.opening {
		Cutout::Rect { size_x1, size_x2 } => {
			fraun_diff(size_x1, wavelength, &mut dphi, &mut ray.rand);
			fraun_diff(size_x2, wavelength, &mut dpsi, &mut ray.rand);
		}
		Cutout::Elliptical { diameter_x1, .. } => {
			bessel_diff(diameter_x1 / 2.0, wavelength, &mut dphi, &mut dpsi, &mut ray.rand);
		}
		_ => {}
	}

	ray.direction = crate::sources::direction_from_angles(dphi, dpsi);
	BehaveResult::Continue
}

/// Factorial, used by the Bessel series.
fn fact(n: i32) -> f64 {
	if n < 0 {
		return n as f64;
	}
	let mut f = 1.0;
	for i in 2..=n {
		f *= i as f64;
	}
	f
}

/// First Bessel function J1, by series expansion; zero outside [0, 20].
pub fn bessel1(v: f64) -> f64 {
	if !(0.0..=20.0).contains(&v) {
		return 0.0;
	}
	let mut sum = 0.0;
	for small in 0..=30 {
		let po1 = (-1.0f64).powi(small);
		let po2 = (v / 2.0).powi(2 * small + 1);
		let fa1 = fact(small);
		sum += po1 / (fa1 * fa1 * (small + 1) as f64) * po2;
	}
	sum
}

/// Fraunhofer diffraction on one dimension of a rectangular slit:
/// rejection-samples the single-slit intensity `(sin u / u)²` and folds
/// the resulting deflection into the angle. `dim` in mm, `wl` in nm.
fn fraun_diff(dim: f64, wl: f64, angle: &mut f64, rand: &mut RayRand) {
	if dim <= 0.0 || wl <= 0.0 {
		return;
	}
	let b = dim * 1e6; // slit width in nm
	let u = loop {
		let u = (rand.random_double() - 0.5) * 40.0;
		let w = if u.abs() < 1e-12 { 1.0 } else { (u.sin() / u) * (u.sin() / u) };
		if w >= rand.random_double() {
			break u;
		}
	};
	*angle += (u * wl / (PI * b)).asin();
}

/// Bessel diffraction on a circular opening: rejection-samples the Airy
/// intensity `(2 J1(x) / x)²` and spreads the deflection over a uniform
/// azimuth. `radius` in mm, `wl` in nm.
fn bessel_diff(radius: f64, wl: f64, dphi: &mut f64, dpsi: &mut f64, rand: &mut RayRand) {
	if radius <= 0.0 || wl <= 0.0 {
		return;
	}
	let d = 2.0 * radius * 1e6; // aperture diameter in nm
	let x = loop {
		let x = rand.random_double() * 20.0;
		let w = if x < 1e-12 { 1.0 } else { (2.0 * bessel1(x) / x) * (2.0 * bessel1(x) / x) };
		if w >= rand.random_double() {
			break x;
		}
	};
	let theta = (x * wl / (PI * d)).asin();
	let azimuth = rand.random_double() * 2.0 * PI;
	*dphi += theta * azimuth.cos();
	*dpsi += theta * azimuth.sin();
}

/// Two-beam dynamical diffraction off a perfect crystal (Darwin-Prins).
/// The reflectance is applied to the field; the outgoing direction obeys
/// Bragg's law through specular reflection about the lattice normal
/// tilted by the offset angle.
fn behave_crystal(ray: &mut Ray, normal: DVec3, crystal: &CrystalBehavior) -> BehaveResult {
	// Wavelength in Å.
	let wavelength = energy_to_wavelength(ray.energy) * 10.0;
	let d_spacing = crystal.d_spacing_sq.sqrt();
	if d_spacing <= 0.0 || wavelength <= 0.0 {
		return BehaveResult::Absorbed;
	}

	let sin_bragg = wavelength / (2.0 * d_spacing);
	if sin_bragg > 1.0 {
		// No Bragg reflection exists at this energy.
		return BehaveResult::Absorbed;
	}
	let bragg = sin_bragg.asin();

	let incident = ray.direction;
	let grazing = incident.dot(normal).abs().min(1.0).asin();
	let delta_theta = grazing - bragg - crystal.offset_angle.0;

	// Electron radius (Å) times λ² over π times the unit cell volume.
	let gamma = 2.8179403262e-5 * wavelength * wavelength / (PI * crystal.unit_cell_volume);
	let psi_0 = Cplx::new(crystal.structure_factor_f0.0, crystal.structure_factor_f0.1) * -gamma;
	let psi_h = Cplx::new(crystal.structure_factor_fh.0, crystal.structure_factor_fh.1) * -gamma;
	let psi_hc = Cplx::new(crystal.structure_factor_fhc.0, crystal.structure_factor_fhc.1) * -gamma;

	let reflectance = |polarization_factor: f64| {
		let sqrt_hh = (psi_h * psi_hc).sqrt() * polarization_factor;
		let eta = (Cplx::from_real(-delta_theta * (2.0 * bragg).sin()) + psi_0) / sqrt_hh;
		let root = (eta * eta - Cplx::from_real(1.0)).sqrt();
		let r1 = eta - root;
		let r2 = eta + root;
		if r1.norm_sq() <= r2.norm_sq() { r1 } else { r2 }
	};

	let rs = reflectance(1.0);
	let rp = reflectance((2.0 * bragg).cos().abs().max(1e-12));

	let reflected = (incident - normal * (2.0 * incident.dot(normal))).normalize().into_inner();
	apply_polarized_reflection(ray, incident, reflected, normal, rs, rp);
	ray.direction = reflected;
	BehaveResult::Continue
}
