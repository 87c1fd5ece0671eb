use super::SourceBase;
use crate::kernel::efield::stokes_to_field;
use crate::kernel::rand::RayRand;
use crate::math::{DVec3, DVec4, PI};
use crate::rays::Ray;

/// Travel direction of the electrons through the bend; flips the sign of
/// the arc the rays start on and the phase of the circular polarization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElectronEnergyOrientation {
	Clockwise,
	Counterclockwise,
}

/// `gamma` per GeV of electron energy.
const FACTOR_ELECTRON_ENERGY: f64 = 1957.0;

/// Critical energy in keV: `FACTOR_CRITICAL_ENERGY * E³[GeV] / R[m]`.
const FACTOR_CRITICAL_ENERGY: f64 = 2.2182868570172918;

/// Scale of the angular intensity distribution. Only ratios of the
/// distribution are ever used, the absolute scale cancels in the
/// rejection sampling.
const FACTOR_DISTRIBUTION: f64 = 3453345200000000.0;

/// Sampled Schwinger function G0(y), on log-log axes.
/// H. Winick, S. Doniach, Synchrotron Radiation Research P.23f.
const SCHWINGER_LOG_X: [f64; 59] = [
	-9.210340371976182, -6.907755278982137, -6.214608098422191,
	-5.521460917862246, -5.115995809754082, -4.8283137373023015,
	-4.605170185988091, -3.912023005428146, -3.506557897319982,
	-3.2188758248682006, -2.995732273553991, -2.8134107167600364,
	-2.659260036932778, -2.5257286443082556, -2.4079456086518722,
	-2.3025850929940455, -1.8971199848858813, -1.6094379124341003,
	-1.3862943611198906, -1.2039728043259361, -1.0498221244986778,
	-0.916290731874155, -0.7985076962177716, -0.6931471805599453,
	-0.5978370007556204, -0.5108256237659907, -0.4307829160924542,
	-0.35667494393873245, -0.2876820724517809, -0.2231435513142097,
	-0.16251892949777494, -0.10536051565782628, 0.0,
	0.22314355131420976, 0.4054651081081644, 0.5596157879354227,
	0.6931471805599453, 0.8109302162163288, 0.9162907318741551,
	1.0116009116784799, 1.0986122886681098, 1.1786549963416462,
	1.252762968495368, 1.3217558399823195, 1.3862943611198906,
	1.4469189829363254, 1.5040773967762742, 1.55814461804655,
	1.6094379124341003, 1.7047480922384253, 1.791759469228055,
	1.8718021769015913, 1.9459101490553132, 2.0149030205422647,
	2.0794415416798357, 2.1400661634962708, 2.1972245773362196,
	2.2512917986064953, 2.302585092994046,
];

const SCHWINGER_LOG_Y: [f64; 59] = [
	-2.3299562897901778, -1.5436501718960973, -1.3197578373196464, -1.0967340536563375, -0.968268470966868, -0.8786096649064665,
	-0.8096809968158968, -0.6029409126737963, -0.48857501483117105, -0.4112819934297291, -0.3545343794396214, -0.31033676301658714,
	-0.2750949569463094, -0.2456959557847213, -0.22133269191024715, -0.2006484734868388, -0.1337599901795244, -0.10158985576163317,
	-0.08801187732321335, -0.08588473915716963, -0.09162198954731303, -0.10314075891951337, -0.11895246917729328, -0.13811330212963427,
	-0.1602274393208889, -0.1844037229982793, -0.21084449572719277, -0.23800341422123386, -0.2678794451556012, -0.2978670975101462,
	-0.329164006906722, -0.36154392105023625, -0.42863138614000396, -0.6071988684235804, -0.797175250983993, -0.9948605664247034,
	-1.198653642848336, -1.4063950328268935, -1.618730959345693, -1.8338166012166428, -2.0512040002685965, -2.2712075573017905,
	-2.492898499717553, -2.7158303884211725, -2.9404867993280126, -3.1667875340740523, -3.3939884287164857, -3.6222119508679222,
	-3.851398383611711, -4.312649836896061, -4.776670504150463, -5.242854277848891, -5.6871023644050025, -6.18201990882904,
	-6.654043726101509, -7.12800925913115, -7.603165017196341, -8.07929316216491, -8.556974061428082,
];

/// Quadratic log-log interpolation of the Schwinger G0 table.
fn dipole_interpolation(log_y0: f64) -> f64 {
	let n = SCHWINGER_LOG_X.len();
	let mut pos = SCHWINGER_LOG_X.iter().position(|x| log_y0 < *x).unwrap_or(n - 1);
	pos = pos.clamp(1, n - 2);

	let dx0 = log_y0 - SCHWINGER_LOG_X[pos - 1];
	let dx1 = log_y0 - SCHWINGER_LOG_X[pos];
	let dx2 = log_y0 - SCHWINGER_LOG_X[pos + 1];

	let f1 = (dx0 * SCHWINGER_LOG_Y[pos] - dx1 * SCHWINGER_LOG_Y[pos - 1]) / (dx0 - dx1);
	let f2 = (dx0 * SCHWINGER_LOG_Y[pos + 1] - dx2 * SCHWINGER_LOG_Y[pos - 1]) / (dx0 - dx2);

	(dx1 * f2 - dx2 * f1) / (dx1 - dx2)
}

/// Relative spectral flux at the given photon energy (eV), following
/// H. Wiedemann, Synchrotron Radiation P.259 (D.21). Only ratios of this
/// function are meaningful.
fn schwinger(energy: f64, gamma: f64, critical_energy: f64) -> f64 {
	let y0 = energy / critical_energy / 1000.0;

	if y0 <= 0.0 {
		return 0.0;
	}

	let yg0 = if y0 > 10.0 {
		0.777 * y0.sqrt() * (-y0).exp()
	} else if y0 < 1e-4 {
		1.333 * y0.powf(1.0 / 3.0)
	} else {
		dipole_interpolation(y0.ln()).exp()
	};

	gamma * yg0
}

/// Truncated integral over the modified Bessel function K_nue.
fn dipole_bessel(hnue: f64, zeta: f64) -> f64 {
	let h = 0.1;
	let mut result = h / 2.0 * (-zeta).exp();
	let mut c2 = 0.0;

	for i in 1..=1000 {
		let hi = h * i as f64;
		let cosh1 = ((hi).exp() + (-hi).exp()) / 2.0;
		let cosh2 = ((hi * hnue).exp() + (-hi * hnue).exp()) / 2.0;
		if zeta * cosh1 > 225.0 {
			return result;
		}
		let c1 = h * (-zeta * cosh1).exp() * cosh2;
		result += c1;
		if c1 <= c2 {
			break;
		}
		c2 = result / 1e6;
	}
	result
}

/// Stokes vector of the synchrotron radiation integrated over the
/// vertical angle window [psi1, psi2] (mrad).
fn stokes_syn(
	energy: f64,
	psi1: f64,
	psi2: f64,
	gamma: f64,
	critical_energy: f64,
	orientation: ElectronEnergyOrientation,
) -> DVec4 {
	let y0 = energy / critical_energy / 1000.0;

	// The start angle uses the unclamped step so a degenerate window
	// (psi1 == psi2) still integrates one sample.
	let mut dpsi = (psi2 - psi1) / 101.0;
	let mut psi = psi1 + dpsi / 2.0;
	if dpsi < 0.001 {
		dpsi = 0.001;
	}

	let mut stokes = DVec4::ZERO;

	while psi <= psi2 {
		let sign1 = match orientation {
			ElectronEnergyOrientation::Clockwise => PI / 2.0,
			ElectronEnergyOrientation::Counterclockwise => -PI / 2.0,
		};
		let sign2 = if psi >= 0.0 { 1.0 } else { -1.0 };
		let phase = -(sign1 * sign2);

		let x = gamma * psi * 0.001;
		let zeta = (1.0 + x * x).powf(1.5) * 0.5 * y0;
		let xkn2 = dipole_bessel(2.0 / 3.0, zeta);
		let xkn1 = dipole_bessel(1.0 / 3.0, zeta);
		let xint = FACTOR_DISTRIBUTION * gamma * gamma * y0 * y0 * (1.0 + x * x) * (1.0 + x * x);
		let xintp = xint * xkn2 * xkn2 * dpsi * 1e-6;
		let xints = xint * (x * x / (1.0 + x * x)) * xkn1 * xkn1 * dpsi * 1e-6;

		stokes.x += xintp - xints;
		stokes.y += 2.0 * (xintp * xints).sqrt() * phase.sin();
		stokes.z += xintp;
		stokes.w += xints;

		psi += dpsi;
	}
	stokes
}

struct PsiAndStokes {
	psi: f64,
	stokes: DVec4,
}

/// Folds the angular distribution with the vertical electron-beam
/// divergence by Monte-Carlo sampling around the requested psi.
fn dipole_fold(
	psi: f64,
	energy: f64,
	sig_psi: f64,
	gamma: f64,
	critical_energy: f64,
	orientation: ElectronEnergyOrientation,
	rand: &mut RayRand,
) -> PsiAndStokes {
	let mut ln = sig_psi as i32;
	let (trsgyp, sgyp) = if sig_psi != 0.0 {
		if ln > 10 || ln == 0 {
			ln = 10;
		}
		(-0.5 / (sig_psi * sig_psi), 4.0e-3 * sig_psi)
	} else {
		ln = 1;
		(0.0, 0.0)
	};

	let mut sum = DVec4::ZERO;
	let mut newpsi = psi;

	for _ in 0..ln {
		let sy = loop {
			let sy = (rand.random_double() - 0.5) * sgyp;
			let wy = (trsgyp * sy * sy).exp();
			if wy - rand.random_double() >= 0.0 {
				break sy;
			}
		};

		newpsi = psi + sy;
		let stokes = stokes_syn(energy, newpsi, newpsi, gamma, critical_energy, orientation);
		sum += stokes;
	}
	let stokes = sum / ln as f64;

	// Reorder into (intensity, linear, linear 45, circular).
	PsiAndStokes {
		psi: newpsi,
		stokes: DVec4::new(stokes.z + stokes.w, stokes.x, 0.0, stokes.y),
	}
}

/// Bending-magnet source: positions on the bending arc, energies from the
/// Schwinger spectrum, vertical angle and polarization from the natural
/// angular distribution.
#[derive(Clone, Debug, PartialEq)]
pub struct DipoleSource {
	pub base: SourceBase,
	/// Bending radius in m.
	pub bending_radius: f64,
	pub orientation: ElectronEnergyOrientation,
	/// Electron energy in GeV.
	pub electron_energy: f64,
	/// Center photon energy in eV.
	pub photon_energy: f64,
	/// Full energy window in eV.
	pub energy_spread: f64,
	/// Vertical electron-beam divergence in mrad.
	pub ver_ebeam_divergence: f64,
	pub source_width: f64,
	pub source_height: f64,
	/// Horizontal angle window in rad.
	pub hor_divergence: f64,

	gamma: f64,
	critical_energy: f64,
	ver_divergence: f64,
	max_intensity: f64,
	max_flux: f64,
}

impl DipoleSource {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		base: SourceBase,
		bending_radius: f64,
		orientation: ElectronEnergyOrientation,
		electron_energy: f64,
		photon_energy: f64,
		energy_spread: f64,
		ver_ebeam_divergence: f64,
		source_width: f64,
		source_height: f64,
		hor_divergence: f64,
	) -> Self {
		let gamma = electron_energy.abs() * FACTOR_ELECTRON_ENERGY;
		let critical_energy =
			FACTOR_CRITICAL_ENERGY * electron_energy.abs().powi(3) / bending_radius;

		let ver_divergence = {
			// Natural opening angle ~ (0.565 / E[GeV]) (Ec/E)^0.43 mrad,
			// widened by the electron-beam divergence.
			let psi = if gamma == 0.0 || critical_energy == 0.0 {
				0.0
			} else {
				1106.0 / gamma * (critical_energy * 1000.0 / photon_energy).powf(0.43)
			};
			(psi * psi + (ver_ebeam_divergence * 0.001) * (ver_ebeam_divergence * 0.001)).sqrt()
		};

		// The rejection bounds only normalize the sampling, a fixed seed
		// keeps source construction deterministic.
		let mut rand = RayRand::for_path(42, 0);

		let max_intensity = {
			let mut smax = 0.0;
			let mut psi = -ver_divergence;
			for _ in 1..250 {
				psi += 0.05;
				let s = dipole_fold(psi, photon_energy, 1.0, gamma, critical_energy, orientation, &mut rand);
				let intensity = s.stokes.x;
				if smax < intensity {
					smax = intensity;
				} else {
					break;
				}
			}
			smax
		};

		let max_flux = {
			let emaxs = 285.81224786 * critical_energy;
			let emax = photon_energy + energy_spread / 2.0;
			let emin = photon_energy - energy_spread / 2.0;
			if emax < emaxs {
				schwinger(emax, gamma, critical_energy)
			} else if emin > emaxs {
				schwinger(emin, gamma, critical_energy)
			} else {
				schwinger(emaxs, gamma, critical_energy)
			}
		};

		Self {
			base,
			bending_radius,
			orientation,
			electron_energy,
			photon_energy,
			energy_spread,
			ver_ebeam_divergence,
			source_width,
			source_height,
			hor_divergence,
			gamma,
			critical_energy,
			ver_divergence,
			max_intensity,
			max_flux,
		}
	}

	pub fn critical_energy(&self) -> f64 {
		self.critical_energy
	}

	/// Relative Schwinger flux at an energy, exposed for spectrum tests.
	pub fn flux(&self, energy: f64) -> f64 {
		schwinger(energy, self.gamma, self.critical_energy)
	}

	pub fn gen_ray(&self, path_id: i32, source_id: i32, rand: &mut RayRand) -> Ray {
		let mut phi = (rand.random_double() - 0.5) * self.hor_divergence;

		let position = self.arc_position(phi, rand);
		let energy = self.select_energy(rand);
		let mut psi_stokes = self.select_psi_and_stokes(energy, rand);

		phi += self.base.misalignment.rotation_x.0;
		psi_stokes.psi += self.base.misalignment.rotation_y.0;

		let direction = super::direction_from_angles(phi, psi_stokes.psi);
		let field = stokes_to_field(psi_stokes.stokes, DVec3::Z, DVec3::Y);

		self.base.emit(position, direction, energy, field, path_id, source_id, *rand)
	}

	/// Position along the bending arc for the given horizontal angle,
	/// with Gaussian-like draws across the source cross section.
	fn arc_position(&self, phi: f64, rand: &mut RayRand) -> DVec3 {
		let x1 = normal_from_range(self.source_width, rand);

		let sign = match self.orientation {
			ElectronEnergyOrientation::Clockwise => -1.0,
			ElectronEnergyOrientation::Counterclockwise => 1.0,
		};
		let radius_mm = self.bending_radius * 1000.0;

		let x = sign * (x1 * phi.cos() + radius_mm * (1.0 - phi.cos()));
		let y = normal_from_range(self.source_height, rand);
		let z = sign * (radius_mm - x1) * phi.sin();

		DVec3::new(x, y, z)
	}

	/// Rejection sampling against the Schwinger spectrum.
	fn select_energy(&self, rand: &mut RayRand) -> f64 {
		loop {
			let energy = self.photon_energy + (rand.random_double() - 0.5) * self.energy_spread;
			let flux = schwinger(energy, self.gamma, self.critical_energy);
			if flux / self.max_flux - rand.random_double() >= 0.0 {
				return energy;
			}
		}
	}

	/// Rejection sampling of the folded angular intensity distribution.
	fn select_psi_and_stokes(&self, energy: f64, rand: &mut RayRand) -> PsiAndStokes {
		loop {
			let psi = (rand.random_double() - 0.5) * 6.0 * self.ver_divergence;
			let mut folded = dipole_fold(
				psi,
				energy,
				self.ver_ebeam_divergence,
				self.gamma,
				self.critical_energy,
				self.orientation,
				rand,
			);
			if folded.stokes.x / self.max_intensity >= rand.random_double() {
				folded.psi *= 1e-3;
				return folded;
			}
		}
	}
}

/// Monte-Carlo draw with density `exp(-0.5 (v / range)²)` over ±4.5·range.
fn normal_from_range(range: f64, rand: &mut RayRand) -> f64 {
	if range == 0.0 {
		return 0.0;
	}
	let expanse = -0.5 / (range * range);
	loop {
		let value = (rand.random_double() - 0.5) * 9.0 * range;
		let density = (expanse * value * value).exp();
		if density >= rand.random_double() {
			return value;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn source() -> DipoleSource {
		DipoleSource::new(
			SourceBase::new(100),
			4.35,
			ElectronEnergyOrientation::Clockwise,
			1.7,
			2500.0,
			5000.0,
			0.0,
			0.065,
			0.04,
			0.001,
		)
	}

	#[test]
	fn critical_energy_of_bessy_bend() {
		let s = source();

		// 2.218 * 1.7³ / 4.35 keV.
		assert!((s.critical_energy() - 2.505).abs() < 0.01, "Ec {}", s.critical_energy());
	}

	#[test]
	fn energies_stay_in_the_window() {
		let s = source();
		for i in 0..50 {
			let ray = s.gen_ray(i, 0, &mut RayRand::for_path(23, i));
			assert!((0.0..=5000.0).contains(&ray.energy), "energy {}", ray.energy);
			assert!((ray.direction.length() - 1.0).abs() < 1e-12);
		}
	}

	#[test]
	fn flux_peaks_near_a_third_of_critical() {
		let s = source();
		let ec = s.critical_energy() * 1000.0;

		// The Schwinger spectrum peaks below Ec and dives above 10 Ec.
		assert!(s.flux(0.3 * ec) > s.flux(5.0 * ec));
		assert!(s.flux(0.3 * ec) > s.flux(0.001 * ec));
		assert!(s.flux(20.0 * ec) < s.flux(2.0 * ec) / 100.0);
	}

	#[test]
	fn positions_spread_across_the_source() {
		let s = source();
		for i in 0..100 {
			let ray = s.gen_ray(i, 0, &mut RayRand::for_path(29, i));
			assert!(ray.position.x.abs() <= 4.5 * 0.065 + 1.0, "x {}", ray.position.x);
			assert!(ray.position.y.abs() <= 4.5 * 0.04, "y {}", ray.position.y);
		}
	}
}
