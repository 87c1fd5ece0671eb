use super::{direction_from_angles, EnergyDistribution, SourceBase};
use crate::kernel::rand::RayRand;
use crate::math::{energy_to_wavelength, DVec3, PI};
use crate::rays::Ray;

/// Which closed form is used for the photon-beam sigma of the undulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SigmaType {
	Standard,
	Accurate,
}

/// Gaussian source whose size and divergence combine the electron-beam
/// sigmas with the diffraction-limited photon sigmas of an undulator of
/// the given length.
#[derive(Clone, Debug, PartialEq)]
pub struct SimpleUndulatorSource {
	pub base: SourceBase,
	pub depth: f64,
	pub energy: EnergyDistribution,

	width: f64,
	height: f64,
	hor_divergence: f64,
	ver_divergence: f64,
}

/// Photon-beam size sigma in µm, from the wavelength (nm) and undulator
/// length (m).
fn undulator_sigma(sigma_type: SigmaType, wavelength: f64, undulator_length: f64) -> f64 {
	match sigma_type {
		SigmaType::Standard => (2.0 * wavelength / 1000.0 * undulator_length * 1e6).sqrt() / (2.0 * PI),
		SigmaType::Accurate => 3.0 / (4.0 * PI) * (wavelength / 1000.0 * undulator_length * 1e6).sqrt(),
	}
}

/// Photon-beam divergence sigma in µrad.
fn undulator_sigma_s(sigma_type: SigmaType, wavelength: f64, undulator_length: f64) -> f64 {
	match sigma_type {
		SigmaType::Standard => (wavelength * 1000.0 / (2.0 * undulator_length)).sqrt(),
		SigmaType::Accurate => 0.53 * (wavelength * 1000.0 / undulator_length).sqrt(),
	}
}

impl SimpleUndulatorSource {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		base: SourceBase,
		depth: f64,
		energy: EnergyDistribution,
		sigma_type: SigmaType,
		undulator_length: f64,
		photon_energy: f64,
		electron_sigma_x: f64,
		electron_sigma_xs: f64,
		electron_sigma_y: f64,
		electron_sigma_ys: f64,
	) -> Self {
		let wavelength = energy_to_wavelength(photon_energy);
		let sigma = undulator_sigma(sigma_type, wavelength, undulator_length);
		let sigma_s = undulator_sigma_s(sigma_type, wavelength, undulator_length);

		// Electron sigmas are in µm / µrad, the combined values in mm / rad.
		Self {
			base,
			depth,
			energy,
			width: (electron_sigma_x * electron_sigma_x + sigma * sigma).sqrt() / 1000.0,
			height: (electron_sigma_y * electron_sigma_y + sigma * sigma).sqrt() / 1000.0,
			hor_divergence: (electron_sigma_xs * electron_sigma_xs + sigma_s * sigma_s).sqrt() / 1e6,
			ver_divergence: (electron_sigma_ys * electron_sigma_ys + sigma_s * sigma_s).sqrt() / 1e6,
		}
	}

	pub fn source_width(&self) -> f64 {
		self.width
	}

	pub fn source_height(&self) -> f64 {
		self.height
	}

	pub fn gen_ray(&self, path_id: i32, source_id: i32, rand: &mut RayRand) -> Ray {
		let x = rand.normal(0.0, 1.0) * self.width;
		let y = rand.normal(0.0, 1.0) * self.height;
		let z = (rand.random_double() - 0.5) * self.depth;
		let energy = self.energy.select(rand);

		let phi = rand.normal(0.0, 1.0) * self.hor_divergence;
		let psi = rand.normal(0.0, 1.0) * self.ver_divergence;
		let direction = direction_from_angles(phi, psi);

		self.base.emit(DVec3::new(x, y, z), direction, energy, self.base.field(), path_id, source_id, *rand)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn standard_sigma_values() {
		// 1 nm photons from a 4 m undulator.
		let sigma = undulator_sigma(SigmaType::Standard, 1.0, 4.0);
		let sigma_s = undulator_sigma_s(SigmaType::Standard, 1.0, 4.0);

		// sqrt(2 * 1e-3 * 4e6) / 2pi µm and sqrt(1000 / 8) µrad.
		assert!((sigma - (8000.0_f64).sqrt() / (2.0 * PI)).abs() < 1e-9);
		assert!((sigma_s - 125.0_f64.sqrt()).abs() < 1e-9);
	}

	#[test]
	fn accurate_sigma_is_larger() {
		let std = undulator_sigma(SigmaType::Standard, 1.0, 4.0);
		let acc = undulator_sigma(SigmaType::Accurate, 1.0, 4.0);

		assert!(acc > std);
	}

	#[test]
	fn beam_size_grows_with_electron_size() {
		let base = SourceBase::new(10);
		let energy = EnergyDistribution::HardEdge { center: 1000.0, spread: 0.0 };
		let narrow = SimpleUndulatorSource::new(
			base.clone(), 0.0, energy.clone(), SigmaType::Standard, 4.0, 1000.0, 0.0, 0.0, 0.0, 0.0,
		);
		let wide = SimpleUndulatorSource::new(
			base, 0.0, energy, SigmaType::Standard, 4.0, 1000.0, 100.0, 10.0, 100.0, 10.0,
		);

		assert!(wide.source_width() > narrow.source_width());
	}
}
