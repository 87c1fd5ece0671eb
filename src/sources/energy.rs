use std::path::Path;

use crate::kernel::rand::RayRand;
use crate::{Error, Result};

/// How a source picks the photon energy of each ray.
#[derive(Clone, Debug, PartialEq)]
pub enum EnergyDistribution {
	/// Uniform in [center - spread/2, center + spread/2].
	HardEdge { center: f64, spread: f64 },
	/// Normal around the center.
	SoftEdge { center: f64, sigma: f64 },
	/// One of `count` equally spaced levels across the spread. A single
	/// level degenerates to the center energy.
	SeparateEnergies { center: f64, spread: f64, count: i32 },
	/// A weighted table of discrete energies, optionally interpolated
	/// uniformly within the selected bin.
	DatFile(DatFile),
}

#[derive(Clone, Debug, PartialEq)]
pub struct DatFile {
	pub energies: Vec<f64>,
	pub weights: Vec<f64>,
	pub continuous: bool,
	prefix_weights: Vec<f64>,
}

impl DatFile {
	pub fn new(energies: Vec<f64>, weights: Vec<f64>, continuous: bool) -> Self {
		let mut prefix_weights = Vec::with_capacity(weights.len());
		let mut sum = 0.0;
		for w in &weights {
			sum += w;
			prefix_weights.push(sum);
		}
		Self { energies, weights, continuous, prefix_weights }
	}

	/// Reads a two-column whitespace table of (energy, weight) lines.
	/// Lines starting with '#' are comments.
	pub fn load(path: &Path, continuous: bool) -> Result<Self> {
		let text = std::fs::read_to_string(path)?;
		let mut energies = Vec::new();
		let mut weights = Vec::new();
		for line in text.lines() {
			let line = line.trim();
			if line.is_empty() || line.starts_with('#') {
				continue;
			}
			let mut cols = line.split_whitespace();
			let e = cols.next().ok_or_else(|| Error::Parse(format!("{}: missing energy", path.display())))?;
			let w = cols.next().ok_or_else(|| Error::Parse(format!("{}: missing weight", path.display())))?;
			energies.push(e.parse::<f64>().map_err(|e| Error::Parse(e.to_string()))?);
			weights.push(w.parse::<f64>().map_err(|e| Error::Parse(e.to_string()))?);
		}
		if energies.is_empty() {
			return Err(Error::Parse(format!("{}: empty distribution", path.display())));
		}
		Ok(Self::new(energies, weights, continuous))
	}

	fn weight_sum(&self) -> f64 {
		self.prefix_weights.last().copied().unwrap_or(0.0)
	}

	fn select(&self, rand: &mut RayRand) -> f64 {
		let r = rand.random_double() * self.weight_sum();

		// Binary search for the first prefix weight above r.
		let mut left = 0;
		let mut right = self.prefix_weights.len() - 1;
		while left < right {
			let mid = left + (right - left) / 2;
			if r > self.prefix_weights[mid] {
				left = mid + 1;
			} else {
				right = mid;
			}
		}

		if self.continuous {
			// Interpolate uniformly towards the neighbouring bin center.
			let lo = self.energies[left];
			let hi = if left + 1 < self.energies.len() { self.energies[left + 1] } else { lo };
			rand.in_range(lo, hi)
		} else {
			self.energies[left]
		}
	}
}

impl EnergyDistribution {
	pub fn select(&self, rand: &mut RayRand) -> f64 {
		match self {
			EnergyDistribution::HardEdge { center, spread } => {
				rand.in_range(center - spread / 2.0, center + spread / 2.0)
			}
			EnergyDistribution::SoftEdge { center, sigma } => rand.normal(*center, *sigma),
			EnergyDistribution::SeparateEnergies { center, spread, count } => {
				let count = (*count).max(1);
				if count == 1 {
					return *center;
				}
				let level = rand.int_in_range(0, count - 1);
				let t = level as f64 / (count - 1) as f64 - 0.5;
				center + t * spread
			}
			EnergyDistribution::DatFile(table) => table.select(rand),
		}
	}

	/// The average energy, used for design-wavelength defaults.
	pub fn mean(&self) -> f64 {
		match self {
			EnergyDistribution::HardEdge { center, .. } => *center,
			EnergyDistribution::SoftEdge { center, .. } => *center,
			EnergyDistribution::SeparateEnergies { center, .. } => *center,
			EnergyDistribution::DatFile(table) => {
				let sum: f64 = table.weights.iter().sum();
				if sum == 0.0 {
					return 0.0;
				}
				table.energies.iter().zip(&table.weights).map(|(e, w)| e * w).sum::<f64>() / sum
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hard_edge_stays_in_bounds() {
		let dist = EnergyDistribution::HardEdge { center: 100.0, spread: 10.0 };
		let mut rand = RayRand::for_path(1, 0);

		for _ in 0..1000 {
			let e = dist.select(&mut rand);
			assert!((95.0..=105.0).contains(&e), "energy {e} out of bounds");
		}
	}

	#[test]
	fn soft_edge_converges_to_center() {
		let dist = EnergyDistribution::SoftEdge { center: 100.0, sigma: 5.0 };
		let mut rand = RayRand::for_path(2, 0);

		let n = 20000;
		let samples: Vec<f64> = (0..n).map(|_| dist.select(&mut rand)).collect();
		let mean = samples.iter().sum::<f64>() / n as f64;
		let var = samples.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n as f64;

		assert!((mean - 100.0).abs() < 0.15);
		assert!((var.sqrt() - 5.0).abs() < 0.15);
	}

	#[test]
	fn separate_energies_hits_exact_levels() {
		let dist = EnergyDistribution::SeparateEnergies { center: 100.0, spread: 10.0, count: 3 };
		let mut rand = RayRand::for_path(3, 0);

		for _ in 0..200 {
			let e = dist.select(&mut rand);
			assert!(
				[95.0, 100.0, 105.0].iter().any(|l| (l - e).abs() < 1e-12),
				"energy {e} is not a level",
			);
		}
	}

	#[test]
	fn single_separate_energy_is_the_center() {
		let dist = EnergyDistribution::SeparateEnergies { center: 42.0, spread: 10.0, count: 1 };
		let mut rand = RayRand::for_path(4, 0);

		assert_eq!(dist.select(&mut rand), 42.0);
	}

	#[test]
	fn dat_file_respects_weights() {
		let table = DatFile::new(vec![1.0, 2.0, 3.0], vec![0.0, 1.0, 0.0], false);
		let dist = EnergyDistribution::DatFile(table);
		let mut rand = RayRand::for_path(5, 0);

		for _ in 0..100 {
			assert_eq!(dist.select(&mut rand), 2.0);
		}
	}
}
