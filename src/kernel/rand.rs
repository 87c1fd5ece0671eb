use rand::RngCore;

/// Per-ray deterministic random stream.
///
/// A splitmix64 walk over a single u64 of state, so it can live inside the
/// ray record on the device. The stream for a ray is fully determined by
/// the dispatch seed and the ray's path id, which makes whole traces
/// reproducible across CPU and GPU.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RayRand {
	state: u64,
}

impl RayRand {
	pub const fn new(state: u64) -> Self {
		Self { state }
	}

	/// Stream for one ray: the dispatch seed mixed with the path id.
	pub fn for_path(seed: u64, path_id: i32) -> Self {
		let mut rand = Self::new(seed ^ (path_id as u64).wrapping_mul(0x9e3779b97f4a7c15));
		// One warm-up step decorrelates neighbouring path ids.
		rand.next_u64();
		rand
	}

	pub fn state(&self) -> u64 {
		self.state
	}

	#[inline]
	pub fn next_u64(&mut self) -> u64 {
		self.state = self.state.wrapping_add(0x9e3779b97f4a7c15);
		let mut z = self.state;
		z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
		z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
		z ^ (z >> 31)
	}

	/// Uniform in [0, 1).
	#[inline]
	pub fn random_double(&mut self) -> f64 {
		(self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
	}

	/// Uniform in [min(a, b), max(a, b)).
	pub fn in_range(&mut self, a: f64, b: f64) -> f64 {
		let (min, max) = if a <= b { (a, b) } else { (b, a) };
		min + self.random_double() * (max - min)
	}

	/// Uniform integer in [min(a, b), max(a, b)], both ends inclusive.
	pub fn int_in_range(&mut self, a: i32, b: i32) -> i32 {
		let (min, max) = if a <= b { (a, b) } else { (b, a) };
		let span = (max - min) as u64 + 1;
		min + (self.next_u64() % span) as i32
	}

	/// A draw from N(mean, stddev), via Box-Muller.
	pub fn normal(&mut self, mean: f64, stddev: f64) -> f64 {
		let u1 = loop {
			let u = self.random_double();
			if u > 0.0 {
				break u;
			}
		};
		let u2 = self.random_double();
		let mag = (-2.0 * u1.ln()).sqrt();
		mean + stddev * mag * (2.0 * std::f64::consts::PI * u2).cos()
	}
}

impl RngCore for RayRand {
	fn next_u32(&mut self) -> u32 {
		(RayRand::next_u64(self) >> 32) as u32
	}

	fn next_u64(&mut self) -> u64 {
		RayRand::next_u64(self)
	}

	fn fill_bytes(&mut self, dest: &mut [u8]) {
		for chunk in dest.chunks_mut(8) {
			let bytes = RayRand::next_u64(self).to_le_bytes();
			chunk.copy_from_slice(&bytes[..chunk.len()]);
		}
	}

	fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
		self.fill_bytes(dest);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn same_seed_same_stream() {
		let mut a = RayRand::for_path(42, 7);
		let mut b = RayRand::for_path(42, 7);

		for _ in 0..100 {
			assert_eq!(a.next_u64(), b.next_u64());
		}
	}

	#[test]
	fn different_paths_diverge() {
		let mut a = RayRand::for_path(42, 0);
		let mut b = RayRand::for_path(42, 1);

		assert_ne!(a.next_u64(), b.next_u64());
	}

	#[test]
	fn uniform_is_in_unit_interval() {
		let mut rand = RayRand::for_path(1, 0);
		for _ in 0..1000 {
			let x = rand.random_double();
			assert!((0.0..1.0).contains(&x));
		}
	}

	#[test]
	fn int_in_range_is_inclusive() {
		let mut rand = RayRand::for_path(3, 0);
		let mut seen = [false; 4];
		for _ in 0..200 {
			let x = rand.int_in_range(0, 3);
			seen[x as usize] = true;
		}
		assert!(seen.iter().all(|&s| s), "all values of a small range should occur");
	}

	#[test]
	fn normal_matches_moments() {
		let mut rand = RayRand::for_path(5, 0);
		let n = 20000;
		let samples: Vec<f64> = (0..n).map(|_| rand.normal(10.0, 2.0)).collect();

		let mean = samples.iter().sum::<f64>() / n as f64;
		let var = samples.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n as f64;

		assert!((mean - 10.0).abs() < 0.05, "sample mean {mean}");
		assert!((var.sqrt() - 2.0).abs() < 0.05, "sample stddev {}", var.sqrt());
	}
}
