use super::{direction_from_angles, draw_coord, EnergyDistribution, SourceBase, SourceDist};
use crate::kernel::rand::RayRand;
use crate::math::DVec3;
use crate::rays::Ray;

/// Random rays with a per-axis choice of uniform or Gaussian draws for
/// origin and divergence; the depth is always uniform.
#[derive(Clone, Debug, PartialEq)]
pub struct PointSource {
	pub base: SourceBase,
	pub width: f64,
	pub height: f64,
	pub depth: f64,
	pub width_dist: SourceDist,
	pub height_dist: SourceDist,
	pub hor_dist: SourceDist,
	pub ver_dist: SourceDist,
	pub hor_divergence: f64,
	pub ver_divergence: f64,
	pub energy: EnergyDistribution,
}

impl PointSource {
	pub fn gen_ray(&self, path_id: i32, source_id: i32, rand: &mut RayRand) -> Ray {
		let x = draw_coord(self.width_dist, self.width, rand);
		let y = draw_coord(self.height_dist, self.height, rand);
		let z = (rand.random_double() - 0.5) * self.depth;
		let energy = self.energy.select(rand);

		let psi = draw_coord(self.ver_dist, self.ver_divergence, rand);
		let phi = draw_coord(self.hor_dist, self.hor_divergence, rand);
		let direction = direction_from_angles(phi, psi);

		self.base.emit(DVec3::new(x, y, z), direction, energy, self.base.field(), path_id, source_id, *rand)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn uniform_origin_stays_in_extent() {
		let s = PointSource {
			base: SourceBase::new(100),
			width: 2.0,
			height: 1.0,
			depth: 0.5,
			width_dist: SourceDist::Uniform,
			height_dist: SourceDist::Uniform,
			hor_dist: SourceDist::Uniform,
			ver_dist: SourceDist::Uniform,
			hor_divergence: 0.001,
			ver_divergence: 0.001,
			energy: EnergyDistribution::HardEdge { center: 100.0, spread: 2.0 },
		};

		for i in 0..500 {
			let ray = s.gen_ray(i, 0, &mut RayRand::for_path(7, i));
			assert!(ray.position.x.abs() <= 1.0);
			assert!(ray.position.y.abs() <= 0.5);
			assert!(ray.position.z.abs() <= 0.25);
			assert!((ray.direction.length() - 1.0).abs() < 1e-12);
			assert!((99.0..=101.0).contains(&ray.energy));
		}
	}
}
