use super::{direction_from_angles, draw_coord, EnergyDistribution, SourceBase, SourceDist};
use crate::kernel::rand::RayRand;
use crate::math::DVec3;
use crate::rays::Ray;

/// Four distinct pixels: origins land in two bands at ±[extent/6,
/// extent/2] per axis, divergences are uniform.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelSource {
	pub base: SourceBase,
	pub width: f64,
	pub height: f64,
	pub depth: f64,
	pub hor_divergence: f64,
	pub ver_divergence: f64,
	pub energy: EnergyDistribution,
}

impl PixelSource {
	pub fn gen_ray(&self, path_id: i32, source_id: i32, rand: &mut RayRand) -> Ray {
		let x = draw_coord(SourceDist::Thirds, self.width, rand);
		let y = draw_coord(SourceDist::Thirds, self.height, rand);
		let z = draw_coord(SourceDist::Uniform, self.depth, rand);
		let energy = self.energy.select(rand);

		let psi = draw_coord(SourceDist::Uniform, self.ver_divergence, rand);
		let phi = draw_coord(SourceDist::Uniform, self.hor_divergence, rand);
		let direction = direction_from_angles(phi, psi);

		self.base.emit(DVec3::new(x, y, z), direction, energy, self.base.field(), path_id, source_id, *rand)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn origins_fall_into_the_four_pixels() {
		let s = PixelSource {
			base: SourceBase::new(100),
			width: 6.0,
			height: 3.0,
			depth: 0.0,
			hor_divergence: 0.002,
			ver_divergence: 0.002,
			energy: EnergyDistribution::HardEdge { center: 100.0, spread: 0.0 },
		};

		for i in 0..500 {
			let ray = s.gen_ray(i, 0, &mut RayRand::for_path(11, i));
			let x = ray.position.x.abs();
			let y = ray.position.y.abs();
			assert!((1.0..=3.0).contains(&x), "x band violation: {x}");
			assert!((0.5..=1.5).contains(&y), "y band violation: {y}");

			let phi = ray.direction.x.atan2(ray.direction.z);
			assert!(phi.abs() <= 0.001 + 1e-12);
		}
	}
}
