use super::{direction_from_angles, EnergyDistribution, SourceBase};
use crate::kernel::rand::RayRand;
use crate::math::DVec3;
use crate::rays::Ray;

/// Places ⌊√N⌋² rays on a regular grid across the source rectangle and
/// the divergence square. The remaining rays reuse the first grid cells
/// and re-draw their energy; the field is scaled so every origin emits
/// the same total intensity regardless of N.
#[derive(Clone, Debug, PartialEq)]
pub struct MatrixSource {
	pub base: SourceBase,
	pub width: f64,
	pub height: f64,
	pub depth: f64,
	pub hor_divergence: f64,
	pub ver_divergence: f64,
	pub energy: EnergyDistribution,
}

impl MatrixSource {
	pub fn gen_ray(&self, ray_index: usize, path_id: i32, source_id: i32, rand: &mut RayRand) -> Ray {
		let n = self.base.num_rays;
		let rmat = (n as f64).sqrt().floor() as usize;
		let n_grid = rmat * rmat;
		let row = ray_index % rmat;
		let col = (ray_index / rmat) % rmat;

		// How many rays share this origin; the first `extra` cells take
		// one of the left-over rays each.
		let origin_index = row + rmat * col;
		let rays_per_origin = n / n_grid;
		let extra = n % n_grid;
		let rays_this_origin = rays_per_origin + usize::from(origin_index < extra);

		let step = |extent: f64, i: usize| {
			if rmat > 1 {
				-0.5 * extent + extent / (rmat - 1) as f64 * i as f64
			} else {
				0.0
			}
		};

		let x = step(self.width, row);
		let y = step(self.height, col);
		let z = (rand.random_double() - 0.5) * self.depth;
		let energy = self.energy.select(rand);

		let phi = step(self.hor_divergence, row);
		let psi = step(self.ver_divergence, col);
		let direction = direction_from_angles(phi, psi);

		let field = self.base.field().scale(1.0 / rays_this_origin as f64);

		self.base.emit(DVec3::new(x, y, z), direction, energy, field, path_id, source_id, *rand)
	}
}
