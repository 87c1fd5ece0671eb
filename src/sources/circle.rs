use super::{EnergyDistribution, SourceBase};
use crate::kernel::rand::RayRand;
use crate::math::{DVec3, Rad, PI};
use crate::rays::Ray;

/// Uniform origins whose directions land on one of `num_circles` rings
/// between the opening angles; the ring pattern shows up on the next
/// element downstream.
#[derive(Clone, Debug, PartialEq)]
pub struct CircleSource {
	pub base: SourceBase,
	pub width: f64,
	pub height: f64,
	pub depth: f64,
	pub num_circles: i32,
	pub min_opening_angle: Rad,
	pub max_opening_angle: Rad,
	pub delta_opening_angle: Rad,
	pub energy: EnergyDistribution,
}

impl CircleSource {
	pub fn gen_ray(&self, path_id: i32, source_id: i32, rand: &mut RayRand) -> Ray {
		let x = (rand.random_double() - 0.5) * self.width;
		let y = (rand.random_double() - 0.5) * self.height;
		let z = (rand.random_double() - 0.5) * self.depth;
		let energy = self.energy.select(rand);

		let direction = self.direction(rand);

		self.base.emit(DVec3::new(x, y, z), direction, energy, self.base.field(), path_id, source_id, *rand)
	}

	/// Picks a ring, spreads it by the delta angle and rotates by a
	/// uniform azimuth. The misalignment rotations fold directly into the
	/// direction, matching the legacy ray tool.
	fn direction(&self, rand: &mut RayRand) -> DVec3 {
		let azimuth = rand.random_double() * 2.0 * PI;

		let circle = if self.num_circles > 1 {
			rand.int_in_range(1, self.num_circles) - 1
		} else {
			0
		};

		let theta_between = if self.num_circles > 1 {
			(self.max_opening_angle.0 - self.min_opening_angle.0) / (self.num_circles as f64 - 1.0)
		} else {
			0.0
		};
		let theta = theta_between * circle as f64
			+ (rand.random_double() - 0.5) * self.delta_opening_angle.0
			+ self.min_opening_angle.0;

		let rx = self.base.misalignment.rotation_x.0;
		let ry = self.base.misalignment.rotation_y.0;

		let al = (azimuth.cos() * ry.cos() + azimuth.sin() * ry.sin() * rx.sin()) * theta.sin()
			+ rx.cos() * theta.cos() * ry.sin();
		let am = -theta.cos() * rx.sin() + rx.cos() * azimuth.sin() * theta.sin();
		let an = (-azimuth.cos() * ry.sin()) * theta.sin()
			+ ry.cos() * rx.cos() * theta.cos()
			+ ry.cos() * azimuth.sin() * rx.sin() * theta.sin();

		DVec3::new(al, am, an)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn directions_form_rings() {
		let s = CircleSource {
			base: SourceBase::new(100),
			width: 0.1,
			height: 0.1,
			depth: 0.0,
			num_circles: 3,
			min_opening_angle: Rad(0.001),
			max_opening_angle: Rad(0.003),
			delta_opening_angle: Rad(0.0),
			energy: EnergyDistribution::HardEdge { center: 100.0, spread: 1.0 },
		};

		for i in 0..300 {
			let ray = s.gen_ray(i, 0, &mut RayRand::for_path(13, i));
			let theta = ray.direction.z.acos();

			let on_some_ring = [0.001, 0.002, 0.003].iter().any(|r| (r - theta).abs() < 1e-9);
			assert!(on_some_ring, "theta {theta} is not a ring angle");
			assert!((ray.direction.length() - 1.0).abs() < 1e-12);
		}
	}
}
