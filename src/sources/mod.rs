pub mod circle;
pub mod dipole;
pub mod energy;
pub mod matrix;
pub mod pixel;
pub mod point;
pub mod undulator;

pub use circle::CircleSource;
pub use dipole::{DipoleSource, ElectronEnergyOrientation};
pub use energy::{DatFile, EnergyDistribution};
pub use matrix::MatrixSource;
pub use pixel::PixelSource;
pub use point::PointSource;
pub use undulator::{SigmaType, SimpleUndulatorSource};

use crate::kernel::efield::stokes_to_field;
use crate::kernel::rand::RayRand;
use crate::math::{DMat4, DVec3, DVec4, Field3, Rad};
use crate::rays::{EventType, Ray};

/// Per-axis draw shape for origin and divergence offsets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SourceDist {
	#[default]
	Uniform,
	Gaussian,
	/// Two bands at ±[extent/6, extent/2], the pixel-source footprint.
	Thirds,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Misalignment {
	pub translation: DVec3,
	pub rotation_x: Rad,
	pub rotation_y: Rad,
	pub rotation_z: Rad,
}

/// Parameters shared by every light source, with the world transform
/// already folded in by the beamline compile.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceBase {
	pub num_rays: usize,
	/// World position of the source origin.
	pub position: DVec3,
	/// World orientation.
	pub orientation: DMat4,
	/// Polarization as a Stokes vector.
	pub stokes: DVec4,
	pub misalignment: Misalignment,
}

impl SourceBase {
	pub fn new(num_rays: usize) -> Self {
		Self {
			num_rays,
			position: DVec3::ZERO,
			orientation: DMat4::identity(),
			stokes: DVec4::new(1.0, 1.0, 0.0, 0.0),
			misalignment: Misalignment::default(),
		}
	}

	/// Electric field of an emitted ray, in the source frame.
	pub fn field(&self) -> Field3 {
		stokes_to_field(self.stokes, DVec3::Z, DVec3::Y)
	}

	/// Lifts a source-local position/direction pair into world space and
	/// assembles the emitted ray. The direction is re-normalized after the
	/// orientation is applied.
	pub fn emit(
		&self,
		local_position: DVec3,
		local_direction: DVec3,
		energy: f64,
		field: Field3,
		path_id: i32,
		source_id: i32,
		rand: RayRand,
	) -> Ray {
		let position = self.orientation.transform_vector(local_position + self.misalignment.translation) + self.position;
		let direction = self.orientation.transform_vector(local_direction).normalize().into_inner();

		let o = &self.orientation;
		let field = Field3::new(
			field.x * o[(0, 0)] + field.y * o[(0, 1)] + field.z * o[(0, 2)],
			field.x * o[(1, 0)] + field.y * o[(1, 1)] + field.z * o[(1, 2)],
			field.x * o[(2, 0)] + field.y * o[(2, 1)] + field.z * o[(2, 2)],
		);

		Ray {
			position,
			direction,
			energy,
			field,
			path_length: 0.0,
			order: 0.0,
			event_type: EventType::Emitted,
			last_element: -1,
			source_id,
			path_id,
			path_event_id: 0,
			rand,
		}
	}
}

/// Direction vector from a horizontal angle phi and a vertical angle psi,
/// relative to the main ray (0, 0, 1).
pub fn direction_from_angles(phi: f64, psi: f64) -> DVec3 {
	DVec3::new(psi.cos() * phi.sin(), -psi.sin(), psi.cos() * phi.cos())
}

/// Offset draw for one axis of a source.
pub fn draw_coord(dist: SourceDist, extent: f64, rand: &mut RayRand) -> f64 {
	match dist {
		SourceDist::Uniform => (rand.random_double() - 0.5) * extent,
		SourceDist::Gaussian => rand.normal(0.0, 1.0) * extent,
		SourceDist::Thirds => {
			let t = (rand.random_double() - 0.5) * 2.0 / 3.0 * extent;
			t + t.signum() * extent / 6.0
		}
	}
}

/// A light source, ready to materialize its rays. Each variant maps a ray
/// index to an emitted ray through its own distributions.
#[derive(Clone, Debug, PartialEq)]
pub enum Source {
	Matrix(MatrixSource),
	Point(PointSource),
	Pixel(PixelSource),
	Circle(CircleSource),
	SimpleUndulator(SimpleUndulatorSource),
	Dipole(DipoleSource),
}

impl Source {
	pub fn base(&self) -> &SourceBase {
		match self {
			Source::Matrix(s) => &s.base,
			Source::Point(s) => &s.base,
			Source::Pixel(s) => &s.base,
			Source::Circle(s) => &s.base,
			Source::SimpleUndulator(s) => &s.base,
			Source::Dipole(s) => &s.base,
		}
	}

	pub fn base_mut(&mut self) -> &mut SourceBase {
		match self {
			Source::Matrix(s) => &mut s.base,
			Source::Point(s) => &mut s.base,
			Source::Pixel(s) => &mut s.base,
			Source::Circle(s) => &mut s.base,
			Source::SimpleUndulator(s) => &mut s.base,
			Source::Dipole(s) => &mut s.base,
		}
	}

	pub fn num_rays(&self) -> usize {
		self.base().num_rays
	}

	/// Generates the ray with the given index within this source.
	/// `path_id` is the bundle-wide path index, `source_id` the source's
	/// object id; the random stream must already be seeded for the path.
	pub fn gen_ray(&self, ray_index: usize, path_id: i32, source_id: i32, mut rand: RayRand) -> Ray {
		match self {
			Source::Matrix(s) => s.gen_ray(ray_index, path_id, source_id, &mut rand),
			Source::Point(s) => s.gen_ray(path_id, source_id, &mut rand),
			Source::Pixel(s) => s.gen_ray(path_id, source_id, &mut rand),
			Source::Circle(s) => s.gen_ray(path_id, source_id, &mut rand),
			Source::SimpleUndulator(s) => s.gen_ray(path_id, source_id, &mut rand),
			Source::Dipole(s) => s.gen_ray(path_id, source_id, &mut rand),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn directions_are_unit_length() {
		let d = direction_from_angles(0.01, -0.02);

		assert!((d.length() - 1.0).abs() < 1e-12);
	}

	#[test]
	fn zero_angles_give_the_main_ray() {
		assert_eq!(direction_from_angles(0.0, 0.0), DVec3::Z);
	}

	#[test]
	fn thirds_avoids_the_center_band() {
		let mut rand = RayRand::for_path(1, 0);
		for _ in 0..500 {
			let x = draw_coord(SourceDist::Thirds, 6.0, &mut rand);
			assert!(x.abs() >= 1.0 - 1e-12 && x.abs() <= 3.0 + 1e-12, "band violation: {x}");
		}
	}
}
