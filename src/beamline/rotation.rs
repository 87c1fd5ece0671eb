use crate::math::{axis_angle_matrix, DMat3, DVec3, Rad};

/// A node's local orientation, in whichever form the importer supplied
/// it. All forms convert to a rotation matrix for the transform folds.
#[derive(Clone, Debug, PartialEq)]
pub enum Rotation {
	AxisAngle { axis: DVec3, angle: Rad },
	/// Basis vectors of the rotated frame.
	Basis { x: DVec3, y: DVec3, z: DVec3 },
	Matrix(DMat3),
}

impl Default for Rotation {
	fn default() -> Self {
		Rotation::Matrix(DMat3::identity())
	}
}

impl Rotation {
	pub fn to_matrix(&self) -> DMat3 {
		match self {
			Rotation::AxisAngle { axis, angle } => {
				axis_angle_matrix(axis.normalize().into_inner(), *angle)
			}
			Rotation::Basis { x, y, z } => DMat3::from_axes(*x, *y, *z),
			Rotation::Matrix(m) => *m,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::math::PI;

	#[test]
	fn axis_angle_matches_basis() {
		// A quarter turn around y maps z onto x.
		let a = Rotation::AxisAngle { axis: DVec3::Y, angle: Rad(PI / 2.0) }.to_matrix();
		let b = Rotation::Basis {
			x: DVec3::new(0.0, 0.0, -1.0),
			y: DVec3::Y,
			z: DVec3::X,
		}
		.to_matrix();

		for i in 0..9 {
			assert!((a.as_slice()[i] - b.as_slice()[i]).abs() < 1e-12, "entry {i}");
		}
	}
}
