use super::cutout::Cutout;
use crate::math::Rad;

pub const BTYPE_MIRROR: u32 = 0;
pub const BTYPE_GRATING: u32 = 1;
pub const BTYPE_SLIT: u32 = 2;
pub const BTYPE_RZP: u32 = 3;
pub const BTYPE_IMAGE_PLANE: u32 = 4;
pub const BTYPE_CRYSTAL: u32 = 5;
pub const BTYPE_ABSORB: u32 = 6;

/// What an element does to a ray at the intersection point.
#[derive(Clone, Debug, PartialEq)]
pub enum Behavior {
	/// Reflects, updating the field via Fresnel coefficients from the
	/// element's material.
	Mirror,
	Grating(GratingBehavior),
	Slit(SlitBehavior),
	Rzp(RzpBehavior),
	/// Records the ray without changing its direction.
	ImagePlane,
	Crystal(CrystalBehavior),
	/// Terminates every ray that hits it.
	Absorb,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GratingBehavior {
	/// Variable-line-spacing polynomial coefficients.
	pub vls: [f64; 6],
	/// Lines per millimeter at the grating center.
	pub line_density: f64,
	pub order: f64,
}

/// The opening transmits, the beamstop absorbs; the beamstop takes
/// precedence inside the opening.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlitBehavior {
	pub opening: Cutout,
	pub beamstop: Cutout,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RzpImageType {
	PointToPoint,
	AstigmaticToAstigmatic,
}

/// Whether the zone-plate design was specified through an exit angle or
/// through an offset of the Fresnel center. The compile step derives the
/// missing quantity, so the kernel always sees both.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RzpDesignType {
	ZOffset,
	Beta,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RzpBehavior {
	pub image_type: RzpImageType,
	pub rzp_type: i32,
	pub derivation_method: i32,
	/// Wavelength the zone pattern was designed for, in nm.
	pub design_wavelength: f64,
	pub design_order: f64,
	pub order: f64,
	pub fresnel_z_offset: f64,
	pub sagittal_entrance_arm: f64,
	pub sagittal_exit_arm: f64,
	pub meridional_entrance_arm: f64,
	pub meridional_exit_arm: f64,
	pub design_alpha: Rad,
	pub design_beta: Rad,
	/// When set, rays split 50/50 between the design order and order zero.
	pub additional_order: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CrystalBehavior {
	/// d² of the lattice spacing, in Å².
	pub d_spacing_sq: f64,
	pub unit_cell_volume: f64,
	pub offset_angle: Rad,
	pub structure_factor_f0: (f64, f64),
	pub structure_factor_fh: (f64, f64),
	pub structure_factor_fhc: (f64, f64),
}

impl Behavior {
	/// Serializes to the fixed shader layout: one tag plus 14 payload
	/// values, all f32.
	pub fn serialize(&self) -> [f32; 15] {
		let mut ser = [0.0f32; 15];
		match self {
			Behavior::Mirror => {
				ser[0] = BTYPE_MIRROR as f32;
			}
			Behavior::Grating(g) => {
				ser[0] = BTYPE_GRATING as f32;
				for (i, v) in g.vls.iter().enumerate() {
					ser[1 + i] = *v as f32;
				}
				ser[7] = g.line_density as f32;
				ser[8] = g.order as f32;
			}
			Behavior::Slit(s) => {
				ser[0] = BTYPE_SLIT as f32;
				s.opening.write(&mut ser[1..5]);
				s.beamstop.write(&mut ser[5..9]);
			}
			Behavior::Rzp(r) => {
				ser[0] = BTYPE_RZP as f32;
				ser[1] = match r.image_type {
					RzpImageType::PointToPoint => 0.0,
					RzpImageType::AstigmaticToAstigmatic => 1.0,
				};
				ser[2] = r.rzp_type as f32;
				ser[3] = r.design_wavelength as f32;
				ser[4] = r.design_order as f32;
				ser[5] = r.order as f32;
				ser[6] = r.fresnel_z_offset as f32;
				ser[7] = r.sagittal_entrance_arm as f32;
				ser[8] = r.sagittal_exit_arm as f32;
				ser[9] = r.meridional_entrance_arm as f32;
				ser[10] = r.meridional_exit_arm as f32;
				ser[11] = r.design_alpha.0 as f32;
				ser[12] = r.design_beta.0 as f32;
				ser[13] = if r.additional_order { 1.0 } else { 0.0 };
				ser[14] = r.derivation_method as f32;
			}
			Behavior::ImagePlane => {
				ser[0] = BTYPE_IMAGE_PLANE as f32;
			}
			Behavior::Crystal(c) => {
				ser[0] = BTYPE_CRYSTAL as f32;
				ser[1] = c.d_spacing_sq as f32;
				ser[2] = c.unit_cell_volume as f32;
				ser[3] = c.offset_angle.0 as f32;
				ser[4] = c.structure_factor_f0.0 as f32;
				ser[5] = c.structure_factor_f0.1 as f32;
				ser[6] = c.structure_factor_fh.0 as f32;
				ser[7] = c.structure_factor_fh.1 as f32;
				ser[8] = c.structure_factor_fhc.0 as f32;
				ser[9] = c.structure_factor_fhc.1 as f32;
			}
			Behavior::Absorb => {
				ser[0] = BTYPE_ABSORB as f32;
			}
		}
		ser
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use super::super::cutout::CTYPE_RECT;

	#[test]
	fn slit_payload_packs_both_cutouts() {
		let b = Behavior::Slit(SlitBehavior {
			opening: Cutout::Rect { size_x1: 3.0, size_x2: 3.0 },
			beamstop: Cutout::Rect { size_x1: 1.0, size_x2: 1.0 },
		});
		let ser = b.serialize();

		assert_eq!(ser[0], BTYPE_SLIT as f32);
		assert_eq!(&ser[1..5], &[CTYPE_RECT as f32, 3.0, 3.0, 0.0]);
		assert_eq!(&ser[5..9], &[CTYPE_RECT as f32, 1.0, 1.0, 0.0]);
	}
}
