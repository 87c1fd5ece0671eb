use byteorder::{ByteOrder, LittleEndian};

use super::behavior::Behavior;
use super::cutout::Cutout;
use super::surface::{PlaneDir, Surface};
use crate::math::{DMat4, Rad};

/// Gaussian slope-error widths plus the thermal-distortion and bowing
/// figures carried along for the record layout.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SlopeError {
	/// Sagittal slope error, radians.
	pub sag: f64,
	/// Meridional slope error, radians.
	pub mer: f64,
	pub thermal_distortion_amp: f64,
	pub thermal_distortion_sigma_x: f64,
	pub thermal_distortion_sigma_z: f64,
	pub cylindrical_bowing_amp: f64,
	pub cylindrical_bowing_radius: f64,
}

impl SlopeError {
	pub fn is_zero(&self) -> bool {
		self.sag == 0.0 && self.mer == 0.0
	}
}

/// A compiled optical element, flat enough for the device kernel. Both
/// transform directions are stored so no per-ray inversion is needed.
#[derive(Clone, Debug, PartialEq)]
pub struct Element {
	/// World to element coordinates.
	pub in_trans: DMat4,
	/// Element to world coordinates.
	pub out_trans: DMat4,
	pub surface: Surface,
	pub cutout: Cutout,
	pub behavior: Behavior,
	pub slope_error: SlopeError,
	pub azimuthal_angle: Rad,
	/// Atomic number of the substrate, or -1 when no material is attached.
	pub material: i32,
}

/// Size of one serialized element record, 16-byte aligned.
pub const ELEMENT_WIRE_SIZE: usize = 464;

impl Element {
	pub fn plane_dir(&self) -> PlaneDir {
		self.surface.plane_dir()
	}

	/// Serializes into the fixed 464-byte little-endian device layout:
	/// bytes 0..128 world-to-element, 128..256 element-to-world,
	/// 256..324 surface, 324..360 cutout, 360..420 behavior,
	/// 420..448 slope error, 448..456 azimuthal angle + material,
	/// trailing padding to 16-byte alignment.
	pub fn write_wire(&self, out: &mut [u8]) {
		assert_eq!(out.len(), ELEMENT_WIRE_SIZE);

		let mut off = 0;
		for m in [&self.in_trans, &self.out_trans] {
			for v in m.as_slice() {
				LittleEndian::write_f64(&mut out[off..off + 8], *v);
				off += 8;
			}
		}

		for v in self.surface.serialize() {
			LittleEndian::write_f32(&mut out[off..off + 4], v);
			off += 4;
		}
		for v in self.cutout.serialize() {
			LittleEndian::write_f32(&mut out[off..off + 4], v);
			off += 4;
		}
		for v in self.behavior.serialize() {
			LittleEndian::write_f32(&mut out[off..off + 4], v);
			off += 4;
		}

		let se = &self.slope_error;
		for v in [
			se.sag,
			se.mer,
			se.thermal_distortion_amp,
			se.thermal_distortion_sigma_x,
			se.thermal_distortion_sigma_z,
			se.cylindrical_bowing_amp,
			se.cylindrical_bowing_radius,
		] {
			LittleEndian::write_f32(&mut out[off..off + 4], v as f32);
			off += 4;
		}

		LittleEndian::write_f32(&mut out[off..off + 4], self.azimuthal_angle.0 as f32);
		off += 4;
		LittleEndian::write_f32(&mut out[off..off + 4], self.material as f32);
		off += 4;

		debug_assert_eq!(off, 456);
	}

	pub fn to_wire(&self) -> Vec<u8> {
		let mut out = vec![0u8; ELEMENT_WIRE_SIZE];
		self.write_wire(&mut out);
		out
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::element::surface::make_sphere;

	fn sample() -> Element {
		Element {
			in_trans: DMat4::identity(),
			out_trans: DMat4::identity(),
			surface: make_sphere(100.0),
			cutout: Cutout::Rect { size_x1: 50.0, size_x2: 50.0 },
			behavior: Behavior::Mirror,
			slope_error: SlopeError::default(),
			azimuthal_angle: Rad(0.5),
			material: 79,
		}
	}

	#[test]
	fn wire_offsets() {
		let wire = sample().to_wire();

		assert_eq!(wire.len(), ELEMENT_WIRE_SIZE);
		// Identity transform diagonal.
		assert_eq!(LittleEndian::read_f64(&wire[0..8]), 1.0);
		assert_eq!(LittleEndian::read_f64(&wire[120..128]), 1.0);
		assert_eq!(LittleEndian::read_f64(&wire[128..136]), 1.0);
		// Surface tag at 256, cutout tag at 324, behavior tag at 360.
		assert_eq!(LittleEndian::read_f32(&wire[256..260]), 0.0);
		assert_eq!(LittleEndian::read_f32(&wire[324..328]), 0.0);
		assert_eq!(LittleEndian::read_f32(&wire[360..364]), 0.0);
		// Material at 452.
		assert_eq!(LittleEndian::read_f32(&wire[452..456]), 79.0);
	}
}
