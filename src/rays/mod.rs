pub mod soa;

pub use soa::{BundleHistory, RayAttrFlag, Rays};

use byteorder::{ByteOrder, LittleEndian};

use crate::kernel::rand::RayRand;
use crate::math::{Cplx, DVec3, Field3};

/// What happened to a ray at one point of its path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EventType {
	/// The ray left its light source. Ray is in world coordinates.
	Emitted = 0,
	/// The ray hit `last_element` and keeps tracing. Ray is in element
	/// coordinates of the hit element.
	JustHitElement = 1,
	/// The ray was absorbed by `last_element`.
	Absorbed = 2,
	/// The remaining path does not intersect any element; the ray flies
	/// off to infinity. Ray is in world coordinates.
	FlyOff = 3,
	/// A diffraction angle left the physical domain or the toroid
	/// iteration failed to converge.
	BeyondHorizon = 4,
	/// Another collision existed but the bounce cap was reached, or the
	/// dispatch was cancelled.
	NotEnoughBounces = 5,
	/// An assertion failed while tracing this ray.
	FatalError = 6,
	/// An output slot that was never written.
	#[default]
	Uninit = 7,
}

impl EventType {
	pub fn is_terminal(&self) -> bool {
		!matches!(self, EventType::Emitted | EventType::JustHitElement)
	}

	pub fn from_f32(v: f32) -> EventType {
		match v as i32 {
			0 => EventType::Emitted,
			1 => EventType::JustHitElement,
			2 => EventType::Absorbed,
			3 => EventType::FlyOff,
			4 => EventType::BeyondHorizon,
			5 => EventType::NotEnoughBounces,
			6 => EventType::FatalError,
			_ => EventType::Uninit,
		}
	}

	pub fn name(&self) -> &'static str {
		match self {
			EventType::Emitted => "Emitted",
			EventType::JustHitElement => "JustHitElement",
			EventType::Absorbed => "Absorbed",
			EventType::FlyOff => "FlyOff",
			EventType::BeyondHorizon => "BeyondHorizon",
			EventType::NotEnoughBounces => "NotEnoughBounces",
			EventType::FatalError => "FatalError",
			EventType::Uninit => "Uninit",
		}
	}

	pub fn parse(s: &str) -> Option<EventType> {
		Some(match s {
			"Emitted" => EventType::Emitted,
			"JustHitElement" => EventType::JustHitElement,
			"Absorbed" => EventType::Absorbed,
			"FlyOff" => EventType::FlyOff,
			"BeyondHorizon" => EventType::BeyondHorizon,
			"NotEnoughBounces" => EventType::NotEnoughBounces,
			"FatalError" => EventType::FatalError,
			"Uninit" => EventType::Uninit,
			_ => return None,
		})
	}
}

/// One ray, as traced by the kernel and as snapshotted into events.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
	pub position: DVec3,
	pub direction: DVec3,
	/// Photon energy in eV.
	pub energy: f64,
	/// Complex electric field.
	pub field: Field3,
	/// Optical path length accumulated so far, in mm.
	pub path_length: f64,
	/// Diffraction order picked at the last grating interaction.
	pub order: f64,
	pub event_type: EventType,
	/// Dense element index of the last element hit, -1 fresh from a source.
	pub last_element: i32,
	/// Object id of the emitting source.
	pub source_id: i32,
	/// Index of this ray within the bundle.
	pub path_id: i32,
	/// Sequence number of this event within the path, starting at 0 for
	/// the emitted event.
	pub path_event_id: i32,
	/// Per-ray deterministic random stream.
	pub rand: RayRand,
}

/// Size of one serialized ray, on the wire and in device buffers.
///
/// 3 f64 position + f32 event type + 3 f64 direction + f64 energy +
/// 6 f64 field + f64 path length + f32 order + f32 last element +
/// f32 source id. The 6-component field keeps the total at 128 bytes
/// without a trailing padding float.
pub const RAY_WIRE_SIZE: usize = 128;

impl Ray {
	pub fn write_wire(&self, out: &mut [u8]) {
		assert_eq!(out.len(), RAY_WIRE_SIZE);

		LittleEndian::write_f64(&mut out[0..], self.position.x);
		LittleEndian::write_f64(&mut out[8..], self.position.y);
		LittleEndian::write_f64(&mut out[16..], self.position.z);
		LittleEndian::write_f32(&mut out[24..], self.event_type as i32 as f32);
		LittleEndian::write_f64(&mut out[28..], self.direction.x);
		LittleEndian::write_f64(&mut out[36..], self.direction.y);
		LittleEndian::write_f64(&mut out[44..], self.direction.z);
		LittleEndian::write_f64(&mut out[52..], self.energy);
		LittleEndian::write_f64(&mut out[60..], self.field.x.re);
		LittleEndian::write_f64(&mut out[68..], self.field.x.im);
		LittleEndian::write_f64(&mut out[76..], self.field.y.re);
		LittleEndian::write_f64(&mut out[84..], self.field.y.im);
		LittleEndian::write_f64(&mut out[92..], self.field.z.re);
		LittleEndian::write_f64(&mut out[100..], self.field.z.im);
		LittleEndian::write_f64(&mut out[108..], self.path_length);
		LittleEndian::write_f32(&mut out[116..], self.order as f32);
		LittleEndian::write_f32(&mut out[120..], self.last_element as f32);
		LittleEndian::write_f32(&mut out[124..], self.source_id as f32);
	}

	pub fn read_wire(buf: &[u8]) -> Ray {
		assert_eq!(buf.len(), RAY_WIRE_SIZE);

		Ray {
			position: DVec3::new(
				LittleEndian::read_f64(&buf[0..]),
				LittleEndian::read_f64(&buf[8..]),
				LittleEndian::read_f64(&buf[16..]),
			),
			event_type: EventType::from_f32(LittleEndian::read_f32(&buf[24..])),
			direction: DVec3::new(
				LittleEndian::read_f64(&buf[28..]),
				LittleEndian::read_f64(&buf[36..]),
				LittleEndian::read_f64(&buf[44..]),
			),
			energy: LittleEndian::read_f64(&buf[52..]),
			field: Field3::new(
				Cplx::new(LittleEndian::read_f64(&buf[60..]), LittleEndian::read_f64(&buf[68..])),
				Cplx::new(LittleEndian::read_f64(&buf[76..]), LittleEndian::read_f64(&buf[84..])),
				Cplx::new(LittleEndian::read_f64(&buf[92..]), LittleEndian::read_f64(&buf[100..])),
			),
			path_length: LittleEndian::read_f64(&buf[108..]),
			order: LittleEndian::read_f32(&buf[116..]) as f64,
			last_element: LittleEndian::read_f32(&buf[120..]) as i32,
			source_id: LittleEndian::read_f32(&buf[124..]) as i32,
			path_id: 0,
			path_event_id: 0,
			rand: RayRand::new(0),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn wire_round_trip() {
		let ray = Ray {
			position: DVec3::new(1.0, -2.0, 3.5),
			direction: DVec3::new(0.0, 0.0, 1.0),
			energy: 100.0,
			field: Field3::new(Cplx::new(1.0, 0.5), Cplx::new(0.0, 0.0), Cplx::new(-0.25, 2.0)),
			path_length: 1234.5,
			order: -1.0,
			event_type: EventType::JustHitElement,
			last_element: 3,
			source_id: 0,
			path_id: 17,
			path_event_id: 2,
			rand: RayRand::new(42),
		};

		let mut buf = [0u8; RAY_WIRE_SIZE];
		ray.write_wire(&mut buf);
		let back = Ray::read_wire(&buf);

		assert_eq!(back.position, ray.position);
		assert_eq!(back.direction, ray.direction);
		assert_eq!(back.energy, ray.energy);
		assert_eq!(back.field, ray.field);
		assert_eq!(back.path_length, ray.path_length);
		assert_eq!(back.order, ray.order);
		assert_eq!(back.event_type, ray.event_type);
		assert_eq!(back.last_element, ray.last_element);
		assert_eq!(back.source_id, ray.source_id);
	}
}
