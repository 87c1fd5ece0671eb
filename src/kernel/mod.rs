pub mod behave;
pub mod efield;
pub mod intersect;
pub mod rand;

use std::sync::atomic::{AtomicBool, Ordering};

use behave::{behave, BehaveResult};
use intersect::{intersect, IntersectResult, Intersection, EPSILON};
use self::rand::RayRand;

use crate::element::record::Element;
use crate::element::surface::{PlaneDir, Surface};
use crate::material::MaterialTables;
use crate::math::{axis_angle_matrix, DVec3, Rad};
use crate::rays::{EventType, Ray};

/// In sequential mode each ray must hit the elements in declared order;
/// the first miss makes it fly off.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Sequential {
	#[default]
	No,
	Yes,
}

/// Read-only per-dispatch inputs, shared by every ray.
pub struct TraceArgs<'a> {
	pub elements: &'a [Element],
	pub materials: &'a MaterialTables,
	pub max_bounces: u32,
	pub sequential: Sequential,
	pub cancel: &'a AtomicBool,
}

struct Collision {
	element_index: usize,
	/// Ray direction transformed into the element's coordinates.
	direction: DVec3,
	intersection: Intersection,
}

enum CollisionResult {
	Hit(Collision),
	None,
	/// An intersection routine diverged on the given element.
	BeyondHorizon(usize),
	/// A surface with non-finite coefficients was encountered.
	Fatal(usize),
}

fn find_collision(ray: &Ray, args: &TraceArgs, previous: i32) -> CollisionResult {
	match args.sequential {
		Sequential::Yes => {
			let next = (previous + 1) as usize;
			if next >= args.elements.len() {
				return CollisionResult::None;
			}
			match try_element(ray, args, next) {
				Ok(Some(collision)) => CollisionResult::Hit(collision),
				Ok(None) => CollisionResult::None,
				Err(result) => result,
			}
		}
		Sequential::No => {
			let mut best: Option<Collision> = None;
			for index in 0..args.elements.len() {
				// Skip the element the ray just left to avoid
				// self-intersection artifacts.
				if index as i32 == previous {
					continue;
				}
				match try_element(ray, args, index) {
					Ok(Some(collision)) => {
						let better = match &best {
							None => true,
							Some(current) => {
								collision.intersection.t < current.intersection.t - EPSILON
							}
						};
						if better {
							best = Some(collision);
						}
					}
					Ok(None) => {}
					Err(result) => return result,
				}
			}
			match best {
				Some(collision) => CollisionResult::Hit(collision),
				None => CollisionResult::None,
			}
		}
	}
}

/// Intersects one element; `Ok(None)` is a clean miss.
fn try_element(ray: &Ray, args: &TraceArgs, index: usize) -> Result<Option<Collision>, CollisionResult> {
	let element = &args.elements[index];

	if let Surface::Quadric(q) = &element.surface {
		if !q.is_finite() {
			return Err(CollisionResult::Fatal(index));
		}
	}

	let origin = element.in_trans.transform_point(ray.position);
	let direction = element.in_trans.transform_vector(ray.direction);

	let intersection = match intersect(&element.surface, origin, direction) {
		IntersectResult::Hit(hit) => hit,
		IntersectResult::Miss => return Ok(None),
		IntersectResult::BeyondHorizon => return Err(CollisionResult::BeyondHorizon(index)),
	};

	let (x1, x2) = match element.plane_dir() {
		PlaneDir::Xz => (intersection.point.x, intersection.point.z),
		PlaneDir::Xy => (intersection.point.x, intersection.point.y),
	};
	if !element.cutout.contains(x1, x2) {
		return Ok(None);
	}

	Ok(Some(Collision { element_index: index, direction, intersection }))
}

/// Gaussian perturbation of the surface normal: one draw each for the
/// sagittal and meridional slope, applied as small rotations about the
/// element's z and x axes.
fn perturb_normal(normal: DVec3, sag: f64, mer: f64, rand: &mut RayRand) -> DVec3 {
	let g_sag = rand.normal(0.0, sag);
	let g_mer = rand.normal(0.0, mer);

	let rotated = axis_angle_matrix(DVec3::X, Rad(g_mer)) * (axis_angle_matrix(DVec3::Z, Rad(g_sag)) * normal);
	rotated.normalize().into_inner()
}

/// Traces one emitted ray to termination, pushing every event through
/// `record`. Events at an element are recorded in that element's
/// coordinates, fly-off and cancellation events in world coordinates.
pub fn trace_path(mut ray: Ray, args: &TraceArgs, record: &mut dyn FnMut(&Ray)) {
	debug_assert_eq!(ray.event_type, EventType::Emitted);
	record(&ray);

	let mut emit = |ray: &mut Ray, event_type: EventType, last_element: i32| {
		ray.event_type = event_type;
		ray.last_element = last_element;
		ray.path_event_id += 1;
		record(ray);
	};

	for _ in 0..args.max_bounces {
		if args.cancel.load(Ordering::Relaxed) {
			let last_element = ray.last_element;
			emit(&mut ray, EventType::NotEnoughBounces, last_element);
			return;
		}

		let collision = match find_collision(&ray, args, ray.last_element) {
			CollisionResult::Hit(collision) => collision,
			CollisionResult::None => {
				let last_element = ray.last_element;
				emit(&mut ray, EventType::FlyOff, last_element);
				return;
			}
			CollisionResult::BeyondHorizon(index) => {
				emit(&mut ray, EventType::BeyondHorizon, index as i32);
				return;
			}
			CollisionResult::Fatal(index) => {
				emit(&mut ray, EventType::FatalError, index as i32);
				return;
			}
		};

		let element = &args.elements[collision.element_index];

		// Move into element coordinates and onto the surface.
		ray.position = collision.intersection.point;
		ray.direction = collision.direction;
		ray.path_length += collision.intersection.t;

		let normal = if element.slope_error.is_zero() {
			collision.intersection.normal
		} else {
			perturb_normal(
				collision.intersection.normal,
				element.slope_error.sag,
				element.slope_error.mer,
				&mut ray.rand,
			)
		};

		match behave(&mut ray, element, normal, args.materials) {
			BehaveResult::Continue => {
				emit(&mut ray, EventType::JustHitElement, collision.element_index as i32);

				// Back to world coordinates for the next leg.
				ray.position = element.out_trans.transform_point(ray.position);
				ray.direction = element
					.out_trans
					.transform_vector(ray.direction)
					.normalize()
					.into_inner();
			}
			BehaveResult::Absorbed => {
				emit(&mut ray, EventType::Absorbed, collision.element_index as i32);
				return;
			}
			BehaveResult::BeyondHorizon => {
				emit(&mut ray, EventType::BeyondHorizon, collision.element_index as i32);
				return;
			}
		}
	}

	// The bounce budget ran out; distinguish a pending collision from a
	// clean exit.
	let last_element = ray.last_element;
	match find_collision(&ray, args, last_element) {
		CollisionResult::None => emit(&mut ray, EventType::FlyOff, last_element),
		_ => emit(&mut ray, EventType::NotEnoughBounces, last_element),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::element::behavior::Behavior;
	use crate::element::cutout::Cutout;
	use crate::element::record::SlopeError;
	use crate::kernel::efield::stokes_to_field;
	use crate::kernel::rand::RayRand;
	use crate::math::{DMat3, DMat4, DVec4};

	fn emitted_ray(position: DVec3, direction: DVec3) -> Ray {
		Ray {
			position,
			direction,
			energy: 100.0,
			field: stokes_to_field(DVec4::new(1.0, 1.0, 0.0, 0.0), DVec3::Z, DVec3::Y),
			path_length: 0.0,
			order: 0.0,
			event_type: EventType::Emitted,
			last_element: -1,
			source_id: 0,
			path_id: 0,
			path_event_id: 0,
			rand: RayRand::for_path(42, 0),
		}
	}

	fn element_at(z: f64, rotation: DMat3, surface: Surface, behavior: Behavior) -> Element {
		let out_trans = DMat4::from_rotation_translation(rotation, DVec3::new(0.0, 0.0, z));
		Element {
			in_trans: out_trans.inv(),
			out_trans,
			surface,
			cutout: Cutout::Rect { size_x1: 100.0, size_x2: 100.0 },
			behavior,
			slope_error: SlopeError::default(),
			azimuthal_angle: Rad(0.0),
			material: crate::material::MATERIAL_VACUUM,
		}
	}

	/// A plane mirror at the given distance with the given grazing angle
	/// towards a beam travelling along +z. Tilting the surface by the
	/// grazing angle about x leaves the normal at `(0, cos g, -sin g)`.
	fn plane_mirror(z: f64, grazing: f64) -> Element {
		let rotation = axis_angle_matrix(DVec3::X, Rad(-grazing));
		element_at(z, rotation, Surface::PlaneXz, Behavior::Mirror)
	}

	fn image_plane(z: f64) -> Element {
		let mut element = element_at(z, DMat3::identity(), Surface::PlaneXy, Behavior::ImagePlane);
		element.cutout = Cutout::Unlimited;
		element
	}

	fn trace_collect(ray: Ray, elements: &[Element], sequential: Sequential) -> Vec<Ray> {
		let cancel = AtomicBool::new(false);
		let args = TraceArgs {
			elements,
			materials: &MaterialTables::default(),
			max_bounces: 16,
			sequential,
			cancel: &cancel,
		};
		let mut events = Vec::new();
		trace_path(ray, &args, &mut |event| events.push(*event));
		events
	}

	#[test]
	fn lone_ray_flies_off() {
		let events = trace_collect(emitted_ray(DVec3::ZERO, DVec3::Z), &[], Sequential::No);

		assert_eq!(events.len(), 2);
		assert_eq!(events[0].event_type, EventType::Emitted);
		assert_eq!(events[1].event_type, EventType::FlyOff);
		assert_eq!(events[1].path_event_id, 1);
	}

	#[test]
	fn mirror_and_image_plane() {
		let grazing = 10.0_f64.to_radians();
		let elements = vec![plane_mirror(1000.0, grazing), image_plane(2000.0)];

		let events = trace_collect(emitted_ray(DVec3::ZERO, DVec3::Z), &elements, Sequential::No);

		let kinds: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
		assert_eq!(
			kinds,
			vec![EventType::Emitted, EventType::JustHitElement, EventType::JustHitElement, EventType::FlyOff],
		);
		assert_eq!(events[1].last_element, 0);
		assert_eq!(events[2].last_element, 1);

		// Monotone path event ids on one path.
		for (i, event) in events.iter().enumerate() {
			assert_eq!(event.path_event_id, i as i32);
			assert!((event.direction.length() - 1.0).abs() < 1e-9);
		}
	}

	#[test]
	fn mirror_deflects_by_twice_the_grazing_angle() {
		let grazing = 10.0_f64.to_radians();
		let elements = vec![plane_mirror(1000.0, grazing), image_plane(2000.0)];

		let events = trace_collect(emitted_ray(DVec3::ZERO, DVec3::Z), &elements, Sequential::No);

		// At the image plane event the direction has rotated by 2 grazing
		// out of the z axis.
		let at_image = &events[2];
		let expected = (2.0 * grazing).cos();
		assert!((at_image.direction.z - expected).abs() < 1e-9, "dz {}", at_image.direction.z);
	}

	#[test]
	fn path_length_accumulates_the_leg_lengths() {
		let grazing = 10.0_f64.to_radians();
		let elements = vec![plane_mirror(1000.0, grazing), image_plane(2000.0)];

		let events = trace_collect(emitted_ray(DVec3::ZERO, DVec3::Z), &elements, Sequential::No);

		// First leg is 1000 mm; the second leg runs from the mirror to
		// the image plane at z = 2000 along the deflected direction.
		let leg2 = 1000.0 / (2.0 * grazing).cos();
		assert!((events[2].path_length - (1000.0 + leg2)).abs() < 1e-6);
	}

	#[test]
	fn sequential_mode_takes_elements_in_declared_order() {
		// Declared back to front: the free tracer visits them by
		// distance, the sequential tracer by declaration order.
		let elements = vec![image_plane(2000.0), image_plane(1000.0)];

		let free = trace_collect(emitted_ray(DVec3::ZERO, DVec3::Z), &elements, Sequential::No);
		let hits: Vec<i32> = free
			.iter()
			.filter(|e| e.event_type == EventType::JustHitElement)
			.map(|e| e.last_element)
			.collect();
		assert_eq!(hits, vec![1, 0]);

		let seq = trace_collect(emitted_ray(DVec3::ZERO, DVec3::Z), &elements, Sequential::Yes);
		let hits: Vec<i32> = seq
			.iter()
			.filter(|e| e.event_type == EventType::JustHitElement)
			.map(|e| e.last_element)
			.collect();
		// Element 1 lies behind the ray once element 0 was reached.
		assert_eq!(hits, vec![0]);
		assert_eq!(seq.last().unwrap().event_type, EventType::FlyOff);
	}

	#[test]
	fn sequential_hits_are_strictly_increasing() {
		let elements = vec![image_plane(1000.0), image_plane(2000.0)];

		let events = trace_collect(emitted_ray(DVec3::ZERO, DVec3::Z), &elements, Sequential::Yes);

		let hits: Vec<i32> = events
			.iter()
			.filter(|e| e.event_type == EventType::JustHitElement)
			.map(|e| e.last_element)
			.collect();
		assert_eq!(hits, vec![0, 1]);
	}

	#[test]
	fn cancellation_terminates_with_not_enough_bounces() {
		let cancel = AtomicBool::new(true);
		let args = TraceArgs {
			elements: &[],
			materials: &MaterialTables::default(),
			max_bounces: 16,
			sequential: Sequential::No,
			cancel: &cancel,
		};
		let mut events = Vec::new();
		trace_path(emitted_ray(DVec3::ZERO, DVec3::Z), &args, &mut |event| events.push(*event));

		assert_eq!(events.last().unwrap().event_type, EventType::NotEnoughBounces);
	}

	#[test]
	fn fatal_error_on_nan_surface() {
		let broken = element_at(
			1000.0,
			DMat3::identity(),
			Surface::Quadric(crate::element::surface::QuadricSurface {
				icurv: 1,
				a11: f64::NAN,
				a12: 0.0,
				a13: 0.0,
				a14: 0.0,
				a22: 1.0,
				a23: 0.0,
				a24: -1.0,
				a33: 1.0,
				a34: 0.0,
				a44: 0.0,
			}),
			Behavior::Mirror,
		);

		let events = trace_collect(emitted_ray(DVec3::ZERO, DVec3::Z), &[broken], Sequential::No);

		assert_eq!(events.last().unwrap().event_type, EventType::FatalError);
	}
}
