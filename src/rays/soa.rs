use super::{EventType, Ray};
use crate::kernel::rand::RayRand;
use crate::math::{Cplx, DVec3, Field3};

bitflags! {
	/// Selects which per-event attributes a [`Rays`] container carries.
	#[derive(Clone, Copy, Debug, PartialEq, Eq)]
	pub struct RayAttrFlag: u32 {
		const PATH_ID = 1 << 0;
		const PATH_EVENT_ID = 1 << 1;
		const POSITION_X = 1 << 2;
		const POSITION_Y = 1 << 3;
		const POSITION_Z = 1 << 4;
		const EVENT_TYPE = 1 << 5;
		const DIRECTION_X = 1 << 6;
		const DIRECTION_Y = 1 << 7;
		const DIRECTION_Z = 1 << 8;
		const ENERGY = 1 << 9;
		const ELECTRIC_FIELD_X = 1 << 10;
		const ELECTRIC_FIELD_Y = 1 << 11;
		const ELECTRIC_FIELD_Z = 1 << 12;
		const PATH_LENGTH = 1 << 13;
		const ORDER = 1 << 14;
		const ELEMENT_ID = 1 << 15;
		const SOURCE_ID = 1 << 16;
		const OBJECT_ID = 1 << 17;

		const POSITION = Self::POSITION_X.bits() | Self::POSITION_Y.bits() | Self::POSITION_Z.bits();
		const DIRECTION = Self::DIRECTION_X.bits() | Self::DIRECTION_Y.bits() | Self::DIRECTION_Z.bits();
		const ELECTRIC_FIELD = Self::ELECTRIC_FIELD_X.bits() | Self::ELECTRIC_FIELD_Y.bits() | Self::ELECTRIC_FIELD_Z.bits();
	}
}

impl RayAttrFlag {
	pub fn names(&self) -> Vec<&'static str> {
		ATTR_NAMES
			.iter()
			.filter(|(flag, _)| self.contains(*flag))
			.map(|(_, name)| *name)
			.collect()
	}

	pub fn from_names(names: &[&str]) -> Option<RayAttrFlag> {
		let mut attr = RayAttrFlag::empty();
		for name in names {
			let (flag, _) = ATTR_NAMES.iter().find(|(_, n)| n == name)?;
			attr |= *flag;
		}
		Some(attr)
	}
}

const ATTR_NAMES: [(RayAttrFlag, &str); 18] = [
	(RayAttrFlag::PATH_ID, "path_id"),
	(RayAttrFlag::PATH_EVENT_ID, "path_event_id"),
	(RayAttrFlag::POSITION_X, "position_x"),
	(RayAttrFlag::POSITION_Y, "position_y"),
	(RayAttrFlag::POSITION_Z, "position_z"),
	(RayAttrFlag::EVENT_TYPE, "event_type"),
	(RayAttrFlag::DIRECTION_X, "direction_x"),
	(RayAttrFlag::DIRECTION_Y, "direction_y"),
	(RayAttrFlag::DIRECTION_Z, "direction_z"),
	(RayAttrFlag::ENERGY, "energy"),
	(RayAttrFlag::ELECTRIC_FIELD_X, "electric_field_x"),
	(RayAttrFlag::ELECTRIC_FIELD_Y, "electric_field_y"),
	(RayAttrFlag::ELECTRIC_FIELD_Z, "electric_field_z"),
	(RayAttrFlag::PATH_LENGTH, "path_length"),
	(RayAttrFlag::ORDER, "order"),
	(RayAttrFlag::ELEMENT_ID, "element_id"),
	(RayAttrFlag::SOURCE_ID, "source_id"),
	(RayAttrFlag::OBJECT_ID, "object_id"),
];

/// Structure-of-arrays event output. Every attribute vector that is
/// present has length [`Rays::num_events`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Rays {
	pub attr: RayAttrFlag,
	pub num_events: usize,

	pub path_id: Vec<i32>,
	pub path_event_id: Vec<i32>,
	pub position_x: Vec<f64>,
	pub position_y: Vec<f64>,
	pub position_z: Vec<f64>,
	pub event_type: Vec<EventType>,
	pub direction_x: Vec<f64>,
	pub direction_y: Vec<f64>,
	pub direction_z: Vec<f64>,
	pub energy: Vec<f64>,
	pub electric_field_x: Vec<Cplx>,
	pub electric_field_y: Vec<Cplx>,
	pub electric_field_z: Vec<Cplx>,
	pub path_length: Vec<f64>,
	pub order: Vec<f64>,
	pub element_id: Vec<i32>,
	pub source_id: Vec<i32>,
	pub object_id: Vec<i32>,
}

impl Default for RayAttrFlag {
	fn default() -> Self {
		RayAttrFlag::all()
	}
}

impl Rays {
	pub fn with_attrs(attr: RayAttrFlag) -> Self {
		Rays { attr, ..Default::default() }
	}

	/// The attributes whose vectors are actually populated.
	pub fn attr_mask(&self) -> RayAttrFlag {
		if self.num_events == 0 {
			return self.attr;
		}

		let mut mask = RayAttrFlag::empty();
		let mut set = |flag, present: bool| {
			if present {
				mask |= flag;
			}
		};
		set(RayAttrFlag::PATH_ID, !self.path_id.is_empty());
		set(RayAttrFlag::PATH_EVENT_ID, !self.path_event_id.is_empty());
		set(RayAttrFlag::POSITION_X, !self.position_x.is_empty());
		set(RayAttrFlag::POSITION_Y, !self.position_y.is_empty());
		set(RayAttrFlag::POSITION_Z, !self.position_z.is_empty());
		set(RayAttrFlag::EVENT_TYPE, !self.event_type.is_empty());
		set(RayAttrFlag::DIRECTION_X, !self.direction_x.is_empty());
		set(RayAttrFlag::DIRECTION_Y, !self.direction_y.is_empty());
		set(RayAttrFlag::DIRECTION_Z, !self.direction_z.is_empty());
		set(RayAttrFlag::ENERGY, !self.energy.is_empty());
		set(RayAttrFlag::ELECTRIC_FIELD_X, !self.electric_field_x.is_empty());
		set(RayAttrFlag::ELECTRIC_FIELD_Y, !self.electric_field_y.is_empty());
		set(RayAttrFlag::ELECTRIC_FIELD_Z, !self.electric_field_z.is_empty());
		set(RayAttrFlag::PATH_LENGTH, !self.path_length.is_empty());
		set(RayAttrFlag::ORDER, !self.order.is_empty());
		set(RayAttrFlag::ELEMENT_ID, !self.element_id.is_empty());
		set(RayAttrFlag::SOURCE_ID, !self.source_id.is_empty());
		set(RayAttrFlag::OBJECT_ID, !self.object_id.is_empty());
		mask
	}

	pub fn num_paths(&self) -> usize {
		let mut ids: Vec<i32> = self.path_id.clone();
		ids.sort_unstable();
		ids.dedup();
		ids.len()
	}

	/// Appends one event. `object_id` is the id of the object the event
	/// happened at (the source for emitted events, the element otherwise).
	pub fn push(&mut self, ray: &Ray, object_id: i32) {
		let attr = self.attr;
		if attr.contains(RayAttrFlag::PATH_ID) {
			self.path_id.push(ray.path_id);
		}
		if attr.contains(RayAttrFlag::PATH_EVENT_ID) {
			self.path_event_id.push(ray.path_event_id);
		}
		if attr.contains(RayAttrFlag::POSITION_X) {
			self.position_x.push(ray.position.x);
		}
		if attr.contains(RayAttrFlag::POSITION_Y) {
			self.position_y.push(ray.position.y);
		}
		if attr.contains(RayAttrFlag::POSITION_Z) {
			self.position_z.push(ray.position.z);
		}
		if attr.contains(RayAttrFlag::EVENT_TYPE) {
			self.event_type.push(ray.event_type);
		}
		if attr.contains(RayAttrFlag::DIRECTION_X) {
			self.direction_x.push(ray.direction.x);
		}
		if attr.contains(RayAttrFlag::DIRECTION_Y) {
			self.direction_y.push(ray.direction.y);
		}
		if attr.contains(RayAttrFlag::DIRECTION_Z) {
			self.direction_z.push(ray.direction.z);
		}
		if attr.contains(RayAttrFlag::ENERGY) {
			self.energy.push(ray.energy);
		}
		if attr.contains(RayAttrFlag::ELECTRIC_FIELD_X) {
			self.electric_field_x.push(ray.field.x);
		}
		if attr.contains(RayAttrFlag::ELECTRIC_FIELD_Y) {
			self.electric_field_y.push(ray.field.y);
		}
		if attr.contains(RayAttrFlag::ELECTRIC_FIELD_Z) {
			self.electric_field_z.push(ray.field.z);
		}
		if attr.contains(RayAttrFlag::PATH_LENGTH) {
			self.path_length.push(ray.path_length);
		}
		if attr.contains(RayAttrFlag::ORDER) {
			self.order.push(ray.order);
		}
		if attr.contains(RayAttrFlag::ELEMENT_ID) {
			self.element_id.push(ray.last_element);
		}
		if attr.contains(RayAttrFlag::SOURCE_ID) {
			self.source_id.push(ray.source_id);
		}
		if attr.contains(RayAttrFlag::OBJECT_ID) {
			self.object_id.push(object_id);
		}
		self.num_events += 1;
	}

	/// Reassembles the i'th event. Attributes that are not present come
	/// back zeroed.
	pub fn ray(&self, i: usize) -> Ray {
		let f = |v: &Vec<f64>| v.get(i).copied().unwrap_or(0.0);
		let c = |v: &Vec<Cplx>| v.get(i).copied().unwrap_or_default();
		let n = |v: &Vec<i32>| v.get(i).copied().unwrap_or(0);

		Ray {
			position: DVec3::new(f(&self.position_x), f(&self.position_y), f(&self.position_z)),
			direction: DVec3::new(f(&self.direction_x), f(&self.direction_y), f(&self.direction_z)),
			energy: f(&self.energy),
			field: Field3::new(c(&self.electric_field_x), c(&self.electric_field_y), c(&self.electric_field_z)),
			path_length: f(&self.path_length),
			order: f(&self.order),
			event_type: self.event_type.get(i).copied().unwrap_or_default(),
			last_element: n(&self.element_id),
			source_id: n(&self.source_id),
			path_id: n(&self.path_id),
			path_event_id: n(&self.path_event_id),
			rand: RayRand::new(0),
		}
	}

	/// Stable sort of all events by (path id, path event id).
	pub fn sort_by_path(&mut self) {
		let mut perm: Vec<usize> = (0..self.num_events).collect();
		perm.sort_by_key(|&i| {
			(
				self.path_id.get(i).copied().unwrap_or(0),
				self.path_event_id.get(i).copied().unwrap_or(0),
			)
		});

		fn apply<T: Copy>(v: &mut Vec<T>, perm: &[usize]) {
			if v.is_empty() {
				return;
			}
			*v = perm.iter().map(|&i| v[i]).collect();
		}

		apply(&mut self.path_id, &perm);
		apply(&mut self.path_event_id, &perm);
		apply(&mut self.position_x, &perm);
		apply(&mut self.position_y, &perm);
		apply(&mut self.position_z, &perm);
		apply(&mut self.event_type, &perm);
		apply(&mut self.direction_x, &perm);
		apply(&mut self.direction_y, &perm);
		apply(&mut self.direction_z, &perm);
		apply(&mut self.energy, &perm);
		apply(&mut self.electric_field_x, &perm);
		apply(&mut self.electric_field_y, &perm);
		apply(&mut self.electric_field_z, &perm);
		apply(&mut self.path_length, &perm);
		apply(&mut self.order, &perm);
		apply(&mut self.element_id, &perm);
		apply(&mut self.source_id, &perm);
		apply(&mut self.object_id, &perm);
	}
}

/// All the events of a single ray in chronological order.
pub type RayHistory = Vec<Ray>;

/// All events for a bundle of rays: `bundle[i][j]` is the j'th event of
/// the i'th path.
pub type BundleHistory = Vec<RayHistory>;

pub fn bundle_to_rays(bundle: &BundleHistory, num_sources: i32) -> Rays {
	let mut rays = Rays::with_attrs(RayAttrFlag::all());
	for history in bundle {
		for event in history {
			let object_id = if event.event_type == EventType::Emitted {
				event.source_id
			} else {
				num_sources + event.last_element
			};
			rays.push(event, object_id);
		}
	}
	rays
}

pub fn rays_to_bundle(rays: &Rays) -> BundleHistory {
	let mut bundle: BundleHistory = Vec::new();
	let mut last_path = None;
	for i in 0..rays.num_events {
		let ray = rays.ray(i);
		if last_path != Some(ray.path_id) {
			bundle.push(Vec::new());
			last_path = Some(ray.path_id);
		}
		bundle.last_mut().unwrap().push(ray);
	}
	bundle
}
