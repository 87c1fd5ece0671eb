pub mod cpu;
pub mod vulkan;

mod mask;

pub use cpu::CpuTracer;
pub use mask::ObjectRecordMask;
pub use vulkan::VulkanTracer;

use crate::kernel::Sequential;
use crate::rays::soa::RayAttrFlag;
use crate::rays::{EventType, Ray, Rays};

bitflags! {
	/// Per-event-type filter applied during compaction.
	#[derive(Clone, Copy, Debug, PartialEq, Eq)]
	pub struct EventFilter: u32 {
		const EMITTED = 1 << 0;
		const JUST_HIT_ELEMENT = 1 << 1;
		const ABSORBED = 1 << 2;
		const FLY_OFF = 1 << 3;
		const BEYOND_HORIZON = 1 << 4;
		const NOT_ENOUGH_BOUNCES = 1 << 5;
		const FATAL_ERROR = 1 << 6;
	}
}

impl EventFilter {
	pub fn keeps(&self, event_type: EventType) -> bool {
		let flag = match event_type {
			EventType::Emitted => EventFilter::EMITTED,
			EventType::JustHitElement => EventFilter::JUST_HIT_ELEMENT,
			EventType::Absorbed => EventFilter::ABSORBED,
			EventType::FlyOff => EventFilter::FLY_OFF,
			EventType::BeyondHorizon => EventFilter::BEYOND_HORIZON,
			EventType::NotEnoughBounces => EventFilter::NOT_ENOUGH_BOUNCES,
			EventType::FatalError => EventFilter::FATAL_ERROR,
			EventType::Uninit => return false,
		};
		self.contains(flag)
	}
}

/// Per-dispatch configuration shared by the CPU and device tracers.
#[derive(Clone, Debug)]
pub struct TraceConfig {
	pub max_bounces: u32,
	pub seed: u64,
	pub sequential: Sequential,
	/// Event slots reserved per ray.
	pub max_events: usize,
	/// Which attributes the output SoA materializes.
	pub attr: RayAttrFlag,
	/// Which event types survive compaction.
	pub event_filter: EventFilter,
	/// Which objects' events survive compaction. Empty means every
	/// element (and no source), the usual recording setup.
	pub record: Option<ObjectRecordMask>,
	/// Worker threads; 0 picks the hardware concurrency.
	pub thread_count: usize,
}

impl Default for TraceConfig {
	fn default() -> Self {
		Self {
			max_bounces: 16,
			seed: 42,
			sequential: Sequential::No,
			max_events: 18,
			attr: RayAttrFlag::all(),
			event_filter: EventFilter::all(),
			record: None,
			thread_count: 0,
		}
	}
}

impl TraceConfig {
	/// The seed actually used: `RAYX_SEED` overrides the configured one.
	pub fn resolved_seed(&self) -> u64 {
		match std::env::var("RAYX_SEED") {
			Ok(value) => value.parse().unwrap_or(self.seed),
			Err(_) => self.seed,
		}
	}
}

/// Whether `RAYX_DEBUG_VERBOSE` asks for chattier per-dispatch logging.
pub fn debug_verbose() -> bool {
	matches!(
		std::env::var("RAYX_DEBUG_VERBOSE").ok().as_deref(),
		Some("1" | "true" | "yes" | "on")
	)
}

/// Compacts the raw per-ray event lists into the output SoA, applying
/// the event-type filter and the object-record mask. Events keep their
/// emission order within each path.
pub fn compact_events(
	per_ray: Vec<Vec<Ray>>,
	num_sources: usize,
	num_elements: usize,
	config: &TraceConfig,
) -> Rays {
	let record = config
		.record
		.clone()
		.unwrap_or_else(|| ObjectRecordMask::all_elements(num_sources, num_elements));

	let mut rays = Rays::with_attrs(config.attr);
	for events in &per_ray {
		for event in events {
			if !config.event_filter.keeps(event.event_type) {
				continue;
			}

			// Events at an element belong to that element's object id;
			// emitted events (and fly-offs that never hit anything)
			// belong to the source.
			let recorded = if event.event_type == EventType::Emitted || event.last_element < 0 {
				record.records_source(event.source_id as usize)
			} else {
				record.records_element(event.last_element as usize)
			};
			if !recorded {
				continue;
			}

			let object_id = if event.event_type == EventType::Emitted || event.last_element < 0 {
				event.source_id
			} else {
				num_sources as i32 + event.last_element
			};
			rays.push(event, object_id);
		}
	}
	rays
}
