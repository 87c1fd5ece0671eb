use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use rayon::prelude::*;

use super::{compact_events, TraceConfig};
use crate::beamline::Beamline;
use crate::kernel::{trace_path, TraceArgs};
use crate::rays::{Ray, Rays};
use crate::Result;

/// Traces rays on the host: a parallel-for over the bundle with one
/// bounded event list per ray. Rays never share mutable state, so the
/// trace is embarrassingly parallel and bit-reproducible.
pub struct CpuTracer {
	cancel: Arc<AtomicBool>,
}

impl Default for CpuTracer {
	fn default() -> Self {
		Self::new()
	}
}

impl CpuTracer {
	pub fn new() -> Self {
		Self { cancel: Arc::new(AtomicBool::new(false)) }
	}

	/// The cancellation flag polled by every ray at each bounce. Setting
	/// it makes in-flight rays terminate with `NotEnoughBounces`.
	pub fn cancel_flag(&self) -> Arc<AtomicBool> {
		self.cancel.clone()
	}

	pub fn trace(&self, beamline: &Beamline, config: &TraceConfig) -> Result<Rays> {
		let seed = config.resolved_seed();

		let elements = beamline.compile_elements()?;
		let materials = beamline.calc_minimal_material_tables()?;
		let input = beamline.compile_sources(config.thread_count, seed)?;

		if super::debug_verbose() {
			log::info!(
				"cpu trace: {} rays, {} elements, {} bounces max, seed {seed}",
				input.len(),
				elements.len(),
				config.max_bounces,
			);
		}

		let args = TraceArgs {
			elements: &elements,
			materials: &materials,
			max_bounces: config.max_bounces,
			sequential: config.sequential,
			cancel: &self.cancel,
		};

		let run = || {
			input
				.par_iter()
				.map(|ray| {
					let mut events = Vec::with_capacity(config.max_events.min(32));
					trace_path(*ray, &args, &mut |event: &Ray| {
						if events.len() < config.max_events {
							events.push(*event);
						}
					});
					events
				})
				.collect::<Vec<Vec<Ray>>>()
		};

		let per_ray = if config.thread_count > 0 {
			let pool = rayon::ThreadPoolBuilder::new()
				.num_threads(config.thread_count)
				.build()
				.map_err(|e| crate::Error::InvalidArgument(e.to_string()))?;
			pool.install(run)
		} else {
			run()
		};

		Ok(compact_events(per_ray, beamline.num_sources(), elements.len(), config))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::beamline::{Group, Node, Rotation};
	use crate::design::{DesignElement, DesignSource, DesignValue};
	use crate::math::{DVec3, Rad, PI};
	use crate::rays::soa::RayAttrFlag;
	use crate::rays::EventType;
	use crate::tracer::{EventFilter, ObjectRecordMask};

	fn matrix_source(num_rays: i32, width: f64, height: f64) -> DesignSource {
		let mut ds = DesignSource::new("source");
		ds.set("type", DesignValue::Str("MatrixSource".into()))
			.set("numberOfRays", DesignValue::Int(num_rays))
			.set("sourceWidth", DesignValue::F64(width))
			.set("sourceHeight", DesignValue::F64(height))
			.set("photonEnergy", DesignValue::F64(100.0))
			.set("energySpread", DesignValue::F64(2.0));
		ds
	}

	fn plane_mirror(z: f64, grazing: Rad) -> DesignElement {
		let mut dele = DesignElement::new("mirror");
		dele.position = DVec3::new(0.0, 0.0, z);
		dele.rotation = Rotation::AxisAngle { axis: DVec3::X, angle: Rad(-grazing.0) };
		dele.set("behaviourType", DesignValue::Str("Mirror".into()))
			.set("totalWidth", DesignValue::F64(500.0))
			.set("totalLength", DesignValue::F64(5000.0));
		dele
	}

	fn image_plane(name: &str, position: DVec3, rotation: Rotation) -> DesignElement {
		let mut dele = DesignElement::new(name);
		dele.position = position;
		dele.rotation = rotation;
		dele.set("behaviourType", DesignValue::Str("ImagePlane".into()));
		dele
	}

	fn slit(z: f64) -> DesignElement {
		let mut dele = DesignElement::new("slit");
		dele.position = DVec3::new(0.0, 0.0, z);
		dele.set("behaviourType", DesignValue::Str("Slit".into()))
			.set("openingShape", DesignValue::Str("Rect".into()))
			.set("openingWidth", DesignValue::F64(3.0))
			.set("openingHeight", DesignValue::F64(3.0))
			.set("centralBeamstop", DesignValue::Str("Rect".into()))
			.set("stopWidth", DesignValue::F64(1.0))
			.set("stopHeight", DesignValue::F64(1.0));
		dele
	}

	/// A matrix source into a grazing plane mirror with an image plane
	/// behind it.
	fn mirror_beamline() -> Beamline {
		let grazing = Rad(10.0 * PI / 180.0);
		let mut root = Beamline::new("root");
		root.add_child(Node::Source(matrix_source(200, 0.0, 0.0)));
		root.add_child(Node::Element(plane_mirror(1000.0, grazing)));

		// The image plane faces the reflected beam, one meter on.
		let deflection = 2.0 * grazing.0;
		let position = DVec3::new(0.0, 1000.0 * deflection.sin(), 1000.0 + 1000.0 * deflection.cos());
		root.add_child(Node::Element(image_plane(
			"image",
			position,
			Rotation::AxisAngle { axis: DVec3::X, angle: Rad(-deflection) },
		)));
		root
	}

	fn slit_beamline() -> Beamline {
		let mut root = Beamline::new("root");
		root.add_child(Node::Source(matrix_source(200, 5.0, 5.0)));
		root.add_child(Node::Element(slit(100.0)));
		root.add_child(Node::Element(image_plane(
			"image",
			DVec3::new(0.0, 0.0, 200.0),
			Rotation::default(),
		)));
		root
	}

	#[test]
	fn plane_mirror_reflection() {
		let tracer = CpuTracer::new();
		let rays = tracer.trace(&mirror_beamline(), &TraceConfig::default()).unwrap();

		// Per path: hit mirror, hit image plane, fly off.
		assert_eq!(rays.num_paths(), 200);
		assert_eq!(rays.num_events, 600);

		for path in crate::rays::soa::rays_to_bundle(&rays) {
			assert_eq!(path.len(), 3);
			assert_eq!(path[0].event_type, EventType::JustHitElement);
			assert_eq!(path[1].event_type, EventType::JustHitElement);
			assert_eq!(path[2].event_type, EventType::FlyOff);

			// The mirror flips the vertical direction component.
			assert!(path[0].direction.y > 0.0);

			for event in &path {
				assert!((event.direction.length() - 1.0).abs() < 1e-9);
			}
		}
	}

	#[test]
	fn slit_absorbs_and_passes() {
		let tracer = CpuTracer::new();
		let rays = tracer.trace(&slit_beamline(), &TraceConfig::default()).unwrap();

		let bundle = crate::rays::soa::rays_to_bundle(&rays);
		let passed = bundle.iter().filter(|path| path.len() == 3).count();
		let absorbed = bundle
			.iter()
			.filter(|path| path.len() == 1 && path[0].event_type == EventType::Absorbed)
			.count();

		// 14x14 grid on a 5 mm square: 8 columns and rows land inside
		// the 3 mm opening, 2 of each inside the 1 mm beamstop, and the
		// 4 left-over rays reuse absorbed corner cells.
		assert_eq!(passed, 60);
		assert_eq!(absorbed, 140);

		for path in &bundle {
			match path.len() {
				3 => {
					assert_eq!(path[0].event_type, EventType::JustHitElement);
					assert_eq!(path[1].event_type, EventType::JustHitElement);
					assert_eq!(path[2].event_type, EventType::FlyOff);
				}
				1 => assert_eq!(path[0].event_type, EventType::Absorbed),
				other => panic!("unexpected path length {other}"),
			}
		}
	}

	#[test]
	fn toroid_mirror_with_huge_radii_acts_planar() {
		let grazing = Rad(10.0 * PI / 180.0);
		let mut root = Beamline::new("root");
		root.add_child(Node::Source(matrix_source(50, 0.0, 0.0)));

		let mut toroid = plane_mirror(1000.0, grazing);
		toroid.set("curvatureType", DesignValue::Str("Toroid".into()))
			.set("longRadius", DesignValue::F64(1.0e9))
			.set("shortRadius", DesignValue::F64(1.0e8));
		root.add_child(Node::Element(toroid));

		let deflection = 2.0 * grazing.0;
		let position = DVec3::new(0.0, 1000.0 * deflection.sin(), 1000.0 + 1000.0 * deflection.cos());
		root.add_child(Node::Element(image_plane(
			"image",
			position,
			Rotation::AxisAngle { axis: DVec3::X, angle: Rad(-deflection) },
		)));

		let rays = CpuTracer::new().trace(&root, &TraceConfig::default()).unwrap();

		for path in crate::rays::soa::rays_to_bundle(&rays) {
			assert_eq!(path.len(), 3, "toroid path should mirror the plane case");
			assert_eq!(path[2].event_type, EventType::FlyOff);
		}
	}

	#[test]
	fn grating_records_the_diffraction_order() {
		let grazing = Rad(10.0 * PI / 180.0);
		let mut root = Beamline::new("root");
		root.add_child(Node::Source(matrix_source(20, 0.0, 0.0)));

		let mut grating = plane_mirror(1000.0, grazing);
		grating.set("behaviourType", DesignValue::Str("Grating".into()))
			.set("lineDensity", DesignValue::F64(100.0))
			.set("orderOfDiffraction", DesignValue::Int(1));
		root.add_child(Node::Element(grating));

		let deflection = 2.0 * grazing.0;
		let position = DVec3::new(0.0, 1000.0 * deflection.sin(), 1000.0 + 1000.0 * deflection.cos());
		root.add_child(Node::Element(image_plane(
			"image",
			position,
			Rotation::AxisAngle { axis: DVec3::X, angle: Rad(-deflection) },
		)));

		let rays = CpuTracer::new().trace(&root, &TraceConfig::default()).unwrap();

		assert!(rays.num_events > 0);
		assert!(rays.order.iter().any(|o| *o == 1.0), "the diffracted order should be stamped");
	}

	#[test]
	fn trace_is_deterministic() {
		let tracer = CpuTracer::new();
		let config = TraceConfig { seed: 42, ..Default::default() };

		let mut a = tracer.trace(&slit_beamline(), &config).unwrap();
		let mut b = tracer.trace(&slit_beamline(), &config).unwrap();
		a.sort_by_path();
		b.sort_by_path();

		assert_eq!(a, b);

		let mut c = tracer.trace(&slit_beamline(), &TraceConfig { seed: 43, ..Default::default() }).unwrap();
		c.sort_by_path();
		// A different seed draws different photon energies.
		assert_ne!(a.energy, c.energy);
	}

	#[test]
	fn object_mask_splits_source_and_element_events() {
		let tracer = CpuTracer::new();
		let beamline = mirror_beamline();

		let sources_only = TraceConfig {
			record: Some(ObjectRecordMask::all_sources(1, 2)),
			..Default::default()
		};
		let elements_only = TraceConfig {
			record: Some(ObjectRecordMask::all_elements(1, 2)),
			..Default::default()
		};
		let everything = TraceConfig {
			record: Some(ObjectRecordMask::all(1, 2)),
			..Default::default()
		};

		let from_sources = tracer.trace(&beamline, &sources_only).unwrap();
		let from_elements = tracer.trace(&beamline, &elements_only).unwrap();
		let from_all = tracer.trace(&beamline, &everything).unwrap();

		assert!(from_sources.event_type.iter().all(|t| *t == EventType::Emitted));
		assert!(from_elements.event_type.iter().all(|t| *t != EventType::Emitted));
		assert_eq!(from_sources.num_events + from_elements.num_events, from_all.num_events);
	}

	#[test]
	fn event_filter_drops_event_types() {
		let tracer = CpuTracer::new();
		let config = TraceConfig {
			event_filter: EventFilter::JUST_HIT_ELEMENT,
			..Default::default()
		};

		let rays = tracer.trace(&mirror_beamline(), &config).unwrap();

		assert!(rays.event_type.iter().all(|t| *t == EventType::JustHitElement));
		assert_eq!(rays.num_events, 400);
	}

	#[test]
	fn attr_mask_limits_the_columns() {
		let tracer = CpuTracer::new();
		let config = TraceConfig {
			attr: RayAttrFlag::POSITION | RayAttrFlag::PATH_ID,
			..Default::default()
		};

		let rays = tracer.trace(&mirror_beamline(), &config).unwrap();

		assert_eq!(rays.attr_mask(), RayAttrFlag::POSITION | RayAttrFlag::PATH_ID);
		assert!(rays.energy.is_empty());
		assert_eq!(rays.position_x.len(), rays.num_events);
	}

	#[test]
	fn matrix_source_grid_positions() {
		let mut root = Beamline::new("root");
		root.add_child(Node::Source(matrix_source(16, 4.0, 4.0)));
		root.add_child(Node::Element(image_plane("image", DVec3::new(0.0, 0.0, 100.0), Rotation::default())));

		let config = TraceConfig {
			record: Some(ObjectRecordMask::all_sources(1, 1)),
			event_filter: EventFilter::EMITTED,
			..Default::default()
		};
		let rays = CpuTracer::new().trace(&root, &config).unwrap();

		assert_eq!(rays.num_events, 16);
		// All 16 origins lie on the 4x4 grid spanning [-2, 2].
		for i in 0..rays.num_events {
			let x = rays.position_x[i];
			let on_grid = (0..4).any(|k| ((-2.0 + 4.0 / 3.0 * k as f64) - x).abs() < 1e-9);
			assert!(on_grid, "x = {x} is off the grid");
		}
	}
}
