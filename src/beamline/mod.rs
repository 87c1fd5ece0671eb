pub mod rotation;

pub use rotation::Rotation;

use rayon::prelude::*;

use crate::design::{DesignElement, DesignSource};
use crate::element::Element;
use crate::kernel::rand::RayRand;
use crate::material::{load_material_tables, MaterialTables};
use crate::math::{DMat3, DVec3};
use crate::rays::Ray;
use crate::sources::Source;
use crate::{Error, Result};

/// One node of the beamline scene graph. Groups carry children, sources
/// and elements are leaves. Children are owned; world transforms are
/// obtained by folding the group transforms down the tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
	Group(Group),
	Source(DesignSource),
	Element(DesignElement),
}

impl Node {
	pub fn name(&self) -> &str {
		match self {
			Node::Group(g) => &g.name,
			Node::Source(s) => &s.name,
			Node::Element(e) => &e.name,
		}
	}

	pub fn is_group(&self) -> bool {
		matches!(self, Node::Group(_))
	}

	/// Appends a child. Only groups can carry children.
	pub fn add_child(&mut self, child: Node) -> Result<()> {
		match self {
			Node::Group(g) => {
				g.add_child(child);
				Ok(())
			}
			_ => Err(Error::InvalidArgument(format!(
				"cannot add a child to leaf node '{}'",
				self.name()
			))),
		}
	}
}

/// An ordered group of nodes with a local transform. The beamline itself
/// is the root group, starting at the origin with identity rotation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Group {
	pub name: String,
	pub position: DVec3,
	pub rotation: Rotation,
	children: Vec<Node>,
}

/// A whole beamline is simply its root group.
pub type Beamline = Group;

impl Group {
	pub fn new(name: &str) -> Self {
		Self { name: name.to_string(), ..Default::default() }
	}

	pub fn add_child(&mut self, child: Node) {
		self.children.push(child);
	}

	pub fn children(&self) -> &[Node] {
		&self.children
	}

	/// Depth-first traversal; the callback aborts the walk by returning
	/// true. Returns whether the walk was aborted.
	pub fn ctraverse(&self, callback: &mut dyn FnMut(&Node) -> bool) -> bool {
		for child in &self.children {
			if callback(child) {
				return true;
			}
			if let Node::Group(group) = child {
				if group.ctraverse(callback) {
					return true;
				}
			}
		}
		false
	}

	/// Mutable depth-first traversal with the same abort contract.
	pub fn traverse(&mut self, callback: &mut dyn FnMut(&mut Node) -> bool) -> bool {
		for child in &mut self.children {
			if callback(child) {
				return true;
			}
			if let Node::Group(group) = child {
				if group.traverse(callback) {
					return true;
				}
			}
		}
		false
	}

	pub fn num_sources(&self) -> usize {
		let mut count = 0;
		self.ctraverse(&mut |node| {
			if matches!(node, Node::Source(_)) {
				count += 1;
			}
			false
		});
		count
	}

	pub fn num_elements(&self) -> usize {
		let mut count = 0;
		self.ctraverse(&mut |node| {
			if matches!(node, Node::Element(_)) {
				count += 1;
			}
			false
		});
		count
	}

	pub fn num_objects(&self) -> usize {
		self.num_sources() + self.num_elements()
	}

	/// Leaf names in object-id order: sources first, then elements, each
	/// in depth-first order.
	pub fn object_names(&self) -> Vec<String> {
		let mut sources = Vec::new();
		let mut elements = Vec::new();
		self.ctraverse(&mut |node| {
			match node {
				Node::Source(s) => sources.push(s.name.clone()),
				Node::Element(e) => elements.push(e.name.clone()),
				Node::Group(_) => {}
			}
			false
		});
		sources.extend(elements);
		sources
	}

	/// The object id a leaf name resolves to, if any. Object ids form a
	/// bijection with the non-group leaves: sources occupy
	/// [0, num_sources), elements follow.
	pub fn object_id_by_name(&self, name: &str) -> Option<usize> {
		self.object_names().iter().position(|n| n == name)
	}

	/// Compiles every design element into its flat kernel record, in
	/// depth-first order, folding group transforms from the root down.
	pub fn compile_elements(&self) -> Result<Vec<Element>> {
		let mut elements = Vec::new();
		self.fold_elements(DVec3::ZERO, DMat3::identity(), &mut elements)?;
		Ok(elements)
	}

	fn fold_elements(&self, parent_pos: DVec3, parent_rot: DMat3, out: &mut Vec<Element>) -> Result<()> {
		let pos = parent_rot * self.position + parent_pos;
		let rot = parent_rot * self.rotation.to_matrix();

		for child in &self.children {
			match child {
				Node::Element(dele) => out.push(dele.compile(pos, rot)?),
				Node::Group(group) => group.fold_elements(pos, rot, out)?,
				Node::Source(_) => {}
			}
		}
		Ok(())
	}

	/// Builds the concrete source models in depth-first order. The index
	/// into the returned vector is the source's object id.
	pub fn compile_source_models(&self) -> Result<Vec<Source>> {
		let mut sources = Vec::new();
		self.fold_sources(DVec3::ZERO, DMat3::identity(), &mut sources)?;
		Ok(sources)
	}

	fn fold_sources(&self, parent_pos: DVec3, parent_rot: DMat3, out: &mut Vec<Source>) -> Result<()> {
		let pos = parent_rot * self.position + parent_pos;
		let rot = parent_rot * self.rotation.to_matrix();

		for child in &self.children {
			match child {
				Node::Source(ds) => out.push(ds.compile(pos, rot)?),
				Node::Group(group) => group.fold_sources(pos, rot, out)?,
				Node::Element(_) => {}
			}
		}
		Ok(())
	}

	/// Materializes the input rays of every source. Each ray's random
	/// stream is seeded from the dispatch seed and its path id, so the
	/// bundle is reproducible; `thread_count` is an execution hint.
	pub fn compile_sources(&self, thread_count: usize, seed: u64) -> Result<Vec<Ray>> {
		let sources = self.compile_source_models()?;

		// Path-id offset of each source's first ray.
		let mut offsets = Vec::with_capacity(sources.len());
		let mut total = 0usize;
		for source in &sources {
			offsets.push(total);
			total += source.num_rays();
		}

		let generate = || {
			(0..total)
				.into_par_iter()
				.map(|path_id| {
					let source_index = offsets.partition_point(|offset| *offset <= path_id) - 1;
					let source = &sources[source_index];
					let ray_index = path_id - offsets[source_index];
					let rand = RayRand::for_path(seed, path_id as i32);
					source.gen_ray(ray_index, path_id as i32, source_index as i32, rand)
				})
				.collect::<Vec<Ray>>()
		};

		if thread_count > 0 {
			let pool = rayon::ThreadPoolBuilder::new()
				.num_threads(thread_count)
				.build()
				.map_err(|e| Error::InvalidArgument(e.to_string()))?;
			Ok(pool.install(generate))
		} else {
			Ok(generate())
		}
	}

	/// The smallest material tables covering every material referenced by
	/// this beamline.
	pub fn calc_minimal_material_tables(&self) -> Result<MaterialTables> {
		let mut relevant = [false; 92];
		self.ctraverse(&mut |node| {
			if let Node::Element(dele) = node {
				let material = dele.material();
				if (1..=92).contains(&material) {
					relevant[(material - 1) as usize] = true;
				}
			}
			false
		});
		load_material_tables(&relevant)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::design::DesignValue;
	use crate::math::Rad;
	use crate::rays::EventType;

	fn mirror(name: &str, z: f64) -> DesignElement {
		let mut dele = DesignElement::new(name);
		dele.position = DVec3::new(0.0, 0.0, z);
		dele.set("behaviourType", DesignValue::Str("Mirror".into()))
			.set("totalWidth", DesignValue::F64(50.0))
			.set("totalLength", DesignValue::F64(50.0));
		dele
	}

	fn source(name: &str, num_rays: i32) -> DesignSource {
		let mut ds = DesignSource::new(name);
		ds.set("type", DesignValue::Str("MatrixSource".into()))
			.set("numberOfRays", DesignValue::Int(num_rays))
			.set("sourceWidth", DesignValue::F64(1.0))
			.set("sourceHeight", DesignValue::F64(1.0))
			.set("photonEnergy", DesignValue::F64(100.0));
		ds
	}

	fn beamline() -> Beamline {
		let mut root = Beamline::new("root");
		root.add_child(Node::Source(source("src", 9)));

		let mut group = Group::new("section");
		group.position = DVec3::new(0.0, 0.0, 100.0);
		group.add_child(Node::Element(mirror("m1", 10.0)));
		group.add_child(Node::Element(mirror("m2", 20.0)));
		root.add_child(Node::Group(group));

		root
	}

	#[test]
	fn object_ids_are_a_bijection() {
		let bl = beamline();

		assert_eq!(bl.num_objects(), 3);
		assert_eq!(bl.object_id_by_name("src"), Some(0));
		assert_eq!(bl.object_id_by_name("m1"), Some(1));
		assert_eq!(bl.object_id_by_name("m2"), Some(2));
		assert_eq!(bl.object_id_by_name("section"), None);
	}

	#[test]
	fn group_transforms_fold_into_elements() {
		let bl = beamline();
		let elements = bl.compile_elements().unwrap();

		assert_eq!(elements.len(), 2);
		// m1 sits at group (z=100) + local (z=10).
		let origin = elements[0].out_trans.transform_point(DVec3::ZERO);
		assert!((origin.z - 110.0).abs() < 1e-12);
	}

	#[test]
	fn nested_group_rotation_composes() {
		let mut root = Beamline::new("root");
		let mut group = Group::new("g");
		group.rotation = Rotation::AxisAngle { axis: DVec3::Y, angle: Rad(std::f64::consts::PI / 2.0) };
		group.add_child(Node::Element(mirror("m", 10.0)));
		root.add_child(Node::Group(group));

		let elements = root.compile_elements().unwrap();
		let origin = elements[0].out_trans.transform_point(DVec3::ZERO);

		// Local +z rotates onto world +x.
		assert!((origin.x - 10.0).abs() < 1e-12);
		assert!(origin.z.abs() < 1e-12);
	}

	#[test]
	fn compiled_sources_stamp_ids() {
		let bl = beamline();
		let rays = bl.compile_sources(1, 42).unwrap();

		assert_eq!(rays.len(), 9);
		for (i, ray) in rays.iter().enumerate() {
			assert_eq!(ray.path_id, i as i32);
			assert_eq!(ray.path_event_id, 0);
			assert_eq!(ray.source_id, 0);
			assert_eq!(ray.event_type, EventType::Emitted);
			assert!((ray.direction.length() - 1.0).abs() < 1e-9);
		}
	}

	#[test]
	fn leaf_nodes_reject_children() {
		let mut node = Node::Element(mirror("m", 0.0));

		assert!(node.add_child(Node::Element(mirror("m2", 0.0))).is_err());
	}

	#[test]
	fn clone_is_a_deep_copy() {
		let original = beamline();
		let mut copy = original.clone();

		copy.traverse(&mut |node| {
			if let Node::Element(dele) = node {
				dele.set("totalWidth", DesignValue::F64(1.0));
			}
			false
		});
		copy.add_child(Node::Element(mirror("m3", 30.0)));

		assert_eq!(original.num_objects(), 3);
		assert_eq!(copy.num_objects(), 4);

		// The original still compiles with its own widths.
		let elements = original.compile_elements().unwrap();
		assert_eq!(elements[0].cutout, crate::element::Cutout::Rect { size_x1: 50.0, size_x2: 50.0 });
	}

	#[test]
	fn traversal_aborts_early() {
		let bl = beamline();
		let mut seen = 0;
		let aborted = bl.ctraverse(&mut |_| {
			seen += 1;
			seen == 2
		});

		assert!(aborted);
		assert_eq!(seen, 2);
	}
}
