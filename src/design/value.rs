use std::collections::BTreeMap;

use crate::element::{CylinderDirection, RzpDesignType, RzpImageType, ToroidKind};
use crate::math::{DMat4, DVec4, Rad};
use crate::sources::{ElectronEnergyOrientation, SigmaType, SourceDist};
use crate::{Error, Result};

/// The closed set of value types a design parameter can hold. The
/// importer fills these in, the compile step reads them back by key;
/// reading a missing key or the wrong type is an error, never a default.
#[derive(Clone, Debug, PartialEq)]
pub enum DesignValue {
	F64(f64),
	Int(i32),
	Bool(bool),
	Str(String),
	Map(DesignMap),
	Vec4(DVec4),
	Mat4(DMat4),
	Angle(Rad),

	SourceDist(SourceDist),
	SigmaType(SigmaType),
	ElectronEnergyOrientation(ElectronEnergyOrientation),
	ToroidKind(ToroidKind),
	CylinderDirection(CylinderDirection),
	RzpImageType(RzpImageType),
	RzpDesignType(RzpDesignType),
}

impl DesignValue {
	fn type_name(&self) -> &'static str {
		match self {
			DesignValue::F64(_) => "f64",
			DesignValue::Int(_) => "int",
			DesignValue::Bool(_) => "bool",
			DesignValue::Str(_) => "string",
			DesignValue::Map(_) => "map",
			DesignValue::Vec4(_) => "vec4",
			DesignValue::Mat4(_) => "mat4",
			DesignValue::Angle(_) => "angle",
			DesignValue::SourceDist(_) => "source distribution",
			DesignValue::SigmaType(_) => "sigma type",
			DesignValue::ElectronEnergyOrientation(_) => "electron energy orientation",
			DesignValue::ToroidKind(_) => "toroid kind",
			DesignValue::CylinderDirection(_) => "cylinder direction",
			DesignValue::RzpImageType(_) => "rzp image type",
			DesignValue::RzpDesignType(_) => "rzp design type",
		}
	}
}

macro_rules! accessor {
	($get:ident, $variant:ident, $ty:ty, $name:literal) => {
		pub fn $get(&self, key: &str) -> Result<$ty> {
			match self.get(key)? {
				DesignValue::$variant(v) => Ok(v.clone()),
				other => Err(Error::UnexpectedType(format!("{key} ({})", other.type_name()), $name)),
			}
		}
	};
}

/// String-keyed map of design parameters owned by a single node. Maps are
/// deep-cloned with the node, never shared.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DesignMap {
	values: BTreeMap<String, DesignValue>,
}

impl DesignMap {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set(&mut self, key: &str, value: DesignValue) {
		self.values.insert(key.to_string(), value);
	}

	pub fn get(&self, key: &str) -> Result<&DesignValue> {
		self.values
			.get(key)
			.ok_or_else(|| Error::MissingParameter(String::new(), key.to_string()))
	}

	pub fn contains(&self, key: &str) -> bool {
		self.values.contains_key(key)
	}

	accessor!(f64, F64, f64, "f64");
	accessor!(int, Int, i32, "int");
	accessor!(bool, Bool, bool, "bool");
	accessor!(str, Str, String, "string");
	accessor!(map, Map, DesignMap, "map");
	accessor!(vec4, Vec4, DVec4, "vec4");
	accessor!(mat4, Mat4, DMat4, "mat4");
	accessor!(angle, Angle, Rad, "angle");
	accessor!(source_dist, SourceDist, SourceDist, "source distribution");
	accessor!(sigma_type, SigmaType, SigmaType, "sigma type");
	accessor!(electron_energy_orientation, ElectronEnergyOrientation, ElectronEnergyOrientation, "electron energy orientation");
	accessor!(toroid_kind, ToroidKind, ToroidKind, "toroid kind");
	accessor!(cylinder_direction, CylinderDirection, CylinderDirection, "cylinder direction");
	accessor!(rzp_image_type, RzpImageType, RzpImageType, "rzp image type");
	accessor!(rzp_design_type, RzpDesignType, RzpDesignType, "rzp design type");

	/// A f64 with a fallback, for parameters the UI only writes when the
	/// user touched them.
	pub fn f64_or(&self, key: &str, default: f64) -> f64 {
		self.f64(key).unwrap_or(default)
	}

	pub fn int_or(&self, key: &str, default: i32) -> i32 {
		self.int(key).unwrap_or(default)
	}

	pub fn angle_or(&self, key: &str, default: Rad) -> Rad {
		self.angle(key).unwrap_or(default)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn typed_access() {
		let mut map = DesignMap::new();
		map.set("radius", DesignValue::F64(100.0));
		map.set("order", DesignValue::Int(1));

		assert_eq!(map.f64("radius").unwrap(), 100.0);
		assert_eq!(map.int("order").unwrap(), 1);
	}

	#[test]
	fn wrong_type_is_an_error() {
		let mut map = DesignMap::new();
		map.set("radius", DesignValue::Str("oops".into()));

		assert!(matches!(map.f64("radius"), Err(Error::UnexpectedType(..))));
	}

	#[test]
	fn missing_key_is_an_error() {
		let map = DesignMap::new();

		assert!(matches!(map.f64("radius"), Err(Error::MissingParameter(..))));
	}

	#[test]
	fn nested_maps_deep_clone() {
		let mut inner = DesignMap::new();
		inner.set("x", DesignValue::F64(1.0));
		let mut outer = DesignMap::new();
		outer.set("inner", DesignValue::Map(inner));

		let mut copy = outer.clone();
		let mut inner = copy.map("inner").unwrap();
		inner.set("x", DesignValue::F64(2.0));
		copy.set("inner", DesignValue::Map(inner));

		assert_eq!(outer.map("inner").unwrap().f64("x").unwrap(), 1.0);
		assert_eq!(copy.map("inner").unwrap().f64("x").unwrap(), 2.0);
	}
}
