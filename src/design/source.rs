use super::value::{DesignMap, DesignValue};
use crate::beamline::Rotation;
use crate::math::{DMat3, DMat4, DVec3, DVec4, Rad};
use crate::sources::{
	CircleSource, DipoleSource, EnergyDistribution, MatrixSource, Misalignment, PixelSource, PointSource, SimpleUndulatorSource, Source,
	SourceBase, SourceDist,
};
use crate::{Error, Result};

/// A not-yet-materialized light source: local transform plus design
/// parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct DesignSource {
	pub name: String,
	pub position: DVec3,
	pub rotation: Rotation,
	pub params: DesignMap,
}

impl DesignSource {
	pub fn new(name: &str) -> Self {
		Self {
			name: name.to_string(),
			position: DVec3::ZERO,
			rotation: Rotation::default(),
			params: DesignMap::new(),
		}
	}

	pub fn set(&mut self, key: &str, value: DesignValue) -> &mut Self {
		self.params.set(key, value);
		self
	}

	pub fn num_rays(&self) -> usize {
		self.params.int_or("numberOfRays", 0).max(0) as usize
	}

	fn err_context(&self, e: Error) -> Error {
		match e {
			Error::MissingParameter(_, key) => Error::MissingParameter(self.name.clone(), key),
			other => other,
		}
	}

	/// Builds the concrete source model, with the parent world transform
	/// folded into `world_pos` / `world_rot`.
	pub fn compile(&self, world_pos: DVec3, world_rot: DMat3) -> Result<Source> {
		self.compile_inner(world_pos, world_rot).map_err(|e| self.err_context(e))
	}

	fn compile_inner(&self, world_pos: DVec3, world_rot: DMat3) -> Result<Source> {
		let p = &self.params;

		let rot = world_rot * self.rotation.to_matrix();
		let pos = world_rot * self.position + world_pos;

		let base = SourceBase {
			num_rays: self.num_rays(),
			position: pos,
			orientation: DMat4::from_rotation_translation(rot, DVec3::ZERO),
			stokes: p.vec4("stokes").unwrap_or(DVec4::new(1.0, 1.0, 0.0, 0.0)),
			misalignment: Misalignment {
				translation: DVec3::new(
					p.f64_or("translationXerror", 0.0),
					p.f64_or("translationYerror", 0.0),
					p.f64_or("translationZerror", 0.0),
				),
				rotation_x: p.angle_or("rotationXerror", Rad(0.0)),
				rotation_y: p.angle_or("rotationYerror", Rad(0.0)),
				rotation_z: p.angle_or("rotationZerror", Rad(0.0)),
			},
		};

		let kind = p.str("type")?;
		Ok(match kind.as_str() {
			"MatrixSource" => Source::Matrix(MatrixSource {
				base,
				width: p.f64("sourceWidth")?,
				height: p.f64("sourceHeight")?,
				depth: p.f64_or("sourceDepth", 0.0),
				hor_divergence: p.f64_or("horDivergence", 0.0),
				ver_divergence: p.f64_or("verDivergence", 0.0),
				energy: self.energy_distribution()?,
			}),
			"PointSource" => Source::Point(PointSource {
				base,
				width: p.f64("sourceWidth")?,
				height: p.f64("sourceHeight")?,
				depth: p.f64_or("sourceDepth", 0.0),
				width_dist: p.source_dist("widthDist").unwrap_or(SourceDist::Uniform),
				height_dist: p.source_dist("heightDist").unwrap_or(SourceDist::Uniform),
				hor_dist: p.source_dist("horDist").unwrap_or(SourceDist::Uniform),
				ver_dist: p.source_dist("verDist").unwrap_or(SourceDist::Uniform),
				hor_divergence: p.f64_or("horDivergence", 0.0),
				ver_divergence: p.f64_or("verDivergence", 0.0),
				energy: self.energy_distribution()?,
			}),
			"PixelSource" => Source::Pixel(PixelSource {
				base,
				width: p.f64("sourceWidth")?,
				height: p.f64("sourceHeight")?,
				depth: p.f64_or("sourceDepth", 0.0),
				hor_divergence: p.f64_or("horDivergence", 0.0),
				ver_divergence: p.f64_or("verDivergence", 0.0),
				energy: self.energy_distribution()?,
			}),
			"CircleSource" => Source::Circle(CircleSource {
				base,
				width: p.f64("sourceWidth")?,
				height: p.f64("sourceHeight")?,
				depth: p.f64_or("sourceDepth", 0.0),
				num_circles: p.int_or("numberOfCircles", 1),
				min_opening_angle: p.angle_or("minOpeningAngle", Rad(0.0)),
				max_opening_angle: p.angle_or("maxOpeningAngle", Rad(0.0)),
				delta_opening_angle: p.angle_or("deltaOpeningAngle", Rad(0.0)),
				energy: self.energy_distribution()?,
			}),
			"SimpleUndulatorSource" => Source::SimpleUndulator(SimpleUndulatorSource::new(
				base,
				p.f64_or("sourceDepth", 0.0),
				self.energy_distribution()?,
				p.sigma_type("sigmaType").unwrap_or(crate::sources::SigmaType::Standard),
				p.f64("undulatorLength")?,
				p.f64("photonEnergy")?,
				p.f64_or("electronSigmaX", 0.0),
				p.f64_or("electronSigmaXs", 0.0),
				p.f64_or("electronSigmaY", 0.0),
				p.f64_or("electronSigmaYs", 0.0),
			)),
			"DipoleSource" => Source::Dipole(DipoleSource::new(
				base,
				p.f64("bendingRadius")?,
				p.electron_energy_orientation("electronEnergyOrientation")
					.unwrap_or(crate::sources::ElectronEnergyOrientation::Clockwise),
				p.f64("electronEnergy")?,
				p.f64("photonEnergy")?,
				p.f64_or("energySpread", 0.0),
				p.f64_or("verEbeamDivergence", 0.0),
				p.f64("sourceWidth")?,
				p.f64("sourceHeight")?,
				p.f64_or("horDivergence", 0.0),
			)),
			other => {
				return Err(Error::InvalidArgument(format!(
					"source '{}': unknown source type '{other}'",
					self.name
				)))
			}
		})
	}

	fn energy_distribution(&self) -> Result<EnergyDistribution> {
		let p = &self.params;
		let kind = if p.contains("energyDistributionType") {
			p.str("energyDistributionType")?
		} else {
			"HardEdge".to_string()
		};

		Ok(match kind.as_str() {
			"HardEdge" => EnergyDistribution::HardEdge {
				center: p.f64("photonEnergy")?,
				spread: p.f64_or("energySpread", 0.0),
			},
			"SoftEdge" => EnergyDistribution::SoftEdge {
				center: p.f64("photonEnergy")?,
				sigma: p.f64_or("energySpread", 0.0),
			},
			"SeparateEnergies" => EnergyDistribution::SeparateEnergies {
				center: p.f64("photonEnergy")?,
				spread: p.f64_or("energySpread", 0.0),
				count: p.int_or("numberOfEnergies", 1),
			},
			"DatFile" => {
				let path = p.str("energyDistributionFile")?;
				EnergyDistribution::DatFile(crate::sources::DatFile::load(
					std::path::Path::new(&path),
					p.int_or("continuous", 0) != 0,
				)?)
			}
			other => {
				return Err(Error::InvalidArgument(format!(
					"source '{}': unknown energy distribution '{other}'",
					self.name
				)))
			}
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn matrix_source_compiles() {
		let mut ds = DesignSource::new("src");
		ds.set("type", DesignValue::Str("MatrixSource".into()))
			.set("numberOfRays", DesignValue::Int(100))
			.set("sourceWidth", DesignValue::F64(1.0))
			.set("sourceHeight", DesignValue::F64(1.0))
			.set("photonEnergy", DesignValue::F64(100.0));

		let source = ds.compile(DVec3::ZERO, DMat3::identity()).unwrap();
		assert_eq!(source.num_rays(), 100);
	}

	#[test]
	fn unknown_type_errors() {
		let mut ds = DesignSource::new("src");
		ds.set("type", DesignValue::Str("LaserPointer".into()));

		assert!(ds.compile(DVec3::ZERO, DMat3::identity()).is_err());
	}
}
