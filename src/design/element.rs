use super::value::{DesignMap, DesignValue};
use crate::beamline::Rotation;
use crate::element::{
	behavior::{Behavior, CrystalBehavior, GratingBehavior, RzpBehavior, SlitBehavior},
	cutout::Cutout,
	record::{Element, SlopeError},
	surface::{self, CubicSurface, QuadricSurface, Surface},
	RzpDesignType, RzpImageType, ToroidKind,
};
use crate::math::{DMat3, DMat4, DVec3, Rad};
use crate::{Error, Result};

/// A not-yet-compiled optical element: local transform plus the design
/// parameters the UI or importer filled in.
#[derive(Clone, Debug, PartialEq)]
pub struct DesignElement {
	pub name: String,
	pub position: DVec3,
	pub rotation: Rotation,
	pub params: DesignMap,
}

impl DesignElement {
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

	fn err_context(&self, e: Error) -> Error {
		match e {
			Error::MissingParameter(_, key) => Error::MissingParameter(self.name.clone(), key),
			other => other,
		}
	}

	pub fn material(&self) -> i32 {
		self.params.int_or("material", crate::material::MATERIAL_VACUUM)
	}

	/// Compiles into a flat kernel record, with the world transform of the
	/// parent group already folded into `world_pos` / `world_rot`.
	pub fn compile(&self, world_pos: DVec3, world_rot: DMat3) -> Result<Element> {
		self.compile_inner(world_pos, world_rot).map_err(|e| self.err_context(e))
	}

	fn compile_inner(&self, world_pos: DVec3, world_rot: DMat3) -> Result<Element> {
		let behavior = self.compile_behavior()?;
		let surface = self.compile_surface(&behavior)?;
		let cutout = match behavior {
			// Image planes record everything; slit plates absorb
			// everything that misses the opening.
			Behavior::ImagePlane | Behavior::Slit(_) => Cutout::Unlimited,
			_ => self.compile_cutout("geometricalShape", "totalWidth", "totalLength")?,
		};

		let rot = world_rot * self.rotation.to_matrix();
		let pos = world_rot * self.position + world_pos;
		let out_trans = DMat4::from_rotation_translation(rot, pos);

		Ok(Element {
			in_trans: out_trans.inv(),
			out_trans,
			surface,
			cutout,
			behavior,
			slope_error: SlopeError {
				sag: self.params.f64_or("slopeErrorSag", 0.0),
				mer: self.params.f64_or("slopeErrorMer", 0.0),
				thermal_distortion_amp: self.params.f64_or("thermalDistortionAmp", 0.0),
				thermal_distortion_sigma_x: self.params.f64_or("thermalDistortionSigmaX", 0.0),
				thermal_distortion_sigma_z: self.params.f64_or("thermalDistortionSigmaZ", 0.0),
				cylindrical_bowing_amp: self.params.f64_or("cylindricalBowingAmp", 0.0),
				cylindrical_bowing_radius: self.params.f64_or("cylindricalBowingRadius", 0.0),
			},
			azimuthal_angle: self.params.angle_or("azimuthalAngle", Rad(0.0)),
			material: self.material(),
		})
	}

	fn compile_surface(&self, behavior: &Behavior) -> Result<Surface> {
		let curvature = if self.params.contains("curvatureType") {
			self.params.str("curvatureType")?
		} else {
			"Plane".to_string()
		};

		Ok(match curvature.as_str() {
			"Plane" => match behavior {
				// Slits and image planes stand upright in the beam.
				Behavior::Slit(_) | Behavior::ImagePlane => Surface::PlaneXy,
				_ => Surface::PlaneXz,
			},
			"Sphere" => surface::make_sphere(self.params.f64("radius")?),
			"Cylinder" => surface::make_cylinder(
				self.params.cylinder_direction("cylinderDirection")?,
				self.params.f64_or("radius", 0.0),
				self.params.angle("grazingIncAngle")?,
				self.params.f64("entranceArmLength")?,
				self.params.f64("exitArmLength")?,
			),
			"Toroid" => surface::make_toroid(
				self.params.f64("longRadius")?,
				self.params.f64("shortRadius")?,
				self.params.toroid_kind("toroidKind").unwrap_or(ToroidKind::Concave),
			),
			"Cone" => surface::make_cone(
				self.params.angle("grazingIncAngle")?,
				self.params.f64("entranceArmLength")?,
				self.params.f64("exitArmLength")?,
				self.params.f64("totalLength")?,
			),
			"Paraboloid" => surface::make_paraboloid(
				self.params.f64("armLength")?,
				self.params.f64("parameterP")?,
				if self.params.int_or("parameterPType", 0) == 0 {
					surface::ParaboloidFocus::Collimate
				} else {
					surface::ParaboloidFocus::Focus
				},
				self.params.angle("grazingIncAngle")?,
				self.params.f64_or("parameterA11", 1.0),
			),
			"Ellipsoid" => surface::make_ellipsoid(
				self.params.f64("longHalfAxisA")?,
				self.params.f64("shortHalfAxisB")?,
				self.params.angle_or("designGrazingIncAngle", self.params.angle("grazingIncAngle")?),
				self.params.f64("entranceArmLength")?,
				self.params.f64("exitArmLength")?,
				self.params.f64_or("parameterA11", 1.0),
			),
			"Cubic" => Surface::Cubic(CubicSurface {
				quadric: QuadricSurface {
					icurv: self.params.int_or("icurv", 1) as i8,
					a11: self.params.f64_or("a11", 0.0),
					a12: self.params.f64_or("a12", 0.0),
					a13: self.params.f64_or("a13", 0.0),
					a14: self.params.f64_or("a14", 0.0),
					a22: self.params.f64_or("a22", 0.0),
					a23: self.params.f64_or("a23", 0.0),
					a24: self.params.f64_or("a24", -1.0),
					a33: self.params.f64_or("a33", 0.0),
					a34: self.params.f64_or("a34", 0.0),
					a44: self.params.f64_or("a44", 0.0),
				},
				b12: self.params.f64_or("b12", 0.0),
				b21: self.params.f64_or("b21", 0.0),
				b23: self.params.f64_or("b23", 0.0),
				b32: self.params.f64_or("b32", 0.0),
				psi: self.params.angle_or("cubicPsi", Rad(0.0)),
			}),
			other => {
				return Err(Error::InvalidArgument(format!(
					"element '{}': unknown curvature type '{other}'",
					self.name
				)))
			}
		})
	}

	fn compile_cutout(&self, shape_key: &str, width_key: &str, length_key: &str) -> Result<Cutout> {
		let shape = if self.params.contains(shape_key) {
			self.params.str(shape_key)?
		} else {
			"Rect".to_string()
		};

		Ok(match shape.as_str() {
			"Rect" => Cutout::Rect {
				size_x1: self.params.f64(width_key)?,
				size_x2: self.params.f64(length_key)?,
			},
			"Elliptical" => Cutout::Elliptical {
				diameter_x1: self.params.f64(width_key)?,
				diameter_x2: self.params.f64(length_key)?,
			},
			"Trapezoid" => Cutout::Trapezoid {
				size_a_x1: self.params.f64(width_key)?,
				size_b_x1: self.params.f64("totalWidthB")?,
				size_x2: self.params.f64(length_key)?,
			},
			"Unlimited" => Cutout::Unlimited,
			other => {
				return Err(Error::InvalidArgument(format!(
					"element '{}': unknown cutout shape '{other}'",
					self.name
				)))
			}
		})
	}

	fn compile_behavior(&self) -> Result<Behavior> {
		let kind = self.params.str("behaviourType")?;

		Ok(match kind.as_str() {
			"Mirror" => Behavior::Mirror,
			"Grating" => Behavior::Grating(GratingBehavior {
				vls: [
					self.params.f64_or("vlsParameter0", 0.0),
					self.params.f64_or("vlsParameter1", 0.0),
					self.params.f64_or("vlsParameter2", 0.0),
					self.params.f64_or("vlsParameter3", 0.0),
					self.params.f64_or("vlsParameter4", 0.0),
					self.params.f64_or("vlsParameter5", 0.0),
				],
				line_density: self.params.f64("lineDensity")?,
				order: self.params.int_or("orderOfDiffraction", 1) as f64,
			}),
			"Slit" => Behavior::Slit(SlitBehavior {
				opening: self.compile_cutout("openingShape", "openingWidth", "openingHeight")?,
				beamstop: self.compile_beamstop()?,
			}),
			"Rzp" => Behavior::Rzp(self.compile_rzp()?),
			"ImagePlane" => Behavior::ImagePlane,
			"Absorber" => Behavior::Absorb,
			"Crystal" => Behavior::Crystal(CrystalBehavior {
				d_spacing_sq: self.params.f64("dSpacing2")?,
				unit_cell_volume: self.params.f64("unitCellVolume")?,
				offset_angle: self.params.angle_or("offsetAngle", Rad(0.0)),
				structure_factor_f0: (
					self.params.f64("structureFactorReF0")?,
					self.params.f64("structureFactorImF0")?,
				),
				structure_factor_fh: (
					self.params.f64("structureFactorReFH")?,
					self.params.f64("structureFactorImFH")?,
				),
				structure_factor_fhc: (
					self.params.f64("structureFactorReFHC")?,
					self.params.f64("structureFactorImFHC")?,
				),
			}),
			other => {
				return Err(Error::InvalidArgument(format!(
					"element '{}': unknown behaviour type '{other}'",
					self.name
				)))
			}
		})
	}

	fn compile_beamstop(&self) -> Result<Cutout> {
		let shape = if self.params.contains("centralBeamstop") {
			self.params.str("centralBeamstop")?
		} else {
			"None".to_string()
		};

		Ok(match shape.as_str() {
			// An empty beamstop absorbs nothing.
			"None" => Cutout::Rect { size_x1: 0.0, size_x2: 0.0 },
			"Rect" => Cutout::Rect {
				size_x1: self.params.f64("stopWidth")?,
				size_x2: self.params.f64("stopHeight")?,
			},
			"Elliptical" => Cutout::Elliptical {
				diameter_x1: self.params.f64("stopWidth")?,
				diameter_x2: self.params.f64("stopHeight")?,
			},
			other => {
				return Err(Error::InvalidArgument(format!(
					"element '{}': unknown beamstop '{other}'",
					self.name
				)))
			}
		})
	}

	fn compile_rzp(&self) -> Result<RzpBehavior> {
		let design_alpha = self.params.angle("designAlphaAngle")?;
		let design_beta = self.params.angle_or("designBetaAngle", design_alpha);
		let sagittal_entrance_arm = self.params.f64("designSagittalEntranceArmLength")?;
		let sagittal_exit_arm = self.params.f64("designSagittalExitArmLength")?;

		let design_type = self.params.rzp_design_type("rzpDesignType").unwrap_or(RzpDesignType::ZOffset);
		let fresnel_z_offset = match design_type {
			RzpDesignType::ZOffset => self.params.f64_or("fresnelZOffset", 0.0),
			RzpDesignType::Beta => {
				// Derive the Fresnel center offset from the design exit angle.
				let ricosa = sagittal_entrance_arm * design_alpha.cos();
				let rocosb = sagittal_exit_arm * design_beta.cos();
				let risina = sagittal_entrance_arm * design_alpha.sin();
				let rosinb = sagittal_exit_arm * design_beta.sin();
				let tan_theta = (risina + rosinb) / (ricosa + rocosb);
				risina / tan_theta - ricosa
			}
		};

		// The sign of the design order depends on which side of the
		// design geometry the offset falls on.
		let design_order_magnitude = self.params.int_or("designOrderOfDiffraction", 1).abs() as f64;
		let presign = match design_type {
			RzpDesignType::ZOffset => {
				if design_alpha >= design_beta { -1.0 } else { 1.0 }
			}
			RzpDesignType::Beta => {
				if fresnel_z_offset >= 0.0 { -1.0 } else { 1.0 }
			}
		};

		Ok(RzpBehavior {
			image_type: self.params.rzp_image_type("imageType").unwrap_or(RzpImageType::PointToPoint),
			rzp_type: self.params.int_or("rzpType", 0),
			derivation_method: self.params.int_or("derivationMethod", 0),
			design_wavelength: self.params.f64("designWavelength")?,
			design_order: design_order_magnitude * presign,
			order: self.params.int_or("orderOfDiffraction", 1) as f64,
			fresnel_z_offset,
			sagittal_entrance_arm,
			sagittal_exit_arm,
			meridional_entrance_arm: self.params.f64("designMeridionalEntranceArmLength")?,
			meridional_exit_arm: self.params.f64("designMeridionalExitArmLength")?,
			design_alpha,
			design_beta,
			additional_order: self.params.int_or("additionalOrder", 0) != 0,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn plane_mirror() -> DesignElement {
		let mut dele = DesignElement::new("mirror");
		dele.set("behaviourType", DesignValue::Str("Mirror".into()))
			.set("totalWidth", DesignValue::F64(50.0))
			.set("totalLength", DesignValue::F64(200.0));
		dele
	}

	#[test]
	fn plane_mirror_compiles() {
		let element = plane_mirror().compile(DVec3::ZERO, DMat3::identity()).unwrap();

		assert_eq!(element.surface, Surface::PlaneXz);
		assert_eq!(element.cutout, Cutout::Rect { size_x1: 50.0, size_x2: 200.0 });
		assert_eq!(element.behavior, Behavior::Mirror);
	}

	#[test]
	fn missing_parameter_names_the_node() {
		let mut dele = DesignElement::new("bad");
		dele.set("behaviourType", DesignValue::Str("Mirror".into()));

		match dele.compile(DVec3::ZERO, DMat3::identity()) {
			Err(Error::MissingParameter(node, key)) => {
				assert_eq!(node, "bad");
				assert_eq!(key, "totalWidth");
			}
			other => panic!("expected MissingParameter, got {other:?}"),
		}
	}

	#[test]
	fn transforms_are_inverses() {
		let mut dele = plane_mirror();
		dele.position = DVec3::new(0.0, 0.0, 1000.0);

		let element = dele.compile(DVec3::new(1.0, 2.0, 3.0), DMat3::identity()).unwrap();
		let p = DVec3::new(5.0, -3.0, 7.0);
		let round = element.in_trans.transform_point(element.out_trans.transform_point(p));

		assert!(p.distance(round) < 1e-9);
	}

	#[test]
	fn slit_uses_the_upright_plane() {
		let mut dele = DesignElement::new("slit");
		dele.set("behaviourType", DesignValue::Str("Slit".into()))
			.set("totalWidth", DesignValue::F64(20.0))
			.set("totalLength", DesignValue::F64(20.0))
			.set("openingShape", DesignValue::Str("Rect".into()))
			.set("openingWidth", DesignValue::F64(3.0))
			.set("openingHeight", DesignValue::F64(3.0))
			.set("centralBeamstop", DesignValue::Str("Rect".into()))
			.set("stopWidth", DesignValue::F64(1.0))
			.set("stopHeight", DesignValue::F64(1.0));

		let element = dele.compile(DVec3::ZERO, DMat3::identity()).unwrap();

		assert_eq!(element.surface, Surface::PlaneXy);
		match element.behavior {
			Behavior::Slit(slit) => {
				assert_eq!(slit.opening, Cutout::Rect { size_x1: 3.0, size_x2: 3.0 });
				assert_eq!(slit.beamstop, Cutout::Rect { size_x1: 1.0, size_x2: 1.0 });
			}
			other => panic!("expected slit, got {other:?}"),
		}
	}
}
