pub mod beamline;
pub mod design;
pub mod element;
pub mod io;
pub mod kernel;
pub mod material;
pub mod math;
pub mod rays;
pub mod sources;
pub mod tracer;

#[macro_use]
extern crate bitflags;

/// Errors surfaced to the caller. Per-ray failures (bad geometry, diverged
/// toroid iteration) are never raised through this type, they are recorded
/// as terminal events on the affected ray instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("invalid argument: {0}")]
	InvalidArgument(String),

	#[error("beamline node '{0}' has no design parameter '{1}'")]
	MissingParameter(String, String),

	#[error("design parameter '{0}' has unexpected type (expected {1})")]
	UnexpectedType(String, &'static str),

	#[error("material with atomic number {0} is not loadable")]
	UnknownMaterial(i32),

	#[error("compute device error: {0}")]
	Device(String),

	#[error("io error: {0}")]
	Io(#[from] std::io::Error),

	#[error("parse error: {0}")]
	Parse(String),
}

pub type Result<T> = std::result::Result<T, Error>;
