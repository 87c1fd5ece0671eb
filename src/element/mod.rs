pub mod behavior;
pub mod cutout;
pub mod record;
pub mod surface;

pub use behavior::{Behavior, CrystalBehavior, GratingBehavior, RzpBehavior, RzpDesignType, RzpImageType, SlitBehavior};
pub use cutout::Cutout;
pub use record::{Element, SlopeError, ELEMENT_WIRE_SIZE};
pub use surface::{CubicSurface, CylinderDirection, ParaboloidFocus, PlaneDir, QuadricSurface, Surface, ToroidKind, ToroidSurface};
