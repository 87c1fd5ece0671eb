pub mod element;
pub mod source;
pub mod value;

pub use element::DesignElement;
pub use source::DesignSource;
pub use value::{DesignMap, DesignValue};
