pub mod csv;

pub use csv::{read_csv, write_csv};
