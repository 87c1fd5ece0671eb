use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// No material attached; the element reflects without attenuation.
pub const MATERIAL_VACUUM: i32 = -1;

/// Compact per-element refractive-index tables.
///
/// Only the materials a beamline actually references are loaded.
/// `index_table[z - 1]` is the row offset of element `z` inside
/// `material_table`, or -1 when that element was not requested. Rows are
/// (energy eV, n, k) triples sorted by energy.
#[derive(Clone, Debug, Default)]
pub struct MaterialTables {
	pub index_table: Vec<i32>,
	pub material_table: Vec<f64>,
	row_counts: Vec<i32>,
}

impl MaterialTables {
	/// Looks up (n, k) for atomic number `z` at the given photon energy,
	/// linearly interpolating between table rows.
	pub fn refractive_index(&self, z: i32, energy: f64) -> Option<(f64, f64)> {
		if !(1..=92).contains(&z) {
			return None;
		}
		let offset = *self.index_table.get((z - 1) as usize)?;
		if offset < 0 {
			return None;
		}
		let rows = self.row_counts[(z - 1) as usize] as usize;
		let table = &self.material_table[offset as usize..offset as usize + rows * 3];

		let row = |i: usize| (table[i * 3], table[i * 3 + 1], table[i * 3 + 2]);

		let (e0, ..) = row(0);
		if energy <= e0 {
			let (_, n, k) = row(0);
			return Some((n, k));
		}
		let (elast, ..) = row(rows - 1);
		if energy >= elast {
			let (_, n, k) = row(rows - 1);
			return Some((n, k));
		}

		let mut lo = 0;
		let mut hi = rows - 1;
		while lo + 1 < hi {
			let mid = (lo + hi) / 2;
			if row(mid).0 <= energy {
				lo = mid;
			} else {
				hi = mid;
			}
		}

		let (ea, na, ka) = row(lo);
		let (eb, nb, kb) = row(hi);
		let t = (energy - ea) / (eb - ea);
		Some((na + (nb - na) * t, ka + (kb - ka) * t))
	}

	pub fn has(&self, z: i32) -> bool {
		(1..=92).contains(&z) && self.index_table.get((z - 1) as usize).is_some_and(|o| *o >= 0)
	}
}

fn material_dir() -> PathBuf {
	std::env::var_os("BEAMTRACE_MATERIAL_DIR")
		.map(PathBuf::from)
		.unwrap_or_else(|| PathBuf::from("data/materials"))
}

fn parse_table(path: &Path) -> Result<Vec<f64>> {
	let text = std::fs::read_to_string(path)?;
	let mut rows = Vec::new();
	for line in text.lines() {
		let line = line.trim();
		if line.is_empty() || line.starts_with('#') {
			continue;
		}
		let mut cols = line.split_whitespace();
		for _ in 0..3 {
			let col = cols
				.next()
				.ok_or_else(|| Error::Parse(format!("{}: expected 3 columns", path.display())))?;
			rows.push(col.parse::<f64>().map_err(|e| Error::Parse(format!("{}: {e}", path.display())))?);
		}
	}
	Ok(rows)
}

/// Loads the tables for exactly the requested atomic numbers from the
/// material data directory. A requested element whose table is missing or
/// malformed fails the whole load.
pub fn load_material_tables(relevant: &[bool; 92]) -> Result<MaterialTables> {
	let dir = material_dir();
	let mut tables = MaterialTables {
		index_table: vec![-1; 92],
		material_table: Vec::new(),
		row_counts: vec![0; 92],
	};

	for z in 1..=92 {
		if !relevant[z - 1] {
			continue;
		}
		let path = dir.join(format!("{z}.dat"));
		let rows = parse_table(&path).map_err(|e| {
			log::warn!("material table for Z={z} not loadable: {e}");
			Error::UnknownMaterial(z as i32)
		})?;
		if rows.is_empty() {
			return Err(Error::UnknownMaterial(z as i32));
		}
		tables.index_table[z - 1] = tables.material_table.len() as i32;
		tables.row_counts[z - 1] = (rows.len() / 3) as i32;
		tables.material_table.extend_from_slice(&rows);
	}

	Ok(tables)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn table_for_test() -> MaterialTables {
		MaterialTables {
			index_table: {
				let mut t = vec![-1; 92];
				t[78] = 0; // Z = 79, gold
				t
			},
			material_table: vec![
				100.0, 0.9, 0.1,
				200.0, 0.8, 0.2,
				400.0, 0.6, 0.4,
			],
			row_counts: {
				let mut t = vec![0; 92];
				t[78] = 3;
				t
			},
		}
	}

	#[test]
	fn interpolates_between_rows() {
		let tables = table_for_test();
		let (n, k) = tables.refractive_index(79, 150.0).unwrap();

		assert!((n - 0.85).abs() < 1e-12);
		assert!((k - 0.15).abs() < 1e-12);
	}

	#[test]
	fn clamps_outside_the_table() {
		let tables = table_for_test();

		assert_eq!(tables.refractive_index(79, 1.0), Some((0.9, 0.1)));
		assert_eq!(tables.refractive_index(79, 1e6), Some((0.6, 0.4)));
	}

	#[test]
	fn unknown_material_is_none() {
		let tables = table_for_test();

		assert_eq!(tables.refractive_index(5, 100.0), None);
		assert!(!tables.has(5));
		assert!(tables.has(79));
	}
}
