use std::io::{BufRead, Write};

use crate::math::Cplx;
use crate::rays::soa::RayAttrFlag;
use crate::rays::{EventType, Rays};
use crate::{Error, Result};

/// Fixed cell width; cells are right-aligned so the file reads as a
/// grid.
const CELL_SIZE: usize = 23;
const DELIMITER: char = ',';

fn cell(value: &str) -> String {
	if value.len() > CELL_SIZE {
		log::warn!("csv cell \"{value}\" needs to be shortened");
	}
	format!("{value:>CELL_SIZE$}")
}

fn double_cell(value: f64) -> String {
	let mut s = format!("{value:.17}");
	s.truncate(CELL_SIZE);
	cell(&s)
}

/// One column of the file: its header name plus how to print the value
/// at an event index.
struct Column {
	name: &'static str,
	flag: RayAttrFlag,
	get: fn(&Rays, usize) -> String,
}

fn complex_re(v: &[Cplx], i: usize) -> String {
	double_cell(v[i].re)
}

fn complex_im(v: &[Cplx], i: usize) -> String {
	double_cell(v[i].im)
}

fn columns() -> Vec<Column> {
	vec![
		Column { name: "path_id", flag: RayAttrFlag::PATH_ID, get: |r, i| cell(&r.path_id[i].to_string()) },
		Column { name: "path_event_id", flag: RayAttrFlag::PATH_EVENT_ID, get: |r, i| cell(&r.path_event_id[i].to_string()) },
		Column { name: "position_x", flag: RayAttrFlag::POSITION_X, get: |r, i| double_cell(r.position_x[i]) },
		Column { name: "position_y", flag: RayAttrFlag::POSITION_Y, get: |r, i| double_cell(r.position_y[i]) },
		Column { name: "position_z", flag: RayAttrFlag::POSITION_Z, get: |r, i| double_cell(r.position_z[i]) },
		Column { name: "event_type", flag: RayAttrFlag::EVENT_TYPE, get: |r, i| cell(r.event_type[i].name()) },
		Column { name: "direction_x", flag: RayAttrFlag::DIRECTION_X, get: |r, i| double_cell(r.direction_x[i]) },
		Column { name: "direction_y", flag: RayAttrFlag::DIRECTION_Y, get: |r, i| double_cell(r.direction_y[i]) },
		Column { name: "direction_z", flag: RayAttrFlag::DIRECTION_Z, get: |r, i| double_cell(r.direction_z[i]) },
		Column { name: "energy", flag: RayAttrFlag::ENERGY, get: |r, i| double_cell(r.energy[i]) },
		Column { name: "electric_field_x (real)", flag: RayAttrFlag::ELECTRIC_FIELD_X, get: |r, i| complex_re(&r.electric_field_x, i) },
		Column { name: "electric_field_x (imag)", flag: RayAttrFlag::ELECTRIC_FIELD_X, get: |r, i| complex_im(&r.electric_field_x, i) },
		Column { name: "electric_field_y (real)", flag: RayAttrFlag::ELECTRIC_FIELD_Y, get: |r, i| complex_re(&r.electric_field_y, i) },
		Column { name: "electric_field_y (imag)", flag: RayAttrFlag::ELECTRIC_FIELD_Y, get: |r, i| complex_im(&r.electric_field_y, i) },
		Column { name: "electric_field_z (real)", flag: RayAttrFlag::ELECTRIC_FIELD_Z, get: |r, i| complex_re(&r.electric_field_z, i) },
		Column { name: "electric_field_z (imag)", flag: RayAttrFlag::ELECTRIC_FIELD_Z, get: |r, i| complex_im(&r.electric_field_z, i) },
		Column { name: "path_length", flag: RayAttrFlag::PATH_LENGTH, get: |r, i| double_cell(r.path_length[i]) },
		Column { name: "order", flag: RayAttrFlag::ORDER, get: |r, i| double_cell(r.order[i]) },
		Column { name: "element_id", flag: RayAttrFlag::ELEMENT_ID, get: |r, i| cell(&r.element_id[i].to_string()) },
		Column { name: "source_id", flag: RayAttrFlag::SOURCE_ID, get: |r, i| cell(&r.source_id[i].to_string()) },
		Column { name: "object_id", flag: RayAttrFlag::OBJECT_ID, get: |r, i| cell(&r.object_id[i].to_string()) },
	]
}

/// Writes the populated attributes of a bundle as fixed-width CSV, one
/// event per line.
pub fn write_csv(rays: &Rays, out: &mut dyn Write) -> Result<()> {
	let mask = rays.attr_mask();
	let columns: Vec<Column> = columns().into_iter().filter(|c| mask.contains(c.flag)).collect();

	let header: Vec<String> = columns.iter().map(|c| cell(c.name)).collect();
	writeln!(out, "{}", header.join(&DELIMITER.to_string()))?;

	for i in 0..rays.num_events {
		let row: Vec<String> = columns.iter().map(|c| (c.get)(rays, i)).collect();
		writeln!(out, "{}", row.join(&DELIMITER.to_string()))?;
	}
	Ok(())
}

fn parse_f64(token: &str) -> Result<f64> {
	token.parse().map_err(|e| Error::Parse(format!("bad float '{token}': {e}")))
}

fn parse_i32(token: &str) -> Result<i32> {
	token.parse().map_err(|e| Error::Parse(format!("bad integer '{token}': {e}")))
}

/// Reads a bundle back from CSV. Attribute presence is driven by the
/// header; whitespace padding is ignored, event types parse by name.
pub fn read_csv(input: &mut dyn BufRead) -> Result<Rays> {
	let mut lines = input.lines();
	let header = lines
		.next()
		.ok_or_else(|| Error::Parse("empty csv".into()))?
		.map_err(Error::Io)?;

	let names: Vec<String> = header.split(DELIMITER).map(|c| c.trim().to_string()).collect();

	let mut rays = Rays::default();
	let mut attr = RayAttrFlag::empty();
	for name in &names {
		let base = name.strip_suffix(" (real)").or_else(|| name.strip_suffix(" (imag)")).unwrap_or(name);
		match RayAttrFlag::from_names(&[base]) {
			Some(flag) => attr |= flag,
			None => return Err(Error::Parse(format!("unknown csv column '{name}'"))),
		}
	}
	rays.attr = attr;

	for line in lines {
		let line = line.map_err(Error::Io)?;
		if line.trim().is_empty() {
			continue;
		}
		let cells: Vec<&str> = line.split(DELIMITER).map(|c| c.trim()).collect();
		if cells.len() != names.len() {
			return Err(Error::Parse(format!(
				"row has {} cells, header has {}",
				cells.len(),
				names.len()
			)));
		}

		for (name, token) in names.iter().zip(&cells) {
			match name.as_str() {
				"path_id" => rays.path_id.push(parse_i32(token)?),
				"path_event_id" => rays.path_event_id.push(parse_i32(token)?),
				"position_x" => rays.position_x.push(parse_f64(token)?),
				"position_y" => rays.position_y.push(parse_f64(token)?),
				"position_z" => rays.position_z.push(parse_f64(token)?),
				"event_type" => rays.event_type.push(
					EventType::parse(token).ok_or_else(|| Error::Parse(format!("unknown event type '{token}'")))?,
				),
				"direction_x" => rays.direction_x.push(parse_f64(token)?),
				"direction_y" => rays.direction_y.push(parse_f64(token)?),
				"direction_z" => rays.direction_z.push(parse_f64(token)?),
				"energy" => rays.energy.push(parse_f64(token)?),
				"electric_field_x (real)" => rays.electric_field_x.push(Cplx::new(parse_f64(token)?, 0.0)),
				"electric_field_x (imag)" => match rays.electric_field_x.last_mut() {
					Some(c) => c.im = parse_f64(token)?,
					None => return Err(Error::Parse("imaginary column before its real part".into())),
				},
				"electric_field_y (real)" => rays.electric_field_y.push(Cplx::new(parse_f64(token)?, 0.0)),
				"electric_field_y (imag)" => match rays.electric_field_y.last_mut() {
					Some(c) => c.im = parse_f64(token)?,
					None => return Err(Error::Parse("imaginary column before its real part".into())),
				},
				"electric_field_z (real)" => rays.electric_field_z.push(Cplx::new(parse_f64(token)?, 0.0)),
				"electric_field_z (imag)" => match rays.electric_field_z.last_mut() {
					Some(c) => c.im = parse_f64(token)?,
					None => return Err(Error::Parse("imaginary column before its real part".into())),
				},
				"path_length" => rays.path_length.push(parse_f64(token)?),
				"order" => rays.order.push(parse_f64(token)?),
				"element_id" => rays.element_id.push(parse_i32(token)?),
				"source_id" => rays.source_id.push(parse_i32(token)?),
				"object_id" => rays.object_id.push(parse_i32(token)?),
				other => return Err(Error::Parse(format!("unknown csv column '{other}'"))),
			}
		}
		rays.num_events += 1;
	}

	Ok(rays)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::kernel::rand::RayRand;
	use crate::math::{DVec3, Field3};
	use crate::rays::Ray;

	fn bundle() -> Rays {
		let mut rays = Rays::with_attrs(RayAttrFlag::all());
		for path in 0..3 {
			for event in 0..2 {
				let ray = Ray {
					position: DVec3::new(path as f64, event as f64, 1.5),
					direction: DVec3::Z,
					energy: 100.25,
					field: Field3::new(Cplx::new(1.0, -0.5), Cplx::new(0.0, 0.25), Cplx::new(0.0, 0.0)),
					path_length: 12.0 * path as f64,
					order: -1.0,
					event_type: if event == 0 { EventType::Emitted } else { EventType::FlyOff },
					last_element: event,
					source_id: 0,
					path_id: path,
					path_event_id: event,
					rand: RayRand::new(0),
				};
				rays.push(&ray, 0);
			}
		}
		rays
	}

	#[test]
	fn round_trip_is_identity() {
		let rays = bundle();

		let mut buffer = Vec::new();
		write_csv(&rays, &mut buffer).unwrap();
		let back = read_csv(&mut std::io::Cursor::new(buffer)).unwrap();

		assert_eq!(back.num_events, rays.num_events);
		assert_eq!(back.path_id, rays.path_id);
		assert_eq!(back.event_type, rays.event_type);
		assert_eq!(back.element_id, rays.element_id);
		for i in 0..rays.num_events {
			assert!((back.position_x[i] - rays.position_x[i]).abs() < 1e-12);
			assert!((back.energy[i] - rays.energy[i]).abs() < 1e-12);
			assert!((back.electric_field_x[i].im - rays.electric_field_x[i].im).abs() < 1e-12);
		}
	}

	#[test]
	fn partial_attr_round_trip() {
		let full = bundle();
		let mut rays = Rays::with_attrs(RayAttrFlag::POSITION | RayAttrFlag::OBJECT_ID);
		for i in 0..full.num_events {
			rays.push(&full.ray(i), 7);
		}

		let mut buffer = Vec::new();
		write_csv(&rays, &mut buffer).unwrap();
		let back = read_csv(&mut std::io::Cursor::new(buffer)).unwrap();

		assert_eq!(back.attr_mask(), RayAttrFlag::POSITION | RayAttrFlag::OBJECT_ID);
		assert_eq!(back.object_id, rays.object_id);
		assert!(back.energy.is_empty());
	}

	#[test]
	fn header_cells_are_fixed_width() {
		let mut buffer = Vec::new();
		write_csv(&bundle(), &mut buffer).unwrap();
		let text = String::from_utf8(buffer).unwrap();
		let header = text.lines().next().unwrap();

		for cell in header.split(',') {
			assert_eq!(cell.len(), CELL_SIZE);
		}
	}

	#[test]
	fn unknown_column_is_rejected() {
		let bad = "             mystery_col\n                    1.0\n";
		assert!(read_csv(&mut std::io::Cursor::new(bad)).is_err());
	}
}
