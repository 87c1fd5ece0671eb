use crate::element::surface::{CubicSurface, QuadricSurface, Surface, ToroidKind, ToroidSurface};
use crate::math::DVec3;

/// Minimum ray parameter for an accepted hit, in element-local units.
/// Guards against re-intersecting the surface a ray just left.
pub const EPSILON: f64 = 1e-9;

const TOROID_MAX_ITERATIONS: u32 = 50;
const TOROID_TOLERANCE: f64 = 1e-10;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Intersection {
	pub t: f64,
	pub point: DVec3,
	pub normal: DVec3,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum IntersectResult {
	Hit(Intersection),
	Miss,
	/// The iterative toroid solve failed to converge.
	BeyondHorizon,
}

/// Intersects a ray, given in element coordinates, with a surface.
pub fn intersect(surface: &Surface, origin: DVec3, direction: DVec3) -> IntersectResult {
	match surface {
		Surface::PlaneXz => plane(origin.y, direction.y, DVec3::Y, origin, direction),
		Surface::PlaneXy => plane(origin.z, direction.z, DVec3::Z, origin, direction),
		Surface::Quadric(q) => quadric(q, origin, direction),
		Surface::Toroid(t) => toroid(t, origin, direction),
		Surface::Cubic(c) => cubic(c, origin, direction),
	}
}

fn plane(o: f64, d: f64, normal: DVec3, origin: DVec3, direction: DVec3) -> IntersectResult {
	if d.abs() < f64::MIN_POSITIVE {
		return IntersectResult::Miss;
	}
	let t = -o / d;
	if t <= EPSILON {
		return IntersectResult::Miss;
	}
	IntersectResult::Hit(Intersection {
		t,
		point: origin + direction * t,
		normal,
	})
}

fn quadric_gradient(q: &QuadricSurface, p: DVec3) -> DVec3 {
	DVec3::new(
		2.0 * (q.a11 * p.x + q.a12 * p.y + q.a13 * p.z + q.a14),
		2.0 * (q.a12 * p.x + q.a22 * p.y + q.a23 * p.z + q.a24),
		2.0 * (q.a13 * p.x + q.a23 * p.y + q.a33 * p.z + q.a34),
	)
}

fn quadric(q: &QuadricSurface, origin: DVec3, direction: DVec3) -> IntersectResult {
	let (o, d) = (origin, direction);

	let a = q.a11 * d.x * d.x + q.a22 * d.y * d.y + q.a33 * d.z * d.z
		+ 2.0 * (q.a12 * d.x * d.y + q.a13 * d.x * d.z + q.a23 * d.y * d.z);
	let b = 2.0
		* (q.a11 * o.x * d.x + q.a22 * o.y * d.y + q.a33 * o.z * d.z
			+ q.a12 * (o.x * d.y + o.y * d.x)
			+ q.a13 * (o.x * d.z + o.z * d.x)
			+ q.a23 * (o.y * d.z + o.z * d.y)
			+ q.a14 * d.x + q.a24 * d.y + q.a34 * d.z);
	let c = q.eval(o.x, o.y, o.z);

	let t = if a.abs() < 1e-20 {
		if b.abs() < f64::MIN_POSITIVE {
			return IntersectResult::Miss;
		}
		let t = -c / b;
		if t <= EPSILON {
			return IntersectResult::Miss;
		}
		t
	} else {
		let discriminant = b * b - 4.0 * a * c;
		if discriminant < 0.0 {
			return IntersectResult::Miss;
		}
		let sq = discriminant.sqrt();

		// icurv selects the branch; fall back to the other root when the
		// preferred one lies behind the origin.
		let (first, second) = if q.icurv >= 0 {
			((-b - sq) / (2.0 * a), (-b + sq) / (2.0 * a))
		} else {
			((-b + sq) / (2.0 * a), (-b - sq) / (2.0 * a))
		};
		if first > EPSILON {
			first
		} else if second > EPSILON {
			second
		} else {
			return IntersectResult::Miss;
		}
	};

	let point = o + d * t;
	IntersectResult::Hit(Intersection {
		t,
		point,
		normal: quadric_gradient(q, point).normalize().into_inner(),
	})
}

/// Implicit toroid value and gradient. The surface is tangent to the
/// origin with its normal along y; the meridional circle (radius
/// `long_radius`) lies in the y-z plane, the sagittal circle (radius
/// `short_radius`) in the x-y plane.
fn toroid_value(t: &ToroidSurface, p: DVec3) -> (f64, DVec3) {
	let s = match t.kind {
		ToroidKind::Concave => 1.0,
		ToroidKind::Convex => -1.0,
	};
	let (big_r, small_r) = (t.long_radius, t.short_radius);

	let u = p.y - s * big_r;
	let q = (u * u + p.z * p.z).sqrt();
	let g = q - (big_r - small_r);

	let value = g * g + p.x * p.x - small_r * small_r;
	let gradient = DVec3::new(2.0 * p.x, 2.0 * g * u / q, 2.0 * g * p.z / q);
	(value, gradient)
}

fn toroid(tor: &ToroidSurface, origin: DVec3, direction: DVec3) -> IntersectResult {
	// Start from the spherical approximation with the meridional radius,
	// falling back to the tangent plane for near-degenerate rays.
	let radius = match tor.kind {
		ToroidKind::Concave => tor.long_radius,
		ToroidKind::Convex => -tor.long_radius,
	};
	let sphere = QuadricSurface {
		icurv: 1,
		a11: 1.0,
		a12: 0.0,
		a13: 0.0,
		a14: 0.0,
		a22: 1.0,
		a23: 0.0,
		a24: -radius,
		a33: 1.0,
		a34: 0.0,
		a44: 0.0,
	};

	// A start on a far branch of the sphere would lead the iteration
	// away from the mirror patch; fall back to the tangent plane then.
	let mut t = match quadric(&sphere, origin, direction) {
		IntersectResult::Hit(hit) if hit.point.y.abs() <= tor.short_radius => hit.t,
		_ => match intersect(&Surface::PlaneXz, origin, direction) {
			IntersectResult::Hit(hit) => hit.t,
			_ => return IntersectResult::Miss,
		},
	};

	for _ in 0..TOROID_MAX_ITERATIONS {
		let p = origin + direction * t;
		let (value, gradient) = toroid_value(tor, p);
		let slope = gradient.dot(direction);
		if slope.abs() < f64::MIN_POSITIVE {
			return IntersectResult::BeyondHorizon;
		}

		let step = value / slope;
		t -= step;

		if step.abs() < TOROID_TOLERANCE {
			if t <= EPSILON || !t.is_finite() {
				return IntersectResult::Miss;
			}
			let point = origin + direction * t;
			// Only the mirror patch around the tangent point counts; the
			// far branches of the torus are not part of the element.
			if point.y.abs() > tor.short_radius {
				return IntersectResult::Miss;
			}
			let (_, gradient) = toroid_value(tor, point);
			return IntersectResult::Hit(Intersection {
				t,
				point,
				normal: gradient.normalize().into_inner(),
			});
		}
	}

	IntersectResult::BeyondHorizon
}

fn cubic_value(c: &CubicSurface, p: DVec3) -> f64 {
	c.quadric.eval(p.x, p.y, p.z)
		+ c.b12 * p.x * p.x * p.y
		+ c.b21 * p.y * p.y * p.x
		+ c.b23 * p.y * p.y * p.z
		+ c.b32 * p.z * p.z * p.y
}

fn cubic_gradient(c: &CubicSurface, p: DVec3) -> DVec3 {
	quadric_gradient(&c.quadric, p)
		+ DVec3::new(
			2.0 * c.b12 * p.x * p.y + c.b21 * p.y * p.y,
			c.b12 * p.x * p.x + 2.0 * c.b21 * p.x * p.y + 2.0 * c.b23 * p.y * p.z + c.b32 * p.z * p.z,
			c.b23 * p.y * p.y + 2.0 * c.b32 * p.y * p.z,
		)
}

/// Real roots of `c3 t³ + c2 t² + c1 t + c0`, appended to `roots`.
fn solve_cubic(c3: f64, c2: f64, c1: f64, c0: f64, roots: &mut Vec<f64>) {
	if c3.abs() < 1e-20 {
		// Quadratic fallback.
		if c2.abs() < 1e-20 {
			if c1.abs() > 0.0 {
				roots.push(-c0 / c1);
			}
			return;
		}
		let disc = c1 * c1 - 4.0 * c2 * c0;
		if disc >= 0.0 {
			let sq = disc.sqrt();
			roots.push((-c1 - sq) / (2.0 * c2));
			roots.push((-c1 + sq) / (2.0 * c2));
		}
		return;
	}

	// Depressed cubic t = s - c2/(3 c3).
	let a = c2 / c3;
	let b = c1 / c3;
	let c = c0 / c3;
	let p = b - a * a / 3.0;
	let q = 2.0 * a * a * a / 27.0 - a * b / 3.0 + c;
	let shift = -a / 3.0;

	let disc = q * q / 4.0 + p * p * p / 27.0;
	if disc > 0.0 {
		let sq = disc.sqrt();
		let u = (-q / 2.0 + sq).cbrt();
		let v = (-q / 2.0 - sq).cbrt();
		roots.push(u + v + shift);
	} else {
		// Three real roots, trigonometric form.
		let m = (-p / 3.0).sqrt();
		let theta = (3.0 * q / (2.0 * p * m)).clamp(-1.0, 1.0).acos() / 3.0;
		for k in 0..3 {
			roots.push(2.0 * m * (theta - 2.0 * std::f64::consts::PI * k as f64 / 3.0).cos() + shift);
		}
	}
}

fn cubic(c: &CubicSurface, origin: DVec3, direction: DVec3) -> IntersectResult {
	// psi tilts the surface frame about the x axis.
	let (sin_psi, cos_psi) = c.psi.0.sin_cos();
	let rotate = |p: DVec3| DVec3::new(p.x, cos_psi * p.y + sin_psi * p.z, -sin_psi * p.y + cos_psi * p.z);
	let rotate_back = |p: DVec3| DVec3::new(p.x, cos_psi * p.y - sin_psi * p.z, sin_psi * p.y + cos_psi * p.z);

	let o = rotate(origin);
	let d = rotate(direction);

	// F along the ray is cubic in t; four samples pin its coefficients
	// exactly.
	let f = |t: f64| cubic_value(c, o + d * t);
	let (f0, f1, f2, f3) = (f(0.0), f(1.0), f(2.0), f(3.0));
	let c3 = (f3 - 3.0 * f2 + 3.0 * f1 - f0) / 6.0;
	let c2 = (f2 - 2.0 * f1 + f0) / 2.0 - 3.0 * c3;
	let c1 = f1 - f0 - c2 - c3;

	let mut roots = Vec::new();
	solve_cubic(c3, c2, c1, f0, &mut roots);

	let t = roots
		.into_iter()
		.filter(|t| *t > EPSILON && t.is_finite())
		.fold(f64::INFINITY, f64::min);
	if !t.is_finite() {
		return IntersectResult::Miss;
	}

	let p = o + d * t;
	IntersectResult::Hit(Intersection {
		t,
		point: origin + direction * t,
		normal: rotate_back(cubic_gradient(c, p)).normalize().into_inner(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::element::surface::make_sphere;

	fn hit(result: IntersectResult) -> Intersection {
		match result {
			IntersectResult::Hit(hit) => hit,
			other => panic!("expected hit, got {other:?}"),
		}
	}

	#[test]
	fn plane_hit_from_above() {
		let h = hit(intersect(
			&Surface::PlaneXz,
			DVec3::new(0.0, 10.0, 0.0),
			DVec3::new(0.0, -1.0, 0.0),
		));

		assert!((h.t - 10.0).abs() < 1e-12);
		assert!(h.point.y.abs() < 1e-12);
	}

	#[test]
	fn plane_behind_is_missed() {
		let result = intersect(
			&Surface::PlaneXz,
			DVec3::new(0.0, 10.0, 0.0),
			DVec3::new(0.0, 1.0, 0.0),
		);

		assert_eq!(result, IntersectResult::Miss);
	}

	#[test]
	fn sphere_first_surface() {
		// Sphere of radius 100 tangent to the origin, center at y=100.
		let surface = make_sphere(100.0);
		let h = hit(intersect(&surface, DVec3::new(0.0, 10.0, 0.0), DVec3::new(0.0, -1.0, 0.0)));

		assert!((h.t - 10.0).abs() < 1e-9, "t = {}", h.t);
		// Normal at the apex points down towards the center's opposite.
		assert!((h.normal.y.abs() - 1.0).abs() < 1e-9);
	}

	#[test]
	fn toroid_apex_matches_plane() {
		let surface = Surface::Toroid(ToroidSurface {
			long_radius: 1000.0,
			short_radius: 100.0,
			kind: ToroidKind::Concave,
		});
		let h = hit(intersect(&surface, DVec3::new(0.0, 5.0, 0.0), DVec3::new(0.0, -1.0, 0.0)));

		assert!((h.t - 5.0).abs() < 1e-8, "t = {}", h.t);
		assert!((h.normal.y.abs() - 1.0).abs() < 1e-9);
	}

	#[test]
	fn toroid_sags_off_axis() {
		let surface = Surface::Toroid(ToroidSurface {
			long_radius: 1000.0,
			short_radius: 100.0,
			kind: ToroidKind::Concave,
		});
		// 10 mm off-axis along z, the meridional circle sags by
		// R - sqrt(R² - z²) ≈ 0.05 mm.
		let h = hit(intersect(&surface, DVec3::new(0.0, 5.0, 10.0), DVec3::new(0.0, -1.0, 0.0)));

		let sag = 1000.0 - (1000.0_f64 * 1000.0 - 100.0).sqrt();
		assert!((h.point.y - sag).abs() < 1e-6, "sag = {}", h.point.y);
	}

	#[test]
	fn cubic_reduces_to_quadric() {
		let quadric = match make_sphere(100.0) {
			Surface::Quadric(q) => q,
			_ => unreachable!(),
		};
		let surface = Surface::Cubic(CubicSurface {
			quadric,
			b12: 0.0,
			b21: 0.0,
			b23: 0.0,
			b32: 0.0,
			psi: crate::math::Rad(0.0),
		});

		let h = hit(intersect(&surface, DVec3::new(0.0, 10.0, 0.0), DVec3::new(0.0, -1.0, 0.0)));
		assert!((h.t - 10.0).abs() < 1e-9, "t = {}", h.t);
	}
}
