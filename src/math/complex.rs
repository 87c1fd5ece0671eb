use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use super::num::{Float, FloatOps};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Complex<T> {
	pub re: T,
	pub im: T,
}

pub type Cplx = Complex<f64>;

impl<T> Complex<T> {
	pub const fn new(re: T, im: T) -> Self {
		Self { re, im }
	}
}

impl<T: Float + FloatOps<T>> Complex<T> {
	pub fn from_real(re: T) -> Self {
		Self { re, im: T::ZERO }
	}

	pub fn conj(&self) -> Self {
		Self::new(self.re, -self.im)
	}

	/// Squared magnitude `re² + im²`.
	pub fn norm_sq(&self) -> T {
		self.re * self.re + self.im * self.im
	}

	pub fn norm(&self) -> T {
		self.norm_sq().sqrt()
	}

	pub fn sqrt(&self) -> Self {
		let r = self.norm();
		let re = ((r + self.re) / T::TWO).sqrt();
		let im = ((r - self.re) / T::TWO).sqrt().copysign(self.im);
		Self::new(re, im)
	}
}

impl<T: Float + FloatOps<T>> Add for Complex<T> {
	type Output = Self;

	fn add(self, rhs: Self) -> Self {
		Self::new(self.re + rhs.re, self.im + rhs.im)
	}
}

impl<T: Float + FloatOps<T>> Sub for Complex<T> {
	type Output = Self;

	fn sub(self, rhs: Self) -> Self {
		Self::new(self.re - rhs.re, self.im - rhs.im)
	}
}

impl<T: Float + FloatOps<T>> Mul for Complex<T> {
	type Output = Self;

	fn mul(self, rhs: Self) -> Self {
		Self::new(
			self.re * rhs.re - self.im * rhs.im,
			self.re * rhs.im + self.im * rhs.re,
		)
	}
}

impl<T: Float + FloatOps<T>> Div for Complex<T> {
	type Output = Self;

	fn div(self, rhs: Self) -> Self {
		let d = rhs.norm_sq();
		Self::new(
			(self.re * rhs.re + self.im * rhs.im) / d,
			(self.im * rhs.re - self.re * rhs.im) / d,
		)
	}
}

impl<T: Float + FloatOps<T>> Mul<T> for Complex<T> {
	type Output = Self;

	fn mul(self, rhs: T) -> Self {
		Self::new(self.re * rhs, self.im * rhs)
	}
}

impl<T: Float + FloatOps<T>> Div<T> for Complex<T> {
	type Output = Self;

	fn div(self, rhs: T) -> Self {
		Self::new(self.re / rhs, self.im / rhs)
	}
}

impl<T: Float + FloatOps<T>> Neg for Complex<T> {
	type Output = Self;

	fn neg(self) -> Self {
		Self::new(-self.re, -self.im)
	}
}

impl<T: Float + FloatOps<T>> AddAssign for Complex<T> {
	fn add_assign(&mut self, rhs: Self) {
		*self = *self + rhs;
	}
}

impl<T: Float + FloatOps<T>> SubAssign for Complex<T> {
	fn sub_assign(&mut self, rhs: Self) {
		*self = *self - rhs;
	}
}

impl<T: Float + FloatOps<T>> MulAssign for Complex<T> {
	fn mul_assign(&mut self, rhs: Self) {
		*self = *self * rhs;
	}
}

impl<T: Float + FloatOps<T>> DivAssign for Complex<T> {
	fn div_assign(&mut self, rhs: Self) {
		*self = *self / rhs;
	}
}

/// A complex 3-vector, used for the electric field carried by a ray.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Field3 {
	pub x: Cplx,
	pub y: Cplx,
	pub z: Cplx,
}

impl Field3 {
	pub const fn new(x: Cplx, y: Cplx, z: Cplx) -> Self {
		Self { x, y, z }
	}

	pub fn intensity(&self) -> f64 {
		self.x.norm_sq() + self.y.norm_sq() + self.z.norm_sq()
	}

	pub fn scale(&self, s: f64) -> Self {
		Self::new(self.x * s, self.y * s, self.z * s)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn division_round_trips() {
		let a = Cplx::new(3.0, -2.0);
		let b = Cplx::new(-1.5, 0.25);
		let c = a * b / b;

		assert!((c.re - a.re).abs() < 1e-12);
		assert!((c.im - a.im).abs() < 1e-12);
	}

	#[test]
	fn sqrt_of_negative_real() {
		let s = Cplx::from_real(-4.0).sqrt();

		assert!(s.re.abs() < 1e-12);
		assert!((s.im.abs() - 2.0).abs() < 1e-12);
	}
}
