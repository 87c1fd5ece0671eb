use core::cmp::{PartialEq, PartialOrd};
use core::ops::{Add, Div, Mul, Neg, Rem, Sub};
use core::ops::{AddAssign, DivAssign, MulAssign, RemAssign, SubAssign};

/// Forward a method to an inherent method or a base trait method.
macro_rules! forward {
	($( Self :: $method:ident ( self $( , $arg:ident : $ty:ty )* ) -> $ret:ty ; )*) => {$(
		#[inline]
		fn $method(self $( , $arg : $ty )* ) -> $ret {
			Self::$method(self $( , $arg )* )
		}
	)*};
}

pub trait NumOps<Rhs = Self, Output = Self>:
	Add<Rhs, Output = Output> +
	Sub<Rhs, Output = Output> +
	Mul<Rhs, Output = Output> +
	Div<Rhs, Output = Output> +
	Rem<Rhs, Output = Output>
{}

impl<T, Rhs, Output> NumOps<Rhs, Output> for T where T:
	Add<Rhs, Output = Output> +
	Sub<Rhs, Output = Output> +
	Mul<Rhs, Output = Output> +
	Div<Rhs, Output = Output> +
	Rem<Rhs, Output = Output>
{}

pub trait NumAssignOps<Rhs = Self>:
	AddAssign<Rhs> +
	SubAssign<Rhs> +
	MulAssign<Rhs> +
	DivAssign<Rhs> +
	RemAssign<Rhs>
{}

impl<T, Rhs> NumAssignOps<Rhs> for T where T:
	AddAssign<Rhs> +
	SubAssign<Rhs> +
	MulAssign<Rhs> +
	DivAssign<Rhs> +
	RemAssign<Rhs>
{}

pub trait Base<T: Number>: Copy + NumOps<T, T> + NumAssignOps<T> where Self: Sized {
	const ZERO: Self;
	const ONE: Self;
	const TWO: Self;

	const MIN: Self;
	const MAX: Self;
}

/// The scalar family behind [`Matrix`](super::matrix::Matrix) and
/// [`Complex`](super::complex::Complex). The trace kernel is double
/// precision throughout, so f64 is the only instantiation.
pub trait Number: Base<Self> + Default + PartialEq + PartialOrd {}

pub trait NumberOps<T: Number> {
	fn min(a: Self, b: Self) -> Self;
	fn max(a: Self, b: Self) -> Self;
}

macro_rules! number_impl {
	($t:ident) => {
		impl Base<$t> for $t {
			const ZERO: Self = 0 as Self;
			const ONE: Self = 1 as Self;
			const TWO: Self = 2 as Self;

			const MIN: Self = $t::MIN;
			const MAX: Self = $t::MAX;
		}

		impl Number for $t {}

		impl NumberOps<$t> for $t {
			fn min(a: Self, b: Self) -> Self {
				a.min(b)
			}

			fn max(a: Self, b: Self) -> Self {
				a.max(b)
			}
		}
	}
}

number_impl!(f64);

pub trait SignedNumber: Number + Neg<Output = Self> {
	const MINUS_ONE: Self;
}

pub trait SignedNumberOps<T: SignedNumber>: Neg<Output = Self> {
	fn signum(self) -> Self;
	fn abs(self) -> Self;
}

macro_rules! signed_number_impl {
	($t:ident, $minus_one:literal) => {
		impl SignedNumber for $t {
			const MINUS_ONE: Self = $minus_one;
		}

		impl SignedNumberOps<$t> for $t {
			forward! {
				Self::signum(self) -> Self;
				Self::abs(self) -> Self;
			}
		}
	}
}

signed_number_impl!(f64, -1.0);

pub trait Float: SignedNumber {
	const SMALL_EPSILON: Self;
}

pub trait FloatOps<T: Float> where Self: Sized {
	fn acos(self) -> Self;
	fn asin(self) -> Self;
	fn atan(self) -> Self;
	fn atan2(self, x: Self) -> Self;
	fn copysign(self, sign: T) -> Self;
	fn cos(self) -> Self;
	fn exp(self) -> Self;
	fn floor(self) -> Self;
	fn is_finite(self) -> bool;
	fn is_nan(self) -> bool;
	fn ln(self) -> Self;
	fn powf(self, exp: T) -> Self;
	fn powi(self, exp: i32) -> Self;
	fn recip(self) -> Self;
	fn round(self) -> Self;
	fn sin(self) -> Self;
	fn sin_cos(self) -> (Self, Self);
	fn sqrt(self) -> Self;
	fn tan(self) -> Self;
}

macro_rules! float_impl {
	($t:ident) => {
		impl Float for $t {
			const SMALL_EPSILON: Self = 1e-30;
		}

		impl FloatOps<$t> for $t {
			forward! {
				Self::acos(self) -> Self;
				Self::asin(self) -> Self;
				Self::atan(self) -> Self;
				Self::atan2(self, x: Self) -> Self;
				Self::copysign(self, sign: $t) -> Self;
				Self::cos(self) -> Self;
				Self::exp(self) -> Self;
				Self::floor(self) -> Self;
				Self::is_finite(self) -> bool;
				Self::is_nan(self) -> bool;
				Self::ln(self) -> Self;
				Self::powf(self, exp: $t) -> Self;
				Self::powi(self, exp: i32) -> Self;
				Self::recip(self) -> Self;
				Self::round(self) -> Self;
				Self::sin(self) -> Self;
				Self::sin_cos(self) -> (Self, Self);
				Self::sqrt(self) -> Self;
				Self::tan(self) -> Self;
			}
		}
	}
}

float_impl!(f64);
