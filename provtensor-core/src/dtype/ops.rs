/// Native elementwise arithmetic of one element representation.
///
/// Integers wrap on overflow, floats follow IEEE-754. For `bool`, addition is
/// logical or and multiplication is logical and.
pub trait DTypeOps: Copy {
    fn add_elem(self, rhs: Self) -> Self;
    fn mul_elem(self, rhs: Self) -> Self;
}

macro_rules! integral_ops {
    ($t:ty) => {
        impl DTypeOps for $t {
            fn add_elem(self, rhs: Self) -> Self {
                self.wrapping_add(rhs)
            }
            fn mul_elem(self, rhs: Self) -> Self {
                self.wrapping_mul(rhs)
            }
        }
    };
}

macro_rules! float_ops {
    ($t:ty) => {
        impl DTypeOps for $t {
            fn add_elem(self, rhs: Self) -> Self {
                self + rhs
            }
            fn mul_elem(self, rhs: Self) -> Self {
                self * rhs
            }
        }
    };
}

integral_ops!(i8);
integral_ops!(i16);
integral_ops!(i32);
integral_ops!(i64);
integral_ops!(u8);
float_ops!(f32);
float_ops!(f64);

impl DTypeOps for bool {
    fn add_elem(self, rhs: Self) -> Self {
        self | rhs
    }
    fn mul_elem(self, rhs: Self) -> Self {
        self & rhs
    }
}
