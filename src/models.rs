use std::marker::PhantomData;

use num_traits::Zero;

use crate::c2fn::C2Fn;

pub struct ZeroFn<T>(PhantomData<T>);

impl<T> Default for ZeroFn<T> {
    fn default() -> Self {
        Self(Default::default())
    }
}

impl<T> C2Fn<T> for ZeroFn<T>
where
    T: Zero,
{
    type Output = T;
    fn value(&self, _xi: T) -> T {
        T::zero()
    }

    fn value_d(&self, _xi: T) -> T {
        T::zero()
    }

    fn value_dd(&self, _xi: T) -> T {
        T::zero()
    }
}

/// V(Ξ) = λ/4 (Ξ - Ξ0)^4, so V' = λ (Ξ - Ξ0)^3 and V'' = 3 λ (Ξ - Ξ0)^2.
#[derive(Clone, Copy)]
pub struct QuarticPotential {
    pub lambda: f64,
    pub xi0: f64,
}

impl QuarticPotential {
    pub const fn new(lambda: f64, xi0: f64) -> Self {
        Self { lambda, xi0 }
    }
}

impl C2Fn<f64> for QuarticPotential {
    type Output = f64;
    fn value(&self, xi: f64) -> f64 {
        let d = xi - self.xi0;
        0.25 * self.lambda * d * d * d * d
    }

    fn value_d(&self, xi: f64) -> f64 {
        let d = xi - self.xi0;
        self.lambda * d * d * d
    }

    fn value_dd(&self, xi: f64) -> f64 {
        let d = xi - self.xi0;
        3.0 * self.lambda * d * d
    }
}
