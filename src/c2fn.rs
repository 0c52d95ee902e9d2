use std::ops::Add;

pub trait C2Fn<T> {
    type Output;

    fn value(&self, x: T) -> Self::Output;
    fn value_d(&self, x: T) -> Self::Output;
    fn value_dd(&self, x: T) -> Self::Output;

    fn plus<F: C2Fn<T>>(self, other: F) -> Plus<Self, F>
    where
        Self: Sized,
    {
        Plus {
            f1: self,
            f2: other,
        }
    }
}

pub struct Plus<F1, F2> {
    pub f1: F1,
    pub f2: F2,
}

impl<T, F1, F2> C2Fn<T> for Plus<F1, F2>
where
    T: Copy,
    F1: C2Fn<T>,
    F2: C2Fn<T, Output = F1::Output>,
    F1::Output: Add<F1::Output, Output = F1::Output>,
{
    type Output = F1::Output;

    fn value(&self, x: T) -> Self::Output {
        self.f1.value(x) + self.f2.value(x)
    }

    fn value_d(&self, x: T) -> Self::Output {
        self.f1.value_d(x) + self.f2.value_d(x)
    }

    fn value_dd(&self, x: T) -> Self::Output {
        self.f1.value_dd(x) + self.f2.value_dd(x)
    }
}
