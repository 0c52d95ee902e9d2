//! Linear cosmological perturbations in a scalar-field-coupled cosmology.
//!
//! The background (scale factor, scalar field Ξ and its velocity) is solved
//! once and tabulated; the coupled matter/scalar/metric perturbation system
//! for a single comoving mode k is then integrated against that table with
//! an adaptive Dormand-Prince scheme, sampled on the background grid.
//! The `pk` module holds the P(k) baseline and regression-verification
//! tooling used by the adjacent z-scan workflow.

pub mod background;
pub mod c2fn;
pub mod error;
pub mod models;
pub mod ode;
pub mod pert;
pub mod pk;
pub mod util;
