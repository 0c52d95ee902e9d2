use std::f64::consts::PI;

use bincode::{
    Decode, Encode,
    config::{Configuration, standard},
};
use libm::sqrt;

use crate::{
    c2fn::C2Fn,
    error::{GcftError, Result},
    ode::{OdeOptions, OdeSystem, rk45_at},
    util::{gradient, interp_clamped},
};

pub const BINCODE_CONFIG: Configuration = standard();

/// Homogeneous GCFT background model over the state [Ξ, Ξ', a]:
/// H from the Friedmann constraint, Ξ'' = -3HΞ' - V'(Ξ), a' = aH.
pub struct GcftBackgroundInput<F> {
    pub potential: F,
    pub rho_m0: f64,
}

impl<F> GcftBackgroundInput<F>
where
    F: C2Fn<f64, Output = f64>,
{
    pub fn hubble(&self, xi: f64, v_xi: f64, a: f64) -> f64 {
        let rho_m = self.rho_m0 / (a * a * a);
        sqrt(8.0 * PI / 3.0 * (rho_m + 0.5 * v_xi * v_xi + self.potential.value(xi)))
    }
}

impl<F> OdeSystem for GcftBackgroundInput<F>
where
    F: C2Fn<f64, Output = f64>,
{
    fn ndim(&self) -> usize {
        3
    }

    fn rhs(&self, _t: f64, y: &[f64], dydt: &mut [f64]) {
        let (xi, v_xi, a) = (y[0], y[1], y[2]);
        let h = self.hubble(xi, v_xi, a);
        dydt[0] = v_xi;
        dydt[1] = -3.0 * h * v_xi - self.potential.value_d(xi);
        dydt[2] = a * h;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundField {
    ScaleFactor,
    Hubble,
    Xi,
    XiDot,
    Vp,
    Vpp,
    RhoM,
}

/// Background quantities interpolated at one query time.
#[derive(Debug, Clone, Copy)]
pub struct BackgroundSample {
    pub a: f64,
    pub h: f64,
    pub xi: f64,
    pub v_xi: f64,
    pub vp: f64,
    pub vpp: f64,
    pub rho_m: f64,
}

/// Immutable tabulated background history. All series share the time grid;
/// derived quantities (H, Vp, Vpp, ρ_m) are precomputed on that grid once.
#[derive(Debug, Clone, Encode, Decode)]
pub struct BackgroundTable {
    pub t: Vec<f64>,
    pub a: Vec<f64>,
    pub xi: Vec<f64>,
    pub v_xi: Vec<f64>,
    pub h: Vec<f64>,
    pub vp: Vec<f64>,
    pub vpp: Vec<f64>,
    pub rho_m: Vec<f64>,
}

impl BackgroundTable {
    /// Build the table from raw background series, deriving H = d(ln a)/dt,
    /// the potential derivatives on the Ξ grid, and ρ_m = ρ_m0 / a³.
    pub fn from_series<F>(
        t: Vec<f64>,
        xi: Vec<f64>,
        v_xi: Vec<f64>,
        a: Vec<f64>,
        potential: &F,
        rho_m0: f64,
    ) -> Result<Self>
    where
        F: C2Fn<f64, Output = f64>,
    {
        if t.len() != xi.len() || t.len() != v_xi.len() || t.len() != a.len() {
            return Err(GcftError::BadTable(format!(
                "series lengths differ: t = {}, xi = {}, v_xi = {}, a = {}",
                t.len(),
                xi.len(),
                v_xi.len(),
                a.len()
            )));
        }
        if t.len() < 2 {
            return Err(GcftError::BadTable(
                "need at least two samples to interpolate".into(),
            ));
        }
        if t.windows(2).any(|w| w[1] <= w[0]) {
            return Err(GcftError::BadTable("time grid not strictly increasing".into()));
        }
        if a.iter().any(|&ai| !(ai > 0.0)) {
            return Err(GcftError::BadTable(
                "scale factor must stay positive over the span".into(),
            ));
        }
        let ln_a: Vec<f64> = a.iter().map(|ai| ai.ln()).collect();
        let h = gradient(&t, &ln_a);
        let vp: Vec<f64> = xi.iter().map(|&x| potential.value_d(x)).collect();
        let vpp: Vec<f64> = xi.iter().map(|&x| potential.value_dd(x)).collect();
        let rho_m: Vec<f64> = a.iter().map(|&ai| rho_m0 / (ai * ai * ai)).collect();
        Ok(Self {
            t,
            a,
            xi,
            v_xi,
            h,
            vp,
            vpp,
            rho_m,
        })
    }

    /// Solve the background model at the evaluation grid and tabulate.
    pub fn from_solve<F>(
        input: &GcftBackgroundInput<F>,
        y0: [f64; 3],
        t_eval: &[f64],
        opts: &OdeOptions,
    ) -> Result<Self>
    where
        F: C2Fn<f64, Output = f64>,
    {
        let sol = rk45_at(input, &y0, t_eval, opts)?;
        let xi = sol.y.iter().map(|y| y[0]).collect();
        let v_xi = sol.y.iter().map(|y| y[1]).collect();
        let a = sol.y.iter().map(|y| y[2]).collect();
        Self::from_series(sol.t, xi, v_xi, a, &input.potential, input.rho_m0)
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    pub fn t_min(&self) -> f64 {
        self.t[0]
    }

    pub fn t_max(&self) -> f64 {
        *self.t.last().unwrap()
    }

    fn series(&self, field: BackgroundField) -> &[f64] {
        match field {
            BackgroundField::ScaleFactor => &self.a,
            BackgroundField::Hubble => &self.h,
            BackgroundField::Xi => &self.xi,
            BackgroundField::XiDot => &self.v_xi,
            BackgroundField::Vp => &self.vp,
            BackgroundField::Vpp => &self.vpp,
            BackgroundField::RhoM => &self.rho_m,
        }
    }

    /// Piecewise-linear interpolation at `t`; queries outside the tabulated
    /// span clamp silently to the boundary value.
    pub fn value_at(&self, field: BackgroundField, t: f64) -> f64 {
        interp_clamped(&self.t, self.series(field), t)
    }

    /// All seven quantities at `t`, for the perturbation RHS.
    pub fn sample(&self, t: f64) -> BackgroundSample {
        BackgroundSample {
            a: interp_clamped(&self.t, &self.a, t),
            h: interp_clamped(&self.t, &self.h, t),
            xi: interp_clamped(&self.t, &self.xi, t),
            v_xi: interp_clamped(&self.t, &self.v_xi, t),
            vp: interp_clamped(&self.t, &self.vp, t),
            vpp: interp_clamped(&self.t, &self.vpp, t),
            rho_m: interp_clamped(&self.t, &self.rho_m, t),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;

    use super::{BackgroundField, BackgroundTable, GcftBackgroundInput};
    use crate::{
        error::GcftError,
        models::{QuarticPotential, ZeroFn},
        ode::OdeOptions,
    };

    const FIELDS: [BackgroundField; 7] = [
        BackgroundField::ScaleFactor,
        BackgroundField::Hubble,
        BackgroundField::Xi,
        BackgroundField::XiDot,
        BackgroundField::Vp,
        BackgroundField::Vpp,
        BackgroundField::RhoM,
    ];

    fn de_sitter_table() -> BackgroundTable {
        // a = e^{0.5 t}, Ξ frozen off the potential minimum
        let t: Vec<f64> = (0..100).map(|i| 0.05 * i as f64).collect();
        let a: Vec<f64> = t.iter().map(|ti| (0.5 * ti).exp()).collect();
        let xi = vec![1.2; t.len()];
        let v_xi = vec![0.0; t.len()];
        BackgroundTable::from_series(t, xi, v_xi, a, &QuarticPotential::new(0.8, 0.2), 0.3)
            .unwrap()
    }

    #[test]
    fn derived_series_match_model() {
        let table = de_sitter_table();
        for i in 0..table.len() {
            assert_approx_eq!(table.h[i], 0.5, 1e-9);
            assert_approx_eq!(table.rho_m[i], 0.3 / table.a[i].powi(3), 1e-12);
            assert_approx_eq!(table.vp[i], 0.8 * 1.0_f64.powi(3), 1e-12);
            assert_approx_eq!(table.vpp[i], 3.0 * 0.8, 1e-12);
        }
    }

    #[test]
    fn out_of_range_queries_clamp_for_every_field() {
        let table = de_sitter_table();
        for field in FIELDS {
            let lo = table.series(field)[0];
            let hi = *table.series(field).last().unwrap();
            assert_eq!(table.value_at(field, table.t_min() - 5.0), lo);
            assert_eq!(table.value_at(field, table.t_max() + 5.0), hi);
            assert_eq!(table.value_at(field, table.t_min()), lo);
            assert_eq!(table.value_at(field, table.t_max()), hi);
        }
    }

    #[test]
    fn invariants_are_enforced() {
        let v = QuarticPotential::new(1.0, 0.0);
        let bad_len = BackgroundTable::from_series(
            vec![0.0, 1.0],
            vec![0.0],
            vec![0.0, 0.0],
            vec![1.0, 2.0],
            &v,
            1.0,
        );
        assert!(matches!(bad_len, Err(GcftError::BadTable(_))));

        let bad_order = BackgroundTable::from_series(
            vec![0.0, 2.0, 1.0],
            vec![0.0; 3],
            vec![0.0; 3],
            vec![1.0; 3],
            &v,
            1.0,
        );
        assert!(matches!(bad_order, Err(GcftError::BadTable(_))));

        let bad_a = BackgroundTable::from_series(
            vec![0.0, 1.0, 2.0],
            vec![0.0; 3],
            vec![0.0; 3],
            vec![1.0, 0.0, 1.0],
            &v,
            1.0,
        );
        assert!(matches!(bad_a, Err(GcftError::BadTable(_))));
    }

    #[test]
    fn background_solve_expands() {
        let input = GcftBackgroundInput {
            potential: ZeroFn::default(),
            rho_m0: 0.3,
        };
        let t_eval: Vec<f64> = (0..200).map(|i| 0.01 * i as f64).collect();
        let table =
            BackgroundTable::from_solve(&input, [0.0, 0.0, 1.0], &t_eval, &OdeOptions::default())
                .unwrap();
        assert_eq!(table.len(), t_eval.len());
        assert!(table.a.windows(2).all(|w| w[1] > w[0]));
        assert!(table.h.iter().all(|&h| h > 0.0));
    }
}
