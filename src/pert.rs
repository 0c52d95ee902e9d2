use std::f64::consts::PI;

use plotly::{
    Layout, Plot, Scatter,
    common::ExponentFormat,
    layout::{Axis, AxisType},
};

use crate::{
    background::BackgroundTable,
    error::Result,
    ode::{OdeOptions, OdeSystem, rk45_at},
};

/// Regularizer in the quasi-static Φ closure; keeps the division defined as
/// k → 0 or a → ∞ at the price of a bounded systematic bias.
pub const K_REGULARIZER: f64 = 1e-12;

/// Mode wavenumber and initial perturbation amplitudes for one run.
#[derive(Debug, Clone, Copy)]
pub struct PerturbationInput {
    pub k_mode: f64,
    pub delta_m0: f64,
    pub delta_m_dot0: f64,
    pub delta_xi0: f64,
    pub delta_xi_dot0: f64,
    pub phi0: f64,
}

impl Default for PerturbationInput {
    fn default() -> Self {
        Self {
            k_mode: 0.1,
            delta_m0: 1e-5,
            delta_m_dot0: 0.0,
            delta_xi0: 1e-6,
            delta_xi_dot0: 0.0,
            phi0: 1e-6,
        }
    }
}

impl PerturbationInput {
    pub fn state0(&self) -> [f64; 5] {
        [
            self.delta_m0,
            self.delta_m_dot0,
            self.delta_xi0,
            self.delta_xi_dot0,
            self.phi0,
        ]
    }
}

/// Coupled matter + scalar + metric perturbation system for a single mode,
/// state [δm, δm', δΞ, δΞ', Φ].
///
/// Φ is closed quasi-statically: a fresh `phi_new` is solved algebraically
/// at every evaluation and used inline in the two force terms, while the
/// state's Φ channel itself carries derivative 0 and never moves off its
/// initial value.
pub struct ScalarMetricSystem<'a> {
    pub table: &'a BackgroundTable,
    pub k_mode: f64,
}

impl OdeSystem for ScalarMetricSystem<'_> {
    fn ndim(&self) -> usize {
        5
    }

    fn rhs(&self, t: f64, y: &[f64], dydt: &mut [f64]) {
        let (delta_m, delta_m_dot, delta_xi, delta_xi_dot, phi) =
            (y[0], y[1], y[2], y[3], y[4]);
        let bg = self.table.sample(t);
        let k2_a2 = self.k_mode * self.k_mode / (bg.a * bg.a);

        // Poisson-like constraint; Φ itself is static, not evolved
        let phi_dot = 0.0;
        let phi_rhs = 4.0
            * PI
            * (bg.rho_m * delta_m + bg.v_xi * delta_xi_dot - bg.v_xi * bg.v_xi * phi
                + bg.vp * delta_xi);
        let phi_new = phi_rhs / (k2_a2 + K_REGULARIZER);

        dydt[0] = delta_m_dot;
        dydt[1] = -2.0 * bg.h * delta_m_dot + 4.0 * PI * bg.rho_m * delta_m + k2_a2 * phi_new;
        dydt[2] = delta_xi_dot;
        // the 4 Ξ' Φ' term is identically zero under the static closure but
        // stays in place for when Φ gets a real equation of motion
        dydt[3] = -3.0 * bg.h * delta_xi_dot - (k2_a2 + bg.vpp) * delta_xi
            + 4.0 * bg.v_xi * phi_dot
            - 2.0 * bg.vp * phi_new;
        dydt[4] = 0.0;
    }
}

/// Perturbation trajectories sampled on the background time grid.
#[derive(Debug, Clone)]
pub struct PerturbationSolution {
    pub input: PerturbationInput,
    pub t: Vec<f64>,
    pub a: Vec<f64>,
    pub delta_m: Vec<f64>,
    pub delta_m_dot: Vec<f64>,
    pub delta_xi: Vec<f64>,
    pub delta_xi_dot: Vec<f64>,
    pub phi: Vec<f64>,
}

/// Integrate the perturbation system over the full background span, sampled
/// exactly at the table's time points.
pub fn solve(
    table: &BackgroundTable,
    input: &PerturbationInput,
    opts: &OdeOptions,
) -> Result<PerturbationSolution> {
    let sys = ScalarMetricSystem {
        table,
        k_mode: input.k_mode,
    };
    let sol = rk45_at(&sys, &input.state0(), &table.t, opts)?;
    Ok(PerturbationSolution {
        input: *input,
        t: sol.t,
        a: table.a.clone(),
        delta_m: sol.y.iter().map(|y| y[0]).collect(),
        delta_m_dot: sol.y.iter().map(|y| y[1]).collect(),
        delta_xi: sol.y.iter().map(|y| y[2]).collect(),
        delta_xi_dot: sol.y.iter().map(|y| y[3]).collect(),
        phi: sol.y.iter().map(|y| y[4]).collect(),
    })
}

impl PerturbationSolution {
    pub fn normalized_delta_m(&self) -> Vec<f64> {
        self.delta_m.iter().map(|d| d / self.input.delta_m0).collect()
    }

    pub fn normalized_delta_xi(&self) -> Vec<f64> {
        self.delta_xi
            .iter()
            .map(|d| d / self.input.delta_xi0)
            .collect()
    }

    /// Normalized growth of both channels against the scale factor,
    /// log-scaled x axis.
    pub fn plot_growth(&self, out_file: &str) {
        let mut plot = Plot::new();
        plot.add_trace(
            Scatter::new(self.a.clone(), self.normalized_delta_m()).name("delta_m / delta_m0"),
        );
        plot.add_trace(
            Scatter::new(self.a.clone(), self.normalized_delta_xi()).name("delta_Xi / delta_Xi0"),
        );
        plot.set_layout(
            Layout::new()
                .x_axis(
                    Axis::new()
                        .type_(AxisType::Log)
                        .exponent_format(ExponentFormat::Power),
                )
                .y_axis(Axis::new().exponent_format(ExponentFormat::Power))
                .height(600),
        );
        plot.write_html(out_file);
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use super::{PerturbationInput, ScalarMetricSystem, solve};
    use crate::{
        background::BackgroundTable,
        models::QuarticPotential,
        ode::{OdeOptions, OdeSystem},
    };

    /// Matter-dominated analytic background: a = t^{2/3}, H = 2/(3t),
    /// Ξ frozen at the potential minimum so Vp = Vpp = 0, and
    /// ρ_m0 = 1/(6π) making the Friedmann constraint exact.
    fn matter_table(t0: f64, t1: f64, n: usize) -> BackgroundTable {
        let t: Vec<f64> = (0..n)
            .map(|i| t0 + (t1 - t0) * i as f64 / (n - 1) as f64)
            .collect();
        let a: Vec<f64> = t.iter().map(|ti| ti.powf(2.0 / 3.0)).collect();
        let xi = vec![0.0; n];
        let v_xi = vec![0.0; n];
        BackgroundTable::from_series(
            t,
            xi,
            v_xi,
            a,
            &QuarticPotential::new(1.0, 0.0),
            1.0 / (6.0 * PI),
        )
        .unwrap()
    }

    /// Background with a rolling field, to exercise every coupling term.
    fn rolling_table() -> BackgroundTable {
        let n = 200;
        let t: Vec<f64> = (0..n).map(|i| 1.0 + 0.05 * i as f64).collect();
        let a: Vec<f64> = t.iter().map(|ti| ti.powf(2.0 / 3.0)).collect();
        let xi: Vec<f64> = t.iter().map(|ti| 1.0 + 0.1 * (0.3 * ti).sin()).collect();
        let v_xi: Vec<f64> = t.iter().map(|ti| 0.03 * (0.3 * ti).cos()).collect();
        BackgroundTable::from_series(t, xi, v_xi, a, &QuarticPotential::new(0.5, 0.2), 0.05)
            .unwrap()
    }

    #[test]
    fn rhs_is_deterministic() {
        let table = rolling_table();
        let sys = ScalarMetricSystem {
            table: &table,
            k_mode: 0.1,
        };
        let y = [1e-5, 3e-7, 1e-6, -2e-8, 1e-6];
        let mut d1 = [0.0; 5];
        let mut d2 = [0.0; 5];
        sys.rhs(2.71, &y, &mut d1);
        sys.rhs(2.71, &y, &mut d2);
        assert_eq!(d1, d2);
    }

    #[test]
    fn phi_channel_derivative_is_exactly_zero() {
        let table = rolling_table();
        let sys = ScalarMetricSystem {
            table: &table,
            k_mode: 0.1,
        };
        let mut dydt = [0.0; 5];
        for i in 0..50 {
            let t = 0.5 + 0.3 * i as f64; // includes out-of-span times
            let s = 1.0 + i as f64;
            let y = [1e-5 * s, -1e-6 * s, 1e-6 * s, 1e-7 * s, 1e-6 * s];
            sys.rhs(t, &y, &mut dydt);
            assert_eq!(dydt[4], 0.0);
        }
    }

    #[test]
    fn vanishing_k_mode_stays_finite() {
        let table = rolling_table();
        let y = [1e-5, 0.0, 1e-6, 0.0, 1e-6];
        let mut dydt = [0.0; 5];
        for k_mode in [0.0, 1e-8, 1e-4, 0.1] {
            let sys = ScalarMetricSystem {
                table: &table,
                k_mode,
            };
            sys.rhs(3.0, &y, &mut dydt);
            assert!(
                dydt.iter().all(|d| d.is_finite()),
                "k_mode = {k_mode}: {dydt:?}"
            );
        }
    }

    #[test]
    fn normalization_is_one_at_first_sample() {
        let table = matter_table(1.0, 10.0, 100);
        let input = PerturbationInput::default();
        let sol = solve(&table, &input, &OdeOptions::default()).unwrap();
        assert_eq!(sol.normalized_delta_m()[0], 1.0);
        assert_eq!(sol.normalized_delta_xi()[0], 1.0);
    }

    #[test]
    fn matter_mode_grows_monotonically() {
        let table = matter_table(1.0, 100.0, 400);
        let input = PerturbationInput::default();
        let sol = solve(&table, &input, &OdeOptions::default()).unwrap();
        let growth = sol.normalized_delta_m();
        assert!(
            sol.delta_m.iter().chain(&sol.delta_xi).all(|v| v.is_finite()),
            "NaN/Inf in trajectory"
        );
        for w in growth.windows(2) {
            assert!(w[1] >= w[0] - 1e-9, "non-monotone: {} -> {}", w[0], w[1]);
        }
        // several e-folds of matter-dominated expansion: material growth
        let last = *growth.last().unwrap();
        assert!(last > 10.0, "expected material growth, got {last}");
    }

    #[test]
    fn phi_state_channel_never_moves() {
        let table = matter_table(1.0, 50.0, 200);
        let input = PerturbationInput::default();
        let sol = solve(&table, &input, &OdeOptions::default()).unwrap();
        assert!(sol.phi.iter().all(|&p| p == input.phi0));
    }
}
