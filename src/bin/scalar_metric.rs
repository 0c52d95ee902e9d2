use std::{
    fs::{File, create_dir_all},
    io::BufWriter,
};

use gcft::{
    background::{BINCODE_CONFIG, BackgroundTable, GcftBackgroundInput},
    models::QuarticPotential,
    ode::OdeOptions,
    pert::{self, PerturbationInput},
    util::lazy_file,
};
use ndarray::Array;
use ndarray_npy::NpzWriter;

struct ScalarMetricParams {
    lambda_: f64,
    xi0: f64,
    rho_m0: f64,
    xi_init: f64,
    v_xi_init: f64,
    a_init: f64,
    t_span: (f64, f64),
    samples: usize,
    pert: PerturbationInput,
}

impl ScalarMetricParams {
    fn t_eval(&self) -> Vec<f64> {
        let (t0, t1) = self.t_span;
        (0..self.samples)
            .map(|i| t0 + (t1 - t0) * i as f64 / (self.samples - 1) as f64)
            .collect()
    }

    pub fn run(&self, out_dir: &str) -> anyhow::Result<()> {
        create_dir_all(out_dir)?;
        let table = lazy_file(
            &format!("{out_dir}/background.bincode"),
            BINCODE_CONFIG,
            || {
                println!(
                    "[background] solving over t = {:?} at {} samples",
                    self.t_span, self.samples
                );
                let input = GcftBackgroundInput {
                    potential: QuarticPotential::new(self.lambda_, self.xi0),
                    rho_m0: self.rho_m0,
                };
                Ok(BackgroundTable::from_solve(
                    &input,
                    [self.xi_init, self.v_xi_init, self.a_init],
                    &self.t_eval(),
                    &OdeOptions::default(),
                )?)
            },
        )?;
        println!(
            "[background] {} samples, a = {:.3e} .. {:.3e} ({:.2} e-folds)",
            table.len(),
            table.a[0],
            table.a.last().unwrap(),
            (table.a.last().unwrap() / table.a[0]).ln()
        );

        let sol = pert::solve(&table, &self.pert, &OdeOptions::default())?;
        println!(
            "[pert] k = {}, final delta_m/delta_m0 = {:.6e}",
            self.pert.k_mode,
            sol.normalized_delta_m().last().unwrap()
        );

        create_dir_all(format!("{out_dir}/plots"))?;
        sol.plot_growth(&format!("{out_dir}/plots/gcft_scalar_metric_coupled.html"));

        let mut npz = NpzWriter::new_compressed(BufWriter::new(File::create(format!(
            "{out_dir}/gcft_scalar_metric_coupled.npz"
        ))?));
        npz.add_array("t", &Array::from_vec(sol.t.clone()))?;
        npz.add_array("a", &Array::from_vec(sol.a.clone()))?;
        npz.add_array("delta_m", &Array::from_vec(sol.delta_m.clone()))?;
        npz.add_array("delta_xi", &Array::from_vec(sol.delta_xi.clone()))?;
        npz.add_array("delta_m_norm", &Array::from_vec(sol.normalized_delta_m()))?;
        npz.add_array("delta_xi_norm", &Array::from_vec(sol.normalized_delta_xi()))?;
        npz.finish()?;
        Ok(())
    }
}

fn main() {
    let params = ScalarMetricParams {
        lambda_: 1.0,
        xi0: 0.0,
        rho_m0: 0.3,
        xi_init: 1.0,
        v_xi_init: 0.0,
        a_init: 1e-2,
        t_span: (0.0, 0.42),
        samples: 2000,
        pert: PerturbationInput::default(),
    };
    params.run("results").unwrap();
}
