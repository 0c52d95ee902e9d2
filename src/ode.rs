use crate::error::{GcftError, Result};

/// Right-hand side of an ODE system dy/dt = f(t, y).
pub trait OdeSystem {
    fn ndim(&self) -> usize;
    fn rhs(&self, t: f64, y: &[f64], dydt: &mut [f64]);
}

#[derive(Debug, Clone)]
pub struct OdeOptions {
    pub rtol: f64,
    pub atol: f64,
    /// Initial step size; 0.0 selects one automatically from the span.
    pub h0: f64,
    pub h_min: f64,
    pub h_max: f64,
    pub max_steps: usize,
}

impl Default for OdeOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-3,
            atol: 1e-6,
            h0: 0.0,
            h_min: 1e-14,
            h_max: f64::INFINITY,
            max_steps: 100_000,
        }
    }
}

impl OdeOptions {
    fn validate(&self) -> Result<()> {
        if !self.rtol.is_finite() || self.rtol <= 0.0 {
            return Err(GcftError::BadInput("rtol must be finite and > 0".into()));
        }
        if !self.atol.is_finite() || self.atol <= 0.0 {
            return Err(GcftError::BadInput("atol must be finite and > 0".into()));
        }
        if self.max_steps == 0 {
            return Err(GcftError::BadInput("max_steps must be > 0".into()));
        }
        Ok(())
    }

    fn initial_step(&self, span: f64) -> f64 {
        if self.h0 > 0.0 {
            self.h0.min(span)
        } else {
            (span * 1e-3).max(self.h_min).min(self.h_max).min(span)
        }
    }
}

/// Solution recorded at every accepted step.
#[derive(Debug, Clone)]
pub struct Trajectory {
    pub t: Vec<f64>,
    pub y: Vec<Vec<f64>>,
}

// Dormand-Prince 4(5) tableau.
const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;

// 5th-order weights, used to advance the solution.
const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

// Difference against the embedded 4th-order weights.
const E1: f64 = B1 - 5179.0 / 57600.0;
const E3: f64 = B3 - 7571.0 / 16695.0;
const E4: f64 = B4 - 393.0 / 640.0;
const E5: f64 = B5 + 92097.0 / 339200.0;
const E6: f64 = B6 - 187.0 / 2100.0;
const E7: f64 = -1.0 / 40.0;

/// Integrate dy/dt = f(t, y) over [t0, t1] with the adaptive
/// Dormand-Prince 4(5) pair.
pub fn rk45<S: OdeSystem>(
    sys: &S,
    y0: &[f64],
    t0: f64,
    t1: f64,
    opts: &OdeOptions,
) -> Result<Trajectory> {
    opts.validate()?;
    let n = sys.ndim();
    if y0.len() != n {
        return Err(GcftError::BadInput(format!(
            "rk45: y0.len() = {} but system dimension is {}",
            y0.len(),
            n
        )));
    }
    if !t0.is_finite() || !t1.is_finite() {
        return Err(GcftError::BadInput("rk45: t0/t1 must be finite".into()));
    }
    if t1 < t0 {
        return Err(GcftError::BadInput("rk45: requires t1 >= t0".into()));
    }

    let mut sol = Trajectory {
        t: vec![t0],
        y: vec![y0.to_vec()],
    };
    let span = t1 - t0;
    if span == 0.0 {
        return Ok(sol);
    }

    let mut t = t0;
    let mut y = y0.to_vec();
    let mut h = opts.initial_step(span);

    let mut k1 = vec![0.0; n];
    let mut k2 = vec![0.0; n];
    let mut k3 = vec![0.0; n];
    let mut k4 = vec![0.0; n];
    let mut k5 = vec![0.0; n];
    let mut k6 = vec![0.0; n];
    let mut k7 = vec![0.0; n];
    let mut y_tmp = vec![0.0; n];
    let mut y_new = vec![0.0; n];

    sys.rhs(t, &y, &mut k1);

    for _ in 0..opts.max_steps {
        if t >= t1 {
            break;
        }
        h = h.min(t1 - t).max(opts.h_min).min(opts.h_max);

        for i in 0..n {
            y_tmp[i] = y[i] + h * A21 * k1[i];
        }
        sys.rhs(t + h / 5.0, &y_tmp, &mut k2);

        for i in 0..n {
            y_tmp[i] = y[i] + h * (A31 * k1[i] + A32 * k2[i]);
        }
        sys.rhs(t + 3.0 * h / 10.0, &y_tmp, &mut k3);

        for i in 0..n {
            y_tmp[i] = y[i] + h * (A41 * k1[i] + A42 * k2[i] + A43 * k3[i]);
        }
        sys.rhs(t + 4.0 * h / 5.0, &y_tmp, &mut k4);

        for i in 0..n {
            y_tmp[i] = y[i] + h * (A51 * k1[i] + A52 * k2[i] + A53 * k3[i] + A54 * k4[i]);
        }
        sys.rhs(t + 8.0 * h / 9.0, &y_tmp, &mut k5);

        for i in 0..n {
            y_tmp[i] =
                y[i] + h * (A61 * k1[i] + A62 * k2[i] + A63 * k3[i] + A64 * k4[i] + A65 * k5[i]);
        }
        sys.rhs(t + h, &y_tmp, &mut k6);

        for i in 0..n {
            y_new[i] =
                y[i] + h * (B1 * k1[i] + B3 * k3[i] + B4 * k4[i] + B5 * k5[i] + B6 * k6[i]);
        }
        // FSAL stage
        sys.rhs(t + h, &y_new, &mut k7);

        let mut err_norm = 0.0;
        for i in 0..n {
            let ei =
                h * (E1 * k1[i] + E3 * k3[i] + E4 * k4[i] + E5 * k5[i] + E6 * k6[i] + E7 * k7[i]);
            let sc = opts.atol + opts.rtol * y[i].abs().max(y_new[i].abs());
            err_norm += (ei / sc) * (ei / sc);
        }
        err_norm = (err_norm / n as f64).sqrt();

        if err_norm <= 1.0 {
            t += h;
            y.copy_from_slice(&y_new);
            k1.copy_from_slice(&k7);
            sol.t.push(t);
            sol.y.push(y.clone());
            if t >= t1 {
                break;
            }
        }

        let factor = if err_norm == 0.0 {
            5.0
        } else if err_norm.is_finite() {
            (0.9 * err_norm.powf(-0.2)).clamp(0.2, 5.0)
        } else {
            // divergence: shrink hard and let the step limit decide
            0.2
        };
        h = (h * factor).max(opts.h_min).min(opts.h_max);
    }

    if t < t1 - opts.h_min {
        return Err(GcftError::IntegrationFailure {
            t,
            t_end: t1,
            max_steps: opts.max_steps,
        });
    }

    Ok(sol)
}

/// Integrate over the span of `times` and resample the accepted-step
/// trajectory onto exactly those points. The first sample is the initial
/// state itself.
pub fn rk45_at<S: OdeSystem>(
    sys: &S,
    y0: &[f64],
    times: &[f64],
    opts: &OdeOptions,
) -> Result<Trajectory> {
    if times.is_empty() {
        return Err(GcftError::BadInput("rk45_at: empty sample grid".into()));
    }
    let t0 = times[0];
    let t1 = *times.last().unwrap();
    let full = rk45(sys, y0, t0, t1, opts)?;

    let n = full.y[0].len();
    let mut out = Trajectory {
        t: Vec::with_capacity(times.len()),
        y: Vec::with_capacity(times.len()),
    };
    let mut idx = 0;
    for &tq in times {
        while idx + 1 < full.t.len() && full.t[idx + 1] < tq {
            idx += 1;
        }
        out.t.push(tq);
        if tq <= full.t[idx] || idx + 1 >= full.t.len() {
            out.y.push(full.y[idx].clone());
            continue;
        }
        let (ta, tb) = (full.t[idx], full.t[idx + 1]);
        let l = (tq - ta) / (tb - ta);
        let mut yq = vec![0.0; n];
        for i in 0..n {
            yq[i] = full.y[idx][i] + l * (full.y[idx + 1][i] - full.y[idx][i]);
        }
        out.y.push(yq);
    }
    Ok(out)
}
