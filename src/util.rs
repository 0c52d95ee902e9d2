use std::{fs, path::Path};

use bincode::{Decode, Encode, config::Configuration};

pub fn linear_interp(a: f64, b: f64, l: f64) -> f64 {
    a * (1.0 - l) + b * l
}

/// Piecewise-linear interpolation of `ys` against strictly increasing `xs`.
/// Queries outside the span clamp to the boundary value, never an error.
pub fn interp_clamped(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    debug_assert_eq!(xs.len(), ys.len());
    let n = xs.len();
    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[n - 1] {
        return ys[n - 1];
    }
    let i = xs.partition_point(|&v| v <= x);
    let l = (x - xs[i - 1]) / (xs[i] - xs[i - 1]);
    linear_interp(ys[i - 1], ys[i], l)
}

/// Derivative of a sampled function on a (possibly nonuniform) grid:
/// second-order central differences in the interior, one-sided at the ends.
pub fn gradient(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    debug_assert_eq!(xs.len(), ys.len());
    let n = xs.len();
    debug_assert!(n >= 2);
    let mut out = vec![0.0; n];
    out[0] = (ys[1] - ys[0]) / (xs[1] - xs[0]);
    out[n - 1] = (ys[n - 1] - ys[n - 2]) / (xs[n - 1] - xs[n - 2]);
    for i in 1..n - 1 {
        let h1 = xs[i] - xs[i - 1];
        let h2 = xs[i + 1] - xs[i];
        out[i] =
            (h1 * h1 * ys[i + 1] + (h2 * h2 - h1 * h1) * ys[i] - h2 * h2 * ys[i - 1])
                / (h1 * h2 * (h1 + h2));
    }
    out
}

/// Load `path` if it exists, otherwise compute, store, and return the value.
pub fn lazy_file<T, F>(path: &str, config: Configuration, compute: F) -> anyhow::Result<T>
where
    T: Encode + Decode<()>,
    F: FnOnce() -> anyhow::Result<T>,
{
    let p = Path::new(path);
    if p.exists() {
        let bytes = fs::read(p)?;
        let (value, _) = bincode::decode_from_slice(&bytes, config)?;
        Ok(value)
    } else {
        let value = compute()?;
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(p, bincode::encode_to_vec(&value, config)?)?;
        Ok(value)
    }
}
