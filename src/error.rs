use thiserror::Error;

#[derive(Debug, Error)]
pub enum GcftError {
    #[error(
        "integration exceeded {max_steps} steps at t = {t:.6e} before reaching t = {t_end:.6e}"
    )]
    IntegrationFailure { t: f64, t_end: f64, max_steps: usize },

    #[error("background table: {0}")]
    BadTable(String),

    #[error("solver input: {0}")]
    BadInput(String),
}

pub type Result<T> = std::result::Result<T, GcftError>;
