//! Sample-weighted ridge regression with an unpenalized intercept.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use super::{CancelFlag, ExplainError};

#[derive(Debug, Clone)]
pub(crate) struct RidgeFit {
    pub intercept: f64,
    pub coef: Array1<f64>,
}

impl RidgeFit {
    pub fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.dot(&self.coef) + self.intercept
    }

    /// Weighted coefficient of determination.
    pub fn score(&self, x: ArrayView2<f64>, y: ArrayView1<f64>, w: ArrayView1<f64>) -> f64 {
        let predicted = self.predict(x);
        let y_mean = weighted_mean(y, w);
        let residual: f64 = y.iter().zip(predicted.iter()).zip(w.iter())
            .map(|((&t, &p), &wi)| wi * (t - p).powi(2))
            .sum();
        let total: f64 = y.iter().zip(w.iter())
            .map(|(&t, &wi)| wi * (t - y_mean).powi(2))
            .sum();
        if total == 0.0 {
            return if residual == 0.0 { 1.0 } else { 0.0 };
        }
        1.0 - residual / total
    }
}

fn weighted_mean(values: ArrayView1<f64>, w: ArrayView1<f64>) -> f64 {
    let total = w.sum();
    if total <= 0.0 {
        return values.mean().unwrap_or(0.0);
    }
    values.dot(&w) / total
}

/// Minimizes `sum_i w_i (y_i - b - x_i . beta)^2 + alpha |beta|^2`.
///
/// The flag is polled between the solver's steps.
pub(crate) fn fit(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    w: ArrayView1<f64>,
    alpha: f64,
    cancel: &CancelFlag,
) -> Result<RidgeFit, ExplainError> {
    let n_features = x.ncols();
    let total = w.sum();
    let w = if total > 0.0 {
        w.to_owned()
    } else {
        Array1::ones(w.len())
    };
    let total = w.sum();

    let x_mean = w.dot(&x) / total;
    let y_mean = y.dot(&w) / total;
    if n_features == 0 {
        return Ok(RidgeFit { intercept: y_mean, coef: Array1::zeros(0) });
    }
    check(cancel)?;

    let xc = &x - &x_mean.view().insert_axis(Axis(0));
    let yc = &y - y_mean;
    let xw = &xc * &w.view().insert_axis(Axis(1));

    let mut gram = xc.t().dot(&xw);
    check(cancel)?;
    for i in 0..n_features {
        gram[[i, i]] += alpha;
    }
    let rhs = xw.t().dot(&yc);

    let coef = solve_spd(&gram, &rhs, cancel)?.unwrap_or_else(|| Array1::zeros(n_features));
    let intercept = y_mean - x_mean.dot(&coef);
    Ok(RidgeFit { intercept, coef })
}

fn check(cancel: &CancelFlag) -> Result<(), ExplainError> {
    if cancel.is_cancelled() {
        return Err(ExplainError::Cancelled);
    }
    Ok(())
}

/// Solves `a x = b` for symmetric positive semi-definite `a`, adding jitter when needed.
fn solve_spd(a: &Array2<f64>, b: &Array1<f64>, cancel: &CancelFlag) -> Result<Option<Array1<f64>>, ExplainError> {
    let n = a.nrows();
    let scale = (a.diag().sum() / n as f64).abs().max(1e-12);
    for jitter in [0.0, 1e-10, 1e-8, 1e-6] {
        let mut shifted = a.clone();
        for i in 0..n {
            shifted[[i, i]] += jitter * scale;
        }
        if let Some(lower) = cholesky(&shifted, cancel)? {
            return Ok(Some(cholesky_solve(&lower, b)));
        }
    }
    Ok(None)
}

fn cholesky(a: &Array2<f64>, cancel: &CancelFlag) -> Result<Option<Array2<f64>>, ExplainError> {
    let n = a.nrows();
    let mut lower = Array2::<f64>::zeros((n, n));
    for j in 0..n {
        check(cancel)?;
        let mut diag = a[[j, j]];
        for k in 0..j {
            diag -= lower[[j, k]] * lower[[j, k]];
        }
        if diag <= 0.0 || !diag.is_finite() {
            return Ok(None);
        }
        let d = diag.sqrt();
        lower[[j, j]] = d;
        for i in (j + 1)..n {
            let mut value = a[[i, j]];
            for k in 0..j {
                value -= lower[[i, k]] * lower[[j, k]];
            }
            lower[[i, j]] = value / d;
        }
    }
    Ok(Some(lower))
}

fn cholesky_solve(lower: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = lower.nrows();
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut value = b[i];
        for k in 0..i {
            value -= lower[[i, k]] * z[k];
        }
        z[i] = value / lower[[i, i]];
    }
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut value = z[i];
        for k in (i + 1)..n {
            value -= lower[[k, i]] * x[k];
        }
        x[i] = value / lower[[i, i]];
    }
    x
}
