//! Log-log line fit of a persisted variance table.
//!
//! Fits `ln(variance) = k * ln(T) + n` by ordinary least squares. The slope
//! `k` is the usual summary of an Allan variance curve: about -1 for white
//! noise, 0 for flicker noise.

use std::fs;
use std::path::Path;

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::error::{AllanError, Result};

/// Least-squares line with standard errors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LineFit {
    pub slope: f64,
    pub intercept: f64,
    /// Infinite when only two points were fitted.
    pub slope_err: f64,
    pub intercept_err: f64,
    /// Half-width of the 95% confidence interval (Student's t, `m - 2` dof).
    pub slope_ci95: f64,
    pub intercept_ci95: f64,
    pub points: usize,
}

/// Read columns 0 and 1 of a table, skipping blank and `#` lines.
pub fn read_table(path: &Path) -> Result<Vec<(f64, f64)>> {
    let text = fs::read_to_string(path).map_err(|e| AllanError::io(path, e))?;
    let mut points = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parse_err = |message: String| AllanError::Parse {
            path: path.to_path_buf(),
            line: i + 1,
            message,
        };
        let mut cols = line.split_whitespace();
        let (Some(a), Some(b)) = (cols.next(), cols.next()) else {
            return Err(parse_err("expected two columns".to_string()));
        };
        let x: f64 = a
            .parse()
            .map_err(|e| parse_err(format!("bad T '{a}': {e}")))?;
        let y: f64 = b
            .parse()
            .map_err(|e| parse_err(format!("bad value '{b}': {e}")))?;
        points.push((x, y));
    }
    Ok(points)
}

/// Natural log of both coordinates; non-positive values map to 0.
pub fn log_points(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let ln0 = |v: f64| if v > 0.0 { v.ln() } else { 0.0 };
    points.iter().map(|&(x, y)| (ln0(x), ln0(y))).collect()
}

/// Ordinary least squares `y = slope * x + intercept`.
pub fn fit_line(points: &[(f64, f64)]) -> Result<LineFit> {
    let m = points.len();
    if m < 2 {
        return Err(AllanError::TooFewPoints { got: m });
    }
    let mf = m as f64;
    let x_mean = points.iter().map(|p| p.0).sum::<f64>() / mf;
    let y_mean = points.iter().map(|p| p.1).sum::<f64>() / mf;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for &(x, y) in points {
        sxx += (x - x_mean) * (x - x_mean);
        sxy += (x - x_mean) * (y - y_mean);
    }
    if sxx <= 0.0 {
        return Err(AllanError::TooFewPoints { got: 1 });
    }

    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;

    let (slope_err, intercept_err, t_crit) = if m > 2 {
        let ssr: f64 = points
            .iter()
            .map(|&(x, y)| (y - (slope * x + intercept)).powi(2))
            .sum();
        let dof = (m - 2) as f64;
        let s2 = ssr / dof;
        let t_crit = StudentsT::new(0.0, 1.0, dof)
            .map(|t| t.inverse_cdf(0.975))
            .unwrap_or(f64::INFINITY);
        (
            (s2 / sxx).sqrt(),
            (s2 * (1.0 / mf + x_mean * x_mean / sxx)).sqrt(),
            t_crit,
        )
    } else {
        (f64::INFINITY, f64::INFINITY, f64::INFINITY)
    };

    Ok(LineFit {
        slope,
        intercept,
        slope_err,
        intercept_err,
        slope_ci95: t_crit * slope_err,
        intercept_ci95: t_crit * intercept_err,
        points: m,
    })
}

/// Read a table and fit its log-log curve.
pub fn fit_table(path: &Path) -> Result<LineFit> {
    let points = read_table(path)?;
    fit_line(&log_points(&points))
}
