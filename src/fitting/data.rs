//! Measured dataset: four same-length columns `x, sigma_x, y, sigma_y`.
//!
//! Host data loaders hand over raw columns where an all-zero sigma column
//! means "uncertainty not supplied"; that convention is converted to
//! `Option` here, at the boundary, so no strategy ever has to test for
//! zero-filled arrays again.

use nalgebra::DVector;

use crate::fitting::error::FitError;

#[derive(Clone, Debug)]
pub struct Dataset {
    pub x: DVector<f64>,
    pub y: DVector<f64>,
    pub sigma_x: Option<DVector<f64>>,
    pub sigma_y: Option<DVector<f64>>,
}

impl Dataset {
    /// Build a dataset from raw columns. Sigma columns that are empty or
    /// all-zero become `None` (no uncertainty supplied on that axis).
    pub fn new(
        x: Vec<f64>,
        sigma_x: Vec<f64>,
        y: Vec<f64>,
        sigma_y: Vec<f64>,
    ) -> Result<Self, FitError> {
        let n = x.len();
        if n < 2 {
            return Err(FitError::InvalidInput(format!(
                "at least 2 data points are required, got {}",
                n
            )));
        }
        if y.len() != n {
            return Err(FitError::InvalidInput(format!(
                "x has {} entries but y has {}",
                n,
                y.len()
            )));
        }
        for (label, sigma) in [("sigma_x", &sigma_x), ("sigma_y", &sigma_y)] {
            if !sigma.is_empty() && sigma.len() != n {
                return Err(FitError::InvalidInput(format!(
                    "{} has {} entries but x has {}",
                    label,
                    sigma.len(),
                    n
                )));
            }
        }
        Ok(Dataset {
            x: DVector::from_vec(x),
            y: DVector::from_vec(y),
            sigma_x: column_to_option(sigma_x),
            sigma_y: column_to_option(sigma_y),
        })
    }

    /// Dataset without uncertainties on either axis.
    pub fn from_xy(x: Vec<f64>, y: Vec<f64>) -> Result<Self, FitError> {
        Self::new(x, Vec::new(), y, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.len() == 0
    }
}

fn column_to_option(column: Vec<f64>) -> Option<DVector<f64>> {
    if column.is_empty() || column.iter().all(|v| *v == 0.0) {
        None
    } else {
        Some(DVector::from_vec(column))
    }
}

/// Fitting weights from an optional sigma column, masking non-positive
/// entries to zero weight. `None` when no entry carries a usable sigma.
pub fn weights_from_sigma(sigma: Option<&DVector<f64>>) -> Option<DVector<f64>> {
    let sigma = sigma?;
    if sigma.iter().all(|s| *s <= 0.0) {
        return None;
    }
    Some(sigma.map(|s| if s > 0.0 { 1.0 / (s * s) } else { 0.0 }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_zero_sigma_becomes_none() {
        let data =
            Dataset::new(vec![1.0, 2.0], vec![0.0, 0.0], vec![3.0, 4.0], vec![0.1, 0.1]).unwrap();
        assert!(data.sigma_x.is_none());
        assert!(data.sigma_y.is_some());
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        assert!(Dataset::new(vec![1.0, 2.0], vec![], vec![3.0], vec![]).is_err());
        assert!(
            Dataset::new(vec![1.0, 2.0], vec![0.1], vec![3.0, 4.0], vec![]).is_err()
        );
    }

    #[test]
    fn test_minimum_two_points() {
        assert!(Dataset::new(vec![1.0], vec![], vec![2.0], vec![]).is_err());
        assert!(Dataset::from_xy(vec![1.0, 2.0], vec![3.0, 4.0]).is_ok());
    }

    #[test]
    fn test_weights_mask_nonpositive_sigma() {
        let sigma = DVector::from_vec(vec![0.5, 0.0, 2.0]);
        let w = weights_from_sigma(Some(&sigma)).unwrap();
        assert_eq!(w[0], 4.0);
        assert_eq!(w[1], 0.0);
        assert_eq!(w[2], 0.25);
        assert!(weights_from_sigma(None).is_none());
    }
}
