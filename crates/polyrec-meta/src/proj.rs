//! Projection vectors and the subspace-removal operator built from them.

use crate::matrix::Matrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A named projection vector over the full ordered channel list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    /// Operator name, e.g. the noise component it removes.
    pub name: String,
    /// Row vector, one coefficient per channel.
    pub data: Vec<f64>,
    /// Whether this vector participates in the composed operator.
    pub active: bool,
}

impl Projection {
    /// Create an active projection vector.
    pub fn new(name: impl Into<String>, data: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            data,
            active: true,
        }
    }
}

/// Mark every projection vector inactive, e.g. before saving a recording
/// whose handle does not apply projections.
pub fn deactivate_all(projs: &mut [Projection]) {
    for p in projs.iter_mut() {
        p.active = false;
    }
}

/// Compose the projection operator `I - U Uᵀ` from the active vectors.
///
/// The active rows are orthonormalized with modified Gram-Schmidt;
/// vectors that are (numerically) linear combinations of earlier ones are
/// dropped. Returns `None` when no active vector with a usable norm
/// exists, which callers treat as "no projection".
pub fn build_operator(projs: &[Projection], nchan: usize) -> Option<Matrix> {
    let active: Vec<&Projection> = projs
        .iter()
        .filter(|p| p.active && p.data.len() == nchan)
        .collect();
    if active.is_empty() {
        return None;
    }

    let mut basis: Vec<Vec<f64>> = Vec::with_capacity(active.len());
    for p in &active {
        let mut v = p.data.clone();
        for u in &basis {
            let dot: f64 = v.iter().zip(u).map(|(a, b)| a * b).sum();
            for (vi, ui) in v.iter_mut().zip(u) {
                *vi -= dot * ui;
            }
        }
        let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm < 1e-10 {
            debug!(name = %p.name, "projection vector is degenerate, dropping");
            continue;
        }
        for vi in v.iter_mut() {
            *vi /= norm;
        }
        basis.push(v);
    }

    if basis.is_empty() {
        return None;
    }

    let mut op = Matrix::identity(nchan);
    for u in &basis {
        for i in 0..nchan {
            let ui = u[i];
            if ui == 0.0 {
                continue;
            }
            let row = op.row_mut(i);
            for (j, uj) in u.iter().enumerate() {
                row[j] -= ui * uj;
            }
        }
    }

    debug!(
        n_active = active.len(),
        n_basis = basis.len(),
        "composed projection operator"
    );
    Some(op)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_no_active_vectors_is_none() {
        let mut projs = vec![Projection::new("grad", vec![1.0, 0.0, 0.0])];
        deactivate_all(&mut projs);
        assert!(build_operator(&projs, 3).is_none());
        assert!(build_operator(&[], 3).is_none());
    }

    #[test]
    fn test_operator_annihilates_its_vector() {
        let v = vec![1.0, 2.0, -1.0];
        let projs = vec![Projection::new("comp-1", v.clone())];
        let op = build_operator(&projs, 3).unwrap();

        // P v = 0
        for i in 0..3 {
            let out: f64 = (0..3).map(|j| op.get(i, j) * v[j]).sum();
            assert_abs_diff_eq!(out, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_operator_is_idempotent() {
        let projs = vec![
            Projection::new("a", vec![1.0, 0.0, 1.0, 0.0]),
            Projection::new("b", vec![0.0, 1.0, 0.0, -1.0]),
        ];
        let op = build_operator(&projs, 4).unwrap();
        let op2 = op.matmul(&op);
        for i in 0..4 {
            for j in 0..4 {
                assert_abs_diff_eq!(op2.get(i, j), op.get(i, j), epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_duplicate_vector_dropped() {
        let projs = vec![
            Projection::new("a", vec![1.0, 1.0]),
            Projection::new("a again", vec![2.0, 2.0]),
        ];
        // Rank-1 subspace of a rank-2 space: operator exists and is not zero.
        let op = build_operator(&projs, 2).unwrap();
        let trace: f64 = (0..2).map(|i| op.get(i, i)).sum();
        assert_abs_diff_eq!(trace, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_wrong_length_vector_ignored() {
        let projs = vec![Projection::new("short", vec![1.0, 0.0])];
        assert!(build_operator(&projs, 3).is_none());
    }
}
