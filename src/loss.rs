use crate::{Error, Result};
use ndarray::{Array2, ArrayView2, Axis};

fn check_labels(scores: &ArrayView2<'_, f64>, labels: &[usize]) -> Result<()> {
    let (n, classes) = scores.dim();
    if labels.len() != n {
        return Err(Error::ShapeMismatch {
            expected: vec![n],
            actual: vec![labels.len()],
        });
    }
    if n == 0 {
        return Err(Error::InvalidConfig(
            "cannot compute a loss over an empty batch".to_string(),
        ));
    }
    if let Some((i, &y)) = labels.iter().enumerate().find(|(_, &y)| y >= classes) {
        return Err(Error::InvalidConfig(format!(
            "label {} of sample {} is out of range for {} classes",
            y, i, classes
        )));
    }
    Ok(())
}

/// Multiclass SVM (hinge) loss with margin 1.
pub fn svm_loss(scores: ArrayView2<'_, f64>, labels: &[usize]) -> Result<(f64, Array2<f64>)> {
    check_labels(&scores, labels)?;
    let n = scores.nrows() as f64;

    let mut loss = 0.0;
    let mut dx = Array2::zeros(scores.raw_dim());

    for (i, (row, mut grad)) in scores
        .axis_iter(Axis(0))
        .zip(dx.axis_iter_mut(Axis(0)))
        .enumerate()
    {
        let y = labels[i];
        let correct = row[y];
        let mut violations = 0.0;

        for (j, &s) in row.iter().enumerate() {
            if j == y {
                continue;
            }
            let margin = s - correct + 1.0;
            if margin > 0.0 {
                loss += margin;
                grad[j] = 1.0;
                violations += 1.0;
            }
        }
        grad[y] = -violations;
    }

    dx /= n;
    Ok((loss / n, dx))
}

pub fn softmax_loss(scores: ArrayView2<'_, f64>, labels: &[usize]) -> Result<(f64, Array2<f64>)> {
    check_labels(&scores, labels)?;
    let n = scores.nrows() as f64;

    let mut loss = 0.0;
    let mut dx = Array2::zeros(scores.raw_dim());

    for (i, (row, mut grad)) in scores
        .axis_iter(Axis(0))
        .zip(dx.axis_iter_mut(Axis(0)))
        .enumerate()
    {
        let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        let shifted = row.mapv(|v| v - max);
        let log_z = shifted.mapv(f64::exp).sum().ln();

        let y = labels[i];
        loss -= shifted[y] - log_z;

        grad.assign(&shifted.mapv(|v| (v - log_z).exp()));
        grad[y] -= 1.0;
    }

    dx /= n;
    Ok((loss / n, dx))
}
