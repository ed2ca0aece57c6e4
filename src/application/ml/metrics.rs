//! Classification metrics for the next-state forecaster.

use crate::domain::market::RegimeLabel;
use crate::domain::ml::reports::{ClassMetrics, ClassificationReport};
use std::collections::BTreeSet;

pub fn accuracy(y_true: &[u32], y_pred: &[u32]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

/// Counts indexed `[true][predicted]` over classes `0..n_classes`.
pub fn confusion_matrix(y_true: &[u32], y_pred: &[u32], n_classes: usize) -> Vec<Vec<usize>> {
    let mut matrix = vec![vec![0usize; n_classes]; n_classes];
    for (&t, &p) in y_true.iter().zip(y_pred) {
        if let Some(cell) = matrix.get_mut(t as usize).and_then(|row| row.get_mut(p as usize)) {
            *cell += 1;
        }
    }
    matrix
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

/// Per-class precision, recall and F1 for every class that appears in
/// either `y_true` or `y_pred`. Zero denominators score 0.
pub fn classification_report(y_true: &[u32], y_pred: &[u32], classes: &[RegimeLabel]) -> ClassificationReport {
    let present: BTreeSet<u32> = y_true.iter().chain(y_pred).copied().collect();
    let matrix = confusion_matrix(y_true, y_pred, classes.len());

    let mut rows = Vec::new();
    for class in present {
        let c = class as usize;
        let Some(label) = classes.get(c) else {
            continue;
        };
        let tp = matrix[c][c];
        let predicted: usize = matrix.iter().map(|row| row[c]).sum();
        let support: usize = matrix[c].iter().sum();

        let precision = ratio(tp, predicted);
        let recall = ratio(tp, support);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        rows.push(ClassMetrics {
            label: *label,
            precision,
            recall,
            f1,
            support,
        });
    }

    let total = y_true.len();
    let n = rows.len().max(1) as f64;
    let macro_avg = |f: fn(&ClassMetrics) -> f64| rows.iter().map(f).sum::<f64>() / n;
    let weighted_avg = |f: fn(&ClassMetrics) -> f64| {
        if total == 0 {
            0.0
        } else {
            rows.iter().map(|m| f(m) * m.support as f64).sum::<f64>() / total as f64
        }
    };

    ClassificationReport {
        accuracy: accuracy(y_true, y_pred),
        macro_precision: macro_avg(|m| m.precision),
        macro_recall: macro_avg(|m| m.recall),
        macro_f1: macro_avg(|m| m.f1),
        weighted_precision: weighted_avg(|m| m.precision),
        weighted_recall: weighted_avg(|m| m.recall),
        weighted_f1: weighted_avg(|m| m.f1),
        support: total,
        classes: rows,
    }
}
