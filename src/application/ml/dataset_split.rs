use crate::domain::errors::{RegimeError, RegimeResult};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;

/// Row indices assigned to each side of a train/test split.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffled split holding out `ceil(test_size * n)` rows.
///
/// With more than one class the test rows are allocated per class in
/// proportion to class frequency (largest remainders get the leftovers),
/// so both sides keep the label mix.
pub fn train_test_split(labels: &[u32], test_size: f64, seed: u64) -> RegimeResult<TrainTestSplit> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(RegimeError::InvalidArgument(format!(
            "test size must be within (0, 1), got {}",
            test_size
        )));
    }

    let n = labels.len();
    let n_test = (test_size * n as f64).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(RegimeError::ClassifierTraining(format!(
            "not enough labeled samples to split: {} samples with test size {}",
            n, test_size
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut groups: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (idx, &label) in labels.iter().enumerate() {
        groups.entry(label).or_default().push(idx);
    }

    let (mut train, mut test) = if groups.len() > 1 {
        stratified(&mut groups, n, n_test, &mut rng)
    } else {
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut rng);
        let train = order.split_off(n_test);
        (train, order)
    };

    train.shuffle(&mut rng);
    test.shuffle(&mut rng);
    Ok(TrainTestSplit { train, test })
}

fn stratified(
    groups: &mut BTreeMap<u32, Vec<usize>>,
    n: usize,
    n_test: usize,
    rng: &mut StdRng,
) -> (Vec<usize>, Vec<usize>) {
    let mut quotas: Vec<(u32, usize, f64)> = groups
        .iter()
        .map(|(&label, members)| {
            let exact = members.len() as f64 * n_test as f64 / n as f64;
            (label, exact.floor() as usize, exact - exact.floor())
        })
        .collect();

    let assigned: usize = quotas.iter().map(|q| q.1).sum();
    let mut by_remainder: Vec<usize> = (0..quotas.len()).collect();
    // Stable: equal remainders keep label order
    by_remainder.sort_by(|&a, &b| quotas[b].2.total_cmp(&quotas[a].2));
    for &slot in by_remainder.iter().take(n_test.saturating_sub(assigned)) {
        quotas[slot].1 += 1;
    }

    let mut train = Vec::with_capacity(n - n_test);
    let mut test = Vec::with_capacity(n_test);
    for (label, quota, _) in quotas {
        if let Some(members) = groups.get_mut(&label) {
            members.shuffle(rng);
            let quota = quota.min(members.len());
            test.extend_from_slice(&members[..quota]);
            train.extend_from_slice(&members[quota..]);
        }
    }
    (train, test)
}
