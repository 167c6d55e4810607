use std::collections::BTreeMap;

use itertools::Itertools;
use num_traits::Float;
use serde::Serialize;

/// Summary statistics of the replicates sharing one key
///
/// The standard error is taken over the sample standard deviation (one degree of freedom removed),
/// and is defined to be zero when only a single replicate is available.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SampleAggregate {
    pub mean: f64,
    pub sem: f64,
    pub count: usize,
}

impl SampleAggregate {
    /// Summarise a set of replicate values, returning `None` for an empty set
    pub fn from_values(values: &[f64]) -> Option<Self> {
        Some(Self {
            mean: mean(values)?,
            sem: standard_error(values)?,
            count: values.len(),
        })
    }
}

/// Arithmetic mean of `values`, or `None` if the slice is empty
///
/// # Examples
///
/// ```
/// use isocal::stats::mean;
///
/// assert_eq!(mean(&[1.0, 2.0, 6.0]), Some(3.0));
/// assert_eq!(mean::<f64>(&[]), None);
/// ```
pub fn mean<E: Float>(values: &[E]) -> Option<E> {
    if values.is_empty() {
        return None;
    }
    let n = E::from(values.len())?;
    Some(values.iter().fold(E::zero(), |acc, &x| acc + x) / n)
}

/// Standard error of the mean
///
/// For `n` replicates with sample standard deviation `s` this is $s / \sqrt{n}$. A single replicate
/// has no spread to estimate, so we return zero rather than an undefined value.
///
/// # Examples
///
/// ```
/// use isocal::stats::standard_error;
///
/// // s^2 = 8 / 3 over n = 4 replicates
/// let sem = standard_error(&[1.0f32, 3.0, 5.0, 3.0]).unwrap();
/// assert!((sem - 0.816_496_6).abs() < 1e-6);
/// assert_eq!(standard_error(&[7.0]), Some(0.0));
/// ```
pub fn standard_error<E: Float>(values: &[E]) -> Option<E> {
    let centre = mean(values)?;
    if values.len() == 1 {
        return Some(E::zero());
    }
    let n = E::from(values.len())?;
    let sum_of_squares = values
        .iter()
        .fold(E::zero(), |acc, &x| acc + (x - centre).powi(2));
    let variance = sum_of_squares / (n - E::one());
    Some((variance / n).sqrt())
}

/// Group `(key, value)` pairs and summarise each group
///
/// Keys are returned in sorted order so downstream fits and reports are reproducible regardless of
/// the order the replicates were measured in.
pub fn aggregate_by<K, I>(pairs: I) -> BTreeMap<K, SampleAggregate>
where
    K: Ord + std::hash::Hash + Eq,
    I: IntoIterator<Item = (K, f64)>,
{
    pairs
        .into_iter()
        .into_group_map()
        .into_iter()
        .filter_map(|(key, values)| SampleAggregate::from_values(&values).map(|agg| (key, agg)))
        .collect()
}
