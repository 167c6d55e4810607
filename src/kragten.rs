//! Kragten uncertainty propagation
//!
//! The Kragten method is a derivative-free way of combining the uncertainties of the inputs to a
//! model. Each input is shifted by its own 1-sigma uncertainty while all others are held at their
//! nominal values, and the resulting deviations in the output are summed in quadrature
//!
//! $$
//!     u_c = \sqrt{\sum_i \left[f(x_1, \dots, x_i + u_i, \dots, x_n) - f(x_1, \dots, x_n)\right]^2}
//! $$
//!
//! For models which are linear in each input this reproduces the first-order propagation law
//! exactly. The engine only ever sees a closure over a flat parameter vector, so it is shared by
//! every calibration strategy.
use num_traits::Float;
use serde::Serialize;

use crate::stats::SampleAggregate;
use crate::strategy::CalibrationStrategy;
use crate::Result;

/// A nominal value with its 1-sigma uncertainty
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ModelParameter<E = f64> {
    pub value: E,
    pub uncertainty: E,
}

impl<E: Float> ModelParameter<E> {
    pub const fn new(value: E, uncertainty: E) -> Self {
        Self { value, uncertainty }
    }

    /// A parameter known without error
    pub fn exact(value: E) -> Self {
        Self {
            value,
            uncertainty: E::zero(),
        }
    }
}

/// The outcome of a propagation
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Propagation<E = f64> {
    /// Model output at the nominal parameters
    pub value: E,
    /// Combined 1-sigma uncertainty of the output
    pub uncertainty: E,
    /// Signed output deviation caused by each parameter, in parameter order
    ///
    /// Parameters carrying no uncertainty contribute exactly zero.
    pub contributions: Vec<E>,
}

impl<E: Float> Propagation<E> {
    /// Fraction of the combined variance due to each parameter
    ///
    /// When the combined uncertainty is zero every fraction is zero.
    pub fn budget(&self) -> Vec<E> {
        let variance = self.uncertainty.powi(2);
        self.contributions
            .iter()
            .map(|c| {
                if variance > E::zero() {
                    c.powi(2) / variance
                } else {
                    E::zero()
                }
            })
            .collect()
    }
}

/// Propagate the uncertainties of `parameters` through `model`
///
/// `model` is evaluated once at the nominal values and once more for each parameter with a
/// non-zero uncertainty.
///
/// # Examples
///
/// ```
/// use isocal::kragten::{propagate, ModelParameter};
///
/// let parameters = [ModelParameter::new(97.0, 3.0), ModelParameter::new(5.0, 4.0)];
/// let propagation = propagate(|p: &[f64]| Ok(p[0] + p[1]), &parameters).unwrap();
///
/// assert_eq!(propagation.value, 102.0);
/// assert!((propagation.uncertainty - 5.0).abs() < 1e-12);
/// ```
///
/// # Errors
/// Returns any error raised by `model`.
pub fn propagate<E, F>(mut model: F, parameters: &[ModelParameter<E>]) -> Result<Propagation<E>>
where
    E: Float,
    F: FnMut(&[E]) -> Result<E>,
{
    let nominal = parameters.iter().map(|p| p.value).collect::<Vec<_>>();
    let value = model(&nominal)?;

    let mut contributions = Vec::with_capacity(parameters.len());
    let mut sum_of_squares = E::zero();
    for (ii, parameter) in parameters.iter().enumerate() {
        if parameter.uncertainty == E::zero() {
            contributions.push(E::zero());
            continue;
        }
        let mut perturbed = nominal.clone();
        perturbed[ii] = perturbed[ii] + parameter.uncertainty;
        let deviation = model(&perturbed)? - value;
        sum_of_squares = sum_of_squares + deviation.powi(2);
        contributions.push(deviation);
    }

    Ok(Propagation {
        value,
        uncertainty: sum_of_squares.sqrt(),
        contributions,
    })
}

/// Corrected value and combined uncertainty for one aggregated sample
///
/// The sample's own raw mean is the first parameter, carrying its standard error, followed by the
/// fitted strategy's model parameters. Measurement precision and calibration trueness therefore
/// end up in a single number.
///
/// # Errors
/// Returns [`crate::Error::State`] if `strategy` has not been fitted.
pub fn propagate_sample(
    strategy: &dyn CalibrationStrategy,
    sample: &SampleAggregate,
) -> Result<Propagation<f64>> {
    let mut parameters = vec![ModelParameter::new(sample.mean, sample.sem)];
    parameters.extend(strategy.model_parameters()?);

    propagate(
        |p: &[f64]| strategy.predict_perturbed(p[0], &p[1..]),
        &parameters,
    )
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::standards::ReferenceMaterial;
    use crate::strategy::{SinglePointOffset, TwoPointLinear};
    use crate::Error;

    use ndarray_rand::rand::{Rng, SeedableRng};
    use rand_isaac::Isaac64Rng;

    fn fitted_offset(
        true_value: f64,
        true_uncertainty: f64,
        raw: SampleAggregate,
    ) -> SinglePointOffset {
        let reference =
            ReferenceMaterial::new("STD_1", true_value, true_uncertainty, Vec::<String>::new())
                .unwrap();
        let stats = BTreeMap::from([("STD_1".to_owned(), raw)]);
        let refs = BTreeMap::from([("STD_1".to_owned(), reference)]);
        let mut strategy = SinglePointOffset::new();
        strategy.fit(&stats, &refs).unwrap();
        strategy
    }

    #[test]
    fn linear_models_scale_uncertainty_by_gradient() -> Result<()> {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let gradient: f64 = rng.gen_range(-5.0..5.0);
        let parameter = ModelParameter::<f64>::new(rng.gen(), rng.gen_range(0.01..1.0));

        let propagation = propagate(|p: &[f64]| Ok(gradient * p[0] + 3.0), &[parameter])?;

        approx::assert_relative_eq!(propagation.value, gradient * parameter.value + 3.0);
        approx::assert_relative_eq!(
            propagation.uncertainty,
            gradient.abs() * parameter.uncertainty,
            max_relative = 1e-10
        );
        Ok(())
    }

    #[test]
    fn exact_parameters_are_never_perturbed() -> Result<()> {
        let mut evaluations = 0;
        let parameters = [
            ModelParameter::exact(1.0),
            ModelParameter::new(2.0, 0.5),
            ModelParameter::exact(3.0),
        ];
        let propagation = propagate(
            |p: &[f64]| {
                evaluations += 1;
                Ok(p.iter().sum())
            },
            &parameters,
        )?;

        assert_eq!(evaluations, 2);
        assert_eq!(propagation.contributions, vec![0.0, 0.5, 0.0]);
        approx::assert_relative_eq!(propagation.uncertainty, 0.5);
        Ok(())
    }

    #[test]
    fn budget_fractions_sum_to_one() -> Result<()> {
        let parameters = [ModelParameter::new(0.0, 3.0), ModelParameter::new(0.0, 4.0)];
        let propagation = propagate(|p: &[f64]| Ok(p[0] + p[1]), &parameters)?;
        let budget = propagation.budget();
        approx::assert_relative_eq!(budget[0], 9.0 / 25.0);
        approx::assert_relative_eq!(budget[1], 16.0 / 25.0);
        Ok(())
    }

    #[test]
    fn propagation_works_in_single_precision() -> Result<()> {
        let parameters = [ModelParameter::new(1.0f32, 0.3), ModelParameter::new(2.0, 0.4)];
        let propagation = propagate(|p: &[f32]| Ok(p[0] + p[1]), &parameters)?;
        approx::assert_relative_eq!(propagation.uncertainty, 0.5f32, max_relative = 1e-6);
        Ok(())
    }

    #[test]
    fn model_errors_are_propagated() {
        let parameters = [ModelParameter::new(1.0, 1.0)];
        let result = propagate(
            |_: &[f64]| Err(Error::Fit("singular".into())),
            &parameters,
        );
        assert!(matches!(result, Err(Error::Fit(_))));
    }

    #[test]
    fn zero_uncertainty_everywhere_gives_zero_combined_uncertainty() -> Result<()> {
        let strategy = fitted_offset(
            10.0,
            0.0,
            SampleAggregate {
                mean: 10.0,
                sem: 0.0,
                count: 1,
            },
        );
        let sample = SampleAggregate {
            mean: 10.0,
            sem: 0.0,
            count: 1,
        };
        let propagation = propagate_sample(&strategy, &sample)?;
        assert_eq!(propagation.uncertainty, 0.0);
        approx::assert_relative_eq!(propagation.value, 10.0);
        Ok(())
    }

    #[test]
    fn sample_and_standard_uncertainty_add_in_quadrature() -> Result<()> {
        let strategy = fitted_offset(
            100.0,
            4.0,
            SampleAggregate {
                mean: 100.0,
                sem: 0.0,
                count: 3,
            },
        );
        let sample = SampleAggregate {
            mean: 100.0,
            sem: 3.0,
            count: 3,
        };
        let propagation = propagate_sample(&strategy, &sample)?;
        approx::assert_relative_eq!(propagation.uncertainty, 5.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn noisier_samples_carry_larger_uncertainty() -> Result<()> {
        let low = ReferenceMaterial::new("LOW", 0.0, 0.0, Vec::<String>::new())?;
        let high = ReferenceMaterial::new("HIGH", 10.0, 0.0, Vec::<String>::new())?;
        let stats = BTreeMap::from([
            (
                "LOW".to_owned(),
                SampleAggregate {
                    mean: 0.0,
                    sem: 0.1,
                    count: 4,
                },
            ),
            (
                "HIGH".to_owned(),
                SampleAggregate {
                    mean: 10.0,
                    sem: 0.1,
                    count: 4,
                },
            ),
        ]);
        let refs = BTreeMap::from([("LOW".to_owned(), low), ("HIGH".to_owned(), high)]);
        let mut strategy = TwoPointLinear::new();
        strategy.fit(&stats, &refs)?;

        let precise = SampleAggregate {
            mean: 5.0,
            sem: 0.0,
            count: 4,
        };
        let noisy = SampleAggregate {
            mean: 5.0,
            sem: 1.0,
            count: 4,
        };
        let precise = propagate_sample(&strategy, &precise)?;
        let noisy = propagate_sample(&strategy, &noisy)?;

        // The curve alone contributes a systematic uncertainty
        assert!(precise.uncertainty > 0.0);
        assert!(noisy.uncertainty > precise.uncertainty);
        Ok(())
    }

    #[test]
    fn unfitted_strategies_cannot_be_propagated() {
        let strategy = TwoPointLinear::new();
        let sample = SampleAggregate {
            mean: 1.0,
            sem: 0.1,
            count: 2,
        };
        assert!(matches!(
            propagate_sample(&strategy, &sample),
            Err(Error::State(_))
        ));
    }
}
