//! Calibration strategies
//!
//! A strategy turns the aggregated raw measurements of the anchor standards, together with their
//! certified values, into a correction model. Every strategy exposes its model as a flat, ordered
//! list of [`ModelParameter`]s and can re-evaluate the correction for an arbitrary perturbation of
//! that list, which is all the Kragten engine needs to know about it.
use std::collections::BTreeMap;
use std::fmt;

use itertools::Itertools;
use ndarray::{Array1, ArrayView1};
use serde::Serialize;

use crate::kragten::ModelParameter;
use crate::standards::ReferenceMaterial;
use crate::stats::SampleAggregate;
use crate::{Error, Result};

/// Raw statistics of the anchor standards, keyed by canonical standard name
pub type AnchorStats = BTreeMap<String, SampleAggregate>;

/// Anchor standards keyed by canonical name
pub type AnchorRefs = BTreeMap<String, ReferenceMaterial>;

/// An interchangeable calibration model
///
/// A strategy starts out unfitted. Only a successful [`CalibrationStrategy::fit`] makes the
/// prediction methods available; before that they return [`Error::State`].
pub trait CalibrationStrategy: fmt::Debug + Send {
    /// Human readable description, including the anchors once fitted
    fn label(&self) -> String;

    /// The exact number of anchor standards the model needs
    fn required_anchors(&self) -> usize;

    fn is_fitted(&self) -> bool;

    /// Fit the model from the anchors' raw statistics and certified values
    ///
    /// # Errors
    /// Returns [`Error::Fit`] if the number of anchors is not [`Self::required_anchors`], if an
    /// anchor has no raw statistics, or if the anchors do not determine a model.
    fn fit(&mut self, anchor_stats: &AnchorStats, anchor_refs: &AnchorRefs) -> Result<()>;

    /// Correct a single raw value with the nominal model
    fn predict(&self, raw: f64) -> Result<f64>;

    /// Correct a raw value with a model rebuilt from `parameters`
    ///
    /// `parameters` follows the order of [`Self::model_parameters`].
    fn predict_perturbed(&self, raw: f64, parameters: &[f64]) -> Result<f64>;

    /// The model's parameters with their 1-sigma uncertainties, in a fixed order
    fn model_parameters(&self) -> Result<Vec<ModelParameter>>;

    /// Correct a whole column of raw values, returning a new column
    fn apply(&self, column: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        column
            .iter()
            .map(|&raw| self.predict(raw))
            .collect::<Result<Vec<_>>>()
            .map(Array1::from)
    }
}

/// A straight calibration line, `true = slope * raw + intercept`
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Line {
    pub slope: f64,
    pub intercept: f64,
}

impl Line {
    /// The line through `(raw_low, true_low)` and `(raw_high, true_high)`
    ///
    /// Returns `None` when the raw values coincide and the slope is undefined.
    fn through(raw_low: f64, raw_high: f64, true_low: f64, true_high: f64) -> Option<Self> {
        let slope = (true_high - true_low) / (raw_high - raw_low);
        let intercept = true_low - slope * raw_low;
        Self { slope, intercept }.finite()
    }

    /// Ordinary least squares line of `truth` on `raw`
    fn least_squares(raw: &[f64], truth: &[f64]) -> Option<Self> {
        let x = ArrayView1::from(raw);
        let y = ArrayView1::from(truth);
        let x_mean = x.mean()?;
        let y_mean = y.mean()?;
        let dx = &x - x_mean;
        let dy = &y - y_mean;
        let sxx = dx.dot(&dx);
        if sxx == 0.0 {
            return None;
        }
        let slope = dx.dot(&dy) / sxx;
        Self {
            slope,
            intercept: y_mean - slope * x_mean,
        }
        .finite()
    }

    fn finite(self) -> Option<Self> {
        (self.slope.is_finite() && self.intercept.is_finite()).then_some(self)
    }

    pub fn at(&self, raw: f64) -> f64 {
        self.slope * raw + self.intercept
    }
}

#[derive(Clone, Debug)]
struct Anchor {
    name: String,
    raw: ModelParameter,
    reference: ModelParameter,
}

/// Pair each anchor with its raw statistics, sorted ascending by certified value
///
/// Sorting fixes the roles of the anchors, so parameter order does not depend on the order in
/// which the caller listed them.
fn collect_anchors(
    strategy: &str,
    required: usize,
    anchor_stats: &AnchorStats,
    anchor_refs: &AnchorRefs,
) -> Result<Vec<Anchor>> {
    if anchor_refs.len() != required {
        return Err(Error::Fit(format!(
            "{strategy} requires exactly {required} anchor standard(s), found {}",
            anchor_refs.len()
        )));
    }

    let anchors = anchor_refs
        .iter()
        .map(|(name, reference)| {
            let raw = anchor_stats.get(name).ok_or_else(|| {
                Error::Fit(format!("no measurements were matched to anchor {name}"))
            })?;
            Ok(Anchor {
                name: name.clone(),
                raw: ModelParameter::new(raw.mean, raw.sem),
                reference: ModelParameter::new(
                    reference.true_value(),
                    reference.true_uncertainty(),
                ),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(anchors
        .into_iter()
        .sorted_by(|a, b| {
            a.reference
                .value
                .total_cmp(&b.reference.value)
                .then_with(|| a.name.cmp(&b.name))
        })
        .collect())
}

fn not_fitted(strategy: &str) -> Error {
    Error::State(format!("{strategy} must be fitted before it can be used"))
}

fn check_parameter_count(strategy: &str, parameters: &[f64], expected: usize) -> Result<()> {
    if parameters.len() == expected {
        Ok(())
    } else {
        Err(Error::Fit(format!(
            "{strategy} has {expected} model parameters, {} were supplied",
            parameters.len()
        )))
    }
}

fn label_with_anchors(strategy: &str, anchors: &[Anchor]) -> String {
    format!(
        "{strategy}[{}]",
        anchors.iter().map(|anchor| anchor.name.as_str()).join(", ")
    )
}

/// One-point normalisation: the raw values are shifted by a constant offset
///
/// `true = raw + (true_std - raw_std)`
#[derive(Clone, Debug, Default)]
pub struct SinglePointOffset {
    fitted: Option<OffsetModel>,
}

#[derive(Clone, Debug)]
struct OffsetModel {
    anchor: Anchor,
    offset: f64,
}

impl SinglePointOffset {
    const NAME: &'static str = "SinglePointOffset";

    pub fn new() -> Self {
        Self::default()
    }

    fn model(&self) -> Result<&OffsetModel> {
        self.fitted.as_ref().ok_or_else(|| not_fitted(Self::NAME))
    }

    /// The fitted offset
    ///
    /// # Errors
    /// Returns [`Error::State`] before a successful fit.
    pub fn offset(&self) -> Result<f64> {
        Ok(self.model()?.offset)
    }
}

impl CalibrationStrategy for SinglePointOffset {
    fn label(&self) -> String {
        self.fitted.as_ref().map_or_else(
            || Self::NAME.to_owned(),
            |model| label_with_anchors(Self::NAME, std::slice::from_ref(&model.anchor)),
        )
    }

    fn required_anchors(&self) -> usize {
        1
    }

    fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    fn fit(&mut self, anchor_stats: &AnchorStats, anchor_refs: &AnchorRefs) -> Result<()> {
        self.fitted = None;
        let mut anchors =
            collect_anchors(Self::NAME, self.required_anchors(), anchor_stats, anchor_refs)?;
        let anchor = anchors.remove(0);
        let offset = anchor.reference.value - anchor.raw.value;
        self.fitted = Some(OffsetModel { anchor, offset });
        Ok(())
    }

    fn predict(&self, raw: f64) -> Result<f64> {
        Ok(raw + self.model()?.offset)
    }

    fn predict_perturbed(&self, raw: f64, parameters: &[f64]) -> Result<f64> {
        self.model()?;
        check_parameter_count(Self::NAME, parameters, 2)?;
        Ok(raw + (parameters[1] - parameters[0]))
    }

    fn model_parameters(&self) -> Result<Vec<ModelParameter>> {
        let model = self.model()?;
        Ok(vec![model.anchor.raw, model.anchor.reference])
    }

    fn apply(&self, column: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        let offset = self.model()?.offset;
        Ok(column.mapv(|raw| raw + offset))
    }
}

/// Two-point linear normalisation
///
/// The anchors are ordered by certified value into a low and a high standard, and the line
/// through them maps raw values onto the reference scale. Model parameters are ordered
/// `[raw_low, raw_high, true_low, true_high]`.
#[derive(Clone, Debug, Default)]
pub struct TwoPointLinear {
    fitted: Option<TwoPointModel>,
}

#[derive(Clone, Debug)]
struct TwoPointModel {
    anchors: [Anchor; 2],
    line: Line,
}

impl TwoPointLinear {
    const NAME: &'static str = "TwoPointLinear";

    pub fn new() -> Self {
        Self::default()
    }

    fn model(&self) -> Result<&TwoPointModel> {
        self.fitted.as_ref().ok_or_else(|| not_fitted(Self::NAME))
    }

    /// The fitted calibration line
    ///
    /// # Errors
    /// Returns [`Error::State`] before a successful fit.
    pub fn line(&self) -> Result<Line> {
        Ok(self.model()?.line)
    }
}

impl CalibrationStrategy for TwoPointLinear {
    fn label(&self) -> String {
        self.fitted.as_ref().map_or_else(
            || Self::NAME.to_owned(),
            |model| label_with_anchors(Self::NAME, &model.anchors),
        )
    }

    fn required_anchors(&self) -> usize {
        2
    }

    fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    fn fit(&mut self, anchor_stats: &AnchorStats, anchor_refs: &AnchorRefs) -> Result<()> {
        self.fitted = None;
        let anchors =
            collect_anchors(Self::NAME, self.required_anchors(), anchor_stats, anchor_refs)?;
        let [low, high]: [Anchor; 2] = anchors
            .try_into()
            .map_err(|_| Error::Fit("expected exactly two anchors".into()))?;

        let line = Line::through(
            low.raw.value,
            high.raw.value,
            low.reference.value,
            high.reference.value,
        )
        .ok_or_else(|| {
            Error::Fit(format!(
                "anchors {} and {} have the same raw mean, the slope is undefined",
                low.name, high.name
            ))
        })?;

        self.fitted = Some(TwoPointModel {
            anchors: [low, high],
            line,
        });
        Ok(())
    }

    fn predict(&self, raw: f64) -> Result<f64> {
        Ok(self.model()?.line.at(raw))
    }

    fn predict_perturbed(&self, raw: f64, parameters: &[f64]) -> Result<f64> {
        self.model()?;
        check_parameter_count(Self::NAME, parameters, 4)?;
        let line = Line::through(parameters[0], parameters[1], parameters[2], parameters[3])
            .ok_or_else(|| Error::Fit("perturbed anchors do not determine a line".into()))?;
        Ok(line.at(raw))
    }

    fn model_parameters(&self) -> Result<Vec<ModelParameter>> {
        let [low, high] = &self.model()?.anchors;
        Ok(vec![low.raw, high.raw, low.reference, high.reference])
    }

    fn apply(&self, column: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        let line = self.model()?.line;
        Ok(column.mapv(|raw| line.at(raw)))
    }
}

/// Least-squares linear normalisation through `N` anchors
///
/// Model parameters are ordered `[raw_1, .., raw_N, true_1, .., true_N]` with anchors sorted by
/// certified value. For two anchors the fit coincides with [`TwoPointLinear`].
#[derive(Clone, Debug)]
pub struct NPointLinear {
    anchors: usize,
    fitted: Option<RegressionModel>,
}

#[derive(Clone, Debug)]
struct RegressionModel {
    anchors: Vec<Anchor>,
    line: Line,
}

impl NPointLinear {
    const NAME: &'static str = "NPointLinear";

    /// A regression through exactly `anchors` standards
    ///
    /// # Errors
    /// Returns [`Error::Validation`] if fewer than two anchors are requested.
    pub fn new(anchors: usize) -> Result<Self> {
        if anchors < 2 {
            return Err(Error::Validation(format!(
                "a linear regression needs at least 2 anchors, {anchors} requested"
            )));
        }
        Ok(Self {
            anchors,
            fitted: None,
        })
    }

    fn model(&self) -> Result<&RegressionModel> {
        self.fitted.as_ref().ok_or_else(|| not_fitted(Self::NAME))
    }

    /// The fitted calibration line
    ///
    /// # Errors
    /// Returns [`Error::State`] before a successful fit.
    pub fn line(&self) -> Result<Line> {
        Ok(self.model()?.line)
    }
}

impl CalibrationStrategy for NPointLinear {
    fn label(&self) -> String {
        self.fitted.as_ref().map_or_else(
            || Self::NAME.to_owned(),
            |model| label_with_anchors(Self::NAME, &model.anchors),
        )
    }

    fn required_anchors(&self) -> usize {
        self.anchors
    }

    fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    fn fit(&mut self, anchor_stats: &AnchorStats, anchor_refs: &AnchorRefs) -> Result<()> {
        self.fitted = None;
        let anchors =
            collect_anchors(Self::NAME, self.required_anchors(), anchor_stats, anchor_refs)?;
        let raw = anchors.iter().map(|a| a.raw.value).collect::<Vec<_>>();
        let truth = anchors.iter().map(|a| a.reference.value).collect::<Vec<_>>();
        let line = Line::least_squares(&raw, &truth).ok_or_else(|| {
            Error::Fit("all anchors have the same raw mean, the slope is undefined".into())
        })?;
        self.fitted = Some(RegressionModel { anchors, line });
        Ok(())
    }

    fn predict(&self, raw: f64) -> Result<f64> {
        Ok(self.model()?.line.at(raw))
    }

    fn predict_perturbed(&self, raw: f64, parameters: &[f64]) -> Result<f64> {
        self.model()?;
        check_parameter_count(Self::NAME, parameters, 2 * self.anchors)?;
        let (raws, truths) = parameters.split_at(self.anchors);
        let line = Line::least_squares(raws, truths)
            .ok_or_else(|| Error::Fit("perturbed anchors do not determine a line".into()))?;
        Ok(line.at(raw))
    }

    fn model_parameters(&self) -> Result<Vec<ModelParameter>> {
        let model = self.model()?;
        Ok(model
            .anchors
            .iter()
            .map(|a| a.raw)
            .chain(model.anchors.iter().map(|a| a.reference))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::arr1;
    use ndarray_rand::rand::{Rng, SeedableRng};
    use proptest::prelude::*;
    use rand_isaac::Isaac64Rng;

    fn standard(name: &str, true_value: f64, true_uncertainty: f64) -> ReferenceMaterial {
        ReferenceMaterial::new(name, true_value, true_uncertainty, Vec::<String>::new()).unwrap()
    }

    fn raw(mean: f64, sem: f64) -> SampleAggregate {
        SampleAggregate {
            mean,
            sem,
            count: 3,
        }
    }

    fn anchors(entries: &[(&str, f64, f64, f64)]) -> (AnchorStats, AnchorRefs) {
        let stats = entries
            .iter()
            .map(|&(name, raw_mean, _, _)| (name.to_owned(), raw(raw_mean, 0.0)))
            .collect();
        let refs = entries
            .iter()
            .map(|&(name, _, true_value, u)| (name.to_owned(), standard(name, true_value, u)))
            .collect();
        (stats, refs)
    }

    #[test]
    fn offset_shifts_by_difference_to_certified_value() -> Result<()> {
        let (stats, refs) = anchors(&[("STD", 8.0, 10.0, 0.0)]);
        let mut strategy = SinglePointOffset::new();
        strategy.fit(&stats, &refs)?;

        approx::assert_relative_eq!(strategy.offset()?, 2.0);
        approx::assert_relative_eq!(strategy.predict(8.0)?, 10.0);
        assert_eq!(strategy.label(), "SinglePointOffset[STD]");
        Ok(())
    }

    #[test]
    fn two_point_line_matches_hand_calculation() -> Result<()> {
        let (stats, refs) = anchors(&[("A", 10.0, 20.0, 0.1), ("B", 30.0, 60.0, 0.1)]);
        let mut strategy = TwoPointLinear::new();
        strategy.fit(&stats, &refs)?;

        let line = strategy.line()?;
        approx::assert_relative_eq!(line.slope, 2.0);
        approx::assert_relative_eq!(line.intercept, 0.0);
        approx::assert_relative_eq!(strategy.predict(5.0)?, 10.0);
        Ok(())
    }

    #[test]
    fn two_point_recovers_negative_intercept() -> Result<()> {
        let (stats, refs) = anchors(&[("LOW", 10.0, 0.0, 0.1), ("HIGH", 110.0, 100.0, 0.1)]);
        let mut strategy = TwoPointLinear::new();
        strategy.fit(&stats, &refs)?;

        let line = strategy.line()?;
        approx::assert_relative_eq!(line.slope, 1.0);
        approx::assert_relative_eq!(line.intercept, -10.0);
        Ok(())
    }

    #[test]
    fn anchors_are_ordered_by_certified_value() -> Result<()> {
        // Alphabetical order puts the high standard first
        let (stats, refs) = anchors(&[("AAA", 30.0, 60.0, 0.3), ("ZZZ", 10.0, 20.0, 0.2)]);
        let mut strategy = TwoPointLinear::new();
        strategy.fit(&stats, &refs)?;

        let values = strategy
            .model_parameters()?
            .iter()
            .map(|p| p.value)
            .collect::<Vec<_>>();
        assert_eq!(values, vec![10.0, 30.0, 20.0, 60.0]);
        assert_eq!(strategy.label(), "TwoPointLinear[ZZZ, AAA]");
        Ok(())
    }

    #[test]
    fn wrong_anchor_count_is_a_fit_error() {
        let (stats, refs) = anchors(&[("A", 10.0, 20.0, 0.1), ("B", 30.0, 60.0, 0.1)]);
        let mut offset = SinglePointOffset::new();
        assert!(matches!(offset.fit(&stats, &refs), Err(Error::Fit(_))));

        let (stats, refs) = anchors(&[("A", 10.0, 20.0, 0.1)]);
        let mut linear = TwoPointLinear::new();
        assert!(matches!(linear.fit(&stats, &refs), Err(Error::Fit(_))));
        assert!(!linear.is_fitted());
    }

    #[test]
    fn anchors_without_measurements_are_a_fit_error() {
        let (mut stats, refs) = anchors(&[("A", 10.0, 20.0, 0.1), ("B", 30.0, 60.0, 0.1)]);
        stats.remove("B");
        let mut strategy = TwoPointLinear::new();
        assert!(matches!(strategy.fit(&stats, &refs), Err(Error::Fit(_))));
    }

    #[test]
    fn coincident_raw_means_are_a_fit_error() {
        let (stats, refs) = anchors(&[("A", 10.0, 20.0, 0.1), ("B", 10.0, 60.0, 0.1)]);
        let mut strategy = TwoPointLinear::new();
        assert!(matches!(strategy.fit(&stats, &refs), Err(Error::Fit(_))));
        assert!(!strategy.is_fitted());
    }

    #[test]
    fn failed_refit_discards_the_previous_model() -> Result<()> {
        let (stats, refs) = anchors(&[("A", 10.0, 20.0, 0.1), ("B", 30.0, 60.0, 0.1)]);
        let mut strategy = TwoPointLinear::new();
        strategy.fit(&stats, &refs)?;
        assert!(strategy.is_fitted());

        let (stats, refs) = anchors(&[("A", 10.0, 20.0, 0.1)]);
        assert!(strategy.fit(&stats, &refs).is_err());
        assert!(matches!(strategy.predict(1.0), Err(Error::State(_))));
        Ok(())
    }

    #[test]
    fn unfitted_strategies_refuse_to_predict() {
        let strategies: Vec<Box<dyn CalibrationStrategy>> = vec![
            Box::new(SinglePointOffset::new()),
            Box::new(TwoPointLinear::new()),
            Box::new(NPointLinear::new(3).unwrap()),
        ];
        for strategy in &strategies {
            assert!(matches!(strategy.predict(1.0), Err(Error::State(_))));
            assert!(matches!(
                strategy.predict_perturbed(1.0, &[0.0, 0.0]),
                Err(Error::State(_))
            ));
            assert!(matches!(strategy.model_parameters(), Err(Error::State(_))));
            assert!(matches!(
                strategy.apply(arr1(&[1.0, 2.0]).view()),
                Err(Error::State(_))
            ));
        }
    }

    #[test]
    fn perturbed_prediction_at_nominal_parameters_matches_prediction() -> Result<()> {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let (stats, refs) = anchors(&[
            ("A", rng.gen_range(-10.0..0.0), -5.0, 0.1),
            ("B", rng.gen_range(10.0..20.0), 15.0, 0.2),
            ("C", rng.gen_range(30.0..40.0), 35.0, 0.3),
        ]);

        let mut strategy = NPointLinear::new(3)?;
        strategy.fit(&stats, &refs)?;
        let nominal = strategy
            .model_parameters()?
            .iter()
            .map(|p| p.value)
            .collect::<Vec<_>>();

        for _ in 0..10 {
            let x: f64 = rng.gen_range(-50.0..50.0);
            approx::assert_relative_eq!(
                strategy.predict_perturbed(x, &nominal)?,
                strategy.predict(x)?,
                max_relative = 1e-12
            );
        }
        Ok(())
    }

    #[test]
    fn perturbed_prediction_rejects_wrong_parameter_count() -> Result<()> {
        let (stats, refs) = anchors(&[("A", 10.0, 20.0, 0.1), ("B", 30.0, 60.0, 0.1)]);
        let mut strategy = TwoPointLinear::new();
        strategy.fit(&stats, &refs)?;
        assert!(matches!(
            strategy.predict_perturbed(1.0, &[1.0, 2.0]),
            Err(Error::Fit(_))
        ));
        Ok(())
    }

    #[test]
    fn regression_through_two_anchors_equals_two_point_line() -> Result<()> {
        let (stats, refs) = anchors(&[("A", -3.2, -1.8, 0.2), ("B", 176.1, 180.0, 1.0)]);
        let mut two_point = TwoPointLinear::new();
        let mut regression = NPointLinear::new(2)?;
        two_point.fit(&stats, &refs)?;
        regression.fit(&stats, &refs)?;

        approx::assert_relative_eq!(
            two_point.line()?.slope,
            regression.line()?.slope,
            max_relative = 1e-12
        );
        approx::assert_relative_eq!(
            two_point.line()?.intercept,
            regression.line()?.intercept,
            max_relative = 1e-12
        );
        assert_eq!(two_point.model_parameters()?, regression.model_parameters()?);
        Ok(())
    }

    #[test]
    fn regression_recovers_collinear_anchors() -> Result<()> {
        let (stats, refs) = anchors(&[
            ("A", 0.0, 1.0, 0.1),
            ("B", 1.0, 4.0, 0.1),
            ("C", 2.0, 7.0, 0.1),
            ("D", 3.0, 10.0, 0.1),
        ]);
        let mut strategy = NPointLinear::new(4)?;
        strategy.fit(&stats, &refs)?;
        let line = strategy.line()?;
        approx::assert_relative_eq!(line.slope, 3.0, max_relative = 1e-12);
        approx::assert_relative_eq!(line.intercept, 1.0, max_relative = 1e-12);
        assert_eq!(strategy.model_parameters()?.len(), 8);
        Ok(())
    }

    #[test]
    fn regression_needs_two_anchors() {
        assert!(matches!(NPointLinear::new(1), Err(Error::Validation(_))));
    }

    #[test]
    fn apply_leaves_the_input_untouched() -> Result<()> {
        let (stats, refs) = anchors(&[("A", 10.0, 20.0, 0.1), ("B", 30.0, 60.0, 0.1)]);
        let mut strategy = TwoPointLinear::new();
        strategy.fit(&stats, &refs)?;

        let column = arr1(&[1.0, 5.0, 10.0]);
        let corrected = strategy.apply(column.view())?;
        assert_eq!(column, arr1(&[1.0, 5.0, 10.0]));
        for (raw, corrected) in column.iter().zip(corrected.iter()) {
            approx::assert_relative_eq!(*corrected, strategy.predict(*raw)?);
        }
        Ok(())
    }

    #[test]
    fn regression_corrects_columns_along_its_line() -> Result<()> {
        let (stats, refs) = anchors(&[
            ("A", 0.0, 1.0, 0.1),
            ("B", 1.0, 3.0, 0.1),
            ("C", 2.0, 5.0, 0.1),
        ]);
        let mut strategy = NPointLinear::new(3)?;
        strategy.fit(&stats, &refs)?;

        let corrected = strategy.apply(arr1(&[-1.0, 0.5, 4.0]).view())?;
        for (value, expected) in corrected.iter().zip([-1.0, 2.0, 9.0]) {
            approx::assert_abs_diff_eq!(*value, expected, epsilon = 1e-12);
        }
        Ok(())
    }

    proptest! {
        #[test]
        fn offset_prediction_is_a_constant_shift(r in -1e4f64..1e4) {
            let (stats, refs) = anchors(&[("STD", 8.0, 10.0, 0.0)]);
            let mut strategy = SinglePointOffset::new();
            strategy.fit(&stats, &refs).unwrap();
            prop_assert!((strategy.predict(r).unwrap() - (r + 2.0)).abs() < 1e-9);
        }

        #[test]
        fn anchor_listing_order_does_not_change_the_fit(
            raw_a in -50.0f64..0.0,
            raw_b in 10.0f64..60.0,
        ) {
            let (stats, refs) = anchors(&[("X", raw_a, -2.0, 0.2), ("Y", raw_b, 50.0, 0.4)]);
            let (stats_rev, refs_rev) =
                anchors(&[("Y", raw_b, 50.0, 0.4), ("X", raw_a, -2.0, 0.2)]);

            let mut forward = TwoPointLinear::new();
            let mut reverse = TwoPointLinear::new();
            forward.fit(&stats, &refs).unwrap();
            reverse.fit(&stats_rev, &refs_rev).unwrap();
            prop_assert_eq!(
                forward.model_parameters().unwrap(),
                reverse.model_parameters().unwrap()
            );
        }
    }
}
