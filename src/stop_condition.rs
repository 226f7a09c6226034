use rug::Float;
use statrs::function::erf::erf;
use std::collections::VecDeque;

/// Least-squares line through `(0, y0), (1, y1), ...` with the sampling variance of its slope.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlopeFit {
    pub slope: f64,
    pub intercept: f64,
    pub slope_variance: f64,
}

impl SlopeFit {
    /// Needs at least 3 points (one residual degree of freedom).
    pub fn new(series: &[f64]) -> Option<SlopeFit> {
        let len = series.len();
        if len < 3 {
            return None;
        }
        let n = len as f64;
        // x is 0..n, so its mean and spread are closed form
        let x_mean = (n - 1.0) / 2.0;
        let sxx = (n * n * n - n) / 12.0;
        let y_mean = series.iter().sum::<f64>() / n;

        let sxy: f64 = series
            .iter()
            .enumerate()
            .map(|(x, y)| (x as f64 - x_mean) * (y - y_mean))
            .sum();
        let slope = sxy / sxx;
        let intercept = y_mean - slope * x_mean;

        let sse: f64 = series
            .iter()
            .enumerate()
            .map(|(x, y)| {
                let r = y - (intercept + slope * x as f64);
                r * r
            })
            .sum();

        Some(SlopeFit {
            slope,
            intercept,
            slope_variance: sse / (n - 2.0) / sxx,
        })
    }
}

/// Probability that the series has a negative slope. 0.5 for fewer than 3 points.
pub fn series_is_trending_down(series: &[f64]) -> f64 {
    let (m, var) = match SlopeFit::new(series) {
        Some(fit) => (fit.slope, fit.slope_variance),
        None => return 0.5,
    };
    if var == 0.0 {
        return if m < 0.0 { 1.0 } else { 0.0 };
    }

    // P(slope < 0) where slope ~ Gaussian(m, var)
    0.5 * (1.0 + erf((0.0 - m) / (var.sqrt() * (2.0_f64).sqrt())))
}

/// Log of `series_is_trending_down`, usable when the probability underflows f64.
pub fn series_is_trending_down_log(series: &[f64]) -> f64 {
    let (m, var) = match SlopeFit::new(series) {
        Some(fit) => (fit.slope, fit.slope_variance),
        None => return (0.5_f64).ln(),
    };
    if var == 0.0 {
        return if m < 0.0 { 0.0 } else { std::f64::NEG_INFINITY };
    }
    // log(gaussian_cdf(x)) for very large |x| goes through GMP's extended precision and only
    // takes the log at the end.
    let m: Float = Float::with_val(10000, m);
    let var: Float = Float::with_val(10000, var);
    let half: Float = Float::with_val(10000, 0.5);
    let one: Float = Float::with_val(10000, 1.0);
    let two: Float = Float::with_val(10000, 2.0);

    let p = (half * (one + ((-m) / (var.sqrt() * two.sqrt())).erf())).ln();
    p.to_f64()
}

/// Sliding window over a loss curve that reports when the curve stops going down.
#[derive(Clone, Debug)]
pub struct PlateauDetector {
    window: usize,
    threshold: f64,
    history: VecDeque<f64>,
}

impl PlateauDetector {
    /// `window` values are kept; the curve is considered flat once the probability of it
    /// trending down drops below `threshold`.
    pub fn new(window: usize, threshold: f64) -> Self {
        PlateauDetector {
            window: window.max(3),
            threshold,
            history: VecDeque::with_capacity(window.max(3)),
        }
    }

    /// Records a value. Returns the current probability of a downward trend, or `None` until the
    /// window has filled up.
    pub fn push(&mut self, value: f64) -> Option<f64> {
        self.history.push_back(value);
        while self.history.len() > self.window {
            self.history.pop_front();
        }
        if self.history.len() < self.window {
            return None;
        }
        Some(series_is_trending_down_log(self.history.make_contiguous()).exp())
    }

    /// Records a value and tells whether the curve has flattened out.
    pub fn push_and_check(&mut self, value: f64) -> bool {
        match self.push(value) {
            Some(p) => p < self.threshold,
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn noisy_line(slope: f64, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..4000)
            .map(|x| rng.random_range(0.0..4.0) + (x as f64) * slope)
            .collect()
    }

    #[test]
    fn simple_up_line() {
        let result = series_is_trending_down(&noisy_line(0.01, 1));
        assert!(result < 0.00001);
        assert!(result >= 0.0);
    }

    #[test]
    fn simple_down_line() {
        let result = series_is_trending_down(&noisy_line(-0.01, 2));
        assert!(result > 0.99999);
        assert!(result <= 1.0);
    }

    #[test]
    fn log_and_normal_match_for_small_values() {
        let points = noisy_line(0.0, 3);
        let result = series_is_trending_down(&points);
        let result2 = series_is_trending_down_log(&points).exp();
        assert!((result - result2).abs() <= 0.01);
    }

    #[test]
    fn log_matches_for_extremely_unlikely_series() {
        let result2 = series_is_trending_down_log(&noisy_line(0.01, 4));
        assert!(result2 < -10000.0);
    }

    #[test]
    fn short_series_are_undecided() {
        assert_eq!(series_is_trending_down(&[1.0, 0.0]), 0.5);
        assert!((series_is_trending_down_log(&[]) - 0.5_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn exact_lines_are_certain() {
        assert_eq!(series_is_trending_down(&[3.0, 2.0, 1.0, 0.0]), 1.0);
        assert_eq!(series_is_trending_down(&[0.0, 1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn slope_fit_by_hand() {
        // y = 0, 2, 1: slope 0.5, residuals -0.5, 1, -0.5
        let fit = SlopeFit::new(&[0.0, 2.0, 1.0]).unwrap();
        assert!((fit.slope - 0.5).abs() < 1e-12);
        assert!((fit.intercept - 0.5).abs() < 1e-12);
        assert!((fit.slope_variance - 0.75).abs() < 1e-12);

        let exact = SlopeFit::new(&[2.0, 1.5, 1.0, 0.5]).unwrap();
        assert!((exact.slope + 0.5).abs() < 1e-12);
        assert_eq!(exact.slope_variance, 0.0);

        assert!(SlopeFit::new(&[1.0, 2.0]).is_none());
    }

    #[test]
    fn detector_waits_for_a_full_window() {
        let mut detector = PlateauDetector::new(50, 0.5);
        for idx in 0..49 {
            assert!(detector.push(1.0 - idx as f64 * 0.01).is_none());
        }
        assert!(detector.push(0.5).is_some());
    }

    #[test]
    fn detector_flags_a_rising_curve() {
        let mut detector = PlateauDetector::new(200, 0.05);
        let mut flagged = false;
        for value in noisy_line(-0.01, 5).into_iter().take(200) {
            flagged = detector.push_and_check(value);
        }
        assert!(!flagged);

        detector.clear();
        for value in noisy_line(0.01, 6).into_iter().take(200) {
            flagged = detector.push_and_check(value);
        }
        assert!(flagged);
    }
}
