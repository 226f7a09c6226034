#[inline]
pub fn softmax(vec: &mut [f64]) {
    if vec.is_empty() {
        return;
    }
    let max_value = max(vec);

    let mut denominator = 0.0;
    for value in vec.iter_mut() {
        let v = (*value - max_value).exp();
        denominator += v;
        *value = v;
    }

    for value in vec.iter_mut() {
        *value /= denominator;
    }
}

/// In-place log-softmax. Stable for large logits.
#[inline]
pub fn log_softmax(vec: &mut [f64]) {
    if vec.is_empty() {
        return;
    }
    let lse = log_sum_exp(vec);
    for value in vec.iter_mut() {
        *value -= lse;
    }
}

#[inline]
pub fn log_sum_exp(vec: &[f64]) -> f64 {
    let max_value = max(vec);
    let mut sum = 0.0;
    for value in vec.iter() {
        sum += (*value - max_value).exp();
    }
    max_value + sum.ln()
}

/// `-log softmax(logits)[target]`
#[inline]
pub fn cross_entropy(logits: &[f64], target: usize) -> f64 {
    log_sum_exp(logits) - logits[target]
}

/// Index of the largest value. Ties go to the lowest index.
#[inline]
pub fn argmax(vec: &[f64]) -> usize {
    let mut best = 0;
    for idx in 1..vec.len() {
        if vec[idx] > vec[best] {
            best = idx;
        }
    }
    best
}

#[inline]
fn max(vec: &[f64]) -> f64 {
    let mut max_value: f64 = vec[0];
    for v in vec[1..].iter() {
        if *v > max_value {
            max_value = *v;
        }
    }
    max_value
}
