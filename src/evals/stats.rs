//! Statistics for case verdicts and the meta-analysis stage.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

const Z_95: f64 = 1.96;

/// One-sided `P(X >= k)` for `X ~ Binomial(n, p0)`, by direct summation of
/// the probability mass from `k` to `n` in that order. Each term is
/// `C(n, i) * p0^i * (1 - p0)^(n - i)` with an exact integer coefficient, so
/// results are reproducible to the last bit.
pub fn binomial_tail_p_value(n: u32, k: u32, p0: f64) -> f64 {
    if n == 0 {
        return 1.0;
    }
    let k = k.min(n);
    if p0 <= 0.0 {
        return if k > 0 { 0.0 } else { 1.0 };
    }
    if p0 >= 1.0 {
        return if k < n { 1.0 } else { 0.0 };
    }

    let q0 = 1.0 - p0;
    let mut total = 0.0;
    for i in k..=n {
        let term = match binomial_coefficient(n, i) {
            Some(comb) => comb as f64 * p0.powf(f64::from(i)) * q0.powf(f64::from(n - i)),
            // Coefficient past u128; only very large trial counts get here.
            None => (ln_binomial_coefficient(n, i) + f64::from(i) * p0.ln() + f64::from(n - i) * q0.ln()).exp(),
        };
        total += term;
    }
    total.clamp(0.0, 1.0)
}

/// Exact `C(n, r)`, or `None` when it does not fit in a `u128`.
fn binomial_coefficient(n: u32, r: u32) -> Option<u128> {
    let r = u128::from(r.min(n - r));
    let n = u128::from(n);
    let mut comb: u128 = 1;
    for j in 1..=r {
        // comb * (n - j + 1) is divisible by j; dividing out the gcd first
        // keeps every intermediate no larger than the result.
        let g = gcd(comb, j);
        comb = (comb / g).checked_mul((n - j + 1) / (j / g))?;
    }
    Some(comb)
}

fn ln_binomial_coefficient(n: u32, r: u32) -> f64 {
    let r = r.min(n - r);
    (1..=r)
        .map(|j| f64::from(n - j + 1).ln() - f64::from(j).ln())
        .sum()
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// 95% Wilson score interval for `k` successes out of `n`.
pub fn wilson_interval(k: u32, n: u32) -> (f64, f64) {
    if n == 0 {
        return (0.0, 0.0);
    }
    let n = f64::from(n);
    let phat = f64::from(k) / n;
    let z2 = Z_95 * Z_95;
    let denom = 1.0 + z2 / n;
    let center = phat + z2 / (2.0 * n);
    let margin = Z_95 * ((phat * (1.0 - phat) + z2 / (4.0 * n)) / n).sqrt();
    (((center - margin) / denom).max(0.0), ((center + margin) / denom).min(1.0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaStatus {
    Ok,
    Insufficient,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaAnalysis {
    pub status: MetaStatus,
    pub pooled_estimate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci_low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci_high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measure_type: Option<String>,
}

impl MetaAnalysis {
    fn insufficient() -> Self {
        Self {
            status: MetaStatus::Insufficient,
            pooled_estimate: None,
            ci_low: None,
            ci_high: None,
            k: None,
            measure_type: None,
        }
    }
}

fn numeric(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Inverse-variance fixed-effect pooling. Records without a numeric estimate
/// and a non-zero standard error are unusable; mixing measure types among
/// usable records makes the pool insufficient.
pub fn fixed_effect_meta(effect_sizes: &[Value]) -> MetaAnalysis {
    let mut measure_types = BTreeSet::new();
    let mut weighted = Vec::new();

    for record in effect_sizes {
        let estimate = numeric(record.get("estimate"));
        let se = numeric(record.get("std_error")).filter(|se| *se != 0.0);
        let (Some(estimate), Some(se)) = (estimate, se) else { continue };

        match record.get("measure_type") {
            Some(Value::String(s)) if !s.is_empty() => {
                measure_types.insert(s.clone());
            }
            Some(Value::Null) | Some(Value::String(_)) | None => {}
            Some(other) => {
                measure_types.insert(other.to_string());
            }
        }
        weighted.push((estimate, 1.0 / (se * se)));
    }

    if weighted.is_empty() || measure_types.len() > 1 {
        return MetaAnalysis::insufficient();
    }

    let total_weight: f64 = weighted.iter().map(|(_, w)| w).sum();
    let pooled = weighted.iter().map(|(e, w)| e * w).sum::<f64>() / total_weight;
    let pooled_se = (1.0 / total_weight).sqrt();

    MetaAnalysis {
        status: MetaStatus::Ok,
        pooled_estimate: Some(pooled),
        ci_low: Some(pooled - Z_95 * pooled_se),
        ci_high: Some(pooled + Z_95 * pooled_se),
        k: Some(weighted.len()),
        measure_type: measure_types.into_iter().next(),
    }
}
