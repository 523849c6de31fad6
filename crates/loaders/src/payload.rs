//! Weighted-payload encoding: a non-negative unit-sum vector becomes a
//! string of `token|weight` pairs whose integer weights sum exactly to the
//! payload scale. The engine's payload functions operate on these strings.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Scales `v` to integers summing exactly to `scale`.
///
/// Each coordinate is floored to `v_i * scale`; the deficit left by the
/// flooring is then repaid one unit at a time to uniformly random nonzero
/// coordinates, so every coordinate that was rounded down has a chance of
/// being bumped back up and the ordering of the largest coordinates is
/// preserved.
pub fn sum_up_to(v: &[f64], scale: u64, rng: &mut SmallRng) -> Vec<u64> {
    let mut x: Vec<u64> = v
        .iter()
        .map(|p| (p * scale as f64).floor().max(0.0) as u64)
        .collect();

    let mut candidates: Vec<usize> = (0..x.len()).filter(|&i| x[i] > 0).collect();
    if candidates.is_empty() {
        // Every coordinate floored to zero; fall back to the coordinates
        // with any mass at all so the loop can terminate.
        candidates = (0..v.len()).filter(|&i| v[i] > 0.0).collect();
    }
    if candidates.is_empty() {
        return x;
    }

    let mut total: u64 = x.iter().sum();
    while total < scale {
        let idx = candidates[rng.gen_range(0..candidates.len())];
        x[idx] += 1;
        total += 1;
    }
    x
}

/// Renders integer weights as `label|weight` pairs, space-separated, zero
/// entries omitted, no trailing space.
pub fn weighted_payload<F>(weights: &[u64], label: F) -> String
where
    F: Fn(usize) -> String,
{
    let mut out = String::new();
    for (idx, &w) in weights.iter().enumerate() {
        if w == 0 {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&label(idx));
        out.push('|');
        out.push_str(&w.to_string());
    }
    out
}

/// Encodes one distribution with a deterministic per-row seed, so repeated
/// ingestions of the same model produce identical payloads.
pub fn encode_distribution<F>(v: &[f64], scale: u64, seed: u64, label: F) -> String
where
    F: Fn(usize) -> String,
{
    let mut rng = SmallRng::seed_from_u64(seed);
    weighted_payload(&sum_up_to(v, scale, &mut rng), label)
}

/// Splits a payload string back into `(token, weight)` pairs.
pub fn parse_payload(s: &str) -> Vec<(String, u64)> {
    s.split_whitespace()
        .filter_map(|pair| {
            let (token, weight) = pair.rsplit_once('|')?;
            Some((token.to_string(), weight.parse().ok()?))
        })
        .collect()
}

/// Label for topic tokens: `t0`, `t1`, ...
pub fn topic_token(idx: usize) -> String {
    format!("t{idx}")
}

#[cfg(test)]
mod test {
    use super::*;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(7)
    }

    #[test]
    fn exact_thirds_need_no_bump() {
        let x = sum_up_to(&[0.333, 0.333, 0.334], 1000, &mut rng());
        assert_eq!(x.iter().sum::<u64>(), 1000);
        assert_eq!(x.iter().filter(|&&w| w == 334).count(), 1);
        assert_eq!(x, vec![333, 333, 334]);
    }

    #[test]
    fn flooring_deficit_is_repaid() {
        let x = sum_up_to(&[0.5005, 0.4995], 1000, &mut rng());
        assert_eq!(x.iter().sum::<u64>(), 1000);
        assert!(x[0] >= 500 && x[1] >= 499);
    }

    #[test]
    fn zero_entries_are_omitted_from_the_payload() {
        let s = encode_distribution(&[0.999, 0.001, 0.0], 1000, 0, topic_token);
        assert_eq!(s, "t0|999 t1|1");
        assert!(!s.ends_with(' '));
    }

    #[test]
    fn encoding_is_deterministic_per_seed() {
        let v = [0.2501, 0.2501, 0.2501, 0.2497];
        let a = encode_distribution(&v, 1000, 42, topic_token);
        let b = encode_distribution(&v, 1000, 42, topic_token);
        assert_eq!(a, b);
    }

    #[test]
    fn tiny_coordinates_still_terminate() {
        // All coordinates floor to zero at this scale.
        let v = vec![1.0 / 2048.0; 2048];
        let x = sum_up_to(&v, 1000, &mut rng());
        assert_eq!(x.iter().sum::<u64>(), 1000);
    }

    #[test]
    fn payload_round_trips() {
        let s = encode_distribution(&[0.25, 0.25, 0.5], 1000, 3, topic_token);
        let pairs = parse_payload(&s);
        assert_eq!(pairs.iter().map(|(_, w)| w).sum::<u64>(), 1000);
        assert_eq!(pairs[0].0, "t0");
    }
}
