use crate::config::{Number, EPSILON};
use wide::f32x8;

const LANES: usize = 8;

/// Cosine similarity in `[-1, 1]`. Returns `None` when the lengths differ and
/// `0.0` when either vector has no magnitude.
pub fn cosine_similarity(a: &[Number], b: &[Number]) -> Option<Number> {
    if a.len() != b.len() {
        return None;
    }

    let mut dot = f32x8::splat(0.0);
    let mut mag_a = f32x8::splat(0.0);
    let mut mag_b = f32x8::splat(0.0);

    let a_lanes = a.chunks_exact(LANES);
    let b_lanes = b.chunks_exact(LANES);
    let (a_rest, b_rest) = (a_lanes.remainder(), b_lanes.remainder());

    for (ca, cb) in a_lanes.zip(b_lanes) {
        let va = f32x8::from(<[Number; LANES]>::try_from(ca).unwrap_or_default());
        let vb = f32x8::from(<[Number; LANES]>::try_from(cb).unwrap_or_default());
        dot += va * vb;
        mag_a += va * va;
        mag_b += vb * vb;
    }

    let mut dot = dot.reduce_add();
    let mut mag_a = mag_a.reduce_add();
    let mut mag_b = mag_b.reduce_add();
    for (&x, &y) in a_rest.iter().zip(b_rest) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    let denominator = (mag_a * mag_b).sqrt();
    if denominator < EPSILON {
        Some(0.0)
    } else {
        Some((dot / denominator).clamp(-1.0, 1.0))
    }
}

pub fn dot(a: &[Number], b: &[Number]) -> Number {
    a.iter().zip(b).map(|(&x, &y)| x * y).sum()
}

pub fn normalize_vector(vector: &mut [Number]) {
    let magnitude: Number = vector.iter().map(|&x| x * x).sum::<Number>().sqrt();
    if magnitude > EPSILON {
        for x in vector.iter_mut() {
            *x /= magnitude;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a: Vec<Number> = (0..19).map(|i| i as Number).collect();
        assert!((cosine_similarity(&a, &a).unwrap() - 1.0).abs() < 1e-5);

        let neg: Vec<Number> = a.iter().map(|x| -x).collect();
        assert!((cosine_similarity(&a, &neg).unwrap() + 1.0).abs() < 1e-5);

        let x = [1.0, 0.0, 0.0];
        let y = [0.0, 1.0, 0.0];
        assert!(cosine_similarity(&x, &y).unwrap().abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), None);
        assert_eq!(cosine_similarity(&[0.0; 9], &[1.0; 9]), Some(0.0));
    }

    #[test]
    fn test_normalize_vector() {
        let mut v = vec![3.0, 4.0];
        normalize_vector(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert!((dot(&v, &v) - 1.0).abs() < 1e-6);

        let mut zero = vec![0.0; 4];
        normalize_vector(&mut zero);
        assert_eq!(zero, vec![0.0; 4]);
    }
}
