use crate::config::{Number, EPSILON};
use wide::f32x8;

#[inline]
fn lane(v: &[Number], i: usize) -> f32x8 {
    f32x8::new([
        v[i],
        v[i + 1],
        v[i + 2],
        v[i + 3],
        v[i + 4],
        v[i + 5],
        v[i + 6],
        v[i + 7],
    ])
}

/// Cosine similarity in `[-1, 1]` computed eight lanes at a time.
///
/// Returns `None` when the vectors differ in length and `0.0` when either
/// vector has (near) zero magnitude.
pub fn compute_cosine_similarity_simd(a: &[Number], b: &[Number]) -> Option<Number> {
    if a.len() != b.len() {
        tracing::debug!(left = a.len(), right = b.len(), "vector length mismatch");
        return None;
    }

    let mut dot_product = f32x8::splat(0.0);
    let mut mag_a = f32x8::splat(0.0);
    let mut mag_b = f32x8::splat(0.0);

    let len = a.len();
    let simd_len = len - (len % 8);

    for i in (0..simd_len).step_by(8) {
        let va = lane(a, i);
        let vb = lane(b, i);
        dot_product += va * vb;
        mag_a += va * va;
        mag_b += vb * vb;
    }

    let mut scalar_dot_product = dot_product.reduce_add();
    let mut scalar_mag_a = mag_a.reduce_add();
    let mut scalar_mag_b = mag_b.reduce_add();

    // tail
    for i in simd_len..len {
        scalar_dot_product += a[i] * b[i];
        scalar_mag_a += a[i] * a[i];
        scalar_mag_b += b[i] * b[i];
    }

    let denominator = (scalar_mag_a * scalar_mag_b).sqrt();
    if denominator < EPSILON {
        Some(0.0)
    } else {
        Some((scalar_dot_product / denominator).clamp(-1.0, 1.0))
    }
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
    fn identical_vectors_score_one() {
        let a: Vec<Number> = (0..19).map(|i| i as Number * 0.5 + 1.0).collect();
        let sim = compute_cosine_similarity_simd(&a, &a).unwrap();
        assert!((sim - 1.0).abs() < 1e-5);
    }

    #[test]
    fn orthogonal_and_opposite_vectors() {
        let mut a = vec![0.0; 9];
        let mut b = vec![0.0; 9];
        a[0] = 1.0;
        b[8] = 1.0;
        assert!(compute_cosine_similarity_simd(&a, &b).unwrap().abs() < 1e-6);

        let c: Vec<Number> = a.iter().map(|x| -x).collect();
        assert!((compute_cosine_similarity_simd(&a, &c).unwrap() + 1.0).abs() < 1e-6);
    }

    #[test]
    fn length_mismatch_is_none() {
        assert!(compute_cosine_similarity_simd(&[1.0, 2.0], &[1.0]).is_none());
    }

    #[test]
    fn zero_vector_scores_zero() {
        assert_eq!(compute_cosine_similarity_simd(&[0.0; 8], &[1.0; 8]), Some(0.0));
    }

    #[test]
    fn normalize_produces_unit_length() {
        let mut v = vec![3.0, 4.0];
        normalize_vector(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        normalize_vector(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }
}
