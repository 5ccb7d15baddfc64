//! Distance kernels
//!
//! Squared Euclidean distance is the scan primitive: it orders vectors the
//! same way as the Euclidean distance without paying for a square root per
//! stored vector. Callers see the square-rooted value.
//!
//! | Platform     | ISA      | Width           | Accumulation                    |
//! |--------------|----------|-----------------|---------------------------------|
//! | aarch64      | NEON     | 128-bit (4×f32) | `vfmaq_f32`, `vaddvq_f32`       |
//! | x86_64+AVX2  | AVX2+FMA | 256-bit (8×f32) | `_mm256_fmadd_ps`, `_mm256_sub_ps` |
//! | other        | scalar   | 1×f32           | sequential iterator sum         |
//!
//! The vectorized paths keep 4 or 8 partial sums, so their results differ from
//! the scalar path by ordinary rounding only. Each path is deterministic for
//! identical inputs.

/// A resolved distance kernel. Both slices must have the same length.
pub type DistanceFn = fn(&[f32], &[f32]) -> f32;

// ============================================================================
// aarch64 NEON intrinsics
// ============================================================================

#[cfg(target_arch = "aarch64")]
#[inline(always)]
unsafe fn l2_distance_squared_neon(a: &[f32], b: &[f32]) -> f32 {
    use std::arch::aarch64::*;

    let n = a.len();
    let chunks = n / 4;

    let mut acc = vdupq_n_f32(0.0);
    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    for i in 0..chunks {
        let va = vld1q_f32(a_ptr.add(i * 4));
        let vb = vld1q_f32(b_ptr.add(i * 4));
        let diff = vsubq_f32(va, vb);
        acc = vfmaq_f32(acc, diff, diff);
    }

    let mut sum = vaddvq_f32(acc);
    for i in chunks * 4..n {
        let d = a[i] - b[i];
        sum += d * d;
    }
    sum
}

#[cfg(target_arch = "aarch64")]
fn l2_squared_neon_entry(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vector length mismatch");
    // SAFETY: NEON is part of the aarch64 baseline; lengths are equal.
    unsafe { l2_distance_squared_neon(a, b) }
}

// ============================================================================
// x86_64 AVX2 intrinsics (runtime feature detection)
// ============================================================================

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2,fma")]
#[inline]
unsafe fn horizontal_sum_avx2(acc: std::arch::x86_64::__m256) -> f32 {
    use std::arch::x86_64::*;

    let hi = _mm256_extractf128_ps(acc, 1);
    let lo = _mm256_castps256_ps128(acc);
    let sum128 = _mm_add_ps(lo, hi);
    let shuf = _mm_movehdup_ps(sum128);
    let sums = _mm_add_ps(sum128, shuf);
    let shuf2 = _mm_movehl_ps(sums, sums);
    _mm_cvtss_f32(_mm_add_ss(sums, shuf2))
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2,fma")]
#[inline]
unsafe fn l2_distance_squared_avx2(a: &[f32], b: &[f32]) -> f32 {
    use std::arch::x86_64::*;

    let n = a.len();
    let chunks = n / 8;

    let mut acc = _mm256_setzero_ps();
    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    for i in 0..chunks {
        let va = _mm256_loadu_ps(a_ptr.add(i * 8));
        let vb = _mm256_loadu_ps(b_ptr.add(i * 8));
        let diff = _mm256_sub_ps(va, vb);
        acc = _mm256_fmadd_ps(diff, diff, acc);
    }

    let mut sum = horizontal_sum_avx2(acc);
    for i in chunks * 8..n {
        let d = a[i] - b[i];
        sum += d * d;
    }
    sum
}

#[cfg(target_arch = "x86_64")]
#[inline]
fn has_avx2_fma() -> bool {
    is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma")
}

/// Only handed out by [`select_l2_squared`] after feature detection succeeded.
#[cfg(target_arch = "x86_64")]
fn l2_squared_avx2_entry(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vector length mismatch");
    // SAFETY: avx2+fma were detected before this function pointer escaped.
    unsafe { l2_distance_squared_avx2(a, b) }
}

// ============================================================================
// Scalar reference
// ============================================================================

/// Sequential squared L2 distance, accumulated left to right.
#[inline]
pub fn l2_distance_squared_scalar(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vector length mismatch");
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

// ============================================================================
// Public dispatch
// ============================================================================

/// Resolve the squared-L2 kernel once, so a scan does not re-run feature
/// detection per vector.
///
/// With `vectorized == false` the scalar reference kernel is returned.
pub fn select_l2_squared(vectorized: bool) -> DistanceFn {
    if !vectorized {
        return l2_distance_squared_scalar;
    }

    #[cfg(target_arch = "aarch64")]
    {
        return l2_squared_neon_entry;
    }

    #[cfg(target_arch = "x86_64")]
    {
        if has_avx2_fma() {
            return l2_squared_avx2_entry;
        }
    }

    #[allow(unreachable_code)]
    l2_distance_squared_scalar
}

/// Name of the kernel [`select_l2_squared`] picks on this machine.
pub fn vectorized_backend() -> &'static str {
    #[cfg(target_arch = "aarch64")]
    {
        return "neon";
    }

    #[cfg(target_arch = "x86_64")]
    {
        if has_avx2_fma() {
            return "avx2+fma";
        }
    }

    #[allow(unreachable_code)]
    "scalar"
}

/// Squared L2 (Euclidean) distance, ||a - b||², using the fastest kernel
/// available.
#[inline]
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    select_l2_squared(true)(a, b)
}

/// L2 (Euclidean) distance, ||a - b||. This is the score reported by search.
#[inline]
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    l2_distance_squared(a, b).sqrt()
}
