/*
 * Copyright 2025 Vijaykumar Singh
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Euclidean (L2) distance for embedding search

use std::cmp::Ordering;

use crate::core::natural_key;

/// Distance between two vectors; lower values are closer
pub trait DistanceCompute: Send + Sync {
    fn distance(&self, a: &[f32], b: &[f32]) -> f32;
}

/// Euclidean distance, AVX2 accelerated when the CPU supports it
pub struct EuclideanDistance {
    use_simd: bool,
}

impl EuclideanDistance {
    pub fn new(use_simd: bool) -> Self {
        Self { use_simd }
    }

    #[inline(always)]
    fn euclidean_distance_simd(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());

        #[cfg(target_arch = "x86_64")]
        {
            if self.use_simd
                && a.len() >= 8
                && is_x86_feature_detected!("avx2")
                && is_x86_feature_detected!("fma")
            {
                // SAFETY: the required CPU features were detected above
                return unsafe { euclidean_distance_avx(a, b) };
            }
        }
        euclidean_distance_scalar(a, b)
    }
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2,fma")]
unsafe fn euclidean_distance_avx(a: &[f32], b: &[f32]) -> f32 {
    use std::arch::x86_64::*;

    let len = a.len().min(b.len());
    let chunks = len / 8;
    let mut sum = _mm256_setzero_ps();

    // Process 8 elements at a time
    for i in 0..chunks {
        let offset = i * 8;
        let va = _mm256_loadu_ps(a.as_ptr().add(offset));
        let vb = _mm256_loadu_ps(b.as_ptr().add(offset));
        let diff = _mm256_sub_ps(va, vb);
        sum = _mm256_fmadd_ps(diff, diff, sum);
    }

    let mut lanes = [0.0f32; 8];
    _mm256_storeu_ps(lanes.as_mut_ptr(), sum);
    let mut squared_distance: f32 = lanes.iter().sum();

    // Handle remainder
    for i in (chunks * 8)..len {
        let diff = a[i] - b[i];
        squared_distance += diff * diff;
    }

    squared_distance.sqrt()
}

fn euclidean_distance_scalar(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum::<f32>()
        .sqrt()
}

impl DistanceCompute for EuclideanDistance {
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        self.euclidean_distance_simd(a, b)
    }
}

/// Order by ascending distance, ties broken by `(len(id), id)`
pub fn compare_ranked(a: &(String, f32), b: &(String, f32)) -> Ordering {
    a.1.total_cmp(&b.1)
        .then_with(|| natural_key(&a.0).cmp(&natural_key(&b.0)))
}

/// The `k` candidates closest to `query`
pub fn nearest<'a, I>(computer: &dyn DistanceCompute, query: &[f32], candidates: I, k: usize) -> Vec<(String, f32)>
where
    I: IntoIterator<Item = (&'a str, &'a [f32])>,
{
    let mut ranked: Vec<(String, f32)> = candidates
        .into_iter()
        .map(|(id, vector)| (id.to_string(), computer.distance(query, vector)))
        .collect();
    ranked.sort_by(compare_ranked);
    ranked.truncate(k);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance() {
        let a = vec![0.0, 0.0];
        let b = vec![3.0, 4.0];

        let distance = EuclideanDistance::new(false);
        assert!((distance.distance(&a, &b) - 5.0).abs() < 1e-6); // 3-4-5 triangle
    }

    #[test]
    fn test_simd_matches_scalar() {
        let a: Vec<f32> = (0..19).map(|i| i as f32 * 0.5).collect();
        let b: Vec<f32> = (0..19).map(|i| (i as f32).sin()).collect();

        let simd = EuclideanDistance::new(true).distance(&a, &b);
        let scalar = EuclideanDistance::new(false).distance(&a, &b);
        assert!((simd - scalar).abs() < 1e-4);
    }

    #[test]
    fn test_nearest_breaks_ties_naturally() {
        let vectors = [
            ("10", vec![1.0f32, 0.0]),
            ("2", vec![1.0, 0.0]),
            ("1", vec![5.0, 0.0]),
            ("3", vec![0.0, 0.0]),
        ];
        let computer = EuclideanDistance::new(true);
        let ranked = nearest(
            &computer,
            &[0.0, 0.0],
            vectors.iter().map(|(id, v)| (*id, v.as_slice())),
            3,
        );
        let ids: Vec<&str> = ranked.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["3", "2", "10"]);
    }
}
