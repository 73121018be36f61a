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

//! Polygon <-> mask conversions
//!
//! Polygons are traced along pixel corners, so a traced outline rasterizes back to
//! exactly the same pixels. Rasterization samples pixel centres with an even-odd rule
//! per polygon and unions the polygons.

use ndarray::{Array2, ArrayView2};
use std::collections::BTreeSet;

use super::bbox::normalize;
use super::rle::{mask_to_rle, rle_to_mask, CompressedRle};
use crate::core::{PixanoError, Result};

/// Rasterize flat `[x0, y0, x1, y1, ...]` pixel-coordinate polygons into compressed RLE
pub fn polygons_to_rle(polygons: &[Vec<f64>], height: usize, width: usize) -> Result<CompressedRle> {
    Ok(mask_to_rle(polygons_to_mask(polygons, height, width)?.view()))
}

/// Trace the outer rings of a mask, in coordinates normalized by the mask size
pub fn rle_to_polygons(rle: &CompressedRle) -> Result<Vec<Vec<f64>>> {
    let mask = rle_to_mask(rle)?;
    let (height, width) = mask.dim();
    trace_outlines(mask.view())
        .into_iter()
        .map(|ring| normalize(&ring, height, width))
        .collect()
}

pub fn polygons_to_mask(polygons: &[Vec<f64>], height: usize, width: usize) -> Result<Array2<u8>> {
    let mut mask = Array2::<u8>::zeros((height, width));
    for polygon in polygons {
        if polygon.len() % 2 != 0 {
            return Err(PixanoError::InvalidCell(format!(
                "polygon must have an even number of coordinates, got {}",
                polygon.len()
            )));
        }
        if polygon.iter().any(|v| !v.is_finite()) {
            return Err(PixanoError::InvalidCell("polygon has non-finite coordinates".to_string()));
        }
        // Fewer than three vertices encloses nothing
        if polygon.len() < 6 {
            continue;
        }
        let points: Vec<(f64, f64)> = polygon.chunks_exact(2).map(|p| (p[0], p[1])).collect();
        fill_polygon(&mut mask, &points);
    }
    Ok(mask)
}

fn fill_polygon(mask: &mut Array2<u8>, points: &[(f64, f64)]) {
    let (height, width) = mask.dim();
    let n = points.len();
    let mut crossings = Vec::with_capacity(n);

    for y in 0..height {
        let yc = y as f64 + 0.5;
        crossings.clear();
        for i in 0..n {
            let (x0, y0) = points[i];
            let (x1, y1) = points[(i + 1) % n];
            if (y0 <= yc && y1 > yc) || (y1 <= yc && y0 > yc) {
                crossings.push(x0 + (yc - y0) * (x1 - x0) / (y1 - y0));
            }
        }
        crossings.sort_by(|a, b| a.total_cmp(b));

        for span in crossings.chunks_exact(2) {
            // Pixel x is inside when its centre x + 0.5 lies in [start, end)
            let start = (span[0] - 0.5).ceil().max(0.0);
            let end = ((span[1] - 0.5).ceil() - 1.0).min(width as f64 - 1.0);
            if end < start {
                continue;
            }
            for x in start as usize..=end as usize {
                mask[[y, x]] = 1;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Dir {
    East,
    South,
    West,
    North,
}

impl Dir {
    fn step(self) -> (i64, i64) {
        match self {
            Dir::East => (1, 0),
            Dir::South => (0, 1),
            Dir::West => (-1, 0),
            Dir::North => (0, -1),
        }
    }

    /// Clockwise on screen (y grows downward)
    fn right(self) -> Dir {
        match self {
            Dir::East => Dir::South,
            Dir::South => Dir::West,
            Dir::West => Dir::North,
            Dir::North => Dir::East,
        }
    }

    fn left(self) -> Dir {
        self.right().right().right()
    }
}

/// Directed boundary edge starting at pixel corner `(x, y)`; ordered row-major
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Edge {
    y: i64,
    x: i64,
    dir: Dir,
}

impl Edge {
    fn end(&self) -> (i64, i64) {
        let (dx, dy) = self.dir.step();
        (self.x + dx, self.y + dy)
    }
}

/// Outer rings as flat pixel-corner coordinate lists
pub(crate) fn trace_outlines(mask: ArrayView2<u8>) -> Vec<Vec<f64>> {
    let (height, width) = mask.dim();
    let set = |x: i64, y: i64| -> bool {
        x >= 0 && y >= 0 && (x as usize) < width && (y as usize) < height && mask[[y as usize, x as usize]] != 0
    };

    let mut edges = BTreeSet::new();
    for ((y, x), &value) in mask.indexed_iter() {
        if value == 0 {
            continue;
        }
        let (x, y) = (x as i64, y as i64);
        if !set(x, y - 1) {
            edges.insert(Edge { y, x, dir: Dir::East });
        }
        if !set(x + 1, y) {
            edges.insert(Edge { y, x: x + 1, dir: Dir::South });
        }
        if !set(x, y + 1) {
            edges.insert(Edge { y: y + 1, x: x + 1, dir: Dir::West });
        }
        if !set(x - 1, y) {
            edges.insert(Edge { y: y + 1, x, dir: Dir::North });
        }
    }

    let mut rings = Vec::new();
    while let Some(start) = edges.pop_first() {
        let mut path = vec![start];
        let mut current = start;

        loop {
            let (x, y) = current.end();
            // Right turn first keeps diagonal neighbours in separate rings
            let candidates = [current.dir.right(), current.dir, current.dir.left()];
            let mut next = None;
            let mut closed = false;
            for dir in candidates {
                let edge = Edge { y, x, dir };
                if edge == start {
                    closed = true;
                    break;
                }
                if edges.remove(&edge) {
                    next = Some(edge);
                    break;
                }
            }
            match next {
                Some(edge) if !closed => {
                    path.push(edge);
                    current = edge;
                }
                _ => break,
            }
        }

        // Keep only direction changes
        let corners: Vec<&Edge> = path
            .iter()
            .enumerate()
            .filter(|(i, edge)| {
                let previous = &path[(i + path.len() - 1) % path.len()];
                previous.dir != edge.dir
            })
            .map(|(_, edge)| edge)
            .collect();

        if signed_area(&corners) > 0 {
            rings.push(
                corners
                    .iter()
                    .flat_map(|edge| [edge.x as f64, edge.y as f64])
                    .collect(),
            );
        }
    }
    rings
}

fn signed_area(corners: &[&Edge]) -> i64 {
    let n = corners.len();
    (0..n)
        .map(|i| {
            let a = corners[i];
            let b = corners[(i + 1) % n];
            a.x * b.y - b.x * a.y
        })
        .sum()
}
