//! Binary morphology for land-mask cleanup
//!
//! Operations run strictly in the configured order. Erosion and dilation
//! use a symmetric 3x3 structuring element and treat pixels outside the
//! grid as `false`, so erosion also works inward from the image border.

use crate::types::Raster;
use ndarray::{s, Array2, Zip};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One cleanup step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MorphOp {
    /// Erosion then dilation: removes land speckles inside water
    Open(usize),
    /// Dilation then erosion: removes water speckles inside land
    Close(usize),
    /// Water not connected to the border (8-connectivity) becomes land
    FillHoles,
    /// Grows land outward, buffering the coastline
    Dilate(usize),
}

impl MorphOp {
    /// Cleanup for masks classified from raw land-cover codes
    pub fn coarse_classification() -> Vec<MorphOp> {
        vec![MorphOp::Open(1), MorphOp::Close(2), MorphOp::FillHoles]
    }

    /// Cleanup and coastline buffering for pre-binarized masks
    pub fn coastline_buffer() -> Vec<MorphOp> {
        vec![MorphOp::Close(1), MorphOp::FillHoles, MorphOp::Dilate(2)]
    }
}

/// Shape of the 3x3 structuring element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuringElement {
    /// Centre plus 4-neighbours
    #[default]
    Cross,
    /// Full 3x3 block
    Square,
}

impl StructuringElement {
    fn offsets(&self) -> Vec<(isize, isize)> {
        let mut offsets = Vec::with_capacity(9);
        for dr in -1isize..=1 {
            for dc in -1isize..=1 {
                if *self == StructuringElement::Cross && dr != 0 && dc != 0 {
                    continue;
                }
                offsets.push((dr, dc));
            }
        }
        offsets
    }
}

/// Source start, destination start and length for shifting an axis of
/// `size` pixels by `offset`
#[inline]
fn shift_range(offset: isize, size: usize) -> (usize, usize, usize) {
    let magnitude = offset.unsigned_abs().min(size);
    let len = size - magnitude;
    if offset >= 0 {
        (0, magnitude, len)
    } else {
        (magnitude, 0, len)
    }
}

/// `mask` shifted by (dr, dc), with `fill` where no source pixel exists
fn shifted(mask: &Array2<bool>, dr: isize, dc: isize, fill: bool) -> Array2<bool> {
    let (rows, cols) = mask.dim();
    let (src_r, dst_r, h) = shift_range(dr, rows);
    let (src_c, dst_c, w) = shift_range(dc, cols);
    let mut out = Array2::from_elem((rows, cols), fill);
    if h > 0 && w > 0 {
        out.slice_mut(s![dst_r..dst_r + h, dst_c..dst_c + w])
            .assign(&mask.slice(s![src_r..src_r + h, src_c..src_c + w]));
    }
    out
}

/// Binary dilation, repeated `iterations` times
pub fn dilate(mask: &Array2<bool>, element: StructuringElement, iterations: usize) -> Array2<bool> {
    let offsets = element.offsets();
    let mut current = mask.clone();
    for _ in 0..iterations {
        let mut next = Array2::from_elem(current.dim(), false);
        for &(dr, dc) in &offsets {
            let moved = shifted(&current, dr, dc, false);
            Zip::from(&mut next).and(&moved).for_each(|n, &m| *n |= m);
        }
        current = next;
    }
    current
}

/// Binary erosion, repeated `iterations` times
pub fn erode(mask: &Array2<bool>, element: StructuringElement, iterations: usize) -> Array2<bool> {
    let offsets = element.offsets();
    let mut current = mask.clone();
    for _ in 0..iterations {
        let mut next = Array2::from_elem(current.dim(), true);
        for &(dr, dc) in &offsets {
            let moved = shifted(&current, dr, dc, false);
            Zip::from(&mut next).and(&moved).for_each(|n, &m| *n &= m);
        }
        current = next;
    }
    current
}

pub fn open(mask: &Array2<bool>, element: StructuringElement, iterations: usize) -> Array2<bool> {
    dilate(&erode(mask, element, iterations), element, iterations)
}

pub fn close(mask: &Array2<bool>, element: StructuringElement, iterations: usize) -> Array2<bool> {
    erode(&dilate(mask, element, iterations), element, iterations)
}

/// Flood water (`false`) from the border with 8-connectivity; any water
/// the flood cannot reach is enclosed and becomes land.
pub fn fill_holes(mask: &Array2<bool>) -> Array2<bool> {
    let (rows, cols) = mask.dim();
    if rows == 0 || cols == 0 {
        return mask.clone();
    }
    let mut reached = Array2::from_elem((rows, cols), false);
    let mut queue = VecDeque::new();

    let seed = |r: usize, c: usize, reached: &mut Array2<bool>, queue: &mut VecDeque<(usize, usize)>| {
        if !mask[[r, c]] && !reached[[r, c]] {
            reached[[r, c]] = true;
            queue.push_back((r, c));
        }
    };
    for c in 0..cols {
        seed(0, c, &mut reached, &mut queue);
        seed(rows - 1, c, &mut reached, &mut queue);
    }
    for r in 0..rows {
        seed(r, 0, &mut reached, &mut queue);
        seed(r, cols - 1, &mut reached, &mut queue);
    }

    while let Some((r, c)) = queue.pop_front() {
        for dr in -1isize..=1 {
            for dc in -1isize..=1 {
                if dr == 0 && dc == 0 {
                    continue;
                }
                let nr = r as isize + dr;
                let nc = c as isize + dc;
                if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                    continue;
                }
                let (nr, nc) = (nr as usize, nc as usize);
                if !mask[[nr, nc]] && !reached[[nr, nc]] {
                    reached[[nr, nc]] = true;
                    queue.push_back((nr, nc));
                }
            }
        }
    }

    Zip::from(mask).and(&reached).map_collect(|&m, &open_water| m || !open_water)
}

/// Applies an ordered list of [`MorphOp`]s to a land mask
#[derive(Debug, Clone, PartialEq)]
pub struct MorphologicalCleaner {
    ops: Vec<MorphOp>,
    element: StructuringElement,
}

impl MorphologicalCleaner {
    pub fn new(ops: Vec<MorphOp>) -> Self {
        Self { ops, element: StructuringElement::default() }
    }

    pub fn with_element(mut self, element: StructuringElement) -> Self {
        self.element = element;
        self
    }

    pub fn ops(&self) -> &[MorphOp] {
        &self.ops
    }

    pub fn clean(&self, mask: &Raster<bool>) -> Raster<bool> {
        Raster {
            data: self.clean_array(&mask.data),
            grid: mask.grid.clone(),
            nodata: None,
        }
    }

    /// Run the operations on a bare array
    pub fn clean_array(&self, mask: &Array2<bool>) -> Array2<bool> {
        let mut data = mask.clone();
        if data.is_empty() {
            return data;
        }

        for op in &self.ops {
            let before = data.iter().filter(|&&m| m).count();
            data = match *op {
                MorphOp::Open(n) => open(&data, self.element, n),
                MorphOp::Close(n) => close(&data, self.element, n),
                MorphOp::FillHoles => fill_holes(&data),
                MorphOp::Dilate(n) => dilate(&data, self.element, n),
            };
            let after = data.iter().filter(|&&m| m).count();
            log::debug!("{:?}: land pixels {} -> {}", op, before, after);
        }
        data
    }
}
