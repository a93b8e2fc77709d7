// 该文件是 DexiNed Edge （边缘检测演示） 项目的一部分。
// src/model/postprocess.rs - 输出后处理
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

//! DexiNed 输出后处理
//!
//! 每个输出头依次经过：去掉 batch/channel 维度、sigmoid、min-max 归一化到
//! `[0, 255]`、双线性缩放回原图尺寸。融合图取选定的输出头，平均图是所有
//! 输出头的逐像素均值（截断取整）。

use image::{GrayImage, Luma, imageops::FilterType};
use ndarray::{Array2, ArrayD, Ix2};
use thiserror::Error;
use tracing::debug;

use crate::model::{EdgeMaps, FusedHead};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PostprocessError {
  #[error("模型没有任何输出")]
  EmptyOutput,
  #[error("第 {index} 个输出形状无法作为图像: {shape:?}")]
  ShapeMismatch { index: usize, shape: Vec<usize> },
  #[error("融合输出下标 {index} 越界，共 {heads} 个输出")]
  FusedHeadOutOfRange { index: usize, heads: usize },
}

pub fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// `[1, 1, H, W]` 的张量去掉前两维；其余形状原样返回，要求已经是二维
pub fn spatial_map(index: usize, tensor: &ArrayD<f32>) -> Result<Array2<f32>, PostprocessError> {
  let shape = tensor.shape();
  let mismatch = || PostprocessError::ShapeMismatch {
    index,
    shape: shape.to_vec(),
  };

  let map = if shape.len() == 4 && shape[0] == 1 && shape[1] == 1 {
    tensor
      .to_shape((shape[2], shape[3]))
      .map_err(|_| mismatch())?
      .to_owned()
  } else {
    tensor
      .view()
      .into_dimensionality::<Ix2>()
      .map_err(|_| mismatch())?
      .to_owned()
  };

  if map.is_empty() {
    return Err(mismatch());
  }
  Ok(map)
}

/// 线性拉伸到 `[0, 255]` 并四舍五入为 `u8`；常数输入得到全零
pub fn min_max_normalize(map: &Array2<f32>) -> GrayImage {
  let (rows, cols) = map.dim();
  let (min, max) = map
    .iter()
    .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
      (lo.min(v), hi.max(v))
    });

  let range = f64::from(max) - f64::from(min);
  let scale = if range > f64::EPSILON { 255.0 / range } else { 0.0 };
  let shift = -f64::from(min) * scale;

  GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
    let v = f64::from(map[[y as usize, x as usize]]) * scale + shift;
    Luma([v.round_ties_even().clamp(0.0, 255.0) as u8])
  })
}

pub fn resize_map(map: &GrayImage, width: u32, height: u32) -> GrayImage {
  if map.dimensions() == (width, height) {
    return map.clone();
  }
  image::imageops::resize(map, width, height, FilterType::Triangle)
}

/// 把模型的全部输出转换为融合图和平均图
pub fn postprocess(
  outputs: &[ArrayD<f32>],
  height: u32,
  width: u32,
  fused_head: FusedHead,
) -> Result<EdgeMaps, PostprocessError> {
  if outputs.is_empty() {
    return Err(PostprocessError::EmptyOutput);
  }
  if height == 0 || width == 0 {
    return Err(PostprocessError::ShapeMismatch {
      index: 0,
      shape: vec![height as usize, width as usize],
    });
  }

  let fused_idx = fused_head
    .resolve(outputs.len())
    .ok_or(PostprocessError::FusedHeadOutOfRange {
      index: match fused_head {
        FusedHead::Index(idx) => idx,
        FusedHead::Last => 0,
      },
      heads: outputs.len(),
    })?;

  let mut preds = Vec::with_capacity(outputs.len());
  for (index, tensor) in outputs.iter().enumerate() {
    let mut map = spatial_map(index, tensor)?;
    debug!("输出 {} 形状 {:?} -> {:?}", index, tensor.shape(), map.dim());
    map.mapv_inplace(sigmoid);
    let normalized = min_max_normalize(&map);
    preds.push(resize_map(&normalized, width, height));
  }

  let mut sum = vec![0f32; (width as usize) * (height as usize)];
  for pred in &preds {
    for (acc, &v) in sum.iter_mut().zip(pred.as_raw()) {
      *acc += f32::from(v);
    }
  }
  let count = preds.len() as f32;
  let averaged = sum.into_iter().map(|v| (v / count) as u8).collect();
  let averaged = GrayImage::from_raw(width, height, averaged).ok_or(
    PostprocessError::ShapeMismatch {
      index: 0,
      shape: vec![height as usize, width as usize],
    },
  )?;

  let heads = preds.len();
  let fused = preds.swap_remove(fused_idx);

  Ok(EdgeMaps {
    fused,
    averaged,
    heads,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use ndarray::{Array, IxDyn, array};

  fn tensor4(rows: &[&[f32]]) -> ArrayD<f32> {
    let h = rows.len();
    let w = rows[0].len();
    let flat: Vec<f32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
    Array::from_shape_vec(IxDyn(&[1, 1, h, w]), flat).unwrap()
  }

  #[test]
  fn sigmoid_properties() {
    assert_eq!(sigmoid(0.0), 0.5);
    let mut prev = 0.0;
    for i in -40..=40 {
      let y = sigmoid(i as f32 * 0.25);
      assert!(y > 0.0 && y < 1.0, "sigmoid({}) = {}", i as f32 * 0.25, y);
      assert!(y > prev);
      prev = y;
    }
  }

  #[test]
  fn sigmoid_saturates_for_large_negative_input() {
    assert_eq!(sigmoid(-1000.0), 0.0);
  }

  #[test]
  fn normalize_spans_full_range() {
    let shapes = [(1, 2), (2, 2), (3, 5), (7, 4), (16, 16)];
    // (起点, 跨度)，包括接近常数的情形
    let ranges = [(0.0f32, 1.0f32), (-40.0, 80.0), (0.1, 0.8), (1000.0, 0.5), (0.0, 1e-6)];

    for &(rows, cols) in &shapes {
      for &(start, span) in &ranges {
        let n = (rows * cols - 1) as f32;
        let map = Array2::from_shape_fn((rows, cols), |(y, x)| {
          start + span * (y * cols + x) as f32 / n
        });
        let img = min_max_normalize(&map);
        let values = img.as_raw();
        assert_eq!(img.dimensions(), (cols as u32, rows as u32));
        assert_eq!(
          *values.iter().min().unwrap(),
          0,
          "{}x{} from {} span {}",
          rows,
          cols,
          start,
          span
        );
        assert_eq!(
          *values.iter().max().unwrap(),
          255,
          "{}x{} from {} span {}",
          rows,
          cols,
          start,
          span
        );
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
      }
    }
  }

  #[test]
  fn normalize_tiny_range_is_still_stretched() {
    let map = array![[0.0f32, 0.25e-6, 1e-6]];
    let img = min_max_normalize(&map);
    assert_eq!(img.as_raw(), &vec![0, 64, 255]);
  }

  #[test]
  fn normalize_constant_map_is_zero() {
    let map = Array2::from_elem((3, 4), 0.42f32);
    let img = min_max_normalize(&map);
    assert_eq!(img.dimensions(), (4, 3));
    assert!(img.as_raw().iter().all(|&v| v == 0));
  }

  #[test]
  fn spatial_map_drops_batch_and_channel() {
    let t = tensor4(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]]);
    let map = spatial_map(0, &t).unwrap();
    assert_eq!(map, array![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]]);
  }

  #[test]
  fn spatial_map_keeps_plain_2d() {
    let t = array![[1.0f32, 2.0], [3.0, 4.0]].into_dyn();
    assert_eq!(spatial_map(0, &t).unwrap().dim(), (2, 2));
  }

  #[test]
  fn spatial_map_rejects_other_layouts() {
    let t = ArrayD::<f32>::zeros(IxDyn(&[1, 3, 4, 4]));
    assert_eq!(
      spatial_map(2, &t),
      Err(PostprocessError::ShapeMismatch {
        index: 2,
        shape: vec![1, 3, 4, 4]
      })
    );
    let t = ArrayD::<f32>::zeros(IxDyn(&[1, 1, 0, 4]));
    assert!(matches!(
      spatial_map(0, &t),
      Err(PostprocessError::ShapeMismatch { .. })
    ));
  }

  #[test]
  fn two_by_two_scenario() {
    let t1 = tensor4(&[&[0.0, 0.0], &[5.0, 5.0]]);
    let t2 = tensor4(&[&[10.0, -10.0], &[10.0, -10.0]]);
    let maps = postprocess(&[t1, t2], 2, 2, FusedHead::Last).unwrap();

    assert_eq!(maps.heads, 2);
    assert_eq!(maps.fused.as_raw(), &vec![255, 0, 255, 0]);
    // t1 -> [[0, 0], [255, 255]]，平均后截断
    assert_eq!(maps.averaged.as_raw(), &vec![127, 0, 255, 127]);
  }

  #[test]
  fn first_tensor_of_scenario_normalizes_to_rows() {
    let t1 = tensor4(&[&[0.0, 0.0], &[5.0, 5.0]]);
    let maps = postprocess(&[t1], 2, 2, FusedHead::Last).unwrap();
    assert_eq!(maps.fused.as_raw(), &vec![0, 0, 255, 255]);
    assert_eq!(maps.averaged, maps.fused);
  }

  #[test]
  fn empty_outputs_is_an_error() {
    assert_eq!(
      postprocess(&[], 4, 4, FusedHead::Last).unwrap_err(),
      PostprocessError::EmptyOutput
    );
  }

  #[test]
  fn fused_head_out_of_range() {
    let t = tensor4(&[&[0.0, 1.0]]);
    assert_eq!(
      postprocess(&[t], 1, 2, FusedHead::Index(3)).unwrap_err(),
      PostprocessError::FusedHeadOutOfRange { index: 3, heads: 1 }
    );
  }

  #[test]
  fn fused_tracks_position_and_average_ignores_order() {
    let a = tensor4(&[&[0.0, 1.0], &[2.0, 3.0]]);
    let b = tensor4(&[&[3.0, 2.0], &[1.0, 0.0]]);
    let c = tensor4(&[&[0.0, 4.0], &[0.0, 4.0]]);

    let forward = postprocess(&[a.clone(), b.clone(), c.clone()], 2, 2, FusedHead::Last).unwrap();
    let swapped = postprocess(&[b.clone(), a.clone(), c.clone()], 2, 2, FusedHead::Last).unwrap();
    assert_eq!(forward.averaged, swapped.averaged);
    assert_eq!(forward.fused, swapped.fused);

    let only_a = postprocess(&[a.clone()], 2, 2, FusedHead::Last).unwrap();
    let moved = postprocess(&[c, b, a], 2, 2, FusedHead::Last).unwrap();
    assert_eq!(moved.averaged, forward.averaged);
    assert_ne!(moved.fused, forward.fused);
    assert_eq!(moved.fused, only_a.fused);
  }

  #[test]
  fn fused_head_index_selects_stage() {
    let a = tensor4(&[&[0.0, 1.0]]);
    let b = tensor4(&[&[1.0, 0.0]]);
    let maps = postprocess(&[a, b], 1, 2, FusedHead::Index(0)).unwrap();
    assert_eq!(maps.fused.as_raw(), &vec![0, 255]);
  }

  #[test]
  fn outputs_are_resized_to_frame() {
    let small = ArrayD::from_shape_fn(IxDyn(&[1, 1, 8, 8]), |idx| idx[3] as f32);
    let large = ArrayD::from_shape_fn(IxDyn(&[1, 1, 32, 32]), |idx| idx[2] as f32);
    let maps = postprocess(&[small, large], 48, 64, FusedHead::Last).unwrap();
    assert_eq!(maps.fused.dimensions(), (64, 48));
    assert_eq!(maps.averaged.dimensions(), (64, 48));
  }

  #[test]
  fn resize_round_trip_preserves_structure() {
    let map = GrayImage::from_fn(64, 64, |x, y| Luma([(x * 2 + y * 2) as u8]));
    let up = resize_map(&map, 640, 480);
    assert_eq!(up.dimensions(), (640, 480));
    let back = resize_map(&up, 64, 64);

    let diffs: Vec<i32> = map
      .as_raw()
      .iter()
      .zip(back.as_raw())
      .map(|(&a, &b)| (i32::from(a) - i32::from(b)).abs())
      .collect();
    let mean = diffs.iter().sum::<i32>() as f32 / diffs.len() as f32;
    assert!(mean < 2.0, "mean diff {}", mean);
    assert!(diffs.iter().all(|&d| d <= 12));
  }
}
