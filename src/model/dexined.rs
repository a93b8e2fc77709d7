// 该文件是 DexiNed Edge （边缘检测演示） 项目的一部分。
// src/model/dexined.rs - DexiNed 模型
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

use std::path::PathBuf;

use image::imageops::{self, FilterType};
use ndarray::Array4;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  frame::RgbFrame,
  model::{
    EdgeMaps, FusedHead, Model, Recoverable,
    engine::{EngineError, InferenceEngine, OrtEngine},
    postprocess::{PostprocessError, postprocess},
  },
};

const DEXINED_INPUT_W: u32 = 512;
const DEXINED_INPUT_H: u32 = 512;
// B, G, R
const DEXINED_MEAN_BGR: [f32; 3] = [103.5, 116.2, 123.6];

#[derive(Error, Debug)]
pub enum DexinedError {
  #[error("推理引擎错误: {0}")]
  EngineError(#[from] EngineError),
  #[error("推理错误: {0}")]
  InferError(Box<dyn std::error::Error + Send + Sync>),
  #[error("后处理错误: {0}")]
  PostprocessError(#[from] PostprocessError),
  #[error("输入帧为空: {0}x{1}")]
  EmptyFrame(u32, u32),
}

impl Recoverable for DexinedError {
  fn is_recoverable(&self) -> bool {
    matches!(
      self,
      DexinedError::EmptyFrame(..)
        | DexinedError::PostprocessError(
          PostprocessError::EmptyOutput | PostprocessError::ShapeMismatch { .. }
        )
    )
  }
}

pub struct DexinedBuilder {
  model_path: PathBuf,
  input_size: (u32, u32),
  mean_bgr: [f32; 3],
  fused_head: FusedHead,
}

impl DexinedBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    DexinedBuilder {
      model_path: model_path.into(),
      input_size: (DEXINED_INPUT_W, DEXINED_INPUT_H),
      mean_bgr: DEXINED_MEAN_BGR,
      fused_head: FusedHead::Last,
    }
  }

  pub fn input_size(mut self, width: u32, height: u32) -> Self {
    self.input_size = (width, height);
    self
  }

  pub fn mean_bgr(mut self, mean: [f32; 3]) -> Self {
    self.mean_bgr = mean;
    self
  }

  pub fn fused_head(mut self, fused_head: FusedHead) -> Self {
    self.fused_head = fused_head;
    self
  }

  pub fn build(self) -> Result<Dexined<OrtEngine>, DexinedError> {
    let engine = OrtEngine::load(&self.model_path)?;
    Ok(self.build_with_engine(engine))
  }

  pub fn build_with_engine<E: InferenceEngine>(self, engine: E) -> Dexined<E> {
    debug!(
      "DexiNed 输入尺寸: {}x{}, 均值(BGR): {:?}, 融合输出: {:?}",
      self.input_size.0, self.input_size.1, self.mean_bgr, self.fused_head
    );
    Dexined {
      engine,
      input_size: self.input_size,
      mean_bgr: self.mean_bgr,
      fused_head: self.fused_head,
    }
  }
}

pub struct Dexined<E> {
  engine: E,
  input_size: (u32, u32),
  mean_bgr: [f32; 3],
  fused_head: FusedHead,
}

impl<E> Dexined<E> {
  pub fn engine(&self) -> &E {
    &self.engine
  }

  /// 缩放到网络输入尺寸，转为 BGR 顺序并减去均值，输出 NCHW 张量
  pub fn preprocess(&self, frame: &RgbFrame) -> Array4<f32> {
    let (width, height) = self.input_size;
    let image = frame.to_rgb_image();
    let resized = if image.dimensions() == (width, height) {
      image
    } else {
      imageops::resize(&image, width, height, FilterType::Triangle)
    };

    Array4::from_shape_fn(
      (1, 3, height as usize, width as usize),
      |(_, c, y, x)| {
        let pixel = resized.get_pixel(x as u32, y as u32);
        f32::from(pixel[2 - c]) - self.mean_bgr[c]
      },
    )
  }
}

impl<E: InferenceEngine> Model for Dexined<E> {
  type Input = RgbFrame;
  type Output = EdgeMaps;
  type Error = DexinedError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    if input.width() == 0 || input.height() == 0 {
      return Err(DexinedError::EmptyFrame(input.width(), input.height()));
    }

    debug!("预处理输入帧 {}x{}", input.width(), input.height());
    let blob = self.preprocess(input);

    debug!("执行模型推理");
    let outputs = self
      .engine
      .infer(blob.view())
      .map_err(|e| DexinedError::InferError(Box::new(e)))?;
    debug!("模型输出数量: {}", outputs.len());

    postprocess(&outputs, input.height(), input.width(), self.fused_head).map_err(|e| {
      warn!("后处理失败: {}", e);
      DexinedError::from(e)
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};
  use ndarray::{ArrayD, ArrayView4, IxDyn};
  use std::{cell::RefCell, convert::Infallible};

  struct EchoEngine {
    outputs: Vec<ArrayD<f32>>,
    seen_shape: RefCell<Vec<usize>>,
  }

  impl InferenceEngine for EchoEngine {
    type Error = Infallible;

    fn infer(&self, input: ArrayView4<'_, f32>) -> Result<Vec<ArrayD<f32>>, Self::Error> {
      *self.seen_shape.borrow_mut() = input.shape().to_vec();
      Ok(self.outputs.clone())
    }
  }

  fn head(value_at: impl Fn(usize, usize) -> f32) -> ArrayD<f32> {
    ArrayD::from_shape_fn(IxDyn(&[1, 1, 16, 16]), |idx| value_at(idx[2], idx[3]))
  }

  #[test]
  fn preprocess_swaps_channels_and_subtracts_mean() {
    let model = DexinedBuilder::new("unused.onnx")
      .input_size(4, 4)
      .build_with_engine(EchoEngine {
        outputs: vec![],
        seen_shape: RefCell::new(vec![]),
      });
    let frame = RgbFrame::from(RgbImage::from_pixel(4, 4, Rgb([200, 100, 50])));
    let blob = model.preprocess(&frame);

    assert_eq!(blob.shape(), &[1, 3, 4, 4]);
    assert_eq!(blob[[0, 0, 1, 1]], 50.0 - 103.5);
    assert_eq!(blob[[0, 1, 2, 3]], 100.0 - 116.2);
    assert_eq!(blob[[0, 2, 3, 0]], 200.0 - 123.6);
  }

  #[test]
  fn infer_returns_maps_at_frame_size() {
    let engine = EchoEngine {
      outputs: vec![
        head(|y, _| y as f32),
        head(|_, x| x as f32),
        head(|y, x| (y + x) as f32),
      ],
      seen_shape: RefCell::new(vec![]),
    };
    let model = DexinedBuilder::new("unused.onnx").build_with_engine(engine);
    let frame = RgbFrame::from(RgbImage::new(40, 30));

    let maps = model.infer(&frame).unwrap();
    assert_eq!(model.engine().seen_shape.borrow().as_slice(), &[1, 3, 512, 512]);
    assert_eq!(maps.heads, 3);
    assert_eq!(maps.fused.dimensions(), (40, 30));
    assert_eq!(maps.averaged.dimensions(), (40, 30));
  }

  #[test]
  fn empty_output_is_recoverable() {
    let model = DexinedBuilder::new("unused.onnx")
      .input_size(8, 8)
      .build_with_engine(EchoEngine {
        outputs: vec![],
        seen_shape: RefCell::new(vec![]),
      });
    let err = model.infer(&RgbFrame::from(RgbImage::new(8, 8))).unwrap_err();
    assert!(matches!(
      err,
      DexinedError::PostprocessError(PostprocessError::EmptyOutput)
    ));
    assert!(err.is_recoverable());
  }

  #[test]
  fn fused_head_out_of_range_is_fatal() {
    let model = DexinedBuilder::new("unused.onnx")
      .input_size(8, 8)
      .fused_head(FusedHead::Index(5))
      .build_with_engine(EchoEngine {
        outputs: vec![head(|y, _| y as f32)],
        seen_shape: RefCell::new(vec![]),
      });
    let err = model.infer(&RgbFrame::from(RgbImage::new(8, 8))).unwrap_err();
    assert!(!err.is_recoverable());
  }

  #[test]
  fn empty_frame_is_skipped_without_inference() {
    let model = DexinedBuilder::new("unused.onnx")
      .input_size(8, 8)
      .build_with_engine(EchoEngine {
        outputs: vec![head(|y, _| y as f32)],
        seen_shape: RefCell::new(vec![]),
      });
    let err = model.infer(&RgbFrame::with_shape(0, 0)).unwrap_err();
    assert!(matches!(err, DexinedError::EmptyFrame(0, 0)));
    assert!(err.is_recoverable());
    assert!(model.engine().seen_shape.borrow().is_empty());
  }

  #[test]
  fn missing_model_fails_to_build() {
    let err = DexinedBuilder::new("does/not/exist.onnx").build().err().unwrap();
    assert!(matches!(
      err,
      DexinedError::EngineError(EngineError::ModelNotFound(_))
    ));
  }
}
