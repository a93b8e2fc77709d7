// 该文件是 DexiNed Edge （边缘检测演示） 项目的一部分。
// src/model/engine.rs - 推理引擎
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

use std::{
  path::{Path, PathBuf},
  sync::Mutex,
};

use ndarray::{ArrayD, ArrayView4, IxDyn};
use ort::{logging::LogLevel, session::Session, value::TensorRef};
use thiserror::Error;
use tracing::{debug, info};

/// 张量执行后端：输入 NCHW 图像张量，按模型声明的顺序返回全部输出
pub trait InferenceEngine {
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(&self, input: ArrayView4<'_, f32>) -> Result<Vec<ArrayD<f32>>, Self::Error>;
}

#[derive(Error, Debug)]
pub enum EngineError {
  #[error("模型文件不存在: {0}")]
  ModelNotFound(PathBuf),
  #[error("模型加载错误: {path}, 错误: {source}")]
  ModelLoad {
    path: PathBuf,
    #[source]
    source: ort::Error,
  },
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(#[from] ort::Error),
  #[error("推理会话锁已损坏")]
  SessionPoisoned,
  #[error("输出 {name} 形状非法: {shape:?}")]
  OutputShape { name: String, shape: Vec<i64> },
}

/// 基于 ONNX Runtime 的推理引擎
pub struct OrtEngine {
  session: Mutex<Session>,
  input_name: String,
  output_names: Vec<String>,
  model_path: PathBuf,
}

impl std::fmt::Debug for OrtEngine {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("OrtEngine")
      .field("input_name", &self.input_name)
      .field("output_names", &self.output_names)
      .field("model_path", &self.model_path)
      .finish()
  }
}

impl OrtEngine {
  pub fn load(model_path: impl AsRef<Path>) -> Result<Self, EngineError> {
    let path = model_path.as_ref();
    if !path.is_file() {
      return Err(EngineError::ModelNotFound(path.to_path_buf()));
    }

    info!("加载模型文件: {}", path.display());
    let session = Session::builder()?
      .with_log_level(LogLevel::Error)?
      .commit_from_file(path)
      .map_err(|source| EngineError::ModelLoad {
        path: path.to_path_buf(),
        source,
      })?;

    let input_name = session
      .inputs
      .first()
      .map(|input| input.name.clone())
      .ok_or_else(|| EngineError::ModelInvalid("模型没有输入".to_string()))?;
    let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
    if output_names.is_empty() {
      return Err(EngineError::ModelInvalid("模型没有输出".to_string()));
    }

    debug!("模型输入: {}", input_name);
    debug!("模型输出数量: {}, 名称: {:?}", output_names.len(), output_names);
    info!("模型加载完成");

    Ok(OrtEngine {
      session: Mutex::new(session),
      input_name,
      output_names,
      model_path: path.to_path_buf(),
    })
  }

  pub fn model_path(&self) -> &Path {
    &self.model_path
  }

  pub fn output_names(&self) -> &[String] {
    &self.output_names
  }
}

impl InferenceEngine for OrtEngine {
  type Error = EngineError;

  fn infer(&self, input: ArrayView4<'_, f32>) -> Result<Vec<ArrayD<f32>>, Self::Error> {
    let input_tensor = TensorRef::from_array_view(input)?;
    let inputs = ort::inputs![self.input_name.as_str() => input_tensor];

    let mut session = self
      .session
      .lock()
      .map_err(|_| EngineError::SessionPoisoned)?;
    let outputs = session.run(inputs)?;

    let mut tensors = Vec::with_capacity(self.output_names.len());
    for name in &self.output_names {
      let (shape, data) = outputs[name.as_str()].try_extract_tensor::<f32>()?;
      let dims = shape
        .iter()
        .map(|&d| usize::try_from(d))
        .collect::<Result<Vec<usize>, _>>()
        .map_err(|_| EngineError::OutputShape {
          name: name.clone(),
          shape: shape.to_vec(),
        })?;
      let tensor = ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec()).map_err(|_| {
        EngineError::OutputShape {
          name: name.clone(),
          shape: shape.to_vec(),
        }
      })?;
      tensors.push(tensor);
    }

    Ok(tensors)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_model_file_is_reported() {
    let err = OrtEngine::load("no_such_dir/edge_detection_dexined_2024sep.onnx").unwrap_err();
    assert!(matches!(err, EngineError::ModelNotFound(_)));
  }
}
