// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/processor.rs - 帧处理策略
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

use image::DynamicImage;
use serde::Deserialize;
use thiserror::Error;

use crate::{frame::FrameBuffer, vision::Region};

mod bright_plane;
mod color_range;
mod motion;

pub use self::bright_plane::BrightPlaneProcessor;
pub use self::color_range::{ColorRangeProcessor, ColorSpace};
pub use self::motion::MotionProcessor;

pub const DEFAULT_THRESHOLD: u8 = 25;

/// 一次处理的结果：区域集合与诊断图像
#[derive(Debug, Clone)]
pub struct Processed {
  pub regions: Vec<Region>,
  pub diagnostic: DynamicImage,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProcessError {
  #[error("帧历史不足: 需要 {required} 帧, 当前 {available} 帧")]
  InsufficientHistory { required: usize, available: usize },
  #[error("缓冲槽位 {index} 中没有帧")]
  MissingFrame { index: usize },
  #[error("帧尺寸不一致: 当前 {current:?}, 前一帧 {previous:?}")]
  DimensionMismatch {
    current: (u32, u32),
    previous: (u32, u32),
  },
  #[error("颜色通道 {0} 超出范围 (0..=2)")]
  InvalidPlane(usize),
}

/// 帧处理策略：把缓冲中的帧转换为区域集合
pub trait FrameProcessor: Send {
  fn process(&self, frames: &FrameBuffer, index: usize) -> Result<Processed, ProcessError>;

  /// 处理所需的最少缓冲帧数
  fn min_history(&self) -> usize {
    1
  }

  fn name(&self) -> &'static str;
}

impl<P: FrameProcessor + ?Sized> FrameProcessor for Box<P> {
  fn process(&self, frames: &FrameBuffer, index: usize) -> Result<Processed, ProcessError> {
    (**self).process(frames, index)
  }

  fn min_history(&self) -> usize {
    (**self).min_history()
  }

  fn name(&self) -> &'static str {
    (**self).name()
  }
}

/// 配置中选择的处理策略
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessorConfig {
  Motion {
    #[serde(default = "default_threshold")]
    threshold: u8,
  },
  ColorRange {
    #[serde(default = "color_range::default_lower")]
    lower: [u8; 3],
    #[serde(default = "color_range::default_upper")]
    upper: [u8; 3],
    #[serde(default)]
    space: ColorSpace,
  },
  BrightPlane {
    #[serde(default = "default_threshold")]
    threshold: u8,
    #[serde(default)]
    plane: usize,
  },
}

fn default_threshold() -> u8 {
  DEFAULT_THRESHOLD
}

impl Default for ProcessorConfig {
  fn default() -> Self {
    ProcessorConfig::Motion {
      threshold: DEFAULT_THRESHOLD,
    }
  }
}

impl ProcessorConfig {
  pub fn build(&self) -> Result<ProcessorWrapper, ProcessError> {
    Ok(match *self {
      ProcessorConfig::Motion { threshold } => {
        ProcessorWrapper::Motion(MotionProcessor::new(threshold))
      }
      ProcessorConfig::ColorRange {
        lower,
        upper,
        space,
      } => ProcessorWrapper::ColorRange(ColorRangeProcessor::new(lower, upper, space)),
      ProcessorConfig::BrightPlane { threshold, plane } => {
        ProcessorWrapper::BrightPlane(BrightPlaneProcessor::new(threshold, plane)?)
      }
    })
  }
}

pub enum ProcessorWrapper {
  Motion(MotionProcessor),
  ColorRange(ColorRangeProcessor),
  BrightPlane(BrightPlaneProcessor),
}

impl FrameProcessor for ProcessorWrapper {
  fn process(&self, frames: &FrameBuffer, index: usize) -> Result<Processed, ProcessError> {
    match self {
      ProcessorWrapper::Motion(p) => p.process(frames, index),
      ProcessorWrapper::ColorRange(p) => p.process(frames, index),
      ProcessorWrapper::BrightPlane(p) => p.process(frames, index),
    }
  }

  fn min_history(&self) -> usize {
    match self {
      ProcessorWrapper::Motion(p) => p.min_history(),
      ProcessorWrapper::ColorRange(p) => p.min_history(),
      ProcessorWrapper::BrightPlane(p) => p.min_history(),
    }
  }

  fn name(&self) -> &'static str {
    match self {
      ProcessorWrapper::Motion(p) => p.name(),
      ProcessorWrapper::ColorRange(p) => p.name(),
      ProcessorWrapper::BrightPlane(p) => p.name(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn config_selects_variant_by_kind() {
    let config: ProcessorConfig =
      serde_json::from_str(r#"{ "kind": "bright_plane", "plane": 2, "threshold": 40 }"#).unwrap();
    assert_eq!(
      config,
      ProcessorConfig::BrightPlane {
        threshold: 40,
        plane: 2
      }
    );
    assert_eq!(config.build().unwrap().name(), "bright_plane");

    let config: ProcessorConfig = serde_json::from_str(r#"{ "kind": "motion" }"#).unwrap();
    let processor = config.build().unwrap();
    assert_eq!(processor.name(), "motion");
    assert_eq!(processor.min_history(), 2);
  }

  #[test]
  fn invalid_plane_is_rejected_at_build() {
    let config = ProcessorConfig::BrightPlane {
      threshold: 25,
      plane: 3,
    };
    assert_eq!(config.build().err(), Some(ProcessError::InvalidPlane(3)));
  }
}
