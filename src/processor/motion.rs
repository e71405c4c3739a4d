// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/processor/motion.rs - 帧差运动检测
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

use crate::{
  frame::FrameBuffer,
  processor::{DEFAULT_THRESHOLD, FrameProcessor, ProcessError, Processed},
  vision::{Morphology, find_regions, frame_diff},
};

const REQUIRED_HISTORY: usize = 2;

/// 无状态运动检测：当前帧与前一帧做差分
#[derive(Debug, Clone)]
pub struct MotionProcessor {
  threshold: u8,
  morphology: Morphology,
}

impl Default for MotionProcessor {
  fn default() -> Self {
    Self::new(DEFAULT_THRESHOLD)
  }
}

impl MotionProcessor {
  pub fn new(threshold: u8) -> Self {
    Self {
      threshold,
      morphology: Morphology::default(),
    }
  }

  pub fn with_morphology(mut self, morphology: Morphology) -> Self {
    self.morphology = morphology;
    self
  }
}

impl FrameProcessor for MotionProcessor {
  fn process(&self, frames: &FrameBuffer, index: usize) -> Result<Processed, ProcessError> {
    let insufficient = || ProcessError::InsufficientHistory {
      required: REQUIRED_HISTORY,
      available: frames.len(),
    };
    if frames.capacity() < REQUIRED_HISTORY {
      return Err(insufficient());
    }

    let (Some(current), Some(previous)) = (frames.get(index), frames.previous(index)) else {
      return Err(insufficient());
    };
    if current.dimensions() != previous.dimensions() {
      return Err(ProcessError::DimensionMismatch {
        current: current.dimensions(),
        previous: previous.dimensions(),
      });
    }

    let (diff, diff_gray) = frame_diff(current.image(), previous.image());
    let regions = find_regions(&diff_gray, self.threshold, self.morphology);

    Ok(Processed {
      regions,
      diagnostic: DynamicImage::ImageRgb8(diff),
    })
  }

  fn min_history(&self) -> usize {
    REQUIRED_HISTORY
  }

  fn name(&self) -> &'static str {
    "motion"
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{frame::Frame, vision::tests::square};
  use image::RgbImage;

  fn buffer_with(images: Vec<RgbImage>, capacity: usize) -> (FrameBuffer, usize) {
    let mut frames = FrameBuffer::new(capacity).unwrap();
    let mut index = 0;
    for (i, image) in images.into_iter().enumerate() {
      index = frames.push(Frame::new(image, i as u64 + 1));
    }
    (frames, index)
  }

  #[test]
  fn identical_frames_produce_no_regions() {
    let still = square(64, 48, 10, 10, 16, [200, 120, 40]);
    let (frames, index) = buffer_with(vec![still.clone(), still.clone(), still], 2);
    let processed = MotionProcessor::default().process(&frames, index).unwrap();
    assert!(processed.regions.is_empty());
  }

  #[test]
  fn moved_square_is_detected() {
    let before = square(80, 60, 10, 10, 12, [255, 255, 255]);
    let after = square(80, 60, 50, 30, 12, [255, 255, 255]);
    let (frames, index) = buffer_with(vec![before, after], 2);

    let processed = MotionProcessor::default().process(&frames, index).unwrap();
    assert_eq!(processed.regions.len(), 2);
    assert_eq!(processed.diagnostic.width(), 80);
  }

  #[test]
  fn single_frame_is_insufficient_history() {
    let (frames, index) = buffer_with(vec![RgbImage::new(8, 8)], 2);
    assert_eq!(
      MotionProcessor::default().process(&frames, index).unwrap_err(),
      ProcessError::InsufficientHistory {
        required: 2,
        available: 1
      }
    );
  }

  #[test]
  fn single_slot_buffer_is_insufficient_history() {
    let (frames, index) = buffer_with(vec![RgbImage::new(8, 8), RgbImage::new(8, 8)], 1);
    assert!(matches!(
      MotionProcessor::default().process(&frames, index),
      Err(ProcessError::InsufficientHistory { .. })
    ));
  }

  #[test]
  fn resolution_change_is_reported() {
    let (frames, index) = buffer_with(vec![RgbImage::new(8, 8), RgbImage::new(16, 8)], 2);
    assert_eq!(
      MotionProcessor::default().process(&frames, index).unwrap_err(),
      ProcessError::DimensionMismatch {
        current: (16, 8),
        previous: (8, 8)
      }
    );
  }
}
