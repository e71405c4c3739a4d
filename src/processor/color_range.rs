// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/processor/color_range.rs - 颜色区间检测
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

use std::borrow::Cow;

use image::{DynamicImage, imageops};
use serde::Deserialize;
use tracing::debug;

use crate::{
  frame::FrameBuffer,
  processor::{FrameProcessor, ProcessError, Processed},
  vision::{Morphology, apply_mask, find_regions, in_range, rgb_to_hsv},
};

// 掩码后图像的灰度阈值，区间内接近黑色的像素不计入
const MASKED_THRESHOLD: u8 = 1;

pub(super) fn default_lower() -> [u8; 3] {
  [0, 200, 200]
}

pub(super) fn default_upper() -> [u8; 3] {
  [179, 255, 255]
}

/// 比较颜色区间时使用的颜色空间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorSpace {
  Rgb,
  #[default]
  Hsv,
}

/// 颜色区间检测：保留落在 `[lower, upper]` 内的像素
#[derive(Debug, Clone)]
pub struct ColorRangeProcessor {
  lower: [u8; 3],
  upper: [u8; 3],
  space: ColorSpace,
  morphology: Morphology,
}

impl Default for ColorRangeProcessor {
  fn default() -> Self {
    Self::new(default_lower(), default_upper(), ColorSpace::Hsv)
  }
}

impl ColorRangeProcessor {
  pub fn new(lower: [u8; 3], upper: [u8; 3], space: ColorSpace) -> Self {
    debug!("颜色区间: lower = {:?}, upper = {:?} ({:?})", lower, upper, space);
    Self {
      lower,
      upper,
      space,
      morphology: Morphology::default(),
    }
  }
}

impl FrameProcessor for ColorRangeProcessor {
  fn process(&self, frames: &FrameBuffer, index: usize) -> Result<Processed, ProcessError> {
    let frame = frames
      .get(index)
      .ok_or(ProcessError::MissingFrame { index })?;

    let converted = match self.space {
      ColorSpace::Rgb => Cow::Borrowed(frame.image()),
      ColorSpace::Hsv => Cow::Owned(rgb_to_hsv(frame.image())),
    };
    let mask = in_range(&converted, self.lower, self.upper);
    let masked = apply_mask(&converted, &mask);
    let regions = find_regions(&imageops::grayscale(&masked), MASKED_THRESHOLD, self.morphology);

    Ok(Processed {
      regions,
      diagnostic: DynamicImage::ImageRgb8(masked),
    })
  }

  fn name(&self) -> &'static str {
    "color_range"
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{frame::Frame, vision::tests::square};
  use image::RgbImage;

  #[test]
  fn red_patch_matches_rgb_range() {
    let mut frames = FrameBuffer::new(1).unwrap();
    let index = frames.push(Frame::new(square(60, 60, 20, 20, 14, [230, 20, 20]), 1));

    let processor = ColorRangeProcessor::new([200, 0, 0], [255, 60, 60], ColorSpace::Rgb);
    let processed = processor.process(&frames, index).unwrap();
    assert_eq!(processed.regions.len(), 1);
    let centroid = processed.regions[0].centroid;
    assert!((centroid.x - 26.5).abs() < 1.0, "{centroid:?}");
  }

  #[test]
  fn near_black_pixels_in_range_are_ignored() {
    let mut frames = FrameBuffer::new(1).unwrap();
    let processor = ColorRangeProcessor::new([0, 0, 0], [60, 60, 60], ColorSpace::Rgb);

    let dark = frames.push(Frame::new(RgbImage::new(40, 40), 1));
    assert!(processor.process(&frames, dark).unwrap().regions.is_empty());

    let patch = frames.push(Frame::new(square(40, 40, 5, 5, 20, [40, 40, 40]), 2));
    assert_eq!(processor.process(&frames, patch).unwrap().regions.len(), 1);
  }

  #[test]
  fn default_hsv_range_ignores_gray_scene() {
    let mut frames = FrameBuffer::new(2).unwrap();
    let index = frames.push(Frame::new(square(40, 40, 5, 5, 20, [128, 128, 128]), 1));
    let processed = ColorRangeProcessor::default().process(&frames, index).unwrap();
    assert!(processed.regions.is_empty());
  }

  #[test]
  fn saturated_patch_matches_default_hsv_range() {
    let mut frames = FrameBuffer::new(2).unwrap();
    let index = frames.push(Frame::new(square(40, 40, 5, 5, 20, [0, 255, 255]), 1));
    let processed = ColorRangeProcessor::default().process(&frames, index).unwrap();
    assert_eq!(processed.regions.len(), 1);
  }

  #[test]
  fn empty_slot_is_missing_frame() {
    let frames = FrameBuffer::new(2).unwrap();
    assert_eq!(
      ColorRangeProcessor::default().process(&frames, 1).unwrap_err(),
      ProcessError::MissingFrame { index: 1 }
    );
  }
}
