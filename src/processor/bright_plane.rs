// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/processor/bright_plane.rs - 单通道亮点检测
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
  processor::{FrameProcessor, ProcessError, Processed},
  vision::{Morphology, extract_plane, find_regions, mean_remove},
};

const PLANES: usize = 3;

/// 只看一个颜色通道，去掉全图均值后寻找高亮区域（例如激光点）
#[derive(Debug, Clone)]
pub struct BrightPlaneProcessor {
  threshold: u8,
  plane: usize,
  morphology: Morphology,
}

impl BrightPlaneProcessor {
  pub fn new(threshold: u8, plane: usize) -> Result<Self, ProcessError> {
    if plane >= PLANES {
      return Err(ProcessError::InvalidPlane(plane));
    }
    Ok(Self {
      threshold,
      plane,
      morphology: Morphology::default(),
    })
  }
}

impl FrameProcessor for BrightPlaneProcessor {
  fn process(&self, frames: &FrameBuffer, index: usize) -> Result<Processed, ProcessError> {
    let frame = frames
      .get(index)
      .ok_or(ProcessError::MissingFrame { index })?;

    let plane = extract_plane(frame.image(), self.plane);
    let residual = mean_remove(&plane);
    let regions = find_regions(&residual, self.threshold, self.morphology);

    Ok(Processed {
      regions,
      diagnostic: DynamicImage::ImageLuma8(plane),
    })
  }

  fn name(&self) -> &'static str {
    "bright_plane"
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{frame::Frame, vision::tests::square};
  use image::{Rgb, RgbImage};

  fn with_background(mut image: RgbImage, background: [u8; 3]) -> RgbImage {
    for pixel in image.pixels_mut() {
      if pixel.0 == [0, 0, 0] {
        *pixel = Rgb(background);
      }
    }
    image
  }

  #[test]
  fn bright_spot_in_selected_plane_is_found() {
    let image = with_background(square(64, 64, 30, 30, 8, [255, 40, 40]), [60, 60, 60]);
    let mut frames = FrameBuffer::new(1).unwrap();
    let index = frames.push(Frame::new(image, 1));

    let red = BrightPlaneProcessor::new(25, 0).unwrap();
    let processed = red.process(&frames, index).unwrap();
    assert_eq!(processed.regions.len(), 1);
    assert_eq!(processed.diagnostic.width(), 64);

    let green = BrightPlaneProcessor::new(25, 1).unwrap();
    assert!(green.process(&frames, index).unwrap().regions.is_empty());
  }

  #[test]
  fn plane_out_of_range_is_rejected() {
    assert_eq!(
      BrightPlaneProcessor::new(25, 3).unwrap_err(),
      ProcessError::InvalidPlane(3)
    );
  }
}
