// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/bin/frame_diff.rs - 两帧差分检测工具
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

use anyhow::Result;
use clap::Parser;
use image::ImageReader;
use tracing::info;

use shaobing::{
  frame::{Frame, FrameBuffer},
  processor::{DEFAULT_THRESHOLD, FrameProcessor, MotionProcessor},
  vision::{
    Centroid,
    draw::{Axis, Marker, OUTLINE_COLOR, composite, draw_marker, draw_outlines},
    largest_region, weighted_centroid,
  },
};

/// 对两张静态图像做运动差分，输出区域信息与标注后的拼接图
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 前一帧
  #[arg(long, value_name = "FILE")]
  pub before: PathBuf,
  /// 后一帧
  #[arg(long, value_name = "FILE")]
  pub after: PathBuf,
  /// 输出图像路径
  #[arg(long, value_name = "FILE")]
  pub output: PathBuf,
  /// 差分阈值
  #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
  pub threshold: u8,
  /// 纵向拼接
  #[arg(long)]
  pub vertical: bool,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  let before = ImageReader::open(&args.before)?.decode()?.into_rgb8();
  let after = ImageReader::open(&args.after)?.decode()?.into_rgb8();

  let mut frames = FrameBuffer::new(2)?;
  frames.push(Frame::new(before, 1));
  let index = frames.push(Frame::new(after, 2));

  let processor = MotionProcessor::new(args.threshold);
  let processed = processor.process(&frames, index)?;

  info!("检测到 {} 个区域", processed.regions.len());
  for (i, region) in processed.regions.iter().enumerate() {
    info!(
      "  #{}: 面积 {:.0}, 质心 ({:.1}, {:.1})",
      i, region.area, region.centroid.x, region.centroid.y
    );
  }
  if let Some(largest) = largest_region(&processed.regions) {
    info!("最大区域面积: {:.0}", largest.area);
  }

  let mut panels = frames
    .chronological(index)
    .into_iter()
    .map(Frame::to_rgb_image)
    .collect::<Vec<_>>();
  panels.push(processed.diagnostic.to_rgb8());

  let target = weighted_centroid(&processed.regions);
  for panel in panels.iter_mut() {
    let center = Centroid::new(panel.width() as f64 / 2.0, panel.height() as f64 / 2.0);
    draw_outlines(panel, &processed.regions, OUTLINE_COLOR);
    if let Some(target) = target {
      draw_marker(panel, target, Marker::target());
    }
    draw_marker(panel, center, Marker::center());
  }

  let axis = if args.vertical {
    Axis::Vertical
  } else {
    Axis::Horizontal
  };
  composite(&panels, axis).save(&args.output)?;
  info!("已写入 {}", args.output.display());

  Ok(())
}
