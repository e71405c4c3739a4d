// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::Parser;
use url::Url;

/// Shaobing 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源
  /// 支持格式:
  /// - 单张图片: image:///path/to/frame.png
  /// - 图片序列: folder:///path/to/frames?loop
  /// - V4L2: v4l:///dev/video0?width=640&height=480
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// JSON 流水线配置文件，缺省时使用单个运动检测订阅者
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,

  /// 水平翻转输入帧
  #[arg(long)]
  pub hflip: bool,

  /// 垂直翻转输入帧
  #[arg(long)]
  pub vflip: bool,

  /// 心跳间隔帧数（0 表示关闭）
  #[arg(long, value_name = "FRAMES")]
  pub heartbeat: Option<u64>,

  /// 最大处理帧数
  #[arg(long, value_name = "COUNT")]
  pub max_frames: Option<u64>,

  /// 输出调试日志
  #[arg(long, short)]
  pub verbose: bool,
}
