// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::{thread, time::Duration};

use anyhow::Result;
use clap::Parser;
use tracing::{Level, info, warn};

use shaobing::{FromUrl, config::PipelineConfig, input::InputWrapper};

fn main() -> Result<()> {
  let args = args::Args::parse();

  tracing_subscriber::fmt()
    .with_max_level(if args.verbose {
      Level::DEBUG
    } else {
      Level::INFO
    })
    .init();

  info!("输入来源: {}", args.input);

  let mut config = match &args.config {
    Some(path) => {
      info!("配置文件: {}", path.display());
      PipelineConfig::from_path(path)?
    }
    None => PipelineConfig::default(),
  };
  config.tracker.hflip |= args.hflip;
  config.tracker.vflip |= args.vflip;
  if let Some(heartbeat) = args.heartbeat {
    config.tracker.heartbeat_frames = heartbeat;
  }
  if args.max_frames.is_some() {
    config.tracker.max_frames = args.max_frames;
  }

  let mut input = InputWrapper::from_url(&args.input)?;
  let mut tracker = config.build_tracker()?;

  let stop = tracker.stop_handle();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    stop.stop();
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;

  let report = tracker.start(&mut input)?;
  info!(
    "采集结束 ({:?}): 帧 {}, 空读 {}, 丢弃分发 {}",
    report.reason, report.frames, report.skipped_reads, report.dropped_dispatches
  );
  for subscriber in tracker.subscribers() {
    let stats = subscriber.stats();
    info!(
      "[{}] 帧 {}, 处理 {}, 冷却跳过 {}, 事件 {}, 处理失败 {}",
      subscriber.name(),
      stats.frames_seen,
      stats.frames_processed,
      stats.skipped_in_cooldown,
      stats.events,
      stats.handler_failures
    );
  }

  Ok(())
}
