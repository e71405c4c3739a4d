// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/handler.rs - 事件反应处理器
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
  path::PathBuf,
  process::{Command, Stdio},
  thread,
};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{frame::FrameBuffer, vision::Region};

mod image_save;
mod speech;
mod steering;

pub use self::image_save::{ImageSaveConfig, ImageSaveHandler, Persistence, TimestampedDirectory};
pub use self::speech::{EspeakSpeech, Selection, Speech, SpeechConfig, SpeechHandler, VoiceParams};
pub use self::steering::{
  ActuatorState, Actuator, AxisBounds, GpioPwmActuator, SteeringConfig, SteeringHandler,
  TargetMode,
};

#[derive(Error, Debug)]
pub enum HandlerError {
  #[error("缓冲槽位 {index} 中没有帧")]
  MissingFrame { index: usize },
  #[error("区域集合为空")]
  EmptyRegions,
  #[error("区域总面积为零, 无法计算加权质心")]
  DegenerateRegions,
  #[error("无效的转向量: h={h_delta}, v={v_delta}")]
  InvalidSteering { h_delta: f64, v_delta: f64 },
  #[error("无法启动外部程序 {program}: {source}")]
  Spawn {
    program: String,
    source: std::io::Error,
  },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
}

/// 确认事件的反应处理器
///
/// 由所属订阅者同步调用；帧缓冲只读，需要标注时先复制帧。
/// 闭包 `FnMut(&[Region], &FrameBuffer, usize) -> Result<(), HandlerError>` 同样满足本 trait。
pub trait Handler: Send {
  fn handle(
    &mut self,
    regions: &[Region],
    frames: &FrameBuffer,
    index: usize,
  ) -> Result<(), HandlerError>;
}

impl<F> Handler for F
where
  F: FnMut(&[Region], &FrameBuffer, usize) -> Result<(), HandlerError> + Send,
{
  fn handle(
    &mut self,
    regions: &[Region],
    frames: &FrameBuffer,
    index: usize,
  ) -> Result<(), HandlerError> {
    self(regions, frames, index)
  }
}

/// 启动外部程序后立即返回，由后台线程回收子进程
pub(crate) fn spawn_detached(program: &str, args: &[String]) -> Result<(), HandlerError> {
  debug!("执行: {} {}", program, args.join(" "));
  let mut child = Command::new(program)
    .args(args)
    .stdin(Stdio::null())
    .stdout(Stdio::null())
    .spawn()
    .map_err(|source| HandlerError::Spawn {
      program: program.to_string(),
      source,
    })?;

  let name = program.to_string();
  thread::Builder::new()
    .name(format!("reap-{name}"))
    .spawn(move || match child.wait() {
      Ok(status) if !status.success() => warn!("{} 退出状态: {}", name, status),
      Ok(_) => {}
      Err(err) => warn!("等待 {} 失败: {}", name, err),
    })?;
  Ok(())
}

/// 配置中选择的处理器
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HandlerConfig {
  Steering(SteeringConfig),
  Speech(SpeechConfig),
  ImageSave(ImageSaveConfig),
}

impl HandlerConfig {
  /// 构建处理器；转向处理器按配置在启动时归中
  pub fn build(&self) -> Result<Box<dyn Handler>, HandlerError> {
    Ok(match self {
      HandlerConfig::Steering(config) => {
        let actuator = GpioPwmActuator::new(&config.program, config.period_us);
        let mut handler = SteeringHandler::new(config.clone(), actuator);
        if config.center_on_start {
          handler.center()?;
        }
        Box::new(handler)
      }
      HandlerConfig::Speech(config) => {
        let speech = EspeakSpeech::new(&config.program);
        Box::new(SpeechHandler::new(config.clone(), speech))
      }
      HandlerConfig::ImageSave(config) => {
        let persistence = TimestampedDirectory::new(
          PathBuf::from(&config.directory),
          config.extension.clone(),
        );
        Box::new(ImageSaveHandler::new(config.clone(), persistence))
      }
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{frame::Frame, vision::Centroid};
  use image::RgbImage;

  #[test]
  fn closures_are_handlers() {
    let mut calls = Vec::new();
    {
      let mut handler = |regions: &[Region], _: &FrameBuffer, index: usize| {
        calls.push((regions.len(), index));
        Ok::<(), HandlerError>(())
      };
      let mut frames = FrameBuffer::new(2).unwrap();
      let index = frames.push(Frame::new(RgbImage::new(2, 2), 1));
      let regions = vec![Region::new(1.0, Centroid::default())];
      Handler::handle(&mut handler, &regions, &frames, index).unwrap();
    }
    assert_eq!(calls, vec![(1, 0)]);
  }

  #[test]
  fn handler_config_selects_variant_by_kind() {
    let config: HandlerConfig = serde_json::from_str(
      r#"{ "kind": "speech", "items": ["halt!"], "selection": "sequential" }"#,
    )
    .unwrap();
    let HandlerConfig::Speech(speech) = config else {
      panic!("expected speech config");
    };
    assert_eq!(speech.items, vec!["halt!".to_string()]);
    assert_eq!(speech.selection, Selection::Sequential);
    assert_eq!(speech.voice, VoiceParams::default());
  }

  #[test]
  fn missing_program_is_a_spawn_error() {
    let err = spawn_detached("shaobing-no-such-program", &[]).unwrap_err();
    assert!(matches!(err, HandlerError::Spawn { .. }));
  }
}
