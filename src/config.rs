// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/config.rs - 流水线配置
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

//! JSON 流水线配置，例如：
//!
//! ```json
//! {
//!   "tracker": { "hflip": true, "heartbeat_frames": 500 },
//!   "subscribers": [
//!     {
//!       "name": "turret",
//!       "detector": { "min_sequential_frames": 2 },
//!       "processor": { "kind": "motion", "threshold": 25 },
//!       "handler": { "kind": "steering", "gain": 8.0 }
//!     }
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{Span, info};

use crate::{
  detector::DetectorConfig,
  handler::HandlerConfig,
  processor::ProcessorConfig,
  subscriber::{DEFAULT_CAPACITY, Subscriber, SubscriberError},
  tracker::{Tracker, TrackerConfig},
};

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("无法读取配置文件 {path}: {source}")]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("配置解析失败: {0}")]
  Parse(#[from] serde_json::Error),
  #[error("订阅者 {name} 构建失败: {source}")]
  Subscriber {
    name: String,
    source: SubscriberError,
  },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubscriberConfig {
  pub name: String,
  /// 帧缓冲容量
  pub buffer: usize,
  pub enabled: bool,
  pub skip_during_cooldown: bool,
  pub detector: DetectorConfig,
  pub processor: ProcessorConfig,
  /// 为空时确认事件只记录日志
  pub handler: Option<HandlerConfig>,
}

impl Default for SubscriberConfig {
  fn default() -> Self {
    Self {
      name: "subscriber1".to_string(),
      buffer: DEFAULT_CAPACITY,
      enabled: true,
      skip_during_cooldown: true,
      detector: DetectorConfig::default(),
      processor: ProcessorConfig::default(),
      handler: None,
    }
  }
}

impl SubscriberConfig {
  pub fn build(&self, parent: &Span) -> Result<Subscriber, SubscriberError> {
    let mut builder = Subscriber::builder()
      .with_name(self.name.clone())
      .with_capacity(self.buffer)
      .with_processor(self.processor.build()?)
      .with_detector(self.detector.clone())
      .with_parent_span(parent)
      .skip_during_cooldown(self.skip_during_cooldown);
    if let Some(handler) = &self.handler {
      builder = builder.with_boxed_handler(handler.build()?);
    }
    builder.build()
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  pub tracker: TrackerConfig,
  pub subscribers: Vec<SubscriberConfig>,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      tracker: TrackerConfig::default(),
      subscribers: vec![SubscriberConfig::default()],
    }
  }
}

impl PipelineConfig {
  pub fn from_json(json: &str) -> Result<Self, ConfigError> {
    Ok(serde_json::from_str(json)?)
  }

  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_json(&json)
  }

  /// 构建采集器并注册所有启用的订阅者
  pub fn build_tracker(&self) -> Result<Tracker, ConfigError> {
    let mut tracker = Tracker::new(self.tracker.clone());
    for config in &self.subscribers {
      if !config.enabled {
        info!("订阅者 {} 已禁用, 跳过", config.name);
        continue;
      }
      let subscriber =
        config
          .build(tracker.span())
          .map_err(|source| ConfigError::Subscriber {
            name: config.name.clone(),
            source,
          })?;
      tracker.add_subscriber(subscriber);
    }
    Ok(tracker)
  }
}
