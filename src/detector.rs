// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/detector.rs - 事件去抖状态机
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

//! 把逐帧区域集合转换为确认事件。
//!
//! 判定条件：
//! - 最大区域面积落在 `(min_area, max_area)` 开区间内；
//! - 距上一次确认事件至少 `min_interval_s` 秒；
//! - 连续满足面积条件的帧数不少于 `min_sequential_frames`。
//!
//! 冷却期内计数不会被清零，冷却结束后若累计帧数已足够，会立即确认。

use std::{
  fmt,
  time::{Duration, Instant},
};

use serde::Deserialize;
use thiserror::Error;

use crate::vision::{Centroid, Region, largest_region};

/// 去抖参数
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
  pub min_area: f64,
  pub max_area: f64,
  pub min_sequential_frames: u32,
  pub min_interval_s: f64,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    Self {
      min_area: 500.0,
      max_area: 50000.0,
      min_sequential_frames: 1,
      min_interval_s: 1.0,
    }
  }
}

#[derive(Error, Debug, PartialEq)]
pub enum DetectorConfigError {
  #[error("min_sequential_frames 必须至少为 1")]
  ZeroSequentialFrames,
  #[error("min_interval_s 必须是非负有限数, 实际为 {0}")]
  InvalidInterval(f64),
  #[error("面积区间为空: ({min}, {max})")]
  EmptyAreaRange { min: f64, max: f64 },
}

impl DetectorConfig {
  pub fn validate(&self) -> Result<(), DetectorConfigError> {
    if self.min_sequential_frames == 0 {
      return Err(DetectorConfigError::ZeroSequentialFrames);
    }
    if !self.min_interval_s.is_finite() || self.min_interval_s < 0.0 {
      return Err(DetectorConfigError::InvalidInterval(self.min_interval_s));
    }
    if self.min_area.is_nan() || self.max_area.is_nan() || self.min_area >= self.max_area {
      return Err(DetectorConfigError::EmptyAreaRange {
        min: self.min_area,
        max: self.max_area,
      });
    }
    Ok(())
  }

  fn min_interval(&self) -> Duration {
    Duration::from_secs_f64(self.min_interval_s)
  }
}

/// 确认事件的描述
#[derive(Debug, Clone, PartialEq)]
pub struct EventMetadata {
  pub max_area: f64,
  pub centroid: Centroid,
  pub sequential_frames: u32,
  pub since_last_event: Duration,
  pub region_count: usize,
}

impl fmt::Display for EventMetadata {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "MaxArea = {:.0}, nFrames = {}, dT = {:.3}, nRegions = {}, c = ({:.1}, {:.1})",
      self.max_area,
      self.sequential_frames,
      self.since_last_event.as_secs_f64(),
      self.region_count,
      self.centroid.x,
      self.centroid.y
    )
  }
}

/// 单次 `detect` 的判定结果
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
  /// 没有区域或面积条件不满足，计数已清零
  Rejected,
  /// 面积满足，但仍在冷却期内
  Cooldown,
  /// 面积满足，连续帧数尚不足
  Pending,
  Confirmed(EventMetadata),
}

impl Verdict {
  pub fn is_confirmed(&self) -> bool {
    matches!(self, Verdict::Confirmed(_))
  }
}

/// 去抖状态
#[derive(Debug, Clone, Copy)]
pub struct DetectionState {
  pub consecutive: u32,
  pub last_event: Instant,
}

/// 事件检测器，由所属订阅者独占
#[derive(Debug, Clone)]
pub struct EventDetector {
  config: DetectorConfig,
  state: DetectionState,
}

impl EventDetector {
  pub fn new(config: DetectorConfig) -> Result<Self, DetectorConfigError> {
    Self::starting_at(config, Instant::now())
  }

  /// 以 `start` 作为“上一次事件”时间创建，首个事件同样受冷却约束
  pub fn starting_at(config: DetectorConfig, start: Instant) -> Result<Self, DetectorConfigError> {
    config.validate()?;
    Ok(Self {
      config,
      state: DetectionState {
        consecutive: 0,
        last_event: start,
      },
    })
  }

  pub fn config(&self) -> &DetectorConfig {
    &self.config
  }

  pub fn state(&self) -> DetectionState {
    self.state
  }

  pub fn consecutive(&self) -> u32 {
    self.state.consecutive
  }

  pub fn is_ready_to_process(&self) -> bool {
    self.is_ready_at(Instant::now())
  }

  /// 只回答冷却判定，与区域内容无关
  pub fn is_ready_at(&self, now: Instant) -> bool {
    now.saturating_duration_since(self.state.last_event) >= self.config.min_interval()
  }

  pub fn detect(&mut self, regions: &[Region]) -> Verdict {
    self.detect_at(regions, Instant::now())
  }

  pub fn detect_at(&mut self, regions: &[Region], now: Instant) -> Verdict {
    let Some(largest) = largest_region(regions).filter(|region| self.meets_area(region.area))
    else {
      self.state.consecutive = 0;
      return Verdict::Rejected;
    };

    self.state.consecutive = self.state.consecutive.saturating_add(1);

    let elapsed = now.saturating_duration_since(self.state.last_event);
    if elapsed < self.config.min_interval() {
      return Verdict::Cooldown;
    }

    if self.state.consecutive < self.config.min_sequential_frames {
      return Verdict::Pending;
    }

    let metadata = EventMetadata {
      max_area: largest.area,
      centroid: largest.centroid,
      sequential_frames: self.state.consecutive,
      since_last_event: elapsed,
      region_count: regions.len(),
    };
    self.state.consecutive = 0;
    self.state.last_event = now;
    Verdict::Confirmed(metadata)
  }

  fn meets_area(&self, area: f64) -> bool {
    area > self.config.min_area && area < self.config.max_area
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn regions(area: f64) -> Vec<Region> {
    vec![Region::new(area, Centroid::new(10.0, 20.0))]
  }

  fn at(start: Instant, seconds: f64) -> Instant {
    start + Duration::from_secs_f64(seconds)
  }

  fn config(min_sequential_frames: u32, min_interval_s: f64) -> DetectorConfig {
    DetectorConfig {
      min_area: 500.0,
      max_area: 50000.0,
      min_sequential_frames,
      min_interval_s,
    }
  }

  #[test]
  fn confirms_every_third_qualifying_call() {
    let start = Instant::now();
    let mut detector = EventDetector::starting_at(config(3, 0.0), start).unwrap();
    let qualifying = regions(600.0);

    for call in 1..=12 {
      let verdict = detector.detect_at(&qualifying, at(start, call as f64 * 0.01));
      assert_eq!(verdict.is_confirmed(), call % 3 == 0, "call {call}");
      if verdict.is_confirmed() {
        assert_eq!(detector.consecutive(), 0);
      }
    }
  }

  #[test]
  fn no_second_confirmation_within_cooldown() {
    let start = Instant::now();
    let mut detector = EventDetector::starting_at(config(2, 2.0), start).unwrap();
    let qualifying = regions(600.0);

    let mut confirmed_at = Vec::new();
    for step in 0..100 {
      let t = 2.0 + step as f64 * 0.05;
      if detector.detect_at(&qualifying, at(start, t)).is_confirmed() {
        confirmed_at.push(t);
      }
    }

    assert!(confirmed_at.len() >= 2);
    for pair in confirmed_at.windows(2) {
      assert!(pair[1] - pair[0] >= 2.0 - 1e-9, "{pair:?}");
    }
  }

  #[test]
  fn first_call_after_cooldown_confirms_with_accumulated_count() {
    let start = Instant::now();
    let mut detector = EventDetector::starting_at(config(3, 1.0), start).unwrap();
    let qualifying = regions(600.0);

    for step in 1..=5 {
      assert_eq!(
        detector.detect_at(&qualifying, at(start, step as f64 * 0.1)),
        Verdict::Cooldown
      );
    }
    assert_eq!(detector.consecutive(), 5);

    match detector.detect_at(&qualifying, at(start, 1.0)) {
      Verdict::Confirmed(metadata) => assert_eq!(metadata.sequential_frames, 6),
      other => panic!("expected confirmation, got {other:?}"),
    }
  }

  #[test]
  fn timeline_with_cooldown_and_two_frames() {
    let start = Instant::now();
    let mut detector = EventDetector::starting_at(config(2, 1.0), start).unwrap();
    let qualifying = regions(600.0);

    assert!(!detector.detect_at(&qualifying, at(start, 0.0)).is_confirmed());
    assert_eq!(detector.consecutive(), 1);

    assert_eq!(
      detector.detect_at(&qualifying, at(start, 0.2)),
      Verdict::Cooldown
    );
    assert_eq!(detector.consecutive(), 2);

    let verdict = detector.detect_at(&qualifying, at(start, 1.1));
    let Verdict::Confirmed(metadata) = verdict else {
      panic!("expected confirmation, got {verdict:?}");
    };
    assert_eq!(detector.consecutive(), 0);
    assert_eq!(metadata.max_area, 600.0);
    assert_eq!(metadata.region_count, 1);
    assert!((metadata.since_last_event.as_secs_f64() - 1.1).abs() < 1e-6);
  }

  #[test]
  fn small_regions_never_confirm() {
    let start = Instant::now();
    let mut detector = EventDetector::starting_at(config(1, 0.0), start).unwrap();
    let small = regions(100.0);

    for step in 0..20 {
      assert_eq!(
        detector.detect_at(&small, at(start, step as f64)),
        Verdict::Rejected
      );
      assert_eq!(detector.consecutive(), 0);
    }
  }

  #[test]
  fn non_qualifying_frame_resets_count() {
    let start = Instant::now();
    let mut detector = EventDetector::starting_at(config(3, 0.0), start).unwrap();

    detector.detect_at(&regions(600.0), start);
    detector.detect_at(&regions(600.0), start);
    assert_eq!(detector.consecutive(), 2);

    assert_eq!(detector.detect_at(&[], start), Verdict::Rejected);
    assert_eq!(detector.consecutive(), 0);

    detector.detect_at(&regions(600.0), start);
    assert_eq!(detector.detect_at(&regions(60000.0), start), Verdict::Rejected);
    assert_eq!(detector.consecutive(), 0);
  }

  #[test]
  fn area_bounds_are_exclusive_and_use_largest_region() {
    let start = Instant::now();
    let mut detector = EventDetector::starting_at(config(1, 0.0), start).unwrap();

    assert_eq!(detector.detect_at(&regions(500.0), start), Verdict::Rejected);

    let mixed = vec![
      Region::new(100.0, Centroid::new(1.0, 1.0)),
      Region::new(800.0, Centroid::new(2.0, 2.0)),
      Region::new(800.0, Centroid::new(3.0, 3.0)),
    ];
    match detector.detect_at(&mixed, start) {
      Verdict::Confirmed(metadata) => {
        assert_eq!(metadata.max_area, 800.0);
        assert_eq!(metadata.centroid, Centroid::new(2.0, 2.0));
        assert_eq!(metadata.region_count, 3);
      }
      other => panic!("expected confirmation, got {other:?}"),
    }
  }

  #[test]
  fn readiness_only_reflects_cooldown() {
    let start = Instant::now();
    let mut detector = EventDetector::starting_at(config(1, 1.0), start).unwrap();
    assert!(!detector.is_ready_at(at(start, 0.5)));
    assert!(detector.is_ready_at(at(start, 1.0)));

    assert!(detector.detect_at(&regions(600.0), at(start, 1.5)).is_confirmed());
    assert!(!detector.is_ready_at(at(start, 2.0)));
    assert!(detector.is_ready_at(at(start, 2.5)));
  }

  #[test]
  fn invalid_configs_are_rejected() {
    assert_eq!(
      EventDetector::new(config(0, 1.0)).unwrap_err(),
      DetectorConfigError::ZeroSequentialFrames
    );
    assert_eq!(
      EventDetector::new(config(1, -1.0)).unwrap_err(),
      DetectorConfigError::InvalidInterval(-1.0)
    );
    let inverted = DetectorConfig {
      min_area: 10.0,
      max_area: 5.0,
      ..DetectorConfig::default()
    };
    assert!(matches!(
      EventDetector::new(inverted),
      Err(DetectorConfigError::EmptyAreaRange { .. })
    ));
  }
}
