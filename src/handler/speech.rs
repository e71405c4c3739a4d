// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/handler/speech.rs - 语音播报处理器
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

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
  frame::FrameBuffer,
  handler::{Handler, HandlerError, spawn_detached},
  vision::Region,
};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VoiceParams {
  pub voice: String,
  pub pitch: u32,
  pub speed: u32,
}

impl Default for VoiceParams {
  fn default() -> Self {
    Self {
      voice: "en+f4".to_string(),
      pitch: 60,
      speed: 170,
    }
  }
}

impl VoiceParams {
  pub fn to_args(&self) -> Vec<String> {
    vec![
      "-v".to_string(),
      self.voice.clone(),
      "-p".to_string(),
      self.pitch.to_string(),
      "-s".to_string(),
      self.speed.to_string(),
    ]
  }
}

/// 播报条目的选择方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
  /// 按顺序循环
  Sequential,
  #[default]
  Random,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
  pub items: Vec<String>,
  pub selection: Selection,
  pub voice: VoiceParams,
  pub program: String,
}

impl Default for SpeechConfig {
  fn default() -> Self {
    Self {
      items: vec!["hello!".to_string(), "goodbye!".to_string()],
      selection: Selection::Random,
      voice: VoiceParams::default(),
      program: "espeak".to_string(),
    }
  }
}

/// 语音合成接口：发起播报后立即返回
pub trait Speech: Send {
  fn speak(&self, text: &str, voice: &VoiceParams) -> Result<(), HandlerError>;
}

#[derive(Debug, Clone)]
pub struct EspeakSpeech {
  program: String,
}

impl EspeakSpeech {
  pub fn new(program: &str) -> Self {
    Self {
      program: program.to_string(),
    }
  }
}

impl Speech for EspeakSpeech {
  fn speak(&self, text: &str, voice: &VoiceParams) -> Result<(), HandlerError> {
    let mut args = voice.to_args();
    args.push(text.to_string());
    spawn_detached(&self.program, &args)
  }
}

pub struct SpeechHandler<S> {
  config: SpeechConfig,
  speech: S,
  rng: StdRng,
  next: usize,
}

impl<S: Speech> SpeechHandler<S> {
  pub fn new(config: SpeechConfig, speech: S) -> Self {
    Self {
      config,
      speech,
      rng: StdRng::from_entropy(),
      next: 0,
    }
  }

  /// 固定随机种子，便于复现播报顺序
  pub fn with_seed(mut self, seed: u64) -> Self {
    self.rng = StdRng::seed_from_u64(seed);
    self
  }

  fn pick(&mut self) -> Option<usize> {
    let len = self.config.items.len();
    if len == 0 {
      return None;
    }
    Some(match self.config.selection {
      Selection::Random => self.rng.gen_range(0..len),
      Selection::Sequential => {
        let idx = self.next % len;
        self.next = (idx + 1) % len;
        idx
      }
    })
  }
}

impl<S: Speech> Handler for SpeechHandler<S> {
  fn handle(&mut self, _: &[Region], _: &FrameBuffer, _: usize) -> Result<(), HandlerError> {
    let Some(idx) = self.pick() else {
      warn!("语音条目为空, 跳过播报");
      return Ok(());
    };
    info!("播放语音条目 {} / {}", idx, self.config.items.len());
    self.speech.speak(&self.config.items[idx], &self.config.voice)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::{Arc, Mutex};

  #[derive(Clone, Default)]
  struct RecordingSpeech {
    spoken: Arc<Mutex<Vec<String>>>,
  }

  impl Speech for RecordingSpeech {
    fn speak(&self, text: &str, _: &VoiceParams) -> Result<(), HandlerError> {
      self.spoken.lock().unwrap().push(text.to_string());
      Ok(())
    }
  }

  fn speak_times(handler: &mut impl Handler, times: usize) {
    let frames = FrameBuffer::new(1).unwrap();
    for _ in 0..times {
      handler.handle(&[], &frames, 0).unwrap();
    }
  }

  #[test]
  fn sequential_selection_wraps_around() {
    let config = SpeechConfig {
      items: vec!["a".into(), "b".into(), "c".into()],
      selection: Selection::Sequential,
      ..SpeechConfig::default()
    };
    let speech = RecordingSpeech::default();
    let mut handler = SpeechHandler::new(config, speech.clone());
    speak_times(&mut handler, 5);
    assert_eq!(*speech.spoken.lock().unwrap(), vec!["a", "b", "c", "a", "b"]);
  }

  #[test]
  fn random_selection_stays_within_items() {
    let speech = RecordingSpeech::default();
    let mut handler = SpeechHandler::new(SpeechConfig::default(), speech.clone()).with_seed(7);
    speak_times(&mut handler, 20);
    let spoken = speech.spoken.lock().unwrap();
    assert_eq!(spoken.len(), 20);
    assert!(spoken.iter().all(|s| s == "hello!" || s == "goodbye!"));
  }

  #[test]
  fn seeded_selection_is_reproducible() {
    let first = RecordingSpeech::default();
    let second = RecordingSpeech::default();
    let mut a = SpeechHandler::new(SpeechConfig::default(), first.clone()).with_seed(42);
    let mut b = SpeechHandler::new(SpeechConfig::default(), second.clone()).with_seed(42);
    speak_times(&mut a, 10);
    speak_times(&mut b, 10);
    assert_eq!(*first.spoken.lock().unwrap(), *second.spoken.lock().unwrap());
  }

  #[test]
  fn empty_items_are_skipped() {
    let config = SpeechConfig {
      items: Vec::new(),
      ..SpeechConfig::default()
    };
    let speech = RecordingSpeech::default();
    let mut handler = SpeechHandler::new(config, speech.clone());
    speak_times(&mut handler, 3);
    assert!(speech.spoken.lock().unwrap().is_empty());
  }

  #[test]
  fn voice_args_follow_espeak_flags() {
    assert_eq!(
      VoiceParams::default().to_args(),
      vec!["-v", "en+f4", "-p", "60", "-s", "170"]
    );
  }
}
