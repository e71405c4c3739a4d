// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use std::path::{Path, PathBuf};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{FrameSource, InputError},
};

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("No image files in {0}")]
  EmptyFolder(PathBuf),
  #[error("No readable image files in {0}")]
  NoReadableImages(PathBuf),
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

fn check_scheme(url: &Url, expected: &str) -> Result<(), ImageFileInputError> {
  if url.scheme() != expected {
    error!(
      "URI scheme mismatch: expected '{}', found '{}'",
      expected,
      url.scheme()
    );
    return Err(ImageFileInputError::SchemaMismatch);
  }
  Ok(())
}

fn load(path: &Path) -> Result<RgbImage, ImageFileInputError> {
  Ok(ImageReader::open(path)?.decode()?.into_rgb8())
}

/// 单张静态图像：只产出一帧
pub struct ImageFileInput {
  image: Option<RgbImage>,
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageFileInputError> {
    Ok(Self {
      image: Some(load(path.as_ref())?),
    })
  }
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    check_scheme(url, Self::SCHEME)?;
    Self::open(url.path())
  }
}

impl FrameSource for ImageFileInput {
  fn next_frame(&mut self) -> Result<Option<RgbImage>, InputError> {
    self.image.take().map(Some).ok_or(InputError::EndOfStream)
  }
}

/// 按文件名顺序读取目录中的图像序列，`?loop` 时循环播放
pub struct FolderInput {
  directory: PathBuf,
  files: Vec<PathBuf>,
  position: usize,
  looping: bool,
  // 当前一轮是否成功读取过图像
  loaded_in_pass: bool,
}

impl FolderInput {
  pub fn open(directory: impl AsRef<Path>, looping: bool) -> Result<Self, ImageFileInputError> {
    let directory = directory.as_ref();
    let mut files = std::fs::read_dir(directory)?
      .filter_map(|entry| entry.ok().map(|entry| entry.path()))
      .filter(|path| {
        path
          .extension()
          .and_then(|ext| ext.to_str())
          .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
      })
      .collect::<Vec<_>>();
    if files.is_empty() {
      return Err(ImageFileInputError::EmptyFolder(directory.to_path_buf()));
    }
    files.sort();
    info!("从 {} 读取 {} 张图像", directory.display(), files.len());

    Ok(Self {
      directory: directory.to_path_buf(),
      files,
      position: 0,
      looping,
      loaded_in_pass: false,
    })
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }
}

impl FromUrlWithScheme for FolderInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for FolderInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    check_scheme(url, Self::SCHEME)?;
    let looping = url.query_pairs().any(|(k, _)| k == "loop");
    Self::open(url.path(), looping)
  }
}

impl FrameSource for FolderInput {
  fn next_frame(&mut self) -> Result<Option<RgbImage>, InputError> {
    if self.position >= self.files.len() {
      if !self.looping {
        return Err(InputError::EndOfStream);
      }
      if !self.loaded_in_pass {
        error!("{} 中没有可读取的图像", self.directory.display());
        return Err(ImageFileInputError::NoReadableImages(self.directory.clone()).into());
      }
      debug!("图像序列播放完毕, 从头开始");
      self.position = 0;
      self.loaded_in_pass = false;
    }

    let path = &self.files[self.position];
    self.position += 1;
    match load(path) {
      Ok(image) => {
        self.loaded_in_pass = true;
        Ok(Some(image))
      }
      Err(err) => {
        warn!("跳过无法读取的图像 {}: {}", path.display(), err);
        Ok(None)
      }
    }
  }
}
