// 该文件是 Kuangxuan （框选） 项目的一部分。
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

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use kuangxuan::{
  ClassTable, DetectConfig, FromUrl, ResizeMode, SuppressionScope, TensorLayout,
  detector::DefaultDetector,
  input::InputWrapper,
  model::EngineWrapper,
  output::OutputWrapper,
  task::{ContinuousTask, OneShotTask, Task},
};

/// Kuangxuan 目标检测参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型来源，如 onnx:///path/model.onnx 或 replay:///path/dump.json
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，如 image:///path/a.jpg 或 dir:///path/images
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，如 log:// 、json:///path/out.jsonl 或 folder:///path/records
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
  pub confidence: f32,
  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.4", value_name = "THRESHOLD")]
  pub nms_threshold: f32,
  /// 按类别分别做 NMS
  #[arg(long)]
  pub per_class: bool,
  /// 保持宽高比缩放并填充
  #[arg(long)]
  pub letterbox: bool,
  /// 类别名称文件（JSON 数组或每行一个），缺省为 COCO 80 类
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,
  /// 输出张量布局: auto, candidates, attributes
  #[arg(long, default_value = "auto", value_name = "LAYOUT")]
  pub layout: TensorLayout,
  /// 最大处理帧数（仅对目录输入有效）
  #[arg(long, value_name = "COUNT")]
  pub max_frames: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型来源: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);
  info!("置信度阈值: {}", args.confidence);
  info!("NMS 阈值: {}", args.nms_threshold);

  let classes = match &args.labels {
    Some(path) => ClassTable::from_file(path)?,
    None => ClassTable::coco(),
  };
  info!("类别数: {}", classes.len());

  let config = DetectConfig::default()
    .confidence(args.confidence)
    .nms(args.nms_threshold)
    .layout(args.layout)
    .suppression(if args.per_class {
      SuppressionScope::PerClass
    } else {
      SuppressionScope::Joint
    })
    .resize(if args.letterbox {
      ResizeMode::Letterbox
    } else {
      ResizeMode::Stretch
    });

  let mut detector = DefaultDetector::<EngineWrapper>::new(config, Arc::new(classes))?;
  detector.set_model(&args.model)?;

  let input = InputWrapper::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;

  if input.is_sequence() {
    ContinuousTask::default()
      .with_frame_number(args.max_frames)
      .with_ctrlc()?
      .run_task(input, detector, output)?;
  } else {
    OneShotTask.run_task(input, detector, output)?;
  }

  Ok(())
}
