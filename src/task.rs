// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/task.rs - 任务调度
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
  sync::mpsc::{Receiver, channel},
  thread,
  time::{Duration, Instant},
};

use tracing::{error, info, warn};

use crate::{
  detector::Detect,
  input::{Frame, InputError},
  model::DetectResult,
  output::Render,
};

const WARMUP_RUNS: usize = 2;
const DEFAULT_REPEAT_TIMES: usize = 1000;

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 只处理第一帧
pub struct OneShotTask;

impl<ME, RE, I, M, O> Task<I, M, O> for OneShotTask
where
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<Frame, InputError>>,
  M: Detect<Error = ME>,
  O: Render<Frame, DetectResult, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))??;
    info!("输入帧获取成功，开始推理...");
    let now = Instant::now();
    let result = model.detect(&frame.image)?;
    let elapsed = now.elapsed();
    info!("推理完成，耗时: {:.2?}", elapsed);
    output.render_result(&frame, &result)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 对同一帧重复检测，统计平均耗时
pub struct RepeatShotTask {
  times: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self {
      times: DEFAULT_REPEAT_TIMES,
    }
  }
}

impl RepeatShotTask {
  pub fn with_times(mut self, times: usize) -> Self {
    self.times = times.max(1);
    self
  }
}

impl<ME, RE, I, M, O> Task<I, M, O> for RepeatShotTask
where
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<Frame, InputError>>,
  M: Detect<Error = ME>,
  O: Render<Frame, DetectResult, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))??;
    info!("输入帧获取成功，开始推理...");
    let mut times = Vec::with_capacity(self.times);
    for i in 0..self.times {
      let now = Instant::now();
      let result = model.detect(&frame.image)?;
      let elapsed = now.elapsed();
      info!("({})推理完成，耗时: {:.2?}", i, elapsed);
      output.render_result(&frame, &result)?;
      times.push(elapsed);
    }

    // 样本足够时跳过预热的前几次
    let skip = if times.len() > WARMUP_RUNS {
      WARMUP_RUNS
    } else {
      0
    };
    let measured = &times[skip..];
    if !measured.is_empty() {
      warn!(
        "平均推理时间: {:.2?}",
        measured.iter().sum::<Duration>() / measured.len() as u32
      );
    }

    Ok(())
  }
}

/// 逐帧处理直到输入耗尽、达到指定帧数或收到停止信号
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  stop: Option<Receiver<()>>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 每处理完一帧检查一次停止信号
  pub fn with_stop_signal(mut self, stop: Receiver<()>) -> Self {
    self.stop = Some(stop);
    self
  }

  /// 安装 Ctrl-C 处理器作为停止信号，每个进程只能安装一次
  pub fn with_ctrlc(self) -> Result<Self, ctrlc::Error> {
    let (tx, rx) = channel();

    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;

    Ok(self.with_stop_signal(rx))
  }
}

impl<ME, RE, I, M, O> Task<I, M, O> for ContinuousTask
where
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<Frame, InputError>>,
  M: Detect<Error = ME>,
  O: Render<Frame, DetectResult, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let mut processed = 0usize;
    let mut now = Instant::now();
    for frame in input {
      let frame = match frame {
        Ok(frame) => frame,
        Err(e) => {
          error!("读取输入帧失败，跳过: {}", e);
          continue;
        }
      };
      processed += 1;
      info!("处理第 {} 帧图像: {}", processed, frame.name);
      let result = model.detect(&frame.image)?;
      let elapsed_a = now.elapsed();
      output.render_result(&frame, &result)?;
      let elapsed_b = now.elapsed();
      now = Instant::now();
      info!("推理完成，耗时: {:.2?} / {:.2?}", elapsed_a, elapsed_b);
      if self.frame_number.is_some_and(|n| processed >= n) {
        info!("达到指定帧数 {}, 退出任务循环", processed);
        break;
      }
      if self.stop.as_ref().is_some_and(|rx| rx.try_recv().is_ok()) {
        warn!("收到停止信号，退出任务循环");
        break;
      }
    }

    info!("任务完成，共处理 {} 帧", processed);
    Ok(())
  }
}
