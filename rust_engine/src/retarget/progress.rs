//! 进度回调

pub trait ProgressSink {
    /// 已完成 `done` / 共 `total` 帧
    fn report(&mut self, done: usize, total: usize);
}

impl<F> ProgressSink for F
where
    F: FnMut(usize, usize),
{
    fn report(&mut self, done: usize, total: usize) {
        self(done, total)
    }
}

/// 写入日志
#[derive(Clone, Copy, Debug, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&mut self, done: usize, total: usize) {
        log::info!("重定向进度 {}/{}", done, total);
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _done: usize, _total: usize) {}
}

/// 每 `interval` 帧以及最后一帧报告一次
pub(crate) fn should_report(done: usize, total: usize, interval: usize) -> bool {
    done == total || (interval > 0 && done % interval == 0)
}
