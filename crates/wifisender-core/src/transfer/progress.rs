//! 进度计算与回调
//!
//! 发送端知道文件总数，百分比为
//! `((i * 100) + (bytes * 100 / size)) / n`；
//! 接收端事先不知道文件总数，只按单个文件计算 `bytes * 100 / size`。

use crate::error::TransferError;
use crate::transfer::state::{SessionState, TransferredFile};
use serde::{Deserialize, Serialize};

/// 当前文件的进度快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransferProgress {
    /// 从 0 开始的文件序号
    pub file_index: usize,
    /// 文件总数（接收端为 `None`）
    pub total_files: Option<usize>,
    pub bytes_transferred: u64,
    pub file_size: u64,
}

impl TransferProgress {
    pub fn new(file_index: usize, total_files: Option<usize>, file_size: u64) -> Self {
        Self {
            file_index,
            total_files,
            bytes_transferred: 0,
            file_size,
        }
    }

    /// 当前文件内的百分比（向下取整，只有传完才到 100）
    pub fn file_percent(&self) -> u64 {
        if self.file_size == 0 {
            return 100;
        }
        let done = u128::from(self.bytes_transferred.min(self.file_size)) * 100;
        // 商不超过 100
        u64::try_from(done / u128::from(self.file_size)).unwrap_or(100)
    }

    /// 会话级百分比 (0–100)
    pub fn percent(&self) -> f64 {
        match self.total_files {
            Some(0) => 100.0,
            Some(n) => {
                let overall = self.file_index as u64 * 100 + self.file_percent();
                overall as f64 / n as f64
            }
            None => self.file_percent() as f64,
        }
    }

    /// 记录一个已完成的分块
    pub fn advance(&mut self, bytes: u64) {
        self.bytes_transferred = self.bytes_transferred.saturating_add(bytes);
    }

    pub fn is_file_done(&self) -> bool {
        self.bytes_transferred >= self.file_size
    }
}

/// 进度接收端
///
/// 由会话工作任务在自己的线程上调用；实现者负责把更新转交给界面线程，
/// 不要在回调里直接修改界面状态。
pub trait TransferCallback: Send + Sync {
    /// 状态机迁移
    fn on_state(&self, state: SessionState);
    /// 人类可读的状态文本
    fn on_status(&self, status: &str);
    /// 进度更新（至少每个分块一次）
    fn on_progress(&self, percent: f64, progress: &TransferProgress);
    /// 单个文件处理结束
    fn on_file_complete(&self, _file: &TransferredFile) {}
    /// 会话失败（每个会话最多一次）
    fn on_error(&self, error: &TransferError);
}

/// 丢弃所有通知
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallback;

impl TransferCallback for NoopCallback {
    fn on_state(&self, _state: SessionState) {}
    fn on_status(&self, _status: &str) {}
    fn on_progress(&self, _percent: f64, _progress: &TransferProgress) {}
    fn on_error(&self, _error: &TransferError) {}
}

/// 报告一次失败：状态置为 `Failed`，推送简短状态文本，再发出错误通知
pub(crate) fn report_failure<C: TransferCallback + ?Sized>(callback: &C, error: &TransferError) {
    log::error!("Session failed: {}", error);
    callback.on_state(SessionState::Failed);
    callback.on_status(&error.status_text());
    callback.on_error(error);
}

/// 记录所有通知，供测试断言
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingCallback {
    pub states: std::sync::Mutex<Vec<SessionState>>,
    pub statuses: std::sync::Mutex<Vec<String>>,
    pub percents: std::sync::Mutex<Vec<f64>>,
    pub errors: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl RecordingCallback {
    pub fn statuses(&self) -> Vec<String> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn states(&self) -> Vec<SessionState> {
        self.states.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl TransferCallback for RecordingCallback {
    fn on_state(&self, state: SessionState) {
        self.states.lock().unwrap().push(state);
    }

    fn on_status(&self, status: &str) {
        self.statuses.lock().unwrap().push(status.to_string());
    }

    fn on_progress(&self, percent: f64, _progress: &TransferProgress) {
        self.percents.lock().unwrap().push(percent);
    }

    fn on_error(&self, error: &TransferError) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_percent_formula() {
        // 第 2 个文件 (i = 1)，共 4 个，传了一半
        let mut progress = TransferProgress::new(1, Some(4), 200);
        progress.advance(100);
        assert!((progress.percent() - 37.5).abs() < f64::EPSILON);

        progress.advance(100);
        assert!((progress.percent() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_receiver_percent_is_per_file() {
        let mut progress = TransferProgress::new(5, None, 1000);
        progress.advance(250);
        assert!((progress.percent() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_hundred_only_when_done() {
        let size = u64::MAX - 1;
        let mut progress = TransferProgress::new(0, Some(1), size);
        progress.advance(size - 1);
        assert_eq!(progress.file_percent(), 99);
        assert!(progress.percent() < 100.0);

        progress.advance(1);
        assert!((progress.percent() - 100.0).abs() < f64::EPSILON);
        assert!(progress.is_file_done());
    }

    #[test]
    fn test_monotonic_across_chunks() {
        let size = 300 * 1024 + 17;
        let mut progress = TransferProgress::new(2, Some(3), size);
        let mut last = progress.percent();
        while !progress.is_file_done() {
            let chunk = (size - progress.bytes_transferred).min(64 * 1024);
            progress.advance(chunk);
            let now = progress.percent();
            assert!(now >= last);
            last = now;
        }
        assert!((last - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_report_failure_sequence() {
        let recorder = RecordingCallback::default();
        report_failure(&recorder, &TransferError::PortInUse { port: 5555 });

        assert_eq!(recorder.states(), vec![SessionState::Failed]);
        assert_eq!(recorder.statuses(), vec!["Port already in use".to_string()]);
        assert_eq!(recorder.errors.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_file_and_empty_session() {
        let progress = TransferProgress::new(0, Some(2), 0);
        assert_eq!(progress.file_percent(), 100);
        assert!((progress.percent() - 50.0).abs() < f64::EPSILON);

        let progress = TransferProgress::new(0, Some(0), 0);
        assert!((progress.percent() - 100.0).abs() < f64::EPSILON);
    }
}
