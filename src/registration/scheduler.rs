/// 续订定时器调度实现
use super::traits::{RenewalTimer, Scheduler};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 基于 tokio 的调度器，每个定时器一个 sleep 任务
#[derive(Debug, Clone, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, after: Duration) -> RenewalTimer {
        let (fire, fired) = oneshot::channel();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(after) => {
                    let _ = fire.send(());
                }
                _ = token.cancelled() => {
                    debug!("renewal timer cancelled");
                }
            }
        });

        RenewalTimer::new(fired, cancel)
    }
}

struct ManualEntry {
    after: Duration,
    fire: Option<oneshot::Sender<()>>,
    cancel: CancellationToken,
}

/// 手动触发的调度器
///
/// 只记录请求的延迟，由调用方决定何时触发，适合确定性测试
#[derive(Clone, Default)]
pub struct ManualScheduler {
    entries: Arc<Mutex<Vec<ManualEntry>>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有调度过的延迟（按调度顺序）
    pub fn scheduled(&self) -> Vec<Duration> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|entry| entry.after)
            .collect()
    }

    /// 仍在等待（未触发、未取消）的定时器数量
    pub fn pending(&self) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.fire.is_some() && !entry.cancel.is_cancelled())
            .count()
    }

    /// 触发最近一个仍在等待的定时器
    pub fn fire_latest(&self) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .iter_mut()
            .rev()
            .find(|entry| entry.fire.is_some() && !entry.cancel.is_cancelled());

        match entry.and_then(|entry| entry.fire.take()) {
            Some(fire) => fire.send(()).is_ok(),
            None => false,
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, after: Duration) -> RenewalTimer {
        let (fire, fired) = oneshot::channel();
        let cancel = CancellationToken::new();
        self.entries.lock().unwrap().push(ManualEntry {
            after,
            fire: Some(fire),
            cancel: cancel.clone(),
        });
        RenewalTimer::new(fired, cancel)
    }
}
