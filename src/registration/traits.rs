/// Registration 协作方 trait 定义
///
/// 注册器只依赖这三个边界：请求发送（事务层）、定时器调度、User Agent 通知
use super::contact::Gruu;
use crate::error::RegistrationCause;
use rsip::{Request, Response};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// 事务层上报的事件
///
/// 每个事务通过一个 channel 依次投递，替代多个回调的注册
#[derive(Debug, Clone)]
pub enum TransactionEvent {
    /// 请求超时（事务层已放弃重传）
    Timeout,
    /// 传输层错误
    TransportError,
    /// 认证挑战已应答并重发，CSeq 已加一
    Authenticated,
    /// 收到响应（包括 1xx）
    Response(Response),
}

/// 事务事件发送端，由 `RequestSender` 实现持有
pub type TransactionEventSender = mpsc::UnboundedSender<TransactionEvent>;

/// 单个事务的事件接收端
#[derive(Debug)]
pub struct Transaction {
    events: mpsc::UnboundedReceiver<TransactionEvent>,
}

impl Transaction {
    /// 创建事务事件 channel
    pub fn channel() -> (TransactionEventSender, Transaction) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Transaction { events: rx })
    }

    /// 等待下一个事件，事务结束返回 `None`
    pub async fn recv(&mut self) -> Option<TransactionEvent> {
        self.events.recv().await
    }
}

/// 请求发送器（事务层）
///
/// 负责重传、认证挑战和超时检测，注册器只消费它上报的事件
pub trait RequestSender: Send + Sync {
    fn send(&self, request: Request) -> Transaction;
}

/// 续订定时器句柄
///
/// 到期后 `expired()` 完成；`cancel()` 可重复调用；drop 时自动取消
#[derive(Debug)]
pub struct RenewalTimer {
    fired: Option<oneshot::Receiver<()>>,
    cancel: CancellationToken,
}

impl RenewalTimer {
    pub fn new(fired: oneshot::Receiver<()>, cancel: CancellationToken) -> Self {
        Self {
            fired: Some(fired),
            cancel,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 等待定时器到期；被取消或调度方丢弃时返回 `false`
    pub async fn expired(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let Some(fired) = self.fired.as_mut() else {
            return false;
        };
        let expired = fired.await.is_ok();
        self.fired = None;
        expired
    }
}

impl Drop for RenewalTimer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// 定时器调度能力
///
/// 生产环境用 tokio 定时器，测试中可手动触发
pub trait Scheduler: Send + Sync {
    fn schedule(&self, after: Duration) -> RenewalTimer;
}

/// User Agent 通知接口
///
/// 注册器持有的是共享引用，实现方自行处理内部可变性
pub trait UserAgent: Send + Sync {
    /// 首次注册成功
    fn registered(&self, response: &Response);

    /// 注销完成、传输断开、或已注册状态下续订失败
    fn unregistered(&self, response: Option<&Response>, cause: Option<RegistrationCause>);

    /// 注册失败
    fn registration_failed(&self, response: &Response, cause: RegistrationCause);

    /// 是否有 "registration expiring" 监听者
    ///
    /// 没有时注册器到期前自动重新注册
    fn has_registration_expiring_listener(&self) -> bool {
        false
    }

    /// 注册即将过期
    fn registration_expiring(&self) {}

    /// 注册服务器返回了 GRUU，写回本地 Contact
    fn set_gruu(&self, gruu: Gruu);
}
