/// 基于 channel 的 User Agent 实现
///
/// 把注册器的通知转换成事件，由上层异步消费
use super::contact::{Gruu, LocalContact};
use super::traits::UserAgent;
use crate::error::RegistrationCause;
use rsip::Response;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

/// 注册生命周期事件
#[derive(Debug, Clone)]
pub enum UserAgentEvent {
    Registered {
        response: Response,
    },
    Unregistered {
        response: Option<Response>,
        cause: Option<RegistrationCause>,
    },
    RegistrationFailed {
        response: Response,
        cause: RegistrationCause,
    },
    RegistrationExpiring,
}

/// 把通知转发到 mpsc channel 的 User Agent
pub struct ChannelUserAgent {
    events: mpsc::UnboundedSender<UserAgentEvent>,
    contact: Mutex<LocalContact>,
    expiring_listener: bool,
}

impl ChannelUserAgent {
    pub fn new(contact: LocalContact) -> (Self, mpsc::UnboundedReceiver<UserAgentEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                events: tx,
                contact: Mutex::new(contact),
                expiring_listener: false,
            },
            rx,
        )
    }

    /// 设置是否监听 "registration expiring"
    ///
    /// 监听时由上层决定何时重新注册
    pub fn with_expiring_listener(mut self, listening: bool) -> Self {
        self.expiring_listener = listening;
        self
    }

    /// 当前本地 Contact（含注册服务器回写的 GRUU）
    pub fn contact(&self) -> LocalContact {
        self.contact.lock().unwrap().clone()
    }

    fn emit(&self, event: UserAgentEvent) {
        if self.events.send(event).is_err() {
            debug!("user agent event receiver dropped");
        }
    }
}

impl UserAgent for ChannelUserAgent {
    fn registered(&self, response: &Response) {
        self.emit(UserAgentEvent::Registered {
            response: response.clone(),
        });
    }

    fn unregistered(&self, response: Option<&Response>, cause: Option<RegistrationCause>) {
        self.emit(UserAgentEvent::Unregistered {
            response: response.cloned(),
            cause,
        });
    }

    fn registration_failed(&self, response: &Response, cause: RegistrationCause) {
        self.emit(UserAgentEvent::RegistrationFailed {
            response: response.clone(),
            cause,
        });
    }

    fn has_registration_expiring_listener(&self) -> bool {
        self.expiring_listener
    }

    fn registration_expiring(&self) {
        self.emit(UserAgentEvent::RegistrationExpiring);
    }

    fn set_gruu(&self, gruu: Gruu) {
        debug!("gruu updated: {:?}", gruu);
        self.contact.lock().unwrap().apply_gruu(gruu);
    }
}
