/// Registration 模块
///
/// RFC 3261 §10 注册客户端 (Registrator)
///
/// ## 组成
///
/// - `Registrator`: 注册状态机，负责 REGISTER 构造、响应处理和定时续订
/// - `RequestSender` / `Scheduler` / `UserAgent`: 注入的协作者 trait
/// - `TokioScheduler`: 基于 tokio 的续订定时器
/// - `ChannelUserAgent`: 把注册通知转成 channel 事件
/// - `spawn`: 在独立任务中运行注册器，返回 `RegistratorHandle`
///
/// ## 使用示例
///
/// ```rust,no_run
/// use sip_registrator::registration::*;
/// use sip_registrator::{RegistratorConfig, SipClient, SipClientConfig};
/// use std::sync::Arc;
///
/// # async fn run() -> Result<(), sip_registrator::SipError> {
/// let client = SipClient::connect(&SipClientConfig::new("alice", "secret")).await?;
/// let config = RegistratorConfig::new(
///     "sip:example.com",
///     "sip:alice@example.com",
///     "sip:alice@192.168.1.10:5060",
/// )?;
///
/// let (user_agent, mut events) = ChannelUserAgent::new(config.contact.clone());
/// let registrator = Registrator::new(
///     config,
///     Arc::new(client.sender()),
///     Arc::new(TokioScheduler),
///     Arc::new(user_agent),
/// );
///
/// let handle = spawn(registrator);
/// handle.register()?;
///
/// if let Some(UserAgentEvent::Registered { .. }) = events.recv().await {
///     println!("registered");
/// }
/// handle.close().await;
/// # Ok(())
/// # }
/// ```
mod contact;
mod handle;
mod params;
mod registrator;
mod request;
mod scheduler;
mod traits;
mod user_agent;

// 导出公共接口
pub use contact::{parse_contacts, ContactHeader, ContactUri, Gruu, LocalContact};
pub use handle::{spawn, RegistratorHandle};
pub use params::{unquote, Params};
pub use registrator::{RegistrationState, Registrator};
pub use request::{
    clamp_expires, header_value, renewal_delay_ms, request_cseq, response_cseq, status_code,
    synthesize_response, MIN_EXPIRES, RENEW_AHEAD_MS,
};
pub use scheduler::{ManualScheduler, TokioScheduler};
pub use traits::{
    RenewalTimer, RequestSender, Scheduler, Transaction, TransactionEvent,
    TransactionEventSender, UserAgent,
};
pub use user_agent::{ChannelUserAgent, UserAgentEvent};
