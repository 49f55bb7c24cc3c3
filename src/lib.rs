// 声明所有模块
pub mod config;
pub mod error;
pub mod registration;
pub mod sip_client;
pub mod utils;

/// 重新导出thiserror错误类型
pub use crate::error::{ConfigError, ContactParseError, RegistrationCause, SipError};

/// 主要API重新导出，简化使用
pub use crate::config::RegistratorConfig;
pub use crate::registration::{
    ChannelUserAgent, Registrator, RegistratorHandle, TokioScheduler, UserAgentEvent,
};
pub use crate::sip_client::{EndpointSender, SipClient, SipClientConfig};

use std::sync::Arc;
use tokio::sync::mpsc;

/// SIP Registrator库的版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 便捷函数：快速创建SIP客户端
pub async fn create_sip_client(
    user: &str,
    password: &str,
    local_port: u16,
) -> Result<SipClient, SipError> {
    let mut config = SipClientConfig::new(account_user(user), password);
    config.local_port = local_port;
    SipClient::connect(&config).await
}

/// 便捷函数：根据服务器地址和用户名生成注册器配置
///
/// # 参数
/// - `server`: 注册服务器地址 (如 example.com:5060)
/// - `user`: 用户名 (alice 或 alice@example.com)
/// - `contact_host`: 本地 Contact 的 host:port
pub fn registrator_config(
    server: &str,
    user: &str,
    contact_host: &str,
) -> Result<RegistratorConfig, ConfigError> {
    let aor = if user.contains('@') {
        format!("sip:{}", user)
    } else {
        format!("sip:{}@{}", user, server)
    };
    RegistratorConfig::new(
        &format!("sip:{}", server),
        &aor,
        &format!("sip:{}@{}", account_user(user), contact_host),
    )
}

/// 便捷函数：在客户端上启动注册器任务
///
/// 返回任务句柄和 User Agent 事件接收端，调用方需自行调用 `register()`。
/// `defer_refresh` 为 true 时注册器不自动续订，而是发出
/// `UserAgentEvent::RegistrationExpiring`，由调用方决定何时重新注册
pub fn create_registrator(
    client: &SipClient,
    config: RegistratorConfig,
    defer_refresh: bool,
) -> Result<(RegistratorHandle, mpsc::UnboundedReceiver<UserAgentEvent>), SipError> {
    config.validate()?;
    let (user_agent, events) = ChannelUserAgent::new(config.contact.clone());
    let registrator = Registrator::new(
        config,
        Arc::new(client.sender()),
        Arc::new(TokioScheduler),
        Arc::new(user_agent.with_expiring_listener(defer_refresh)),
    );
    Ok((registration::spawn(registrator), events))
}

fn account_user(user: &str) -> &str {
    user.split('@').next().unwrap_or(user)
}
