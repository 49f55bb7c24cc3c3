/// 注册器配置
use crate::error::ConfigError;
use crate::registration::{ContactUri, LocalContact, Params};
use crate::utils::make_instance_id;

/// 默认注册间隔（秒）
pub const DEFAULT_REGISTER_EXPIRES: u32 = 600;

/// 注册器配置
///
/// 来源于 User Agent 的配置：注册服务器、AOR、默认过期时间、实例 ID、
/// 本地 Contact 以及附加的 Contact URI 参数
#[derive(Debug, Clone)]
pub struct RegistratorConfig {
    /// REGISTER 的 Request-URI
    pub registrar: rsip::Uri,

    /// 地址记录 (AOR)，用于 From/To
    pub uri: rsip::Uri,

    /// 默认过期时间
    pub register_expires: u32,

    /// `+sip.instance` 使用的实例 ID
    pub instance_id: String,

    /// 本地 Contact
    pub contact: LocalContact,

    /// 初始的附加 Contact URI 参数
    pub contact_uri_params: Params,

    /// 绑定的传输
    pub transport: rsip::Transport,
}

impl RegistratorConfig {
    /// 创建新的注册器配置
    ///
    /// # 参数
    /// - `registrar`: 注册服务器 URI (如 sip:example.com)
    /// - `uri`: AOR (如 sip:alice@example.com)
    /// - `contact`: 本地 Contact URI (如 sip:alice@192.168.1.10:5060)
    pub fn new(registrar: &str, uri: &str, contact: &str) -> Result<Self, ConfigError> {
        let registrar = rsip::Uri::try_from(registrar)
            .map_err(|e| ConfigError::Parse(format!("registrar {}: {}", registrar, e)))?;
        let uri = rsip::Uri::try_from(uri)
            .map_err(|e| ConfigError::Parse(format!("uri {}: {}", uri, e)))?;
        let contact = ContactUri::parse(contact)
            .map_err(|e| ConfigError::Parse(format!("contact {}: {}", contact, e)))?;

        Ok(Self {
            registrar,
            uri,
            register_expires: DEFAULT_REGISTER_EXPIRES,
            instance_id: make_instance_id(),
            contact: LocalContact::new(contact),
            contact_uri_params: Params::new(),
            transport: rsip::Transport::Udp,
        })
    }

    /// 设置过期时间
    pub fn with_expires(mut self, expires: u32) -> Self {
        self.register_expires = expires;
        self
    }

    /// 设置实例 ID
    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = instance_id.into();
        self
    }

    /// 添加 Contact URI 参数
    pub fn with_contact_uri_param(
        mut self,
        key: impl Into<String>,
        value: Option<impl Into<String>>,
    ) -> Self {
        self.contact_uri_params.set(key, value);
        self
    }

    /// 设置传输类型
    pub fn with_transport(mut self, transport: rsip::Transport) -> Self {
        self.transport = transport;
        self
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.register_expires == 0 {
            return Err(ConfigError::Invalid("register_expires must be > 0".into()));
        }
        if self.uri.auth.is_none() {
            return Err(ConfigError::Missing("user part of uri".into()));
        }
        if self.contact.user().is_none() {
            return Err(ConfigError::Missing("user part of contact".into()));
        }
        if self.instance_id.trim().is_empty() {
            return Err(ConfigError::Missing("instance_id".into()));
        }
        Ok(())
    }
}
