use thiserror::Error;

#[derive(Error, Debug)]
pub enum SipError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Parse error: {0}")]
    Parse(#[from] ContactParseError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("SIP stack error: {0}")]
    Stack(#[from] rsipstack::Error),

    #[error("Unknown error: {0}")]
    Other(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required field: {0}")]
    Missing(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Contact header 解析错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContactParseError {
    #[error("empty contact")]
    Empty,

    #[error("missing URI scheme: {0}")]
    MissingScheme(String),

    #[error("missing host: {0}")]
    MissingHost(String),

    #[error("unterminated quoted string")]
    UnterminatedQuote,

    #[error("unterminated '<'")]
    UnterminatedAngle,
}

/// 注册失败 / 注销原因
///
/// 超时和传输错误由事务层给出，其余由响应状态码推导
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistrationCause {
    #[error("Request Timeout")]
    RequestTimeout,

    #[error("Connection Error")]
    ConnectionError,

    /// 通用 / 不合规的协议响应（例如 423 缺少 Min-Expires）
    #[error("SIP Failure Code")]
    SipFailureCode,

    #[error("Redirected")]
    Redirected,

    #[error("Busy")]
    Busy,

    #[error("Rejected")]
    Rejected,

    #[error("Not Found")]
    NotFound,

    #[error("Unavailable")]
    Unavailable,

    #[error("Address Incomplete")]
    AddressIncomplete,

    #[error("Incompatible SDP")]
    IncompatibleSdp,

    #[error("Authentication Error")]
    AuthenticationError,
}

impl RegistrationCause {
    /// 由 SIP 状态码推导失败原因，未映射的状态码归为 `SipFailureCode`
    pub fn from_status(code: u16) -> Self {
        match code {
            300 | 301 | 302 | 305 | 380 => RegistrationCause::Redirected,
            486 | 600 => RegistrationCause::Busy,
            403 | 603 => RegistrationCause::Rejected,
            404 | 604 => RegistrationCause::NotFound,
            408 | 410 | 430 | 480 => RegistrationCause::Unavailable,
            424 | 484 => RegistrationCause::AddressIncomplete,
            488 | 606 => RegistrationCause::IncompatibleSdp,
            401 | 407 => RegistrationCause::AuthenticationError,
            _ => RegistrationCause::SipFailureCode,
        }
    }

    /// 获取标准错误代码，用于日志分析和监控
    pub fn error_code(&self) -> &'static str {
        match self {
            RegistrationCause::RequestTimeout => "REQUEST_TIMEOUT",
            RegistrationCause::ConnectionError => "CONNECTION_ERROR",
            RegistrationCause::SipFailureCode => "SIP_FAILURE_CODE",
            RegistrationCause::Redirected => "REDIRECTED",
            RegistrationCause::Busy => "BUSY",
            RegistrationCause::Rejected => "REJECTED",
            RegistrationCause::NotFound => "NOT_FOUND",
            RegistrationCause::Unavailable => "UNAVAILABLE",
            RegistrationCause::AddressIncomplete => "ADDRESS_INCOMPLETE",
            RegistrationCause::IncompatibleSdp => "INCOMPATIBLE_SDP",
            RegistrationCause::AuthenticationError => "AUTHENTICATION_ERROR",
        }
    }

    /// 判断是否可由上层重试（注册器本身不重试）
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RegistrationCause::RequestTimeout
                | RegistrationCause::ConnectionError
                | RegistrationCause::Unavailable
        )
    }
}
