/// SIP 客户端核心模块
///
/// 基于 rsipstack 的 Endpoint 提供事务层：`EndpointSender` 实现 `RequestSender`，
/// 负责发送、认证挑战应答，并把结果转换为 `TransactionEvent`
use crate::error::SipError;
use crate::registration::{RequestSender, Transaction, TransactionEvent, TransactionEventSender};
use rsip::{SipMessage, StatusCode};
use rsipstack::{
    dialog::authenticate::{handle_client_authenticate, Credential},
    transaction::{
        endpoint::EndpointInnerRef,
        key::{TransactionKey, TransactionRole},
        transaction::Transaction as ClientTransaction,
        Endpoint,
    },
    transport::{udp::UdpConnection, TransportLayer},
    EndpointBuilder,
};
use std::net::{IpAddr, SocketAddr};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// SIP 客户端配置
pub struct SipClientConfig {
    /// SIP 用户名
    pub username: String,

    /// SIP 密码
    pub password: String,

    /// 认证域 (realm)
    pub realm: Option<String>,

    /// 本地 UDP 端口
    pub local_port: u16,

    /// User-Agent字符串
    pub user_agent: String,
}

impl SipClientConfig {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            realm: None,
            local_port: 5060,
            user_agent: format!("sip-registrator/{}", crate::VERSION),
        }
    }

    fn credential(&self) -> Credential {
        Credential {
            username: self.username.clone(),
            password: self.password.clone(),
            realm: self.realm.clone(),
        }
    }
}

/// SIP 客户端：持有 UDP 传输和 rsipstack Endpoint
pub struct SipClient {
    endpoint: Endpoint,
    credential: Credential,
    local_ip: IpAddr,
    local_port: u16,
    cancel_token: CancellationToken,
}

impl SipClient {
    /// 创建传输层和 Endpoint，并启动 Endpoint 服务任务
    pub async fn connect(config: &SipClientConfig) -> Result<Self, SipError> {
        let cancel_token = CancellationToken::new();

        // 获取本地IP
        let local_ip = crate::utils::get_first_non_loopback_interface()
            .map_err(|e| SipError::Transport(e.to_string()))?;
        info!("检测到本地出口IP: {}", local_ip);

        let mut transport_layer = TransportLayer::new(cancel_token.clone());
        let local_addr = SocketAddr::new(local_ip, config.local_port);
        let connection = UdpConnection::create_connection(
            local_addr,
            None,
            Some(cancel_token.child_token()),
        )
        .await?;
        transport_layer.add_transport(connection.into());

        // 创建端点
        let mut endpoint_builder = EndpointBuilder::new();
        endpoint_builder
            .with_cancel_token(cancel_token.clone())
            .with_transport_layer(transport_layer)
            .with_user_agent(&config.user_agent);

        let endpoint = endpoint_builder.build();

        // 启动端点服务
        let endpoint_for_serve = endpoint.inner.clone();
        tokio::spawn(async move {
            endpoint_for_serve.serve().await.ok();
        });

        Ok(Self {
            endpoint,
            credential: config.credential(),
            local_ip,
            local_port: config.local_port,
            cancel_token,
        })
    }

    pub fn local_ip(&self) -> IpAddr {
        self.local_ip
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// 创建绑定到该 Endpoint 的请求发送器
    pub fn sender(&self) -> EndpointSender {
        EndpointSender {
            endpoint: self.endpoint.inner.clone(),
            credential: Some(self.credential.clone()),
        }
    }

    /// 停止 Endpoint 和传输
    pub fn shutdown(&self) {
        info!("shutting down SIP client");
        self.cancel_token.cancel();
    }
}

/// rsipstack 事务层的 `RequestSender` 实现
#[derive(Clone)]
pub struct EndpointSender {
    endpoint: EndpointInnerRef,
    credential: Option<Credential>,
}

impl EndpointSender {
    pub fn new(endpoint: EndpointInnerRef, credential: Option<Credential>) -> Self {
        Self {
            endpoint,
            credential,
        }
    }
}

impl RequestSender for EndpointSender {
    fn send(&self, request: rsip::Request) -> Transaction {
        let (events, transaction) = Transaction::channel();
        let endpoint = self.endpoint.clone();
        let credential = self.credential.clone();

        tokio::spawn(async move {
            if let Err(e) = drive_transaction(endpoint, request, credential, &events).await {
                warn!("REGISTER transaction failed: {}", e);
                let _ = events.send(TransactionEvent::TransportError);
            }
        });

        transaction
    }
}

/// 驱动一个客户端事务直到收到最终响应
///
/// 401/407 只应答一次；事务结束仍无最终响应视为超时
async fn drive_transaction(
    endpoint: EndpointInnerRef,
    mut request: rsip::Request,
    credential: Option<Credential>,
    events: &TransactionEventSender,
) -> rsipstack::Result<()> {
    let via = endpoint.get_via(None, None)?;
    request.headers.unique_push(rsip::Header::Via(via.into()));

    let mut seq = crate::registration::request_cseq(&request).unwrap_or(1);
    let key = TransactionKey::from_request(&request, TransactionRole::Client)?;
    let mut tx = ClientTransaction::new_client(key, request, endpoint.clone(), None);
    tx.send().await?;

    let mut auth_sent = false;
    while let Some(msg) = tx.receive().await {
        let SipMessage::Response(resp) = msg else {
            continue;
        };

        match resp.status_code {
            StatusCode::ProxyAuthenticationRequired | StatusCode::Unauthorized if !auth_sent => {
                let Some(cred) = &credential else {
                    debug!("received {} response without credential", resp.status_code);
                    let _ = events.send(TransactionEvent::Response(resp));
                    return Ok(());
                };

                seq += 1;
                tx = handle_client_authenticate(seq, &tx, resp, cred).await?;
                tx.send().await?;
                auth_sent = true;
                let _ = events.send(TransactionEvent::Authenticated);
            }
            _ => {
                let is_final = crate::registration::status_code(&resp) >= 200;
                let _ = events.send(TransactionEvent::Response(resp));
                if is_final {
                    return Ok(());
                }
            }
        }
    }

    debug!("transaction terminated without final response");
    let _ = events.send(TransactionEvent::Timeout);
    Ok(())
}
