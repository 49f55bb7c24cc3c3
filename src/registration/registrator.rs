/// 注册状态机
///
/// 负责一个注册绑定的完整生命周期：构造 REGISTER、解析响应、协商过期时间、
/// 到期前自动续订、注销，以及向 User Agent 上报结果。
///
/// 所有状态变更都由离散事件驱动（事务事件、定时器到期、直接调用），
/// 不存在并发修改。
use super::contact::{ContactHeader, Gruu};
use super::params::Params;
use super::request::{
    clamp_expires, has_contact, header_value, renewal_delay_ms, response_contacts,
    response_cseq, status_code, synthesize_response, RegisterTarget, MIN_EXPIRES,
};
use super::traits::{
    RenewalTimer, RequestSender, Scheduler, Transaction, TransactionEvent, UserAgent,
};
use crate::config::RegistratorConfig;
use crate::error::RegistrationCause;
use crate::utils::make_call_id;
use rsip::Response;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Contact 中固定的 reg-id
const REG_ID: u32 = 1;

/// 注册状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// 未注册，无进行中的事务
    Idle,
    /// REGISTER 事务进行中
    Registering,
    /// 已注册，无续订定时器
    Registered,
    /// 已注册，续订定时器已调度
    RenewScheduled,
    /// 注销事务进行中
    Unregistering,
}

enum Wake {
    Register(Option<TransactionEvent>),
    Unregister(Option<TransactionEvent>),
    Renewal(bool),
}

/// 注册器
pub struct Registrator {
    target: RegisterTarget,
    transport: rsip::Transport,
    cseq: u32,
    expires: u32,
    contact: ContactHeader,
    local_user: Option<String>,
    extra_headers: Vec<String>,
    extra_contact_params: Params,
    registering: bool,
    registered: bool,
    /// 进行中的 REGISTER 事务
    register_tx: Option<Transaction>,
    /// 进行中的注销事务，与 REGISTER 事务互不覆盖
    unregister_tx: Option<Transaction>,
    renewal: Option<RenewalTimer>,
    sender: Arc<dyn RequestSender>,
    scheduler: Arc<dyn Scheduler>,
    user_agent: Arc<dyn UserAgent>,
}

impl Registrator {
    /// 创建注册器
    ///
    /// Contact 由本地 Contact 加上 `+sip.ice`、`reg-id=1`、`+sip.instance` 组成，
    /// 配置中的附加 URI 参数随后生效
    pub fn new(
        config: RegistratorConfig,
        sender: Arc<dyn RequestSender>,
        scheduler: Arc<dyn Scheduler>,
        user_agent: Arc<dyn UserAgent>,
    ) -> Self {
        let mut contact = config.contact.to_header();
        contact.params.set_flag("+sip.ice");
        contact.params.set("reg-id", Some(REG_ID.to_string()));
        contact.params.set(
            "+sip.instance",
            Some(format!("\"<urn:uuid:{}>\"", config.instance_id)),
        );

        let call_id = make_call_id();
        info!(
            "create registrator: aor={} registrar={} call_id={}",
            config.uri, config.registrar, call_id
        );

        let mut registrator = Self {
            target: RegisterTarget {
                registrar: config.registrar,
                to_uri: config.uri,
                call_id,
            },
            transport: config.transport,
            cseq: 0,
            expires: config.register_expires.max(MIN_EXPIRES),
            local_user: config.contact.user().map(str::to_string),
            contact,
            extra_headers: vec![],
            extra_contact_params: Params::new(),
            registering: false,
            registered: false,
            register_tx: None,
            unregister_tx: None,
            renewal: None,
            sender,
            scheduler,
            user_agent,
        };

        if !config.contact_uri_params.is_empty() {
            registrator.set_extra_contact_uri_params(&config.contact_uri_params);
        }
        registrator
    }

    pub fn registered(&self) -> bool {
        self.registered
    }

    pub fn registering(&self) -> bool {
        self.registering
    }

    pub fn transport(&self) -> &rsip::Transport {
        &self.transport
    }

    pub fn call_id(&self) -> &str {
        &self.target.call_id
    }

    pub fn cseq(&self) -> u32 {
        self.cseq
    }

    pub fn expires(&self) -> u32 {
        self.expires
    }

    /// 当前的 Contact（不含 expires 和附加 header 参数）
    pub fn contact(&self) -> String {
        self.contact.to_string()
    }

    pub fn has_renewal_timer(&self) -> bool {
        self.renewal.is_some()
    }

    /// 注销事务是否仍在进行
    pub fn unregistering(&self) -> bool {
        self.unregister_tx.is_some()
    }

    /// 是否有待处理的事务或定时器
    pub fn has_pending_work(&self) -> bool {
        self.register_tx.is_some() || self.unregister_tx.is_some() || self.renewal.is_some()
    }

    /// REGISTER 进行中优先于注销
    pub fn state(&self) -> RegistrationState {
        if self.registering {
            RegistrationState::Registering
        } else if self.unregister_tx.is_some() {
            RegistrationState::Unregistering
        } else if self.registered && self.renewal.is_some() {
            RegistrationState::RenewScheduled
        } else if self.registered {
            RegistrationState::Registered
        } else {
            RegistrationState::Idle
        }
    }

    /// 替换附加 header（每行 `Name: value`），作用于之后所有 REGISTER
    pub fn set_extra_headers<I, S>(&mut self, headers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_headers = headers.into_iter().map(Into::into).collect();
    }

    /// 替换 Contact header 参数后缀
    pub fn set_extra_contact_params(&mut self, params: Params) {
        self.extra_contact_params = params;
    }

    /// 清空 Contact URI 的全部参数后应用给定参数
    pub fn set_extra_contact_uri_params(&mut self, params: &Params) {
        self.contact.uri.params.clear();
        self.contact.uri.params.extend_from(params);
        debug!("contact updated: {}", self.contact);
    }

    /// 发起注册
    ///
    /// 已有 REGISTER 事务进行中时直接返回
    pub fn register(&mut self) {
        if self.registering {
            debug!("register request in progress, ignoring");
            return;
        }

        let contact = format!(
            "{};expires={}{}",
            self.contact, self.expires, self.extra_contact_params
        );

        self.cseq += 1;
        let request = self
            .target
            .build(self.cseq, &contact, self.expires, &self.extra_headers);

        debug!(cseq = self.cseq, expires = self.expires, "sending REGISTER");
        self.register_tx = Some(self.sender.send(request));
        self.registering = true;
    }

    /// 注销
    ///
    /// `unregister_all` 为 true 时使用 `Contact: *` 注销该 AOR 的所有绑定
    pub fn unregister(&mut self, unregister_all: bool) {
        if !self.registered {
            debug!("already unregistered");
            return;
        }

        self.registered = false;
        self.cancel_renewal();
        if self.registering {
            // 进行中的 REGISTER 被替代，其响应的 CSeq 也不会再匹配
            debug!("superseding in-flight REGISTER");
            self.registering = false;
            self.register_tx = None;
        }

        let contact = if unregister_all {
            format!("*{}", self.extra_contact_params)
        } else {
            format!("{};expires=0{}", self.contact, self.extra_contact_params)
        };

        self.cseq += 1;
        let request = self
            .target
            .build(self.cseq, &contact, 0, &self.extra_headers);

        debug!(cseq = self.cseq, unregister_all, "sending un-REGISTER");
        self.unregister_tx = Some(self.sender.send(request));
    }

    /// 会话关闭，已注册时注销
    pub fn close(&mut self) {
        if self.registered {
            self.unregister(false);
        }
    }

    /// 传输断开：纯本地状态变更，不发送任何请求
    pub fn on_transport_closed(&mut self) {
        self.registering = false;
        self.register_tx = None;
        self.unregister_tx = None;
        self.cancel_renewal();

        if self.registered {
            self.registered = false;
            self.user_agent.unregistered(None, None);
        }
    }

    /// 等待并处理下一个事件（事务事件或续订定时器到期）
    ///
    /// 没有任何待处理内容时立即返回 `false`
    pub async fn next_event(&mut self) -> bool {
        if !self.has_pending_work() {
            return false;
        }

        let wake = {
            let register_tx = &mut self.register_tx;
            let unregister_tx = &mut self.unregister_tx;
            let renewal = &mut self.renewal;
            tokio::select! {
                event = async move {
                    match register_tx {
                        Some(transaction) => transaction.recv().await,
                        None => std::future::pending().await,
                    }
                } => Wake::Register(event),
                event = async move {
                    match unregister_tx {
                        Some(transaction) => transaction.recv().await,
                        None => std::future::pending().await,
                    }
                } => Wake::Unregister(event),
                expired = async move {
                    match renewal {
                        Some(timer) => timer.expired().await,
                        None => std::future::pending().await,
                    }
                } => Wake::Renewal(expired),
            }
        };

        // 事务层未给出结果就关闭 channel 时按传输错误处理
        match wake {
            Wake::Register(Some(event)) => self.handle_register_event(event),
            Wake::Register(None) => {
                warn!("REGISTER transaction closed without a final event");
                self.handle_register_event(TransactionEvent::TransportError);
            }
            Wake::Unregister(Some(event)) => self.handle_unregister_event(event),
            Wake::Unregister(None) => {
                warn!("un-REGISTER transaction closed without a final event");
                self.handle_unregister_event(TransactionEvent::TransportError);
            }
            Wake::Renewal(true) => self.on_renewal_timer(),
            Wake::Renewal(false) => self.renewal = None,
        }
        true
    }

    /// 续订定时器到期
    pub fn on_renewal_timer(&mut self) {
        self.renewal = None;

        if self.user_agent.has_registration_expiring_listener() {
            self.user_agent.registration_expiring();
        } else {
            self.register();
        }
    }

    /// 处理 REGISTER 事务的事件
    pub fn handle_register_event(&mut self, event: TransactionEvent) {
        match event {
            TransactionEvent::Timeout => {
                self.register_tx = None;
                self.registration_failure(
                    &synthesize_response(408),
                    RegistrationCause::RequestTimeout,
                );
            }
            TransactionEvent::TransportError => {
                self.register_tx = None;
                self.registration_failure(
                    &synthesize_response(500),
                    RegistrationCause::ConnectionError,
                );
            }
            TransactionEvent::Authenticated => self.cseq += 1,
            TransactionEvent::Response(response) => self.receive_register_response(response),
        }
    }

    fn receive_register_response(&mut self, response: Response) {
        let cseq = response_cseq(&response);
        if cseq != Some(self.cseq) {
            debug!(
                "discarding response with cseq {:?}, current {}",
                cseq, self.cseq
            );
            return;
        }

        let code = status_code(&response);
        if code >= 200 {
            self.register_tx = None;
        }
        self.cancel_renewal();

        match code {
            100..=199 => {}
            200..=299 => self.register_success(&response),
            423 => match header_value(&response.headers, "Min-Expires") {
                Some(min_expires) => {
                    self.expires = clamp_expires(min_expires);
                    info!("interval too brief, retrying with expires={}", self.expires);
                    self.registering = false;
                    self.register();
                }
                None => {
                    warn!("423 response without Min-Expires header");
                    self.registration_failure(&response, RegistrationCause::SipFailureCode);
                }
            },
            _ => self.registration_failure(&response, RegistrationCause::from_status(code)),
        }
    }

    fn register_success(&mut self, response: &Response) {
        self.registering = false;

        if !has_contact(response) {
            debug!("no Contact header in response to REGISTER, response ignored");
            return;
        }

        let contacts = response_contacts(response);
        let Some(contact) = contacts
            .iter()
            .find(|contact| contact.uri.user() == self.local_user.as_deref())
        else {
            debug!("no Contact header pointing to us, response ignored");
            return;
        };

        let expires = contact
            .expires()
            .or_else(|| header_value(&response.headers, "Expires"))
            .map(clamp_expires)
            .unwrap_or_else(|| self.expires.max(MIN_EXPIRES));

        let delay = Duration::from_millis(renewal_delay_ms(expires));
        debug!("registered for {}s, renewing in {:?}", expires, delay);
        self.renewal = Some(self.scheduler.schedule(delay));

        if let Some(gruu) = contact.temp_gruu() {
            self.user_agent.set_gruu(Gruu::Temp(gruu));
        }
        if let Some(gruu) = contact.pub_gruu() {
            self.user_agent.set_gruu(Gruu::Pub(gruu));
        }

        if !self.registered {
            self.registered = true;
            info!("registration success: expires={}", expires);
            self.user_agent.registered(response);
        }
    }

    fn registration_failure(&mut self, response: &Response, cause: RegistrationCause) {
        warn!("registration failed: {}", cause);
        self.registering = false;
        self.user_agent.registration_failed(response, cause);

        if self.registered {
            self.registered = false;
            self.user_agent.unregistered(Some(response), Some(cause));
        }
    }

    /// 处理注销事务的事件
    ///
    /// 不做 CSeq 校验，任何最终响应都结束注销流程
    pub fn handle_unregister_event(&mut self, event: TransactionEvent) {
        match event {
            TransactionEvent::Timeout => {
                self.unregister_tx = None;
                self.unregistered(None, Some(RegistrationCause::RequestTimeout));
            }
            TransactionEvent::TransportError => {
                self.unregister_tx = None;
                self.unregistered(None, Some(RegistrationCause::ConnectionError));
            }
            TransactionEvent::Authenticated => self.cseq += 1,
            TransactionEvent::Response(response) => {
                let code = status_code(&response);
                if code < 200 {
                    return;
                }
                self.unregister_tx = None;
                if (200..300).contains(&code) {
                    self.unregistered(Some(&response), None);
                } else {
                    self.unregistered(
                        Some(&response),
                        Some(RegistrationCause::from_status(code)),
                    );
                }
            }
        }
    }

    fn unregistered(&mut self, response: Option<&Response>, cause: Option<RegistrationCause>) {
        info!("unregistered: cause={:?}", cause);
        self.registered = false;
        self.user_agent.unregistered(response, cause);
    }

    fn cancel_renewal(&mut self) {
        if let Some(timer) = self.renewal.take() {
            timer.cancel();
        }
    }
}
