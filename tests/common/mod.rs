//! 集成测试公共夹具
#![allow(dead_code)]

use rsip::{Header, Request, Response};
use sip_registrator::registration::{
    header_value, synthesize_response, ChannelUserAgent, ManualScheduler, Registrator,
    RequestSender, Transaction, TransactionEvent, TransactionEventSender, UserAgentEvent,
};
use sip_registrator::RegistratorConfig;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedReceiver;

pub const INSTANCE_ID: &str = "f81d4fae-7dec-11d0-a765-00a0c91e6bf6";

/// 记录发出的请求，并保留每个事务的事件发送端
#[derive(Default)]
pub struct RecordingSender {
    requests: Mutex<Vec<Request>>,
    channels: Mutex<Vec<TransactionEventSender>>,
}

impl RequestSender for RecordingSender {
    fn send(&self, request: Request) -> Transaction {
        let (events, transaction) = Transaction::channel();
        self.requests.lock().unwrap().push(request);
        self.channels.lock().unwrap().push(events);
        transaction
    }
}

impl RecordingSender {
    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn header(&self, index: usize, name: &str) -> Option<String> {
        let requests = self.requests.lock().unwrap();
        header_value(&requests.get(index)?.headers, name).map(str::to_string)
    }

    pub fn last_header(&self, name: &str) -> Option<String> {
        let index = self.count().checked_sub(1)?;
        self.header(index, name)
    }

    /// 向最近一个事务投递事件
    pub fn reply(&self, event: TransactionEvent) {
        let channels = self.channels.lock().unwrap();
        channels
            .last()
            .expect("no transaction sent")
            .send(event)
            .expect("transaction dropped");
    }

    /// 向第 `index` 个事务投递事件（按发送顺序）
    pub fn reply_to(&self, index: usize, event: TransactionEvent) {
        let channels = self.channels.lock().unwrap();
        channels
            .get(index)
            .expect("no such transaction")
            .send(event)
            .expect("transaction dropped");
    }

    /// 关闭最近一个事务的 channel，模拟事务层异常结束
    pub fn drop_last(&self) {
        self.channels.lock().unwrap().pop();
    }
}

pub struct Fixture {
    pub registrator: Registrator,
    pub sender: Arc<RecordingSender>,
    pub scheduler: ManualScheduler,
    pub user_agent: Arc<ChannelUserAgent>,
    pub events: UnboundedReceiver<UserAgentEvent>,
}

pub fn config() -> RegistratorConfig {
    RegistratorConfig::new(
        "sip:example.com",
        "sip:alice@example.com",
        "sip:alice@192.168.1.10:5060",
    )
    .unwrap()
    .with_instance_id(INSTANCE_ID)
}

pub fn fixture() -> Fixture {
    fixture_with(config(), false)
}

pub fn fixture_with(config: RegistratorConfig, expiring_listener: bool) -> Fixture {
    let sender = Arc::new(RecordingSender::default());
    let scheduler = ManualScheduler::new();
    let (user_agent, events) = ChannelUserAgent::new(config.contact.clone());
    let user_agent = Arc::new(user_agent.with_expiring_listener(expiring_listener));
    let registrator = Registrator::new(
        config,
        sender.clone(),
        Arc::new(scheduler.clone()),
        user_agent.clone(),
    );

    Fixture {
        registrator,
        sender,
        scheduler,
        user_agent,
        events,
    }
}

pub fn response(code: u16, cseq: u32, headers: Vec<Header>) -> Response {
    let mut response = synthesize_response(code);
    response
        .headers
        .push(rsip::headers::CSeq::from(format!("{} REGISTER", cseq)).into());
    for header in headers {
        response.headers.push(header);
    }
    response
}

pub fn contact(value: &str) -> Header {
    rsip::headers::Contact::from(value.to_string()).into()
}

pub fn expires(value: u32) -> Header {
    rsip::headers::Expires::from(value).into()
}

pub fn min_expires(value: &str) -> Header {
    Header::Other("Min-Expires".into(), value.into())
}
