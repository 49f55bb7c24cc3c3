/// 注册器任务句柄
///
/// 把注册器放到独立的 tokio 任务里运行，调用方通过命令 channel 操作，
/// 注册状态通过 watch channel 读取
use super::params::Params;
use super::registrator::Registrator;
use crate::error::SipError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug)]
enum Command {
    Register,
    Unregister { all: bool },
    TransportClosed,
    SetExtraHeaders(Vec<String>),
    SetExtraContactParams(Params),
    SetExtraContactUriParams(Params),
}

/// 注册器任务句柄
pub struct RegistratorHandle {
    commands: mpsc::UnboundedSender<Command>,
    registered: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

/// 启动注册器任务
pub fn spawn(registrator: Registrator) -> RegistratorHandle {
    let (commands, rx) = mpsc::unbounded_channel();
    let (state, registered) = watch::channel(registrator.registered());
    let task = tokio::spawn(run(registrator, rx, state));

    RegistratorHandle {
        commands,
        registered,
        task,
    }
}

impl RegistratorHandle {
    pub fn register(&self) -> Result<(), SipError> {
        self.send(Command::Register)
    }

    pub fn unregister(&self, unregister_all: bool) -> Result<(), SipError> {
        self.send(Command::Unregister {
            all: unregister_all,
        })
    }

    pub fn transport_closed(&self) -> Result<(), SipError> {
        self.send(Command::TransportClosed)
    }

    pub fn set_extra_headers(&self, headers: Vec<String>) -> Result<(), SipError> {
        self.send(Command::SetExtraHeaders(headers))
    }

    pub fn set_extra_contact_params(&self, params: Params) -> Result<(), SipError> {
        self.send(Command::SetExtraContactParams(params))
    }

    pub fn set_extra_contact_uri_params(&self, params: Params) -> Result<(), SipError> {
        self.send(Command::SetExtraContactUriParams(params))
    }

    pub fn is_registered(&self) -> bool {
        *self.registered.borrow()
    }

    /// 订阅注册状态变化
    pub fn watch_registered(&self) -> watch::Receiver<bool> {
        self.registered.clone()
    }

    /// 关闭注册器：已注册时注销，等待注销事务结束后任务退出
    pub async fn close(self) {
        drop(self.commands);
        if let Err(e) = self.task.await {
            debug!("registrator task ended abnormally: {}", e);
        }
    }

    fn send(&self, command: Command) -> Result<(), SipError> {
        self.commands
            .send(command)
            .map_err(|_| SipError::Other("registrator task stopped".into()))
    }
}

async fn run(
    mut registrator: Registrator,
    mut commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<bool>,
) {
    loop {
        let busy = registrator.has_pending_work();
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => apply(&mut registrator, command),
                None => break,
            },
            _ = registrator.next_event(), if busy => {}
        }
        state.send_replace(registrator.registered());
    }

    info!("closing registrator");
    registrator.close();
    // 等待注销事务完成（或超时）
    while registrator.unregistering() {
        if !registrator.next_event().await {
            break;
        }
    }
    state.send_replace(registrator.registered());
}

fn apply(registrator: &mut Registrator, command: Command) {
    debug!("registrator command: {:?}", command);
    match command {
        Command::Register => registrator.register(),
        Command::Unregister { all } => registrator.unregister(all),
        Command::TransportClosed => registrator.on_transport_closed(),
        Command::SetExtraHeaders(headers) => registrator.set_extra_headers(headers),
        Command::SetExtraContactParams(params) => registrator.set_extra_contact_params(params),
        Command::SetExtraContactUriParams(params) => {
            registrator.set_extra_contact_uri_params(&params)
        }
    }
}
