/// 工具函数模块
///
/// Call-ID、实例 ID、本地地址探测和日志初始化

use std::net::IpAddr;
use tracing::Level;
use uuid::Uuid;

/// Call-ID 长度
pub const CALL_ID_LENGTH: usize = 22;

/// 生成注册用的 Call-ID（22 位随机 token，在注册器生命周期内保持不变）
pub fn make_call_id() -> String {
    rsipstack::transaction::random_text(CALL_ID_LENGTH)
}

/// 生成 `+sip.instance` 使用的实例 ID
pub fn make_instance_id() -> String {
    Uuid::new_v4().to_string()
}

/// 获取第一个非回环的网络接口 IP 地址
///
/// 遍历系统所有网络接口，返回第一个非回环的 IPv4 地址
///
/// # 示例
/// ```rust,no_run
/// use sip_registrator::utils::get_first_non_loopback_interface;
///
/// let local_ip = get_first_non_loopback_interface().unwrap();
/// println!("本地IP: {}", local_ip);
/// ```
pub fn get_first_non_loopback_interface() -> Result<IpAddr, Box<dyn std::error::Error>> {
    for interface in get_if_addrs::get_if_addrs()? {
        if !interface.is_loopback() {
            match interface.addr {
                get_if_addrs::IfAddr::V4(ref addr) => return Ok(IpAddr::V4(addr.ip)),
                _ => continue,
            }
        }
    }
    Err("未找到 IPv4 接口".into())
}

/// 初始化日志输出
///
/// 无法识别的级别按 info 处理
pub fn initialize_logging(level: &str) {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}
