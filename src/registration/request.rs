/// REGISTER 请求构造与响应读取
use super::contact::{parse_contacts, ContactHeader};
use rsip::prelude::UntypedHeader;
use rsip::{Header, Headers, Method, Request, Response, StatusCode, Version};
use rsipstack::transaction::make_tag;
use tracing::warn;

/// 注册间隔下限（秒）
pub const MIN_EXPIRES: u32 = 10;

/// 提前多久触发续订（毫秒）
pub const RENEW_AHEAD_MS: u64 = 5000;

/// REGISTER 请求中固定不变的部分
#[derive(Debug, Clone)]
pub struct RegisterTarget {
    /// Request-URI
    pub registrar: rsip::Uri,
    /// AOR，用于 From/To
    pub to_uri: rsip::Uri,
    pub call_id: String,
}

impl RegisterTarget {
    /// 构造 REGISTER 请求
    ///
    /// header 顺序：To、From、Call-ID、CSeq、Max-Forwards、附加 header、Contact、Expires
    pub fn build(
        &self,
        cseq: u32,
        contact: &str,
        expires: u32,
        extra_headers: &[String],
    ) -> Request {
        let to = rsip::typed::To {
            display_name: None,
            uri: self.to_uri.clone(),
            params: vec![],
        };
        let from = rsip::typed::From {
            display_name: None,
            uri: self.to_uri.clone(),
            params: vec![],
        }
        .with_tag(make_tag());

        let mut headers: Headers = Default::default();
        headers.push(to.into());
        headers.push(from.into());
        headers.push(rsip::headers::CallId::from(self.call_id.clone()).into());
        headers.push(
            rsip::typed::CSeq {
                seq: cseq,
                method: Method::Register,
            }
            .into(),
        );
        headers.push(rsip::headers::MaxForwards::from(70u32).into());

        for line in extra_headers {
            match line.split_once(':') {
                Some((name, value)) => headers.push(Header::Other(
                    name.trim().to_string(),
                    value.trim().to_string(),
                )),
                None => warn!("skip malformed extra header: {}", line),
            }
        }

        headers.push(rsip::headers::Contact::from(contact.to_string()).into());
        headers.push(rsip::headers::Expires::from(expires).into());
        headers.push(rsip::headers::ContentLength::from(0u32).into());

        Request {
            method: Method::Register,
            uri: self.registrar.clone(),
            version: Version::V2,
            headers,
            body: vec![],
        }
    }
}

/// 响应状态码数值
pub fn status_code(response: &Response) -> u16 {
    response.status_code.clone().into()
}

/// 构造本地合成的响应（超时 408、传输错误 500）
pub fn synthesize_response(code: u16) -> Response {
    Response {
        status_code: StatusCode::from(code),
        version: Version::V2,
        headers: Default::default(),
        body: vec![],
    }
}

/// 按名称读取第一个 header 值
///
/// 同时识别 rsip 已知 header 和以 `Header::Other` 形式出现的同名 header
pub fn header_value<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers.iter().find_map(|header| named_value(header, name))
}

fn named_value<'a>(header: &'a Header, name: &str) -> Option<&'a str> {
    let lower = name.to_ascii_lowercase();
    match (header, lower.as_str()) {
        (Header::CSeq(h), "cseq") => Some(h.value()),
        (Header::Contact(h), "contact") => Some(h.value()),
        (Header::Expires(h), "expires") => Some(h.value()),
        (Header::MinExpires(h), "min-expires") => Some(h.value()),
        (Header::Other(key, value), _) if key.eq_ignore_ascii_case(name) => Some(value.as_str()),
        _ => None,
    }
}

/// 响应中的 CSeq 序号
pub fn response_cseq(response: &Response) -> Option<u32> {
    header_value(&response.headers, "CSeq")?
        .split_whitespace()
        .next()?
        .parse()
        .ok()
}

/// 请求中的 CSeq 序号
pub fn request_cseq(request: &Request) -> Option<u32> {
    header_value(&request.headers, "CSeq")?
        .split_whitespace()
        .next()?
        .parse()
        .ok()
}

/// 响应中所有 Contact 条目（跨多个 Contact header）
///
/// 无法解析的条目记录日志后跳过
pub fn response_contacts(response: &Response) -> Vec<ContactHeader> {
    response
        .headers
        .iter()
        .filter_map(|header| named_value(header, "contact"))
        .flat_map(|value| match parse_contacts(value) {
            Ok(contacts) => contacts,
            Err(e) => {
                warn!("invalid Contact header {:?}: {}", value, e);
                vec![]
            }
        })
        .collect()
}

/// 是否带有 Contact header
pub fn has_contact(response: &Response) -> bool {
    header_value(&response.headers, "Contact").is_some()
}

/// 解析间隔数值，失败按 0 处理，再按下限截断
pub fn clamp_expires(raw: &str) -> u32 {
    raw.trim().parse::<u32>().unwrap_or(0).max(MIN_EXPIRES)
}

/// 续订延迟：到期前 5 秒
pub fn renewal_delay_ms(expires: u32) -> u64 {
    (expires as u64 * 1000).saturating_sub(RENEW_AHEAD_MS)
}
