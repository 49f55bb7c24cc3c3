/// Contact header 模型
///
/// 只覆盖注册流程需要的部分：name-addr / addr-spec、URI 参数和 header 参数。
/// 序列化统一输出 name-addr 形式。
use super::params::{unquote, Params};
use crate::error::ContactParseError;
use std::fmt;

/// Contact 中的 SIP URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactUri {
    pub scheme: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// host 或 host:port
    pub host: String,
    pub params: Params,
    /// `?` 之后的 URI headers 原文
    pub headers: Option<String>,
}

impl ContactUri {
    /// 解析一个 addr-spec（不含 `<>`）
    pub fn parse(input: &str) -> Result<Self, ContactParseError> {
        let input = input.trim();
        let (scheme, rest) = input
            .split_once(':')
            .filter(|(scheme, _)| is_scheme(scheme))
            .ok_or_else(|| ContactParseError::MissingScheme(input.to_string()))?;

        let (rest, headers) = match rest.split_once('?') {
            Some((rest, headers)) => (rest, Some(headers.to_string())),
            None => (rest, None),
        };

        let (user, password, host_and_params) = match rest.split_once('@') {
            Some((userinfo, host_and_params)) => {
                let (user, password) = match userinfo.split_once(':') {
                    Some((user, password)) => (user, Some(password.to_string())),
                    None => (userinfo, None),
                };
                (Some(user.to_string()), password, host_and_params)
            }
            None => (None, None, rest),
        };

        let mut parts = split_outside_quotes(host_and_params, ';').into_iter();
        let host = parts.next().unwrap_or_default().trim().to_string();
        if host.is_empty() {
            return Err(ContactParseError::MissingHost(input.to_string()));
        }

        let mut params = Params::new();
        for part in parts {
            push_param(&mut params, &part);
        }

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            user,
            password,
            host,
            params,
            headers,
        })
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }
}

impl fmt::Display for ContactUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme)?;
        if let Some(user) = &self.user {
            write!(f, "{}", user)?;
            if let Some(password) = &self.password {
                write!(f, ":{}", password)?;
            }
            write!(f, "@")?;
        }
        write!(f, "{}{}", self.host, self.params)?;
        if let Some(headers) = &self.headers {
            write!(f, "?{}", headers)?;
        }
        Ok(())
    }
}

impl TryFrom<&rsip::Uri> for ContactUri {
    type Error = ContactParseError;

    fn try_from(uri: &rsip::Uri) -> Result<Self, Self::Error> {
        ContactUri::parse(&uri.to_string())
    }
}

/// 单个 Contact 条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactHeader {
    pub display_name: Option<String>,
    pub uri: ContactUri,
    pub params: Params,
}

impl ContactHeader {
    pub fn new(uri: ContactUri) -> Self {
        Self {
            display_name: None,
            uri,
            params: Params::new(),
        }
    }

    /// 解析单个 contact-param
    pub fn parse(input: &str) -> Result<Self, ContactParseError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ContactParseError::Empty);
        }

        let (display_name, rest) = if let Some(stripped) = input.strip_prefix('"') {
            let end = closing_quote(stripped).ok_or(ContactParseError::UnterminatedQuote)?;
            (
                Some(stripped[..end].to_string()),
                stripped[end + 1..].trim_start(),
            )
        } else {
            // addr-spec 的参数里也可能出现 `<`（如 +sip.instance），只认 `;` 之前的
            match input.find('<').filter(|&idx| !input[..idx].contains(';')) {
                Some(idx) if idx > 0 => {
                    let name = input[..idx].trim();
                    (
                        (!name.is_empty()).then(|| name.to_string()),
                        &input[idx..],
                    )
                }
                _ => (None, input),
            }
        };

        let (uri, header_params) = if let Some(stripped) = rest.strip_prefix('<') {
            let end = stripped
                .find('>')
                .ok_or(ContactParseError::UnterminatedAngle)?;
            (ContactUri::parse(&stripped[..end])?, &stripped[end + 1..])
        } else {
            // addr-spec 形式下 `;` 之后都是 header 参数
            match rest.find(';') {
                Some(idx) => (ContactUri::parse(&rest[..idx])?, &rest[idx..]),
                None => (ContactUri::parse(rest)?, ""),
            }
        };

        let mut params = Params::new();
        for part in split_outside_quotes(header_params, ';') {
            push_param(&mut params, &part);
        }

        Ok(Self {
            display_name,
            uri,
            params,
        })
    }

    /// `expires` header 参数
    pub fn expires(&self) -> Option<&str> {
        self.params.value("expires")
    }

    /// 去引号后的 `temp-gruu` 参数
    pub fn temp_gruu(&self) -> Option<String> {
        self.params.value("temp-gruu").map(unquote)
    }

    /// 去引号后的 `pub-gruu` 参数
    pub fn pub_gruu(&self) -> Option<String> {
        self.params.value("pub-gruu").map(unquote)
    }
}

impl fmt::Display for ContactHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.display_name {
            write!(f, "\"{}\" ", name)?;
        }
        write!(f, "<{}>{}", self.uri, self.params)
    }
}

impl std::str::FromStr for ContactHeader {
    type Err = ContactParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContactHeader::parse(s)
    }
}

/// 解析一个 Contact header 值（可能包含多个逗号分隔的条目）
pub fn parse_contacts(value: &str) -> Result<Vec<ContactHeader>, ContactParseError> {
    split_outside_quotes(value, ',')
        .iter()
        .filter(|part| !part.trim().is_empty())
        .map(|part| ContactHeader::parse(part))
        .collect()
}

/// GRUU 类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gruu {
    Temp(String),
    Pub(String),
}

/// User Agent 的本地 Contact 描述
///
/// 注册成功后由注册器回写 GRUU 字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalContact {
    pub uri: ContactUri,
    pub temp_gruu: Option<String>,
    pub pub_gruu: Option<String>,
}

impl LocalContact {
    pub fn new(uri: ContactUri) -> Self {
        Self {
            uri,
            temp_gruu: None,
            pub_gruu: None,
        }
    }

    pub fn user(&self) -> Option<&str> {
        self.uri.user()
    }

    pub fn apply_gruu(&mut self, gruu: Gruu) {
        match gruu {
            Gruu::Temp(value) => self.temp_gruu = Some(value),
            Gruu::Pub(value) => self.pub_gruu = Some(value),
        }
    }

    /// 不带 header 参数的 Contact
    pub fn to_header(&self) -> ContactHeader {
        ContactHeader::new(self.uri.clone())
    }
}

fn is_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn closing_quote(input: &str) -> Option<usize> {
    let mut escaped = false;
    for (idx, c) in input.char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            '"' if !escaped => return Some(idx),
            _ => escaped = false,
        }
    }
    None
}

fn push_param(params: &mut Params, raw: &str) {
    let raw = raw.trim();
    if raw.is_empty() {
        return;
    }
    match raw.split_once('=') {
        Some((key, value)) => params.set(key.trim(), Some(value.trim())),
        None => params.set_flag(raw),
    }
}

/// 按分隔符切分，忽略引号和尖括号内部的分隔符
fn split_outside_quotes(input: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut angle_depth = 0usize;

    for c in input.chars() {
        if in_quotes {
            current.push(c);
            match c {
                '\\' if !escaped => escaped = true,
                '"' if !escaped => in_quotes = false,
                _ => escaped = false,
            }
            continue;
        }
        match c {
            '"' => {
                in_quotes = true;
                current.push(c);
            }
            '<' => {
                angle_depth += 1;
                current.push(c);
            }
            '>' => {
                angle_depth = angle_depth.saturating_sub(1);
                current.push(c);
            }
            c if c == separator && angle_depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}
