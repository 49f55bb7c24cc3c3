/// 有序参数容器
///
/// 用于 Contact header 参数和 URI 参数，保持插入顺序，
/// 序列化为 `;key` 或 `;key=value`
use std::fmt;

/// 有序的 key/value 参数列表
///
/// SIP 参数名大小写不敏感；同名参数再次 `set` 时原位覆盖（last write wins）。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, Option<String>)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置参数，已存在则覆盖值并保持原位置
    pub fn set(&mut self, key: impl Into<String>, value: Option<impl Into<String>>) {
        let key = key.into();
        let value = value.map(Into::into);
        match self.position(&key) {
            Some(idx) => self.entries[idx].1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// 设置无值参数 (`;lr` 这种形式)
    pub fn set_flag(&mut self, key: impl Into<String>) {
        self.set(key, None::<String>);
    }

    /// 读取参数值
    ///
    /// - `None`: 参数不存在
    /// - `Some(None)`: 参数存在但无值
    pub fn get(&self, key: &str) -> Option<Option<&str>> {
        self.position(key)
            .map(|idx| self.entries[idx].1.as_deref())
    }

    /// 读取参数值，无值参数视为不存在
    pub fn value(&self, key: &str) -> Option<&str> {
        self.get(key).flatten()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<Option<String>> {
        self.position(key).map(|idx| self.entries.remove(idx).1)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// 用另一组参数覆盖当前参数（逐项 set）
    pub fn extend_from(&mut self, other: &Params) {
        for (key, value) in other.iter() {
            self.set(key, value);
        }
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(key))
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.entries {
            match value {
                Some(value) => write!(f, ";{}={}", key, value)?,
                None => write!(f, ";{}", key)?,
            }
        }
        Ok(())
    }
}

impl<K, V> FromIterator<(K, Option<V>)> for Params
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, Option<V>)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (key, value) in iter {
            params.set(key, value);
        }
        params
    }
}

/// 去掉参数值两侧的双引号
pub fn unquote(value: &str) -> String {
    value.replace('"', "")
}
