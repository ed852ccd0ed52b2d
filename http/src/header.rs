use chrono::{DateTime, NaiveDateTime, Utc};
use std::{
    fmt,
    slice::Iter,
    str::from_utf8,
    time::SystemTime,
};

/// HTTP 状态码
pub type StatusCode = u16;

/// 单个 HTTP 头
///
/// 名称比较大小写不敏感，但保留首次写入时的原始拼写
#[derive(Clone, PartialEq, Eq)]
pub struct Header {
    name: Box<str>,
    value: Box<str>,
}

impl Header {
    /// 创建 HTTP 头
    #[inline]
    pub fn new(name: impl Into<Box<str>>, value: impl Into<Box<str>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// 获取 HTTP 头名称
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 获取 HTTP 头的值
    #[inline]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// 判断名称是否匹配（大小写不敏感）
    #[inline]
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// HTTP 头注册表
///
/// 有序存储，按名称大小写不敏感查找。同名写入替换已有值，新名称追加在末尾。
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<Header>,
}

impl Headers {
    /// 创建空注册表
    #[inline]
    pub fn new() -> Self {
        Default::default()
    }

    /// 写入 HTTP 头，存在同名项时替换其值，否则追加
    pub fn upsert(&mut self, name: impl Into<Box<str>>, value: impl Into<Box<str>>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.is(&name)) {
            entry.value = value;
        } else {
            self.entries.push(Header { name, value });
        }
        self
    }

    /// 以 HTTP-date 格式写入时间戳
    #[inline]
    pub fn assign(&mut self, name: impl Into<Box<str>>, timestamp: SystemTime) -> &mut Self {
        self.upsert(name, format_http_date(timestamp))
    }

    /// 查找 HTTP 头的值，不存在时返回 `None`
    #[inline]
    pub fn find(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.is(name))
            .map(|entry| entry.value())
    }

    /// 查找 HTTP 头并按 HTTP-date 解析为时间戳
    ///
    /// 值不存在或无法解析时返回 `None`
    pub fn find_timestamp(&self, name: &str) -> Option<SystemTime> {
        self.find(name).and_then(parse_timestamp)
    }

    /// 判断是否包含指定 HTTP 头
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// 移除指定 HTTP 头，返回被移除的值
    pub fn remove(&mut self, name: &str) -> Option<Box<str>> {
        let index = self.entries.iter().position(|entry| entry.is(name))?;
        Some(self.entries.remove(index).value)
    }

    /// 清空注册表
    #[inline]
    pub fn clear(&mut self) {
        self.entries.clear()
    }

    /// 获取 HTTP 头数量
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 注册表是否为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按插入顺序迭代
    #[inline]
    pub fn iter(&self) -> Iter<'_, Header> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a Header;
    type IntoIter = Iter<'a, Header>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<N: Into<Box<str>>, V: Into<Box<str>>> FromIterator<(N, V)> for Headers {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.upsert(name, value);
        }
        headers
    }
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.entries.iter()).finish()
    }
}

/// 将时间戳格式化为 HTTP-date，例如 `Mon, 01 Jan 2024 00:00:00 GMT`
#[inline]
pub fn format_http_date(timestamp: SystemTime) -> String {
    DateTime::<Utc>::from(timestamp)
        .format(IMF_FIXDATE)
        .to_string()
}

/// 解析 HTTP-date，格式非法时返回 `None`
///
/// 除 IMF-fixdate 外也接受过时的 RFC 850 与 asctime 格式
pub fn parse_timestamp(value: &str) -> Option<SystemTime> {
    let value = value.trim();
    [IMF_FIXDATE, RFC_850_DATE, ASCTIME_DATE]
        .into_iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|datetime| SystemTime::from(datetime.and_utc()))
}

const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";
const RFC_850_DATE: &str = "%A, %d-%b-%y %H:%M:%S GMT";
const ASCTIME_DATE: &str = "%a %b %e %H:%M:%S %Y";

/// 状态行，形如 `HTTP/1.1 200 OK`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine<'l> {
    /// 协议版本，例如 `1.1` 或 `2`
    pub version: &'l str,
    /// 状态码
    pub status_code: StatusCode,
    /// 原因短语，服务器未发送时为空
    pub reason: &'l str,
}

#[inline]
pub(crate) fn is_status_line(line: &[u8]) -> bool {
    line.len() >= 5 && line[..5].eq_ignore_ascii_case(b"HTTP/")
}

/// 去除行尾 CR/LF 及首尾空白
#[inline]
pub(crate) fn trim_line(line: &[u8]) -> &[u8] {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |pos| pos + 1);
    &line[start..end]
}

/// 解析三段式状态行 `HTTP/version code reason`
pub fn parse_status_line(line: &[u8]) -> Option<StatusLine<'_>> {
    let line = trim_line(line);
    if !is_status_line(line) {
        return None;
    }
    let line = from_utf8(&line[5..]).ok()?;
    let mut parts = line.splitn(3, ' ');
    let version = parts.next()?;
    let status_code = parts.next()?.trim().parse::<StatusCode>().ok()?;
    // 原因短语中遇到控制字符即截断
    let reason = parts.next().unwrap_or_default().trim();
    let reason = reason
        .find(|c: char| c.is_control())
        .map_or(reason, |end| &reason[..end]);
    Some(StatusLine {
        version,
        status_code,
        reason,
    })
}

/// 按首个冒号拆分响应头行，两侧去除空白
pub fn parse_header_line(line: &[u8]) -> Option<(&str, &str)> {
    let line = from_utf8(trim_line(line)).ok()?;
    let (name, value) = line.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name, value.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_upsert_keeps_order_and_replaces() {
        let mut headers = Headers::new();
        headers
            .upsert("Content-Type", "text/plain")
            .upsert("X-First", "1")
            .upsert("content-type", "application/json");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.find("CONTENT-TYPE"), Some("application/json"));
        let names: Vec<_> = headers.iter().map(|h| h.name()).collect();
        assert_eq!(names, ["Content-Type", "X-First"]);
    }

    #[test]
    fn test_find_is_case_insensitive() {
        let headers: Headers = [("content-type", "text/html")].into_iter().collect();
        assert_eq!(headers.find("Content-Type"), Some("text/html"));
        assert_eq!(headers.find("CONTENT-type"), Some("text/html"));
        assert_eq!(headers.find("Content-Length"), None);
    }

    #[test]
    fn test_assign_timestamp() {
        let mut headers = Headers::new();
        let timestamp = UNIX_EPOCH + Duration::from_secs(1_704_067_200);
        headers.assign("If-Modified-Since", timestamp);
        assert_eq!(
            headers.find("if-modified-since"),
            Some("Mon, 01 Jan 2024 00:00:00 GMT")
        );
        assert_eq!(headers.find_timestamp("If-Modified-Since"), Some(timestamp));
    }

    #[test]
    fn test_parse_obsolete_dates() {
        let timestamp = UNIX_EPOCH + Duration::from_secs(784_111_777);
        assert_eq!(parse_timestamp("Sun, 06 Nov 1994 08:49:37 GMT"), Some(timestamp));
        assert_eq!(parse_timestamp("Sunday, 06-Nov-94 08:49:37 GMT"), Some(timestamp));
        assert_eq!(parse_timestamp("Sun Nov  6 08:49:37 1994"), Some(timestamp));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_remove() {
        let mut headers: Headers = [("A", "1"), ("B", "2")].into_iter().collect();
        assert_eq!(headers.remove("a").as_deref(), Some("1"));
        assert_eq!(headers.remove("a"), None);
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_parse_status_line() {
        let status = parse_status_line(b"HTTP/1.1 404 Not Found\r\n").unwrap();
        assert_eq!(status.version, "1.1");
        assert_eq!(status.status_code, 404);
        assert_eq!(status.reason, "Not Found");

        let status = parse_status_line(b"HTTP/2 200\r\n").unwrap();
        assert_eq!(status.status_code, 200);
        assert_eq!(status.reason, "");

        assert!(parse_status_line(b"Content-Type: text/plain\r\n").is_none());
        assert!(parse_status_line(b"HTTP/1.1 abc\r\n").is_none());
    }

    #[test]
    fn test_parse_header_line() {
        assert_eq!(
            parse_header_line(b"Last-Modified:  Mon, 01 Jan 2024 00:00:00 GMT \r\n"),
            Some(("Last-Modified", "Mon, 01 Jan 2024 00:00:00 GMT"))
        );
        assert_eq!(parse_header_line(b"X-Empty:\r\n"), Some(("X-Empty", "")));
        assert_eq!(parse_header_line(b"\r\n"), None);
        assert_eq!(parse_header_line(b"no delimiter\r\n"), None);
    }
}
