use std::{fmt, str::FromStr};
use thiserror::Error;

/// HTTP 方法
///
/// 仅包含传输引擎支持的五种方法，其他方法在发送请求前即被拒绝
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum Method {
    /// GET 方法
    #[default]
    GET,
    /// HEAD 方法
    HEAD,
    /// POST 方法
    POST,
    /// PUT 方法
    PUT,
    /// DELETE 方法
    DELETE,
}

impl Method {
    /// 将 HTTP 方法转换成字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
        }
    }

    /// 该方法是否会发送请求体
    #[inline]
    pub fn sends_body(&self) -> bool {
        matches!(self, Method::POST | Method::PUT)
    }
}

impl FromStr for Method {
    type Err = InvalidMethod;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        [
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::PUT,
            Method::DELETE,
        ]
        .into_iter()
        .find(|method| method.as_str().eq_ignore_ascii_case(value.trim()))
        .ok_or_else(|| InvalidMethod(value.into()))
    }
}

impl AsRef<str> for Method {
    #[inline]
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl PartialEq<str> for Method {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl<'a> PartialEq<&'a str> for Method {
    #[inline]
    fn eq(&self, other: &&'a str) -> bool {
        self.as_str() == *other
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 非法或不支持的 HTTP 方法错误
#[derive(Clone, Debug, Error)]
#[error("Invalid or unsupported HTTP method: {0}")]
pub struct InvalidMethod(Box<str>);

impl InvalidMethod {
    /// 获取被拒绝的方法名称
    #[inline]
    pub fn method(&self) -> &str {
        &self.0
    }
}
