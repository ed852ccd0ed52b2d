use super::{Headers, Method, ResponseError};
use assert_impl::assert_impl;
use std::{borrow::Cow, fmt, mem::take};

/// Basic 认证信息
///
/// 由传输层以 HTTP 认证的方式发送，用户名为空时不发送，密码可以为空
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    username: Box<str>,
    password: Box<str>,
}

impl Credentials {
    /// 创建认证信息
    #[inline]
    pub fn new(username: impl Into<Box<str>>, password: impl Into<Box<str>>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// 获取用户名
    #[inline]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// 获取密码
    #[inline]
    pub fn password(&self) -> &str {
        &self.password
    }

    /// 用户名非空
    #[inline]
    pub fn is_usable(&self) -> bool {
        !self.username.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// HTTP 请求
///
/// 在调用方创建，传输过程中只读
#[derive(Clone, Default)]
pub struct Request<'r> {
    url: Cow<'r, str>,
    method: Method,
    headers: Headers,
    body: Cow<'r, [u8]>,
    credentials: Option<Credentials>,
}

impl<'r> Request<'r> {
    /// 创建 HTTP 请求构建器
    #[inline]
    pub fn builder(url: impl Into<Cow<'r, str>>) -> RequestBuilder<'r> {
        RequestBuilder::new(url)
    }

    /// 创建 GET 请求
    #[inline]
    pub fn get(url: impl Into<Cow<'r, str>>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// 请求 URL，可能不包含协议
    #[inline]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// 请求 HTTP 方法
    #[inline]
    pub fn method(&self) -> Method {
        self.method
    }

    /// 请求 HTTP 头
    #[inline]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// 修改请求 HTTP 头
    #[inline]
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// 请求体，仅 POST / PUT 会被发送
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// 认证信息
    #[inline]
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    #[allow(dead_code)]
    fn assert() {
        assert_impl!(Send: Self);
        assert_impl!(Sync: Self);
    }
}

impl fmt::Debug for Request<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Request")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("credentials", &self.credentials)
            .finish()
    }
}

/// HTTP 请求构建器
#[derive(Debug)]
pub struct RequestBuilder<'r> {
    inner: Request<'r>,
    method_error: Option<ResponseError>,
}

impl<'r> RequestBuilder<'r> {
    /// 创建 HTTP 请求构建器
    #[inline]
    pub fn new(url: impl Into<Cow<'r, str>>) -> Self {
        Self {
            inner: Request::get(url),
            method_error: None,
        }
    }

    /// 设置 HTTP 方法
    #[inline]
    pub fn method(&mut self, method: Method) -> &mut Self {
        self.inner.method = method;
        self.method_error = None;
        self
    }

    /// 以字符串设置 HTTP 方法
    ///
    /// 非法或不支持的方法会在 [`RequestBuilder::build`] 时返回错误
    pub fn method_str(&mut self, method: &str) -> &mut Self {
        match method.parse() {
            Ok(method) => {
                self.inner.method = method;
                self.method_error = None;
            }
            Err(err) => self.method_error = Some(ResponseError::from(err)),
        }
        self
    }

    /// 设置请求体
    #[inline]
    pub fn body(&mut self, body: impl Into<Cow<'r, [u8]>>) -> &mut Self {
        self.inner.body = body.into();
        self
    }

    /// 设置 HTTP 头
    #[inline]
    pub fn header(&mut self, name: impl Into<Box<str>>, value: impl Into<Box<str>>) -> &mut Self {
        self.inner.headers.upsert(name, value);
        self
    }

    /// 设置全部 HTTP 头
    #[inline]
    pub fn headers(&mut self, headers: Headers) -> &mut Self {
        self.inner.headers = headers;
        self
    }

    /// 设置 Basic 认证信息
    #[inline]
    pub fn credentials(&mut self, credentials: Credentials) -> &mut Self {
        self.inner.credentials = Some(credentials);
        self
    }

    /// 构建 HTTP 请求
    pub fn build(&mut self) -> Result<Request<'r>, ResponseError> {
        if let Some(err) = self.method_error.take() {
            return Err(err);
        }
        Ok(take(&mut self.inner))
    }
}
