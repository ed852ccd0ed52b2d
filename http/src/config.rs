use super::{ResponseError, ResponseErrorKind};
use log::warn;
use std::{env, fmt, str::FromStr, time::Duration};
use url::Url;

/// 连接超时时长环境变量（秒）
pub const CONNECT_TIMEOUT_ENV: &str = "CGET_CONNECT_TIMEOUT";
/// 发送超时时长环境变量（秒）
pub const SEND_TIMEOUT_ENV: &str = "CGET_SEND_TIMEOUT";
/// 接收超时时长环境变量（秒）
pub const RECEIVE_TIMEOUT_ENV: &str = "CGET_RECEIVE_TIMEOUT";
/// 整体超时时长环境变量（秒）
pub const TIMEOUT_ENV: &str = "CGET_TIMEOUT";
/// 启用传输追踪的环境变量
pub const TRACE_ENV: &str = "CGET_TRACE";
/// 追踪时记录请求体的环境变量
pub const TRACE_PAYLOAD_ENV: &str = "CGET_TRACE_PAYLOAD";
/// 默认协议环境变量，`http` 或 `https`
pub const DEFAULT_SCHEME_ENV: &str = "CGET_DEFAULT_SCHEME";

const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_POLL_SLICE: Duration = Duration::from_millis(10);
const DEFAULT_MAX_REDIRECTIONS: u32 = 5;

/// URL 未指定协议时使用的默认协议
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum Scheme {
    /// 明文 HTTP
    #[default]
    Http,
    /// HTTPS
    Https,
}

impl Scheme {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl FromStr for Scheme {
    type Err = ResponseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            s if s.eq_ignore_ascii_case("http") => Ok(Scheme::Http),
            s if s.eq_ignore_ascii_case("https") => Ok(Scheme::Https),
            s => Err(ResponseError::msg(
                ResponseErrorKind::InvalidURL,
                format!("unsupported scheme: {s}"),
            )),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 传输配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    connect_timeout: Duration,
    send_timeout: Duration,
    receive_timeout: Duration,
    timeout: Option<Duration>,
    poll_slice: Duration,
    trace: bool,
    trace_payload: bool,
    default_scheme: Scheme,
    follow_location: bool,
    max_redirections: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_SOCKET_TIMEOUT,
            send_timeout: DEFAULT_SOCKET_TIMEOUT,
            receive_timeout: DEFAULT_SOCKET_TIMEOUT,
            timeout: None,
            poll_slice: DEFAULT_POLL_SLICE,
            trace: false,
            trace_payload: false,
            default_scheme: Scheme::Http,
            follow_location: true,
            max_redirections: DEFAULT_MAX_REDIRECTIONS,
        }
    }
}

impl TransportConfig {
    /// 创建传输配置构建器
    #[inline]
    pub fn builder() -> TransportConfigBuilder {
        TransportConfigBuilder::default()
    }

    /// 从环境变量读取传输配置
    ///
    /// 非法的值会被忽略并记录警告，保留默认值
    #[inline]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(secs) = lookup_parsed::<u64>(&lookup, CONNECT_TIMEOUT_ENV) {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = lookup_parsed::<u64>(&lookup, SEND_TIMEOUT_ENV) {
            config.send_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = lookup_parsed::<u64>(&lookup, RECEIVE_TIMEOUT_ENV) {
            config.receive_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = lookup_parsed::<u64>(&lookup, TIMEOUT_ENV) {
            config.timeout = Some(Duration::from_secs(secs)).filter(|timeout| !timeout.is_zero());
        }
        if let Some(trace) = lookup_flag(&lookup, TRACE_ENV) {
            config.trace = trace;
        }
        if let Some(trace_payload) = lookup_flag(&lookup, TRACE_PAYLOAD_ENV) {
            config.trace_payload = trace_payload;
        }
        if let Some(scheme) = lookup(DEFAULT_SCHEME_ENV) {
            match scheme.parse() {
                Ok(scheme) => config.default_scheme = scheme,
                Err(err) => warn!("Ignore {}: {}", DEFAULT_SCHEME_ENV, err),
            }
        }
        config
    }

    /// 连接超时时长，默认 30 秒
    #[inline]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// 发送超时时长，默认 30 秒
    #[inline]
    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// 接收超时时长，默认 30 秒
    #[inline]
    pub fn receive_timeout(&self) -> Duration {
        self.receive_timeout
    }

    /// 整体传输超时时长，默认不限制
    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// 非阻塞连接的轮询间隔，默认 10 毫秒
    #[inline]
    pub fn poll_slice(&self) -> Duration {
        self.poll_slice
    }

    /// 是否记录传输追踪日志
    #[inline]
    pub fn trace(&self) -> bool {
        self.trace
    }

    /// 追踪时是否记录请求体
    #[inline]
    pub fn trace_payload(&self) -> bool {
        self.trace_payload
    }

    /// URL 未指定协议时使用的协议
    #[inline]
    pub fn default_scheme(&self) -> Scheme {
        self.default_scheme
    }

    /// 是否跟随重定向
    #[inline]
    pub fn follow_location(&self) -> bool {
        self.follow_location
    }

    /// 最大重定向次数
    #[inline]
    pub fn max_redirections(&self) -> u32 {
        self.max_redirections
    }

    /// 解析请求 URL，未指定协议时补全默认协议
    pub fn resolve_url(&self, raw: &str) -> Result<Url, ResponseError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ResponseError::msg(ResponseErrorKind::InvalidURL, "empty url"));
        }
        let url = if raw.contains("://") {
            Url::parse(raw)?
        } else {
            Url::parse(&format!("{}://{}", self.default_scheme, raw))?
        };
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(ResponseError::msg(
                ResponseErrorKind::ProtocolError,
                format!("unsupported protocol: {scheme}"),
            )),
        }
    }
}

fn lookup_parsed<T: FromStr>(lookup: impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T::Err: fmt::Display,
{
    let value = lookup(key)?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            warn!("Ignore {}={:?}: {}", key, value, err);
            None
        }
    }
}

fn lookup_flag(lookup: impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    let value = lookup(key)?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => {
            warn!("Ignore {}={:?}: not a boolean flag", key, value);
            None
        }
    }
}

/// 传输配置构建器
#[derive(Debug, Default)]
pub struct TransportConfigBuilder {
    inner: TransportConfig,
}

impl TransportConfigBuilder {
    /// 设置连接超时时长
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.inner.connect_timeout = timeout;
        self
    }

    /// 设置发送超时时长
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.inner.send_timeout = timeout;
        self
    }

    /// 设置接收超时时长
    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.inner.receive_timeout = timeout;
        self
    }

    /// 设置整体传输超时时长
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.inner.timeout = timeout;
        self
    }

    /// 设置非阻塞连接的轮询间隔，不能为 0
    pub fn poll_slice(mut self, poll_slice: Duration) -> Self {
        if !poll_slice.is_zero() {
            self.inner.poll_slice = poll_slice;
        }
        self
    }

    pub fn trace(mut self, trace: bool) -> Self {
        self.inner.trace = trace;
        self
    }

    pub fn trace_payload(mut self, trace_payload: bool) -> Self {
        self.inner.trace_payload = trace_payload;
        self
    }

    pub fn default_scheme(mut self, scheme: Scheme) -> Self {
        self.inner.default_scheme = scheme;
        self
    }

    pub fn follow_location(mut self, follow_location: bool) -> Self {
        self.inner.follow_location = follow_location;
        self
    }

    pub fn max_redirections(mut self, max_redirections: u32) -> Self {
        self.inner.max_redirections = max_redirections;
        self
    }

    /// 构建传输配置
    pub fn build(self) -> TransportConfig {
        self.inner
    }
}
