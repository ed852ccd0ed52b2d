use super::{InvalidMethod, StatusCode};
use std::{borrow::Cow, error, fmt, io};
use thiserror::Error as ThisError;

/// HTTP 响应错误类型
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// 非法或不支持的 HTTP 方法
    InvalidMethod,

    /// 非法的 URL
    InvalidURL,

    /// 协议错误，该协议不能支持或响应格式已损坏
    ProtocolError,

    /// 服务器返回了错误的状态码
    StatusCodeError,

    /// 网络连接失败
    ConnectError,

    /// 代理连接失败
    ProxyError,

    /// 域名解析失败
    UnknownHostError,

    /// 发送失败
    SendError,

    /// 接受失败
    ReceiveError,

    /// 超时失败
    TimeoutError,

    /// SSL 错误
    SSLError,

    /// 重定向次数过多
    TooManyRedirect,

    /// 本地 IO 失败
    LocalIOError,

    /// 用户取消
    UserCanceled,

    /// 未知错误
    UnknownError,
}

/// 错误分类
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// 连接级错误，包括域名解析、连接、收发与超时
    Connection,
    /// 协议级错误
    Protocol,
    /// 用户通过进度回调取消
    Cancellation,
    /// 本地文件读写错误
    LocalIO,
    /// 请求在发出前即被判定为非法
    Configuration,
}

impl ErrorKind {
    /// 获取错误所属分类
    pub fn category(self) -> ErrorCategory {
        match self {
            ErrorKind::InvalidMethod | ErrorKind::InvalidURL => ErrorCategory::Configuration,
            ErrorKind::ProtocolError | ErrorKind::StatusCodeError => ErrorCategory::Protocol,
            ErrorKind::UserCanceled => ErrorCategory::Cancellation,
            ErrorKind::LocalIOError => ErrorCategory::LocalIO,
            ErrorKind::ConnectError
            | ErrorKind::ProxyError
            | ErrorKind::UnknownHostError
            | ErrorKind::SendError
            | ErrorKind::ReceiveError
            | ErrorKind::TimeoutError
            | ErrorKind::SSLError
            | ErrorKind::TooManyRedirect
            | ErrorKind::UnknownError => ErrorCategory::Connection,
        }
    }
}

/// 服务器返回了非成功状态码
#[derive(Debug, Clone, ThisError)]
#[error("{url} responded {status_code} {message}")]
pub struct StatusError {
    status_code: StatusCode,
    message: Box<str>,
    url: Box<str>,
}

impl StatusError {
    /// 获取状态码
    #[inline]
    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    /// 获取状态行中捕获的原因短语
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 获取请求的 URL
    #[inline]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[derive(Debug, ThisError)]
#[error("{0}")]
struct Message(Cow<'static, str>);

/// HTTP 响应错误
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    error: Box<dyn error::Error + Send + Sync>,
    status_code: Option<StatusCode>,
    errno: Option<i32>,
}

impl Error {
    /// 创建 HTTP 响应错误
    #[inline]
    pub fn new(kind: ErrorKind, err: impl Into<Box<dyn error::Error + Send + Sync>>) -> Self {
        Error {
            kind,
            error: err.into(),
            status_code: None,
            errno: None,
        }
    }

    /// 以错误描述创建 HTTP 响应错误
    #[inline]
    pub fn msg(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(kind, Message(message.into()))
    }

    /// 创建状态码错误
    pub fn status(
        status_code: StatusCode,
        message: impl Into<Box<str>>,
        url: impl Into<Box<str>>,
    ) -> Self {
        let mut err = Self::new(
            ErrorKind::StatusCodeError,
            StatusError {
                status_code,
                message: message.into(),
                url: url.into(),
            },
        );
        err.status_code = Some(status_code);
        err
    }

    /// 创建用户取消错误
    #[inline]
    pub fn canceled() -> Self {
        Self::msg(ErrorKind::UserCanceled, "transfer canceled by progress callback")
    }

    /// 从本地 IO 错误创建，保留系统错误码
    #[inline]
    pub fn local_io(err: io::Error) -> Self {
        let errno = err.raw_os_error();
        Self::new(ErrorKind::LocalIOError, err).with_errno(errno)
    }

    /// 附加系统错误码
    #[inline]
    #[must_use]
    pub fn with_errno(mut self, errno: Option<i32>) -> Self {
        if errno.is_some() {
            self.errno = errno;
        }
        self
    }

    /// 获取 HTTP 响应错误类型
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取 HTTP 响应错误分类
    #[inline]
    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// 获取状态码，仅状态码错误存在
    #[inline]
    pub fn status_code(&self) -> Option<StatusCode> {
        self.status_code
    }

    /// 获取状态行中捕获的原因短语
    #[inline]
    pub fn status_message(&self) -> Option<&str> {
        self.error
            .downcast_ref::<StatusError>()
            .map(|err| err.message())
    }

    /// 获取底层系统错误码
    #[inline]
    pub fn errno(&self) -> Option<i32> {
        self.errno
    }

    /// 映射到系统错误码
    ///
    /// 状态码错误按 401/403/407 => EPERM，404 => ENOENT，405 => EINVAL，501 => ENOTSUP 映射，
    /// 其他错误返回底层系统错误码
    pub fn system_errno(&self) -> Option<i32> {
        match self.status_code {
            Some(401 | 403 | 407) => Some(libc::EPERM),
            Some(404) => Some(libc::ENOENT),
            Some(405) => Some(libc::EINVAL),
            Some(501) => Some(libc::ENOTSUP),
            Some(_) => None,
            None => self.errno,
        }
    }

    /// 将错误转换为非正数的状态值
    ///
    /// 协议错误返回 `-状态码`，携带系统错误码时返回 `-errno`，
    /// 用户取消返回 `-ECANCELED`，配置错误返回 `-EINVAL`，其他返回 `-1`
    pub fn status_value(&self) -> i64 {
        if let Some(status_code) = self.status_code {
            return -i64::from(status_code);
        }
        match self.category() {
            ErrorCategory::Cancellation => -i64::from(libc::ECANCELED),
            ErrorCategory::Configuration => -i64::from(libc::EINVAL),
            _ => self.errno.map_or(-1, |errno| -i64::from(errno)),
        }
    }

    #[inline]
    pub fn into_inner(self) -> Box<dyn error::Error + Send + Sync> {
        self.error
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl error::Error for Error {
    #[inline]
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(self.error.as_ref())
    }
}

impl From<InvalidMethod> for Error {
    #[inline]
    fn from(err: InvalidMethod) -> Self {
        Self::new(ErrorKind::InvalidMethod, err)
    }
}

impl From<url::ParseError> for Error {
    #[inline]
    fn from(err: url::ParseError) -> Self {
        Self::new(ErrorKind::InvalidURL, err)
    }
}

impl From<io::Error> for Error {
    #[inline]
    fn from(err: io::Error) -> Self {
        Self::local_io(err)
    }
}

/// 传输结果
pub type TransferResult<T> = Result<T, Error>;

/// 将传输结果压平为状态值
///
/// 成功时返回正的状态码，失败时返回 [`Error::status_value`]
pub trait StatusValue {
    /// 转换为状态值
    fn into_status_value(self) -> i64;
}

impl StatusValue for TransferResult<StatusCode> {
    #[inline]
    fn into_status_value(self) -> i64 {
        match self {
            Ok(status_code) => i64::from(status_code),
            Err(err) => err.status_value(),
        }
    }
}
