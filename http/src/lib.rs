#![deny(unsafe_code)]

//! # cget-http
//!
//! HTTP 传输引擎的公共接口
//!
//! 定义请求、响应头注册表、错误分类、进度回调与响应体接收器，
//! 以及传输层需要实现的 [`Transport`] 接口。

mod callback;
mod config;
mod error;
mod header;
mod method;
mod request;
mod sink;
mod transfer;

pub use callback::{CallbackResult, NoProgress, Progress};
pub use config::{
    Scheme, TransportConfig, TransportConfigBuilder, CONNECT_TIMEOUT_ENV, DEFAULT_SCHEME_ENV,
    RECEIVE_TIMEOUT_ENV, SEND_TIMEOUT_ENV, TIMEOUT_ENV, TRACE_ENV, TRACE_PAYLOAD_ENV,
};
pub use error::{
    Error as ResponseError, ErrorCategory, ErrorKind as ResponseErrorKind, StatusError,
    StatusValue, TransferResult,
};
pub use header::{
    format_http_date, parse_header_line, parse_status_line, parse_timestamp, Header, Headers,
    StatusCode, StatusLine,
};
pub use method::{InvalidMethod, Method};
pub use request::{Credentials, Request, RequestBuilder};
pub use sink::{CallbackSink, NullSink, Sink, WriterSink};
pub use transfer::{TransferHandler, TransferState, Transport};

pub use url::Url;
