use super::{
    cache::{CacheController, SaveOutcome},
    transfer::Transfer,
};
use cget_curl::CurlTransport;
use cget_http::{
    Headers, NullSink, Progress, Request, ResponseError, Sink, StatusCode, StatusValue,
    TransferResult, Transport, TransportConfig,
};
use log::{debug, info};
use std::path::Path;

/// 最近一次传输的响应信息
#[derive(Debug, Default, Clone)]
pub struct ResponseInfo {
    status_code: Option<StatusCode>,
    message: String,
    headers: Headers,
    content_length: u64,
    transferred: u64,
    errno: Option<i32>,
}

impl ResponseInfo {
    /// 最终状态码
    #[inline]
    pub fn status_code(&self) -> Option<StatusCode> {
        self.status_code
    }

    /// 状态行中的原因短语，HTTP/2 响应为空
    #[inline]
    pub fn status_message(&self) -> &str {
        &self.message
    }

    /// 响应头注册表，不包含 `Content-Length`
    #[inline]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// 响应声明的 Content-Length，未知时为 `None`
    #[inline]
    pub fn content_length(&self) -> Option<u64> {
        Some(self.content_length).filter(|&len| len > 0)
    }

    /// 已接收的响应体字节数
    #[inline]
    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    /// 传输失败时捕获的系统错误码
    #[inline]
    pub fn errno(&self) -> Option<i32> {
        self.errno
    }
}

/// 传输引擎
///
/// 每个实例同一时刻只服务于一次传输，不在线程间共享。
/// 传输过程是同步阻塞的，不会自动重试。
#[derive(Debug)]
pub struct Engine<T: Transport = CurlTransport> {
    transport: T,
    response: ResponseInfo,
}

impl Engine<CurlTransport> {
    /// 以指定配置创建基于 libcurl 的传输引擎
    #[inline]
    pub fn with_config(config: TransportConfig) -> Self {
        Self::new(CurlTransport::new(config))
    }
}

impl Default for Engine<CurlTransport> {
    /// 从环境变量读取配置创建传输引擎
    #[inline]
    fn default() -> Self {
        Self::new(CurlTransport::from_env())
    }
}

impl<T: Transport> Engine<T> {
    /// 创建传输引擎
    #[inline]
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            response: Default::default(),
        }
    }

    /// 获取传输层
    #[inline]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// 最近一次传输的响应信息
    #[inline]
    pub fn response(&self) -> &ResponseInfo {
        &self.response
    }

    /// 最近一次传输的响应头
    #[inline]
    pub fn response_headers(&self) -> &Headers {
        &self.response.headers
    }

    /// 最近一次传输的状态行原因短语
    #[inline]
    pub fn status_message(&self) -> &str {
        &self.response.message
    }

    /// 执行 HTTP 请求，响应体写入 `sink`
    ///
    /// 在读取任何数据前调用一次 `progress.on_download(0, 0)`，此后每收到一块数据调用一次，
    /// 任何一次返回 [`cget_http::CallbackResult::Cancel`] 都会中止传输并返回 [`cget_http::ResponseErrorKind::UserCanceled`] 错误。
    /// 2xx 与 304 视为成功，其他状态码返回状态码错误。
    pub fn perform(
        &mut self,
        request: &Request,
        sink: &mut dyn Sink,
        progress: &mut dyn Progress,
    ) -> TransferResult<StatusCode> {
        self.response = Default::default();
        let url = self.transport.config().resolve_url(request.url())?;
        debug!("{} {}", request.method(), url);

        if progress.on_download(0, 0).is_cancelled() {
            return Err(ResponseError::canceled());
        }

        let payload = if request.method().sends_body() {
            request.body()
        } else {
            &[]
        };
        let mut transfer = Transfer::new(
            request.method(),
            payload,
            sink,
            progress,
            &mut self.response.headers,
        );
        let result = self.transport.perform(&url, request, &mut transfer);
        let mut state = transfer.into_state();
        match &result {
            Ok(status_code) => state.set_status_code(*status_code),
            Err(err) => state.set_errno(err.errno()),
        }

        self.response.status_code = state.status_code();
        self.response.message = state.message().to_owned();
        self.response.content_length = state.total();
        self.response.transferred = state.current();
        self.response.errno = state.errno();

        let status_code = result?;
        self.check_status(status_code, url.as_str())
    }

    fn check_status(&self, status_code: StatusCode, url: &str) -> TransferResult<StatusCode> {
        match status_code {
            200..=299 => {
                info!(
                    "{} responded {} {} ({} bytes)",
                    url, status_code, self.response.message, self.response.transferred
                );
                Ok(status_code)
            }
            304 => {
                info!("{} was not modified", url);
                Ok(status_code)
            }
            _ => {
                info!("{} responded {} {}", url, status_code, self.response.message);
                Err(ResponseError::status(
                    status_code,
                    self.response.message.as_str(),
                    url,
                ))
            }
        }
    }

    /// 探测请求，丢弃响应体且从不返回错误
    ///
    /// 成功时返回正的状态码，失败时返回非正数，约定见 [`ResponseError::status_value`]
    pub fn test(&mut self, request: &Request, progress: &mut dyn Progress) -> i64 {
        self.perform(request, &mut NullSink, progress)
            .into_status_value()
    }

    /// 执行 HTTP 请求并以字符串返回响应体，非 UTF-8 字节被替换
    pub fn get_string(
        &mut self,
        request: &Request,
        progress: &mut dyn Progress,
    ) -> TransferResult<String> {
        let mut body = Vec::new();
        self.perform(request, &mut body, progress)?;
        Ok(match String::from_utf8(body) {
            Ok(body) => body,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        })
    }

    /// 条件下载到本地文件，未修改时不改动目标文件
    #[inline]
    pub fn save(
        &mut self,
        request: &Request,
        destination: impl AsRef<Path>,
        progress: &mut dyn Progress,
    ) -> TransferResult<SaveOutcome> {
        CacheController::new(self).save(request, destination, progress)
    }
}
