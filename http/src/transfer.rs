use super::{Request, ResponseError, StatusCode, TransferResult, TransportConfig};
use url::Url;

/// 单次传输的可变状态
///
/// 由正在执行的传输独占，传输开始时创建，结束时销毁
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransferState {
    current: u64,
    total: u64,
    status_code: Option<StatusCode>,
    message: String,
    errno: Option<i32>,
}

impl TransferState {
    /// 已传输的字节数
    #[inline]
    pub fn current(&self) -> u64 {
        self.current
    }

    /// 声明的总长度，0 表示未知
    #[inline]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// 最终状态码
    #[inline]
    pub fn status_code(&self) -> Option<StatusCode> {
        self.status_code
    }

    /// 状态行中的原因短语
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 捕获到的系统错误码
    #[inline]
    pub fn errno(&self) -> Option<i32> {
        self.errno
    }

    /// 累加已传输字节数，返回累加后的值
    #[inline]
    pub fn advance(&mut self, bytes: u64) -> u64 {
        self.current = self.current.saturating_add(bytes);
        self.current
    }

    #[inline]
    pub fn set_total(&mut self, total: u64) {
        self.total = total;
    }

    /// 开始新一轮响应（例如重定向后），重置状态行信息
    #[inline]
    pub fn begin_response(&mut self, status_code: StatusCode, message: &str) {
        self.status_code = Some(status_code);
        self.message.clear();
        self.message.push_str(message);
        self.current = 0;
        self.total = 0;
    }

    #[inline]
    pub fn set_status_code(&mut self, status_code: StatusCode) {
        self.status_code = Some(status_code);
    }

    #[inline]
    pub fn set_errno(&mut self, errno: Option<i32>) {
        self.errno = errno;
    }
}

/// 传输过程中由传输层调用的处理器
///
/// 传输层在回调边界捕获处理器返回的错误，不会让错误跨越原生回调
pub trait TransferHandler {
    /// 拉取请求体，写入 `buf` 并返回写入字节数，返回 0 表示请求体结束
    fn read_request_body(&mut self, buf: &mut [u8]) -> Result<usize, ResponseError>;

    /// 接收一行原始响应头，包括状态行
    fn receive_header_line(&mut self, line: &[u8]) -> Result<(), ResponseError>;

    /// 接收一块响应体
    fn receive_body(&mut self, chunk: &[u8]) -> Result<(), ResponseError>;
}

/// 传输层
///
/// 每个构建只编译一个具体实现
pub trait Transport: Send + Sync {
    /// 执行一次完整的 HTTP 事务，返回最终状态码
    ///
    /// 仅在连接、收发或回调失败时返回错误，非 2xx 状态码由调用方判定
    fn perform(
        &self,
        url: &Url,
        request: &Request,
        handler: &mut dyn TransferHandler,
    ) -> TransferResult<StatusCode>;

    /// 获取传输配置
    fn config(&self) -> &TransportConfig;
}
