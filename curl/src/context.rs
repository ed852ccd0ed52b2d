use super::trace::{trace_event, trace_payload};
use cget_http::{ResponseError, ResponseErrorKind, TransferHandler, TransportConfig};
use curl::easy::{Handler, InfoType, ReadError, WriteError};
use log::debug;
use std::time::{Duration, Instant};

/// 请求体发送停滞检测
///
/// 请求体尚未发送完毕且已发送字节数在 `timeout` 内没有增长时判定为发送超时。
/// 计时从 libcurl 开始汇报上传总长度时开始，每次有新数据发出时重新计时。
#[derive(Debug)]
pub(crate) struct SendWatchdog {
    timeout: Duration,
    sent: u64,
    since: Option<Instant>,
}

impl SendWatchdog {
    #[inline]
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            sent: 0,
            since: None,
        }
    }

    pub(crate) fn check(&mut self, sent: u64, total: u64, now: Instant) -> Result<(), ResponseError> {
        if self.timeout.is_zero() || total == 0 || sent >= total {
            self.since = None;
            return Ok(());
        }
        match self.since {
            Some(since) if sent == self.sent => {
                let stalled = now.saturating_duration_since(since);
                if stalled >= self.timeout {
                    debug!("Request body stalled at {}/{} bytes for {:?}", sent, total, stalled);
                    return Err(ResponseError::msg(
                        ResponseErrorKind::TimeoutError,
                        format!("no request body was sent in {:?}", self.timeout),
                    )
                    .with_errno(Some(libc::ETIMEDOUT)));
                }
            }
            _ => {
                self.sent = sent;
                self.since = Some(now);
            }
        }
        Ok(())
    }
}

/// 传输回调上下文
///
/// 处理器返回的错误在此处被捕获，回调只向 libcurl 返回中止信号
pub(crate) struct Context<'h> {
    handler: &'h mut dyn TransferHandler,
    error: Option<ResponseError>,
    trace_payload: bool,
    send_watchdog: SendWatchdog,
}

impl<'h> Context<'h> {
    #[inline]
    pub(crate) fn new(handler: &'h mut dyn TransferHandler, config: &TransportConfig) -> Self {
        Self {
            handler,
            error: None,
            trace_payload: config.trace_payload(),
            send_watchdog: SendWatchdog::new(config.send_timeout()),
        }
    }

    #[inline]
    pub(crate) fn take_error(&mut self) -> Option<ResponseError> {
        self.error.take()
    }

    #[inline]
    fn capture(&mut self, err: ResponseError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }
}

impl Handler for Context<'_> {
    fn write(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        if self.error.is_some() {
            return Ok(0);
        }
        match self.handler.receive_body(data) {
            Ok(()) => Ok(data.len()),
            Err(err) => {
                self.capture(err);
                Ok(0)
            }
        }
    }

    fn read(&mut self, data: &mut [u8]) -> Result<usize, ReadError> {
        if self.error.is_some() {
            return Err(ReadError::Abort);
        }
        match self.handler.read_request_body(data) {
            Ok(len) => {
                if self.trace_payload && len > 0 {
                    trace_payload(&data[..len]);
                    self.trace_payload = false;
                }
                Ok(len)
            }
            Err(err) => {
                self.capture(err);
                Err(ReadError::Abort)
            }
        }
    }

    fn header(&mut self, line: &[u8]) -> bool {
        if self.error.is_some() {
            return false;
        }
        match self.handler.receive_header_line(line) {
            Ok(()) => true,
            Err(err) => {
                self.capture(err);
                false
            }
        }
    }

    fn progress(&mut self, _dltotal: f64, _dlnow: f64, ultotal: f64, ulnow: f64) -> bool {
        if self.error.is_some() {
            return false;
        }
        match self
            .send_watchdog
            .check(ulnow as u64, ultotal as u64, Instant::now())
        {
            Ok(()) => true,
            Err(err) => {
                self.capture(err);
                false
            }
        }
    }

    #[inline]
    fn debug(&mut self, kind: InfoType, data: &[u8]) {
        trace_event(kind, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_watchdog() {
        let begin = Instant::now();
        let second = Duration::from_secs(1);
        let mut watchdog = SendWatchdog::new(second);

        // 尚未开始上传
        assert!(watchdog.check(0, 0, begin + 5 * second).is_ok());

        assert!(watchdog.check(0, 100, begin).is_ok());
        assert!(watchdog.check(10, 100, begin + second / 2).is_ok());
        assert!(watchdog.check(10, 100, begin + second).is_ok());
        let err = watchdog
            .check(10, 100, begin + second * 3 / 2)
            .unwrap_err();
        assert_eq!(err.kind(), ResponseErrorKind::TimeoutError);
        assert_eq!(err.errno(), Some(libc::ETIMEDOUT));

        // 请求体发送完毕后只等待响应，不再检测
        assert!(watchdog.check(100, 100, begin + 10 * second).is_ok());
        assert!(SendWatchdog::new(Duration::ZERO)
            .check(0, 100, begin)
            .is_ok());
    }
}
