use cget_http::{
    parse_header_line, parse_status_line, Headers, Method, Progress, ResponseError, Sink,
    TransferHandler, TransferState,
};
use log::{debug, trace};

/// 单次传输的回调处理器
///
/// 持有本次传输独占的 [`TransferState`]，将响应头写入引擎的响应头注册表，将响应体交给接收器
pub(crate) struct Transfer<'a> {
    method: Method,
    payload: &'a [u8],
    sent: usize,
    sink: &'a mut dyn Sink,
    progress: &'a mut dyn Progress,
    headers: &'a mut Headers,
    state: TransferState,
    allocated: bool,
}

impl<'a> Transfer<'a> {
    pub(crate) fn new(
        method: Method,
        payload: &'a [u8],
        sink: &'a mut dyn Sink,
        progress: &'a mut dyn Progress,
        headers: &'a mut Headers,
    ) -> Self {
        Self {
            method,
            payload,
            sent: 0,
            sink,
            progress,
            headers,
            state: Default::default(),
            allocated: false,
        }
    }

    #[inline]
    pub(crate) fn into_state(self) -> TransferState {
        self.state
    }

    /// HEAD 请求以及 204、304 响应不携带响应体，Content-Length 仅描述资源本身
    fn has_body(&self) -> bool {
        self.method != Method::HEAD && !matches!(self.state.status_code(), Some(204) | Some(304))
    }

    fn receive_content_length(&mut self, value: &str) -> Result<(), ResponseError> {
        if !self.has_body() {
            return Ok(());
        }
        let total = match value.parse::<u64>() {
            Ok(total) => total,
            Err(err) => {
                debug!("Ignore invalid Content-Length {:?}: {}", value, err);
                return Ok(());
            }
        };
        self.state.set_total(total);
        if self.progress.on_download(0, total).is_continue() {
            Ok(())
        } else {
            Err(ResponseError::canceled())
        }
    }
}

impl TransferHandler for Transfer<'_> {
    fn read_request_body(&mut self, buf: &mut [u8]) -> Result<usize, ResponseError> {
        let remaining = &self.payload[self.sent..];
        let len = remaining.len().min(buf.len());
        buf[..len].copy_from_slice(&remaining[..len]);
        self.sent += len;
        if len > 0
            && self
                .progress
                .on_upload(self.sent as u64, self.payload.len() as u64)
                .is_cancelled()
        {
            return Err(ResponseError::canceled());
        }
        Ok(len)
    }

    fn receive_header_line(&mut self, line: &[u8]) -> Result<(), ResponseError> {
        if let Some(status_line) = parse_status_line(line) {
            trace!(
                "HTTP/{} {} {}",
                status_line.version,
                status_line.status_code,
                status_line.reason
            );
            // 新的状态行意味着新的响应，例如重定向或 100 Continue
            self.headers.clear();
            self.state
                .begin_response(status_line.status_code, status_line.reason);
            self.allocated = false;
            Ok(())
        } else if let Some((name, value)) = parse_header_line(line) {
            if name.eq_ignore_ascii_case("Content-Length") {
                self.receive_content_length(value)
            } else {
                self.headers.upsert(name, value);
                Ok(())
            }
        } else {
            Ok(())
        }
    }

    fn receive_body(&mut self, chunk: &[u8]) -> Result<(), ResponseError> {
        if !self.allocated {
            self.allocated = true;
            if self.state.total() > 0 {
                self.sink
                    .allocate(self.state.total())
                    .map_err(ResponseError::local_io)?;
            }
        }
        self.sink.write(chunk).map_err(ResponseError::local_io)?;
        let current = self.state.advance(chunk.len() as u64);
        if self
            .progress
            .on_download(current, self.state.total())
            .is_continue()
        {
            Ok(())
        } else {
            debug!("Transfer canceled after {} bytes", current);
            Err(ResponseError::canceled())
        }
    }
}
