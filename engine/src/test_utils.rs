use cget_http::{
    parse_status_line, Headers, Request, ResponseError, ResponseErrorKind, StatusCode,
    TransferHandler, TransferResult, Transport, TransportConfig, Url,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering::Relaxed},
    Mutex,
};

/// 预先编排好的响应
#[derive(Debug, Clone, Default)]
pub(crate) struct Script {
    status_line: Option<String>,
    headers: Vec<(String, String)>,
    chunks: Vec<Vec<u8>>,
    failure: Option<ResponseErrorKind>,
}

impl Script {
    pub(crate) fn status(status_line: &str) -> Self {
        Self {
            status_line: Some(status_line.to_owned()),
            ..Default::default()
        }
    }

    /// 连接阶段即失败，不产生任何响应
    pub(crate) fn failure(kind: ResponseErrorKind) -> Self {
        Self {
            failure: Some(kind),
            ..Default::default()
        }
    }

    pub(crate) fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub(crate) fn chunk(mut self, chunk: impl AsRef<[u8]>) -> Self {
        self.chunks.push(chunk.as_ref().to_vec());
        self
    }

    /// 发送完已编排的数据块后以指定错误中断
    pub(crate) fn then_fail(mut self, kind: ResponseErrorKind) -> Self {
        self.failure = Some(kind);
        self
    }
}

/// 按脚本驱动传输回调的传输层
#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    config: TransportConfig,
    script: Mutex<Script>,
    received_payload: Mutex<Vec<u8>>,
    received_url: Mutex<Option<String>>,
    received_headers: Mutex<Headers>,
    performed: AtomicUsize,
}

impl ScriptedTransport {
    pub(crate) fn new(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            ..Default::default()
        }
    }

    pub(crate) fn replace_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub(crate) fn received_payload(&self) -> Vec<u8> {
        self.received_payload.lock().unwrap().to_owned()
    }

    pub(crate) fn received_url(&self) -> Option<String> {
        self.received_url.lock().unwrap().to_owned()
    }

    pub(crate) fn received_headers(&self) -> Headers {
        self.received_headers.lock().unwrap().to_owned()
    }

    pub(crate) fn performed(&self) -> usize {
        self.performed.load(Relaxed)
    }
}

impl Transport for ScriptedTransport {
    fn perform(
        &self,
        url: &Url,
        request: &Request,
        handler: &mut dyn TransferHandler,
    ) -> TransferResult<StatusCode> {
        self.performed.fetch_add(1, Relaxed);
        *self.received_url.lock().unwrap() = Some(url.to_string());
        *self.received_headers.lock().unwrap() = request.headers().to_owned();
        let script = self.script.lock().unwrap().to_owned();

        let Some(status_line) = script.status_line else {
            let kind = script.failure.unwrap_or(ResponseErrorKind::UnknownError);
            return Err(ResponseError::msg(kind, "scripted connection failure"));
        };

        let mut payload = Vec::new();
        let mut buf = [0u8; 3];
        loop {
            let len = handler.read_request_body(&mut buf)?;
            if len == 0 {
                break;
            }
            payload.extend_from_slice(&buf[..len]);
        }
        *self.received_payload.lock().unwrap() = payload;

        let status_code = parse_status_line(status_line.as_bytes())
            .map(|status_line| status_line.status_code)
            .unwrap_or_default();
        handler.receive_header_line(format!("{status_line}\r\n").as_bytes())?;
        for (name, value) in script.headers.iter() {
            handler.receive_header_line(format!("{name}: {value}\r\n").as_bytes())?;
        }
        handler.receive_header_line(b"\r\n")?;
        for chunk in script.chunks.iter() {
            handler.receive_body(chunk)?;
        }
        if let Some(kind) = script.failure {
            return Err(ResponseError::msg(kind, "scripted transfer failure"));
        }
        Ok(status_code)
    }

    fn config(&self) -> &TransportConfig {
        &self.config
    }
}
