use curl::easy::InfoType;
use log::{debug, log_enabled, trace, Level};

/// 传输追踪日志的 target
pub const TRACE_TARGET: &str = "cget::trace";

pub(crate) fn trace_event(kind: InfoType, data: &[u8]) {
    if !log_enabled!(target: TRACE_TARGET, Level::Debug) {
        return;
    }
    match kind {
        InfoType::Text => {
            debug!(target: TRACE_TARGET, "{}", String::from_utf8_lossy(data).trim_end())
        }
        InfoType::HeaderOut => debug!(target: TRACE_TARGET, "=> Send header"),
        InfoType::DataOut => debug!(target: TRACE_TARGET, "=> Send data"),
        InfoType::SslDataOut => debug!(target: TRACE_TARGET, "=> Send SSL data"),
        InfoType::HeaderIn => {
            debug!(target: TRACE_TARGET, "<= Recv header ({} bytes)", data.len())
        }
        InfoType::DataIn => debug!(target: TRACE_TARGET, "<= Recv data ({} bytes)", data.len()),
        InfoType::SslDataIn => debug!(target: TRACE_TARGET, "<= Recv SSL data"),
        _ => {}
    }
}

pub(crate) fn trace_payload(chunk: &[u8]) {
    trace!(target: TRACE_TARGET, "payload: {}", String::from_utf8_lossy(chunk));
}
