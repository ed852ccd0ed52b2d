use cget_http::{Method, Request, ResponseError, ResponseErrorKind, TransportConfig, Url};
use curl::{
    easy::{Auth, Easy2, Handler, List},
    Error as CurlError,
};
use std::result::Result;

pub(crate) fn set_method<H: Handler>(
    easy: &mut Easy2<H>,
    request: &Request,
) -> Result<(), ResponseError> {
    match request.method() {
        Method::GET => handle(easy.get(true)),
        Method::HEAD => handle(easy.nobody(true)),
        Method::POST => handle(easy.post(true)),
        Method::PUT => handle(easy.upload(true)),
        Method::DELETE => handle(easy.custom_request(Method::DELETE.as_str())),
    }
}

#[inline]
pub(crate) fn set_url<H: Handler>(easy: &mut Easy2<H>, url: &Url) -> Result<(), ResponseError> {
    handle(easy.url(url.as_str()))
}

pub(crate) fn set_headers<H: Handler>(
    easy: &mut Easy2<H>,
    request: &Request,
) -> Result<(), ResponseError> {
    let mut header_list = List::new();
    handle(header_list.append("Expect:"))?;
    for header in request.headers() {
        // 以分号结尾才能发送空值的 HTTP 头
        let line = if header.value().is_empty() {
            format!("{};", header.name())
        } else {
            format!("{}: {}", header.name(), header.value())
        };
        handle(header_list.append(&line))?;
    }
    handle(easy.http_headers(header_list))?;
    Ok(())
}

pub(crate) fn set_auth<H: Handler>(
    easy: &mut Easy2<H>,
    request: &Request,
) -> Result<(), ResponseError> {
    if let Some(credentials) = request.credentials().filter(|c| c.is_usable()) {
        handle(easy.username(credentials.username()))?;
        handle(easy.password(credentials.password()))?;
        handle(easy.http_auth(Auth::new().basic(true)))?;
    }
    Ok(())
}

pub(crate) fn set_body<H: Handler>(
    easy: &mut Easy2<H>,
    request: &Request,
) -> Result<(), ResponseError> {
    let size = request.body().len() as u64;
    match request.method() {
        Method::POST => handle(easy.post_field_size(size)),
        Method::PUT => handle(easy.in_filesize(size)),
        _ => Ok(()),
    }
}

pub(crate) fn set_options<H: Handler>(
    easy: &mut Easy2<H>,
    config: &TransportConfig,
) -> Result<(), ResponseError> {
    handle(easy.show_header(false))?;
    handle(easy.signal(false))?;
    // 进度回调用于检测请求体发送停滞
    handle(easy.progress(true))?;
    handle(easy.verbose(config.trace()))?;
    handle(easy.follow_location(config.follow_location()))?;
    handle(easy.max_redirections(config.max_redirections()))?;
    handle(easy.forbid_reuse(true))?;
    handle(easy.connect_timeout(config.connect_timeout()))?;
    if let Some(timeout) = config.timeout() {
        handle(easy.timeout(timeout))?;
    }
    // 接收停滞超过 receive_timeout 即中止
    handle(easy.low_speed_limit(1))?;
    handle(easy.low_speed_time(config.receive_timeout()))?;
    Ok(())
}

pub(crate) fn handle<T>(result: Result<T, CurlError>) -> Result<T, ResponseError> {
    result.map_err(convert_error)
}

pub(crate) fn convert_error(err: CurlError) -> ResponseError {
    if err.is_unsupported_protocol()
        || err.is_bad_content_encoding()
        || err.is_filesize_exceeded()
        || err.is_http2_error()
        || err.is_http2_stream_error()
        || err.is_got_nothing()
    {
        ResponseError::new(ResponseErrorKind::ProtocolError, err)
    } else if err.is_url_malformed() {
        ResponseError::new(ResponseErrorKind::InvalidURL, err)
    } else if err.is_couldnt_resolve_proxy() {
        ResponseError::new(ResponseErrorKind::ProxyError, err)
    } else if err.is_couldnt_resolve_host() {
        ResponseError::new(ResponseErrorKind::UnknownHostError, err)
    } else if err.is_couldnt_connect() {
        ResponseError::new(ResponseErrorKind::ConnectError, err)
    } else if err.is_send_error() {
        ResponseError::new(ResponseErrorKind::SendError, err)
    } else if err.is_recv_error() || err.is_partial_file() {
        ResponseError::new(ResponseErrorKind::ReceiveError, err)
    } else if err.is_read_error() || err.is_write_error() || err.is_send_fail_rewind() {
        ResponseError::new(ResponseErrorKind::LocalIOError, err)
    } else if err.is_aborted_by_callback() {
        ResponseError::new(ResponseErrorKind::UserCanceled, err)
    } else if err.is_operation_timedout() {
        ResponseError::new(ResponseErrorKind::TimeoutError, err)
            .with_errno(Some(libc::ETIMEDOUT))
    } else if err.is_too_many_redirects() {
        ResponseError::new(ResponseErrorKind::TooManyRedirect, err)
    } else if err.is_ssl_connect_error()
        || err.is_peer_failed_verification()
        || err.is_ssl_engine_initfailed()
        || err.is_ssl_engine_notfound()
        || err.is_ssl_engine_setfailed()
        || err.is_ssl_certproblem()
        || err.is_ssl_cipher()
        || err.is_use_ssl_failed()
        || err.is_ssl_cacert()
        || err.is_ssl_cacert_badfile()
        || err.is_ssl_crl_badfile()
        || err.is_ssl_shutdown_failed()
        || err.is_ssl_issuer_error()
    {
        ResponseError::new(ResponseErrorKind::SSLError, err)
    } else {
        ResponseError::new(ResponseErrorKind::UnknownError, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cget_http::ErrorCategory;

    #[test]
    fn test_convert_error() {
        let err = convert_error(CurlError::new(curl_sys::CURLE_OPERATION_TIMEDOUT));
        assert_eq!(err.kind(), ResponseErrorKind::TimeoutError);
        assert_eq!(err.errno(), Some(libc::ETIMEDOUT));

        let err = convert_error(CurlError::new(curl_sys::CURLE_PARTIAL_FILE));
        assert_eq!(err.kind(), ResponseErrorKind::ReceiveError);
        assert_eq!(err.category(), ErrorCategory::Connection);

        let err = convert_error(CurlError::new(curl_sys::CURLE_ABORTED_BY_CALLBACK));
        assert_eq!(err.category(), ErrorCategory::Cancellation);

        let err = convert_error(CurlError::new(curl_sys::CURLE_COULDNT_CONNECT));
        assert_eq!(err.kind(), ResponseErrorKind::ConnectError);
    }
}
