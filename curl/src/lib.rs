//! # cget-curl
//!
//! 基于 libcurl 的 [`Transport`] 实现
//!
//! 每次传输使用独立的 `Easy2` 句柄，禁止连接复用。在 unix 平台上，套接字由非阻塞连接状态机打开，
//! 连接阶段的耗时不会超过连接超时时长加一个轮询间隔。

use cget_http::{
    Request, ResponseError, ResponseErrorKind, StatusCode, TransferHandler, TransferResult,
    Transport, TransportConfig, Url,
};
use cfg_if::cfg_if;
use curl::easy::Easy2;
use log::debug;

mod context;
mod easy;
mod global;
mod trace;

use context::Context;
use easy::{convert_error, handle, set_auth, set_body, set_headers, set_method, set_options, set_url};

cfg_if! {
    if #[cfg(unix)] {
        pub mod connect;
        use connect::{ConnectOptions, SocketContext};
    }
}

pub use cget_http as http;
pub use curl;
pub use trace::TRACE_TARGET;

/// 基于 libcurl 的传输层
#[derive(Debug, Default, Clone)]
pub struct CurlTransport {
    config: TransportConfig,
}

impl CurlTransport {
    /// 创建传输层
    #[inline]
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    /// 从环境变量读取配置并创建传输层
    #[inline]
    pub fn from_env() -> Self {
        Self::new(TransportConfig::from_env())
    }
}

impl Transport for CurlTransport {
    fn perform(
        &self,
        url: &Url,
        request: &Request,
        handler: &mut dyn TransferHandler,
    ) -> TransferResult<StatusCode> {
        global::ensure_initialized();
        debug!("curl {} {}", request.method(), url);

        #[cfg(unix)]
        let mut socket_context = Box::new(SocketContext::new(ConnectOptions::from(&self.config)));

        let mut easy = Easy2::new(Context::new(handler, &self.config));
        set_method(&mut easy, request)?;
        set_url(&mut easy, url)?;
        set_headers(&mut easy, request)?;
        set_auth(&mut easy, request)?;
        set_body(&mut easy, request)?;
        set_options(&mut easy, &self.config)?;
        #[cfg(unix)]
        connect::install(&mut easy, &mut *socket_context)?;

        let result = easy.perform();
        if let Some(err) = easy.get_mut().take_error() {
            return Err(err);
        }

        #[cfg(unix)]
        let connect_error = socket_context.take_error().map(ResponseError::from);
        #[cfg(not(unix))]
        let connect_error: Option<ResponseError> = None;

        if let Err(err) = result {
            if err.is_couldnt_connect() || err.is_operation_timedout() {
                if let Some(connect_error) = connect_error {
                    return Err(connect_error);
                }
            }
            let errno = easy.os_errno().ok().filter(|errno| *errno != 0);
            return Err(convert_error(err).with_errno(errno));
        }

        let code = handle(easy.response_code())?;
        StatusCode::try_from(code).map_err(|_| {
            ResponseError::msg(
                ResponseErrorKind::ProtocolError,
                format!("invalid status code: {code}"),
            )
        })
    }

    #[inline]
    fn config(&self) -> &TransportConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cget_http::{Credentials, ErrorCategory, Method};
    use futures::channel::oneshot::channel;
    use rand::{thread_rng, RngCore};
    use std::{
        net::TcpListener,
        sync::mpsc,
        thread,
        time::{Duration, Instant},
    };
    use tokio::task::spawn_blocking;
    use warp::{
        filters::{
            body::bytes,
            header::header,
            method::{get, method, post},
        },
        http::{Method as HttpMethod, StatusCode as HttpStatusCode},
        hyper::body::Bytes,
        path,
        reply::{with_header, with_status},
        Filter,
    };

    macro_rules! starts_with_server {
        ($addr:ident, $routes:ident, $code:block) => {{
            let (tx, rx) = channel();
            let ($addr, server) = warp::serve($routes).bind_with_graceful_shutdown(([127, 0, 0, 1], 0), async move {
                rx.await.ok();
            });
            let handler = tokio::spawn(server);
            $code?;
            tx.send(()).ok();
            handler.await.ok();
        }};
    }

    #[derive(Default)]
    struct Collector {
        payload: Vec<u8>,
        sent: usize,
        header_lines: Vec<String>,
        body: Vec<u8>,
        cancel_after: Option<usize>,
    }

    impl TransferHandler for Collector {
        fn read_request_body(&mut self, buf: &mut [u8]) -> Result<usize, ResponseError> {
            let remaining = &self.payload[self.sent..];
            let len = remaining.len().min(buf.len());
            buf[..len].copy_from_slice(&remaining[..len]);
            self.sent += len;
            Ok(len)
        }

        fn receive_header_line(&mut self, line: &[u8]) -> Result<(), ResponseError> {
            self.header_lines
                .push(String::from_utf8_lossy(line).trim_end().to_owned());
            Ok(())
        }

        fn receive_body(&mut self, chunk: &[u8]) -> Result<(), ResponseError> {
            if let Some(limit) = self.cancel_after {
                if self.body.len() + chunk.len() > limit {
                    return Err(ResponseError::canceled());
                }
            }
            self.body.extend_from_slice(chunk);
            Ok(())
        }
    }

    fn transport() -> CurlTransport {
        CurlTransport::new(
            TransportConfig::builder()
                .connect_timeout(Duration::from_secs(5))
                .trace(true)
                .build(),
        )
    }

    #[tokio::test]
    async fn test_get() -> anyhow::Result<()> {
        env_logger::builder().is_test(true).try_init().ok();

        let routes = path!("a.txt")
            .and(get())
            .map(|| with_header("hello", "Last-Modified", "Mon, 01 Jan 2024 00:00:00 GMT"));
        starts_with_server!(addr, routes, {
            spawn_blocking(move || {
                let url = Url::parse(&format!("http://{addr}/a.txt"))?;
                let request = Request::get(url.as_str());
                let mut collector = Collector::default();
                let status_code = transport().perform(&url, &request, &mut collector)?;
                assert_eq!(status_code, 200);
                assert_eq!(collector.body, b"hello");
                assert!(collector.header_lines[0].starts_with("HTTP/1.1 200"));
                assert!(collector
                    .header_lines
                    .iter()
                    .any(|line| line.eq_ignore_ascii_case("last-modified: Mon, 01 Jan 2024 00:00:00 GMT")));
                Ok::<_, anyhow::Error>(())
            })
            .await?
        });
        Ok(())
    }

    #[tokio::test]
    async fn test_post_with_basic_auth() -> anyhow::Result<()> {
        env_logger::builder().is_test(true).try_init().ok();

        let routes = path!("echo")
            .and(post())
            .and(header::<String>("authorization"))
            .and(bytes())
            .map(|authorization: String, body: Bytes| {
                with_status(
                    format!("{} {}", authorization, String::from_utf8_lossy(&body)),
                    HttpStatusCode::CREATED,
                )
            });
        starts_with_server!(addr, routes, {
            spawn_blocking(move || {
                let url = Url::parse(&format!("http://{addr}/echo"))?;
                for (credentials, expected) in [
                    (Credentials::new("user", "pass"), "Basic dXNlcjpwYXNz x=1"),
                    (Credentials::new("user", ""), "Basic dXNlcjo= x=1"),
                ] {
                    let request = Request::builder(url.as_str())
                        .method(Method::POST)
                        .body(b"x=1".as_slice())
                        .credentials(credentials)
                        .build()?;
                    let mut collector = Collector {
                        payload: request.body().to_vec(),
                        ..Default::default()
                    };
                    let status_code = transport().perform(&url, &request, &mut collector)?;
                    assert_eq!(status_code, 201);
                    assert_eq!(String::from_utf8(collector.body)?, expected);
                }
                Ok::<_, anyhow::Error>(())
            })
            .await?
        });
        Ok(())
    }

    #[tokio::test]
    async fn test_methods_and_error_status() -> anyhow::Result<()> {
        env_logger::builder().is_test(true).try_init().ok();

        let routes = path!("method")
            .and(method())
            .and(bytes())
            .map(|method: HttpMethod, body: Bytes| {
                let status = if method == HttpMethod::DELETE {
                    HttpStatusCode::NOT_FOUND
                } else {
                    HttpStatusCode::OK
                };
                with_status(format!("{} {}", method, body.len()), status)
            });
        starts_with_server!(addr, routes, {
            spawn_blocking(move || {
                let url = Url::parse(&format!("http://{addr}/method"))?;

                let request = Request::builder(url.as_str())
                    .method(Method::PUT)
                    .body(vec![7u8; 1024])
                    .build()?;
                let mut collector = Collector {
                    payload: request.body().to_vec(),
                    ..Default::default()
                };
                assert_eq!(transport().perform(&url, &request, &mut collector)?, 200);
                assert_eq!(collector.body, b"PUT 1024");

                let request = Request::builder(url.as_str()).method(Method::DELETE).build()?;
                let mut collector = Collector::default();
                assert_eq!(transport().perform(&url, &request, &mut collector)?, 404);
                assert_eq!(collector.body, b"DELETE 0");

                let request = Request::builder(url.as_str()).method(Method::HEAD).build()?;
                let mut collector = Collector::default();
                assert_eq!(transport().perform(&url, &request, &mut collector)?, 200);
                assert!(collector.body.is_empty());
                Ok::<_, anyhow::Error>(())
            })
            .await?
        });
        Ok(())
    }

    #[tokio::test]
    async fn test_handler_error_is_captured() -> anyhow::Result<()> {
        env_logger::builder().is_test(true).try_init().ok();

        let routes = path!("large").map(|| {
            let mut body = vec![0u8; 1 << 20];
            thread_rng().fill_bytes(&mut body);
            body
        });
        starts_with_server!(addr, routes, {
            spawn_blocking(move || {
                let url = Url::parse(&format!("http://{addr}/large"))?;
                let request = Request::get(url.as_str());
                let mut collector = Collector {
                    cancel_after: Some(1000),
                    ..Default::default()
                };
                let err = transport()
                    .perform(&url, &request, &mut collector)
                    .unwrap_err();
                assert_eq!(err.kind(), ResponseErrorKind::UserCanceled);
                assert_eq!(err.category(), ErrorCategory::Cancellation);
                assert!(collector.body.len() <= 1000);
                Ok::<_, anyhow::Error>(())
            })
            .await?
        });
        Ok(())
    }

    #[test]
    fn test_connection_refused() -> anyhow::Result<()> {
        env_logger::builder().is_test(true).try_init().ok();

        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0")?;
            listener.local_addr()?
        };
        let url = Url::parse(&format!("http://{addr}/"))?;
        let request = Request::get(url.as_str());
        let err = transport()
            .perform(&url, &request, &mut Collector::default())
            .unwrap_err();
        assert_eq!(err.kind(), ResponseErrorKind::ConnectError);
        assert_eq!(err.category(), ErrorCategory::Connection);
        #[cfg(unix)]
        assert_eq!(err.errno(), Some(libc::ECONNREFUSED));
        Ok(())
    }

    #[test]
    fn test_send_timeout_on_stalled_upload() -> anyhow::Result<()> {
        env_logger::builder().is_test(true).try_init().ok();

        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let (tx, rx) = mpsc::channel::<()>();
        // 只接受连接，从不读取
        let peer = thread::spawn(move || {
            let accepted = listener.accept();
            rx.recv_timeout(Duration::from_secs(30)).ok();
            drop(accepted);
        });

        let transport = CurlTransport::new(
            TransportConfig::builder()
                .connect_timeout(Duration::from_secs(5))
                .send_timeout(Duration::from_secs(1))
                .receive_timeout(Duration::from_secs(20))
                .build(),
        );
        let url = Url::parse(&format!("http://{addr}/upload"))?;
        let request = Request::builder(url.as_str())
            .method(Method::PUT)
            .body(vec![0u8; 64 << 20])
            .build()?;
        let mut collector = Collector {
            payload: request.body().to_vec(),
            ..Default::default()
        };
        let begin = Instant::now();
        let result = transport.perform(&url, &request, &mut collector);
        let elapsed = begin.elapsed();
        tx.send(()).ok();
        peer.join().ok();

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ResponseErrorKind::TimeoutError);
        assert_eq!(err.errno(), Some(libc::ETIMEDOUT));
        assert!(elapsed < Duration::from_secs(5), "elapsed {elapsed:?}");
        assert!(collector.sent < collector.payload.len());
        Ok(())
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_connect_timeout_is_bounded() -> anyhow::Result<()> {
        env_logger::builder().is_test(true).try_init().ok();

        let (listener, _established) = connect::saturated_listener()?;
        let config = TransportConfig::builder()
            .connect_timeout(Duration::from_millis(300))
            .poll_slice(Duration::from_millis(10))
            .build();
        let bound = config.connect_timeout() + config.poll_slice() + Duration::from_millis(200);
        let url = Url::parse(&format!("http://{}/", listener.local_addr()?))?;
        let request = Request::get(url.as_str());

        let begin = Instant::now();
        let err = CurlTransport::new(config)
            .perform(&url, &request, &mut Collector::default())
            .unwrap_err();
        let elapsed = begin.elapsed();

        assert_eq!(err.kind(), ResponseErrorKind::TimeoutError);
        assert_eq!(err.category(), ErrorCategory::Connection);
        assert_eq!(err.errno(), Some(libc::ETIMEDOUT));
        assert!(elapsed <= bound, "elapsed {elapsed:?}");
        Ok(())
    }
}
