//! 非阻塞连接状态机
//!
//! 在 libcurl 打开套接字时接管连接过程：以非阻塞方式发起连接，按固定间隔轮询可写、错误或挂断事件，
//! 连接超时后返回超时错误，连接成功后恢复阻塞模式并设置收发超时时长，再将套接字交还给 libcurl。

use super::easy::convert_error;
use cget_http::{ResponseError, ResponseErrorKind, TransportConfig};
use curl::{
    easy::{Easy2, Handler},
    Error as CurlError,
};
use curl_sys::{
    curl_opensocket_callback, curl_sockaddr, curl_socket_t, curlsocktype, CURLcode, CURLE_OK,
    CURLOPT_OPENSOCKETDATA, CURLOPT_OPENSOCKETFUNCTION, CURLOPT_SOCKOPTFUNCTION,
    CURLSOCKTYPE_IPCXN, CURL_SOCKET_BAD,
};
use libc::{c_int, c_void};
use log::{debug, trace};
use rustix::{
    event::{poll, PollFd, PollFlags},
    fs::{fcntl_getfl, fcntl_setfl, OFlags},
    io::{fcntl_setfd, Errno, FdFlags},
    net::{
        connect as connect_socket, socket,
        sockopt::{get_socket_error, set_socket_timeout, Timeout},
        AddressFamily, SocketType,
    },
};
use std::{
    io::{Error as IoError, Result as IoResult},
    mem::size_of,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6},
    os::fd::{AsRawFd, IntoRawFd, OwnedFd},
    panic::{catch_unwind, AssertUnwindSafe},
    time::Duration,
};
use thiserror::Error;

const SOCKOPT_ALREADY_CONNECTED: c_int = 2;

type SockoptCallback = extern "C" fn(*mut c_void, curl_socket_t, curlsocktype) -> c_int;

/// 连接状态
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ConnectState {
    /// 套接字已创建，尚未发起连接
    Unconnected,
    /// 连接进行中
    Connecting,
    /// 已连接
    Connected,
    /// 连接失败
    Failed,
    /// 连接超时
    TimedOut,
}

/// 连接错误
#[derive(Debug, Error)]
pub enum ConnectError {
    /// 连接失败，携带套接字错误
    #[error("Failed to connect: {0}")]
    Failed(#[source] IoError),

    /// 连接超时
    #[error("Connect timed out after {0:?}")]
    TimedOut(Duration),
}

impl ConnectError {
    /// 获取系统错误码
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            ConnectError::Failed(err) => err.raw_os_error(),
            ConnectError::TimedOut(_) => Some(Errno::TIMEDOUT.raw_os_error()),
        }
    }
}

impl From<ConnectError> for ResponseError {
    fn from(err: ConnectError) -> Self {
        let errno = err.raw_os_error();
        let kind = match err {
            ConnectError::Failed(_) => ResponseErrorKind::ConnectError,
            ConnectError::TimedOut(_) => ResponseErrorKind::TimeoutError,
        };
        ResponseError::new(kind, err).with_errno(errno)
    }
}

/// 连接参数
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    connect_timeout: Duration,
    send_timeout: Duration,
    receive_timeout: Duration,
    poll_slice: Duration,
}

impl ConnectOptions {
    /// 创建连接参数，轮询间隔最短为 1 毫秒
    pub fn new(
        connect_timeout: Duration,
        send_timeout: Duration,
        receive_timeout: Duration,
        poll_slice: Duration,
    ) -> Self {
        Self {
            connect_timeout,
            send_timeout,
            receive_timeout,
            poll_slice: poll_slice.max(Duration::from_millis(1)),
        }
    }

    #[inline]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    #[inline]
    pub fn poll_slice(&self) -> Duration {
        self.poll_slice
    }

    /// 轮询次数，超时时长按轮询间隔向上取整
    fn countdown(&self) -> u128 {
        let slice = self.poll_slice.as_nanos().max(1);
        let timeout = self.connect_timeout.as_nanos();
        ((timeout + slice - 1) / slice).max(1)
    }
}

impl From<&TransportConfig> for ConnectOptions {
    #[inline]
    fn from(config: &TransportConfig) -> Self {
        Self::new(
            config.connect_timeout(),
            config.send_timeout(),
            config.receive_timeout(),
            config.poll_slice(),
        )
    }
}

#[inline]
fn io_error(errno: Errno) -> IoError {
    IoError::from_raw_os_error(errno.raw_os_error())
}

struct Connector {
    socket: OwnedFd,
    state: ConnectState,
    options: ConnectOptions,
}

impl Connector {
    fn open(addr: &SocketAddr, socket_type: SocketType, options: ConnectOptions) -> IoResult<Self> {
        let family = match addr {
            SocketAddr::V4(_) => AddressFamily::INET,
            SocketAddr::V6(_) => AddressFamily::INET6,
        };
        let socket = socket(family, socket_type, None).map_err(io_error)?;
        fcntl_setfd(&socket, FdFlags::CLOEXEC).map_err(io_error)?;
        Ok(Self {
            socket,
            state: ConnectState::Unconnected,
            options,
        })
    }

    fn transit(&mut self, state: ConnectState) {
        trace!(
            "socket {}: {:?} -> {:?}",
            self.socket.as_raw_fd(),
            self.state,
            state
        );
        self.state = state;
    }

    fn fail(&mut self, err: IoError) -> ConnectError {
        self.transit(ConnectState::Failed);
        ConnectError::Failed(err)
    }

    fn start(&mut self, addr: &SocketAddr) -> Result<(), ConnectError> {
        if let Err(err) = self.set_nonblocking(true) {
            return Err(self.fail(err));
        }
        match connect_socket(&self.socket, addr) {
            Ok(()) => {
                self.transit(ConnectState::Connected);
                Ok(())
            }
            Err(errno) if errno == Errno::INPROGRESS || errno == Errno::INTR => {
                self.transit(ConnectState::Connecting);
                Ok(())
            }
            Err(errno) => Err(self.fail(io_error(errno))),
        }
    }

    fn wait(&mut self) -> Result<(), ConnectError> {
        if self.state != ConnectState::Connecting {
            return Ok(());
        }
        let slice_ms = c_int::try_from(self.options.poll_slice.as_millis()).unwrap_or(c_int::MAX);
        let mut countdown = self.options.countdown();
        while countdown > 0 {
            countdown -= 1;
            let polled = {
                let mut fds = [PollFd::new(&self.socket, PollFlags::OUT)];
                poll(&mut fds, slice_ms).map(|ready| (ready > 0).then(|| fds[0].revents()))
            };
            let revents = match polled {
                Ok(Some(revents)) => revents,
                Ok(None) => continue,
                Err(errno) if errno == Errno::INTR => continue,
                Err(errno) => return Err(self.fail(io_error(errno))),
            };

            if revents.contains(PollFlags::ERR) {
                let err = match self.socket_error() {
                    Ok(Some(err)) => err,
                    Ok(None) => io_error(Errno::IO),
                    Err(err) => err,
                };
                return Err(self.fail(err));
            } else if revents.contains(PollFlags::HUP) {
                return Err(self.fail(io_error(Errno::CONNRESET)));
            } else if revents.contains(PollFlags::OUT) {
                return match self.socket_error() {
                    Ok(None) => {
                        self.transit(ConnectState::Connected);
                        Ok(())
                    }
                    Ok(Some(err)) | Err(err) => Err(self.fail(err)),
                };
            }
        }
        self.transit(ConnectState::TimedOut);
        Err(ConnectError::TimedOut(self.options.connect_timeout))
    }

    fn finish(mut self) -> Result<OwnedFd, ConnectError> {
        let result = self
            .set_nonblocking(false)
            .and_then(|_| self.set_timeout(Timeout::Recv, self.options.receive_timeout))
            .and_then(|_| self.set_timeout(Timeout::Send, self.options.send_timeout));
        match result {
            Ok(()) => Ok(self.socket),
            Err(err) => Err(self.fail(err)),
        }
    }

    fn set_nonblocking(&self, nonblocking: bool) -> IoResult<()> {
        let flags = fcntl_getfl(&self.socket).map_err(io_error)?;
        let new_flags = if nonblocking {
            flags.union(OFlags::NONBLOCK)
        } else {
            flags.difference(OFlags::NONBLOCK)
        };
        if new_flags != flags {
            fcntl_setfl(&self.socket, new_flags).map_err(io_error)?;
        }
        Ok(())
    }

    fn set_timeout(&self, id: Timeout, timeout: Duration) -> IoResult<()> {
        // 零值表示不限时
        let timeout = Some(timeout).filter(|timeout| !timeout.is_zero());
        set_socket_timeout(&self.socket, id, timeout).map_err(io_error)
    }

    fn socket_error(&self) -> IoResult<Option<IoError>> {
        match get_socket_error(&self.socket).map_err(io_error)? {
            Ok(()) => Ok(None),
            Err(errno) => Ok(Some(io_error(errno))),
        }
    }
}

fn connect_with(
    addr: &SocketAddr,
    socket_type: SocketType,
    options: ConnectOptions,
) -> Result<OwnedFd, ConnectError> {
    let mut connector =
        Connector::open(addr, socket_type, options).map_err(ConnectError::Failed)?;
    connector.start(addr)?;
    connector.wait()?;
    connector.finish()
}

/// 在限定时间内连接到指定地址
///
/// 超时判定的最大误差为一个轮询间隔。成功后返回阻塞模式的套接字，收发超时已设置。
#[inline]
pub fn connect(addr: &SocketAddr, options: ConnectOptions) -> Result<OwnedFd, ConnectError> {
    connect_with(addr, SocketType::STREAM, options)
}

/// libcurl 打开套接字回调使用的上下文
pub(crate) struct SocketContext {
    options: ConnectOptions,
    last_error: Option<ConnectError>,
}

impl SocketContext {
    #[inline]
    pub(crate) fn new(options: ConnectOptions) -> Self {
        Self {
            options,
            last_error: None,
        }
    }

    /// 取出最近一次连接失败的错误
    #[inline]
    pub(crate) fn take_error(&mut self) -> Option<ConnectError> {
        self.last_error.take()
    }
}

/// 读取 libcurl 传入的地址，仅支持 IPv4 与 IPv6
///
/// # Safety
///
/// `address.addr` 之后必须有至少 `address.addrlen` 字节的有效地址数据
unsafe fn socket_addr(address: &curl_sockaddr) -> Option<SocketAddr> {
    let len = address.addrlen as usize;
    let addr = &address.addr as *const libc::sockaddr;
    match address.family {
        libc::AF_INET if len >= size_of::<libc::sockaddr_in>() => {
            let sin = &*(addr as *const libc::sockaddr_in);
            Some(SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr)),
                u16::from_be(sin.sin_port),
            )))
        }
        libc::AF_INET6 if len >= size_of::<libc::sockaddr_in6>() => {
            let sin6 = &*(addr as *const libc::sockaddr_in6);
            Some(SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::from(sin6.sin6_addr.s6_addr),
                u16::from_be(sin6.sin6_port),
                sin6.sin6_flowinfo,
                sin6.sin6_scope_id,
            )))
        }
        _ => None,
    }
}

extern "C" fn open_socket(
    clientp: *mut c_void,
    purpose: curlsocktype,
    address: *mut curl_sockaddr,
) -> curl_socket_t {
    if clientp.is_null() || address.is_null() || purpose != CURLSOCKTYPE_IPCXN {
        return CURL_SOCKET_BAD;
    }
    let context = unsafe { &mut *(clientp as *mut SocketContext) };
    let address = unsafe { &*address };
    let Some(addr) = (unsafe { socket_addr(address) }) else {
        debug!("Unsupported address family {}", address.family);
        return CURL_SOCKET_BAD;
    };
    let socket_type = SocketType::from_raw(address.socktype as _);
    let options = context.options;
    let result = catch_unwind(AssertUnwindSafe(|| {
        connect_with(&addr, socket_type, options)
    }));
    match result {
        Ok(Ok(socket)) => {
            context.last_error = None;
            socket.into_raw_fd()
        }
        Ok(Err(err)) => {
            debug!("{}: {}", addr, err);
            context.last_error = Some(err);
            CURL_SOCKET_BAD
        }
        Err(_) => CURL_SOCKET_BAD,
    }
}

extern "C" fn socket_option(
    _clientp: *mut c_void,
    _socket: curl_socket_t,
    _purpose: curlsocktype,
) -> c_int {
    SOCKOPT_ALREADY_CONNECTED
}

fn check(code: CURLcode) -> Result<(), ResponseError> {
    if code == CURLE_OK {
        Ok(())
    } else {
        Err(convert_error(CurlError::new(code)))
    }
}

/// 让 libcurl 通过连接状态机打开套接字
///
/// `context` 必须在 `easy` 执行结束前保持有效且地址不变
pub(crate) fn install<H: Handler>(
    easy: &mut Easy2<H>,
    context: *mut SocketContext,
) -> Result<(), ResponseError> {
    let raw = easy.raw();
    unsafe {
        check(curl_sys::curl_easy_setopt(
            raw,
            CURLOPT_OPENSOCKETFUNCTION,
            open_socket as curl_opensocket_callback,
        ))?;
        check(curl_sys::curl_easy_setopt(
            raw,
            CURLOPT_OPENSOCKETDATA,
            context as *mut c_void,
        ))?;
        check(curl_sys::curl_easy_setopt(
            raw,
            CURLOPT_SOCKOPTFUNCTION,
            socket_option as SockoptCallback,
        ))?;
    }
    Ok(())
}

/// 创建积压队列已满的监听套接字，此后到达的连接请求都会被丢弃
///
/// 返回的已建立连接需要保持存活，否则队列会被腾空
#[cfg(all(test, target_os = "linux"))]
pub(crate) fn saturated_listener() -> IoResult<(std::net::TcpListener, Vec<OwnedFd>)> {
    use std::{io::ErrorKind as IoErrorKind, net::TcpListener};

    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    rustix::net::listen(&listener, 0).map_err(io_error)?;
    let addr = listener.local_addr()?;
    let options = ConnectOptions::new(
        Duration::from_millis(100),
        Duration::from_secs(1),
        Duration::from_secs(1),
        Duration::from_millis(10),
    );
    let mut established = Vec::new();
    for _ in 0..16 {
        match connect(&addr, options) {
            Ok(socket) => established.push(socket),
            Err(ConnectError::TimedOut(_)) => return Ok((listener, established)),
            Err(ConnectError::Failed(err)) => return Err(err),
        }
    }
    Err(IoError::new(IoErrorKind::Other, "listen backlog never filled up"))
}
