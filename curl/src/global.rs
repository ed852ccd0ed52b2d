use curl::Version;
use log::{info, warn};
use once_cell::sync::Lazy;

struct CurlGlobal;

static CURL_GLOBAL: Lazy<CurlGlobal> = Lazy::new(|| {
    curl::init();
    unsafe {
        if libc::atexit(cleanup) != 0 {
            warn!("Failed to register curl global cleanup");
        }
    }
    let version = Version::get();
    info!(
        "libcurl {} initialized (ssl: {}, http2: {})",
        version.version(),
        version.ssl_version().unwrap_or("none"),
        version.feature_http2(),
    );
    CurlGlobal
});

extern "C" fn cleanup() {
    unsafe { curl_sys::curl_global_cleanup() }
}

/// 确保 libcurl 全局初始化已经完成，整个进程只执行一次，并在进程退出时清理
#[inline]
pub(crate) fn ensure_initialized() {
    Lazy::force(&CURL_GLOBAL);
}
