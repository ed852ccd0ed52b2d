/// 回调函数的返回结果
///
/// 可由 `bool` 转换，`true` 表示继续
#[must_use]
#[derive(Default, Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub enum CallbackResult {
    /// 继续传输
    #[default]
    Continue,

    /// 取消传输
    Cancel,
}

impl CallbackResult {
    #[inline]
    pub fn is_continue(self) -> bool {
        self == Self::Continue
    }

    #[inline]
    pub fn is_cancelled(self) -> bool {
        self == Self::Cancel
    }
}

impl From<bool> for CallbackResult {
    #[inline]
    fn from(proceed: bool) -> Self {
        if proceed {
            Self::Continue
        } else {
            Self::Cancel
        }
    }
}

/// 传输进度回调
///
/// `total` 为 0 表示总长度未知。任意一个回调返回 [`CallbackResult::Cancel`] 都会中止传输。
/// 返回 `bool` 或 [`CallbackResult`] 的闭包均可作为下载进度回调。
pub trait Progress {
    /// 响应体下载进度，在读取任何数据前至少调用一次
    fn on_download(&mut self, current: u64, total: u64) -> CallbackResult;

    /// 请求体上传进度，每发送一块请求体后调用
    #[inline]
    fn on_upload(&mut self, _sent: u64, _total: u64) -> CallbackResult {
        CallbackResult::Continue
    }
}

impl<F, R> Progress for F
where
    F: FnMut(u64, u64) -> R,
    R: Into<CallbackResult>,
{
    #[inline]
    fn on_download(&mut self, current: u64, total: u64) -> CallbackResult {
        self(current, total).into()
    }
}

/// 忽略进度，始终继续传输
#[derive(Debug, Default, Copy, Clone)]
pub struct NoProgress;

impl Progress for NoProgress {
    #[inline]
    fn on_download(&mut self, _current: u64, _total: u64) -> CallbackResult {
        CallbackResult::Continue
    }
}
