use std::{
    fmt,
    io::{Result as IOResult, Write},
};

/// 响应体接收器
///
/// 响应体数据按接收顺序写入，同一接收器不会被并发调用
pub trait Sink {
    /// 已知响应体长度时的预分配提示
    ///
    /// 返回错误将中止传输
    #[inline]
    fn allocate(&mut self, _expected_size: u64) -> IOResult<()> {
        Ok(())
    }

    /// 写入一块响应体数据
    fn write(&mut self, chunk: &[u8]) -> IOResult<()>;
}

/// 内存接收器
impl Sink for Vec<u8> {
    #[inline]
    fn allocate(&mut self, expected_size: u64) -> IOResult<()> {
        if let Ok(additional) = usize::try_from(expected_size) {
            self.reserve(additional.saturating_sub(self.len()));
        }
        Ok(())
    }

    #[inline]
    fn write(&mut self, chunk: &[u8]) -> IOResult<()> {
        self.extend_from_slice(chunk);
        Ok(())
    }
}

impl<S: Sink + ?Sized> Sink for &mut S {
    #[inline]
    fn allocate(&mut self, expected_size: u64) -> IOResult<()> {
        (**self).allocate(expected_size)
    }

    #[inline]
    fn write(&mut self, chunk: &[u8]) -> IOResult<()> {
        (**self).write(chunk)
    }
}

/// 丢弃全部数据的接收器
#[derive(Debug, Default, Copy, Clone)]
pub struct NullSink;

impl Sink for NullSink {
    #[inline]
    fn write(&mut self, _chunk: &[u8]) -> IOResult<()> {
        Ok(())
    }
}

/// 将每块数据交给调用方回调的流式接收器
pub struct CallbackSink<F> {
    callback: F,
}

impl<F: FnMut(&[u8]) -> IOResult<()>> CallbackSink<F> {
    #[inline]
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F: FnMut(&[u8]) -> IOResult<()>> Sink for CallbackSink<F> {
    #[inline]
    fn write(&mut self, chunk: &[u8]) -> IOResult<()> {
        (self.callback)(chunk)
    }
}

impl<F> fmt::Debug for CallbackSink<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CallbackSink").finish_non_exhaustive()
    }
}

/// 基于 [`Write`] 的接收器
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
}

impl<W: Write> WriterSink<W> {
    #[inline]
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    #[inline]
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// 刷新并取回内部的 [`Write`]
    pub fn into_inner(mut self) -> IOResult<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> Sink for WriterSink<W> {
    #[inline]
    fn write(&mut self, chunk: &[u8]) -> IOResult<()> {
        self.writer.write_all(chunk)
    }
}
