use super::{atomic::AtomicFileWriter, engine::Engine};
use cget_http::{Progress, Request, ResponseError, TransferResult, Transport};
use log::{debug, info, warn};
use std::{
    fs,
    io::ErrorKind as IoErrorKind,
    path::Path,
    time::SystemTime,
};

const IF_MODIFIED_SINCE: &str = "If-Modified-Since";
const LAST_MODIFIED: &str = "Last-Modified";

/// 保存结果
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// 目标文件已被替换，`modified` 为服务器返回的 Last-Modified
    Updated {
        /// 替换后文件的修改时间，服务器未返回 Last-Modified 时为 `None`
        modified: Option<SystemTime>,
    },
    /// 服务器返回 304，目标文件未做任何改动
    NotModified,
}

impl SaveOutcome {
    /// 目标文件是否被更新
    #[inline]
    pub fn is_updated(&self) -> bool {
        matches!(self, SaveOutcome::Updated { .. })
    }

    /// 更新后文件的修改时间
    #[inline]
    pub fn modified(&self) -> Option<SystemTime> {
        match self {
            SaveOutcome::Updated { modified } => *modified,
            SaveOutcome::NotModified => None,
        }
    }
}

/// 条件下载控制器
///
/// 下载前读取目标文件的修改时间作为 `If-Modified-Since`，响应体写入临时文件，
/// 仅在 2xx 时替换目标文件。304 或任何错误都不会改动目标文件。
#[derive(Debug)]
pub struct CacheController<'e, T: Transport> {
    engine: &'e mut Engine<T>,
    conditional: bool,
}

impl<'e, T: Transport> CacheController<'e, T> {
    /// 创建条件下载控制器
    #[inline]
    pub fn new(engine: &'e mut Engine<T>) -> Self {
        Self {
            engine,
            conditional: true,
        }
    }

    /// 不发送 `If-Modified-Since`，总是重新下载
    #[inline]
    #[must_use]
    pub fn unconditional(mut self) -> Self {
        self.conditional = false;
        self
    }

    /// 下载到 `destination`
    pub fn save(
        self,
        request: &Request,
        destination: impl AsRef<Path>,
        progress: &mut dyn Progress,
    ) -> TransferResult<SaveOutcome> {
        let destination = destination.as_ref();
        let mut request = request.to_owned();
        if self.conditional {
            if let Some(modified) = local_modified(destination)? {
                debug!(
                    "{} exists, request with {}",
                    destination.display(),
                    IF_MODIFIED_SINCE
                );
                request.headers_mut().assign(IF_MODIFIED_SINCE, modified);
            }
        }

        let mut writer = AtomicFileWriter::new(destination).map_err(ResponseError::local_io)?;
        match self.engine.perform(&request, &mut writer, progress) {
            Ok(304) => {
                discard(writer);
                info!("Keep {}, not modified", destination.display());
                Ok(SaveOutcome::NotModified)
            }
            Ok(_) => {
                let modified = self.engine.response_headers().find_timestamp(LAST_MODIFIED);
                writer.commit(modified).map_err(ResponseError::local_io)?;
                info!("Updated {}", destination.display());
                Ok(SaveOutcome::Updated { modified })
            }
            Err(err) => {
                discard(writer);
                Err(err)
            }
        }
    }
}

/// 目标文件存在且非空时返回其修改时间
fn local_modified(destination: &Path) -> TransferResult<Option<SystemTime>> {
    match fs::metadata(destination) {
        Ok(metadata) if metadata.is_file() && metadata.len() > 0 => {
            Ok(Some(metadata.modified().map_err(ResponseError::local_io)?))
        }
        Ok(_) => Ok(None),
        Err(err) if err.kind() == IoErrorKind::NotFound => Ok(None),
        Err(err) => Err(ResponseError::local_io(err)),
    }
}

fn discard(writer: AtomicFileWriter) {
    let temp_path = writer.temp_path().to_owned();
    if let Err(err) = writer.discard() {
        warn!("Failed to remove {}: {}", temp_path.display(), err);
    }
}
