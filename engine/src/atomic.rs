use cfg_if::cfg_if;
use cget_http::Sink;
use log::debug;
use std::{
    fs,
    io::{ErrorKind as IoErrorKind, Result as IoResult, Write},
    path::{Path, PathBuf},
    time::SystemTime,
};
use tempfile::{Builder as TempFileBuilder, NamedTempFile};

/// 原子文件写入器
///
/// 数据先写入目标文件所在目录下的临时文件，提交时通过重命名一次性替换目标文件，
/// 丢弃时仅删除临时文件。`commit` 和 `discard` 均消耗写入器，因此每个写入器只会执行其中之一。
#[derive(Debug)]
pub struct AtomicFileWriter {
    file: NamedTempFile,
    destination: PathBuf,
    written: u64,
}

impl AtomicFileWriter {
    /// 在目标文件所在目录下创建临时文件
    pub fn new(destination: impl Into<PathBuf>) -> IoResult<Self> {
        let destination = destination.into();
        let parent = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let file = TempFileBuilder::new()
            .prefix(".cget-")
            .suffix(".part")
            .tempfile_in(parent)?;
        debug!(
            "Staging {} at {}",
            destination.display(),
            file.path().display()
        );
        Ok(Self {
            file,
            destination,
            written: 0,
        })
    }

    /// 目标文件路径
    #[inline]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// 临时文件路径
    #[inline]
    pub fn temp_path(&self) -> &Path {
        self.file.path()
    }

    /// 已写入的字节数
    #[inline]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// 按预期大小预留磁盘空间，不改变文件长度
    pub fn allocate(&mut self, expected_size: u64) -> IoResult<()> {
        if expected_size == 0 {
            return Ok(());
        }
        cfg_if! {
            if #[cfg(any(target_os = "linux", target_os = "android"))] {
                use rustix::fs::{fallocate, FallocateFlags};
                use std::io::Error as IoError;

                match fallocate(self.file.as_file(), FallocateFlags::KEEP_SIZE, 0, expected_size) {
                    Ok(()) => Ok(()),
                    Err(errno) if errno == rustix::io::Errno::OPNOTSUPP => Ok(()),
                    Err(errno) => Err(IoError::from_raw_os_error(errno.raw_os_error())),
                }
            } else {
                Ok(())
            }
        }
    }

    /// 按接收顺序追加数据
    #[inline]
    pub fn write(&mut self, bytes: &[u8]) -> IoResult<()> {
        self.file.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// 以临时文件原子替换目标文件
    ///
    /// 已存在的目标文件的权限会被沿用，新文件在 unix 上使用 `0o644`。
    /// 指定 `modified` 时，替换后的文件修改时间为该值。
    pub fn commit(mut self, modified: Option<SystemTime>) -> IoResult<()> {
        let file = self.file.as_file_mut();
        file.flush()?;
        match fs::metadata(&self.destination) {
            Ok(metadata) => file.set_permissions(metadata.permissions())?,
            Err(err) if err.kind() == IoErrorKind::NotFound => set_default_permissions(file)?,
            Err(err) => return Err(err),
        }
        if let Some(modified) = modified {
            file.set_modified(modified)?;
        }
        file.sync_all()?;
        let written = self.written;
        self.file
            .persist(&self.destination)
            .map_err(|err| err.error)?;
        debug!(
            "Committed {} bytes to {}",
            written,
            self.destination.display()
        );
        Ok(())
    }

    /// 删除临时文件，目标文件保持不变
    pub fn discard(self) -> IoResult<()> {
        let temp_path = self.file.path().to_owned();
        self.file.close()?;
        debug!("Discarded {}", temp_path.display());
        Ok(())
    }
}

impl Sink for AtomicFileWriter {
    #[inline]
    fn allocate(&mut self, expected_size: u64) -> IoResult<()> {
        AtomicFileWriter::allocate(self, expected_size)
    }

    #[inline]
    fn write(&mut self, chunk: &[u8]) -> IoResult<()> {
        AtomicFileWriter::write(self, chunk)
    }
}

cfg_if! {
    if #[cfg(unix)] {
        fn set_default_permissions(file: &fs::File) -> IoResult<()> {
            use std::os::unix::fs::PermissionsExt;

            file.set_permissions(fs::Permissions::from_mode(0o644))
        }
    } else {
        fn set_default_permissions(_file: &fs::File) -> IoResult<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::tempdir;

    #[test]
    fn test_commit_replaces_destination() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let destination = dir.path().join("a.txt");
        fs::write(&destination, b"old")?;

        let modified = UNIX_EPOCH + Duration::from_secs(1_704_067_200);
        let mut writer = AtomicFileWriter::new(&destination)?;
        writer.allocate(5)?;
        writer.write(b"hel")?;
        writer.write(b"lo")?;
        assert_eq!(writer.written(), 5);
        assert_eq!(fs::read(&destination)?, b"old");
        let temp_path = writer.temp_path().to_owned();
        writer.commit(Some(modified))?;

        assert_eq!(fs::read(&destination)?, b"hello");
        assert_eq!(fs::metadata(&destination)?.modified()?, modified);
        assert!(!temp_path.exists());
        Ok(())
    }

    #[test]
    fn test_discard_keeps_destination() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let destination = dir.path().join("a.txt");
        fs::write(&destination, b"old")?;
        let before = fs::metadata(&destination)?.modified()?;

        let mut writer = AtomicFileWriter::new(&destination)?;
        writer.write(b"partial")?;
        let temp_path = writer.temp_path().to_owned();
        writer.discard()?;

        assert_eq!(fs::read(&destination)?, b"old");
        assert_eq!(fs::metadata(&destination)?.modified()?, before);
        assert!(!temp_path.exists());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_commit_permissions() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir()?;
        let fresh = dir.path().join("fresh.txt");
        let writer = AtomicFileWriter::new(&fresh)?;
        writer.commit(None)?;
        assert_eq!(fs::metadata(&fresh)?.permissions().mode() & 0o777, 0o644);

        let existing = dir.path().join("existing.txt");
        fs::write(&existing, b"old")?;
        fs::set_permissions(&existing, fs::Permissions::from_mode(0o600))?;
        let mut writer = AtomicFileWriter::new(&existing)?;
        writer.write(b"new")?;
        writer.commit(None)?;
        assert_eq!(fs::metadata(&existing)?.permissions().mode() & 0o777, 0o600);
        Ok(())
    }
}
