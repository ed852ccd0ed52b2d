//! # cget
//!
//! 同步 HTTP 传输引擎
//!
//! 在 [`cget_curl::CurlTransport`] 之上提供：
//!
//! - [`Engine`]：执行单次请求，汇报进度并支持取消，记录响应头与状态行
//! - [`CacheController`]：基于 `If-Modified-Since` 的条件下载
//! - [`AtomicFileWriter`]：临时文件写入，提交时原子替换目标文件
//!
//! ## 示例
//!
//! ```no_run
//! use cget::{http::{NoProgress, Request}, Engine};
//!
//! # fn main() -> Result<(), cget::http::ResponseError> {
//! let mut engine = Engine::default();
//! let outcome = engine.save(&Request::get("example.com/a.txt"), "a.txt", &mut NoProgress)?;
//! if !outcome.is_updated() {
//!     println!("a.txt is up to date");
//! }
//! # Ok(())
//! # }
//! ```

mod atomic;
mod cache;
mod engine;
mod transfer;

#[cfg(test)]
mod test_utils;

pub use atomic::AtomicFileWriter;
pub use cache::{CacheController, SaveOutcome};
pub use engine::{Engine, ResponseInfo};

pub use cget_curl as curl;
pub use cget_http as http;
