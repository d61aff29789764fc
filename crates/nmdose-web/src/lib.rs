//! # 剂量推荐 HTTP 服务
//!
//! 将剂量引擎以 CDS 风格的 REST 接口暴露给临床系统。

pub mod dto;
pub mod error;
pub mod handlers;
pub mod server;

pub use error::ApiError;
pub use server::{create_app, AppState, WebServer};
