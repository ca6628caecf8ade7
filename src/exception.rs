// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了框架在启动与请求处理生命周期中可能出现的各类异常情况。
//!
//! - **协议层**：请求报文无法解析，直接映射为 400/405 响应。
//! - **路由层**：`RouteNotFound` 属于正常终态，按本地化的"未找到"页面渲染。
//! - **处理器层**：`HandlerFault` 记录文件与行号，调试模式下展示全部细节，生产模式下只展示混淆后的错误号。
//! - **缓存层**：`CacheUnavailable` 只会被记录，永远不会上抛到调用方。
//! - **启动期**：`ConfigMissing` / `InvalidConfig` / `LangMissing` 为致命错误，终止进程启动。

use std::backtrace::Backtrace;
use std::panic::Location;

use thiserror::Error;

/// 框架处理过程中发生的异常类型。
#[derive(Debug, Clone, Error)]
pub enum Exception {
    /// 客户端发送的请求字节流无法解析为合法的 UTF-8 字符串。
    #[error("Request bytes can't be parsed in UTF-8")]
    RequestIsNotUtf8,
    /// 客户端使用了服务器暂不支持的 HTTP 方法。
    #[error("Unsupported request method")]
    UnSupportedRequestMethod,
    /// 客户端使用了服务器不支持的 HTTP 协议版本。
    #[error("Unsupported HTTP version")]
    UnsupportedHttpVersion,
    /// 没有可调用的 (处理器, 动作) 组合。
    #[error("No route for {0}")]
    RouteNotFound(String),
    /// 处理器执行期间的未捕获失败。
    #[error("{message}")]
    HandlerFault {
        code: u32,
        message: String,
        title: Option<String>,
        location: &'static Location<'static>,
        trace: String,
    },
    /// 某个缓存层不可用，调用方应当退化为不使用该层。
    #[error("Cache tier unavailable: {0}")]
    CacheUnavailable(String),
    /// 同一请求内输出文档只能被消费一次。
    #[error("Output document has already been rendered")]
    OutputAlreadySent,
    /// 配置文件缺失或不可读。
    #[error("Missing configuration file: {0}")]
    ConfigMissing(String),
    /// 配置文件存在但内容非法。
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// 系统本地化文件缺失。
    #[error("Missing system localization file: {0}")]
    LangMissing(String),
}

impl Exception {
    /// 构造一个处理器故障，自动记录调用位置。
    #[track_caller]
    pub fn fault(code: u32, message: impl Into<String>) -> Self {
        Exception::HandlerFault {
            code,
            message: message.into(),
            title: None,
            location: Location::caller(),
            trace: Backtrace::capture().to_string(),
        }
    }

    /// 带自定义标题的处理器故障
    #[track_caller]
    pub fn fault_titled(code: u32, message: impl Into<String>, title: impl Into<String>) -> Self {
        Exception::HandlerFault {
            code,
            message: message.into(),
            title: Some(title.into()),
            location: Location::caller(),
            trace: Backtrace::capture().to_string(),
        }
    }

    /// 该异常是否应当终止进程启动
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Exception::ConfigMissing(_) | Exception::InvalidConfig(_) | Exception::LangMissing(_)
        )
    }
}
