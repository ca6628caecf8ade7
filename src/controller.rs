// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 处理器模型
//!
//! - `Controller`：可调度能力，必须提供默认动作 `on_index`，可声明若干具名动作。
//! - `HandlerRegistry`：启动时一次性构建的 "分组目录 → 处理器" 映射，替代运行期的目录探测。
//! - `Context`：单个请求的上下文，持有只读的配置与本地化表，以及只能被消费一次的输出文档。

use std::collections::HashMap;
use std::fs;

use bytes::Bytes;
use log::{debug, warn};

use crate::config::Config;
use crate::exception::Exception;
use crate::lang::Lang;
use crate::memcache::MemoryCache;
use crate::output::OutputDocument;
use crate::param::EXT_VIEW;
use crate::response::Response;
use crate::router::{normalize, ResolvedRoute};

/// 可被路由调度的处理器
pub trait Controller: Send {
    /// 默认动作
    fn on_index(&mut self, ctx: &mut Context, params: &[String]) -> Result<Response, Exception>;

    /// 具名动作列表，如 `["onSave"]`
    fn actions(&self) -> &'static [&'static str] {
        &[]
    }

    fn on_action(
        &mut self,
        action: &str,
        ctx: &mut Context,
        params: &[String],
    ) -> Result<Response, Exception> {
        debug!("处理器未实现动作{}，回落到默认动作", action);
        self.on_index(ctx, params)
    }
}

pub type ControllerFactory = fn() -> Box<dyn Controller>;

#[derive(Clone, Copy)]
enum HandlerEntry {
    Controller(ControllerFactory),
    /// 文件存在但不具备控制器能力
    Module,
}

pub struct HandlerRegistry {
    groups: HashMap<String, HashMap<String, HandlerEntry>>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    /// 根分组 `/` 总是存在
    pub fn new() -> Self {
        let mut groups = HashMap::new();
        groups.insert("/".to_string(), HashMap::new());
        Self { groups }
    }

    pub fn group(mut self, prefix: &str) -> Self {
        self.groups.entry(normalize(prefix)).or_default();
        self
    }

    pub fn controller(self, group: &str, name: &str, factory: ControllerFactory) -> Self {
        self.insert(group, name, HandlerEntry::Controller(factory))
    }

    pub fn module(self, group: &str, name: &str) -> Self {
        self.insert(group, name, HandlerEntry::Module)
    }

    fn insert(mut self, group: &str, name: &str, entry: HandlerEntry) -> Self {
        self.groups
            .entry(normalize(group))
            .or_default()
            .insert(name.trim().to_lowercase(), entry);
        self
    }

    pub fn has_group(&self, prefix: &str) -> bool {
        self.groups.contains_key(prefix)
    }

    pub fn has_handler(&self, group: &str, name: &str) -> bool {
        self.groups
            .get(group)
            .is_some_and(|handlers| handlers.contains_key(&name.to_lowercase()))
    }

    /// 实例化处理器；非控制器返回 `None`
    pub fn instantiate(&self, group: &str, name: &str) -> Option<Box<dyn Controller>> {
        match self.groups.get(group)?.get(&name.to_lowercase())? {
            HandlerEntry::Controller(factory) => Some(factory()),
            HandlerEntry::Module => {
                warn!("{}/{}不是控制器，拒绝调度", group, name);
                None
            }
        }
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn handler_count(&self) -> usize {
        self.groups.values().map(HashMap::len).sum()
    }
}

/// 单个请求的处理上下文
pub struct Context<'a> {
    config: &'a Config,
    lang: &'a Lang,
    memory: &'a MemoryCache,
    route: &'a ResolvedRoute,
    output: Option<OutputDocument>,
}

impl<'a> Context<'a> {
    pub fn new(
        config: &'a Config,
        lang: &'a Lang,
        memory: &'a MemoryCache,
        route: &'a ResolvedRoute,
        user_agent: &str,
    ) -> Self {
        Self {
            config,
            lang,
            memory,
            route,
            output: Some(OutputDocument::new(config, lang, user_agent)),
        }
    }

    pub fn config(&self) -> &Config {
        self.config
    }

    pub fn lang(&self) -> &Lang {
        self.lang
    }

    pub fn memory(&self) -> &MemoryCache {
        self.memory
    }

    pub fn route(&self) -> &ResolvedRoute {
        self.route
    }

    /// 尚未渲染的输出文档
    pub fn output(&mut self) -> Result<&mut OutputDocument, Exception> {
        self.output.as_mut().ok_or(Exception::OutputAlreadySent)
    }

    /// 以给定正文组装完整文档
    pub fn render(&mut self, body: &str) -> Result<Response, Exception> {
        let doc = self.output.take().ok_or(Exception::OutputAlreadySent)?;
        Ok(doc.assemble(body))
    }

    /// 读取 `app/server/view/<分组>/<处理器>/<动作>.html` 作为正文并组装
    pub fn render_view(&mut self) -> Result<Response, Exception> {
        let mut path = self.config.view_path();
        for part in self.route.group.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path.push(self.route.handler_name.to_lowercase());
        path.push(format!("{}.{}", self.route.action_key(), EXT_VIEW));
        let body = fs::read_to_string(&path).map_err(|e| {
            Exception::fault(2, format!("无法读取视图文件{}: {}", path.display(), e))
        })?;
        self.render(&body)
    }

    /// 绕过文档外壳输出原始内容
    pub fn display(&mut self, content: impl Into<Bytes>, mime: &str) -> Result<Response, Exception> {
        let doc = self.output.take().ok_or(Exception::OutputAlreadySent)?;
        Ok(doc.render_raw(content, mime))
    }
}

/// 执行已解析路由对应的动作
pub fn dispatch(
    controller: &mut dyn Controller,
    ctx: &mut Context,
    route: &ResolvedRoute,
) -> Result<Response, Exception> {
    if route.is_default_action() {
        controller.on_index(ctx, &route.params)
    } else {
        controller.on_action(&route.action_name, ctx, &route.params)
    }
}
