// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 路由模块
//!
//! 把请求路径规范化为分段序列，并在处理器注册表中按"最深目录优先"的约定
//! 解析出 (处理器, 动作, 参数) 三元组。解析只依赖路径与注册表快照，是纯函数。

use log::debug;

use crate::controller::{Controller, HandlerRegistry};
use crate::exception::Exception;
use crate::param::{ACTION_PREFIX, DEFAULT_HANDLER};

/// 规范化后路径中的一段，以及到该段为止的累积前缀
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub part: String,
    pub full_prefix: String,
}

/// 路由结果，生成后不可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    /// 命中的处理器分组（规范化前缀，根分组为 `/`）
    pub group: String,
    pub handler_name: String,
    pub action_name: String,
    pub params: Vec<String>,
}

impl ResolvedRoute {
    /// 动作名去掉 `on` 前缀后的小写形式，用于定位视图文件
    pub fn action_key(&self) -> String {
        self.action_name
            .strip_prefix(ACTION_PREFIX)
            .unwrap_or(&self.action_name)
            .to_lowercase()
    }

    pub fn is_default_action(&self) -> bool {
        self.action_name == default_action()
    }
}

/// 规范化请求路径：去掉查询串与片段，小写，折叠重复的 `/`，去掉末尾的 `/`，
/// 根路径保持为 `/`
pub fn normalize(path: &str) -> String {
    let path = path.split(&['?', '#'][..]).next().unwrap_or("");
    let parts: Vec<String> = path
        .split('/')
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// 拆分为带累积前缀的分段。根路径得到唯一的 `{part: "/", full_prefix: "/"}`
pub fn segments(path: &str) -> Vec<Segment> {
    let normalized = normalize(path);
    if normalized == "/" {
        return vec![Segment {
            part: "/".to_string(),
            full_prefix: "/".to_string(),
        }];
    }
    let mut result: Vec<Segment> = Vec::new();
    for part in normalized.split('/').filter(|p| !p.is_empty()) {
        let full_prefix = match result.last() {
            Some(prev) => format!("{}/{}", prev.full_prefix, part),
            None => format!("/{}", part),
        };
        result.push(Segment {
            part: part.to_string(),
            full_prefix,
        });
    }
    result
}

/// 首字母大写
pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn default_action() -> String {
    format!("{}{}", ACTION_PREFIX, DEFAULT_HANDLER)
}

pub struct Router;

impl Router {
    pub fn resolve(registry: &HandlerRegistry, path: &str) -> Result<ResolvedRoute, Exception> {
        Self::resolve_controller(registry, path).map(|(route, _)| route)
    }

    /// 解析路由，同时交出能力检查时已实例化的处理器
    pub fn resolve_controller(
        registry: &HandlerRegistry,
        path: &str,
    ) -> Result<(ResolvedRoute, Box<dyn Controller>), Exception> {
        let segments = segments(path);
        let count = segments.len();
        let default_handler = DEFAULT_HANDLER.to_lowercase();

        // 1. 由深到浅寻找存在的处理器分组
        let mut node: Option<usize> = None;
        let mut group = "/".to_string();
        for (i, segment) in segments.iter().enumerate().rev() {
            if registry.has_group(&segment.full_prefix) {
                node = Some(i);
                group = segment.full_prefix.clone();
                break;
            }
        }
        let next = |node: Option<usize>| node.map_or(0, |n| n + 1);

        // 2. 紧随其后的一段若是处理器文件则采用，否则退回分组或根分组的默认处理器
        let mut handler = default_handler.clone();
        if next(node) < count {
            let candidate = &segments[next(node)].part;
            if registry.has_handler(&group, candidate) {
                handler = candidate.clone();
                node = Some(next(node));
            } else if !registry.has_handler(&group, &default_handler) {
                group = "/".to_string();
            }
        } else if !registry.has_handler(&group, &default_handler) {
            group = "/".to_string();
        }

        // 3. 只有具备控制器能力的处理器才可调度
        let controller = match registry.instantiate(&group, &handler) {
            Some(controller) => controller,
            None => {
                debug!("路由{}未找到可调度的处理器{}/{}", path, group, handler);
                return Err(Exception::RouteNotFound(normalize(path)));
            }
        };

        // 4. 再下一段若对应默认动作或一个具名动作则采用，动作名中的连字符会被去掉
        let mut action = default_action();
        if next(node) < count {
            let wanted = format!(
                "{}{}",
                ACTION_PREFIX,
                capitalize(&segments[next(node)].part.replace('-', ""))
            );
            let found = if wanted.eq_ignore_ascii_case(&action) {
                Some(action.clone())
            } else {
                controller
                    .actions()
                    .iter()
                    .find(|a| a.eq_ignore_ascii_case(&wanted))
                    .map(|a| a.to_string())
            };
            if let Some(found) = found {
                action = found;
                node = Some(next(node));
            }
        }

        // 5. 剩余分段按顺序作为参数
        let params = segments
            .iter()
            .skip(next(node))
            .map(|s| s.part.clone())
            .collect();

        let route = ResolvedRoute {
            group,
            handler_name: capitalize(&handler),
            action_name: action,
            params,
        };
        Ok((route, controller))
    }
}
