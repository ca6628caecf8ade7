// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 请求流水线
//!
//! 进程启动时构建一次，之后以只读方式在所有请求间共享。每个请求依次尝试：
//! 1. 静态资源快速通道（`/script/*`、`/style/*`、`/lang/*`）；
//! 2. 公共目录 `pub/` 下的文件；
//! 3. 生产模式且开启缓存时：离线清单、页面缓存；
//! 4. 路由分发，执行处理器并组装文档。
//!
//! 路由与处理器的所有错误都汇入 `render_error`，生产模式下输出会被压缩空白并写入页面缓存。

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use chrono::Local;
use log::{debug, error, info, warn};
use percent_encoding::percent_decode_str;

use crate::cache::{ManifestStore, PageCache, PageWrite};
use crate::config::Config;
use crate::controller::{dispatch, Context, HandlerRegistry};
use crate::exception::Exception;
use crate::lang::Lang;
use crate::manifest;
use crate::memcache::MemoryCache;
use crate::output::OutputDocument;
use crate::param::*;
use crate::request::Request;
use crate::response::Response;
use crate::router::{normalize, Router};
use crate::util::{escape_html, mask, minify};

const ERROR_STYLE: &str = r"html * { color: #444; font: bold 1.25em sans-serif; text-shadow: 1px 1px 0 #FFF; }
body { background: linear-gradient(to right, #E2E2E2 0%, #F4F4F4 50%, #E2E2E2 100%); }
main { position: absolute; left: 50%; top: 50%; transform: translate(-50%, -50%); text-align: center; }
a.tooltip { outline: none; text-decoration: none; cursor: default; text-align: left; }
a.tooltip > span { position: absolute; visibility: hidden; opacity: 0; z-index: 10; width: 200px; margin-top: 20px; margin-left: -85px; padding: 10px 20px; font-size: 12px; color: #444; background: #FBF5E6; border: 1px solid #CFB57C; border-radius: 3px; transition: opacity 0.4s, margin-top 0.3s; }
a.tooltip:hover > span { visibility: visible; opacity: 1; margin-top: 50px; }";

/// 静态资源类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Asset {
    Script,
    Style,
    Lang,
}

impl Asset {
    fn from_path(path: &str) -> Option<(Self, &str)> {
        [
            (Asset::Script, DIR_SCRIPT),
            (Asset::Style, DIR_STYLE),
            (Asset::Lang, DIR_LANG),
        ]
        .into_iter()
        .find_map(|(asset, dir)| {
            let prefix = format!("/{}/", dir);
            match path.get(..prefix.len()) {
                Some(head) if head.eq_ignore_ascii_case(&prefix) => {
                    Some((asset, &path[prefix.len()..]))
                }
                _ => None,
            }
        })
    }

    fn dir(self) -> &'static str {
        match self {
            Asset::Script => DIR_SCRIPT,
            Asset::Style => DIR_STYLE,
            Asset::Lang => DIR_LANG,
        }
    }

    fn extension(self) -> &'static str {
        match self {
            Asset::Script => EXT_SCRIPT,
            Asset::Style => EXT_STYLE,
            Asset::Lang => EXT_JSON,
        }
    }
}

pub struct Pipeline {
    config: Config,
    lang: Lang,
    registry: HandlerRegistry,
    pages: PageCache,
    manifest: ManifestStore,
    memory: MemoryCache,
}

impl Pipeline {
    /// 载入本地化表并初始化各缓存层。本地化文件缺失是致命错误，缓存层失败只会降级
    pub fn bootstrap(config: Config, registry: HandlerRegistry) -> Result<Self, Exception> {
        let lang = Lang::load(&config)?;
        Ok(Self::new(config, lang, registry))
    }

    pub fn new(config: Config, lang: Lang, registry: HandlerRegistry) -> Self {
        let pages = match PageCache::open(
            &config.output_cache_path(),
            config.cache_ignore(),
            config.is_cached(),
        ) {
            Ok(pages) => pages,
            Err(e) => {
                warn!("{}，页面缓存已禁用", e);
                PageCache::disabled()
            }
        };
        let memory = if config.memory_cache() {
            MemoryCache::new(config.memory_capacity())
        } else {
            MemoryCache::disabled()
        };
        let manifest = ManifestStore::new(&config.manifest_path());
        info!(
            "流水线初始化完成：调试模式{}，页面缓存{}，内存缓存{}，处理器{}个（{}个分组）",
            config.is_debug(),
            pages.is_enabled(),
            memory.can_mem_cache(),
            registry.handler_count(),
            registry.group_count()
        );
        Self {
            config,
            lang,
            registry,
            pages,
            manifest,
            memory,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn memory(&self) -> &MemoryCache {
        &self.memory
    }

    pub fn pages(&self) -> &PageCache {
        &self.pages
    }

    /// 处理单个请求，总是返回一个响应
    pub fn handle(&self, request: &Request, id: u128) -> Response {
        let raw = request.path();
        let raw = raw.split(&['?', '#'][..]).next().unwrap_or("/");
        // 只解码一次，之后的遍历检查与路由看到的都是解码后的路径
        let decoded = percent_decode_str(raw).decode_utf8_lossy();
        let path: &str = &decoded;

        if let Some((asset, name)) = Asset::from_path(path) {
            if asset != Asset::Lang || self.lang.is_localized() {
                return self.serve_asset(asset, name, id);
            }
        }

        if let Some(response) = self.serve_public(path, id) {
            return response;
        }

        let production = !self.config.is_debug();
        if production && self.config.is_cached() {
            if let Some(bytes) = self.manifest.read_manifest(path) {
                debug!("[ID{}]返回离线清单", id);
                return Response::from_bytes(bytes, mime_for("manifest"));
            }
            if let Some(bytes) = self.pages.read_page(path) {
                debug!("[ID{}]页面缓存命中：{}", id, path);
                return Response::from_bytes(bytes, mime_for(EXT_VIEW));
            }
        }

        let response = match self.dispatch(request, path) {
            Ok(response) => response,
            Err(e) => return self.render_error(&e, request, id),
        };

        if !production || !response.is_html() {
            return response;
        }
        let status = response.status_code();
        let minified = minify(&String::from_utf8_lossy(response.body()));
        if status == 200 && self.pages.write_page(path, minified.as_bytes()) == PageWrite::Stored {
            debug!("[ID{}]页面{}已缓存", id, normalize(path));
        }
        Response::from_html(&minified).with_status(status)
    }

    fn dispatch(&self, request: &Request, path: &str) -> Result<Response, Exception> {
        let (route, mut controller) = Router::resolve_controller(&self.registry, path)?;
        debug!(
            "路由解析：{} -> {}{}::{} {:?}",
            path, route.group, route.handler_name, route.action_name, route.params
        );
        let mut ctx = Context::new(
            &self.config,
            &self.lang,
            &self.memory,
            &route,
            request.user_agent(),
        );
        dispatch(controller.as_mut(), &mut ctx, &route)
    }

    fn serve_asset(&self, asset: Asset, name: &str, id: u128) -> Response {
        let mime = mime_for(asset.extension());
        let Some(relative) = safe_relative(&name.to_lowercase()) else {
            warn!("[ID{}]拒绝非法的资源路径：{}", id, name);
            return Response::from_status_code(400);
        };
        let relative = if relative.extension().is_none() {
            relative.with_extension(asset.extension())
        } else {
            relative
        };
        for candidate in self.asset_candidates(asset, &relative) {
            if candidate.is_file() {
                return match fs::read(&candidate) {
                    Ok(content) => {
                        debug!("[ID{}]返回静态资源{}", id, candidate.display());
                        Response::from_bytes(Bytes::from(content), mime)
                    }
                    Err(e) => {
                        error!("[ID{}]无法读取{}: {}", id, candidate.display(), e);
                        Response::from_status_code(500)
                    }
                };
            }
        }
        debug!("[ID{}]静态资源{}不存在", id, relative.display());
        Response::from_status_code(404)
    }

    /// 资源查找顺序：系统优先于应用，生产模式最后查找资源包
    fn asset_candidates(&self, asset: Asset, relative: &Path) -> Vec<PathBuf> {
        let kind = asset.dir();
        if asset == Asset::Lang {
            let dir = if self.config.is_debug() {
                self.config.client_dir(kind)
            } else {
                self.config.app_cache_dir(kind)
            };
            return vec![dir.join(relative)];
        }
        if self.config.is_debug() {
            return vec![
                self.config.system_dir(kind).join(relative),
                self.config.client_dir(kind).join(relative),
            ];
        }
        let app = self.config.app_cache_dir(kind);
        let mut pack = relative.to_path_buf();
        if let Some(ext) = relative.extension().and_then(|e| e.to_str()) {
            pack.set_extension(format!("{}.{}", EXT_PACK, ext));
        }
        vec![
            self.config.system_cache_path().join(relative),
            app.join(relative),
            app.join(pack),
        ]
    }

    fn serve_public(&self, path: &str, id: u128) -> Option<Response> {
        let relative = safe_relative(path.trim_start_matches('/'))?;
        if relative.as_os_str().is_empty() {
            return None;
        }
        let file = self.config.public_path().join(&relative);
        if !file.is_file() {
            return None;
        }
        let ext = relative
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        match fs::read(&file) {
            Ok(content) => {
                debug!("[ID{}]返回公共文件{}", id, file.display());
                Some(Response::from_bytes(Bytes::from(content), mime_for(ext)))
            }
            Err(e) => {
                error!("[ID{}]无法读取公共文件{}: {}", id, file.display(), e);
                None
            }
        }
    }

    /// 所有路由与处理器错误的统一渲染出口
    pub fn render_error(&self, e: &Exception, request: &Request, id: u128) -> Response {
        let (status, code, title, message, location, trace) = match e {
            Exception::RouteNotFound(path) => {
                warn!("[ID{}]路由未找到：{}", id, path);
                (
                    404,
                    0,
                    Some(self.lang.sys("notfoundtitle").to_string()),
                    self.lang.sys("notfoundmessage").to_string(),
                    None,
                    String::new(),
                )
            }
            Exception::HandlerFault {
                code,
                message,
                title,
                location,
                trace,
            } => {
                error!(
                    "[ID{}]处理器故障：{} in {} on line {}",
                    id,
                    message,
                    location.file(),
                    location.line()
                );
                (
                    500,
                    *code,
                    title.clone(),
                    escape_html(message),
                    Some(*location),
                    trace.clone(),
                )
            }
            other => {
                error!("[ID{}]请求处理异常：{}", id, other);
                (500, 1, None, escape_html(&other.to_string()), None, String::new())
            }
        };

        let title = title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| self.lang.sys("errortitle").to_string());
        let l = |key: &str| self.lang.sys(key).to_string();
        let (message, tip) = if self.config.is_debug() {
            let mut tip = format!("<strong>{}</strong><br>{}", l("errornum"), code);
            if let Some(location) = location {
                tip.push_str(&format!(
                    "<br><br><strong>{}</strong><br>{}<br><br><strong>{}</strong><br>{}",
                    l("file"),
                    location.file(),
                    l("linenum"),
                    location.line()
                ));
            }
            if !trace.is_empty() {
                tip.push_str(&format!(
                    "<br><br><strong>{}</strong><br>{}",
                    l("callstack"),
                    escape_html(&trace).replace('\n', "<br>")
                ));
            }
            (message, tip)
        } else {
            let now = Local::now();
            let tip = format!(
                "<strong>{}</strong><br>{:o}<br><br><strong>{}</strong><br>{}<br>{} ({})<br><br><strong>{}</strong><br>{}<br>{}",
                l("errornum"),
                code.wrapping_add(self.config.error_seed()),
                l("systime"),
                now.format("%A, %-d of %B, %Y"),
                now.format("%-I:%M %p %Z"),
                now.format("%-H:%M"),
                l("sysadmin"),
                self.config.admin_name(),
                mask(self.config.admin_email())
            );
            let message = if status == 404 { message } else { l("errormessage") };
            (message, tip)
        };

        let content = format!(
            "<main><a class=\"tooltip\">{}<span>{}</span></a></main>",
            message, tip
        );
        let mut doc = OutputDocument::new(&self.config, &self.lang, request.user_agent());
        doc.set_title(&title);
        doc.set_inline_style(ERROR_STYLE, "all");
        doc.assemble(&content).with_status(status)
    }

    /// 清空页面缓存
    pub fn purge_pages(&self) -> io::Result<usize> {
        let removed = self.pages.purge()?;
        info!("页面缓存已清空，共删除{}个文件", removed);
        Ok(removed)
    }

    /// 重新生成离线清单
    pub fn write_manifest(&self) -> io::Result<usize> {
        manifest::write(&self.config)
    }
}

/// 只接受普通路径分量，拒绝 `..` 与绝对路径
fn safe_relative(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => result.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(result)
}
