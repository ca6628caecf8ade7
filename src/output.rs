// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 输出组装器
//!
//! 处理器执行期间通过一组 setter 声明标题、元数据、链接、样式与脚本，
//! 最后由 `assemble` 一次性渲染为完整的 HTML 文档，或由 `render_raw` 绕过文档外壳直接输出。
//!
//! 链接与脚本的输出顺序由 (层级, 打包方式, 插入序号) 共同决定：
//! 系统层先于应用层，单文件先于资源包，同一档位内保持插入顺序。

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use url::Url;

use bytes::Bytes;

use crate::config::Config;
use crate::lang::Lang;
use crate::param::{DIR_CACHE, DIR_LANG, DIR_SCRIPT, DIR_STYLE, SYS_CHARSET};
use crate::response::Response;
use crate::util::escape_attr;

const EOL: &str = "\n";
const INDENT: &str = "        ";

lazy_static! {
    static ref MSIE: Regex = Regex::new(r"MSIE\s+(\d+)").unwrap();
}

/// 资源由谁声明
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    System,
    Application,
}

/// 资源是单文件还是子目录中的资源包
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Packaging {
    Single,
    Bundle,
}

/// 排序键：档位 + 插入序号
///
/// 档位为层级与打包方式之和，因此系统层资源包与应用层单文件处于同一档位，按插入顺序排列。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct OrderKey {
    band: u8,
    seq: usize,
}

impl OrderKey {
    fn new(tier: Tier, packaging: Packaging, seq: usize) -> Self {
        let band = match tier {
            Tier::System => 0,
            Tier::Application => 1,
        } + match packaging {
            Packaging::Single => 0,
            Packaging::Bundle => 1,
        };
        Self { band, seq }
    }
}

#[derive(Debug, Clone)]
struct Meta {
    name: String,
    content: String,
    http_equiv: bool,
}

#[derive(Debug, Clone)]
struct Link {
    rel: String,
    href: String,
    kind: Option<String>,
    media: Option<String>,
    order: OrderKey,
}

#[derive(Debug, Clone)]
struct ScriptLink {
    src: String,
    kind: Option<String>,
    async_load: bool,
    defer: bool,
    order: OrderKey,
}

#[derive(Debug, Clone)]
struct Inline {
    content: String,
    attr: Option<String>,
}

#[derive(Debug, Clone)]
struct Base {
    href: Option<String>,
    target: Option<String>,
}

/// 单个请求的文档累加器，条目只追加不删除
#[derive(Debug, Clone)]
pub struct OutputDocument {
    debug: bool,
    tier: Tier,
    language: String,
    name: Option<String>,
    version: f64,
    manifest: bool,
    legacy: bool,
    noscript: String,
    old_ie: String,
    title: Option<String>,
    base: Option<Base>,
    metas: Vec<Meta>,
    links: Vec<Link>,
    styles: Vec<Inline>,
    scripts: Vec<ScriptLink>,
    inline_scripts: Vec<Inline>,
}

impl OutputDocument {
    /// 创建文档并以系统层身份登记默认样式、脚本与本地化引导脚本
    pub fn new(config: &Config, lang: &Lang, user_agent: &str) -> Self {
        let manifest =
            !config.is_debug() && config.is_cached() && config.manifest_path().is_file();
        let mut doc = Self {
            debug: config.is_debug(),
            tier: Tier::System,
            language: config.language().to_string(),
            name: config.name().map(str::to_string),
            version: config.version(),
            manifest,
            legacy: is_legacy_browser(user_agent),
            noscript: lang.sys("noscript").to_string(),
            old_ie: lang.sys("oldieversion").to_string(),
            title: None,
            base: None,
            metas: Vec::new(),
            links: Vec::new(),
            styles: Vec::new(),
            scripts: Vec::new(),
            inline_scripts: Vec::new(),
        };
        if let Some(name) = config.name() {
            doc.set_title(name);
        }
        for style in config.system_styles() {
            doc.set_style(style);
        }
        for script in config.system_scripts() {
            doc.set_script(script);
        }
        let loader = if lang.is_localized() {
            lang_loader(config.language())
        } else {
            "function _l(e,p){}".to_string()
        };
        doc.set_inline_script(&loader);
        doc.tier = Tier::Application;
        doc
    }

    /// 切换后续声明所属的层级
    pub fn set_tier(&mut self, tier: Tier) {
        self.tier = tier;
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn set_title(&mut self, title: &str) {
        let title = title.trim();
        if !title.is_empty() {
            self.title = Some(title.to_string());
        }
    }

    pub fn set_base(&mut self, href: &str, target: &str) {
        let href = href.trim();
        let target = target.trim().to_lowercase();
        self.base = Some(Base {
            href: (!href.is_empty()).then(|| href.to_string()),
            target: (!target.is_empty()).then_some(target),
        });
    }

    /// `content-type` 由外壳固定输出，调用方声明的同名元数据被丢弃
    pub fn set_metadata(&mut self, name: &str, content: &str, http_equiv: bool) {
        let name = name.trim().to_lowercase();
        if name.is_empty() || name == "content-type" {
            return;
        }
        self.metas.push(Meta {
            name,
            content: content.trim().to_string(),
            http_equiv,
        });
    }

    pub fn set_link(&mut self, href: &str, rel: &str, kind: &str, media: &str) {
        let seq = self.links.len();
        self.push_link(href, rel, kind, media, OrderKey::new(self.tier, Packaging::Single, seq));
    }

    fn push_link(&mut self, href: &str, rel: &str, kind: &str, media: &str, order: OrderKey) {
        let mut href = href.replace('\\', "/").trim().to_string();
        if !is_absolute_url(&href) && !href.starts_with('/') {
            href.insert(0, '/');
        }
        self.links.push(Link {
            rel: rel.trim().to_string(),
            href,
            kind: non_empty(kind.trim().to_lowercase()),
            media: media_attr(media),
            order,
        });
    }

    /// 样式表：自动补全 `/style/` 前缀，子目录中的样式视为资源包
    pub fn set_style(&mut self, href: &str) {
        self.set_style_with(href, "stylesheet", "text/css", "all");
    }

    pub fn set_style_with(&mut self, href: &str, rel: &str, kind: &str, media: &str) {
        let prefix = format!("/{}/", DIR_STYLE);
        let href = prefixed(href, &prefix);
        let packaging = packaging_of(&href, &prefix);
        let seq = self.links.len();
        let order = OrderKey::new(self.tier, packaging, seq);
        match self.collapse(&href, packaging, |doc, dir| {
            doc.links.iter().any(|l| l.href == dir)
        }) {
            Some(href) => self.push_link(&href, rel, kind, media, order),
            None => debug!("资源包{}已登记，跳过", href),
        }
    }

    pub fn set_script(&mut self, src: &str) {
        self.set_script_with(src, "text/javascript", false, false);
    }

    /// 外部脚本：自动补全 `/script/` 前缀，子目录中的脚本视为资源包
    pub fn set_script_with(&mut self, src: &str, kind: &str, async_load: bool, defer: bool) {
        let prefix = format!("/{}/", DIR_SCRIPT);
        let src = prefixed(src, &prefix);
        let packaging = packaging_of(&src, &prefix);
        let seq = self.scripts.len();
        let order = OrderKey::new(self.tier, packaging, seq);
        match self.collapse(&src, packaging, |doc, dir| {
            doc.scripts.iter().any(|s| s.src == dir)
        }) {
            Some(src) => self.scripts.push(ScriptLink {
                src,
                kind: script_type(kind),
                async_load,
                defer,
                order,
            }),
            None => debug!("资源包{}已登记，跳过", src),
        }
    }

    /// 生产模式下同一目录的资源被合并为一个资源包，返回 `None` 表示已存在
    fn collapse<F>(&self, path: &str, packaging: Packaging, exists: F) -> Option<String>
    where
        F: Fn(&Self, &str) -> bool,
    {
        if self.debug {
            return Some(path.to_string());
        }
        let dir = parent_dir(path);
        if exists(self, dir) {
            return None;
        }
        Some(match packaging {
            Packaging::Single => path.to_string(),
            Packaging::Bundle => dir.to_string(),
        })
    }

    pub fn set_inline_style(&mut self, content: &str, media: &str) {
        let content = content.trim();
        if !content.is_empty() {
            self.styles.push(Inline {
                content: content.to_string(),
                attr: media_attr(media),
            });
        }
    }

    pub fn set_inline_script(&mut self, content: &str) {
        self.set_inline_script_with(content, "text/javascript");
    }

    pub fn set_inline_script_with(&mut self, content: &str, kind: &str) {
        let content = content.trim();
        if !content.is_empty() {
            self.inline_scripts.push(Inline {
                content: content.to_string(),
                attr: script_type(kind),
            });
        }
    }

    /// 排序后的脚本地址
    pub fn script_sources(&self) -> Vec<&str> {
        let mut scripts: Vec<&ScriptLink> = self.scripts.iter().collect();
        scripts.sort_by_key(|s| s.order);
        scripts.iter().map(|s| s.src.as_str()).collect()
    }

    /// 排序后的链接地址
    pub fn link_hrefs(&self) -> Vec<&str> {
        let mut links: Vec<&Link> = self.links.iter().collect();
        links.sort_by(|a, b| a.rel.cmp(&b.rel).then(a.order.cmp(&b.order)));
        links.iter().map(|l| l.href.as_str()).collect()
    }

    /// 渲染完整文档，消费自身
    pub fn assemble(mut self, body: &str) -> Response {
        self.links
            .sort_by(|a, b| a.rel.cmp(&b.rel).then(a.order.cmp(&b.order)));
        self.scripts.sort_by_key(|s| s.order);
        let mut html = self.top_markup();
        html.push_str(body.trim());
        html.push_str(EOL);
        html.push_str("</body>");
        html.push_str(EOL);
        html.push_str("</html>");
        Response::from_html(&html)
    }

    /// 绕过文档外壳直接输出内容
    pub fn render_raw(self, content: impl Into<Bytes>, mime: &str) -> Response {
        Response::from_bytes(content.into(), mime)
    }

    fn head_markup(&self) -> String {
        let mut header = String::new();
        for meta in &self.metas {
            let attr = if meta.http_equiv { "http-equiv" } else { "name" };
            header.push_str(&format!(
                "{}    <meta {}=\"{}\" content=\"{}\">",
                EOL,
                attr,
                meta.name,
                escape_attr(&meta.content)
            ));
        }
        if let Some(title) = &self.title {
            header.push_str(&format!("{}    <title>{}</title>", EOL, title));
        }
        if let Some(base) = &self.base {
            header.push_str(&format!("{}    <base", EOL));
            if let Some(href) = &base.href {
                header.push_str(&format!(" href=\"{}\"", href));
            }
            if let Some(target) = &base.target {
                header.push_str(&format!(" target=\"{}\"", target));
            }
            header.push('>');
        }
        if self.legacy {
            return header;
        }
        for link in &self.links {
            header.push_str(&format!(
                "{}    <link rel=\"{}\" href=\"{}\"",
                EOL, link.rel, link.href
            ));
            if let Some(kind) = &link.kind {
                header.push_str(&format!(" type=\"{}\"", kind));
            }
            if let Some(media) = &link.media {
                header.push_str(&format!(" media=\"{}\"", media));
            }
            header.push('>');
        }
        for style in &self.styles {
            header.push_str(&format!("{}    <style", EOL));
            if let Some(media) = &style.attr {
                header.push_str(&format!(" media=\"{}\"", media));
            }
            header.push('>');
            header.push_str(EOL);
            header.push_str(&indent(&style.content));
            header.push_str(&format!("{}    </style>", EOL));
        }
        for script in &self.scripts {
            header.push_str(&format!("{}    <script src=\"{}\"", EOL, script.src));
            if let Some(kind) = &script.kind {
                header.push_str(&format!(" type=\"{}\"", kind));
            }
            if script.async_load {
                header.push_str(" async=\"async\"");
            }
            if script.defer {
                header.push_str(" defer=\"defer\"");
            }
            header.push_str("></script>");
        }
        for script in &self.inline_scripts {
            header.push_str(&format!("{}    <script", EOL));
            if let Some(kind) = &script.attr {
                header.push_str(&format!(" type=\"{}\"", kind));
            }
            header.push('>');
            header.push_str(EOL);
            header.push_str(&indent(&script.content));
            header.push_str(&format!("{}    </script>", EOL));
        }
        header
    }

    fn top_markup(&self) -> String {
        let manifest = if self.manifest {
            format!(" manifest=\"/{}.manifest\"", DIR_CACHE)
        } else {
            String::new()
        };
        let mut appdata = String::new();
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            appdata.push_str(&format!(
                "<meta name=\"name\" content=\"{}\">{}    ",
                escape_attr(name),
                EOL
            ));
        }
        if self.version > 0.0 {
            appdata.push_str(&format!(
                "<meta name=\"version\" content=\"{:.2}\">{}    ",
                self.version, EOL
            ));
        }
        let old_ie = self.old_ie.replace('\'', "\\'");
        format!(
            r#"<!doctype html>
<html lang="{lang}" class="no-js"{manifest}>
<head>
    <meta charset="{charset}">
    {appdata}<meta name="viewport" content="initial-scale=1">
    <meta http-equiv="X-UA-Compatible" content="IE=edge,chrome=1">{header}
    <!--[if lt IE 9]>
        <style>
            * {{ display: none !important; }}
        </style>
        <script type="text/javascript">
            if(confirm('{old_ie}'))
                location.href='http://microsoft.com/ie/';
        </script>
    <![endif]-->
    <noscript><span style="position:absolute;display:block;width:100%;text-align:center;top:45%;">{noscript}</span></noscript>
</head>
<body>
"#,
            lang = self.language,
            manifest = manifest,
            charset = SYS_CHARSET,
            appdata = appdata,
            header = self.head_markup(),
            old_ie = old_ie,
            noscript = self.noscript,
        )
    }
}

/// 旧版 IE（低于 9）不输出链接与脚本
pub fn is_legacy_browser(user_agent: &str) -> bool {
    MSIE.captures(user_agent)
        .and_then(|caps| caps[1].parse::<u32>().ok())
        .is_some_and(|major| major < 9)
}

fn is_absolute_url(value: &str) -> bool {
    Url::parse(value).map(|u| u.has_host()).unwrap_or(false)
}

fn prefixed(path: &str, prefix: &str) -> String {
    let path = path.replace('\\', "/").trim().to_string();
    if is_absolute_url(&path) || path.starts_with(prefix) {
        path
    } else {
        format!("{}{}", prefix, path.trim_start_matches('/'))
    }
}

fn packaging_of(path: &str, prefix: &str) -> Packaging {
    match path.strip_prefix(prefix) {
        Some(rest) if rest.contains('/') => Packaging::Bundle,
        _ => Packaging::Single,
    }
}

fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(pos) => &path[..pos],
        None => ".",
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

fn media_attr(media: &str) -> Option<String> {
    let media = media.trim().to_lowercase();
    (!media.is_empty() && media != "all").then_some(media)
}

fn script_type(kind: &str) -> Option<String> {
    let kind = kind.trim().to_lowercase();
    (!kind.is_empty() && kind != "text/javascript").then_some(kind)
}

fn indent(content: &str) -> String {
    content
        .lines()
        .map(|line| format!("{}{}", INDENT, line))
        .collect::<Vec<_>>()
        .join(EOL)
}

fn lang_loader(language: &str) -> String {
    let uri = format!("/{}/{}", DIR_LANG, language);
    format!(
        r#"function _l(e,p){{
    var t=(typeof e==='object')?e:$(((!e)?'*':String(e).trim())+'[data-i18n]');
    t.each(function(){{
        var d=$(this).data('i18n').split('```');var x=i18n(d[0]);
        if(d.length>1){{d.splice(0,1);x=vsprintf(x,d);}}
        if(p)$(this).prop(p,x);else $(this).html(x);
    }});
}}
$(document).ready(function(){{$.ajax({{url:'{uri}',dataType:'json'}}).done(function(d){{i18n.add(d);_l();$(document).trigger('system-localized');}});}});"#,
        uri = uri
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn document(debug: bool) -> OutputDocument {
        let config = Config::new().with_debug(debug);
        OutputDocument::new(&config, &Lang::default(), "Mozilla/5.0")
    }

    fn body_of(response: &Response) -> String {
        String::from_utf8_lossy(response.body()).to_string()
    }

    #[test]
    fn test_system_scripts_precede_application_scripts() {
        let mut doc = document(true);
        doc.set_script("foo.js");
        doc.set_tier(Tier::System);
        doc.set_script("bar.js");
        assert_eq!(doc.script_sources(), vec!["/script/bar.js", "/script/foo.js"]);
    }

    #[test]
    fn test_single_files_precede_bundles() {
        let mut doc = document(true);
        doc.set_script("widgets/grid.js");
        doc.set_script("main.js");
        doc.set_script("widgets/tree.js");
        assert_eq!(
            doc.script_sources(),
            vec!["/script/main.js", "/script/widgets/grid.js", "/script/widgets/tree.js"]
        );
    }

    #[test]
    fn test_system_bundle_shares_band_with_application_single() {
        let mut doc = document(true);
        doc.set_tier(Tier::System);
        doc.set_script("vendor/a.js");
        doc.set_tier(Tier::Application);
        doc.set_script("app.js");
        assert_eq!(doc.script_sources(), vec!["/script/vendor/a.js", "/script/app.js"]);
    }

    #[test]
    fn test_links_sorted_by_relation_then_order() {
        let mut doc = document(true);
        doc.set_style("main");
        doc.set_link("img/favicon.ico", "icon", "", "all");
        doc.set_tier(Tier::System);
        doc.set_style("sys");
        assert_eq!(
            doc.link_hrefs(),
            vec!["/img/favicon.ico", "/style/sys", "/style/main"]
        );
    }

    #[test]
    fn test_production_collapses_bundles() {
        let mut doc = document(false);
        doc.set_script("widgets/grid.js");
        doc.set_script("widgets/tree.js");
        doc.set_script("main");
        assert_eq!(doc.script_sources(), vec!["/script/main", "/script/widgets"]);
    }

    #[test]
    fn test_production_collapses_style_bundles() {
        let mut doc = document(false);
        doc.set_style("widgets/a.css");
        doc.set_style("widgets/b.css");
        doc.set_style("site");
        assert_eq!(doc.link_hrefs(), vec!["/style/site", "/style/widgets"]);

        let html = body_of(&doc.assemble(""));
        assert_eq!(html.matches(r#"href="/style/widgets""#).count(), 1);
        assert!(!html.contains("/style/widgets/"));
        let site = html.find(r#"href="/style/site""#).unwrap();
        let widgets = html.find(r#"href="/style/widgets""#).unwrap();
        assert!(site < widgets);
    }

    #[test]
    fn test_debug_keeps_every_entry() {
        let mut doc = document(true);
        doc.set_style("widgets/grid.css");
        doc.set_style("widgets/tree.css");
        assert_eq!(doc.link_hrefs().len(), 2);
    }

    #[test]
    fn test_set_link_normalizes_href() {
        let mut doc = document(true);
        doc.set_link("img\\logo.png", "preload", "IMAGE/PNG", "Print");
        doc.set_link("https://cdn.example.com/x.css", "stylesheet", "", "all");
        let html = body_of(&doc.assemble(""));
        assert!(html.contains(r#"<link rel="preload" href="/img/logo.png" type="image/png" media="print">"#));
        assert!(html.contains(r#"<link rel="stylesheet" href="https://cdn.example.com/x.css">"#));
    }

    #[test]
    fn test_metadata_rules() {
        let mut doc = document(true);
        doc.set_metadata("Content-Type", "text/plain", true);
        doc.set_metadata(" Description ", " demo ", false);
        doc.set_metadata("refresh", "30", true);
        let html = body_of(&doc.assemble(""));
        assert!(!html.contains("text/plain"));
        assert!(html.contains(r#"<meta name="description" content="demo">"#));
        assert!(html.contains(r#"<meta http-equiv="refresh" content="30">"#));
    }

    #[test]
    fn test_document_shell() {
        let text = "[application]\nname = \"Demo\"\nversion = 1.5\n";
        let config = Config::parse(text).unwrap().with_debug(true);
        let mut system = HashMap::new();
        system.insert("noscript".to_string(), "Enable JavaScript".to_string());
        let lang = Lang::from_tables(system, HashMap::new(), false);
        let mut doc = OutputDocument::new(&config, &lang, "");
        doc.set_inline_style("p {\n  color: red;\n}", "screen");
        doc.set_script_with("late", "module", true, true);

        let html = body_of(&doc.assemble("<p>hello</p>"));
        assert!(html.starts_with("<!doctype html>\n<html lang=\"en-us\" class=\"no-js\">"));
        assert!(html.contains(r#"<meta charset="utf-8">"#));
        assert!(html.contains(r#"<meta name="name" content="Demo">"#));
        assert!(html.contains(r#"<meta name="version" content="1.50">"#));
        assert!(html.contains("<title>Demo</title>"));
        assert!(html.contains("<style media=\"screen\">\n        p {\n          color: red;\n        }\n    </style>"));
        assert!(html.contains(r#"<script src="/script/late" type="module" async="async" defer="defer"></script>"#));
        assert!(html.contains("function _l(e,p){}"));
        assert!(html.contains("Enable JavaScript"));
        assert!(html.ends_with("<body>\n<p>hello</p>\n</body>\n</html>"));
    }

    #[test]
    fn test_head_order() {
        let mut doc = document(true);
        doc.set_inline_script("var late = 1;");
        doc.set_script("main");
        doc.set_inline_style("p{}", "all");
        doc.set_style("main");
        let html = body_of(&doc.assemble(""));
        let link = html.find("<link").unwrap();
        let style = html.find("<style>").unwrap();
        let script = html.find("<script src").unwrap();
        let inline = html.find("var late").unwrap();
        assert!(link < style && style < script && script < inline);
    }

    #[test]
    fn test_localized_loader() {
        let lang = Lang::from_tables(HashMap::new(), HashMap::new(), true);
        let doc = OutputDocument::new(&Config::new(), &lang, "");
        let html = body_of(&doc.assemble(""));
        assert!(html.contains("url:'/lang/en-us'"));
    }

    #[test]
    fn test_legacy_browser_gets_no_assets() {
        let config = Config::new().with_debug(true);
        let mut doc = OutputDocument::new(
            &config,
            &Lang::default(),
            "Mozilla/4.0 (compatible; MSIE 8.0; Windows NT 6.1)",
        );
        doc.set_script("main");
        doc.set_title("Old");
        let html = body_of(&doc.assemble(""));
        assert!(html.contains("<title>Old</title>"));
        assert!(!html.contains("<script src"));
        assert!(!html.contains("function _l"));
    }

    #[test]
    fn test_is_legacy_browser() {
        assert!(is_legacy_browser("Mozilla/4.0 (compatible; MSIE 6.0)"));
        assert!(!is_legacy_browser("Mozilla/5.0 (compatible; MSIE 10.0)"));
        assert!(!is_legacy_browser("Mozilla/5.0 (X11; Linux x86_64) Firefox/120.0"));
    }

    #[test]
    fn test_set_base() {
        let mut doc = document(true);
        doc.set_base("/app/", " _BLANK ");
        let html = body_of(&doc.assemble(""));
        assert!(html.contains(r#"<base href="/app/" target="_blank">"#));
    }

    #[test]
    fn test_render_raw() {
        let doc = document(true);
        let response = doc.render_raw(r#"{"ok":true}"#.to_string(), "application/json");
        assert_eq!(response.body(), br#"{"ok":true}"#);
        assert_eq!(response.content_type(), Some("application/json"));
    }
}
