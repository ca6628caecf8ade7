use lazy_static::lazy_static;
use regex::Regex;

use crate::param::STATUS_CODES;

lazy_static! {
    /// 压缩空白时需要原样保留的元素；未闭合的元素一直保留到文档末尾
    static ref PRESERVED: Regex = Regex::new(
        r"(?is)<(?:pre|textarea|script)\b.*?(?:</(?:pre|textarea|script)\s*>|\z)"
    )
    .unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// 协议层状态页（400/404/405 等）构建器，不经过输出组装器
pub struct HtmlBuilder {
    title: String,
    css: String,
    body: String,
}

impl HtmlBuilder {
    pub fn from_status_code(code: u16, note: Option<&str>) -> Self {
        let title = format!("{}", code);
        let css = r"
            body {
                width: 35em;
                margin: 0 auto;
                font-family: Tahoma, Verdana, Arial, sans-serif;
            }
            "
        .to_string();
        let description = match note {
            Some(n) => n,
            None => STATUS_CODES.get(&code).copied().unwrap_or("Unknown Status"),
        };
        let body = format!(
            r"
            <h1>{}</h1>
            <p>{}</p>
            ",
            code, description
        );
        Self { title, css, body }
    }

    pub fn build(&self) -> String {
        format!(
            r##"<!doctype html>
            <html>
                <head>
                    <meta charset="utf-8">
                    <title>{}</title>
                    <style>{}</style>
                </head>
                <body>
                {}
                </body>
            </html>"##,
            self.title, self.css, self.body
        )
    }
}

/// 在保留元素之外把连续空白压缩为单个空格
pub fn minify(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut last = 0;
    for preserved in PRESERVED.find_iter(html) {
        out.push_str(&WHITESPACE.replace_all(&html[last..preserved.start()], " "));
        out.push_str(preserved.as_str());
        last = preserved.end();
    }
    out.push_str(&WHITESPACE.replace_all(&html[last..], " "));
    out
}

/// 把字符串逐字节转换为十六进制 HTML 实体，用于遮蔽联系邮箱
pub fn mask(input: &str) -> String {
    input
        .bytes()
        .map(|b| format!("&#x{:X};", b))
        .collect()
}

/// 转义属性值中的双引号与尖括号
pub fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// 转义 HTML 文本节点
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn format_file_size(size: u64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < units.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.1} {}", size, units[unit_index])
}
