//! # HTTP 响应
//!
//! 流水线的所有出口（静态资源、缓存页面、处理器输出、错误页）都汇总为 `Response`，
//! 再由传输层决定是否压缩并序列化为报文。

use crate::{param::*, util::HtmlBuilder};

use brotli::enc::{self, backward_references::BrotliEncoderParams};
use bytes::Bytes;
use chrono::prelude::*;
use flate2::{
    write::{DeflateEncoder, GzEncoder},
    Compression,
};
use log::{debug, error, warn};

use std::io::{self, Write};

#[derive(Debug, Clone)]
pub struct Response {
    version: HttpVersion,
    status_code: u16,
    information: String,
    content_type: Option<String>,
    content_length: u64,
    date: DateTime<Utc>,
    content_encoding: Option<HttpEncoding>,
    server_name: String,
    allow: Option<Vec<HttpRequestMethod>>,
    content: Option<Bytes>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            version: HttpVersion::V1_1,
            status_code: 200,
            information: "OK".to_string(),
            content_type: None,
            content_length: 0,
            date: Utc::now(),
            content_encoding: None,
            server_name: SERVER_NAME.to_string(),
            allow: Some(ALLOWED_METHODS.to_vec()),
            content: None,
        }
    }

    /// 以 HTML 文本构造 200 响应
    pub fn from_html(html: &str) -> Self {
        Self::from_bytes(Bytes::from(html.to_string()), "text/html;charset=utf-8")
    }

    /// 以任意字节与 MIME 类型构造 200 响应
    pub fn from_bytes(content: Bytes, mime: &str) -> Self {
        let mut response = Self::new();
        response.allow = None;
        response.content_length = content.len() as u64;
        response.content_type = Some(mime.to_string());
        response.content = Some(content);
        response
    }

    /// 协议层状态页，不经过输出组装器
    pub fn from_status_code(code: u16) -> Self {
        let mut response = Self::new();
        if code == 204 {
            response.set_code(code);
            return response;
        }
        response.allow = match code {
            405 => Some(ALLOWED_METHODS.to_vec()),
            _ => None,
        };
        let content = match code {
            400 => HtmlBuilder::from_status_code(400, Some(
                r"<h2>噢！</h2><p>服务器无法理解这个请求。</p>"
            )),
            404 => HtmlBuilder::from_status_code(404, Some(
                r"<h2>噢！</h2><p>你指定的网页无法找到。</p>"
            )),
            405 => HtmlBuilder::from_status_code(405, Some(
                r"<h2>噢！</h2><p>本服务器仅支持GET、HEAD、OPTIONS与POST方法。</p>"
            )),
            500 => HtmlBuilder::from_status_code(500, Some(
                r"<h2>噢！</h2><p>服务器出现了一个内部错误。</p>"
            )),
            _ => HtmlBuilder::from_status_code(code, None),
        }
        .build();
        let bytes = Bytes::from(content);
        response.content_length = bytes.len() as u64;
        response.content = Some(bytes);
        response.content_type = Some("text/html;charset=utf-8".to_string());
        response.set_code(code);
        response
    }

    /// 替换状态码，保留正文
    pub fn with_status(mut self, code: u16) -> Self {
        self.set_code(code);
        self
    }

    /// HEAD 请求：保留头部与长度，丢弃正文
    pub fn head_only(mut self) -> Self {
        self.content = None;
        self.content_encoding = None;
        self
    }

    /// 按客户端声明的编码压缩正文，压缩失败时原样发送
    pub fn encode(mut self, accept_encoding: &[HttpEncoding], id: u128) -> Self {
        let Some(content) = self.content.take() else {
            return self;
        };
        let mime = self.content_type.as_deref().unwrap_or("");
        let encoding = if should_skip_compression(mime) {
            debug!("[ID{}]文件类型{}跳过压缩", id, mime);
            None
        } else {
            decide_encoding(accept_encoding)
        };
        match encoding {
            Some(HttpEncoding::Gzip) => debug!("[ID{}]使用Gzip压缩编码", id),
            Some(HttpEncoding::Br) => debug!("[ID{}]使用Brotli压缩编码", id),
            Some(HttpEncoding::Deflate) => debug!("[ID{}]使用Deflate压缩编码", id),
            None => debug!("[ID{}]不进行压缩", id),
        };
        if encoding.is_none() {
            self.content = Some(content);
            return self;
        }
        match compress(content.to_vec(), encoding) {
            Ok(compressed) => {
                self.content_length = compressed.len() as u64;
                self.content_encoding = encoding;
                self.content = Some(Bytes::from(compressed));
            }
            Err(e) => {
                error!("[ID{}]压缩失败: {}，返回未压缩内容", id, e);
                self.content = Some(content);
            }
        }
        self
    }

    fn set_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.information = match STATUS_CODES.get(&code) {
            Some(&reason) => reason.to_string(),
            None => {
                warn!("未登记的状态码：{}", code);
                "Unknown".to_string()
            }
        };
        self
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        let version: &str = match self.version {
            HttpVersion::V1_1 => "HTTP/1.1",
        };
        let status_code: &str = &self.status_code.to_string();
        let information: &str = &self.information;
        let content_length: &str = &self.content_length.to_string();
        let date: &str = &format_date(&self.date);
        let server: &str = &self.server_name;

        let header = [
            version,
            " ",
            status_code,
            " ",
            information,
            CRLF,
            match &self.content_type {
                Some(t) => ["Content-Type: ", t, CRLF].concat(),
                None => "".to_string(),
            }
            .as_str(),
            match self.content_encoding {
                Some(e) => ["Content-Encoding: ", &e.to_string(), CRLF].concat(),
                None => "".to_string(),
            }
            .as_str(),
            "Content-Length: ",
            content_length,
            CRLF,
            "Date: ",
            date,
            CRLF,
            "Server: ",
            server,
            CRLF,
            match &self.allow {
                Some(a) => {
                    let allow_str = a
                        .iter()
                        .map(|m| m.to_string())
                        .collect::<Vec<_>>()
                        .join(", ");
                    ["Allow: ", &allow_str, CRLF].concat()
                }
                None => "".to_string(),
            }
            .as_str(),
            CRLF,
        ]
        .concat();
        [
            header.as_bytes(),
            match &self.content {
                Some(c) => c,
                None => b"",
            },
        ]
        .concat()
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// 当前正文（压缩前调用即为原始内容）
    pub fn body(&self) -> &[u8] {
        match &self.content {
            Some(c) => c,
            None => b"",
        }
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    pub fn content_encoding(&self) -> Option<HttpEncoding> {
        self.content_encoding
    }

    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|t| t.starts_with("text/html"))
    }
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc2822()
}

fn compress(data: Vec<u8>, mode: Option<HttpEncoding>) -> io::Result<Vec<u8>> {
    match mode {
        Some(HttpEncoding::Gzip) => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data)?;
            encoder.finish()
        }
        Some(HttpEncoding::Deflate) => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data)?;
            encoder.finish()
        }
        Some(HttpEncoding::Br) => {
            let params = BrotliEncoderParams::default();
            let mut output = Vec::new();
            enc::BrotliCompress(&mut io::Cursor::new(data), &mut output, &params)?;
            Ok(output)
        }
        None => Ok(data),
    }
}

fn should_skip_compression(mime_type: &str) -> bool {
    let skip_types = [
        "image/jpeg",
        "image/png",
        "image/gif",
        "image/webp",
        "image/avif",
        "image/x-icon",
        "video/",
        "audio/",
        "application/zip",
        "application/gzip",
        "font/woff",
        "font/woff2",
        "application/vnd.ms-fontobject",
    ];

    skip_types
        .iter()
        .any(|&skip_type| mime_type.starts_with(skip_type))
}

fn decide_encoding(accept_encoding: &[HttpEncoding]) -> Option<HttpEncoding> {
    if accept_encoding.contains(&HttpEncoding::Gzip) {
        Some(HttpEncoding::Gzip)
    } else if accept_encoding.contains(&HttpEncoding::Deflate) {
        Some(HttpEncoding::Deflate)
    } else {
        None
    }
}
