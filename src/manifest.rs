// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 离线应用清单生成器：扫描客户端资源目录与公共目录，写出 `app/cache.manifest`。

use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use log::{debug, info};
use walkdir::WalkDir;

use crate::config::Config;
use crate::param::{DIR_LANG, DIR_SCRIPT, DIR_STYLE};

/// 生成清单文本，时间戳取当前 UTC 时间
pub fn generate(config: &Config) -> String {
    generate_at(config, Utc::now())
}

pub fn generate_at(config: &Config, now: DateTime<Utc>) -> String {
    let mut output = format!("CACHE MANIFEST\n\n# {}\n\nCACHE:\n", now.to_rfc2822());
    for kind in [DIR_LANG, DIR_SCRIPT, DIR_STYLE] {
        let entries = collect(&config.client_dir(kind), &format!("/{}", kind), false);
        push_entries(&mut output, &entries);
    }
    let public = collect(&config.public_path(), "/", true);
    push_entries(&mut output, &public);
    output.push_str("\nNETWORK:\n*\n");
    output
}

/// 生成并写入清单文件
pub fn write(config: &Config) -> io::Result<usize> {
    let text = generate(config);
    let path = config.manifest_path();
    fs::write(&path, &text)?;
    info!("离线清单已写入{}", path.display());
    Ok(text.len())
}

fn push_entries(output: &mut String, entries: &[String]) {
    for entry in entries {
        output.push_str(entry);
        output.push('\n');
    }
}

/// 列出目录下的资源 URI。`full_path` 为 false 时，子目录中的文件以其目录（资源包）代表，
/// 顶层文件去掉扩展名
fn collect(source: &Path, replace_uri: &str, full_path: bool) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();
    if !source.is_dir() {
        debug!("清单来源目录{}不存在，跳过", source.display());
        return result;
    }
    let prefix = format!("{}/", replace_uri.trim_end_matches('/'));
    for entry in WalkDir::new(source)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");
        let name = if full_path {
            relative
        } else {
            match relative.rsplit_once('/') {
                Some((dir, _)) => dir.to_string(),
                None => Path::new(&relative)
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or(relative),
            }
        };
        let uri = format!("{}{}", prefix, name)
            .replace("//", "/")
            .replace(' ', "%20")
            .replace('+', "%2B");
        if !result.contains(&uri) {
            result.push(uri);
        }
    }
    result
}
