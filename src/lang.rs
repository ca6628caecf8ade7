// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 本地化字符串表
//!
//! 启动时读取一次，之后只读共享。系统表必须存在，应用表可选。

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::{Captures, Regex};

use crate::config::Config;
use crate::exception::Exception;
use crate::param::{SYS_CHARSET, SYS_NAME, SYS_VERSION};

lazy_static! {
    static ref CONSTANT_TOKEN: Regex = Regex::new(r"\{%\s*([A-Za-z_][A-Za-z0-9_]*)\s*%\}").unwrap();
}

#[derive(Debug, Clone, Default)]
pub struct Lang {
    system: HashMap<String, String>,
    app: HashMap<String, String>,
    localized: bool,
}

impl Lang {
    pub fn load(config: &Config) -> Result<Self, Exception> {
        let constants = constants_for(config);

        let sys_file = config.system_lang_file();
        let sys_text = fs::read_to_string(&sys_file)
            .map_err(|_| Exception::LangMissing(sys_file.display().to_string()))?;
        let system = parse_table(&sys_text, &constants).map_err(|e| {
            Exception::LangMissing(format!("{} ({})", sys_file.display(), e))
        })?;
        info!("系统语言文件已载入：{}，共{}条", sys_file.display(), system.len());

        let app_file = config.app_lang_file();
        let app = match read_optional(&app_file) {
            Some(text) => match parse_table(&text, &constants) {
                Ok(table) => table,
                Err(e) => {
                    warn!("应用语言文件{}无法解析：{}，忽略", app_file.display(), e);
                    HashMap::new()
                }
            },
            None => {
                debug!("应用语言文件{}不存在", app_file.display());
                HashMap::new()
            }
        };

        let localized = config.client_lang_file().is_file();
        Ok(Self {
            system,
            app,
            localized,
        })
    }

    /// 直接由内存表构造（测试与嵌入场景使用）
    pub fn from_tables(
        system: HashMap<String, String>,
        app: HashMap<String, String>,
        localized: bool,
    ) -> Self {
        let normalize = |table: HashMap<String, String>| {
            table
                .into_iter()
                .map(|(k, v)| (k.trim().to_lowercase(), v))
                .collect()
        };
        Self {
            system: normalize(system),
            app: normalize(app),
            localized,
        }
    }

    pub fn lookup(&self, key: &str, system: bool) -> Option<&str> {
        let key = key.trim().to_lowercase();
        let table = if system { &self.system } else { &self.app };
        table.get(&key).map(String::as_str)
    }

    /// 系统字符串，缺失时回落为空串
    pub fn sys(&self, key: &str) -> &str {
        self.lookup(key, true).unwrap_or("")
    }

    /// 客户端语言文件是否存在
    pub fn is_localized(&self) -> bool {
        self.localized
    }
}

fn read_optional(path: &Path) -> Option<String> {
    if path.is_file() {
        fs::read_to_string(path).ok()
    } else {
        None
    }
}

fn constants_for(config: &Config) -> HashMap<&'static str, String> {
    let mut map = HashMap::new();
    map.insert("SYS_NAME", SYS_NAME.to_string());
    map.insert("SYS_VERSION", SYS_VERSION.to_string());
    map.insert("SYS_CHARSET", SYS_CHARSET.to_string());
    map.insert("APP_NAME", config.name().unwrap_or_default().to_string());
    map
}

fn parse_table(
    text: &str,
    constants: &HashMap<&'static str, String>,
) -> Result<HashMap<String, String>, toml::de::Error> {
    let raw: HashMap<String, String> = toml::from_str(text)?;
    Ok(raw
        .into_iter()
        .filter_map(|(key, value)| {
            let key = key.trim().to_lowercase();
            let value = value.trim();
            if key.is_empty() || value.is_empty() {
                None
            } else {
                Some((key, expand(value, constants)))
            }
        })
        .collect())
}

/// 展开 `{% NAME %}` 形式的常量，未知常量保持原样
pub fn expand(input: &str, constants: &HashMap<&'static str, String>) -> String {
    CONSTANT_TOKEN
        .replace_all(input, |caps: &Captures| match constants.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}
