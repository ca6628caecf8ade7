use num_cpus;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use log::{debug, warn};
use std::fs;
use std::path::PathBuf;

use crate::exception::Exception;
use crate::param::*;

/// 启动时加载一次的不可变配置快照
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_root")]
    root: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    worker_threads: usize,
    #[serde(default = "default_true")]
    local: bool,
    #[serde(default)]
    debug: bool,
    #[serde(default = "default_error_seed")]
    error_seed: u32,
    #[serde(default)]
    application: AppSettings,
    #[serde(default)]
    admin: AdminSettings,
    #[serde(default)]
    cache: CacheSettings,
    #[serde(default)]
    output: OutputSettings,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AppSettings {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: f64,
    #[serde(default = "default_language")]
    language: String,
    #[serde(default = "default_locale")]
    locale: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct AdminSettings {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CacheSettings {
    #[serde(default)]
    enable: bool,
    #[serde(default)]
    ignore: Vec<String>,
    #[serde(default)]
    memory: bool,
    #[serde(default = "default_memory_capacity")]
    memory_capacity: usize,
    #[serde(default = "default_ttl")]
    ttl: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct OutputSettings {
    #[serde(default)]
    system_scripts: Vec<String>,
    #[serde(default)]
    system_styles: Vec<String>,
}

fn default_root() -> String {
    ".".to_string()
}

fn default_port() -> u16 {
    7878
}

fn default_true() -> bool {
    true
}

fn default_error_seed() -> u32 {
    100
}

fn default_language() -> String {
    "en-us".to_string()
}

fn default_locale() -> String {
    "en_US".to_string()
}

fn default_memory_capacity() -> usize {
    256
}

fn default_ttl() -> u64 {
    DEFAULT_CACHE_TTL
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: None,
            version: 0.0,
            language: default_language(),
            locale: default_locale(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enable: false,
            ignore: Vec::new(),
            memory: false,
            memory_capacity: default_memory_capacity(),
            ttl: default_ttl(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            root: default_root(),
            port: default_port(),
            worker_threads: 0,
            local: true,
            debug: false,
            error_seed: default_error_seed(),
            application: AppSettings::default(),
            admin: AdminSettings::default(),
            cache: CacheSettings::default(),
            output: OutputSettings::default(),
        }
    }

    /// 从 TOML 文件读取配置。文件缺失是致命错误。
    pub fn from_toml(filename: &str) -> Result<Self, Exception> {
        let str_val = fs::read_to_string(filename)
            .map_err(|e| Exception::ConfigMissing(format!("{} ({})", filename, e)))?;
        Self::parse(&str_val)
    }

    /// 解析 TOML 文本并补全派生的默认值
    pub fn parse(text: &str) -> Result<Self, Exception> {
        let mut raw_config: Config =
            toml::from_str(text).map_err(|e| Exception::InvalidConfig(e.to_string()))?;
        if raw_config.worker_threads == 0 {
            raw_config.worker_threads = num_cpus::get();
        }
        if raw_config.cache.memory && raw_config.cache.memory_capacity == 0 {
            warn!("memory_capacity被设置为0，共享内存缓存将被禁用");
            raw_config.cache.memory = false;
        }
        raw_config.application.language = raw_config.application.language.trim().to_lowercase();
        debug!("配置解析完成，调试模式：{}", raw_config.debug);
        Ok(raw_config)
    }

    /// 替换站点根目录（测试与嵌入场景使用）
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

impl Config {
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn error_seed(&self) -> u32 {
        self.error_seed
    }

    pub fn name(&self) -> Option<&str> {
        self.application.name.as_deref()
    }

    pub fn version(&self) -> f64 {
        self.application.version
    }

    pub fn language(&self) -> &str {
        &self.application.language
    }

    pub fn locale(&self) -> &str {
        &self.application.locale
    }

    pub fn admin_name(&self) -> &str {
        &self.admin.name
    }

    pub fn admin_email(&self) -> &str {
        &self.admin.email
    }

    /// 是否开启页面缓存与离线清单
    pub fn is_cached(&self) -> bool {
        self.cache.enable
    }

    pub fn cache_ignore(&self) -> &[String] {
        &self.cache.ignore
    }

    pub fn memory_cache(&self) -> bool {
        self.cache.memory
    }

    pub fn memory_capacity(&self) -> usize {
        self.cache.memory_capacity
    }

    pub fn cache_ttl(&self) -> u64 {
        self.cache.ttl
    }

    pub fn system_scripts(&self) -> &[String] {
        &self.output.system_scripts
    }

    pub fn system_styles(&self) -> &[String] {
        &self.output.system_styles
    }
}

// --- 目录布局 ---

impl Config {
    pub fn root_path(&self) -> PathBuf {
        PathBuf::from(&self.root)
    }

    pub fn public_path(&self) -> PathBuf {
        self.root_path().join(DIR_PUBLIC)
    }

    /// 开发模式下的应用客户端资源目录，如 `app/client/script`
    pub fn client_dir(&self, kind: &str) -> PathBuf {
        self.root_path().join(DIR_APP).join(DIR_CLIENT).join(kind)
    }

    /// 开发模式下的系统资源目录，如 `sys/script`
    pub fn system_dir(&self, kind: &str) -> PathBuf {
        self.root_path().join(DIR_SYSTEM).join(kind)
    }

    /// 构建产物目录 `sys/cache`，系统资源包直接位于其中
    pub fn system_cache_path(&self) -> PathBuf {
        self.root_path().join(DIR_SYSTEM).join(DIR_CACHE)
    }

    /// 应用资源构建产物目录，如 `sys/cache/app/script`
    pub fn app_cache_dir(&self, kind: &str) -> PathBuf {
        self.system_cache_path().join(DIR_APP).join(kind)
    }

    /// 页面缓存目录 `sys/cache/output`
    pub fn output_cache_path(&self) -> PathBuf {
        self.system_cache_path().join(DIR_OUTPUT)
    }

    /// 离线应用清单文件 `app/cache.manifest`
    pub fn manifest_path(&self) -> PathBuf {
        self.root_path()
            .join(DIR_APP)
            .join(format!("{}.manifest", DIR_CACHE))
    }

    pub fn view_path(&self) -> PathBuf {
        self.root_path().join(DIR_APP).join(DIR_SERVER).join(DIR_VIEW)
    }

    pub fn system_lang_file(&self) -> PathBuf {
        self.system_dir(DIR_LANG)
            .join(format!("{}.{}", self.language(), EXT_LANG))
    }

    pub fn app_lang_file(&self) -> PathBuf {
        self.root_path()
            .join(DIR_APP)
            .join(DIR_SERVER)
            .join(DIR_LANG)
            .join(format!("{}.{}", self.language(), EXT_LANG))
    }

    /// 客户端语言文件，生产模式读取构建产物
    pub fn client_lang_file(&self) -> PathBuf {
        let dir = if self.debug {
            self.client_dir(DIR_LANG)
        } else {
            self.app_cache_dir(DIR_LANG)
        };
        dir.join(format!("{}.{}", self.language(), EXT_JSON))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.port(), 7878);
        assert_eq!(config.language(), "en-us");
        assert_eq!(config.error_seed(), 100);
        assert_eq!(config.cache_ttl(), 86400);
        assert!(!config.is_debug());
        assert!(!config.is_cached());
        assert!(config.worker_threads() > 0);
    }

    #[test]
    fn test_parse_full() {
        let text = r#"
            root = "/srv/site"
            port = 8080
            debug = true

            [application]
            name = "Demo"
            version = 1.5
            language = " EN-GB "

            [admin]
            name = "Ops"
            email = "ops@example.com"

            [cache]
            enable = true
            ignore = ["admin", "/reports/"]
            memory = true

            [output]
            system_scripts = ["jquery"]
        "#;
        let config = Config::parse(text).unwrap();
        assert_eq!(config.root(), "/srv/site");
        assert_eq!(config.port(), 8080);
        assert!(config.is_debug());
        assert_eq!(config.name(), Some("Demo"));
        assert_eq!(config.language(), "en-gb");
        assert_eq!(config.admin_email(), "ops@example.com");
        assert!(config.is_cached());
        assert_eq!(config.cache_ignore().len(), 2);
        assert!(config.memory_cache());
        assert_eq!(config.system_scripts(), &["jquery".to_string()]);
    }

    #[test]
    fn test_zero_memory_capacity_disables_memory() {
        let config = Config::parse("[cache]\nmemory = true\nmemory_capacity = 0\n").unwrap();
        assert!(!config.memory_cache());
    }

    #[test]
    fn test_invalid_toml() {
        let result = Config::parse("port = \"not a number\"");
        assert!(matches!(result, Err(Exception::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_toml("does/not/exist.toml");
        assert!(matches!(result, Err(Exception::ConfigMissing(_))));
    }

    #[test]
    fn test_layout_paths() {
        let config = Config::new().with_root("/site");
        assert_eq!(config.output_cache_path(), PathBuf::from("/site/sys/cache/output"));
        assert_eq!(config.manifest_path(), PathBuf::from("/site/app/cache.manifest"));
        assert_eq!(config.client_dir("script"), PathBuf::from("/site/app/client/script"));
        assert_eq!(config.system_lang_file(), PathBuf::from("/site/sys/lang/en-us.toml"));
        assert_eq!(
            config.client_lang_file(),
            PathBuf::from("/site/sys/cache/app/lang/en-us.json")
        );
        let debug = config.with_debug(true);
        assert_eq!(
            debug.client_lang_file(),
            PathBuf::from("/site/app/client/lang/en-us.json")
        );
    }
}
