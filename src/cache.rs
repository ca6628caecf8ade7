use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use log::{debug, warn};
use sha2::{Digest, Sha256};

use crate::exception::Exception;
use crate::param::{MANIFEST_URI, PAGE_CACHE_READ_LIMIT};
use crate::router::normalize;
use crate::util::format_file_size;

/// 页面缓存的忽略规则，按路径分段前缀匹配
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    rules: Vec<Vec<String>>,
}

impl IgnoreRules {
    pub fn new(rules: &[String]) -> Self {
        let rules = rules
            .iter()
            .filter(|r| !r.trim().is_empty())
            .map(|r| split(&normalize(r)))
            .collect();
        Self { rules }
    }

    /// 规则的各段是否为 URI 规范化路径的前导段
    pub fn covers(&self, uri: &str) -> bool {
        let path = split(&normalize(uri));
        self.rules
            .iter()
            .any(|rule| rule.len() <= path.len() && rule.iter().zip(&path).all(|(a, b)| a == b))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn split(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageWrite {
    Stored,
    Skipped,
}

/// 整页磁盘缓存，以规范化 URI 的哈希为文件名，无过期时间
#[derive(Debug, Clone)]
pub struct PageCache {
    dir: PathBuf,
    ignore: IgnoreRules,
    enabled: bool,
}

impl PageCache {
    /// 打开缓存目录，不存在时创建
    pub fn open(dir: &Path, ignore: &[String], enabled: bool) -> Result<Self, Exception> {
        if enabled {
            fs::create_dir_all(dir).map_err(|e| {
                Exception::CacheUnavailable(format!("{} ({})", dir.display(), e))
            })?;
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            ignore: IgnoreRules::new(ignore),
            enabled,
        })
    }

    /// 不使用页面缓存
    pub fn disabled() -> Self {
        Self {
            dir: PathBuf::new(),
            ignore: IgnoreRules::default(),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn key(uri: &str) -> String {
        hex::encode(Sha256::digest(normalize(uri).as_bytes()))
    }

    fn entry_path(&self, uri: &str) -> PathBuf {
        self.dir.join(Self::key(uri))
    }

    // 查询
    pub fn read_page(&self, uri: &str) -> Option<Bytes> {
        if !self.enabled || self.ignore.covers(uri) {
            return None;
        }
        let path = self.entry_path(uri);
        let size = fs::metadata(&path).ok()?.len();
        if size > PAGE_CACHE_READ_LIMIT {
            warn!(
                "页面缓存{}过大({})，视为未命中",
                path.display(),
                format_file_size(size)
            );
            return None;
        }
        match fs::read(&path) {
            Ok(content) => {
                debug!("页面缓存命中：{}", uri);
                Some(Bytes::from(content))
            }
            Err(e) => {
                warn!("{}", Exception::CacheUnavailable(format!("{} ({})", path.display(), e)));
                None
            }
        }
    }

    // 放入
    pub fn write_page(&self, uri: &str, content: &[u8]) -> PageWrite {
        if !self.enabled || self.ignore.covers(uri) {
            return PageWrite::Skipped;
        }
        if content.len() as u64 > PAGE_CACHE_READ_LIMIT {
            debug!("页面{}过大({})，跳过缓存", uri, format_file_size(content.len() as u64));
            return PageWrite::Skipped;
        }
        let path = self.entry_path(uri);
        match fs::write(&path, content) {
            Ok(_) => {
                debug!("页面{}已写入缓存{}", uri, path.display());
                PageWrite::Stored
            }
            Err(e) => {
                warn!("{}", Exception::CacheUnavailable(format!("{} ({})", path.display(), e)));
                PageWrite::Skipped
            }
        }
    }

    /// 删除全部缓存页面，返回删除的文件数
    pub fn purge(&self) -> io::Result<usize> {
        if !self.dir.is_dir() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// 固定 URI 的离线清单透传
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn is_manifest_uri(uri: &str) -> bool {
        normalize(uri) == MANIFEST_URI
    }

    pub fn read_manifest(&self, uri: &str) -> Option<Bytes> {
        if !Self::is_manifest_uri(uri) {
            return None;
        }
        match fs::read(&self.path) {
            Ok(content) => Some(Bytes::from(content)),
            Err(e) => {
                debug!("离线清单{}不可读：{}", self.path.display(), e);
                None
            }
        }
    }
}
