pub mod cache;
pub mod config;
pub mod controller;
pub mod exception;
pub mod handlers;
pub mod lang;
pub mod manifest;
pub mod memcache;
pub mod output;
pub mod param;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod router;
pub mod util;

pub use cache::{IgnoreRules, ManifestStore, PageCache};
pub use config::Config;
pub use controller::{Context, Controller, HandlerRegistry};
pub use exception::Exception;
pub use lang::Lang;
pub use memcache::MemoryCache;
pub use output::OutputDocument;
pub use param::{HttpEncoding, HttpRequestMethod, HttpVersion};
pub use pipeline::Pipeline;
pub use request::Request;
pub use response::Response;
pub use router::{ResolvedRoute, Router};
pub use util::HtmlBuilder;
