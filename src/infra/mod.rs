pub mod config;
pub mod http_app;
pub mod logging;
pub mod http {
    pub mod sse;
}
pub mod boot;
pub mod runtime;
