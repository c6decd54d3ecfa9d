//! SoftAP + Web 配网模块
//!
//! 临时热点上的 HTTP 服务只有一个处理器：收到同时带有 `s` 和 `p`
//! 两个参数的请求即视为配网完成，否则回送配网表单。

mod handlers;
mod html;
mod server;

pub use handlers::{CaptureSession, NAME_FIELD, PASSWORD_FIELD};
pub use html::FORM_HTML;
pub use server::{parse_query, Exchange, PendingExchange, PortalServer, Response};

#[cfg(target_os = "espidf")]
pub use server::EspPortalServer;
