//! 配网请求处理

use super::html;
use super::server::Exchange;
use crate::credential::Credential;

/// 网络名称字段
pub const NAME_FIELD: &str = "s";
/// 密码字段
pub const PASSWORD_FIELD: &str = "p";

/// 一次配网过程中的捕获状态
///
/// 名称和密码必须出现在同一个请求里才算完成：先提交名称、
/// 再单独提交密码不会让会话进入 ready。
#[derive(Debug, Default)]
pub struct CaptureSession {
    name: Option<String>,
    password: Option<String>,
    ready: bool,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// 只有 ready 之后才有值
    pub fn credential(&self) -> Option<Credential> {
        if !self.ready {
            return None;
        }
        let name = self.name.as_deref()?;
        let password = self.password.as_deref()?;
        Credential::new(name, password).ok()
    }

    pub fn handle(&mut self, exchange: &mut dyn Exchange) {
        log::debug!("In credential handler");

        if let Some(name) = exchange.arg(NAME_FIELD) {
            self.name = Some(name.to_string());

            if let Some(password) = exchange.arg(PASSWORD_FIELD) {
                match Credential::new(name, password) {
                    Ok(_) => {
                        self.password = Some(password.to_string());
                        self.ready = true;
                        log::info!("Captured credential for {:?}", name);
                    }
                    Err(e) => {
                        log::warn!("Rejected submitted credential: {}", e);
                    }
                }
            }
        }

        if !self.ready {
            exchange.send(200, "text/html", html::FORM_HTML);
        }
    }
}
