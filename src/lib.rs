//! 无屏幕设备的 WiFi 配网
//!
//! 启动时读取保存的凭据并尝试连接；失败时把设备自身变成开放热点，
//! 通过一个极简网页收集新的凭据，带校验和写入持久化介质后重试。

pub mod captive_portal;
pub mod credential;
#[cfg(target_os = "espidf")]
pub mod esp;
pub mod network;
pub mod provision;
pub mod storage;
pub mod store;

pub use credential::{Credential, CredentialError};
pub use provision::{Outcome, ProvisionConfig, Provisioner, State};
pub use store::CredentialStore;
