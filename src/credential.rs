//! WiFi 凭据及其持久化记录格式
//!
//! 记录布局（共 97 字节）：
//! - `[0, 32)`  网络名称，以 0 填充
//! - `[32, 95)` 密码，以 0 填充
//! - `[95, 97)` Fletcher-16 校验和，小端序

use std::fmt::Debug;

/// 名称缓冲区长度（含结尾的 0）
pub const NAME_LEN: usize = 32;
/// 密码缓冲区长度（含结尾的 0）
pub const PASSWORD_LEN: usize = 63;
pub const CHECKSUM_LEN: usize = 2;
/// 参与校验的字节数
pub const PAYLOAD_LEN: usize = NAME_LEN + PASSWORD_LEN;
/// 一条完整记录占用的字节数
pub const RECORD_LEN: usize = PAYLOAD_LEN + CHECKSUM_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    NameTooLong(usize),
    PasswordTooLong(usize),
    /// 字段中出现了 0 字节，无法与填充区分
    Nul,
}

impl std::fmt::Display for CredentialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialError::NameTooLong(len) => {
                write!(f, "name is {} bytes, at most {} allowed", len, NAME_LEN - 1)
            }
            CredentialError::PasswordTooLong(len) => write!(
                f,
                "password is {} bytes, at most {} allowed",
                len,
                PASSWORD_LEN - 1
            ),
            CredentialError::Nul => write!(f, "credential contains a NUL byte"),
        }
    }
}

impl std::error::Error for CredentialError {}

/// 定长的 WiFi 凭据
///
/// 相等性按填充后的完整缓冲区逐字节比较。
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Credential {
    name: [u8; NAME_LEN],
    password: [u8; PASSWORD_LEN],
}

impl Credential {
    /// 全 0 凭据，即“未配置”
    pub const fn empty() -> Self {
        Self {
            name: [0; NAME_LEN],
            password: [0; PASSWORD_LEN],
        }
    }

    pub fn new(name: &str, password: &str) -> Result<Self, CredentialError> {
        if name.len() > NAME_LEN - 1 {
            return Err(CredentialError::NameTooLong(name.len()));
        }
        if password.len() > PASSWORD_LEN - 1 {
            return Err(CredentialError::PasswordTooLong(password.len()));
        }
        if name.bytes().chain(password.bytes()).any(|b| b == 0) {
            return Err(CredentialError::Nul);
        }

        let mut credential = Self::empty();
        credential.name[..name.len()].copy_from_slice(name.as_bytes());
        credential.password[..password.len()].copy_from_slice(password.as_bytes());
        Ok(credential)
    }

    /// 名称为空或任一字段不是合法 UTF-8 时视为未配置，不应拿它去连接网络
    pub fn is_configured(&self) -> bool {
        self.join_params().is_some()
    }

    /// 连接时使用的 `(名称, 密码)`
    ///
    /// 与 `is_configured` 判断的是同一个视图：只有两个字段都是合法
    /// UTF-8 且名称非空时才返回。
    pub fn join_params(&self) -> Option<(&str, &str)> {
        let name = field_utf8(&self.name)?;
        let password = field_utf8(&self.password)?;
        (!name.is_empty()).then_some((name, password))
    }

    /// 用于显示，非法 UTF-8 时只保留合法前缀
    pub fn name(&self) -> &str {
        field_str(&self.name)
    }

    /// 用于显示，非法 UTF-8 时只保留合法前缀
    pub fn password(&self) -> &str {
        field_str(&self.password)
    }

    pub fn name_bytes(&self) -> &[u8; NAME_LEN] {
        &self.name
    }

    pub fn password_bytes(&self) -> &[u8; PASSWORD_LEN] {
        &self.password
    }

    /// 按 `name‖password` 顺序计算校验和
    pub fn checksum(&self) -> u16 {
        let mut fletcher = Fletcher16::default();
        fletcher.update(&self.name);
        fletcher.update(&self.password);
        fletcher.value()
    }

    pub fn to_record(&self) -> [u8; RECORD_LEN] {
        let mut record = [0u8; RECORD_LEN];
        record[..NAME_LEN].copy_from_slice(&self.name);
        record[NAME_LEN..PAYLOAD_LEN].copy_from_slice(&self.password);
        record[PAYLOAD_LEN..].copy_from_slice(&self.checksum().to_le_bytes());
        record
    }

    /// 校验和不匹配时返回 `None`
    pub fn from_record(record: &[u8; RECORD_LEN]) -> Option<Self> {
        let mut credential = Self::empty();
        credential.name.copy_from_slice(&record[..NAME_LEN]);
        credential
            .password
            .copy_from_slice(&record[NAME_LEN..PAYLOAD_LEN]);

        let stored = u16::from_le_bytes([record[PAYLOAD_LEN], record[PAYLOAD_LEN + 1]]);
        let computed = credential.checksum();
        log::debug!(
            "record name: {:?}, stored checksum: {}, computed: {}",
            credential.name(),
            stored,
            computed
        );

        (stored == computed).then_some(credential)
    }
}

impl Default for Credential {
    fn default() -> Self {
        Self::empty()
    }
}

// 不输出密码
impl Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Credential {{ name: {:?}, password: [{} bytes] }}",
            self.name(),
            self.password().len()
        )
    }
}

fn field_bytes(buf: &[u8]) -> &[u8] {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    &buf[..end]
}

fn field_utf8(buf: &[u8]) -> Option<&str> {
    std::str::from_utf8(field_bytes(buf)).ok()
}

fn field_str(buf: &[u8]) -> &str {
    let bytes = field_bytes(buf);
    match std::str::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            // 只保留合法的 UTF-8 前缀
            let valid = e.valid_up_to();
            std::str::from_utf8(&bytes[..valid]).unwrap_or_default()
        }
    }
}

/// Fletcher-16：两个模 255 的 8 位累加器
#[derive(Debug, Default, Clone, Copy)]
pub struct Fletcher16 {
    sum1: u16,
    sum2: u16,
}

impl Fletcher16 {
    pub fn update(&mut self, data: &[u8]) {
        for &byte in data {
            self.sum1 = (self.sum1 + byte as u16) % 255;
            self.sum2 = (self.sum2 + self.sum1) % 255;
        }
    }

    pub fn value(&self) -> u16 {
        (self.sum2 << 8) | self.sum1
    }
}

pub fn fletcher16(data: &[u8]) -> u16 {
    let mut fletcher = Fletcher16::default();
    fletcher.update(data);
    fletcher.value()
}
