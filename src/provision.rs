//! 配网状态机
//!
//! 先用已保存的凭据连接；失败或没有凭据时打开临时热点，等待用户通过
//! 表单提交新凭据，保存后再试一次。整个过程受一个总的截止时间约束，
//! 但只要还有客户端连在热点上，截止时间就会被推迟。

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::captive_portal::{CaptureSession, Exchange, PortalServer};
use crate::credential::Credential;
use crate::network::{AccessPoint, Clock, Station, Watchdog};
use crate::storage::Eeprom;
use crate::store::CredentialStore;

/// 配网流程参数
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    /// 查询连接状态的间隔
    pub join_poll_interval: Duration,
    /// 最多查询次数
    pub join_attempts: u32,
    /// 热点模式下轮询 HTTP 服务器的间隔
    pub portal_poll_interval: Duration,
    pub portal_ip: Ipv4Addr,
    pub portal_gateway: Ipv4Addr,
    pub portal_netmask: Ipv4Addr,
    pub portal_port: u16,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            join_poll_interval: Duration::from_millis(500),
            join_attempts: 60, // 最多 60 次 = 30 秒
            portal_poll_interval: Duration::from_millis(500),
            portal_ip: Ipv4Addr::new(192, 168, 0, 1),
            portal_gateway: Ipv4Addr::new(192, 168, 0, 1),
            portal_netmask: Ipv4Addr::new(255, 255, 255, 0),
            portal_port: 82,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// 用内存中的凭据连接，并轮询连接状态
    AttemptStored,
    /// 配置并启动临时热点和 HTTP 服务器
    OpenPortal,
    /// 轮询服务器，等待表单提交
    CaptureWait,
    /// 保存新凭据，关闭热点后重新连接
    PersistAndRetry,
    /// 已连上网络
    Connected,
    /// 截止时间已过
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 已连上网络
    Connected,
    /// 截止时间已过、没有客户端连接，也没有连上网络
    TimedOut,
}

pub struct Provisioner<E, R, H, W, C> {
    store: CredentialStore<E>,
    credential: Credential,
    radio: R,
    server: H,
    watchdog: W,
    clock: C,
    config: ProvisionConfig,
}

impl<E, R, H, W, C> Provisioner<E, R, H, W, C>
where
    E: Eeprom,
    R: Station + AccessPoint,
    H: PortalServer,
    W: Watchdog,
    C: Clock,
{
    /// 启动时读取一次已保存的凭据
    pub fn new(mut store: CredentialStore<E>, radio: R, server: H, watchdog: W, clock: C) -> Self {
        let credential = store.load().unwrap_or_default();
        log::info!("Stored credential: {:?}", credential);

        Self {
            store,
            credential,
            radio,
            server,
            watchdog,
            clock,
            config: ProvisionConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ProvisionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    /// 当前内存中的凭据，保存失败时它可能与介质上的不同
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn store_mut(&mut self) -> &mut CredentialStore<E> {
        &mut self.store
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn server(&self) -> &H {
        &self.server
    }

    pub fn watchdog(&self) -> &W {
        &self.watchdog
    }

    pub fn watchdog_mut(&mut self) -> &mut W {
        &mut self.watchdog
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// 运行配网流程，直到连上网络或超时
    ///
    /// `timeout` 为 `None` 时不设截止时间。
    pub fn connect(&mut self, setup_name: &str, timeout: Option<Duration>) -> Outcome {
        let start = self.clock.now();
        let mut session = CaptureSession::new();
        let mut state = State::AttemptStored;
        log::debug!("Startup provisioning, setup network {:?}", setup_name);

        loop {
            let next = match state {
                State::AttemptStored => self.attempt_stored(start, timeout),
                State::OpenPortal => {
                    session = CaptureSession::new();
                    self.open_portal(setup_name)
                }
                State::CaptureWait => self.capture_wait(&mut session, start, timeout),
                State::PersistAndRetry => self.persist_and_retry(&session),
                State::Connected => return Outcome::Connected,
                State::TimedOut => return Outcome::TimedOut,
            };

            if next != state {
                log::info!("Provisioning {:?} -> {:?}", state, next);
            }
            state = next;
        }
    }

    fn deadline_passed(&self, start: Duration, timeout: Option<Duration>) -> bool {
        match timeout {
            Some(timeout) => self.clock.now().saturating_sub(start) >= timeout,
            None => false,
        }
    }

    fn attempt_stored(&mut self, start: Duration, timeout: Option<Duration>) -> State {
        if self.radio.is_connected() {
            return State::Connected;
        }
        if self.deadline_passed(start, timeout) {
            log::info!("Exiting due to timeout");
            return State::TimedOut;
        }

        log::info!("WiFi is not connected");
        if let Some((name, password)) = self.credential.join_params() {
            log::info!("Connecting to {:?}", name);
            self.radio.begin(name, password);

            // 尝试次数用完不算错误，直接转入热点模式
            for _ in 0..self.config.join_attempts {
                if self.radio.is_connected() {
                    break;
                }
                self.clock.delay(self.config.join_poll_interval);
                self.watchdog.feed();
            }
        } else {
            log::info!("No credential configured");
        }

        if self.radio.is_connected() {
            State::Connected
        } else {
            State::OpenPortal
        }
    }

    fn open_portal(&mut self, setup_name: &str) -> State {
        log::info!("Creating setup network {:?}", setup_name);

        let config = &self.config;
        if !self
            .radio
            .configure(config.portal_ip, config.portal_gateway, config.portal_netmask)
        {
            log::warn!("Failed to configure setup network");
            return State::AttemptStored;
        }
        if !self.radio.start(setup_name) {
            log::warn!("Failed to start setup network");
            return State::AttemptStored;
        }
        log::debug!("Setup network address: {}", config.portal_ip);

        if !self.server.begin(config.portal_port) {
            log::warn!("Failed to start portal server");
            self.radio.stop();
            return State::AttemptStored;
        }
        log::debug!(
            "Portal open at http://{}:{}/",
            config.portal_ip,
            config.portal_port
        );

        State::CaptureWait
    }

    fn capture_wait(
        &mut self,
        session: &mut CaptureSession,
        start: Duration,
        timeout: Option<Duration>,
    ) -> State {
        if session.is_ready() {
            return State::PersistAndRetry;
        }

        // 有客户端连着热点时不理会截止时间
        let keep_waiting =
            !self.deadline_passed(start, timeout) || self.radio.station_count() > 0;
        if !keep_waiting {
            log::debug!("Exiting due to timeout");
            self.close_portal();
            return State::TimedOut;
        }

        self.server
            .handle_client(&mut |exchange: &mut dyn Exchange| session.handle(exchange));
        log::debug!("Waiting for credentials");
        self.clock.delay(self.config.portal_poll_interval);
        self.watchdog.feed();

        if session.is_ready() {
            State::PersistAndRetry
        } else {
            State::CaptureWait
        }
    }

    fn persist_and_retry(&mut self, session: &CaptureSession) -> State {
        if let Some(credential) = session.credential() {
            self.credential = credential;
            log::debug!(
                "Writing credential: {:?}, checksum: {}",
                credential,
                credential.checksum()
            );
            let write_success = self.store.save(&credential);
            log::info!(
                "Credential write {}",
                if write_success { "success" } else { "failed" }
            );
        }

        self.close_portal();
        self.radio.disconnect();
        State::AttemptStored
    }

    fn close_portal(&mut self) {
        self.server.stop();
        self.radio.stop();
    }
}
