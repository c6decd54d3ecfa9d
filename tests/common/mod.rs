#![allow(dead_code)]

use std::cell::Cell;
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::time::Duration;

use easyap::captive_portal::{Exchange, PendingExchange, PortalServer, Response};
use easyap::credential::{fletcher16, NAME_LEN, PAYLOAD_LEN, RECORD_LEN};
use easyap::network::{AccessPoint, Clock, Station, Watchdog};
use easyap::storage::{Eeprom, MemEeprom};
use easyap::{Credential, CredentialStore, Provisioner};

pub const ADDR: usize = 16;

pub fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 只有 `delay` 会推进的时钟
#[derive(Clone, Default)]
pub struct SimClock {
    now: Rc<Cell<Duration>>,
}

impl SimClock {
    pub fn elapsed(&self) -> Duration {
        self.now.get()
    }
}

impl Clock for SimClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn delay(&mut self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }
}

/// 周围只有一个真实网络，凭据正确时在 `join_delay` 之后连上
pub struct FakeRadio {
    clock: SimClock,
    network: (String, String),
    join_delay: Duration,
    joining: Option<(String, String, Duration)>,
    pub begins: Vec<(String, String)>,
    pub configures: Vec<(Ipv4Addr, Ipv4Addr, Ipv4Addr)>,
    pub configure_failures: usize,
    pub starts: Vec<String>,
    pub stops: usize,
    pub disconnects: usize,
    pub ap_running: bool,
    /// 客户端在这个时间点之前一直连着热点
    pub client_until: Option<Duration>,
}

impl FakeRadio {
    pub fn new(clock: &SimClock, name: &str, password: &str) -> Self {
        Self {
            clock: clock.clone(),
            network: (name.to_string(), password.to_string()),
            join_delay: Duration::from_secs(1),
            joining: None,
            begins: Vec::new(),
            configures: Vec::new(),
            configure_failures: 0,
            starts: Vec::new(),
            stops: 0,
            disconnects: 0,
            ap_running: false,
            client_until: None,
        }
    }
}

impl Station for FakeRadio {
    fn begin(&mut self, name: &str, password: &str) {
        self.begins.push((name.to_string(), password.to_string()));
        self.joining = Some((name.to_string(), password.to_string(), self.clock.now()));
    }

    fn is_connected(&mut self) -> bool {
        match &self.joining {
            Some((name, password, since)) => {
                (name, password) == (&self.network.0, &self.network.1)
                    && self.clock.now() >= *since + self.join_delay
            }
            None => false,
        }
    }

    fn disconnect(&mut self) {
        self.disconnects += 1;
        self.joining = None;
    }
}

impl AccessPoint for FakeRadio {
    fn configure(&mut self, local_ip: Ipv4Addr, gateway: Ipv4Addr, netmask: Ipv4Addr) -> bool {
        self.configures.push((local_ip, gateway, netmask));
        if self.configure_failures > 0 {
            self.configure_failures -= 1;
            return false;
        }
        true
    }

    fn start(&mut self, name: &str) -> bool {
        self.starts.push(name.to_string());
        self.ap_running = true;
        true
    }

    fn stop(&mut self) {
        self.stops += 1;
        self.ap_running = false;
    }

    fn station_count(&mut self) -> usize {
        match self.client_until {
            Some(until) if self.ap_running && self.clock.now() < until => 1,
            _ => 0,
        }
    }
}

/// 按时间点投递请求的服务器
pub struct FakeServer {
    clock: SimClock,
    queue: VecDeque<(Duration, String)>,
    pub running: bool,
    pub ports: Vec<u16>,
    pub served: Vec<(String, Option<Response>)>,
}

impl FakeServer {
    pub fn new(clock: &SimClock) -> Self {
        Self {
            clock: clock.clone(),
            queue: VecDeque::new(),
            running: false,
            ports: Vec::new(),
            served: Vec::new(),
        }
    }

    pub fn request_at(mut self, secs: u64, uri: &str) -> Self {
        self.queue
            .push_back((Duration::from_secs(secs), uri.to_string()));
        self
    }
}

impl PortalServer for FakeServer {
    fn begin(&mut self, port: u16) -> bool {
        self.ports.push(port);
        self.running = true;
        true
    }

    fn handle_client(&mut self, handler: &mut dyn FnMut(&mut dyn Exchange)) {
        if !self.running {
            return;
        }
        let due = matches!(self.queue.front(), Some((at, _)) if *at <= self.clock.now());
        if !due {
            return;
        }
        if let Some((_, uri)) = self.queue.pop_front() {
            let mut exchange = PendingExchange::from_uri(&uri);
            handler(&mut exchange);
            self.served.push((uri, exchange.take_response()));
        }
    }

    fn stop(&mut self) {
        self.running = false;
    }
}

#[derive(Default)]
pub struct CountingWatchdog {
    pub feeds: usize,
}

impl Watchdog for CountingWatchdog {
    fn feed(&mut self) {
        self.feeds += 1;
    }
}

/// 提交永远失败的介质
pub struct ReadOnlyEeprom(pub MemEeprom);

impl Eeprom for ReadOnlyEeprom {
    fn begin(&mut self, size: usize) {
        self.0.begin(size)
    }

    fn read(&self, addr: usize) -> u8 {
        self.0.read(addr)
    }

    fn write(&mut self, addr: usize, value: u8) {
        self.0.write(addr, value)
    }

    fn commit(&mut self) -> bool {
        false
    }

    fn end(&mut self) {
        self.0.end()
    }
}

pub fn blank_medium() -> MemEeprom {
    MemEeprom::new(256)
}

pub fn medium_with(name: &str, password: &str) -> MemEeprom {
    let mut store = CredentialStore::new(MemEeprom::new(256), ADDR);
    assert!(store.save(&Credential::new(name, password).unwrap()));
    store.into_inner()
}

/// 直接写入原始字段字节，并配上正确的校验和
pub fn medium_with_raw(name: &[u8], password: &[u8]) -> MemEeprom {
    let mut payload = [0u8; PAYLOAD_LEN];
    payload[..name.len()].copy_from_slice(name);
    payload[NAME_LEN..NAME_LEN + password.len()].copy_from_slice(password);

    let mut medium = MemEeprom::new(256);
    let cells = medium.cells_mut();
    cells[ADDR..ADDR + PAYLOAD_LEN].copy_from_slice(&payload);
    cells[ADDR + PAYLOAD_LEN..ADDR + RECORD_LEN]
        .copy_from_slice(&fletcher16(&payload).to_le_bytes());
    medium
}

pub type TestProvisioner<E> = Provisioner<E, FakeRadio, FakeServer, CountingWatchdog, SimClock>;

pub fn provisioner<E: Eeprom>(
    eeprom: E,
    radio: FakeRadio,
    server: FakeServer,
    clock: &SimClock,
) -> TestProvisioner<E> {
    init_log();
    Provisioner::new(
        CredentialStore::new(eeprom, ADDR),
        radio,
        server,
        CountingWatchdog::default(),
        clock.clone(),
    )
}
