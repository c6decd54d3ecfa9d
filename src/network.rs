//! 无线与运行环境的协作接口
//!
//! 状态机只通过这些 trait 访问硬件；设备上的实现见 `esp` 模块。

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// STA 模式：加入已有网络
pub trait Station {
    /// 发起连接，不等待结果
    fn begin(&mut self, name: &str, password: &str);
    fn is_connected(&mut self) -> bool;
    fn disconnect(&mut self);
}

/// 临时的开放热点
pub trait AccessPoint {
    fn configure(&mut self, local_ip: Ipv4Addr, gateway: Ipv4Addr, netmask: Ipv4Addr) -> bool;
    fn start(&mut self, name: &str) -> bool;
    fn stop(&mut self);
    /// 当前连接到热点的客户端数量
    fn station_count(&mut self) -> usize;
}

pub trait Watchdog {
    fn feed(&mut self);
}

/// 单调时钟。`now` 返回自某个固定起点以来的时长。
pub trait Clock {
    fn now(&self) -> Duration;
    fn delay(&mut self, duration: Duration);
}

pub struct StdClock {
    origin: Instant,
}

impl StdClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn delay(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
