//! ESP-IDF 上的协作者实现

use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::modem::Modem,
    ipv4::{self, Mask, Subnet},
    netif::{EspNetif, NetifConfiguration},
    nvs::{EspDefaultNvs, EspDefaultNvsPartition},
    sys::{esp, esp_task_wdt_add, esp_task_wdt_delete, esp_task_wdt_reset},
    wifi::{AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi},
};
use std::net::Ipv4Addr;

use crate::network::{AccessPoint, Station, Watchdog};
use crate::storage::{Eeprom, Shadow, ERASED};

/// 用一个 NVS blob 模拟 EEPROM
pub struct NvsEeprom {
    nvs: EspDefaultNvs,
    key: &'static str,
    shadow: Shadow,
}

impl NvsEeprom {
    pub fn new(nvs: EspDefaultNvs, key: &'static str) -> Self {
        Self {
            nvs,
            key,
            shadow: Shadow::default(),
        }
    }
}

impl Eeprom for NvsEeprom {
    fn begin(&mut self, size: usize) {
        // blob 比请求的范围大时保留全部内容，提交时才不会截断
        let stored_len = self
            .nvs
            .blob_len(self.key)
            .map_err(|e| log::error!("Failed to get eeprom blob length: {:?}", e))
            .ok()
            .flatten()
            .unwrap_or(0);

        let mut bytes = vec![ERASED; size.max(stored_len)];
        let loaded = match self.nvs.get_blob(self.key, &mut bytes) {
            Ok(Some(data)) => data.len(),
            Ok(None) => 0,
            Err(e) => {
                log::error!("Failed to read eeprom blob: {:?}", e);
                0
            }
        };
        bytes[loaded..].fill(ERASED);
        self.shadow = Shadow::load(bytes);
    }

    fn read(&self, addr: usize) -> u8 {
        self.shadow.read(addr)
    }

    fn write(&mut self, addr: usize, value: u8) {
        self.shadow.write(addr, value)
    }

    fn commit(&mut self) -> bool {
        if self.shadow.is_empty() {
            return false;
        }
        if !self.shadow.is_dirty() {
            return true;
        }
        match self.nvs.set_blob(self.key, self.shadow.bytes()) {
            Ok(()) => {
                self.shadow.mark_clean();
                true
            }
            Err(e) => {
                log::error!("Failed to commit eeprom blob: {:?}", e);
                false
            }
        }
    }

    fn end(&mut self) {
        self.shadow = Shadow::default();
    }
}

/// 同一个 `EspWifi` 同时承担 STA 和临时热点
pub struct EspRadio {
    wifi: EspWifi<'static>,
    client: Option<ClientConfiguration>,
}

impl EspRadio {
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
    ) -> anyhow::Result<Self> {
        let wifi = EspWifi::new(modem, sysloop, nvs)?;
        Ok(Self { wifi, client: None })
    }

    /// STA MAC 的后 3 字节，用作热点名称后缀
    pub fn mac_suffix(&self) -> anyhow::Result<String> {
        let mac = self.wifi.sta_netif().get_mac()?;
        Ok(format!("{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5]))
    }

    pub fn sta_ip(&self) -> anyhow::Result<Ipv4Addr> {
        Ok(self.wifi.sta_netif().get_ip_info()?.ip)
    }

    fn apply(&mut self, configuration: &Configuration) -> anyhow::Result<()> {
        self.wifi.set_configuration(configuration)?;
        if !self.wifi.is_started()? {
            self.wifi.start()?;
        }
        Ok(())
    }
}

impl Station for EspRadio {
    fn begin(&mut self, name: &str, password: &str) {
        let (Ok(ssid), Ok(pass)) = (name.try_into(), password.try_into()) else {
            log::warn!("Credential does not fit the driver configuration");
            return;
        };
        let client = ClientConfiguration {
            ssid,
            password: pass,
            auth_method: if password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        };

        let result = self
            .apply(&Configuration::Client(client.clone()))
            .and_then(|_| self.wifi.connect().map_err(Into::into));
        match result {
            Ok(()) => self.client = Some(client),
            Err(e) => log::error!("Failed to begin join: {:?}", e),
        }
    }

    fn is_connected(&mut self) -> bool {
        self.wifi.is_connected().unwrap_or(false) && self.wifi.sta_netif().is_up().unwrap_or(false)
    }

    fn disconnect(&mut self) {
        if let Err(e) = self.wifi.disconnect() {
            log::debug!("Disconnect: {:?}", e);
        }
    }
}

impl AccessPoint for EspRadio {
    fn configure(&mut self, local_ip: Ipv4Addr, gateway: Ipv4Addr, netmask: Ipv4Addr) -> bool {
        let ap_netif_config = NetifConfiguration {
            ip_configuration: Some(ipv4::Configuration::Router(ipv4::RouterConfiguration {
                subnet: Subnet {
                    gateway,
                    mask: Mask(u32::from(netmask).count_ones() as u8),
                },
                dhcp_enabled: true,
                dns: Some(local_ip),
                secondary_dns: None,
            })),
            ..NetifConfiguration::wifi_default_router()
        };

        let result = EspNetif::new_with_conf(&ap_netif_config)
            .and_then(|netif| self.wifi.swap_netif_ap(netif));
        match result {
            Ok(_) => true,
            Err(e) => {
                log::warn!("Failed to configure AP netif: {:?}", e);
                false
            }
        }
    }

    fn start(&mut self, name: &str) -> bool {
        let Ok(ssid) = name.try_into() else {
            log::warn!("Setup network name {:?} is too long", name);
            return false;
        };
        let ap = AccessPointConfiguration {
            ssid,
            ssid_hidden: false,
            channel: 1,
            auth_method: AuthMethod::None,
            max_connections: 4,
            ..Default::default()
        };

        // 保留 STA 配置，热点开着的时候驱动仍可在后台连接
        let configuration = match self.client.clone() {
            Some(client) => Configuration::Mixed(client, ap),
            None => Configuration::AccessPoint(ap),
        };
        match self.apply(&configuration) {
            Ok(()) => {
                log::info!("SoftAP started: {}", name);
                true
            }
            Err(e) => {
                log::warn!("Failed to start SoftAP: {:?}", e);
                false
            }
        }
    }

    fn stop(&mut self) {
        if let Err(e) = self.wifi.stop() {
            log::warn!("Failed to stop wifi: {:?}", e);
        }
    }

    fn station_count(&mut self) -> usize {
        let mut list = esp_idf_svc::sys::wifi_sta_list_t::default();
        match esp!(unsafe { esp_idf_svc::sys::esp_wifi_ap_get_sta_list(&mut list) }) {
            Ok(()) => list.num.max(0) as usize,
            Err(_) => 0,
        }
    }
}

/// 任务看门狗；订阅失败时退化为空操作
pub struct TaskWatchdog {
    subscribed: bool,
}

impl TaskWatchdog {
    pub fn subscribe() -> Self {
        let subscribed = match esp!(unsafe { esp_task_wdt_add(std::ptr::null_mut()) }) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Task watchdog unavailable: {:?}", e);
                false
            }
        };
        Self { subscribed }
    }
}

impl Watchdog for TaskWatchdog {
    fn feed(&mut self) {
        if self.subscribed {
            unsafe {
                esp_task_wdt_reset();
            }
        }
    }
}

impl Drop for TaskWatchdog {
    fn drop(&mut self) {
        if self.subscribed {
            unsafe {
                esp_task_wdt_delete(std::ptr::null_mut());
            }
        }
    }
}
