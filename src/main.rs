#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    use std::time::Duration;

    use easyap::{
        captive_portal::EspPortalServer,
        esp::{EspRadio, NvsEeprom, TaskWatchdog},
        network::{StdClock, Watchdog},
        CredentialStore, Outcome, Provisioner,
    };
    use esp_idf_svc::eventloop::EspSystemEventLoop;

    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    let peripherals = esp_idf_svc::hal::prelude::Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let partition = esp_idf_svc::nvs::EspDefaultNvsPartition::take()?;
    let nvs = esp_idf_svc::nvs::EspDefaultNvs::new(partition.clone(), "easyap", true)?;

    static SETUP_NAME: Option<&str> = std::option_env!("EASYAP_SETUP_NAME");
    static TIMEOUT_SECS: Option<&str> = std::option_env!("EASYAP_TIMEOUT_SECS");
    static CONFIG_ADDR: Option<&str> = std::option_env!("EASYAP_CONFIG_ADDR");

    let timeout = TIMEOUT_SECS
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs);
    let config_addr = CONFIG_ADDR
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(0);

    let radio = EspRadio::new(peripherals.modem, sysloop, Some(partition))?;
    let setup_name = match SETUP_NAME {
        Some(name) => name.to_string(),
        None => format!("EasyAP-{}", radio.mac_suffix()?),
    };
    log::info!("Setup network: {:?}, timeout: {:?}", setup_name, timeout);

    let store = CredentialStore::new(NvsEeprom::new(nvs, "eeprom"), config_addr);
    let mut provisioner = Provisioner::new(
        store,
        radio,
        EspPortalServer::new(),
        TaskWatchdog::subscribe(),
        StdClock::new(),
    );

    match provisioner.connect(&setup_name, timeout) {
        Outcome::Connected => {
            log::info!("WiFi connected, IP: {:?}", provisioner.radio().sta_ip());
            loop {
                provisioner.watchdog_mut().feed();
                std::thread::sleep(Duration::from_secs(1));
            }
        }
        Outcome::TimedOut => {
            log::error!("Provisioning timed out, restarting");
            unsafe { esp_idf_svc::sys::esp_restart() }
        }
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() -> anyhow::Result<()> {
    anyhow::bail!("easyap firmware only runs on ESP-IDF targets")
}
