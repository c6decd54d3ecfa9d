//! 带校验和的凭据存储
//!
//! 整条记录一次写入、立即读回校验；任何损坏、未初始化或尚未配置的情况
//! 在 `load` 看来都是一样的：`None`。

use crate::credential::{Credential, RECORD_LEN};
use crate::storage::Eeprom;

pub struct CredentialStore<E> {
    eeprom: E,
    address: usize,
}

impl<E: Eeprom> CredentialStore<E> {
    pub fn new(eeprom: E, address: usize) -> Self {
        Self { eeprom, address }
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn eeprom(&self) -> &E {
        &self.eeprom
    }

    pub fn eeprom_mut(&mut self) -> &mut E {
        &mut self.eeprom
    }

    pub fn into_inner(self) -> E {
        self.eeprom
    }

    fn read_record(&mut self) -> [u8; RECORD_LEN] {
        let mut record = [0u8; RECORD_LEN];
        self.eeprom.begin(self.address + RECORD_LEN);
        for (i, byte) in record.iter_mut().enumerate() {
            *byte = self.eeprom.read(self.address + i);
        }
        self.eeprom.end();
        record
    }

    pub fn load(&mut self) -> Option<Credential> {
        let record = self.read_record();
        let credential = Credential::from_record(&record);
        if credential.is_none() {
            log::info!("No valid credential at address {}", self.address);
        }
        credential
    }

    /// 写入并读回比对。返回 `false` 时调用方只能把凭据当作仅存于内存。
    pub fn save(&mut self, credential: &Credential) -> bool {
        let record = credential.to_record();

        self.eeprom.begin(self.address + RECORD_LEN);
        for (i, &byte) in record.iter().enumerate() {
            self.eeprom.write(self.address + i, byte);
        }
        let committed = self.eeprom.commit();
        self.eeprom.end();

        if !committed {
            log::warn!("Eeprom commit failed");
        }

        let readback = self.read_record();
        let verified = readback == record;
        if !verified {
            log::warn!("Credential read-back mismatch at address {}", self.address);
        }

        committed && verified
    }
}
