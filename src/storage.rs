//! 按字节寻址的持久化介质
//!
//! 与 Arduino EEPROM 模拟的约定一致：`begin` 之后按字节读写 RAM 影子，
//! `commit` 才真正落盘。

use embedded_storage::{ReadStorage, Storage};

/// 擦除后的 flash 读出来是全 0xFF
pub const ERASED: u8 = 0xFF;

pub trait Eeprom {
    /// 打开 `[0, size)` 这段地址
    fn begin(&mut self, size: usize);
    /// 越界读取返回 0
    fn read(&self, addr: usize) -> u8;
    /// 越界写入被忽略
    fn write(&mut self, addr: usize, value: u8);
    fn commit(&mut self) -> bool;
    /// 释放影子缓冲区，不会自动提交
    fn end(&mut self);
}

impl<T: Eeprom + ?Sized> Eeprom for &mut T {
    fn begin(&mut self, size: usize) {
        (**self).begin(size)
    }

    fn read(&self, addr: usize) -> u8 {
        (**self).read(addr)
    }

    fn write(&mut self, addr: usize, value: u8) {
        (**self).write(addr, value)
    }

    fn commit(&mut self) -> bool {
        (**self).commit()
    }

    fn end(&mut self) {
        (**self).end()
    }
}

/// 影子缓冲区，`FlashEeprom` 和设备上的 NVS 实现共用
#[derive(Debug, Default)]
pub struct Shadow {
    bytes: Vec<u8>,
    dirty: bool,
}

impl Shadow {
    pub fn load(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            dirty: false,
        }
    }

    pub fn read(&self, addr: usize) -> u8 {
        self.bytes.get(addr).copied().unwrap_or(0)
    }

    pub fn write(&mut self, addr: usize, value: u8) {
        if let Some(byte) = self.bytes.get_mut(addr) {
            if *byte != value {
                *byte = value;
                self.dirty = true;
            }
        } else {
            log::warn!("eeprom write out of range: {}", addr);
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// 建在 `embedded_storage::Storage` 之上的 EEPROM 模拟
///
/// `offset` 是该区域在 flash 中的起始位置。
pub struct FlashEeprom<S> {
    flash: S,
    offset: u32,
    shadow: Shadow,
}

impl<S> FlashEeprom<S>
where
    S: ReadStorage + Storage,
{
    pub fn new(flash: S, offset: u32) -> Self {
        Self {
            flash,
            offset,
            shadow: Shadow::default(),
        }
    }

    pub fn into_inner(self) -> S {
        self.flash
    }
}

impl<S> Eeprom for FlashEeprom<S>
where
    S: ReadStorage + Storage,
    S::Error: std::fmt::Debug,
{
    fn begin(&mut self, size: usize) {
        let mut bytes = vec![ERASED; size];
        if let Err(e) = self.flash.read(self.offset, &mut bytes) {
            log::error!("Failed to read eeprom region at {}: {:?}", self.offset, e);
            bytes.fill(ERASED);
        }
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
        match self.flash.write(self.offset, self.shadow.bytes()) {
            Ok(()) => {
                self.shadow.mark_clean();
                true
            }
            Err(e) => {
                log::error!("Failed to commit eeprom region at {}: {:?}", self.offset, e);
                false
            }
        }
    }

    fn end(&mut self) {
        self.shadow = Shadow::default();
    }
}

/// 纯内存介质，初始为擦除状态
#[derive(Debug, Clone)]
pub struct MemEeprom {
    cells: Vec<u8>,
    shadow: Option<Vec<u8>>,
}

impl MemEeprom {
    pub fn new(capacity: usize) -> Self {
        Self {
            cells: vec![ERASED; capacity],
            shadow: None,
        }
    }

    pub fn from_bytes(cells: Vec<u8>) -> Self {
        Self {
            cells,
            shadow: None,
        }
    }

    /// 已提交的内容
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [u8] {
        &mut self.cells
    }
}

impl Eeprom for MemEeprom {
    fn begin(&mut self, size: usize) {
        let size = size.min(self.cells.len());
        self.shadow = Some(self.cells[..size].to_vec());
    }

    fn read(&self, addr: usize) -> u8 {
        self.shadow
            .as_ref()
            .and_then(|s| s.get(addr).copied())
            .unwrap_or(0)
    }

    fn write(&mut self, addr: usize, value: u8) {
        if let Some(byte) = self.shadow.as_mut().and_then(|s| s.get_mut(addr)) {
            *byte = value;
        }
    }

    fn commit(&mut self) -> bool {
        match &self.shadow {
            Some(shadow) => {
                self.cells[..shadow.len()].copy_from_slice(shadow);
                true
            }
            None => false,
        }
    }

    fn end(&mut self) {
        self.shadow = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 简单的 flash 模拟，可以让写入失败
    struct RamFlash {
        data: Vec<u8>,
        fail_writes: bool,
    }

    #[derive(Debug)]
    struct RamFlashError;

    impl ReadStorage for RamFlash {
        type Error = RamFlashError;

        fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
            let start = offset as usize;
            let src = self
                .data
                .get(start..start + bytes.len())
                .ok_or(RamFlashError)?;
            bytes.copy_from_slice(src);
            Ok(())
        }

        fn capacity(&self) -> usize {
            self.data.len()
        }
    }

    impl Storage for RamFlash {
        fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
            if self.fail_writes {
                return Err(RamFlashError);
            }
            let start = offset as usize;
            self.data
                .get_mut(start..start + bytes.len())
                .ok_or(RamFlashError)?
                .copy_from_slice(bytes);
            Ok(())
        }
    }

    #[test]
    fn test_flash_eeprom_commit_writes_at_offset() {
        let flash = RamFlash {
            data: vec![ERASED; 64],
            fail_writes: false,
        };
        let mut eeprom = FlashEeprom::new(flash, 16);
        eeprom.begin(8);
        assert_eq!(eeprom.read(0), ERASED);
        eeprom.write(0, 0x12);
        eeprom.write(7, 0x34);
        assert!(eeprom.commit());
        eeprom.end();

        let flash = eeprom.into_inner();
        assert_eq!(flash.data[16], 0x12);
        assert_eq!(flash.data[23], 0x34);
        assert_eq!(flash.data[15], ERASED);
    }

    #[test]
    fn test_flash_eeprom_reports_write_failure() {
        let flash = RamFlash {
            data: vec![ERASED; 32],
            fail_writes: true,
        };
        let mut eeprom = FlashEeprom::new(flash, 0);
        eeprom.begin(4);
        eeprom.write(1, 0);
        assert!(!eeprom.commit());
    }

    #[test]
    fn test_flash_eeprom_out_of_range() {
        let flash = RamFlash {
            data: vec![0x55; 8],
            fail_writes: false,
        };
        let mut eeprom = FlashEeprom::new(flash, 0);
        assert_eq!(eeprom.read(0), 0);
        eeprom.begin(4);
        assert_eq!(eeprom.read(3), 0x55);
        assert_eq!(eeprom.read(4), 0);
        eeprom.write(4, 1);
        assert!(eeprom.commit());
    }

    #[test]
    fn test_mem_eeprom_end_discards_uncommitted() {
        let mut eeprom = MemEeprom::new(4);
        eeprom.begin(4);
        eeprom.write(0, 7);
        eeprom.end();
        assert_eq!(eeprom.cells()[0], ERASED);

        eeprom.begin(4);
        eeprom.write(0, 7);
        assert!(eeprom.commit());
        eeprom.end();
        assert_eq!(eeprom.cells()[0], 7);
    }
}
