//! MMIO (Memory-Mapped I/O) handling infrastructure

use std::error::Error;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// バスレベルのアクセスエラー
///
/// デバイス固有の異常 (未定義レジスタなど) はデバイス側で処理し、
/// ここではアクセス自体が成立しない場合のみを扱う。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IoError {
    /// 許可されていないアクセス幅
    #[error("invalid access size: {0} bytes")]
    InvalidAccessSize(usize),
    /// デバイスのウィンドウ外へのアクセス
    #[error("offset 0x{offset:x} is outside the device window")]
    OutOfRange { offset: u64 },
    /// 既存のデバイスと重なるアドレス範囲
    #[error("region 0x{base:x}+0x{size:x} overlaps an existing device")]
    Overlap { base: u64, size: u64 },
}

/// MMIO デバイスハンドラの trait
pub trait MmioHandler: Send + Sync {
    /// デバイスのベースアドレスを返す
    fn base(&self) -> u64;

    /// デバイスのメモリマップサイズを返す
    fn size(&self) -> u64;

    /// デバイスからデータを読み取る
    ///
    /// # Arguments
    /// * `offset` - ベースアドレスからのオフセット
    /// * `size` - 読み取るサイズ (bytes)
    fn read(&mut self, offset: u64, size: usize) -> Result<u64, Box<dyn Error>>;

    /// デバイスにデータを書き込む
    ///
    /// # Arguments
    /// * `offset` - ベースアドレスからのオフセット
    /// * `value` - 書き込む値
    /// * `size` - 書き込むサイズ (bytes)
    fn write(&mut self, offset: u64, value: u64, size: usize) -> Result<(), Box<dyn Error>>;

    /// アドレスがこのデバイスのウィンドウ内ならオフセットを返す
    fn offset_of(&self, addr: u64) -> Option<u64> {
        let base = self.base();
        (addr >= base && addr - base < self.size()).then(|| addr - base)
    }
}

/// 共有デバイス
///
/// MMIO 以外の経路 (バックエンドからの受信など) でもデバイスに触れる必要がある場合、
/// `Arc<Mutex<_>>` に包んだまま登録できる。
impl<T: MmioHandler> MmioHandler for Arc<Mutex<T>> {
    fn base(&self) -> u64 {
        self.lock().unwrap_or_else(PoisonError::into_inner).base()
    }

    fn size(&self) -> u64 {
        self.lock().unwrap_or_else(PoisonError::into_inner).size()
    }

    fn read(&mut self, offset: u64, size: usize) -> Result<u64, Box<dyn Error>> {
        self.lock()
            .map_err(|_| "device lock poisoned")?
            .read(offset, size)
    }

    fn write(&mut self, offset: u64, value: u64, size: usize) -> Result<(), Box<dyn Error>> {
        self.lock()
            .map_err(|_| "device lock poisoned")?
            .write(offset, value, size)
    }
}

/// MMIO デバイスマネージャ
///
/// 絶対アドレスを登録済みデバイスのオフセットに変換して振り分ける。
#[derive(Default)]
pub struct MmioManager {
    handlers: Vec<Box<dyn MmioHandler>>,
}

impl MmioManager {
    /// 新しい MMIO マネージャを作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// MMIO デバイスハンドラを登録する
    ///
    /// 既存のデバイスとアドレス範囲が重なる場合はエラーを返す。
    pub fn register(&mut self, handler: Box<dyn MmioHandler>) -> Result<(), IoError> {
        let (base, size) = (handler.base(), handler.size());
        let overlaps = self
            .handlers
            .iter()
            .any(|h| base < h.base() + h.size() && h.base() < base + size);
        if overlaps {
            return Err(IoError::Overlap { base, size });
        }
        self.handlers.push(handler);
        Ok(())
    }

    /// 登録済みデバイス数
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// 指定されたアドレスからデータを読み取る
    ///
    /// どのデバイスにも属さないアドレスは 0 を返す。
    pub fn handle_read(&mut self, addr: u64, size: usize) -> Result<u64, Box<dyn Error>> {
        for handler in &mut self.handlers {
            if let Some(offset) = handler.offset_of(addr) {
                return handler.read(offset, size);
            }
        }

        tracing::warn!(size, "MMIO read from unhandled address: 0x{:x}", addr);
        Ok(0)
    }

    /// 指定されたアドレスにデータを書き込む
    ///
    /// どのデバイスにも属さないアドレスへの書き込みは破棄される。
    pub fn handle_write(
        &mut self,
        addr: u64,
        value: u64,
        size: usize,
    ) -> Result<(), Box<dyn Error>> {
        for handler in &mut self.handlers {
            if let Some(offset) = handler.offset_of(addr) {
                return handler.write(offset, value, size);
            }
        }

        tracing::warn!(
            size,
            "MMIO write to unhandled address: 0x{:x} = 0x{:x}",
            addr,
            value
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DummyDevice {
        base: u64,
        size: u64,
        data: u64,
    }

    impl DummyDevice {
        fn boxed(base: u64, size: u64) -> Box<Self> {
            Box::new(Self {
                base,
                size,
                data: 0,
            })
        }
    }

    impl MmioHandler for DummyDevice {
        fn base(&self) -> u64 {
            self.base
        }

        fn size(&self) -> u64 {
            self.size
        }

        fn read(&mut self, offset: u64, _size: usize) -> Result<u64, Box<dyn Error>> {
            Ok(self.data + offset)
        }

        fn write(&mut self, _offset: u64, value: u64, _size: usize) -> Result<(), Box<dyn Error>> {
            self.data = value;
            Ok(())
        }
    }

    #[test]
    fn register_でデバイスが登録される() {
        let mut manager = MmioManager::new();
        assert!(manager.is_empty());
        manager.register(DummyDevice::boxed(0x1000, 0x100)).unwrap();
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn 重なる範囲の登録はエラーになる() {
        let mut manager = MmioManager::new();
        manager.register(DummyDevice::boxed(0x1000, 0x100)).unwrap();

        let err = manager
            .register(DummyDevice::boxed(0x10f0, 0x100))
            .unwrap_err();
        assert_eq!(
            err,
            IoError::Overlap {
                base: 0x10f0,
                size: 0x100
            }
        );

        // 隣接する範囲は登録できる
        manager.register(DummyDevice::boxed(0x1100, 0x100)).unwrap();
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn 書き込みと読み取りがオフセットに変換される() {
        let mut manager = MmioManager::new();
        manager.register(DummyDevice::boxed(0x1000, 0x100)).unwrap();

        manager.handle_write(0x1000, 0x42, 4).unwrap();
        // DummyDevice は data + offset を返す
        assert_eq!(manager.handle_read(0x1000, 4).unwrap(), 0x42);
        assert_eq!(manager.handle_read(0x1008, 4).unwrap(), 0x4a);
    }

    #[test]
    fn 未登録アドレスは0を返し書き込みは無視される() {
        let mut manager = MmioManager::new();

        assert_eq!(manager.handle_read(0x9999, 4).unwrap(), 0);
        manager.handle_write(0x9999, 0x42, 4).unwrap();
    }

    #[test]
    fn 共有デバイスも登録できる() {
        let shared = Arc::new(Mutex::new(*DummyDevice::boxed(0x3000, 0x100)));
        let mut manager = MmioManager::new();
        manager.register(Box::new(shared.clone())).unwrap();

        manager.handle_write(0x3004, 0x7, 4).unwrap();
        assert_eq!(shared.lock().unwrap().data, 0x7);
    }

    #[test]
    fn offset_of_はウィンドウ境界を判定する() {
        let dev = DummyDevice::boxed(0x2000, 0x10);
        assert_eq!(dev.offset_of(0x2000), Some(0));
        assert_eq!(dev.offset_of(0x200f), Some(0xf));
        assert_eq!(dev.offset_of(0x2010), None);
        assert_eq!(dev.offset_of(0x1fff), None);
    }
}
