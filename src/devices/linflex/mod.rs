//! Freescale/NXP LINFlex UART エミュレーション
//!
//! LINFlex は LIN コントローラーだが、ここでは UART モードのレジスタ動作だけを実装する。
//! LIN プロトコル、DMA、タイムアウト関連のレジスタは値を保持するだけで動作は持たない。
//!
//! - BDRL (0x38) への書き込みは 1 バイトをバックエンドに同期的に送信する
//! - バックエンドからの受信は BDRM (0x3C) の 1 バイトスロットに入る
//! - UARTSR (0x14) は write-1-to-clear
//! - 割り込み線は LINIER と UARTSR から毎回計算し直すレベル出力

pub mod regs;

use self::regs::{
    lincr1, linier, linsr, uartcr, uartsr, Register, DATA_MASK, LINFLEX_MMIO_SIZE,
    LINFLEX_REGS_MAX,
};
use crate::device_state::{Resettable, RestoreError, SaveRestore};
use crate::devices::chardev::{CharBackend, CharFrontend};
use crate::devices::interrupt::LineInterrupt;
use crate::mmio::{IoError, MmioHandler};
use serde::{Deserialize, Serialize};
use std::error::Error;
use thiserror::Error;

/// GIC の SPI 番号から割り込みベクタへのオフセット
const SPI_BASE: u32 = 32;

/// GIC の SPI 番号の上限 (INTID 1019)
const SPI_MAX: u32 = 987;

/// デバイスの構成
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinflexConfig {
    /// トレース出力に使う名前
    pub debug_name: String,
    /// MMIO ウィンドウのベースアドレス (0x1000 境界)
    pub base: u64,
    /// 割り込み線の SPI 番号
    pub irq: u32,
}

impl Default for LinflexConfig {
    fn default() -> Self {
        Self {
            debug_name: "linflex0".to_string(),
            base: 0x401C_8000,
            irq: 82,
        }
    }
}

impl LinflexConfig {
    /// GIC 上の割り込みベクタ番号
    pub fn gic_vector(&self) -> Result<u32, ConfigurationError> {
        if self.irq > SPI_MAX {
            return Err(ConfigurationError::InvalidIrq(self.irq));
        }
        Ok(self.irq + SPI_BASE)
    }
}

/// [`Linflex::new`] のエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// ベースアドレスが MMIO ウィンドウの境界に揃っていない
    #[error("unaligned base address: 0x{0:x}")]
    UnalignedBaseAddress(u64),
    /// GIC の SPI として表せない割り込み番号
    #[error("invalid SPI number: {0}")]
    InvalidIrq(u32),
}

/// リセットシーケンス上の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetState {
    /// 作成直後 (レジスタはすべて 0)
    Uninitialized,
    /// enter 完了: リセット値が書き込まれた
    Defaulted,
    /// hold 完了: 送信完了フラグが立っている
    BootReady,
    /// exit 完了: 通常動作
    Operational,
}

impl ResetState {
    fn in_progress(self) -> bool {
        matches!(self, ResetState::Defaulted | ResetState::BootReady)
    }
}

/// 統計情報
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinflexStats {
    pub tx_bytes: u64,
    pub tx_dropped: u64,
    pub rx_bytes: u64,
    /// 受信スロットが埋まっている間に届いたバイト
    pub rx_overrun: u64,
    /// 未定義レジスタへのアクセス
    pub guest_errors: u64,
    /// 動作を実装していないレジスタへのアクセス
    pub unimplemented: u64,
}

/// スナップショットとして保存される状態
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedState {
    pub version: u32,
    pub regs: [u32; LINFLEX_REGS_MAX],
}

impl SavedState {
    pub const CURRENT_VERSION: u32 = 1;
    pub const MINIMUM_VERSION: u32 = 1;
}

/// 割り込みを出すべきか
///
/// 受信完了割り込みが有効で受信データがある、または送信完了割り込みが有効で
/// 送信完了フラグが立っている場合に true。
pub fn interrupt_asserted(regs: &[u32; LINFLEX_REGS_MAX]) -> bool {
    let enabled = regs[Register::LINIER.index()];
    let status = regs[Register::UARTSR.index()];
    (enabled & linier::DRIE != 0 && status & uartsr::DRFRFE != 0)
        || (enabled & linier::DTIE != 0 && status & uartsr::DTFTFF != 0)
}

/// LINFlex UART デバイス
pub struct Linflex {
    debug_name: String,
    base: u64,
    regs: [u32; LINFLEX_REGS_MAX],
    irq: LineInterrupt,
    chr: Box<dyn CharBackend>,
    reset_state: ResetState,
    stats: LinflexStats,
}

impl Linflex {
    /// 新しいデバイスを作成する
    ///
    /// レジスタはすべて 0 で作成される。リセット値を反映するには
    /// [`Resettable::reset`] を呼ぶ。
    pub fn new(
        config: &LinflexConfig,
        irq: LineInterrupt,
        chr: Box<dyn CharBackend>,
    ) -> Result<Self, ConfigurationError> {
        if config.base & (LINFLEX_MMIO_SIZE - 1) != 0 {
            return Err(ConfigurationError::UnalignedBaseAddress(config.base));
        }
        config.gic_vector()?;

        let mut this = Self {
            debug_name: config.debug_name.clone(),
            base: config.base,
            regs: [0; LINFLEX_REGS_MAX],
            irq,
            chr,
            reset_state: ResetState::Uninitialized,
            stats: LinflexStats::default(),
        };
        this.update_irq();
        Ok(this)
    }

    /// レジスタの生の値 (副作用なし)
    pub fn reg(&self, reg: Register) -> u32 {
        self.regs[reg.index()]
    }

    /// レジスタストア全体
    pub fn regs(&self) -> &[u32; LINFLEX_REGS_MAX] {
        &self.regs
    }

    pub fn irq_level(&self) -> bool {
        self.irq.is_high()
    }

    pub fn reset_state(&self) -> ResetState {
        self.reset_state
    }

    pub fn stats(&self) -> &LinflexStats {
        &self.stats
    }

    /// 割り込み線を現在のレジスタ状態に合わせる
    fn update_irq(&mut self) {
        self.irq.set_level(interrupt_asserted(&self.regs));
    }

    fn guest_error(&mut self, offset: u64, is_write: bool) {
        self.stats.guest_errors += 1;
        tracing::warn!(
            port = self.debug_name.as_str(),
            kind = "guest_error",
            offset,
            is_write,
            "access to invalid register"
        );
    }

    fn unimplemented(&mut self, reg: Register, is_write: bool) {
        self.stats.unimplemented += 1;
        tracing::debug!(
            port = self.debug_name.as_str(),
            kind = "unimp",
            register = ?reg,
            is_write,
            "register not implemented"
        );
    }

    fn read_register(&mut self, offset: u64) -> u32 {
        let Some(reg) = Register::from_offset(offset) else {
            self.guest_error(offset, false);
            return 0;
        };

        let i = reg.index();
        match reg {
            Register::LINCR1 => {
                self.regs[i] |= lincr1::RESERVED_HIGH;
                self.regs[i]
            }
            Register::BDRM => self.regs[i] & DATA_MASK,
            Register::BDRL => {
                tracing::debug!(
                    port = self.debug_name.as_str(),
                    "read of transmit-only register BDRL"
                );
                self.regs[i]
            }
            _ if reg.is_inert() => {
                self.unimplemented(reg, false);
                self.regs[i]
            }
            _ => self.regs[i],
        }
    }

    fn write_register(&mut self, offset: u64, value: u32) {
        tracing::trace!(port = self.debug_name.as_str(), offset, value, "linflex write");

        match Register::from_offset(offset) {
            Some(Register::LINCR1) => {
                self.regs[Register::LINCR1.index()] = value & lincr1::WRITE_MASK;
                if value & lincr1::INIT != 0 {
                    self.regs[Register::LINSR.index()] |= linsr::LINS_INIT;
                }
            }
            Some(Register::LINIER) => {
                self.regs[Register::LINIER.index()] = value & linier::WRITE_MASK;
            }
            Some(Register::UARTCR) => self.write_uartcr(value),
            Some(Register::UARTSR) => self.write_uartsr(value),
            Some(Register::BDRL) => self.transmit(value),
            Some(Register::BDRM) => self.unimplemented(Register::BDRM, true),
            Some(reg) => {
                self.regs[reg.index()] = value;
                self.unimplemented(reg, true);
            }
            None => self.guest_error(offset, true),
        }

        self.update_irq();
    }

    /// UARTCR: UART モードの切り替えは初期化モード中のみ
    ///
    /// 書き込みはビットを立てるだけで、UARTCR への書き込みでクリアされるビットはない。
    fn write_uartcr(&mut self, value: u32) {
        let current = self.reg(Register::UARTCR);
        let next = if self.reg(Register::LINCR1) & lincr1::INIT != 0 {
            let next = current | (value & uartcr::UART);
            if next & uartcr::UART != 0 {
                next | value
            } else {
                next
            }
        } else if current & uartcr::UART != 0 {
            current | (value & uartcr::RUNTIME_MASK)
        } else {
            tracing::debug!(
                port = self.debug_name.as_str(),
                value,
                "UARTCR write ignored outside init mode with UART mode disabled"
            );
            current
        };
        self.regs[Register::UARTCR.index()] = next;
    }

    /// UARTSR: 1 を書いたビットだけクリアされる
    fn write_uartsr(&mut self, value: u32) {
        let old = self.reg(Register::UARTSR);
        let new = old & !value;
        self.regs[Register::UARTSR.index()] = new;

        // 受信スロットが空いたのでバックエンドに次のバイトを要求する
        if (old & !new) & uartsr::RX_PENDING != 0 {
            self.chr.accept_input();
        }
    }

    fn transmit(&mut self, value: u32) {
        let byte = (value & DATA_MASK) as u8;
        self.regs[Register::BDRL.index()] = u32::from(byte);

        match self.chr.write_all(&[byte]) {
            Ok(()) => self.stats.tx_bytes += 1,
            Err(err) => {
                self.stats.tx_dropped += 1;
                tracing::error!(
                    port = self.debug_name.as_str(),
                    error = &err as &dyn Error,
                    "serial write failed, dropping data"
                );
            }
        }

        // 書き込みは同期的なので常に次の送信が可能
        self.regs[Register::UARTSR.index()] |= uartsr::DTFTFF;
    }

    /// 状態をバイト列 (JSON) に保存する
    pub fn save_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.save())
    }

    /// [`Linflex::save_bytes`] で保存したバイト列から復元する
    pub fn restore_bytes(&mut self, bytes: &[u8]) -> Result<(), RestoreError> {
        let state: SavedState = serde_json::from_slice(bytes)?;
        self.restore(state)
    }
}

impl MmioHandler for Linflex {
    fn base(&self) -> u64 {
        self.base
    }

    fn size(&self) -> u64 {
        LINFLEX_MMIO_SIZE
    }

    fn read(&mut self, offset: u64, size: usize) -> Result<u64, Box<dyn Error>> {
        check_access(offset, size)?;
        Ok(u64::from(self.read_register(offset)))
    }

    fn write(&mut self, offset: u64, value: u64, size: usize) -> Result<(), Box<dyn Error>> {
        check_access(offset, size)?;
        self.write_register(offset, value as u32);
        Ok(())
    }
}

fn check_access(offset: u64, size: usize) -> Result<(), IoError> {
    if !(1..=4).contains(&size) {
        return Err(IoError::InvalidAccessSize(size));
    }
    if offset >= LINFLEX_MMIO_SIZE {
        return Err(IoError::OutOfRange { offset });
    }
    Ok(())
}

impl CharFrontend for Linflex {
    fn can_receive(&self) -> bool {
        !self.reset_state.in_progress() && self.reg(Register::UARTSR) & uartsr::RX_PENDING == 0
    }

    fn receive(&mut self, byte: u8) {
        if !self.can_receive() {
            self.stats.rx_overrun += 1;
            tracing::debug!(
                port = self.debug_name.as_str(),
                byte,
                "byte delivered while receive slot is busy"
            );
        }

        self.regs[Register::BDRM.index()] = u32::from(byte);
        self.regs[Register::UARTSR.index()] |= uartsr::RX_PENDING;
        self.stats.rx_bytes += 1;
        self.update_irq();
    }
}

impl Resettable for Linflex {
    fn reset_enter(&mut self) {
        self.regs = [0; LINFLEX_REGS_MAX];
        for reg in Register::ALL {
            self.regs[reg.index()] = reg.reset_value();
        }
        self.reset_state = ResetState::Defaulted;
    }

    fn reset_hold(&mut self) {
        // ダイレクトカーネルブートではデバイスを初期化するファームウェアがいないため、
        // 送信可能な状態にしておく
        self.regs[Register::UARTSR.index()] |= uartsr::DTFTFF;
        self.reset_state = ResetState::BootReady;
    }

    fn reset_exit(&mut self) {
        self.reset_state = ResetState::Operational;
        self.update_irq();
        self.chr.accept_input();
    }
}

impl SaveRestore for Linflex {
    type SavedState = SavedState;

    fn save(&self) -> SavedState {
        SavedState {
            version: SavedState::CURRENT_VERSION,
            regs: self.regs,
        }
    }

    fn restore(&mut self, state: SavedState) -> Result<(), RestoreError> {
        if !(SavedState::MINIMUM_VERSION..=SavedState::CURRENT_VERSION).contains(&state.version) {
            return Err(RestoreError::UnsupportedVersion {
                version: state.version,
                minimum: SavedState::MINIMUM_VERSION,
                current: SavedState::CURRENT_VERSION,
            });
        }

        self.regs = state.regs;
        self.reset_state = ResetState::Operational;
        // リセット直後の LINIER は 0 なので、復元した設定で割り込みを出し直す
        self.update_irq();
        Ok(())
    }
}
