//! LINFlex レジスタ定義
//!
//! レジスタはすべて 32-bit 幅で 4-byte 境界に連続して並んでいる。
//! レジスタ ID はオフセット / 4。

/// レジスタ数
pub const LINFLEX_REGS_MAX: usize = 21;

/// MMIO ウィンドウのサイズ
///
/// デバイスツリー上は 0x3000 とされることがあるが、実際のレジスタ空間は 0x1000 に収まる。
pub const LINFLEX_MMIO_SIZE: u64 = 0x1000;

/// レジスタ ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(clippy::upper_case_acronyms)]
pub enum Register {
    /// LIN Control Register 1
    LINCR1 = 0,
    /// LIN Interrupt Enable Register
    LINIER,
    /// LIN Status Register
    LINSR,
    /// LIN Error Status Register
    LINESR,
    /// UART Mode Control Register
    UARTCR,
    /// UART Mode Status Register
    UARTSR,
    /// LIN Timeout Control Status Register
    LINTCSR,
    /// LIN Output Compare Register
    LINOCR,
    /// LIN Timeout Control Register
    LINTOCR,
    /// LIN Fractional Baud Rate Register
    LINFBRR,
    /// LIN Integer Baud Rate Register
    LINIBRR,
    /// LIN Checksum Field Register
    LINCFR,
    /// LIN Control Register 2
    LINCR2,
    /// Buffer Identifier Register
    BIDR,
    /// Buffer Data Register LSB (送信)
    BDRL,
    /// Buffer Data Register MSB (受信)
    BDRM,
    /// Global Control Register
    GCR,
    /// UART Preset Timeout Register
    UARTPTO,
    /// UART Current Timeout Register
    UARTCTO,
    /// DMA Tx Enable Register
    DMATXE,
    /// DMA Rx Enable Register
    DMARXE,
}

impl Register {
    /// ID 順の全レジスタ
    pub const ALL: [Register; LINFLEX_REGS_MAX] = [
        Register::LINCR1,
        Register::LINIER,
        Register::LINSR,
        Register::LINESR,
        Register::UARTCR,
        Register::UARTSR,
        Register::LINTCSR,
        Register::LINOCR,
        Register::LINTOCR,
        Register::LINFBRR,
        Register::LINIBRR,
        Register::LINCFR,
        Register::LINCR2,
        Register::BIDR,
        Register::BDRL,
        Register::BDRM,
        Register::GCR,
        Register::UARTPTO,
        Register::UARTCTO,
        Register::DMATXE,
        Register::DMARXE,
    ];

    /// オフセットからレジスタを求める
    ///
    /// 未定義の ID なら `None`。
    pub fn from_offset(offset: u64) -> Option<Self> {
        usize::try_from(offset >> 2)
            .ok()
            .and_then(|id| Self::ALL.get(id).copied())
    }

    /// レジスタストア上のインデックス
    pub const fn index(self) -> usize {
        self as usize
    }

    /// レジスタのオフセット
    pub const fn offset(self) -> u64 {
        (self as u64) << 2
    }

    /// 値は保持するが動作は実装していないレジスタ
    pub const fn is_inert(self) -> bool {
        !matches!(
            self,
            Register::LINCR1
                | Register::LINIER
                | Register::UARTCR
                | Register::UARTSR
                | Register::BDRL
                | Register::BDRM
        )
    }

    /// パワーオンリセット値
    pub const fn reset_value(self) -> u32 {
        match self {
            Register::LINCR1 => lincr1::RESERVED_HIGH | lincr1::INIT,
            Register::LINSR => linsr::LINS_INIT,
            Register::LINTCSR => 0x0000_0200,
            Register::LINOCR => 0x0000_FFFF,
            Register::LINTOCR => 0x0000_0E2C,
            Register::LINCR2 => 0x0000_6000,
            Register::UARTPTO => 0x0000_0FFF,
            _ => 0,
        }
    }
}

/// LINCR1 のビット
pub mod lincr1 {
    /// 初期化モード要求
    pub const INIT: u32 = 1 << 1;
    /// 予約ビット (読み出し時は常に 1)
    pub const RESERVED_HIGH: u32 = 1 << 7;
    /// 書き込み可能なビット
    pub const WRITE_MASK: u32 = 0x0001_DF27;
}

/// LINIER のビット
pub mod linier {
    /// Data Transmitted Interrupt Enable
    pub const DTIE: u32 = 1 << 1;
    /// Data Reception Complete Interrupt Enable
    pub const DRIE: u32 = 1 << 2;
    /// 書き込み可能なビット
    pub const WRITE_MASK: u32 = 0x0000_FFFF;
}

/// LINSR のビット
pub mod linsr {
    /// LIN 状態 = 初期化モード
    pub const LINS_INIT: u32 = 1 << 6;
}

/// UARTCR のビット
pub mod uartcr {
    /// UART モード有効
    pub const UART: u32 = 1 << 0;
    /// 初期化モード外でも UART モード中なら書き込めるフィールド
    pub const RUNTIME_MASK: u32 = 0x0070_FC30;
}

/// UARTSR のビット (write-1-to-clear)
pub mod uartsr {
    /// Data Transmission Completed
    pub const DTFTFF: u32 = 1 << 1;
    /// Data Reception Completed
    pub const DRFRFE: u32 = 1 << 2;
    /// Release Message Buffer (受信バッファにデータあり)
    pub const RMB: u32 = 1 << 9;
    /// 受信スロットが埋まっていることを示すビット
    pub const RX_PENDING: u32 = DRFRFE | RMB;
}

/// BDRL/BDRM のデータビット
pub const DATA_MASK: u32 = 0xFF;
