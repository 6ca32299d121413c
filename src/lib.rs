//! Freescale/NXP LINFlex UART のデバイスモデル
//!
//! エミュレータに組み込むペリフェラルとして、MMIO レジスタブロックと 1 本の
//! 割り込み線をゲストに見せ、送受信バイトを抽象的なキャラクタバックエンドにつなぐ。
//!
//! エミュレータ本体とは 3 つの capability trait で接続する。
//!
//! - [`mmio::MmioHandler`]: レジスタアクセス
//! - [`device_state::Resettable`]: enter / hold / exit のリセット
//! - [`device_state::SaveRestore`]: スナップショット
//!
//! ```
//! use linflex::device_state::Resettable;
//! use linflex::devices::chardev::{BufferBackend, CharFrontend};
//! use linflex::devices::interrupt::LineInterrupt;
//! use linflex::devices::linflex::{Linflex, LinflexConfig};
//! use linflex::mmio::MmioHandler;
//!
//! let output = BufferBackend::new();
//! let irq = LineInterrupt::detached();
//! let mut uart = Linflex::new(&LinflexConfig::default(), irq.clone(), Box::new(output.clone())).unwrap();
//! uart.reset();
//!
//! // BDRL に書き込むとバックエンドに出力される
//! uart.write(0x38, b'A' as u64, 4).unwrap();
//! assert_eq!(output.output(), b"A");
//! assert!(uart.can_receive());
//! ```

pub mod boot;
pub mod device_state;
pub mod devices;
pub mod mmio;
