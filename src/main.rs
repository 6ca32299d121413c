//! LINFlex UART デバイスモデルのデモ
//!
//! ゲストの UART ドライバがするのと同じ順序で MMIO 経由でデバイスを初期化し、
//! 文字列を送信して、バックエンドからの入力をエコーバックする。
//!
//! 実行方法:
//! ```sh
//! cargo run
//! cargo run -- linflex.json        # LinflexConfig を JSON で指定
//! LINFLEX_LOG=linflex=trace cargo run
//! ```

use linflex::device_state::{Resettable, SaveRestore};
use linflex::devices::chardev::{self, StdoutBackend};
use linflex::devices::interrupt::LineInterrupt;
use linflex::devices::linflex::regs::{lincr1, linier, uartcr, uartsr};
use linflex::devices::linflex::{Linflex, LinflexConfig};
use linflex::mmio::MmioManager;
use std::collections::VecDeque;
use std::error::Error;
use std::sync::{Arc, Mutex};

const LINCR1: u64 = 0x00;
const LINIER: u64 = 0x04;
const UARTCR: u64 = 0x10;
const UARTSR: u64 = 0x14;
const BDRL: u64 = 0x38;
const BDRM: u64 = 0x3C;

/// UARTCR のワード長 (8-bit)
const UARTCR_WL0: u64 = 1 << 1;

fn enable_tracing() -> Result<(), Box<dyn Error>> {
    let filter = match std::env::var("LINFLEX_LOG") {
        Ok(filter) => tracing_subscriber::EnvFilter::try_new(filter)?,
        Err(_) => tracing_subscriber::EnvFilter::new("info"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| e as Box<dyn Error>)?;
    Ok(())
}

fn load_config() -> Result<LinflexConfig, Box<dyn Error>> {
    match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&text)?)
        }
        None => Ok(LinflexConfig::default()),
    }
}

/// 送信完了を待ってから 1 バイト送信する
fn put_char(bus: &mut MmioManager, base: u64, byte: u8) -> Result<(), Box<dyn Error>> {
    while bus.handle_read(base + UARTSR, 4)? & uartsr::DTFTFF as u64 == 0 {}
    bus.handle_write(base + UARTSR, uartsr::DTFTFF as u64, 4)?;
    bus.handle_write(base + BDRL, byte as u64, 1)
}

fn main() -> Result<(), Box<dyn Error>> {
    enable_tracing()?;
    let config = load_config()?;
    let base = config.base;

    println!("=== LINFlex UART Demo ===\n");

    println!("[1] デバイスを作成中...");
    let irq = LineInterrupt::detached();
    let uart = Arc::new(Mutex::new(Linflex::new(
        &config,
        irq.clone(),
        Box::new(StdoutBackend),
    )?));
    let mut bus = MmioManager::new();
    bus.register(Box::new(uart.clone()))?;
    println!("    ✓ {} @ 0x{:x} (SPI {})", config.debug_name, base, config.irq);

    println!("[2] リセット (enter / hold / exit)...");
    uart.lock().map_err(|_| "device lock poisoned")?.reset();

    println!("[3] ゲストドライバの初期化シーケンス...");
    bus.handle_write(base + LINCR1, lincr1::INIT as u64, 4)?;
    bus.handle_write(base + UARTCR, uartcr::UART as u64 | UARTCR_WL0, 4)?;
    bus.handle_write(base + LINIER, (linier::DRIE | linier::DTIE) as u64, 4)?;
    bus.handle_write(base + LINCR1, 0, 4)?;
    println!(
        "    ✓ UARTCR = 0x{:x}, IRQ = {}",
        bus.handle_read(base + UARTCR, 4)?,
        irq.is_high()
    );

    println!("[4] 送信...\n---");
    for &byte in b"Hello from LINFlex\n" {
        put_char(&mut bus, base, byte)?;
    }
    println!("---");

    println!("[5] 受信したバイトをエコーバック...\n---");
    let mut pending: VecDeque<u8> = b"ping\n".iter().copied().collect();
    loop {
        let delivered = {
            let mut dev = uart.lock().map_err(|_| "device lock poisoned")?;
            chardev::pump(&mut *dev, &mut pending)
        };

        let status = bus.handle_read(base + UARTSR, 4)?;
        if status & uartsr::DRFRFE as u64 == 0 {
            if delivered == 0 && pending.is_empty() {
                break;
            }
            continue;
        }

        let byte = bus.handle_read(base + BDRM, 4)? as u8;
        bus.handle_write(base + UARTSR, uartsr::RX_PENDING as u64, 4)?;
        put_char(&mut bus, base, byte)?;
    }
    println!("---");

    let dev = uart.lock().map_err(|_| "device lock poisoned")?;
    println!("[6] 結果");
    println!("  - IRQ: {}", dev.irq_level());
    println!("  - Stats: {:?}", dev.stats());
    println!(
        "  - Snapshot (v{}): {}",
        dev.save().version,
        String::from_utf8_lossy(&dev.save_bytes()?)
    );

    println!("\n=== デモ完了 ===");
    Ok(())
}
