//! キャラクタデバイスのバックエンド接続
//!
//! シリアルデバイス (フロントエンド) とホスト側のバイトストリーム
//! (端末、ソケットなど) の間の契約を定義する。
//!
//! - デバイス → バックエンド: [`CharBackend::write_all`] (ブロッキング) と
//!   [`CharBackend::accept_input`] (入力再開の通知)
//! - バックエンド → デバイス: [`CharFrontend::can_receive`] と [`CharFrontend::receive`]

use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// デバイスから見たバックエンド
pub trait CharBackend: Send + Sync {
    /// バイト列をすべて書き込むまでブロックする
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    /// デバイスが再び入力を受け付けられるようになったことを通知する
    fn accept_input(&mut self) {}
}

/// バックエンドから見たデバイス
pub trait CharFrontend {
    /// 1 バイト受け取れる状態か
    fn can_receive(&self) -> bool;

    /// 1 バイト渡す。`can_receive` が false の間は呼んではいけない。
    fn receive(&mut self, byte: u8);
}

/// 保留中の入力を、フロントエンドが受け付ける限り 1 バイトずつ渡す
///
/// 渡したバイト数を返す。受け付けられなかった分は `pending` に残る。
pub fn pump(frontend: &mut dyn CharFrontend, pending: &mut VecDeque<u8>) -> usize {
    let mut delivered = 0;
    while frontend.can_receive() {
        let Some(byte) = pending.pop_front() else {
            break;
        };
        frontend.receive(byte);
        delivered += 1;
    }
    delivered
}

/// 出力をすべて捨てるバックエンド
#[derive(Debug, Default)]
pub struct NullBackend;

impl CharBackend for NullBackend {
    fn write_all(&mut self, _buf: &[u8]) -> io::Result<()> {
        Ok(())
    }
}

/// ホストの stdout に出力するバックエンド
#[derive(Debug, Default)]
pub struct StdoutBackend;

impl CharBackend for StdoutBackend {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(buf)?;
        out.flush()
    }
}

/// 共有メモリに出力を溜めるバックエンド
///
/// clone したハンドルから、デバイスに渡した後でも出力と
/// `accept_input` の通知回数を観測できる。
#[derive(Debug, Clone, Default)]
pub struct BufferBackend {
    output: Arc<Mutex<Vec<u8>>>,
    accept_count: Arc<AtomicUsize>,
}

impl BufferBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// これまでに書き込まれたバイト列
    pub fn output(&self) -> Vec<u8> {
        self.output.lock().map(|out| out.clone()).unwrap_or_default()
    }

    /// 書き込まれたバイト列を取り出して空にする
    pub fn take_output(&self) -> Vec<u8> {
        self.output
            .lock()
            .map(|mut out| std::mem::take(&mut *out))
            .unwrap_or_default()
    }

    /// `accept_input` が呼ばれた回数
    pub fn accept_count(&self) -> usize {
        self.accept_count.load(Ordering::SeqCst)
    }
}

impl CharBackend for BufferBackend {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let mut out = self
            .output
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "output buffer poisoned"))?;
        out.extend_from_slice(buf);
        Ok(())
    }

    fn accept_input(&mut self) {
        self.accept_count.fetch_add(1, Ordering::SeqCst);
    }
}
