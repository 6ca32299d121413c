//! レベルトリガー割り込み線
//!
//! デバイスは自分の出力線のレベルを設定するだけで、配信先 (GIC など) は
//! [`IrqTarget`] として外から渡される。

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 割り込み線の接続先 (割り込みコントローラー側)
pub trait IrqTarget: Send + Sync {
    /// `vector` のレベルを `high` に設定する
    ///
    /// 同じレベルで何度呼ばれても結果は変わらないこと。
    fn set_irq(&self, vector: u32, high: bool);
}

/// デバイスが駆動する 1 本の割り込み線
///
/// clone したハンドルは同じ線を指す。テストやデモでは接続先なし
/// ([`LineInterrupt::detached`]) で作成し、[`LineInterrupt::is_high`] でレベルを観測する。
#[derive(Clone)]
pub struct LineInterrupt {
    vector: u32,
    level: Arc<AtomicBool>,
    target: Option<Arc<dyn IrqTarget>>,
}

impl LineInterrupt {
    /// 割り込みコントローラーに接続された線を作成
    pub fn new(vector: u32, target: Arc<dyn IrqTarget>) -> Self {
        Self {
            vector,
            level: Arc::new(AtomicBool::new(false)),
            target: Some(target),
        }
    }

    /// どこにも接続されていない線を作成
    pub fn detached() -> Self {
        Self {
            vector: 0,
            level: Arc::new(AtomicBool::new(false)),
            target: None,
        }
    }

    /// 線のレベルを設定する
    ///
    /// エッジ検出はしない。毎回接続先にレベルを伝える。
    pub fn set_level(&self, high: bool) {
        self.level.store(high, Ordering::SeqCst);
        if let Some(target) = &self.target {
            target.set_irq(self.vector, high);
        }
    }

    /// 現在のレベル
    pub fn is_high(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }

    pub fn vector(&self) -> u32 {
        self.vector
    }
}

impl fmt::Debug for LineInterrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineInterrupt")
            .field("vector", &self.vector)
            .field("level", &self.is_high())
            .field("connected", &self.target.is_some())
            .finish()
    }
}
