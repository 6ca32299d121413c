//! デバイスのリセットとスナップショットの capability trait
//!
//! バス側のアクセス ([`MmioHandler`](crate::mmio::MmioHandler)) と並んで、
//! エミュレータ本体がデバイスに要求する残り 2 つのインターフェース。

use thiserror::Error;

/// 3 フェーズのリセット
///
/// エミュレータ本体はすべてのデバイスに対して enter → hold → exit の順に呼び出す。
/// enter ではデバイス内部の状態だけを初期化し、外部 (割り込み線やバックエンド)
/// への通知は exit まで行わない。
pub trait Resettable {
    /// 内部状態をリセット値に戻す
    fn reset_enter(&mut self);

    /// 全デバイスの enter 完了後に呼ばれる
    fn reset_hold(&mut self);

    /// 出力 (割り込み線など) を新しい状態に同期させる
    fn reset_exit(&mut self);

    /// 3 フェーズをまとめて実行する
    fn reset(&mut self) {
        self.reset_enter();
        self.reset_hold();
        self.reset_exit();
    }
}

/// スナップショットの復元エラー
#[derive(Debug, Error)]
pub enum RestoreError {
    /// 対応していないバージョンのスナップショット
    #[error("unsupported saved state version {version} (supported {minimum}..={current})")]
    UnsupportedVersion {
        version: u32,
        minimum: u32,
        current: u32,
    },
    /// バイト列をデコードできない
    #[error("failed to decode saved state")]
    Decode(#[from] serde_json::Error),
}

/// スナップショットの保存と復元
pub trait SaveRestore {
    /// 保存される状態
    type SavedState;

    /// 現在の状態を保存する
    fn save(&self) -> Self::SavedState;

    /// 保存された状態を復元する
    ///
    /// エラーの場合、デバイスの状態は変更されない。
    fn restore(&mut self, state: Self::SavedState) -> Result<(), RestoreError>;
}
