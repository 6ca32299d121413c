//! Direct kernel boot support
//!
//! ファームウェアなしでカーネルを起動するときに、LINFlex をコンソールとして
//! 見せるためのデバイスツリーを生成する。

pub mod device_tree;
