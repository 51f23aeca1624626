//! IdGenerator port - ID 生成の抽象化
//!
//! テスト容易性のために trait にしています（決定的な ID を差し込める）。

use crate::domain::JobId;

/// IdGenerator は呼び出し側が ID を指定しなかったときに使う
///
/// # Thread Safety
/// - `Send + Sync` を要求（リクエストごとのタスクから共有される）
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> JobId;
}

/// 128-bit 乱数を 16 進で表した ID（衝突確率は無視できる）
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn generate(&self) -> JobId {
        JobId::from_random(rand::random::<u128>())
    }
}
