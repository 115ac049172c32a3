use crate::domain::LendingPolicy;

/// 貸出ポリシーの供給元ポート
///
/// ポリシーは読み取り専用。呼び出しごとに最新の値を返してよいが、
/// 1回の操作の中では最初に取得した値を使い続ける。
pub trait PolicySource: Send + Sync {
    fn current(&self) -> LendingPolicy;
}
