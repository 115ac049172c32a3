use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 貸出ポリシー
///
/// 貸出期間・延滞料金の日額・上限・会員ごとの同時貸出数。
/// 値は実行時設定として外部から与えられる。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LendingPolicy {
    pub loan_period_days: i64,
    pub daily_rate: Decimal,
    pub max_fine: Decimal,
    pub max_active_borrowings: u32,
}

impl LendingPolicy {
    pub fn loan_duration(&self) -> Duration {
        Duration::days(self.loan_period_days)
    }
}

impl Default for LendingPolicy {
    fn default() -> Self {
        Self {
            loan_period_days: 14,
            daily_rate: Decimal::new(50, 2),
            max_fine: Decimal::new(1000, 2),
            max_active_borrowings: 5,
        }
    }
}
