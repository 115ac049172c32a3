use serde::{Deserialize, Serialize};

use super::{MemberId, MembershipStatus};

/// 貸出コンテキストから見た会員
///
/// 会員の作成・削除は会員管理コンテキストの責務。
/// ここではステータスと貸出中の冊数だけを扱う。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberAccount {
    pub member_id: MemberId,
    pub status: MembershipStatus,
    pub active_borrowings: u32,
}

impl MemberAccount {
    pub fn new(member_id: MemberId, status: MembershipStatus) -> Self {
        Self {
            member_id,
            status,
            active_borrowings: 0,
        }
    }

    /// 貸出が1件増えた状態
    pub fn with_borrowing_opened(&self) -> Self {
        Self {
            active_borrowings: self.active_borrowings + 1,
            ..self.clone()
        }
    }

    /// 貸出が1件減った状態。0件から減らそうとした場合は`None`
    pub fn with_borrowing_closed(&self) -> Option<Self> {
        let active_borrowings = self.active_borrowings.checked_sub(1)?;
        Some(Self {
            active_borrowings,
            ..self.clone()
        })
    }
}
