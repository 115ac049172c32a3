use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 貸出ID - Borrowing集約のID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BorrowingId(Uuid);

impl BorrowingId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for BorrowingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BorrowingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// タイトルID - カタログ上の書籍（物理的な1冊ではない）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TitleId(Uuid);

impl TitleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for TitleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TitleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// 会員ID - 会員管理コンテキストへの参照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId(Uuid);

impl MemberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for MemberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// 会員ステータス
///
/// 新規の貸出を開始できるのは`Active`の会員のみ。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Active,
    Suspended,
    Inactive,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Active => "active",
            MembershipStatus::Suspended => "suspended",
            MembershipStatus::Inactive => "inactive",
        }
    }

    pub fn can_borrow(&self) -> bool {
        matches!(self, MembershipStatus::Active)
    }
}

impl std::str::FromStr for MembershipStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(MembershipStatus::Active),
            "suspended" => Ok(MembershipStatus::Suspended),
            "inactive" => Ok(MembershipStatus::Inactive),
            _ => Err(format!("Invalid membership status: {}", s)),
        }
    }
}

/// 貸出ステータス
///
/// 永続化されるのは「返却済みかどうか」のみ。`Overdue`は
/// `now > due_at`かつ未返却のときに導出される。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorrowingStatus {
    /// 貸出中
    Active,
    /// 延滞中
    Overdue,
    /// 返却済み
    Returned,
}

impl BorrowingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowingStatus::Active => "active",
            BorrowingStatus::Overdue => "overdue",
            BorrowingStatus::Returned => "returned",
        }
    }
}

impl std::str::FromStr for BorrowingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(BorrowingStatus::Active),
            "overdue" => Ok(BorrowingStatus::Overdue),
            "returned" => Ok(BorrowingStatus::Returned),
            _ => Err(format!("Invalid borrowing status: {}", s)),
        }
    }
}

/// 利用者のロール
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Librarian,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Librarian => "librarian",
            Role::Member => "member",
        }
    }

    /// 職員（管理者または司書）か
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Librarian)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "librarian" => Ok(Role::Librarian),
            "member" => Ok(Role::Member),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// 操作を行う主体
///
/// 認証は外部で済んでいる前提。`Member`ロールのアクターのIDは
/// 会員IDと同一とみなす。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn member(member_id: MemberId) -> Self {
        Self::new(member_id.value(), Role::Member)
    }

    pub fn librarian() -> Self {
        Self::new(Uuid::new_v4(), Role::Librarian)
    }

    pub fn admin() -> Self {
        Self::new(Uuid::new_v4(), Role::Admin)
    }

    /// このアクターが指定された会員本人か
    pub fn is_member(&self, member_id: MemberId) -> bool {
        self.role == Role::Member && self.id == member_id.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_borrowing_id_creation() {
        let id1 = BorrowingId::new();
        let id2 = BorrowingId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_title_id_from_uuid() {
        let uuid = Uuid::new_v4();
        let id = TitleId::from_uuid(uuid);
        assert_eq!(id.value(), uuid);
    }

    #[test]
    fn test_membership_status_only_active_can_borrow() {
        assert!(MembershipStatus::Active.can_borrow());
        assert!(!MembershipStatus::Suspended.can_borrow());
        assert!(!MembershipStatus::Inactive.can_borrow());
    }

    #[test]
    fn test_membership_status_parse() {
        assert_eq!(
            MembershipStatus::from_str("suspended"),
            Ok(MembershipStatus::Suspended)
        );
        assert!(MembershipStatus::from_str("banned").is_err());
    }

    #[test]
    fn test_role_parse_is_case_insensitive() {
        assert_eq!(Role::from_str("LIBRARIAN"), Ok(Role::Librarian));
        assert_eq!(Role::from_str("admin"), Ok(Role::Admin));
        assert!(Role::from_str("guest").is_err());
    }

    #[test]
    fn test_actor_is_member_requires_member_role() {
        let member_id = MemberId::new();
        assert!(Actor::member(member_id).is_member(member_id));

        let staff = Actor::new(member_id.value(), Role::Librarian);
        assert!(!staff.is_member(member_id));
    }
}
