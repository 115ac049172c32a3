use crate::domain::Actor;
use crate::ports::capability::{Action, CapabilityCheck, CapabilityError, Resource};
use async_trait::async_trait;

/// ロールに基づく権限判定
///
/// - 管理者・司書：すべての操作
/// - 会員：本人の貸出・返却・閲覧、カタログの閲覧のみ（返却期限の指定は不可）
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleCapabilities;

impl RoleCapabilities {
    pub fn new() -> Self {
        Self
    }

    /// 純粋関数：権限判定
    pub fn permits(actor: &Actor, action: Action, resource: &Resource) -> bool {
        if actor.role.is_staff() {
            return true;
        }
        match (action, resource) {
            (Action::Checkout, Resource::Member(member_id)) => actor.is_member(*member_id),
            (Action::ViewBorrowing, Resource::Member(member_id)) => actor.is_member(*member_id),
            (Action::ReturnBook | Action::ViewBorrowing, Resource::Borrowing { member_id, .. }) => {
                actor.is_member(*member_id)
            }
            (Action::ViewCatalog, Resource::Title(_)) => true,
            _ => false,
        }
    }
}

#[async_trait]
impl CapabilityCheck for RoleCapabilities {
    async fn can(
        &self,
        actor: &Actor,
        action: Action,
        resource: &Resource,
    ) -> Result<bool, CapabilityError> {
        Ok(Self::permits(actor, action, resource))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BorrowingId, MemberId, TitleId};

    fn borrowing_of(member_id: MemberId) -> Resource {
        Resource::Borrowing {
            borrowing_id: BorrowingId::new(),
            member_id,
        }
    }

    #[test]
    fn test_staff_may_do_everything() {
        let member_id = MemberId::new();
        for actor in [Actor::admin(), Actor::librarian()] {
            assert!(RoleCapabilities::permits(
                &actor,
                Action::ReturnBook,
                &borrowing_of(member_id)
            ));
            assert!(RoleCapabilities::permits(
                &actor,
                Action::ManageCatalog,
                &Resource::Title(TitleId::new())
            ));
            assert!(RoleCapabilities::permits(
                &actor,
                Action::CollectFine,
                &Resource::Library
            ));
        }
    }

    #[test]
    fn test_member_may_return_only_own_borrowing() {
        let member_id = MemberId::new();
        let actor = Actor::member(member_id);

        assert!(RoleCapabilities::permits(
            &actor,
            Action::ReturnBook,
            &borrowing_of(member_id)
        ));
        assert!(!RoleCapabilities::permits(
            &actor,
            Action::ReturnBook,
            &borrowing_of(MemberId::new())
        ));
    }

    #[test]
    fn test_member_may_checkout_only_for_self() {
        let member_id = MemberId::new();
        let actor = Actor::member(member_id);

        assert!(RoleCapabilities::permits(
            &actor,
            Action::Checkout,
            &Resource::Member(member_id)
        ));
        assert!(!RoleCapabilities::permits(
            &actor,
            Action::Checkout,
            &Resource::Member(MemberId::new())
        ));
        assert!(!RoleCapabilities::permits(
            &actor,
            Action::SetDueDate,
            &Resource::Member(member_id)
        ));
        assert!(RoleCapabilities::permits(
            &Actor::librarian(),
            Action::SetDueDate,
            &Resource::Member(member_id)
        ));
    }

    #[test]
    fn test_member_cannot_manage_catalog_or_fines() {
        let actor = Actor::member(MemberId::new());
        let title = Resource::Title(TitleId::new());

        assert!(RoleCapabilities::permits(&actor, Action::ViewCatalog, &title));
        assert!(!RoleCapabilities::permits(&actor, Action::ManageCatalog, &title));
        assert!(!RoleCapabilities::permits(&actor, Action::ListOverdue, &Resource::Library));
        assert!(!RoleCapabilities::permits(&actor, Action::CollectFine, &Resource::Library));
        assert!(!RoleCapabilities::permits(&actor, Action::ViewFines, &Resource::Library));
    }
}
