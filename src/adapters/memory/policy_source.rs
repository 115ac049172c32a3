use crate::domain::LendingPolicy;
use crate::ports::policy_source::PolicySource;
use std::sync::RwLock;

/// 単一の貸出規定を保持するPolicySource
///
/// 実行中に差し替えられる。`current`は呼び出し時点の写しを返す。
#[derive(Debug)]
pub struct FixedPolicySource {
    policy: RwLock<LendingPolicy>,
}

impl FixedPolicySource {
    pub fn new(policy: LendingPolicy) -> Self {
        Self {
            policy: RwLock::new(policy),
        }
    }

    /// 以降の操作に適用される規定を差し替える
    pub fn replace(&self, policy: LendingPolicy) {
        match self.policy.write() {
            Ok(mut current) => *current = policy,
            Err(poisoned) => *poisoned.into_inner() = policy,
        }
    }
}

impl Default for FixedPolicySource {
    fn default() -> Self {
        Self::new(LendingPolicy::default())
    }
}

impl PolicySource for FixedPolicySource {
    fn current(&self) -> LendingPolicy {
        match self.policy.read() {
            Ok(policy) => policy.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
