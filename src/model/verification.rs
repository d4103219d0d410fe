//! 入群验证记录
//!
//! 不变量：`status == Verified ⟺ joined_group_1 && joined_group_2`。
//! 两个布尔字段私有，只能通过 `set_membership` / `revoke` 写入，每次写入都重新计算状态。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{from_millis, UserId};

/// 验证状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    #[default]
    NotVerified,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Verified => "verified",
            VerificationStatus::NotVerified => "not_verified",
        }
    }

    fn from_membership(joined_group_1: bool, joined_group_2: bool) -> Self {
        if joined_group_1 && joined_group_2 {
            VerificationStatus::Verified
        } else {
            VerificationStatus::NotVerified
        }
    }
}

/// 验证记录（对应 cg_user_verification 表）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRecord {
    user_id: UserId,
    joined_group_1: bool,
    joined_group_2: bool,
    status: VerificationStatus,
    last_verified: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl VerificationRecord {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            joined_group_1: false,
            joined_group_2: false,
            status: VerificationStatus::NotVerified,
            last_verified: None,
            updated_at: Utc::now(),
        }
    }

    /// 写入最新的成员检查结果
    pub fn set_membership(&mut self, joined_group_1: bool, joined_group_2: bool, now: DateTime<Utc>) {
        self.joined_group_1 = joined_group_1;
        self.joined_group_2 = joined_group_2;
        self.status = VerificationStatus::from_membership(joined_group_1, joined_group_2);
        self.last_verified = Some(now);
        self.updated_at = now;
    }

    /// 撤销：两个成员标记清零
    pub fn revoke(&mut self, now: DateTime<Utc>) {
        self.joined_group_1 = false;
        self.joined_group_2 = false;
        self.status = VerificationStatus::NotVerified;
        self.updated_at = now;
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn joined_group_1(&self) -> bool {
        self.joined_group_1
    }

    pub fn joined_group_2(&self) -> bool {
        self.joined_group_2
    }

    pub fn status(&self) -> VerificationStatus {
        self.status
    }

    pub fn is_verified(&self) -> bool {
        self.status == VerificationStatus::Verified
    }

    pub fn last_verified(&self) -> Option<DateTime<Utc>> {
        self.last_verified
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// 从数据库行创建
    ///
    /// 存储中的 status 列不参与构造，状态始终由两个布尔字段推导。
    pub fn from_db_row(
        user_id: i64,
        joined_group_1: bool,
        joined_group_2: bool,
        last_verified: Option<i64>,
        updated_at: i64,
    ) -> Self {
        Self {
            user_id,
            joined_group_1,
            joined_group_2,
            status: VerificationStatus::from_membership(joined_group_1, joined_group_2),
            last_verified: last_verified.map(from_millis),
            updated_at: from_millis(updated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_follows_membership() {
        let now = Utc::now();
        let mut record = VerificationRecord::new(7);
        assert_eq!(record.status(), VerificationStatus::NotVerified);

        for (g1, g2) in [(false, false), (true, false), (false, true), (true, true)] {
            record.set_membership(g1, g2, now);
            assert_eq!(record.is_verified(), g1 && g2);
        }
        assert!(record.last_verified().is_some());
    }

    #[test]
    fn test_revoke_clears_both_flags() {
        let now = Utc::now();
        let mut record = VerificationRecord::new(7);
        record.set_membership(true, true, now);
        assert!(record.is_verified());

        record.revoke(now);
        assert!(!record.joined_group_1());
        assert!(!record.joined_group_2());
        assert_eq!(record.status(), VerificationStatus::NotVerified);
    }

    #[test]
    fn test_db_row_recomputes_status() {
        let record = VerificationRecord::from_db_row(7, true, false, None, 0);
        assert_eq!(record.status(), VerificationStatus::NotVerified);

        let record = VerificationRecord::from_db_row(7, true, true, Some(0), 0);
        assert!(record.is_verified());
    }
}
