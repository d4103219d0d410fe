// 业务服务层模块
pub mod access_service;
pub mod audit_service;
pub mod moderation_service;
pub mod notice;
pub mod revocation_service;
pub mod verification_service;

pub use access_service::AccessService;
pub use audit_service::AuditLogger;
pub use moderation_service::{
    GroupMessage, GroupModerator, LeaveOutcome, MemberEvent, ModerationAction, ModerationOutcome,
    SkipReason,
};
pub use revocation_service::{RevocationCascade, RevocationReason, RevocationReport, StepStatus};
pub use verification_service::{
    GroupMembership, MembershipCheck, RecheckOutcome, Requester, VerificationService,
};
