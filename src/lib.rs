pub mod cli;
pub mod config;
pub mod error;
pub mod guard;
pub mod logging;
pub mod model;
pub mod platform;
pub mod repository;
pub mod security; // 安全模块
pub mod service;

pub use config::GuardConfig;
pub use error::{GuardError, Result};
pub use guard::ChatGuard;
pub use platform::{ChatPlatformClient, MockPlatformClient};
pub use repository::{GuardStore, MemoryGuardStore, PgGuardStore};
pub use security::{Decision, DenyKind, SecurityGate};
pub use service::{GroupModerator, RevocationCascade, VerificationService};
