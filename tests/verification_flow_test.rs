use std::sync::Arc;

use chatguard::config::{GuardConfig, RequiredGroupConfig};
use chatguard::model::{User, VerificationStatus};
use chatguard::platform::{ChatRef, InlineButton, MemberRole, MockPlatformClient};
use chatguard::repository::{GuardStore, MemoryGuardStore};
use chatguard::security::DenyKind;
use chatguard::service::{MemberEvent, RecheckOutcome, Requester};
use chatguard::ChatGuard;

const GROUP_A: i64 = -100;
const GROUP_B: i64 = -200;
const OWNER: i64 = 1;
const USER: i64 = 500;

fn config() -> GuardConfig {
    let mut config = GuardConfig::default();
    config.bot.owner_ids = vec![OWNER];
    config.required_groups = vec![
        RequiredGroupConfig {
            name: "Grup A".into(),
            chat_id: Some(GROUP_A),
            username: None,
            link: Some("https://t.me/+a".into()),
        },
        // 格式错误：既没有 chat_id 也没有 username，被跳过
        RequiredGroupConfig {
            name: "Rusak".into(),
            ..Default::default()
        },
        RequiredGroupConfig {
            name: "Grup B".into(),
            chat_id: Some(GROUP_B),
            username: Some("grupb".into()),
            link: Some("https://t.me/grupb".into()),
        },
    ];
    config
}

fn setup() -> (ChatGuard, Arc<MemoryGuardStore>, Arc<MockPlatformClient>) {
    let store = Arc::new(MemoryGuardStore::new());
    let platform = Arc::new(MockPlatformClient::new());
    let guard = ChatGuard::new(config(), store.clone(), platform.clone());
    (guard, store, platform)
}

fn requester() -> Requester {
    Requester {
        user_id: USER,
        username: Some("siti".into()),
        first_name: Some("Siti".into()),
    }
}

#[tokio::test]
async fn test_malformed_group_entry_skipped() {
    let (guard, _, _) = setup();
    assert_eq!(guard.required_groups().len(), 2);
    assert_eq!(guard.config().validate().len(), 1);
}

#[tokio::test]
async fn test_unverified_user_gets_prompt_with_buttons() {
    let (guard, store, platform) = setup();

    let decision = guard.on_private_message(&requester(), Some("/menu")).await;
    assert_eq!(decision.reason().map(|r| r.kind), Some(DenyKind::Unverified));

    let sent = platform.sent_to(USER);
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text.contains("Siti"));
    // 两个加入按钮 + 重新验证
    assert_eq!(sent[0].options.buttons.len(), 3);
    assert!(matches!(
        &sent[0].options.buttons[2][0],
        InlineButton::Callback { data, .. } if data == "verify_recheck"
    ));

    let record = store.get_verification(USER).await.unwrap().unwrap();
    assert_eq!(record.status(), VerificationStatus::NotVerified);
}

#[tokio::test]
async fn test_start_command_allowed_before_verification() {
    let (guard, _, platform) = setup();
    let decision = guard.on_private_message(&requester(), Some("/start")).await;
    assert!(decision.is_allowed());
    assert!(platform.sent_messages().is_empty());
}

#[tokio::test]
async fn test_partial_membership_is_not_verified() {
    let (guard, store, platform) = setup();
    platform.set_membership(ChatRef::Id(GROUP_A), USER, MemberRole::Member);
    platform.set_membership(ChatRef::Id(GROUP_B), USER, MemberRole::Restricted);

    let outcome = guard.recheck(&requester()).await;
    let RecheckOutcome::Incomplete { check } = outcome else {
        panic!("restricted member must not verify");
    };
    assert!(check.joined_group_1());
    assert!(!check.joined_group_2());

    let record = store.get_verification(USER).await.unwrap().unwrap();
    assert!(record.joined_group_1());
    assert!(!record.is_verified());

    let text = &platform.sent_to(USER)[0].text;
    assert!(text.contains("✅ Grup 1: Grup A"));
    assert!(text.contains("❌ Grup 2: Grup B"));

    let audit = store.audit_entries();
    assert_eq!(audit[0].action, "verification_check");
    assert_eq!(audit[0].details["result"], "failed");
}

#[tokio::test]
async fn test_full_lifecycle_verify_revoke_reverify() {
    let (guard, store, platform) = setup();
    store.upsert_user(&User::new(USER)).await.unwrap();
    platform.set_membership(ChatRef::Id(GROUP_A), USER, MemberRole::Member);
    platform.set_membership(ChatRef::Username("grupb".into()), USER, MemberRole::Owner);

    assert!(guard.ensure_verified(&requester()).await);
    assert!(guard
        .on_private_message(&requester(), Some("/menu"))
        .await
        .is_allowed());

    // 离开必须群组
    platform.remove_membership(&ChatRef::Id(GROUP_A), USER);
    guard
        .on_member_left(&MemberEvent {
            group_id: GROUP_A,
            user_id: USER,
            ..Default::default()
        })
        .await;
    assert_eq!(
        guard.verification().current_status(USER).await.unwrap(),
        VerificationStatus::NotVerified
    );
    assert_eq!(store.get_user(USER).await.unwrap().unwrap().daily_limit, 0);
    assert!(!guard.ensure_verified(&requester()).await);

    // 重新加入后恢复免费额度
    platform.set_membership(ChatRef::Id(GROUP_A), USER, MemberRole::Member);
    let outcome = guard.recheck(&requester()).await;
    assert!(matches!(
        outcome,
        RecheckOutcome::Verified {
            limit_restored: true,
            ..
        }
    ));
    assert_eq!(store.get_user(USER).await.unwrap().unwrap().daily_limit, 10);
    assert_eq!(
        guard.verification().current_status(USER).await.unwrap(),
        VerificationStatus::Verified
    );
}

#[tokio::test]
async fn test_membership_error_counts_as_not_joined() {
    let (guard, _, platform) = setup();
    platform.set_membership(ChatRef::Id(GROUP_A), USER, MemberRole::Member);
    platform.fail_membership_for(ChatRef::Id(GROUP_B));
    platform.fail_membership_for(ChatRef::Username("grupb".into()));

    assert!(!guard.ensure_verified(&requester()).await);
}

#[tokio::test]
async fn test_persistence_outage_denies_all_but_owner() {
    let (guard, store, platform) = setup();
    platform.set_membership(ChatRef::Id(GROUP_A), USER, MemberRole::Member);
    platform.set_membership(ChatRef::Id(GROUP_B), USER, MemberRole::Member);
    store.set_available(false);

    assert!(!guard.ensure_verified(&requester()).await);
    assert!(guard.ensure_verified(&Requester::new(OWNER)).await);
    assert_eq!(guard.recheck(&Requester::new(OWNER)).await, RecheckOutcome::Privileged);
}
