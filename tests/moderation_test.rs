use std::sync::Arc;
use std::time::{Duration, Instant};

use chatguard::config::{GuardConfig, RequiredGroupConfig};
use chatguard::model::{AccessTier, GrantStatus, GroupSettings, User, UserRole};
use chatguard::platform::{ChatRef, MemberRole, MockPlatformClient};
use chatguard::repository::{GuardStore, MemoryGuardStore};
use chatguard::service::{
    GroupMessage, LeaveOutcome, MemberEvent, ModerationAction, ModerationOutcome, SkipReason,
    StepStatus,
};
use chatguard::ChatGuard;

const GROUP: i64 = -1001;
const REQUIRED: i64 = -2002;
const OWNER: i64 = 1;

struct Harness {
    guard: ChatGuard,
    store: Arc<MemoryGuardStore>,
    platform: Arc<MockPlatformClient>,
}

async fn harness(settings: GroupSettings) -> Harness {
    let mut config = GuardConfig::default();
    config.bot.owner_ids = vec![OWNER];
    config.required_groups = vec![RequiredGroupConfig {
        name: "Grup Resmi".into(),
        chat_id: Some(REQUIRED),
        username: Some("grupresmi".into()),
        link: Some("https://t.me/grupresmi".into()),
    }];

    let store = Arc::new(MemoryGuardStore::new());
    store.save_group_settings(&settings).await.unwrap();
    let platform = Arc::new(MockPlatformClient::new());
    platform.set_bot_role(GROUP, MemberRole::Administrator);

    let guard = ChatGuard::new(config, store.clone(), platform.clone());
    Harness {
        guard,
        store,
        platform,
    }
}

fn all_rules() -> GroupSettings {
    let mut settings = GroupSettings::new(GROUP);
    settings.anti_link = true;
    settings.anti_spam = true;
    settings.anti_virtex = true;
    settings.banned_words = vec!["judi".into()];
    settings.link_whitelist = vec!["youtube.com".into()];
    settings
}

fn message(id: i64, text: &str) -> GroupMessage {
    GroupMessage {
        group_id: GROUP,
        group_title: Some("Komunitas".into()),
        message_id: id,
        sender_id: 42,
        sender_name: Some("Budi".into()),
        sender_username: Some("budi".into()),
        text: text.into(),
    }
}

#[tokio::test]
async fn test_link_rule_wins_over_banned_word() {
    let h = harness(all_rules()).await;

    let outcome = h
        .guard
        .on_group_message(&message(1, "main judi di https://evil.com"))
        .await;
    assert!(matches!(
        outcome,
        ModerationOutcome::Actioned(ModerationAction::LinkRemoved { .. })
    ));

    assert_eq!(h.platform.deleted_messages(), vec![(GROUP, 1)]);
    assert_eq!(h.platform.sent_to(GROUP).len(), 1);
    let audit = h.store.audit_entries();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, "anti_link_triggered");
    assert_eq!(audit[0].group_id, Some(GROUP));
}

#[tokio::test]
async fn test_whitelisted_message_falls_through_to_banned_word() {
    let h = harness(all_rules()).await;

    let outcome = h
        .guard
        .on_group_message(&message(2, "judi? cek youtube.com https://evil.com"))
        .await;
    assert_eq!(
        outcome,
        ModerationOutcome::Actioned(ModerationAction::BannedWordRemoved {
            word: "judi".into()
        })
    );
}

#[tokio::test]
async fn test_spam_warns_once_per_window() {
    let h = harness(all_rules()).await;
    let start = Instant::now();
    let moderator = h.guard.moderator();

    for i in 0..5 {
        let at = start + Duration::from_secs(i);
        let outcome = moderator.on_message_at(&message(i as i64, "halo"), false, at).await;
        assert_eq!(outcome, ModerationOutcome::Clean);
    }

    let sixth = moderator
        .on_message_at(&message(6, "halo"), false, start + Duration::from_secs(6))
        .await;
    assert_eq!(
        sixth,
        ModerationOutcome::Actioned(ModerationAction::SpamRemoved {
            warned: true,
            count: 6
        })
    );

    for i in 7..10 {
        let outcome = moderator
            .on_message_at(&message(i, "halo"), false, start + Duration::from_secs(7))
            .await;
        assert!(matches!(
            outcome,
            ModerationOutcome::Actioned(ModerationAction::SpamRemoved { warned: false, .. })
        ));
    }

    assert_eq!(h.platform.deleted_messages().len(), 4);
    assert_eq!(h.platform.sent_to(GROUP).len(), 1);

    // 窗口结束后重新计数
    let fresh = moderator
        .on_message_at(&message(20, "halo"), false, start + Duration::from_secs(11))
        .await;
    assert_eq!(fresh, ModerationOutcome::Clean);
}

#[tokio::test]
async fn test_maintenance_prunes_group_spam_windows() {
    let h = harness(all_rules()).await;
    let now = Instant::now();

    for sender in 1000..1100 {
        let mut msg = message(sender, "halo");
        msg.sender_id = sender;
        h.guard.moderator().on_message_at(&msg, false, now).await;
    }
    assert_eq!(h.guard.moderator().spam_tracker().active_trackers(), 100);

    h.guard.unban_user(1000);
    assert_eq!(h.guard.moderator().spam_tracker().active_trackers(), 99);

    h.guard.cleanup_expired_at(now + Duration::from_secs(3600));
    assert_eq!(h.guard.moderator().spam_tracker().active_trackers(), 0);
}

#[tokio::test]
async fn test_unban_resets_group_spam_count() {
    let h = harness(all_rules()).await;
    let start = Instant::now();
    let moderator = h.guard.moderator();

    for i in 0..6 {
        moderator.on_message_at(&message(i, "halo"), false, start).await;
    }
    h.guard.ban_user(42);
    h.guard.unban_user(42);
    assert!(!h.guard.gate().is_banned(42));

    let outcome = moderator
        .on_message_at(&message(7, "halo"), false, start + Duration::from_secs(1))
        .await;
    assert_eq!(outcome, ModerationOutcome::Clean);
}

#[tokio::test]
async fn test_join_without_welcome_is_ignored() {
    let h = harness(GroupSettings::new(GROUP)).await;
    let event = MemberEvent {
        group_id: GROUP,
        user_id: 42,
        first_name: Some("Budi".into()),
        ..Default::default()
    };
    assert!(!h.guard.on_member_joined(&event).await);
    assert!(h.store.get_member(GROUP, 42).await.unwrap().is_none());
    assert!(h.store.audit_entries().is_empty());
}

#[tokio::test]
async fn test_no_action_without_admin_rights() {
    let h = harness(all_rules()).await;
    h.platform.set_bot_role(GROUP, MemberRole::Member);

    let outcome = h.guard.on_group_message(&message(3, "https://evil.com")).await;
    assert_eq!(outcome, ModerationOutcome::Skipped(SkipReason::BotNotAdmin));
    assert!(h.platform.deleted_messages().is_empty());

    h.platform.fail_membership_for(ChatRef::Id(GROUP));
    let outcome = h.guard.on_group_message(&message(4, "https://evil.com")).await;
    assert!(!outcome.handled());
}

#[tokio::test]
async fn test_owner_messages_untouched() {
    let h = harness(all_rules()).await;
    let mut msg = message(5, "https://evil.com");
    msg.sender_id = OWNER;

    let outcome = h.guard.on_group_message(&msg).await;
    assert_eq!(outcome, ModerationOutcome::Skipped(SkipReason::PrivilegedSender));
}

#[tokio::test]
async fn test_failed_delete_still_warns_and_audits() {
    let h = harness(all_rules()).await;
    h.platform.set_fail_deletes(true);

    let outcome = h.guard.on_group_message(&message(6, "www.spam.biz")).await;
    assert!(outcome.handled());
    assert!(h.platform.deleted_messages().is_empty());
    assert_eq!(h.platform.sent_to(GROUP).len(), 1);
    assert_eq!(h.store.audit_entries().len(), 1);
}

#[tokio::test]
async fn test_welcome_renders_template() {
    let mut settings = GroupSettings::new(GROUP);
    settings.auto_welcome = true;
    settings.welcome_message = "Halo {name}, selamat datang di {group}!".into();
    let h = harness(settings).await;

    let event = MemberEvent {
        group_id: GROUP,
        group_title: Some("Komunitas".into()),
        user_id: 42,
        first_name: Some("Budi".into()),
        ..Default::default()
    };
    assert!(h.guard.on_member_joined(&event).await);

    let sent = h.platform.sent_to(GROUP);
    assert!(sent[0].text.contains("Halo Budi, selamat datang di Komunitas!"));
    let member = h.store.get_member(GROUP, 42).await.unwrap().unwrap();
    assert!(member.is_active);
    assert_eq!(h.store.audit_entries()[0].action, "member_joined");
}

#[tokio::test]
async fn test_leaving_required_group_revokes_access() {
    let h = harness(GroupSettings::new(REQUIRED)).await;

    let mut user = User::new(42);
    user.role = UserRole::Vvip;
    user.daily_limit = 100;
    h.store.upsert_user(&user).await.unwrap();
    h.guard.access().grant_vvip(42, 30).await.unwrap();

    let event = MemberEvent {
        group_id: REQUIRED,
        user_id: 42,
        ..Default::default()
    };
    let LeaveOutcome::Revoked(report) = h.guard.on_member_left(&event).await else {
        panic!("leaving a required group must revoke");
    };
    assert_eq!(report.vvip, StepStatus::Applied);
    assert_eq!(report.notification, StepStatus::Applied);

    let user = h.store.get_user(42).await.unwrap().unwrap();
    assert_eq!(user.role, UserRole::Reguler);
    assert_eq!(user.daily_limit, 0);
    let grant = h.store.get_grant(42, AccessTier::Vvip).await.unwrap().unwrap();
    assert_eq!(grant.status, GrantStatus::Revoked);

    let actions: Vec<_> = h.store.audit_entries().into_iter().map(|e| e.action).collect();
    assert!(actions.contains(&"member_left".to_string()));
    assert!(actions.contains(&"access_revoked".to_string()));
}

#[tokio::test]
async fn test_leave_matches_required_group_by_username() {
    let h = harness(GroupSettings::new(-9999)).await;

    let event = MemberEvent {
        group_id: -9999,
        group_username: Some("GrupResmi".into()),
        user_id: 42,
        ..Default::default()
    };
    assert!(matches!(
        h.guard.on_member_left(&event).await,
        LeaveOutcome::Revoked(_)
    ));

    let other = MemberEvent {
        group_id: GROUP,
        user_id: 42,
        ..Default::default()
    };
    assert_eq!(h.guard.on_member_left(&other).await, LeaveOutcome::Recorded);

    let owner = MemberEvent {
        group_id: REQUIRED,
        user_id: OWNER,
        ..Default::default()
    };
    assert_eq!(h.guard.on_member_left(&owner).await, LeaveOutcome::Skipped);
}

#[tokio::test]
async fn test_revocation_is_idempotent() {
    let h = harness(GroupSettings::new(REQUIRED)).await;
    h.store.upsert_user(&User::new(42)).await.unwrap();
    h.guard.access().grant_vip(42, 10).await.unwrap();

    let event = MemberEvent {
        group_id: REQUIRED,
        user_id: 42,
        ..Default::default()
    };
    h.guard.on_member_left(&event).await;
    let first = h.store.get_user(42).await.unwrap().unwrap();

    let LeaveOutcome::Revoked(second_report) = h.guard.on_member_left(&event).await else {
        panic!("expected revocation");
    };
    assert_eq!(second_report.vip, StepStatus::Unchanged);

    let second = h.store.get_user(42).await.unwrap().unwrap();
    assert_eq!(first.role, second.role);
    assert_eq!(first.daily_limit, second.daily_limit);
    let grant = h.store.get_grant(42, AccessTier::Vip).await.unwrap().unwrap();
    assert_eq!(grant.status, GrantStatus::Revoked);
}
