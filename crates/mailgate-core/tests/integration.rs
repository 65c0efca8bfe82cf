//! End-to-end tests for the deliverability manager.
//!
//! These tests drive the full pipeline against an in-memory database:
//! signed links, webhook events, batch filtering, and inactivity
//! accounting.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use mailgate_core::{
    BeforeSendEvent, Database, DeliverabilityManager, EmailBatch, EncodeMode, Encoder,
    LinkManager, SendHook, SectionBlueprint, Sections, SuspensionKind, UnsubscribeReason,
};

const EMAIL: &str = "first@example.com";
const OTHER: &str = "second@example.com";
const THIRD: &str = "third@example.com";

fn sections() -> Sections {
    let mut sections = Sections::new();
    sections
        .add(
            SectionBlueprint::new("notifications")
                .with_categories(["article", "comment"])
                .unsubscribe_per_category(),
        )
        .unwrap();
    sections.add(SectionBlueprint::new("marketing")).unwrap();
    sections
}

async fn manager() -> DeliverabilityManager {
    let db = Database::in_memory().await.unwrap();

    DeliverabilityManager::new(sections(), &db)
        .with_links(LinkManager::new(Encoder::new(
            b"integration secret".to_vec(),
            EncodeMode::Salt,
        )))
}

fn owned(emails: &[&str]) -> Vec<String> {
    emails.iter().map(ToString::to_string).collect()
}

#[tokio::test]
async fn test_link_click_unsubscribes_and_resubscribes() {
    let manager = manager().await;

    let link = manager
        .unsubscribe_link("https://example.com/u", EMAIL, "notifications", "article")
        .unwrap()
        .unwrap();

    assert!(manager.can_send(EMAIL, "notifications", "article").await.unwrap());

    manager.apply_link(&link).await.unwrap();

    assert!(!manager.can_send(EMAIL, "notifications", "article").await.unwrap());
    // Sibling category is untouched by a per-category opt-out.
    assert!(manager.can_send(EMAIL, "notifications", "comment").await.unwrap());

    let back = manager
        .resubscribe_link("https://example.com/r", EMAIL, "notifications", "article")
        .unwrap()
        .unwrap();

    manager.apply_link(&back).await.unwrap();

    assert!(manager.can_send(EMAIL, "notifications", "article").await.unwrap());
}

#[tokio::test]
async fn test_collapsing_section_link_blocks_every_category() {
    let manager = manager().await;

    let link = manager
        .unsubscribe_link("https://example.com/u", EMAIL, "marketing", "*")
        .unwrap()
        .unwrap();

    manager.apply_link(&link).await.unwrap();

    assert!(!manager.can_send(EMAIL, "marketing", "*").await.unwrap());
    // Other sections stay deliverable.
    assert!(manager.can_send(EMAIL, "notifications", "article").await.unwrap());
}

#[tokio::test]
async fn test_forged_or_stale_link_is_a_no_op() {
    let manager = manager().await;

    manager
        .apply_link("https://example.com/u?u=v1.b.forged")
        .await
        .unwrap();
    manager.apply_link("https://example.com/plain").await.unwrap();

    assert!(manager.can_send(EMAIL, "marketing", "*").await.unwrap());
}

#[tokio::test]
async fn test_hard_bounce_blocks_even_essential() {
    let manager = manager().await;

    manager.hard_bounce(&owned(&[EMAIL])).await.unwrap();

    assert!(!manager.can_send(EMAIL, "marketing", "*").await.unwrap());
    assert!(!manager.can_send(EMAIL, "essential", "*").await.unwrap());
    assert_eq!(
        manager.suspension_reasons(EMAIL).await.unwrap(),
        vec![SuspensionKind::HardBounce],
    );
}

#[tokio::test]
async fn test_spam_complaint_spares_essential() {
    let manager = manager().await;

    manager.spam_complaint(&owned(&[EMAIL])).await.unwrap();

    assert!(!manager.can_send(EMAIL, "marketing", "*").await.unwrap());
    assert!(manager.can_send(EMAIL, "essential", "*").await.unwrap());
}

#[tokio::test]
async fn test_soft_bounces_escalate_at_the_limit() {
    let manager = manager().await.with_bounce_limit(3);

    manager.soft_bounce(EMAIL).await.unwrap();
    manager.soft_bounce(EMAIL).await.unwrap();
    assert!(manager.can_send(EMAIL, "marketing", "*").await.unwrap());

    manager.soft_bounce(EMAIL).await.unwrap();

    assert!(!manager.can_send(EMAIL, "marketing", "*").await.unwrap());
    assert!(manager.can_send(EMAIL, "essential", "*").await.unwrap());
    assert_eq!(
        manager.suspension_reasons(EMAIL).await.unwrap(),
        vec![SuspensionKind::SoftBounce],
    );
}

#[tokio::test]
async fn test_before_send_drops_blocked_recipients() {
    let manager = manager().await;

    manager.hard_bounce(&owned(&[OTHER])).await.unwrap();
    manager
        .unsubscribe(&owned(&[THIRD]), "marketing", "*")
        .await
        .unwrap();

    let mut batch = EmailBatch::new([EMAIL, OTHER, THIRD]);
    manager.before_send(&mut batch, "marketing", "*").await.unwrap();

    assert_eq!(batch.emails(), [EMAIL.to_string()]);
    assert_eq!(batch.removed(), owned(&[OTHER, THIRD]));
}

#[tokio::test]
async fn test_inactivity_unsubscribes_after_threshold_sends() {
    let manager = manager().await.with_max_inactivity(2);
    let batch = EmailBatch::new([EMAIL, OTHER]);

    manager.after_send(&batch, "marketing", "*").await.unwrap();
    assert!(manager.can_send(EMAIL, "marketing", "*").await.unwrap());

    // OTHER opens the email; only EMAIL stays silent.
    manager.email_opened(&owned(&[OTHER]), "marketing").await.unwrap();
    manager.after_send(&batch, "marketing", "*").await.unwrap();

    assert!(!manager.can_send(EMAIL, "marketing", "*").await.unwrap());
    assert!(manager.can_send(OTHER, "marketing", "*").await.unwrap());

    let info = manager.subscription_info(EMAIL, "marketing").await.unwrap();
    assert_eq!(info.reason("*"), Some(UnsubscribeReason::Inactivity));
}

#[tokio::test]
async fn test_later_activity_supersedes_inactivity_opt_out() {
    let manager = manager().await.with_max_inactivity(1);
    let batch = EmailBatch::new([EMAIL]);

    manager.after_send(&batch, "marketing", "*").await.unwrap();
    assert!(!manager.can_send(EMAIL, "marketing", "*").await.unwrap());

    // An explicit resubscribe restores delivery and resets the slate.
    manager.resubscribe(EMAIL, "marketing", "*").await.unwrap();
    assert!(manager.can_send(EMAIL, "marketing", "*").await.unwrap());
}

#[tokio::test]
async fn test_reset_reinstates_everything() {
    let manager = manager().await.with_bounce_limit(1);

    manager.hard_bounce(&owned(&[EMAIL])).await.unwrap();
    manager.soft_bounce(EMAIL).await.unwrap();
    manager
        .unsubscribe(&owned(&[EMAIL]), "notifications", "article")
        .await
        .unwrap();

    manager.reset(&owned(&[EMAIL])).await.unwrap();

    assert!(manager.can_send(EMAIL, "marketing", "*").await.unwrap());
    assert!(manager.can_send(EMAIL, "notifications", "article").await.unwrap());
    assert!(manager.suspension_reasons(EMAIL).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_filter_for_delivery_preserves_order() {
    let manager = manager().await;

    manager
        .unsubscribe(&owned(&[OTHER]), "marketing", "*")
        .await
        .unwrap();

    let deliverable = manager
        .filter_for_delivery(&owned(&[THIRD, OTHER, EMAIL]), "marketing", "*")
        .await
        .unwrap();

    assert_eq!(deliverable, owned(&[THIRD, EMAIL]));
}

struct Recorder {
    label: &'static str,
    calls: Arc<Mutex<Vec<String>>>,
}

impl SendHook for Recorder {
    fn before_send(&self, event: &BeforeSendEvent<'_>) {
        self.calls.lock().unwrap().push(format!(
            "{} before {}/{} ({} recipients)",
            self.label,
            event.section,
            event.category,
            event.batch.emails().len(),
        ));
    }
}

#[tokio::test]
async fn test_hooks_run_in_registration_order() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut manager = manager().await;

    for label in ["first", "second"] {
        manager.add_hook(Box::new(Recorder {
            label,
            calls: Arc::clone(&calls),
        }));
    }

    manager.hard_bounce(&owned(&[OTHER])).await.unwrap();

    let mut batch = EmailBatch::new([EMAIL, OTHER]);
    manager.before_send(&mut batch, "marketing", "*").await.unwrap();

    // Hooks observe the batch after filtering has already run.
    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            "first before marketing/* (1 recipients)".to_string(),
            "second before marketing/* (1 recipients)".to_string(),
        ],
    );
}
