mod common;

use std::time::Duration;

use common::{at, form, pending, Harness, Sent};
use ticket_bot::{model::NewMessage, provider::KnownMember, store::TicketStore};

async fn provisioned(h: &Harness, owner: &str) -> (i64, String) {
    let ticket = h.store.create_ticket(form(owner), at(0)).await.unwrap();
    h.reconciler.tick(at(1)).await.unwrap();
    let channel = h.ticket(ticket.id).await.channel_ref.unwrap();
    (ticket.id, channel)
}

#[tokio::test]
async fn drain_delivers_in_creation_order_and_holds_tickets_without_a_channel() {
    let h = Harness::new(Duration::ZERO);
    let (a, channel) = provisioned(&h, "77").await;
    let b = h.store.create_ticket(form("88"), at(0)).await.unwrap().id;

    h.store.insert_message(pending(a, "Mira", "second", at(5))).await.unwrap();
    h.store.insert_message(pending(b, "Sam", "waiting", at(4))).await.unwrap();
    h.store.insert_message(pending(a, "Mira", "first", at(3))).await.unwrap();

    let report = h.relay.drain().await.unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(
        h.provider.texts_to(&channel),
        vec!["[12:03] Mira: first", "[12:05] Mira: second"]
    );
    assert_eq!(h.store.list_undelivered_messages().await.unwrap().len(), 1);

    // Provisioning replays the held message; draining afterwards is a no-op.
    h.reconciler.tick(at(6)).await.unwrap();
    let b_channel = h.ticket(b).await.channel_ref.unwrap();
    assert!(h.provider.texts_to(&b_channel).contains(&"[12:04] Sam: waiting".to_string()));
    let report = h.relay.drain().await.unwrap();
    assert_eq!(report.delivered, 0);
    assert!(h.store.list_undelivered_messages().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_send_blocks_the_rest_of_that_ticket() {
    let h = Harness::new(Duration::ZERO);
    let (a, channel) = provisioned(&h, "77").await;
    let (b, other) = provisioned(&h, "88").await;

    h.store.insert_message(pending(a, "Mira", "one", at(2))).await.unwrap();
    h.store.insert_message(pending(b, "Sam", "elsewhere", at(3))).await.unwrap();
    h.store.insert_message(pending(a, "Mira", "two", at(4))).await.unwrap();

    h.provider.set_failing(&channel, true);
    let report = h.relay.drain().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.delivered, 1);
    assert_eq!(h.provider.texts_to(&other), vec!["[12:03] Sam: elsewhere"]);

    h.provider.set_failing(&channel, false);
    let report = h.relay.drain().await.unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(h.provider.texts_to(&channel), vec!["[12:02] Mira: one", "[12:04] Mira: two"]);
}

#[tokio::test]
async fn closed_tickets_hold_their_messages() {
    let h = Harness::new(Duration::ZERO);
    let (a, _) = provisioned(&h, "77").await;
    h.store
        .set_status(a, ticket_bot::model::TicketStatus::Closed, at(2))
        .await
        .unwrap();
    h.store.insert_message(pending(a, "Mira", "late reply", at(3))).await.unwrap();

    let report = h.relay.drain().await.unwrap();
    assert_eq!(report.delivered, 0);
    assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn mentions_and_attachments_are_delivered_in_place() {
    let h = Harness::new(Duration::ZERO);
    let (a, channel) = provisioned(&h, "77").await;
    h.provider.set_members(vec![KnownMember {
        id: "77".into(),
        names: vec!["Mira".into()],
    }]);

    let mut with_file = pending(a, "Support", "see @mira screenshot", at(2));
    with_file.attachments = vec!["https://cdn.example/shot.png".into()];
    h.store.insert_message(with_file).await.unwrap();
    h.store
        .insert_message(pending(a, "Support", "https://example.com/faq", at(3)))
        .await
        .unwrap();

    h.relay.drain().await.unwrap();
    let sent = h.provider.sent_to(&channel);
    assert_eq!(
        sent[1..].to_vec(),
        vec![
            Sent::Text("[12:02] Support: see <@77> screenshot".into()),
            Sent::Attachment("https://cdn.example/shot.png".into()),
            Sent::Text("[12:03] Support:".into()),
            Sent::Text("https://example.com/faq".into()),
        ]
    );
}

#[tokio::test]
async fn long_messages_are_split_under_the_limit() {
    let h = Harness::new(Duration::ZERO);
    let (a, channel) = provisioned(&h, "77").await;
    let body: String = (0..300).map(|i| format!("line {i}\n")).collect();
    h.store
        .insert_message(NewMessage::pending(a, "Mira", &body, at(2)))
        .await
        .unwrap();

    h.relay.drain().await.unwrap();
    let texts = h.provider.texts_to(&channel);
    assert!(texts.len() > 1);
    assert!(texts.iter().all(|t| t.len() <= 2000));
    let joined = texts.join("\n");
    assert_eq!(joined, format!("[12:02] Mira: {}", body.trim_end()));
}
