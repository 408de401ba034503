mod common;

use std::{sync::Arc, time::Duration};

use common::{at, form, FakeProvider, Harness, Sent};
use ticket_bot::{
    model::{NewMessage, TicketStatus},
    reconciler::{TickReport, CLOSING_NOTICE},
    store::{SqliteStore, TicketStore},
};

#[tokio::test]
async fn open_ticket_is_provisioned_and_closed_ticket_torn_down() {
    let h = Harness::new(Duration::ZERO);
    let ticket = h.store.create_ticket(form("77"), at(0)).await.unwrap();
    assert_eq!(ticket.channel_ref, None);

    let report = h.reconciler.tick(at(1)).await.unwrap();
    assert_eq!(report.provisioned, 1);
    let name = format!("ticket-{}", ticket.id);
    let channel = h.provider.live(&name).expect("channel created");
    assert_eq!(h.ticket(ticket.id).await.channel_ref.as_deref(), Some(channel.as_str()));
    assert_eq!(h.provider.sent_to(&channel), vec![Sent::Intro(ticket.id)]);
    assert_eq!(h.provider.acl(&channel).unwrap().allowed_users, vec!["77"]);

    h.store.set_status(ticket.id, TicketStatus::Closed, at(2)).await.unwrap();
    let report = h.reconciler.tick(at(3)).await.unwrap();
    assert_eq!(report.closed, 1);
    assert_eq!(h.provider.texts_to(&channel), vec![CLOSING_NOTICE]);
    assert_eq!(h.provider.live(&name), None);
    assert_eq!(h.provider.deleted(), vec![channel]);
    assert_eq!(h.ticket(ticket.id).await.channel_ref, None);
}

#[tokio::test]
async fn repeated_ticks_change_nothing() {
    let h = Harness::new(Duration::ZERO);
    let ticket = h.store.create_ticket(form("77"), at(0)).await.unwrap();

    h.reconciler.tick(at(1)).await.unwrap();
    let second = h.reconciler.tick(at(1)).await.unwrap();
    assert_eq!(second, TickReport::default());
    assert_eq!(h.provider.created().len(), 1);
    let channel = h.ticket(ticket.id).await.channel_ref.unwrap();
    assert_eq!(h.provider.sent_to(&channel), vec![Sent::Intro(ticket.id)]);

    h.store.set_status(ticket.id, TicketStatus::Closed, at(2)).await.unwrap();
    h.reconciler.tick(at(3)).await.unwrap();
    let again = h.reconciler.tick(at(4)).await.unwrap();
    assert_eq!(again, TickReport::default());
    assert_eq!(h.provider.texts_to(&channel), vec![CLOSING_NOTICE]);
    assert_eq!(h.provider.deleted().len(), 1);
}

#[tokio::test]
async fn every_open_ticket_has_exactly_one_channel_after_a_tick() {
    let h = Harness::new(Duration::ZERO);
    let mut ids = Vec::new();
    for owner in ["1", "2", "3", "4"] {
        ids.push(h.store.create_ticket(form(owner), at(0)).await.unwrap().id);
    }
    h.store.set_status(ids[1], TicketStatus::Closed, at(1)).await.unwrap();
    h.reconciler.tick(at(2)).await.unwrap();

    for id in ids {
        let ticket = h.ticket(id).await;
        let live = h.provider.live(&ticket.channel_name());
        assert_eq!(ticket.is_open(), live.is_some(), "ticket {id}");
        assert_eq!(ticket.channel_ref, live);
    }
    assert_eq!(h.provider.live_count(), 3);
}

#[tokio::test]
async fn stale_ref_is_corrected_without_a_new_channel() {
    let h = Harness::new(Duration::ZERO);
    let ticket = h.store.create_ticket(form("77"), at(0)).await.unwrap();
    let live = h.provider.add_channel(&ticket.channel_name());
    h.store.set_channel_ref(ticket.id, Some("c-stale"), at(0)).await.unwrap();

    let report = h.reconciler.tick(at(1)).await.unwrap();
    assert_eq!(report.corrected, 1);
    assert_eq!(report.provisioned, 0);
    assert!(h.provider.created().is_empty());
    assert_eq!(h.ticket(ticket.id).await.channel_ref, Some(live.clone()));
    assert_eq!(h.provider.sent_to(&live), vec![Sent::Intro(ticket.id)]);
    assert_eq!(h.reconciler.tick(at(2)).await.unwrap(), TickReport::default());
}

#[tokio::test]
async fn failed_intro_is_sent_again_next_tick() {
    let h = Harness::new(Duration::ZERO);
    let ticket = h.store.create_ticket(form("77"), at(0)).await.unwrap();
    // The fake hands out refs in order, so the first channel is c-1.
    h.provider.set_failing("c-1", true);

    let report = h.reconciler.tick(at(1)).await.unwrap();
    assert_eq!(report.provisioned, 1);
    assert_eq!(report.failed, 1);
    assert!(!h.ticket(ticket.id).await.provisioned);
    assert!(h.provider.sent_to("c-1").is_empty());

    h.provider.set_failing("c-1", false);
    let report = h.reconciler.tick(at(2)).await.unwrap();
    assert_eq!(report.resumed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(h.provider.created().len(), 1);
    assert_eq!(h.provider.sent_to("c-1"), vec![Sent::Intro(ticket.id)]);
    assert!(h.ticket(ticket.id).await.provisioned);

    assert_eq!(h.reconciler.tick(at(3)).await.unwrap(), TickReport::default());
}

#[tokio::test]
async fn failed_history_replay_on_reopen_is_retried() {
    let h = Harness::new(Duration::ZERO);
    let ticket = h.store.create_ticket(form("77"), at(0)).await.unwrap();
    h.reconciler.tick(at(1)).await.unwrap();
    h.store
        .insert_message(NewMessage::pending(ticket.id, "Mira", "hello", at(2)))
        .await
        .unwrap();
    h.relay.drain().await.unwrap();
    h.store.set_status(ticket.id, TicketStatus::Closed, at(3)).await.unwrap();
    h.reconciler.tick(at(4)).await.unwrap();

    h.store.set_status(ticket.id, TicketStatus::Open, at(5)).await.unwrap();
    h.provider.set_failing("c-2", true);
    let report = h.reconciler.tick(at(6)).await.unwrap();
    assert_eq!(report.failed, 1);

    // Messages written meanwhile wait for the replay instead of racing it.
    h.store
        .insert_message(NewMessage::pending(ticket.id, "Sam", "back again", at(7)))
        .await
        .unwrap();
    h.provider.set_failing("c-2", false);
    assert_eq!(h.relay.drain().await.unwrap().delivered, 0);

    h.reconciler.tick(at(8)).await.unwrap();
    h.relay.drain().await.unwrap();
    assert_eq!(
        h.provider.sent_to("c-2"),
        vec![
            Sent::Intro(ticket.id),
            Sent::File(format!("transcript-ticket-{}.html", ticket.id)),
            Sent::Text("[12:02] Mira: hello\n[12:07] Sam: back again".into()),
        ]
    );
    assert!(h.store.list_undelivered_messages().await.unwrap().is_empty());
}

#[tokio::test]
async fn channel_deleted_by_hand_is_recreated_with_history() {
    let h = Harness::new(Duration::ZERO);
    let ticket = h.store.create_ticket(form("77"), at(0)).await.unwrap();
    h.reconciler.tick(at(1)).await.unwrap();
    let first = h.ticket(ticket.id).await.channel_ref.unwrap();
    h.store
        .insert_message(NewMessage::pending(ticket.id, "Mira", "still broken", at(2)))
        .await
        .unwrap();
    h.relay.drain().await.unwrap();

    h.provider.remove_channel(&first);
    let report = h.reconciler.tick(at(3)).await.unwrap();
    assert_eq!(report.provisioned, 1);
    let second = h.ticket(ticket.id).await.channel_ref.unwrap();
    assert_ne!(first, second);
    assert_eq!(
        h.provider.sent_to(&second),
        vec![
            Sent::Intro(ticket.id),
            Sent::File(format!("transcript-ticket-{}.html", ticket.id)),
            Sent::Text("[12:02] Mira: still broken".into()),
        ]
    );
}

#[tokio::test]
async fn closing_a_channel_that_is_already_gone_just_clears_the_ref() {
    let h = Harness::new(Duration::ZERO);
    let ticket = h.store.create_ticket(form("77"), at(0)).await.unwrap();
    h.reconciler.tick(at(1)).await.unwrap();
    let channel = h.ticket(ticket.id).await.channel_ref.unwrap();

    h.provider.remove_channel(&channel);
    h.store.set_status(ticket.id, TicketStatus::Closed, at(2)).await.unwrap();
    let report = h.reconciler.tick(at(3)).await.unwrap();
    assert_eq!(report.closed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(h.ticket(ticket.id).await.channel_ref, None);
}

#[tokio::test]
async fn orphaned_channel_of_recently_closed_ticket_is_swept() {
    let h = Harness::new(Duration::ZERO);
    let ticket = h.store.create_ticket(form("77"), at(0)).await.unwrap();
    h.store.set_status(ticket.id, TicketStatus::Closed, at(1)).await.unwrap();
    let orphan = h.provider.add_channel(&ticket.channel_name());

    let report = h.reconciler.tick(at(2)).await.unwrap();
    assert_eq!(report.swept, 1);
    assert_eq!(h.provider.deleted(), vec![orphan]);

    // Outside the window nothing is looked up any more.
    let late = h.provider.add_channel(&ticket.channel_name());
    let report = h.reconciler.tick(at(30)).await.unwrap();
    assert_eq!(report.swept, 0);
    assert_eq!(h.provider.live(&ticket.channel_name()), Some(late));
}

#[tokio::test]
async fn reopened_ticket_gets_a_fresh_channel_with_its_history() {
    let h = Harness::new(Duration::ZERO);
    let ticket = h.store.create_ticket(form("77"), at(0)).await.unwrap();
    h.reconciler.tick(at(1)).await.unwrap();
    h.store
        .insert_message(NewMessage::pending(ticket.id, "Mira", "hello", at(2)))
        .await
        .unwrap();
    h.store
        .insert_message(NewMessage::pending(ticket.id, "Sam", "hi", at(3)))
        .await
        .unwrap();
    h.relay.drain().await.unwrap();
    h.store.set_status(ticket.id, TicketStatus::Closed, at(4)).await.unwrap();
    h.reconciler.tick(at(5)).await.unwrap();
    assert_eq!(h.provider.live_count(), 0);

    h.store.set_status(ticket.id, TicketStatus::Open, at(6)).await.unwrap();
    h.reconciler.tick(at(7)).await.unwrap();
    let channel = h.ticket(ticket.id).await.channel_ref.expect("reprovisioned");
    assert_eq!(
        h.provider.sent_to(&channel),
        vec![
            Sent::Intro(ticket.id),
            Sent::File(format!("transcript-ticket-{}.html", ticket.id)),
            Sent::Text("[12:02] Mira: hello\n[12:03] Sam: hi".into()),
        ]
    );
}

#[tokio::test]
async fn reopen_then_immediate_close_ends_without_a_channel() {
    let h = Harness::new(Duration::ZERO);
    let ticket = h.store.create_ticket(form("77"), at(0)).await.unwrap();
    h.reconciler.tick(at(1)).await.unwrap();
    h.store.set_status(ticket.id, TicketStatus::Closed, at(2)).await.unwrap();
    h.reconciler.tick(at(3)).await.unwrap();

    h.store.set_status(ticket.id, TicketStatus::Open, at(4)).await.unwrap();
    h.store.set_status(ticket.id, TicketStatus::Closed, at(4)).await.unwrap();
    h.reconciler.tick(at(5)).await.unwrap();

    assert_eq!(h.ticket(ticket.id).await.status, TicketStatus::Closed);
    assert_eq!(h.provider.live_count(), 0);
    assert_eq!(h.provider.created().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn reopen_during_grace_keeps_the_channel() {
    let h = Harness::new(Duration::from_secs(3600));
    let ticket = h.store.create_ticket(form("77"), at(0)).await.unwrap();
    h.reconciler.tick(at(1)).await.unwrap();
    let channel = h.ticket(ticket.id).await.channel_ref.unwrap();
    h.store.set_status(ticket.id, TicketStatus::Closed, at(2)).await.unwrap();

    let reconciler = h.reconciler.clone();
    let tick = tokio::spawn(async move { reconciler.tick(at(3)).await });
    h.wait_for_text(&channel, CLOSING_NOTICE).await;
    h.store.set_status(ticket.id, TicketStatus::Open, at(3)).await.unwrap();

    let report = tick.await.unwrap().unwrap();
    assert_eq!(report.closed, 0);
    assert_eq!(h.provider.live(&ticket.channel_name()), Some(channel.clone()));
    assert_eq!(h.ticket(ticket.id).await.channel_ref, Some(channel));

    let next = h.reconciler.tick(at(4)).await.unwrap();
    assert_eq!(next, TickReport::default());
    assert_eq!(h.provider.created().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_grace_leaves_teardown_to_the_next_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tickets.db");
    let provider = FakeProvider::new();

    let (id, channel) = {
        let h = Harness::with(
            Arc::new(SqliteStore::new(&path).unwrap()),
            provider.clone(),
            Duration::from_secs(3600),
        );
        let ticket = h.store.create_ticket(form("77"), at(0)).await.unwrap();
        h.reconciler.tick(at(1)).await.unwrap();
        let channel = h.ticket(ticket.id).await.channel_ref.unwrap();
        h.store.set_status(ticket.id, TicketStatus::Closed, at(2)).await.unwrap();

        let reconciler = h.reconciler.clone();
        let tick = tokio::spawn(async move { reconciler.tick(at(3)).await });
        h.wait_for_text(&channel, CLOSING_NOTICE).await;
        h.shutdown.send(true).unwrap();

        let report = tick.await.unwrap().unwrap();
        assert_eq!(report.closed, 0);
        assert!(provider.live(&ticket.channel_name()).is_some());
        assert_eq!(h.ticket(ticket.id).await.channel_ref, Some(channel.clone()));
        (ticket.id, channel)
    };

    let h = Harness::with(Arc::new(SqliteStore::new(&path).unwrap()), provider.clone(), Duration::ZERO);
    let report = h.reconciler.tick(at(4)).await.unwrap();
    assert_eq!(report.closed, 1);
    assert_eq!(h.ticket(id).await.channel_ref, None);
    assert_eq!(provider.live_count(), 0);
    assert_eq!(provider.deleted(), vec![channel]);
}
