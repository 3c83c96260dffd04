//! End-to-end flow over the in-memory store: two colleagues, one board.

use agenda::{
    AgendaError, EventForm, EventService, FixedClock, LiveRefreshController, MemoryStore,
    NotificationFeed, ResponseKind, Viewer,
};
use chrono::NaiveDate;
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

async fn sign_up(service: &EventService, email: &str) -> Viewer {
    let id = Uuid::new_v4();
    let profile = service
        .register_profile(id, email, None)
        .await
        .unwrap()
        .unwrap();
    Viewer {
        id,
        email: profile.email,
        name: profile.name,
    }
}

#[tokio::test]
async fn test_rsvp_flow() {
    let now = NaiveDate::from_ymd_opt(2026, 10, 17)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();
    let store = Arc::new(MemoryStore::new());
    let service = EventService::new(store.clone());
    let controller = LiveRefreshController::new(store.clone(), Arc::new(FixedClock(now)));
    let handle = controller.spawn();
    controller
        .wait_ready(Duration::from_secs(5))
        .await
        .expect("initial load");

    let host = sign_up(&service, "host@corp.com").await;
    let guest = sign_up(&service, "guest@corp.com").await;
    let mut host_feed = NotificationFeed::new(store.clone(), host.clone());
    let mut rx = controller.watch();

    let event = service
        .create_event(
            &host,
            &EventForm {
                title: "Wine tasting".to_string(),
                date: "2026-10-19".to_string(),
                time: "18:00".to_string(),
                location: "Cellar".to_string(),
                max_participants: Some(2),
                ..EventForm::default()
            },
            now.date(),
        )
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|b| b.contains(event.id)))
        .await
        .expect("event reaches the board")
        .unwrap();

    service
        .respond(&guest, event.id, ResponseKind::Yes)
        .await
        .unwrap();
    let full = service
        .respond(&host, event.id, ResponseKind::Yes)
        .await
        .unwrap();
    assert!(full.is_full);

    let notification = tokio::time::timeout(Duration::from_secs(5), host_feed.next())
        .await
        .expect("host is notified")
        .unwrap();
    assert_eq!(
        notification.message(),
        "guest will attend your event Wine tasting"
    );

    tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|b| b.responses_for(event.id).len() == 2),
    )
    .await
    .expect("responses reach the board")
    .unwrap();

    let view = controller.board().view(Some(guest.id), now).unwrap();
    assert_eq!(view.stats.this_week, 1);
    let card = &view.buckets.this_week[0];
    assert_eq!(card.aggregate.viewer_response, Some(ResponseKind::Yes));
    assert_eq!(card.aggregate.participation_rate, 100.0);

    assert!(matches!(
        service.delete_event(&guest, event.id).await,
        Err(AgendaError::NotCreator)
    ));
    service.delete_event(&host, event.id).await.unwrap();
    controller.event_deleted(event.id).await;
    assert!(!controller.board().contains(event.id));

    handle.shutdown().await;
}
