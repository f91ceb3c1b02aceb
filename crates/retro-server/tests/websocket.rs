//! End-to-end WebSocket scenarios against a running server.

mod common;

use common::{Client, column_titles, spawn_server, test_state};
use retro_core::{BoardStore, Sweeper};
use retro_types::DEFAULT_COLUMN_TITLES;
use serde_json::json;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite};

#[tokio::test]
async fn test_admin_column_create_reaches_everyone() {
    let (state, board) = test_state();
    let addr = spawn_server(state).await;

    let (mut admin, initial) = Client::join(addr, &board.id, Some(&board.admin_key)).await;
    let (mut guest, _) = Client::join(addr, &board.id, None).await;
    assert_eq!(column_titles(&initial), DEFAULT_COLUMN_TITLES);
    assert!(initial["payload"].get("adminKey").is_none());

    admin.send("client:column:create", json!({ "title": "Kudos" })).await;

    for client in [&mut admin, &mut guest] {
        let update = client.next_event().await.unwrap();
        assert_eq!(update["type"], "server:board:state_update");
        let titles = column_titles(&update);
        assert_eq!(titles.len(), 4);
        assert_eq!(titles[3], "Kudos");
    }
}

#[tokio::test]
async fn test_oversized_tile_is_rejected_for_sender_only() {
    let (state, board) = test_state();
    let column_id = board.sorted_columns()[0].id.clone();
    let addr = spawn_server(state.clone()).await;

    let (mut a, _) = Client::join(addr, &board.id, None).await;
    let (mut b, _) = Client::join(addr, &board.id, None).await;

    a.send(
        "client:tile:create",
        json!({ "columnId": column_id, "content": "x".repeat(1001) }),
    )
    .await;

    let error = a.next_event().await.unwrap();
    assert_eq!(error["type"], "error");
    assert_eq!(
        error["payload"]["message"],
        "tile content exceeds maximum length of 1000 characters"
    );
    b.expect_silence(Duration::from_millis(300)).await;

    let stored = state.store.get(&board.id).unwrap();
    assert_eq!(stored.tile_count(), 0);
}

#[tokio::test]
async fn test_tile_create_is_escaped_and_broadcast() {
    let (state, board) = test_state();
    let column_id = board.sorted_columns()[0].id.clone();
    let addr = spawn_server(state).await;

    let (mut a, _) = Client::join(addr, &board.id, None).await;
    let (mut b, _) = Client::join(addr, &board.id, None).await;

    a.send(
        "client:tile:create",
        json!({ "columnId": column_id, "content": "  <b>ship it</b>  ", "author": "Sam" }),
    )
    .await;

    for client in [&mut a, &mut b] {
        let update = client.next_event().await.unwrap();
        let tiles = update["payload"]["columns"][&column_id]["tiles"]
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0]["content"], "&lt;b&gt;ship it&lt;/b&gt;");
        assert_eq!(tiles[0]["author"], "Sam");
        assert_eq!(tiles[0]["isHidden"], true);
    }
}

#[tokio::test]
async fn test_unknown_board_is_rejected() {
    let (state, _) = test_state();
    let addr = spawn_server(state.clone()).await;

    let mut client = Client::connect(addr, "no-such-board", None).await;
    let error = client.next_event().await.unwrap();
    assert_eq!(error["type"], "error");
    assert_eq!(error["payload"]["message"], "Board not found");
    assert!(client.next_event().await.is_none());
    assert_eq!(state.metrics.snapshot().total_connections, 0);
}

#[tokio::test]
async fn test_missing_board_id_is_bad_request() {
    let (state, _) = test_state();
    let addr = spawn_server(state).await;

    match connect_async(format!("ws://{}/ws", addr)).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 400),
        other => panic!("expected HTTP 400, got {:?}", other.map(|(_, r)| r.status())),
    }
}

#[tokio::test]
async fn test_non_admin_column_delete_is_ignored() {
    let (state, board) = test_state();
    let column_id = board.sorted_columns()[0].id.clone();
    let addr = spawn_server(state.clone()).await;

    let (mut admin, _) = Client::join(addr, &board.id, Some(&board.admin_key)).await;
    let (mut guest, _) = Client::join(addr, &board.id, Some("wrong-key")).await;

    guest
        .send("client:column:delete", json!({ "columnId": column_id }))
        .await;
    guest.send("client:user:typing_start", json!({})).await;

    // The typing event is the first thing anyone sees: no error, no state update.
    for client in [&mut admin, &mut guest] {
        let event = client.next_event().await.unwrap();
        assert_eq!(event["type"], "server:user:is_typing");
        assert_eq!(event["payload"]["typing"], true);
        assert_eq!(event["payload"]["boardId"], board.id.as_str());
    }
    assert_eq!(state.store.get(&board.id).unwrap().columns.len(), 3);
}

#[tokio::test]
async fn test_expiry_sweep_closes_all_sessions() {
    let (state, board) = test_state();
    let addr = spawn_server(state.clone()).await;

    let (mut a, _) = Client::join(addr, &board.id, None).await;
    let (mut b, _) = Client::join(addr, &board.id, None).await;
    assert_eq!(state.hub.session_count(&board.id).await.unwrap(), 2);

    state.store.delete(&board.id).unwrap();
    let sweeper = Sweeper::new(state.hub.clone(), state.store.clone(), Duration::from_secs(300));
    assert_eq!(sweeper.sweep_once().await.unwrap(), vec![board.id.clone()]);

    for client in [&mut a, &mut b] {
        let events = client.drain_until_closed().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "server:board:expired");
        assert_eq!(events[0]["payload"]["message"], "This board has expired");
    }
    assert!(state.hub.active_boards().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_disconnect_unregisters_session() {
    let (state, board) = test_state();
    let addr = spawn_server(state.clone()).await;

    let (client, _) = Client::join(addr, &board.id, None).await;
    assert_eq!(state.metrics.snapshot().active_connections, 1);
    drop(client);

    let mut remaining = 1;
    for _ in 0..50 {
        remaining = state.hub.session_count(&board.id).await.unwrap();
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(remaining, 0);
}
