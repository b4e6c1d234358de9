//! Full socket-based integration tests for client ↔ server communication.

use std::time::Duration;

use tokio_tungstenite::tungstenite::{protocol::frame::coding::CloseCode, Message as Frame};
use voidfleet_client::{input::InputState, render::NullRenderer, ClientState, GameClient};
use voidfleet_shared::{
    components::{EntityKind, Input, Transform},
    config::{ClientConfig, ServerConfig},
    protocol::{Hello, Message},
};
use voidfleet_tests::{
    connect, init_tracing, next_frame, recv, recv_until, send, send_text, test_config, RunningServer,
};

fn hello(name: &str) -> Message {
    Message::Hello(Hello { name: name.into() })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hello_is_answered_with_welcome_then_spawn_then_update() -> anyhow::Result<()> {
    init_tracing();
    let server = RunningServer::start(test_config()).await?;
    let mut ws = connect(&server.url).await?;
    send(&mut ws, &hello("Ace")).await?;

    let welcome = match recv(&mut ws).await? {
        Message::Welcome(w) => w,
        other => anyhow::bail!("expected WELCOME first, got {}", other.kind()),
    };
    assert_eq!(welcome.name, "Ace");
    assert_eq!(welcome.tick_rate, 60);

    let spawn = match recv(&mut ws).await? {
        Message::Spawn(s) => s,
        other => anyhow::bail!("expected SPAWN after WELCOME, got {}", other.kind()),
    };
    let own = spawn
        .entities
        .iter()
        .find(|e| e.id == welcome.entity_id)
        .expect("own ship announced");
    assert_eq!(own.kind, EntityKind::Ship);

    let (update, _) = recv_until(&mut ws, |m| matches!(m, Message::Update(_))).await?;
    let Message::Update(update) = update else { unreachable!() };
    assert!(update.entities.iter().any(|p| p.id == welcome.entity_id));

    let (next, _) = recv_until(&mut ws, |m| matches!(m, Message::Update(_))).await?;
    let Message::Update(next) = next else { unreachable!() };
    assert!(next.tick > update.tick);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_and_malformed_messages_do_not_drop_the_connection() -> anyhow::Result<()> {
    init_tracing();
    let server = RunningServer::start(test_config()).await?;
    let mut ws = connect(&server.url).await?;

    send_text(&mut ws, r#"{"type":"PING","data":{}}"#).await?;
    send_text(&mut ws, "not json at all").await?;
    send(&mut ws, &hello("")).await?;

    let (welcome, _) = recv_until(&mut ws, |m| matches!(m, Message::Welcome(_))).await?;
    let Message::Welcome(welcome) = welcome else { unreachable!() };
    assert_eq!(welcome.name, "UNKNOWN");
    assert_eq!(server.manager.connected_count(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connections_beyond_capacity_are_refused() -> anyhow::Result<()> {
    init_tracing();
    let server = RunningServer::start(ServerConfig {
        max_clients: 1,
        ..test_config()
    })
    .await?;

    let mut first = connect(&server.url).await?;
    server.wait_for_connections(1).await?;

    let mut second = connect(&server.url).await?;
    match next_frame(&mut second).await? {
        Some(Frame::Close(Some(close))) => assert_eq!(close.code, CloseCode::Again),
        other => anyhow::bail!("expected a close frame, got {other:?}"),
    }
    assert_eq!(server.manager.connected_count(), 1);

    // The occupant is unaffected.
    send(&mut first, &hello("First")).await?;
    recv_until(&mut first, |m| matches!(m, Message::Welcome(_))).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn closing_frees_the_slot_and_despawns_the_ship() -> anyhow::Result<()> {
    init_tracing();
    let server = RunningServer::start(ServerConfig {
        max_clients: 1,
        ..test_config()
    })
    .await?;

    let mut first = connect(&server.url).await?;
    send(&mut first, &hello("Leaving")).await?;
    let (welcome, _) = recv_until(&mut first, |m| matches!(m, Message::Welcome(_))).await?;
    let Message::Welcome(first_welcome) = welcome else { unreachable!() };
    first.close(None).await?;
    server.wait_for_connections(0).await?;

    let mut second = connect(&server.url).await?;
    send(&mut second, &hello("Arriving")).await?;
    let (_, _) = recv_until(&mut second, |m| matches!(m, Message::Welcome(_))).await?;
    let (spawn, _) = recv_until(&mut second, |m| matches!(m, Message::Spawn(_))).await?;
    let Message::Spawn(spawn) = spawn else { unreachable!() };
    assert!(spawn.entities.iter().all(|e| e.id != first_welcome.entity_id));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn silent_peers_are_evicted_by_the_heartbeat() -> anyhow::Result<()> {
    init_tracing();
    let server = RunningServer::start(ServerConfig {
        heartbeat_interval_ms: 50,
        ..test_config()
    })
    .await?;

    // Never reading means pings are never answered.
    let _silent = connect(&server.url).await?;
    server.wait_for_connections(1).await?;
    server.wait_for_connections(0).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_player_sees_the_first_ship_and_its_departure() -> anyhow::Result<()> {
    init_tracing();
    let server = RunningServer::start(test_config()).await?;

    let mut a = connect(&server.url).await?;
    send(&mut a, &hello("A")).await?;
    let (welcome, _) = recv_until(&mut a, |m| matches!(m, Message::Welcome(_))).await?;
    let Message::Welcome(a_welcome) = welcome else { unreachable!() };

    let mut b = connect(&server.url).await?;
    send(&mut b, &hello("B")).await?;
    let (spawn, _) = recv_until(&mut b, |m| matches!(m, Message::Spawn(_))).await?;
    let Message::Spawn(spawn) = spawn else { unreachable!() };
    assert!(spawn.entities.iter().any(|e| e.id == a_welcome.entity_id));

    a.close(None).await?;
    let (despawn, _) = recv_until(&mut b, |m| {
        matches!(m, Message::Despawn(d) if d.ids.contains(&a_welcome.entity_id))
    })
    .await?;
    assert!(matches!(despawn, Message::Despawn(_)));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn firing_produces_bullets_for_other_players() -> anyhow::Result<()> {
    init_tracing();
    let server = RunningServer::start(test_config()).await?;

    let mut shooter = connect(&server.url).await?;
    send(&mut shooter, &hello("Shooter")).await?;
    recv_until(&mut shooter, |m| matches!(m, Message::Welcome(_))).await?;
    send(
        &mut shooter,
        &Message::Input(Input {
            weapon_primary: true,
            ..Input::default()
        }),
    )
    .await?;

    let (spawn, _) = recv_until(&mut shooter, |m| {
        matches!(m, Message::Spawn(s) if s.entities.iter().any(|e| e.kind == EntityKind::Bullet))
    })
    .await?;
    assert!(matches!(spawn, Message::Spawn(_)));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn game_client_joins_and_flies() -> anyhow::Result<()> {
    init_tracing();
    let server = RunningServer::start(test_config()).await?;

    let cfg = ClientConfig {
        server_url: server.url.clone(),
        player_name: "Pilot".to_string(),
        ..ClientConfig::default()
    };
    let mut client = GameClient::connect(&cfg, Box::new(NullRenderer)).await?;
    assert_eq!(client.state, ClientState::Joined);
    assert!(client.player().is_some());

    let throttle = InputState {
        forward: 1.0,
        ..InputState::default()
    };
    let mut start = None;
    let mut moved = false;
    for _ in 0..120 {
        client.send_input(throttle).await?;
        client.pump(Duration::from_millis(20)).await?;
        client.frame();

        let position = client
            .player_entity()
            .and_then(|e| client.world.get::<Transform>(e))
            .map(|t| t.position);
        match (start, position) {
            (None, Some(p)) => start = Some(p),
            (Some(s), Some(p)) if (p - s).len() > 1.0 => {
                moved = true;
                break;
            }
            _ => {}
        }
    }
    assert!(start.is_some(), "own ship was never replicated");
    assert!(moved, "ship did not move under thrust");
    assert!(client.replicated_count() >= 1);

    client.close().await?;
    server.wait_for_connections(0).await?;
    Ok(())
}
