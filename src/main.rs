//! Demo driver: spawns one arena room, fills it with bots and plays a
//! short match end to end, logging every notification. Useful as a
//! smoke run and as a worked example of embedding the crate.

use std::time::Duration;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use matchroom::core::rng::SpawnRng;
use matchroom::{
    ArenaConfig, ArenaGame, ClientCommand, DriverConfig, JoinOptions, MoveCommand,
    Notification, ParticipantId, RoomCommand, RoomConfig, RoomCore, RoomHandle,
};

const BOT_COUNT: usize = 4;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    info!(version = matchroom::VERSION, "starting demo room");

    let config = ArenaConfig {
        match_duration: 30,
        score_limit: 10,
        ..Default::default()
    };
    let handle = matchroom::spawn_room(
        RoomCore::new(RoomConfig {
            name: "demo".into(),
            ..Default::default()
        }),
        ArenaGame::new(config),
        DriverConfig::default(),
    );
    let mut notifications = handle.subscribe();

    let bots: Vec<ParticipantId> = (0..BOT_COUNT).map(|_| ParticipantId::random()).collect();
    for (i, id) in bots.iter().enumerate() {
        handle
            .send(RoomCommand::Join(JoinOptions {
                id: *id,
                name: format!("bot-{i}"),
                avatar: String::new(),
                password: None,
            }))
            .await;
        handle
            .send(RoomCommand::Client {
                from: *id,
                command: ClientCommand::ToggleReady { ready: true },
            })
            .await;
    }
    handle
        .send(RoomCommand::Client {
            from: bots[0],
            command: ClientCommand::StartMatch,
        })
        .await;

    tokio::spawn(drive_bots(handle.clone(), bots));

    loop {
        match notifications.recv().await {
            Ok(outbound) => {
                info!(notification = ?outbound.notification, "room event");
                if matches!(
                    outbound.notification,
                    Notification::MatchEnded { .. } | Notification::Shutdown { .. }
                ) {
                    break;
                }
            }
            Err(_) => break,
        }
    }

    let snapshot = handle.snapshot();
    info!(phase = ?snapshot.phase, winner = ?snapshot.winner, "demo finished");
    Ok(())
}

/// Feed the bots random movement and fire commands until the room stops
/// accepting them.
async fn drive_bots(handle: RoomHandle, bots: Vec<ParticipantId>) {
    let mut rng = SpawnRng::new(0xB07);
    let mut ticker = tokio::time::interval(Duration::from_millis(200));
    loop {
        ticker.tick().await;
        for id in &bots {
            let heading = rng.next_range(0.0, std::f32::consts::TAU);
            let command = if rng.next_f32() < 0.3 {
                ClientCommand::Fire { heading }
            } else {
                ClientCommand::Move(MoveCommand {
                    direction: Some([heading.cos(), heading.sin()]),
                    heading: Some(heading),
                    target: None,
                })
            };
            if !handle
                .send(RoomCommand::Client {
                    from: *id,
                    command,
                })
                .await
            {
                return;
            }
        }
    }
}
