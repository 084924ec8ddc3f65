use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use mathdef_core::mode::{CustomGameSettings, GameMode};
use mathdef_core::player::{ConnectionId, PlayerProfile};

use crate::collaborators::{Messenger, Persistence};
use crate::service::{RoomService, ServiceError};

/// Commands sent from connection handlers to the tick-loop task.
#[derive(Debug)]
pub enum ServiceCommand {
    JoinMode {
        profile: PlayerProfile,
        mode: GameMode,
        reply: oneshot::Sender<Result<String, ServiceError>>,
    },
    CreateCustomRoom {
        profile: PlayerProfile,
        mode: GameMode,
        custom: Box<CustomGameSettings>,
        reply: oneshot::Sender<Result<String, ServiceError>>,
    },
    JoinRoom {
        profile: PlayerProfile,
        room_id: String,
        as_spectator: bool,
        reply: oneshot::Sender<Result<(), ServiceError>>,
    },
    Keypress {
        connection_id: ConnectionId,
        code: String,
    },
    RequestStart {
        connection_id: ConnectionId,
    },
    Leave {
        connection_id: ConnectionId,
    },
    Stop,
}

/// Spawn the authoritative tick loop as a tokio task. All room mutation
/// happens inside it; everything else talks through the command channel.
pub fn spawn_driver<M, P>(
    mut service: RoomService<M, P>,
    tick_rate_hz: u32,
    mut commands: mpsc::UnboundedReceiver<ServiceCommand>,
) -> JoinHandle<()>
where
    M: Messenger + Send + 'static,
    P: Persistence + Send + 'static,
{
    tokio::spawn(async move {
        let dt = 1.0 / f64::from(tick_rate_hz);
        let mut interval = tokio::time::interval(Duration::from_secs_f64(dt));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    service.tick(dt);
                }
                cmd = commands.recv() => {
                    match cmd {
                        Some(ServiceCommand::JoinMode { profile, mode, reply }) => {
                            let _ = reply.send(service.join_mode(profile, mode));
                        },
                        Some(ServiceCommand::CreateCustomRoom { profile, mode, custom, reply }) => {
                            let _ = reply.send(service.create_custom_room(profile, mode, &custom));
                        },
                        Some(ServiceCommand::JoinRoom { profile, room_id, as_spectator, reply }) => {
                            let _ = reply.send(service.join_room(profile, &room_id, as_spectator));
                        },
                        Some(ServiceCommand::Keypress { connection_id, code }) => {
                            if let Err(e) = service.keypress(&connection_id, &code) {
                                tracing::debug!(connection_id, error = %e, "Dropped keypress");
                            }
                        },
                        Some(ServiceCommand::RequestStart { connection_id }) => {
                            if let Err(e) = service.request_start(&connection_id) {
                                tracing::debug!(connection_id, error = %e, "Dropped start request");
                            }
                        },
                        Some(ServiceCommand::Leave { connection_id }) => {
                            service.leave(&connection_id);
                        },
                        Some(ServiceCommand::Stop) | None => {
                            tracing::info!("Tick loop stopping");
                            break;
                        },
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{MemoryMessenger, MemoryPersistence};
    use crate::config::ServerConfig;
    use mathdef_core::test_helpers::make_profiles;

    fn spawn_test_driver() -> (mpsc::UnboundedSender<ServiceCommand>, JoinHandle<()>) {
        let service = RoomService::new(
            ServerConfig::default(),
            MemoryMessenger::default(),
            MemoryPersistence::default(),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_driver(service, 60, rx);
        (tx, handle)
    }

    #[tokio::test]
    async fn commands_round_trip_through_the_loop() {
        let (tx, handle) = spawn_test_driver();
        let profile = make_profiles(1).remove(0);
        let connection_id = profile.connection_id.clone();

        let (reply, rx) = oneshot::channel();
        tx.send(ServiceCommand::JoinMode {
            profile,
            mode: GameMode::DefaultMultiplayer,
            reply,
        })
        .unwrap();
        let room_id = rx.await.unwrap().expect("room created");
        assert_eq!(room_id.len(), 8);

        tx.send(ServiceCommand::Keypress {
            connection_id: connection_id.clone(),
            code: "Digit1".to_string(),
        })
        .unwrap();
        tx.send(ServiceCommand::Leave { connection_id }).unwrap();
        tx.send(ServiceCommand::Stop).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn closing_the_channel_stops_the_loop() {
        let (tx, handle) = spawn_test_driver();
        drop(tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn join_errors_come_back_on_the_reply_channel() {
        let (tx, handle) = spawn_test_driver();
        let (reply, rx) = oneshot::channel();
        tx.send(ServiceCommand::JoinRoom {
            profile: make_profiles(1).remove(0),
            room_id: "NOSUCHRM".to_string(),
            as_spectator: false,
            reply,
        })
        .unwrap();
        assert!(matches!(
            rx.await.unwrap(),
            Err(ServiceError::RoomNotFound(_))
        ));
        tx.send(ServiceCommand::Stop).unwrap();
        handle.await.unwrap();
    }
}
