//! Aurora games terminal client: joins a shared session and plays it from stdin.

use std::{env, sync::Arc};

use anyhow::{Context, anyhow};
use aurora_games::{
    config::{AppConfig, StoreBackend},
    dao::document_store::{DocumentStore, memory::MemoryDocumentStore},
    error::ServiceError,
    services::game_client::{GameClient, JoinRequest},
    state::GameType,
};
use rand::{SeedableRng, rngs::StdRng};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HELP: &str = "commands: move <cell> | flip <card> | reset | show | quit (prefix with `opponent` in hot-seat mode)";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let me = env::var("AURORA_PLAYER").unwrap_or_else(|_| "player-one".into());
    let opponent = env::var("AURORA_OPPONENT").unwrap_or_else(|_| "player-two".into());
    let game_type = match env::var("AURORA_GAME") {
        Ok(name) => GameType::parse(&name).ok_or_else(|| anyhow!("unknown game `{name}`"))?,
        Err(_) => GameType::TicTacToe,
    };

    let (store, hot_seat) = connect_store(&config.store).await?;

    let player = GameClient::join(
        store.clone(),
        JoinRequest {
            game_type,
            me: me.clone(),
            opponent: opponent.clone(),
        },
        config.game.clone(),
        Box::new(StdRng::from_os_rng()),
    )
    .await
    .context("joining session")?;

    // With an in-process store the opponent can only be played from here.
    let rival = if hot_seat {
        let rival = GameClient::join(
            store,
            JoinRequest {
                game_type,
                me: opponent,
                opponent: me,
            },
            config.game.clone(),
            Box::new(StdRng::from_os_rng()),
        )
        .await
        .context("joining session as opponent")?;
        Some(rival)
    } else {
        None
    };

    spawn_renderer(&player);
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => line.context("reading stdin")?,
        };
        let Some(line) = line else {
            break;
        };

        let opponent_input = line
            .trim()
            .strip_prefix("opponent")
            .filter(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace));
        let (seat, input) = match opponent_input {
            Some(rest) => match rival.as_ref() {
                Some(rival) => (rival, rest.trim()),
                None => {
                    println!("no opponent seat on a shared store");
                    continue;
                }
            },
            None => (&player, line.trim()),
        };

        let action = match Action::parse(input) {
            Ok(action) => action,
            Err(message) => {
                println!("{message}\n{HELP}");
                continue;
            }
        };

        let outcome = match action {
            Action::Quit => break,
            Action::Show => {
                render(seat);
                continue;
            }
            Action::Move(cell) => seat.play_cell(cell).await,
            Action::Flip(card) => seat.flip_card(card).await,
            Action::Reset => seat.reset().await,
        };
        match outcome {
            Ok(_) | Err(ServiceError::Rejected(_)) => {}
            Err(err) => warn!(player = %seat.me(), error = %err, "action failed"),
        }
    }

    if let Some(rival) = rival {
        rival.leave().await.context("leaving session as opponent")?;
    }
    player.leave().await.context("leaving session")?;
    info!("bye");
    Ok(())
}

async fn connect_store(backend: &StoreBackend) -> anyhow::Result<(Arc<dyn DocumentStore>, bool)> {
    match backend {
        StoreBackend::Memory => {
            info!("using in-process store; hot-seat mode");
            Ok((Arc::new(MemoryDocumentStore::new()), true))
        }
        #[cfg(feature = "couch-store")]
        StoreBackend::CouchDb(couch) => {
            use aurora_games::{
                dao::document_store::couchdb::CouchDocumentStore,
                services::storage_supervisor::connect_with_backoff,
            };

            let store = connect_with_backoff(None, || CouchDocumentStore::connect(couch.clone()))
                .await
                .context("connecting to CouchDB")?;
            Ok((Arc::new(store), false))
        }
    }
}

/// Print the board every time the session changes.
fn spawn_renderer(client: &GameClient) {
    let mut updates = client.watch();
    let me = client.me().to_string();
    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let session = updates.borrow_and_update().clone();
            println!("\n{session}\n{me}: {}", session.seat_status(&me));
        }
    });
}

fn render(client: &GameClient) {
    let session = client.snapshot();
    println!(
        "\n{} ({})\n{session}\n{}: {}",
        client.session_id(),
        session.game_type(),
        client.me(),
        client.status_for_me()
    );
}

/// One line of player input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Move(usize),
    Flip(usize),
    Reset,
    Show,
    Quit,
}

impl Action {
    fn parse(input: &str) -> Result<Self, String> {
        let mut words = input.split_whitespace();
        let verb = words.next().unwrap_or_default();
        let argument = words.next();
        let index = || match argument {
            Some(value) => value
                .parse::<usize>()
                .map_err(|err| format!("bad index for `{verb}`: {err}")),
            None => Err(format!("`{verb}` needs an index")),
        };

        match verb {
            "move" | "m" => index().map(Action::Move),
            "flip" | "f" => index().map(Action::Flip),
            "reset" => Ok(Action::Reset),
            "show" | "" => Ok(Action::Show),
            "quit" | "exit" => Ok(Action::Quit),
            other => Err(format!("unknown command `{other}`")),
        }
    }
}

/// Configure tracing subscribers; logs go to stderr so they stay out of the board.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(Action::parse("move 4"), Ok(Action::Move(4)));
        assert_eq!(Action::parse("  flip   11 "), Ok(Action::Flip(11)));
        assert_eq!(Action::parse("reset"), Ok(Action::Reset));
        assert_eq!(Action::parse(""), Ok(Action::Show));
        assert_eq!(Action::parse("quit"), Ok(Action::Quit));
    }

    #[test]
    fn rejects_malformed_commands() {
        assert!(Action::parse("move").is_err());
        assert!(Action::parse("flip x").is_err());
        assert!(Action::parse("dance").is_err());
    }
}
