//! UDP game loop: one non-blocking socket driving a `ServerCore` until the
//! game is over or shutdown is requested.

use std::io;
use std::sync::Arc;

use anyhow::Context;
use log::{debug, info, warn};
use tilegram_core::{
    Dictionary, Game, OutboundAction, ServerControl, ServerCore, Status, WordCheck,
};
use tokio::net::UdpSocket;
use tokio::time::Instant;

use crate::config::Settings;

/// Largest datagram accepted.
const MAX_DATAGRAM: usize = 65_507;

/// Serve one game. Returns [`Status::Done`] once every player has
/// acknowledged the result, or [`Status::Aborted`] after a shutdown request.
pub async fn run(
    settings: &Settings,
    dictionary: Arc<Dictionary>,
    control: &ServerControl,
) -> anyhow::Result<Status> {
    let socket = UdpSocket::bind(("0.0.0.0", settings.port))
        .await
        .with_context(|| format!("binding UDP port {}", settings.port))?;
    info!(
        "listening on port {} (bunch {}/{}, up to {} players)",
        settings.port, settings.multiplier.num, settings.multiplier.den, settings.player_limit
    );

    let game = Game::new(settings.multiplier, settings.player_limit);
    let words = move |w: &str| dictionary.check_word(w);
    let mut core = ServerCore::with_game(game, words, settings.timing);
    control.set_status(Status::Running);

    let mut buf = vec![0u8; MAX_DATAGRAM];
    let mut last = Instant::now();
    loop {
        let now = Instant::now();
        let elapsed = now - last;
        last = now;

        send_all(&socket, core.tick(elapsed)).await;

        if control.shutdown_requested() {
            send_all(&socket, core.shutdown()).await;
            control.set_status(Status::Aborted);
            return Ok(Status::Aborted);
        }
        if core.can_shutdown() {
            info!("game over, all players notified");
            control.set_status(Status::Done);
            return Ok(Status::Done);
        }

        match socket.try_recv_from(&mut buf) {
            Ok((n, from)) => {
                debug!("{} bytes from {}", n, from);
                let actions = core.on_datagram(from, &buf[..n]);
                send_all(&socket, actions).await;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                tokio::time::sleep(settings.idle_sleep).await;
            }
            Err(e) => warn!("receive failed: {}", e),
        }
    }
}

async fn send_all(socket: &UdpSocket, actions: Vec<OutboundAction>) {
    for OutboundAction::Send(to, bytes) in actions {
        if let Err(e) = socket.send_to(&bytes, to).await {
            warn!("send to {} failed: {}", to, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use tilegram_core::{Multiplier, Timing};

    fn settings() -> Settings {
        Settings {
            port: 0,
            dictionary: PathBuf::from("words.txt"),
            multiplier: Multiplier::FULL,
            player_limit: 8,
            timing: Timing::default(),
            idle_sleep: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn pending_shutdown_stops_next_game() {
        let control = ServerControl::new();
        control.request_shutdown();
        let dictionary = Arc::new(Dictionary::parse("AT"));
        let status = run(&settings(), dictionary, &control).await.unwrap();
        assert_eq!(status, Status::Aborted);
        assert!(control.shutdown_requested());
        assert_eq!(control.status(), Status::Aborted);
    }
}
