//! Running one virtual client from connect to close

use pushload_config::ClientConfig;
use pushload_interfaces::{Connector, PushTrigger, Transport, TransportError};
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::behavior::Behavior;
use crate::client::{Flow, ProtocolClient};
use crate::error::{ClientError, ClientResult};
use crate::metrics::{CloseReason, RunOutcome, RunResult};
use crate::watchdog::TimeoutWatchdog;

/// How long a client-side close may take before the socket is simply dropped
pub const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Connect, run `behavior` to completion and report how it went.
///
/// Never fails: connect errors and every later failure end up in the
/// returned [`RunResult`].
pub async fn run_virtual_client<C, P>(
    connector: &C,
    trigger: P,
    url: &str,
    behavior: Behavior,
    config: Arc<ClientConfig>,
    rng: StdRng,
) -> RunResult
where
    C: Connector,
    P: PushTrigger,
{
    let started = Instant::now();
    let transport = match connector.connect(url).await {
        Ok(transport) => transport,
        Err(error) => {
            warn!(%behavior, %error, "Connection failed");
            return RunResult::connect_failed(
                behavior,
                &ClientError::from(error),
                started.elapsed(),
            );
        }
    };

    let client = ProtocolClient::new(transport, trigger, behavior, config, rng);
    run_session(client).await
}

/// Drive an already connected client until it closes.
///
/// The connection loop races the client's [`TimeoutWatchdog`]; whichever
/// finishes first decides the close reason, and the loser is dropped along
/// with any timer or pending receive it held. Our own close gets
/// [`CLOSE_GRACE`]; a peer that stops reading cannot hold the client open.
pub async fn run_session<T, P>(mut client: ProtocolClient<T, P>) -> RunResult
where
    T: Transport,
    P: PushTrigger,
{
    let watchdog = TimeoutWatchdog::starting_at(
        client.metrics().connected_at(),
        client.config().timeout,
        client.config().idle_timeout,
    );

    let result = tokio::select! {
        biased;
        kind = watchdog.expired() => Ok(CloseReason::TimedOut(kind)),
        result = drive(&mut client, &watchdog) => result,
    };

    let peer_closed = matches!(result, Err(ClientError::Transport(TransportError::Closed)));
    if !peer_closed {
        match tokio::time::timeout(CLOSE_GRACE, client.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => debug!(%error, "Error closing connection"),
            Err(_) => debug!(
                grace_ms = CLOSE_GRACE.as_millis() as u64,
                "Close did not finish in time, dropping connection"
            ),
        }
    }

    let run = client.finish(result);
    match run.outcome {
        RunOutcome::Completed | RunOutcome::TimedOut => info!(
            uaid = run.uaid.as_deref().unwrap_or_default(),
            behavior = %run.behavior,
            outcome = %run.outcome,
            detail = %run.detail,
            "Client finished"
        ),
        RunOutcome::ProtocolError | RunOutcome::TransportError => warn!(
            uaid = run.uaid.as_deref().unwrap_or_default(),
            behavior = %run.behavior,
            outcome = %run.outcome,
            error = %run.detail,
            "Client failed"
        ),
    }
    run
}

async fn drive<T, P>(
    client: &mut ProtocolClient<T, P>,
    watchdog: &TimeoutWatchdog,
) -> ClientResult<CloseReason>
where
    T: Transport,
    P: PushTrigger,
{
    client.open().await?;
    loop {
        let text = match client.recv().await {
            Some(Ok(text)) => text,
            Some(Err(error)) => return Err(error.into()),
            None => return Err(TransportError::Closed.into()),
        };

        if let Flow::Close(reason) = client.on_message(&text, watchdog).await? {
            return Ok(reason);
        }
    }
}
