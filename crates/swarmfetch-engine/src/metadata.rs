//! Bounded wait for swarm metadata.

use std::time::Duration;

use swarmfetch_core::{SwarmSession, TransportError};
use tokio_util::sync::CancellationToken;

/// Result of racing metadata resolution against cancellation and the deadline.
#[derive(Debug)]
pub enum MetadataWait {
    /// Metadata is available; the session is ready for transfer.
    Resolved,
    /// The caller cancelled first.
    Cancelled,
    /// The deadline elapsed first.
    TimedOut,
    /// The transport failed while resolving metadata.
    Failed(TransportError),
}

/// Wait for the first of metadata resolution, cancellation, or `deadline`.
///
/// The session is left open in every case; the caller owns its closure.
pub async fn acquire(
    session: &mut dyn SwarmSession,
    cancel: &CancellationToken,
    deadline: Duration,
) -> MetadataWait {
    tokio::select! {
        biased;
        () = cancel.cancelled() => MetadataWait::Cancelled,
        result = session.await_metadata() => match result {
            Ok(()) => MetadataWait::Resolved,
            Err(err) => MetadataWait::Failed(err),
        },
        () = tokio::time::sleep(deadline) => MetadataWait::TimedOut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::scripted::{MetadataScript, ScriptedSession, SessionScript};

    fn session(metadata: MetadataScript) -> ScriptedSession {
        ScriptedSession::new(SessionScript {
            metadata,
            ..SessionScript::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_when_metadata_arrives_first() {
        let mut session = session(MetadataScript::After(Duration::from_secs(5)));
        let cancel = CancellationToken::new();
        let outcome = acquire(&mut session, &cancel, Duration::from_secs(120)).await;
        assert!(matches!(outcome, MetadataWait::Resolved));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_metadata_never_arrives() {
        let mut session = session(MetadataScript::Never);
        let started = tokio::time::Instant::now();
        let cancel = CancellationToken::new();
        let outcome = acquire(&mut session, &cancel, Duration::from_secs(120)).await;
        assert!(matches!(outcome, MetadataWait::TimedOut));
        assert!(started.elapsed() >= Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_preempts_the_wait() {
        let mut session = session(MetadataScript::Never);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });
        let started = tokio::time::Instant::now();
        let outcome = acquire(&mut session, &cancel, Duration::from_secs(120)).await;
        assert!(matches!(outcome, MetadataWait::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(120));
    }

    #[tokio::test]
    async fn transport_failure_is_reported() {
        let mut session = session(MetadataScript::Fail);
        let cancel = CancellationToken::new();
        let outcome = acquire(&mut session, &cancel, Duration::from_secs(1)).await;
        assert!(matches!(outcome, MetadataWait::Failed(_)));
    }
}
