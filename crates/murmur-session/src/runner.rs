//! Wall-clock driver
//!
//! Owns the session inside a tokio task and connects it to its bus
//! subscription: pull deliveries and tick, then publish. All session logic
//! stays synchronous; this is the only async surface.

use murmur_channel::BusSubscription;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use crate::Session;

/// Run `session` against `subscription` until `shutdown` turns true or its
/// sender goes away. Returns the stopped session for inspection.
pub async fn drive(
    mut session: Session,
    subscription: BusSubscription,
    mut shutdown: watch::Receiver<bool>,
) -> Session {
    session.start();
    flush(&mut session, &subscription);

    let mut interval = time::interval(session.config().tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = Instant::now();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let elapsed = last.elapsed();
                last = Instant::now();

                for delivery in subscription.deliveries_from(session.cursor()) {
                    session.queue_delivery(delivery);
                }
                session.tick(elapsed);
                flush(&mut session, &subscription);
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    session.stop();
    flush(&mut session, &subscription);
    debug!("runner for {} finished", session.identity().peer);
    session
}

fn flush(session: &mut Session, subscription: &BusSubscription) {
    while let Some(bytes) = session.pop_outbound() {
        subscription.publish(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Identity, SessionConfig};
    use murmur_channel::LocalBus;
    use murmur_core::Timestamp;
    use std::time::Duration;

    fn config() -> SessionConfig {
        SessionConfig {
            clock_start: Some(Timestamp::from_millis(1_000)),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_driven_sessions_learn_each_other() {
        let bus = LocalBus::new();
        let config = config();
        let id_a = Identity::from_seed(1);
        let id_b = Identity::from_seed(2);

        let sub_a = bus.subscribe(&config.topic, id_a.peer);
        let sub_b = bus.subscribe(&config.topic, id_b.peer);
        let a = Session::with_identity(id_a.clone(), config.clone());
        let b = Session::with_identity(id_b.clone(), config.clone());

        let (tx, rx) = watch::channel(false);
        let task_a = tokio::spawn(drive(a, sub_a, rx.clone()));
        let task_b = tokio::spawn(drive(b, sub_b, rx));

        time::sleep(Duration::from_secs(2)).await;
        tx.send(true).unwrap();

        let a = task_a.await.unwrap();
        let b = task_b.await.unwrap();
        assert!(a.peers().iter().any(|p| p.id == id_b.peer));
        assert!(b.peers().iter().any(|p| p.id == id_a.peer));
        assert!(!a.is_running());
        assert!(!b.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_sync_carries_state_to_late_reader() {
        let bus = LocalBus::new();
        let config = config();
        let id_a = Identity::from_seed(1);

        let sub_a = bus.subscribe(&config.topic, id_a.peer);
        let mut a = Session::with_identity(id_a.clone(), config.clone());
        let message_id = a.send_message("written before anyone listened", None);

        let (tx, rx) = watch::channel(false);
        let task_a = tokio::spawn(drive(a, sub_a, rx));

        // Let a publish its join and message add with nobody listening;
        // only the periodic sync can carry the message from here.
        time::sleep(Duration::from_millis(10)).await;

        let id_c = Identity::from_seed(3);
        let sub_c = bus.subscribe(&config.topic, id_c.peer);
        let mut c = Session::with_identity(id_c, config.clone());
        c.start();

        // Enough virtual time for at least one full-sync round
        for _ in 0..70 {
            time::sleep(Duration::from_millis(100)).await;
            for delivery in sub_c.deliveries_from(c.cursor()) {
                c.queue_delivery(delivery);
            }
            c.tick(Duration::from_millis(100));
            while let Some(bytes) = c.pop_outbound() {
                sub_c.publish(bytes);
            }
        }

        tx.send(true).unwrap();
        let _ = task_a.await.unwrap();

        let ids: Vec<_> = c.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![message_id.unwrap()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runner_exits_when_shutdown_sender_drops() {
        let bus = LocalBus::new();
        let config = config();
        let identity = Identity::from_seed(1);

        let sub = bus.subscribe(&config.topic, identity.peer);
        let session = Session::with_identity(identity, config);

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(drive(session, sub, rx));
        drop(tx);

        let session = task.await.unwrap();
        assert!(!session.is_running());
    }
}
