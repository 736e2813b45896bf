/**
 * RECONCILER - Boucle de fond d'expiration du grille-pain
 *
 * RÔLE : Garantit que le chauffage se coupe à l'échéance même si personne
 * n'interroge le status. Sans elle, gpio_on resterait actif indéfiniment
 * faute de query. Tick par défaut : 200ms (tout intervalle <= 1s convient).
 *
 * Le mutex est pris uniquement le temps du check en mémoire, jamais
 * pendant le tick lui-même. Arrêt propre via le canal watch du kernel.
 */

use crate::toaster::SharedToaster;
use std::time::Duration;
use tokio::sync::watch;

pub fn spawn_reconciler(
    toaster: SharedToaster,
    interval_ms: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    println!("[reconciler] starting expiry loop (every {}ms)", interval_ms);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    toaster.expire_if_due();
                }
                _ = shutdown.changed() => {
                    println!("[reconciler] shutdown signal received, stopping");
                    break;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toaster::{ToasterMachine, ToasterStatus};
    use std::sync::Arc;
    use time::OffsetDateTime;

    #[tokio::test]
    async fn reconciler_expires_without_any_query() {
        let toaster = Arc::new(ToasterMachine::new());
        // session démarrée dans le passé, déjà échue
        let past = OffsetDateTime::now_utc() - time::Duration::seconds(3);
        toaster.start_at(1, past).unwrap();

        let (_tx, rx) = watch::channel(false);
        spawn_reconciler(toaster.clone(), 10, rx);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let snap = toaster.query();
        assert_eq!(snap.status, ToasterStatus::Idle);
        assert_eq!(snap.remaining, 0);
        assert!(!snap.gpio_on);
    }

    #[tokio::test]
    async fn reconciler_stops_on_shutdown_signal() {
        let toaster = Arc::new(ToasterMachine::new());
        let (tx, rx) = watch::channel(false);
        spawn_reconciler(toaster.clone(), 10, rx);

        tx.send(true).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // la boucle est arrêtée : une session échue reste visible jusqu'à
        // ce qu'un query fasse le check paresseux
        let past = OffsetDateTime::now_utc() - time::Duration::seconds(3);
        toaster.start_at(1, past).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(toaster.expire_if_due());
    }
}
