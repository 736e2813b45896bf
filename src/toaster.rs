/**
 * TOASTER STATE MACHINE - Cœur du kernel : états Idle/Toasting avec expiration
 *
 * RÔLE : Machine à états unique (process-wide) protégée par un seul mutex.
 * Transitions start/stop/query, calcul du temps restant, auto-expiration.
 *
 * FONCTIONNEMENT :
 * - start(d) : uniquement depuis Idle, sinon AlreadyToasting (pas de file d'attente)
 * - stop() : inconditionnel et idempotent, ramène toujours à Idle
 * - query() : lecture + vérification d'expiration paresseuse (même check que le reconciler)
 *
 * CONTRAT MATÉRIEL : le flag gpio_on est le signal pour la couche hardware.
 * Entrer en Toasting = chauffe, sortir (stop/expiration) = coupure.
 * Ce module ne pilote aucun GPIO lui-même.
 */

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToasterStatus {
    Idle,
    Toasting,
}

impl ToasterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToasterStatus::Idle => "idle",
            ToasterStatus::Toasting => "toasting",
        }
    }
}

/// État interne, toujours manipulé sous le mutex de ToasterMachine.
/// Invariant : status == Toasting <=> started_at et ends_at présents <=> gpio_on.
#[derive(Debug, Clone)]
struct ToasterState {
    status: ToasterStatus,
    gpio_on: bool,
    duration: u64,
    started_at: Option<OffsetDateTime>,
    ends_at: Option<OffsetDateTime>,
}

impl ToasterState {
    fn idle() -> Self {
        Self {
            status: ToasterStatus::Idle,
            gpio_on: false,
            duration: 0,
            started_at: None,
            ends_at: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToasterError {
    #[error("Already toasting")]
    AlreadyToasting,
}

/// Vue en lecture seule renvoyée par query()
#[derive(Debug, Clone, Serialize)]
pub struct ToasterSnapshot {
    pub status: ToasterStatus,
    pub gpio_on: bool,
    pub remaining: u64,
    pub duration: u64,
}

/// Machine à états du grille-pain. Une seule instance pour tout le process,
/// partagée via Arc ; le mutex est pris uniquement dans les méthodes de
/// transition, jamais au travers d'un await.
pub struct ToasterMachine {
    state: Mutex<ToasterState>,
}

pub type SharedToaster = Arc<ToasterMachine>;

impl ToasterMachine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ToasterState::idle()),
        }
    }

    /// Démarre une session de toast de `requested` secondes (négatif clampé à 0).
    /// Refuse avec AlreadyToasting si une session est déjà en cours.
    pub fn start(&self, requested: i64) -> Result<String, ToasterError> {
        self.start_at(requested, OffsetDateTime::now_utc())
    }

    pub(crate) fn start_at(
        &self,
        requested: i64,
        now: OffsetDateTime,
    ) -> Result<String, ToasterError> {
        let duration = requested.max(0) as u64;
        let mut st = self.state.lock();

        // check d'expiration paresseux : une session échue mais pas encore
        // vue par le reconciler ne doit pas bloquer un nouveau start
        expire_locked(&mut st, now);

        if st.status == ToasterStatus::Toasting {
            return Err(ToasterError::AlreadyToasting);
        }

        st.duration = duration;
        if duration == 0 {
            // start dégénéré : succès, mais on reste Idle (rien à chauffer)
            return Ok("Toasting started for 0 seconds".to_string());
        }

        st.started_at = Some(now);
        st.ends_at = Some(now + Duration::seconds(duration as i64));
        st.status = ToasterStatus::Toasting;
        st.gpio_on = true;
        println!("[toaster] gpio on, toasting for {}s", duration);

        Ok(format!("Toasting started for {} seconds", duration))
    }

    /// Arrêt inconditionnel et idempotent : ramène toujours à Idle.
    pub fn stop(&self) {
        let mut st = self.state.lock();
        if st.status == ToasterStatus::Toasting {
            println!("[toaster] gpio off (stopped)");
        }
        *st = ToasterState::idle();
    }

    /// Lecture de l'état courant, après le même check d'expiration que le
    /// reconciler : un status lu juste après l'échéance est exact même si
    /// la boucle de fond n'a pas encore tourné.
    pub fn query(&self) -> ToasterSnapshot {
        self.query_at(OffsetDateTime::now_utc())
    }

    pub(crate) fn query_at(&self, now: OffsetDateTime) -> ToasterSnapshot {
        let mut st = self.state.lock();
        expire_locked(&mut st, now);

        let remaining = match (st.status, st.ends_at) {
            (ToasterStatus::Toasting, Some(end)) => remaining_secs(end, now),
            _ => 0,
        };

        ToasterSnapshot {
            status: st.status,
            gpio_on: st.gpio_on,
            remaining,
            duration: st.duration,
        }
    }

    /// Check actif utilisé par le reconciler. Retourne true si une session
    /// échue vient d'être ramenée à Idle.
    pub fn expire_if_due(&self) -> bool {
        self.expire_if_due_at(OffsetDateTime::now_utc())
    }

    pub(crate) fn expire_if_due_at(&self, now: OffsetDateTime) -> bool {
        let mut st = self.state.lock();
        expire_locked(&mut st, now)
    }
}

/// Temps restant en secondes, arrondi, jamais négatif.
fn remaining_secs(end: OffsetDateTime, now: OffsetDateTime) -> u64 {
    let secs = (end - now).as_seconds_f64().round();
    if secs <= 0.0 {
        0
    } else {
        secs as u64
    }
}

/// Transition d'expiration partagée entre query() et le reconciler.
/// Exactement équivalente à stop() : Idle, duration 0, gpio off.
fn expire_locked(st: &mut ToasterState, now: OffsetDateTime) -> bool {
    if st.status != ToasterStatus::Toasting {
        return false;
    }
    let Some(end) = st.ends_at else { return false };
    if remaining_secs(end, now) > 0 {
        return false;
    }
    let elapsed = st
        .started_at
        .map(|start| (now - start).whole_seconds())
        .unwrap_or(0);
    println!("[toaster] gpio off (expired after {}s)", elapsed);
    *st = ToasterState::idle();
    true
}
