/**
 * DEVICE REGISTRY - Registre des codes appareils et de leur revendication
 *
 * RÔLE : Suivi des appareils connus (code -> claimed/owner/last_seen).
 * Register crée ou rafraîchit l'entrée, Claim l'associe une seule fois à un
 * utilisateur. Aucune persistance : tout est en mémoire, perdu au restart.
 *
 * ARCHITECTURE : map partagée sous mutex, check-then-act atomique pour
 * éviter qu'un double claim sur le même code réussisse deux fois.
 */

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DeviceEntry {
    pub code: String,
    pub claimed: bool,
    pub owner: Option<String>,
    pub last_seen: OffsetDateTime,
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Device code must not be empty")]
    EmptyCode,
    #[error("Unknown device code: {0}")]
    NotFound(String),
    #[error("Device already claimed: {0}")]
    AlreadyClaimed(String),
}

pub type DevicesMap = HashMap<String, DeviceEntry>;

pub struct DeviceRegistry {
    devices: Mutex<DevicesMap>,
}

pub type SharedDevices = Arc<DeviceRegistry>;

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(HashMap::new()),
        }
    }

    /// Enregistre un appareil : crée l'entrée au premier appel (non revendiquée),
    /// rafraîchit last_seen ensuite. Ne touche jamais au statut de claim.
    pub fn register(&self, code: &str) -> Result<DeviceEntry, DeviceError> {
        if code.trim().is_empty() {
            return Err(DeviceError::EmptyCode);
        }

        let now = OffsetDateTime::now_utc();
        let mut map = self.devices.lock();
        let entry = map.entry(code.to_string()).or_insert_with(|| {
            println!("[devices] registered device {}", code);
            DeviceEntry {
                code: code.to_string(),
                claimed: false,
                owner: None,
                last_seen: now,
            }
        });
        entry.last_seen = now;
        Ok(entry.clone())
    }

    /// Revendique un appareil enregistré. Une seule revendication par code,
    /// pas d'opération inverse. L'owner est un identifiant utilisateur
    /// fictif (uuid) tant qu'il n'y a pas de vrais comptes.
    pub fn claim(&self, code: &str) -> Result<DeviceEntry, DeviceError> {
        if code.trim().is_empty() {
            return Err(DeviceError::EmptyCode);
        }

        let mut map = self.devices.lock();
        let entry = map
            .get_mut(code)
            .ok_or_else(|| DeviceError::NotFound(code.to_string()))?;
        if entry.claimed {
            return Err(DeviceError::AlreadyClaimed(code.to_string()));
        }

        let user = Uuid::new_v4().to_string();
        entry.claimed = true;
        entry.owner = Some(user.clone());
        println!("[devices] device {} claimed by {}", code, user);
        Ok(entry.clone())
    }

    /// Snapshot complet du registre (debug/introspection).
    pub fn list(&self) -> Vec<DeviceEntry> {
        let map = self.devices.lock();
        let mut entries: Vec<DeviceEntry> = map.values().cloned().collect();
        entries.sort_by(|a, b| a.code.cmp(&b.code));
        entries
    }

    /// Compteurs (total, revendiqués) pour le health du kernel.
    pub fn counts(&self) -> (usize, usize) {
        let map = self.devices.lock();
        let claimed = map.values().filter(|d| d.claimed).count();
        (map.len(), claimed)
    }
}
