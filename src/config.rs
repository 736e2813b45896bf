use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use tokio::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KernelConfig {
    pub http: Option<HttpConf>,
    /// Tick du reconciler en millisecondes (borné à 1000ms max)
    pub reconcile_interval_ms: Option<u64>,
    /// Durée de toast par défaut quand la requête n'en donne pas
    pub default_toast_seconds: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpConf {
    pub host: String,
    pub port: u16,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            http: Some(HttpConf { host: "0.0.0.0".into(), port: 8000 }),
            reconcile_interval_ms: Some(200),
            default_toast_seconds: Some(5),
        }
    }
}

impl KernelConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        let (host, port) = match &self.http {
            Some(h) => (h.host.as_str(), h.port),
            None => ("0.0.0.0", 8000),
        };
        let ip: IpAddr = host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        SocketAddr::new(ip, port)
    }

    /// L'auto-expiration doit rester dans la granularité d'une seconde
    pub fn reconcile_interval_ms(&self) -> u64 {
        self.reconcile_interval_ms.unwrap_or(200).clamp(1, 1000)
    }

    pub fn default_toast_seconds(&self) -> i64 {
        self.default_toast_seconds.unwrap_or(5)
    }
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("TOASTER_KERNEL_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        if txt.trim().is_empty() {
            return KernelConfig::default();
        }
        serde_yaml::from_str(&txt).unwrap_or_else(|e| {
            eprintln!("[kernel] config invalide: {e}");
            KernelConfig::default()
        })
    } else {
        eprintln!("[kernel] pas de kernel.yaml, usage config par défaut");
        KernelConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = KernelConfig::default();
        assert_eq!(cfg.bind_addr().port(), 8000);
        assert_eq!(cfg.reconcile_interval_ms(), 200);
        assert_eq!(cfg.default_toast_seconds(), 5);
    }

    #[test]
    fn reconcile_interval_is_clamped_to_one_second() {
        let cfg = KernelConfig {
            reconcile_interval_ms: Some(5000),
            ..KernelConfig::default()
        };
        assert_eq!(cfg.reconcile_interval_ms(), 1000);
    }
}
