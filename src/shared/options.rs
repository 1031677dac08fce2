//! Zentrale Konfiguration fuer den TerraView Zeitkern.
//!
//! `EngineOptions` enthält alle zur Laufzeit änderbaren Werte.
//! Die `const`-Werte bleiben als Fallback/Default erhalten.

use serde::{Deserialize, Serialize};

// ── Zeitwechsel ─────────────────────────────────────────────────────

/// Standard-Timeout fuer die Listener-Bereitschaft beim Zeitwechsel (ms).
pub const LISTENER_READY_TIMEOUT_MS: u64 = 5_000;

// ── Animation ───────────────────────────────────────────────────────

/// Standard-Tickrate der Animation (ms).
pub const DEFAULT_CHANGE_RATE_MS: u64 = 1_000;
/// Kleinste akzeptierte Frame-Dauer aus persistierten Dokumenten (ms).
pub const MIN_MILLIS_PER_FRAME: u64 = 2;
/// Ersatzwert fuer unbrauchbare persistierte Frame-Dauern (ms).
pub const FALLBACK_MILLIS_PER_FRAME: u64 = 500;

/// Alle zur Laufzeit änderbaren Engine-Optionen.
/// Wird als `terraview_time_engine.toml` neben der Binary gespeichert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Timeout pro Phase beim dreiphasigen Zeitwechsel (ms)
    pub listener_ready_timeout_ms: u64,
    /// Tickrate neuer Animationen (ms)
    #[serde(default = "default_change_rate_ms")]
    pub change_rate_ms: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            listener_ready_timeout_ms: LISTENER_READY_TIMEOUT_MS,
            change_rate_ms: DEFAULT_CHANGE_RATE_MS,
        }
    }
}

/// Serde-Default fuer `change_rate_ms` (Abwärtskompatibilität bestehender TOML-Dateien).
fn default_change_rate_ms() -> u64 {
    DEFAULT_CHANGE_RATE_MS
}

impl EngineOptions {
    /// Lädt Optionen aus einer TOML-Datei. Bei Fehler: Standardwerte.
    pub fn load_from_file(path: &std::path::Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(opts) => {
                    log::info!("Optionen geladen aus: {}", path.display());
                    opts
                }
                Err(e) => {
                    log::warn!("Optionen-Datei fehlerhaft, verwende Standardwerte: {}", e);
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("Keine Optionen-Datei gefunden, verwende Standardwerte");
                Self::default()
            }
        }
    }

    /// Speichert Optionen als TOML-Datei.
    pub fn save_to_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        log::info!("Optionen gespeichert nach: {}", path.display());
        Ok(())
    }

    /// Ermittelt den Pfad zur Optionen-Datei neben der Binary.
    pub fn config_path() -> std::path::PathBuf {
        std::env::current_exe()
            .unwrap_or_else(|_| std::path::PathBuf::from("terraview_time_engine"))
            .parent()
            .unwrap_or_else(|| std::path::Path::new("."))
            .join("terraview_time_engine.toml")
    }

    /// Timeout pro Phase als `std::time::Duration`.
    pub fn listener_ready_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.listener_ready_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let options = EngineOptions::default();
        assert_eq!(options.listener_ready_timeout_ms, LISTENER_READY_TIMEOUT_MS);
        assert_eq!(options.change_rate_ms, DEFAULT_CHANGE_RATE_MS);
    }

    #[test]
    fn test_missing_change_rate_falls_back() {
        let options: EngineOptions =
            toml::from_str("listener_ready_timeout_ms = 250").expect("TOML gültig");
        assert_eq!(options.listener_ready_timeout_ms, 250);
        assert_eq!(options.change_rate_ms, DEFAULT_CHANGE_RATE_MS);
    }
}
