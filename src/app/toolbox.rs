//! Verdrahtung der Kern-Komponenten.
//!
//! Kein prozessweiter Singleton: die Toolbox ist ein schlichter Struct
//! aus eigenen bzw. geteilten Handles, der per Konstruktor weitergereicht
//! wird.

use crate::core::{AnimationManager, TimeManager};
use crate::shared::EngineOptions;
use std::sync::Arc;

pub struct Toolbox {
    pub options: EngineOptions,
    pub time_manager: Arc<TimeManager>,
    pub animation_manager: Arc<AnimationManager>,
}

impl Toolbox {
    /// Baut beide Manager auf und verbindet sie. Der AnimationManager
    /// abonniert dabei die Primär-Änderungen des TimeManager.
    pub fn new(options: EngineOptions) -> Self {
        let time_manager = Arc::new(TimeManager::new());
        let animation_manager =
            AnimationManager::new(Arc::clone(&time_manager), options.clone());
        Self {
            options,
            time_manager,
            animation_manager,
        }
    }

    /// Baut die Toolbox mit Optionen aus der Standard-Konfigurationsdatei.
    pub fn from_config_file() -> Self {
        Self::new(EngineOptions::load_from_file(&EngineOptions::config_path()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toolbox_wires_managers() {
        let toolbox = Toolbox::new(EngineOptions::default());
        assert!(!toolbox.animation_manager.is_plan_established());
        assert_eq!(
            toolbox.time_manager.primary_active_time_spans().len(),
            1,
            "Primaere Liste startet als Singleton ZERO"
        );
    }
}
