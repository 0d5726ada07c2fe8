// =============================================================================
// CONFIG — Réglages du processeur
// =============================================================================
//
// Les réglages se lisent depuis du TOML ; toute clé absente prend sa valeur
// par défaut :
//
// ```toml
// path_separator = "."
// like_case_sensitive = false
// reuse_left_joins = true
// max_depth = 32
// distinct_count = true
// ```
//
// =============================================================================

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{LinkError, LinkResult};

/// Réglages du processeur.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Séparateur des segments de chemin
    #[serde(default = "default_path_separator")]
    pub path_separator: String,

    /// Sensibilité à la casse des filtres Like dérivés sans précision
    #[serde(default)]
    pub like_case_sensitive: bool,

    /// Réutilisation des JOINs LEFT sur un même attribut
    #[serde(default = "default_true")]
    pub reuse_left_joins: bool,

    /// Profondeur maximale de projections imbriquées
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Les comptages du dépôt comptent les racines distinctes
    #[serde(default = "default_true")]
    pub distinct_count: bool,
}

fn default_path_separator() -> String {
    ".".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_depth() -> usize {
    32
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            path_separator: default_path_separator(),
            like_case_sensitive: false,
            reuse_left_joins: true,
            max_depth: default_max_depth(),
            distinct_count: true,
        }
    }
}

impl ProcessorConfig {
    pub fn from_toml_str(content: &str) -> LinkResult<Self> {
        let config: ProcessorConfig = toml::from_str(content).map_err(|e| LinkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> LinkResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| LinkError::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> LinkResult<()> {
        if self.path_separator.is_empty() {
            return Err(LinkError::Config("path_separator ne peut pas être vide".into()));
        }
        if self.max_depth == 0 {
            return Err(LinkError::Config("max_depth doit être positif".into()));
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = ProcessorConfig::from_toml_str("").expect("config");
        assert_eq!(config, ProcessorConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let config = ProcessorConfig::from_toml_str("path_separator = \"/\"\nmax_depth = 4").expect("config");
        assert_eq!(config.path_separator, "/");
        assert_eq!(config.max_depth, 4);
        assert!(config.reuse_left_joins);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(ProcessorConfig::from_toml_str("path_separator = \"\"").is_err());
        assert!(ProcessorConfig::from_toml_str("max_depth = 0").is_err());
        assert!(ProcessorConfig::from_toml_str("max_depth = \"x\"").is_err());
    }
}
