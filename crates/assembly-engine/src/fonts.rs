//! Font resolution for text scenes and captions.

use std::path::PathBuf;

use shortreel_common::config::FontConfig;

use crate::ffmpeg::quote_filter_value;

/// Font handed to `drawtext`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FontChoice {
    /// A font file on disk.
    File(PathBuf),
    /// A fontconfig family name, resolved by ffmpeg.
    Family(String),
}

impl FontChoice {
    /// The `drawtext` option selecting this font.
    pub fn drawtext_option(&self) -> String {
        match self {
            Self::File(path) => format!("fontfile={}", quote_filter_value(&path.to_string_lossy())),
            Self::Family(family) => format!("font={}", quote_filter_value(family)),
        }
    }
}

/// Outcome of font resolution.
#[derive(Debug, Clone)]
pub struct ResolvedFont {
    pub choice: FontChoice,
    /// Set when the preferred font was configured but could not be used.
    pub warning: Option<String>,
}

/// Pick the preferred font if it exists, then the first existing fallback
/// file, then the fallback family. Never fails.
pub fn resolve_font(config: &FontConfig) -> ResolvedFont {
    let mut warning = None;
    if let Some(preferred) = &config.preferred {
        if preferred.is_file() {
            return ResolvedFont {
                choice: FontChoice::File(preferred.clone()),
                warning: None,
            };
        }
        warning = Some(format!(
            "preferred font {} not found; using a fallback font",
            preferred.display()
        ));
    }

    let choice = config
        .fallbacks
        .iter()
        .find(|p| p.is_file())
        .map(|p| FontChoice::File(p.clone()))
        .unwrap_or_else(|| FontChoice::Family(config.fallback_family.clone()));

    if let Some(msg) = &warning {
        tracing::warn!(font = ?choice, "{msg}");
    }
    ResolvedFont { choice, warning }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existing_preferred_font_wins() {
        let dir = tempfile::tempdir().unwrap();
        let font = dir.path().join("Brand.ttf");
        std::fs::write(&font, b"ttf").unwrap();
        let config = FontConfig {
            preferred: Some(font.clone()),
            fallbacks: vec![],
            fallback_family: "Sans".to_string(),
        };
        let resolved = resolve_font(&config);
        assert_eq!(resolved.choice, FontChoice::File(font));
        assert!(resolved.warning.is_none());
    }

    #[test]
    fn test_missing_preferred_font_falls_back_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = dir.path().join("Fallback.ttf");
        std::fs::write(&fallback, b"ttf").unwrap();
        let config = FontConfig {
            preferred: Some(dir.path().join("Missing.ttf")),
            fallbacks: vec![dir.path().join("AlsoMissing.ttf"), fallback.clone()],
            fallback_family: "Sans".to_string(),
        };
        let resolved = resolve_font(&config);
        assert_eq!(resolved.choice, FontChoice::File(fallback));
        assert!(resolved.warning.unwrap().contains("Missing.ttf"));
    }

    #[test]
    fn test_family_is_last_resort() {
        let config = FontConfig {
            preferred: None,
            fallbacks: vec![PathBuf::from("/definitely/not/here.ttf")],
            fallback_family: "Sans".to_string(),
        };
        let resolved = resolve_font(&config);
        assert_eq!(resolved.choice, FontChoice::Family("Sans".to_string()));
        assert_eq!(resolved.choice.drawtext_option(), "font='Sans'");
        assert!(resolved.warning.is_none());
    }
}
