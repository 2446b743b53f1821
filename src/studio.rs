//! Studio option state as one immutable value.
//!
//! Every setter returns a new `StudioOptions`; the value is handed by copy to
//! whatever needs it (the live session setup, request builders).

use crate::error::{LiveError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Aspect ratios the studio accepts.
pub const ASPECT_RATIOS: &[&str] = &["1:1", "2:3", "3:2", "3:4", "4:3", "9:16", "16:9", "21:9", "4:5"];

/// Upper bound on images per generation request.
pub const MAX_IMAGE_COUNT: u8 = 8;

/// Production strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowMode {
    /// Character-focused
    #[default]
    Creator,
    /// Product-focused
    Ads,
}

impl fmt::Display for WorkflowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowMode::Creator => write!(f, "CREATOR"),
            WorkflowMode::Ads => write!(f, "ADS"),
        }
    }
}

impl std::str::FromStr for WorkflowMode {
    type Err = LiveError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "creator" => Ok(WorkflowMode::Creator),
            "ads" => Ok(WorkflowMode::Ads),
            other => Err(LiveError::ConfigInvalidValue {
                key: "workflow".to_string(),
                message: format!("unknown workflow '{}' (expected creator or ads)", other),
            }),
        }
    }
}

/// Identity locks keep a reference subject fixed across generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locks {
    pub character: bool,
    pub product: bool,
}

/// Similarity to the reference images, each 0–100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Similarity {
    pub character: u8,
    pub product: u8,
    pub background: u8,
}

/// The option set a studio user has selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudioOptions {
    workflow: WorkflowMode,
    style: String,
    aspect_ratio: &'static str,
    image_count: u8,
    locks: Locks,
    similarity: Similarity,
}

impl Default for StudioOptions {
    fn default() -> Self {
        Self {
            workflow: WorkflowMode::Creator,
            style: "REALISTIC".to_string(),
            aspect_ratio: "1:1",
            image_count: 1,
            locks: Locks {
                character: true,
                product: true,
            },
            similarity: Similarity {
                character: 100,
                product: 100,
                background: 50,
            },
        }
    }
}

impl StudioOptions {
    pub fn workflow(&self) -> WorkflowMode {
        self.workflow
    }

    pub fn style(&self) -> &str {
        &self.style
    }

    pub fn aspect_ratio(&self) -> &'static str {
        self.aspect_ratio
    }

    pub fn image_count(&self) -> u8 {
        self.image_count
    }

    pub fn locks(&self) -> Locks {
        self.locks
    }

    pub fn similarity(&self) -> Similarity {
        self.similarity
    }

    pub fn with_workflow(self, workflow: WorkflowMode) -> Self {
        Self { workflow, ..self }
    }

    /// Art style label, stored upper-cased.
    pub fn with_style(self, style: &str) -> Result<Self> {
        let style = style.trim();
        if style.is_empty() {
            return Err(LiveError::ConfigInvalidValue {
                key: "style".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(Self {
            style: style.to_ascii_uppercase(),
            ..self
        })
    }

    pub fn with_aspect_ratio(self, ratio: &str) -> Result<Self> {
        let aspect_ratio = ASPECT_RATIOS
            .iter()
            .copied()
            .find(|r| *r == ratio.trim())
            .ok_or_else(|| LiveError::ConfigInvalidValue {
                key: "aspect_ratio".to_string(),
                message: format!("'{}' is not one of {}", ratio, ASPECT_RATIOS.join(", ")),
            })?;
        Ok(Self {
            aspect_ratio,
            ..self
        })
    }

    pub fn with_image_count(self, image_count: u8) -> Result<Self> {
        if !(1..=MAX_IMAGE_COUNT).contains(&image_count) {
            return Err(LiveError::ConfigInvalidValue {
                key: "image_count".to_string(),
                message: format!("must be between 1 and {}", MAX_IMAGE_COUNT),
            });
        }
        Ok(Self {
            image_count,
            ..self
        })
    }

    pub fn with_locks(self, locks: Locks) -> Self {
        Self { locks, ..self }
    }

    pub fn with_similarity(self, similarity: Similarity) -> Result<Self> {
        for (key, value) in [
            ("character", similarity.character),
            ("product", similarity.product),
            ("background", similarity.background),
        ] {
            if value > 100 {
                return Err(LiveError::ConfigInvalidValue {
                    key: format!("similarity.{}", key),
                    message: format!("{} exceeds 100", value),
                });
            }
        }
        Ok(Self { similarity, ..self })
    }

    /// Persona the live director speaks as for these options.
    pub fn director_persona(&self) -> DirectorPersona {
        DirectorPersona {
            workflow: self.workflow,
            style: self.style.clone(),
        }
    }
}

/// Behavioral parameters of the live session's voice persona.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorPersona {
    pub workflow: WorkflowMode,
    pub style: String,
}

impl DirectorPersona {
    /// System instruction sent in the session setup.
    pub fn system_instruction(&self) -> String {
        format!(
            "You are the Production Director for LEVI AI. Active strategy: {}. Style lock: {}. \
             Character and product locks keep subjects consistent; background similarity sets \
             environment fidelity. Give concise, professional commercial guidance.",
            self.workflow, self.style
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = StudioOptions::default();
        assert_eq!(opts.workflow(), WorkflowMode::Creator);
        assert_eq!(opts.style(), "REALISTIC");
        assert_eq!(opts.aspect_ratio(), "1:1");
        assert_eq!(opts.image_count(), 1);
        assert!(opts.locks().character && opts.locks().product);
        assert_eq!(opts.similarity().background, 50);
    }

    #[test]
    fn test_setters_return_new_values() {
        let base = StudioOptions::default();
        let ads = base.clone().with_workflow(WorkflowMode::Ads);
        assert_eq!(base.workflow(), WorkflowMode::Creator);
        assert_eq!(ads.workflow(), WorkflowMode::Ads);
    }

    #[test]
    fn test_style_is_uppercased_and_validated() {
        let opts = StudioOptions::default().with_style(" anime ").unwrap();
        assert_eq!(opts.style(), "ANIME");
        assert!(StudioOptions::default().with_style("   ").is_err());
    }

    #[test]
    fn test_aspect_ratio_validation() {
        let opts = StudioOptions::default().with_aspect_ratio("9:16").unwrap();
        assert_eq!(opts.aspect_ratio(), "9:16");

        let err = StudioOptions::default().with_aspect_ratio("5:7").unwrap_err();
        assert!(err.to_string().contains("aspect_ratio"));
    }

    #[test]
    fn test_image_count_bounds() {
        assert!(StudioOptions::default().with_image_count(0).is_err());
        assert!(StudioOptions::default().with_image_count(9).is_err());
        assert_eq!(
            StudioOptions::default().with_image_count(8).unwrap().image_count(),
            8
        );
    }

    #[test]
    fn test_similarity_bounds() {
        let ok = Similarity {
            character: 100,
            product: 0,
            background: 75,
        };
        assert_eq!(
            StudioOptions::default().with_similarity(ok).unwrap().similarity(),
            ok
        );

        let bad = Similarity {
            character: 100,
            product: 101,
            background: 0,
        };
        let err = StudioOptions::default().with_similarity(bad).unwrap_err();
        assert!(err.to_string().contains("similarity.product"));
    }

    #[test]
    fn test_locks_setter() {
        let locks = Locks {
            character: false,
            product: true,
        };
        assert_eq!(StudioOptions::default().with_locks(locks).locks(), locks);
    }

    #[test]
    fn test_workflow_parse() {
        assert_eq!("ADS".parse::<WorkflowMode>().unwrap(), WorkflowMode::Ads);
        assert_eq!(
            "creator".parse::<WorkflowMode>().unwrap(),
            WorkflowMode::Creator
        );
        assert!("video".parse::<WorkflowMode>().is_err());
    }

    #[test]
    fn test_persona_instruction_names_workflow_and_style() {
        let persona = StudioOptions::default()
            .with_workflow(WorkflowMode::Ads)
            .with_style("chibi")
            .unwrap()
            .director_persona();
        let text = persona.system_instruction();
        assert!(text.contains("ADS"));
        assert!(text.contains("CHIBI"));
    }
}
