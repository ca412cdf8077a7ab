use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::annotate::{AnnotatorConfig, DEFAULT_TEXT_SCALE, DEFAULT_THICKNESS};
use crate::category::{Category, CategoryTable, ClassId, DEFAULT_CATEGORY};
use crate::video::{VideoSettings, DEFAULT_FALLBACK_FPS, DEFAULT_MAX_INPUT_BYTES, DEFAULT_SEQUENCE_FPS};

const MAX_THICKNESS: u32 = 32;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TrackerConfigFile {
    detector: Option<DetectorConfigFile>,
    video: Option<VideoConfigFile>,
    annotation: Option<AnnotationConfigFile>,
    pipeline: Option<PipelineConfigFile>,
    categories: Option<CategoriesConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    backend: Option<String>,
    detections_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct VideoConfigFile {
    fallback_fps: Option<u32>,
    sequence_fps: Option<u32>,
    max_input_bytes: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AnnotationConfigFile {
    font_path: Option<PathBuf>,
    thickness: Option<u32>,
    text_scale: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PipelineConfigFile {
    frame_budget_ms: Option<u64>,
}

/// Label sets per category. Listed categories keep the fixed priority order
/// plastic, paper, metal, other.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CategoriesConfigFile {
    plastic: Option<Vec<ClassId>>,
    paper: Option<Vec<ClassId>>,
    metal: Option<Vec<ClassId>>,
    other: Option<Vec<ClassId>>,
    default: Option<Category>,
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Detector backend name. `None` lets the caller pick.
    pub backend: Option<String>,
    pub detections_path: Option<PathBuf>,
    pub video: VideoSettings,
    pub annotation: AnnotatorConfig,
    pub frame_budget: Option<Duration>,
    pub categories: CategoryTable,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            backend: None,
            detections_path: None,
            video: VideoSettings::default(),
            annotation: AnnotatorConfig::default(),
            frame_budget: None,
            categories: CategoryTable::default(),
        }
    }
}

impl TrackerConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("WASTE_TRACKER_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: TrackerConfigFile) -> Result<Self> {
        let detector = file.detector.unwrap_or_default();
        let video = file.video.unwrap_or_default();
        let annotation = file.annotation.unwrap_or_default();

        let categories = match file.categories {
            Some(categories) => categories_from_file(categories)?,
            None => CategoryTable::default(),
        };

        Ok(Self {
            backend: detector.backend,
            detections_path: detector.detections_path,
            video: VideoSettings {
                fallback_fps: video.fallback_fps.unwrap_or(DEFAULT_FALLBACK_FPS),
                sequence_fps: video.sequence_fps.unwrap_or(DEFAULT_SEQUENCE_FPS),
                max_input_bytes: video.max_input_bytes.unwrap_or(DEFAULT_MAX_INPUT_BYTES),
            },
            annotation: AnnotatorConfig {
                font_path: annotation.font_path,
                thickness: annotation.thickness.unwrap_or(DEFAULT_THICKNESS),
                text_scale: annotation.text_scale.unwrap_or(DEFAULT_TEXT_SCALE),
            },
            frame_budget: file
                .pipeline
                .and_then(|pipeline| pipeline.frame_budget_ms)
                .map(Duration::from_millis),
            categories,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(backend) = std::env::var("WASTE_TRACKER_BACKEND") {
            if !backend.trim().is_empty() {
                self.backend = Some(backend.trim().to_string());
            }
        }
        if let Ok(path) = std::env::var("WASTE_TRACKER_DETECTIONS") {
            if !path.trim().is_empty() {
                self.detections_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("WASTE_TRACKER_FONT") {
            if !path.trim().is_empty() {
                self.annotation.font_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(budget) = std::env::var("WASTE_TRACKER_FRAME_BUDGET_MS") {
            let millis: u64 = budget.parse().map_err(|_| {
                anyhow!("WASTE_TRACKER_FRAME_BUDGET_MS must be an integer number of milliseconds")
            })?;
            self.frame_budget = Some(Duration::from_millis(millis));
        }
        if let Ok(limit) = std::env::var("WASTE_TRACKER_MAX_INPUT_BYTES") {
            self.video.max_input_bytes = limit
                .parse()
                .map_err(|_| anyhow!("WASTE_TRACKER_MAX_INPUT_BYTES must be an integer"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if let Some(backend) = &self.backend {
            self.backend = Some(backend.to_lowercase());
        }
        if self.video.fallback_fps == 0 {
            return Err(anyhow!("video.fallback_fps must be greater than zero"));
        }
        if self.video.sequence_fps == 0 {
            return Err(anyhow!("video.sequence_fps must be greater than zero"));
        }
        if self.video.max_input_bytes == 0 {
            return Err(anyhow!("video.max_input_bytes must be greater than zero"));
        }
        if self.annotation.thickness == 0 || self.annotation.thickness > MAX_THICKNESS {
            return Err(anyhow!(
                "annotation.thickness must be between 1 and {}",
                MAX_THICKNESS
            ));
        }
        if !self.annotation.text_scale.is_finite() || self.annotation.text_scale <= 0.0 {
            return Err(anyhow!("annotation.text_scale must be a positive number"));
        }
        if self.frame_budget == Some(Duration::ZERO) {
            return Err(anyhow!("frame budget must be greater than zero"));
        }
        Ok(())
    }
}

fn categories_from_file(file: CategoriesConfigFile) -> Result<CategoryTable> {
    let entries = [
        (Category::Plastic, file.plastic),
        (Category::Paper, file.paper),
        (Category::Metal, file.metal),
        (Category::Other, file.other),
    ]
    .into_iter()
    .filter_map(|(category, labels)| labels.map(|labels| (category, labels)));
    CategoryTable::new(entries, file.default.unwrap_or(DEFAULT_CATEGORY))
        .map_err(|e| anyhow!("invalid [categories] table: {}", e))
}

fn read_config_file(path: &Path) -> Result<TrackerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
