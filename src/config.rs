use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::calculator::{
    GradeBand, GradeCalculator, GradeScale, Renormalize, Weights, DEFAULT_TOLERANCE,
};
use crate::error::ConfigError;
use crate::models::Grade;
use crate::normalizer::{NormalizerSettings, ScoreNormalizer};
use crate::stats::IMPROVEMENT_GRADES;

pub const ENV_CONFIG_PATH: &str = "GRADEBOOK_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/gradebook.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalePreset {
    #[default]
    TwelveBand,
    FiveBand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenormalizeSetting {
    Always,
    Never,
    #[default]
    WhenOff,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GradingConfig {
    pub scale: ScalePreset,
    /// Custom bands; when present they replace the preset.
    pub bands: Option<Vec<GradeBand>>,
    pub renormalize: RenormalizeSetting,
    pub tolerance: f64,
    pub improvement_grades: Vec<Grade>,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            scale: ScalePreset::default(),
            bands: None,
            renormalize: RenormalizeSetting::default(),
            tolerance: DEFAULT_TOLERANCE,
            improvement_grades: IMPROVEMENT_GRADES.to_vec(),
        }
    }
}

impl GradingConfig {
    pub fn grade_scale(&self) -> Result<GradeScale, ConfigError> {
        match &self.bands {
            Some(bands) => GradeScale::new(bands.clone()),
            None => Ok(match self.scale {
                ScalePreset::TwelveBand => GradeScale::twelve_band(),
                ScalePreset::FiveBand => GradeScale::five_band(),
            }),
        }
    }

    pub fn renormalize(&self) -> Renormalize {
        match self.renormalize {
            RenormalizeSetting::Always => Renormalize::Always,
            RenormalizeSetting::Never => Renormalize::Never,
            RenormalizeSetting::WhenOff => Renormalize::WhenOff {
                tolerance: self.tolerance,
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub weights: Weights,
    pub grading: GradingConfig,
    pub normalizer: NormalizerSettings,
}

impl Config {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content, path)
    }

    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.weights.validate()?;
        config.grading.grade_scale()?;
        Ok(config)
    }

    /// Load configuration in order of precedence:
    /// 1) explicit path (must exist)
    /// 2) $GRADEBOOK_CONFIG (must exist when set)
    /// 3) config/gradebook.toml when present
    /// 4) built-in defaults
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var(ENV_CONFIG_PATH).ok().map(PathBuf::from);
        Self::resolve_from(explicit, from_env, Path::new(DEFAULT_CONFIG_PATH))
    }

    fn resolve_from(
        explicit: Option<&Path>,
        from_env: Option<PathBuf>,
        fallback: &Path,
    ) -> Result<Self, ConfigError> {
        if let Some(path) = explicit.map(Path::to_path_buf).or(from_env) {
            if !path.exists() {
                return Err(ConfigError::Missing(path));
            }
            debug!(path = %path.display(), "loading config");
            return Self::from_path(&path);
        }
        if fallback.exists() {
            debug!(path = %fallback.display(), "loading default config file");
            return Self::from_path(fallback);
        }
        Ok(Self::default())
    }

    pub fn calculator(&self) -> Result<GradeCalculator, ConfigError> {
        Ok(GradeCalculator::new(self.weights, self.grading.grade_scale()?)?
            .with_renormalize(self.grading.renormalize()))
    }

    pub fn normalizer(&self) -> ScoreNormalizer {
        ScoreNormalizer::new(self.normalizer.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::AcademicScaleSetting;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml("", Path::new("inline.toml")).unwrap();
        assert_eq!(config.weights, Weights::default());
        assert_eq!(config.grading.scale, ScalePreset::TwelveBand);
        assert_eq!(config.normalizer.default_score, 70.0);
        assert_eq!(config.grading.improvement_grades, IMPROVEMENT_GRADES.to_vec());
    }

    #[test]
    fn parses_all_sections() {
        let toml = r#"
[weights]
academic = 0.6
cocurricular = 0.2

[grading]
scale = "five_band"
renormalize = "never"
improvement_grades = ["D", "F"]

[normalizer]
behavior_fallback = 75.0
academic_scale = "ten_point"

[normalizer.activity_scores]
ROBOTICS = 91.0
"#;
        let config = Config::from_toml(toml, Path::new("inline.toml")).unwrap();
        assert_eq!(config.weights.academic, 0.6);
        assert_eq!(config.weights.discipline, 0.2);
        assert_eq!(config.grading.renormalize(), Renormalize::Never);
        assert_eq!(config.grading.improvement_grades, vec![Grade::D, Grade::F]);
        assert_eq!(config.normalizer.academic_scale, AcademicScaleSetting::TenPoint);

        let calc = config.calculator().unwrap();
        assert_eq!(calc.scale().bands().len(), 5);
        assert_eq!(config.normalizer().activity_score("robotics"), 91.0);
        assert_eq!(config.normalizer().behavior_score("??"), 75.0);
    }

    #[test]
    fn custom_bands_replace_preset() {
        let toml = r#"
[grading]
bands = [
  { threshold = 50.0, grade = "A" },
  { threshold = 0.0, grade = "F" },
]
"#;
        let config = Config::from_toml(toml, Path::new("inline.toml")).unwrap();
        let calc = config.calculator().unwrap();
        assert_eq!(calc.score_to_grade(50.0), Grade::A);
        assert_eq!(calc.score_to_grade(49.9), Grade::F);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let bad_weight = "[weights]\nacademic = -1.0\n";
        assert!(matches!(
            Config::from_toml(bad_weight, Path::new("w.toml")),
            Err(ConfigError::InvalidWeight { .. })
        ));
        let bad_scale = "[grading]\nbands = [{ threshold = 40.0, grade = \"A\" }]\n";
        assert!(matches!(
            Config::from_toml(bad_scale, Path::new("s.toml")),
            Err(ConfigError::InvalidScale(_))
        ));
        assert!(matches!(
            Config::from_toml("weights = 3", Path::new("p.toml")),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn resolution_prefers_explicit_then_env_then_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = dir.path().join("explicit.toml");
        let env = dir.path().join("env.toml");
        let fallback = dir.path().join("fallback.toml");
        fs::write(&explicit, "[weights]\nacademic = 0.7\ncocurricular = 0.2\ndiscipline = 0.1\n").unwrap();
        fs::write(&env, "[grading]\nscale = \"five_band\"\n").unwrap();
        fs::write(&fallback, "[normalizer]\ndefault_score = 60.0\n").unwrap();

        let c = Config::resolve_from(Some(&explicit), Some(env.clone()), &fallback).unwrap();
        assert_eq!(c.weights.academic, 0.7);

        let c = Config::resolve_from(None, Some(env), &fallback).unwrap();
        assert_eq!(c.grading.scale, ScalePreset::FiveBand);

        let c = Config::resolve_from(None, None, &fallback).unwrap();
        assert_eq!(c.normalizer.default_score, 60.0);

        let c = Config::resolve_from(None, None, &dir.path().join("absent.toml")).unwrap();
        assert_eq!(c.weights, Weights::default());

        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            Config::resolve_from(Some(&missing), None, &fallback),
            Err(ConfigError::Missing(_))
        ));
    }
}
