use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LineageError;
use crate::text::DEFAULT_STOPWORDS;

/// Top-level configuration loaded from `.lineage.toml`.
///
/// Supports layered resolution: `--config` flag > local `.lineage.toml` > defaults.
///
/// # Examples
///
/// ```
/// use lineage_core::LineageConfig;
///
/// let config = LineageConfig::default();
/// assert_eq!(config.matcher.similarity_threshold, 0.6);
/// assert!(config.graph.enabled);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineageConfig {
    /// Line matcher settings.
    #[serde(default)]
    pub matcher: MatcherConfig,
    /// Evolution graph settings.
    #[serde(default)]
    pub graph: GraphConfig,
}

impl LineageConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`LineageError::Io`] if the file cannot be read,
    /// [`LineageError::Toml`] if the content is not valid TOML, or
    /// [`LineageError::Config`] if the values fail [`LineageConfig::validate`].
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use lineage_core::LineageConfig;
    /// use std::path::Path;
    ///
    /// let config = LineageConfig::from_file(Path::new(".lineage.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, LineageError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`LineageError::Toml`] if parsing fails or
    /// [`LineageError::Config`] if validation fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use lineage_core::LineageConfig;
    ///
    /// let toml = r#"
    /// [matcher]
    /// similarity_threshold = 0.75
    /// "#;
    /// let config = LineageConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.matcher.similarity_threshold, 0.75);
    /// assert_eq!(config.matcher.skip_lines.len(), 3);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, LineageError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every score the matcher can combine stays within `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`LineageError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<(), LineageError> {
        let threshold = self.matcher.similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(LineageError::Config(format!(
                "matcher.similarity_threshold must be within [0, 1], got {threshold}"
            )));
        }
        let weights = &self.matcher.weights;
        check_weights("comment_only", &weights.comment_only.values())?;
        check_weights("text_only", &weights.text_only.values())?;
        check_weights("structural", &weights.structural.values())?;
        Ok(())
    }
}

fn check_weights(name: &str, values: &[f64]) -> Result<(), LineageError> {
    if values.iter().any(|w| *w < 0.0) {
        return Err(LineageError::Config(format!(
            "matcher.weights.{name} contains a negative weight"
        )));
    }
    let sum: f64 = values.iter().sum();
    if (sum - 1.0).abs() > 1e-9 {
        return Err(LineageError::Config(format!(
            "matcher.weights.{name} must sum to 1, got {sum}"
        )));
    }
    Ok(())
}

/// Line matcher configuration.
///
/// # Examples
///
/// ```
/// use lineage_core::MatcherConfig;
///
/// let config = MatcherConfig::default();
/// assert!(config.skip_lines.iter().any(|l| l == "{"));
/// assert!(config.stopwords.iter().any(|w| w == "private"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Minimum combined score for an added line to become a candidate.
    #[serde(default = "default_threshold")]
    pub similarity_threshold: f64,
    /// Trimmed line texts that are never matched on either side.
    #[serde(default = "default_skip_lines")]
    pub skip_lines: Vec<String>,
    /// Keywords removed from code tokens before token matching.
    #[serde(default = "default_stopwords")]
    pub stopwords: Vec<String>,
    /// Weights of the combined score.
    #[serde(default)]
    pub weights: ScoreWeights,
}

fn default_threshold() -> f64 {
    0.6
}

fn default_skip_lines() -> Vec<String> {
    vec![String::new(), "{".into(), "}".into()]
}

fn default_stopwords() -> Vec<String> {
    DEFAULT_STOPWORDS.iter().map(|s| s.to_string()).collect()
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_threshold(),
            skip_lines: default_skip_lines(),
            stopwords: default_stopwords(),
            weights: ScoreWeights::default(),
        }
    }
}

impl MatcherConfig {
    /// Whether a trimmed line is excluded from matching.
    pub fn is_skipped(&self, text: &str) -> bool {
        self.skip_lines.iter().any(|s| s == text)
    }
}

/// The three weight sets of the combined score.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreWeights {
    /// Used when the removed line has no code part.
    #[serde(default)]
    pub comment_only: CommentOnlyWeights,
    /// Used when either code part fails to parse.
    #[serde(default)]
    pub text_only: TextOnlyWeights,
    /// Used when both code parts parse.
    #[serde(default)]
    pub structural: StructuralWeights,
}

/// Weights for comment-only lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentOnlyWeights {
    #[serde(default = "half")]
    pub sequence: f64,
    #[serde(default = "half")]
    pub tokens: f64,
}

fn half() -> f64 {
    0.5
}

impl Default for CommentOnlyWeights {
    fn default() -> Self {
        Self {
            sequence: half(),
            tokens: half(),
        }
    }
}

impl CommentOnlyWeights {
    fn values(&self) -> [f64; 2] {
        [self.sequence, self.tokens]
    }
}

/// Weights used when no structural similarity is available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextOnlyWeights {
    #[serde(default = "default_text_sequence")]
    pub sequence: f64,
    #[serde(default = "half")]
    pub tokens: f64,
    #[serde(default = "default_text_comment")]
    pub comment: f64,
}

fn default_text_sequence() -> f64 {
    0.4
}

fn default_text_comment() -> f64 {
    0.1
}

impl Default for TextOnlyWeights {
    fn default() -> Self {
        Self {
            sequence: default_text_sequence(),
            tokens: half(),
            comment: default_text_comment(),
        }
    }
}

impl TextOnlyWeights {
    fn values(&self) -> [f64; 3] {
        [self.sequence, self.tokens, self.comment]
    }
}

/// Weights used when both code parts have a structural similarity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuralWeights {
    #[serde(default = "default_struct_sequence")]
    pub sequence: f64,
    #[serde(default = "default_struct_tokens")]
    pub tokens: f64,
    #[serde(default = "half")]
    pub structure: f64,
    #[serde(default = "default_struct_comment")]
    pub comment: f64,
}

fn default_struct_sequence() -> f64 {
    0.2
}

fn default_struct_tokens() -> f64 {
    0.25
}

fn default_struct_comment() -> f64 {
    0.05
}

impl Default for StructuralWeights {
    fn default() -> Self {
        Self {
            sequence: default_struct_sequence(),
            tokens: default_struct_tokens(),
            structure: half(),
            comment: default_struct_comment(),
        }
    }
}

impl StructuralWeights {
    fn values(&self) -> [f64; 4] {
        [self.sequence, self.tokens, self.structure, self.comment]
    }
}

/// Evolution graph configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Build graph increments for direct-successor comparisons.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}
