use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One benchmark combination: which input, built by which tool flavor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExperimentConfiguration {
    tool: String,
    variant: Option<String>,
    experiment_identifier: String,
}

impl Default for ExperimentConfiguration {
    /// The baseline experiment: unmodified todomvc-react.
    fn default() -> Self {
        Self::new("todomvc", "react", "raw", None)
    }
}

impl ExperimentConfiguration {
    /// `experiment` and `framework` combine into the `<experiment>-<framework>`
    /// input key.
    pub fn new(experiment: &str, framework: &str, tool: &str, variant: Option<&str>) -> Self {
        Self {
            tool: tool.to_string(),
            variant: variant.map(str::to_string),
            experiment_identifier: format!("{experiment}-{framework}"),
        }
    }

    /// Configuration for `tool`/`variant` applied to the named input.
    pub fn for_input(input: &str, tool: &str, variant: Option<&str>) -> Self {
        Self::default().with_tool(tool, variant).with_input(input)
    }

    /// Replaces the tool part, keeping the experiment.
    pub fn with_tool(mut self, tool: &str, variant: Option<&str>) -> Self {
        self.tool = tool.to_string();
        self.variant = variant.map(str::to_string);
        self
    }

    /// Overrides the experiment identifier with a catalog input name.
    pub fn with_input(mut self, input: &str) -> Self {
        self.experiment_identifier = input.to_string();
        self
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }

    /// Input-level grouping key.
    pub fn experiment_identifier(&self) -> &str {
        &self.experiment_identifier
    }

    /// `tool` or `tool-variant`.
    pub fn platform_identifier(&self) -> String {
        match &self.variant {
            Some(v) => format!("{}-{}", self.tool, v),
            None => self.tool.clone(),
        }
    }
}

impl fmt::Display for ExperimentConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}",
            self.experiment_identifier,
            self.platform_identifier()
        )
    }
}

/// A single observed value with its unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    pub numeric_value: f64,
    #[serde(default)]
    pub numeric_unit: String,
    #[serde(default)]
    pub display_value: String,
}

impl Measurement {
    /// Display string defaults to the value immediately followed by the unit.
    pub fn new(numeric_value: f64, numeric_unit: &str) -> Self {
        Self {
            numeric_value,
            numeric_unit: numeric_unit.to_string(),
            display_value: format!("{numeric_value}{numeric_unit}"),
        }
    }

    pub fn with_display(numeric_value: f64, numeric_unit: &str, display_value: &str) -> Self {
        Self {
            numeric_value,
            numeric_unit: numeric_unit.to_string(),
            display_value: display_value.to_string(),
        }
    }

    /// Sizes are reported in kB (1000 bytes).
    pub fn kilobytes(bytes: u64) -> Self {
        Self::new(bytes as f64 / 1000.0, "kB")
    }

    /// Keeps sub-millisecond precision; the display rounds to whole ms.
    pub fn millis(ms: f64) -> Self {
        Self::with_display(ms, "ms", &format!("{ms:.0}ms"))
    }
}

/// The fixed metrics every successful result carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Metric {
    BuildTime,
    Size,
    GzipSize,
    BrotliSize,
}

impl Metric {
    /// Report column order for the fixed metrics.
    pub const COLUMNS: [Metric; 4] = [
        Metric::Size,
        Metric::GzipSize,
        Metric::BrotliSize,
        Metric::BuildTime,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Metric::BuildTime => "buildTime",
            Metric::Size => "size",
            Metric::GzipSize => "gzipSize",
            Metric::BrotliSize => "brotliSize",
        }
    }

    pub fn from_key(key: &str) -> Option<Metric> {
        Metric::COLUMNS.into_iter().find(|m| m.key() == key)
    }
}

/// All observation data for one result.
///
/// Serialized as a flat object: the fixed metrics by name, then one entry
/// per audit keyed by its camelCased audit id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_time: Option<Measurement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Measurement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gzip_size: Option<Measurement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brotli_size: Option<Measurement>,
    #[serde(flatten)]
    pub audits: BTreeMap<String, Measurement>,
}

impl Observations {
    pub fn metric(&self, metric: Metric) -> Option<&Measurement> {
        match metric {
            Metric::BuildTime => self.build_time.as_ref(),
            Metric::Size => self.size.as_ref(),
            Metric::GzipSize => self.gzip_size.as_ref(),
            Metric::BrotliSize => self.brotli_size.as_ref(),
        }
    }

    /// Looks up a report column by key, fixed metric or audit.
    pub fn get(&self, key: &str) -> Option<&Measurement> {
        match Metric::from_key(key) {
            Some(metric) => self.metric(metric),
            None => self.audits.get(key),
        }
    }
}

/// One row of the benchmark report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub input: String,
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub untested: bool,
    pub data: Observations,
}

impl ExperimentResult {
    pub fn new(config: &ExperimentConfiguration) -> Self {
        Self {
            input: config.experiment_identifier().to_string(),
            tool: config.tool().to_string(),
            variant: config.variant().map(str::to_string),
            failure: None,
            untested: false,
            data: Observations::default(),
        }
    }

    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Canonical `<input>.<tool>[-variant]` key.
    pub fn key(&self) -> String {
        match &self.variant {
            Some(v) => format!("{}.{}-{}", self.input, self.tool, v),
            None => format!("{}.{}", self.input, self.tool),
        }
    }
}
