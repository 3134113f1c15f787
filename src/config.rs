use std::env;
use std::path::PathBuf;

/// Port the static server listens on for tests and audits.
pub const DEFAULT_PORT: u16 = 9000;

/// Remote-debugging port handed to the browser and the auditing tool.
pub const DEFAULT_DEBUG_PORT: u16 = 9222;

/// Process-wide knobs: where things are written, which executables to call.
#[derive(Clone, Debug)]
pub struct Settings {
    pub out_dir: PathBuf,
    pub port: u16,
    pub debug_port: u16,
    /// HTML template containing `%%resultsTable%%` and `%%toolDetails%%`.
    pub template: PathBuf,
    /// Rendered report destination.
    pub report: PathBuf,
    /// Path segment up to which glossary commands are redacted.
    pub project_marker: String,
    pub gzip: String,
    pub brotli: String,
    pub lighthouse: String,
    /// Correctness test runner; `%%test%%` is replaced by the test file.
    pub test_runner: String,
    /// Run the browser headless instead of full-size and visible.
    pub headless: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("out"),
            port: DEFAULT_PORT,
            debug_port: DEFAULT_DEBUG_PORT,
            template: PathBuf::from("templates/results.html"),
            report: PathBuf::from("index.html"),
            project_marker: "js-min-bench".to_string(),
            gzip: "gzip".to_string(),
            brotli: "brotli".to_string(),
            lighthouse: "node_modules/.bin/lighthouse".to_string(),
            test_runner: "node_modules/.bin/mocha --reporter progress %%test%%".to_string(),
            headless: false,
        }
    }
}

impl Settings {
    /// Defaults with `BROTLI` and `LIGHTHOUSE` taken from the environment.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Some(brotli) = non_empty_var("BROTLI") {
            settings.brotli = brotli;
        }
        if let Some(lighthouse) = non_empty_var("LIGHTHOUSE") {
            settings.lighthouse = lighthouse;
        }
        settings
    }

    pub fn data_dir(&self) -> PathBuf {
        self.out_dir.join("data")
    }

    pub fn lighthouse_dir(&self) -> PathBuf {
        self.out_dir.join("lighthouse")
    }

    pub fn results_path(&self) -> PathBuf {
        self.out_dir.join("results.json")
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths_hang_off_out_dir() {
        let settings = Settings {
            out_dir: PathBuf::from("/tmp/bench"),
            ..Default::default()
        };
        assert_eq!(settings.data_dir(), PathBuf::from("/tmp/bench/data"));
        assert_eq!(
            settings.lighthouse_dir(),
            PathBuf::from("/tmp/bench/lighthouse")
        );
        assert_eq!(
            settings.results_path(),
            PathBuf::from("/tmp/bench/results.json")
        );
    }

    #[test]
    fn defaults_match_documented_layout() {
        let settings = Settings::default();
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.brotli, "brotli");
        assert!(settings.test_runner.contains("%%test%%"));
        assert!(!settings.headless);
    }
}
