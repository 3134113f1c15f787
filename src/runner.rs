//! The benchmark loop: every input × tool × variant, one result each.

use crate::audit;
use crate::catalog::Catalog;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::harness::{self, Substitution};
use crate::schema::{ExperimentConfiguration, ExperimentResult, Measurement};
use crate::suite;
use crate::transform;
use regex::Regex;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Audit ids worth echoing to the log as they come in.
const LOGGED_AUDITS: [&str; 3] = ["speedIndex", "interactive", "mainthreadWorkBreakdown"];

#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    /// Matched against input identifiers.
    pub input_filter: Option<Regex>,
    /// Matched against `tool[-variant]`.
    pub tool_filter: Option<Regex>,
    pub skip_tests: bool,
    pub skip_audit: bool,
}

#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    pub results: Vec<ExperimentResult>,
    /// Combinations whose correctness tests failed.
    pub test_failures: usize,
}

impl RunSummary {
    /// Only test failures count; build failures are expected for some
    /// tool/input pairs.
    pub fn exit_code(&self) -> u8 {
        u8::from(self.test_failures > 0)
    }
}

/// Runs every selected combination in order: inputs sorted by identifier,
/// tools and variants in declaration order.
pub fn run(settings: &Settings, catalog: &Catalog, opts: &RunOptions) -> Result<RunSummary> {
    let data_dir = settings.data_dir();
    fs::create_dir_all(&data_dir).map_err(|e| Error::io(&data_dir, e))?;

    info!(
        input_filter = ?opts.input_filter.as_ref().map(Regex::as_str),
        tool_filter = ?opts.tool_filter.as_ref().map(Regex::as_str),
        skip_tests = opts.skip_tests,
        skip_audit = opts.skip_audit,
        "starting run"
    );

    let mut summary = RunSummary::default();
    for (input_id, input) in &catalog.inputs {
        if opts.input_filter.as_ref().is_some_and(|re| !re.is_match(input_id)) {
            continue;
        }

        let input_path = transform::resolve_input(catalog, input, &data_dir)?;
        let input_path = input_path.to_string_lossy();

        for tool in &catalog.tools {
            for variant in &tool.variants {
                let configuration =
                    ExperimentConfiguration::for_input(input_id, &tool.id, variant.id.as_deref());
                let platform = configuration.platform_identifier();
                if opts.tool_filter.as_ref().is_some_and(|re| !re.is_match(&platform)) {
                    continue;
                }

                info!(input = %input_id, %platform, "benchmarking");
                let out = data_dir.join(configuration.to_string());
                let out_str = out.to_string_lossy();
                let cmd = harness::substitute(
                    &variant.command,
                    &Substitution {
                        input: &input_path,
                        output: &out_str,
                        externs: input.externs.as_deref().unwrap_or(""),
                    },
                );

                let mut result = ExperimentResult::new(&configuration);
                let build = harness::time_fn(|| harness::exec(&cmd));
                result.data.build_time = Some(build.build_time());
                if let Err(e) = build.value {
                    warn!(%cmd, "could not execute cmd");
                    result.failure = Some(e.to_string());
                    summary.results.push(result);
                    continue;
                }

                match (&input.test, opts.skip_tests) {
                    (Some(test), false) => {
                        if let Some(failure) = suite::run_tests(settings, test, &out)? {
                            result.failure = Some(failure.to_string());
                            summary.results.push(result);
                            summary.test_failures += 1;
                            continue;
                        }
                    }
                    _ => {
                        result.untested = true;
                        warn!(input = %input_id, "no test");
                    }
                }

                measure_sizes(settings, &out, &mut result)?;

                if !opts.skip_audit {
                    fold_audits(settings, catalog, &configuration, &mut result);
                }

                summary.results.push(result);
            }
        }
    }

    Ok(summary)
}

fn measure_sizes(settings: &Settings, out: &Path, result: &mut ExperimentResult) -> Result<()> {
    result.data.size = Some(Measurement::kilobytes(harness::file_size(out)?));
    result.data.gzip_size = Some(Measurement::kilobytes(harness::gzip_size(&settings.gzip, out)?));
    result.data.brotli_size = Some(Measurement::kilobytes(harness::brotli_size(
        &settings.brotli,
        out,
    )?));
    Ok(())
}

fn fold_audits(
    settings: &Settings,
    catalog: &Catalog,
    configuration: &ExperimentConfiguration,
    result: &mut ExperimentResult,
) {
    let audits = match audit::measure(settings, catalog, Some(configuration)) {
        Ok(audits) => audits,
        Err(e) => {
            warn!(experiment = %configuration, error = %e, "audit failed");
            return;
        }
    };

    for audit in audits {
        let id = harness::camel_case(&audit.id);
        let measurement = audit.measurement();
        if LOGGED_AUDITS.contains(&id.as_str()) {
            info!(audit = %id, value = %measurement.display_value, "audit");
        }
        result.data.audits.insert(id, measurement);
    }
}

/// Writes the results as pretty-printed JSON.
pub fn write_results(path: &Path, results: &[ExperimentResult]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(results)?;
    fs::write(path, json).map_err(|e| Error::io(path, e))?;
    info!(path = %path.display(), "results written");
    Ok(())
}

pub fn read_results(path: &Path) -> Result<Vec<ExperimentResult>> {
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{JsFileMetadata, TestSpec, ToolMetadata, Variant};
    use crate::suite::TEST_FAILURE;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        dir: TempDir,
        settings: Settings,
        catalog: Catalog,
    }

    fn variant(id: Option<&str>, command: &str) -> Variant {
        Variant {
            id: id.map(str::to_string),
            desc: None,
            command: command.to_string(),
        }
    }

    fn input(path: &Path) -> JsFileMetadata {
        JsFileMetadata {
            bundle_path: path.to_string_lossy().to_string(),
            desc: "fixture".to_string(),
            ..Default::default()
        }
    }

    /// Two inputs, a copying baseline, a truncating "minifier" with two
    /// variants, and a tool that does not exist.
    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let root = dir.path();

        let compressor = root.join("fake-compress");
        fs::write(
            &compressor,
            "#!/bin/sh\nfor last; do :; done\nhead -c 100 \"$last\" > \"$last.$EXT\"\n",
        )
        .unwrap();
        harness::exec(&format!("chmod +x {}", compressor.display())).unwrap();

        let react = root.join("react.js");
        fs::write(&react, "r".repeat(5_000)).unwrap();
        let vue = root.join("vue.js");
        fs::write(&vue, "v".repeat(3_000)).unwrap();

        let mut inputs = BTreeMap::new();
        inputs.insert("vue".to_string(), input(&vue));
        inputs.insert("react".to_string(), input(&react));

        let catalog = Catalog {
            inputs,
            tools: vec![
                ToolMetadata {
                    id: "raw".to_string(),
                    name: "baseline".to_string(),
                    variants: vec![variant(None, "cp %%in%% %%out%%")],
                },
                ToolMetadata {
                    id: "halve".to_string(),
                    name: "truncating minifier".to_string(),
                    variants: vec![
                        variant(None, "head -c 2000 %%in%% > %%out%%"),
                        variant(Some("harder"), "head -c 1000 %%in%% > %%out%%"),
                    ],
                },
                ToolMetadata {
                    id: "ghost".to_string(),
                    name: "missing tool".to_string(),
                    variants: vec![variant(None, "no-such-minifier-91c2 %%in%% -o %%out%%")],
                },
            ],
        };

        let settings = Settings {
            out_dir: root.join("out"),
            port: 0,
            gzip: format!("EXT=gz {}", compressor.display()),
            brotli: format!("EXT=br {}", compressor.display()),
            ..Default::default()
        };

        Fixture {
            dir,
            settings,
            catalog,
        }
    }

    fn skip_all() -> RunOptions {
        RunOptions {
            skip_tests: true,
            skip_audit: true,
            ..Default::default()
        }
    }

    fn keys(results: &[ExperimentResult]) -> Vec<String> {
        results.iter().map(ExperimentResult::key).collect()
    }

    #[test]
    fn one_result_per_combination_in_order() {
        let fx = fixture();
        let summary = run(&fx.settings, &fx.catalog, &skip_all()).unwrap();

        assert_eq!(
            keys(&summary.results),
            [
                "react.raw",
                "react.halve",
                "react.halve-harder",
                "react.ghost",
                "vue.raw",
                "vue.halve",
                "vue.halve-harder",
                "vue.ghost",
            ]
        );
        assert_eq!(summary.exit_code(), 0);
    }

    #[test]
    fn successful_builds_carry_sizes() {
        let fx = fixture();
        let summary = run(&fx.settings, &fx.catalog, &skip_all()).unwrap();

        let raw = &summary.results[0];
        assert!(raw.untested);
        assert_eq!(raw.failure, None);
        assert_eq!(raw.data.size, Some(Measurement::kilobytes(5_000)));
        assert_eq!(raw.data.gzip_size, Some(Measurement::kilobytes(100)));
        assert_eq!(raw.data.brotli_size, Some(Measurement::kilobytes(100)));
        assert_eq!(raw.data.build_time.as_ref().unwrap().numeric_unit, "ms");

        let harder = &summary.results[2];
        assert_eq!(harder.data.size, Some(Measurement::kilobytes(1_000)));
        assert!(fx.settings.data_dir().join("react.halve-harder.gz").exists());
        assert!(fx.settings.data_dir().join("react.halve-harder.br").exists());
    }

    #[test]
    fn missing_binary_becomes_a_failure_record() {
        let fx = fixture();
        let summary = run(&fx.settings, &fx.catalog, &skip_all()).unwrap();

        let ghost = &summary.results[3];
        let failure = ghost.failure.as_deref().unwrap();
        assert!(failure.contains("no-such-minifier-91c2"));
        assert!(failure.contains("not found"), "failure was {failure:?}");
        let build_time = ghost.data.build_time.as_ref().unwrap();
        assert!(build_time.numeric_value > 0.0, "build time was {build_time:?}");
        assert!(ghost.data.size.is_none());
        assert!(ghost.data.gzip_size.is_none());
        assert!(ghost.data.audits.is_empty());
        assert_eq!(summary.exit_code(), 0);
    }

    #[test]
    fn filters_select_inputs_and_platforms() {
        let fx = fixture();
        let opts = RunOptions {
            input_filter: Some(Regex::new("^vue$").unwrap()),
            tool_filter: Some(Regex::new("^(raw|halve-harder)$").unwrap()),
            ..skip_all()
        };
        let summary = run(&fx.settings, &fx.catalog, &opts).unwrap();
        assert_eq!(keys(&summary.results), ["vue.raw", "vue.halve-harder"]);
    }

    #[test]
    fn failing_tests_are_counted() {
        let mut fx = fixture();
        let test_file = fx.dir.path().join("suite.sh");
        fs::write(&test_file, "exit 1\n").unwrap();
        fx.catalog.inputs.get_mut("vue").unwrap().test = Some(TestSpec {
            webroot: fx.dir.path().to_string_lossy().to_string(),
            test: test_file.to_string_lossy().to_string(),
        });
        fx.settings.test_runner = "sh %%test%%".to_string();

        let opts = RunOptions {
            input_filter: Some(Regex::new("vue").unwrap()),
            tool_filter: Some(Regex::new("^raw$").unwrap()),
            skip_audit: true,
            ..Default::default()
        };
        let summary = run(&fx.settings, &fx.catalog, &opts).unwrap();

        assert_eq!(summary.results.len(), 1);
        assert_eq!(summary.results[0].failure.as_deref(), Some(TEST_FAILURE));
        assert!(!summary.results[0].untested);
        assert!(summary.results[0].data.size.is_none());
        assert_eq!(summary.test_failures, 1);
        assert_eq!(summary.exit_code(), 1);
    }

    #[test]
    fn unknown_transform_aborts_the_run() {
        let mut fx = fixture();
        fx.catalog.inputs.get_mut("react").unwrap().transform = Some("shuffle".to_string());
        let err = run(&fx.settings, &fx.catalog, &skip_all()).unwrap_err();
        assert!(matches!(err, Error::UnknownTransform(_)));
    }

    #[test]
    fn results_round_trip_through_disk() {
        let fx = fixture();
        let summary = run(&fx.settings, &fx.catalog, &skip_all()).unwrap();

        let path: PathBuf = fx.settings.results_path();
        write_results(&path, &summary.results).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("[\n  {"));

        assert_eq!(read_results(&path).unwrap(), summary.results);
    }
}
