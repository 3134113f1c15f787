use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use js_min_bench::runner::{self, RunOptions};
use js_min_bench::schema::ExperimentConfiguration;
use js_min_bench::server::{self, WebServer};
use js_min_bench::{audit, render, Catalog, Settings};
use regex::Regex;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Subcommand, Debug)]
enum Command {
    /// Build every input with every tool variant, measure, and render the report.
    Run {
        /// Skip the browser performance audit.
        #[arg(long, default_value_t = false)]
        skip_audit: bool,

        /// Accepted for compatibility; ignored.
        #[arg(hide = true)]
        args: Vec<String>,
    },

    /// Serve a tool/input combination for manual inspection.
    ///
    /// Without `--root`, serves the input's test page with `/bundle.js`
    /// mapped to `out/data/<input>.<tool>`.
    Serve {
        /// Tool or `tool-variant`; defaults to the raw baseline.
        tool: Option<String>,

        /// Input identifier; defaults to the todomvc-react baseline.
        input: Option<String>,

        /// Serve this directory instead of the input's test page.
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,

        /// Extra `PATH=FILE` remaps, used with `--root`.
        #[arg(long, value_name = "PATH=FILE", value_parser = parse_remap)]
        remap: Vec<(String, PathBuf)>,
    },

    /// Render out/results.json to HTML.
    Render,

    /// Take one performance audit of whatever the baseline server hosts.
    Measure,
}

#[derive(Parser, Debug)]
#[command(name = "js-min-bench")]
#[command(about = "JavaScript minifier benchmark runner (JSON results, HTML report)")]
struct Args {
    /// Regex matched against `tool[-variant]`.
    #[arg(long = "toolFilter", alias = "tool-filter", value_name = "REGEX", global = true)]
    tool_filter: Option<Regex>,

    /// Regex matched against input identifiers.
    #[arg(long = "inputFilter", alias = "input-filter", value_name = "REGEX", global = true)]
    input_filter: Option<Regex>,

    /// Skip correctness tests; results are flagged untested.
    #[arg(long = "skip-tests", default_value_t = false, global = true)]
    skip_tests: bool,

    /// JSON catalog of inputs and tools to use instead of the builtin tables.
    #[arg(long, value_name = "FILE", global = true)]
    catalog: Option<PathBuf>,

    #[arg(long, value_name = "DIR", global = true)]
    out_dir: Option<PathBuf>,

    #[arg(long, value_name = "FILE", global = true)]
    template: Option<PathBuf>,

    #[arg(long, value_name = "FILE", global = true)]
    report: Option<PathBuf>,

    #[arg(long, global = true)]
    port: Option<u16>,

    /// Correctness test runner command; `%%test%%` is the test file.
    #[arg(long, value_name = "CMD", global = true)]
    test_runner: Option<String>,

    /// Run the audit browser headless.
    #[arg(long, default_value_t = false, global = true)]
    headless: bool,

    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

impl Args {
    fn settings(&self) -> Settings {
        let mut settings = Settings::from_env();
        if let Some(dir) = &self.out_dir {
            settings.out_dir = dir.clone();
        }
        if let Some(template) = &self.template {
            settings.template = template.clone();
        }
        if let Some(report) = &self.report {
            settings.report = report.clone();
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(runner) = &self.test_runner {
            settings.test_runner = runner.clone();
        }
        settings.headless = self.headless;
        settings
    }

    fn catalog(&self) -> Result<Catalog> {
        match &self.catalog {
            Some(path) => Catalog::load(path)
                .with_context(|| format!("failed to load catalog {}", path.display())),
            None => Ok(Catalog::builtin(
                &env::current_dir().context("no working directory")?,
            )),
        }
    }
}

fn parse_remap(s: &str) -> std::result::Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((src, dst)) if src.starts_with('/') && !dst.is_empty() => {
            Ok((src.to_string(), PathBuf::from(dst)))
        }
        _ => Err(format!("expected /PATH=FILE, got {s}")),
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        "js_min_bench=debug"
    } else {
        "js_min_bench=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Finds the tool whose id, or `id-variant`, matches `platform`.
fn resolve_platform(catalog: &Catalog, platform: &str) -> Result<(String, Option<String>)> {
    for tool in &catalog.tools {
        for variant in &tool.variants {
            let candidate = ExperimentConfiguration::default().with_tool(&tool.id, variant.id.as_deref());
            if candidate.platform_identifier() == platform {
                return Ok((tool.id.clone(), variant.id.clone()));
            }
        }
    }
    bail!("unknown tool {platform}")
}

fn park_forever() -> ! {
    info!("press Ctrl-C to stop");
    loop {
        std::thread::park();
    }
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let settings = args.settings();
    let catalog = args.catalog()?;

    match &args.cmd {
        Command::Run { skip_audit, .. } => {
            let opts = RunOptions {
                input_filter: args.input_filter.clone(),
                tool_filter: args.tool_filter.clone(),
                skip_tests: args.skip_tests,
                skip_audit: *skip_audit,
            };
            let summary = runner::run(&settings, &catalog, &opts).context("benchmark run failed")?;
            runner::write_results(&settings.results_path(), &summary.results)?;
            render::render(&settings, &catalog).context("failed to render report")?;

            if summary.test_failures > 0 {
                info!(failures = summary.test_failures, "test failures recorded");
            }
            Ok(ExitCode::from(summary.exit_code()))
        }
        Command::Serve {
            tool,
            input,
            root,
            remap,
        } => {
            let _server = match root {
                Some(root) => {
                    let mut server = WebServer::new(root);
                    for (src, dst) in remap {
                        server.remap(src, dst);
                    }
                    let addr = server.start(settings.port)?;
                    info!("serving {} at http://localhost:{}", root.display(), addr.port());
                    server
                }
                None => {
                    let mut configuration = ExperimentConfiguration::default();
                    if let Some(platform) = tool {
                        let (tool, variant) = resolve_platform(&catalog, platform)?;
                        configuration = configuration.with_tool(&tool, variant.as_deref());
                    }
                    if let Some(input) = input {
                        catalog.input(input)?;
                        configuration = configuration.with_input(input);
                    }
                    server::serve(&settings, &catalog, Some(&configuration))?
                }
            };
            park_forever()
        }
        Command::Render => {
            render::render(&settings, &catalog).context("failed to render report")?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Measure => {
            let audits = audit::measure(&settings, &catalog, None).context("audit failed")?;
            println!("{}", serde_json::to_string_pretty(&audits)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}
