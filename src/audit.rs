//! Browser performance audits.
//!
//! A browser is launched with a fixed remote-debugging port and the
//! auditing tool is pointed at that port, restricted to the performance
//! category. Only audits that carry a numeric value are kept.

use crate::catalog::Catalog;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::schema::{ExperimentConfiguration, Measurement};
use crate::server::serve;
use headless_chrome::{Browser, LaunchOptionsBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ffi::OsStr;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info};

const WINDOW_SIZE: (u32, u32) = (1920, 1080);

/// Keeps the browser connection alive for the length of a slow audit.
const BROWSER_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// One entry of the audit report's `audits` object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Audit {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub numeric_value: Option<f64>,
    #[serde(default)]
    pub numeric_unit: Option<String>,
    #[serde(default)]
    pub display_value: Option<String>,
}

impl Audit {
    pub fn measurement(&self) -> Measurement {
        let value = self.numeric_value.unwrap_or(0.0);
        let unit = self.numeric_unit.as_deref().unwrap_or("");
        match &self.display_value {
            Some(display) => Measurement::with_display(value, unit, display),
            None => Measurement::new(value, unit),
        }
    }

    fn has_numeric_value(&self) -> bool {
        self.numeric_value.is_some_and(|v| v != 0.0 && !v.is_nan())
    }
}

/// Audits `http://localhost:<port>` with the experiment's build served as
/// its bundle; the baseline experiment when `configuration` is `None`.
///
/// The raw report is written to `out/lighthouse/<key>.json` when a
/// configuration is given. Browser and server are released on every path.
pub fn measure(
    settings: &Settings,
    catalog: &Catalog,
    configuration: Option<&ExperimentConfiguration>,
) -> Result<Vec<Audit>> {
    let mut server = serve(settings, catalog, configuration)?;
    let port = server.local_addr().map_or(settings.port, |addr| addr.port());
    let outcome = audit_page(settings, port, configuration);
    server.stop()?;
    outcome
}

fn audit_page(
    settings: &Settings,
    port: u16,
    configuration: Option<&ExperimentConfiguration>,
) -> Result<Vec<Audit>> {
    let _browser = launch_browser(settings)?;
    let url = format!("http://localhost:{port}");
    let report = run_auditor(settings, &url)?;

    if let Some(configuration) = configuration {
        let path = write_report(settings, configuration, &report)?;
        debug!(path = %path.display(), "audit report written");
    }

    numeric_audits(&report)
}

fn launch_browser(settings: &Settings) -> Result<Browser> {
    let options = LaunchOptionsBuilder::default()
        .headless(settings.headless)
        .sandbox(false)
        .window_size(Some(WINDOW_SIZE))
        .port(Some(settings.debug_port))
        .idle_browser_timeout(BROWSER_IDLE_TIMEOUT)
        .args(vec![
            OsStr::new("--no-first-run"),
            OsStr::new("--disable-sync"),
            OsStr::new("--disable-background-networking"),
            OsStr::new("--disable-component-update"),
        ])
        .build()
        .map_err(|e| Error::Browser(e.to_string()))?;

    info!(port = settings.debug_port, headless = settings.headless, "launching browser");
    Browser::new(options).map_err(|e| Error::Browser(e.to_string()))
}

fn run_auditor(settings: &Settings, url: &str) -> Result<Value> {
    let output = Command::new(&settings.lighthouse)
        .arg(url)
        .arg(format!("--port={}", settings.debug_port))
        .arg("--only-categories=performance")
        .arg("--output=json")
        .arg("--output-path=stdout")
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .output()
        .map_err(|source| Error::Spawn {
            cmd: settings.lighthouse.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(Error::Audit(format!(
            "{} exited with {}",
            settings.lighthouse, output.status
        )));
    }
    Ok(serde_json::from_slice(&output.stdout)?)
}

fn write_report(
    settings: &Settings,
    configuration: &ExperimentConfiguration,
    report: &Value,
) -> Result<PathBuf> {
    let dir = settings.lighthouse_dir();
    fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
    let path = dir.join(format!("{configuration}.json"));
    let json = serde_json::to_string_pretty(report)?;
    fs::write(&path, json).map_err(|e| Error::io(&path, e))?;
    Ok(path)
}

/// Audits from a report that carry a non-zero numeric value.
pub fn numeric_audits(report: &Value) -> Result<Vec<Audit>> {
    let audits = report
        .get("audits")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::Audit("report has no audits".to_string()))?;

    let mut out = Vec::new();
    for entry in audits.values() {
        let Ok(audit) = Audit::deserialize(entry) else {
            continue;
        };
        if audit.has_numeric_value() {
            out.push(audit);
        }
    }
    Ok(out)
}
