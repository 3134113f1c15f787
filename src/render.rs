//! Renders `out/results.json` into the HTML comparison table.

use crate::catalog::{Catalog, RAW_TOOL};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::runner::read_results;
use crate::schema::{ExperimentResult, Metric};
use regex::{Captures, Regex};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// Audit entries that are not worth a column.
const RESERVED_COLUMNS: &[&str] = &[
    "input",
    "tool",
    "variant",
    "metrics",
    "unminifiedJavascript",
    "usesTextCompression",
    "unusedJavascript",
    "networkServerLatency",
    "networkRtt",
    "bootupTime",
    "serverResponseTime",
];

/// Reads the results file and template, writes the report.
pub fn render(settings: &Settings, catalog: &Catalog) -> Result<PathBuf> {
    let results = read_results(&settings.results_path())?;
    let template = fs::read_to_string(&settings.template)
        .map_err(|e| Error::io(&settings.template, e))?;

    let mut fields = BTreeMap::new();
    fields.insert("resultsTable", results_table(&results, catalog));
    fields.insert("toolDetails", tool_details(catalog, &settings.project_marker));
    let html = fill_template(&template, &fields)?;

    fs::write(&settings.report, html).map_err(|e| Error::io(&settings.report, e))?;
    info!(path = %settings.report.display(), "HTML written");
    Ok(settings.report.clone())
}

/// Replaces every `%%name%%` with its field. Unknown names are left alone.
pub fn fill_template(template: &str, fields: &BTreeMap<&str, String>) -> Result<String> {
    if !template.contains("%%resultsTable%%") {
        return Err(Error::Template(
            "missing %%resultsTable%% placeholder".to_string(),
        ));
    }
    let placeholder = Regex::new(r"%%(\w+)%%")?;
    let html = placeholder.replace_all(template, |caps: &Captures<'_>| {
        match fields.get(&caps[1]) {
            Some(value) => value.clone(),
            None => {
                warn!(placeholder = &caps[1], "no value for template placeholder");
                caps[0].to_string()
            }
        }
    });
    Ok(html.into_owned())
}

/// Rows grouped by input, groups in order of first appearance.
pub fn group_by_input(results: &[ExperimentResult]) -> Vec<(&str, Vec<&ExperimentResult>)> {
    let mut groups: Vec<(&str, Vec<&ExperimentResult>)> = Vec::new();
    for result in results {
        match groups.iter_mut().find(|(input, _)| *input == result.input) {
            Some((_, rows)) => rows.push(result),
            None => groups.push((&result.input, vec![result])),
        }
    }
    groups
}

/// Audit columns (reverse-sorted) followed by the fixed metrics.
pub fn columns(results: &[ExperimentResult]) -> Vec<String> {
    let audits: BTreeSet<&str> = results
        .iter()
        .flat_map(|r| r.data.audits.keys())
        .map(String::as_str)
        .filter(|key| !RESERVED_COLUMNS.contains(key))
        .collect();

    audits
        .into_iter()
        .rev()
        .map(str::to_string)
        .chain(Metric::COLUMNS.iter().map(|m| m.key().to_string()))
        .collect()
}

/// Smallest and largest value of `column` among successful non-baseline
/// rows, or `None` when there is nothing to compare.
pub fn extremes(rows: &[&ExperimentResult], column: &str) -> Option<(f64, f64)> {
    rows.iter()
        .filter(|r| !r.failed() && r.tool != RAW_TOOL)
        .filter_map(|r| r.data.get(column))
        .map(|m| m.numeric_value)
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// `-(value / raw - 1) * 100`, blank when zero or not computable.
pub fn percent_reduction(value: f64, raw: f64) -> String {
    let pct = -(value / raw - 1.0) * 100.0;
    if pct == 0.0 || !pct.is_finite() {
        String::new()
    } else {
        format!("{pct:.1}%")
    }
}

fn marker(value: Option<f64>, extremes: Option<(f64, f64)>) -> &'static str {
    let (Some(v), Some((best, worst))) = (value, extremes) else {
        return "";
    };
    match (v == best, v == worst) {
        (true, true) => "best worst",
        (true, false) => "best",
        (false, true) => "worst",
        (false, false) => "",
    }
}

fn metric_cells(result: &ExperimentResult, rows: &[&ExperimentResult], column: &str) -> String {
    let measurement = result.data.get(column);
    let value = measurement.map(|m| m.numeric_value);
    let display = measurement.map(|m| m.display_value.as_str()).unwrap_or("");

    let extremes = extremes(rows, column);
    let special = marker(value, extremes);

    let mut out = format!("<td class=\"{special}\" align=right>{}</td>", escape(display));

    if column == Metric::BuildTime.key() {
        let _ = write!(out, "<td class=\"{special}\"></td>");
    } else if extremes.is_some_and(|(_, worst)| worst != 0.0) {
        let raw = rows
            .iter()
            .find(|r| r.tool == RAW_TOOL)
            .and_then(|r| r.data.get(column))
            .map(|m| m.numeric_value);
        let pct = match (value, raw) {
            (Some(v), Some(raw)) => percent_reduction(v, raw),
            _ => String::new(),
        };
        let _ = write!(out, "<td class=\"pct {special}\" align=right>{pct}</td>");
    } else {
        out.push_str("<td></td>");
    }
    out
}

/// The comparison table: one block per input, one row per result.
pub fn results_table(results: &[ExperimentResult], catalog: &Catalog) -> String {
    let columns = columns(results);
    let mut html = String::from("<table><tr><th>input+tool+variant</th>");
    for column in &columns {
        let _ = write!(html, "<th><a href='#{column}'>{column}</a></th><th></th>");
    }
    html.push_str("</tr>\n");

    for (input, rows) in group_by_input(results) {
        match catalog.inputs.get(input) {
            Some(meta) => {
                let _ = writeln!(
                    html,
                    "<tr class=\"tool-row\"><td title=\"{}\"><i>{}</i></td></tr>",
                    escape(&meta.desc),
                    escape(input)
                );
            }
            None => {
                let _ = writeln!(
                    html,
                    "<tr class=\"tool-row\"><td><i>{}</i></td></tr>",
                    escape(input)
                );
            }
        }

        let mut last_tool = "";
        for result in &rows {
            html.push_str("<tr>");
            if result.tool != last_tool {
                let untested = if result.untested {
                    " <span title=\"warning: not tested\">\u{26a0}</span>"
                } else {
                    ""
                };
                let _ = write!(
                    html,
                    "<td style='padding-left: 8px'><a href='#{tool}'>{tool}</a>{untested}</td>",
                    tool = escape(&result.tool)
                );
                last_tool = &result.tool;
            } else {
                let _ = write!(
                    html,
                    "<td style='padding-left: 8ex'>+ {}</td>",
                    escape(result.variant.as_deref().unwrap_or(""))
                );
            }

            match &result.failure {
                None => {
                    for column in &columns {
                        html.push_str(&metric_cells(result, &rows, column));
                    }
                }
                Some(failure) => {
                    let _ = write!(
                        html,
                        "<td colspan={} align=center title='{}'>failed (hover for details)</td>",
                        columns.len() * 2,
                        escape(failure)
                    );
                }
            }
            html.push_str("</tr>\n");
        }
    }

    html.push_str("</table>\n");
    html
}

/// Strips everything up to and including `/<marker>/` from a command line.
pub fn redact_command(cmd: &str, marker: &str) -> String {
    match Regex::new(&format!("^.*/{}/", regex::escape(marker))) {
        Ok(re) => re.replace(cmd, "").into_owned(),
        Err(_) => cmd.to_string(),
    }
}

/// Glossary of every tool and variant with its invocation.
pub fn tool_details(catalog: &Catalog, marker: &str) -> String {
    let mut html = String::from("<dl>");
    html.push_str("<dt>raw</dt><dd>raw input file, as baseline for comparison</dd>");

    for tool in catalog.tools.iter().filter(|t| t.id != RAW_TOOL) {
        let Some((default, rest)) = tool.variants.split_first() else {
            continue;
        };
        let _ = write!(
            html,
            "<dt><a name='{id}'>{id}</a></dt><dd>{name}<br><tt>$ {cmd}</tt><br>",
            id = escape(&tool.id),
            name = tool.name,
            cmd = escape(&redact_command(&default.command, marker)),
        );

        if !rest.is_empty() {
            html.push_str("<dl>");
            for variant in rest {
                let _ = writeln!(
                    html,
                    "<dt>{}</dt><dd><tt>$ {}</tt></dd>",
                    escape(variant.id.as_deref().unwrap_or("")),
                    escape(&redact_command(&variant.command, marker))
                );
            }
            html.push_str("</dl>");
        }
        html.push_str("</dd>\n");
    }

    html.push_str("</dl>\n");
    html
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
