use crate::config::Orientation;
use crate::locator::ScreenshotFile;
use crate::timeline::NormalizedLogEntry;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// A screenshot placed on the session clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    pub path: PathBuf,
    pub captured_at: u64,
    /// Milliseconds since the dashboard's session anchor. Negative when the
    /// device clock ran behind the dashboard.
    pub relative_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageGeometry {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub session_id: String,
    pub screenshots: Vec<Screenshot>,
    pub log_entries: Vec<NormalizedLogEntry>,
    pub orientation: Orientation,
    pub geometry: Option<ImageGeometry>,
    pub generated_at: DateTime<Utc>,
}

/// Combine screenshots and the initial log slice into a report.
///
/// The first screenshot's pixel size decides the orientation; `configured`
/// only applies when there are no screenshots at all.
pub fn assemble(
    session_id: &str,
    session_anchor: u64,
    files: Vec<ScreenshotFile>,
    log_entries: Vec<NormalizedLogEntry>,
    configured: Orientation,
) -> Result<Report> {
    let geometry = match files.first() {
        Some(first) => Some(image_geometry(&first.path)?),
        None => None,
    };

    let orientation = geometry
        .map(|g| Orientation::from_dimensions(g.width, g.height))
        .unwrap_or(configured);

    let screenshots = files
        .into_iter()
        .map(|file| Screenshot {
            relative_ms: (file.captured_at as i64).wrapping_sub(session_anchor as i64),
            captured_at: file.captured_at,
            path: file.path,
        })
        .collect();

    Ok(Report {
        session_id: session_id.to_string(),
        screenshots,
        log_entries,
        orientation,
        geometry,
        generated_at: Utc::now(),
    })
}

fn image_geometry(path: &Path) -> Result<ImageGeometry> {
    let (width, height) = image::image_dimensions(path)
        .with_context(|| format!("Failed to read image dimensions: {}", path.display()))?;
    Ok(ImageGeometry { width, height })
}

/// Write the rendered report to `output` and return its absolute path.
pub fn write_report(report: &Report, output: &Path, port: u16) -> Result<PathBuf> {
    // Ensure output directory exists
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }

    // Render and write
    let html = render_report_html(report, port);
    fs::write(output, html)
        .with_context(|| format!("Failed to write report: {}", output.display()))?;

    // Absolute path for the operator to open
    let absolute = fs::canonicalize(output)
        .with_context(|| format!("Failed to resolve report path: {}", output.display()))?;

    info!(
        "Wrote report with {} screenshots and {} log entries to {}",
        report.screenshots.len(),
        report.log_entries.len(),
        absolute.display()
    );

    Ok(absolute)
}

pub fn render_report_html(report: &Report, port: u16) -> String {
    let dimensions = report
        .geometry
        .map(|g| format!("{}&times;{}", g.width, g.height))
        .unwrap_or_else(|| "n/a".to_string());

    let mut html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Session {session}</title>
<style>
body {{ font-family: system-ui, sans-serif; margin: 0; background: #1a1a2e; color: #eee; }}
header {{ padding: 1rem 2rem; background: #16213e; }}
h1 {{ color: #00d9ff; margin: 0 0 0.3rem 0; font-size: 1.3rem; }}
.meta {{ color: #888; font-size: 0.9rem; }}
main {{ display: flex; gap: 1rem; padding: 1rem 2rem; }}
.shots {{ display: flex; flex-direction: column; gap: 0.5rem; overflow-y: auto; max-height: 85vh; }}
.landscape .shots img {{ width: 320px; }}
.portrait .shots img {{ width: 180px; }}
figure {{ margin: 0; }}
figcaption {{ color: #00d9ff; font-variant-numeric: tabular-nums; font-size: 0.85rem; }}
.logs {{ flex: 1; overflow-y: auto; max-height: 85vh; }}
table {{ border-collapse: collapse; width: 100%; font-family: ui-monospace, monospace; font-size: 0.8rem; }}
td {{ padding: 0.1rem 0.5rem; vertical-align: top; white-space: pre-wrap; }}
td.second {{ color: #00d9ff; text-align: right; width: 4rem; }}
tr.first td {{ border-top: 1px solid #333; }}
button {{ margin: 0.5rem 0; padding: 0.3rem 0.8rem; background: #16213e; color: #00d9ff; border: 1px solid #00d9ff; border-radius: 4px; cursor: pointer; }}
</style>
</head>
<body class="{orientation}">
<header>
<h1>Session {session}</h1>
<div class="meta">{shots} screenshots &middot; {orientation} &middot; {dimensions} &middot; generated {generated}</div>
</header>
<main>
<section class="shots">
"#,
        session = html_escape(&report.session_id),
        orientation = report.orientation,
        shots = report.screenshots.len(),
        dimensions = dimensions,
        generated = report.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
    );

    for shot in &report.screenshots {
        html.push_str(&format!(
            "<figure data-captured=\"{}\" data-ms=\"{}\"><img src=\"{}\" loading=\"lazy\"><figcaption>{}</figcaption></figure>\n",
            shot.captured_at,
            shot.relative_ms,
            html_escape(&image_src(&shot.path)),
            format_offset(shot.relative_ms),
        ));
    }

    html.push_str("</section>\n<section class=\"logs\">\n<table id=\"log\">\n");

    for entry in &report.log_entries {
        html.push_str(&render_log_row(entry));
    }

    html.push_str(&format!(
        r#"</table>
<button id="more">Load more</button>
</section>
</main>
<script>
let next = {next};
const pageSize = {page};
const escapeHtml = s => s.replace(/&/g, '&amp;').replace(/</g, '&lt;').replace(/>/g, '&gt;');
document.getElementById('more').onclick = async () => {{
  const resp = await fetch(`http://127.0.0.1:{port}/logs?from=${{next}}&to=${{next + pageSize - 1}}`);
  if (!resp.ok) {{ return; }}
  const entries = await resp.json();
  const table = document.getElementById('log');
  for (const e of entries) {{
    const row = table.insertRow();
    if (e.first) {{ row.className = 'first'; }}
    row.innerHTML = `<td class="second">${{e.first ? e.second + 's' : ''}}</td><td>${{escapeHtml(e.entry)}}</td>`;
  }}
  next += pageSize;
}};
</script>
</body></html>"#,
        next = crate::logs::INITIAL_RANGE.last() + 1,
        page = crate::logs::INITIAL_RANGE.last(),
        port = port,
    ));

    html
}

fn render_log_row(entry: &NormalizedLogEntry) -> String {
    if entry.first_of_second {
        format!(
            "<tr class=\"first\"><td class=\"second\">{}s</td><td>{}</td></tr>\n",
            entry.relative_second,
            html_escape(&entry.text)
        )
    } else {
        format!(
            "<tr><td class=\"second\"></td><td>{}</td></tr>\n",
            html_escape(&entry.text)
        )
    }
}

/// `file://` URL for a screenshot so spaces, `#`, `?` and `%` in the path survive.
fn image_src(path: &Path) -> String {
    let absolute = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    match Url::from_file_path(&absolute) {
        Ok(url) => url.to_string(),
        Err(()) => absolute.to_string_lossy().into_owned(),
    }
}

/// `12345` -> `+12.345s`
fn format_offset(ms: i64) -> String {
    let sign = if ms < 0 { '-' } else { '+' };
    let abs = ms.unsigned_abs();
    format!("{}{}.{:03}s", sign, abs / 1000, abs % 1000)
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
