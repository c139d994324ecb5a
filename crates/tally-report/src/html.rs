//! HTML report generator.
//!
//! Produces self-contained HTML files with all CSS/JS inlined.

use anyhow::{Context, Result};
use std::path::Path;

use tally_core::leaderboard::Leaderboard;
use tally_core::report::{EventStatus, IngestReport};

/// Escape a string for safe HTML insertion.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn open_document(html: &mut String, title: &str) {
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!("<title>{}</title>\n", html_escape(title)));
    html.push_str("<style>\n");
    html.push_str(CSS);
    html.push_str("</style>\n");
    html.push_str("</head>\n<body>\n");
}

fn close_document(html: &mut String, raw_json: &str) {
    html.push_str("<section class=\"raw-data\">\n");
    html.push_str("<details>\n<summary>Raw JSON Data</summary>\n");
    html.push_str("<pre><code>");
    html.push_str(&html_escape(raw_json));
    html.push_str("</code></pre>\n");
    html.push_str("</details>\n</section>\n");

    html.push_str("<script>\n");
    html.push_str(JS);
    html.push_str("</script>\n");
    html.push_str("</body>\n</html>");
}

fn status_class(status: EventStatus) -> &'static str {
    match status {
        EventStatus::Scored => "pass",
        EventStatus::Deduped => "dup",
        EventStatus::Replayed => "muted",
        EventStatus::Error => "fail",
    }
}

fn short_id(id: Option<uuid::Uuid>) -> String {
    id.map(|id| id.to_string()[..8].to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Generate an HTML page for one ingestion batch.
pub fn generate_ingest_html(report: &IngestReport) -> String {
    let mut html = String::new();
    open_document(&mut html, &format!("tally ingest {}", report.id));

    html.push_str("<header>\n");
    html.push_str("<h1>tally ingestion report</h1>\n");
    html.push_str(&format!(
        "<p class=\"meta\">Batch <code>{}</code> | {} events | {}ms | {}</p>\n",
        report.id,
        report.summary.total_received,
        report.duration_ms,
        report.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    html.push_str("</header>\n");

    let s = &report.summary;
    html.push_str("<section class=\"dashboard\">\n");
    html.push_str("<h2>Summary</h2>\n");
    html.push_str("<table class=\"summary\">\n");
    html.push_str("<thead><tr><th>Received</th><th>Ingested</th><th>Duplicates</th><th>Scored</th><th>Errors</th><th>Replayed</th></tr></thead>\n");
    html.push_str(&format!(
        "<tbody><tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr></tbody></table>\n",
        s.total_received, s.ingested, s.duplicates_detected, s.scored, s.errors, s.replayed
    ));
    html.push_str("</section>\n");

    html.push_str("<section class=\"results\">\n");
    html.push_str("<h2>Events</h2>\n");
    html.push_str("<table class=\"results-table\" id=\"results\">\n");
    html.push_str("<thead><tr><th onclick=\"sortTable(0)\">#</th><th onclick=\"sortTable(1)\">Event</th><th onclick=\"sortTable(2)\">Status</th><th onclick=\"sortTable(3)\">Attempt</th><th onclick=\"sortTable(4)\">Duplicate of</th><th onclick=\"sortTable(5)\">Score</th><th>Detail</th></tr></thead>\n");
    html.push_str("<tbody>\n");

    for o in &report.outcomes {
        let detail = match (&o.reason, o.evidence.is_empty()) {
            (Some(reason), _) => html_escape(reason),
            (None, false) => {
                let best = o
                    .evidence
                    .iter()
                    .filter_map(|e| e.similarity)
                    .fold(f64::NAN, f64::max);
                if best.is_nan() {
                    format!("{} candidates compared", o.evidence.len())
                } else {
                    format!(
                        "{} candidates compared, best similarity {:.1}%",
                        o.evidence.len(),
                        best * 100.0
                    )
                }
            }
            (None, true) => String::new(),
        };
        let score = o
            .score
            .map(|s| format!("{s:.2}"))
            .unwrap_or_else(|| "-".to_string());

        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td class=\"{}\">{}</td><td><code>{}</code></td><td><code>{}</code></td><td>{}</td><td>{}</td></tr>\n",
            o.index,
            html_escape(o.event_id.as_deref().unwrap_or("-")),
            status_class(o.status),
            o.status,
            short_id(o.attempt_id),
            short_id(o.canonical_attempt_id),
            score,
            detail,
        ));
    }

    html.push_str("</tbody></table>\n");
    html.push_str("</section>\n");

    close_document(
        &mut html,
        &serde_json::to_string_pretty(report).unwrap_or_default(),
    );
    html
}

/// Generate an HTML page for a test leaderboard.
pub fn generate_leaderboard_html(board: &Leaderboard) -> String {
    let mut html = String::new();
    open_document(&mut html, &format!("tally leaderboard: {}", board.test_name));

    html.push_str("<header>\n");
    html.push_str(&format!(
        "<h1>{}</h1>\n<p class=\"meta\">Test <code>{}</code> | {} students</p>\n",
        html_escape(&board.test_name),
        html_escape(&board.test_id),
        board.entries.len()
    ));
    html.push_str("</header>\n");

    html.push_str("<section class=\"results\">\n");
    html.push_str("<table class=\"results-table\" id=\"results\">\n");
    html.push_str("<thead><tr><th onclick=\"sortTable(0)\">Rank</th><th onclick=\"sortTable(1)\">Student</th><th onclick=\"sortTable(2)\">Identity</th><th onclick=\"sortTable(3)\">Score</th><th onclick=\"sortTable(4)\">Accuracy</th><th onclick=\"sortTable(5)\">Net correct</th><th>C / W / S</th></tr></thead>\n");
    html.push_str("<tbody>\n");

    for e in &board.entries {
        html.push_str(&format!(
            "<tr class=\"{}\"><td>{}</td><td>{}</td><td>{}</td><td>{:.2}</td><td>{:.1}%</td><td>{}</td><td>{} / {} / {}</td></tr>\n",
            if e.is_top_3 { "top" } else { "" },
            e.rank,
            html_escape(&e.student_name),
            html_escape(&e.identity.to_string()),
            e.total,
            e.accuracy,
            e.net_correct,
            e.correct,
            e.wrong,
            e.skipped,
        ));
    }

    html.push_str("</tbody></table>\n");
    html.push_str("</section>\n");

    close_document(
        &mut html,
        &serde_json::to_string_pretty(board).unwrap_or_default(),
    );
    html
}

/// Write generated HTML to a file.
pub fn write_html(html: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, html)
        .with_context(|| format!("failed to write HTML report to {}", path.display()))?;
    Ok(())
}

const CSS: &str = r#"
:root { --bg: #fff; --fg: #1a1a1a; --border: #e5e7eb; --pass: #dcfce7; --fail: #fde2e2; --dup: #fef9c3; --top: #e0e7ff; }
@media (prefers-color-scheme: dark) {
  :root { --bg: #111827; --fg: #f9fafb; --border: #374151; --pass: #064e3b; --fail: #7f1d1d; --dup: #713f12; --top: #312e81; }
}
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; margin: 0; padding: 2rem; background: var(--bg); color: var(--fg); }
h1, h2 { margin-top: 2rem; }
.meta { color: #6b7280; }
table { border-collapse: collapse; width: 100%; margin: 1rem 0; }
th, td { border: 1px solid var(--border); padding: 0.5rem 1rem; text-align: left; }
th { background: var(--border); cursor: pointer; }
.pass { background: var(--pass); }
.fail { background: var(--fail); }
.dup { background: var(--dup); }
.muted { color: #6b7280; }
.top { background: var(--top); font-weight: bold; }
pre { overflow-x: auto; padding: 1rem; background: var(--border); border-radius: 8px; }
code { font-family: 'JetBrains Mono', 'Fira Code', monospace; font-size: 0.85rem; }
details { margin: 1rem 0; }
summary { cursor: pointer; font-weight: bold; }
"#;

const JS: &str = r#"
function sortTable(col) {
  const table = document.getElementById('results');
  const tbody = table.querySelector('tbody');
  const rows = Array.from(tbody.querySelectorAll('tr'));
  const asc = table.dataset.sortCol == col && table.dataset.sortDir == 'asc' ? false : true;
  rows.sort((a, b) => {
    const va = a.cells[col].textContent;
    const vb = b.cells[col].textContent;
    const na = parseFloat(va), nb = parseFloat(vb);
    const cmp = !isNaN(na) && !isNaN(nb) ? na - nb : va.localeCompare(vb);
    return asc ? cmp : -cmp;
  });
  table.dataset.sortCol = col;
  table.dataset.sortDir = asc ? 'asc' : 'desc';
  rows.forEach(r => tbody.appendChild(r));
}
"#;
