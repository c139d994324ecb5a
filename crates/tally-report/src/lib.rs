//! tally-report — self-contained HTML reports.

pub mod html;

pub use html::{generate_ingest_html, generate_leaderboard_html, write_html};
