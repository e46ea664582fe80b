//! Terminal output for the CLI

pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{header, muted, section, status, success, summary_row, tag_status, warn};
pub use table::{history_table, outcome_table, stats_table, tag_table, TableBuilder};
pub use theme::{theme, Theme};
