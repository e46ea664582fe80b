use tabled::{settings::Style, Table, Tabled};

use crate::pair::{AssignOutcome, HistoryEntry};
use crate::tag::Tag;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

#[derive(Tabled)]
struct TagRow {
    #[tabled(rename = "Tag")]
    tag: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Last serial")]
    last_serial: String,
    #[tabled(rename = "Updated (UTC)")]
    updated_at: String,
}

#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Tag")]
    asset_tag: String,
    #[tabled(rename = "Serial")]
    serial: String,
    #[tabled(rename = "Message")]
    message: String,
}

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Tag")]
    asset_tag: String,
    #[tabled(rename = "Serial")]
    serial: String,
    #[tabled(rename = "Assigned (UTC)")]
    assigned_at: String,
    #[tabled(rename = "By")]
    assigned_by: String,
}

#[derive(Default)]
pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            metric: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        render(&self.rows)
    }
}

fn render<T: Tabled>(rows: &[T]) -> String {
    if rows.is_empty() {
        return String::new();
    }
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn stats_table(stats: &[(&str, &str)]) -> String {
    let mut builder = TableBuilder::new();
    for (label, value) in stats {
        builder.add_row(label, value);
    }
    builder.build()
}

pub fn tag_table(tags: &[Tag]) -> String {
    let rows: Vec<TagRow> = tags
        .iter()
        .map(|t| TagRow {
            tag: t.tag.clone(),
            status: t.status.to_string(),
            last_serial: t.last_serial.clone().unwrap_or_else(|| "-".to_string()),
            updated_at: t.updated_at.format(TIME_FORMAT).to_string(),
        })
        .collect();
    render(&rows)
}

pub fn outcome_table(outcomes: &[AssignOutcome]) -> String {
    let rows: Vec<OutcomeRow> = outcomes
        .iter()
        .enumerate()
        .map(|(i, o)| OutcomeRow {
            index: i + 1,
            status: o.status.to_string(),
            asset_tag: o.asset_tag.clone().unwrap_or_else(|| "-".to_string()),
            serial: o.serial.clone().unwrap_or_else(|| "-".to_string()),
            message: o.message.clone(),
        })
        .collect();
    render(&rows)
}

pub fn history_table(history: &[HistoryEntry]) -> String {
    let rows: Vec<HistoryRow> = history
        .iter()
        .map(|h| HistoryRow {
            asset_tag: h.asset_tag.clone(),
            serial: h.serial.clone(),
            assigned_at: h.assigned_at.format(TIME_FORMAT).to_string(),
            assigned_by: h.assigned_by.clone(),
        })
        .collect();
    render(&rows)
}
