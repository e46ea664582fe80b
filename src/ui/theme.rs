use crate::tag::TagStatus;
use owo_colors::Style;
use std::sync::OnceLock;

static THEME: OnceLock<Theme> = OnceLock::new();

/// Terminal styles for ledger output
#[derive(Debug, Clone)]
pub struct Theme {
    pub heading: Style,
    pub ok: Style,
    pub warn: Style,
    pub label: Style,
    pub muted: Style,
    /// Tag bound to a serial
    pub used: Style,
    /// Tag registered but never bound
    pub unused: Style,
}

impl Theme {
    /// Colored on an interactive terminal unless `NO_COLOR` is set
    pub fn detect() -> Self {
        let no_color = std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty());
        if no_color || !console::Term::stdout().is_term() {
            return Self::plain();
        }
        Self::colored()
    }

    pub fn colored() -> Self {
        Self {
            heading: Style::new().cyan().bold(),
            ok: Style::new().green().bold(),
            warn: Style::new().yellow().bold(),
            label: Style::new().white().dimmed(),
            muted: Style::new().bright_black(),
            used: Style::new().green(),
            unused: Style::new().yellow(),
        }
    }

    pub fn plain() -> Self {
        Self {
            heading: Style::new(),
            ok: Style::new(),
            warn: Style::new(),
            label: Style::new(),
            muted: Style::new(),
            used: Style::new(),
            unused: Style::new(),
        }
    }

    pub fn status(&self, status: TagStatus) -> Style {
        match status {
            TagStatus::Used => self.used.clone(),
            TagStatus::Unused => self.unused.clone(),
        }
    }
}

pub fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::detect)
}
