//! Colored terminal output for CLI status lines.
//!
//! Everything goes to stderr so stdout stays free for piping.

use console::{Style, Term};

pub(crate) struct Output {
    term: Term,
    label: Style,
    ok: Style,
    warn: Style,
    err: Style,
    accent: Style,
}

impl Output {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            term: Term::stderr(),
            label: Style::new().dim(),
            ok: Style::new().green(),
            warn: Style::new().yellow(),
            err: Style::new().red(),
            accent: Style::new().cyan().bold(),
        }
    }

    /// Plain line.
    pub(crate) fn info(&self, msg: &str) {
        self.line(msg);
    }

    /// `label: value` with a dimmed label.
    pub(crate) fn field(&self, label: &str, value: impl std::fmt::Display) {
        self.line(&format!("{} {value}", self.label.apply_to(format!("{label}:"))));
    }

    pub(crate) fn success(&self, msg: &str) {
        self.line(&self.ok.apply_to(msg).to_string());
    }

    pub(crate) fn warning(&self, msg: &str) {
        self.line(&self.warn.apply_to(msg).to_string());
    }

    pub(crate) fn error(&self, msg: &str) {
        self.line(&self.err.apply_to(msg).to_string());
    }

    pub(crate) fn highlight(&self, msg: &str) {
        self.line(&self.accent.apply_to(msg).to_string());
    }

    fn line(&self, text: &str) {
        // A closed stderr is not worth failing over
        let _ = self.term.write_line(text);
    }
}
