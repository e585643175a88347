//! Form state shared by the editing screens.
//!
//! Every form walks `Idle -> Submitting -> Succeeded | Failed`, shows its
//! outcome in a [`StatusBanner`] that clears itself, and edits a
//! [`Snapshot`] so a cancelled edit can be reverted.

use std::time::{Duration, Instant};

/// How long a banner stays on screen.
pub const BANNER_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FormState {
    #[default]
    Idle,
    Submitting,
    Succeeded,
    Failed(String),
}

impl FormState {
    /// Moves to `Submitting`. Returns `false` if a submit is already running.
    pub fn begin(&mut self) -> bool {
        if *self == FormState::Submitting {
            return false;
        }
        *self = FormState::Submitting;
        true
    }

    pub fn finish<T, E>(&mut self, result: &Result<T, E>, describe: impl FnOnce(&E) -> String) {
        *self = match result {
            Ok(_) => FormState::Succeeded,
            Err(err) => FormState::Failed(describe(err)),
        };
    }

    pub fn is_submitting(&self) -> bool {
        *self == FormState::Submitting
    }

    pub fn reset(&mut self) {
        *self = FormState::Idle;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerKind {
    Success,
    Error,
}

/// A transient message tied to one region of a screen.
#[derive(Debug, Clone, Default)]
pub struct StatusBanner {
    message: Option<(BannerKind, String)>,
    shown_at: Option<Instant>,
}

impl StatusBanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.show(BannerKind::Success, message.into());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.show(BannerKind::Error, message.into());
    }

    fn show(&mut self, kind: BannerKind, message: String) {
        self.message = Some((kind, message));
        self.shown_at = Some(Instant::now());
    }

    pub fn clear(&mut self) {
        self.message = None;
        self.shown_at = None;
    }

    /// Clears the banner once it has been visible for [`BANNER_TIMEOUT`].
    pub fn check_timeout(&mut self) {
        if let Some(shown_at) = self.shown_at {
            if shown_at.elapsed() > BANNER_TIMEOUT {
                self.clear();
            }
        }
    }

    pub fn current(&self) -> Option<(BannerKind, &str)> {
        self.message
            .as_ref()
            .map(|(kind, message)| (*kind, message.as_str()))
    }

    pub fn is_error(&self) -> bool {
        matches!(self.message, Some((BannerKind::Error, _)))
    }

    pub fn is_success(&self) -> bool {
        matches!(self.message, Some((BannerKind::Success, _)))
    }
}

/// A value under edit and the last saved copy of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot<T> {
    pub current: T,
    original: T,
}

impl<T: Clone + PartialEq> Snapshot<T> {
    pub fn new(value: T) -> Self {
        Self {
            current: value.clone(),
            original: value,
        }
    }

    pub fn original(&self) -> &T {
        &self.original
    }

    pub fn is_dirty(&self) -> bool {
        self.current != self.original
    }

    /// Discards unsaved edits.
    pub fn revert(&mut self) {
        self.current = self.original.clone();
    }

    /// Accepts `saved` as the new baseline.
    pub fn commit(&mut self, saved: T) {
        self.current = saved.clone();
        self.original = saved;
    }
}

/// Applies a text-editing key to `value`. Returns `true` if it changed.
pub fn edit_text(value: &mut String, key: crossterm::event::KeyCode) -> bool {
    use crossterm::event::KeyCode;
    match key {
        KeyCode::Char(c) => {
            value.push(c);
            true
        }
        KeyCode::Backspace => value.pop().is_some(),
        _ => false,
    }
}

/// `None` for blank input, trimmed text otherwise.
pub fn optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyCode;

    #[test]
    fn form_state_rejects_double_submit() {
        let mut state = FormState::default();
        assert!(state.begin());
        assert!(!state.begin());
        state.finish(&Err::<(), _>("boom"), |e| e.to_string());
        assert_eq!(state, FormState::Failed("boom".into()));
        assert!(state.begin());
        state.finish(&Ok::<_, String>(()), |e| e.clone());
        assert_eq!(state, FormState::Succeeded);
    }

    #[test]
    fn banner_expires_after_timeout() {
        let mut banner = StatusBanner::new();
        banner.error("Save failed");
        assert!(banner.is_error());
        banner.check_timeout();
        assert_eq!(banner.current(), Some((BannerKind::Error, "Save failed")));

        banner.shown_at = Some(Instant::now() - BANNER_TIMEOUT - Duration::from_millis(1));
        banner.check_timeout();
        assert_eq!(banner.current(), None);
    }

    #[test]
    fn snapshot_revert_and_commit() {
        let mut snapshot = Snapshot::new(String::from("St. Mary"));
        snapshot.current.push_str(" Hospital");
        assert!(snapshot.is_dirty());
        snapshot.revert();
        assert_eq!(snapshot.current, "St. Mary");

        snapshot.commit("Lakeside".to_string());
        assert_eq!(snapshot.original(), "Lakeside");
        assert!(!snapshot.is_dirty());
    }

    #[test]
    fn text_editing_keys() {
        let mut value = String::from("ab");
        assert!(edit_text(&mut value, KeyCode::Char('c')));
        assert!(edit_text(&mut value, KeyCode::Backspace));
        assert!(!edit_text(&mut value, KeyCode::Up));
        assert_eq!(value, "ab");
        assert_eq!(optional("  "), None);
        assert_eq!(optional(" x "), Some("x".into()));
    }
}
