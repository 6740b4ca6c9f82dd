//! Hooks and pure helpers for the presentation layer.

use std::fmt::Display;

use chrono::{DateTime, TimeZone};

/// Visibility controls the control server can drive.
///
/// Implementations run on the presentation layer's own context; the server
/// hands commands over a channel and never calls these directly.
pub trait Presenter {
    fn toggle(&mut self);
    fn show(&mut self);
    fn hide(&mut self);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Visibility {
    #[default]
    Hidden,
    Visible,
}

impl Visibility {
    pub fn is_visible(self) -> bool {
        self == Self::Visible
    }
}

impl Presenter for Visibility {
    fn toggle(&mut self) {
        *self = match self {
            Self::Hidden => Self::Visible,
            Self::Visible => Self::Hidden,
        };
    }

    fn show(&mut self) {
        *self = Self::Visible;
    }

    fn hide(&mut self) {
        *self = Self::Hidden;
    }
}

/// Collapses `text` onto one line for list rendering: carriage returns are
/// dropped, newlines and tabs become visible marks, other control characters
/// become `•`, and the result is cut to `max_chars` with a trailing `…`.
pub fn preview_line(text: &str, max_chars: usize) -> String {
    let chars: Vec<char> = text
        .chars()
        .filter(|c| *c != '\r')
        .map(|c| match c {
            '\n' => '⏎',
            '\t' => '⇥',
            c if c.is_control() => '•',
            c => c,
        })
        .collect();

    if chars.len() <= max_chars {
        return chars.into_iter().collect();
    }

    let mut out: String = chars[..max_chars.saturating_sub(1)].iter().collect();
    out.push('…');
    out
}

/// Human label for a capture time relative to `now`, in `now`'s time zone.
pub fn friendly_label<Tz>(timestamp_unix_ms: u64, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let Ok(millis) = i64::try_from(timestamp_unix_ms) else {
        return String::new();
    };
    let Some(then) = now.timezone().timestamp_millis_opt(millis).single() else {
        return String::new();
    };

    let seconds = now
        .clone()
        .signed_duration_since(then.clone())
        .num_seconds()
        .max(0);
    if seconds < 45 {
        return "now".to_owned();
    }
    if seconds < 120 {
        return "1 minute ago".to_owned();
    }
    let minutes = seconds / 60;
    if minutes < 45 {
        return format!("{minutes} minutes ago");
    }
    if minutes < 90 {
        return "1 hour ago".to_owned();
    }

    let then_day = then.date_naive();
    let today = now.date_naive();
    if then_day == today {
        return format!("today {}", then.format("%H:%M"));
    }
    if then_day.succ_opt() == Some(today) {
        return format!("yesterday {}", then.format("%H:%M"));
    }
    then.format("%d/%m %H:%M").to_string()
}
