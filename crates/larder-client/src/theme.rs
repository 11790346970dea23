use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    /// Label for the toggle control, naming the theme it switches to.
    pub fn toggle_label(self) -> &'static str {
        match self {
            Theme::Light => "Switch to Dark Mode",
            Theme::Dark => "Switch to Light Mode",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The light/dark preference shared by every view.
#[derive(Clone)]
pub struct ThemeStore {
    theme: Arc<watch::Sender<Theme>>,
}

impl Default for ThemeStore {
    fn default() -> Self {
        Self::new(Theme::default())
    }
}

impl ThemeStore {
    pub fn new(initial: Theme) -> Self {
        let (theme, _) = watch::channel(initial);
        Self {
            theme: Arc::new(theme),
        }
    }

    pub fn current(&self) -> Theme {
        *self.theme.borrow()
    }

    pub fn set(&self, theme: Theme) {
        if self.theme.send_replace(theme) != theme {
            debug!("Theme set to {}", theme);
        }
    }

    /// Flip between light and dark. Returns the new theme.
    pub fn toggle(&self) -> Theme {
        let next = self.current().toggled();
        self.set(next);
        next
    }

    pub fn changes(&self) -> watch::Receiver<Theme> {
        self.theme.subscribe()
    }
}
