use core::fmt;

/// Layout markup, either given directly or produced on demand.
pub enum LayoutSource {
    Markup(String),
    /// Invoked once, when composition actually runs.
    Producer(Box<dyn FnOnce() -> String>),
}

impl LayoutSource {
    pub fn lazy<F>(producer: F) -> Self
    where
        F: FnOnce() -> String + 'static,
    {
        Self::Producer(Box::new(producer))
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self, Self::Producer(_))
    }

    pub fn resolve(self) -> String {
        match self {
            Self::Markup(markup) => markup,
            Self::Producer(producer) => producer(),
        }
    }
}

impl From<String> for LayoutSource {
    fn from(markup: String) -> Self {
        Self::Markup(markup)
    }
}

impl From<&str> for LayoutSource {
    fn from(markup: &str) -> Self {
        Self::Markup(markup.to_owned())
    }
}

impl fmt::Debug for LayoutSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Markup(markup) => f.debug_tuple("Markup").field(&markup.len()).finish(),
            Self::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}
