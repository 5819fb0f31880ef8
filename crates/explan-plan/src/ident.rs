use serde::{Deserialize, Serialize};

/// Word boundaries used when abbreviating factor names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WordStyle {
    /// Words are separated by underscores (`learning_rate`).
    Snake,
    /// Words start at interior uppercase letters (`learningRate`).
    Camel,
    /// Underscores win, then interior capitals, otherwise a single word.
    #[default]
    Auto,
}

impl WordStyle {
    /// Resolves [`WordStyle::Auto`] for `name`.
    pub fn detect(name: &str) -> WordStyle {
        if name.contains('_') {
            WordStyle::Snake
        } else if name.chars().skip(1).any(char::is_uppercase) {
            WordStyle::Camel
        } else {
            WordStyle::Snake
        }
    }
}

/// Truncation applied to every word of a factor name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Abbreviation {
    /// How the name is split into words.
    pub style: WordStyle,
    /// Number of characters kept per word (at least one).
    pub length: usize,
}

impl Abbreviation {
    /// Abbreviation with automatic word detection.
    pub fn new(length: usize) -> Self {
        Self {
            style: WordStyle::Auto,
            length,
        }
    }

    /// Abbreviates `name`, keeping the word delimiters.
    pub fn apply(&self, name: &str) -> String {
        let keep = self.length.max(1);
        let style = match self.style {
            WordStyle::Auto => WordStyle::detect(name),
            style => style,
        };
        match style {
            WordStyle::Camel => camel_words(name)
                .iter()
                .map(|word| word.chars().take(keep).collect::<String>())
                .collect(),
            _ => name
                .split('_')
                .map(|word| word.chars().take(keep).collect::<String>())
                .collect::<Vec<_>>()
                .join("_"),
        }
    }
}

fn camel_words(name: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    for ch in name.chars() {
        match words.last_mut() {
            Some(word) if !ch.is_uppercase() => word.push(ch),
            _ => words.push(ch.to_string()),
        }
    }
    words
}

/// How a setting is rendered into its storage key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifierOptions {
    /// Alphabetical factor order instead of declaration order.
    pub sort: bool,
    /// Separator placed between names and values.
    pub separator: String,
    /// Keep factors that have a single modality.
    pub include_singleton: bool,
    /// Drop factors sitting at their declared default.
    pub hide_default: bool,
    /// Factor names never rendered.
    pub hide: Vec<String>,
    /// Return the 128-bit digest of the identifier instead.
    pub hash_output: bool,
    /// Optional factor-name abbreviation.
    pub abbreviation: Option<Abbreviation>,
}

impl Default for IdentifierOptions {
    fn default() -> Self {
        Self {
            sort: true,
            separator: "_".to_string(),
            include_singleton: true,
            hide_default: true,
            hide: Vec::new(),
            hash_output: false,
            abbreviation: None,
        }
    }
}

impl IdentifierOptions {
    /// Sets the separator.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Hides the provided factors.
    pub fn hiding<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.hide.extend(names.into_iter().map(Into::into));
        self
    }

    /// Keeps or drops factors at their default.
    pub fn hide_default(mut self, hide: bool) -> Self {
        self.hide_default = hide;
        self
    }

    /// Keeps or drops singleton factors.
    pub fn include_singleton(mut self, include: bool) -> Self {
        self.include_singleton = include;
        self
    }

    /// Uses declaration order instead of alphabetical order.
    pub fn declaration_order(mut self) -> Self {
        self.sort = false;
        self
    }

    /// Renders the digest instead of the literal identifier.
    pub fn hashed(mut self) -> Self {
        self.hash_output = true;
        self
    }

    /// Abbreviates factor names.
    pub fn abbreviated(mut self, abbreviation: Abbreviation) -> Self {
        self.abbreviation = Some(abbreviation);
        self
    }
}
