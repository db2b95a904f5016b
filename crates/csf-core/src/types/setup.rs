use std::fmt::Display;

/// Setup type strings that resolve to a full card setup.
///
/// Besides the canonical `card`, merchants pass scheme aliases and individual brand
/// identifiers; they all collect the same card number, expiry and security code fields.
pub const CARD_ALIASES: &[&str] = &[
    "card",
    "scheme",
    "storedcard",
    "credit",
    "debit",
    "visa",
    "mc",
    "mastercard",
    "amex",
    "maestro",
    "bcmc",
    "diners",
    "discover",
    "jcb",
    "cup",
    "unionpay",
    "cartebancaire",
    "elo",
    "hipercard",
    "mir",
    "uatp",
    "dankort",
    "troy",
    "cabal",
    "naranja",
];

/// Classification of a setup type string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SetupKind {
    /// Card number, expiry and security code fields.
    Card,
    /// One field for the given (unchanged) setup type.
    SingleGenericField(String),
}

impl SetupKind {
    /// Classify a setup type. A blank type defaults to [`SetupKind::Card`].
    pub fn classify(setup_type: &str) -> Self {
        let normalized = setup_type.trim().to_ascii_lowercase();
        if normalized.is_empty() || CARD_ALIASES.contains(&normalized.as_str()) {
            SetupKind::Card
        } else {
            SetupKind::SingleGenericField(setup_type.to_string())
        }
    }

    pub fn is_card(&self) -> bool {
        matches!(self, SetupKind::Card)
    }

    /// The type string frames are loaded with.
    pub fn frame_type(&self) -> &str {
        match self {
            SetupKind::Card => "card",
            SetupKind::SingleGenericField(t) => t,
        }
    }
}

impl Display for SetupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.frame_type())
    }
}
