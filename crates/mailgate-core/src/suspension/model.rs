//! Suspension data models.

/// Why an address is suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspensionKind {
    /// Permanent delivery failure. The only kind that also blocks the
    /// `essential` section.
    HardBounce,
    /// Transient delivery failures escalated past the bounce limit.
    SoftBounce,
    /// The recipient reported the mail as spam.
    SpamComplaint,
}

impl SuspensionKind {
    /// Every kind, in escalation-severity order.
    pub const ALL: [Self; 3] = [Self::HardBounce, Self::SoftBounce, Self::SpamComplaint];

    /// Parse from database string representation. Unknown values are `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hard_bounce" => Some(Self::HardBounce),
            "soft_bounce" => Some(Self::SoftBounce),
            "spam_complaint" => Some(Self::SpamComplaint),
            _ => None,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HardBounce => "hard_bounce",
            Self::SoftBounce => "soft_bounce",
            Self::SpamComplaint => "spam_complaint",
        }
    }
}
