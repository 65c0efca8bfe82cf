//! Mutable recipient batches for the before/after-send hooks.

/// A batch of recipient addresses being prepared for one send.
///
/// [`crate::DeliverabilityManager::before_send`] removes suspended and
/// unsubscribed addresses in place; callers can inspect [`Self::removed`]
/// afterwards to see who was dropped.
#[derive(Debug, Clone, Default)]
pub struct EmailBatch {
    emails: Vec<String>,
    removed: Vec<String>,
}

impl EmailBatch {
    /// Create a batch from recipient addresses.
    #[must_use]
    pub fn new<I>(emails: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            emails: emails.into_iter().map(Into::into).collect(),
            removed: Vec::new(),
        }
    }

    /// Whether any recipients remain.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }

    /// The remaining recipients, in original order.
    #[must_use]
    pub fn emails(&self) -> &[String] {
        &self.emails
    }

    /// The recipients removed so far, in removal order.
    #[must_use]
    pub fn removed(&self) -> &[String] {
        &self.removed
    }

    /// Remove one recipient. Returns whether it was present.
    pub fn remove(&mut self, email: &str) -> bool {
        let Some(position) = self.emails.iter().position(|e| e == email) else {
            return false;
        };

        self.removed.push(self.emails.remove(position));
        true
    }
}
