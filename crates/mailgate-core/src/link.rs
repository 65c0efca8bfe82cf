//! Signed unsubscribe/resubscribe links.
//!
//! A link carries an encoded `(email, section, category)` tuple in a `u=`
//! (unsubscribe) or `r=` (resubscribe) query parameter. The token is
//! self-authenticating, so processing the link needs no server-side state;
//! a forged or garbled token simply decodes to nothing.

use mailgate_token::Encoder;

use crate::section::SectionCategory;
use crate::{Error, Result};

const UNSUBSCRIBE_PARAM: &str = "u";
const RESUBSCRIBE_PARAM: &str = "r";

/// The intent decoded from a link, ready to apply to the stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedAction {
    /// An unsubscribe request.
    Unsubscribe(DecodedLink),
    /// A resubscribe request.
    Resubscribe(DecodedLink),
}

/// The tuple carried by a signed link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLink {
    /// Verified recipient address.
    pub email: String,
    /// Target section, when the link was scoped to one.
    pub section: Option<String>,
    /// Target category, when the link was scoped below the section.
    pub category: Option<String>,
    /// Any further arguments the encoder was given.
    pub arguments: Vec<Option<String>>,
}

/// Builds and parses signed subscribe links.
#[derive(Debug, Clone)]
pub struct LinkManager {
    encoder: Encoder,
}

impl LinkManager {
    /// Create a link manager around a token encoder.
    #[must_use]
    pub const fn new(encoder: Encoder) -> Self {
        Self { encoder }
    }

    /// Append an unsubscribe parameter for this category to `link`.
    ///
    /// Returns `None` for non-unsubscribable sections. When the section
    /// collapses category links, the token targets the whole section.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LinkParameterExists`] if the link already carries
    /// the parameter.
    pub fn unsubscribe_link(
        &self,
        link: &str,
        email: &str,
        category: &SectionCategory<'_>,
    ) -> Result<Option<String>> {
        self.build_link(UNSUBSCRIBE_PARAM, link, email, category)
    }

    /// Append a resubscribe parameter for this category to `link`.
    ///
    /// Same scoping rules as [`Self::unsubscribe_link`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::LinkParameterExists`] if the link already carries
    /// the parameter.
    pub fn resubscribe_link(
        &self,
        link: &str,
        email: &str,
        category: &SectionCategory<'_>,
    ) -> Result<Option<String>> {
        self.build_link(RESUBSCRIBE_PARAM, link, email, category)
    }

    /// Decode the action carried by a link, if any.
    ///
    /// Unsubscribe takes precedence when both parameters are present.
    /// Forged, tampered, or absent tokens yield `None`.
    #[must_use]
    pub fn decode_action(&self, link: &str) -> Option<DecodedAction> {
        if let Some(decoded) = self.decode_param(link, UNSUBSCRIBE_PARAM) {
            return Some(DecodedAction::Unsubscribe(decoded));
        }

        self.decode_param(link, RESUBSCRIBE_PARAM)
            .map(DecodedAction::Resubscribe)
    }

    fn build_link(
        &self,
        param: &str,
        link: &str,
        email: &str,
        category: &SectionCategory<'_>,
    ) -> Result<Option<String>> {
        if !category.is_unsubscribable() {
            return Ok(None);
        }

        let name = if category.section.unsubscribe_all_categories() {
            category.section.global_category().name()
        } else {
            category.name()
        };

        let link = link.trim_end_matches(['?', '&']);

        if link.contains(&format!("?{param}=")) || link.contains(&format!("&{param}=")) {
            return Err(Error::LinkParameterExists(param.to_string()));
        }

        let token = self
            .encoder
            .encode(email, &[Some(category.section.name()), Some(name)]);
        let separator = if link.contains('?') { '&' } else { '?' };

        Ok(Some(format!("{link}{separator}{param}={token}")))
    }

    fn decode_param(&self, link: &str, param: &str) -> Option<DecodedLink> {
        let query = link.split_once('?')?.1;

        let token = url::form_urlencoded::parse(query.as_bytes())
            .find(|(name, _)| name == param)
            .map(|(_, value)| value.into_owned())?;

        let mut values = self.encoder.decode(&token)?;

        let email = values.first().cloned().flatten()?;
        let section = values.get(1).cloned().flatten();
        let category = values.get(2).cloned().flatten();
        let arguments = if values.len() > 3 {
            values.split_off(3)
        } else {
            Vec::new()
        };

        Some(DecodedLink {
            email,
            section,
            category,
            arguments,
        })
    }
}
