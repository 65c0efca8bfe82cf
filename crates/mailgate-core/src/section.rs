//! Sections and categories: the static delivery-stream directory.
//!
//! A *section* is a top-level delivery stream (`transactional`,
//! `marketing`, ...) with its own unsubscribe semantics; a *category* is a
//! sub-topic within a section a recipient can opt out of individually. The
//! reserved `essential` section is never unsubscribable and carries no
//! categories.
//!
//! The catalog is populated once at startup and treated as immutable
//! afterwards; every lookup failure here is a configuration error, surfaced
//! loudly rather than at send time.

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

/// Sentinel category meaning "the whole section, independent of category".
pub const GLOBAL_CATEGORY: &str = "*";

/// Maximum length of a section or category name.
pub const MAX_NAME_LEN: usize = 30;

/// Section and category configuration errors. All are fatal at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SectionError {
    /// Lookup of a section that was never registered.
    #[error("section `{0}` does not exist")]
    UnknownSection(String),

    /// Lookup of a category missing from its section.
    #[error("category `{category}` does not exist in section `{section}`")]
    UnknownCategory {
        /// Section the lookup was scoped to.
        section: String,
        /// The unknown category name.
        category: String,
    },

    /// Registration of a section name that already exists.
    #[error("section `{0}` already exists")]
    DuplicateSection(String),

    /// The same category listed twice in one section.
    #[error("category `{0}` is duplicated")]
    DuplicateCategory(String),

    /// A category literally named with the global sentinel.
    #[error("category name `{0}` is reserved")]
    ReservedCategory(String),

    /// A section or category name over [`MAX_NAME_LEN`] characters.
    #[error("name `{0}` is longer than {MAX_NAME_LEN} characters")]
    NameTooLong(String),

    /// A name containing the token field separator.
    #[error("name `{0}` contains the reserved separator `.`")]
    NameContainsSeparator(String),

    /// A boolean-map update naming a different category set than the section.
    #[error("category set mismatch in section `{section}`: missing [{missing}], extra [{extra}]")]
    CategorySetMismatch {
        /// Section being updated.
        section: String,
        /// Section categories absent from the update, comma-separated.
        missing: String,
        /// Update categories absent from the section, comma-separated.
        extra: String,
    },
}

fn validate_name(name: &str) -> Result<(), SectionError> {
    if name.len() > MAX_NAME_LEN {
        return Err(SectionError::NameTooLong(name.to_string()));
    }

    if name.contains('.') {
        return Err(SectionError::NameContainsSeparator(name.to_string()));
    }

    Ok(())
}

/// Declarative description of a section, validated into a [`Section`] when
/// registered with [`Sections::add`].
///
/// Deserializable so catalogs can live in configuration files:
///
/// ```toml
/// name = "notifications"
/// categories = ["comment", "mention"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct SectionBlueprint {
    name: String,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default = "default_true")]
    unsubscribable: bool,
    #[serde(default = "default_true")]
    unsubscribe_all_categories: bool,
}

const fn default_true() -> bool {
    true
}

impl SectionBlueprint {
    /// Start a blueprint for an unsubscribable section without categories.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            categories: Vec::new(),
            unsubscribable: true,
            unsubscribe_all_categories: true,
        }
    }

    /// Add opt-out categories to the section.
    #[must_use]
    pub fn with_categories<I>(mut self, categories: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    /// Mark the section as non-unsubscribable (always delivered).
    #[must_use]
    pub const fn non_unsubscribable(mut self) -> Self {
        self.unsubscribable = false;
        self
    }

    /// Emit per-category links instead of collapsing them to the whole
    /// section.
    #[must_use]
    pub const fn unsubscribe_per_category(mut self) -> Self {
        self.unsubscribe_all_categories = false;
        self
    }

    fn build(self) -> Result<Section, SectionError> {
        validate_name(&self.name)?;

        let mut categories: Vec<String> = Vec::with_capacity(self.categories.len());

        for category in self.categories {
            validate_name(&category)?;

            if category == GLOBAL_CATEGORY {
                return Err(SectionError::ReservedCategory(category));
            }

            if categories.contains(&category) {
                return Err(SectionError::DuplicateCategory(category));
            }

            categories.push(category);
        }

        Ok(Section {
            name: self.name,
            categories,
            unsubscribable: self.unsubscribable,
            unsubscribe_all_categories: self.unsubscribe_all_categories,
        })
    }
}

/// An immutable, registered delivery stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    name: String,
    categories: Vec<String>,
    unsubscribable: bool,
    unsubscribe_all_categories: bool,
}

impl Section {
    /// Name of the reserved non-unsubscribable section.
    pub const ESSENTIAL: &'static str = "essential";

    fn essential() -> Self {
        Self {
            name: Self::ESSENTIAL.to_string(),
            categories: Vec::new(),
            unsubscribable: false,
            unsubscribe_all_categories: true,
        }
    }

    /// Section name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registered category names, in registration order.
    #[must_use]
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Whether the section declares any categories.
    #[must_use]
    pub const fn has_categories(&self) -> bool {
        !self.categories.is_empty()
    }

    /// Whether `name` is a category of this section or the global sentinel.
    #[must_use]
    pub fn has_category(&self, name: &str) -> bool {
        name == GLOBAL_CATEGORY || self.categories.iter().any(|c| c == name)
    }

    /// Resolve a category of this section.
    ///
    /// # Errors
    ///
    /// Returns [`SectionError::UnknownCategory`] if the name is neither a
    /// registered category nor the global sentinel.
    pub fn category<'a>(&'a self, name: &'a str) -> Result<SectionCategory<'a>, SectionError> {
        if self.has_category(name) {
            Ok(SectionCategory {
                section: self,
                name,
            })
        } else {
            Err(SectionError::UnknownCategory {
                section: self.name.clone(),
                category: name.to_string(),
            })
        }
    }

    /// The whole-section category.
    #[must_use]
    pub const fn global_category(&self) -> SectionCategory<'_> {
        SectionCategory {
            section: self,
            name: GLOBAL_CATEGORY,
        }
    }

    /// Whether recipients may opt out of this section at all.
    #[must_use]
    pub const fn is_unsubscribable(&self) -> bool {
        self.unsubscribable
    }

    /// Whether this is the reserved `essential` section.
    #[must_use]
    pub fn is_essential(&self) -> bool {
        self.name == Self::ESSENTIAL
    }

    /// Whether links for any category collapse to the whole section.
    #[must_use]
    pub const fn unsubscribe_all_categories(&self) -> bool {
        self.unsubscribe_all_categories
    }

    /// Require `categories` to be exactly this section's category set.
    ///
    /// # Errors
    ///
    /// Returns [`SectionError::UnknownCategory`] for names outside the
    /// section and [`SectionError::CategorySetMismatch`] when the sets
    /// differ.
    pub fn validate_categories(&self, categories: &[&str]) -> Result<(), SectionError> {
        for category in categories {
            if !self.has_category(category) {
                return Err(SectionError::UnknownCategory {
                    section: self.name.clone(),
                    category: (*category).to_string(),
                });
            }
        }

        if categories.len() == self.categories.len() {
            return Ok(());
        }

        let missing: Vec<&str> = self
            .categories
            .iter()
            .map(String::as_str)
            .filter(|c| !categories.contains(c))
            .collect();
        let extra: Vec<&str> = categories
            .iter()
            .copied()
            .filter(|c| !self.categories.iter().any(|s| s == c))
            .collect();

        Err(SectionError::CategorySetMismatch {
            section: self.name.clone(),
            missing: missing.join(", "),
            extra: extra.join(", "),
        })
    }
}

/// A (section, category-or-global) pair resolved from the catalog.
#[derive(Debug, Clone, Copy)]
pub struct SectionCategory<'a> {
    /// The owning section.
    pub section: &'a Section,
    name: &'a str,
}

impl<'a> SectionCategory<'a> {
    /// Category name, or the global sentinel.
    #[must_use]
    pub const fn name(&self) -> &'a str {
        self.name
    }

    /// Whether this is the whole-section sentinel.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.name == GLOBAL_CATEGORY
    }

    /// Whether the owning section may be opted out of.
    #[must_use]
    pub const fn is_unsubscribable(&self) -> bool {
        self.section.is_unsubscribable()
    }
}

/// The startup-validated catalog of all sections.
#[derive(Debug, Clone)]
pub struct Sections {
    sections: HashMap<String, Section>,
}

impl Sections {
    /// Create a catalog containing only the reserved `essential` section.
    #[must_use]
    pub fn new() -> Self {
        let essential = Section::essential();

        Self {
            sections: HashMap::from([(essential.name.clone(), essential)]),
        }
    }

    /// Validate and register a section.
    ///
    /// # Errors
    ///
    /// Returns a [`SectionError`] for invalid names, duplicate categories,
    /// the reserved category sentinel, or a duplicate section name.
    pub fn add(&mut self, blueprint: SectionBlueprint) -> Result<(), SectionError> {
        let section = blueprint.build()?;

        if self.sections.contains_key(&section.name) {
            return Err(SectionError::DuplicateSection(section.name));
        }

        self.sections.insert(section.name.clone(), section);
        Ok(())
    }

    /// Resolve a section by name.
    ///
    /// # Errors
    ///
    /// Returns [`SectionError::UnknownSection`] for unregistered names.
    pub fn section(&self, name: &str) -> Result<&Section, SectionError> {
        self.sections
            .get(name)
            .ok_or_else(|| SectionError::UnknownSection(name.to_string()))
    }

    /// Resolve a category within a section.
    ///
    /// # Errors
    ///
    /// Returns a [`SectionError`] if either name is unknown.
    pub fn category<'a>(
        &'a self,
        section: &str,
        category: &'a str,
    ) -> Result<SectionCategory<'a>, SectionError> {
        self.section(section)?.category(category)
    }

    /// The reserved `essential` section.
    ///
    /// # Panics
    ///
    /// Never panics; the section is inserted at construction.
    #[must_use]
    pub fn essential(&self) -> &Section {
        self.sections
            .get(Section::ESSENTIAL)
            .unwrap_or_else(|| unreachable!("essential section is always registered"))
    }
}

impl Default for Sections {
    fn default() -> Self {
        Self::new()
    }
}
