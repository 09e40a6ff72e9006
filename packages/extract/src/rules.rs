//! Declarative field rules.
//!
//! Every field of a retailer's detail page is described by a [`FieldSpec`]:
//! an ordered list of [`FieldRule`]s tried in turn until one yields text,
//! plus an optional regex the text must match. Rules are plain data so they
//! can live in retailer configuration files; [`CompiledSpec`] is the parsed
//! form used while extracting.

use scraper::{ElementRef, Selector};
use serde::{Deserialize, Serialize};
use wine_harvest_scraper::ScrapeError;
use wine_harvest_scraper::document::{
    ParsedDocument, collapse_whitespace, element_attr, element_text, element_text_excluding,
    parse_selector,
};

use crate::mixed_case::MixedCaseRules;

/// Characters separating sentence-like chunks for [`FieldRule::Keyword`].
const CHUNK_SEPARATORS: &[char] = &[',', '.', '!', '?', '<', '>', '\''];

/// One way of locating a field's text on a detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldRule {
    /// Text of the first element matching `selector`, without the text of
    /// descendants matching `exclude`.
    Text {
        /// Element selector.
        selector: String,
        /// Descendants whose text is dropped.
        #[serde(default)]
        exclude: Option<String>,
    },

    /// Attribute of the first element matching `selector`.
    Attribute {
        /// Element selector.
        selector: String,
        /// Attribute name.
        attribute: String,
    },

    /// Text of the `index`-th (zero-based) element matching `selector`, or of
    /// the first `inner` match inside it.
    Nth {
        /// Element selector.
        selector: String,
        /// Zero-based position among the matches.
        index: usize,
        /// Selector applied inside the chosen element.
        #[serde(default)]
        inner: Option<String>,
    },

    /// Text of the first element matching `selector` whose text contains
    /// `contains` (case-insensitive).
    Containing {
        /// Element selector.
        selector: String,
        /// Required substring.
        contains: String,
    },

    /// Value of a labelled block: the first `container` holding a `label`
    /// element (whose text equals `equals`, when given) yields the text of
    /// its `value` element.
    Labelled {
        /// Block selector.
        container: String,
        /// Label selector inside the block.
        label: String,
        /// Expected label text (case-insensitive).
        #[serde(default)]
        equals: Option<String>,
        /// Value selector inside the block.
        value: String,
    },

    /// Phrase lookup in running text: the text of `selector` is split into
    /// sentence chunks, scanned from the end, and the remainder of the first
    /// chunk containing one of `keywords` is returned (`"Product of France"`
    /// yields `"France"`).
    Keyword {
        /// Element selector.
        selector: String,
        /// Phrases introducing the value.
        keywords: Vec<String>,
    },

    /// Last word of the product name.
    NameLastWord,
}

/// Ordered fallback rules for one field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Rules tried in order.
    pub rules: Vec<FieldRule>,
    /// Regex the extracted text must match. The first capture group (or the
    /// whole match) becomes the value.
    #[serde(default)]
    pub pattern: Option<String>,
}

impl FieldSpec {
    /// Spec with a single rule.
    #[must_use]
    pub fn new(rule: FieldRule) -> Self {
        Self {
            rules: vec![rule],
            pattern: None,
        }
    }

    /// Adds a fallback rule.
    #[must_use]
    pub fn or(mut self, rule: FieldRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Sets the pattern.
    #[must_use]
    pub fn with_pattern(mut self, pattern: &str) -> Self {
        self.pattern = Some(pattern.to_owned());
        self
    }

    /// Shorthand for a single [`FieldRule::Text`] rule.
    #[must_use]
    pub fn text(selector: &str) -> Self {
        Self::new(FieldRule::Text {
            selector: selector.to_owned(),
            exclude: None,
        })
    }

    /// Shorthand for a single [`FieldRule::Attribute`] rule.
    #[must_use]
    pub fn attribute(selector: &str, attribute: &str) -> Self {
        Self::new(FieldRule::Attribute {
            selector: selector.to_owned(),
            attribute: attribute.to_owned(),
        })
    }
}

/// Extraction rules for one retailer's detail pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRules {
    /// Product name. A page without one is not a product page.
    pub name: FieldSpec,
    /// Selectors that must all match for a page to count as a product page.
    #[serde(default)]
    pub required: Vec<String>,
    /// Listed price.
    #[serde(default)]
    pub price: Option<FieldSpec>,
    /// Recorded as the price when no price element is present.
    #[serde(default)]
    pub price_unavailable: Option<String>,
    /// Bottle size.
    #[serde(default)]
    pub bottle_size: Option<FieldSpec>,
    /// Alcohol by volume.
    #[serde(default)]
    pub abv: Option<FieldSpec>,
    /// Vintage.
    #[serde(default)]
    pub vintage: Option<FieldSpec>,
    /// Country of origin.
    #[serde(default)]
    pub country: Option<FieldSpec>,
    /// Average rating.
    #[serde(default)]
    pub rating: Option<FieldSpec>,
    /// Review count.
    #[serde(default)]
    pub review_count: Option<FieldSpec>,
    /// Style label printed on the page.
    #[serde(default)]
    pub wine_type: Option<FieldSpec>,
    /// Mixed-case name tokens.
    #[serde(default)]
    pub mixed_case: MixedCaseRules,
}

impl ExtractionRules {
    /// Rules with only a name spec.
    #[must_use]
    pub fn new(name: FieldSpec) -> Self {
        Self {
            name,
            required: Vec::new(),
            price: None,
            price_unavailable: None,
            bottle_size: None,
            abv: None,
            vintage: None,
            country: None,
            rating: None,
            review_count: None,
            wine_type: None,
            mixed_case: MixedCaseRules::default(),
        }
    }
}

/// Invalid extraction rules.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// A selector failed to parse.
    #[error("field '{field}': {source}")]
    Selector {
        /// Field the selector belongs to.
        field: String,
        /// Parse failure.
        #[source]
        source: ScrapeError,
    },

    /// A pattern failed to compile.
    #[error("field '{field}': invalid pattern: {source}")]
    Pattern {
        /// Field the pattern belongs to.
        field: String,
        /// Compile failure.
        #[source]
        source: regex::Error,
    },

    /// A field spec lists no rules.
    #[error("field '{0}' has no rules")]
    Empty(String),
}

#[derive(Debug)]
enum CompiledRule {
    Text {
        selector: Selector,
        exclude: Option<Selector>,
    },
    Attribute {
        selector: Selector,
        attribute: String,
    },
    Nth {
        selector: Selector,
        index: usize,
        inner: Option<Selector>,
    },
    Containing {
        selector: Selector,
        needle: String,
    },
    Labelled {
        container: Selector,
        label: Selector,
        equals: Option<String>,
        value: Selector,
    },
    Keyword {
        selector: Selector,
        keywords: Vec<String>,
    },
    NameLastWord,
}

/// A [`FieldSpec`] with its selectors and pattern compiled.
#[derive(Debug)]
pub struct CompiledSpec {
    field: String,
    rules: Vec<CompiledRule>,
    pattern: Option<regex::Regex>,
}

impl CompiledSpec {
    /// Compiles `spec` for the field named `field`.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError`] on an invalid selector or pattern, or when the
    /// spec has no rules.
    pub fn compile(field: &str, spec: &FieldSpec) -> Result<Self, RuleError> {
        if spec.rules.is_empty() {
            return Err(RuleError::Empty(field.to_owned()));
        }

        let selector = |s: &str| {
            parse_selector(s).map_err(|source| RuleError::Selector {
                field: field.to_owned(),
                source,
            })
        };
        let optional = |s: Option<&String>| s.map(|s| selector(s)).transpose();

        let rules = spec
            .rules
            .iter()
            .map(|rule| -> Result<CompiledRule, RuleError> {
                Ok(match rule {
                    FieldRule::Text { selector: s, exclude } => CompiledRule::Text {
                        selector: selector(s)?,
                        exclude: optional(exclude.as_ref())?,
                    },
                    FieldRule::Attribute {
                        selector: s,
                        attribute,
                    } => CompiledRule::Attribute {
                        selector: selector(s)?,
                        attribute: attribute.clone(),
                    },
                    FieldRule::Nth {
                        selector: s,
                        index,
                        inner,
                    } => CompiledRule::Nth {
                        selector: selector(s)?,
                        index: *index,
                        inner: optional(inner.as_ref())?,
                    },
                    FieldRule::Containing { selector: s, contains } => CompiledRule::Containing {
                        selector: selector(s)?,
                        needle: contains.to_lowercase(),
                    },
                    FieldRule::Labelled {
                        container,
                        label,
                        equals,
                        value,
                    } => CompiledRule::Labelled {
                        container: selector(container)?,
                        label: selector(label)?,
                        equals: equals.as_ref().map(|e| collapse_whitespace(e).to_lowercase()),
                        value: selector(value)?,
                    },
                    FieldRule::Keyword { selector: s, keywords } => CompiledRule::Keyword {
                        selector: selector(s)?,
                        keywords: keywords.clone(),
                    },
                    FieldRule::NameLastWord => CompiledRule::NameLastWord,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let pattern = spec
            .pattern
            .as_deref()
            .map(regex::Regex::new)
            .transpose()
            .map_err(|source| RuleError::Pattern {
                field: field.to_owned(),
                source,
            })?;

        Ok(Self {
            field: field.to_owned(),
            rules,
            pattern,
        })
    }

    /// Name of the field this spec extracts.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Text of the first rule yielding a non-empty value that satisfies the
    /// pattern. `name` feeds [`FieldRule::NameLastWord`].
    #[must_use]
    pub fn apply(&self, doc: &ParsedDocument, name: Option<&str>) -> Option<String> {
        self.rules.iter().find_map(|rule| {
            let raw = rule.apply(doc, name)?;
            let text = collapse_whitespace(&raw);
            if text.is_empty() {
                return None;
            }
            match &self.pattern {
                None => Some(text),
                Some(pattern) => {
                    let caps = pattern.captures(&text)?;
                    let value = caps.get(1).or_else(|| caps.get(0))?;
                    Some(value.as_str().trim().to_owned())
                }
            }
        })
    }

    /// Whether a rule reads the product name.
    #[must_use]
    pub fn needs_name(&self) -> bool {
        self.rules
            .iter()
            .any(|rule| matches!(rule, CompiledRule::NameLastWord))
    }

    /// Whether any rule finds an element at all, regardless of its text.
    #[must_use]
    pub fn is_present(&self, doc: &ParsedDocument) -> bool {
        self.rules.iter().any(|rule| rule.is_present(doc))
    }
}

impl CompiledRule {
    fn apply(&self, doc: &ParsedDocument, name: Option<&str>) -> Option<String> {
        match self {
            Self::Text { selector, exclude } => {
                let element = doc.select_first(selector)?;
                Some(exclude.as_ref().map_or_else(
                    || element_text(element),
                    |exclude| element_text_excluding(element, exclude),
                ))
            }
            Self::Attribute {
                selector,
                attribute,
            } => element_attr(doc.select_first(selector)?, attribute),
            Self::Nth {
                selector,
                index,
                inner,
            } => {
                let element = *doc.select_all(selector).get(*index)?;
                match inner {
                    Some(inner) => element.select(inner).next().map(element_text),
                    None => Some(element_text(element)),
                }
            }
            Self::Containing { selector, needle } => doc
                .html()
                .select(selector)
                .map(element_text)
                .find(|text| text.to_lowercase().contains(needle.as_str())),
            Self::Labelled {
                container,
                label,
                equals,
                value,
            } => doc
                .html()
                .select(container)
                .find(|block| label_matches(*block, label, equals.as_deref()))
                .and_then(|block| block.select(value).next())
                .map(element_text),
            Self::Keyword { selector, keywords } => {
                let text = element_text(doc.select_first(selector)?);
                find_keyword_phrase(&text, keywords)
            }
            Self::NameLastWord => name?.split_whitespace().last().map(str::to_owned),
        }
    }

    fn is_present(&self, doc: &ParsedDocument) -> bool {
        match self {
            Self::Text { selector, .. }
            | Self::Attribute { selector, .. }
            | Self::Containing { selector, .. }
            | Self::Keyword { selector, .. } => doc.contains(selector),
            Self::Nth {
                selector, index, ..
            } => doc.select_all(selector).len() > *index,
            Self::Labelled { container, .. } => doc.contains(container),
            Self::NameLastWord => false,
        }
    }
}

fn label_matches(block: ElementRef<'_>, label: &Selector, equals: Option<&str>) -> bool {
    block.select(label).next().is_some_and(|element| {
        equals.is_none_or(|expected| element_text(element).to_lowercase() == expected)
    })
}

/// Scans sentence chunks of `text` from the end for one containing a keyword
/// and returns what follows the keyword.
fn find_keyword_phrase(text: &str, keywords: &[String]) -> Option<String> {
    text.split(CHUNK_SEPARATORS).rev().find_map(|chunk| {
        keywords.iter().find_map(|keyword| {
            let at = chunk.find(keyword.as_str())?;
            let rest = chunk[at + keyword.len()..].trim();
            (!rest.is_empty()).then(|| rest.to_owned())
        })
    })
}
