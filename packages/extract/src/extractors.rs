//! Field extractors.
//!
//! [`ExtractorSet`] is the per-retailer bundle of field extractors applied to
//! a parsed detail page. Every extractor fails closed: a missing element or
//! unparseable text yields `None` and is logged at debug level. The one
//! exception is a bottle size in an unknown format, which is reported as
//! [`UnrecognizedFormat`] so it cannot go unnoticed.
//!
//! [`ConfiguredExtractors`] builds an extractor set from declarative
//! [`ExtractionRules`].

use wine_harvest_catalog_models::Price;
use wine_harvest_scraper::document::{ParsedDocument, parse_selector};

use crate::mixed_case::{MixedCaseRules, classify_mixed_case};
use crate::rules::{CompiledSpec, ExtractionRules, FieldSpec, RuleError};
use crate::units::{
    UnrecognizedFormat, parse_bottle_size_cl, parse_count, parse_first_number, parse_price,
};

/// Field extractors for one retailer's detail pages.
pub trait ExtractorSet: Send + Sync {
    /// Whether `doc` is a product detail page at all.
    fn is_product_page(&self, doc: &ParsedDocument) -> bool;

    /// Product name.
    fn extract_name(&self, doc: &ParsedDocument) -> Option<String>;

    /// Listed price, or the retailer's "unavailable" label when the page
    /// shows no price.
    fn extract_price(&self, doc: &ParsedDocument) -> Option<Price>;

    /// Bottle size in centilitres.
    ///
    /// # Errors
    ///
    /// Returns [`UnrecognizedFormat`] when size text is present but in no
    /// known format.
    fn extract_bottle_size_cl(&self, doc: &ParsedDocument)
    -> Result<Option<f64>, UnrecognizedFormat>;

    /// Alcohol by volume, percent.
    fn extract_abv_percent(&self, doc: &ParsedDocument) -> Option<f64>;

    /// Vintage as printed.
    fn extract_vintage_year(&self, doc: &ParsedDocument) -> Option<String>;

    /// Country of origin.
    fn extract_country(&self, doc: &ParsedDocument) -> Option<String>;

    /// Average customer rating.
    fn extract_rating(&self, doc: &ParsedDocument) -> Option<f64>;

    /// Number of customer reviews.
    fn extract_review_count(&self, doc: &ParsedDocument) -> Option<u32>;

    /// Style label printed on the page.
    fn extract_wine_type(&self, doc: &ParsedDocument) -> Option<String>;

    /// Whether a product called `name` is a mixed case.
    fn is_mixed_case(&self, name: &str) -> bool;
}

/// [`ExtractorSet`] driven by [`ExtractionRules`].
#[derive(Debug)]
pub struct ConfiguredExtractors {
    name: CompiledSpec,
    required: Vec<scraper::Selector>,
    price: Option<CompiledSpec>,
    price_unavailable: Option<String>,
    bottle_size: Option<CompiledSpec>,
    abv: Option<CompiledSpec>,
    vintage: Option<CompiledSpec>,
    country: Option<CompiledSpec>,
    rating: Option<CompiledSpec>,
    review_count: Option<CompiledSpec>,
    wine_type: Option<CompiledSpec>,
    mixed_case: MixedCaseRules,
}

fn compile(field: &str, spec: Option<&FieldSpec>) -> Result<Option<CompiledSpec>, RuleError> {
    spec.map(|spec| CompiledSpec::compile(field, spec))
        .transpose()
}

impl ConfiguredExtractors {
    /// Compiles `rules`.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError`] if any selector or pattern is invalid.
    pub fn new(rules: &ExtractionRules) -> Result<Self, RuleError> {
        let required = rules
            .required
            .iter()
            .map(|selector| {
                parse_selector(selector).map_err(|source| RuleError::Selector {
                    field: "required".to_owned(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: CompiledSpec::compile("name", &rules.name)?,
            required,
            price: compile("price", rules.price.as_ref())?,
            price_unavailable: rules.price_unavailable.clone(),
            bottle_size: compile("bottle_size", rules.bottle_size.as_ref())?,
            abv: compile("abv", rules.abv.as_ref())?,
            vintage: compile("vintage", rules.vintage.as_ref())?,
            country: compile("country", rules.country.as_ref())?,
            rating: compile("rating", rules.rating.as_ref())?,
            review_count: compile("review_count", rules.review_count.as_ref())?,
            wine_type: compile("wine_type", rules.wine_type.as_ref())?,
            mixed_case: rules.mixed_case.clone(),
        })
    }

    /// Applies an optional spec, logging when it finds nothing.
    fn text(&self, spec: Option<&CompiledSpec>, doc: &ParsedDocument) -> Option<String> {
        let spec = spec?;
        let name = if spec.needs_name() {
            self.extract_name(doc)
        } else {
            None
        };
        let value = spec.apply(doc, name.as_deref());
        if value.is_none() {
            log::debug!("No {} on page", spec.field());
        }
        value
    }

    /// Applies an optional spec and parses the text with `parse`.
    fn parsed<T>(
        &self,
        spec: Option<&CompiledSpec>,
        doc: &ParsedDocument,
        parse: fn(&str) -> Option<T>,
    ) -> Option<T> {
        let text = self.text(spec, doc)?;
        let value = parse(&text);
        if value.is_none() {
            log::debug!(
                "Could not parse {} from '{text}'",
                spec.map_or("field", CompiledSpec::field)
            );
        }
        value
    }
}

impl ExtractorSet for ConfiguredExtractors {
    fn is_product_page(&self, doc: &ParsedDocument) -> bool {
        self.required.iter().all(|selector| doc.contains(selector))
            && self.name.apply(doc, None).is_some()
    }

    fn extract_name(&self, doc: &ParsedDocument) -> Option<String> {
        self.name.apply(doc, None)
    }

    fn extract_price(&self, doc: &ParsedDocument) -> Option<Price> {
        let spec = self.price.as_ref()?;
        if !spec.is_present(doc) {
            return self.price_unavailable.clone().map(Price::Unavailable);
        }
        self.parsed(Some(spec), doc, parse_price).map(Price::Amount)
    }

    fn extract_bottle_size_cl(
        &self,
        doc: &ParsedDocument,
    ) -> Result<Option<f64>, UnrecognizedFormat> {
        self.text(self.bottle_size.as_ref(), doc)
            .map(|text| parse_bottle_size_cl(&text))
            .transpose()
    }

    fn extract_abv_percent(&self, doc: &ParsedDocument) -> Option<f64> {
        self.parsed(self.abv.as_ref(), doc, parse_first_number)
    }

    fn extract_vintage_year(&self, doc: &ParsedDocument) -> Option<String> {
        self.text(self.vintage.as_ref(), doc)
    }

    fn extract_country(&self, doc: &ParsedDocument) -> Option<String> {
        self.text(self.country.as_ref(), doc)
    }

    fn extract_rating(&self, doc: &ParsedDocument) -> Option<f64> {
        self.parsed(self.rating.as_ref(), doc, parse_first_number)
    }

    fn extract_review_count(&self, doc: &ParsedDocument) -> Option<u32> {
        self.parsed(self.review_count.as_ref(), doc, parse_count)
    }

    fn extract_wine_type(&self, doc: &ParsedDocument) -> Option<String> {
        self.text(self.wine_type.as_ref(), doc)
    }

    fn is_mixed_case(&self, name: &str) -> bool {
        classify_mixed_case(name, &self.mixed_case)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::FieldRule;

    const PRODUCT: &str = r#"
        <h1 class="prod-name">Chateau Musar Red 2016</h1>
        <span class="price-per-bottle">£34.99</span>
        <span class="no-reviews">(1,021 reviews)</span>
        <span class="rating-score">4.6 out of 5</span>
        <ul class="right">
          <li><div class="detail-text">14% ABV</div></li>
          <li><div class="detail-text">Cinsault blend</div></li>
          <li><div class="detail-text">75cl</div></li>
        </ul>
        <ul class="left">
          <li><span class="grape-icon"></span><div class="detail-text"><a>Cinsault</a></div></li>
          <li><span class="country-icon"></span><div class="detail-text"><a>Lebanon</a></div></li>
        </ul>
    "#;

    fn rules() -> ExtractionRules {
        let right = |index| {
            FieldSpec::new(FieldRule::Nth {
                selector: "ul.right li".to_owned(),
                index,
                inner: Some("div.detail-text".to_owned()),
            })
        };
        ExtractionRules {
            required: vec!["h1.prod-name".to_owned()],
            price: Some(FieldSpec::text("span.price-per-bottle")),
            price_unavailable: Some("out of stock".to_owned()),
            bottle_size: Some(right(2)),
            abv: Some(right(0)),
            vintage: Some(
                FieldSpec::new(FieldRule::NameLastWord).with_pattern(r"^((?:19|20)\d{2}|NV)$"),
            ),
            country: Some(FieldSpec::new(FieldRule::Labelled {
                container: "ul.left li".to_owned(),
                label: "span.country-icon".to_owned(),
                equals: None,
                value: "div.detail-text a".to_owned(),
            })),
            rating: Some(FieldSpec::text("span.rating-score")),
            review_count: Some(FieldSpec::text("span.no-reviews")),
            ..ExtractionRules::new(FieldSpec::text("h1.prod-name"))
        }
    }

    fn extract(html: &str) -> (ConfiguredExtractors, ParsedDocument) {
        (
            ConfiguredExtractors::new(&rules()).unwrap(),
            ParsedDocument::parse(html),
        )
    }

    #[test]
    fn extracts_every_configured_field() {
        let (x, doc) = extract(PRODUCT);
        assert!(x.is_product_page(&doc));
        assert_eq!(x.extract_name(&doc).as_deref(), Some("Chateau Musar Red 2016"));
        assert_eq!(x.extract_price(&doc), Some(Price::Amount(34.99)));
        assert_eq!(x.extract_bottle_size_cl(&doc).unwrap(), Some(75.0));
        assert_eq!(x.extract_abv_percent(&doc), Some(14.0));
        assert_eq!(x.extract_vintage_year(&doc).as_deref(), Some("2016"));
        assert_eq!(x.extract_country(&doc).as_deref(), Some("Lebanon"));
        assert_eq!(x.extract_rating(&doc), Some(4.6));
        assert_eq!(x.extract_review_count(&doc), Some(1021));
        assert_eq!(x.extract_wine_type(&doc), None);
    }

    #[test]
    fn missing_price_element_uses_unavailable_label() {
        let html = PRODUCT.replace("price-per-bottle", "price-was");
        let (x, doc) = extract(&html);
        assert_eq!(
            x.extract_price(&doc),
            Some(Price::Unavailable("out of stock".to_owned()))
        );
    }

    #[test]
    fn unparseable_price_is_absent() {
        let html = PRODUCT.replace("£34.99", "Call for price");
        let (x, doc) = extract(&html);
        assert_eq!(x.extract_price(&doc), None);
    }

    #[test]
    fn missing_rating_leaves_other_fields() {
        let html = PRODUCT.replace(r#"<span class="rating-score">4.6 out of 5</span>"#, "");
        let (x, doc) = extract(&html);
        assert_eq!(x.extract_rating(&doc), None);
        assert_eq!(x.extract_review_count(&doc), Some(1021));
        assert_eq!(x.extract_country(&doc).as_deref(), Some("Lebanon"));
    }

    #[test]
    fn unknown_size_unit_is_an_error() {
        let html = PRODUCT.replace(">75cl<", ">25oz<");
        let (x, doc) = extract(&html);
        assert!(x.extract_bottle_size_cl(&doc).is_err());
    }

    #[test]
    fn page_without_title_is_not_a_product() {
        let (x, doc) = extract("<html><body><h2>Gift ideas</h2></body></html>");
        assert!(!x.is_product_page(&doc));
        assert_eq!(x.extract_bottle_size_cl(&doc).unwrap(), None);
    }

    #[test]
    fn invalid_required_selector_is_rejected() {
        let mut rules = rules();
        rules.required.push("div[".to_owned());
        assert!(matches!(
            ConfiguredExtractors::new(&rules),
            Err(RuleError::Selector { ref field, .. }) if field == "required"
        ));
    }
}
