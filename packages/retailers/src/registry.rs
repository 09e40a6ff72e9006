//! Built-in retailers, loaded from TOML embedded at compile time.
//!
//! Each `.toml` file in `packages/retailers/retailers/` is baked into the
//! binary via [`include_str!`]. Adding a retailer means adding a file and a
//! line to the list below.

use crate::RetailerError;
use crate::retailer_def::{RetailerDefinition, parse_retailer_toml};

/// TOML configs embedded at compile time.
const RETAILER_TOMLS: &[(&str, &str)] = &[
    // ── Next-link pagination ─────────────────────────────────────────
    ("decantalo", include_str!("../retailers/decantalo.toml")),
    ("laithwaites", include_str!("../retailers/laithwaites.toml")),
    // ── Page number in the URL ───────────────────────────────────────
    ("virginwines", include_str!("../retailers/virginwines.toml")),
    // ── Show-more button ─────────────────────────────────────────────
    ("morrisons", include_str!("../retailers/morrisons.toml")),
];

#[cfg(test)]
const EXPECTED_RETAILER_COUNT: usize = 4;

/// Returns every built-in retailer definition.
///
/// # Panics
///
/// Panics if an embedded TOML config is invalid. The configs ship with the
/// binary and are checked by this module's tests.
#[must_use]
pub fn all_retailers() -> Vec<RetailerDefinition> {
    RETAILER_TOMLS
        .iter()
        .map(|(name, toml)| {
            parse_retailer_toml(toml).unwrap_or_else(|e| panic!("Failed to parse {name}.toml: {e}"))
        })
        .collect()
}

/// Ids of the built-in retailers, in registry order.
#[must_use]
pub fn retailer_ids() -> Vec<&'static str> {
    RETAILER_TOMLS.iter().map(|(name, _)| *name).collect()
}

/// Looks up a built-in retailer by id.
///
/// # Errors
///
/// Returns [`RetailerError::Unknown`] if no built-in retailer has `id`, or
/// the parse error if its config is invalid.
pub fn find_retailer(id: &str) -> Result<RetailerDefinition, RetailerError> {
    let (_, toml) = RETAILER_TOMLS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(id))
        .ok_or_else(|| RetailerError::Unknown {
            id: id.to_owned(),
            available: retailer_ids().join(", "),
        })?;
    parse_retailer_toml(toml)
}

#[cfg(test)]
mod tests {
    use wine_harvest_crawl::PaginationIdiom;

    use super::*;

    #[test]
    fn loads_all_retailers() {
        assert_eq!(all_retailers().len(), EXPECTED_RETAILER_COUNT);
    }

    #[test]
    fn retailer_ids_are_unique_and_match_file_names() {
        let retailers = all_retailers();
        let mut ids: Vec<&str> = retailers.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, retailer_ids());
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), EXPECTED_RETAILER_COUNT);
    }

    #[test]
    fn all_retailers_compile_and_have_categories() {
        for retailer in &all_retailers() {
            assert!(!retailer.name.is_empty(), "{}: empty name", retailer.id);
            assert!(!retailer.categories.is_empty(), "{}: no categories", retailer.id);
            assert!(retailer.extractors().is_ok(), "{}: rules do not compile", retailer.id);
        }
    }

    #[test]
    fn category_labels_are_unique_per_retailer() {
        for retailer in &all_retailers() {
            let mut labels: Vec<&str> = retailer.categories.iter().map(|c| c.label.as_str()).collect();
            labels.sort_unstable();
            labels.dedup();
            assert_eq!(labels.len(), retailer.categories.len(), "{}", retailer.id);
        }
    }

    #[test]
    fn pagination_idioms_are_configured() {
        let virgin = find_retailer("virginwines").unwrap();
        assert_eq!(virgin.listing.page_param.map(|p| p.param).as_deref(), Some("page"));

        let morrisons = find_retailer("morrisons").unwrap();
        assert_eq!(morrisons.listing.idiom, Some(PaginationIdiom::ShowMore));
        assert!(morrisons.listing.consent_button.is_some());

        let decantalo = find_retailer("Decantalo").unwrap();
        assert!(decantalo.listing.next_control.is_some());
        assert_eq!(decantalo.categories.len(), 7);
    }

    #[test]
    fn tile_listings_read_one_link_per_product() {
        for id in ["laithwaites", "morrisons"] {
            let listing = find_retailer(id).unwrap().listing;
            assert!(listing.product_tile.is_some(), "{id}");
            assert_eq!(listing.product_link, "a[href]", "{id}");
        }
    }

    #[test]
    fn unknown_retailer_lists_available_ids() {
        let err = find_retailer("oddbins").unwrap_err();
        assert!(matches!(err, RetailerError::Unknown { .. }));
        assert!(err.to_string().contains("decantalo, laithwaites, virginwines, morrisons"));
    }
}
