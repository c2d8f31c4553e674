use crate::workflows::domain::PropertyId;

/// Owner-of-record name attached to an unclaimed property.
#[derive(Debug, Clone, Copy)]
pub struct OwnerRecord<'a> {
    pub property_id: PropertyId,
    pub owner_name: &'a str,
}

/// Strategy for pairing a registering owner with county property records.
pub trait OwnershipMatcher: Send + Sync {
    fn candidates(&self, registrant_name: &str, records: &[OwnerRecord<'_>]) -> Vec<PropertyId>;
}

const HONORIFICS: &[&str] = &["mr", "mrs", "ms", "miss", "mx", "dr", "jr", "sr", "ii", "iii"];

/// Case-insensitive substring match after stripping honorifics and suffixes.
///
/// Nicknames produce false negatives and short names can collide; callers route anything
/// other than a single candidate to manual review.
#[derive(Debug, Default, Clone, Copy)]
pub struct TitleStrippingMatcher;

impl TitleStrippingMatcher {
    pub fn normalize(name: &str) -> String {
        name.to_lowercase()
            .split(|c: char| c.is_whitespace() || c == '.' || c == ',')
            .filter(|token| !token.is_empty())
            .filter(|token| !HONORIFICS.contains(token))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl OwnershipMatcher for TitleStrippingMatcher {
    fn candidates(&self, registrant_name: &str, records: &[OwnerRecord<'_>]) -> Vec<PropertyId> {
        let registrant = Self::normalize(registrant_name);
        if registrant.is_empty() {
            return Vec::new();
        }

        records
            .iter()
            .filter(|record| {
                let owner = Self::normalize(record.owner_name);
                !owner.is_empty() && (owner.contains(&registrant) || registrant.contains(&owner))
            })
            .map(|record| record.property_id)
            .collect()
    }
}
