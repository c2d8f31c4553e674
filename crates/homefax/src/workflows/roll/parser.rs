use serde::{Deserialize, Deserializer};
use std::io::Read;

use super::RollImportError;
use crate::workflows::domain::{PropertyDraft, StructuralFacts, UtilityKind};

pub(crate) fn parse_records<R: Read>(reader: R) -> Result<Vec<PropertyDraft>, RollImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut drafts = Vec::new();

    for (index, record) in csv_reader.deserialize::<RollRow>().enumerate() {
        let row = record?;
        // Header is line 1.
        let line = index + 2;
        drafts.push(row.into_draft(line)?);
    }

    Ok(drafts)
}

#[derive(Debug, Deserialize)]
struct RollRow {
    #[serde(rename = "Address")]
    address: String,
    #[serde(rename = "City")]
    city: String,
    #[serde(rename = "State")]
    state: String,
    #[serde(rename = "Zip")]
    zip: String,
    #[serde(rename = "Owner Name", default, deserialize_with = "empty_string_as_none")]
    owner_name: Option<String>,
    #[serde(rename = "Year Built", default, deserialize_with = "empty_string_as_none")]
    year_built: Option<String>,
    #[serde(rename = "Zoning", default, deserialize_with = "empty_string_as_none")]
    zoning: Option<String>,
    #[serde(rename = "Square Feet", default, deserialize_with = "empty_string_as_none")]
    square_feet: Option<String>,
    #[serde(rename = "Utilities", default, deserialize_with = "empty_string_as_none")]
    utilities: Option<String>,
    #[serde(
        rename = "Assessed Value",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    assessed_value: Option<String>,
}

impl RollRow {
    fn into_draft(self, line: usize) -> Result<PropertyDraft, RollImportError> {
        for (column, value) in [
            ("Address", &self.address),
            ("City", &self.city),
            ("State", &self.state),
            ("Zip", &self.zip),
        ] {
            if value.is_empty() {
                return Err(RollImportError::invalid(line, format!("{column} is required")));
            }
        }

        let year_built = parse_number::<u16>(line, "Year Built", self.year_built.as_deref())?;
        let square_feet = parse_number::<u32>(line, "Square Feet", self.square_feet.as_deref())?;
        let assessed_value = match self.assessed_value.as_deref() {
            Some(raw) => {
                let digits = raw.replace(['$', ','], "");
                parse_number::<u64>(line, "Assessed Value", Some(digits.as_str()))?
            }
            None => None,
        };

        let mut utilities = Vec::new();
        for raw in self.utilities.as_deref().unwrap_or_default().split(';') {
            if raw.trim().is_empty() {
                continue;
            }
            let utility = UtilityKind::parse(raw).ok_or_else(|| {
                RollImportError::invalid(line, format!("unknown utility `{}`", raw.trim()))
            })?;
            if !utilities.contains(&utility) {
                utilities.push(utility);
            }
        }

        Ok(PropertyDraft {
            address: self.address,
            city: self.city,
            state: self.state.to_ascii_uppercase(),
            zip_code: self.zip,
            facts: StructuralFacts {
                year_built,
                zoning: self.zoning,
                square_feet,
            },
            owner_of_record: self.owner_name,
            utilities,
            assessed_value,
            financials_public: false,
        })
    }
}

fn parse_number<T: std::str::FromStr>(
    line: usize,
    column: &str,
    raw: Option<&str>,
) -> Result<Option<T>, RollImportError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| RollImportError::invalid(line, format!("{column} `{value}` is not a number"))),
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}
