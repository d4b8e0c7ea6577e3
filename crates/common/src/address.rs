use serde::{Deserialize, Serialize};

/// Postal address used as the shipping destination (and origin) of an order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
    #[serde(default)]
    pub state: String,
    pub zip_code: String,
    pub country: String,
}

impl Address {
    /// Creates an address.
    pub fn new(
        street: impl Into<String>,
        city: impl Into<String>,
        state: impl Into<String>,
        zip_code: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            street: street.into(),
            city: city.into(),
            state: state.into(),
            zip_code: zip_code.into(),
            country: country.into(),
        }
    }

    /// Returns true if the address can be shipped to. `state` is optional
    /// since not every country has one.
    pub fn is_complete(&self) -> bool {
        [&self.street, &self.city, &self.zip_code, &self.country]
            .iter()
            .all(|field| !field.trim().is_empty())
    }
}
