use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Fixed contents of the `product_statuses` lookup table.
#[derive(AsRefStr, EnumIter, EnumString, Debug, Display, PartialEq, Eq, Copy, Clone)]
#[strum(ascii_case_insensitive)]
pub enum ProductStatus {
    #[strum(serialize = "Active")]
    Active = 1,
    #[strum(serialize = "Active Decoy")]
    ActiveDecoy = 2,
    #[strum(serialize = "Inactive")]
    Inactive = 3,
}

impl ProductStatus {
    pub fn id(&self) -> i64 {
        *self as i64
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProductStatus::Active => "Active",
            ProductStatus::ActiveDecoy => "Active Decoy",
            ProductStatus::Inactive => "Inactive",
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(ProductStatus::Active),
            2 => Some(ProductStatus::ActiveDecoy),
            3 => Some(ProductStatus::Inactive),
            _ => None,
        }
    }

    /// Maps a free-text `products.status` value to its lookup entry.
    ///
    /// Must agree with the `CASE LOWER(status)` in the products rebuild:
    /// whole-string ASCII case-insensitive match, no trimming, and anything
    /// unrecognized (including NULL and plain "active") is `Active`.
    pub fn from_legacy(status: Option<&str>) -> Self {
        match status {
            Some(s) if s.eq_ignore_ascii_case("active decoy") => ProductStatus::ActiveDecoy,
            Some(s) if s.eq_ignore_ascii_case("inactive") => ProductStatus::Inactive,
            _ => ProductStatus::Active,
        }
    }
}
