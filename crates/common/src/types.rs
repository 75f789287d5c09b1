use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true if the identifier is empty or whitespace.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Catalog product identifier.
    ProductId
);

string_id!(
    /// Identifier of one variant (size/weight option) of a product.
    VariantId
);

string_id!(
    /// Identifier of an authenticated customer.
    UserId
);

string_id!(
    /// Order identifier.
    ///
    /// Generated ids combine a millisecond timestamp with a random suffix, so
    /// two orders placed in the same millisecond still get distinct ids.
    OrderId
);

impl OrderId {
    /// Generates a fresh `ORD-<timestamp>-<suffix>` identifier.
    pub fn generate() -> Self {
        let timestamp = Utc::now().format("%Y%m%d%H%M%S%3f");
        let suffix = Uuid::new_v4().simple().to_string()[..6].to_uppercase();
        Self(format!("ORD-{timestamp}-{suffix}"))
    }
}

impl VariantId {
    /// Returns true if this variant id is the product id itself.
    ///
    /// Single-variant products are commonly stored with the variant keyed by
    /// the product id.
    pub fn is_product(&self, product_id: &ProductId) -> bool {
        self.0 == product_id.as_str()
    }
}
