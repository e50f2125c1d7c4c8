use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(ProductId);
id_newtype!(CategoryId);
id_newtype!(BrandId);
id_newtype!(WarehouseId);
id_newtype!(CustomerId);
id_newtype!(QuotationId);
id_newtype!(SaleId);
id_newtype!(SalePaymentId);
id_newtype!(SupplierId);
id_newtype!(PurchaseId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotationStatus {
    Pending,
    Sent,
}

impl QuotationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "sent" => Self::Sent,
            _ => Self::Pending,
        }
    }
}

/// Status shared by purchases and purchase returns. Only `Completed`
/// documents count towards a supplier's debit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Pending,
    Ordered,
    Completed,
}

impl PurchaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ordered => "ordered",
            Self::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "ordered" => Self::Ordered,
            "completed" => Self::Completed,
            _ => Self::Pending,
        }
    }
}
