//! Order placement request and its validation.

use domain::{OrderItem, ProductId, ShippingInfo};
use serde::{Deserialize, Deserializer};

use crate::error::SagaError;

/// One requested line: a product and how many of it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineRequest {
    #[serde(deserialize_with = "product_id_from_any")]
    pub product_id: ProductId,
    #[serde(alias = "quantity")]
    pub qty: i64,
}

impl LineRequest {
    pub fn new(product_id: impl Into<ProductId>, qty: i64) -> Self {
        Self {
            product_id: product_id.into(),
            qty,
        }
    }
}

/// Payment metadata supplied by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PaymentRequest {
    #[serde(default)]
    pub method: Option<String>,
}

/// A client's request to place an order.
///
/// Prices are never taken from the client; they are read from the product
/// service while the saga runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    #[serde(default)]
    pub items: Vec<LineRequest>,
    #[serde(default)]
    pub shipping: Option<ShippingInfo>,
    #[serde(default)]
    pub payment: Option<PaymentRequest>,
    #[serde(default)]
    pub user_email: Option<String>,
}

/// A validated line with a positive quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl OrderRequest {
    /// Checks the request shape and returns its lines with typed quantities.
    ///
    /// Nothing is sent to a collaborator before this succeeds.
    pub fn validate(&self) -> Result<Vec<ValidLine>, SagaError> {
        if self.items.is_empty() {
            return Err(SagaError::Validation(
                "Order must contain at least one item".to_string(),
            ));
        }

        self.items
            .iter()
            .enumerate()
            .map(|(index, line)| {
                if line.product_id.as_str().trim().is_empty() {
                    return Err(SagaError::Validation(format!(
                        "Item {index} is missing a productId"
                    )));
                }
                let quantity = u32::try_from(line.qty)
                    .ok()
                    .filter(|q| (1..=OrderItem::MAX_QUANTITY).contains(q))
                    .ok_or_else(|| {
                        SagaError::Validation(format!(
                            "Item {index} has invalid quantity {}",
                            line.qty
                        ))
                    })?;
                Ok(ValidLine {
                    product_id: line.product_id.clone(),
                    quantity,
                })
            })
            .collect()
    }

    /// The payment method the client asked for, if any.
    pub fn payment_method(&self) -> Option<String> {
        self.payment.as_ref().and_then(|p| p.method.clone())
    }
}

fn product_id_from_any<'de, D>(deserializer: D) -> Result<ProductId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum AnyId {
        Number(i64),
        Text(String),
    }

    Ok(match AnyId::deserialize(deserializer)? {
        AnyId::Number(n) => ProductId::new(n.to_string()),
        AnyId::Text(s) => ProductId::new(s),
    })
}
