//! HTTP clients for the product and payment services.

use async_trait::async_trait;
use domain::{GeoPoint, Money, ProductId};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::ServiceError;
use crate::retry::{RetryPolicy, retry_linear};

use super::catalog::{ProductCatalog, ProductSnapshot};
use super::payment::{PaymentGateway, PaymentReceipt};

/// A JSON value that may arrive as a number or as a numeric string.
///
/// Decimal columns are often serialized as strings by the collaborators.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Numeric::Number(n) => Some(*n),
            Numeric::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// An identifier that may arrive as a number or a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(i64),
    Text(String),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Number(n) => n.to_string(),
            RawId::Text(s) => s,
        }
    }
}

/// Sends numeric ids as JSON numbers and everything else as strings.
fn id_json(id: &str) -> Value {
    id.parse::<i64>().map_or_else(|_| json!(id), |n| json!(n))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductPayload {
    #[serde(default)]
    name: Option<String>,
    price: Numeric,
    stock: Numeric,
    #[serde(default)]
    restaurant_id: Option<RawId>,
}

#[derive(Debug, Deserialize)]
struct LocationPayload {
    lat: Option<Numeric>,
    lng: Option<Numeric>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayPayload {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    transaction_id: Option<RawId>,
    #[serde(default)]
    message: Option<String>,
}

/// Shared plumbing for one collaborator: base URL, retry and response mapping.
///
/// Every attempt is logged with method, url, attempt number, status and body.
/// 5xx and transport failures are transient; 404 and other 4xx are not.
#[derive(Debug, Clone)]
pub struct CollaboratorClient {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl CollaboratorClient {
    /// Creates a client for the service rooted at `base_url`.
    pub fn new(http: Client, base_url: impl Into<String>, retry: RetryPolicy) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            retry,
        }
    }

    /// The base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends a request with retry and returns the raw response body.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<String, ServiceError> {
        let url = self.url(path);
        let label = method_label(&method);
        let operation = format!("{label} {path}");

        retry_linear(&self.retry, &operation, move |attempt| {
            self.attempt(method.clone(), label, url.clone(), body, attempt)
        })
        .await
    }

    async fn attempt(
        &self,
        method: Method,
        label: &'static str,
        url: String,
        body: Option<&Value>,
        attempt: u32,
    ) -> Result<String, ServiceError> {
        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let unavailable = |reason: String| ServiceError::Unavailable {
            method: label,
            url: url.clone(),
            reason,
        };

        let response = request.send().await.map_err(|e| {
            tracing::warn!(method = label, %url, attempt, error = %e, "collaborator transport error");
            unavailable(e.to_string())
        })?;
        let status = response.status();
        let text = response.text().await.map_err(|e| unavailable(e.to_string()))?;

        tracing::debug!(
            method = label,
            %url,
            attempt,
            status = status.as_u16(),
            body = %text,
            "collaborator response"
        );

        if status.is_server_error() {
            return Err(unavailable(format!("status {}: {}", status.as_u16(), text)));
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound { method: label, url });
        }
        if status.is_client_error() {
            return Err(ServiceError::Rejected {
                method: label,
                url,
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }

    fn parse<T: DeserializeOwned>(
        &self,
        method: &'static str,
        path: &str,
        body: &str,
    ) -> Result<T, ServiceError> {
        serde_json::from_str(body).map_err(|e| ServiceError::InvalidResponse {
            method,
            url: self.url(path),
            reason: e.to_string(),
        })
    }
}

fn method_label(method: &Method) -> &'static str {
    [Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE]
        .into_iter()
        .zip(["GET", "POST", "PUT", "PATCH", "DELETE"])
        .find_map(|(m, label)| (m == *method).then_some(label))
        .unwrap_or("OTHER")
}

/// [`ProductCatalog`] backed by the product service's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpProductCatalog {
    client: CollaboratorClient,
}

impl HttpProductCatalog {
    pub fn new(client: CollaboratorClient) -> Self {
        Self { client }
    }

    fn stock_body(product_id: &ProductId, quantity: u32) -> Value {
        json!({ "productId": id_json(product_id.as_str()), "qty": quantity })
    }
}

#[async_trait]
impl ProductCatalog for HttpProductCatalog {
    async fn product(&self, product_id: &ProductId) -> Result<ProductSnapshot, ServiceError> {
        let path = format!("/products/{product_id}");
        let body = self.client.send(Method::GET, &path, None).await?;
        let payload: ProductPayload = self.client.parse("GET", &path, &body)?;

        let invalid = |reason: &str| ServiceError::InvalidResponse {
            method: "GET",
            url: self.client.url(&path),
            reason: reason.to_string(),
        };
        let price = payload
            .price
            .as_f64()
            .ok_or_else(|| invalid("price is not a number"))?;
        let price = Money::try_from_decimal(price)
            .ok_or_else(|| invalid("price must be a finite, non-negative amount"))?;
        let stock = payload
            .stock
            .as_f64()
            .filter(|stock| stock.is_finite())
            .ok_or_else(|| invalid("stock is not a number"))?;

        Ok(ProductSnapshot {
            id: product_id.clone(),
            name: payload.name.unwrap_or_default(),
            price,
            stock: stock.floor() as i64,
            restaurant_id: payload.restaurant_id.map(RawId::into_string),
        })
    }

    async fn reserve(&self, product_id: &ProductId, quantity: u32) -> Result<(), ServiceError> {
        let path = "/decrement";
        let request = Self::stock_body(product_id, quantity);
        let body = self
            .client
            .send(Method::POST, path, Some(&request))
            .await?;

        // A 2xx is not trusted on its own: the body must be present and must
        // not carry an error payload.
        if body.trim().is_empty() {
            return Err(ServiceError::InvalidResponse {
                method: "POST",
                url: self.client.url(path),
                reason: "empty response body".to_string(),
            });
        }
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&body) {
            if map.contains_key("error") {
                return Err(ServiceError::Rejected {
                    method: "POST",
                    url: self.client.url(path),
                    status: 200,
                    body,
                });
            }
        }
        Ok(())
    }

    async fn restore(&self, product_id: &ProductId, quantity: u32) -> Result<(), ServiceError> {
        let request = Self::stock_body(product_id, quantity);
        self.client
            .send(Method::POST, "/increment", Some(&request))
            .await
            .map(|_| ())
    }

    async fn restaurant_location(&self, restaurant_id: &str) -> Result<GeoPoint, ServiceError> {
        let path = format!("/restaurants/{restaurant_id}");
        let body = self.client.send(Method::GET, &path, None).await?;
        let payload: LocationPayload = self.client.parse("GET", &path, &body)?;

        match (
            payload.lat.as_ref().and_then(Numeric::as_f64),
            payload.lng.as_ref().and_then(Numeric::as_f64),
        ) {
            (Some(lat), Some(lng)) => Ok(GeoPoint::new(lat, lng)),
            _ => Err(ServiceError::InvalidResponse {
                method: "GET",
                url: self.client.url(&path),
                reason: "restaurant has no coordinates".to_string(),
            }),
        }
    }
}

/// [`PaymentGateway`] backed by the payment service's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    client: CollaboratorClient,
}

impl HttpPaymentGateway {
    pub fn new(client: CollaboratorClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn charge(&self, amount: Money) -> Result<PaymentReceipt, ServiceError> {
        let path = "/pay";
        let request = json!({ "amount": amount.as_decimal() });
        let body = self
            .client
            .send(Method::POST, path, Some(&request))
            .await?;

        let payload: PayPayload = self.client.parse("POST", path, &body)?;
        if payload.success != Some(true) {
            return Err(ServiceError::Declined(
                payload
                    .message
                    .unwrap_or_else(|| "payment was not successful".to_string()),
            ));
        }

        Ok(PaymentReceipt {
            transaction_id: payload.transaction_id.map(RawId::into_string),
        })
    }
}
