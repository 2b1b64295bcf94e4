//! Product service trait and in-memory implementation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use domain::{GeoPoint, Money, ProductId};

use crate::error::ServiceError;

/// Live view of a product as returned by the product service.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub stock: i64,
    pub restaurant_id: Option<String>,
}

/// Stock and restaurant lookups against the product service.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Fetches the current price, stock and restaurant of a product.
    async fn product(&self, product_id: &ProductId) -> Result<ProductSnapshot, ServiceError>;

    /// Decrements stock. Fails if the service refuses or answers without a body.
    async fn reserve(&self, product_id: &ProductId, quantity: u32) -> Result<(), ServiceError>;

    /// Increments stock to undo an earlier [`reserve`](Self::reserve).
    ///
    /// Each call is an independent increment.
    async fn restore(&self, product_id: &ProductId, quantity: u32) -> Result<(), ServiceError>;

    /// Fetches a restaurant's coordinates.
    async fn restaurant_location(&self, restaurant_id: &str) -> Result<GeoPoint, ServiceError>;
}

#[async_trait]
impl<T: ProductCatalog + ?Sized> ProductCatalog for Arc<T> {
    async fn product(&self, product_id: &ProductId) -> Result<ProductSnapshot, ServiceError> {
        (**self).product(product_id).await
    }

    async fn reserve(&self, product_id: &ProductId, quantity: u32) -> Result<(), ServiceError> {
        (**self).reserve(product_id, quantity).await
    }

    async fn restore(&self, product_id: &ProductId, quantity: u32) -> Result<(), ServiceError> {
        (**self).restore(product_id, quantity).await
    }

    async fn restaurant_location(&self, restaurant_id: &str) -> Result<GeoPoint, ServiceError> {
        (**self).restaurant_location(restaurant_id).await
    }
}

/// A call observed by [`InMemoryProductCatalog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogCall {
    Product(ProductId),
    Reserve(ProductId, u32),
    Restore(ProductId, u32),
}

#[derive(Debug, Default)]
struct InMemoryCatalogState {
    products: HashMap<ProductId, ProductSnapshot>,
    restaurants: HashMap<String, GeoPoint>,
    fail_reserve_for: HashSet<ProductId>,
    fail_on_restore: bool,
    unavailable: bool,
    calls: Vec<CatalogCall>,
}

/// In-memory product service for testing and local runs.
///
/// Keeps real stock counts so tests can check that failed sagas leave stock
/// untouched, and records every call in order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProductCatalog {
    state: Arc<Mutex<InMemoryCatalogState>>,
}

impl InMemoryProductCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryCatalogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds or replaces a product.
    pub fn add_product(
        &self,
        id: impl Into<ProductId>,
        name: impl Into<String>,
        price: Money,
        stock: i64,
        restaurant_id: Option<&str>,
    ) {
        let id = id.into();
        self.state().products.insert(
            id.clone(),
            ProductSnapshot {
                id,
                name: name.into(),
                price,
                stock,
                restaurant_id: restaurant_id.map(str::to_string),
            },
        );
    }

    /// Adds or replaces a restaurant location.
    pub fn add_restaurant(&self, id: impl Into<String>, location: GeoPoint) {
        self.state().restaurants.insert(id.into(), location);
    }

    /// Makes every reservation of `product_id` fail.
    pub fn set_fail_on_reserve(&self, product_id: impl Into<ProductId>) {
        self.state().fail_reserve_for.insert(product_id.into());
    }

    /// Makes every restore call fail.
    pub fn set_fail_on_restore(&self, fail: bool) {
        self.state().fail_on_restore = fail;
    }

    /// Makes every call fail as if the service were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Current stock of a product.
    pub fn stock(&self, product_id: &str) -> Option<i64> {
        self.state()
            .products
            .get(&ProductId::new(product_id))
            .map(|p| p.stock)
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<CatalogCall> {
        self.state().calls.clone()
    }

    /// Number of reserve calls made so far.
    pub fn reserve_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, CatalogCall::Reserve(..)))
            .count()
    }

    /// Number of restore calls made so far.
    pub fn restore_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, CatalogCall::Restore(..)))
            .count()
    }

    fn unavailable_error(method: &'static str, path: String) -> ServiceError {
        ServiceError::Unavailable {
            method,
            url: format!("memory://products{path}"),
            reason: "service unavailable".to_string(),
        }
    }
}

#[async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn product(&self, product_id: &ProductId) -> Result<ProductSnapshot, ServiceError> {
        let mut state = self.state();
        state.calls.push(CatalogCall::Product(product_id.clone()));

        if state.unavailable {
            return Err(Self::unavailable_error("GET", format!("/products/{product_id}")));
        }

        state
            .products
            .get(product_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound {
                method: "GET",
                url: format!("memory://products/products/{product_id}"),
            })
    }

    async fn reserve(&self, product_id: &ProductId, quantity: u32) -> Result<(), ServiceError> {
        let mut state = self.state();
        state
            .calls
            .push(CatalogCall::Reserve(product_id.clone(), quantity));

        if state.unavailable {
            return Err(Self::unavailable_error("POST", "/decrement".to_string()));
        }

        let rejected = |body: &str| ServiceError::Rejected {
            method: "POST",
            url: "memory://products/decrement".to_string(),
            status: 400,
            body: body.to_string(),
        };

        if state.fail_reserve_for.contains(product_id) {
            return Err(rejected("reservation refused"));
        }

        let product = state
            .products
            .get_mut(product_id)
            .ok_or_else(|| rejected("product not found"))?;
        if product.stock < i64::from(quantity) {
            return Err(rejected("insufficient stock"));
        }
        product.stock -= i64::from(quantity);
        Ok(())
    }

    async fn restore(&self, product_id: &ProductId, quantity: u32) -> Result<(), ServiceError> {
        let mut state = self.state();
        state
            .calls
            .push(CatalogCall::Restore(product_id.clone(), quantity));

        if state.unavailable || state.fail_on_restore {
            return Err(Self::unavailable_error("POST", "/increment".to_string()));
        }

        if let Some(product) = state.products.get_mut(product_id) {
            product.stock += i64::from(quantity);
        }
        Ok(())
    }

    async fn restaurant_location(&self, restaurant_id: &str) -> Result<GeoPoint, ServiceError> {
        let state = self.state();
        if state.unavailable {
            return Err(Self::unavailable_error(
                "GET",
                format!("/restaurants/{restaurant_id}"),
            ));
        }

        state
            .restaurants
            .get(restaurant_id)
            .copied()
            .ok_or_else(|| ServiceError::NotFound {
                method: "GET",
                url: format!("memory://products/restaurants/{restaurant_id}"),
            })
    }
}
