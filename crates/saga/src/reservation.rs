//! Record of the stock decrements made during one saga run.

use domain::ProductId;

use crate::services::ProductCatalog;

/// Stock decrements that succeeded, in the order they were made.
///
/// Lives only for one saga run and is consumed by [`Reservations::release`],
/// so a reservation can never be restored twice in the same run.
#[derive(Debug, Default)]
pub struct Reservations {
    entries: Vec<(ProductId, u32)>,
}

/// Outcome of releasing a set of reservations.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseReport {
    pub restored: usize,
    pub failed: usize,
}

impl Reservations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful decrement.
    pub fn record(&mut self, product_id: ProductId, quantity: u32) {
        self.entries.push((product_id, quantity));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(ProductId, u32)] {
        &self.entries
    }

    /// Restores every recorded decrement in the order it was made.
    ///
    /// Failures are logged and counted, never returned.
    pub async fn release<C: ProductCatalog + ?Sized>(self, catalog: &C) -> ReleaseReport {
        let mut report = ReleaseReport::default();

        for (product_id, quantity) in self.entries {
            match catalog.restore(&product_id, quantity).await {
                Ok(()) => {
                    report.restored += 1;
                    tracing::info!(%product_id, quantity, "stock restored");
                }
                Err(error) => {
                    report.failed += 1;
                    tracing::error!(
                        %product_id,
                        quantity,
                        error = %error,
                        "stock restore failed, manual reconciliation required"
                    );
                }
            }
        }

        report
    }
}
