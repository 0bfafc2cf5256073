use async_trait::async_trait;

use crate::{
    db_types::{OrderId, WalletRegistration},
    traits::StoreError,
};

/// Read access to the wallet registrations. Registrations are written by the [`crate::traits::OrderStore`] as part of
/// order creation and take, and are never modified afterwards.
#[async_trait]
pub trait WalletIndex: Clone + Send + Sync + 'static {
    /// All registrations of `address` that are expected to pay in `token`, in the order they were made.
    async fn registrations_for_address(
        &self,
        address: &str,
        token: &str,
    ) -> Result<Vec<WalletRegistration>, StoreError>;

    async fn registrations_for_order(&self, order_id: &OrderId) -> Result<Vec<WalletRegistration>, StoreError>;
}
