//! JSON gateway implementation of [`LedgerClient`].
//!
//! Talks to the settlement gateway process over HTTP. The gateway owns the
//! wallet, transaction building and simulation; this client only shapes
//! requests and decodes responses.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::LedgerError;
use crate::types::{
    Authorization, EscrowDescriptor, EscrowHandle, EscrowKind, LedgerClient, LiquidateCall,
    PoolPosition, PricePublish, TransactionId,
};

/// HTTP client for the settlement gateway.
#[derive(Debug, Clone)]
pub struct LedgerGateway {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    address: &'a str,
    kind: EscrowKind,
    descriptor: &'a EscrowDescriptor,
    credential: &'a str,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    handle: String,
}

#[derive(Debug, Serialize)]
struct PublishRequest<'a> {
    prices: &'a [PricePublish],
}

#[derive(Debug, Serialize)]
struct TransferAuthRequest<'a> {
    asset: &'a str,
    recipient: &'a str,
    amount: u128,
}

#[derive(Debug, Serialize)]
struct BurnAuthRequest<'a> {
    asset: &'a str,
    amount: u128,
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    transaction_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    simulation_revert: bool,
}

impl LedgerGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, LedgerError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url).json(body).send().await?;
        Self::decode(response).await
    }

    async fn get<Resp>(&self, path: &str) -> Result<Resp, LedgerError>
    where
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).send().await?;
        Self::decode(response).await
    }

    async fn decode<Resp>(response: reqwest::Response) -> Result<Resp, LedgerError>
    where
        Resp: DeserializeOwned,
    {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<Resp>()
                .await
                .map_err(|e| LedgerError::InvalidResponse(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(err) if err.simulation_revert => Err(LedgerError::Simulation(err.error)),
            Ok(err) => Err(LedgerError::Gateway {
                code: status.as_u16(),
                message: err.error,
            }),
            Err(_) => Err(LedgerError::Gateway {
                code: status.as_u16(),
                message: body,
            }),
        }
    }
}

#[async_trait]
impl LedgerClient for LedgerGateway {
    #[instrument(skip(self, descriptor, credential), fields(address = %address, kind = %kind))]
    async fn register_escrow(
        &self,
        address: &str,
        kind: EscrowKind,
        descriptor: &EscrowDescriptor,
        credential: &str,
    ) -> Result<EscrowHandle, LedgerError> {
        let response: RegisterResponse = self
            .post(
                "/escrows",
                &RegisterRequest {
                    address,
                    kind,
                    descriptor,
                    credential,
                },
            )
            .await?;
        debug!(handle = %response.handle, "escrow registered with gateway");
        Ok(EscrowHandle(response.handle))
    }

    async fn sync_private_state(&self, handle: &EscrowHandle) -> Result<(), LedgerError> {
        let _: serde_json::Value = self
            .post(&format!("/escrows/{}/sync", handle.0), &serde_json::json!({}))
            .await?;
        Ok(())
    }

    async fn get_collateral_and_debt(
        &self,
        pool_address: &str,
        escrow_address: &str,
    ) -> Result<PoolPosition, LedgerError> {
        self.get(&format!(
            "/pools/{pool_address}/escrows/{escrow_address}/position"
        ))
        .await
    }

    #[instrument(skip(self, batch), fields(count = batch.len()))]
    async fn publish_prices(&self, batch: &[PricePublish]) -> Result<TransactionId, LedgerError> {
        let response: TxResponse = self.post("/prices", &PublishRequest { prices: batch }).await?;
        Ok(TransactionId(response.transaction_id))
    }

    async fn create_transfer_authorization(
        &self,
        asset: &str,
        recipient: &str,
        amount: u128,
    ) -> Result<Authorization, LedgerError> {
        self.post(
            "/authorizations/transfer",
            &TransferAuthRequest {
                asset,
                recipient,
                amount,
            },
        )
        .await
    }

    async fn create_burn_authorization(
        &self,
        asset: &str,
        amount: u128,
    ) -> Result<Authorization, LedgerError> {
        self.post("/authorizations/burn", &BurnAuthRequest { asset, amount })
            .await
    }

    #[instrument(skip(self, call), fields(handle = %handle, repay = call.repay_amount))]
    async fn invoke_liquidate(
        &self,
        handle: &EscrowHandle,
        call: &LiquidateCall,
    ) -> Result<TransactionId, LedgerError> {
        let response: TxResponse = self
            .post(&format!("/escrows/{}/liquidate", handle.0), call)
            .await?;
        Ok(TransactionId(response.transaction_id))
    }
}
