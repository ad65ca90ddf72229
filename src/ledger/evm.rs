// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EVM attestation registry client.
//!
//! Commitments are recorded by calling `submitCommitment(owner, payload)` on a
//! registry contract; inclusion is read back from the transaction receipt.

use std::str::FromStr;

use alloy::{
    network::EthereumWallet,
    primitives::{Address, Bytes, TxHash},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::TransactionRequest,
    sol,
    sol_types::SolCall,
};
use async_trait::async_trait;

use super::client::{AttestationLedger, Confirmation, LedgerError};
use crate::models::OwnerIdentity;

// Registry interface; the contract stores the payload and emits an event.
sol! {
    #[sol(rpc)]
    interface IAttestationRegistry {
        event CommitmentSubmitted(address indexed submitter, string owner, bytes payload);

        function submitCommitment(string owner, bytes payload) external;
    }
}

/// Ledger backed by an EVM registry contract.
pub struct EvmAttestationLedger {
    provider: DynProvider,
    registry: Address,
}

impl EvmAttestationLedger {
    /// Connect to `rpc_url`, signing with `wallet`.
    pub fn connect(
        rpc_url: &str,
        registry_address: &str,
        wallet: EthereumWallet,
    ) -> Result<Self, LedgerError> {
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e: url::ParseError| LedgerError::Rejected(format!("invalid RPC URL: {e}")))?;
        let registry = Address::from_str(registry_address)
            .map_err(|e| LedgerError::Rejected(format!("invalid registry address: {e}")))?;

        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(url)
            .erased();

        Ok(Self { provider, registry })
    }

    pub fn registry(&self) -> Address {
        self.registry
    }
}

/// Map an RPC/transport error message onto the ledger taxonomy.
pub(crate) fn classify_rpc_error(message: String) -> LedgerError {
    let lower = message.to_lowercase();
    if lower.contains("insufficient funds") || lower.contains("gas required exceeds") {
        LedgerError::InsufficientResources(message)
    } else if lower.contains("revert") || lower.contains("invalid opcode") {
        LedgerError::Rejected(message)
    } else {
        LedgerError::NetworkError(message)
    }
}

#[async_trait]
impl AttestationLedger for EvmAttestationLedger {
    async fn submit_commitment(
        &self,
        owner: &OwnerIdentity,
        payload: &[u8],
    ) -> Result<String, LedgerError> {
        let call = IAttestationRegistry::submitCommitmentCall {
            owner: owner.to_string(),
            payload: Bytes::copy_from_slice(payload),
        };
        let tx = TransactionRequest::default()
            .to(self.registry)
            .input(call.abi_encode().into());

        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|e| classify_rpc_error(e.to_string()))?;

        Ok(format!("{:?}", pending.tx_hash()))
    }

    async fn confirmation(&self, transaction: &str) -> Result<Confirmation, LedgerError> {
        let hash = TxHash::from_str(transaction)
            .map_err(|e| LedgerError::Rejected(format!("invalid transaction hash: {e}")))?;

        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| LedgerError::NetworkError(format!("failed to get receipt: {e}")))?;

        Ok(match receipt {
            None => Confirmation::Pending,
            Some(r) if r.status() => Confirmation::Confirmed {
                block_number: r.block_number,
            },
            Some(_) => Confirmation::Reverted("execution reverted".to_string()),
        })
    }

    fn name(&self) -> &'static str {
        "evm"
    }
}
