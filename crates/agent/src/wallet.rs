//! Aptos test-network wallet collaborator.
//!
//! The agent controls a wallet derived deterministically from the
//! calendar id, so the same calendar always maps to the same account.
//! Gas funding is handled internally: the account is topped up from the
//! testnet faucet whenever its balance drops below a threshold.
//!
//! Transfers go through the fullnode REST API: the node encodes the
//! signing message (`encode_submission`), the agent signs it with the
//! derived ed25519 key, submits, and waits for the transaction to leave
//! the mempool.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use sha3::Sha3_256;
use shared_types::WalletInfo;

const DEFAULT_NODE_URL: &str = "https://fullnode.testnet.aptoslabs.com/v1";
const DEFAULT_FAUCET_URL: &str = "https://faucet.testnet.aptoslabs.com";

const OCTAS_PER_APT: u64 = 100_000_000;
/// Fund from the faucet when the balance drops below 0.1 APT.
const MIN_BALANCE_OCTAS: u64 = 10_000_000;
/// One faucet grant: 1 APT.
const FAUCET_GRANT_OCTAS: u64 = 100_000_000;

const APT_COIN_STORE: &str = "0x1::coin::CoinStore<0x1::aptos_coin::AptosCoin>";
const WALLET_SEED_SALT: &str = "calendefi_aptos";

const NETWORK_NAME: &str = "Aptos Testnet";

pub fn explorer_txn_url(hash: &str) -> String {
    format!("https://explorer.aptoslabs.com/txn/{hash}?network=testnet")
}

pub fn explorer_account_url(address: &str) -> String {
    format!("https://explorer.aptoslabs.com/account/{address}?network=testnet")
}

/// External transfer-submission collaborator used by the poll loop.
#[async_trait]
pub trait TransferExecutor: Send + Sync {
    /// Submit a signed transfer and return the transaction hash.
    async fn submit_transfer(&self, recipient: &str, amount: &str, token: &str) -> Result<String>;
}

pub struct AptosWalletService {
    http: reqwest::Client,
    node_url: String,
    faucet_url: String,
    calendar_id: String,
}

impl AptosWalletService {
    pub fn from_env() -> Self {
        let node_url =
            std::env::var("APTOS_NODE_URL").unwrap_or_else(|_| DEFAULT_NODE_URL.to_string());
        let faucet_url =
            std::env::var("APTOS_FAUCET_URL").unwrap_or_else(|_| DEFAULT_FAUCET_URL.to_string());
        let calendar_id = std::env::var("CALENDAR_ID").unwrap_or_else(|_| "primary".to_string());

        Self {
            http: reqwest::Client::new(),
            node_url,
            faucet_url,
            calendar_id,
        }
    }

    /// Derive the calendar's signing key: sha256(calendar_id ++ salt).
    fn signing_key(&self) -> SigningKey {
        let mut hasher = Sha256::new();
        hasher.update(self.calendar_id.as_bytes());
        hasher.update(WALLET_SEED_SALT.as_bytes());
        let seed: [u8; 32] = hasher.finalize().into();
        SigningKey::from_bytes(&seed)
    }

    /// Aptos account address for a single ed25519 key:
    /// sha3-256(pubkey ++ 0x00).
    fn account_address(key: &SigningKey) -> String {
        let mut hasher = Sha3_256::new();
        hasher.update(key.verifying_key().as_bytes());
        hasher.update([0u8]);
        format!("0x{}", hex::encode(hasher.finalize()))
    }

    pub fn wallet_address(&self) -> String {
        Self::account_address(&self.signing_key())
    }

    pub async fn wallet_info(&self) -> Result<WalletInfo> {
        let address = self.wallet_address();
        let octas = self.balance_octas(&address).await.unwrap_or(0);

        Ok(WalletInfo {
            balance: format_apt(octas),
            explorer_url: explorer_account_url(&address),
            network: NETWORK_NAME.to_string(),
            address,
        })
    }

    /// Raw octa balance of any address; "0" when the coin store does not
    /// exist on chain.
    pub async fn address_balance(&self, address: &str) -> Result<String> {
        match self.coin_store(address).await? {
            Some(value) => Ok(value),
            None => Ok("0".to_string()),
        }
    }

    pub async fn transaction_status(&self, hash: &str) -> Result<Value> {
        let response = self
            .http
            .get(format!("{}/transactions/by_hash/{}", self.node_url, hash))
            .send()
            .await
            .context("Failed to query transaction")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            bail!("Transaction {} not found", hash);
        }

        response
            .error_for_status()
            .context("Node rejected transaction lookup")?
            .json()
            .await
            .context("Invalid transaction response")
    }

    async fn coin_store(&self, address: &str) -> Result<Option<String>> {
        let url = format!(
            "{}/accounts/{}/resource/{}",
            self.node_url,
            address,
            urlencoding::encode(APT_COIN_STORE)
        );

        let response = self
            .http
            .get(url)
            .send()
            .await
            .context("Failed to query account resources")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let resource: Value = response
            .error_for_status()
            .context("Node rejected balance lookup")?
            .json()
            .await
            .context("Invalid resource response")?;

        Ok(resource
            .pointer("/data/coin/value")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn balance_octas(&self, address: &str) -> Result<u64> {
        let raw = self.address_balance(address).await?;
        raw.parse().context("Unparseable balance value")
    }

    /// Top up from the faucet when the balance is below the threshold or
    /// the account does not exist on chain yet.
    async fn ensure_funding(&self, address: &str) -> Result<()> {
        let balance = self.balance_octas(address).await.unwrap_or(0);
        if balance >= MIN_BALANCE_OCTAS {
            tracing::debug!("Account has sufficient balance: {}", format_apt(balance));
            return Ok(());
        }

        tracing::info!("Funding {} from faucet", address);
        self.http
            .post(format!(
                "{}/mint?address={}&amount={}",
                self.faucet_url, address, FAUCET_GRANT_OCTAS
            ))
            .send()
            .await
            .context("Faucet request failed")?
            .error_for_status()
            .context("Faucet refused funding")?;

        // Give the faucet transaction time to land.
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    }

    async fn sequence_number(&self, address: &str) -> Result<u64> {
        let account: Value = self
            .http
            .get(format!("{}/accounts/{}", self.node_url, address))
            .send()
            .await
            .context("Failed to query account")?
            .error_for_status()
            .context("Account not found on chain")?
            .json()
            .await
            .context("Invalid account response")?;

        account["sequence_number"]
            .as_str()
            .context("Missing sequence number")?
            .parse()
            .context("Unparseable sequence number")
    }

    async fn wait_for_transaction(&self, hash: &str) -> Result<()> {
        for _ in 0..30 {
            let response = self
                .http
                .get(format!("{}/transactions/by_hash/{}", self.node_url, hash))
                .send()
                .await
                .context("Failed to poll transaction")?;

            if response.status() == reqwest::StatusCode::NOT_FOUND {
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }

            let txn: Value = response
                .error_for_status()
                .context("Node rejected transaction poll")?
                .json()
                .await
                .context("Invalid transaction response")?;

            if txn["type"].as_str() == Some("pending_transaction") {
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }

            if txn["success"].as_bool() == Some(true) {
                return Ok(());
            }
            bail!(
                "Transaction {} failed on chain: {}",
                hash,
                txn["vm_status"].as_str().unwrap_or("unknown vm status")
            );
        }

        bail!("Timed out waiting for transaction {}", hash)
    }
}

#[async_trait]
impl TransferExecutor for AptosWalletService {
    async fn submit_transfer(&self, recipient: &str, amount: &str, token: &str) -> Result<String> {
        if token.to_uppercase() != "APT" {
            bail!("Token {} not supported yet. Only APT transfers are implemented.", token);
        }

        let octas = amount_to_octas(amount)?;
        let key = self.signing_key();
        let sender = Self::account_address(&key);

        tracing::info!("Transferring {} octas ({} APT) to {}", octas, amount, recipient);

        self.ensure_funding(&sender).await?;
        let sequence_number = self.sequence_number(&sender).await?;
        let expiration = chrono::Utc::now().timestamp() + 600;

        let mut request = json!({
            "sender": sender,
            "sequence_number": sequence_number.to_string(),
            "max_gas_amount": "2000",
            "gas_unit_price": "100",
            "expiration_timestamp_secs": expiration.to_string(),
            "payload": {
                "type": "entry_function_payload",
                "function": "0x1::coin::transfer",
                "type_arguments": ["0x1::aptos_coin::AptosCoin"],
                "arguments": [recipient, octas.to_string()],
            },
        });

        // The node BCS-encodes the signing message for us.
        let signing_message: String = self
            .http
            .post(format!("{}/transactions/encode_submission", self.node_url))
            .json(&request)
            .send()
            .await
            .context("encode_submission request failed")?
            .error_for_status()
            .context("Node rejected transaction encoding")?
            .json()
            .await
            .context("Invalid encode_submission response")?;

        let message =
            hex::decode(signing_message.trim_start_matches("0x")).context("Invalid signing message hex")?;
        let signature = key.sign(&message);

        request["signature"] = json!({
            "type": "ed25519_signature",
            "public_key": format!("0x{}", hex::encode(key.verifying_key().as_bytes())),
            "signature": format!("0x{}", hex::encode(signature.to_bytes())),
        });

        let submitted: Value = self
            .http
            .post(format!("{}/transactions", self.node_url))
            .json(&request)
            .send()
            .await
            .context("Transaction submission failed")?
            .error_for_status()
            .context("Node rejected the transaction")?
            .json()
            .await
            .context("Invalid submission response")?;

        let hash = submitted["hash"]
            .as_str()
            .context("Submission response missing hash")?
            .to_string();

        tracing::info!("Submitted transaction {}", hash);
        self.wait_for_transaction(&hash).await?;
        tracing::info!("Transaction confirmed: {}", explorer_txn_url(&hash));

        Ok(hash)
    }
}

/// Convert a decimal APT amount to octas (1 APT = 100,000,000 octas),
/// truncating sub-octa precision.
fn amount_to_octas(amount: &str) -> Result<u64> {
    let apt: f64 = amount.parse().context("Unparseable transfer amount")?;
    if !apt.is_finite() || apt < 0.0 {
        bail!("Invalid transfer amount: {}", amount);
    }
    Ok((apt * OCTAS_PER_APT as f64).floor() as u64)
}

fn format_apt(octas: u64) -> String {
    format!("{:.8}", octas as f64 / OCTAS_PER_APT as f64)
}
