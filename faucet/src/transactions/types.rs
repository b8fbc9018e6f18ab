use crate::oasis::{
    AccountAddress, BaseUnits,
    quantity::{Quantity, serde_decimal},
};
use anyhow::Error;
use serde::{Deserialize, Serialize};

const CONSENSUS_SIGNATURE_CONTEXT: &str = "oasis-core/consensus: tx";
const RUNTIME_SIGNATURE_CONTEXT_BASE: &str = "oasis-runtime-sdk/tx: v0";

/// Domain separation context for consensus transactions on the given chain.
pub fn consensus_signature_context(chain_context: &str) -> String {
    format!("{CONSENSUS_SIGNATURE_CONTEXT} for chain {chain_context}")
}

/// Rich domain separation context binding a runtime transaction to a paratime and chain.
pub fn runtime_signature_context(runtime_id: &str, chain_context: &str) -> String {
    format!("{RUNTIME_SIGNATURE_CONTEXT_BASE} for runtime {runtime_id} for chain {chain_context}")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    #[serde(with = "serde_decimal")]
    pub amount: Quantity,
    pub gas: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "body")]
pub enum ConsensusCall {
    #[serde(rename = "staking.Transfer")]
    Transfer {
        to: AccountAddress,
        #[serde(with = "serde_decimal")]
        amount: Quantity,
    },
    #[serde(rename = "staking.Allow")]
    Allow {
        beneficiary: AccountAddress,
        negative: bool,
        #[serde(with = "serde_decimal")]
        amount_change: Quantity,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedConsensusTransaction {
    pub nonce: u64,
    pub fee: Fee,
    #[serde(flatten)]
    pub call: ConsensusCall,
}

impl UnsignedConsensusTransaction {
    pub fn new_transfer(to: AccountAddress, amount: Quantity) -> Self {
        Self {
            nonce: 0,
            fee: Fee::default(),
            call: ConsensusCall::Transfer { to, amount },
        }
    }

    pub fn new_allow(beneficiary: AccountAddress, amount_change: Quantity) -> Self {
        Self {
            nonce: 0,
            fee: Fee::default(),
            call: ConsensusCall::Allow {
                beneficiary,
                negative: false,
                amount_change,
            },
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(self).map_err(|e| anyhow::anyhow!("Failed to encode consensus tx: {e}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "body")]
pub enum RuntimeCall {
    #[serde(rename = "consensus.Deposit")]
    Deposit { to: AccountAddress, amount: BaseUnits },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerInfo {
    /// Hex encoded ed25519 public key.
    pub public_key: String,
    pub nonce: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeFee {
    pub amount: BaseUnits,
    pub gas: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInfo {
    pub signer_info: Vec<SignerInfo>,
    pub fee: RuntimeFee,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedRuntimeTransaction {
    pub call: RuntimeCall,
    pub auth_info: AuthInfo,
}

impl UnsignedRuntimeTransaction {
    pub fn new_deposit(to: AccountAddress, amount: BaseUnits) -> Self {
        Self {
            call: RuntimeCall::Deposit { to, amount },
            auth_info: AuthInfo {
                signer_info: Vec::new(),
                fee: RuntimeFee {
                    amount: BaseUnits::native(Quantity::ZERO),
                    gas: 0,
                },
            },
        }
    }

    pub fn append_auth_signature(&mut self, public_key: &str, nonce: u64) {
        self.auth_info.signer_info.push(SignerInfo {
            public_key: public_key.to_string(),
            nonce,
        });
    }

    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(self).map_err(|e| anyhow::anyhow!("Failed to encode runtime tx: {e}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSignature {
    pub public_key: String,
    pub signature: String,
}

/// Encoded transaction body together with its signatures, ready for submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub untrusted_raw_value: String,
    pub signatures: Vec<TransactionSignature>,
}

impl SignedTransaction {
    pub fn new(raw: &[u8], public_key: &str, signature: &[u8]) -> Self {
        Self {
            untrusted_raw_value: hex::encode(raw),
            signatures: vec![TransactionSignature {
                public_key: public_key.to_string(),
                signature: hex::encode(signature),
            }],
        }
    }
}
