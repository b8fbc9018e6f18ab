pub mod signer;
pub mod web3signer;
