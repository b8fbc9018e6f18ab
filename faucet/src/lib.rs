pub mod bank;
pub mod frontend;
pub mod metrics;
pub mod oasis;
pub mod shared;
pub mod transactions;
pub mod utils;

#[cfg(test)]
mod test_utils;
