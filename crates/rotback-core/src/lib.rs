pub mod config;
pub mod driver;
pub mod error;
pub mod lock;
pub mod naming;
pub mod platform;
pub mod retention;
pub mod store;
pub mod transfer;

#[cfg(test)]
mod tests;
#[cfg(test)]
mod testutil;
