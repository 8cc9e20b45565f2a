pub mod api;
pub mod codec;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod portfolio;
pub mod workflow;

pub use config::Config;
pub use db::{init_db, Repository};
pub use error::{AppError, DomainError};
pub use gateway::{LedgerQueryGateway, LedgerTransactionGateway};
pub use ledger::{JsonRpcLedger, LedgerClient, MockLedger};
pub use portfolio::PortfolioAggregator;
pub use workflow::AssetLifecycleWorkflow;
