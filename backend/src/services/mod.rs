//! Business logic services for the Restaurant Management Platform

pub mod alert;
pub mod count;
pub mod fifo;
pub mod item;
pub mod receiving;
pub mod stock_ledger;
pub mod transfer;
pub mod warehouse;

pub use alert::AlertService;
pub use count::CountService;
pub use fifo::FifoTracker;
pub use item::ItemService;
pub use receiving::ReceivingService;
pub use stock_ledger::StockLedgerService;
pub use transfer::TransferService;
pub use warehouse::WarehouseService;
