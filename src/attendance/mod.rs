pub mod geo;
pub mod ledger;

pub use geo::{Coordinates, GeoFence, OfficeLocation};
pub use ledger::{AttendanceLedger, DailySummary, EtaPolicy, LedgerError};
