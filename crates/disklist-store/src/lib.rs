pub mod disk_list;
pub mod quick_list;
pub mod record;
pub mod recovery;
pub mod store;


pub use disk_list::DiskList;
pub use disklist_common::{Data, ListConfig};
pub use quick_list::{Node, QuickList};
pub use record::Record;
pub use recovery::RecoveryReport;
pub use store::FileStore;

use disklist_common::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot allocate with size= {size}, maxSize= {max}")]
    AllocationTooLarge { size: usize, max: usize },
    #[error("List is empty")]
    EmptyList,
    #[error("Node not found at offset {0}")]
    NodeNotFound(u32),
    #[error("Value is already linked")]
    DuplicateValue,
    #[error("Offset {0} is already linked")]
    OffsetInUse(u32),
    #[error("Offset {0} does not fit a 32-bit link")]
    FileTooLarge(u64),
    #[error("Corrupt record at offset {offset}: {reason}")]
    Corrupt { offset: u32, reason: &'static str },
    #[error("Recovery Inconsistency: {0}")]
    RecoveryInconsistency(RecoveryReport),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
