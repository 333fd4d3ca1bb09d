//! Search gateways (LanceDB and in-memory) and the parallel coordinator that
//! fans one query vector out across collections.
pub mod coordinator;
pub mod lance;
pub mod memory;
pub mod schema;
pub mod writer;

pub use coordinator::{CollectionHits, SearchCoordinator, SearchTarget};
pub use lance::{open_db, LanceGateway};
pub use memory::{MemoryGateway, SearchCall};
pub use writer::{write_records, EvidenceRecord};
