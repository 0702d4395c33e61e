pub mod cluster;
pub mod config;
pub mod engine;
pub mod handlers;
pub mod records;
pub mod reconcile;
pub mod subsume;
pub mod synonyms;

pub use cluster::{Cluster, Clusterer, KeyedRecord, Link, MatchReason};
pub use config::{ConfigurationError, EngineConfig, EngineSettings};
pub use engine::{ClusterReport, Deduplication, Engine, MemberReport};
pub use handlers::{AppState, router};
pub use records::{InputFormat, ParsedRecords, RecordFault, RecordParseError};
pub use reconcile::{precedence, reconcile};
pub use subsume::is_subsumed;
pub use synonyms::SynonymTable;
