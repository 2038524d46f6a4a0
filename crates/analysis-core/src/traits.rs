use async_trait::async_trait;

use crate::error::CollaboratorError;
use crate::payloads::Payload;
use crate::result::ProducerResult;
use crate::types::{ListingCandidate, RunContext, Symbol};

/// External data source behind one producer.
#[async_trait]
pub trait DataCollaborator: Send + Sync {
    type Raw: Send + 'static;

    async fn fetch(&self, symbol: &Symbol) -> Result<Self::Raw, CollaboratorError>;

    /// Name recorded in result metadata
    fn source(&self) -> &str;
}

/// External ticker search used as the last resolution strategy.
#[async_trait]
pub trait SymbolLookup: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<ListingCandidate>, CollaboratorError>;
}

/// One independent analysis unit.
///
/// Implementations capture every failure mode and return it as
/// [`ProducerResult::Failure`]; `analyze` itself never errors.
#[async_trait]
pub trait Producer: Send + Sync {
    type Payload: Payload;

    async fn analyze(&self, symbol: &Symbol, context: &RunContext) -> ProducerResult<Self::Payload>;

    fn source(&self) -> &str;
}
