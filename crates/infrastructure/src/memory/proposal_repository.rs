use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use fairshare_domain::{ProposalFilter, ProposalRepository, ProposalState, SwapProposal};
use fairshare_errors::{FairshareError, FairshareResult};

#[derive(Debug, Default)]
pub struct InMemoryProposalRepository {
    proposals: RwLock<HashMap<Uuid, SwapProposal>>,
}

impl InMemoryProposalRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProposalRepository for InMemoryProposalRepository {
    async fn insert(&self, proposal: &SwapProposal) -> FairshareResult<()> {
        let mut proposals = self.proposals.write().await;
        if proposals.contains_key(&proposal.id) {
            return Err(FairshareError::conflict(format!(
                "换班提议 {} 已存在",
                proposal.id
            )));
        }
        proposals.insert(proposal.id, proposal.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> FairshareResult<Option<SwapProposal>> {
        Ok(self.proposals.read().await.get(&id).cloned())
    }

    async fn compare_and_update(
        &self,
        expected: ProposalState,
        proposal: &SwapProposal,
    ) -> FairshareResult<bool> {
        let mut proposals = self.proposals.write().await;
        let stored = proposals
            .get_mut(&proposal.id)
            .ok_or_else(|| FairshareError::proposal_not_found(proposal.id.to_string()))?;
        if stored.state != expected {
            return Ok(false);
        }
        *stored = proposal.clone();
        Ok(true)
    }

    async fn list(&self, filter: &ProposalFilter) -> FairshareResult<Vec<SwapProposal>> {
        let mut matching: Vec<SwapProposal> = self
            .proposals
            .read()
            .await
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(matching)
    }
}
