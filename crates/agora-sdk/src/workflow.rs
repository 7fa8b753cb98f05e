//! Workflow state lookup

use crate::error::Result;
use agora_client::sheets::WorkflowAssignment;
use agora_client::{parent_path, ResourceClient};
use tracing::debug;

/// Workflow state governing `path`: the state of the closest resource,
/// starting at `path` and walking up the parent chain, that carries a
/// workflow assignment. `None` if no ancestor has one.
pub async fn workflow_state(client: &dyn ResourceClient, path: &str) -> Result<Option<String>> {
    let mut current = Some(path.to_string());
    while let Some(path) = current {
        let resource = client.get(&path).await?;
        if let Some(assignment) = resource.data.get::<WorkflowAssignment>()? {
            debug!(%path, state = %assignment.workflow_state, "workflow state");
            return Ok(Some(assignment.workflow_state));
        }
        current = resource.parent.or_else(|| parent_path(&path));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_client::{content_types, MemoryResourceClient, Resource};

    fn process(state: &str) -> Resource {
        Resource::new(content_types::PROCESS)
            .with_path("/organisation/budget/")
            .with_parent("/organisation/")
            .with_sheet(&WorkflowAssignment {
                workflow_state: state.into(),
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_inherited_from_process() {
        let client = MemoryResourceClient::new()
            .with_resource(Resource::new(content_types::POOL).with_path("/organisation/").with_parent("/"))
            .with_resource(process("result"))
            .with_resource(
                Resource::new(content_types::PROPOSAL)
                    .with_path("/organisation/budget/proposal_0000001/")
                    .with_parent("/organisation/budget/"),
            );

        let state = workflow_state(&client, "/organisation/budget/proposal_0000001/")
            .await
            .unwrap();
        assert_eq!(state.as_deref(), Some("result"));
    }

    #[tokio::test]
    async fn test_none_without_assignment() {
        let client = MemoryResourceClient::new().with_resource(
            Resource::new(content_types::POOL).with_path("/debates/").with_parent("/"),
        );
        assert_eq!(workflow_state(&client, "/debates/").await.unwrap(), None);
    }
}
