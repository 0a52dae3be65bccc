use futures_util::{StreamExt, TryStreamExt, stream};

use super::AiCore;
use super::error::AiCoreError;
use super::types::{AggregatedDeployments, TeamDeployments};
use crate::catalog::CatalogUser;

/// Why a team was left out of an aggregated listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    CredentialsNotFound,
}

/// Result of querying one team.
#[derive(Debug)]
pub enum TeamOutcome {
    Included(TeamDeployments),
    Skipped { team: String, reason: SkipReason },
}

/// List deployments across every team of the identity.
///
/// Teams without credentials are omitted. Any other failure aborts the whole listing and
/// cancels the remaining per-team calls. Team order follows the user's membership order.
#[tracing::instrument(skip(core), err)]
pub async fn list_deployments(
    core: &AiCore,
    identity: &str,
) -> Result<AggregatedDeployments, AiCoreError> {
    let user = core.resolver.user(identity).await?;
    if user.teams.is_empty() {
        return Err(AiCoreError::UserNotAssignedToTeam {
            user: user.name,
            team: None,
        });
    }

    let user = &user;
    let outcomes: Vec<TeamOutcome> = stream::iter(user.teams.iter().cloned())
        .map(|team| async move { team_outcome(core, user, &team).await })
        .buffered(core.settings.fanout_concurrency.max(1))
        .try_collect()
        .await?;

    Ok(merge(outcomes))
}

async fn team_outcome(
    core: &AiCore,
    user: &CatalogUser,
    team: &str,
) -> Result<TeamOutcome, AiCoreError> {
    let cred = match core.resolver.resolve_for(user, team).await {
        Ok(cred) => cred,
        Err(AiCoreError::CredentialsNotFound(team)) => {
            tracing::debug!(%team, "skipping team without AI platform credentials");
            return Ok(TeamOutcome::Skipped {
                team,
                reason: SkipReason::CredentialsNotFound,
            });
        }
        Err(e) => return Err(e),
    };
    let deployments = core.platform.list_deployments(&cred).await?;
    Ok(TeamOutcome::Included(TeamDeployments {
        team: cred.team,
        deployments,
    }))
}

/// Keep included teams in order and total their deployments.
pub fn merge(outcomes: Vec<TeamOutcome>) -> AggregatedDeployments {
    let deployments: Vec<TeamDeployments> = outcomes
        .into_iter()
        .filter_map(|outcome| match outcome {
            TeamOutcome::Included(team) => Some(team),
            TeamOutcome::Skipped { .. } => None,
        })
        .collect();
    let count = deployments.iter().map(|t| t.deployments.len()).sum();
    AggregatedDeployments { count, deployments }
}
