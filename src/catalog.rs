use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

/// A portal user with their team memberships, primary team first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogUser {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub teams: Vec<String>,
}

impl CatalogUser {
    pub fn primary_team(&self) -> Option<&str> {
        self.teams.first().map(String::as_str)
    }

    pub fn is_member_of(&self, team: &str) -> bool {
        self.teams.iter().any(|t| t == team)
    }
}

/// Maps an authenticated identity onto a catalog user.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Look up by login name or (case-insensitive) email. `None` when unknown.
    async fn find_user(&self, identity: &str) -> anyhow::Result<Option<CatalogUser>>;
}

/// Catalog directory backed by the portal database.
#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Directory for PgDirectory {
    #[tracing::instrument(skip(self), err)]
    async fn find_user(&self, identity: &str) -> anyhow::Result<Option<CatalogUser>> {
        let row: Option<(Uuid, String, Option<String>)> = sqlx::query_as(
            r"
            SELECT id, name, email
            FROM users
            WHERE is_active = true
              AND (name = $1 OR lower(email) = lower($1))
            ORDER BY (name = $1) DESC
            LIMIT 1
            ",
        )
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, name, email)) = row else {
            return Ok(None);
        };

        let teams: Vec<String> = sqlx::query_scalar(
            r"
            SELECT t.name
            FROM team_members m
            JOIN teams t ON t.id = m.team_id
            WHERE m.user_id = $1
            ORDER BY m.is_primary DESC, m.created_at, t.name
            ",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(CatalogUser {
            id,
            name,
            email,
            teams,
        }))
    }
}
