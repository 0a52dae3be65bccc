/// One mutating call against the AI platform, recorded on the `audit` tracing target.
pub struct AuditEntry<'a> {
    pub actor: &'a str,
    pub actor_email: Option<&'a str>,
    pub action: &'a str,
    pub resource: &'a str,
    pub resource_id: Option<&'a str>,
    pub team: Option<&'a str>,
    pub detail: Option<serde_json::Value>,
    pub ip_addr: Option<&'a str>,
}

pub fn write_audit(entry: &AuditEntry<'_>) {
    let detail = entry
        .detail
        .as_ref()
        .map(serde_json::Value::to_string)
        .unwrap_or_default();
    tracing::info!(
        target: "audit",
        actor = entry.actor,
        actor_email = entry.actor_email.unwrap_or_default(),
        action = entry.action,
        resource = entry.resource,
        resource_id = entry.resource_id.unwrap_or_default(),
        team = entry.team.unwrap_or_default(),
        ip_addr = entry.ip_addr.unwrap_or_default(),
        %detail,
        "audit"
    );
}
