/// Resolve the checkpoint thread id for a turn.
///
/// Priority: `session:{sid}` when a session exists, then
/// `user:{uid}:{agent_scope}`, then `"default"`.
pub fn resolve_thread_id(
    session_id: Option<&str>,
    user_id: Option<&str>,
    agent_scope: &str,
) -> String {
    if let Some(sid) = session_id.filter(|s| !s.is_empty()) {
        return format!("session:{sid}");
    }
    match user_id.filter(|u| !u.is_empty()) {
        Some(uid) => format!("user:{uid}:{agent_scope}"),
        None => "default".to_string(),
    }
}
