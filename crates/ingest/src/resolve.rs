//! Chat display-name resolution.

use {
    hermod_platform::{AddressServer, BridgeClient, ChatAddress, HistoryConversation},
    hermod_storage::Storage,
    tracing::debug,
};

/// Resolve the display name for a chat, in priority order:
///
/// 1. a non-empty name already stored for the address (names are sticky),
/// 2. the history-sync conversation's display name or name,
/// 3. for groups: live group info, falling back to `Group <user>`,
/// 4. otherwise: the platform contact store, the sender's push name, the
///    bare user part.
pub(crate) async fn resolve_chat_name(
    storage: &Storage,
    client: &BridgeClient,
    chat: &ChatAddress,
    conversation: Option<&HistoryConversation>,
    push_name: &str,
) -> String {
    match storage.get_chat_name(&chat.to_string()).await {
        Ok(Some(existing)) => return existing,
        Ok(None) => {},
        Err(e) => debug!(chat = %chat, error = %e, "chat name lookup failed"),
    }

    if let Some(conv) = conversation
        && let Some(name) = conv.display_name().or_else(|| conv.name())
    {
        return name.to_string();
    }

    if chat.server() == AddressServer::Group {
        return match client.group_info(chat).await {
            Ok(info) if !info.name.is_empty() => info.name,
            _ => format!("Group {}", chat.user()),
        };
    }

    if let Ok(Some(name)) = client.contact_name(chat).await {
        return name;
    }
    if !push_name.is_empty() {
        return push_name.to_string();
    }
    chat.user().to_string()
}
