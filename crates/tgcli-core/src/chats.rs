use futures::TryStreamExt;

use crate::{domain::ChatSummary, ports::Transport, Result};

/// List up to `limit` chats whose name contains `filter` (case-insensitive).
///
/// Order is whatever the transport yields. Scanning stops once `limit` matches are
/// collected, so the work is bounded by matches, not by dialogs inspected.
pub async fn list_chats<T>(transport: &T, filter: Option<&str>, limit: usize) -> Result<Vec<ChatSummary>>
where
    T: Transport + ?Sized,
{
    let mut out = Vec::new();
    if limit == 0 {
        return Ok(out);
    }

    let needle = filter
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_lowercase);

    let mut dialogs = transport.iter_dialogs();
    while let Some(dialog) = dialogs.try_next().await? {
        if let Some(needle) = &needle {
            if !dialog.name.to_lowercase().contains(needle.as_str()) {
                continue;
            }
        }
        out.push(ChatSummary::from(dialog));
        if out.len() >= limit {
            break;
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EntityKind;
    use crate::testing::{dialog, user, FakeTransport};
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn lists_in_transport_order() {
        let t = FakeTransport::with_dialogs(&["Zeta", "Alpha", "Mid"]);
        let chats = list_chats(&t, None, 10).await.unwrap();
        let names: Vec<_> = chats.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Zeta", "Alpha", "Mid"]);
        assert!(chats.iter().all(|c| c.kind == EntityKind::Group));
    }

    #[tokio::test]
    async fn filter_is_case_insensitive_substring() {
        let mut t = FakeTransport::with_dialogs(&["Rust Tokyo", "Family", "rustaceans"]);
        t.dialogs.push(dialog("Trusty Friend", user(5, "Trusty")));
        let chats = list_chats(&t, Some("RUST"), 10).await.unwrap();
        let names: Vec<_> = chats.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Rust Tokyo", "rustaceans", "Trusty Friend"]);
        assert_eq!(chats[2].kind, EntityKind::User);
    }

    #[tokio::test]
    async fn stops_scanning_once_limit_matches_collected() {
        let t = FakeTransport::with_dialogs(&["a1", "b", "a2", "a3", "a4"]);
        let chats = list_chats(&t, Some("a"), 2).await.unwrap();
        assert_eq!(chats.len(), 2);
        assert_eq!(t.dialogs_pulled.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_limit_does_not_touch_transport() {
        let t = FakeTransport::with_dialogs(&["a"]);
        assert!(list_chats(&t, None, 0).await.unwrap().is_empty());
        assert_eq!(t.dialog_scans.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn repeated_calls_are_identical() {
        let t = FakeTransport::with_dialogs(&["One", "Two", "Three"]);
        let a = list_chats(&t, Some("o"), 5).await.unwrap();
        let b = list_chats(&t, Some("o"), 5).await.unwrap();
        assert_eq!(a, b);
    }
}
