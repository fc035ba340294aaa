//! Thread view: a target message, its neighbours, and the message it replies to.

use std::collections::BTreeMap;

use futures::TryStreamExt;
use tracing::debug;

use crate::{
    domain::{Entity, Message, MessageId, MessageRecord},
    ports::{MessageQuery, Transport},
    resolver::resolve_entity,
    Result,
};

pub const DEFAULT_CONTEXT: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadContext {
    /// Chronological (ascending id), target included when it exists.
    pub messages: Vec<MessageRecord>,
    pub target_id: MessageId,
    pub replied_to: Option<MessageRecord>,
}

impl ThreadContext {
    pub fn target(&self) -> Option<&MessageRecord> {
        self.messages.iter().find(|m| m.id == self.target_id)
    }
}

/// Fetch `message_id` plus up to `context` messages on each side of it.
///
/// A deleted or invalid target is not an error: the result is just empty or partial.
pub async fn get_context<T>(
    transport: &T,
    chat: &str,
    message_id: MessageId,
    context: usize,
) -> Result<ThreadContext>
where
    T: Transport + ?Sized,
{
    let entity = resolve_entity(transport, chat).await?;
    let chat_name = entity.display_name();

    // Newer neighbours. Iterating oldest-first from the target yields the nearest ones;
    // newest-first would return the chat's latest traffic instead.
    let newer = if context == 0 {
        Vec::new()
    } else {
        collect(
            transport,
            &entity,
            MessageQuery {
                min_id: Some(message_id),
                limit: Some(context),
                reverse: true,
                ..Default::default()
            },
        )
        .await?
    };

    // Target and older neighbours.
    let older = collect(
        transport,
        &entity,
        MessageQuery {
            max_id: Some(message_id.saturating_add(1)),
            limit: Some(context.saturating_add(1)),
            ..Default::default()
        },
    )
    .await?;

    let mut by_id: BTreeMap<MessageId, Message> = BTreeMap::new();
    for msg in newer.into_iter().chain(older) {
        by_id.entry(msg.id).or_insert(msg);
    }

    let reply_to = by_id.get(&message_id).and_then(|m| m.reply_to_id);
    let replied_to = match reply_to {
        Some(id) => transport
            .get_message_by_id(&entity, id)
            .await?
            .map(|m| MessageRecord::from_message(&m, &chat_name)),
        None => None,
    };

    debug!(
        chat = %chat_name,
        target = message_id,
        found = by_id.len(),
        reply = ?reply_to,
        "assembled thread"
    );

    Ok(ThreadContext {
        messages: by_id
            .values()
            .map(|m| MessageRecord::from_message(m, &chat_name))
            .collect(),
        target_id: message_id,
        replied_to,
    })
}

async fn collect<T>(transport: &T, entity: &Entity, query: MessageQuery) -> Result<Vec<Message>>
where
    T: Transport + ?Sized,
{
    transport
        .iter_messages(Some(entity.clone()), query)
        .try_collect()
        .await
}
